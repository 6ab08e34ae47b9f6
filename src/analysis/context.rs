// Copyright (C) 2026 Checkmk GmbH - License: GNU General Public License v2
// This file is part of Checkmk (https://checkmk.com). It is subject to the terms and
// conditions defined in the file COPYING, which is part of this source code package.

//! Cancellation, progress reporting and errors shared by every analysis pass.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use thiserror::Error;

use super::diff::PairingError;

/// Result type for analysis passes.
pub type AnalysisResult<T> = std::result::Result<T, AnalysisError>;

#[derive(Debug, Error)]
pub enum AnalysisError {
    #[error("Analysis was canceled")]
    Canceled,
    #[error("Failed to pair before and after entities")]
    Pairing(#[from] PairingError),
    #[error("Sanity check failed: {what}")]
    Sanity { what: String },
}

/// Cooperative cancellation flag shared between the caller and a running pass.
#[derive(Debug, Clone, Default)]
pub struct CancellationToken {
    canceled: Arc<AtomicBool>,
}

impl CancellationToken {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation. Running passes stop at their next checkpoint.
    pub fn cancel(&self) {
        self.canceled.store(true, Ordering::Relaxed);
    }

    #[must_use]
    pub fn is_canceled(&self) -> bool {
        self.canceled.load(Ordering::Relaxed)
    }
}

/// Receives progress of long-running sweeps.
pub trait ProgressSink: Send + Sync {
    fn report(&self, message: &str, current: u64, total: Option<u64>);
}

/// Forwards progress to the `log` facade at debug level.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogProgress;

impl ProgressSink for LogProgress {
    fn report(&self, message: &str, current: u64, total: Option<u64>) {
        match total {
            Some(total) => log::debug!("Progress: {message} (current={current}, total={total})"),
            None => log::debug!("Progress: {message} (current={current})"),
        }
    }
}

/// Discards progress.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoProgress;

impl ProgressSink for NoProgress {
    fn report(&self, _message: &str, _current: u64, _total: Option<u64>) {}
}

/// Number of items between two progress reports.
pub(crate) const PROGRESS_VELOCITY: u64 = 100;

/// The cancellation token and progress sink of one pass.
#[derive(Clone, Copy)]
pub struct AnalysisContext<'a> {
    token: &'a CancellationToken,
    progress: &'a dyn ProgressSink,
}

impl<'a> AnalysisContext<'a> {
    #[must_use]
    pub fn new(token: &'a CancellationToken, progress: &'a dyn ProgressSink) -> Self {
        Self { token, progress }
    }

    /// Fail with [`AnalysisError::Canceled`] if cancellation was requested.
    ///
    /// # Errors
    /// Returns an error if the pass was canceled.
    pub fn checkpoint(&self) -> AnalysisResult<()> {
        if self.token.is_canceled() {
            return Err(AnalysisError::Canceled);
        }
        Ok(())
    }

    pub fn report(&self, message: &str, current: u64, total: Option<u64>) {
        self.progress.report(message, current, total);
    }

    /// Start a sweep over `total` items.
    #[must_use]
    pub(crate) fn sweep(&self, task: &'static str, total: u64) -> Sweep<'a> {
        Sweep {
            context: *self,
            task,
            total,
            processed: 0,
            next_report: PROGRESS_VELOCITY,
        }
    }
}

/// Tracks one sweep: checks cancellation on every item and reports progress every
/// [`PROGRESS_VELOCITY`] items.
pub(crate) struct Sweep<'a> {
    context: AnalysisContext<'a>,
    task: &'static str,
    total: u64,
    processed: u64,
    next_report: u64,
}

impl Sweep<'_> {
    /// Account for `count` more items.
    ///
    /// # Errors
    /// Returns an error if the pass was canceled.
    pub(crate) fn advance(&mut self, count: u64) -> AnalysisResult<()> {
        self.context.checkpoint()?;
        self.processed += count;
        if self.processed >= self.next_report {
            self.context.report(
                &format!("{}: {}/{}", self.task, self.processed, self.total),
                self.processed,
                Some(self.total),
            );
            while self.next_report <= self.processed {
                self.next_report += PROGRESS_VELOCITY;
            }
        }
        Ok(())
    }

    /// Send the final report of the sweep.
    pub(crate) fn finish(self, found: usize) {
        self.context.report(
            &format!(
                "{}: {}/{} processed, {} found",
                self.task, self.processed, self.total, found
            ),
            self.total,
            Some(self.total),
        );
    }
}

// Copyright (C) 2026 Checkmk GmbH - License: GNU General Public License v2
// This file is part of Checkmk (https://checkmk.com). It is subject to the terms and
// conditions defined in the file COPYING, which is part of this source code package.

//! Report struct and public API for summarizing and validating analysis results.

mod console;
mod totals;
mod utils;
mod validate;

pub use console::summarize_report;
pub use validate::{validate_report, ReportLimits};

use serde::Serialize;

use crate::analysis::{AnalysisOptions, DiffAnalysis, SingleBinaryAnalysis};
use totals::ReportTotals;

/// The analysis a report was built from.
#[derive(Debug, Clone, Copy, Serialize)]
#[serde(untagged)]
pub(crate) enum ReportAnalysis<'a> {
    Single(&'a SingleBinaryAnalysis),
    Diff(&'a DiffAnalysis),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub(crate) enum ReportMode {
    Single,
    Diff,
}

#[derive(Debug, Serialize)]
pub struct Report<'a> {
    mode: ReportMode,
    binary: String,
    totals: ReportTotals,
    analysis: ReportAnalysis<'a>,
    #[serde(skip)]
    example_symbol_count: usize,
}

impl<'a> Report<'a> {
    /// Create a report for a single binary.
    #[must_use]
    pub fn single(analysis: &'a SingleBinaryAnalysis, options: &AnalysisOptions) -> Self {
        Self {
            mode: ReportMode::Single,
            binary: analysis.binary().to_string(),
            totals: ReportTotals::single(analysis),
            analysis: ReportAnalysis::Single(analysis),
            example_symbol_count: options.example_symbol_count,
        }
    }

    /// Create a report comparing two builds.
    #[must_use]
    pub fn diff(analysis: &'a DiffAnalysis, options: &AnalysisOptions) -> Self {
        Self {
            mode: ReportMode::Diff,
            binary: format!("{} -> {}", analysis.before_binary(), analysis.after_binary()),
            totals: ReportTotals::diff(analysis),
            analysis: ReportAnalysis::Diff(analysis),
            example_symbol_count: options.example_symbol_count,
        }
    }

    #[must_use]
    pub fn binary(&self) -> &str {
        &self.binary
    }

    /// Total waste of a single binary, or the growth of waste between two builds.
    #[must_use]
    pub fn wasted_size(&self) -> i64 {
        match &self.totals {
            ReportTotals::Single(totals) => i64::try_from(totals.waste.total_wasted_size).unwrap_or(i64::MAX),
            ReportTotals::Diff(totals) => totals.waste.total_wasted_size_diff,
        }
    }
}

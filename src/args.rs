// Copyright (C) 2026 Checkmk GmbH - License: GNU General Public License v2
// This file is part of Checkmk (https://checkmk.com). It is subject to the terms and
// conditions defined in the file COPYING, which is part of this source code package.
use anyhow::{bail, Result};
use clap::{ArgAction, Parser, ValueEnum};
use log::LevelFilter;
use size_inspector::analysis::{AnalysisOptions, DEFAULT_EXAMPLE_SYMBOL_COUNT};
use size_inspector::report::ReportLimits;
use std::path::{Path, PathBuf};

#[derive(Parser)]
#[command(name = "size_inspector")]
#[command(version)]
#[command(about = "Analyzes binary size snapshots for contributions and waste, or diffs two builds")]
#[command(override_usage = "size_inspector [OPTIONS] <SNAPSHOT> <REPORT>\n       \
    size_inspector [OPTIONS] --before <BEFORE> --after <AFTER> <REPORT>")]
pub(crate) struct Args {
    /// Snapshot to analyze followed by the JSON report path, or only the report path when
    /// diffing with --before/--after.
    #[arg(required = true, num_args = 1..=2, value_name = "PATH")]
    paths: Vec<PathBuf>,

    /// Snapshot of the earlier build.
    #[arg(long, requires = "after")]
    before: Option<PathBuf>,

    /// Snapshot of the later build.
    #[arg(long, requires = "before")]
    after: Option<PathBuf>,

    /// Skip COM interfaces when looking for wasteful virtuals.
    #[arg(long)]
    exclude_com_types: bool,

    /// Number of example symbols listed per template foldability item.
    #[arg(long, default_value_t = DEFAULT_EXAMPLE_SYMBOL_COUNT)]
    example_symbols: usize,

    #[arg(
        long,
        long_help = "Fail if waste exceeds this many bytes.\n\
                For a single snapshot this limits the total waste,\n\
                for a diff it limits how much waste grew."
    )]
    max_wasted_size: Option<u64>,

    #[arg(
        long,
        value_enum,
        default_value_t = LogLevel::Info,
        help = "error | warn | info | debug | trace"
    )]
    pub log_level: LogLevel,

    /// Increase logging verbosity (can be used multiple times)
    #[arg(short, long, action = ArgAction::Count)]
    pub verbose: u8,

    /// Decrease logging verbosity (can be used multiple times)
    #[arg(short, long, action = ArgAction::Count)]
    pub quiet: u8,
}

/// What the positional paths resolve to.
pub(crate) enum Input<'a> {
    Single { snapshot: &'a Path },
    Diff { before: &'a Path, after: &'a Path },
}

impl Args {
    /// Resolve the input snapshots and the report path.
    ///
    /// # Errors
    /// Returns an error if the positional paths do not match the chosen mode.
    pub(crate) fn input(&self) -> Result<(Input<'_>, &Path)> {
        match (&self.before, &self.after, self.paths.as_slice()) {
            (Some(before), Some(after), [report]) => Ok((
                Input::Diff {
                    before: before.as_path(),
                    after: after.as_path(),
                },
                report.as_path(),
            )),
            (Some(_), Some(_), _) => bail!("Expected only the report path when using --before/--after"),
            (None, None, [snapshot, report]) => Ok((
                Input::Single {
                    snapshot: snapshot.as_path(),
                },
                report.as_path(),
            )),
            _ => bail!("Expected a snapshot path and a report path"),
        }
    }

    pub(crate) fn analysis_options(&self) -> AnalysisOptions {
        AnalysisOptions {
            exclude_com_types: self.exclude_com_types,
            example_symbol_count: self.example_symbols,
        }
    }

    pub(crate) fn report_limits(&self) -> ReportLimits {
        ReportLimits {
            max_wasted_size: self.max_wasted_size,
        }
    }
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl LogLevel {
    pub(crate) fn to_filter(self) -> LevelFilter {
        match self {
            LogLevel::Error => LevelFilter::Error,
            LogLevel::Warn => LevelFilter::Warn,
            LogLevel::Info => LevelFilter::Info,
            LogLevel::Debug => LevelFilter::Debug,
            LogLevel::Trace => LevelFilter::Trace,
        }
    }
}

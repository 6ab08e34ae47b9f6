// Copyright (C) 2026 Checkmk GmbH - License: GNU General Public License v2
// This file is part of Checkmk (https://checkmk.com). It is subject to the terms and
// conditions defined in the file COPYING, which is part of this source code package.
mod args;

use anyhow::{Context, Result};
use clap::Parser;
use log::LevelFilter;
use std::fs::File;
use std::path::Path;

use args::{Args, Input, LogLevel};
use size_inspector::analysis::{
    analyze, analyze_diff, AnalysisContext, ByteSimilarity, CancellationToken, LogProgress,
};
use size_inspector::report::{summarize_report, validate_report, Report};
use size_inspector::snapshot::Snapshot;

fn main() -> Result<()> {
    let args = Args::parse();
    init_logging(args.log_level, args.verbose, args.quiet);

    let (input, report_path) = args.input()?;
    let options = args.analysis_options();
    let token = CancellationToken::new();
    let context = AnalysisContext::new(&token, &LogProgress);

    match input {
        Input::Single { snapshot } => {
            let snapshot = load_snapshot(snapshot)?;
            let analysis = analyze(&snapshot, &options, &ByteSimilarity, &context)
                .with_context(|| format!("Failed to analyze snapshot: {}", snapshot.binary()))?;
            let report = Report::single(&analysis, &options);
            finish(&report, report_path, &args)
        }
        Input::Diff { before, after } => {
            let before = load_snapshot(before)?;
            let after = load_snapshot(after)?;
            let analysis = analyze_diff(&before, &after, &options, &ByteSimilarity, &context)
                .with_context(|| {
                    format!("Failed to diff snapshots: {} -> {}", before.binary(), after.binary())
                })?;
            let report = Report::diff(&analysis, &options);
            finish(&report, report_path, &args)
        }
    }
}

fn finish(report: &Report<'_>, report_path: &Path, args: &Args) -> Result<()> {
    write_report_to_file(report, report_path)?;
    summarize_report(report);
    validate_report(report, &args.report_limits())
}

fn init_logging(base: LogLevel, verbose: u8, quiet: u8) {
    let levels = [
        LevelFilter::Error,
        LevelFilter::Warn,
        LevelFilter::Info,
        LevelFilter::Debug,
        LevelFilter::Trace,
    ];

    let base_idx = levels
        .iter()
        .position(|lvl| *lvl == base.to_filter())
        .unwrap_or(2) as i16;
    let adjusted = (base_idx + i16::from(verbose) - i16::from(quiet)).clamp(0, (levels.len() - 1) as i16) as usize;

    env_logger::Builder::from_default_env()
        .format_target(false)
        .filter_level(levels[adjusted])
        .init();
}

/// Load and validate a snapshot from a filepath.
///
/// # Errors
/// Returns an error if the file cannot be read or is not a valid snapshot.
fn load_snapshot(path: &Path) -> Result<Snapshot> {
    log::info!("Loading snapshot: snapshot={}", path.display());

    let snapshot = Snapshot::from_file(path)
        .with_context(|| format!("Failed to load snapshot: {}", path.display()))?;

    log::info!(
        "Loading completed: snapshot={}, binary={}, compilands={}, symbols={}",
        path.display(),
        snapshot.binary(),
        snapshot.compilands().len(),
        snapshot.symbols().len()
    );
    Ok(snapshot)
}

/// Write the report to a file.
///
/// # Errors
/// Returns an error if the report cannot be serialized to JSON or if the file cannot be created.
fn write_report_to_file(report: &Report<'_>, dest: &Path) -> Result<()> {
    log::info!("Writing report to file: file={}", dest.display());
    let file = File::create(dest)
        .with_context(|| format!("Failed to create JSON output file: {}", dest.display()))?;
    serde_json::to_writer_pretty(file, report)
        .with_context(|| format!("Failed to serialize report to JSON: {}", dest.display()))?;
    Ok(())
}

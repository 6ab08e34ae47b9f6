// Copyright (C) 2026 Checkmk GmbH - License: GNU General Public License v2
// This file is part of Checkmk (https://checkmk.com). It is subject to the terms and
// conditions defined in the file COPYING, which is part of this source code package.

//! A tool for analyzing where the bytes of a binary come from and how much of them are wasted.
//!
//! This crate provides functionality to:
//! - Load binary snapshots (sections, COFF groups, compilands, symbols) from JSON
//! - Attribute size to libs, compilands and source files per section and COFF group
//! - Find duplicate data, foldable template instantiations and wasteful virtuals
//! - Diff two builds and generate reports on size and waste changes

pub mod analysis;
pub mod report;
pub mod snapshot;

// Re-export key types for convenience
pub use analysis::{analyze, analyze_diff, AnalysisOptions, DiffAnalysis, SingleBinaryAnalysis};
pub use report::Report;
pub use snapshot::{Snapshot, SnapshotError};

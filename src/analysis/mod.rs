// Copyright (C) 2026 Checkmk GmbH - License: GNU General Public License v2
// This file is part of Checkmk (https://checkmk.com). It is subject to the terms and
// conditions defined in the file COPYING, which is part of this source code package.

//! Size attribution, waste analyses and their before/after diffs.

mod containers;
mod context;
mod contributions;
mod diff;
mod duplicate_data;
mod names;
mod session;
mod template_foldability;
mod wasteful_virtual;

pub use containers::{
    BinarySection, BinarySectionDiff, CoffGroup, CoffGroupDiff, Compiland, CompilandDiff, Lib,
    LibDiff, SourceFile, SourceFileDiff,
};
pub use context::{
    AnalysisContext, AnalysisError, AnalysisResult, CancellationToken, LogProgress, NoProgress,
    ProgressSink,
};
pub use contributions::{
    coff_group_diffs_in, coff_groups_in, contribution_columns, section_diffs_in, sections_in,
    Column, Container, ContainerDiff, Contribution, ContributionDiffs, Contributions,
    ContributionsBuilder,
};
pub use diff::{pair_by_key, pair_by_name, Diff, NamedEntity, PairingError, PairingResult, Side};
pub use duplicate_data::{
    diff_duplicate_data, find_duplicate_data, DuplicateDataItem, DuplicateDataItemBuilder,
    DuplicateDataItemDiff,
};
pub use names::{generic_templated_name, generic_type_name};
pub use session::{
    analyze, analyze_diff, AnalysisOptions, DiffAnalysis, SingleBinaryAnalysis, SymbolDiff,
    DEFAULT_EXAMPLE_SYMBOL_COUNT,
};
pub use template_foldability::{
    diff_template_foldability, find_template_foldability, ByteSimilarity, CodeSimilarity,
    TemplateFoldabilityItem, TemplateFoldabilityItemDiff,
};
pub use wasteful_virtual::{
    diff_wasteful_virtuals, find_wasteful_virtuals, is_com_type_name, TypeHierarchyChange,
    WastedOverride, WastedOverrideChange, WastefulVirtualItem, WastefulVirtualItemBuilder,
    WastefulVirtualItemDiff,
};

pub(crate) use contributions::{sum_of_coff_group_diffs, sum_of_section_diffs};

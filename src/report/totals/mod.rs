// Copyright (C) 2026 Checkmk GmbH - License: GNU General Public License v2
// This file is part of Checkmk (https://checkmk.com). It is subject to the terms and
// conditions defined in the file COPYING, which is part of this source code package.

//! Statistics calculation modules for container changes and waste.

mod changes;
mod waste;

use serde::Serialize;

use crate::analysis::{
    BinarySectionDiff, ContainerDiff, DiffAnalysis, NamedEntity, SingleBinaryAnalysis,
};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub(crate) enum ReportTotals {
    Single(SingleTotals),
    Diff(DiffTotals),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub(crate) struct SingleTotals {
    pub(crate) sections: usize,
    pub(crate) libs: usize,
    pub(crate) compilands: usize,
    pub(crate) source_files: usize,
    pub(crate) symbols: usize,
    pub(crate) size: u64,
    pub(crate) virtual_size: u64,
    pub(crate) waste: waste::Totals,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub(crate) struct DiffTotals {
    pub(crate) size_diff: i64,
    pub(crate) virtual_size_diff: i64,
    pub(crate) sections: changes::Totals,
    pub(crate) libs: changes::Totals,
    pub(crate) compilands: changes::Totals,
    pub(crate) source_files: changes::Totals,
    pub(crate) symbols: changes::Totals,
    pub(crate) waste: waste::DiffTotals,
}

impl ReportTotals {
    #[must_use]
    pub(crate) fn single(analysis: &SingleBinaryAnalysis) -> Self {
        Self::Single(SingleTotals {
            sections: analysis.sections().len(),
            libs: analysis.libs().len(),
            compilands: analysis.compilands().len(),
            source_files: analysis.source_files().len(),
            symbols: analysis.symbols().len(),
            size: analysis.sections().iter().map(NamedEntity::size).sum(),
            virtual_size: analysis.sections().iter().map(NamedEntity::virtual_size).sum(),
            waste: waste::Totals::calculate(analysis),
        })
    }

    #[must_use]
    pub(crate) fn diff(analysis: &DiffAnalysis) -> Self {
        Self::Diff(DiffTotals {
            size_diff: analysis.sections().iter().map(|s| s.size_diff()).sum(),
            virtual_size_diff: analysis.sections().iter().map(|s| s.virtual_size_diff()).sum(),
            sections: changes::Totals::calculate(analysis.sections(), BinarySectionDiff::diff),
            libs: changes::Totals::calculate(analysis.libs(), ContainerDiff::diff),
            compilands: changes::Totals::calculate(analysis.compilands(), ContainerDiff::diff),
            source_files: changes::Totals::calculate(analysis.source_files(), ContainerDiff::diff),
            symbols: changes::Totals::calculate(analysis.symbols(), |symbol| symbol),
            waste: waste::DiffTotals::calculate(analysis),
        })
    }
}

// Copyright (C) 2026 Checkmk GmbH - License: GNU General Public License v2
// This file is part of Checkmk (https://checkmk.com). It is subject to the terms and
// conditions defined in the file COPYING, which is part of this source code package.

//! Per-container size contributions to sections and COFF groups, and the column helpers built on them.

use indexmap::{IndexMap, IndexSet};
use serde::Serialize;
use std::fmt;

use super::context::{AnalysisError, AnalysisResult};
use super::diff::{pair_by_name, Diff, NamedEntity, PairingResult};

/// How much of a container lives inside one section or COFF group.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Contribution {
    name: String,
    size: u64,
    virtual_size: u64,
}

impl Contribution {
    fn empty(name: &str) -> Self {
        Self {
            name: name.to_string(),
            size: 0,
            virtual_size: 0,
        }
    }

    /// Accumulate raw sizes found while walking the container's symbols.
    ///
    /// # Errors
    /// Returns an error if the accumulated size no longer fits in 64 bits.
    pub fn add_raw_size(&mut self, size: u64, virtual_size: u64) -> AnalysisResult<()> {
        let (Some(size), Some(virtual_size)) = (
            self.size.checked_add(size),
            self.virtual_size.checked_add(virtual_size),
        ) else {
            return Err(AnalysisError::Sanity {
                what: format!("size of contribution to {} overflows", self.name),
            });
        };
        self.size = size;
        self.virtual_size = virtual_size;
        Ok(())
    }
}

impl NamedEntity for Contribution {
    fn name(&self) -> &str {
        &self.name
    }

    fn size(&self) -> u64 {
        self.size
    }

    fn virtual_size(&self) -> u64 {
        self.virtual_size
    }
}

/// Contributions of a container still under construction.
#[derive(Debug, Default)]
pub struct ContributionsBuilder {
    sections: IndexMap<String, Contribution>,
    coff_groups: IndexMap<String, Contribution>,
}

impl ContributionsBuilder {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Return the contribution to `section`, inserting a zero-sized one on first use.
    pub fn get_or_create_section_contribution(&mut self, section: &str) -> &mut Contribution {
        self.sections
            .entry(section.to_string())
            .or_insert_with(|| Contribution::empty(section))
    }

    /// Return the contribution to `coff_group`, inserting a zero-sized one on first use.
    pub fn get_or_create_coff_group_contribution(&mut self, coff_group: &str) -> &mut Contribution {
        self.coff_groups
            .entry(coff_group.to_string())
            .or_insert_with(|| Contribution::empty(coff_group))
    }

    /// Freeze the contribution maps. No contributions can be added afterwards.
    #[must_use]
    pub fn mark_fully_constructed(self) -> Contributions {
        Contributions {
            sections: self.sections,
            coff_groups: self.coff_groups,
        }
    }
}

/// Sealed contributions of a container, keyed by section and COFF group name in first-seen order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Contributions {
    sections: IndexMap<String, Contribution>,
    coff_groups: IndexMap<String, Contribution>,
}

impl Contributions {
    #[must_use]
    pub fn section(&self, name: &str) -> Option<&Contribution> {
        self.sections.get(name)
    }

    #[must_use]
    pub fn coff_group(&self, name: &str) -> Option<&Contribution> {
        self.coff_groups.get(name)
    }

    pub fn sections(&self) -> impl Iterator<Item = &Contribution> {
        self.sections.values()
    }

    pub fn coff_groups(&self) -> impl Iterator<Item = &Contribution> {
        self.coff_groups.values()
    }

    /// Size inside `section`, 0 if the container does not contribute to it.
    #[must_use]
    pub fn section_size(&self, name: &str) -> u64 {
        self.section(name).map_or(0, Contribution::size)
    }

    /// Size inside `coff_group`, 0 if the container does not contribute to it.
    #[must_use]
    pub fn coff_group_size(&self, name: &str) -> u64 {
        self.coff_group(name).map_or(0, Contribution::size)
    }

    #[must_use]
    pub fn total_size(&self) -> u64 {
        self.sections.values().map(Contribution::size).fold(0, u64::saturating_add)
    }

    #[must_use]
    pub fn total_virtual_size(&self) -> u64 {
        self.sections.values().map(Contribution::virtual_size).fold(0, u64::saturating_add)
    }
}

/// Contributions paired between two builds of one container.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ContributionDiffs {
    sections: IndexMap<String, Diff<Contribution>>,
    coff_groups: IndexMap<String, Diff<Contribution>>,
}

impl ContributionDiffs {
    /// Pair the contributions of a container diff. Missing sides contribute nothing.
    pub(crate) fn new(before: Option<&Contributions>, after: Option<&Contributions>) -> PairingResult<Self> {
        let sections = pair_by_name(
            before.map(|c| c.sections().cloned().collect()).unwrap_or_default(),
            after.map(|c| c.sections().cloned().collect()).unwrap_or_default(),
        )?;
        let coff_groups = pair_by_name(
            before.map(|c| c.coff_groups().cloned().collect()).unwrap_or_default(),
            after.map(|c| c.coff_groups().cloned().collect()).unwrap_or_default(),
        )?;
        Ok(Self {
            sections: sections
                .into_iter()
                .map(|diff| (diff.name().to_string(), diff))
                .collect(),
            coff_groups: coff_groups
                .into_iter()
                .map(|diff| (diff.name().to_string(), diff))
                .collect(),
        })
    }

    #[must_use]
    pub fn section(&self, name: &str) -> Option<&Diff<Contribution>> {
        self.sections.get(name)
    }

    #[must_use]
    pub fn coff_group(&self, name: &str) -> Option<&Diff<Contribution>> {
        self.coff_groups.get(name)
    }

    pub fn sections(&self) -> impl Iterator<Item = &Diff<Contribution>> {
        self.sections.values()
    }

    pub fn coff_groups(&self) -> impl Iterator<Item = &Diff<Contribution>> {
        self.coff_groups.values()
    }

    /// Size diff inside `section`, 0 if neither side contributes to it.
    #[must_use]
    pub fn section_size_diff(&self, name: &str) -> i64 {
        self.section(name).map_or(0, Diff::size_diff)
    }

    /// Size diff inside `coff_group`, 0 if neither side contributes to it.
    #[must_use]
    pub fn coff_group_size_diff(&self, name: &str) -> i64 {
        self.coff_group(name).map_or(0, Diff::size_diff)
    }

    #[must_use]
    pub fn section_virtual_size_diff(&self, name: &str) -> i64 {
        self.section(name).map_or(0, Diff::virtual_size_diff)
    }

    #[must_use]
    pub fn coff_group_virtual_size_diff(&self, name: &str) -> i64 {
        self.coff_group(name).map_or(0, Diff::virtual_size_diff)
    }
}

/// A container of contributions (lib, compiland, source file).
pub trait Container: NamedEntity {
    fn contributions(&self) -> &Contributions;
}

/// A container paired between two builds, with its paired contribution maps.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(bound(serialize = "T: NamedEntity + Serialize"))]
pub struct ContainerDiff<T> {
    #[serde(flatten)]
    diff: Diff<T>,
    contributions: ContributionDiffs,
}

impl<T: Container> ContainerDiff<T> {
    pub(crate) fn new(diff: Diff<T>) -> PairingResult<Self> {
        let contributions = ContributionDiffs::new(
            diff.before().map(Container::contributions),
            diff.after().map(Container::contributions),
        )?;
        Ok(Self {
            diff,
            contributions,
        })
    }

    #[must_use]
    pub fn name(&self) -> &str {
        self.diff.name()
    }

    #[must_use]
    pub fn size_diff(&self) -> i64 {
        self.diff.size_diff()
    }

    #[must_use]
    pub fn virtual_size_diff(&self) -> i64 {
        self.diff.virtual_size_diff()
    }
}

impl<T> ContainerDiff<T> {
    #[must_use]
    pub fn diff(&self) -> &Diff<T> {
        &self.diff
    }

    #[must_use]
    pub fn before(&self) -> Option<&T> {
        self.diff.before()
    }

    #[must_use]
    pub fn after(&self) -> Option<&T> {
        self.diff.after()
    }

    #[must_use]
    pub fn contribution_diffs(&self) -> &ContributionDiffs {
        &self.contributions
    }
}

/// Distinct sections referenced by at least one container, in first-seen order.
pub fn sections_in<'a, C, I>(containers: I) -> IndexSet<&'a str>
where
    C: Container + 'a,
    I: IntoIterator<Item = &'a C>,
{
    containers
        .into_iter()
        .flat_map(|c| c.contributions().sections().map(NamedEntity::name))
        .collect()
}

/// Distinct COFF groups referenced by at least one container, in first-seen order.
pub fn coff_groups_in<'a, C, I>(containers: I) -> IndexSet<&'a str>
where
    C: Container + 'a,
    I: IntoIterator<Item = &'a C>,
{
    containers
        .into_iter()
        .flat_map(|c| c.contributions().coff_groups().map(NamedEntity::name))
        .collect()
}

/// Distinct sections referenced by at least one container diff.
///
/// With `significant_only`, a section is kept only if some row changed in size or virtual size.
pub fn section_diffs_in<'a, T, I>(diffs: I, significant_only: bool) -> IndexSet<&'a str>
where
    T: 'a,
    I: IntoIterator<Item = &'a ContainerDiff<T>>,
{
    diffs
        .into_iter()
        .flat_map(|d| d.contribution_diffs().sections())
        .filter(|diff| !significant_only || is_significant(diff))
        .map(Diff::name)
        .collect()
}

/// Distinct COFF groups referenced by at least one container diff.
///
/// With `significant_only`, a group is kept only if some row changed in size or virtual size.
pub fn coff_group_diffs_in<'a, T, I>(diffs: I, significant_only: bool) -> IndexSet<&'a str>
where
    T: 'a,
    I: IntoIterator<Item = &'a ContainerDiff<T>>,
{
    diffs
        .into_iter()
        .flat_map(|d| d.contribution_diffs().coff_groups())
        .filter(|diff| !significant_only || is_significant(diff))
        .map(Diff::name)
        .collect()
}

fn is_significant(diff: &Diff<Contribution>) -> bool {
    diff.size_diff() != 0 || diff.virtual_size_diff() != 0
}

/// A dynamic table column for a section or COFF group.
///
/// Sections and COFF groups can share a bare name (both may be called `.rsrc`), so every
/// label carries its kind as a prefix.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Column<'a> {
    Section(&'a str),
    CoffGroup(&'a str),
}

impl fmt::Display for Column<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Column::Section(name) => write!(f, "Section: {name}"),
            Column::CoffGroup(name) => write!(f, "COFF Group: {name}"),
        }
    }
}

impl Column<'_> {
    /// Size of a container in this column.
    #[must_use]
    pub fn size_of(&self, contributions: &Contributions) -> u64 {
        match self {
            Column::Section(name) => contributions.section_size(name),
            Column::CoffGroup(name) => contributions.coff_group_size(name),
        }
    }

    /// Size diff of a container diff in this column.
    #[must_use]
    pub fn size_diff_of(&self, diffs: &ContributionDiffs) -> i64 {
        match self {
            Column::Section(name) => diffs.section_size_diff(name),
            Column::CoffGroup(name) => diffs.coff_group_size_diff(name),
        }
    }
}

/// Full column list, sections first, then COFF groups.
#[must_use]
pub fn contribution_columns<'a>(
    sections: &IndexSet<&'a str>,
    coff_groups: &IndexSet<&'a str>,
) -> Vec<Column<'a>> {
    sections
        .iter()
        .map(|name| Column::Section(*name))
        .chain(coff_groups.iter().map(|name| Column::CoffGroup(*name)))
        .collect()
}

/// Sum of the section contribution diffs, which must equal the container's own size diff.
#[must_use]
pub(crate) fn sum_of_section_diffs(diffs: &ContributionDiffs) -> i64 {
    diffs.sections().map(Diff::size_diff).fold(0, i64::saturating_add)
}

/// Sum of the COFF group contribution diffs, which must equal the container's own size diff.
#[must_use]
pub(crate) fn sum_of_coff_group_diffs(diffs: &ContributionDiffs) -> i64 {
    diffs.coff_groups().map(Diff::size_diff).fold(0, i64::saturating_add)
}

// Copyright (C) 2026 Checkmk GmbH - License: GNU General Public License v2
// This file is part of Checkmk (https://checkmk.com). It is subject to the terms and
// conditions defined in the file COPYING, which is part of this source code package.

//! Sections, COFF groups, libs, compilands and source files aggregated from a snapshot.

use indexmap::{IndexMap, IndexSet};
use serde::Serialize;

use super::context::{AnalysisContext, AnalysisError, AnalysisResult};
use super::contributions::{
    sum_of_coff_group_diffs, sum_of_section_diffs, Container, ContainerDiff, Contributions,
    ContributionsBuilder,
};
use super::diff::{pair_by_name, Diff, NamedEntity, PairingResult};
use crate::snapshot::{ContributionRecord, SectionRecord, Snapshot};

pub type LibDiff = ContainerDiff<Lib>;
pub type CompilandDiff = ContainerDiff<Compiland>;
pub type SourceFileDiff = ContainerDiff<SourceFile>;
pub type CoffGroupDiff = Diff<CoffGroup>;

/// Final path component of a name, splitting on both separator styles.
#[must_use]
pub(crate) fn short_name(name: &str) -> &str {
    name.rsplit(['/', '\\']).next().unwrap_or(name)
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CoffGroup {
    name: String,
    section: String,
    size: u64,
    virtual_size: u64,
}

impl CoffGroup {
    /// Name of the section this group lives in.
    #[must_use]
    pub fn section(&self) -> &str {
        &self.section
    }
}

impl NamedEntity for CoffGroup {
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

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BinarySection {
    name: String,
    size: u64,
    virtual_size: u64,
    coff_groups: Vec<CoffGroup>,
}

impl BinarySection {
    fn from_record(record: &SectionRecord) -> Self {
        Self {
            name: record.name.clone(),
            size: record.size,
            virtual_size: record.virtual_size,
            coff_groups: record
                .coff_groups
                .iter()
                .map(|group| CoffGroup {
                    name: group.name.clone(),
                    section: record.name.clone(),
                    size: group.size,
                    virtual_size: group.virtual_size,
                })
                .collect(),
        }
    }

    #[must_use]
    pub fn coff_groups(&self) -> &[CoffGroup] {
        &self.coff_groups
    }
}

impl NamedEntity for BinarySection {
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

/// A section paired between two builds, with its COFF groups paired as well.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BinarySectionDiff {
    #[serde(flatten)]
    diff: Diff<BinarySection>,
    coff_groups: IndexMap<String, CoffGroupDiff>,
}

impl BinarySectionDiff {
    fn new(diff: Diff<BinarySection>) -> PairingResult<Self> {
        let groups_of = |section: Option<&BinarySection>| {
            section.map(|s| s.coff_groups.clone()).unwrap_or_default()
        };
        let coff_groups = pair_by_name(groups_of(diff.before()), groups_of(diff.after()))?
            .into_iter()
            .map(|group| (group.name().to_string(), group))
            .collect();
        Ok(Self { diff, coff_groups })
    }

    #[must_use]
    pub fn name(&self) -> &str {
        self.diff.name()
    }

    #[must_use]
    pub fn diff(&self) -> &Diff<BinarySection> {
        &self.diff
    }

    #[must_use]
    pub fn size_diff(&self) -> i64 {
        self.diff.size_diff()
    }

    #[must_use]
    pub fn virtual_size_diff(&self) -> i64 {
        self.diff.virtual_size_diff()
    }

    #[must_use]
    pub fn coff_group(&self, name: &str) -> Option<&CoffGroupDiff> {
        self.coff_groups.get(name)
    }

    pub fn coff_groups(&self) -> impl Iterator<Item = &CoffGroupDiff> {
        self.coff_groups.values()
    }
}

/// A static library; its contributions are the sum of its compilands'.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Lib {
    name: String,
    short_name: String,
    compilands: IndexSet<String>,
    contributions: Contributions,
}

impl Lib {
    #[must_use]
    pub fn short_name(&self) -> &str {
        &self.short_name
    }

    /// Names of the compilands linked from this lib.
    pub fn compilands(&self) -> impl Iterator<Item = &str> {
        self.compilands.iter().map(String::as_str)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Compiland {
    name: String,
    short_name: String,
    lib: String,
    contributions: Contributions,
}

impl Compiland {
    #[must_use]
    pub fn short_name(&self) -> &str {
        &self.short_name
    }

    /// Name of the lib this compiland was linked from.
    #[must_use]
    pub fn lib(&self) -> &str {
        &self.lib
    }

    #[cfg(test)]
    /// Create a compiland from already sealed contributions.
    /// This is only available in test builds.
    pub(crate) fn new_for_testing(name: &str, lib: &str, contributions: Contributions) -> Self {
        Self {
            name: name.to_string(),
            short_name: short_name(name).to_string(),
            lib: lib.to_string(),
            contributions,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SourceFile {
    name: String,
    short_name: String,
    contributions: Contributions,
}

impl SourceFile {
    #[must_use]
    pub fn short_name(&self) -> &str {
        &self.short_name
    }
}

macro_rules! impl_container {
    ($($container:ty),*) => {
        $(
            impl NamedEntity for $container {
                fn name(&self) -> &str {
                    &self.name
                }

                fn size(&self) -> u64 {
                    self.contributions.total_size()
                }

                fn virtual_size(&self) -> u64 {
                    self.contributions.total_virtual_size()
                }
            }

            impl Container for $container {
                fn contributions(&self) -> &Contributions {
                    &self.contributions
                }
            }
        )*
    };
}

impl_container!(Lib, Compiland, SourceFile);

fn accumulate(builder: &mut ContributionsBuilder, records: &[ContributionRecord]) -> AnalysisResult<()> {
    for record in records {
        builder
            .get_or_create_section_contribution(&record.section)
            .add_raw_size(record.size, record.virtual_size)?;
        builder
            .get_or_create_coff_group_contribution(&record.coff_group)
            .add_raw_size(record.size, record.virtual_size)?;
    }
    Ok(())
}

fn merge(builder: &mut ContributionsBuilder, contributions: &Contributions) -> AnalysisResult<()> {
    for section in contributions.sections() {
        builder
            .get_or_create_section_contribution(section.name())
            .add_raw_size(section.size(), section.virtual_size())?;
    }
    for group in contributions.coff_groups() {
        builder
            .get_or_create_coff_group_contribution(group.name())
            .add_raw_size(group.size(), group.virtual_size())?;
    }
    Ok(())
}

#[must_use]
pub(crate) fn build_sections(snapshot: &Snapshot) -> Vec<BinarySection> {
    snapshot
        .sections()
        .iter()
        .map(BinarySection::from_record)
        .collect()
}

/// Aggregate each compiland's contribution records into sealed contribution maps.
///
/// # Errors
/// Returns an error if the pass is canceled or a contribution size overflows.
pub(crate) fn build_compilands(snapshot: &Snapshot, context: &AnalysisContext<'_>) -> AnalysisResult<Vec<Compiland>> {
    let records = snapshot.compilands();
    let mut sweep = context.sweep("Aggregating compiland contributions", records.len() as u64);
    let mut compilands = Vec::with_capacity(records.len());
    for record in records {
        sweep.advance(1)?;
        let mut builder = ContributionsBuilder::new();
        accumulate(&mut builder, &record.contributions)?;
        compilands.push(Compiland {
            name: record.name.clone(),
            short_name: short_name(&record.name).to_string(),
            lib: record.lib.clone(),
            contributions: builder.mark_fully_constructed(),
        });
    }
    sweep.finish(compilands.len());
    Ok(compilands)
}

/// Group compilands by lib in first-seen order and sum their contributions.
///
/// # Errors
/// Returns an error if the pass is canceled or a lib's summed size overflows.
pub(crate) fn build_libs(compilands: &[Compiland], context: &AnalysisContext<'_>) -> AnalysisResult<Vec<Lib>> {
    let mut sweep = context.sweep("Aggregating lib contributions", compilands.len() as u64);
    let mut builders: IndexMap<&str, (IndexSet<String>, ContributionsBuilder)> = IndexMap::new();
    for compiland in compilands {
        sweep.advance(1)?;
        let (members, builder) = builders.entry(compiland.lib.as_str()).or_default();
        members.insert(compiland.name.clone());
        merge(builder, &compiland.contributions)?;
    }
    let libs: Vec<Lib> = builders
        .into_iter()
        .map(|(name, (compilands, builder))| Lib {
            name: name.to_string(),
            short_name: short_name(name).to_string(),
            compilands,
            contributions: builder.mark_fully_constructed(),
        })
        .collect();
    sweep.finish(libs.len());
    Ok(libs)
}

/// # Errors
/// Returns an error if the pass is canceled or a contribution size overflows.
pub(crate) fn build_source_files(snapshot: &Snapshot, context: &AnalysisContext<'_>) -> AnalysisResult<Vec<SourceFile>> {
    let records = snapshot.source_files();
    let mut sweep = context.sweep("Aggregating source file contributions", records.len() as u64);
    let mut source_files = Vec::with_capacity(records.len());
    for record in records {
        sweep.advance(1)?;
        let mut builder = ContributionsBuilder::new();
        accumulate(&mut builder, &record.contributions)?;
        source_files.push(SourceFile {
            name: record.name.clone(),
            short_name: short_name(&record.name).to_string(),
            contributions: builder.mark_fully_constructed(),
        });
    }
    sweep.finish(source_files.len());
    Ok(source_files)
}

/// Check that `containers` together fit inside every section and COFF group of the binary.
///
/// # Errors
/// Returns a sanity error if the summed contributions overflow or exceed a section or
/// COFF group.
pub(crate) fn check_coverage<C: Container>(
    kind: &str,
    sections: &[BinarySection],
    containers: &[C],
) -> AnalysisResult<()> {
    let mut builder = ContributionsBuilder::new();
    for container in containers {
        merge(&mut builder, container.contributions())?;
    }
    let totals = builder.mark_fully_constructed();
    for section in sections {
        let contributed = totals.section_size(section.name());
        if contributed > section.size() {
            return Err(AnalysisError::Sanity {
                what: format!(
                    "{kind} contributions to section {} sum to {contributed}, section size is {}",
                    section.name(),
                    section.size()
                ),
            });
        }
        for group in section.coff_groups() {
            let contributed = totals.coff_group_size(group.name());
            if contributed > group.size() {
                return Err(AnalysisError::Sanity {
                    what: format!(
                        "{kind} contributions to COFF group {} sum to {contributed}, group size is {}",
                        group.name(),
                        group.size()
                    ),
                });
            }
        }
    }
    Ok(())
}

/// Check that every container's contribution diffs add up to its own size diff.
///
/// # Errors
/// Returns a sanity error naming the first container whose sums disagree.
pub(crate) fn check_contribution_sums<T: Container>(kind: &str, diffs: &[ContainerDiff<T>]) -> AnalysisResult<()> {
    for diff in diffs {
        let size_diff = diff.size_diff();
        let sections = sum_of_section_diffs(diff.contribution_diffs());
        let coff_groups = sum_of_coff_group_diffs(diff.contribution_diffs());
        if sections != size_diff || coff_groups != size_diff {
            return Err(AnalysisError::Sanity {
                what: format!(
                    "{kind} {} changed by {size_diff}, its sections by {sections}, its COFF groups by {coff_groups}",
                    diff.name()
                ),
            });
        }
    }
    Ok(())
}

/// # Errors
/// Returns an error if a section name is duplicated on either side.
pub(crate) fn diff_sections(before: Vec<BinarySection>, after: Vec<BinarySection>) -> PairingResult<Vec<BinarySectionDiff>> {
    pair_by_name(before, after)?
        .into_iter()
        .map(BinarySectionDiff::new)
        .collect()
}

/// Pair containers by name and pair their contributions.
///
/// # Errors
/// Returns an error if the pass is canceled or a name is duplicated on either side.
pub(crate) fn diff_containers<T: Container>(
    task: &'static str,
    before: Vec<T>,
    after: Vec<T>,
    context: &AnalysisContext<'_>,
) -> AnalysisResult<Vec<ContainerDiff<T>>> {
    let pairs = pair_by_name(before, after)?;
    let mut sweep = context.sweep(task, pairs.len() as u64);
    let mut diffs = Vec::with_capacity(pairs.len());
    for pair in pairs {
        sweep.advance(1)?;
        diffs.push(ContainerDiff::new(pair)?);
    }
    sweep.finish(diffs.len());
    Ok(diffs)
}

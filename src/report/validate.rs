// Copyright (C) 2026 Checkmk GmbH - License: GNU General Public License v2
// This file is part of Checkmk (https://checkmk.com). It is subject to the terms and
// conditions defined in the file COPYING, which is part of this source code package.

//! Validates reports against waste limits and contribution consistency.

use super::{Report, ReportAnalysis};
use crate::analysis::{
    sum_of_coff_group_diffs, sum_of_section_diffs, BinarySection, Container, ContainerDiff, DiffAnalysis,
    NamedEntity, SingleBinaryAnalysis,
};
use anyhow::Result;

/// Limits a report must stay within.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReportLimits {
    /// Maximum total waste for a single binary, or maximum waste growth between two builds.
    pub max_wasted_size: Option<u64>,
}

/// Validate the report.
///
/// # Errors
/// Returns an error if the contribution totals are inconsistent or the waste exceeds
/// `limits.max_wasted_size`.
pub fn validate_report(report: &Report<'_>, limits: &ReportLimits) -> Result<()> {
    let inconsistencies = match report.analysis {
        ReportAnalysis::Single(analysis) => check_single(analysis),
        ReportAnalysis::Diff(analysis) => check_diff(analysis),
    };
    if inconsistencies > 0 {
        return Err(anyhow::anyhow!(
            "Inconsistent contributions found in the report: {inconsistencies} inconsistencies"
        ));
    }

    if let Some(max_wasted_size) = limits.max_wasted_size {
        let wasted_size = report.wasted_size();
        if wasted_size > i64::try_from(max_wasted_size).unwrap_or(i64::MAX) {
            return Err(anyhow::anyhow!(
                "Wasted size exceeds the limit: {wasted_size} bytes, limit {max_wasted_size} bytes"
            ));
        }
    }
    Ok(())
}

/// Every container must account for the same bytes by section and by COFF group, and
/// compilands and source files must fit inside each section and COFF group.
fn check_single(analysis: &SingleBinaryAnalysis) -> usize {
    check_containers(analysis.libs())
        + check_containers(analysis.compilands())
        + check_containers(analysis.source_files())
        + check_section_bounds("compilands", analysis.sections(), analysis.compilands())
        + check_section_bounds("source files", analysis.sections(), analysis.source_files())
}

fn checked_sum(mut sizes: impl Iterator<Item = u64>) -> Option<u64> {
    sizes.try_fold(0u64, u64::checked_add)
}

fn describe(sum: Option<u64>) -> String {
    sum.map_or_else(|| "more than 64 bits".to_string(), |sum| sum.to_string())
}

fn check_containers<C: Container>(containers: &[C]) -> usize {
    let mut inconsistencies = 0;
    for container in containers {
        let contributions = container.contributions();
        let sections = checked_sum(contributions.sections().map(NamedEntity::size));
        let coff_groups = checked_sum(contributions.coff_groups().map(NamedEntity::size));
        let size = Some(container.size());
        if sections != size || coff_groups != size {
            log::debug!(
                "Inconsistent contributions: name={}, size={}, sections={sections:?}, coff_groups={coff_groups:?}",
                container.name(),
                container.size()
            );
            eprintln!(
                "ERROR: {}: size {} but sections sum to {} and COFF groups to {}",
                container.name(),
                container.size(),
                describe(sections),
                describe(coff_groups)
            );
            inconsistencies += 1;
        }
    }
    inconsistencies
}

fn check_section_bounds<C: Container>(kind: &str, sections: &[BinarySection], containers: &[C]) -> usize {
    let mut inconsistencies = 0;
    let mut check = |location: String, contributed: Option<u64>, size: u64| {
        if contributed.is_some_and(|contributed| contributed <= size) {
            return;
        }
        eprintln!(
            "ERROR: {location}: {kind} contribute {} bytes but it holds {size} bytes",
            describe(contributed)
        );
        inconsistencies += 1;
    };
    for section in sections {
        let contributed = checked_sum(containers.iter().map(|c| c.contributions().section_size(section.name())));
        check(format!("Section {}", section.name()), contributed, section.size());
        for group in section.coff_groups() {
            let contributed = checked_sum(containers.iter().map(|c| c.contributions().coff_group_size(group.name())));
            check(format!("COFF group {}", group.name()), contributed, group.size());
        }
    }
    inconsistencies
}

fn check_diff(analysis: &DiffAnalysis) -> usize {
    check_container_diffs(analysis.libs())
        + check_container_diffs(analysis.compilands())
        + check_container_diffs(analysis.source_files())
        + check_section_round_trip(analysis)
}

/// Every container's contribution diffs must add up to its own size diff.
fn check_container_diffs<T: Container>(diffs: &[ContainerDiff<T>]) -> usize {
    let mut inconsistencies = 0;
    for diff in diffs {
        let expected = diff.size_diff();
        let sections = sum_of_section_diffs(diff.contribution_diffs());
        let coff_groups = sum_of_coff_group_diffs(diff.contribution_diffs());
        if sections != expected || coff_groups != expected {
            log::debug!(
                "Inconsistent contribution diffs: name={}, size_diff={expected}, sections={sections}, coff_groups={coff_groups}",
                diff.name()
            );
            eprintln!(
                "ERROR: {}: size diff {expected} but sections sum to {sections} and COFF groups to {coff_groups}",
                diff.name()
            );
            inconsistencies += 1;
        }
    }
    inconsistencies
}

/// The compilands' size diffs within a section or COFF group must add up to its own size diff.
fn check_section_round_trip(analysis: &DiffAnalysis) -> usize {
    let compilands = analysis.compilands();
    let mut inconsistencies = 0;
    let mut check = |location: String, expected: i64, summed: i64| {
        if summed == expected {
            return;
        }
        log::debug!("Inconsistent section diff: location={location}, size_diff={expected}, compilands={summed}");
        eprintln!("ERROR: {location}: size diff {expected} but compiland diffs sum to {summed}");
        inconsistencies += 1;
    };
    for section in analysis.sections() {
        let sum = compilands
            .iter()
            .map(|c| c.contribution_diffs().section_size_diff(section.name()))
            .fold(0, i64::saturating_add);
        check(format!("Section {}", section.name()), section.size_diff(), sum);
        for group in section.coff_groups() {
            let sum = compilands
                .iter()
                .map(|c| c.contribution_diffs().coff_group_size_diff(group.name()))
                .fold(0, i64::saturating_add);
            check(format!("COFF group {}", group.name()), group.size_diff(), sum);
        }
    }
    inconsistencies
}

// Copyright (C) 2026 Checkmk GmbH - License: GNU General Public License v2
// This file is part of Checkmk (https://checkmk.com). It is subject to the terms and
// conditions defined in the file COPYING, which is part of this source code package.

//! Formats and prints report summaries to the console.

use comfy_table::{Cell, Table};

use super::totals::{DiffTotals, ReportTotals, SingleTotals};
use super::utils::{format_percentage, format_signed, shorten};
use super::{Report, ReportAnalysis};
use crate::analysis::{
    coff_group_diffs_in, contribution_columns, section_diffs_in, Column, Container,
    ContainerDiff, DiffAnalysis, NamedEntity, SingleBinaryAnalysis,
};

/// Rows shown per table; the JSON report carries everything.
const MAX_ROWS: usize = 20;
const MAX_NAME_WIDTH: usize = 60;

/// Summarize the report to the console.
///
/// Prints the binary name, the size totals and tables for the largest contributors and
/// the waste analyses.
pub fn summarize_report(report: &Report<'_>) {
    println!("Binary: {}", report.binary);
    match (&report.analysis, &report.totals) {
        (ReportAnalysis::Single(analysis), ReportTotals::Single(totals)) => {
            summarize_single(analysis, totals, report.example_symbol_count);
        }
        (ReportAnalysis::Diff(analysis), ReportTotals::Diff(totals)) => {
            summarize_diff(analysis, totals);
        }
        _ => log::warn!("Report totals do not match the analysis mode"),
    }
}

fn summarize_single(analysis: &SingleBinaryAnalysis, totals: &SingleTotals, example_symbol_count: usize) {
    println!(
        "Total size: {} bytes ({} bytes in memory)\n",
        totals.size, totals.virtual_size
    );
    println!("{}\n", section_table(analysis));
    if !analysis.libs().is_empty() {
        println!("{}\n", container_table("Lib", analysis.libs(), &analysis.lib_columns()));
    }
    println!("{}\n", waste_table(totals));
    if !analysis.template_foldability().is_empty() {
        println!("{}\n", template_foldability_table(analysis, example_symbol_count));
    }
    if !analysis.wasteful_virtuals().is_empty() {
        println!("{}\n", wasteful_virtual_table(analysis));
    }
}

fn summarize_diff(analysis: &DiffAnalysis, totals: &DiffTotals) {
    println!(
        "Size diff: {} bytes ({} bytes in memory)\n",
        format_signed(totals.size_diff),
        format_signed(totals.virtual_size_diff)
    );
    println!("{}\n", section_diff_table(analysis));
    println!("{}\n", change_table(totals));

    let changed: Vec<_> = analysis
        .compilands()
        .iter()
        .filter(|diff| diff.size_diff() != 0 || diff.virtual_size_diff() != 0)
        .collect();
    if !changed.is_empty() {
        println!("{}\n", container_diff_table("Compiland", &changed));
    }
    println!("{}\n", waste_diff_table(totals));
    if !analysis.wasteful_virtuals().is_empty() {
        println!("{}\n", wasteful_virtual_diff_table(analysis));
    }
}

/// Create a table with the default preset styling.
fn default_table_preset() -> Table {
    let mut table = Table::new();
    table
        .load_preset(comfy_table::presets::UTF8_FULL_CONDENSED)
        .apply_modifier(comfy_table::modifiers::UTF8_ROUND_CORNERS)
        .set_content_arrangement(comfy_table::ContentArrangement::Dynamic);
    table
}

fn header<I, S>(titles: I) -> Vec<Cell>
where
    I: IntoIterator<Item = S>,
    S: ToString,
{
    titles
        .into_iter()
        .map(|title| Cell::new(title.to_string()).add_attribute(comfy_table::Attribute::Bold))
        .collect()
}

/// Create a table showing the size of every section.
fn section_table(analysis: &SingleBinaryAnalysis) -> Table {
    let mut table = default_table_preset();
    table.set_header(header(["Section", "Size", "Virtual Size", "COFF Groups"]));
    for section in analysis.sections() {
        table.add_row(vec![
            Cell::new(section.name()),
            Cell::new(section.size()),
            Cell::new(section.virtual_size()),
            Cell::new(section.coff_groups().len()),
        ]);
    }
    table
}

/// Create a table of the largest containers with one column per section and COFF group.
fn container_table<C: Container>(kind: &str, containers: &[C], columns: &[Column<'_>]) -> Table {
    let mut rows: Vec<&C> = containers.iter().collect();
    rows.sort_by_key(|container| std::cmp::Reverse(container.size()));

    let mut table = default_table_preset();
    table.set_header(header(
        [kind.to_string(), "Size".to_string()]
            .into_iter()
            .chain(columns.iter().map(ToString::to_string)),
    ));
    for container in rows.into_iter().take(MAX_ROWS) {
        let mut row = vec![
            Cell::new(shorten(container.name(), MAX_NAME_WIDTH)),
            Cell::new(container.size()),
        ];
        row.extend(
            columns
                .iter()
                .map(|column| Cell::new(column.size_of(container.contributions()))),
        );
        table.add_row(row);
    }
    table
}

/// Create a table showing the waste found by each analysis.
fn waste_table(totals: &SingleTotals) -> Table {
    let waste = &totals.waste;
    let mut table = default_table_preset();
    table
        .set_header(header(["Waste", "Items", "Wasted Size"]))
        .add_row(vec![
            Cell::new("Duplicate data"),
            Cell::new(waste.duplicate_data_items),
            Cell::new(waste.duplicate_data_wasted_size),
        ])
        .add_row(vec![
            Cell::new("Template foldability"),
            Cell::new(waste.template_foldability_items),
            Cell::new(waste.template_foldability_wasted_size),
        ])
        .add_row(vec![
            Cell::new("Wasteful virtuals"),
            Cell::new(waste.wasteful_virtual_items),
            Cell::new(waste.wasteful_virtual_wasted_size),
        ])
        .add_row(vec![
            Cell::new("Total").add_attribute(comfy_table::Attribute::Bold),
            Cell::new(waste.duplicate_data_items + waste.template_foldability_items + waste.wasteful_virtual_items)
                .add_attribute(comfy_table::Attribute::Bold),
            Cell::new(waste.total_wasted_size).add_attribute(comfy_table::Attribute::Bold),
        ]);
    table
}

fn template_foldability_table(analysis: &SingleBinaryAnalysis, example_symbol_count: usize) -> Table {
    let mut items: Vec<_> = analysis.template_foldability().iter().collect();
    items.sort_by_key(|item| std::cmp::Reverse(item.wasted_size()));

    let mut table = default_table_preset();
    table.set_header(header(["Template", "Wasted Size", "Similarity", "Examples"]));
    for item in items.into_iter().take(MAX_ROWS) {
        table.add_row(vec![
            Cell::new(shorten(item.template_name(), MAX_NAME_WIDTH)),
            Cell::new(item.wasted_size()),
            Cell::new(format_percentage(item.percentage_similarity())),
            Cell::new(item.example_symbol_names(example_symbol_count).join("\n")),
        ]);
    }
    table
}

fn wasteful_virtual_table(analysis: &SingleBinaryAnalysis) -> Table {
    let mut items: Vec<_> = analysis.wasteful_virtuals().iter().collect();
    items.sort_by_key(|item| std::cmp::Reverse(item.wasted_size()));

    let mut table = default_table_preset();
    table.set_header(header(["Type", "COM", "Derived Types", "Wasted Slots", "Wasted Size"]));
    for item in items.into_iter().take(MAX_ROWS) {
        table.add_row(vec![
            Cell::new(shorten(item.type_name(), MAX_NAME_WIDTH)),
            Cell::new(if item.is_com_type() { "yes" } else { "no" }),
            Cell::new(item.derived_types().len()),
            Cell::new(item.wasted_overrides().count()),
            Cell::new(item.wasted_size()),
        ]);
    }
    table
}

fn section_diff_table(analysis: &DiffAnalysis) -> Table {
    let mut table = default_table_preset();
    table.set_header(header(["Section", "Before", "After", "Size Diff", "Virtual Size Diff"]));
    for section in analysis.sections() {
        let diff = section.diff();
        table.add_row(vec![
            Cell::new(section.name()),
            Cell::new(diff.before().map_or(0, NamedEntity::size)),
            Cell::new(diff.after().map_or(0, NamedEntity::size)),
            Cell::new(format_signed(section.size_diff())),
            Cell::new(format_signed(section.virtual_size_diff())),
        ]);
    }
    table
}

/// Create a table showing how many entities were added, removed or resized.
fn change_table(totals: &DiffTotals) -> Table {
    let mut table = default_table_preset();
    table.set_header(header(["Kind", "Added", "Removed", "Grown", "Shrunk", "Unchanged"]));
    for (kind, changes) in [
        ("Sections", &totals.sections),
        ("Libs", &totals.libs),
        ("Compilands", &totals.compilands),
        ("Source files", &totals.source_files),
        ("Symbols", &totals.symbols),
    ] {
        table.add_row(vec![
            Cell::new(kind),
            Cell::new(changes.added),
            Cell::new(changes.removed),
            Cell::new(changes.grown),
            Cell::new(changes.shrunk),
            Cell::new(changes.unchanged),
        ]);
    }
    table
}

/// Create a table of the largest container diffs, with a column per changed section and COFF group.
fn container_diff_table<T: Container>(kind: &str, diffs: &[&ContainerDiff<T>]) -> Table {
    let sections = section_diffs_in(diffs.iter().copied(), true);
    let coff_groups = coff_group_diffs_in(diffs.iter().copied(), true);
    let columns = contribution_columns(&sections, &coff_groups);

    let mut rows = diffs.to_vec();
    rows.sort_by_key(|diff| std::cmp::Reverse(diff.size_diff().unsigned_abs()));

    let mut table = default_table_preset();
    table.set_header(header(
        [kind.to_string(), "Size Diff".to_string()]
            .into_iter()
            .chain(columns.iter().map(ToString::to_string)),
    ));
    for diff in rows.into_iter().take(MAX_ROWS) {
        let mut row = vec![
            Cell::new(shorten(diff.name(), MAX_NAME_WIDTH)),
            Cell::new(format_signed(diff.size_diff())),
        ];
        row.extend(
            columns
                .iter()
                .map(|column| Cell::new(format_signed(column.size_diff_of(diff.contribution_diffs())))),
        );
        table.add_row(row);
    }
    table
}

fn waste_diff_table(totals: &DiffTotals) -> Table {
    let waste = &totals.waste;
    let mut table = default_table_preset();
    table
        .set_header(header(["Waste", "Wasted Size Diff", "Wasted Size Remaining"]))
        .add_row(vec![
            Cell::new("Duplicate data"),
            Cell::new(format_signed(waste.duplicate_data_wasted_size_diff)),
            Cell::new(waste.duplicate_data_wasted_size_remaining),
        ])
        .add_row(vec![
            Cell::new("Template foldability"),
            Cell::new(format_signed(waste.template_foldability_wasted_size_diff)),
            Cell::new(waste.template_foldability_wasted_size_remaining),
        ])
        .add_row(vec![
            Cell::new("Wasteful virtuals"),
            Cell::new(format_signed(waste.wasteful_virtual_wasted_size_diff)),
            Cell::new(waste.wasteful_virtual_wasted_size_remaining),
        ])
        .add_row(vec![
            Cell::new("Total").add_attribute(comfy_table::Attribute::Bold),
            Cell::new(format_signed(waste.total_wasted_size_diff)).add_attribute(comfy_table::Attribute::Bold),
            Cell::new(
                waste.duplicate_data_wasted_size_remaining
                    + waste.template_foldability_wasted_size_remaining
                    + waste.wasteful_virtual_wasted_size_remaining,
            )
            .add_attribute(comfy_table::Attribute::Bold),
        ]);
    table
}

fn wasteful_virtual_diff_table(analysis: &DiffAnalysis) -> Table {
    let mut diffs: Vec<_> = analysis.wasteful_virtuals().iter().collect();
    diffs.sort_by_key(|diff| std::cmp::Reverse(diff.wasted_size_diff().unsigned_abs()));

    let mut table = default_table_preset();
    table.set_header(header(["Type", "Wasted Size Diff", "Override Changes", "Hierarchy Changes"]));
    for diff in diffs.into_iter().take(MAX_ROWS) {
        table.add_row(vec![
            Cell::new(shorten(diff.type_name(), MAX_NAME_WIDTH)),
            Cell::new(format_signed(diff.wasted_size_diff())),
            Cell::new(diff.wasted_override_changes().len()),
            Cell::new(diff.type_hierarchy_changes().len()),
        ]);
    }
    table
}

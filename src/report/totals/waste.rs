// Copyright (C) 2026 Checkmk GmbH - License: GNU General Public License v2
// This file is part of Checkmk (https://checkmk.com). It is subject to the terms and
// conditions defined in the file COPYING, which is part of this source code package.
use dashmap::DashSet;
use rayon::prelude::*;
use serde::Serialize;
use std::ops::Add;

use crate::analysis::{DiffAnalysis, SingleBinaryAnalysis};

#[derive(Default, Debug, Clone, PartialEq, Eq, Serialize)]
pub(crate) struct Totals {
    pub(crate) duplicate_data_items: usize,
    pub(crate) duplicate_data_compilands_unique: usize,
    pub(crate) duplicate_data_wasted_size: u64,
    pub(crate) template_foldability_items: usize,
    pub(crate) template_foldability_wasted_size: u64,
    pub(crate) wasteful_virtual_items: usize,
    pub(crate) wasteful_virtual_com_types: usize,
    pub(crate) wasteful_virtual_wasted_size: u64,
    pub(crate) total_wasted_size: u64,
}

impl Totals {
    pub(crate) fn calculate(analysis: &SingleBinaryAnalysis) -> Self {
        let compilands_unique = DashSet::new();
        let duplicate_data = analysis
            .duplicate_data()
            .par_iter()
            .fold(Totals::default, |mut totals, item| {
                for compiland in item.referenced_in() {
                    compilands_unique.insert(compiland.as_str());
                }
                totals.duplicate_data_items += 1;
                totals.duplicate_data_wasted_size += item.wasted_size();
                totals
            })
            .reduce(Totals::default, |a, b| a + b);
        let template_foldability = analysis
            .template_foldability()
            .par_iter()
            .fold(Totals::default, |mut totals, item| {
                totals.template_foldability_items += 1;
                totals.template_foldability_wasted_size += item.wasted_size();
                totals
            })
            .reduce(Totals::default, |a, b| a + b);
        let wasteful_virtuals = analysis
            .wasteful_virtuals()
            .par_iter()
            .fold(Totals::default, |mut totals, item| {
                totals.wasteful_virtual_items += 1;
                if item.is_com_type() {
                    totals.wasteful_virtual_com_types += 1;
                }
                totals.wasteful_virtual_wasted_size += item.wasted_size();
                totals
            })
            .reduce(Totals::default, |a, b| a + b);

        let mut totals = duplicate_data + template_foldability + wasteful_virtuals;
        totals.duplicate_data_compilands_unique = compilands_unique.len();
        totals
    }
}

impl Add for Totals {
    type Output = Self;

    fn add(self, other: Self) -> Self {
        let duplicate_data_wasted_size = self.duplicate_data_wasted_size + other.duplicate_data_wasted_size;
        let template_foldability_wasted_size =
            self.template_foldability_wasted_size + other.template_foldability_wasted_size;
        let wasteful_virtual_wasted_size = self.wasteful_virtual_wasted_size + other.wasteful_virtual_wasted_size;
        Self {
            duplicate_data_items: self.duplicate_data_items + other.duplicate_data_items,
            duplicate_data_compilands_unique: 0, // Handled by the calculate function.
            duplicate_data_wasted_size,
            template_foldability_items: self.template_foldability_items + other.template_foldability_items,
            template_foldability_wasted_size,
            wasteful_virtual_items: self.wasteful_virtual_items + other.wasteful_virtual_items,
            wasteful_virtual_com_types: self.wasteful_virtual_com_types + other.wasteful_virtual_com_types,
            wasteful_virtual_wasted_size,
            total_wasted_size: duplicate_data_wasted_size
                + template_foldability_wasted_size
                + wasteful_virtual_wasted_size,
        }
    }
}

/// Waste growth between two builds; negative values are savings.
#[derive(Default, Debug, Clone, PartialEq, Eq, Serialize)]
pub(crate) struct DiffTotals {
    pub(crate) duplicate_data_wasted_size_diff: i64,
    pub(crate) duplicate_data_wasted_size_remaining: u64,
    pub(crate) template_foldability_wasted_size_diff: i64,
    pub(crate) template_foldability_wasted_size_remaining: u64,
    pub(crate) wasteful_virtual_wasted_size_diff: i64,
    pub(crate) wasteful_virtual_wasted_size_remaining: u64,
    pub(crate) wasteful_virtual_types_changed_unique: usize,
    pub(crate) total_wasted_size_diff: i64,
}

impl DiffTotals {
    pub(crate) fn calculate(analysis: &DiffAnalysis) -> Self {
        let types_changed = DashSet::new();
        let duplicate_data = analysis
            .duplicate_data()
            .par_iter()
            .fold(DiffTotals::default, |mut totals, diff| {
                totals.duplicate_data_wasted_size_diff += diff.wasted_size_diff();
                totals.duplicate_data_wasted_size_remaining += diff.wasted_size_remaining();
                totals
            })
            .reduce(DiffTotals::default, |a, b| a + b);
        let template_foldability = analysis
            .template_foldability()
            .par_iter()
            .fold(DiffTotals::default, |mut totals, diff| {
                totals.template_foldability_wasted_size_diff += diff.wasted_size_diff();
                totals.template_foldability_wasted_size_remaining += diff.wasted_size_remaining();
                totals
            })
            .reduce(DiffTotals::default, |a, b| a + b);
        let wasteful_virtuals = analysis
            .wasteful_virtuals()
            .par_iter()
            .fold(DiffTotals::default, |mut totals, diff| {
                for change in diff.type_hierarchy_changes() {
                    types_changed.insert(change.type_name.as_str());
                }
                totals.wasteful_virtual_wasted_size_diff += diff.wasted_size_diff();
                totals.wasteful_virtual_wasted_size_remaining += diff.wasted_size_remaining();
                totals
            })
            .reduce(DiffTotals::default, |a, b| a + b);

        let mut totals = duplicate_data + template_foldability + wasteful_virtuals;
        totals.wasteful_virtual_types_changed_unique = types_changed.len();
        totals
    }
}

impl Add for DiffTotals {
    type Output = Self;

    fn add(self, other: Self) -> Self {
        let duplicate_data_wasted_size_diff =
            self.duplicate_data_wasted_size_diff + other.duplicate_data_wasted_size_diff;
        let template_foldability_wasted_size_diff =
            self.template_foldability_wasted_size_diff + other.template_foldability_wasted_size_diff;
        let wasteful_virtual_wasted_size_diff =
            self.wasteful_virtual_wasted_size_diff + other.wasteful_virtual_wasted_size_diff;
        Self {
            duplicate_data_wasted_size_diff,
            duplicate_data_wasted_size_remaining: self.duplicate_data_wasted_size_remaining
                + other.duplicate_data_wasted_size_remaining,
            template_foldability_wasted_size_diff,
            template_foldability_wasted_size_remaining: self.template_foldability_wasted_size_remaining
                + other.template_foldability_wasted_size_remaining,
            wasteful_virtual_wasted_size_diff,
            wasteful_virtual_wasted_size_remaining: self.wasteful_virtual_wasted_size_remaining
                + other.wasteful_virtual_wasted_size_remaining,
            wasteful_virtual_types_changed_unique: 0, // Handled by the calculate function.
            total_wasted_size_diff: duplicate_data_wasted_size_diff
                + template_foldability_wasted_size_diff
                + wasteful_virtual_wasted_size_diff,
        }
    }
}

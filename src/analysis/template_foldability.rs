// Copyright (C) 2026 Checkmk GmbH - License: GNU General Public License v2
// This file is part of Checkmk (https://checkmk.com). It is subject to the terms and
// conditions defined in the file COPYING, which is part of this source code package.

//! Estimates how much code identical template instantiations could save if they were folded.

use indexmap::IndexMap;
use serde::{Serialize, Serializer};
use std::ops::Range;

use super::context::{AnalysisContext, AnalysisError, AnalysisResult};
use super::diff::{pair_by_name, signed_delta, Diff, NamedEntity, PairingResult};
use super::names::generic_templated_name;
use crate::snapshot::{Snapshot, TemplatedFunctionSymbol};

/// Compares the code of two instantiations of one template.
pub trait CodeSimilarity: Send + Sync {
    /// Similarity between 0.0 (nothing in common) and 1.0 (identical).
    fn similarity(&self, first: &TemplatedFunctionSymbol, second: &TemplatedFunctionSymbol) -> f32;
}

/// Compares code bytes position by position over the longer of the two bodies.
#[derive(Debug, Default, Clone, Copy)]
pub struct ByteSimilarity;

impl CodeSimilarity for ByteSimilarity {
    fn similarity(&self, first: &TemplatedFunctionSymbol, second: &TemplatedFunctionSymbol) -> f32 {
        let longer = first.code.len().max(second.code.len());
        if longer == 0 {
            return 0.0;
        }
        let matching = first
            .code
            .iter()
            .zip(&second.code)
            .filter(|(a, b)| a == b)
            .count();
        matching as f32 / longer as f32
    }
}

/// All instantiations of one template and how much of their code is redundant.
#[derive(Debug, Clone, PartialEq)]
pub struct TemplateFoldabilityItem {
    template_name: String,
    symbols: Vec<TemplatedFunctionSymbol>,
    unique_symbols: Vec<usize>,
    total_size: u64,
    wasted_size: u64,
    percentage_similarity: f32,
}

impl TemplateFoldabilityItem {
    /// `unique_symbols` are indices into `symbols`. Out of range indices are dropped.
    #[must_use]
    pub fn new(
        template_name: String,
        symbols: Vec<TemplatedFunctionSymbol>,
        unique_symbols: Vec<usize>,
        total_size: u64,
        percentage_similarity: f32,
    ) -> Self {
        let unique_symbols = unique_symbols
            .into_iter()
            .filter(|&index| index < symbols.len())
            .collect();
        Self {
            template_name,
            symbols,
            unique_symbols,
            total_size,
            wasted_size: (total_size as f32 * percentage_similarity) as u64,
            percentage_similarity,
        }
    }

    #[must_use]
    pub fn template_name(&self) -> &str {
        &self.template_name
    }

    #[must_use]
    pub fn symbols(&self) -> &[TemplatedFunctionSymbol] {
        &self.symbols
    }

    /// Symbols with their own copy of the code, in the order they were found.
    pub fn unique_symbols(&self) -> impl Iterator<Item = &TemplatedFunctionSymbol> {
        self.unique_symbols.iter().map(|&index| &self.symbols[index])
    }

    #[must_use]
    pub fn total_size(&self) -> u64 {
        self.total_size
    }

    #[must_use]
    pub fn wasted_size(&self) -> u64 {
        self.wasted_size
    }

    #[must_use]
    pub fn percentage_similarity(&self) -> f32 {
        self.percentage_similarity
    }

    /// Names of up to `count` instantiations, for display.
    #[must_use]
    pub fn example_symbol_names(&self, count: usize) -> Vec<&str> {
        self.symbols
            .iter()
            .take(count)
            .map(|symbol| symbol.name.as_str())
            .collect()
    }
}

impl NamedEntity for TemplateFoldabilityItem {
    fn name(&self) -> &str {
        &self.template_name
    }

    fn size(&self) -> u64 {
        self.total_size
    }

    // Code is always backed by the file, so both sizes agree.
    fn virtual_size(&self) -> u64 {
        self.total_size
    }
}

impl Serialize for TemplateFoldabilityItem {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        use serde::ser::SerializeStruct;
        let unique: Vec<&str> = self.unique_symbols().map(|s| s.name.as_str()).collect();
        let mut state = serializer.serialize_struct("TemplateFoldabilityItem", 6)?;
        state.serialize_field("template_name", &self.template_name)?;
        state.serialize_field("symbols", &self.symbols)?;
        state.serialize_field("unique_symbols", &unique)?;
        state.serialize_field("total_size", &self.total_size)?;
        state.serialize_field("wasted_size", &self.wasted_size)?;
        state.serialize_field("percentage_similarity", &self.percentage_similarity)?;
        state.end()
    }
}

/// Unique code ranges of a group, skipping folded copies and RVAs already counted.
fn unique_ranges(symbols: &[&TemplatedFunctionSymbol]) -> AnalysisResult<(Vec<usize>, u64)> {
    let mut ranges: Vec<Range<u64>> = Vec::new();
    let mut unique = Vec::new();
    for (index, symbol) in symbols.iter().enumerate() {
        if symbol.is_folded || ranges.iter().any(|range| range.contains(&symbol.rva)) {
            continue;
        }
        ranges.push(symbol.rva..symbol.rva.saturating_add(symbol.size));
        unique.push(index);
    }
    let total = ranges
        .iter()
        .try_fold(0u64, |total, range| total.checked_add(range.end - range.start))
        .ok_or_else(|| AnalysisError::Sanity {
            what: format!(
                "unique code size of {} overflows",
                symbols.first().map_or("", |symbol| symbol.name.as_str())
            ),
        })?;
    Ok((unique, total))
}

/// Average similarity between consecutive distinct code bodies of a group.
fn percentage_similarity(symbols: &[&TemplatedFunctionSymbol], similarity: &dyn CodeSimilarity) -> f32 {
    let mut by_rva: IndexMap<(u64, u32), &TemplatedFunctionSymbol> = IndexMap::new();
    for &symbol in symbols {
        by_rva.entry((symbol.rva, symbol.block_count)).or_insert(symbol);
    }
    if by_rva.len() < 2 {
        return 1.0;
    }
    let mut representatives: Vec<&TemplatedFunctionSymbol> = by_rva.into_values().collect();
    // Stable: equal block counts keep first-seen order.
    representatives.sort_by_key(|symbol| symbol.block_count);
    let similarities: Vec<f32> = representatives
        .windows(2)
        .map(|pair| similarity.similarity(pair[0], pair[1]))
        .collect();
    similarities.iter().sum::<f32>() / similarities.len() as f32
}

/// Group templated functions by generic name and measure each group's foldability.
///
/// Templates with a single instantiation cannot fold and are left out.
///
/// # Errors
/// Returns an error if the pass is canceled or a group's unique code size overflows.
pub fn find_template_foldability(
    snapshot: &Snapshot,
    similarity: &dyn CodeSimilarity,
    context: &AnalysisContext<'_>,
) -> AnalysisResult<Vec<TemplateFoldabilityItem>> {
    let functions = snapshot.templated_functions();
    context.report("Grouping templated functions by type, function and parameters", 0, None);
    let mut groups: IndexMap<String, Vec<&TemplatedFunctionSymbol>> = IndexMap::new();
    for function in functions {
        groups
            .entry(generic_templated_name(function))
            .or_default()
            .push(function);
    }
    context.checkpoint()?;

    let mut sweep = context.sweep("Exploring template foldability", functions.len() as u64);
    let mut items = Vec::new();
    for (template_name, symbols) in groups {
        sweep.advance(symbols.len() as u64)?;
        if symbols.len() == 1 {
            continue;
        }
        let (unique, total_size) = unique_ranges(&symbols)?;
        let percentage = percentage_similarity(&symbols, similarity);
        items.push(TemplateFoldabilityItem::new(
            template_name,
            symbols.into_iter().cloned().collect(),
            unique,
            total_size,
            percentage,
        ));
    }
    sweep.finish(items.len());
    log::debug!("Found template foldability: items={}", items.len());
    Ok(items)
}

/// A template foldability item paired between two builds by template name.
#[derive(Debug, Clone, PartialEq)]
pub struct TemplateFoldabilityItemDiff {
    diff: Diff<TemplateFoldabilityItem>,
}

impl TemplateFoldabilityItemDiff {
    #[must_use]
    pub fn template_name(&self) -> &str {
        self.diff.name()
    }

    #[must_use]
    pub fn before(&self) -> Option<&TemplateFoldabilityItem> {
        self.diff.before()
    }

    #[must_use]
    pub fn after(&self) -> Option<&TemplateFoldabilityItem> {
        self.diff.after()
    }

    #[must_use]
    pub fn size_diff(&self) -> i64 {
        self.diff.size_diff()
    }

    #[must_use]
    pub fn virtual_size_diff(&self) -> i64 {
        self.size_diff()
    }

    #[must_use]
    pub fn wasted_size_remaining(&self) -> u64 {
        self.after().map_or(0, TemplateFoldabilityItem::wasted_size)
    }

    #[must_use]
    pub fn wasted_size_diff(&self) -> i64 {
        signed_delta(
            self.before().map_or(0, TemplateFoldabilityItem::wasted_size),
            self.wasted_size_remaining(),
        )
    }
}

impl Serialize for TemplateFoldabilityItemDiff {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        use serde::ser::SerializeStruct;
        let mut state = serializer.serialize_struct("TemplateFoldabilityItemDiff", 6)?;
        state.serialize_field("template_name", self.template_name())?;
        state.serialize_field("size_diff", &self.size_diff())?;
        state.serialize_field("wasted_size_diff", &self.wasted_size_diff())?;
        state.serialize_field("wasted_size_remaining", &self.wasted_size_remaining())?;
        state.serialize_field("before", &self.before())?;
        state.serialize_field("after", &self.after())?;
        state.end()
    }
}

/// # Errors
/// Returns an error if a template name appears twice on one side.
pub fn diff_template_foldability(
    before: Vec<TemplateFoldabilityItem>,
    after: Vec<TemplateFoldabilityItem>,
) -> PairingResult<Vec<TemplateFoldabilityItemDiff>> {
    Ok(pair_by_name(before, after)?
        .into_iter()
        .map(|diff| TemplateFoldabilityItemDiff { diff })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::context::{CancellationToken, NoProgress};

    fn instantiation(name: &str, rva: u64, size: u64, code: &[u8]) -> TemplatedFunctionSymbol {
        TemplatedFunctionSymbol {
            name: name.to_string(),
            argument_types: Vec::new(),
            is_const: false,
            is_volatile: false,
            rva,
            size,
            is_folded: false,
            block_count: 1,
            code: code.to_vec(),
        }
    }

    struct FixedSimilarity(f32);

    impl CodeSimilarity for FixedSimilarity {
        fn similarity(&self, _first: &TemplatedFunctionSymbol, _second: &TemplatedFunctionSymbol) -> f32 {
            self.0
        }
    }

    fn find(snapshot: &Snapshot, similarity: &dyn CodeSimilarity) -> Vec<TemplateFoldabilityItem> {
        let token = CancellationToken::new();
        find_template_foldability(snapshot, similarity, &AnalysisContext::new(&token, &NoProgress)).unwrap()
    }

    #[test]
    fn test_wasted_size_truncates() {
        let item = TemplateFoldabilityItem::new("Foo<T1>()".to_string(), Vec::new(), Vec::new(), 100, 0.555);
        assert_eq!(item.wasted_size(), 55);
        let item = TemplateFoldabilityItem::new("Foo<T1>()".to_string(), Vec::new(), Vec::new(), 20, 0.5);
        assert_eq!(item.wasted_size(), 10);
    }

    #[test]
    fn test_shared_rva_counted_once() {
        let mut snapshot = Snapshot::new_for_testing("app.dll");
        snapshot.templated_functions = vec![
            instantiation("Foo<int>", 0x1000, 10, &[1; 10]),
            instantiation("Foo<long>", 0x1000, 10, &[1; 10]),
            instantiation("Foo<float>", 0x2000, 10, &[1; 10]),
        ];
        let items = find(&snapshot, &FixedSimilarity(0.5));

        assert_eq!(items.len(), 1);
        let item = &items[0];
        assert_eq!(item.template_name(), "Foo<T1>()");
        assert_eq!(item.symbols().len(), 3);
        assert_eq!(item.total_size(), 20);
        let unique: Vec<&str> = item.unique_symbols().map(|s| s.name.as_str()).collect();
        assert_eq!(unique, vec!["Foo<int>", "Foo<float>"]);
        assert_eq!(item.wasted_size(), 10);
    }

    #[test]
    fn test_folded_symbols_are_not_unique() {
        let mut folded = instantiation("Foo<long>", 0x3000, 10, &[]);
        folded.is_folded = true;
        let symbols = [instantiation("Foo<int>", 0x1000, 10, &[]), folded];
        let refs: Vec<&TemplatedFunctionSymbol> = symbols.iter().collect();
        let (unique, total) = unique_ranges(&refs).unwrap();
        assert_eq!(unique, vec![0]);
        assert_eq!(total, 10);
    }

    #[test]
    fn test_single_instantiation_skipped() {
        let mut snapshot = Snapshot::new_for_testing("app.dll");
        snapshot.templated_functions = vec![
            instantiation("Foo<int>", 0x1000, 10, &[]),
            instantiation("Bar<int>", 0x2000, 10, &[]),
        ];
        assert!(find(&snapshot, &ByteSimilarity).is_empty());
    }

    #[test]
    fn test_fully_folded_group_is_identical() {
        let symbols = [
            instantiation("Foo<int>", 0x1000, 10, &[]),
            instantiation("Foo<long>", 0x1000, 10, &[]),
        ];
        let refs: Vec<&TemplatedFunctionSymbol> = symbols.iter().collect();
        assert!((percentage_similarity(&refs, &ByteSimilarity) - 1.0).abs() < f32::EPSILON);
    }

    #[test]
    fn test_byte_similarity() {
        let first = instantiation("Foo<int>", 0x1000, 4, &[1, 2, 3, 4]);
        let second = instantiation("Foo<long>", 0x2000, 4, &[1, 2, 9, 4]);
        let longer = instantiation("Foo<char>", 0x3000, 8, &[1, 2, 3, 4, 5, 6, 7, 8]);
        let empty = instantiation("Foo<bool>", 0x4000, 0, &[]);

        assert!((ByteSimilarity.similarity(&first, &second) - 0.75).abs() < f32::EPSILON);
        assert!((ByteSimilarity.similarity(&first, &longer) - 0.5).abs() < f32::EPSILON);
        assert!(ByteSimilarity.similarity(&empty, &empty).abs() < f32::EPSILON);
    }

    #[test]
    fn test_similarity_is_averaged() {
        let symbols = [
            instantiation("Foo<int>", 0x1000, 4, &[1, 2, 3, 4]),
            instantiation("Foo<long>", 0x2000, 4, &[1, 2, 3, 4]),
            instantiation("Foo<char>", 0x3000, 4, &[1, 2, 0, 0]),
        ];
        let refs: Vec<&TemplatedFunctionSymbol> = symbols.iter().collect();
        // 1.0 between the first two, 0.5 between the last two.
        assert!((percentage_similarity(&refs, &ByteSimilarity) - 0.75).abs() < f32::EPSILON);
    }

    #[test]
    fn test_similarity_groups_ordered_by_block_count() {
        let mut split = instantiation("Foo<int>", 0x1000, 4, &[1, 2, 3, 4]);
        split.block_count = 2;
        let mut split_again = instantiation("Foo<char>", 0x3000, 4, &[1, 2, 3, 4]);
        split_again.block_count = 2;
        let symbols = [split, instantiation("Foo<long>", 0x2000, 4, &[9, 9, 9, 9]), split_again];
        let refs: Vec<&TemplatedFunctionSymbol> = symbols.iter().collect();
        // Compared as Foo<long>, Foo<int>, Foo<char>: 0.0 then 1.0.
        assert!((percentage_similarity(&refs, &ByteSimilarity) - 0.5).abs() < f32::EPSILON);
    }

    #[test]
    fn test_overflowing_unique_size_is_sanity_error() {
        let symbols = [
            instantiation("Foo<int>", 0x1000, u64::MAX / 2 + 1, &[]),
            instantiation("Foo<long>", 0, u64::MAX / 2 + 1, &[]),
        ];
        let refs: Vec<&TemplatedFunctionSymbol> = symbols.iter().collect();
        assert!(matches!(unique_ranges(&refs), Err(AnalysisError::Sanity { .. })));
    }

    #[test]
    fn test_example_symbol_names() {
        let symbols: Vec<TemplatedFunctionSymbol> = (0..8)
            .map(|i| instantiation(&format!("Foo<T{i}>"), 0x1000 * (i + 1), 10, &[]))
            .collect();
        let item = TemplateFoldabilityItem::new("Foo<T1>()".to_string(), symbols, vec![0], 10, 1.0);
        assert_eq!(item.example_symbol_names(5).len(), 5);
        assert_eq!(item.example_symbol_names(5)[0], "Foo<T0>");
        assert_eq!(item.example_symbol_names(20).len(), 8);
    }

    #[test]
    fn test_diff_by_template_name() {
        let item = |total: u64, similarity: f32| {
            TemplateFoldabilityItem::new("Foo<T1>()".to_string(), Vec::new(), Vec::new(), total, similarity)
        };
        let diffs = diff_template_foldability(vec![item(100, 0.5)], vec![item(40, 0.5)]).unwrap();
        assert_eq!(diffs.len(), 1);
        assert_eq!(diffs[0].size_diff(), -60);
        assert_eq!(diffs[0].virtual_size_diff(), -60);
        assert_eq!(diffs[0].wasted_size_remaining(), 20);
        assert_eq!(diffs[0].wasted_size_diff(), -30);

        let added = diff_template_foldability(Vec::new(), vec![item(40, 0.5)]).unwrap();
        assert_eq!(added[0].wasted_size_diff(), 20);
        let json = serde_json::to_value(&added[0]).unwrap();
        assert_eq!(json["template_name"], "Foo<T1>()");
        assert!(json["before"].is_null());
    }
}

// Copyright (C) 2026 Checkmk GmbH - License: GNU General Public License v2
// This file is part of Checkmk (https://checkmk.com). It is subject to the terms and
// conditions defined in the file COPYING, which is part of this source code package.

//! Finds file-static data that was emitted into several compilands with identical contents.

use indexmap::{IndexMap, IndexSet};
use serde::{Serialize, Serializer};
use std::collections::HashMap;

use super::context::{AnalysisContext, AnalysisError, AnalysisResult};
use super::diff::{pair_by_key, signed_delta, Diff, NamedEntity, PairingResult};
use crate::snapshot::{Snapshot, StaticDataSymbol};

/// A duplicate data item still collecting the compilands that reference it.
#[derive(Debug)]
pub struct DuplicateDataItemBuilder {
    symbol: StaticDataSymbol,
    referenced_in: IndexSet<String>,
}

impl DuplicateDataItemBuilder {
    #[must_use]
    pub fn new(symbol: StaticDataSymbol, first_compiland: &str) -> Self {
        let mut referenced_in = IndexSet::new();
        referenced_in.insert(first_compiland.to_string());
        Self {
            symbol,
            referenced_in,
        }
    }

    /// Record another referencing compiland. Adding the same compiland twice has no effect.
    pub fn add_referenced_compiland_if_necessary(&mut self, compiland: &str) {
        if !self.referenced_in.contains(compiland) {
            self.referenced_in.insert(compiland.to_string());
        }
    }

    /// Sort the referencing compilands and seal the item.
    ///
    /// # Errors
    /// Returns an error if the size of all copies together does not fit in 64 bits.
    pub fn mark_fully_constructed(mut self) -> AnalysisResult<DuplicateDataItem> {
        self.referenced_in.sort();
        let copies = self.referenced_in.len() as u64;
        let (Some(total_size), Some(total_virtual_size)) = (
            self.symbol.size.checked_mul(copies),
            self.symbol.virtual_size.checked_mul(copies),
        ) else {
            return Err(AnalysisError::Sanity {
                what: format!("size of {copies} copies of {} overflows", self.symbol.name),
            });
        };
        Ok(DuplicateDataItem {
            total_size,
            total_virtual_size,
            // Cannot overflow, it is at most total_size.
            wasted_size: self.symbol.size * copies.saturating_sub(1),
            symbol: self.symbol,
            referenced_in: self.referenced_in.into_iter().collect(),
        })
    }
}

/// One piece of static data and every compiland carrying a copy of it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DuplicateDataItem {
    symbol: StaticDataSymbol,
    referenced_in: Vec<String>,
    total_size: u64,
    #[serde(skip)]
    total_virtual_size: u64,
    wasted_size: u64,
}

impl DuplicateDataItem {
    #[must_use]
    pub fn symbol(&self) -> &StaticDataSymbol {
        &self.symbol
    }

    /// Referencing compilands, sorted by name.
    #[must_use]
    pub fn referenced_in(&self) -> &[String] {
        &self.referenced_in
    }

    /// Size of all copies together.
    #[must_use]
    pub fn total_size(&self) -> u64 {
        self.total_size
    }

    /// Size of every copy but one.
    #[must_use]
    pub fn wasted_size(&self) -> u64 {
        self.wasted_size
    }
}

impl NamedEntity for DuplicateDataItem {
    fn name(&self) -> &str {
        &self.symbol.name
    }

    fn size(&self) -> u64 {
        self.total_size
    }

    fn virtual_size(&self) -> u64 {
        self.total_virtual_size
    }
}

// Same RVA means the copies were already folded, same name and size with different
// contents is legitimate (e.g. generated tables).
fn truly_duplicates(first: &StaticDataSymbol, second: &StaticDataSymbol) -> bool {
    first.rva != second.rva && first.bytes == second.bytes
}

/// Find every piece of static data present in more than one compiland.
///
/// # Errors
/// Returns an error if the pass is canceled or the size of an item's copies overflows.
pub fn find_duplicate_data(snapshot: &Snapshot, context: &AnalysisContext<'_>) -> AnalysisResult<Vec<DuplicateDataItem>> {
    let mut groups: IndexMap<(&str, u64, u64), Vec<&StaticDataSymbol>> = IndexMap::new();
    for symbol in snapshot.static_data() {
        if symbol.size == 0 && symbol.virtual_size == 0 {
            continue;
        }
        groups
            .entry((symbol.name.as_str(), symbol.size, symbol.virtual_size))
            .or_default()
            .push(symbol);
    }

    let total: usize = groups.values().map(Vec::len).sum();
    let mut sweep = context.sweep("Enumerating duplicate data", total as u64);
    let mut items = Vec::new();
    for symbols in groups.values() {
        let mut possible_duplicates: Vec<&StaticDataSymbol> = Vec::new();
        let mut builders: Vec<DuplicateDataItemBuilder> = Vec::new();
        for &symbol in symbols {
            sweep.advance(1)?;
            if let Some(builder) = builders
                .iter_mut()
                .find(|b| truly_duplicates(&b.symbol, symbol))
            {
                builder.add_referenced_compiland_if_necessary(&symbol.compiland);
            } else if let Some(index) = possible_duplicates
                .iter()
                .position(|candidate| truly_duplicates(candidate, symbol))
            {
                let first = possible_duplicates.remove(index);
                let mut builder = DuplicateDataItemBuilder::new(first.clone(), &first.compiland);
                builder.add_referenced_compiland_if_necessary(&symbol.compiland);
                builders.push(builder);
            } else {
                possible_duplicates.push(symbol);
            }
        }
        for builder in builders {
            let item = builder.mark_fully_constructed()?;
            // Copies at different RVAs of one compiland are not cross-compiland waste.
            if item.referenced_in.len() > 1 {
                items.push(item);
            }
        }
    }
    sweep.finish(items.len());
    log::debug!("Found duplicate data: items={}", items.len());
    Ok(items)
}

/// A duplicate data item paired between two builds.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DuplicateDataItemDiff {
    diff: Diff<DuplicateDataItem>,
}

impl DuplicateDataItemDiff {
    #[must_use]
    pub fn name(&self) -> &str {
        self.diff.name()
    }

    #[must_use]
    pub fn diff(&self) -> &Diff<DuplicateDataItem> {
        &self.diff
    }

    #[must_use]
    pub fn before(&self) -> Option<&DuplicateDataItem> {
        self.diff.before()
    }

    #[must_use]
    pub fn after(&self) -> Option<&DuplicateDataItem> {
        self.diff.after()
    }

    /// Change of the total size of all copies.
    #[must_use]
    pub fn size_diff(&self) -> i64 {
        self.diff.size_diff()
    }

    /// Waste still present in the "after" build, 0 if the item is gone.
    #[must_use]
    pub fn wasted_size_remaining(&self) -> u64 {
        self.after().map_or(0, DuplicateDataItem::wasted_size)
    }

    /// Change of the virtual size of all copies.
    #[must_use]
    pub fn virtual_size_diff(&self) -> i64 {
        self.diff.virtual_size_diff()
    }

    #[must_use]
    pub fn wasted_size_diff(&self) -> i64 {
        signed_delta(
            self.before().map_or(0, DuplicateDataItem::wasted_size),
            self.wasted_size_remaining(),
        )
    }
}

impl Serialize for DuplicateDataItemDiff {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        use serde::ser::SerializeStruct;
        let mut state = serializer.serialize_struct("DuplicateDataItemDiff", 7)?;
        state.serialize_field("name", self.name())?;
        state.serialize_field("size_diff", &self.size_diff())?;
        state.serialize_field("virtual_size_diff", &self.virtual_size_diff())?;
        state.serialize_field("wasted_size_diff", &self.wasted_size_diff())?;
        state.serialize_field("wasted_size_remaining", &self.wasted_size_remaining())?;
        state.serialize_field("before", &self.before())?;
        state.serialize_field("after", &self.after())?;
        state.end()
    }
}

/// Key items by symbol name, numbering repeated names in order of appearance.
fn keyed_by_occurrence(items: Vec<DuplicateDataItem>) -> Vec<(String, DuplicateDataItem)> {
    let mut seen: HashMap<String, usize> = HashMap::new();
    items
        .into_iter()
        .map(|item| {
            let count = seen.entry(item.symbol.name.clone()).or_insert(0);
            *count += 1;
            let key = if *count == 1 {
                item.symbol.name.clone()
            } else {
                format!("{}#{count}", item.symbol.name)
            };
            (key, item)
        })
        .collect()
}

/// Pair duplicate data items of two builds by symbol name.
///
/// # Errors
/// Returns an error if pairing keys collide.
pub fn diff_duplicate_data(
    before: Vec<DuplicateDataItem>,
    after: Vec<DuplicateDataItem>,
) -> PairingResult<Vec<DuplicateDataItemDiff>> {
    let pairs = pair_by_key(
        keyed_by_occurrence(before),
        keyed_by_occurrence(after),
        |(key, _)| key.as_str(),
    )?;
    Ok(pairs
        .into_iter()
        .map(|pair| DuplicateDataItemDiff {
            diff: pair.map(|(_, item)| item),
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::context::{CancellationToken, NoProgress};

    fn data(name: &str, rva: u64, size: u64, compiland: &str, bytes: &[u8]) -> StaticDataSymbol {
        StaticDataSymbol {
            name: name.to_string(),
            rva,
            size,
            virtual_size: size,
            compiland: compiland.to_string(),
            bytes: bytes.to_vec(),
        }
    }

    fn find(snapshot: &Snapshot) -> Vec<DuplicateDataItem> {
        let token = CancellationToken::new();
        find_duplicate_data(snapshot, &AnalysisContext::new(&token, &NoProgress)).unwrap()
    }

    #[test]
    fn test_wasted_size_three_copies() {
        let mut builder = DuplicateDataItemBuilder::new(data("kTable", 0x100, 12, "c.obj", &[1; 12]), "c.obj");
        builder.add_referenced_compiland_if_necessary("a.obj");
        builder.add_referenced_compiland_if_necessary("b.obj");
        let item = builder.mark_fully_constructed().unwrap();

        assert_eq!(item.wasted_size(), 24);
        assert_eq!(item.total_size(), 36);
        assert_eq!(item.referenced_in(), ["a.obj", "b.obj", "c.obj"]);
    }

    #[test]
    fn test_wasted_size_two_copies() {
        let mut builder = DuplicateDataItemBuilder::new(data("kBig", 0x100, 256, "a.obj", &[]), "a.obj");
        builder.add_referenced_compiland_if_necessary("b.obj");
        let item = builder.mark_fully_constructed().unwrap();
        assert_eq!(item.wasted_size(), 256);
        assert_eq!(item.total_size(), 512);
    }

    #[test]
    fn test_add_compiland_idempotent() {
        let mut builder = DuplicateDataItemBuilder::new(data("kTable", 0x100, 12, "a.obj", &[]), "a.obj");
        builder.add_referenced_compiland_if_necessary("b.obj");
        builder.add_referenced_compiland_if_necessary("b.obj");
        builder.add_referenced_compiland_if_necessary("a.obj");
        let item = builder.mark_fully_constructed().unwrap();
        assert_eq!(item.referenced_in().len(), 2);
        assert_eq!(item.wasted_size(), 12);
    }

    #[test]
    fn test_find_duplicate_data() {
        let mut snapshot = Snapshot::new_for_testing("app.dll");
        snapshot.static_data = vec![
            data("kTable", 0x100, 12, "c.obj", &[7; 12]),
            data("kTable", 0x200, 12, "a.obj", &[7; 12]),
            data("kEmpty", 0x300, 0, "a.obj", &[]),
            data("kEmpty", 0x310, 0, "b.obj", &[]),
            data("kTable", 0x400, 12, "b.obj", &[7; 12]),
            data("kUnique", 0x500, 4, "a.obj", &[1, 2, 3, 4]),
        ];
        let items = find(&snapshot);

        assert_eq!(items.len(), 1);
        let item = &items[0];
        assert_eq!(item.symbol().name, "kTable");
        assert_eq!(item.symbol().rva, 0x100);
        assert_eq!(item.referenced_in(), ["a.obj", "b.obj", "c.obj"]);
        assert_eq!(item.wasted_size(), 24);
    }

    #[test]
    fn test_same_rva_or_different_bytes_not_duplicates() {
        let mut snapshot = Snapshot::new_for_testing("app.dll");
        snapshot.static_data = vec![
            data("__midl_frag", 0x100, 4, "a.obj", &[1, 1, 1, 1]),
            data("__midl_frag", 0x200, 4, "b.obj", &[2, 2, 2, 2]),
            data("kFolded", 0x300, 8, "a.obj", &[0; 8]),
            data("kFolded", 0x300, 8, "b.obj", &[0; 8]),
        ];
        assert!(find(&snapshot).is_empty());
    }

    #[test]
    fn test_bss_duplicates_found() {
        let mut snapshot = Snapshot::new_for_testing("app.dll");
        let mut first = data("s_buffer", 0x100, 0, "a.obj", &[]);
        first.virtual_size = 64;
        let mut second = data("s_buffer", 0x200, 0, "b.obj", &[]);
        second.virtual_size = 64;
        snapshot.static_data = vec![first, second];

        let items = find(&snapshot);
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].wasted_size(), 0);
        assert_eq!(items[0].virtual_size(), 128);
    }

    #[test]
    fn test_diff_wasted_sizes() {
        let item = |compilands: &[&str]| {
            let mut builder = DuplicateDataItemBuilder::new(data("kTable", 0x100, 12, compilands[0], &[]), compilands[0]);
            for compiland in &compilands[1..] {
                builder.add_referenced_compiland_if_necessary(compiland);
            }
            builder.mark_fully_constructed().unwrap()
        };
        let diffs = diff_duplicate_data(
            vec![item(&["a.obj", "b.obj", "c.obj"])],
            vec![item(&["a.obj", "b.obj"])],
        )
        .unwrap();
        assert_eq!(diffs.len(), 1);
        assert_eq!(diffs[0].size_diff(), -12);
        assert_eq!(diffs[0].wasted_size_remaining(), 12);
        assert_eq!(diffs[0].wasted_size_diff(), -12);

        let gone = diff_duplicate_data(vec![item(&["a.obj", "b.obj"])], Vec::new()).unwrap();
        assert_eq!(gone[0].wasted_size_remaining(), 0);
        assert_eq!(gone[0].wasted_size_diff(), -12);
        let json = serde_json::to_value(&gone[0]).unwrap();
        assert_eq!(json["wasted_size_diff"], -12);
        assert!(json["after"].is_null());
    }

    #[test]
    fn test_diff_virtual_size_of_bss_copies() {
        let item = |compilands: &[&str]| {
            let mut symbol = data("s_buffer", 0x100, 0, compilands[0], &[]);
            symbol.virtual_size = 64;
            let mut builder = DuplicateDataItemBuilder::new(symbol, compilands[0]);
            for compiland in &compilands[1..] {
                builder.add_referenced_compiland_if_necessary(compiland);
            }
            builder.mark_fully_constructed().unwrap()
        };
        let diffs = diff_duplicate_data(
            vec![item(&["a.obj", "b.obj"])],
            vec![item(&["a.obj", "b.obj", "c.obj"])],
        )
        .unwrap();
        assert_eq!(diffs[0].size_diff(), 0);
        assert_eq!(diffs[0].virtual_size_diff(), 64);
        let json = serde_json::to_value(&diffs[0]).unwrap();
        assert_eq!(json["virtual_size_diff"], 64);
    }

    #[test]
    fn test_overflowing_copies_are_sanity_errors() {
        let mut builder = DuplicateDataItemBuilder::new(data("kHuge", 0x100, u64::MAX / 2 + 1, "a.obj", &[]), "a.obj");
        builder.add_referenced_compiland_if_necessary("b.obj");
        let err = builder.mark_fully_constructed().unwrap_err();
        assert!(matches!(err, AnalysisError::Sanity { ref what } if what.contains("kHuge")));

        let mut snapshot = Snapshot::new_for_testing("app.dll");
        snapshot.static_data = vec![
            data("kHuge", 0x100, u64::MAX / 2 + 1, "a.obj", &[]),
            data("kHuge", 0x200, u64::MAX / 2 + 1, "b.obj", &[]),
        ];
        let token = CancellationToken::new();
        let result = find_duplicate_data(&snapshot, &AnalysisContext::new(&token, &NoProgress));
        assert!(matches!(result, Err(AnalysisError::Sanity { .. })));
    }

    #[test]
    fn test_diff_repeated_names_pair_in_order() {
        let mut first = DuplicateDataItemBuilder::new(data("frag", 0x100, 4, "a.obj", &[1; 4]), "a.obj");
        first.add_referenced_compiland_if_necessary("b.obj");
        let mut second = DuplicateDataItemBuilder::new(data("frag", 0x200, 4, "c.obj", &[2; 4]), "c.obj");
        second.add_referenced_compiland_if_necessary("d.obj");
        let items = vec![
            first.mark_fully_constructed().unwrap(),
            second.mark_fully_constructed().unwrap(),
        ];

        let diffs = diff_duplicate_data(items.clone(), items).unwrap();
        assert_eq!(diffs.len(), 2);
        assert!(diffs.iter().all(|d| d.before().is_some() && d.after().is_some()));
        assert!(diffs.iter().all(|d| d.wasted_size_diff() == 0));
    }
}

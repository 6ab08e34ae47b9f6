// Copyright (C) 2026 Checkmk GmbH - License: GNU General Public License v2
// This file is part of Checkmk (https://checkmk.com). It is subject to the terms and
// conditions defined in the file COPYING, which is part of this source code package.
use rayon::prelude::*;
use serde::Serialize;
use std::ops::Add;

use crate::analysis::{Diff, NamedEntity};

#[derive(Default, Debug, Clone, PartialEq, Eq, Serialize)]
pub(crate) struct Totals {
    pub(crate) added: usize,
    pub(crate) removed: usize,
    pub(crate) grown: usize,
    pub(crate) shrunk: usize,
    pub(crate) unchanged: usize,
    pub(crate) total: usize,
}

impl Totals {
    /// Count how the entities behind `diffs` changed between the two builds.
    pub(crate) fn calculate<D, T, F>(diffs: &[D], diff_of: F) -> Self
    where
        D: Sync,
        T: NamedEntity,
        F: Fn(&D) -> &Diff<T> + Sync,
    {
        diffs
            .par_iter()
            .fold(Totals::default, |mut totals, d| {
                let diff = diff_of(d);
                match diff {
                    Diff::AfterOnly(_) => totals.added += 1,
                    Diff::BeforeOnly(_) => totals.removed += 1,
                    Diff::Both { .. } => match diff.size_diff() {
                        0 => totals.unchanged += 1,
                        change if change > 0 => totals.grown += 1,
                        _ => totals.shrunk += 1,
                    },
                }
                totals
            })
            .reduce(Totals::default, |a, b| a + b)
    }
}

impl Add for Totals {
    type Output = Self;

    fn add(self, other: Self) -> Self {
        let added = self.added + other.added;
        let removed = self.removed + other.removed;
        let grown = self.grown + other.grown;
        let shrunk = self.shrunk + other.shrunk;
        let unchanged = self.unchanged + other.unchanged;
        let total = added + removed + grown + shrunk + unchanged;
        Self {
            added,
            removed,
            grown,
            shrunk,
            unchanged,
            total,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::pair_by_name;
    use crate::snapshot::Symbol;

    fn symbol(name: &str, size: u64) -> Symbol {
        Symbol {
            name: name.to_string(),
            rva: 0,
            size,
            virtual_size: size,
        }
    }

    #[test]
    fn test_change_totals() {
        let diffs = pair_by_name(
            vec![symbol("same", 4), symbol("grow", 4), symbol("shrink", 4), symbol("gone", 4)],
            vec![symbol("same", 4), symbol("grow", 8), symbol("shrink", 2), symbol("new", 4)],
        )
        .unwrap();
        let totals = Totals::calculate(&diffs, |diff| diff);

        assert_eq!(
            totals,
            Totals {
                added: 1,
                removed: 1,
                grown: 1,
                shrunk: 1,
                unchanged: 1,
                total: 5,
            }
        );
    }

    #[test]
    fn test_change_totals_empty() {
        let diffs: Vec<Diff<Symbol>> = Vec::new();
        assert_eq!(Totals::calculate(&diffs, |diff| diff), Totals::default());
    }
}

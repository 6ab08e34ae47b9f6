// Copyright (C) 2026 Checkmk GmbH - License: GNU General Public License v2
// This file is part of Checkmk (https://checkmk.com). It is subject to the terms and
// conditions defined in the file COPYING, which is part of this source code package.

//! Pairs "before" and "after" entities by name into diffs.

use serde::{Serialize, Serializer};
use std::collections::HashMap;
use std::fmt;
use thiserror::Error;

/// Result type for pairing operations.
pub type PairingResult<T> = std::result::Result<T, PairingError>;

/// Which build an entity came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Side {
    Before,
    After,
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Side::Before => write!(f, "before"),
            Side::After => write!(f, "after"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PairingError {
    // Pairing keys must be unique per side; merging duplicates would produce wrong numbers.
    #[error("Duplicate name on the {side} side of a diff: {name}")]
    DuplicateName { side: Side, name: String },
}

/// Anything with a name and a size on disk and in memory.
pub trait NamedEntity {
    fn name(&self) -> &str;
    fn size(&self) -> u64;
    fn virtual_size(&self) -> u64;
}

/// An entity present in the "before" build, the "after" build, or both.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Diff<T> {
    BeforeOnly(T),
    AfterOnly(T),
    Both { before: T, after: T },
}

impl<T> Diff<T> {
    /// Build a diff from two optional sides. Returns `None` when both are missing.
    #[must_use]
    pub fn from_sides(before: Option<T>, after: Option<T>) -> Option<Self> {
        match (before, after) {
            (Some(before), Some(after)) => Some(Self::Both { before, after }),
            (Some(before), None) => Some(Self::BeforeOnly(before)),
            (None, Some(after)) => Some(Self::AfterOnly(after)),
            (None, None) => None,
        }
    }

    #[must_use]
    pub fn before(&self) -> Option<&T> {
        match self {
            Self::BeforeOnly(before) | Self::Both { before, .. } => Some(before),
            Self::AfterOnly(_) => None,
        }
    }

    #[must_use]
    pub fn after(&self) -> Option<&T> {
        match self {
            Self::AfterOnly(after) | Self::Both { after, .. } => Some(after),
            Self::BeforeOnly(_) => None,
        }
    }

    /// Whichever side exists, preferring "before".
    #[must_use]
    pub fn either(&self) -> &T {
        match self {
            Self::BeforeOnly(entity) | Self::AfterOnly(entity) | Self::Both { before: entity, .. } => {
                entity
            }
        }
    }

    /// Borrow both sides as a diff of references.
    #[must_use]
    pub fn as_ref(&self) -> Diff<&T> {
        match self {
            Self::BeforeOnly(before) => Diff::BeforeOnly(before),
            Self::AfterOnly(after) => Diff::AfterOnly(after),
            Self::Both { before, after } => Diff::Both { before, after },
        }
    }

    /// Convert both sides, keeping the variant.
    #[must_use]
    pub fn map<U, F>(self, f: F) -> Diff<U>
    where
        F: Fn(T) -> U,
    {
        match self {
            Self::BeforeOnly(before) => Diff::BeforeOnly(f(before)),
            Self::AfterOnly(after) => Diff::AfterOnly(f(after)),
            Self::Both { before, after } => Diff::Both {
                before: f(before),
                after: f(after),
            },
        }
    }

    /// Signed difference of a per-side quantity, treating a missing side as 0.
    #[must_use]
    pub fn delta_by<F>(&self, value: F) -> i64
    where
        F: Fn(&T) -> u64,
    {
        signed_delta(
            self.before().map_or(0, &value),
            self.after().map_or(0, &value),
        )
    }
}

impl<T: NamedEntity> Diff<T> {
    #[must_use]
    pub fn name(&self) -> &str {
        self.either().name()
    }

    #[must_use]
    pub fn size_diff(&self) -> i64 {
        self.delta_by(T::size)
    }

    #[must_use]
    pub fn virtual_size_diff(&self) -> i64 {
        self.delta_by(T::virtual_size)
    }
}

impl<T: NamedEntity> NamedEntity for &T {
    fn name(&self) -> &str {
        (*self).name()
    }

    fn size(&self) -> u64 {
        (*self).size()
    }

    fn virtual_size(&self) -> u64 {
        (*self).virtual_size()
    }
}

impl<T: NamedEntity + Serialize> Serialize for Diff<T> {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        use serde::ser::SerializeStruct;
        let mut state = serializer.serialize_struct("Diff", 5)?;
        state.serialize_field("name", self.name())?;
        state.serialize_field("size_diff", &self.size_diff())?;
        state.serialize_field("virtual_size_diff", &self.virtual_size_diff())?;
        state.serialize_field("before", &self.before())?;
        state.serialize_field("after", &self.after())?;
        state.end()
    }
}

/// `after - before` as a signed value.
#[must_use]
pub(crate) fn signed_delta(before: u64, after: u64) -> i64 {
    let before = i64::try_from(before).unwrap_or(i64::MAX);
    let after = i64::try_from(after).unwrap_or(i64::MAX);
    after.saturating_sub(before)
}

/// Pair entities by name.
///
/// # Errors
/// Returns an error if a name appears more than once on either side.
pub fn pair_by_name<T: NamedEntity>(before: Vec<T>, after: Vec<T>) -> PairingResult<Vec<Diff<T>>> {
    pair_by_key(before, after, |entity| entity.name())
}

/// Pair entities by a string key.
///
/// Matched and before-only entries come first in "before" order, followed by after-only
/// entries in "after" order.
///
/// # Errors
/// Returns an error if a key appears more than once on either side.
pub fn pair_by_key<T, F>(before: Vec<T>, after: Vec<T>, key: F) -> PairingResult<Vec<Diff<T>>>
where
    F: Fn(&T) -> &str,
{
    ensure_unique_keys(&before, &key, Side::Before)?;
    let positions = ensure_unique_keys(&after, &key, Side::After)?;

    let mut after_slots: Vec<Option<T>> = after.into_iter().map(Some).collect();
    let mut pairs = Vec::with_capacity(before.len() + after_slots.len());
    for entity in before {
        let matching = positions
            .get(key(&entity))
            .and_then(|&index| after_slots[index].take());
        pairs.push(match matching {
            Some(after) => Diff::Both {
                before: entity,
                after,
            },
            None => Diff::BeforeOnly(entity),
        });
    }
    pairs.extend(after_slots.into_iter().flatten().map(Diff::AfterOnly));
    Ok(pairs)
}

fn ensure_unique_keys<T, F>(entities: &[T], key: &F, side: Side) -> PairingResult<HashMap<String, usize>>
where
    F: Fn(&T) -> &str,
{
    let mut positions = HashMap::with_capacity(entities.len());
    for (index, entity) in entities.iter().enumerate() {
        let name = key(entity);
        if positions.insert(name.to_string(), index).is_some() {
            return Err(PairingError::DuplicateName {
                side,
                name: name.to_string(),
            });
        }
    }
    Ok(positions)
}

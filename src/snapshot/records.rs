// Copyright (C) 2026 Checkmk GmbH - License: GNU General Public License v2
// This file is part of Checkmk (https://checkmk.com). It is subject to the terms and
// conditions defined in the file COPYING, which is part of this source code package.

//! Raw records as produced by the binary/debug-info collaborator.

use serde::{Deserialize, Serialize};

/// A binary section and the COFF groups laid out inside it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SectionRecord {
    pub name: String,
    #[serde(default)]
    pub size: u64,
    #[serde(default)]
    pub virtual_size: u64,
    #[serde(default)]
    pub coff_groups: Vec<CoffGroupRecord>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CoffGroupRecord {
    pub name: String,
    #[serde(default)]
    pub size: u64,
    #[serde(default)]
    pub virtual_size: u64,
}

/// Bytes of a container that the collaborator attributed to one section and COFF group.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContributionRecord {
    pub section: String,
    pub coff_group: String,
    #[serde(default)]
    pub size: u64,
    #[serde(default)]
    pub virtual_size: u64,
}

/// An object file and the static library it was linked from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompilandRecord {
    pub name: String,
    pub lib: String,
    #[serde(default)]
    pub contributions: Vec<ContributionRecord>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceFileRecord {
    pub name: String,
    #[serde(default)]
    pub contributions: Vec<ContributionRecord>,
}

/// A symbol as seen in the binary. Symbols are identified by name across builds, RVAs shift.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Symbol {
    pub name: String,
    pub rva: u64,
    #[serde(default)]
    pub size: u64,
    #[serde(default)]
    pub virtual_size: u64,
}

/// File-static data together with the compiland referencing it and its initializer bytes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StaticDataSymbol {
    pub name: String,
    pub rva: u64,
    #[serde(default)]
    pub size: u64,
    #[serde(default)]
    pub virtual_size: u64,
    pub compiland: String,
    #[serde(default, skip_serializing)]
    pub bytes: Vec<u8>,
}

/// A function instantiated from a template.
///
/// `name` is fully qualified including the parent type, e.g. `ns::Type<int>::Function<bool>`.
/// A folded function had its body merged into another by the linker and shares that RVA.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TemplatedFunctionSymbol {
    pub name: String,
    #[serde(default)]
    pub argument_types: Vec<String>,
    #[serde(default)]
    pub is_const: bool,
    #[serde(default)]
    pub is_volatile: bool,
    pub rva: u64,
    #[serde(default)]
    pub size: u64,
    #[serde(default)]
    pub is_folded: bool,
    /// Separated code blocks of the body, more than 1 when the linker split hot and cold code.
    #[serde(default = "default_block_count")]
    pub block_count: u32,
    #[serde(default, skip_serializing)]
    pub code: Vec<u8>,
}

fn default_block_count() -> u32 {
    1
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserDefinedTypeSymbol {
    pub name: String,
    #[serde(default)]
    pub base_types: Vec<String>,
    #[serde(default)]
    pub functions: Vec<MemberFunction>,
}

/// A member function. `name` is the signature without the parent type, e.g. `Draw(int) const`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemberFunction {
    pub name: String,
    #[serde(default)]
    pub is_virtual: bool,
    #[serde(default)]
    pub is_pure: bool,
    #[serde(default)]
    pub is_static: bool,
}

impl MemberFunction {
    #[must_use]
    pub(crate) fn is_virtual_member(&self) -> bool {
        self.is_virtual && !self.is_static
    }

    // Virtual destructors are usually required, so they never count as waste.
    #[must_use]
    pub(crate) fn is_non_destructor_virtual(&self) -> bool {
        self.is_virtual_member() && !self.name.contains('~')
    }

    #[must_use]
    pub(crate) fn is_pure_virtual(&self) -> bool {
        self.is_pure && self.is_virtual_member()
    }
}

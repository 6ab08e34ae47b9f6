// Copyright (C) 2026 Checkmk GmbH - License: GNU General Public License v2
// This file is part of Checkmk (https://checkmk.com). It is subject to the terms and
// conditions defined in the file COPYING, which is part of this source code package.

//! Loads and validates the symbol snapshot of one binary build.

mod records;

pub use records::{
    CoffGroupRecord, CompilandRecord, ContributionRecord, MemberFunction, SectionRecord,
    SourceFileRecord, StaticDataSymbol, Symbol, TemplatedFunctionSymbol, UserDefinedTypeSymbol,
};

use serde::Deserialize;
use std::collections::{HashMap, HashSet};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Result type for snapshot operations.
pub type SnapshotResult<T> = std::result::Result<T, SnapshotError>;

/// Errors that can occur while loading a snapshot.
#[derive(Debug, Error)]
pub enum SnapshotError {
    #[error("Failed to read snapshot: {path:?}")]
    ReadFailed {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("Failed to parse snapshot: {origin}")]
    ParseFailed {
        origin: String,
        #[source]
        source: serde_json::Error,
    },
    #[error("Duplicate {kind} name in snapshot: {name}")]
    DuplicateName { kind: &'static str, name: String },
    #[error("Contribution of {container} references unknown section: {section}")]
    UnknownSection { container: String, section: String },
    #[error("Contribution of {container} references COFF group {coff_group} outside of section {section}")]
    UnknownCoffGroup {
        container: String,
        section: String,
        coff_group: String,
    },
    #[error("Invalid bytes per word: {bytes_per_word}")]
    InvalidBytesPerWord { bytes_per_word: u32 },
    #[error("Contributions of {kind}s to {location} sum to {contributed} bytes, more than its {size} bytes")]
    ContributionsExceedSize {
        kind: &'static str,
        location: String,
        contributed: u64,
        size: u64,
    },
    #[error("Size of {what} overflows")]
    SizeOverflow { what: String },
}

const DEFAULT_BYTES_PER_WORD: u32 = 8;

fn default_bytes_per_word() -> u32 {
    DEFAULT_BYTES_PER_WORD
}

/// Everything the collaborator extracted from one binary.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Snapshot {
    #[serde(default)]
    pub(crate) binary: String,
    #[serde(default = "default_bytes_per_word")]
    pub(crate) bytes_per_word: u32,
    #[serde(default)]
    pub(crate) sections: Vec<SectionRecord>,
    #[serde(default)]
    pub(crate) compilands: Vec<CompilandRecord>,
    #[serde(default)]
    pub(crate) source_files: Vec<SourceFileRecord>,
    #[serde(default)]
    pub(crate) symbols: Vec<Symbol>,
    #[serde(default)]
    pub(crate) static_data: Vec<StaticDataSymbol>,
    #[serde(default)]
    pub(crate) templated_functions: Vec<TemplatedFunctionSymbol>,
    #[serde(default)]
    pub(crate) user_defined_types: Vec<UserDefinedTypeSymbol>,
}

impl Default for Snapshot {
    fn default() -> Self {
        Self {
            binary: String::new(),
            bytes_per_word: DEFAULT_BYTES_PER_WORD,
            sections: Vec::new(),
            compilands: Vec::new(),
            source_files: Vec::new(),
            symbols: Vec::new(),
            static_data: Vec::new(),
            templated_functions: Vec::new(),
            user_defined_types: Vec::new(),
        }
    }
}

impl Snapshot {
    /// Read and validate a snapshot from a JSON file.
    ///
    /// # Errors
    /// Returns an error if the file cannot be read, is not a valid snapshot document,
    /// or fails validation.
    pub fn from_file<P: AsRef<Path>>(path: P) -> SnapshotResult<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).map_err(|e| SnapshotError::ReadFailed {
            path: path.to_path_buf(),
            source: e,
        })?;
        Self::parse(&content, &path.display().to_string())
    }

    /// Parse and validate a snapshot from a JSON string.
    ///
    /// # Errors
    /// Returns an error if the string is not a valid snapshot document or fails validation.
    pub fn from_json(content: &str) -> SnapshotResult<Self> {
        Self::parse(content, "<string>")
    }

    fn parse(content: &str, origin: &str) -> SnapshotResult<Self> {
        let snapshot: Self =
            serde_json::from_str(content).map_err(|e| SnapshotError::ParseFailed {
                origin: origin.to_string(),
                source: e,
            })?;
        snapshot.validate()?;
        Ok(snapshot)
    }

    /// Check the invariants the analyses rely on.
    ///
    /// Names used as pairing keys must be unique, and every contribution must point at a
    /// COFF group that lives inside the named section. Compilands, and separately source
    /// files, must not attribute more bytes to a section or COFF group than it holds, and
    /// no size total may overflow.
    ///
    /// # Errors
    /// Returns the first violation found.
    pub fn validate(&self) -> SnapshotResult<()> {
        if self.bytes_per_word == 0 {
            return Err(SnapshotError::InvalidBytesPerWord {
                bytes_per_word: self.bytes_per_word,
            });
        }

        ensure_unique("section", self.sections.iter().map(|s| s.name.as_str()))?;
        ensure_unique(
            "COFF group",
            self.sections
                .iter()
                .flat_map(|s| s.coff_groups.iter().map(|g| g.name.as_str())),
        )?;
        ensure_unique("compiland", self.compilands.iter().map(|c| c.name.as_str()))?;
        ensure_unique(
            "source file",
            self.source_files.iter().map(|f| f.name.as_str()),
        )?;
        ensure_unique("symbol", self.symbols.iter().map(|s| s.name.as_str()))?;
        ensure_unique(
            "user-defined type",
            self.user_defined_types.iter().map(|t| t.name.as_str()),
        )?;

        let layout: HashMap<&str, HashSet<&str>> = self
            .sections
            .iter()
            .map(|s| {
                (
                    s.name.as_str(),
                    s.coff_groups.iter().map(|g| g.name.as_str()).collect(),
                )
            })
            .collect();
        for compiland in &self.compilands {
            check_contributions(&layout, &compiland.name, &compiland.contributions)?;
        }
        for source_file in &self.source_files {
            check_contributions(&layout, &source_file.name, &source_file.contributions)?;
        }

        check_coverage(
            "compiland",
            &self.sections,
            self.compilands.iter().flat_map(|c| &c.contributions),
        )?;
        check_coverage(
            "source file",
            &self.sections,
            self.source_files.iter().flat_map(|f| &f.contributions),
        )?;
        checked_total("all sections", self.sections.iter().map(|s| s.size))?;
        checked_total("all sections in memory", self.sections.iter().map(|s| s.virtual_size))?;
        checked_total(
            "all static data and templated functions",
            self.static_data
                .iter()
                .map(|d| d.size)
                .chain(self.templated_functions.iter().map(|f| f.size)),
        )?;
        if let Some(function) = self
            .templated_functions
            .iter()
            .find(|f| f.rva.checked_add(f.size).is_none())
        {
            return Err(SnapshotError::SizeOverflow {
                what: format!("code range of {}", function.name),
            });
        }
        Ok(())
    }

    /// Name of the analyzed binary.
    #[must_use]
    pub fn binary(&self) -> &str {
        &self.binary
    }

    #[must_use]
    pub fn bytes_per_word(&self) -> u32 {
        self.bytes_per_word
    }

    #[must_use]
    pub fn sections(&self) -> &[SectionRecord] {
        &self.sections
    }

    #[must_use]
    pub fn compilands(&self) -> &[CompilandRecord] {
        &self.compilands
    }

    #[must_use]
    pub fn source_files(&self) -> &[SourceFileRecord] {
        &self.source_files
    }

    #[must_use]
    pub fn symbols(&self) -> &[Symbol] {
        &self.symbols
    }

    #[must_use]
    pub fn static_data(&self) -> &[StaticDataSymbol] {
        &self.static_data
    }

    #[must_use]
    pub fn templated_functions(&self) -> &[TemplatedFunctionSymbol] {
        &self.templated_functions
    }

    #[must_use]
    pub fn user_defined_types(&self) -> &[UserDefinedTypeSymbol] {
        &self.user_defined_types
    }

    #[cfg(test)]
    /// Create an empty snapshot for the given binary name.
    /// This is only available in test builds.
    pub(crate) fn new_for_testing(binary: &str) -> Self {
        Self {
            binary: binary.to_string(),
            ..Self::default()
        }
    }
}

fn ensure_unique<'a>(kind: &'static str, names: impl Iterator<Item = &'a str>) -> SnapshotResult<()> {
    let mut seen = HashSet::new();
    for name in names {
        if !seen.insert(name) {
            return Err(SnapshotError::DuplicateName {
                kind,
                name: name.to_string(),
            });
        }
    }
    Ok(())
}

fn check_contributions(
    layout: &HashMap<&str, HashSet<&str>>,
    container: &str,
    contributions: &[ContributionRecord],
) -> SnapshotResult<()> {
    for contribution in contributions {
        let Some(groups) = layout.get(contribution.section.as_str()) else {
            return Err(SnapshotError::UnknownSection {
                container: container.to_string(),
                section: contribution.section.clone(),
            });
        };
        if !groups.contains(contribution.coff_group.as_str()) {
            return Err(SnapshotError::UnknownCoffGroup {
                container: container.to_string(),
                section: contribution.section.clone(),
                coff_group: contribution.coff_group.clone(),
            });
        }
    }
    Ok(())
}

/// Sum contributions per section and per COFF group and compare against the recorded sizes.
fn check_coverage<'a>(
    kind: &'static str,
    sections: &'a [SectionRecord],
    contributions: impl Iterator<Item = &'a ContributionRecord>,
) -> SnapshotResult<()> {
    let mut totals: HashMap<(&'static str, &'a str), (u64, u64)> = HashMap::new();
    for contribution in contributions {
        for key in [
            ("section", contribution.section.as_str()),
            ("COFF group", contribution.coff_group.as_str()),
        ] {
            let (size, virtual_size) = totals.entry(key).or_default();
            let (Some(new_size), Some(new_virtual_size)) = (
                size.checked_add(contribution.size),
                virtual_size.checked_add(contribution.virtual_size),
            ) else {
                return Err(SnapshotError::SizeOverflow {
                    what: format!("{kind} contributions to {} {}", key.0, key.1),
                });
            };
            *size = new_size;
            *virtual_size = new_virtual_size;
        }
    }

    let within = |location: &'static str, name: &'a str, size: u64| {
        let contributed = totals.get(&(location, name)).map_or(0, |&(contributed, _)| contributed);
        if contributed > size {
            return Err(SnapshotError::ContributionsExceedSize {
                kind,
                location: format!("{location} {name}"),
                contributed,
                size,
            });
        }
        Ok(())
    };
    for section in sections {
        within("section", &section.name, section.size)?;
        for group in &section.coff_groups {
            within("COFF group", &group.name, group.size)?;
        }
    }
    Ok(())
}

fn checked_total(what: &str, mut sizes: impl Iterator<Item = u64>) -> SnapshotResult<()> {
    sizes
        .try_fold(0u64, u64::checked_add)
        .map(|_| ())
        .ok_or_else(|| SnapshotError::SizeOverflow {
            what: what.to_string(),
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    const MINIMAL: &str = r#"{
        "binary": "app.dll",
        "sections": [
            {"name": ".text", "size": 100, "virtual_size": 100,
             "coff_groups": [{"name": ".text$mn", "size": 100, "virtual_size": 100}]}
        ],
        "compilands": [
            {"name": "a.obj", "lib": "a.lib",
             "contributions": [{"section": ".text", "coff_group": ".text$mn", "size": 60, "virtual_size": 60}]}
        ]
    }"#;

    #[test]
    fn test_from_json_minimal() {
        let snapshot = Snapshot::from_json(MINIMAL).unwrap();
        assert_eq!(snapshot.binary(), "app.dll");
        assert_eq!(snapshot.bytes_per_word(), DEFAULT_BYTES_PER_WORD);
        assert_eq!(snapshot.sections().len(), 1);
        assert_eq!(snapshot.compilands()[0].contributions[0].size, 60);
        assert!(snapshot.static_data().is_empty());
        assert!(snapshot.user_defined_types().is_empty());
    }

    #[test]
    fn test_from_file() {
        let mut file = NamedTempFile::new().unwrap();
        write!(file, "{MINIMAL}").unwrap();
        file.flush().unwrap();

        let snapshot = Snapshot::from_file(file.path()).unwrap();
        assert_eq!(snapshot.compilands().len(), 1);
    }

    #[test]
    fn test_file_not_found() {
        let result = Snapshot::from_file("/nonexistent/snapshot.json");
        assert!(matches!(result, Err(SnapshotError::ReadFailed { .. })));
    }

    #[test]
    fn test_invalid_json() {
        let result = Snapshot::from_json("{ not json");
        assert!(matches!(result, Err(SnapshotError::ParseFailed { .. })));
    }

    #[test]
    fn test_duplicate_compiland_rejected() {
        let mut snapshot = Snapshot::new_for_testing("app.dll");
        for _ in 0..2 {
            snapshot.compilands.push(CompilandRecord {
                name: "a.obj".to_string(),
                lib: "a.lib".to_string(),
                contributions: Vec::new(),
            });
        }
        match snapshot.validate() {
            Err(SnapshotError::DuplicateName { kind, name }) => {
                assert_eq!(kind, "compiland");
                assert_eq!(name, "a.obj");
            }
            other => panic!("Expected duplicate name error, got {other:?}"),
        }
    }

    #[test]
    fn test_unknown_section_rejected() {
        let mut snapshot = Snapshot::from_json(MINIMAL).unwrap();
        snapshot.compilands[0].contributions[0].section = ".data".to_string();
        assert!(matches!(
            snapshot.validate(),
            Err(SnapshotError::UnknownSection { .. })
        ));
    }

    #[test]
    fn test_coff_group_in_wrong_section_rejected() {
        let mut snapshot = Snapshot::from_json(MINIMAL).unwrap();
        snapshot.sections.push(SectionRecord {
            name: ".data".to_string(),
            size: 0,
            virtual_size: 0,
            coff_groups: Vec::new(),
        });
        snapshot.compilands[0].contributions[0].section = ".data".to_string();
        assert!(matches!(
            snapshot.validate(),
            Err(SnapshotError::UnknownCoffGroup { .. })
        ));
    }

    fn contribution(section: &str, coff_group: &str, size: u64) -> ContributionRecord {
        ContributionRecord {
            section: section.to_string(),
            coff_group: coff_group.to_string(),
            size,
            virtual_size: size,
        }
    }

    fn text_snapshot(groups: &[(&str, u64)], compilands: &[(&str, &str, u64)]) -> Snapshot {
        let mut snapshot = Snapshot::new_for_testing("app.dll");
        snapshot.sections.push(SectionRecord {
            name: ".text".to_string(),
            size: groups.iter().map(|(_, size)| size).sum(),
            virtual_size: 0,
            coff_groups: groups
                .iter()
                .map(|(name, size)| CoffGroupRecord {
                    name: (*name).to_string(),
                    size: *size,
                    virtual_size: *size,
                })
                .collect(),
        });
        for (name, group, size) in compilands {
            snapshot.compilands.push(CompilandRecord {
                name: (*name).to_string(),
                lib: "a.lib".to_string(),
                contributions: vec![contribution(".text", group, *size)],
            });
        }
        snapshot
    }

    #[test]
    fn test_contributions_within_section_accepted() {
        let snapshot = text_snapshot(&[(".text$mn", 400)], &[("a.obj", ".text$mn", 300), ("b.obj", ".text$mn", 100)]);
        snapshot.validate().unwrap();
    }

    #[test]
    fn test_contributions_exceeding_section_rejected() {
        let snapshot = text_snapshot(&[(".text$mn", 400)], &[("a.obj", ".text$mn", 500), ("b.obj", ".text$mn", 100)]);
        match snapshot.validate() {
            Err(SnapshotError::ContributionsExceedSize {
                kind,
                location,
                contributed,
                size,
            }) => {
                assert_eq!(kind, "compiland");
                assert_eq!(location, "section .text");
                assert_eq!(contributed, 600);
                assert_eq!(size, 400);
            }
            other => panic!("Expected contributions to exceed the section, got {other:?}"),
        }
    }

    #[test]
    fn test_contributions_exceeding_coff_group_rejected() {
        let snapshot = text_snapshot(&[(".text$mn", 300), (".text$zz", 100)], &[("a.obj", ".text$zz", 200)]);
        assert!(matches!(
            snapshot.validate(),
            Err(SnapshotError::ContributionsExceedSize { ref location, .. }) if location == "COFF group .text$zz"
        ));
    }

    #[test]
    fn test_source_file_contributions_bounded() {
        let mut snapshot = text_snapshot(&[(".text$mn", 100)], &[("a.obj", ".text$mn", 100)]);
        for name in ["a.cpp", "b.cpp"] {
            snapshot.source_files.push(SourceFileRecord {
                name: name.to_string(),
                contributions: vec![contribution(".text", ".text$mn", 60)],
            });
        }
        assert!(matches!(
            snapshot.validate(),
            Err(SnapshotError::ContributionsExceedSize { kind: "source file", .. })
        ));
    }

    #[test]
    fn test_overflowing_contributions_rejected() {
        let mut snapshot = text_snapshot(&[(".text$mn", u64::MAX)], &[("a.obj", ".text$mn", u64::MAX)]);
        snapshot.compilands[0].contributions.push(contribution(".text", ".text$mn", 1));
        assert!(matches!(
            snapshot.validate(),
            Err(SnapshotError::SizeOverflow { .. })
        ));
    }

    #[test]
    fn test_overflowing_section_total_rejected() {
        let mut snapshot = text_snapshot(&[(".text$mn", u64::MAX)], &[]);
        snapshot.sections.push(SectionRecord {
            name: ".data".to_string(),
            size: 1,
            virtual_size: 1,
            coff_groups: Vec::new(),
        });
        assert!(matches!(
            snapshot.validate(),
            Err(SnapshotError::SizeOverflow { ref what }) if what == "all sections"
        ));
    }

    #[test]
    fn test_overflowing_code_range_rejected() {
        let mut snapshot = Snapshot::new_for_testing("app.dll");
        snapshot.templated_functions.push(TemplatedFunctionSymbol {
            name: "Foo<int>".to_string(),
            argument_types: Vec::new(),
            is_const: false,
            is_volatile: false,
            rva: u64::MAX,
            size: 1,
            is_folded: false,
            block_count: 1,
            code: Vec::new(),
        });
        assert!(matches!(
            snapshot.validate(),
            Err(SnapshotError::SizeOverflow { .. })
        ));
    }

    #[test]
    fn test_zero_bytes_per_word_rejected() {
        let mut snapshot = Snapshot::new_for_testing("app.dll");
        snapshot.bytes_per_word = 0;
        assert!(matches!(
            snapshot.validate(),
            Err(SnapshotError::InvalidBytesPerWord { .. })
        ));
    }
}

// Copyright (C) 2026 Checkmk GmbH - License: GNU General Public License v2
// This file is part of Checkmk (https://checkmk.com). It is subject to the terms and
// conditions defined in the file COPYING, which is part of this source code package.

//! One analysis pass over a snapshot, or over two snapshots in diff mode.

use serde::Serialize;

use super::containers::{
    build_compilands, build_libs, build_sections, build_source_files, check_contribution_sums,
    check_coverage, diff_containers, diff_sections, BinarySection, BinarySectionDiff, Compiland,
    CompilandDiff, Lib, LibDiff, SourceFile, SourceFileDiff,
};
use super::context::{AnalysisContext, AnalysisResult};
use super::contributions::{coff_groups_in, contribution_columns, sections_in, Column, Container};
use super::diff::{pair_by_name, Diff, NamedEntity};
use super::duplicate_data::{diff_duplicate_data, find_duplicate_data, DuplicateDataItem, DuplicateDataItemDiff};
use super::template_foldability::{
    diff_template_foldability, find_template_foldability, CodeSimilarity, TemplateFoldabilityItem,
    TemplateFoldabilityItemDiff,
};
use super::wasteful_virtual::{diff_wasteful_virtuals, find_wasteful_virtuals, WastefulVirtualItem, WastefulVirtualItemDiff};
use crate::snapshot::{Snapshot, Symbol};

pub const DEFAULT_EXAMPLE_SYMBOL_COUNT: usize = 5;

/// Knobs of an analysis pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AnalysisOptions {
    /// Leave COM and WinRT types out of the wasteful virtual results.
    pub exclude_com_types: bool,
    /// How many instantiation names to show per template foldability item.
    pub example_symbol_count: usize,
}

impl Default for AnalysisOptions {
    fn default() -> Self {
        Self {
            exclude_com_types: false,
            example_symbol_count: DEFAULT_EXAMPLE_SYMBOL_COUNT,
        }
    }
}

impl NamedEntity for Symbol {
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

pub type SymbolDiff = Diff<Symbol>;

/// Everything known about one binary once a pass completed.
#[derive(Debug, Clone, Serialize)]
pub struct SingleBinaryAnalysis {
    binary: String,
    bytes_per_word: u32,
    sections: Vec<BinarySection>,
    libs: Vec<Lib>,
    compilands: Vec<Compiland>,
    source_files: Vec<SourceFile>,
    symbols: Vec<Symbol>,
    duplicate_data: Vec<DuplicateDataItem>,
    template_foldability: Vec<TemplateFoldabilityItem>,
    wasteful_virtuals: Vec<WastefulVirtualItem>,
}

fn find_by_name<'a, T: NamedEntity>(entities: &'a [T], name: &str) -> Option<&'a T> {
    entities.iter().find(|entity| entity.name() == name)
}

fn columns_of<C: Container>(containers: &[C]) -> Vec<Column<'_>> {
    contribution_columns(&sections_in(containers), &coff_groups_in(containers))
}

impl SingleBinaryAnalysis {
    #[must_use]
    pub fn binary(&self) -> &str {
        &self.binary
    }

    #[must_use]
    pub fn bytes_per_word(&self) -> u32 {
        self.bytes_per_word
    }

    #[must_use]
    pub fn sections(&self) -> &[BinarySection] {
        &self.sections
    }

    #[must_use]
    pub fn libs(&self) -> &[Lib] {
        &self.libs
    }

    #[must_use]
    pub fn compilands(&self) -> &[Compiland] {
        &self.compilands
    }

    #[must_use]
    pub fn source_files(&self) -> &[SourceFile] {
        &self.source_files
    }

    #[must_use]
    pub fn symbols(&self) -> &[Symbol] {
        &self.symbols
    }

    #[must_use]
    pub fn duplicate_data(&self) -> &[DuplicateDataItem] {
        &self.duplicate_data
    }

    #[must_use]
    pub fn template_foldability(&self) -> &[TemplateFoldabilityItem] {
        &self.template_foldability
    }

    #[must_use]
    pub fn wasteful_virtuals(&self) -> &[WastefulVirtualItem] {
        &self.wasteful_virtuals
    }

    #[must_use]
    pub fn section_by_name(&self, name: &str) -> Option<&BinarySection> {
        find_by_name(&self.sections, name)
    }

    #[must_use]
    pub fn lib_by_name(&self, name: &str) -> Option<&Lib> {
        find_by_name(&self.libs, name)
    }

    #[must_use]
    pub fn compiland_by_name(&self, name: &str) -> Option<&Compiland> {
        find_by_name(&self.compilands, name)
    }

    #[must_use]
    pub fn source_file_by_name(&self, name: &str) -> Option<&SourceFile> {
        find_by_name(&self.source_files, name)
    }

    /// Section and COFF group columns of the lib table.
    #[must_use]
    pub fn lib_columns(&self) -> Vec<Column<'_>> {
        columns_of(&self.libs)
    }

    #[must_use]
    pub fn compiland_columns(&self) -> Vec<Column<'_>> {
        columns_of(&self.compilands)
    }

    #[must_use]
    pub fn source_file_columns(&self) -> Vec<Column<'_>> {
        columns_of(&self.source_files)
    }
}

#[cfg(test)]
impl SingleBinaryAnalysis {
    /// Aggregate the snapshot's sections, compilands and libs, appending `extra_compilands`,
    /// without the consistency checks `analyze` runs. The waste analyses are left empty.
    /// This is only available in test builds.
    pub(crate) fn new_for_testing(snapshot: &Snapshot, extra_compilands: Vec<Compiland>) -> Self {
        use super::context::{CancellationToken, NoProgress};

        let token = CancellationToken::new();
        let context = AnalysisContext::new(&token, &NoProgress);
        let mut compilands = build_compilands(snapshot, &context).unwrap();
        compilands.extend(extra_compilands);
        let libs = build_libs(&compilands, &context).unwrap();
        Self {
            binary: snapshot.binary().to_string(),
            bytes_per_word: snapshot.bytes_per_word(),
            sections: build_sections(snapshot),
            libs,
            compilands,
            source_files: build_source_files(snapshot, &context).unwrap(),
            symbols: snapshot.symbols().to_vec(),
            duplicate_data: Vec::new(),
            template_foldability: Vec::new(),
            wasteful_virtuals: Vec::new(),
        }
    }
}

/// Run every analysis over one snapshot.
///
/// Nothing is returned unless every step completed.
///
/// # Errors
/// Returns an error if the pass is canceled, or a sanity error if size arithmetic overflows
/// or the compilands or source files claim more bytes than a section or COFF group holds.
pub fn analyze(
    snapshot: &Snapshot,
    options: &AnalysisOptions,
    similarity: &dyn CodeSimilarity,
    context: &AnalysisContext<'_>,
) -> AnalysisResult<SingleBinaryAnalysis> {
    log::info!("Analyzing binary: binary={}", snapshot.binary());
    context.checkpoint()?;

    let sections = build_sections(snapshot);
    let compilands = build_compilands(snapshot, context)?;
    let libs = build_libs(&compilands, context)?;
    let source_files = build_source_files(snapshot, context)?;
    check_coverage("Compiland", &sections, &compilands)?;
    check_coverage("Source file", &sections, &source_files)?;
    let duplicate_data = find_duplicate_data(snapshot, context)?;
    let template_foldability = find_template_foldability(snapshot, similarity, context)?;
    let wasteful_virtuals = find_wasteful_virtuals(snapshot, options.exclude_com_types, context)?;

    log::info!(
        "Analysis completed: binary={}, libs={}, compilands={}, duplicate_data={}, template_foldability={}, wasteful_virtuals={}",
        snapshot.binary(),
        libs.len(),
        compilands.len(),
        duplicate_data.len(),
        template_foldability.len(),
        wasteful_virtuals.len()
    );
    Ok(SingleBinaryAnalysis {
        binary: snapshot.binary().to_string(),
        bytes_per_word: snapshot.bytes_per_word(),
        sections,
        libs,
        compilands,
        source_files,
        symbols: snapshot.symbols().to_vec(),
        duplicate_data,
        template_foldability,
        wasteful_virtuals,
    })
}

/// Two builds of one binary, paired entity by entity.
#[derive(Debug, Clone, Serialize)]
pub struct DiffAnalysis {
    before_binary: String,
    after_binary: String,
    sections: Vec<BinarySectionDiff>,
    libs: Vec<LibDiff>,
    compilands: Vec<CompilandDiff>,
    source_files: Vec<SourceFileDiff>,
    symbols: Vec<SymbolDiff>,
    duplicate_data: Vec<DuplicateDataItemDiff>,
    template_foldability: Vec<TemplateFoldabilityItemDiff>,
    wasteful_virtuals: Vec<WastefulVirtualItemDiff>,
}

impl DiffAnalysis {
    /// Pair two completed single-binary analyses.
    ///
    /// # Errors
    /// Returns an error if the pass is canceled or a pairing key is duplicated, or a sanity
    /// error if a container's contribution diffs do not add up to its size diff.
    pub fn new(
        before: SingleBinaryAnalysis,
        after: SingleBinaryAnalysis,
        context: &AnalysisContext<'_>,
    ) -> AnalysisResult<Self> {
        context.checkpoint()?;
        let sections = diff_sections(before.sections, after.sections)?;
        let libs = diff_containers("Diffing libs", before.libs, after.libs, context)?;
        let compilands = diff_containers("Diffing compilands", before.compilands, after.compilands, context)?;
        let source_files = diff_containers("Diffing source files", before.source_files, after.source_files, context)?;
        check_contribution_sums("Lib", &libs)?;
        check_contribution_sums("Compiland", &compilands)?;
        check_contribution_sums("Source file", &source_files)?;
        context.checkpoint()?;
        let symbols = pair_by_name(before.symbols, after.symbols)?;
        let duplicate_data = diff_duplicate_data(before.duplicate_data, after.duplicate_data)?;
        let template_foldability = diff_template_foldability(before.template_foldability, after.template_foldability)?;
        let wasteful_virtuals = diff_wasteful_virtuals(before.wasteful_virtuals, after.wasteful_virtuals)?;
        context.checkpoint()?;

        Ok(Self {
            before_binary: before.binary,
            after_binary: after.binary,
            sections,
            libs,
            compilands,
            source_files,
            symbols,
            duplicate_data,
            template_foldability,
            wasteful_virtuals,
        })
    }

    #[must_use]
    pub fn before_binary(&self) -> &str {
        &self.before_binary
    }

    #[must_use]
    pub fn after_binary(&self) -> &str {
        &self.after_binary
    }

    #[must_use]
    pub fn sections(&self) -> &[BinarySectionDiff] {
        &self.sections
    }

    #[must_use]
    pub fn libs(&self) -> &[LibDiff] {
        &self.libs
    }

    #[must_use]
    pub fn compilands(&self) -> &[CompilandDiff] {
        &self.compilands
    }

    #[must_use]
    pub fn source_files(&self) -> &[SourceFileDiff] {
        &self.source_files
    }

    #[must_use]
    pub fn symbols(&self) -> &[SymbolDiff] {
        &self.symbols
    }

    #[must_use]
    pub fn duplicate_data(&self) -> &[DuplicateDataItemDiff] {
        &self.duplicate_data
    }

    #[must_use]
    pub fn template_foldability(&self) -> &[TemplateFoldabilityItemDiff] {
        &self.template_foldability
    }

    #[must_use]
    pub fn wasteful_virtuals(&self) -> &[WastefulVirtualItemDiff] {
        &self.wasteful_virtuals
    }

    #[must_use]
    pub fn section_diff_by_name(&self, name: &str) -> Option<&BinarySectionDiff> {
        self.sections.iter().find(|diff| diff.name() == name)
    }

    #[must_use]
    pub fn lib_diff_by_name(&self, name: &str) -> Option<&LibDiff> {
        self.libs.iter().find(|diff| diff.name() == name)
    }

    #[must_use]
    pub fn compiland_diff_by_name(&self, name: &str) -> Option<&CompilandDiff> {
        self.compilands.iter().find(|diff| diff.name() == name)
    }

    #[must_use]
    pub fn source_file_diff_by_name(&self, name: &str) -> Option<&SourceFileDiff> {
        self.source_files.iter().find(|diff| diff.name() == name)
    }
}

/// Analyze two builds in parallel and pair the results.
///
/// # Errors
/// Returns an error if either pass is canceled or a pairing key is duplicated.
pub fn analyze_diff(
    before: &Snapshot,
    after: &Snapshot,
    options: &AnalysisOptions,
    similarity: &dyn CodeSimilarity,
    context: &AnalysisContext<'_>,
) -> AnalysisResult<DiffAnalysis> {
    let (before, after) = rayon::join(
        || analyze(before, options, similarity, context),
        || analyze(after, options, similarity, context),
    );
    DiffAnalysis::new(before?, after?, context)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::containers::tests::{compiland, section};
    use crate::analysis::context::{AnalysisError, CancellationToken, NoProgress};
    use crate::analysis::contributions::sum_of_section_diffs;
    use crate::analysis::template_foldability::ByteSimilarity;
    use crate::snapshot::{MemberFunction, StaticDataSymbol, UserDefinedTypeSymbol};

    fn symbol(name: &str, rva: u64, size: u64) -> Symbol {
        Symbol {
            name: name.to_string(),
            rva,
            size,
            virtual_size: size,
        }
    }

    fn snapshot(binary: &str, text: u64, extra_compiland: bool) -> Snapshot {
        let mut snapshot = Snapshot::new_for_testing(binary);
        snapshot.sections = vec![section(".text", text, &[(".text$mn", text)])];
        snapshot.compilands = vec![compiland("main.obj", "app.lib", &[(".text", ".text$mn", 100)])];
        if extra_compiland {
            snapshot
                .compilands
                .push(compiland("extra.obj", "extra.lib", &[(".text", ".text$mn", text - 100)]));
        }
        snapshot.symbols = vec![symbol("main", 0x1000, 100)];
        snapshot.static_data = ["a.obj", "b.obj"]
            .iter()
            .enumerate()
            .map(|(i, compiland)| StaticDataSymbol {
                name: "kTable".to_string(),
                rva: 0x2000 + i as u64 * 0x100,
                size: 16,
                virtual_size: 16,
                compiland: (*compiland).to_string(),
                bytes: vec![0; 16],
            })
            .collect();
        snapshot.user_defined_types = vec![
            UserDefinedTypeSymbol {
                name: "Base".to_string(),
                base_types: Vec::new(),
                functions: vec![MemberFunction {
                    name: "Run()".to_string(),
                    is_virtual: true,
                    is_pure: false,
                    is_static: false,
                }],
            },
            UserDefinedTypeSymbol {
                name: "Derived".to_string(),
                base_types: vec!["Base".to_string()],
                functions: Vec::new(),
            },
        ];
        snapshot
    }

    fn run(snapshot: &Snapshot) -> SingleBinaryAnalysis {
        let token = CancellationToken::new();
        let context = AnalysisContext::new(&token, &NoProgress);
        analyze(snapshot, &AnalysisOptions::default(), &ByteSimilarity, &context).unwrap()
    }

    #[test]
    fn test_analyze_single_binary() {
        let analysis = run(&snapshot("app.dll", 100, false));

        assert_eq!(analysis.binary(), "app.dll");
        assert_eq!(analysis.lib_by_name("app.lib").unwrap().size(), 100);
        assert_eq!(analysis.compiland_by_name("main.obj").unwrap().lib(), "app.lib");
        assert!(analysis.compiland_by_name("missing.obj").is_none());
        assert_eq!(analysis.section_by_name(".text").unwrap().size(), 100);
        assert_eq!(analysis.duplicate_data().len(), 1);
        assert_eq!(analysis.wasteful_virtuals().len(), 1);

        let labels: Vec<String> = analysis.compiland_columns().iter().map(ToString::to_string).collect();
        assert_eq!(labels, vec!["Section: .text", "COFF Group: .text$mn"]);
    }

    #[test]
    fn test_analyze_diff() {
        let token = CancellationToken::new();
        let context = AnalysisContext::new(&token, &NoProgress);
        let diff = analyze_diff(
            &snapshot("app.dll", 100, false),
            &snapshot("app.dll", 400, true),
            &AnalysisOptions::default(),
            &ByteSimilarity,
            &context,
        )
        .unwrap();

        assert_eq!(diff.section_diff_by_name(".text").unwrap().size_diff(), 300);
        let extra = diff.compiland_diff_by_name("extra.obj").unwrap();
        assert!(extra.before().is_none());
        assert_eq!(extra.size_diff(), 300);
        assert_eq!(diff.lib_diff_by_name("app.lib").unwrap().size_diff(), 0);

        let compiland_sum: i64 = diff
            .compilands()
            .iter()
            .map(|c| c.contribution_diffs().section_size_diff(".text"))
            .sum();
        assert_eq!(compiland_sum, 300);
        for compiland in diff.compilands() {
            assert_eq!(sum_of_section_diffs(compiland.contribution_diffs()), compiland.size_diff());
        }

        assert_eq!(diff.symbols().len(), 1);
        assert_eq!(diff.duplicate_data().len(), 1);
        assert_eq!(diff.duplicate_data()[0].wasted_size_diff(), 0);
        // Unchanged waste is dropped from the diff.
        assert!(diff.wasteful_virtuals().is_empty());
    }

    #[test]
    fn test_canceled_pass_publishes_nothing() {
        let token = CancellationToken::new();
        token.cancel();
        let context = AnalysisContext::new(&token, &NoProgress);
        let result = analyze(
            &snapshot("app.dll", 100, false),
            &AnalysisOptions::default(),
            &ByteSimilarity,
            &context,
        );
        assert!(matches!(result, Err(AnalysisError::Canceled)));
    }

    #[test]
    fn test_compilands_exceeding_section_fail_analysis() {
        let mut grown = snapshot("app.dll", 400, false);
        grown.compilands = vec![
            compiland("a.obj", "app.lib", &[(".text", ".text$mn", 500)]),
            compiland("b.obj", "app.lib", &[(".text", ".text$mn", 100)]),
        ];
        let token = CancellationToken::new();
        let context = AnalysisContext::new(&token, &NoProgress);
        let result = analyze(&grown, &AnalysisOptions::default(), &ByteSimilarity, &context);
        assert!(matches!(result, Err(AnalysisError::Sanity { .. })));

        let result = analyze_diff(
            &snapshot("app.dll", 400, true),
            &grown,
            &AnalysisOptions::default(),
            &ByteSimilarity,
            &context,
        );
        assert!(matches!(result, Err(AnalysisError::Sanity { .. })));
    }

    #[test]
    fn test_overflowing_contributions_fail_analysis() {
        let mut huge = snapshot("app.dll", u64::MAX, false);
        huge.compilands = vec![compiland(
            "main.obj",
            "app.lib",
            &[(".text", ".text$mn", 100), (".text", ".text$mn", u64::MAX)],
        )];
        let token = CancellationToken::new();
        let context = AnalysisContext::new(&token, &NoProgress);
        let result = analyze(&huge, &AnalysisOptions::default(), &ByteSimilarity, &context);
        assert!(matches!(result, Err(AnalysisError::Sanity { .. })));
    }

    #[test]
    fn test_default_options() {
        let options = AnalysisOptions::default();
        assert!(!options.exclude_com_types);
        assert_eq!(options.example_symbol_count, 5);
    }
}

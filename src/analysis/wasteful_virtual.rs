// Copyright (C) 2026 Checkmk GmbH - License: GNU General Public License v2
// This file is part of Checkmk (https://checkmk.com). It is subject to the terms and
// conditions defined in the file COPYING, which is part of this source code package.

//! Virtual functions whose vtable slots buy no polymorphism anywhere in the hierarchy.

use indexmap::{IndexMap, IndexSet};
use serde::{Serialize, Serializer};

use super::context::{AnalysisContext, AnalysisResult};
use super::diff::{pair_by_key, signed_delta, Diff, PairingResult};
use crate::snapshot::{MemberFunction, Snapshot, UserDefinedTypeSymbol};

/// A virtual function wasting one slot in every vtable of its hierarchy.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct WastedOverride {
    pub type_name: String,
    pub function: String,
}

impl WastedOverride {
    fn new(type_name: &str, function: &MemberFunction) -> Self {
        Self {
            type_name: type_name.to_string(),
            function: function.name.clone(),
        }
    }
}

/// A wasteful virtual item whose derived types are still being discovered.
#[derive(Debug)]
pub struct WastefulVirtualItemBuilder {
    type_name: String,
    is_com_type: bool,
    bytes_per_word: u32,
    derived_types: IndexSet<String>,
    pure_with_exactly_one_override: Vec<WastedOverride>,
    non_pure_with_no_overrides: Vec<WastedOverride>,
}

impl WastefulVirtualItemBuilder {
    #[must_use]
    pub fn new(type_name: &str, is_com_type: bool, bytes_per_word: u32) -> Self {
        Self {
            type_name: type_name.to_string(),
            is_com_type,
            bytes_per_word,
            derived_types: IndexSet::new(),
            pure_with_exactly_one_override: Vec::new(),
            non_pure_with_no_overrides: Vec::new(),
        }
    }

    /// Record the single override of a pure virtual function.
    pub fn add_wasted_override_pure_with_exactly_one_override(&mut self, wasted: WastedOverride) {
        self.pure_with_exactly_one_override.push(wasted);
    }

    /// Record a non-pure virtual function nobody overrides.
    pub fn add_wasted_override_non_pure_with_no_overrides(&mut self, wasted: WastedOverride) {
        self.non_pure_with_no_overrides.push(wasted);
    }

    /// Adding the same derived type twice has no effect.
    pub fn add_derived_type(&mut self, name: &str) {
        if !self.derived_types.contains(name) {
            self.derived_types.insert(name.to_string());
        }
    }

    /// Seal the item once the whole hierarchy below the type is known.
    #[must_use]
    pub fn mark_derived_types_loaded(self) -> WastefulVirtualItem {
        WastefulVirtualItem {
            type_name: self.type_name,
            is_com_type: self.is_com_type,
            bytes_per_word: self.bytes_per_word,
            derived_types: self.derived_types.into_iter().collect(),
            pure_with_exactly_one_override: self.pure_with_exactly_one_override,
            non_pure_with_no_overrides: self.non_pure_with_no_overrides,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WastefulVirtualItem {
    type_name: String,
    is_com_type: bool,
    bytes_per_word: u32,
    derived_types: Vec<String>,
    pure_with_exactly_one_override: Vec<WastedOverride>,
    non_pure_with_no_overrides: Vec<WastedOverride>,
}

impl WastefulVirtualItem {
    #[must_use]
    pub fn type_name(&self) -> &str {
        &self.type_name
    }

    #[must_use]
    pub fn is_com_type(&self) -> bool {
        self.is_com_type
    }

    #[must_use]
    pub fn bytes_per_word(&self) -> u32 {
        self.bytes_per_word
    }

    /// Every type deriving from this one, directly or not.
    #[must_use]
    pub fn derived_types(&self) -> &[String] {
        &self.derived_types
    }

    #[must_use]
    pub fn wasted_overrides_pure_with_exactly_one_override(&self) -> &[WastedOverride] {
        &self.pure_with_exactly_one_override
    }

    #[must_use]
    pub fn wasted_overrides_non_pure_with_no_overrides(&self) -> &[WastedOverride] {
        &self.non_pure_with_no_overrides
    }

    pub fn wasted_overrides(&self) -> impl Iterator<Item = &WastedOverride> {
        self.pure_with_exactly_one_override
            .iter()
            .chain(&self.non_pure_with_no_overrides)
    }

    /// One word in the vtable of this type and of every derived type.
    #[must_use]
    pub fn waste_per_slot(&self) -> u64 {
        u64::from(self.bytes_per_word) * (1 + self.derived_types.len() as u64)
    }

    #[must_use]
    pub fn wasted_size(&self) -> u64 {
        let slots = self.pure_with_exactly_one_override.len() + self.non_pure_with_no_overrides.len();
        self.waste_per_slot() * slots as u64
    }

    fn contains_override(&self, wasted: &WastedOverride) -> bool {
        self.wasted_overrides().any(|candidate| candidate == wasted)
    }
}

impl Serialize for WastefulVirtualItem {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        use serde::ser::SerializeStruct;
        let mut state = serializer.serialize_struct("WastefulVirtualItem", 8)?;
        state.serialize_field("type_name", &self.type_name)?;
        state.serialize_field("is_com_type", &self.is_com_type)?;
        state.serialize_field("bytes_per_word", &self.bytes_per_word)?;
        state.serialize_field("derived_types", &self.derived_types)?;
        state.serialize_field(
            "wasted_overrides_pure_with_exactly_one_override",
            &self.pure_with_exactly_one_override,
        )?;
        state.serialize_field(
            "wasted_overrides_non_pure_with_no_overrides",
            &self.non_pure_with_no_overrides,
        )?;
        state.serialize_field("waste_per_slot", &self.waste_per_slot())?;
        state.serialize_field("wasted_size", &self.wasted_size())?;
        state.end()
    }
}

const COM_TYPE_NAMES: [&str; 2] = [
    "IUnknown",
    "winrt::impl::abi<winrt::Windows::Foundation::IUnknown,void>::type",
];
const COM_TYPE_PREFIXES: [&str; 2] = ["winrt::impl::producer<", "winrt::impl::root_implements<"];

/// Whether a type name looks like a COM or WinRT interface root.
#[must_use]
pub fn is_com_type_name(name: &str) -> bool {
    COM_TYPE_NAMES.contains(&name) || COM_TYPE_PREFIXES.iter().any(|prefix| name.starts_with(prefix))
}

/// Inheritance relations between the user-defined types of one snapshot.
struct TypeHierarchy<'a> {
    types: IndexMap<&'a str, &'a UserDefinedTypeSymbol>,
    bases: IndexMap<&'a str, IndexSet<&'a str>>,
    derived: IndexMap<&'a str, IndexSet<&'a str>>,
}

impl<'a> TypeHierarchy<'a> {
    fn new(types: &'a [UserDefinedTypeSymbol], context: &AnalysisContext<'_>) -> AnalysisResult<Self> {
        let types: IndexMap<&str, &UserDefinedTypeSymbol> =
            types.iter().map(|udt| (udt.name.as_str(), udt)).collect();

        let mut sweep = context.sweep("Loading base types", types.len() as u64);
        let mut bases = IndexMap::with_capacity(types.len());
        for &name in types.keys() {
            sweep.advance(1)?;
            bases.insert(name, Self::transitive_bases(&types, name));
        }
        sweep.finish(bases.len());

        let mut sweep = context.sweep("Loading derived types", bases.len() as u64);
        let mut derived: IndexMap<&str, IndexSet<&str>> = IndexMap::new();
        for (&name, type_bases) in &bases {
            sweep.advance(1)?;
            for &base in type_bases {
                derived.entry(base).or_default().insert(name);
            }
        }
        sweep.finish(derived.len());

        Ok(Self {
            types,
            bases,
            derived,
        })
    }

    // Base names without a type record are kept, but cannot be walked further.
    fn transitive_bases(
        types: &IndexMap<&'a str, &'a UserDefinedTypeSymbol>,
        name: &'a str,
    ) -> IndexSet<&'a str> {
        let mut found = IndexSet::new();
        let mut pending: Vec<&str> = vec![name];
        while let Some(current) = pending.pop() {
            let Some(udt) = types.get(current) else {
                continue;
            };
            for base in &udt.base_types {
                if base != name && found.insert(base.as_str()) {
                    pending.push(base.as_str());
                }
            }
        }
        found
    }

    fn bases_of(&self, name: &str) -> impl Iterator<Item = &'a str> + '_ {
        self.bases.get(name).into_iter().flatten().copied()
    }

    fn derived_of(&self, name: &str) -> impl Iterator<Item = &'a str> + '_ {
        self.derived.get(name).into_iter().flatten().copied()
    }

    fn has_derived(&self, name: &str) -> bool {
        self.derived.get(name).is_some_and(|derived| !derived.is_empty())
    }

    fn functions_of(&self, name: &str) -> &'a [MemberFunction] {
        match self.types.get(name) {
            Some(udt) => udt.functions.as_slice(),
            None => &[],
        }
    }

    fn is_com_type(&self, name: &str) -> bool {
        is_com_type_name(name) || self.bases_of(name).any(is_com_type_name)
    }

    fn introduced_by_base(&self, name: &str, function: &MemberFunction) -> bool {
        self.bases_of(name).any(|base| {
            self.functions_of(base)
                .iter()
                .any(|f| f.is_virtual_member() && f.name == function.name)
        })
    }

    /// First override of `function` found in the derived types, and the count of overrides
    /// found before the search stopped after two.
    fn overrides_of(&self, name: &str, function: &MemberFunction) -> (usize, Option<WastedOverride>) {
        let mut count = 0;
        let mut first = None;
        for derived in self.derived_of(name) {
            let found = self
                .functions_of(derived)
                .iter()
                .find(|f| f.is_virtual_member() && !f.is_pure && f.name == function.name);
            if let Some(found) = found {
                count += 1;
                first.get_or_insert_with(|| WastedOverride::new(derived, found));
            }
            if count > 1 {
                break;
            }
        }
        (count, first)
    }

    fn analyze(&self, udt: &UserDefinedTypeSymbol, bytes_per_word: u32) -> WastefulVirtualItem {
        let name = udt.name.as_str();
        let mut builder = WastefulVirtualItemBuilder::new(name, self.is_com_type(name), bytes_per_word);
        for function in udt.functions.iter().filter(|f| f.is_non_destructor_virtual()) {
            if self.introduced_by_base(name, function) || !self.has_derived(name) {
                continue;
            }
            match self.overrides_of(name, function) {
                (1, Some(single)) if function.is_pure => {
                    builder.add_wasted_override_pure_with_exactly_one_override(single);
                }
                (0, _) if !function.is_pure => {
                    builder.add_wasted_override_non_pure_with_no_overrides(WastedOverride::new(name, function));
                }
                _ => {}
            }
        }
        for derived in self.derived_of(name) {
            builder.add_derived_type(derived);
        }
        builder.mark_derived_types_loaded()
    }
}

/// Find every type declaring virtual functions that could be devirtualized.
///
/// # Errors
/// Returns an error if the pass is canceled.
pub fn find_wasteful_virtuals(
    snapshot: &Snapshot,
    exclude_com_types: bool,
    context: &AnalysisContext<'_>,
) -> AnalysisResult<Vec<WastefulVirtualItem>> {
    context.report("Discovering all user-defined types in the binary", 0, None);
    let hierarchy = TypeHierarchy::new(snapshot.user_defined_types(), context)?;

    let candidates: Vec<&UserDefinedTypeSymbol> = snapshot
        .user_defined_types()
        .iter()
        .filter(|udt| {
            let name = udt.name.as_str();
            hierarchy.has_derived(name) || hierarchy.bases_of(name).next().is_some()
        })
        .filter(|udt| udt.functions.iter().any(MemberFunction::is_virtual_member))
        .collect();

    let mut sweep = context.sweep("Analyzing user-defined types for waste", candidates.len() as u64);
    let mut items = Vec::new();
    for udt in candidates {
        sweep.advance(1)?;
        let item = hierarchy.analyze(udt, snapshot.bytes_per_word());
        if item.wasted_size() == 0 || (exclude_com_types && item.is_com_type()) {
            continue;
        }
        items.push(item);
    }
    sweep.finish(items.len());
    log::debug!("Found wasteful virtuals: items={}", items.len());
    Ok(items)
}

/// A derived type that joined or left the hierarchy, and the waste that came with it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TypeHierarchyChange {
    pub type_name: String,
    pub waste_change: i64,
}

/// A wasted override that appeared or disappeared.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WastedOverrideChange {
    pub wasted_override: WastedOverride,
    pub waste_change: i64,
}

fn signed(value: u64) -> i64 {
    i64::try_from(value).unwrap_or(i64::MAX)
}

/// A wasteful virtual item paired between two builds by type name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WastefulVirtualItemDiff {
    diff: Diff<WastefulVirtualItem>,
    type_hierarchy_changes: Vec<TypeHierarchyChange>,
    wasted_override_changes: Vec<WastedOverrideChange>,
}

impl WastefulVirtualItemDiff {
    fn new(diff: Diff<WastefulVirtualItem>) -> Self {
        let mut type_hierarchy_changes = Vec::new();
        let mut wasted_override_changes = Vec::new();
        let change = |wasted: &WastedOverride, waste_change: i64| WastedOverrideChange {
            wasted_override: wasted.clone(),
            waste_change,
        };

        match &diff {
            // The overrides account for all of the waste, no need to look at the types.
            Diff::AfterOnly(after) => {
                let per_slot = signed(after.waste_per_slot());
                wasted_override_changes.extend(after.wasted_overrides().map(|w| change(w, per_slot)));
            }
            Diff::BeforeOnly(before) => {
                let per_slot = -signed(before.waste_per_slot());
                wasted_override_changes.extend(before.wasted_overrides().map(|w| change(w, per_slot)));
            }
            Diff::Both { before, after } => {
                let mut gone = 0u64;
                for wasted in before.wasted_overrides() {
                    if !after.contains_override(wasted) {
                        wasted_override_changes.push(change(wasted, -signed(before.waste_per_slot())));
                        gone += 1;
                    }
                }
                let mut added = 0u64;
                for wasted in after.wasted_overrides() {
                    if !before.contains_override(wasted) {
                        wasted_override_changes.push(change(wasted, signed(after.waste_per_slot())));
                        added += 1;
                    }
                }

                // Overrides counted above are not counted again per derived type.
                let still_present = before.wasted_overrides().count() as u64 - gone;
                let already_present = after.wasted_overrides().count() as u64 - added;
                for derived in &before.derived_types {
                    if !after.derived_types.contains(derived) {
                        type_hierarchy_changes.push(TypeHierarchyChange {
                            type_name: derived.clone(),
                            waste_change: -signed(still_present * u64::from(before.bytes_per_word)),
                        });
                    }
                }
                for derived in &after.derived_types {
                    if !before.derived_types.contains(derived) {
                        type_hierarchy_changes.push(TypeHierarchyChange {
                            type_name: derived.clone(),
                            waste_change: signed(already_present * u64::from(after.bytes_per_word)),
                        });
                    }
                }
            }
        }

        Self {
            diff,
            type_hierarchy_changes,
            wasted_override_changes,
        }
    }

    #[must_use]
    pub fn type_name(&self) -> &str {
        self.diff.either().type_name()
    }

    #[must_use]
    pub fn is_com_type(&self) -> bool {
        self.diff.either().is_com_type()
    }

    #[must_use]
    pub fn before(&self) -> Option<&WastefulVirtualItem> {
        self.diff.before()
    }

    #[must_use]
    pub fn after(&self) -> Option<&WastefulVirtualItem> {
        self.diff.after()
    }

    #[must_use]
    pub fn wasted_size_remaining(&self) -> u64 {
        self.after().map_or(0, WastefulVirtualItem::wasted_size)
    }

    #[must_use]
    pub fn wasted_size_diff(&self) -> i64 {
        signed_delta(
            self.before().map_or(0, WastefulVirtualItem::wasted_size),
            self.wasted_size_remaining(),
        )
    }

    /// Vtable slots always occupy the file, so the size diff is the waste diff.
    #[must_use]
    pub fn size_diff(&self) -> i64 {
        self.wasted_size_diff()
    }

    #[must_use]
    pub fn type_hierarchy_changes(&self) -> &[TypeHierarchyChange] {
        &self.type_hierarchy_changes
    }

    #[must_use]
    pub fn wasted_override_changes(&self) -> &[WastedOverrideChange] {
        &self.wasted_override_changes
    }

    fn is_unchanged(&self) -> bool {
        matches!(self.diff, Diff::Both { .. })
            && self.wasted_size_diff() == 0
            && self.type_hierarchy_changes.is_empty()
            && self.wasted_override_changes.is_empty()
    }
}

impl Serialize for WastefulVirtualItemDiff {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        use serde::ser::SerializeStruct;
        let mut state = serializer.serialize_struct("WastefulVirtualItemDiff", 8)?;
        state.serialize_field("type_name", self.type_name())?;
        state.serialize_field("is_com_type", &self.is_com_type())?;
        state.serialize_field("wasted_size_diff", &self.wasted_size_diff())?;
        state.serialize_field("wasted_size_remaining", &self.wasted_size_remaining())?;
        state.serialize_field("type_hierarchy_changes", &self.type_hierarchy_changes)?;
        state.serialize_field("wasted_override_changes", &self.wasted_override_changes)?;
        state.serialize_field("before", &self.before())?;
        state.serialize_field("after", &self.after())?;
        state.end()
    }
}

/// Pair wasteful virtual items by type name, dropping types whose waste did not move.
///
/// # Errors
/// Returns an error if a type name appears twice on one side.
pub fn diff_wasteful_virtuals(
    before: Vec<WastefulVirtualItem>,
    after: Vec<WastefulVirtualItem>,
) -> PairingResult<Vec<WastefulVirtualItemDiff>> {
    Ok(pair_by_key(before, after, |item| item.type_name.as_str())?
        .into_iter()
        .map(WastefulVirtualItemDiff::new)
        .filter(|diff| !diff.is_unchanged())
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::context::{CancellationToken, NoProgress};

    fn virtual_fn(name: &str, is_pure: bool) -> MemberFunction {
        MemberFunction {
            name: name.to_string(),
            is_virtual: true,
            is_pure,
            is_static: false,
        }
    }

    fn udt(name: &str, bases: &[&str], functions: Vec<MemberFunction>) -> UserDefinedTypeSymbol {
        UserDefinedTypeSymbol {
            name: name.to_string(),
            base_types: bases.iter().map(ToString::to_string).collect(),
            functions,
        }
    }

    fn wasted(type_name: &str, function: &str) -> WastedOverride {
        WastedOverride {
            type_name: type_name.to_string(),
            function: function.to_string(),
        }
    }

    fn find(snapshot: &Snapshot, exclude_com_types: bool) -> Vec<WastefulVirtualItem> {
        let token = CancellationToken::new();
        find_wasteful_virtuals(snapshot, exclude_com_types, &AnalysisContext::new(&token, &NoProgress)).unwrap()
    }

    fn shapes_snapshot() -> Snapshot {
        let mut snapshot = Snapshot::new_for_testing("app.dll");
        snapshot.user_defined_types = vec![
            udt(
                "Shape",
                &[],
                vec![
                    virtual_fn("~Shape()", false),
                    virtual_fn("Draw()", true),
                    virtual_fn("Area()", true),
                    virtual_fn("Name()", false),
                    virtual_fn("Id()", false),
                    virtual_fn("Scale(float)", false),
                ],
            ),
            udt(
                "Circle",
                &["Shape"],
                vec![virtual_fn("Draw()", false), virtual_fn("Area()", false), virtual_fn("Scale(float)", false)],
            ),
            udt("Square", &["Shape"], vec![virtual_fn("Area()", false)]),
        ];
        snapshot
    }

    #[test]
    fn test_waste_two_derived_types() {
        let items = find(&shapes_snapshot(), false);

        assert_eq!(items.len(), 1);
        let item = &items[0];
        assert_eq!(item.type_name(), "Shape");
        assert_eq!(item.derived_types(), ["Circle", "Square"]);
        assert_eq!(
            item.wasted_overrides_pure_with_exactly_one_override(),
            [wasted("Circle", "Draw()")]
        );
        assert_eq!(
            item.wasted_overrides_non_pure_with_no_overrides(),
            [wasted("Shape", "Name()"), wasted("Shape", "Id()")]
        );
        assert_eq!(item.waste_per_slot(), 24);
        assert_eq!(item.wasted_size(), 72);
    }

    #[test]
    fn test_builder_derived_types_idempotent() {
        let mut builder = WastefulVirtualItemBuilder::new("Shape", false, 8);
        builder.add_derived_type("Circle");
        builder.add_derived_type("Circle");
        builder.add_wasted_override_non_pure_with_no_overrides(wasted("Shape", "Name()"));
        let item = builder.mark_derived_types_loaded();
        assert_eq!(item.derived_types().len(), 1);
        assert_eq!(item.wasted_size(), 16);
    }

    #[test]
    fn test_function_introduced_by_base_is_attributed_to_base() {
        let mut snapshot = Snapshot::new_for_testing("app.dll");
        snapshot.user_defined_types = vec![
            udt("Base", &[], vec![virtual_fn("Run()", false)]),
            udt("Middle", &["Base"], vec![virtual_fn("Run()", false)]),
            udt("Leaf", &["Middle"], Vec::new()),
        ];
        let items = find(&snapshot, false);

        // Middle overrides Run(), so Base has one override and no waste; Middle does not own Run().
        assert!(items.is_empty());
    }

    #[test]
    fn test_derived_types_are_transitive() {
        let mut snapshot = Snapshot::new_for_testing("app.dll");
        snapshot.user_defined_types = vec![
            udt("Base", &[], vec![virtual_fn("Unused()", false)]),
            udt("Middle", &["Base"], Vec::new()),
            udt("Leaf", &["Middle"], Vec::new()),
        ];
        let items = find(&snapshot, false);
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].derived_types(), ["Middle", "Leaf"]);
        assert_eq!(items[0].wasted_size(), 24);
    }

    #[test]
    fn test_inheritance_cycle_terminates() {
        let mut snapshot = Snapshot::new_for_testing("app.dll");
        snapshot.user_defined_types = vec![
            udt("A", &["B"], vec![virtual_fn("F()", false)]),
            udt("B", &["A"], Vec::new()),
        ];
        let token = CancellationToken::new();
        let result = find_wasteful_virtuals(&snapshot, false, &AnalysisContext::new(&token, &NoProgress));
        assert!(result.is_ok());
    }

    #[test]
    fn test_com_types() {
        assert!(is_com_type_name("IUnknown"));
        assert!(is_com_type_name("winrt::impl::producer<Foo,Bar>"));
        assert!(is_com_type_name("winrt::impl::root_implements<Foo>"));
        assert!(!is_com_type_name("IUnknownish"));

        let mut snapshot = Snapshot::new_for_testing("app.dll");
        snapshot.user_defined_types = vec![
            udt("IUnknown", &[], Vec::new()),
            udt("IWidget", &["IUnknown"], vec![virtual_fn("Paint()", false)]),
            udt("Widget", &["IWidget"], Vec::new()),
        ];
        let items = find(&snapshot, false);
        assert_eq!(items.len(), 1);
        assert!(items[0].is_com_type());
        assert!(find(&snapshot, true).is_empty());
    }

    fn item(derived: &[&str], pure_one: &[WastedOverride], non_pure: &[WastedOverride]) -> WastefulVirtualItem {
        let mut builder = WastefulVirtualItemBuilder::new("Shape", false, 8);
        for name in derived {
            builder.add_derived_type(name);
        }
        for w in pure_one {
            builder.add_wasted_override_pure_with_exactly_one_override(w.clone());
        }
        for w in non_pure {
            builder.add_wasted_override_non_pure_with_no_overrides(w.clone());
        }
        builder.mark_derived_types_loaded()
    }

    fn sum_of_changes(diff: &WastefulVirtualItemDiff) -> i64 {
        diff.type_hierarchy_changes()
            .iter()
            .map(|c| c.waste_change)
            .chain(diff.wasted_override_changes().iter().map(|c| c.waste_change))
            .sum()
    }

    #[test]
    fn test_diff_changes_sum_to_wasted_size_diff() {
        let before = item(
            &["Circle", "Square"],
            &[wasted("Circle", "Draw()")],
            &[wasted("Shape", "Name()"), wasted("Shape", "Id()")],
        );
        let after = item(
            &["Circle", "Triangle", "Hexagon"],
            &[wasted("Circle", "Draw()")],
            &[wasted("Shape", "Name()"), wasted("Shape", "Color()")],
        );
        let diffs = diff_wasteful_virtuals(vec![before], vec![after]).unwrap();
        assert_eq!(diffs.len(), 1);
        let diff = &diffs[0];

        // 72 before, 4 words per slot times 3 slots after.
        assert_eq!(diff.wasted_size_diff(), 96 - 72);
        assert_eq!(diff.wasted_override_changes().len(), 2);
        assert_eq!(diff.type_hierarchy_changes().len(), 3);
        assert_eq!(sum_of_changes(diff), diff.wasted_size_diff());
    }

    #[test]
    fn test_diff_one_side_missing() {
        let before = item(&["Circle"], &[], &[wasted("Shape", "Name()"), wasted("Shape", "Id()")]);
        let diffs = diff_wasteful_virtuals(vec![before], Vec::new()).unwrap();
        let diff = &diffs[0];
        assert_eq!(diff.wasted_size_diff(), -32);
        assert!(diff.type_hierarchy_changes().is_empty());
        assert!(diff.wasted_override_changes().iter().all(|c| c.waste_change == -16));
        assert_eq!(sum_of_changes(diff), -32);
        assert_eq!(diff.wasted_size_remaining(), 0);
    }

    #[test]
    fn test_unchanged_diff_dropped() {
        let before = item(&["Circle"], &[], &[wasted("Shape", "Name()")]);
        let diffs = diff_wasteful_virtuals(vec![before.clone()], vec![before]).unwrap();
        assert!(diffs.is_empty());
    }
}

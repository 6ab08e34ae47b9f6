// Copyright (C) 2026 Checkmk GmbH - License: GNU General Public License v2
// This file is part of Checkmk (https://checkmk.com). It is subject to the terms and
// conditions defined in the file COPYING, which is part of this source code package.

//! Turns template instantiation names into generic names (`Type<int>` becomes `Type<T1>`).

use indexmap::IndexMap;

use crate::snapshot::TemplatedFunctionSymbol;

/// A name with its top-level template arguments anonymized.
struct GenericName {
    segments: Vec<String>,
    /// Concrete argument text mapped to its `Tn`, in the order the names were assigned.
    anonymized: IndexMap<String, String>,
}

impl GenericName {
    fn parse(name: &str) -> Self {
        let mut segments = Vec::new();
        let mut anonymized: IndexMap<String, String> = IndexMap::new();
        let mut current = String::new();
        let mut parameters: Vec<&str> = Vec::new();
        let mut depth = 0usize;
        let mut parameter_start = 0usize;
        let mut total_parameters = 0usize;

        let mut chars = name.char_indices().peekable();
        while let Some((i, c)) = chars.next() {
            match c {
                '<' => {
                    if depth == 0 {
                        parameter_start = i + 1;
                        parameters.clear();
                    }
                    depth += 1;
                }
                '>' if depth > 0 => {
                    depth -= 1;
                    if depth == 0 {
                        parameters.push(name[parameter_start..i].trim());
                        current.push('<');
                        for (index, parameter) in parameters.drain(..).enumerate() {
                            if index > 0 {
                                current.push(',');
                            }
                            if let Some(existing) = anonymized.get(parameter) {
                                current.push_str(existing);
                                continue;
                            }
                            // Empty arguments still consume a number.
                            total_parameters += 1;
                            if !parameter.is_empty() {
                                let generic = format!("T{total_parameters}");
                                current.push_str(&generic);
                                anonymized.insert(parameter.to_string(), generic);
                            }
                        }
                        current.push('>');
                    }
                }
                ',' if depth == 1 => {
                    parameters.push(name[parameter_start..i].trim());
                    parameter_start = i + 1;
                }
                ':' if chars.peek().is_some_and(|(_, next)| *next == ':') => {
                    chars.next();
                    if depth == 0 {
                        segments.push(std::mem::take(&mut current));
                    }
                }
                _ if depth == 0 => current.push(c),
                _ => {}
            }
        }
        segments.push(current);

        Self {
            segments,
            anonymized,
        }
    }

    fn joined(&self) -> String {
        match self.segments.split_last() {
            Some((last, scope)) => {
                let scope = scope.join("::");
                if scope.is_empty() {
                    last.clone()
                } else {
                    format!("{scope}::{last}")
                }
            }
            None => String::new(),
        }
    }

    fn anonymize_argument(&self, argument: &str) -> String {
        if let Some(generic) = self.anonymized.get(argument) {
            return generic.clone();
        }
        self.anonymized
            .iter()
            .fold(argument.to_string(), |argument, (concrete, generic)| {
                argument.replace(concrete.as_str(), generic)
            })
    }
}

/// Generic name of a user-defined type, e.g. `ns::Type<int>` becomes `ns::Type<T1>`.
#[must_use]
pub fn generic_type_name(name: &str) -> String {
    GenericName::parse(name).joined()
}

/// Generic name of a templated function including its argument list and qualifiers.
///
/// Instantiations that only differ in their template arguments share a generic name:
/// `MyType::MyFunction<int>(bool, int)` becomes `MyType::MyFunction<T1>(bool, T1)`.
#[must_use]
pub fn generic_templated_name(function: &TemplatedFunctionSymbol) -> String {
    let name = GenericName::parse(&function.name);
    let arguments: Vec<String> = function
        .argument_types
        .iter()
        .map(|argument| name.anonymize_argument(argument))
        .collect();

    let mut generic = format!("{}({})", name.joined(), arguments.join(", "));
    if function.is_const {
        generic.push_str(" const");
    }
    if function.is_volatile {
        generic.push_str(" volatile");
    }
    generic
}

// Copyright (C) 2026 Checkmk GmbH - License: GNU General Public License v2
// This file is part of Checkmk (https://checkmk.com). It is subject to the terms and
// conditions defined in the file COPYING, which is part of this source code package.

//! Utility functions for output formatting.

/// Format a size diff with an explicit sign for growth.
///
/// # Examples
///
/// ```ignore
/// assert_eq!(format_signed(300), "+300");
/// assert_eq!(format_signed(-800), "-800");
/// assert_eq!(format_signed(0), "0");
/// ```
#[must_use]
pub(crate) fn format_signed(value: i64) -> String {
    if value > 0 {
        format!("+{value}")
    } else {
        value.to_string()
    }
}

/// Format a 0.0 to 1.0 ratio as a percentage with one decimal.
#[must_use]
pub(crate) fn format_percentage(ratio: f32) -> String {
    format!("{:.1}%", ratio * 100.0)
}

/// Shorten `name` to at most `max` characters, keeping the end which is the most specific part.
#[must_use]
pub(crate) fn shorten(name: &str, max: usize) -> String {
    let count = name.chars().count();
    if count <= max || max < 4 {
        return name.to_string();
    }
    let tail: String = name.chars().skip(count - (max - 3)).collect();
    format!("...{tail}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_signed() {
        assert_eq!(format_signed(300), "+300");
        assert_eq!(format_signed(-800), "-800");
        assert_eq!(format_signed(0), "0");
    }

    #[test]
    fn test_format_percentage() {
        assert_eq!(format_percentage(0.5), "50.0%");
        assert_eq!(format_percentage(1.0), "100.0%");
    }

    #[test]
    fn test_shorten() {
        assert_eq!(shorten("short", 10), "short");
        assert_eq!(shorten("ns::VeryLongTypeName<int>", 12), "...Name<int>");
        assert_eq!(shorten("abcdef", 3), "abcdef");
    }
}

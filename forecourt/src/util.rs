// Copyright (C) 2025-2026 Michael Herstine <sp1ff@pobox.com>
//
// This file is part of forecourt.
//
// forecourt is free software: you can redistribute it and/or modify it under the terms of the GNU
// General Public License as published by the Free Software Foundation, either version 3 of the
// License, or (at your option) any later version.
//
// forecourt is distributed in the hope that it will be useful, but WITHOUT ANY WARRANTY; without
// even the implied warranty of MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the GNU
// General Public License for more details.
//
// You should have received a copy of the GNU General Public License along with forecourt.  If not,
// see <http://www.gnu.org/licenses/>.

//! # util
//!
//! Much as I loathe catch-all "utility" modules, this one is earning its keep with a single
//! function so far.

use serde_json::Value;

/// Recurse through a document, replacing empty strings with nulls.
///
/// The store rejects empty-string attribute values in some positions, and add-on settings
/// documents come from forms where "cleared" means ""-- normalize before writing.
pub fn null_blank_values(value: &mut Value) {
    match value {
        Value::Object(map) => {
            for (_key, entry) in map.iter_mut() {
                if entry.as_str() == Some("") {
                    *entry = Value::Null;
                } else {
                    null_blank_values(entry);
                }
            }
        }
        Value::Array(entries) => {
            for entry in entries.iter_mut() {
                if entry.as_str() == Some("") {
                    *entry = Value::Null;
                } else {
                    null_blank_values(entry);
                }
            }
        }
        _ => {}
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use serde_json::json;

    #[test]
    fn blanks_become_nulls_at_any_depth() {
        let mut value = json!({
            "a": "",
            "b": "keep",
            "c": {"d": "", "e": 0},
            "f": ["", "keep"]
        });
        null_blank_values(&mut value);
        assert_eq!(
            value,
            json!({
                "a": null,
                "b": "keep",
                "c": {"d": null, "e": 0},
                "f": [null, "keep"]
            })
        );
    }
}

// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

/*! Minimal INI reader for legacy hardware pack recipes.

The dialect is the one used by format 1.0 and 2.0 recipes: `[section]`
headers, `key = value` or `key: value` pairs, `#` and `;` comments, and
indented continuation lines that extend the previous value.
*/

use crate::error::{HwpackError, Result};

/// A section of an INI document.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct IniSection {
    name: String,
    entries: Vec<(String, String)>,
}

impl IniSection {
    /// The section name, as written between brackets.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Obtain a value by key.
    ///
    /// Keys compare case-insensitively and treat `-` and `_` as equivalent.
    pub fn get(&self, key: &str) -> Option<&str> {
        let wanted = normalize_key(key);
        self.entries
            .iter()
            .find(|(k, _)| *k == wanted)
            .map(|(_, v)| v.as_str())
    }

    /// Iterate over `(normalized key, value)` pairs in file order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }
}

/// Normalize an INI key: lower case with `_` in place of `-`.
pub fn normalize_key(key: &str) -> String {
    key.trim().to_ascii_lowercase().replace('-', "_")
}

/// A parsed INI document.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct IniDocument {
    sections: Vec<IniSection>,
}

impl IniDocument {
    /// Parse a document from a string.
    pub fn parse(s: &str) -> Result<Self> {
        let mut sections: Vec<IniSection> = vec![];

        for (number, raw) in s.lines().enumerate() {
            let line_number = number + 1;
            let trimmed = raw.trim();

            if trimmed.is_empty() || trimmed.starts_with('#') || trimmed.starts_with(';') {
                continue;
            }

            if raw.starts_with(|c: char| c.is_whitespace()) {
                let entry = sections
                    .last_mut()
                    .and_then(|s| s.entries.last_mut())
                    .ok_or_else(|| {
                        HwpackError::config(
                            format!("line {}", line_number),
                            trimmed,
                            "continuation line without a preceding key",
                        )
                    })?;

                if !entry.1.is_empty() {
                    entry.1.push('\n');
                }
                entry.1.push_str(trimmed);
                continue;
            }

            if let Some(header) = trimmed.strip_prefix('[') {
                let name = header.strip_suffix(']').ok_or_else(|| {
                    HwpackError::config(
                        format!("line {}", line_number),
                        trimmed,
                        "unterminated section header",
                    )
                })?;

                if sections.iter().any(|s| s.name == name) {
                    return Err(HwpackError::config(
                        format!("line {}", line_number),
                        name,
                        "duplicate section",
                    ));
                }

                sections.push(IniSection {
                    name: name.trim().to_string(),
                    entries: vec![],
                });
                continue;
            }

            let split = trimmed
                .find(|c| c == '=' || c == ':')
                .ok_or_else(|| {
                    HwpackError::config(
                        format!("line {}", line_number),
                        trimmed,
                        "expected key = value",
                    )
                })?;
            let (key, value) = (&trimmed[..split], &trimmed[split + 1..]);

            let section = sections.last_mut().ok_or_else(|| {
                HwpackError::config(
                    format!("line {}", line_number),
                    trimmed,
                    "key outside of a section",
                )
            })?;

            let key = normalize_key(key);
            let value = value.trim().to_string();

            if let Some(existing) = section.entries.iter_mut().find(|(k, _)| *k == key) {
                existing.1 = value;
            } else {
                section.entries.push((key, value));
            }
        }

        Ok(Self { sections })
    }

    /// Obtain a section by name.
    pub fn section(&self, name: &str) -> Option<&IniSection> {
        self.sections.iter().find(|s| s.name == name)
    }

    /// Iterate over sections in file order.
    pub fn sections(&self) -> impl Iterator<Item = &IniSection> {
        self.sections.iter()
    }
}

#[cfg(test)]
mod tests {
    use {super::*, indoc::indoc};

    #[test]
    fn parse_recipe() -> Result<()> {
        let doc = IniDocument::parse(indoc! {"
            # A comment.
            [hwpack]
            name = ahwpack
            include-debs: no
            packages = foo
              bar

            [ubuntu]
            sources-entry = http://ports.ubuntu.com/ubuntu-ports/ lucid main
        "})?;

        let main = doc.section("hwpack").expect("main section should exist");
        assert_eq!(main.get("name"), Some("ahwpack"));
        assert_eq!(main.get("include_debs"), Some("no"));
        assert_eq!(main.get("INCLUDE-DEBS"), Some("no"));
        assert_eq!(main.get("packages"), Some("foo\nbar"));

        let names = doc.sections().map(|s| s.name()).collect::<Vec<_>>();
        assert_eq!(names, vec!["hwpack", "ubuntu"]);
        assert_eq!(
            doc.section("ubuntu").unwrap().get("sources-entry"),
            Some("http://ports.ubuntu.com/ubuntu-ports/ lucid main")
        );

        Ok(())
    }

    #[test]
    fn parse_errors() {
        assert!(IniDocument::parse("name = foo\n").is_err());
        assert!(IniDocument::parse("[hwpack\n").is_err());
        assert!(IniDocument::parse("[hwpack]\nnovalue\n").is_err());
        assert!(IniDocument::parse("[a]\n[a]\n").is_err());
    }
}

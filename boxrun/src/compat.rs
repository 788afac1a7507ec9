// This file is dual licensed under the terms of the Apache License, Version
// 2.0, and the BSD License. See the LICENSE file in the root of this repository
// for complete details.

//! Loads the global alias table mapping one dependency name to a list of
//! acceptable substitutes: `/System/Settings/Scripts/CompatibilityList`,
//! lines of the form `A: B [C ...]`.

use std::collections::HashMap;
use std::path::Path;

/// `name -> ordered list of substitute names`, tried left to right.
#[derive(Debug, Clone, Default)]
pub struct CompatibilityList {
    aliases: HashMap<String, Vec<String>>,
}

impl CompatibilityList {
    pub fn parse(contents: &str) -> CompatibilityList {
        let mut aliases = HashMap::new();
        for line in contents.lines() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            let Some((name, rest)) = line.split_once(':') else {
                continue;
            };
            let substitutes: Vec<String> = rest.split_whitespace().map(String::from).collect();
            if !substitutes.is_empty() {
                aliases.insert(name.trim().to_string(), substitutes);
            }
        }
        CompatibilityList { aliases }
    }

    /// Reads the table off disk; a missing file is not an error here, it
    /// just yields an empty table (the caller logs the
    /// `MissingCompatibilityList` warning itself, since only it knows
    /// whether `--quiet` is set).
    pub fn load(path: &Path) -> Option<CompatibilityList> {
        std::fs::read_to_string(path)
            .ok()
            .map(|s| CompatibilityList::parse(&s))
    }

    pub fn substitutes_for(&self, name: &str) -> &[String] {
        self.aliases
            .get(name)
            .map(|v| v.as_slice())
            .unwrap_or(&[])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_alias_lines() {
        let table = CompatibilityList::parse("Legacy: Modern\nOther: A B C\n");
        assert_eq!(table.substitutes_for("Legacy"), &["Modern".to_string()]);
        assert_eq!(
            table.substitutes_for("Other"),
            &["A".to_string(), "B".to_string(), "C".to_string()]
        );
        assert!(table.substitutes_for("Unknown").is_empty());
    }

    #[test]
    fn blank_and_comment_lines_ignored() {
        let table = CompatibilityList::parse("# comment\n\nLegacy: Modern\n");
        assert_eq!(table.substitutes_for("Legacy"), &["Modern".to_string()]);
    }
}

// This file is dual licensed under the terms of the Apache License, Version
// 2.0, and the BSD License. See the LICENSE file in the root of this repository
// for complete details.

//! Process-wide layout constants and the per-invocation search options
//! assembled from CLI flags and environment variables. There is no
//! persisted configuration file: every invocation is independent.

use std::path::{Path, PathBuf};

use crate::version::Operator;

/// The fixed subdirectories composed into the index, and the aliases that
/// fold into them at overlay-composition time.
pub const CANONICAL_TARGETS: &[&str] = &["bin", "include", "lib", "libexec", "share"];

/// `(alias, canonical)` pairs folded together when collecting lowerdir
/// entries.
pub const SOURCE_ALIASES: &[(&str, &str)] = &[("sbin", "bin"), ("lib64", "lib")];

#[derive(Debug, Clone)]
pub struct Layout {
    pub index_base: PathBuf,
    pub programs_root: PathBuf,
    pub compatibility_list: PathBuf,
}

impl Layout {
    /// Reads `goboPrograms` (default `/Programs`); the index base and the
    /// compatibility list are both fixed paths independent of `goboPrograms`
    /// (spec.md §6 lists them as such), never derived from it.
    pub fn from_env() -> Layout {
        let programs_root = std::env::var("goboPrograms")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("/Programs"));
        Layout {
            index_base: PathBuf::from("/System/Index"),
            programs_root,
            compatibility_list: PathBuf::from("/System/Settings/Scripts/CompatibilityList"),
        }
    }

    /// Constructs a layout rooted somewhere other than `/`, used only by
    /// tests that exercise directory walks without touching the real root.
    pub fn rooted_at(root: &Path) -> Layout {
        Layout {
            index_base: root.join("System/Index"),
            programs_root: root.join("Programs"),
            compatibility_list: root.join("System/Settings/Scripts/CompatibilityList"),
        }
    }

    pub fn program_dir(&self, name: &str, version: &str) -> PathBuf {
        self.programs_root.join(name).join(version)
    }

    pub fn compatibility_list(&self) -> PathBuf {
        self.compatibility_list.clone()
    }
}

/// Immutable bundle of per-invocation search parameters, threaded through
/// the enumerator and resolver.
#[derive(Debug, Clone)]
pub struct SearchOptions {
    pub layout: Layout,
    pub arch: Option<String>,
    pub quiet: bool,
    pub default_operator: Operator,
    pub filter_name: Option<String>,
    pub pure: bool,
}

impl SearchOptions {
    pub fn new(layout: Layout) -> SearchOptions {
        SearchOptions {
            layout,
            arch: None,
            quiet: false,
            default_operator: Operator::Ge,
            filter_name: None,
            pure: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn compatibility_list_is_fixed_regardless_of_programs_root() {
        std::env::set_var("goboPrograms", "/opt/Programs");
        let layout = Layout::from_env();
        assert_eq!(
            layout.compatibility_list(),
            PathBuf::from("/System/Settings/Scripts/CompatibilityList")
        );
        std::env::remove_var("goboPrograms");
    }
}

// This file is dual licensed under the terms of the Apache License, Version
// 2.0, and the BSD License. See the LICENSE file in the root of this repository
// for complete details.

//! Builds the lowerdir/upperdir/workdir option string for each canonical
//! target subdirectory and mounts the resulting overlay.

use std::path::{Path, PathBuf};

use nix::mount::{mount, MsFlags};

use crate::config::{CANONICAL_TARGETS, SOURCE_ALIASES};
use crate::errors::OverlayError;
use crate::resolver::ResolvedDependency;

/// Subtrees that depend on sibling `Functions` directories absent under the
/// index and must never be folded into a lowerdir.
const IGNORED_SUFFIXES: &[&str] = &["Scripts", "Compile", "DevelScripts"];

fn is_ignored(path: &Path) -> bool {
    path.file_name()
        .and_then(|n| n.to_str())
        .map(|n| IGNORED_SUFFIXES.iter().any(|s| n.contains(s)))
        .unwrap_or(false)
}

/// Collects lowerdir entries for one canonical target across all resolved
/// dependencies, folding `sbin`/`lib64` aliases into `bin`/`lib` and
/// excluding `Scripts`/`Compile`/`DevelScripts` subtrees.
pub fn lowerdir_entries(deps: &[ResolvedDependency], target: &str) -> Vec<PathBuf> {
    let mut entries = Vec::new();
    for dep in deps {
        let mut sources = vec![target.to_string()];
        for (alias, canonical) in SOURCE_ALIASES {
            if *canonical == target {
                sources.push((*alias).to_string());
            }
        }
        for source in sources {
            let candidate = dep.path().join(&source);
            if candidate.is_dir() && !is_ignored(&candidate) {
                entries.push(candidate);
            }
        }
    }
    entries
}

/// Builds the full `lowerdir=...,upperdir=...,workdir=...` option string for
/// one target. In pure mode the base index path is omitted so only the
/// listed dependencies compose the view; otherwise it is appended as a
/// safeguard against the single-lowerdir overlayfs quirk.
pub fn mount_options(
    lower_entries: &[PathBuf],
    target: &str,
    index_base: &Path,
    upper_layer: &Path,
    write_layer: &Path,
    pure: bool,
) -> String {
    let mut lowers: Vec<String> = lower_entries
        .iter()
        .map(|p| p.to_string_lossy().into_owned())
        .collect();
    if !pure {
        lowers.push(index_base.join(target).to_string_lossy().into_owned());
    }

    format!(
        "lowerdir={},upperdir={},workdir={}",
        lowers.join(":"),
        upper_layer.join(target).to_string_lossy(),
        write_layer.join(target).to_string_lossy(),
    )
}

/// Mounts one overlay target. Aborting composition on any failure is the
/// caller's responsibility (it should trigger namespace cleanup).
fn mount_one(target_path: &Path, options: &str) -> Result<(), OverlayError> {
    mount(
        Some("overlay"),
        target_path,
        Some("overlay"),
        MsFlags::empty(),
        Some(options.as_bytes()),
    )
    .map_err(|source| OverlayError::Mount {
        target: target_path.to_path_buf(),
        source,
    })
}

/// Mounts one overlay per non-empty canonical target. Returns the list of
/// targets actually mounted, so a caller that aborts partway through knows
/// what to unmount during cleanup.
pub fn compose(
    deps: &[ResolvedDependency],
    index_base: &Path,
    upper_layer: &Path,
    write_layer: &Path,
    pure: bool,
) -> Result<Vec<String>, OverlayError> {
    let mut mounted = Vec::new();
    for target in CANONICAL_TARGETS {
        let entries = lowerdir_entries(deps, target);
        if entries.is_empty() {
            // Nothing to add; the base index already shows the right thing
            // (and pure mode with no entries has nothing to compose at all).
            continue;
        }
        let options = mount_options(&entries, target, index_base, upper_layer, write_layer, pure);
        let target_path = index_base.join(target);
        mount_one(&target_path, &options)?;
        mounted.push((*target).to_string());
    }
    Ok(mounted)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dep(root: &Path, name: &str, version: &str) -> ResolvedDependency {
        ResolvedDependency {
            name: name.to_string(),
            version: version.to_string(),
            location: root.join(name).join(version).to_string_lossy().into_owned(),
        }
    }

    #[test]
    fn collects_aliased_sources() {
        let tmp = tempfile::tempdir().unwrap();
        let root = tmp.path();
        std::fs::create_dir_all(root.join("Bar/2.0/lib")).unwrap();
        std::fs::create_dir_all(root.join("Bar/2.0/lib64")).unwrap();
        let deps = vec![dep(root, "Bar", "2.0")];
        let entries = lowerdir_entries(&deps, "lib");
        assert_eq!(entries.len(), 2);
    }

    #[test]
    fn ignores_scripts_subtrees() {
        let tmp = tempfile::tempdir().unwrap();
        let root = tmp.path();
        std::fs::create_dir_all(root.join("Bar/2.0/Scripts")).unwrap();
        let deps = vec![dep(root, "Bar", "2.0")];
        let entries = lowerdir_entries(&deps, "Scripts");
        assert!(entries.is_empty());
    }

    #[test]
    fn pure_mode_omits_base_index() {
        let opts = mount_options(
            &[PathBuf::from("/Programs/Bar/2.0/lib")],
            "lib",
            Path::new("/System/Index"),
            Path::new("/work/upper"),
            Path::new("/work/write"),
            true,
        );
        assert!(!opts.contains("/System/Index/lib,upperdir"));
        assert!(opts.starts_with("lowerdir=/Programs/Bar/2.0/lib,"));
    }

    #[test]
    fn non_pure_mode_appends_base_index() {
        let opts = mount_options(
            &[PathBuf::from("/Programs/Bar/2.0/lib")],
            "lib",
            Path::new("/System/Index"),
            Path::new("/work/upper"),
            Path::new("/work/write"),
            false,
        );
        assert!(opts.contains("/Programs/Bar/2.0/lib:/System/Index/lib,upperdir"));
    }
}

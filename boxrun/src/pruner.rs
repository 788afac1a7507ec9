// This file is dual licensed under the terms of the Apache License, Version
// 2.0, and the BSD License. See the LICENSE file in the root of this repository
// for complete details.

//! Walks sibling versions of each resolved dependency and unlinks symlinks
//! in the composed index view that still point at a rejected version.
//!
//! The substring match below (`target.contains(sibling_dir)`) is
//! name-prefix-unsafe — `Foo` matches `Foobar` — carried over unchanged
//! from the original tool, which has the same caveat.

use std::path::Path;

use crate::config::{Layout, CANONICAL_TARGETS};
use crate::resolver::ResolvedDependency;

fn walk_symlinks(dir: &Path, found: &mut Vec<(std::path::PathBuf, std::path::PathBuf)>) {
    let entries = match std::fs::read_dir(dir) {
        Ok(e) => e,
        Err(_) => return,
    };
    for entry in entries.flatten() {
        let path = entry.path();
        let metadata = match std::fs::symlink_metadata(&path) {
            Ok(m) => m,
            Err(_) => continue,
        };
        if metadata.is_symlink() {
            if let Ok(target) = std::fs::read_link(&path) {
                found.push((path, target));
            }
        } else if metadata.is_dir() {
            walk_symlinks(&path, found);
        }
    }
}

/// For each resolved dependency, iterates its sibling versions and, for
/// every symlink under a canonical source subdir whose target contains the
/// sibling's directory, unlinks the corresponding entry from the composed
/// index view. Returns the list of paths unlinked, for logging.
pub fn prune(layout: &Layout, index_base: &Path, deps: &[ResolvedDependency]) -> Vec<std::path::PathBuf> {
    let mut unlinked = Vec::new();

    for dep in deps {
        let program_root = layout.programs_root.join(&dep.name);
        let siblings = match std::fs::read_dir(&program_root) {
            Ok(e) => e,
            Err(_) => continue,
        };

        for sibling in siblings.flatten() {
            let sibling_name = match sibling.file_name().into_string() {
                Ok(n) => n,
                Err(_) => continue,
            };
            if sibling_name == dep.version {
                continue;
            }
            let sibling_dir = sibling.path();
            if !sibling_dir.is_dir() {
                continue;
            }
            let sibling_dir_str = sibling_dir.to_string_lossy().into_owned();

            for target in CANONICAL_TARGETS {
                let source_dir = sibling_dir.join(target);
                let mut symlinks = Vec::new();
                walk_symlinks(&source_dir, &mut symlinks);

                for (link_path, link_target) in symlinks {
                    if link_target.to_string_lossy().contains(&sibling_dir_str) {
                        let rel = match link_path.strip_prefix(&source_dir) {
                            Ok(r) => r,
                            Err(_) => continue,
                        };
                        let index_entry = index_base.join(target).join(rel);
                        if std::fs::symlink_metadata(&index_entry).is_ok() {
                            if std::fs::remove_file(&index_entry).is_ok() {
                                unlinked.push(index_entry);
                            }
                        }
                    }
                }
            }
        }
    }

    unlinked
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::os::unix::fs::symlink;

    #[test]
    fn prunes_symlink_pointing_at_sibling_version() {
        let tmp = tempfile::tempdir().unwrap();
        let root = tmp.path();
        let layout = Layout::rooted_at(root);

        let old = layout.programs_root.join("Foo/1.0/bin");
        std::fs::create_dir_all(&old).unwrap();
        symlink(old.join("realfoo"), old.join("foo")).unwrap();

        let index_bin = layout.index_base.join("bin");
        std::fs::create_dir_all(&index_bin).unwrap();
        symlink(old.join("foo"), index_bin.join("foo")).unwrap();

        let deps = vec![ResolvedDependency {
            name: "Foo".into(),
            version: "2.0".into(),
            location: layout
                .programs_root
                .join("Foo/2.0")
                .to_string_lossy()
                .into_owned(),
        }];
        std::fs::create_dir_all(layout.programs_root.join("Foo/2.0")).unwrap();

        let unlinked = prune(&layout, &layout.index_base, &deps);
        assert_eq!(unlinked.len(), 1);
        assert!(!index_bin.join("foo").exists());
    }
}

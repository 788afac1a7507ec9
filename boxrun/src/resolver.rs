// This file is dual licensed under the terms of the Apache License, Version
// 2.0, and the BSD License. See the LICENSE file in the root of this repository
// for complete details.

//! For each dependency, applies the range list, architecture filter, and
//! compatibility aliases, then picks the best concrete version.

use std::path::PathBuf;

use log::{debug, info, warn};

use crate::compat::CompatibilityList;
use crate::config::SearchOptions;
use crate::enumerate::{self, RepositorySource};
use crate::errors::{ResolverError, Warning};
use crate::manifest::Requirement;
use crate::version;

const LOGNAME: &str = "boxrun::resolver";

/// `(name, concrete_version, path_or_url)`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedDependency {
    pub name: String,
    pub version: String,
    pub location: String,
}

impl ResolvedDependency {
    pub fn path(&self) -> PathBuf {
        PathBuf::from(&self.location)
    }
}

fn normalize_arch(arch: &str) -> String {
    if arch == "i386" {
        "i686".to_string()
    } else {
        arch.to_string()
    }
}

/// The architecture to filter against: the caller's override, or else the
/// running kernel's `uname.machine`.
fn target_architecture(opts: &SearchOptions) -> String {
    if let Some(arch) = &opts.arch {
        return normalize_arch(arch);
    }
    match nix::sys::utsname::uname() {
        Ok(u) => normalize_arch(u.machine().to_string_lossy().as_ref()),
        Err(_) => "unknown".to_string(),
    }
}

fn read_architecture_file(program_dir: &std::path::Path) -> Option<String> {
    let contents = std::fs::read_to_string(program_dir.join("Resources/Architecture")).ok()?;
    let arch = contents.trim();
    if arch.is_empty() {
        None
    } else {
        Some(normalize_arch(arch))
    }
}

/// Resolves one requirement against the chosen source by enumerating
/// candidates, applying the architecture filter (`LocalPrograms` only),
/// selecting the greatest member of the range list, or short-circuiting via
/// the `Current` symlink when the manifest line carried no operator at all.
fn resolve_one(
    req: &Requirement,
    source: &RepositorySource,
    opts: &SearchOptions,
    warnings: &mut Vec<Warning>,
) -> Option<ResolvedDependency> {
    let unconstrained =
        req.ranges.len() == 1 && req.ranges[0] == crate::manifest::Range::universal();

    if unconstrained && matches!(source, RepositorySource::LocalPrograms) {
        let current = opts.layout.programs_root.join(&req.name).join("Current");
        if let Ok(target) = std::fs::read_link(&current) {
            let version = target
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default();
            let location = opts.layout.programs_root.join(&req.name).join(&version);
            info!(target: LOGNAME, "{} has no operator, following Current -> {}", req.name, version);
            return Some(ResolvedDependency {
                name: req.name.clone(),
                version,
                location: location.to_string_lossy().into_owned(),
            });
        }
    }

    let wanted_arch = target_architecture(opts);
    let candidates = enumerate::enumerate(&req.name, source, opts);
    if log::log_enabled!(target: LOGNAME, log::Level::Debug) {
        debug!(target: LOGNAME, "{} candidates for {}: {:?}", candidates.len(), req.name, candidates);
    }

    let is_local = matches!(source, RepositorySource::LocalPrograms);
    let mut best: Option<&enumerate::Candidate> = None;
    for c in &candidates {
        if !req.satisfies(&c.version) {
            continue;
        }
        if is_local {
            let program_dir = opts.layout.programs_root.join(&req.name).join(&c.version);
            if let Some(found) = read_architecture_file(&program_dir) {
                if found != wanted_arch && found != "noarch" {
                    if opts.arch.is_none() {
                        warnings.push(Warning::ArchitectureMismatch {
                            name: req.name.clone(),
                            wanted: wanted_arch.clone(),
                            found,
                        });
                    }
                    continue;
                }
            }
        }
        best = match best {
            Some(b) if version::compare(&b.version, &c.version) != std::cmp::Ordering::Less => {
                Some(b)
            }
            _ => Some(c),
        };
    }

    best.map(|c| ResolvedDependency {
        name: req.name.clone(),
        version: c.version.clone(),
        location: c.location.clone(),
    })
}

/// Resolves a full requirement set into an ordered, duplicate-free list of
/// resolved dependencies. Repeated `-d` manifests are expected to already
/// be concatenated into `requirements` by the caller; duplicates by name are
/// dropped here with a warning, matching the conservative behavior
/// described by the Open Question about repeated manifests.
pub fn resolve(
    requirements: &[Requirement],
    source: &RepositorySource,
    opts: &SearchOptions,
    compat: &CompatibilityList,
) -> Result<(Vec<ResolvedDependency>, Vec<Warning>), ResolverError> {
    let mut resolved = Vec::new();
    let mut warnings = Vec::new();
    let mut seen_names = std::collections::HashSet::new();

    for req in requirements {
        if !seen_names.insert(req.name.clone()) {
            warnings.push(Warning::DuplicateDependency(req.name.clone()));
            continue;
        }

        let mut found = resolve_one(req, source, opts, &mut warnings);

        if found.is_none() {
            for alias in compat.substitutes_for(&req.name) {
                let mut aliased = req.clone();
                aliased.name = alias.clone();
                if let Some(r) = resolve_one(&aliased, source, opts, &mut warnings) {
                    info!(target: LOGNAME, "{} substituted via CompatibilityList -> {}", req.name, alias);
                    found = Some(r);
                    break;
                }
            }
        }

        match found {
            Some(r) => {
                if req.is_alien() {
                    let (ns, _localname) =
                        r.name.split_once(':').unwrap_or((r.name.as_str(), ""));
                    for rule_line in enumerate::alien_manager_rules(ns) {
                        if let Ok(implicit) =
                            crate::manifest::parse(&rule_line, opts.default_operator)
                        {
                            for sub_req in implicit {
                                if let Some(sub) =
                                    resolve_one(&sub_req, source, opts, &mut warnings)
                                {
                                    if seen_names.insert(sub.name.clone()) {
                                        resolved.push(sub);
                                    }
                                }
                            }
                        }
                    }
                }
                resolved.push(r);
            }
            None => {
                warnings.push(Warning::DependencyNotFound(req.name.clone()));
                if !opts.quiet {
                    warn!(target: LOGNAME, "no candidate satisfies requirement for {}", req.name);
                }
            }
        }
    }

    Ok((resolved, warnings))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Layout;
    use crate::manifest::Range;

    fn layout(root: &std::path::Path) -> Layout {
        Layout::rooted_at(root)
    }

    #[test]
    fn unresolved_requirement_yields_warning() {
        let tmp = tempfile::tempdir().unwrap();
        let opts = SearchOptions::new(layout(tmp.path()));
        let req = Requirement {
            name: "Nonexistent".to_string(),
            ranges: vec![Range::universal()],
        };
        let (resolved, warnings) = resolve(
            &[req],
            &RepositorySource::LocalPrograms,
            &opts,
            &CompatibilityList::default(),
        )
        .unwrap();
        assert!(resolved.is_empty());
        assert_eq!(warnings.len(), 1);
    }

    #[test]
    fn picks_greatest_candidate_within_range() {
        let tmp = tempfile::tempdir().unwrap();
        let root = tmp.path();
        for v in ["1.0", "1.3", "1.5", "2.0"] {
            std::fs::create_dir_all(root.join("Programs/Baz").join(v)).unwrap();
        }
        let opts = SearchOptions::new(layout(root));
        let reqs =
            crate::manifest::parse("Baz >= 1.0, < 2.0, != 1.3", opts.default_operator).unwrap();
        let (resolved, _warnings) = resolve(
            &reqs,
            &RepositorySource::LocalPrograms,
            &opts,
            &CompatibilityList::default(),
        )
        .unwrap();
        assert_eq!(resolved.len(), 1);
        assert_eq!(resolved[0].version, "1.5");
    }

    #[test]
    fn duplicate_requirement_names_are_dropped_with_warning() {
        let tmp = tempfile::tempdir().unwrap();
        let root = tmp.path();
        std::fs::create_dir_all(root.join("Programs/Foo/1.0")).unwrap();
        let opts = SearchOptions::new(layout(root));
        let reqs = crate::manifest::parse("Foo\nFoo >= 2.0\n", opts.default_operator).unwrap();
        let (resolved, warnings) = resolve(
            &reqs,
            &RepositorySource::LocalPrograms,
            &opts,
            &CompatibilityList::default(),
        )
        .unwrap();
        assert_eq!(resolved.len(), 1);
        assert!(warnings
            .iter()
            .any(|w| matches!(w, Warning::DuplicateDependency(n) if n == "Foo")));
    }

    #[test]
    fn alias_fallback_via_compatibility_list() {
        let tmp = tempfile::tempdir().unwrap();
        let root = tmp.path();
        std::fs::create_dir_all(root.join("Programs/Modern/3.0")).unwrap();
        let opts = SearchOptions::new(layout(root));
        let reqs = crate::manifest::parse("Legacy", opts.default_operator).unwrap();
        let compat = CompatibilityList::parse("Legacy: Modern\n");
        let (resolved, _warnings) =
            resolve(&reqs, &RepositorySource::LocalPrograms, &opts, &compat).unwrap();
        assert_eq!(resolved.len(), 1);
        assert_eq!(resolved[0].name, "Modern");
        assert_eq!(resolved[0].version, "3.0");
    }
}

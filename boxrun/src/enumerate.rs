// This file is dual licensed under the terms of the Apache License, Version
// 2.0, and the BSD License. See the LICENSE file in the root of this repository
// for complete details.

//! Enumerates candidate versions for a dependency name from whichever
//! repository source the caller selected. External-catalog and Alien
//! sources are treated as lazy, line-oriented child processes per the
//! streaming-iterator design note: their pid and exit status are never
//! retained, and a failing helper simply yields nothing.

use std::path::PathBuf;
use std::process::{Command, Stdio};

use crate::config::SearchOptions;
use crate::version;

/// `LocalDirectory` shell-globs archives; `PackageStore`/`RecipeStore`
/// invoke an external catalog process. Both string-compatible sources are
/// consumed identically once they've produced `(version, url)` pairs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RepositorySource {
    LocalPrograms,
    LocalDirectory(PathBuf),
    PackageStore,
    RecipeStore,
}

/// `(version, path_or_url)`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Candidate {
    pub version: String,
    pub location: String,
}

fn run_lines(mut cmd: Command) -> Vec<String> {
    let output = match cmd.stdout(Stdio::piped()).stderr(Stdio::null()).output() {
        Ok(o) => o,
        Err(_) => return Vec::new(),
    };
    String::from_utf8_lossy(&output.stdout)
        .lines()
        .map(|l| l.to_string())
        .collect()
}

/// Parses an archive filename of the form `<anything>--<version>--<anything>.tar.bz2`.
fn parse_archive_name(filename: &str) -> Option<String> {
    let stem = filename.strip_suffix(".tar.bz2")?;
    let mut parts = stem.splitn(3, "--");
    let _name = parts.next()?;
    let ver = parts.next()?;
    Some(ver.to_string())
}

fn dedupe_adjacent(mut candidates: Vec<Candidate>) -> Vec<Candidate> {
    candidates.dedup_by(|a, b| a.version == b.version);
    candidates
}

/// Enumerates candidates for `name` from `opts.source`, filtering out
/// non-version directories where that predicate applies (`LocalPrograms`
/// only; archive/catalog listings carry no directory-naming ambiguity).
pub fn enumerate(name: &str, source: &RepositorySource, opts: &SearchOptions) -> Vec<Candidate> {
    if let Some((ns, localname)) = name.split_once(':') {
        return enumerate_alien(ns, localname);
    }

    match source {
        RepositorySource::LocalPrograms => enumerate_local_programs(name, opts),
        RepositorySource::LocalDirectory(dir) => enumerate_local_directory(name, dir),
        RepositorySource::PackageStore => enumerate_catalog(name, "store"),
        RepositorySource::RecipeStore => enumerate_catalog(name, "recipe"),
    }
}

fn enumerate_local_programs(name: &str, opts: &SearchOptions) -> Vec<Candidate> {
    let dir = opts.layout.programs_root.join(name);
    let entries = match std::fs::read_dir(&dir) {
        Ok(e) => e,
        Err(_) => return Vec::new(),
    };

    let mut candidates: Vec<Candidate> = entries
        .filter_map(|e| e.ok())
        .filter(|e| e.path().is_dir())
        .filter_map(|e| e.file_name().into_string().ok())
        .filter(|n| version::is_version_directory(n))
        .map(|n| Candidate {
            version: n.clone(),
            location: dir.join(n).to_string_lossy().into_owned(),
        })
        .collect();

    candidates.sort_by(|a, b| version::compare(&a.version, &b.version));
    dedupe_adjacent(candidates)
}

fn enumerate_local_directory(name: &str, dir: &std::path::Path) -> Vec<Candidate> {
    let entries = match std::fs::read_dir(dir) {
        Ok(e) => e,
        Err(_) => return Vec::new(),
    };

    let prefix = format!("{name}--");
    let mut candidates: Vec<Candidate> = entries
        .filter_map(|e| e.ok())
        .filter_map(|e| e.file_name().into_string().ok())
        .filter(|fname| fname.starts_with(&prefix))
        .filter_map(|fname| {
            parse_archive_name(&fname).map(|version| Candidate {
                version,
                location: dir.join(&fname).to_string_lossy().into_owned(),
            })
        })
        .collect();

    candidates.sort_by(|a, b| version::compare(&a.version, &b.version));
    dedupe_adjacent(candidates)
}

fn enumerate_catalog(name: &str, kind: &str) -> Vec<Candidate> {
    let mut cmd = Command::new("FindPackage");
    cmd.arg(format!("--types={kind}"))
        .arg("--full-list")
        .arg(name);

    let mut candidates: Vec<Candidate> = run_lines(cmd)
        .into_iter()
        .filter_map(|line| {
            let (url, _) = line.rsplit_once(' ').unwrap_or((line.as_str(), ""));
            let filename = url.rsplit('/').next()?;
            parse_archive_name(filename).map(|version| Candidate {
                version,
                location: url.to_string(),
            })
        })
        .collect();

    candidates.sort_by(|a, b| version::compare(&a.version, &b.version));
    dedupe_adjacent(candidates)
}

/// Delegates to `Alien-'<ns>' --getversion <localname>`, one version per
/// output line. The backend is opaque: only stdout matters.
fn enumerate_alien(ns: &str, localname: &str) -> Vec<Candidate> {
    let mut cmd = Command::new(format!("Alien-{ns}"));
    cmd.arg("--getversion").arg(localname);

    run_lines(cmd)
        .into_iter()
        .map(|version| Candidate {
            location: format!("alien:{ns}:{localname}:{version}"),
            version,
        })
        .collect()
}

/// Parses the implicit-dependency stream produced by
/// `Alien-'<ns>' --get-manager-rule`, one manifest-grammar line per output
/// line.
pub fn alien_manager_rules(ns: &str) -> Vec<String> {
    let mut cmd = Command::new(format!("Alien-{ns}"));
    cmd.arg("--get-manager-rule");
    run_lines(cmd)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn archive_name_parses_version() {
        assert_eq!(
            parse_archive_name("foo--1.2.3--x86_64.tar.bz2"),
            Some("1.2.3".to_string())
        );
        assert_eq!(parse_archive_name("not-an-archive.txt"), None);
    }

    #[test]
    fn dedupe_collapses_adjacent_duplicates() {
        let v = vec![
            Candidate {
                version: "1.0".into(),
                location: "a".into(),
            },
            Candidate {
                version: "1.0".into(),
                location: "b".into(),
            },
            Candidate {
                version: "2.0".into(),
                location: "c".into(),
            },
        ];
        assert_eq!(dedupe_adjacent(v).len(), 2);
    }
}

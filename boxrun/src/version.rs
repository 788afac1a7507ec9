// This file is dual licensed under the terms of the Apache License, Version
// 2.0, and the BSD License. See the LICENSE file in the root of this repository
// for complete details.

//! Version-string comparison. Versions in this distribution are not semver:
//! they are whatever the upstream project happened to name its release, so
//! comparison walks dot-separated segments rather than parsing a fixed
//! major.minor.patch shape.

use std::cmp::Ordering;
use std::fmt;

/// Comparison operator, kept as a sum type rather than a sentinel so the
/// match-satisfies algebra stays total.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operator {
    Gt,
    Ge,
    Eq,
    Ne,
    Lt,
    Le,
    None,
}

impl fmt::Display for Operator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Operator::Gt => ">",
            Operator::Ge => ">=",
            Operator::Eq => "=",
            Operator::Ne => "!=",
            Operator::Lt => "<",
            Operator::Le => "<=",
            Operator::None => "",
        };
        write!(f, "{s}")
    }
}

/// `(operator, string)`. An empty string paired with `Operator::None` is the
/// absent bound.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Version {
    pub op: Operator,
    pub text: String,
}

impl Version {
    pub fn none() -> Version {
        Version {
            op: Operator::None,
            text: String::new(),
        }
    }

    pub fn new(op: Operator, text: impl Into<String>) -> Version {
        Version {
            op,
            text: text.into(),
        }
    }

    pub fn is_bound(&self) -> bool {
        !matches!(self.op, Operator::None) && !self.text.is_empty()
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.op, self.text)
    }
}

/// Splits a segment like `3-r2` into `(main, revision)`. An absent `-r`
/// suffix counts as revision 0.
fn split_revision(segment: &str) -> (i64, i64) {
    match segment.split_once("-r") {
        Some((main, rev)) => (
            main.parse().unwrap_or(0),
            rev.parse().unwrap_or(0),
        ),
        None => (segment.parse().unwrap_or(0), 0),
    }
}

fn first_alpha_run(s: &str) -> &str {
    let start = s.find(|c: char| c.is_alphabetic());
    match start {
        Some(i) => {
            let rest = &s[i..];
            let end = rest
                .find(|c: char| !c.is_alphabetic())
                .unwrap_or(rest.len());
            &rest[..end]
        }
        None => "",
    }
}

fn starts_with_alpha(s: &str) -> bool {
    s.chars().next().map(|c| c.is_alphabetic()).unwrap_or(false)
}

/// Strips a trailing bracketed tag such as `[!cross]` and surrounding
/// whitespace. Tags are metadata, not part of the version proper.
fn strip_tag(s: &str) -> &str {
    match s.find('[') {
        Some(i) => s[..i].trim_end(),
        None => s.trim_end(),
    }
}

/// Implements the five-rule comparator from the version algebra: bracket-tag
/// stripping, alpha-vs-alpha strcmp, dot-tokenized integer comparison with
/// `-r<N>` revision splitting, and a major-number fallback when one side
/// runs out of segments first.
pub fn compare(x: &str, y: &str) -> Ordering {
    let x = strip_tag(x);
    let y = strip_tag(y);

    if starts_with_alpha(x) && starts_with_alpha(y) {
        return x.cmp(y);
    }

    let xs: Vec<&str> = x.split('.').collect();
    let ys: Vec<&str> = y.split('.').collect();

    for i in 0..xs.len().min(ys.len()) {
        let a = split_revision(xs[i]);
        let b = split_revision(ys[i]);
        match a.cmp(&b) {
            Ordering::Equal => continue,
            other => return other,
        }
    }

    match xs.len().cmp(&ys.len()) {
        Ordering::Equal => Ordering::Equal,
        _ => {
            // One side ran out of segments. Compare the leading (major)
            // segment numerically; if those tie, break by the alpha suffix
            // of whichever side still has one.
            let (a_major, _) = split_revision(xs[0]);
            let (b_major, _) = split_revision(ys[0]);
            match a_major.cmp(&b_major) {
                Ordering::Equal => first_alpha_run(x).cmp(first_alpha_run(y)),
                other => other,
            }
        }
    }
}

/// Whether `candidate` is accepted by a single bound. `Operator::None` (or
/// an empty bound string) accepts everything; otherwise the comparator
/// result must agree with the bound's operator.
pub fn satisfies_bound(candidate: &str, bound: &Version) -> bool {
    if !bound.is_bound() {
        return true;
    }
    let ord = compare(candidate, &bound.text);
    match bound.op {
        Operator::Gt => ord == Ordering::Greater,
        Operator::Ge => ord != Ordering::Less,
        Operator::Eq => ord == Ordering::Equal,
        Operator::Ne => ord != Ordering::Equal,
        Operator::Lt => ord == Ordering::Less,
        Operator::Le => ord != Ordering::Greater,
        Operator::None => true,
    }
}

/// Reserved names and suffixes that are never version directories: `Current`,
/// `Settings`, `Variable`, dotfiles, and anything ending `-failed` or
/// `-Disabled`.
pub fn is_version_directory(name: &str) -> bool {
    if name.starts_with('.') {
        return false;
    }
    if matches!(name, "Current" | "Settings" | "Variable") {
        return false;
    }
    if name.ends_with("-failed") || name.ends_with("-Disabled") {
        return false;
    }
    true
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn numeric_segments() {
        assert_eq!(compare("1.2.3", "1.2.10"), Ordering::Less);
        assert_eq!(compare("1.2.10", "1.2.3"), Ordering::Greater);
        assert_eq!(compare("1.2.3", "1.2.3"), Ordering::Equal);
    }

    #[test]
    fn revision_suffix() {
        assert_eq!(compare("2.0-r1", "2.0-r2"), Ordering::Less);
        assert_eq!(compare("2.0-r2", "2.0"), Ordering::Greater);
    }

    #[test]
    fn alpha_vs_alpha_is_strcmp() {
        assert_eq!(compare("beta", "alpha"), Ordering::Greater);
    }

    #[test]
    fn bracket_tag_is_stripped() {
        assert_eq!(compare("1.0 [!cross]", "1.0"), Ordering::Equal);
    }

    #[test]
    fn major_fallback_when_segments_exhausted() {
        assert_eq!(compare("2", "2.0.1"), Ordering::Equal);
        assert_eq!(compare("3", "2.9.9"), Ordering::Greater);
    }

    #[test]
    fn satisfies_none_bound_accepts_everything() {
        assert!(satisfies_bound("whatever", &Version::none()));
    }

    #[test]
    fn satisfies_ge() {
        let bound = Version::new(Operator::Ge, "1.5");
        assert!(satisfies_bound("2.0", &bound));
        assert!(!satisfies_bound("1.0", &bound));
    }

    #[test]
    fn satisfies_ne() {
        let bound = Version::new(Operator::Ne, "1.3");
        assert!(!satisfies_bound("1.3", &bound));
        assert!(satisfies_bound("1.4", &bound));
    }

    #[test]
    fn reserved_names_are_not_version_directories() {
        assert!(!is_version_directory("Current"));
        assert!(!is_version_directory("Settings"));
        assert!(!is_version_directory("Variable"));
        assert!(!is_version_directory(".hidden"));
        assert!(!is_version_directory("1.0-failed"));
        assert!(!is_version_directory("1.0-Disabled"));
        assert!(is_version_directory("1.0"));
    }
}

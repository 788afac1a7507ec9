// This file is dual licensed under the terms of the Apache License, Version
// 2.0, and the BSD License. See the LICENSE file in the root of this repository
// for complete details.

//! Parses a dependency manifest: one requirement per line, each naming a
//! dependency and a comma-separated list of version clauses.

use std::io::Read;

use vfs::VfsPath;

use crate::errors::ManifestError;
use crate::version::{self, Operator, Version};

/// A closed-shape pair with the invariant `low.op ∈ {>, >=, =, NONE}` and
/// `high.op ∈ {<, <=, =, NONE}`. Represents one convex region on the version
/// order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Range {
    pub low: Version,
    pub high: Version,
}

impl Range {
    pub fn universal() -> Range {
        Range {
            low: Version::none(),
            high: Version::none(),
        }
    }

    pub fn contains(&self, candidate: &str) -> bool {
        version::satisfies_bound(candidate, &self.low)
            && version::satisfies_bound(candidate, &self.high)
    }
}

/// `(name, ranges)`. A candidate satisfies the requirement iff it lies in at
/// least one range of the list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Requirement {
    pub name: String,
    pub ranges: Vec<Range>,
}

impl Requirement {
    /// An Alien dependency is resolved through an external package-manager
    /// helper rather than the native tree; its name contains a colon.
    pub fn is_alien(&self) -> bool {
        self.name.contains(':')
    }

    pub fn satisfies(&self, candidate: &str) -> bool {
        self.ranges.iter().any(|r| r.contains(candidate))
    }
}

/// One parsed `<op><version>` token from a requirement's comma-separated
/// clause list.
struct Clause {
    op: Operator,
    text: String,
}

/// Seeds a single range from the first clause of a requirement.
fn range_from_version(clause: &Clause) -> Range {
    match clause.op {
        Operator::Gt | Operator::Ge => Range {
            low: Version::new(clause.op, clause.text.clone()),
            high: Version::new(Operator::Lt, String::new()),
        },
        Operator::Lt | Operator::Le => Range {
            low: Version::new(Operator::Gt, String::new()),
            high: Version::new(clause.op, clause.text.clone()),
        },
        Operator::Eq | Operator::Ne => {
            let v = Version::new(Operator::Eq, clause.text.clone());
            Range {
                low: v.clone(),
                high: Version::none(),
            }
        }
        Operator::None => Range::universal(),
    }
}

/// Restricts `ranges` in place by one subsequent clause, following the
/// restriction/split rules. Returns `false` if the clause cannot restrict
/// any existing range (and is not `!=`), signaling the whole list should be
/// cleared as unsatisfiable.
fn restrict(ranges: &mut Vec<Range>, clause: &Clause) -> bool {
    if matches!(clause.op, Operator::Ne) {
        // `!=` splits whichever range currently contains the excluded
        // version into two: [low, v) and (v, high].
        let mut new_ranges = Vec::with_capacity(ranges.len() + 1);
        let mut split_any = false;
        for r in ranges.drain(..) {
            if r.contains(&clause.text) {
                split_any = true;
                let lower = Range {
                    low: r.low.clone(),
                    high: Version::new(Operator::Lt, clause.text.clone()),
                };
                let upper = Range {
                    low: Version::new(Operator::Gt, clause.text.clone()),
                    high: r.high.clone(),
                };
                new_ranges.push(lower);
                new_ranges.push(upper);
            } else {
                new_ranges.push(r);
            }
        }
        *ranges = new_ranges;
        // `!=` never declares the whole list unsatisfiable even if it
        // matched nothing (it still restricts nothing, which is fine).
        let _ = split_any;
        return true;
    }

    let idx = ranges.iter().position(|r| r.contains(&clause.text));
    let idx = match idx {
        Some(i) => i,
        None => return false,
    };

    let r = &mut ranges[idx];
    match clause.op {
        Operator::Gt | Operator::Ge => r.low = Version::new(clause.op, clause.text.clone()),
        Operator::Lt | Operator::Le => r.high = Version::new(clause.op, clause.text.clone()),
        Operator::Eq => {
            r.low = Version::new(Operator::Eq, clause.text.clone());
            r.high = Version::none();
        }
        Operator::Ne | Operator::None => unreachable!("handled above or seeds universally"),
    }
    true
}

fn parse_clause(token: &str, default_op: Operator) -> Clause {
    let token = token.trim();
    const OPERATORS: &[(&str, Operator)] = &[
        (">=", Operator::Ge),
        (">", Operator::Gt),
        ("==", Operator::Eq),
        ("=", Operator::Eq),
        ("!=", Operator::Ne),
        ("<=", Operator::Le),
        ("<", Operator::Lt),
    ];
    for (prefix, op) in OPERATORS {
        if let Some(rest) = token.strip_prefix(prefix) {
            return Clause {
                op: *op,
                text: rest.trim().to_string(),
            };
        }
    }
    if token.is_empty() {
        Clause {
            op: Operator::None,
            text: String::new(),
        }
    } else {
        Clause {
            op: default_op,
            text: token.to_string(),
        }
    }
}

fn build_ranges(clauses: &[Clause]) -> Vec<Range> {
    if clauses.is_empty() {
        return vec![Range::universal()];
    }

    let mut ranges = vec![range_from_version(&clauses[0])];
    for clause in &clauses[1..] {
        if !restrict(&mut ranges, clause) {
            ranges.clear();
            break;
        }
    }
    ranges
}

/// Tokenizes one non-empty, already-preprocessed manifest line into a
/// requirement.
fn parse_line(line: &str, default_op: Operator) -> Result<Requirement, ManifestError> {
    let line = line.trim();
    let mut parts = line.splitn(2, |c: char| c.is_whitespace());
    let name = parts.next().unwrap_or("").trim();
    if name.is_empty() {
        return Err(ManifestError::NoName {
            line: line.to_string(),
        });
    }

    let clauses: Vec<Clause> = match parts.next() {
        Some(rest) if !rest.trim().is_empty() => rest
            .split(',')
            .map(|tok| parse_clause(tok, default_op))
            .collect(),
        _ => Vec::new(),
    };

    Ok(Requirement {
        name: name.to_string(),
        ranges: build_ranges(&clauses),
    })
}

/// Strips everything from the first `#` (comment) and the first `[`
/// (conditional tag).
fn strip_comment_and_tag(line: &str) -> &str {
    let line = match line.find('#') {
        Some(i) => &line[..i],
        None => line,
    };
    match line.find('[') {
        Some(i) => &line[..i],
        None => line,
    }
}

fn looks_like_binary(line: &str) -> bool {
    line.bytes()
        .any(|b| b != b'\t' && (b < 0x20 || b == 0x7f) && b != b'\n' && b != b'\r')
}

/// Parses a whole manifest file. Stops at the first line containing
/// non-printable content, retaining whatever requirements were already
/// parsed from earlier lines.
pub fn parse(contents: &str, default_op: Operator) -> Result<Vec<Requirement>, ManifestError> {
    let mut requirements = Vec::new();
    for (lineno, raw) in contents.lines().enumerate() {
        if looks_like_binary(raw) {
            return Err(ManifestError::BinaryContent { line: lineno + 1 });
        }
        let line = strip_comment_and_tag(raw).trim();
        if line.is_empty() {
            continue;
        }
        requirements.push(parse_line(line, default_op)?);
    }
    Ok(requirements)
}

/// Reads and parses a manifest file off a `VfsPath`, so unit tests can run
/// against an in-memory tree instead of the real filesystem.
pub fn parse_file(path: &VfsPath, default_op: Operator) -> Result<Vec<Requirement>, ManifestError> {
    let mut contents = String::new();
    path.open_file()?.read_to_string(&mut contents)?;
    parse(&contents, default_op)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_manifest_yields_empty_list() {
        assert_eq!(parse("", Operator::Ge).unwrap(), vec![]);
    }

    #[test]
    fn comments_and_tags_are_stripped() {
        let reqs = parse("Foo >= 1.0 # a comment\nBar [!cross]\n", Operator::Ge).unwrap();
        assert_eq!(reqs[0].name, "Foo");
        assert_eq!(reqs[1].name, "Bar");
    }

    #[test]
    fn name_only_line_yields_universal_range() {
        let reqs = parse("Bash", Operator::Ge).unwrap();
        assert_eq!(reqs[0].ranges, vec![Range::universal()]);
        assert!(reqs[0].satisfies("anything"));
    }

    #[test]
    fn default_operator_applies_when_clause_has_none() {
        let reqs = parse("Foo 1.0", Operator::Ge).unwrap();
        assert!(reqs[0].satisfies("1.5"));
        assert!(!reqs[0].satisfies("0.9"));
    }

    #[test]
    fn range_intersection_with_exclusion() {
        let reqs = parse("Baz >= 1.0, < 2.0, != 1.3", Operator::Ge).unwrap();
        let r = &reqs[0];
        assert!(r.satisfies("1.0"));
        assert!(r.satisfies("1.5"));
        assert!(!r.satisfies("1.3"));
        assert!(!r.satisfies("2.0"));
    }

    #[test]
    fn unsatisfiable_clause_clears_ranges() {
        // `< 1.0` then `>= 2.0` can never both hold on one seeded range.
        let reqs = parse("Foo < 1.0, >= 2.0", Operator::Ge).unwrap();
        assert!(reqs[0].ranges.is_empty());
        assert!(!reqs[0].satisfies("5.0"));
    }

    #[test]
    fn binary_content_halts_parsing_but_keeps_earlier_lines() {
        let input = "Foo >= 1.0\nBar\x01Baz\nQux\n";
        let err = parse(input, Operator::Ge).unwrap_err();
        assert!(matches!(err, ManifestError::BinaryContent { line: 2 }));
    }

    #[test]
    fn alien_dependency_name_detected() {
        let reqs = parse("python:requests >= 2.0", Operator::Ge).unwrap();
        assert!(reqs[0].is_alien());
    }
}

//! Glob rule matching.
//!
//! Patterns use shell-style globs with `/` as the separator: `*` matches any
//! (possibly empty) run of non-separator characters, `?` matches exactly one
//! non-separator character, and `[...]` matches a character class (ranges
//! allowed, `^` negates, `\` escapes). A malformed pattern never matches.
//!
//! Evaluation order is fixed: every deny pattern is tested before any allow
//! pattern, so a deny match wins regardless of how specific a competing allow
//! pattern is.

use super::store::PolicySnapshot;
use crate::proxy::target::Target;

/// Outcome of evaluating a target against the current rule set.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    /// The target matched an allow rule.
    Allowed,
    /// The target matched a deny rule.
    Denied,
    /// Neither list matched; the decision escalates to the operator.
    Undecided,
}

/// Evaluate a target against a policy snapshot, deny rules first.
pub fn evaluate(snapshot: &PolicySnapshot, target: &Target) -> Verdict {
    for pattern in &snapshot.deny {
        if pattern_matches(pattern, target) {
            return Verdict::Denied;
        }
    }
    for pattern in &snapshot.allow {
        if pattern_matches(pattern, target) {
            return Verdict::Allowed;
        }
    }
    Verdict::Undecided
}

/// Match one rule pattern against a target.
///
/// The pattern is tried against the full `host[:port]path` string. A pattern
/// containing no `/` is additionally tried against `host[:port]` alone, so a
/// bare domain pattern matches a request regardless of path.
pub fn pattern_matches(pattern: &str, target: &Target) -> bool {
    if glob_match(pattern, &target.rule_string()) {
        return true;
    }
    !pattern.contains('/') && glob_match(pattern, target.authority())
}

/// Match a glob pattern against a string. Returns `false` for malformed
/// patterns (unterminated class, trailing escape).
pub fn glob_match(pattern: &str, target: &str) -> bool {
    let p: Vec<char> = pattern.chars().collect();
    let t: Vec<char> = target.chars().collect();
    match_glob(&p, &t).unwrap_or(false)
}

struct BadPattern;

fn match_glob(p: &[char], t: &[char]) -> Result<bool, BadPattern> {
    let mut pi = 0;
    let mut ti = 0;

    while pi < p.len() {
        match p[pi] {
            '*' => {
                let rest = &p[pi + 1..];
                // Try consuming zero or more non-separator characters.
                let mut i = ti;
                loop {
                    if match_glob(rest, &t[i..])? {
                        return Ok(true);
                    }
                    if i >= t.len() || t[i] == '/' {
                        return Ok(false);
                    }
                    i += 1;
                }
            }
            '?' => {
                if ti >= t.len() || t[ti] == '/' {
                    return Ok(false);
                }
                pi += 1;
                ti += 1;
            }
            '[' => {
                if ti >= t.len() {
                    return Ok(false);
                }
                let (matched, next) = match_class(p, pi, t[ti])?;
                if !matched {
                    return Ok(false);
                }
                pi = next;
                ti += 1;
            }
            '\\' => {
                if pi + 1 >= p.len() {
                    return Err(BadPattern);
                }
                if ti >= t.len() || t[ti] != p[pi + 1] {
                    return Ok(false);
                }
                pi += 2;
                ti += 1;
            }
            c => {
                if ti >= t.len() || t[ti] != c {
                    return Ok(false);
                }
                pi += 1;
                ti += 1;
            }
        }
    }

    Ok(ti == t.len())
}

/// Match a `[...]` class starting at `start` against `ch`. Returns whether it
/// matched and the pattern index just past the closing `]`.
fn match_class(p: &[char], start: usize, ch: char) -> Result<(bool, usize), BadPattern> {
    let mut i = start + 1;
    let negate = i < p.len() && p[i] == '^';
    if negate {
        i += 1;
    }

    let mut matched = false;
    let mut nranges = 0;
    loop {
        if i < p.len() && p[i] == ']' && nranges > 0 {
            i += 1;
            break;
        }
        let lo = class_char(p, &mut i)?;
        let mut hi = lo;
        if i < p.len() && p[i] == '-' {
            i += 1;
            hi = class_char(p, &mut i)?;
        }
        if lo <= ch && ch <= hi {
            matched = true;
        }
        nranges += 1;
    }

    Ok((matched != negate, i))
}

fn class_char(p: &[char], i: &mut usize) -> Result<char, BadPattern> {
    if *i >= p.len() || p[*i] == '-' || p[*i] == ']' {
        return Err(BadPattern);
    }
    let mut c = p[*i];
    if c == '\\' {
        *i += 1;
        if *i >= p.len() {
            return Err(BadPattern);
        }
        c = p[*i];
    }
    *i += 1;
    Ok(c)
}

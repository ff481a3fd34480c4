//! Preservation rules: which paths inside a lesson belong to the user
//!
//! Rules are glob-like and case-sensitive. `*` stays inside one path segment and
//! `**` is rejected. Four shapes are recognised:
//!
//! - `*.local.*` (wildcard, no `/`): matches the file name at any depth
//! - `notes/*.md` (wildcard with `/`): matches the whole relative path
//! - `README.local` (no wildcard): matches exactly that relative path
//! - `custom-*/` (trailing `/`): matches every path below a directory whose
//!   name (or, with inner `/`, whose relative path) satisfies the glob
//!
//! A directory satisfying any rule is protected with its whole subtree. A file is
//! never matched by a directory-style rule, even when its name fits the glob.

use std::path::{Component, Path};

use globset::{GlobBuilder, GlobMatcher};

use super::error::PatternConfigError;

#[derive(Debug, Clone)]
enum Matcher {
    Exact(String),
    Glob(GlobMatcher),
}

impl Matcher {
    fn is_match(&self, candidate: &str) -> bool {
        match self {
            Matcher::Exact(expected) => expected == candidate,
            Matcher::Glob(glob) => glob.is_match(candidate),
        }
    }
}

#[derive(Debug, Clone)]
struct Rule {
    source: String,
    matcher: Matcher,
    /// Trailing `/` in the source
    directory: bool,
    /// Matched against the last segment rather than the whole relative path
    by_name: bool,
}

/// Compiled, immutable rule set shared by every stage of a sync run
#[derive(Debug, Clone, Default)]
pub struct PreservationRules {
    rules: Vec<Rule>,
}

fn invalid(rule: &str, reason: impl Into<String>) -> PatternConfigError {
    PatternConfigError {
        rule: rule.to_string(),
        reason: reason.into(),
    }
}

fn has_wildcard(pattern: &str) -> bool {
    pattern.contains(['*', '?', '['])
}

fn compile(source: &str) -> Result<Rule, PatternConfigError> {
    let trimmed = source.trim();
    if trimmed.is_empty() {
        return Err(invalid(source, "rule is empty"));
    }
    if trimmed.starts_with('/') {
        return Err(invalid(source, "rules are relative to the lesson root"));
    }
    if trimmed.contains('\\') {
        return Err(invalid(source, "use `/` as the path separator"));
    }
    if trimmed.contains("**") {
        return Err(invalid(source, "recursive `**` is not supported"));
    }

    let directory = trimmed.ends_with('/');
    let body = trimmed.trim_end_matches('/');
    if body.is_empty() {
        return Err(invalid(source, "directory rule has no name"));
    }
    if body.split('/').any(|segment| segment.is_empty() || segment == "." || segment == "..") {
        return Err(invalid(source, "rule contains an empty, `.` or `..` segment"));
    }

    let wildcard = has_wildcard(body);
    let matcher = if wildcard {
        let glob = GlobBuilder::new(body)
            .literal_separator(true)
            .case_insensitive(false)
            .backslash_escape(false)
            .build()
            .map_err(|e| invalid(source, e.kind().to_string()))?;
        Matcher::Glob(glob.compile_matcher())
    } else {
        Matcher::Exact(body.to_string())
    };

    Ok(Rule {
        source: trimmed.to_string(),
        matcher,
        directory,
        by_name: wildcard && !body.contains('/'),
    })
}

/// Path segments joined with `/`, ignoring `.` and any root
fn segments(path: &Path) -> Vec<String> {
    path.components()
        .filter_map(|component| match component {
            Component::Normal(part) => Some(part.to_string_lossy().into_owned()),
            _ => None,
        })
        .collect()
}

impl Rule {
    /// Does the directory made of `segments[..=last]` satisfy this rule
    fn matches_dir_prefix(&self, segments: &[String], last: usize) -> bool {
        if self.by_name {
            self.matcher.is_match(&segments[last])
        } else {
            self.matcher.is_match(&segments[..=last].join("/"))
        }
    }

    fn matches_file(&self, segments: &[String]) -> bool {
        let Some(name) = segments.last() else {
            return false;
        };
        if self.by_name {
            self.matcher.is_match(name)
        } else {
            self.matcher.is_match(&segments.join("/"))
        }
    }
}

impl PreservationRules {
    /// Compile a rule list, deduplicating repeats. The first bad rule aborts.
    pub fn new<I, S>(patterns: I) -> Result<Self, PatternConfigError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut rules: Vec<Rule> = Vec::new();
        for pattern in patterns {
            let rule = compile(pattern.as_ref())?;
            if !rules.iter().any(|existing| existing.source == rule.source) {
                rules.push(rule);
            }
        }
        Ok(Self { rules })
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    /// The rules in their normalized source form
    pub fn sources(&self) -> impl Iterator<Item = &str> {
        self.rules.iter().map(|rule| rule.source.as_str())
    }

    /// Is the file (or symlink) at `relative` protected, itself or through an ancestor
    pub fn matches(&self, relative: &Path) -> bool {
        let segments = segments(relative);
        if segments.is_empty() {
            return false;
        }
        self.rules.iter().any(|rule| {
            (!rule.directory && rule.matches_file(&segments))
                || (0..segments.len() - 1).any(|last| rule.matches_dir_prefix(&segments, last))
        })
    }

    /// Is the directory at `relative` protected, either itself or through an ancestor
    pub fn matches_dir(&self, relative: &Path) -> bool {
        let segments = segments(relative);
        self.rules
            .iter()
            .any(|rule| (0..segments.len()).any(|last| rule.matches_dir_prefix(&segments, last)))
    }
}

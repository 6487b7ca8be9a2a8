use globset::{GlobBuilder, GlobMatcher};

use crate::error::IgnoreError;
use crate::rule::IgnoreRule;

/// One rule compiled to glob matchers.
///
/// A rule gets a direct matcher for the entry itself and, unless it is
/// negated, descendant matchers so that excluding a directory excludes
/// everything beneath it.
#[derive(Debug)]
pub(crate) struct CompiledRule {
    negated: bool,
    directory_only: bool,
    direct_matchers: Vec<GlobMatcher>,
    descendant_matchers: Vec<GlobMatcher>,
}

impl CompiledRule {
    pub(crate) fn new(rule: &IgnoreRule) -> Result<Self, IgnoreError> {
        let (anchored, directory_only, core) = normalize_pattern(rule.pattern());

        let mut direct_patterns = vec![core.clone()];
        if !anchored {
            direct_patterns.push(format!("**/{core}"));
        }

        let mut descendant_patterns = Vec::new();
        if !rule.negated() {
            descendant_patterns.push(format!("{core}/**"));
            if !anchored {
                descendant_patterns.push(format!("**/{core}/**"));
            }
        }

        Ok(Self {
            negated: rule.negated(),
            directory_only,
            direct_matchers: compile_patterns(&direct_patterns, rule.pattern())?,
            descendant_matchers: compile_patterns(&descendant_patterns, rule.pattern())?,
        })
    }

    /// Returns whether the rule matches `path` (no leading or trailing
    /// separators).
    pub(crate) fn matches(&self, path: &str, is_dir: bool) -> bool {
        for matcher in &self.direct_matchers {
            if matcher.is_match(path) && (!self.directory_only || is_dir) {
                return true;
            }
        }
        self.descendant_matchers
            .iter()
            .any(|matcher| matcher.is_match(path))
    }

    pub(crate) fn negated(&self) -> bool {
        self.negated
    }
}

fn compile_patterns(patterns: &[String], original: &str) -> Result<Vec<GlobMatcher>, IgnoreError> {
    let mut matchers = Vec::with_capacity(patterns.len());
    for pattern in patterns {
        let glob = GlobBuilder::new(pattern)
            .literal_separator(true)
            .backslash_escape(true)
            .build()
            .map_err(|error| IgnoreError::new(original.to_string(), error))?;
        matchers.push(glob.compile_matcher());
    }
    Ok(matchers)
}

/// Splits a pattern into its anchoring, directory-only marker, and core
/// glob text. A pattern containing an interior `/` is anchored even
/// without a leading one, like gitignore.
fn normalize_pattern(pattern: &str) -> (bool, bool, String) {
    let directory_only = pattern.ends_with('/');
    let mut core = pattern;
    if directory_only && core.len() > 1 {
        core = &core[..core.len() - 1];
    }
    let anchored = core.starts_with('/') || core.contains('/');
    let core = core.strip_prefix('/').unwrap_or(core);
    (anchored, directory_only, core.to_string())
}

#![deny(rustdoc::broken_intra_doc_links)]

//! # Overview
//!
//! Gitignore-style ignore rules for the transfer engine. Rule lines are
//! compiled once into an [`IgnoreSet`]; the engine then asks it about
//! every path it visits. Matching entries (and everything beneath a
//! matching directory) are skipped.
//!
//! # Path convention
//!
//! The engine hands the set paths with a leading `/` and a trailing `/`
//! for directories, e.g. `/src/build/`. That anchors root-relative
//! patterns the way git does and lets `dir/`-style rules distinguish
//! directories from files.
//!
//! # Rule syntax
//!
//! - Blank lines and lines starting with `#` are skipped.
//! - A leading `!` negates the rule; the last matching rule wins.
//! - A trailing `/` restricts the rule to directories.
//! - A pattern containing a `/` (other than a trailing one) is anchored
//!   to the root; a bare name matches at any depth.
//! - Glob syntax is [`globset`]'s with `/`-aware wildcards: `*` does not
//!   cross separators, `**` does.

mod compiled;
mod error;
mod rule;

pub use error::IgnoreError;
pub use rule::IgnoreRule;

use compiled::CompiledRule;

/// A compiled set of ignore rules.
///
/// Rules are evaluated in order and the last match wins, so a negated
/// rule can re-include an entry excluded by an earlier one.
#[derive(Debug, Default)]
pub struct IgnoreSet {
    rules: Vec<CompiledRule>,
}

impl IgnoreSet {
    /// Compiles newline-separated rule lines.
    pub fn from_lines(lines: &str) -> Result<Self, IgnoreError> {
        let mut rules = Vec::new();
        for line in lines.lines() {
            if let Some(rule) = IgnoreRule::parse(line) {
                rules.push(CompiledRule::new(&rule)?);
            }
        }
        Ok(Self { rules })
    }

    /// Returns whether the entry at `filter_path` should be ignored.
    ///
    /// `filter_path` uses the engine convention: leading `/`, trailing
    /// `/` for directories.
    #[must_use]
    pub fn matches(&self, filter_path: &str) -> bool {
        let is_dir = filter_path.ends_with('/');
        let path = filter_path.trim_matches('/');
        if path.is_empty() {
            return false;
        }

        let mut ignored = false;
        for rule in &self.rules {
            if rule.matches(path, is_dir) {
                ignored = !rule.negated();
            }
        }
        ignored
    }

    /// Returns whether the set contains no rules.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    /// The number of compiled rules.
    #[must_use]
    pub fn len(&self) -> usize {
        self.rules.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn set(lines: &str) -> IgnoreSet {
        IgnoreSet::from_lines(lines).expect("compile")
    }

    #[test]
    fn empty_set_matches_nothing() {
        let s = set("");
        assert!(s.is_empty());
        assert!(!s.matches("/anything"));
        assert!(!s.matches("/dir/"));
    }

    #[test]
    fn comments_and_blanks_are_skipped() {
        let s = set("# a comment\n\n*.log\n");
        assert_eq!(s.len(), 1);
        assert!(s.matches("/x.log"));
    }

    #[test]
    fn bare_name_matches_at_any_depth() {
        let s = set("*.log");
        assert!(s.matches("/a.log"));
        assert!(s.matches("/deep/nested/b.log"));
        assert!(!s.matches("/a.txt"));
    }

    #[test]
    fn anchored_pattern_matches_from_root_only() {
        let s = set("/build");
        assert!(s.matches("/build"));
        assert!(s.matches("/build/"));
        assert!(!s.matches("/src/build"));
    }

    #[test]
    fn slash_in_pattern_anchors_it() {
        let s = set("doc/internal");
        assert!(s.matches("/doc/internal"));
        assert!(!s.matches("/other/doc/internal"));
    }

    #[test]
    fn directory_only_rule_ignores_files() {
        let s = set("cache/");
        assert!(s.matches("/cache/"));
        assert!(!s.matches("/cache"));
        assert!(s.matches("/sub/cache/"));
    }

    #[test]
    fn excluded_directory_excludes_descendants() {
        let s = set("build/");
        assert!(s.matches("/build/out.o"));
        assert!(s.matches("/build/nested/deep.txt"));
    }

    #[test]
    fn negation_reincludes_and_last_match_wins() {
        let s = set("*.log\n!keep.log");
        assert!(s.matches("/a.log"));
        assert!(!s.matches("/keep.log"));

        let s = set("!keep.log\n*.log");
        assert!(s.matches("/keep.log"));
    }

    #[test]
    fn double_star_crosses_directories() {
        let s = set("/target/**/*.tmp");
        assert!(s.matches("/target/a/b/c.tmp"));
        assert!(!s.matches("/target/a/b/c.rs"));
    }

    #[test]
    fn invalid_glob_is_an_error() {
        assert!(IgnoreSet::from_lines("a[").is_err());
    }
}

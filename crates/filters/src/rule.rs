/// One parsed ignore rule line, before glob compilation.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct IgnoreRule {
    pub(crate) negated: bool,
    pub(crate) pattern: String,
}

impl IgnoreRule {
    /// Parses a single rule line. Returns `None` for blank lines and
    /// comments.
    #[must_use]
    pub fn parse(line: &str) -> Option<Self> {
        let trimmed = line.trim_end();
        if trimmed.is_empty() || trimmed.starts_with('#') {
            return None;
        }

        let (negated, rest) = match trimmed.strip_prefix('!') {
            Some(rest) => (true, rest),
            None => (false, trimmed),
        };
        // An escaped leading '#' or '!' is part of the pattern.
        let rest = rest
            .strip_prefix("\\#")
            .map(|r| format!("#{r}"))
            .or_else(|| rest.strip_prefix("\\!").map(|r| format!("!{r}")))
            .unwrap_or_else(|| rest.to_string());
        if rest.is_empty() {
            return None;
        }

        Some(Self {
            negated,
            pattern: rest,
        })
    }

    /// Returns whether the rule re-includes matches instead of
    /// excluding them.
    #[must_use]
    pub fn negated(&self) -> bool {
        self.negated
    }

    /// The pattern text, without the negation marker.
    #[must_use]
    pub fn pattern(&self) -> &str {
        &self.pattern
    }
}

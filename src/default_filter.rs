//! Injection of the default filter policy.

use serde::{Deserialize, Serialize};

/// A predicate added to every filter unless the filter already mentions `contains`.
///
/// The check is textual: `not run.archived` mentions `run.archived`, so a user who
/// writes `run.archived == True` or `not run.archived` gets no injected default.
/// The injection itself is not: the default is parsed on its own and joined to the
/// user's parsed filter with `and`, so nothing the user types can reach into it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DefaultExpression {
    pub contains: String,
    pub expression: String,
}

impl Default for DefaultExpression {
    fn default() -> Self {
        Self::new("run.archived", "not run.archived")
    }
}

impl DefaultExpression {
    pub fn new(contains: impl Into<String>, expression: impl Into<String>) -> Self {
        Self { contains: contains.into(), expression: expression.into() }
    }

    /// Never injects anything.
    pub fn disabled() -> Self {
        Self::new("", "")
    }

    /// Whether `raw` gets the default predicate.
    pub fn applies_to(&self, raw: &str) -> bool {
        !self.expression.trim().is_empty()
            && !self.contains.is_empty()
            && !raw.contains(self.contains.as_str())
    }
}

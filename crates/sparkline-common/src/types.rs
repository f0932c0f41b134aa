//! Common type definitions shared by the report engine and its configuration.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::hash_map::DefaultHasher;
use std::fmt;
use std::hash::{Hash, Hasher};

/// Timestamp type used throughout the workspace.
pub type Timestamp = DateTime<Utc>;

/// An opaque predicate fragment, e.g. `login IN (?)` with its bound parameters.
///
/// The engine never interprets the expression. It only AND-combines fragments
/// and fingerprints them so that identical filters share cache entries.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Condition {
    /// Filter expression understood by the query collaborator.
    pub expression: String,
    /// Values bound to the expression's placeholders, in order.
    #[serde(default)]
    pub params: Vec<Value>,
}

impl Condition {
    /// Creates a condition with bound parameters.
    pub fn new<I, V>(expression: impl Into<String>, params: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        Self {
            expression: expression.into(),
            params: params.into_iter().map(Into::into).collect(),
        }
    }

    /// Creates a condition without parameters.
    pub fn raw(expression: impl Into<String>) -> Self {
        Self {
            expression: expression.into(),
            params: Vec::new(),
        }
    }
}

// `Value` has no `Hash`; its canonical JSON text stands in for it.
impl Hash for Condition {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.expression.hash(state);
        self.params.len().hash(state);
        for param in &self.params {
            param.to_string().hash(state);
        }
    }
}

impl fmt::Display for Condition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.expression)
    }
}

/// A conjunction of [`Condition`]s. Order is preserved.
#[derive(Debug, Clone, Default, PartialEq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Conditions(Vec<Condition>);

impl Conditions {
    /// An empty conjunction (matches everything).
    pub const fn new() -> Self {
        Self(Vec::new())
    }

    /// Whether no condition is present.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Number of conjoined conditions.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Iterates the conditions in order.
    pub fn iter(&self) -> std::slice::Iter<'_, Condition> {
        self.0.iter()
    }

    /// Appends a condition to the conjunction.
    pub fn push(&mut self, condition: Condition) {
        self.0.push(condition);
    }

    /// Returns `self AND other`, keeping `self`'s conditions first.
    #[must_use]
    pub fn and(&self, other: &Self) -> Self {
        let mut combined = self.0.clone();
        combined.extend(other.0.iter().cloned());
        Self(combined)
    }

    /// Stable-per-process fingerprint of the conjunction, `0` when empty.
    pub fn fingerprint(&self) -> u64 {
        if self.is_empty() {
            return 0;
        }
        let mut hasher = DefaultHasher::new();
        self.hash(&mut hasher);
        hasher.finish()
    }
}

impl fmt::Display for Conditions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, condition) in self.0.iter().enumerate() {
            if i > 0 {
                write!(f, " AND ")?;
            }
            write!(f, "({condition})")?;
        }
        Ok(())
    }
}

impl From<Vec<Condition>> for Conditions {
    fn from(conditions: Vec<Condition>) -> Self {
        Self(conditions)
    }
}

impl From<Condition> for Conditions {
    fn from(condition: Condition) -> Self {
        Self(vec![condition])
    }
}

impl FromIterator<Condition> for Conditions {
    fn from_iter<T: IntoIterator<Item = Condition>>(iter: T) -> Self {
        Self(iter.into_iter().collect())
    }
}

impl<'a> IntoIterator for &'a Conditions {
    type Item = &'a Condition;
    type IntoIter = std::slice::Iter<'a, Condition>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_conditions_and_keeps_order() {
        let base = Conditions::from(Condition::raw("active = 1"));
        let extra = Conditions::from(Condition::new("login IN (?)", [json!(["a", "b"])]));

        let combined = base.and(&extra);
        assert_eq!(combined.len(), 2);
        assert_eq!(combined.iter().next().unwrap().expression, "active = 1");
        assert_eq!(combined.to_string(), "(active = 1) AND (login IN (?))");
    }

    #[test]
    fn test_fingerprint_distinguishes_params() {
        let a = Conditions::from(Condition::new("login = ?", ["test 1"]));
        let b = Conditions::from(Condition::new("login = ?", ["test 2"]));
        let a_again = Conditions::from(Condition::new("login = ?", ["test 1"]));

        assert_ne!(a.fingerprint(), b.fingerprint());
        assert_eq!(a.fingerprint(), a_again.fingerprint());
        assert_eq!(Conditions::new().fingerprint(), 0);
    }

    #[test]
    fn test_conditions_deserialize_from_list() {
        let conditions: Conditions = serde_json::from_str(
            r#"[{"expression": "login IN (?)", "params": [["test 1", "test 2"]]}, {"expression": "deleted_at IS NULL"}]"#,
        )
        .unwrap();

        assert_eq!(conditions.len(), 2);
        let second = conditions.iter().nth(1).unwrap();
        assert!(second.params.is_empty());
    }
}

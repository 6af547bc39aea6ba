//! Process environment snapshot
//!
//! The expander never reads `std::env` itself: callers capture the
//! environment once and inject the snapshot, which keeps expansion
//! reproducible in tests.

use super::instruction::{VarValue, Variables};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::ffi::OsString;

/// Immutable snapshot of environment variables
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct Environment {
    vars: BTreeMap<String, String>,
}

impl Environment {
    /// Creates a new empty environment.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Captures the variables of the current process.
    ///
    /// Variables whose name or value is not valid Unicode are skipped.
    #[must_use]
    pub fn capture() -> Self {
        let environment = Self::from_os_vars(std::env::vars_os());
        tracing::debug!(count = environment.len(), "Captured process environment");
        environment
    }

    fn from_os_vars(vars: impl IntoIterator<Item = (OsString, OsString)>) -> Self {
        let vars = vars
            .into_iter()
            .filter_map(|(key, value)| Some((key.into_string().ok()?, value.into_string().ok()?)))
            .collect();
        Self { vars }
    }

    /// Sets a variable.
    #[must_use]
    pub fn set(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.vars.insert(key.into(), value.into());
        self
    }

    /// Gets a variable by name.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&String> {
        self.vars.get(key)
    }

    /// Returns the number of variables
    #[must_use]
    pub fn len(&self) -> usize {
        self.vars.len()
    }

    /// Returns true if the snapshot is empty
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.vars.is_empty()
    }

    /// Adds every variable not already present in `variables`.
    ///
    /// Values already in the context always win.
    pub fn merge_into(&self, variables: &mut Variables) {
        for (key, value) in &self.vars {
            variables
                .entry(key.clone())
                .or_insert_with(|| VarValue::Str(value.clone()));
        }
    }
}

impl<K, V> FromIterator<(K, V)> for Environment
where
    K: Into<String>,
    V: Into<String>,
{
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self {
            vars: iter.into_iter().map(|(k, v)| (k.into(), v.into())).collect(),
        }
    }
}

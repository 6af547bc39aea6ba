//! Core values flowing through the job compiler
//!
//! An [`Instruction`] is the resolved (or still raw) form of a YAML value
//! held by a section. [`VarValue`] and [`Variables`] make up the variable
//! context used to substitute `${VAR}` placeholders and to emit `SET`/`export`
//! lines.

use super::document::Section;
use super::errors::ConfigError;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_yaml::Value;
use std::collections::BTreeMap;
use std::fmt;

/// Variable context: name to value, iterated in a deterministic order
pub type Variables = BTreeMap<String, VarValue>;

/// Pseudo-dictionary carried by an instruction (`--KEY=value;;` or a YAML mapping)
pub type Options = IndexMap<String, Option<String>>;

/// Value of a variable in the context
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum VarValue {
    /// Absent value
    None,
    /// Boolean value
    Bool(bool),
    /// Integer value
    Int(i64),
    /// Floating point value
    Float(f64),
    /// String value
    Str(String),
}

impl VarValue {
    /// Returns the string if this value is a string
    #[must_use]
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Str(s) => Some(s),
            _ => None,
        }
    }

    /// Returns true for [`VarValue::None`]
    #[must_use]
    pub fn is_none(&self) -> bool {
        matches!(self, Self::None)
    }

    /// Converts a scalar YAML value, `None` for sequences and mappings
    #[must_use]
    pub fn from_yaml(value: &Value) -> Option<Self> {
        match value {
            Value::Null => Some(Self::None),
            Value::Bool(b) => Some(Self::Bool(*b)),
            Value::Number(n) => n
                .as_i64()
                .map(Self::Int)
                .or_else(|| n.as_f64().map(Self::Float)),
            Value::String(s) => Some(Self::Str(s.clone())),
            Value::Tagged(tagged) => Self::from_yaml(&tagged.value),
            Value::Sequence(_) | Value::Mapping(_) => None,
        }
    }
}

impl fmt::Display for VarValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::None => write!(f, "None"),
            Self::Bool(true) => write!(f, "True"),
            Self::Bool(false) => write!(f, "False"),
            Self::Int(i) => write!(f, "{i}"),
            Self::Float(v) => write!(f, "{}", format_float(*v)),
            Self::Str(s) => write!(f, "{s}"),
        }
    }
}

impl From<&str> for VarValue {
    fn from(value: &str) -> Self {
        Self::Str(value.to_string())
    }
}

impl From<String> for VarValue {
    fn from(value: String) -> Self {
        Self::Str(value)
    }
}

impl From<i64> for VarValue {
    fn from(value: i64) -> Self {
        Self::Int(value)
    }
}

impl From<f64> for VarValue {
    fn from(value: f64) -> Self {
        Self::Float(value)
    }
}

impl From<bool> for VarValue {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

impl From<Option<String>> for VarValue {
    fn from(value: Option<String>) -> Self {
        value.map_or(Self::None, Self::Str)
    }
}

/// Formats a float the way users write versions: `3.0`, `3.7`, `1e-7`.
pub(crate) fn format_float(v: f64) -> String {
    if v.is_finite() && v.fract() == 0.0 && v.abs() < 1e16 {
        format!("{v:.1}")
    } else {
        format!("{v}")
    }
}

/// A raw or resolved instruction
///
/// Conditionals collapse to the chosen branch during interpretation; a dropped
/// instruction is represented by `Option::None`, never stored in the tree.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Instruction {
    /// A single command or value
    Literal(String),
    /// An ordered list of instructions
    Sequence(Vec<Instruction>),
    /// A `(key, value)` pair
    KeyedStep(String, Box<Instruction>),
    /// A mapping of uppercase keys to optional values
    Options(Options),
    /// An integer scalar
    Integer(i64),
    /// A floating point scalar
    Number(f64),
}

impl Instruction {
    /// Creates a literal instruction
    #[must_use]
    pub fn literal(value: impl Into<String>) -> Self {
        Self::Literal(value.into())
    }

    /// Creates a sequence of literals
    #[must_use]
    pub fn literals<I, S>(values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::Sequence(values.into_iter().map(Self::literal).collect())
    }

    /// Returns the text of a literal
    #[must_use]
    pub fn as_literal(&self) -> Option<&str> {
        match self {
            Self::Literal(s) => Some(s),
            _ => None,
        }
    }

    /// Returns true if there is nothing to run: empty text, list or mapping
    #[must_use]
    pub fn is_empty(&self) -> bool {
        match self {
            Self::Literal(s) => s.trim().is_empty(),
            Self::Sequence(items) => items.is_empty(),
            Self::Options(options) => options.is_empty(),
            Self::KeyedStep(..) | Self::Integer(_) | Self::Number(_) => false,
        }
    }

    /// Converts a YAML value held by `section` into an instruction
    ///
    /// Returns `Ok(None)` for null values. Null items of a list are skipped,
    /// except in `python` and `script` where they become empty literals.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidValue`] if a mapping holds a nested
    /// sequence or mapping.
    pub fn from_yaml(section: &str, value: &Value) -> Result<Option<Self>, ConfigError> {
        let instruction = match value {
            Value::Null => return Ok(None),
            Value::Bool(b) => Self::Literal(VarValue::Bool(*b).to_string()),
            Value::Number(n) => match n.as_i64() {
                Some(i) => Self::Integer(i),
                None => Self::Number(n.as_f64().unwrap_or(f64::NAN)),
            },
            Value::String(s) => Self::Literal(s.clone()),
            Value::Sequence(items) => {
                let keep_nulls = Section::from_key(section).is_some_and(Section::is_multiplying);
                let mut converted = Vec::with_capacity(items.len());
                for item in items {
                    match Self::from_yaml(section, item)? {
                        Some(inst) => converted.push(inst),
                        // an undefined python or script entry keeps its place in the matrix
                        None if keep_nulls => converted.push(Self::Literal(String::new())),
                        None => {}
                    }
                }
                Self::Sequence(converted)
            }
            Value::Mapping(mapping) => {
                let mut options = Options::new();
                for (key, val) in mapping {
                    let key = scalar_to_string(key).ok_or_else(|| ConfigError::InvalidValue {
                        section: section.to_string(),
                        reason: format!("mapping keys must be scalars, got {key:?}"),
                    })?;
                    let val = match val {
                        Value::Null => None,
                        other => Some(scalar_to_string(other).ok_or_else(|| {
                            ConfigError::InvalidValue {
                                section: section.to_string(),
                                reason: format!("value of '{key}' must be a scalar, got {other:?}"),
                            }
                        })?),
                    };
                    options.insert(key, val);
                }
                Self::Options(options)
            }
            Value::Tagged(tagged) => return Self::from_yaml(section, &tagged.value),
        };
        Ok(Some(instruction))
    }
}

fn scalar_to_string(value: &Value) -> Option<String> {
    match value {
        Value::Null | Value::Sequence(_) | Value::Mapping(_) => None,
        Value::Tagged(tagged) => scalar_to_string(&tagged.value),
        other => VarValue::from_yaml(other).map(|v| v.to_string()),
    }
}

impl fmt::Display for Instruction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Literal(s) => write!(f, "{s}"),
            Self::Sequence(items) => {
                write!(f, "[")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{item}")?;
                }
                write!(f, "]")
            }
            Self::KeyedStep(key, value) => write!(f, "({key}, {value})"),
            Self::Options(options) => {
                write!(f, "{{")?;
                for (i, (key, value)) in options.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    match value {
                        Some(v) => write!(f, "{key}: {v}")?,
                        None => write!(f, "{key}: None")?,
                    }
                }
                write!(f, "}}")
            }
            Self::Integer(i) => write!(f, "{i}"),
            Self::Number(v) => write!(f, "{}", format_float(*v)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_var_value_display_matches_python_str() {
        assert_eq!(VarValue::None.to_string(), "None");
        assert_eq!(VarValue::Bool(true).to_string(), "True");
        assert_eq!(VarValue::Float(3.0).to_string(), "3.0");
        assert_eq!(VarValue::Float(3.7).to_string(), "3.7");
        assert_eq!(VarValue::Int(899).to_string(), "899");
    }

    #[test]
    fn test_var_value_deserialize_untagged() {
        let v: VarValue = serde_json::from_str("null").unwrap();
        assert!(v.is_none());
        let v: VarValue = serde_json::from_str("\"std\"").unwrap();
        assert_eq!(v.as_str(), Some("std"));
        let v: VarValue = serde_json::from_str("12").unwrap();
        assert_eq!(v, VarValue::Int(12));
    }

    #[test]
    fn test_from_yaml_mapping_keeps_order() {
        let value: Value = serde_yaml::from_str("{PATH: /opt/py, VERSION: 3.7, DIST: std}").unwrap();
        let inst = Instruction::from_yaml("python", &value).unwrap().unwrap();
        let Instruction::Options(options) = inst else {
            panic!("expected options");
        };
        let keys: Vec<&str> = options.keys().map(String::as_str).collect();
        assert_eq!(keys, vec!["PATH", "VERSION", "DIST"]);
        assert_eq!(options["VERSION"].as_deref(), Some("3.7"));
    }

    #[test]
    fn test_from_yaml_skips_null_items() {
        let value: Value = serde_yaml::from_str("[a, null, b]").unwrap();
        let inst = Instruction::from_yaml("install", &value).unwrap().unwrap();
        assert_eq!(inst, Instruction::literals(["a", "b"]));
    }

    #[test]
    fn test_from_yaml_keeps_null_matrix_entries() {
        let value: Value = serde_yaml::from_str("[/opt/py, null]").unwrap();
        let inst = Instruction::from_yaml("python", &value).unwrap().unwrap();
        assert_eq!(inst, Instruction::literals(["/opt/py", ""]));
    }

    #[test]
    fn test_from_yaml_rejects_nested_mapping_values() {
        let value: Value = serde_yaml::from_str("{PATH: {nested: 1}}").unwrap();
        let err = Instruction::from_yaml("python", &value).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { .. }));
    }

    #[test]
    fn test_is_empty() {
        assert!(Instruction::literal("  ").is_empty());
        assert!(Instruction::Sequence(vec![]).is_empty());
        assert!(!Instruction::literal("pip freeze").is_empty());
        assert!(!Instruction::Integer(0).is_empty());
    }

    #[test]
    fn test_display_options() {
        let mut options = Options::new();
        options.insert("CMD".to_string(), Some("make".to_string()));
        options.insert("NAME".to_string(), None);
        assert_eq!(Instruction::Options(options).to_string(), "{CMD: make, NAME: None}");
    }
}

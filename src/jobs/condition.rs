//! Condition evaluator
//!
//! Conditions are small boolean expressions found in `if ... then ... fi`
//! statements, for example:
//!
//! ```text
//! [ ${PYTHON} == "C:\Python35_x64", ${DIST} != "conda" ]
//! ```
//!
//! A bracketed list is true when every item is true. Expressions use the
//! Jinja expression syntax compiled by `minijinja`: literals (`True`,
//! `None`, strings, numbers, lists), `== != < <= > >=`, `in`, `not in`,
//! `+`, `not`, `and`, `or` and `a if c else b`.
//!
//! `${VAR}` placeholders outside string literals are looked up in the
//! variable context (by name or by upper-cased name) and bound as string
//! values, so a value can never change the structure of the expression.
//! Any other name is not part of the language: the condition is then
//! reported as unparseable.

use super::errors::JobError;
use super::instruction::{Variables, format_float};
use minijinja::value::{Value, ValueKind};
use minijinja::{Environment, UndefinedBehavior};
use std::collections::BTreeMap;
use std::fmt;

/// Context names bound to placeholders
const PLACEHOLDER_PREFIX: &str = "__placeholder_";

/// Result of evaluating a condition
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConditionOutcome {
    /// The condition parsed and evaluated to a boolean
    Resolved(bool),
    /// The text is not an expression of this language (e.g. a shell test)
    Unparseable {
        /// Why parsing failed.
        reason: String,
    },
}

/// Value produced by an expression
#[derive(Debug, Clone, PartialEq)]
pub enum ExprValue {
    /// `None`
    None,
    /// `True` / `False`
    Bool(bool),
    /// Integer
    Int(i64),
    /// Float
    Float(f64),
    /// String literal or substituted placeholder
    Str(String),
    /// Bracketed list
    List(Vec<ExprValue>),
}

impl ExprValue {
    /// Truthiness with the usual scripting-language rules
    #[must_use]
    pub fn is_truthy(&self) -> bool {
        match self {
            Self::None => false,
            Self::Bool(b) => *b,
            Self::Int(i) => *i != 0,
            Self::Float(f) => *f != 0.0,
            Self::Str(s) => !s.is_empty(),
            Self::List(items) => !items.is_empty(),
        }
    }

    fn from_value(value: &Value) -> Self {
        match value.kind() {
            ValueKind::Undefined | ValueKind::None => Self::None,
            ValueKind::Bool => Self::Bool(value.is_true()),
            ValueKind::Number => match value.as_i64() {
                Some(i) if value.is_integer() => Self::Int(i),
                _ => f64::try_from(value.clone()).map_or(Self::None, Self::Float),
            },
            ValueKind::String => Self::Str(value.as_str().unwrap_or_default().to_string()),
            ValueKind::Seq | ValueKind::Iterable => Self::List(
                value
                    .try_iter()
                    .map(|items| items.map(|item| Self::from_value(&item)).collect())
                    .unwrap_or_default(),
            ),
            _ => Self::Str(value.to_string()),
        }
    }

    fn repr(&self) -> String {
        match self {
            Self::Str(s) => format!("'{s}'"),
            other => other.to_string(),
        }
    }
}

impl fmt::Display for ExprValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::None => write!(f, "None"),
            Self::Bool(true) => write!(f, "True"),
            Self::Bool(false) => write!(f, "False"),
            Self::Int(i) => write!(f, "{i}"),
            Self::Float(v) => write!(f, "{}", format_float(*v)),
            Self::Str(s) => write!(f, "{s}"),
            Self::List(items) => {
                let items: Vec<String> = items.iter().map(ExprValue::repr).collect();
                write!(f, "[{}]", items.join(", "))
            }
        }
    }
}

/// Why an expression produced no value
enum Failure {
    Unparseable(String),
    Evaluation(String),
}

/// Evaluates a condition against a variable context
///
/// Text that does not parse is reported as [`ConditionOutcome::Unparseable`]
/// so callers can decide whether it belongs to another language.
///
/// # Errors
///
/// Returns [`JobError::ConditionEvaluation`] when the expression parses but
/// cannot be evaluated (incompatible operand types).
pub fn evaluate(condition: &str, variables: &Variables) -> Result<ConditionOutcome, JobError> {
    let text = condition.trim();
    let value = match eval(text, variables) {
        Ok(value) => value,
        Err(Failure::Unparseable(reason)) => return Ok(ConditionOutcome::Unparseable { reason }),
        Err(Failure::Evaluation(reason)) => {
            return Err(JobError::ConditionEvaluation {
                condition: condition.to_string(),
                reason,
            });
        }
    };

    let bracketed = text.starts_with('[') && text.ends_with(']');
    let result = match value {
        ExprValue::List(items) if bracketed => items.iter().all(ExprValue::is_truthy),
        other => other.is_truthy(),
    };
    Ok(ConditionOutcome::Resolved(result))
}

/// Evaluates a condition that must be valid
///
/// # Errors
///
/// Returns [`JobError::ConditionSyntax`] with the original condition and the
/// variable context if the condition does not parse, and
/// [`JobError::ConditionEvaluation`] if it cannot be evaluated.
pub fn evaluate_condition(condition: &str, variables: &Variables) -> Result<bool, JobError> {
    match evaluate(condition, variables)? {
        ConditionOutcome::Resolved(value) => Ok(value),
        ConditionOutcome::Unparseable { reason } => Err(syntax_error(condition, variables, reason)),
    }
}

/// Evaluates an expression and returns its value (used by `CMDPY` steps)
///
/// # Errors
///
/// Same as [`evaluate_condition`].
pub fn evaluate_expression(expression: &str, variables: &Variables) -> Result<ExprValue, JobError> {
    eval(expression.trim(), variables).map_err(|failure| match failure {
        Failure::Unparseable(reason) => syntax_error(expression, variables, reason),
        Failure::Evaluation(reason) => JobError::ConditionEvaluation {
            condition: expression.to_string(),
            reason,
        },
    })
}

fn eval(text: &str, variables: &Variables) -> Result<ExprValue, Failure> {
    if text.is_empty() {
        return Err(Failure::Unparseable("empty condition".to_string()));
    }
    let (source, context) = bind_placeholders(text, variables).map_err(Failure::Unparseable)?;

    let mut env = Environment::new();
    env.set_undefined_behavior(UndefinedBehavior::Strict);
    let expr = env
        .compile_expression(&source)
        .map_err(|err| Failure::Unparseable(err.to_string()))?;
    if let Some(name) = expr
        .undeclared_variables(false)
        .into_iter()
        .filter(|name| !context.contains_key(name))
        .min()
    {
        return Err(Failure::Unparseable(format!("unknown name '{name}'")));
    }

    let value = expr
        .eval(&context)
        .map_err(|err| Failure::Evaluation(err.to_string()))?;
    Ok(ExprValue::from_value(&value))
}

/// Replaces the placeholders found outside string literals with context names.
fn bind_placeholders(
    text: &str,
    variables: &Variables,
) -> Result<(String, BTreeMap<String, Value>), String> {
    let chars: Vec<char> = text.chars().collect();
    let mut source = String::with_capacity(text.len());
    let mut context = BTreeMap::new();
    let mut quote: Option<char> = None;
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];
        match quote {
            Some(q) => {
                source.push(c);
                if c == '\\' {
                    if let Some(&next) = chars.get(i + 1) {
                        source.push(next);
                        i += 1;
                    }
                } else if c == q {
                    quote = None;
                }
            }
            None if c == '"' || c == '\'' => {
                quote = Some(c);
                source.push(c);
            }
            None if c == '$' && chars.get(i + 1) == Some(&'{') => {
                let start = i + 2;
                let end = chars[start..]
                    .iter()
                    .position(|&c| c == '}')
                    .map(|p| start + p)
                    .ok_or_else(|| "unterminated placeholder".to_string())?;
                let name: String = chars[start..end].iter().collect();
                let value = lookup(&name, variables)
                    .ok_or_else(|| format!("undefined variable '{name}'"))?;
                let binding = format!("{PLACEHOLDER_PREFIX}{}", context.len());
                source.push(' ');
                source.push_str(&binding);
                source.push(' ');
                context.insert(binding, Value::from(value));
                i = end + 1;
                continue;
            }
            None => source.push(c),
        }
        i += 1;
    }

    Ok((source, context))
}

/// Finds a placeholder value: exact name first, then upper-cased names.
fn lookup(name: &str, variables: &Variables) -> Option<String> {
    variables
        .get(name)
        .or_else(|| {
            variables
                .iter()
                .find(|(k, _)| k.to_uppercase() == name)
                .map(|(_, v)| v)
        })
        .map(ToString::to_string)
}

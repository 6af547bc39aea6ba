//! Instruction interpreter
//!
//! Resolves the job-generator conditionals embedded in instructions:
//!
//! ```text
//! if [ ${PYTHON} == "C:\Python35_x64" ] then python setup.py build_sphinx fi
//! ```
//!
//! and the `--KEY=value;;` pseudo-dictionaries. Conditionals whose condition
//! is not an expression (typically shell tests such as `if [ -f dist ]; then
//! ... fi`) are left untouched for the generated script to evaluate.

use super::condition::{ConditionOutcome, evaluate, evaluate_expression};
use super::errors::JobError;
use super::instruction::{Instruction, Options, Variables};
use once_cell::sync::Lazy;
use regex::Regex;

/// Command of a mapping step: `CMD` if set, else the value of `CMDPY`
///
/// Returns `Ok(None)` when neither key holds a value.
///
/// # Errors
///
/// Propagates the errors of [`evaluate_expression`] on `CMDPY`.
pub fn resolve_command(
    options: &Options,
    variables: &Variables,
) -> Result<Option<String>, JobError> {
    if let Some(Some(command)) = options.get("CMD") {
        return Ok(Some(command.clone()));
    }
    match options.get("CMDPY") {
        Some(Some(expression)) => {
            Ok(Some(evaluate_expression(expression, variables)?.to_string()))
        }
        _ => Ok(None),
    }
}

/// Parts of an `if <condition> then <branch> [else <branch>] fi` statement
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Conditional<'a> {
    /// Condition text
    pub condition: &'a str,
    /// Branch used when the condition holds
    pub then_branch: &'a str,
    /// Branch used otherwise
    pub else_branch: Option<&'a str>,
}

/// Interprets an instruction against a variable context
///
/// Returns `Ok(None)` when the instruction is conditionally excluded.
///
/// # Errors
///
/// Propagates [`JobError::ConditionEvaluation`] from conditions that parse
/// but cannot be evaluated.
pub fn interpret(instruction: &Instruction, variables: &Variables) -> Result<Option<Instruction>, JobError> {
    match instruction {
        Instruction::Sequence(items) => {
            let mut kept = Vec::with_capacity(items.len());
            for item in items {
                if let Some(resolved) = interpret(item, variables)? {
                    kept.push(resolved);
                }
            }
            if kept.is_empty() && !items.is_empty() {
                Ok(None)
            } else {
                Ok(Some(Instruction::Sequence(kept)))
            }
        }
        Instruction::KeyedStep(key, value) => Ok(interpret(value, variables)?
            .map(|resolved| Instruction::KeyedStep(key.clone(), Box::new(resolved)))),
        Instruction::Options(_) | Instruction::Integer(_) | Instruction::Number(_) => {
            Ok(Some(instruction.clone()))
        }
        Instruction::Literal(text) => interpret_text(&text.replace('\n', " "), variables),
    }
}

fn interpret_text(text: &str, variables: &Variables) -> Result<Option<Instruction>, JobError> {
    if let Some(conditional) = split_conditional(text) {
        return match evaluate(conditional.condition, variables)? {
            ConditionOutcome::Unparseable { reason } => {
                tracing::debug!(condition = conditional.condition, %reason, "Leaving foreign conditional untouched");
                Ok(Some(Instruction::literal(text)))
            }
            ConditionOutcome::Resolved(true) => interpret_text(conditional.then_branch, variables),
            ConditionOutcome::Resolved(false) => match conditional.else_branch {
                Some(branch) => interpret_text(branch, variables),
                None => Ok(None),
            },
        };
    }

    if text.starts_with("--") {
        if let Some(options) = parse_options(text) {
            return Ok(Some(Instruction::Options(options)));
        }
    }

    Ok(Some(Instruction::literal(text)))
}

/// Splits an `if ... then ... [else ...] fi` statement
///
/// Keywords are whitespace-separated words outside quotes. `if`/`fi` pairs
/// nest, so a branch may hold a complete inner statement; `then` and `else`
/// only count at the outermost level. Returns `None` when the text is not a
/// balanced statement.
#[must_use]
pub fn split_conditional(text: &str) -> Option<Conditional<'_>> {
    let spans = words(text);
    let word = |i: usize| &text[spans[i].0..spans[i].1];
    let last = spans.len().checked_sub(1)?;
    if last < 3 || word(0) != "if" || word(last) != "fi" {
        return None;
    }

    let mut depth = 0usize;
    let mut then_at = None;
    let mut else_at = None;
    for i in 1..last {
        match word(i) {
            "if" => depth += 1,
            "fi" => depth = depth.checked_sub(1)?,
            "then" if depth == 0 && then_at.is_none() => then_at = Some(i),
            "else" if depth == 0 && then_at.is_some() && else_at.is_none() => else_at = Some(i),
            _ => {}
        }
    }
    if depth != 0 {
        return None;
    }

    let then_at = then_at?;
    let then_end = else_at.unwrap_or(last);
    if then_at < 2 || then_at + 1 >= then_end {
        return None;
    }
    let else_branch = match else_at {
        Some(at) if at + 1 >= last => return None,
        Some(at) => Some(&text[spans[at + 1].0..spans[last - 1].1]),
        None => None,
    };

    Some(Conditional {
        condition: &text[spans[1].0..spans[then_at - 1].1],
        then_branch: &text[spans[then_at + 1].0..spans[then_end - 1].1],
        else_branch,
    })
}

/// Byte spans of whitespace-separated words; quoted text stays in one word.
fn words(text: &str) -> Vec<(usize, usize)> {
    let mut spans = Vec::new();
    let mut start = None;
    let mut chars = text.char_indices().peekable();

    while let Some((i, c)) = chars.next() {
        if c.is_whitespace() {
            if let Some(s) = start.take() {
                spans.push((s, i));
            }
            continue;
        }
        if start.is_none() {
            start = Some(i);
        }
        if c == '"' || c == '\'' {
            if let Some(close) = text[i + 1..].find(c) {
                let resume = i + 1 + close;
                while chars.peek().is_some_and(|(j, _)| *j <= resume) {
                    chars.next();
                }
            }
        }
    }
    if let Some(s) = start {
        spans.push((s, text.len()));
    }
    spans
}

static OPTION_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"--([A-Z_]+)=([^']*?);;").expect("valid option pattern"));

/// Parses `--KEY=value;;` fragments
///
/// Keys and values are trimmed, empty values become `None`. Returns `None`
/// when no fragment matches.
#[must_use]
pub fn parse_options(text: &str) -> Option<Options> {
    let mut options = Options::new();
    for caps in OPTION_PATTERN.captures_iter(text) {
        let key = caps[1].trim().to_string();
        let value = caps[2].trim();
        options.insert(key, (!value.is_empty()).then(|| value.to_string()));
    }
    (!options.is_empty()).then_some(options)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::jobs::instruction::VarValue;

    fn vars(pairs: &[(&str, &str)]) -> Variables {
        pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), VarValue::from(*v)))
            .collect()
    }

    fn literal(text: &str) -> Instruction {
        Instruction::literal(text)
    }

    #[test]
    fn test_true_branch() {
        let v = vars(&[("python", r"C:\Python35_x64")]);
        let inst = literal(r#"if [ ${PYTHON} == "C:\\Python35_x64" ] then python setup.py build_sphinx fi"#);
        assert_eq!(
            interpret(&inst, &v).unwrap(),
            Some(literal("python setup.py build_sphinx"))
        );
    }

    #[test]
    fn test_false_without_else_is_dropped() {
        let v = vars(&[("python", r"C:\Python36_x64")]);
        let inst = literal(r#"if [ ${PYTHON} == "C:\\Python35_x64" ] then python setup.py build_sphinx fi"#);
        assert_eq!(interpret(&inst, &v).unwrap(), None);
    }

    #[test]
    fn test_else_branch() {
        let v = vars(&[("dist", "conda")]);
        let inst = literal(r#"if [ ${DIST} == "std" ] then pip install -r requirements.txt else conda install --file requirements.txt fi"#);
        assert_eq!(
            interpret(&inst, &v).unwrap(),
            Some(literal("conda install --file requirements.txt"))
        );
    }

    #[test]
    fn test_foreign_conditional_passes_through() {
        let inst = literal("if some_non_python_syntax then X fi");
        assert_eq!(interpret(&inst, &Variables::new()).unwrap(), Some(inst.clone()));

        let shell = literal("if [ -f dist ]; then rm -rf dist; fi");
        assert_eq!(interpret(&shell, &Variables::new()).unwrap(), Some(shell.clone()));
    }

    #[test]
    fn test_nested_conditional_in_branch() {
        let v = vars(&[("dist", "std")]);
        let inst = literal(r#"if ${DIST} == "std" then if [ -f build ]; then rm -rf build; fi fi"#);
        assert_eq!(
            interpret(&inst, &v).unwrap(),
            Some(literal("if [ -f build ]; then rm -rf build; fi"))
        );

        let inner = literal(r#"if ${DIST} == "std" then if ${DIST} != "conda" then pip freeze fi else conda list fi"#);
        assert_eq!(interpret(&inner, &v).unwrap(), Some(literal("pip freeze")));
    }

    #[test]
    fn test_unbalanced_statement_is_not_a_conditional() {
        assert!(split_conditional("if a then b").is_none());
        assert!(split_conditional("if then fi").is_none());
        assert!(split_conditional("if a then if b then c fi").is_none());
    }

    #[test]
    fn test_keywords_inside_quotes_are_ignored() {
        let parts = split_conditional(r#"if ${X} == "then fi" then echo ok fi"#).unwrap();
        assert_eq!(parts.condition, r#"${X} == "then fi""#);
        assert_eq!(parts.then_branch, "echo ok");
        assert_eq!(parts.else_branch, None);
    }

    #[test]
    fn test_newlines_are_collapsed() {
        let v = vars(&[("dist", "std")]);
        let inst = literal("if ${DIST} == \"std\"\nthen pip freeze\nfi");
        assert_eq!(interpret(&inst, &v).unwrap(), Some(literal("pip freeze")));
    }

    #[test]
    fn test_options_fragments() {
        let inst = literal("--CMD=python -u setup.py unittests;;--NAME=UT;;--TIMEOUT=899;;--EMPTY= ;;");
        let Some(Instruction::Options(options)) = interpret(&inst, &Variables::new()).unwrap() else {
            panic!("expected options");
        };
        assert_eq!(options["CMD"].as_deref(), Some("python -u setup.py unittests"));
        assert_eq!(options["NAME"].as_deref(), Some("UT"));
        assert_eq!(options["TIMEOUT"].as_deref(), Some("899"));
        assert_eq!(options["EMPTY"], None);
    }

    #[test]
    fn test_dash_text_without_fragment_is_unchanged() {
        let inst = literal("--version");
        assert_eq!(interpret(&inst, &Variables::new()).unwrap(), Some(inst.clone()));
    }

    #[test]
    fn test_sequence_drops_excluded_items() {
        let v = vars(&[("dist", "std")]);
        let inst = Instruction::Sequence(vec![
            literal("pip freeze"),
            literal(r#"if ${DIST} == "conda" then conda list fi"#),
        ]);
        assert_eq!(
            interpret(&inst, &v).unwrap(),
            Some(Instruction::literals(["pip freeze"]))
        );

        let all_dropped = Instruction::Sequence(vec![literal(r#"if ${DIST} == "conda" then conda list fi"#)]);
        assert_eq!(interpret(&all_dropped, &v).unwrap(), None);
    }

    #[test]
    fn test_keyed_step_and_scalars() {
        let v = vars(&[("dist", "std")]);
        let step = Instruction::KeyedStep(
            "install".to_string(),
            Box::new(literal(r#"if ${DIST} == "std" then pip freeze fi"#)),
        );
        assert_eq!(
            interpret(&step, &v).unwrap(),
            Some(Instruction::KeyedStep("install".to_string(), Box::new(literal("pip freeze"))))
        );
        assert_eq!(interpret(&Instruction::Integer(3), &v).unwrap(), Some(Instruction::Integer(3)));
    }

    #[test]
    fn test_evaluation_errors_propagate() {
        let inst = literal(r#"if "a" + 1 then dir fi"#);
        assert!(matches!(
            interpret(&inst, &Variables::new()),
            Err(JobError::ConditionEvaluation { .. })
        ));
    }

    #[test]
    fn test_resolve_command() {
        let v = vars(&[("DIST", "std")]);
        let mut options = Options::new();
        options.insert("CMD".to_string(), Some("make".to_string()));
        options.insert("CMDPY".to_string(), Some(r#""ignored""#.to_string()));
        assert_eq!(resolve_command(&options, &v).unwrap().as_deref(), Some("make"));

        options.insert("CMD".to_string(), None);
        options.insert("CMDPY".to_string(), Some(r#""make " + ${DIST}"#.to_string()));
        assert_eq!(resolve_command(&options, &v).unwrap().as_deref(), Some("make std"));

        let mut options = Options::new();
        options.insert("NAME".to_string(), Some("UT".to_string()));
        assert_eq!(resolve_command(&options, &v).unwrap(), None);
    }
}

//! Sequence expander
//!
//! Multiplies a [`JobDocument`] into concrete jobs: one job per
//! `(python, script)` pair, enumerated row-major (scripts cycle fastest).
//! Jobs are produced lazily by [`JobExpander`], so a caller can stop after a
//! prefix without resolving the rest.

use super::document::{JobDocument, Section};
use super::environment::Environment;
use super::errors::{ConfigError, JobError};
use super::instruction::{Instruction, Options, VarValue, Variables};
use super::interpreter::{interpret, resolve_command};
use serde::Serialize;

/// One resolved step of a job
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum JobStep {
    /// A section and its resolved value
    Section {
        /// Section the value comes from.
        section: Section,
        /// Resolved value.
        value: Instruction,
    },
    /// A variable contributed by a `python` or `script` entry
    Info {
        /// Variable name.
        name: String,
        /// Variable value.
        value: VarValue,
    },
}

/// Ordered steps of one job
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct JobSequence {
    /// Steps in section order, `Info` steps first
    pub steps: Vec<JobStep>,
    /// Position of the combination in the row-major enumeration
    pub index: usize,
    /// Index of the `python` entry
    pub python_index: usize,
    /// Index of the `script` entry
    pub script_index: usize,
}

impl JobSequence {
    /// Resolved value of a section
    #[must_use]
    pub fn get(&self, section: Section) -> Option<&Instruction> {
        self.steps.iter().find_map(|step| match step {
            JobStep::Section { section: s, value } if *s == section => Some(value),
            _ => None,
        })
    }

    /// `Info` variables in discovery order
    pub fn infos(&self) -> impl Iterator<Item = (&str, &VarValue)> {
        self.steps.iter().filter_map(|step| match step {
            JobStep::Info { name, value } => Some((name.as_str(), value)),
            JobStep::Section { .. } => None,
        })
    }
}

/// A job and the variable context it was resolved with
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ExpandedJob {
    /// Resolved steps
    pub sequence: JobSequence,
    /// Variable context after resolution
    pub variables: Variables,
}

/// Starts expanding a document
///
/// `environment` variables are added to the context for every name the
/// caller did not define.
///
/// # Errors
///
/// Returns [`JobError::UnsupportedLanguage`] if `language` is not python and
/// [`ConfigError::MissingSection`] if `python` or `script` is absent.
pub fn expand<'a>(
    document: &'a JobDocument,
    variables: &Variables,
    environment: Option<&Environment>,
) -> Result<JobExpander<'a>, JobError> {
    if let Some(language) = document.get(Section::Language) {
        let name = language.to_string();
        if name.trim() != "python" {
            return Err(JobError::UnsupportedLanguage(name));
        }
    }

    let pythons = entries(document, Section::Python)?;
    let scripts = entries(document, Section::Script)?;

    let mut base = variables.clone();
    if let Some(environment) = environment {
        environment.merge_into(&mut base);
    }

    tracing::debug!(
        pythons = pythons.len(),
        scripts = scripts.len(),
        "Expanding job document"
    );

    Ok(JobExpander {
        document,
        pythons,
        scripts,
        base,
        next: 0,
        failed: false,
    })
}

fn entries(document: &JobDocument, section: Section) -> Result<Vec<Instruction>, ConfigError> {
    match document.get(section) {
        Some(Instruction::Sequence(items)) => Ok(items.clone()),
        Some(other) => Ok(vec![other.clone()]),
        None => Err(ConfigError::MissingSection(section.key())),
    }
}

/// Lazy iterator over the jobs of a document
///
/// Yields combinations in row-major order and stops after the first error.
#[derive(Debug)]
pub struct JobExpander<'a> {
    document: &'a JobDocument,
    pythons: Vec<Instruction>,
    scripts: Vec<Instruction>,
    base: Variables,
    next: usize,
    failed: bool,
}

impl JobExpander<'_> {
    /// Number of combinations before any is dropped
    #[must_use]
    pub fn combinations(&self) -> usize {
        self.pythons.len() * self.scripts.len()
    }

    fn combine(&self, index: usize) -> Result<Option<ExpandedJob>, JobError> {
        let python_index = index / self.scripts.len();
        let script_index = index % self.scripts.len();
        let mut vars = self.base.clone();
        let mut infos = Vec::new();

        let Some(python) = interpret(&self.pythons[python_index], &vars)? else {
            return Ok(None);
        };
        let Some(python) = resolve_python(python, &mut vars, &mut infos)? else {
            tracing::debug!(index, "Dropping combination without interpreter");
            return Ok(None);
        };

        let Some(script) = interpret(&self.scripts[script_index], &vars)? else {
            return Ok(None);
        };
        if script.as_literal().is_some_and(|text| text.trim().is_empty()) {
            tracing::debug!(index, "Dropping combination without script");
            return Ok(None);
        }
        let script = resolve_script(script, &mut vars, &mut infos)?;

        let mut steps = infos;
        for (section, raw) in self.document.iter() {
            let value = match section {
                Section::Language => continue,
                Section::Python => Instruction::literal(python.clone()),
                Section::Script => script.clone(),
                _ => match interpret(raw, &vars)? {
                    Some(value) => value,
                    None => {
                        tracing::debug!(index, %section, "Dropping excluded combination");
                        return Ok(None);
                    }
                },
            };
            if let Some(text) = value.as_literal() {
                vars.insert(section.key().to_string(), VarValue::from(text));
            }
            steps.push(JobStep::Section { section, value });
        }

        Ok(Some(ExpandedJob {
            sequence: JobSequence {
                steps,
                index,
                python_index,
                script_index,
            },
            variables: vars,
        }))
    }
}

impl Iterator for JobExpander<'_> {
    type Item = Result<ExpandedJob, JobError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.failed {
            return None;
        }
        while self.next < self.combinations() {
            let index = self.next;
            self.next += 1;
            match self.combine(index) {
                Ok(Some(job)) => {
                    tracing::debug!(
                        index,
                        python = job.sequence.python_index,
                        script = job.sequence.script_index,
                        "Produced job"
                    );
                    return Some(Ok(job));
                }
                Ok(None) => {}
                Err(err) => {
                    self.failed = true;
                    return Some(Err(err));
                }
            }
        }
        None
    }
}

fn is_undefined(path: &str) -> bool {
    matches!(path.trim(), "" | "None" | "none")
}

/// Returns the interpreter directory, `None` when the entry is undefined.
fn resolve_python(
    python: Instruction,
    vars: &mut Variables,
    infos: &mut Vec<JobStep>,
) -> Result<Option<String>, JobError> {
    let path = match python {
        Instruction::Options(options) => {
            let Some(path) = options.get("PATH").cloned() else {
                return Err(ConfigError::MissingPythonPath {
                    entry: Instruction::Options(options).to_string(),
                }
                .into());
            };
            for (key, value) in options.iter().filter(|(k, _)| k.as_str() != "PATH") {
                add_info(key, value.as_deref(), vars, infos);
            }
            path.unwrap_or_default()
        }
        Instruction::Sequence(_) | Instruction::KeyedStep(..) => {
            return Err(ConfigError::InvalidValue {
                section: Section::Python.key().to_string(),
                reason: format!("expected a path or a mapping, got {python}"),
            }
            .into());
        }
        other => other.to_string(),
    };

    if is_undefined(&path) {
        return Ok(None);
    }
    let path = path.trim().to_string();
    vars.insert(Section::Python.key().to_string(), VarValue::from(path.as_str()));
    Ok(Some(path))
}

fn resolve_script(
    script: Instruction,
    vars: &mut Variables,
    infos: &mut Vec<JobStep>,
) -> Result<Instruction, JobError> {
    let Instruction::Options(options) = script else {
        if let Some(text) = script.as_literal() {
            vars.insert(Section::Script.key().to_string(), VarValue::from(text));
        }
        return Ok(script);
    };

    for (key, value) in options
        .iter()
        .filter(|(k, _)| !matches!(k.as_str(), "CMD" | "CMDPY"))
    {
        add_info(key, value.as_deref(), vars, infos);
    }

    let Some(command) = resolve_command(&options, vars)? else {
        return Err(ConfigError::MissingCommand {
            section: Section::Script.key().to_string(),
            entry: Instruction::Options(options).to_string(),
        }
        .into());
    };

    let mut resolved: Options = options
        .into_iter()
        .filter(|(k, _)| k != "CMDPY")
        .collect();
    resolved.insert("CMD".to_string(), Some(command.clone()));
    vars.insert(Section::Script.key().to_string(), VarValue::from(command));
    Ok(Instruction::Options(resolved))
}

fn add_info(key: &str, value: Option<&str>, vars: &mut Variables, infos: &mut Vec<JobStep>) {
    let value = VarValue::from(value.map(str::to_string));
    vars.insert(key.to_string(), value.clone());
    infos.push(JobStep::Info {
        name: key.to_string(),
        value,
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use proptest::prelude::*;

    fn doc(yaml: &str) -> JobDocument {
        JobDocument::from_yaml_str(yaml).unwrap()
    }

    fn collect(document: &JobDocument) -> Vec<ExpandedJob> {
        expand(document, &Variables::new(), None)
            .unwrap()
            .collect::<Result<Vec<_>, _>>()
            .unwrap()
    }

    fn pairs(jobs: &[ExpandedJob]) -> Vec<(String, String)> {
        jobs.iter()
            .map(|job| {
                (
                    job.sequence.get(Section::Python).unwrap().to_string(),
                    job.sequence.get(Section::Script).unwrap().to_string(),
                )
            })
            .collect()
    }

    #[test]
    fn test_row_major_cross_product() {
        let document = doc(r#"
python: ["c:\\py1", "c:\\py2"]
script: [cmd1, cmd2]
"#);
        let jobs = collect(&document);
        assert_eq!(
            pairs(&jobs),
            vec![
                (r"c:\py1".to_string(), "cmd1".to_string()),
                (r"c:\py1".to_string(), "cmd2".to_string()),
                (r"c:\py2".to_string(), "cmd1".to_string()),
                (r"c:\py2".to_string(), "cmd2".to_string()),
            ]
        );
        let indices: Vec<usize> = jobs.iter().map(|j| j.sequence.index).collect();
        assert_eq!(indices, vec![0, 1, 2, 3]);
    }

    #[test]
    fn test_bare_strings_are_single_entries() {
        let jobs = collect(&doc("language: python\npython: /opt/py\nscript: make\n"));
        assert_eq!(jobs.len(), 1);
        assert_eq!(jobs[0].variables["python"], VarValue::from("/opt/py"));
        assert_eq!(jobs[0].variables["script"], VarValue::from("make"));
    }

    #[test]
    fn test_unsupported_language() {
        let document = doc("language: rust\npython: [a]\nscript: [b]\n");
        let err = expand(&document, &Variables::new(), None).unwrap_err();
        assert_eq!(err, JobError::UnsupportedLanguage("rust".to_string()));
    }

    #[test]
    fn test_missing_script_section() {
        let document = doc("python: [a]\n");
        let err = expand(&document, &Variables::new(), None).unwrap_err();
        assert_eq!(err, JobError::Config(ConfigError::MissingSection("script")));
    }

    #[test]
    fn test_python_mapping_contributes_info() {
        let document = doc(r#"
python:
  - {PATH: /opt/py37, VERSION: 3.7, DIST: std}
script: [make]
install:
  - if [ ${DIST} == "std" ] then pip install -r requirements.txt fi
"#);
        let jobs = collect(&document);
        assert_eq!(jobs.len(), 1);
        let infos: Vec<(String, String)> = jobs[0]
            .sequence
            .infos()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        assert_eq!(
            infos,
            vec![
                ("VERSION".to_string(), "3.7".to_string()),
                ("DIST".to_string(), "std".to_string()),
            ]
        );
        assert_eq!(
            jobs[0].sequence.get(Section::Install),
            Some(&Instruction::literals(["pip install -r requirements.txt"]))
        );
    }

    #[test]
    fn test_python_mapping_requires_path() {
        let document = doc("python:\n  - {VERSION: 3.7}\nscript: [make]\n");
        let first = expand(&document, &Variables::new(), None).unwrap().next().unwrap();
        assert!(matches!(
            first,
            Err(JobError::Config(ConfigError::MissingPythonPath { .. }))
        ));
    }

    #[test]
    fn test_undefined_interpreter_drops_combinations() {
        let document = doc("python: [/opt/py36, None, '']\nscript: [a, b]\n");
        let jobs = collect(&document);
        assert_eq!(jobs.len(), 2);
        assert!(jobs.iter().all(|j| j.sequence.python_index == 0));
    }

    #[test]
    fn test_null_entries_keep_their_index() {
        let document = doc("python: [/opt/py, ~, /opt/py3]\nscript: [make]\n");
        let jobs = collect(&document);
        let indices: Vec<_> = jobs
            .iter()
            .map(|j| (j.sequence.index, j.sequence.python_index))
            .collect();
        assert_eq!(indices, vec![(0, 0), (2, 2)]);

        let document = doc("python: [/opt/py]\nscript: [a, ~, b]\n");
        let jobs = collect(&document);
        let indices: Vec<_> = jobs.iter().map(|j| j.sequence.script_index).collect();
        assert_eq!(indices, vec![0, 2]);
    }

    #[test]
    fn test_script_options_and_cmdpy() {
        let document = doc(r#"
python: [/opt/py]
script:
  - --CMD=python -u setup.py unittests;;--NAME=UT;;--TIMEOUT=899;;
  - {CMDPY: '"python -m " + ${NAME}', NAME: pytest}
"#);
        let jobs = collect(&document);
        assert_eq!(jobs.len(), 2);
        assert_eq!(jobs[0].variables["NAME"], VarValue::from("UT"));
        assert_eq!(jobs[0].variables["script"], VarValue::from("python -u setup.py unittests"));

        let Some(Instruction::Options(options)) = jobs[1].sequence.get(Section::Script) else {
            panic!("expected options");
        };
        assert_eq!(options["CMD"].as_deref(), Some("python -m pytest"));
        assert!(!options.contains_key("CMDPY"));
    }

    #[test]
    fn test_script_mapping_without_command() {
        let document = doc("python: [/opt/py]\nscript:\n  - {NAME: UT}\n");
        let first = expand(&document, &Variables::new(), None).unwrap().next().unwrap();
        assert!(matches!(
            first,
            Err(JobError::Config(ConfigError::MissingCommand { .. }))
        ));
    }

    #[test]
    fn test_excluded_section_drops_combination() {
        let document = doc(r#"
python: [/opt/py36, /opt/py37]
script: [make]
documentation: if ${PYTHON} == "/opt/py37" then make doc fi
"#);
        let jobs = collect(&document);
        assert_eq!(jobs.len(), 1);
        assert_eq!(jobs[0].sequence.python_index, 1);
        assert_eq!(jobs[0].variables["documentation"], VarValue::from("make doc"));
    }

    #[test]
    fn test_environment_never_overrides_context() {
        let document = doc(r#"
python: [/opt/py]
script: [make]
install: if ${DIST} == "conda" then conda list else pip freeze fi
"#);
        let env: Environment = [("DIST", "conda"), ("HOME", "/home/ci")].into_iter().collect();
        let mut vars = Variables::new();
        vars.insert("DIST".to_string(), VarValue::from("std"));

        let jobs: Vec<ExpandedJob> = expand(&document, &vars, Some(&env))
            .unwrap()
            .collect::<Result<_, _>>()
            .unwrap();
        assert_eq!(jobs[0].sequence.get(Section::Install), Some(&Instruction::literal("pip freeze")));
        assert_eq!(jobs[0].variables["HOME"], VarValue::from("/home/ci"));

        let without: Vec<ExpandedJob> = expand(&document, &Variables::new(), None)
            .unwrap()
            .collect::<Result<_, _>>()
            .unwrap();
        assert!(!without[0].variables.contains_key("HOME"));
    }

    #[test]
    fn test_language_is_not_a_step() {
        let jobs = collect(&doc("language: python\npython: [/opt/py]\nscript: [make]\n"));
        assert!(jobs[0].sequence.get(Section::Language).is_none());
    }

    #[test]
    fn test_iteration_is_lazy_and_stops_after_error() {
        let document = doc(r#"
python: [/opt/py]
script: [ok, 'if "a" + 1 then bad fi', later]
"#);
        let mut expander = expand(&document, &Variables::new(), None).unwrap();
        assert!(expander.next().unwrap().is_ok());
        assert!(expander.next().unwrap().is_err());
        assert!(expander.next().is_none());
    }

    fn matrix(pythons: usize, scripts: usize) -> JobDocument {
        let pythons: Vec<String> = (0..pythons).map(|i| format!("/opt/py{i}")).collect();
        let scripts: Vec<String> = (0..scripts).map(|i| format!("cmd{i}")).collect();
        JobDocument::new()
            .with(Section::Python, Instruction::literals(pythons))
            .with(Section::Script, Instruction::literals(scripts))
            .with(Section::Install, Instruction::literals(["pip freeze"]))
    }

    proptest! {
        #[test]
        fn prop_cross_product_size(pythons in 1usize..6, scripts in 1usize..6) {
            let document = matrix(pythons, scripts);
            let jobs = collect(&document);
            prop_assert_eq!(jobs.len(), pythons * scripts);
            for (i, job) in jobs.iter().enumerate() {
                prop_assert_eq!(job.sequence.python_index, i / scripts);
                prop_assert_eq!(job.sequence.script_index, i % scripts);
            }
        }

        #[test]
        fn prop_expansion_is_deterministic(pythons in 1usize..4, scripts in 1usize..4) {
            let document = matrix(pythons, scripts);
            prop_assert_eq!(collect(&document), collect(&document));
        }
    }
}

//! Batch-script compiler
//!
//! Turns one [`JobSequence`] into a Windows batch file or a POSIX shell
//! script. Every command line is followed by the platform's error check.
//! A split marker in `install` cuts the job into several scripts, each one
//! carrying its own preamble so it can run on its own.

use super::platform::Platform;
use crate::jobs::{
    ConfigError, Instruction, JobError, JobSequence, JobStep, Section, Variables, resolve_command,
};
use serde::Serialize;

/// Marker splitting a job into several scripts
pub const DEFAULT_SPLIT_MARKER: &str = "JENKINS_SPLIT";

/// Rejects markers that would match every line or never match a trimmed one
///
/// # Errors
///
/// Returns [`ConfigError::InvalidValue`] for an empty marker or one with
/// leading or trailing whitespace.
pub fn check_split_marker(marker: &str) -> Result<(), ConfigError> {
    if marker.is_empty() || marker.trim() != marker {
        return Err(ConfigError::InvalidValue {
            section: "split_marker".to_string(),
            reason: format!("'{marker}' must be non-empty without surrounding whitespace"),
        });
    }
    Ok(())
}

/// Output of the compiler
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum CompiledScript {
    /// The job fits in one script
    Single(String),
    /// One script per segment, in execution order
    Split(Vec<String>),
}

impl CompiledScript {
    /// Scripts in execution order
    #[must_use]
    pub fn segments(&self) -> Vec<&str> {
        match self {
            Self::Single(script) => vec![script.as_str()],
            Self::Split(scripts) => scripts.iter().map(String::as_str).collect(),
        }
    }

    /// Consumes the result into its scripts
    #[must_use]
    pub fn into_segments(self) -> Vec<String> {
        match self {
            Self::Single(script) => vec![script],
            Self::Split(scripts) => scripts,
        }
    }

    /// Returns true if the job was split
    #[must_use]
    pub fn is_split(&self) -> bool {
        matches!(self, Self::Split(_))
    }
}

/// Compiles a sequence with the default split marker
///
/// # Errors
///
/// See [`BatchCompiler::compile`].
pub fn compile(
    sequence: &JobSequence,
    variables: &Variables,
    platform: Platform,
) -> Result<CompiledScript, JobError> {
    BatchCompiler::new(platform).compile(sequence, variables)
}

/// Script compiler for one platform
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchCompiler {
    platform: Platform,
    split_marker: String,
}

impl BatchCompiler {
    /// Creates a compiler using [`DEFAULT_SPLIT_MARKER`]
    #[must_use]
    pub fn new(platform: Platform) -> Self {
        Self {
            platform,
            split_marker: DEFAULT_SPLIT_MARKER.to_string(),
        }
    }

    /// Sets the split marker
    #[must_use]
    pub fn with_split_marker(mut self, marker: impl Into<String>) -> Self {
        self.split_marker = marker.into();
        self
    }

    /// Target platform
    #[must_use]
    pub fn platform(&self) -> Platform {
        self.platform
    }

    /// Number of split markers in the `install` section of a sequence
    #[must_use]
    pub fn split_markers(&self, sequence: &JobSequence) -> usize {
        sequence.get(Section::Install).map_or(0, |install| {
            let mut lines = Vec::new();
            collect_lines(install, &mut lines);
            lines.iter().filter(|l| self.is_marker(l)).count()
        })
    }

    fn is_marker(&self, line: &str) -> bool {
        line.trim_start().starts_with(&self.split_marker)
    }

    /// Compiles a sequence into one or more scripts
    ///
    /// `variables` is the context the sequence was resolved with; it selects
    /// the conda flow (`DIST == "conda"`) and the POSIX interpreter alias
    /// (`PYINT`).
    ///
    /// # Errors
    ///
    /// - [`ConfigError::SplitOutsideInstall`] if a marker starts a line of
    ///   another section
    /// - [`ConfigError::InvalidSplitMarker`] if a marker is malformed or left
    ///   in the output
    /// - [`ConfigError::InvalidValue`] if the split marker is empty or
    ///   padded with whitespace
    /// - [`ConfigError::MissingCommand`] for a mapping step without `CMD`
    ///   or `CMDPY`, and the condition errors of a `CMDPY` expression
    /// - [`ConfigError::UnresolvedInterpreter`] if commands come before any
    ///   interpreter
    /// - [`JobError::CountMismatch`] if the number of scripts does not match
    ///   the number of markers
    pub fn compile(&self, sequence: &JobSequence, variables: &Variables) -> Result<CompiledScript, JobError> {
        check_split_marker(&self.split_marker)?;
        let mut writer = ScriptWriter::new(self.platform, variables);
        for (name, value) in sequence.infos() {
            writer.head.push(self.platform.info_line(name, &value.to_string()));
        }

        let mut markers = 0;
        for step in &sequence.steps {
            let JobStep::Section { section, value } = step else {
                continue;
            };
            match section {
                Section::Language => {
                    return Err(ConfigError::UnexpectedSection(section.key().to_string()).into());
                }
                Section::AutomatedSetup => {
                    let (_, lines) = step_lines(*section, value, variables)?;
                    for line in &lines {
                        self.reject_marker(*section, line)?;
                    }
                    writer.header(*section);
                    writer.rows.extend(lines);
                }
                Section::Python => writer.python(&value.to_string()),
                Section::Virtualenv => writer.virtualenv(value)?,
                _ => {
                    let (job_name, lines) = step_lines(*section, value, variables)?;
                    if lines.is_empty() {
                        continue;
                    }
                    if let Some(name) = job_name {
                        writer.rows.push(self.platform.set_var("JOB_NAME", &name));
                    }
                    writer.open_section(*section)?;
                    for line in lines {
                        if let Some(drop) = self.split_request(*section, &line)? {
                            markers += 1;
                            writer.split(*section, drop)?;
                            continue;
                        }
                        writer.rows.push(line);
                        writer.rows.push(self.platform.error_check().to_string());
                    }
                }
            }
        }

        let segments = writer.finish();
        if let Some(line) = segments
            .iter()
            .flat_map(|s| s.lines())
            .find(|l| l.contains(&self.split_marker))
        {
            return Err(ConfigError::InvalidSplitMarker(line.to_string()).into());
        }
        if segments.len() != markers + 1 {
            return Err(JobError::CountMismatch {
                expected: markers + 1,
                produced: segments.len(),
                listing: segments.join("\n----\n"),
            });
        }

        Ok(if segments.len() == 1 {
            CompiledScript::Single(segments.into_iter().next().unwrap_or_default())
        } else {
            tracing::debug!(segments = segments.len(), "Split job script");
            CompiledScript::Split(segments)
        })
    }

    fn reject_marker(&self, section: Section, line: &str) -> Result<(), ConfigError> {
        if self.is_marker(line) {
            return Err(ConfigError::SplitOutsideInstall {
                section: section.key().to_string(),
                item: line.to_string(),
            });
        }
        Ok(())
    }

    /// Number of trailing lines to drop if `line` is a split marker
    fn split_request(&self, section: Section, line: &str) -> Result<Option<usize>, ConfigError> {
        if !self.is_marker(line) {
            return Ok(None);
        }
        if section != Section::Install {
            return Err(ConfigError::SplitOutsideInstall {
                section: section.key().to_string(),
                item: line.to_string(),
            });
        }
        let rest = line.trim_start()[self.split_marker.len()..].trim();
        if rest.is_empty() {
            return Ok(Some(0));
        }
        rest.strip_prefix('-')
            .and_then(|n| n.trim().parse::<usize>().ok())
            .map(Some)
            .ok_or_else(|| ConfigError::InvalidSplitMarker(line.to_string()))
    }
}

/// Flattens a step into command lines and the optional `NAME` of a mapping.
fn step_lines(
    section: Section,
    value: &Instruction,
    variables: &Variables,
) -> Result<(Option<String>, Vec<String>), JobError> {
    let mut job_name = None;
    let mut lines = Vec::new();
    step_lines_into(section, value, variables, &mut job_name, &mut lines)?;
    Ok((job_name, lines))
}

fn step_lines_into(
    section: Section,
    value: &Instruction,
    variables: &Variables,
    job_name: &mut Option<String>,
    lines: &mut Vec<String>,
) -> Result<(), JobError> {
    match value {
        Instruction::Sequence(items) => {
            for item in items {
                step_lines_into(section, item, variables, job_name, lines)?;
            }
        }
        Instruction::KeyedStep(_, inner) => step_lines_into(section, inner, variables, job_name, lines)?,
        Instruction::Options(options) => {
            if let Some(Some(name)) = options.get("NAME") {
                job_name.get_or_insert_with(|| name.clone());
            }
            let command =
                resolve_command(options, variables)?.ok_or_else(|| ConfigError::MissingCommand {
                    section: section.key().to_string(),
                    entry: value.to_string(),
                })?;
            lines.push(command);
        }
        Instruction::Literal(text) => lines.push(text.clone()),
        Instruction::Integer(_) | Instruction::Number(_) => lines.push(value.to_string()),
    }
    Ok(())
}

fn collect_lines(value: &Instruction, lines: &mut Vec<String>) {
    match value {
        Instruction::Sequence(items) => items.iter().for_each(|item| collect_lines(item, lines)),
        Instruction::KeyedStep(_, inner) => collect_lines(inner, lines),
        Instruction::Literal(text) => lines.push(text.clone()),
        Instruction::Options(_) | Instruction::Integer(_) | Instruction::Number(_) => {}
    }
}

struct Virtualenv {
    path: String,
    root_project: Option<String>,
}

impl Virtualenv {
    fn from_instruction(value: &Instruction) -> Result<Self, ConfigError> {
        let mut path = None;
        let mut root_project = None;
        Self::merge(value, &mut path, &mut root_project)?;
        let path = path.ok_or_else(|| ConfigError::MissingVirtualenvPath(value.to_string()))?;
        Ok(Self { path, root_project })
    }

    fn merge(
        value: &Instruction,
        path: &mut Option<String>,
        root_project: &mut Option<String>,
    ) -> Result<(), ConfigError> {
        match value {
            Instruction::Literal(text) => *path = Some(text.trim().to_string()),
            Instruction::Options(options) => {
                match options.get("path") {
                    Some(Some(p)) => *path = Some(p.clone()),
                    Some(None) | None if path.is_none() => {
                        return Err(ConfigError::MissingVirtualenvPath(value.to_string()));
                    }
                    _ => {}
                }
                if let Some(Some(project)) = options.get("root_project") {
                    *root_project = Some(project.clone());
                }
            }
            Instruction::Sequence(items) => {
                for item in items {
                    Self::merge(item, path, root_project)?;
                }
            }
            other => {
                return Err(ConfigError::InvalidValue {
                    section: Section::Virtualenv.key().to_string(),
                    reason: format!("expected a path or a mapping with 'path', got {other}"),
                });
            }
        }
        Ok(())
    }
}

/// Accumulates script lines and the interpreter state.
struct ScriptWriter {
    platform: Platform,
    conda: bool,
    alias: bool,
    head: Vec<String>,
    rows: Vec<String>,
    segments: Vec<String>,
    base_dir: Option<String>,
    interpreter: Option<String>,
    path_dir: Option<String>,
    root_project: Option<String>,
}

impl ScriptWriter {
    fn new(platform: Platform, variables: &Variables) -> Self {
        let conda = variables
            .get("DIST")
            .and_then(|d| d.as_str())
            .is_some_and(|d| d == "conda");
        let alias = platform == Platform::Posix && variables.contains_key("PYINT");
        Self {
            platform,
            conda,
            alias,
            head: platform.preamble().iter().map(ToString::to_string).collect(),
            rows: Vec::new(),
            segments: Vec::new(),
            base_dir: None,
            interpreter: None,
            path_dir: None,
            root_project: None,
        }
    }

    /// Blank line between blocks, none at the very top of a script.
    fn separate(&mut self) {
        if !self.head.is_empty() || !self.rows.is_empty() {
            self.rows.push(String::new());
        }
    }

    fn header(&mut self, section: Section) {
        self.separate();
        self.rows.push(self.platform.echo(&section.key().to_uppercase()));
    }

    /// Header plus the PATH preamble of a command section.
    fn open_section(&mut self, section: Section) -> Result<(), ConfigError> {
        let Some(dir) = self.path_dir.clone() else {
            return Err(ConfigError::UnresolvedInterpreter {
                interpreter: self.interpreter.clone().unwrap_or_default(),
                section: section.key().to_string(),
            });
        };
        self.header(section);
        self.rows.push(self.platform.prepend_path(&dir));
        if let Some(project) = &self.root_project {
            self.rows.push(self.platform.set_var("ROOTPROJECT", project));
        }
        Ok(())
    }

    fn python(&mut self, dir: &str) {
        let dir = dir.trim().to_string();
        let exe = if self.alias { "$PYINT" } else { "python" };
        let interpreter = self.platform.join(&[&dir, exe]);
        self.separate();
        self.rows.push(self.platform.echo(&format!("interpreter={interpreter}")));
        self.interpreter = Some(interpreter);
        self.path_dir = Some(dir.clone());
        self.base_dir = Some(dir);
    }

    fn virtualenv(&mut self, value: &Instruction) -> Result<(), ConfigError> {
        let (Some(base_dir), Some(interpreter)) = (self.base_dir.clone(), self.interpreter.clone()) else {
            return Err(ConfigError::UnresolvedInterpreter {
                interpreter: String::new(),
                section: Section::Virtualenv.key().to_string(),
            });
        };
        let venv = Virtualenv::from_instruction(value)?;
        let path = venv.path;
        let platform = self.platform;

        self.separate();
        self.rows.push(platform.echo(&format!("CREATE VIRTUAL ENVIRONMENT in {path}")));
        self.rows.push(platform.mkdir(&path));
        if self.conda {
            let conda = match platform {
                Platform::Windows => platform.join(&[&base_dir, "Scripts", "conda"]),
                Platform::Posix => "conda".to_string(),
            };
            self.rows.push(format!("\"{conda}\" create -p \"{path}\" --clone \"{base_dir}\" --offline"));
            self.rows.push(platform.error_check().to_string());
            let bin = match platform {
                Platform::Windows => path.clone(),
                Platform::Posix => platform.join(&[&path, "bin"]),
            };
            self.interpreter = Some(platform.join(&[&bin, "python"]));
            self.path_dir = Some(bin);
        } else {
            self.rows.push(platform.set_var("KEEPPATH", &platform.var_ref("PATH")));
            self.rows.push(platform.prepend_path(&base_dir));
            self.rows.push(format!("\"{interpreter}\" -m virtualenv \"{path}\" --system-site-packages"));
            match platform {
                Platform::Windows => {
                    self.rows.push(platform.set_var("PATH", &platform.var_ref("KEEPPATH")));
                    self.rows.push(platform.error_check().to_string());
                }
                Platform::Posix => {
                    // restoring PATH resets $?
                    self.rows.push("VENV_STATUS=$?".to_string());
                    self.rows.push(platform.set_var("PATH", &platform.var_ref("KEEPPATH")));
                    self.rows.push("if [ $VENV_STATUS -ne 0 ]; then exit $VENV_STATUS; fi".to_string());
                }
            }
            let bin = platform.join(&[&path, platform.venv_bin()]);
            self.interpreter = Some(platform.join(&[&bin, platform.venv_python()]));
            self.path_dir = Some(bin);
        }
        if venv.root_project.is_some() {
            self.root_project = venv.root_project;
        }
        Ok(())
    }

    /// Flushes the current segment and re-seeds the next one.
    fn split(&mut self, section: Section, drop: usize) -> Result<(), ConfigError> {
        let keep = self.rows.len().saturating_sub(drop);
        self.rows.truncate(keep);
        let segment = self.render();
        self.segments.push(segment);
        self.rows.clear();
        self.open_section(section)
    }

    fn render(&self) -> String {
        self.head
            .iter()
            .chain(&self.rows)
            .map(String::as_str)
            .collect::<Vec<_>>()
            .join("\n")
    }

    fn finish(mut self) -> Vec<String> {
        let last = self.render();
        self.segments.push(last);
        self.segments
    }
}

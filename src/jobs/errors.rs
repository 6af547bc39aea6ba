//! Error types for the job compiler

use thiserror::Error;

/// Errors that can occur while loading, expanding or compiling a job document
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum JobError {
    /// The document or a job definition is misconfigured
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Only python projects can be expanded
    #[error("Language '{0}' is not implemented, language must be python")]
    UnsupportedLanguage(String),

    /// A condition could not be parsed once its placeholders were substituted
    #[error("Unable to parse condition '{condition}' ({reason}) with variables {variables}")]
    ConditionSyntax {
        /// Original condition text.
        condition: String,
        /// Variable context used for substitution.
        variables: String,
        /// Parser diagnostic.
        reason: String,
    },

    /// A condition parsed but failed to evaluate
    #[error("Unable to evaluate condition '{condition}': {reason}")]
    ConditionEvaluation {
        /// Original condition text.
        condition: String,
        /// Evaluation diagnostic.
        reason: String,
    },

    /// The number of produced items does not match the expected count
    #[error("Expected {expected} items but produced {produced}:\n{listing}")]
    CountMismatch {
        /// Expected number of items.
        expected: usize,
        /// Number of items actually produced.
        produced: usize,
        /// Every produced item, for debugging.
        listing: String,
    },

    /// Template rendering failed
    #[error("Template error: {0}")]
    Template(String),

    /// YAML parsing failed
    #[error("YAML error: {0}")]
    Yaml(String),

    /// IO error occurred
    #[error("IO error: {0}")]
    Io(String),
}

impl From<std::io::Error> for JobError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err.to_string())
    }
}

impl From<serde_yaml::Error> for JobError {
    fn from(err: serde_yaml::Error) -> Self {
        Self::Yaml(err.to_string())
    }
}

impl From<minijinja::Error> for JobError {
    fn from(err: minijinja::Error) -> Self {
        Self::Template(err.to_string())
    }
}

/// Configuration errors found in a job document
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    /// Top-level key outside the recognized set
    #[error("Unexpected key '{key}' found in yaml file, expected one of: {recognized}")]
    UnknownSection {
        /// The offending key.
        key: String,
        /// Comma-separated list of recognized keys.
        recognized: String,
    },

    /// A mandatory section is absent
    #[error("Section '{0}' is mandatory")]
    MissingSection(&'static str),

    /// The document root is not a mapping
    #[error("The yaml document must be a mapping, got {0}")]
    NotAMapping(String),

    /// A section holds a value of an unsupported shape
    #[error("Invalid value in section '{section}': {reason}")]
    InvalidValue {
        /// Section holding the value.
        section: String,
        /// Why the value was rejected.
        reason: String,
    },

    /// A python mapping entry has no `PATH`
    #[error("Key 'PATH' is mandatory in a python entry: {entry}")]
    MissingPythonPath {
        /// The offending entry.
        entry: String,
    },

    /// A mapping step has neither `CMD` nor `CMDPY`
    #[error("Section '{section}' needs 'CMD' or 'CMDPY' in {entry}")]
    MissingCommand {
        /// Section holding the entry.
        section: String,
        /// The offending entry.
        entry: String,
    },

    /// The split marker was found outside the install section
    #[error("Split marker found in section '{section}' ({item}), it can only be used in section 'install'")]
    SplitOutsideInstall {
        /// Section holding the marker.
        section: String,
        /// Line containing the marker.
        item: String,
    },

    /// The split marker suffix is not a line count
    #[error("Unable to interpret split marker '{0}', expected MARKER or MARKER-<n>")]
    InvalidSplitMarker(String),

    /// A command needs an interpreter that was never resolved
    #[error("Unable to guess interpreter path from '{interpreter}' before section '{section}'")]
    UnresolvedInterpreter {
        /// Interpreter known at that point, if any.
        interpreter: String,
        /// Section requiring the interpreter.
        section: String,
    },

    /// A virtualenv mapping has no `path`
    #[error("Key 'path' is mandatory in section 'virtualenv': {0}")]
    MissingVirtualenvPath(String),

    /// The project name cannot be determined
    #[error("Unable to infer project name, 'project_name' must be defined in the context")]
    MissingProjectName,

    /// The project name is reserved
    #[error("Invalid project name '{0}'")]
    InvalidProjectName(String),

    /// The root path is not in the context
    #[error("'root_path' must be defined in the context")]
    MissingRootPath,

    /// Two planned jobs share a name
    #[error("A name '{name}' was already used for a job, already planned: {planned}")]
    DuplicateJobName {
        /// The duplicated name.
        name: String,
        /// Names planned so far.
        planned: String,
    },

    /// A section cannot be compiled into a script
    #[error("Unexpected section '{0}' in a job sequence")]
    UnexpectedSection(String),
}

//! Parsed job document
//!
//! A document is an ordered mapping from a fixed set of sections to raw
//! instructions. Section order is fixed by [`Section::ORDER`], not by the
//! order keys appear in the file.

use super::errors::{ConfigError, JobError};
use super::instruction::Instruction;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_yaml::Value;
use std::fmt;

/// Recognized top-level sections of a job document
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Section {
    /// Setup commands emitted verbatim
    #[serde(rename = "automatedsetup")]
    AutomatedSetup,
    /// Project language, must be python
    Language,
    /// Interpreters (multiplies jobs)
    Python,
    /// Virtual environment location
    Virtualenv,
    /// Installation steps
    Install,
    /// Steps run before the script
    BeforeScript,
    /// Scripts to run (multiplies jobs)
    Script,
    /// Steps run after the script
    AfterScript,
    /// Documentation steps
    Documentation,
}

impl Section {
    /// Sections in processing order
    pub const ORDER: [Section; 9] = [
        Section::AutomatedSetup,
        Section::Language,
        Section::Python,
        Section::Virtualenv,
        Section::Install,
        Section::BeforeScript,
        Section::Script,
        Section::AfterScript,
        Section::Documentation,
    ];

    /// Key of the section in the YAML document
    #[must_use]
    pub fn key(self) -> &'static str {
        match self {
            Self::AutomatedSetup => "automatedsetup",
            Self::Language => "language",
            Self::Python => "python",
            Self::Virtualenv => "virtualenv",
            Self::Install => "install",
            Self::BeforeScript => "before_script",
            Self::Script => "script",
            Self::AfterScript => "after_script",
            Self::Documentation => "documentation",
        }
    }

    /// Looks a section up by its YAML key
    #[must_use]
    pub fn from_key(key: &str) -> Option<Self> {
        Self::ORDER.into_iter().find(|s| s.key() == key)
    }

    /// Returns true for sections whose entries multiply jobs
    #[must_use]
    pub fn is_multiplying(self) -> bool {
        matches!(self, Self::Python | Self::Script)
    }

    /// Returns true for sections compiled into command lines
    #[must_use]
    pub fn is_command(self) -> bool {
        matches!(
            self,
            Self::Install | Self::BeforeScript | Self::Script | Self::AfterScript | Self::Documentation
        )
    }

    /// Comma-separated list of recognized keys
    #[must_use]
    pub fn recognized() -> String {
        Self::ORDER.iter().map(|s| s.key()).collect::<Vec<_>>().join(", ")
    }
}

impl fmt::Display for Section {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.key())
    }
}

/// A job document: raw instructions per section
#[derive(Debug, Clone, PartialEq, Default, Serialize)]
pub struct JobDocument {
    sections: IndexMap<Section, Instruction>,
}

impl JobDocument {
    /// Creates an empty document
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the raw value of a section
    #[must_use]
    pub fn with(mut self, section: Section, value: Instruction) -> Self {
        self.sections.insert(section, value);
        self.sections.sort_keys();
        self
    }

    /// Parses YAML text into a document
    ///
    /// # Errors
    ///
    /// Returns [`JobError::Yaml`] for invalid YAML and configuration errors
    /// for unknown keys or unsupported values.
    pub fn from_yaml_str(text: &str) -> Result<Self, JobError> {
        let value: Value = serde_yaml::from_str(text)?;
        Ok(Self::from_value(&value)?)
    }

    /// Builds a document from a parsed YAML value
    ///
    /// Null sections are treated as absent.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::UnknownSection`] for any key outside
    /// [`Section::ORDER`] and [`ConfigError::NotAMapping`] if the root is not
    /// a mapping.
    pub fn from_value(value: &Value) -> Result<Self, ConfigError> {
        let Value::Mapping(mapping) = value else {
            return Err(ConfigError::NotAMapping(format!("{value:?}")));
        };

        let mut sections = IndexMap::new();
        for (key, raw) in mapping {
            let key = key.as_str().unwrap_or_default();
            let section = Section::from_key(key).ok_or_else(|| ConfigError::UnknownSection {
                key: key.to_string(),
                recognized: Section::recognized(),
            })?;
            if let Some(instruction) = Instruction::from_yaml(section.key(), raw)? {
                sections.insert(section, instruction);
            }
        }
        sections.sort_keys();
        Ok(Self { sections })
    }

    /// Raw value of a section
    #[must_use]
    pub fn get(&self, section: Section) -> Option<&Instruction> {
        self.sections.get(&section)
    }

    /// Returns true if the section is present
    #[must_use]
    pub fn contains(&self, section: Section) -> bool {
        self.sections.contains_key(&section)
    }

    /// Present sections in processing order
    pub fn iter(&self) -> impl Iterator<Item = (Section, &Instruction)> {
        self.sections.iter().map(|(s, i)| (*s, i))
    }
}

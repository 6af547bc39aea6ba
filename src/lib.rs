//! # ymljobs - YAML build matrices compiled into CI job scripts
//!
//! A job document lists, per section, the alternatives a CI job can take:
//! interpreters, dependency installation, test commands, artifacts. Each
//! value may carry an `if <condition> then <a> else <b> fi` conditional
//! or a `KEY: VALUE` option list. ymljobs expands the cross product of the
//! multi-valued sections, resolves every value against a variable context
//! and compiles each combination into a Windows batch file or POSIX shell
//! script.
//!
//! ## Quick Start
//!
//! ```no_run
//! use ymljobs::prelude::*;
//!
//! let doc = JobDocument::from_yaml_str(
//!     "language: python\npython: [/opt/py36]\nscript: [python -m pytest]\n",
//! )?;
//! for job in expand(&doc, &Variables::new(), None)? {
//!     let job = job?;
//!     let script = compile(&job.sequence, &job.variables, Platform::Posix)?;
//!     println!("{}", script.segments().join("\n"));
//! }
//! # Ok::<(), ymljobs::jobs::JobError>(())
//! ```
//!
//! ## Layers
//!
//! - [`jobs`]: documents, values, conditions and the expansion into jobs
//! - [`compiler`]: platform syntax and the script compiler
//! - [`infrastructure`]: templating, loading, planning, configuration, logging

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![cfg_attr(test, allow(clippy::unwrap_used))]

pub mod compiler;
pub mod infrastructure;
pub mod jobs;

// Prelude module for common imports
pub mod prelude;

// Re-export commonly used types
pub use compiler::{BatchCompiler, CompiledScript, Platform, compile};
pub use infrastructure::{Config, JobDefinition, JobPlanner, YamlSource, load_yaml};
pub use jobs::{
    ConfigError, Environment, ExpandedJob, Instruction, JobDocument, JobError, JobSequence,
    Section, VarValue, Variables, expand, interpret,
};

/// Version of the ymljobs crate.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

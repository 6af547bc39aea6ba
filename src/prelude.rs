//! Prelude module for common imports

pub use crate::compiler::{BatchCompiler, CompiledScript, Platform, compile};
pub use crate::infrastructure::{
    Config, JobDefinition, JobPlanner, TemplateEngine, TemplateRenderer, YamlSource, load_yaml,
};
pub use crate::jobs::{
    ConfigError, Environment, ExpandedJob, Instruction, JobDocument, JobError, JobSequence,
    JobStep, Options, Section, VarValue, Variables, expand, interpret,
};

//! Job domain types and logic

pub mod condition;
pub mod document;
pub mod environment;
pub mod errors;
pub mod expander;
pub mod instruction;
pub mod interpreter;

pub use condition::{ConditionOutcome, ExprValue, evaluate, evaluate_condition, evaluate_expression};
pub use document::{JobDocument, Section};
pub use environment::Environment;
pub use errors::{ConfigError, JobError};
pub use expander::{ExpandedJob, JobExpander, JobSequence, JobStep, expand};
pub use instruction::{Instruction, Options, VarValue, Variables};
pub use interpreter::{Conditional, interpret, parse_options, resolve_command, split_conditional};

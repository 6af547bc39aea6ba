//! Infrastructure layer
//!
//! Adapters around the job compiler: template rendering, document loading,
//! job planning, configuration and logging.

mod config;
pub mod loader;
mod logging;
pub mod planner;
pub mod template;

pub use config::Config;
pub use loader::{LoadedDocument, YamlSource, infer_project_name, load_yaml};
pub use logging::init_logging;
pub use planner::{JobDefinition, JobPlanner};
pub use template::{JinjaRenderer, TemplateEngine, TemplateRenderer, VerbatimRenderer};

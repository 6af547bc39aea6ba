//! Job planner
//!
//! Loads a document, expands it, compiles every job and names the resulting
//! scripts so they can be registered with a CI server.

use super::config::Config;
use super::loader::{YamlSource, load_yaml};
use super::template::TemplateEngine;
use crate::compiler::{BatchCompiler, Platform};
use crate::jobs::{ConfigError, Environment, JobDocument, JobError, Variables, expand};
use serde::Serialize;
use std::collections::BTreeSet;

/// Variables appended to job names when defined
const NAME_TAGS: [&str; 3] = ["VERSION", "DIST", "NAME"];

/// A named script ready to be registered as a CI job
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct JobDefinition {
    /// Unique job name
    pub name: String,
    /// Script body
    pub script: String,
    /// Position of this script among the segments of its job, from 1
    pub segment: usize,
    /// Number of segments of the job
    pub segments: usize,
    /// Job that must run before this one
    pub upstream: Option<String>,
    /// Variable context of the job
    pub variables: Variables,
}

/// Plans the CI jobs of documents
#[derive(Debug)]
pub struct JobPlanner {
    compiler: BatchCompiler,
    engine: TemplateEngine,
    prefix: String,
    environment: Option<Environment>,
}

impl JobPlanner {
    /// Creates a planner without environment capture
    #[must_use]
    pub fn new(platform: Platform) -> Self {
        Self {
            compiler: BatchCompiler::new(platform),
            engine: TemplateEngine::default(),
            prefix: String::new(),
            environment: None,
        }
    }

    /// Creates a planner from the configuration
    #[must_use]
    pub fn from_config(config: &Config) -> Self {
        Self {
            compiler: config.compiler(),
            engine: config.template_engine,
            prefix: config.job_prefix.clone(),
            environment: config.environment(),
        }
    }

    /// Sets the job name prefix
    #[must_use]
    pub fn with_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.prefix = prefix.into();
        self
    }

    /// Sets the environment snapshot added to every context
    #[must_use]
    pub fn with_environment(mut self, environment: Environment) -> Self {
        self.environment = Some(environment);
        self
    }

    /// Sets the template engine
    #[must_use]
    pub fn with_engine(mut self, engine: TemplateEngine) -> Self {
        self.engine = engine;
        self
    }

    /// Loads a document and plans its jobs
    ///
    /// # Errors
    ///
    /// Any error raised while loading, expanding or compiling the document,
    /// and [`ConfigError::DuplicateJobName`] if two jobs share a name.
    pub fn plan(&self, source: &YamlSource, context: &Variables) -> Result<Vec<JobDefinition>, JobError> {
        let renderer = self.engine.renderer();
        let loaded = load_yaml(source, context, self.compiler.platform(), renderer.as_ref())?;
        self.plan_document(&loaded.document, &loaded.project_name, &loaded.variables)
    }

    /// Plans the jobs of a parsed document
    ///
    /// # Errors
    ///
    /// Same as [`JobPlanner::plan`], plus [`JobError::CountMismatch`] if a
    /// job does not produce one script per split segment.
    pub fn plan_document(
        &self,
        document: &JobDocument,
        project_name: &str,
        variables: &Variables,
    ) -> Result<Vec<JobDefinition>, JobError> {
        let mut planned = Vec::new();
        let mut names = BTreeSet::new();

        for job in expand(document, variables, self.environment.as_ref())? {
            let job = job?;
            let expected = self.compiler.split_markers(&job.sequence) + 1;
            let scripts = self
                .compiler
                .compile(&job.sequence, &job.variables)?
                .into_segments();
            if scripts.len() != expected {
                return Err(JobError::CountMismatch {
                    expected,
                    produced: scripts.len(),
                    listing: scripts.join("\n----\n"),
                });
            }

            let base = self.job_name(project_name, &job.variables, job.sequence.index);
            let segments = scripts.len();
            let mut upstream: Option<String> = None;
            for (i, script) in scripts.into_iter().enumerate() {
                let name = if segments > 1 {
                    format!("{base}_part{}", i + 1)
                } else {
                    base.clone()
                };
                if !names.insert(name.clone()) {
                    return Err(ConfigError::DuplicateJobName {
                        name,
                        planned: names.into_iter().collect::<Vec<_>>().join(", "),
                    }
                    .into());
                }
                planned.push(JobDefinition {
                    name: name.clone(),
                    script,
                    segment: i + 1,
                    segments,
                    upstream: upstream.replace(name),
                    variables: job.variables.clone(),
                });
            }
        }

        tracing::info!(project = project_name, jobs = planned.len(), "Planned jobs");
        Ok(planned)
    }

    fn job_name(&self, project_name: &str, variables: &Variables, index: usize) -> String {
        let mut parts = vec![format!("{}yml", self.prefix), project_name.to_string()];
        parts.extend(
            NAME_TAGS
                .iter()
                .filter_map(|tag| variables.get(*tag))
                .filter(|value| !value.is_none())
                .map(|value| sanitize(&value.to_string())),
        );
        parts.push(index.to_string());
        parts.join("_")
    }
}

fn sanitize(value: &str) -> String {
    value
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || matches!(c, '.' | '-') { c } else { '_' })
        .collect()
}

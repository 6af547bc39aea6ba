//! `ymljobs expand` - Show the job sequences of a document

use anyhow::{Context, Result};
use std::path::Path;
use ymljobs::infrastructure::{Config, YamlSource, load_yaml};
use ymljobs::jobs::{JobSequence, Variables, expand};

/// Expands the document at `file` and serializes its sequences as JSON
pub fn expand_jobs(file: &Path, context: &Variables, config: &Config) -> Result<String> {
    let renderer = config.template_engine.renderer();
    let loaded = load_yaml(
        &YamlSource::File(file.to_path_buf()),
        context,
        config.platform(),
        renderer.as_ref(),
    )
    .with_context(|| format!("Failed to load: {}", file.display()))?;

    let environment = config.environment();
    let sequences = expand(&loaded.document, &loaded.variables, environment.as_ref())?
        .map(|job| job.map(|job| job.sequence))
        .collect::<Result<Vec<JobSequence>, _>>()
        .context("Failed to expand jobs")?;

    serde_json::to_string_pretty(&sequences).context("Failed to serialize jobs")
}

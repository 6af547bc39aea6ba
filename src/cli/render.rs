//! `ymljobs render` - Compile a document into job scripts

use anyhow::{Context, Result};
use std::fs;
use std::path::{Path, PathBuf};
use ymljobs::compiler::Platform;
use ymljobs::infrastructure::{Config, JobDefinition, JobPlanner, YamlSource};
use ymljobs::jobs::Variables;

/// Plans every job of the document at `file`
pub fn plan_jobs(file: &Path, context: &Variables, config: &Config) -> Result<Vec<JobDefinition>> {
    let planner = JobPlanner::from_config(config);
    planner
        .plan(&YamlSource::File(file.to_path_buf()), context)
        .with_context(|| format!("Failed to render jobs from: {}", file.display()))
}

/// Writes one script per job into `dir`, named after the job
pub fn save_jobs(jobs: &[JobDefinition], dir: &Path, platform: Platform) -> Result<Vec<PathBuf>> {
    fs::create_dir_all(dir)
        .with_context(|| format!("Failed to create directory: {}", dir.display()))?;

    let mut written = Vec::with_capacity(jobs.len());
    for job in jobs {
        let path = dir.join(format!("{}.{}", job.name, platform.script_extension()));
        fs::write(&path, &job.script)
            .with_context(|| format!("Failed to write script: {}", path.display()))?;
        tracing::debug!(job = %job.name, path = %path.display(), "Wrote script");
        written.push(path);
    }
    Ok(written)
}

/// Lists every job with a header line, for display
pub fn format_jobs(jobs: &[JobDefinition]) -> String {
    jobs.iter()
        .map(|job| {
            let mut header = format!("### {}", job.name);
            if let Some(upstream) = &job.upstream {
                header.push_str(&format!(" (after {upstream})"));
            }
            format!("{header}\n{}", job.script)
        })
        .collect::<Vec<_>>()
        .join("\n\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;
    use ymljobs::jobs::VarValue;

    const DOC: &str = "language: python\npython: [/opt/py36]\ninstall: [pip install -e ., JENKINS_SPLIT, make]\nscript: [python -m pytest]\n";

    fn config() -> Config {
        Config {
            platform: Some("linux".to_string()),
            add_environ: false,
            ..Config::default()
        }
    }

    fn context() -> Variables {
        let mut vars = Variables::new();
        vars.insert("root_path".to_string(), VarValue::from("/work"));
        vars
    }

    #[test]
    fn test_render_and_save() {
        let temp = TempDir::new().unwrap();
        let project = temp.path().join("myproject");
        fs::create_dir_all(&project).unwrap();
        let file = project.join(".local.jenkins.lin.yml");
        fs::write(&file, DOC).unwrap();

        let jobs = plan_jobs(&file, &context(), &config()).unwrap();
        assert_eq!(jobs.len(), 2);
        assert_eq!(jobs[0].name, "yml_myproject_0_part1");

        let out = temp.path().join("out");
        let written = save_jobs(&jobs, &out, Platform::Posix).unwrap();
        assert_eq!(written.len(), 2);
        assert!(written[1].ends_with("yml_myproject_0_part2.sh"));
        let body = fs::read_to_string(&written[1]).unwrap();
        assert!(body.contains("python -m pytest"));

        let listing = format_jobs(&jobs);
        assert!(listing.contains("### yml_myproject_0_part2 (after yml_myproject_0_part1)"));
    }

    #[test]
    fn test_missing_file() {
        let err = plan_jobs(Path::new("/nonexistent/job.yml"), &context(), &config()).unwrap_err();
        assert!(err.to_string().contains("Failed to render jobs"));
    }
}

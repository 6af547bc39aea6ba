//! Job document loading
//!
//! Reads a document from a file or a buffer, derives the project variables,
//! renders the template and parses the result.

use super::template::TemplateRenderer;
use crate::compiler::Platform;
use crate::jobs::{ConfigError, JobDocument, JobError, VarValue, Variables};
use std::path::{Path, PathBuf};

/// Buffers at least this long are never treated as paths
const MAX_PATH_LEN: usize = 5000;

/// Where a document comes from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum YamlSource {
    /// A file on disk
    File(PathBuf),
    /// Document text
    Text(String),
}

impl YamlSource {
    /// Treats `source` as a path if it is short and names an existing file
    #[must_use]
    pub fn detect(source: &str) -> Self {
        if source.len() < MAX_PATH_LEN && Path::new(source).is_file() {
            Self::File(PathBuf::from(source))
        } else {
            Self::Text(source.to_string())
        }
    }
}

/// A parsed document and the variables derived while loading it
#[derive(Debug, Clone, PartialEq)]
pub struct LoadedDocument {
    /// Parsed document
    pub document: JobDocument,
    /// Project the document belongs to
    pub project_name: String,
    /// Caller context plus `project_name`, `root_path` and `platform`
    pub variables: Variables,
}

/// Name of the directory holding a document
#[must_use]
pub fn infer_project_name(path: &Path) -> Option<String> {
    let full = path.canonicalize().unwrap_or_else(|_| path.to_path_buf());
    full.parent()
        .and_then(Path::file_name)
        .and_then(|name| name.to_str())
        .map(ToString::to_string)
}

fn defined<'a>(context: &'a Variables, key: &str) -> Option<&'a VarValue> {
    context
        .get(key)
        .filter(|v| !v.is_none() && !v.to_string().is_empty())
}

/// Loads and parses a job document
///
/// `context` must define `root_path`. `project_name` is taken from the
/// context, or inferred from the directory of a file source.
///
/// # Errors
///
/// - [`ConfigError::MissingRootPath`] / [`ConfigError::MissingProjectName`]
///   if the project variables cannot be derived
/// - [`ConfigError::InvalidProjectName`] for names ending with `__`
/// - [`JobError::Io`], [`JobError::Template`], [`JobError::Yaml`] when
///   reading, rendering or parsing fails
pub fn load_yaml(
    source: &YamlSource,
    context: &Variables,
    platform: Platform,
    renderer: &dyn TemplateRenderer,
) -> Result<LoadedDocument, JobError> {
    let (text, path) = match source {
        YamlSource::File(path) => {
            let is_yaml = path
                .extension()
                .and_then(|e| e.to_str())
                .is_some_and(|e| matches!(e, "yml" | "yaml"));
            if !is_yaml {
                tracing::warn!(path = %path.display(), "Job document does not have a .yml extension");
            }
            (std::fs::read_to_string(path)?, Some(path.as_path()))
        }
        YamlSource::Text(text) => (text.clone(), None),
    };

    let root_path = defined(context, "root_path")
        .ok_or(ConfigError::MissingRootPath)?
        .to_string();
    let project_name = match defined(context, "project_name") {
        Some(name) => name.to_string(),
        None => path
            .and_then(infer_project_name)
            .ok_or(ConfigError::MissingProjectName)?,
    };
    if project_name.ends_with("__") {
        return Err(ConfigError::InvalidProjectName(project_name).into());
    }

    let mut variables = context.clone();
    variables.insert("project_name".to_string(), VarValue::from(project_name.as_str()));
    variables.insert("root_path".to_string(), VarValue::from(platform.normalize(&root_path)));
    variables.insert("platform".to_string(), VarValue::from(platform.name()));

    let rendered = renderer.render(&text, &variables)?;
    let document = JobDocument::from_yaml_str(&rendered)?;
    tracing::info!(
        project = %project_name,
        sections = document.iter().count(),
        "Loaded job document"
    );

    Ok(LoadedDocument {
        document,
        project_name,
        variables,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::template::{JinjaRenderer, VerbatimRenderer};
    use crate::jobs::Section;
    use std::fs;
    use tempfile::TempDir;

    fn context(pairs: &[(&str, &str)]) -> Variables {
        pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), VarValue::from(*v)))
            .collect()
    }

    const DOC: &str = "language: python\npython: ['{{ Python36 }}']\nscript: ['cd {{ root_path }}']\n";

    #[test]
    fn test_load_from_file_infers_project_name() {
        let dir = TempDir::new().unwrap();
        let project = dir.path().join("pyquickhelper");
        fs::create_dir(&project).unwrap();
        let file = project.join(".local.jenkins.win.yml");
        fs::write(&file, DOC).unwrap();

        let source = YamlSource::detect(file.to_str().unwrap());
        assert_eq!(source, YamlSource::File(file.clone()));

        let ctx = context(&[("root_path", "ROOT/dev"), ("Python36", r"C:\Python36_x64")]);
        let loaded = load_yaml(&source, &ctx, Platform::Windows, &JinjaRenderer::new()).unwrap();

        assert_eq!(loaded.project_name, "pyquickhelper");
        assert_eq!(loaded.variables["root_path"], VarValue::from(r"ROOT\dev"));
        assert_eq!(loaded.variables["platform"], VarValue::from("win32"));
        assert_eq!(
            loaded.document.get(Section::Script).unwrap().to_string(),
            r"[cd ROOT\dev]"
        );
    }

    #[test]
    fn test_text_source_needs_project_name() {
        let source = YamlSource::detect(DOC);
        assert!(matches!(source, YamlSource::Text(_)));

        let err = load_yaml(&source, &context(&[("root_path", "ROOT")]), Platform::Posix, &VerbatimRenderer)
            .unwrap_err();
        assert_eq!(err, JobError::Config(ConfigError::MissingProjectName));

        let ctx = context(&[("root_path", "ROOT"), ("project_name", "proj")]);
        let loaded = load_yaml(&source, &ctx, Platform::Posix, &VerbatimRenderer).unwrap();
        assert_eq!(loaded.project_name, "proj");
    }

    #[test]
    fn test_root_path_is_mandatory() {
        let source = YamlSource::Text(DOC.to_string());
        let err = load_yaml(&source, &context(&[("project_name", "p")]), Platform::Posix, &VerbatimRenderer)
            .unwrap_err();
        assert_eq!(err, JobError::Config(ConfigError::MissingRootPath));
    }

    #[test]
    fn test_reserved_project_name() {
        let source = YamlSource::Text(DOC.to_string());
        let ctx = context(&[("root_path", "ROOT"), ("project_name", "module__")]);
        let err = load_yaml(&source, &ctx, Platform::Posix, &VerbatimRenderer).unwrap_err();
        assert!(matches!(err, JobError::Config(ConfigError::InvalidProjectName(_))));
    }

    #[test]
    fn test_missing_file_is_detected_as_text() {
        let source = YamlSource::detect("/nonexistent/dir/job.yml");
        assert!(matches!(source, YamlSource::Text(_)));
    }
}

//! CLI tools for ymljobs
//!
//! Thin wrappers around the library:
//! - `render`: Compile every job of a document into scripts
//! - `expand`: Print the expanded job sequences as JSON
//! - `completions`: Generate shell completions

pub mod completions;
pub mod expand;
pub mod render;

use anyhow::{Context, Result};
use clap::{CommandFactory, Parser, Subcommand, ValueEnum};
use std::path::PathBuf;
use ymljobs::infrastructure::{Config, init_logging};
use ymljobs::jobs::{VarValue, Variables};

/// CLI arguments for ymljobs
#[derive(Parser, Debug)]
#[command(name = "ymljobs")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Configuration file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Log to stderr at the configured level
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

/// Options shared by the commands reading a document
#[derive(clap::Args, Debug, Clone)]
pub struct DocumentArgs {
    /// Job document (.yml)
    pub file: PathBuf,
    /// Target platform (win32, linux, ...)
    #[arg(short, long)]
    pub platform: Option<String>,
    /// Template variable, `KEY=VALUE` (an empty value is undefined)
    #[arg(long = "var", value_name = "KEY=VALUE", value_parser = parse_var)]
    pub vars: Vec<(String, VarValue)>,
    /// Root path of the projects, the current directory if unset
    #[arg(long)]
    pub root_path: Option<String>,
    /// Do not add the process environment to the variables
    #[arg(long)]
    pub no_environ: bool,
}

impl DocumentArgs {
    /// Applies the command-line overrides to the configuration
    fn apply(&self, config: &mut Config) {
        if let Some(platform) = &self.platform {
            config.platform = Some(platform.clone());
        }
        if self.no_environ {
            config.add_environ = false;
        }
    }

    /// Template context built from `--var` and `--root-path`
    fn context(&self) -> Result<Variables> {
        let mut vars: Variables = self.vars.iter().cloned().collect();
        if !vars.contains_key("root_path") {
            let root = match &self.root_path {
                Some(root) => root.clone(),
                None => std::env::current_dir()
                    .context("Failed to read the current directory")?
                    .display()
                    .to_string(),
            };
            vars.insert("root_path".to_string(), VarValue::from(root));
        }
        Ok(vars)
    }
}

fn parse_var(raw: &str) -> Result<(String, VarValue), String> {
    let (key, value) = raw
        .split_once('=')
        .ok_or_else(|| format!("expected KEY=VALUE, got '{raw}'"))?;
    let value = if value.is_empty() {
        VarValue::None
    } else {
        VarValue::from(value)
    };
    Ok((key.trim().to_string(), value))
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Compile every job of a document into scripts
    Render {
        #[command(flatten)]
        document: DocumentArgs,
        /// Directory receiving one script per job (stdout if not specified)
        #[arg(short, long)]
        output_dir: Option<PathBuf>,
        /// Prefix of the job names
        #[arg(long)]
        prefix: Option<String>,
    },

    /// Print the expanded job sequences as JSON
    Expand {
        #[command(flatten)]
        document: DocumentArgs,
    },

    /// Generate shell completions
    Completions {
        /// Shell type
        #[arg(value_enum)]
        shell: ShellArg,
        /// Output file (stdout if not specified)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, ValueEnum)]
enum ShellArg {
    Bash,
    Zsh,
    Fish,
    PowerShell,
}

/// Build the CLI command for completion generation
pub fn build_cli() -> clap::Command {
    Args::command()
}

/// Parse and execute CLI arguments
pub fn run() -> Result<()> {
    let args = Args::parse();

    let mut config = match &args.config {
        Some(path) => Config::from_yaml_file(path)
            .with_context(|| format!("Failed to load configuration: {}", path.display()))?,
        None => Config::default(),
    };
    if args.verbose {
        init_logging(&config.log_level);
    }

    match args.command {
        Command::Render {
            document,
            output_dir,
            prefix,
        } => {
            document.apply(&mut config);
            if let Some(prefix) = prefix {
                config.job_prefix = prefix;
            }
            let jobs = render::plan_jobs(&document.file, &document.context()?, &config)?;
            match output_dir {
                Some(dir) => {
                    let written = render::save_jobs(&jobs, &dir, config.platform())?;
                    for path in written {
                        println!("{}", path.display());
                    }
                }
                None => println!("{}", render::format_jobs(&jobs)),
            }
        }
        Command::Expand { document } => {
            document.apply(&mut config);
            let json = expand::expand_jobs(&document.file, &document.context()?, &config)?;
            println!("{json}");
        }
        Command::Completions { shell, output } => {
            use clap_complete::Shell;

            let shell_enum = match shell {
                ShellArg::Bash => Shell::Bash,
                ShellArg::Zsh => Shell::Zsh,
                ShellArg::Fish => Shell::Fish,
                ShellArg::PowerShell => Shell::PowerShell,
            };

            let completions = completions::generate_completions(shell_enum)?;

            if let Some(output_path) = output {
                completions::save_completions(&completions, &output_path)?;
            } else {
                println!("{completions}");
            }
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_var() {
        assert_eq!(
            parse_var("Python36=/opt/py36").unwrap(),
            ("Python36".to_string(), VarValue::from("/opt/py36"))
        );
        assert_eq!(parse_var("Python27=").unwrap(), ("Python27".to_string(), VarValue::None));
        assert!(parse_var("Python27").is_err());
    }

    #[test]
    fn test_cli_definition() {
        build_cli().debug_assert();
    }

    #[test]
    fn test_render_arguments() {
        let args = Args::try_parse_from([
            "ymljobs",
            "render",
            "job.yml",
            "--platform",
            "win32",
            "--var",
            "Python36=C:/Python36_x64",
            "--root-path",
            "ROOT",
            "--no-environ",
        ])
        .unwrap();
        let Command::Render { document, .. } = args.command else {
            panic!("expected render");
        };
        let mut config = Config::default();
        document.apply(&mut config);
        assert_eq!(config.platform.as_deref(), Some("win32"));
        assert!(!config.add_environ);
        let context = document.context().unwrap();
        assert_eq!(context["root_path"], VarValue::from("ROOT"));
        assert_eq!(context["Python36"], VarValue::from("C:/Python36_x64"));
    }
}

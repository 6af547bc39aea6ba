//! `ymljobs completions` - Generate shell completions
//!
//! Supports bash, zsh, fish, and PowerShell.

use anyhow::{Context, Result};
use clap_complete::Shell;
use std::fs;
use std::path::Path;

pub fn generate_completions(shell: Shell) -> Result<String> {
    use clap_complete::generate;

    let mut cmd = super::build_cli();
    let mut buf = Vec::new();
    generate(shell, &mut cmd, "ymljobs", &mut buf);

    String::from_utf8(buf).context("Failed to generate completions")
}

pub fn save_completions(completions: &str, output_path: &Path) -> Result<()> {
    fs::write(output_path, completions)
        .with_context(|| format!("Failed to write completions to: {}", output_path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_generate_bash_completions() {
        let completions = generate_completions(Shell::Bash).unwrap();
        assert!(completions.contains("ymljobs"));
        assert!(completions.contains("render"));
    }

    #[test]
    fn test_generate_fish_completions() {
        let completions = generate_completions(Shell::Fish).unwrap();
        assert!(completions.contains("expand"));
    }

    #[test]
    fn test_save_completions() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("_ymljobs");
        let completions = generate_completions(Shell::Zsh).unwrap();
        save_completions(&completions, &path).unwrap();
        assert_eq!(fs::read_to_string(&path).unwrap(), completions);
    }
}

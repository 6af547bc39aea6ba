//! Target platform syntax

use serde::{Deserialize, Serialize};
use std::fmt;

/// Shell dialect of a generated script
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Platform {
    /// Windows batch (`cmd.exe`)
    Windows,
    /// POSIX shell
    Posix,
}

impl Platform {
    /// Resolves a platform name such as `win32`, `linux` or `darwin`
    ///
    /// Every name starting with `win` is Windows, anything else is POSIX.
    #[must_use]
    pub fn from_name(name: &str) -> Self {
        if name.to_ascii_lowercase().starts_with("win") {
            Self::Windows
        } else {
            Self::Posix
        }
    }

    /// Platform of the running process
    #[must_use]
    pub fn host() -> Self {
        if cfg!(windows) { Self::Windows } else { Self::Posix }
    }

    /// Canonical name (`win32` or `linux`)
    #[must_use]
    pub fn name(self) -> &'static str {
        match self {
            Self::Windows => "win32",
            Self::Posix => "linux",
        }
    }

    /// Extension of script files
    #[must_use]
    pub fn script_extension(self) -> &'static str {
        match self {
            Self::Windows => "bat",
            Self::Posix => "sh",
        }
    }

    /// Path separator
    #[must_use]
    pub fn separator(self) -> char {
        match self {
            Self::Windows => '\\',
            Self::Posix => '/',
        }
    }

    /// Line aborting the script when the previous command failed
    #[must_use]
    pub fn error_check(self) -> &'static str {
        match self {
            Self::Windows => "if %errorlevel% neq 0 exit /b %errorlevel%",
            Self::Posix => "if [ $? -ne 0 ]; then exit $?; fi",
        }
    }

    /// Lines starting every script
    #[must_use]
    pub fn preamble(self) -> &'static [&'static str] {
        match self {
            Self::Windows => &["@echo off", "set PATH0=%PATH%"],
            Self::Posix => &[],
        }
    }

    /// Prints a message
    #[must_use]
    pub fn echo(self, message: &str) -> String {
        match self {
            Self::Windows => format!("@echo {message}"),
            Self::Posix => format!("echo {message}"),
        }
    }

    /// Sets a variable for the rest of the script
    #[must_use]
    pub fn set_var(self, name: &str, value: &str) -> String {
        let value = quote_spaced(value);
        match self {
            Self::Windows => format!("set {name}={value}"),
            Self::Posix => format!("export {name}={value}"),
        }
    }

    /// Declares a job variable
    #[must_use]
    pub fn info_line(self, name: &str, value: &str) -> String {
        let value = quote_spaced(value);
        match self {
            Self::Windows => format!("SET {name}={value}"),
            Self::Posix => format!("export {name}={value}"),
        }
    }

    /// Puts a directory in front of `PATH`
    #[must_use]
    pub fn prepend_path(self, dir: &str) -> String {
        match self {
            Self::Windows => format!("set PATH={dir};%PATH%"),
            Self::Posix => format!("export PATH={dir}:$PATH"),
        }
    }

    /// Reference to a variable in a command line
    #[must_use]
    pub fn var_ref(self, name: &str) -> String {
        match self {
            Self::Windows => format!("%{name}%"),
            Self::Posix => format!("${name}"),
        }
    }

    /// Creates a directory unless it exists
    #[must_use]
    pub fn mkdir(self, dir: &str) -> String {
        match self {
            Self::Windows => format!("if not exist \"{dir}\" mkdir \"{dir}\""),
            Self::Posix => format!("if [ ! -d \"{dir}\" ]; then mkdir -p \"{dir}\"; fi"),
        }
    }

    /// Joins path components with the platform separator
    #[must_use]
    pub fn join(self, parts: &[&str]) -> String {
        let sep = self.separator().to_string();
        parts
            .iter()
            .map(|p| p.trim_end_matches(['/', '\\']))
            .filter(|p| !p.is_empty())
            .collect::<Vec<_>>()
            .join(&sep)
    }

    /// Everything before the last separator, empty if there is none
    #[must_use]
    pub fn dirname(self, path: &str) -> String {
        let path = path.trim_end_matches(self.separator());
        path.rfind(self.separator())
            .map(|at| path[..at].to_string())
            .unwrap_or_default()
    }

    /// Rewrites every separator to this platform's
    #[must_use]
    pub fn normalize(self, path: &str) -> String {
        match self {
            Self::Windows => path.replace('/', "\\"),
            Self::Posix => path.replace('\\', "/"),
        }
    }

    /// Directory holding executables inside a virtual environment
    #[must_use]
    pub fn venv_bin(self) -> &'static str {
        match self {
            Self::Windows => "Scripts",
            Self::Posix => "bin",
        }
    }

    /// Interpreter executable inside a virtual environment
    #[must_use]
    pub fn venv_python(self) -> &'static str {
        match self {
            Self::Windows => "python.exe",
            Self::Posix => "python",
        }
    }
}

fn quote_spaced(value: &str) -> String {
    if value.chars().any(char::is_whitespace) {
        format!("\"{value}\"")
    } else {
        value.to_string()
    }
}

impl Default for Platform {
    fn default() -> Self {
        Self::host()
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_name() {
        assert_eq!(Platform::from_name("win32"), Platform::Windows);
        assert_eq!(Platform::from_name("win"), Platform::Windows);
        assert_eq!(Platform::from_name("linux"), Platform::Posix);
        assert_eq!(Platform::from_name("darwin"), Platform::Posix);
    }

    #[test]
    fn test_join_and_dirname() {
        assert_eq!(Platform::Windows.join(&[r"C:\Python36_x64", "python"]), r"C:\Python36_x64\python");
        assert_eq!(Platform::Posix.join(&["/opt/py/", "bin", "python"]), "/opt/py/bin/python");
        assert_eq!(Platform::Windows.dirname(r"C:\Python36_x64\python"), r"C:\Python36_x64");
        assert_eq!(Platform::Posix.dirname("python"), "");
    }

    #[test]
    fn test_info_line_quotes_whitespace() {
        assert_eq!(Platform::Windows.info_line("NAME", "UT"), "SET NAME=UT");
        assert_eq!(Platform::Posix.info_line("NAME", "unit tests"), "export NAME=\"unit tests\"");
        assert_eq!(Platform::Windows.set_var("JOB_NAME", "UT SKIP"), "set JOB_NAME=\"UT SKIP\"");
    }

    #[test]
    fn test_error_check() {
        assert_eq!(
            Platform::Windows.error_check(),
            "if %errorlevel% neq 0 exit /b %errorlevel%"
        );
        assert_eq!(Platform::Posix.error_check(), "if [ $? -ne 0 ]; then exit $?; fi");
    }

    #[test]
    fn test_normalize() {
        assert_eq!(Platform::Windows.normalize("ROOT/project"), r"ROOT\project");
        assert_eq!(Platform::Posix.normalize(r"ROOT\project"), "ROOT/project");
    }
}

//! ymljobs - compile YAML build matrices into CI job scripts
//!
//! ## Commands
//!
//! - `ymljobs render` - Write one script per job of a document
//! - `ymljobs expand` - Show the expanded job sequences as JSON
//! - `ymljobs completions` - Generate shell completions
//!
//! ## Quick Start
//!
//! ```bash
//! # Print the Windows scripts of a project
//! ymljobs render .local.jenkins.win.yml --platform win32 \
//!     --var Python36=C:/Python36_x64 --root-path C:/jenkins
//!
//! # Write the Linux scripts into a directory
//! ymljobs render .local.jenkins.lin.yml --platform linux -o jobs/
//!
//! # Inspect the build matrix
//! ymljobs expand .local.jenkins.lin.yml --no-environ
//!
//! # Generate shell completions
//! ymljobs completions bash > /etc/bash_completion.d/ymljobs
//! ```

use std::process::ExitCode;

mod cli;

fn main() -> ExitCode {
    if std::env::var("YMLJOBS_DEBUG").is_ok() {
        ymljobs::infrastructure::init_logging("debug");
    }

    match cli::run() {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {e}");
            if std::env::var("YMLJOBS_VERBOSE").is_ok() {
                eprintln!("{e:?}");
            }
            ExitCode::FAILURE
        }
    }
}

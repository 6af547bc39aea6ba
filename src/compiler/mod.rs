//! Script compilation
//!
//! Renders expanded jobs as Windows batch files or POSIX shell scripts.

pub mod batch;
pub mod platform;


pub use batch::{BatchCompiler, CompiledScript, DEFAULT_SPLIT_MARKER, check_split_marker, compile};
pub use platform::Platform;

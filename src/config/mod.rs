//! Configuration: diagnostic options and command-line parsing.

pub mod cli;
pub mod options;

pub use cli::{Backend, CliArgs, RunConfig};
pub use options::{DiagOptions, ExitPolicy};

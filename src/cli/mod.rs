//! CLI layer for the `enrich` binary.
//!
//! Provides the command-line interface using clap, with commands
//! for initializing, running, and inspecting enrichment runs.

pub mod commands;
pub mod output;
pub mod parser;

pub use commands::execute;
pub use output::OutputFormat;
pub use parser::{Cli, Commands};

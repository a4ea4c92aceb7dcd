//! Binary entry point for the `enrich` CLI.
//!
//! Maps [`execute`]'s result onto an exit code: 0 on success, 1 on error,
//! 130 on user interrupt (SIGINT/cancellation).

#![allow(clippy::print_stdout, clippy::print_stderr)]

use clap::Parser;
use enrich_rs::cli::output::{OutputFormat, format_error};
use enrich_rs::cli::{Cli, execute};
use enrich_rs::error::{CommandError, EngineError, Error};
use std::io::{self, Write};
use std::process::ExitCode;

const EXIT_INTERRUPTED: u8 = 130;

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    enrich_rs::logging::init_with_verbosity(cli.verbose);
    let format = OutputFormat::parse(&cli.format);

    match execute(&cli).await {
        Ok(output) => {
            if !output.is_empty() {
                // Handle broken pipe gracefully (e.g., when piped to `head` or `jq`)
                if let Err(e) = write!(io::stdout(), "{output}")
                    && e.kind() != io::ErrorKind::BrokenPipe
                {
                    eprintln!("Error writing to stdout: {e}");
                    return ExitCode::FAILURE;
                }
            }
            ExitCode::SUCCESS
        }
        Err(e) => {
            let error_output = format_error(&e, format);
            match format {
                OutputFormat::Json | OutputFormat::Ndjson => {
                    // JSON errors go to stdout for programmatic parsing.
                    println!("{error_output}");
                }
                OutputFormat::Text => {
                    eprintln!("Error: {error_output}");
                }
            }
            if is_interrupt(&e) {
                ExitCode::from(EXIT_INTERRUPTED)
            } else {
                ExitCode::FAILURE
            }
        }
    }
}

/// Whether `err` represents a user-initiated cancellation (SIGINT), which
/// maps to exit code 130 rather than the generic failure code 1.
fn is_interrupt(err: &Error) -> bool {
    matches!(err, Error::Engine(EngineError::Cancelled) | Error::Command(CommandError::Cancelled))
}

//! agent-notes: command-line front end for review annotations.
//!
//! Entry point for the `agent-notes` binary. Wires together logging, the user
//! config (`config`), argument parsing and the commands (`commands`), and the
//! long-running `watch` host (`watch`, `event`) around `agent-notes-core`.
//!
//! # Startup sequence
//!
//! 1. Install the tracing subscriber on stderr so stdout carries only
//!    command output.
//! 2. Parse arguments; usage errors exit with status 2.
//! 3. Load the XDG config (soft failure).
//! 4. Resolve the workspace root and run the command.

mod commands;
mod config;
mod event;
mod watch;

use std::path::PathBuf;
use std::process::ExitCode;

use tracing::error;
use tracing_subscriber::EnvFilter;

use crate::commands::CommandError;

/// Env var holding the tracing filter directive, e.g. `agent_notes_core=debug`.
const LOG_ENV: &str = "AGENT_NOTES_LOG";

fn init_tracing() {
    let filter = EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

fn resolve_root(root: Option<PathBuf>) -> Result<PathBuf, CommandError> {
    let root = match root {
        Some(root) => root,
        None => std::env::current_dir().map_err(|source| CommandError::Io {
            path: PathBuf::from("."),
            source,
        })?,
    };
    std::fs::canonicalize(&root).map_err(|source| CommandError::Io { path: root, source })
}

#[tokio::main]
async fn main() -> ExitCode {
    init_tracing();

    let args: Vec<String> = std::env::args().skip(1).collect();
    let invocation = match commands::parse(&args) {
        Ok(invocation) => invocation,
        Err(err) => {
            eprintln!("agent-notes: {err}\n\n{}", commands::USAGE);
            return err.exit_code();
        }
    };

    let config = config::load();
    let result = match resolve_root(invocation.root) {
        Ok(root) => commands::run(&root, invocation.command, &config).await,
        Err(err) => Err(err),
    };

    match result {
        Ok(code) => code,
        Err(err) => {
            error!("{err}");
            err.exit_code()
        }
    }
}

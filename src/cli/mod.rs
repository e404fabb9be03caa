//! Command-line interface for dispatch.
//!
//! Sends, lists and pops messages in the wallet's mailbox over JSON-RPC.

pub mod args;
pub mod commands;

use crate::Result;
use std::process;

pub use args::{Command, Invocation};

/// Main entry point for the CLI application
pub async fn run() -> Result<()> {
    let invocation = match args::parse_args() {
        Ok(invocation) => invocation,
        Err(e) => {
            eprintln!("Error parsing arguments: {}", e);
            args::print_usage();
            process::exit(1);
        }
    };

    let ctx = commands::connect(invocation.cluster)?;

    match invocation.command {
        Command::Send { address, message } => commands::send(ctx, &address, &message).await,
        Command::List => commands::list(ctx).await,
        Command::Pop => commands::pop(ctx).await,
    }
}

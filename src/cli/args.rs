//! Command-line argument parsing.

use crate::config::Cluster;
use crate::error::{DispatchError, Result};
use crate::pubkey::Pubkey;
use std::env;

/// Command-line interface commands
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Send { address: Pubkey, message: String },
    List,
    Pop,
}

/// Parsed invocation: an optional cluster override and the command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invocation {
    pub cluster: Option<Cluster>,
    pub command: Command,
}

/// Parse the process arguments.
pub fn parse_args() -> Result<Invocation> {
    let args: Vec<String> = env::args().skip(1).collect();
    parse_from(&args)
}

/// Parse arguments, excluding the program name.
pub fn parse_from(args: &[String]) -> Result<Invocation> {
    let mut cluster = None;
    let mut rest = args;

    if let Some(first) = rest.first() {
        if first == "--cluster" {
            let name = rest
                .get(1)
                .ok_or_else(|| DispatchError::invalid_input("--cluster requires a value"))?;
            cluster = Some(name.parse::<Cluster>()?);
            rest = &rest[2..];
        } else if let Some(name) = first.strip_prefix("--cluster=") {
            cluster = Some(name.parse::<Cluster>()?);
            rest = &rest[1..];
        }
    }

    let name = rest
        .first()
        .ok_or_else(|| DispatchError::invalid_input("Missing command"))?;

    let command = match name.as_str() {
        "send" => {
            if rest.len() < 3 {
                return Err(DispatchError::invalid_input(
                    "send requires an address and a message",
                ));
            }
            Command::Send {
                address: rest[1].parse()?,
                message: rest[2..].join(" "),
            }
        }
        "list" => Command::List,
        "pop" => Command::Pop,
        other => {
            return Err(DispatchError::invalid_input(format!(
                "Unknown command '{}'",
                other
            )))
        }
    };

    Ok(Invocation { cluster, command })
}

/// Print usage information
pub fn print_usage() {
    println!("dispatch - ledger-backed mailbox client");
    println!();
    println!("Usage: dispatch [--cluster <cluster>] <command> [args...]");
    println!();
    println!("Commands:");
    println!("  send <address> <message>   Send a text message to a wallet's mailbox");
    println!("  list                       List unread messages in your mailbox");
    println!("  pop                        Remove the oldest unread message");
    println!();
    println!("Clusters:");
    println!("  mainnet-beta, devnet (default), testnet, localnet");
    println!();
    println!("Environment:");
    println!("  DISPATCH_CLUSTER       Cluster when --cluster is not given");
    println!("  DISPATCH_RPC_URL       JSON-RPC endpoint override");
    println!("  DISPATCH_WALLET_FILE   Keypair file (64-byte JSON array)");
    println!();
    println!("Examples:");
    println!("  dispatch send 4Nd1mBQtrMJVYVfKf2PJy9NZUZdTAsp7D4xWLs4gDB4T 'hello there'");
    println!("  dispatch --cluster localnet list");
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_parse_send() {
        let key = Pubkey::new_from_array([3; 32]);
        let parsed = parse_from(&args(&["send", &key.to_base58(), "hello", "world"])).unwrap();
        assert_eq!(parsed.cluster, None);
        assert_eq!(
            parsed.command,
            Command::Send {
                address: key,
                message: "hello world".into()
            }
        );
    }

    #[test]
    fn test_parse_cluster_override() {
        let parsed = parse_from(&args(&["--cluster", "localnet", "list"])).unwrap();
        assert_eq!(parsed.cluster, Some(Cluster::Localnet));
        assert_eq!(parsed.command, Command::List);

        let parsed = parse_from(&args(&["--cluster=testnet", "pop"])).unwrap();
        assert_eq!(parsed.cluster, Some(Cluster::Testnet));
        assert_eq!(parsed.command, Command::Pop);
    }

    #[test]
    fn test_parse_errors() {
        assert!(parse_from(&args(&[])).is_err());
        assert!(parse_from(&args(&["send", "not-a-key", "hi"])).is_err());
        assert!(parse_from(&args(&["send"])).is_err());
        assert!(parse_from(&args(&["--cluster"])).is_err());
        assert!(parse_from(&args(&["--cluster", "moon", "list"])).is_err());
        assert!(parse_from(&args(&["frobnicate"])).is_err());
    }
}

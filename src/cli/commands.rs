//! Command implementations for the dispatch CLI.

use crate::config::{Cluster, DispatchConfig};
use crate::context::DispatchContext;
use crate::error::Result;
use crate::ledger::RpcLedger;
use crate::mailbox::{Mailbox, MailboxOptions, ReceivedMessage};
use crate::pubkey::Pubkey;
use crate::wallet::{Keypair, Wallet};
use std::sync::Arc;
use std::time::{Duration, UNIX_EPOCH};
use tracing::{debug, info};

/// Builds a context over JSON-RPC for the configured wallet file.
pub fn connect(cluster: Option<Cluster>) -> Result<DispatchContext> {
    let mut config = DispatchConfig::from_env()?;
    if let Some(cluster) = cluster {
        config = config.with_cluster(cluster);
    }
    debug!(
        cluster = %config.cluster,
        rpc = %config.rpc_url,
        wallet = %config.wallet_path.display(),
        "Connecting"
    );

    let keypair = Keypair::read_from_file(&config.wallet_path)?;
    let wallet = Wallet::from_keypair(Arc::new(keypair));
    let ledger = Arc::new(RpcLedger::from_config(&config));
    DispatchContext::new(ledger, wallet, config)
}

fn own_mailbox(ctx: DispatchContext) -> Mailbox {
    Mailbox::new(ctx, MailboxOptions::default())
}

/// Execute send command
pub async fn send(ctx: DispatchContext, address: &Pubkey, message: &str) -> Result<()> {
    let mailbox = own_mailbox(ctx);
    let signature = mailbox.send_text(address, message).await?;
    info!(receiver = %address, "Message sent");
    println!("{}", signature);
    Ok(())
}

/// Execute list command
pub async fn list(ctx: DispatchContext) -> Result<()> {
    let mailbox = own_mailbox(ctx);
    let messages = mailbox.fetch_messages().await?;

    if messages.is_empty() {
        println!("No messages in {}", mailbox.owner());
        return Ok(());
    }

    println!("{} message(s) in {}:", messages.len(), mailbox.owner());
    println!();
    for message in &messages {
        println!("{}", format_message(message));
    }
    Ok(())
}

/// Execute pop command
pub async fn pop(ctx: DispatchContext) -> Result<()> {
    let mailbox = own_mailbox(ctx);
    let signature = mailbox.pop().await?;
    info!("Removed oldest message");
    println!("{}", signature);
    Ok(())
}

/// One listing line per message.
pub fn format_message(message: &ReceivedMessage) -> String {
    let mut line = format!("[{}] from {}", message.index, message.sender);
    if message.payload.ts > 0 {
        line.push_str(&format!(" at {}", format_timestamp(message.payload.ts)));
    }
    if let Some(subject) = &message.payload.subj {
        line.push_str(&format!("\n    {}", subject));
    }
    line.push_str(&format!("\n    {}", message.payload.body));
    if let Some(incentive) = &message.incentive {
        line.push_str(&format!(
            "\n    incentive: {} of mint {}",
            incentive.amount, incentive.mint
        ));
    }
    line
}

/// Format Unix timestamp as human-readable string
pub fn format_timestamp(timestamp: u64) -> String {
    let datetime = UNIX_EPOCH + Duration::from_secs(timestamp);
    format!("{:?}", datetime)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::MessagePayload;

    #[test]
    fn test_format_message() {
        let sender = Pubkey::new_from_array([9; 32]);
        let message = ReceivedMessage {
            index: 4,
            sender,
            payer: sender,
            payload: MessagePayload::new("hi").with_subject("greeting").with_ts(0),
            incentive: None,
        };
        let text = format_message(&message);
        assert!(text.starts_with(&format!("[4] from {}", sender)));
        assert!(text.contains("greeting"));
        assert!(text.ends_with("hi"));
        assert!(!text.contains(" at "));
    }
}

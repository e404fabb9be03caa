//! # dispatch
//!
//! Client-side protocol layer for ledger-backed mailboxes, postboxes and
//! forums.
//!
//! Every entity (mailbox, message slot, postbox, post, vote) is a ledger
//! account whose address is derived from well-known seeds. The client
//! derives those addresses, allocates counter-based slots optimistically,
//! evaluates access restrictions locally before submitting, and encodes
//! payloads as compressed JSON. The ledger stays the only source of truth:
//! every read goes back to it.
//!
//! ## Components
//!
//! - [`Mailbox`]: per-owner FIFO message queue with incentives
//! - [`Postbox`]: threaded posts with votes, moderators and settings
//! - [`Forum`]: topics and threads on top of a postbox
//! - [`GatingEvaluator`]: NFT and token-holding restrictions
//! - [`MemoryLedger`] / [`RpcLedger`]: in-process and JSON-RPC ledgers
//!
//! ## Example
//!
//! ```rust,no_run
//! use dispatch::{
//!     Cluster, DispatchConfig, DispatchContext, Keypair, Mailbox, MailboxOptions, MemoryLedger,
//!     TransactionSigner, Wallet,
//! };
//! use std::sync::Arc;
//! # async fn demo() -> dispatch::Result<()> {
//! let ledger = Arc::new(MemoryLedger::for_cluster(Cluster::Devnet)?);
//! let alice = Arc::new(Keypair::generate());
//! ledger.airdrop(&alice.pubkey(), 1_000_000_000);
//! let ctx = DispatchContext::new(
//!     ledger,
//!     Wallet::from_keypair(alice),
//!     DispatchConfig::new(Cluster::Devnet),
//! )?;
//! let mailbox = Mailbox::new(ctx, MailboxOptions::default());
//! mailbox.send_text(mailbox.owner(), "note to self").await?;
//! assert_eq!(mailbox.count().await?, 1);
//! # Ok(())
//! # }
//! ```

pub mod address;
pub mod cli;
pub mod codec;
pub mod config;
pub mod constants;
pub mod context;
pub mod error;
pub mod forum;
pub mod gating;
pub mod ledger;
pub mod mailbox;
pub mod postbox;
pub mod program;
pub mod pubkey;
pub mod rpc;
pub mod wallet;

pub use address::AddressDeriver;
pub use codec::{MessagePayload, PayloadCodec};
pub use config::{BucketConfig, Cluster, DispatchConfig, RetryPolicy};
pub use context::DispatchContext;
pub use error::{DispatchError, Result};
pub use forum::{Forum, ForumInfo};
pub use gating::{GatingEvaluator, PostRestriction};
pub use ledger::{Ledger, MemoryLedger, RpcLedger};
pub use mailbox::{Incentive, Mailbox, MailboxOptions};
pub use postbox::{Post, Postbox, PostboxTarget};
pub use pubkey::{Pubkey, Signature};
pub use wallet::{Keypair, TransactionSigner, Wallet};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

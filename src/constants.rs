//! Protocol constants shared by address derivation, the program surface and
//! the in-memory ledger.
//!
//! Program ids and treasury addresses that vary per cluster live in
//! [`crate::config::ClusterAddresses`]; everything here is cluster-independent.

use crate::pubkey::Pubkey;
use once_cell::sync::Lazy;

// =============================================================================
// Derivation Seeds
// =============================================================================

/// Protocol seed prefixed to every messaging-program address.
pub const MESSAGING_PROTOCOL_SEED: &[u8] = b"messaging";

/// Entity seed for a receiver's mailbox.
pub const MAILBOX_SEED: &[u8] = b"mailbox";

/// Entity seed for a single message slot.
pub const MESSAGE_SEED: &[u8] = b"message";

/// Protocol seed prefixed to every postbox-program address.
pub const POSTBOX_PROTOCOL_SEED: &[u8] = b"dispatch";

/// Entity seed for a postbox root.
pub const POSTBOX_SEED: &[u8] = b"postbox";

/// Entity seed for a post or reply slot.
pub const POST_SEED: &[u8] = b"post";

/// Entity seed for a postbox's moderator credential mint.
pub const MODERATOR_SEED: &[u8] = b"moderator";

/// Entity seed for postbox settings accounts.
pub const SETTINGS_SEED: &[u8] = b"settings";

/// Entity seed for a (post, voter) vote entry.
pub const VOTE_SEED: &[u8] = b"vote";

/// Entity seed for a bucket-local post counter.
pub const BUCKET_SEED: &[u8] = b"bucket";

/// Seed for token metadata accounts.
pub const METADATA_SEED: &[u8] = b"metadata";

/// Settings sub-seeds, one account per settings kind.
pub const DESCRIPTION_SETTINGS_SEED: &[u8] = b"description";
/// Settings sub-seed for the owner list.
pub const OWNER_INFO_SETTINGS_SEED: &[u8] = b"owners";
/// Settings sub-seed for the forum-level post restriction.
pub const RESTRICTION_SETTINGS_SEED: &[u8] = b"restriction";

// =============================================================================
// Derivation Limits
// =============================================================================

/// Maximum number of seeds in one derivation.
pub const MAX_SEEDS: usize = 16;

/// Maximum length of a single seed in bytes.
pub const MAX_SEED_LEN: usize = 32;

/// Domain separator appended to every derivation hash.
pub const PDA_MARKER: &[u8] = b"ProgramDerivedAddress";

// =============================================================================
// Well-known Programs
// =============================================================================

/// System program (all-zero key).
pub static SYSTEM_PROGRAM_ID: Lazy<Pubkey> = Lazy::new(|| Pubkey::new_from_array([0u8; 32]));

/// SPL token program.
pub static TOKEN_PROGRAM_ID: Lazy<Pubkey> = Lazy::new(|| {
    "TokenkegQfeZyiNwAJbNbGKPFXCWuBvf9Ss623VQ5DA"
        .parse()
        .expect("valid token program id")
});

/// Associated token account program.
pub static ASSOCIATED_TOKEN_PROGRAM_ID: Lazy<Pubkey> = Lazy::new(|| {
    "ATokenGPvbdGVxr1b2hvZbsiqW5xWH25efTNsLJA8knL"
        .parse()
        .expect("valid associated token program id")
});

/// Token metadata program.
pub static METADATA_PROGRAM_ID: Lazy<Pubkey> = Lazy::new(|| {
    "metaqbxxUerdq28cj1RbAWkYQm3ybzjb6a8bt518x1s"
        .parse()
        .expect("valid metadata program id")
});

// =============================================================================
// Fees (lamports)
// =============================================================================

/// Flat protocol fee charged per message sent.
pub const MESSAGE_FEE_LAMPORTS: u64 = 50_000;

/// Flat protocol fee charged per post or reply.
pub const POST_FEE_LAMPORTS: u64 = 50_000;

/// Flat protocol fee charged per vote.
pub const VOTE_FEE_LAMPORTS: u64 = 50_000;

/// One-time fee for creating a postbox.
pub const POSTBOX_CREATION_FEE_LAMPORTS: u64 = 100_000;

/// Rent-exempt deposit held by each message or post account until closed.
pub const ACCOUNT_RENT_LAMPORTS: u64 = 1_500_000;

// =============================================================================
// Client Behaviour
// =============================================================================

/// Default number of submission attempts for transient failures.
pub const DEFAULT_MAX_ATTEMPTS: u32 = 6;

/// Marker prefixed to obfuscated message payloads.
pub const OBFUSCATION_PREFIX: &[u8] = b"__o__";

/// Prefix hashed with the receiver key to form the obfuscation key.
pub const OBFUSCATION_KEY_PREFIX: &str = "PK_";

/// Event name emitted when a message is sent.
pub const EVENT_MESSAGE_SENT: &str = "DispatchMessage";

/// Event name emitted when an incentive is claimed.
pub const EVENT_INCENTIVE_CLAIMED: &str = "IncentiveClaimed";

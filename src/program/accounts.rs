//! Byte-exact account layouts of the messaging and postbox programs.

use super::layout::{ByteReader, ByteWriter};
use crate::error::{DispatchError, Result};
use crate::pubkey::Pubkey;

/// Encoding shared by every account type.
pub trait AccountLayout: Sized {
    /// Human-readable account kind for error messages.
    const KIND: &'static str;

    /// Reads the account from its raw data.
    fn read(reader: &mut ByteReader<'_>) -> Result<Self>;

    /// Writes the account data.
    fn write(&self, writer: &mut ByteWriter);

    /// Parses raw account data.
    fn from_bytes(data: &[u8]) -> Result<Self> {
        let mut reader = ByteReader::new(data);
        Self::read(&mut reader).map_err(|e| {
            DispatchError::serialization(format!("Malformed {} account: {}", Self::KIND, e))
        })
    }

    /// Serializes to raw account data.
    fn to_bytes(&self) -> Vec<u8> {
        let mut writer = ByteWriter::new();
        self.write(&mut writer);
        writer.into_bytes()
    }
}

// =============================================================================
// Messaging
// =============================================================================

/// Per-receiver counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct MailboxAccount {
    /// Slots ever allocated.
    pub message_count: u32,
    /// Read pointer; every slot below it has been consumed.
    pub read_message_count: u32,
}

impl AccountLayout for MailboxAccount {
    const KIND: &'static str = "mailbox";

    fn read(r: &mut ByteReader<'_>) -> Result<Self> {
        Ok(Self {
            message_count: r.read_u32()?,
            read_message_count: r.read_u32()?,
        })
    }

    fn write(&self, w: &mut ByteWriter) {
        w.put_u32(self.message_count).put_u32(self.read_message_count);
    }
}

/// Token deposit attached to a message for the receiver to claim.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Incentive {
    /// Token mint.
    pub mint: Pubkey,
    /// Amount in base units.
    pub amount: u64,
}

/// One message slot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessageAccount {
    /// Logical author.
    pub sender: Pubkey,
    /// Account that paid for creation and receives the rent on close.
    pub payer: Pubkey,
    /// Encoded payload.
    pub data: Vec<u8>,
    /// Unclaimed incentive, if any.
    pub incentive: Option<Incentive>,
}

impl AccountLayout for MessageAccount {
    const KIND: &'static str = "message";

    fn read(r: &mut ByteReader<'_>) -> Result<Self> {
        let sender = r.read_pubkey()?;
        let payer = r.read_pubkey()?;
        let data = r.read_bytes()?;
        let incentive = if r.read_option_tag()? {
            Some(Incentive {
                mint: r.read_pubkey()?,
                amount: r.read_u64()?,
            })
        } else {
            None
        };
        Ok(Self {
            sender,
            payer,
            data,
            incentive,
        })
    }

    fn write(&self, w: &mut ByteWriter) {
        w.put_pubkey(&self.sender)
            .put_pubkey(&self.payer)
            .put_bytes(&self.data);
        match &self.incentive {
            Some(incentive) => {
                w.put_u8(1)
                    .put_pubkey(&incentive.mint)
                    .put_u64(incentive.amount);
            }
            None => {
                w.put_u8(0);
            }
        }
    }
}

// =============================================================================
// Postbox
// =============================================================================

/// Predicate controlling who may post or vote.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum PostRestriction {
    /// Anyone may post.
    #[default]
    None,
    /// Holder of at least `amount` of a fungible mint.
    TokenOwnership {
        /// Required mint.
        mint: Pubkey,
        /// Minimum balance.
        amount: u64,
    },
    /// Holder of a verified NFT from a collection.
    NftOwnership {
        /// Required collection.
        collection_id: Pubkey,
    },
    /// Holder of a verified NFT from any listed collection.
    NftListAnyOwnership {
        /// Accepted collections.
        collection_ids: Vec<Pubkey>,
    },
}

impl PostRestriction {
    /// Returns true for the unrestricted variant.
    pub fn is_none(&self) -> bool {
        matches!(self, PostRestriction::None)
    }

    /// Number of extra accounts the program needs to check this restriction.
    pub fn extra_account_count(&self) -> usize {
        match self {
            PostRestriction::None => 0,
            PostRestriction::TokenOwnership { .. } => 1,
            PostRestriction::NftOwnership { .. } | PostRestriction::NftListAnyOwnership { .. } => 2,
        }
    }

    pub(crate) fn read(r: &mut ByteReader<'_>) -> Result<Self> {
        match r.read_u8()? {
            0 => Ok(PostRestriction::None),
            1 => Ok(PostRestriction::TokenOwnership {
                mint: r.read_pubkey()?,
                amount: r.read_u64()?,
            }),
            2 => Ok(PostRestriction::NftOwnership {
                collection_id: r.read_pubkey()?,
            }),
            3 => Ok(PostRestriction::NftListAnyOwnership {
                collection_ids: r.read_pubkey_list()?,
            }),
            tag => Err(DispatchError::serialization(format!(
                "Unknown restriction tag: {}",
                tag
            ))),
        }
    }

    pub(crate) fn write(&self, w: &mut ByteWriter) {
        match self {
            PostRestriction::None => {
                w.put_u8(0);
            }
            PostRestriction::TokenOwnership { mint, amount } => {
                w.put_u8(1).put_pubkey(mint).put_u64(*amount);
            }
            PostRestriction::NftOwnership { collection_id } => {
                w.put_u8(2).put_pubkey(collection_id);
            }
            PostRestriction::NftListAnyOwnership { collection_ids } => {
                w.put_u8(3).put_pubkey_list(collection_ids);
            }
        }
    }

    pub(crate) fn read_option(r: &mut ByteReader<'_>) -> Result<Option<Self>> {
        if r.read_option_tag()? {
            Ok(Some(Self::read(r)?))
        } else {
            Ok(None)
        }
    }

    pub(crate) fn write_option(value: Option<&Self>, w: &mut ByteWriter) {
        match value {
            Some(restriction) => {
                w.put_u8(1);
                restriction.write(w);
            }
            None => {
                w.put_u8(0);
            }
        }
    }
}

/// Root of a subject's post tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PostboxAccount {
    /// Next unused top-level slot.
    pub max_child_id: u32,
    /// Mint of the moderator credential.
    pub moderator_mint: Pubkey,
    /// Owner list settings account.
    pub owner_info_account: Pubkey,
    /// Forum-level restriction settings account.
    pub post_restrictions_account: Pubkey,
}

impl AccountLayout for PostboxAccount {
    const KIND: &'static str = "postbox";

    fn read(r: &mut ByteReader<'_>) -> Result<Self> {
        Ok(Self {
            max_child_id: r.read_u32()?,
            moderator_mint: r.read_pubkey()?,
            owner_info_account: r.read_pubkey()?,
            post_restrictions_account: r.read_pubkey()?,
        })
    }

    fn write(&self, w: &mut ByteWriter) {
        w.put_u32(self.max_child_id)
            .put_pubkey(&self.moderator_mint)
            .put_pubkey(&self.owner_info_account)
            .put_pubkey(&self.post_restrictions_account);
    }
}

/// A topic, post or reply.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PostAccount {
    /// Author.
    pub poster: Pubkey,
    /// Encoded payload.
    pub data: Vec<u8>,
    /// Next unused reply slot.
    pub max_reply_id: u32,
    /// Up-vote tally.
    pub up_votes: u32,
    /// Down-vote tally.
    pub down_votes: u32,
    /// Parent post, for replies.
    pub reply_to: Option<Pubkey>,
    /// Restriction on replies to this post.
    pub restriction: Option<PostRestriction>,
}

impl AccountLayout for PostAccount {
    const KIND: &'static str = "post";

    fn read(r: &mut ByteReader<'_>) -> Result<Self> {
        Ok(Self {
            poster: r.read_pubkey()?,
            data: r.read_bytes()?,
            max_reply_id: r.read_u32()?,
            up_votes: r.read_u32()?,
            down_votes: r.read_u32()?,
            reply_to: r.read_option_pubkey()?,
            restriction: PostRestriction::read_option(r)?,
        })
    }

    fn write(&self, w: &mut ByteWriter) {
        w.put_pubkey(&self.poster)
            .put_bytes(&self.data)
            .put_u32(self.max_reply_id)
            .put_u32(self.up_votes)
            .put_u32(self.down_votes)
            .put_option_pubkey(self.reply_to.as_ref());
        PostRestriction::write_option(self.restriction.as_ref(), w);
    }
}

/// Direction of a vote.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum VoteDirection {
    /// Up-vote.
    Up,
    /// Down-vote.
    Down,
}

impl VoteDirection {
    /// Returns true for an up-vote.
    pub fn is_up(&self) -> bool {
        matches!(self, VoteDirection::Up)
    }

    /// Builds a direction from the wire flag.
    pub fn from_up(up: bool) -> Self {
        if up {
            VoteDirection::Up
        } else {
            VoteDirection::Down
        }
    }
}

/// One voter's vote on one post.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VoteEntryAccount {
    /// Voted post.
    pub post: Pubkey,
    /// Voter.
    pub voter: Pubkey,
    /// Current direction.
    pub direction: VoteDirection,
}

impl AccountLayout for VoteEntryAccount {
    const KIND: &'static str = "vote entry";

    fn read(r: &mut ByteReader<'_>) -> Result<Self> {
        Ok(Self {
            post: r.read_pubkey()?,
            voter: r.read_pubkey()?,
            direction: VoteDirection::from_up(r.read_bool()?),
        })
    }

    fn write(&self, w: &mut ByteWriter) {
        w.put_pubkey(&self.post)
            .put_pubkey(&self.voter)
            .put_bool(self.direction.is_up());
    }
}

/// Owner list settings.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct OwnerInfoAccount {
    /// Keys allowed to change settings and appoint moderators.
    pub owners: Vec<Pubkey>,
}

impl AccountLayout for OwnerInfoAccount {
    const KIND: &'static str = "owner info";

    fn read(r: &mut ByteReader<'_>) -> Result<Self> {
        Ok(Self {
            owners: r.read_pubkey_list()?,
        })
    }

    fn write(&self, w: &mut ByteWriter) {
        w.put_pubkey_list(&self.owners);
    }
}

/// Title and description settings.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct DescriptionAccount {
    /// Forum title.
    pub title: String,
    /// Forum description.
    pub desc: String,
}

impl AccountLayout for DescriptionAccount {
    const KIND: &'static str = "description";

    fn read(r: &mut ByteReader<'_>) -> Result<Self> {
        Ok(Self {
            title: r.read_string()?,
            desc: r.read_string()?,
        })
    }

    fn write(&self, w: &mut ByteWriter) {
        w.put_string(&self.title).put_string(&self.desc);
    }
}

/// Forum-level restriction settings.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct RestrictionAccount {
    /// Restriction applied to topics without their own.
    pub restriction: PostRestriction,
}

impl AccountLayout for RestrictionAccount {
    const KIND: &'static str = "post restriction";

    fn read(r: &mut ByteReader<'_>) -> Result<Self> {
        Ok(Self {
            restriction: PostRestriction::read(r)?,
        })
    }

    fn write(&self, w: &mut ByteWriter) {
        self.restriction.write(w);
    }
}

/// Local counter of one allocation bucket.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct BucketCounterAccount {
    /// Highest local id allocated so far (0 when empty).
    pub max_post_id: u32,
    /// Slots in this bucket.
    pub capacity: u32,
}

impl AccountLayout for BucketCounterAccount {
    const KIND: &'static str = "bucket counter";

    fn read(r: &mut ByteReader<'_>) -> Result<Self> {
        Ok(Self {
            max_post_id: r.read_u32()?,
            capacity: r.read_u32()?,
        })
    }

    fn write(&self, w: &mut ByteWriter) {
        w.put_u32(self.max_post_id).put_u32(self.capacity);
    }
}

// =============================================================================
// Token program
// =============================================================================

/// Size of a token account.
pub const TOKEN_ACCOUNT_LEN: usize = 165;

/// Token account state byte for an initialized account.
const TOKEN_STATE_INITIALIZED: u8 = 1;

/// The fields of a token account this client reads.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TokenAccount {
    /// Mint of the held token.
    pub mint: Pubkey,
    /// Owner of the balance.
    pub owner: Pubkey,
    /// Balance in base units.
    pub amount: u64,
}

impl AccountLayout for TokenAccount {
    const KIND: &'static str = "token";

    fn read(r: &mut ByteReader<'_>) -> Result<Self> {
        if r.remaining() < TOKEN_ACCOUNT_LEN {
            return Err(DispatchError::serialization(format!(
                "Token account is {} bytes, expected {}",
                r.remaining(),
                TOKEN_ACCOUNT_LEN
            )));
        }
        Ok(Self {
            mint: r.read_pubkey()?,
            owner: r.read_pubkey()?,
            amount: r.read_u64()?,
        })
    }

    fn write(&self, w: &mut ByteWriter) {
        w.put_pubkey(&self.mint)
            .put_pubkey(&self.owner)
            .put_u64(self.amount)
            // delegate: COption<Pubkey>
            .put_u32(0)
            .put_raw(&[0u8; 32])
            .put_u8(TOKEN_STATE_INITIALIZED)
            // is_native: COption<u64>
            .put_u32(0)
            .put_u64(0)
            // delegated_amount
            .put_u64(0)
            // close_authority: COption<Pubkey>
            .put_u32(0)
            .put_raw(&[0u8; 32]);
    }
}

//! Instruction encoding for the messaging and postbox programs.
//!
//! Instruction data is an 8-byte discriminator, the first eight bytes of
//! `sha256("global:<name>")`, followed by the little-endian arguments.
//! Account order for every instruction is fixed by the builder functions
//! below and documented on each enum variant.

use super::accounts::{DescriptionAccount, PostRestriction};
use super::layout::{ByteReader, ByteWriter};
use crate::constants::{ASSOCIATED_TOKEN_PROGRAM_ID, SYSTEM_PROGRAM_ID, TOKEN_PROGRAM_ID};
use crate::error::{DispatchError, Result};
use crate::ledger::{AccountMeta, Instruction};
use crate::pubkey::Pubkey;
use sha2::{Digest, Sha256};

/// Discriminator length.
pub const DISCRIMINATOR_LEN: usize = 8;

/// Computes the discriminator of an instruction name.
pub fn discriminator(name: &str) -> [u8; DISCRIMINATOR_LEN] {
    let digest = Sha256::digest(format!("global:{}", name).as_bytes());
    let mut out = [0u8; DISCRIMINATOR_LEN];
    out.copy_from_slice(&digest[..DISCRIMINATOR_LEN]);
    out
}

fn split_discriminator(data: &[u8]) -> Result<([u8; DISCRIMINATOR_LEN], ByteReader<'_>)> {
    if data.len() < DISCRIMINATOR_LEN {
        return Err(DispatchError::serialization("Instruction data too short"));
    }
    let mut disc = [0u8; DISCRIMINATOR_LEN];
    disc.copy_from_slice(&data[..DISCRIMINATOR_LEN]);
    Ok((disc, ByteReader::new(&data[DISCRIMINATOR_LEN..])))
}

fn finish(reader: &ByteReader<'_>, name: &str) -> Result<()> {
    if reader.remaining() != 0 {
        return Err(DispatchError::serialization(format!(
            "{} bytes of trailing data after {}",
            reader.remaining(),
            name
        )));
    }
    Ok(())
}

// =============================================================================
// Messaging program
// =============================================================================

/// Messaging program instructions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MessagingInstruction {
    /// Appends a message at the mailbox's `message_count`.
    ///
    /// Accounts: mailbox (w), receiver, message (w), payer (s, w), sender,
    /// treasury (w), system program.
    SendMessage {
        /// Encoded payload.
        data: Vec<u8>,
    },
    /// As `SendMessage`, additionally escrowing a token deposit.
    ///
    /// Extra accounts: incentive mint, payer token account (w), escrow (w),
    /// token program.
    SendMessageWithIncentive {
        /// Encoded payload.
        data: Vec<u8>,
        /// Deposit in base units.
        incentive_amount: u64,
    },
    /// Closes the message at the read pointer and advances it.
    ///
    /// Accounts: mailbox (w), receiver (s), message (w), rent destination (w),
    /// system program.
    CloseMessage,
    /// Closes the message at `index`; only the receiver or sender may do so.
    ///
    /// Accounts: mailbox (w), receiver, deleter (s), message (w), rent
    /// destination (w), system program.
    DeleteMessage {
        /// Slot to delete.
        index: u32,
    },
    /// Pays out a message's escrowed incentive to the receiver and closes it.
    ///
    /// Accounts: mailbox (w), receiver (s, w), message (w), rent destination
    /// (w), escrow (w), receiver token account (w), token program, system
    /// program.
    ClaimIncentive {
        /// Slot holding the incentive.
        index: u32,
    },
}

impl MessagingInstruction {
    /// Instruction name used for the discriminator.
    pub fn name(&self) -> &'static str {
        match self {
            Self::SendMessage { .. } => "send_message",
            Self::SendMessageWithIncentive { .. } => "send_message_with_incentive",
            Self::CloseMessage => "close_message",
            Self::DeleteMessage { .. } => "delete_message",
            Self::ClaimIncentive { .. } => "claim_incentive",
        }
    }

    /// Serializes the instruction data.
    pub fn encode(&self) -> Vec<u8> {
        let mut w = ByteWriter::new();
        w.put_raw(&discriminator(self.name()));
        match self {
            Self::SendMessage { data } => {
                w.put_bytes(data);
            }
            Self::SendMessageWithIncentive {
                data,
                incentive_amount,
            } => {
                w.put_bytes(data).put_u64(*incentive_amount);
            }
            Self::CloseMessage => {}
            Self::DeleteMessage { index } | Self::ClaimIncentive { index } => {
                w.put_u32(*index);
            }
        }
        w.into_bytes()
    }

    /// Parses instruction data.
    pub fn decode(data: &[u8]) -> Result<Self> {
        let (disc, mut r) = split_discriminator(data)?;
        let ix = if disc == discriminator("send_message") {
            Self::SendMessage {
                data: r.read_bytes()?,
            }
        } else if disc == discriminator("send_message_with_incentive") {
            Self::SendMessageWithIncentive {
                data: r.read_bytes()?,
                incentive_amount: r.read_u64()?,
            }
        } else if disc == discriminator("close_message") {
            Self::CloseMessage
        } else if disc == discriminator("delete_message") {
            Self::DeleteMessage {
                index: r.read_u32()?,
            }
        } else if disc == discriminator("claim_incentive") {
            Self::ClaimIncentive {
                index: r.read_u32()?,
            }
        } else {
            return Err(DispatchError::serialization(
                "Unknown messaging instruction discriminator",
            ));
        };
        finish(&r, ix.name())?;
        Ok(ix)
    }
}

/// Keys for a send.
#[derive(Debug, Clone, Copy)]
pub struct SendMessageKeys {
    /// Receiver's mailbox.
    pub mailbox: Pubkey,
    /// Mailbox owner.
    pub receiver: Pubkey,
    /// Slot being created.
    pub message: Pubkey,
    /// Rent and fee payer.
    pub payer: Pubkey,
    /// Logical author.
    pub sender: Pubkey,
    /// Fee destination.
    pub treasury: Pubkey,
}

/// Keys for an incentive deposit.
#[derive(Debug, Clone, Copy)]
pub struct IncentiveKeys {
    /// Token mint.
    pub mint: Pubkey,
    /// Payer's token account the deposit is drawn from.
    pub payer_token_account: Pubkey,
    /// Escrow holding the deposit until claimed.
    pub escrow: Pubkey,
    /// Deposit in base units.
    pub amount: u64,
}

/// Builds a send instruction.
pub fn send_message(
    program_id: &Pubkey,
    keys: &SendMessageKeys,
    data: Vec<u8>,
    incentive: Option<&IncentiveKeys>,
) -> Instruction {
    let mut accounts = vec![
        AccountMeta::new(keys.mailbox, false),
        AccountMeta::new_readonly(keys.receiver, false),
        AccountMeta::new(keys.message, false),
        AccountMeta::new(keys.payer, true),
        AccountMeta::new_readonly(keys.sender, false),
        AccountMeta::new(keys.treasury, false),
        AccountMeta::new_readonly(*SYSTEM_PROGRAM_ID, false),
    ];
    let ix = match incentive {
        Some(incentive) => {
            accounts.extend([
                AccountMeta::new_readonly(incentive.mint, false),
                AccountMeta::new(incentive.payer_token_account, false),
                AccountMeta::new(incentive.escrow, false),
                AccountMeta::new_readonly(*TOKEN_PROGRAM_ID, false),
            ]);
            MessagingInstruction::SendMessageWithIncentive {
                data,
                incentive_amount: incentive.amount,
            }
        }
        None => MessagingInstruction::SendMessage { data },
    };
    Instruction {
        program_id: *program_id,
        accounts,
        data: ix.encode(),
    }
}

/// Builds a pop (close at read pointer) instruction.
pub fn close_message(
    program_id: &Pubkey,
    mailbox: &Pubkey,
    receiver: &Pubkey,
    message: &Pubkey,
    rent_destination: &Pubkey,
) -> Instruction {
    Instruction {
        program_id: *program_id,
        accounts: vec![
            AccountMeta::new(*mailbox, false),
            AccountMeta::new_readonly(*receiver, true),
            AccountMeta::new(*message, false),
            AccountMeta::new(*rent_destination, false),
            AccountMeta::new_readonly(*SYSTEM_PROGRAM_ID, false),
        ],
        data: MessagingInstruction::CloseMessage.encode(),
    }
}

/// Keys for deleting an arbitrary slot.
#[derive(Debug, Clone, Copy)]
pub struct DeleteMessageKeys {
    /// Receiver's mailbox.
    pub mailbox: Pubkey,
    /// Mailbox owner.
    pub receiver: Pubkey,
    /// Receiver or sender performing the delete.
    pub deleter: Pubkey,
    /// Slot being closed.
    pub message: Pubkey,
    /// Original payer.
    pub rent_destination: Pubkey,
}

/// Builds a delete instruction.
pub fn delete_message(program_id: &Pubkey, keys: &DeleteMessageKeys, index: u32) -> Instruction {
    Instruction {
        program_id: *program_id,
        accounts: vec![
            AccountMeta::new(keys.mailbox, false),
            AccountMeta::new_readonly(keys.receiver, false),
            AccountMeta::new_readonly(keys.deleter, true),
            AccountMeta::new(keys.message, false),
            AccountMeta::new(keys.rent_destination, false),
            AccountMeta::new_readonly(*SYSTEM_PROGRAM_ID, false),
        ],
        data: MessagingInstruction::DeleteMessage { index }.encode(),
    }
}

/// Keys for claiming an incentive.
#[derive(Debug, Clone, Copy)]
pub struct ClaimIncentiveKeys {
    /// Receiver's mailbox.
    pub mailbox: Pubkey,
    /// Mailbox owner and claimant.
    pub receiver: Pubkey,
    /// Slot holding the incentive.
    pub message: Pubkey,
    /// Original payer.
    pub rent_destination: Pubkey,
    /// Escrow holding the deposit.
    pub escrow: Pubkey,
    /// Receiver's token account for the mint.
    pub receiver_token_account: Pubkey,
}

/// Builds a claim-incentive instruction.
pub fn claim_incentive(program_id: &Pubkey, keys: &ClaimIncentiveKeys, index: u32) -> Instruction {
    Instruction {
        program_id: *program_id,
        accounts: vec![
            AccountMeta::new(keys.mailbox, false),
            AccountMeta::new(keys.receiver, true),
            AccountMeta::new(keys.message, false),
            AccountMeta::new(keys.rent_destination, false),
            AccountMeta::new(keys.escrow, false),
            AccountMeta::new(keys.receiver_token_account, false),
            AccountMeta::new_readonly(*TOKEN_PROGRAM_ID, false),
            AccountMeta::new_readonly(*SYSTEM_PROGRAM_ID, false),
        ],
        data: MessagingInstruction::ClaimIncentive { index }.encode(),
    }
}

// =============================================================================
// Postbox program
// =============================================================================

/// One postbox setting value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SettingsData {
    /// Title and description.
    Description(DescriptionAccount),
    /// Owner list.
    OwnerInfo {
        /// New owners.
        owners: Vec<Pubkey>,
    },
    /// Forum-level restriction.
    PostRestriction {
        /// New restriction; `None` clears it.
        restriction: PostRestriction,
    },
}

impl SettingsData {
    fn write(&self, w: &mut ByteWriter) {
        match self {
            SettingsData::Description(desc) => {
                w.put_u8(0).put_string(&desc.title).put_string(&desc.desc);
            }
            SettingsData::OwnerInfo { owners } => {
                w.put_u8(1).put_pubkey_list(owners);
            }
            SettingsData::PostRestriction { restriction } => {
                w.put_u8(2);
                restriction.write(w);
            }
        }
    }

    fn read(r: &mut ByteReader<'_>) -> Result<Self> {
        match r.read_u8()? {
            0 => Ok(SettingsData::Description(DescriptionAccount {
                title: r.read_string()?,
                desc: r.read_string()?,
            })),
            1 => Ok(SettingsData::OwnerInfo {
                owners: r.read_pubkey_list()?,
            }),
            2 => Ok(SettingsData::PostRestriction {
                restriction: PostRestriction::read(r)?,
            }),
            tag => Err(DispatchError::serialization(format!(
                "Unknown settings tag: {}",
                tag
            ))),
        }
    }
}

/// Bucket a sharded post id was allocated from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BucketSlot {
    /// Bucket index.
    pub index: u32,
    /// Slots per bucket.
    pub capacity: u32,
}

/// Postbox program instructions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PostboxInstruction {
    /// Creates a postbox with its settings accounts and moderator mint.
    ///
    /// Accounts: postbox (w), payer (s, w), target, moderator mint (w),
    /// owner info (w), restriction settings (w), description (w),
    /// treasury (w), system program.
    Initialize {
        /// Postbox label; empty for a personal postbox.
        target_label: String,
        /// Initial owners.
        owners: Vec<Pubkey>,
        /// Optional title and description.
        description: Option<DescriptionAccount>,
    },
    /// Creates a post under the postbox or a parent post.
    ///
    /// Accounts: postbox (w), parent (w), post (w), poster (s, w),
    /// treasury (w), system program, restriction settings, bucket counter
    /// (w) or the system program when unbucketed, then the gating accounts
    /// (token account, and metadata for NFT restrictions).
    CreatePost {
        /// Encoded payload.
        data: Vec<u8>,
        /// Slot id being claimed.
        post_id: u32,
        /// Restriction on replies (top-level posts only).
        restriction: Option<PostRestriction>,
        /// Bucket the id was allocated from, when sharded.
        bucket: Option<BucketSlot>,
    },
    /// Replaces a post's payload.
    ///
    /// Accounts: postbox, post (w), poster (s).
    EditPost {
        /// New encoded payload.
        data: Vec<u8>,
    },
    /// Closes the signer's own post.
    ///
    /// Accounts: postbox, post (w), poster (s), rent destination (w).
    DeleteOwnPost,
    /// Closes any post, signed by a moderator credential holder.
    ///
    /// Accounts: postbox, post (w), moderator (s), moderator token account,
    /// rent destination (w).
    DeletePostByModerator,
    /// Records or flips the signer's vote.
    ///
    /// Accounts: postbox, post (w), vote entry (w), voter (s, w),
    /// treasury (w), system program, restriction settings, then the gating
    /// accounts.
    Vote {
        /// Up-vote when true.
        up: bool,
    },
    /// Mints a moderator credential to a new moderator.
    ///
    /// Accounts: postbox, owner (s, w), owner info, moderator mint (w),
    /// new moderator, new moderator token account (w), token program,
    /// associated token program, system program.
    DesignateModerator,
    /// Replaces one settings account.
    ///
    /// Accounts: postbox, owner (s, w), owner info, settings account (w),
    /// system program.
    UpdateSetting {
        /// New setting value.
        setting: SettingsData,
    },
}

impl PostboxInstruction {
    /// Instruction name used for the discriminator.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Initialize { .. } => "initialize",
            Self::CreatePost { .. } => "create_post",
            Self::EditPost { .. } => "edit_post",
            Self::DeleteOwnPost => "delete_own_post",
            Self::DeletePostByModerator => "delete_post_by_moderator",
            Self::Vote { .. } => "vote",
            Self::DesignateModerator => "designate_moderator",
            Self::UpdateSetting { .. } => "update_setting",
        }
    }

    /// Serializes the instruction data.
    pub fn encode(&self) -> Vec<u8> {
        let mut w = ByteWriter::new();
        w.put_raw(&discriminator(self.name()));
        match self {
            Self::Initialize {
                target_label,
                owners,
                description,
            } => {
                w.put_string(target_label).put_pubkey_list(owners);
                match description {
                    Some(desc) => {
                        w.put_u8(1).put_string(&desc.title).put_string(&desc.desc);
                    }
                    None => {
                        w.put_u8(0);
                    }
                }
            }
            Self::CreatePost {
                data,
                post_id,
                restriction,
                bucket,
            } => {
                w.put_bytes(data).put_u32(*post_id);
                PostRestriction::write_option(restriction.as_ref(), &mut w);
                match bucket {
                    Some(slot) => {
                        w.put_u8(1).put_u32(slot.index).put_u32(slot.capacity);
                    }
                    None => {
                        w.put_u8(0);
                    }
                }
            }
            Self::EditPost { data } => {
                w.put_bytes(data);
            }
            Self::DeleteOwnPost | Self::DeletePostByModerator | Self::DesignateModerator => {}
            Self::Vote { up } => {
                w.put_bool(*up);
            }
            Self::UpdateSetting { setting } => setting.write(&mut w),
        }
        w.into_bytes()
    }

    /// Parses instruction data.
    pub fn decode(data: &[u8]) -> Result<Self> {
        let (disc, mut r) = split_discriminator(data)?;
        let ix = if disc == discriminator("initialize") {
            let target_label = r.read_string()?;
            let owners = r.read_pubkey_list()?;
            let description = if r.read_option_tag()? {
                Some(DescriptionAccount {
                    title: r.read_string()?,
                    desc: r.read_string()?,
                })
            } else {
                None
            };
            Self::Initialize {
                target_label,
                owners,
                description,
            }
        } else if disc == discriminator("create_post") {
            let data = r.read_bytes()?;
            let post_id = r.read_u32()?;
            let restriction = PostRestriction::read_option(&mut r)?;
            let bucket = if r.read_option_tag()? {
                Some(BucketSlot {
                    index: r.read_u32()?,
                    capacity: r.read_u32()?,
                })
            } else {
                None
            };
            Self::CreatePost {
                data,
                post_id,
                restriction,
                bucket,
            }
        } else if disc == discriminator("edit_post") {
            Self::EditPost {
                data: r.read_bytes()?,
            }
        } else if disc == discriminator("delete_own_post") {
            Self::DeleteOwnPost
        } else if disc == discriminator("delete_post_by_moderator") {
            Self::DeletePostByModerator
        } else if disc == discriminator("vote") {
            Self::Vote { up: r.read_bool()? }
        } else if disc == discriminator("designate_moderator") {
            Self::DesignateModerator
        } else if disc == discriminator("update_setting") {
            Self::UpdateSetting {
                setting: SettingsData::read(&mut r)?,
            }
        } else {
            return Err(DispatchError::serialization(
                "Unknown postbox instruction discriminator",
            ));
        };
        finish(&r, ix.name())?;
        Ok(ix)
    }
}

/// Keys for initializing a postbox.
#[derive(Debug, Clone, Copy)]
pub struct InitializeKeys {
    /// Postbox root.
    pub postbox: Pubkey,
    /// Payer and signer.
    pub payer: Pubkey,
    /// Subject key.
    pub target: Pubkey,
    /// Moderator credential mint.
    pub moderator_mint: Pubkey,
    /// Owner list account.
    pub owner_info: Pubkey,
    /// Forum restriction account.
    pub post_restrictions: Pubkey,
    /// Description account.
    pub description: Pubkey,
    /// Fee destination.
    pub treasury: Pubkey,
}

/// Builds a postbox initialization instruction.
pub fn initialize_postbox(
    program_id: &Pubkey,
    keys: &InitializeKeys,
    target_label: String,
    owners: Vec<Pubkey>,
    description: Option<DescriptionAccount>,
) -> Instruction {
    Instruction {
        program_id: *program_id,
        accounts: vec![
            AccountMeta::new(keys.postbox, false),
            AccountMeta::new(keys.payer, true),
            AccountMeta::new_readonly(keys.target, false),
            AccountMeta::new(keys.moderator_mint, false),
            AccountMeta::new(keys.owner_info, false),
            AccountMeta::new(keys.post_restrictions, false),
            AccountMeta::new(keys.description, false),
            AccountMeta::new(keys.treasury, false),
            AccountMeta::new_readonly(*SYSTEM_PROGRAM_ID, false),
        ],
        data: PostboxInstruction::Initialize {
            target_label,
            owners,
            description,
        }
        .encode(),
    }
}

/// Keys for creating a post.
#[derive(Debug, Clone)]
pub struct CreatePostKeys {
    /// Postbox root.
    pub postbox: Pubkey,
    /// Postbox for top-level posts, else the parent post.
    pub parent: Pubkey,
    /// Slot being created.
    pub post: Pubkey,
    /// Author and payer.
    pub poster: Pubkey,
    /// Fee destination.
    pub treasury: Pubkey,
    /// Forum restriction account.
    pub post_restrictions: Pubkey,
    /// Bucket counter when sharded.
    pub bucket_counter: Option<Pubkey>,
    /// Accounts proving the poster satisfies the effective restriction.
    pub gating_accounts: Vec<Pubkey>,
}

/// Builds a create-post instruction.
pub fn create_post(
    program_id: &Pubkey,
    keys: &CreatePostKeys,
    data: Vec<u8>,
    post_id: u32,
    restriction: Option<PostRestriction>,
    bucket: Option<BucketSlot>,
) -> Instruction {
    let mut accounts = vec![
        AccountMeta::new(keys.postbox, false),
        AccountMeta::new(keys.parent, false),
        AccountMeta::new(keys.post, false),
        AccountMeta::new(keys.poster, true),
        AccountMeta::new(keys.treasury, false),
        AccountMeta::new_readonly(*SYSTEM_PROGRAM_ID, false),
        AccountMeta::new_readonly(keys.post_restrictions, false),
        match keys.bucket_counter {
            Some(counter) => AccountMeta::new(counter, false),
            None => AccountMeta::new_readonly(*SYSTEM_PROGRAM_ID, false),
        },
    ];
    accounts.extend(
        keys.gating_accounts
            .iter()
            .map(|key| AccountMeta::new_readonly(*key, false)),
    );
    Instruction {
        program_id: *program_id,
        accounts,
        data: PostboxInstruction::CreatePost {
            data,
            post_id,
            restriction,
            bucket,
        }
        .encode(),
    }
}

/// Number of fixed accounts before the gating accounts of `create_post`.
pub const CREATE_POST_FIXED_ACCOUNTS: usize = 8;

/// Number of fixed accounts before the gating accounts of `vote`.
pub const VOTE_FIXED_ACCOUNTS: usize = 7;

/// Builds an edit-post instruction.
pub fn edit_post(
    program_id: &Pubkey,
    postbox: &Pubkey,
    post: &Pubkey,
    poster: &Pubkey,
    data: Vec<u8>,
) -> Instruction {
    Instruction {
        program_id: *program_id,
        accounts: vec![
            AccountMeta::new_readonly(*postbox, false),
            AccountMeta::new(*post, false),
            AccountMeta::new_readonly(*poster, true),
        ],
        data: PostboxInstruction::EditPost { data }.encode(),
    }
}

/// Builds a delete-own-post instruction.
pub fn delete_own_post(
    program_id: &Pubkey,
    postbox: &Pubkey,
    post: &Pubkey,
    poster: &Pubkey,
    rent_destination: &Pubkey,
) -> Instruction {
    Instruction {
        program_id: *program_id,
        accounts: vec![
            AccountMeta::new_readonly(*postbox, false),
            AccountMeta::new(*post, false),
            AccountMeta::new_readonly(*poster, true),
            AccountMeta::new(*rent_destination, false),
        ],
        data: PostboxInstruction::DeleteOwnPost.encode(),
    }
}

/// Builds a moderator delete instruction.
pub fn delete_post_by_moderator(
    program_id: &Pubkey,
    postbox: &Pubkey,
    post: &Pubkey,
    moderator: &Pubkey,
    moderator_token_account: &Pubkey,
    rent_destination: &Pubkey,
) -> Instruction {
    Instruction {
        program_id: *program_id,
        accounts: vec![
            AccountMeta::new_readonly(*postbox, false),
            AccountMeta::new(*post, false),
            AccountMeta::new_readonly(*moderator, true),
            AccountMeta::new_readonly(*moderator_token_account, false),
            AccountMeta::new(*rent_destination, false),
        ],
        data: PostboxInstruction::DeletePostByModerator.encode(),
    }
}

/// Keys for voting.
#[derive(Debug, Clone)]
pub struct VoteKeys {
    /// Postbox root.
    pub postbox: Pubkey,
    /// Voted post.
    pub post: Pubkey,
    /// Voter's entry for the post.
    pub vote_entry: Pubkey,
    /// Voter and payer.
    pub voter: Pubkey,
    /// Fee destination.
    pub treasury: Pubkey,
    /// Forum restriction account.
    pub post_restrictions: Pubkey,
    /// Accounts proving the voter satisfies the effective restriction.
    pub gating_accounts: Vec<Pubkey>,
}

/// Builds a vote instruction.
pub fn vote(program_id: &Pubkey, keys: &VoteKeys, up: bool) -> Instruction {
    let mut accounts = vec![
        AccountMeta::new_readonly(keys.postbox, false),
        AccountMeta::new(keys.post, false),
        AccountMeta::new(keys.vote_entry, false),
        AccountMeta::new(keys.voter, true),
        AccountMeta::new(keys.treasury, false),
        AccountMeta::new_readonly(*SYSTEM_PROGRAM_ID, false),
        AccountMeta::new_readonly(keys.post_restrictions, false),
    ];
    accounts.extend(
        keys.gating_accounts
            .iter()
            .map(|key| AccountMeta::new_readonly(*key, false)),
    );
    Instruction {
        program_id: *program_id,
        accounts,
        data: PostboxInstruction::Vote { up }.encode(),
    }
}

/// Keys for appointing a moderator.
#[derive(Debug, Clone, Copy)]
pub struct DesignateModeratorKeys {
    /// Postbox root.
    pub postbox: Pubkey,
    /// Signing owner.
    pub owner: Pubkey,
    /// Owner list account.
    pub owner_info: Pubkey,
    /// Moderator credential mint.
    pub moderator_mint: Pubkey,
    /// Appointed key.
    pub new_moderator: Pubkey,
    /// Appointed key's credential token account.
    pub new_moderator_token_account: Pubkey,
}

/// Builds a designate-moderator instruction.
pub fn designate_moderator(program_id: &Pubkey, keys: &DesignateModeratorKeys) -> Instruction {
    Instruction {
        program_id: *program_id,
        accounts: vec![
            AccountMeta::new_readonly(keys.postbox, false),
            AccountMeta::new(keys.owner, true),
            AccountMeta::new_readonly(keys.owner_info, false),
            AccountMeta::new(keys.moderator_mint, false),
            AccountMeta::new_readonly(keys.new_moderator, false),
            AccountMeta::new(keys.new_moderator_token_account, false),
            AccountMeta::new_readonly(*TOKEN_PROGRAM_ID, false),
            AccountMeta::new_readonly(*ASSOCIATED_TOKEN_PROGRAM_ID, false),
            AccountMeta::new_readonly(*SYSTEM_PROGRAM_ID, false),
        ],
        data: PostboxInstruction::DesignateModerator.encode(),
    }
}

/// Builds an update-setting instruction.
pub fn update_setting(
    program_id: &Pubkey,
    postbox: &Pubkey,
    owner: &Pubkey,
    owner_info: &Pubkey,
    settings_account: &Pubkey,
    setting: SettingsData,
) -> Instruction {
    Instruction {
        program_id: *program_id,
        accounts: vec![
            AccountMeta::new_readonly(*postbox, false),
            AccountMeta::new(*owner, true),
            AccountMeta::new_readonly(*owner_info, false),
            AccountMeta::new(*settings_account, false),
            AccountMeta::new_readonly(*SYSTEM_PROGRAM_ID, false),
        ],
        data: PostboxInstruction::UpdateSetting { setting }.encode(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_discriminator_is_stable() {
        assert_eq!(discriminator("send_message"), discriminator("send_message"));
        assert_ne!(discriminator("send_message"), discriminator("close_message"));
    }

    #[test]
    fn test_messaging_decode_matches_encode() {
        let ix = MessagingInstruction::SendMessageWithIncentive {
            data: vec![1, 2, 3],
            incentive_amount: 99,
        };
        assert_eq!(MessagingInstruction::decode(&ix.encode()).unwrap(), ix);
        let ix = MessagingInstruction::DeleteMessage { index: 7 };
        assert_eq!(MessagingInstruction::decode(&ix.encode()).unwrap(), ix);
    }

    #[test]
    fn test_create_post_args() {
        let ix = PostboxInstruction::CreatePost {
            data: b"x".to_vec(),
            post_id: 11,
            restriction: Some(PostRestriction::NftOwnership {
                collection_id: Pubkey::new_unique(),
            }),
            bucket: Some(BucketSlot {
                index: 1,
                capacity: 10,
            }),
        };
        assert_eq!(PostboxInstruction::decode(&ix.encode()).unwrap(), ix);
    }

    #[test]
    fn test_trailing_bytes_rejected() {
        let mut data = MessagingInstruction::CloseMessage.encode();
        data.push(0);
        assert!(MessagingInstruction::decode(&data).is_err());
    }

    #[test]
    fn test_unknown_discriminator() {
        assert!(PostboxInstruction::decode(&[0u8; 8]).is_err());
        assert!(PostboxInstruction::decode(&[0u8; 3]).is_err());
    }

    #[test]
    fn test_send_builder_marks_payer_signer() {
        let keys = SendMessageKeys {
            mailbox: Pubkey::new_unique(),
            receiver: Pubkey::new_unique(),
            message: Pubkey::new_unique(),
            payer: Pubkey::new_unique(),
            sender: Pubkey::new_unique(),
            treasury: Pubkey::new_unique(),
        };
        let ix = send_message(&Pubkey::new_unique(), &keys, vec![], None);
        assert_eq!(ix.accounts.len(), 7);
        assert!(ix.accounts[3].is_signer);
        assert!(!ix.accounts[4].is_signer);
    }
}

//! On-ledger program surface: account layouts, instructions and error codes
//! of the messaging and postbox programs.

pub mod accounts;
pub mod errors;
pub mod instructions;
pub mod layout;

pub use accounts::{
    AccountLayout, BucketCounterAccount, DescriptionAccount, Incentive, MailboxAccount,
    MessageAccount, OwnerInfoAccount, PostAccount, PostRestriction, PostboxAccount,
    RestrictionAccount, TokenAccount, VoteDirection, VoteEntryAccount,
};
pub use errors::{decode_program_error, ProgramErrorCode};
pub use instructions::{BucketSlot, MessagingInstruction, PostboxInstruction, SettingsData};

//! Program error codes and their mapping onto [`DispatchError`].
//!
//! Codes below 6000 are raised by the program framework and the system
//! program; codes from 6000 up are postbox program errors.

use crate::error::DispatchError;
use std::fmt;

/// Custom error codes surfaced by failed transactions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u32)]
pub enum ProgramErrorCode {
    /// System program: the account to create already exists.
    AccountAlreadyInUse = 0,
    /// A required signer did not sign.
    ConstraintSigner = 2002,
    /// A custom account constraint failed.
    ConstraintRaw = 2003,
    /// Account address does not match its seeds.
    ConstraintSeeds = 2006,
    /// Account address does not match the expected key.
    ConstraintAddress = 2012,
    /// The account has not been created.
    AccountNotInitialized = 3012,

    /// If no target string, target account must be the signer.
    NotPersonalPostbox = 6000,
    /// The description provided is not a description setting.
    BadDescriptionSetting = 6001,

    /// The provided post id is too large an increase.
    PostIdTooLarge = 6100,
    /// The reply-to account is not a post account.
    ReplyToNotPost = 6101,
    /// Replies cannot carry a further reply restriction.
    ReplyCannotRestrictReplies = 6102,
    /// Invalid setting type for post.
    PostInvalidSettingsType = 6103,

    /// The provided token account is not a token account.
    NotTokenAccount = 6200,
    /// Missing the token required by the restriction.
    MissingTokenRestriction = 6201,
    /// Account provided is not the expected metadata key.
    InvalidMetadataKey = 6202,
    /// The provided account is not a metadata account.
    MetadataAccountInvalid = 6203,
    /// No collection set on the metadata.
    NoCollectionOnMetadata = 6204,
    /// Missing an NFT from the collection required by the restriction.
    MissingCollectionNftRestriction = 6205,
    /// Cannot parse a setting.
    MalformedSetting = 6206,
    /// Extra accounts invalid for this restriction type.
    InvalidRestrictionExtraAccounts = 6207,
    /// Extra accounts must be supplied when a restriction applies.
    MissingRequiredOffsets = 6208,
    /// Test-only failure.
    TestError = 6209,
    /// Already voted this way on this post.
    AlreadyVoted = 6210,
}

impl ProgramErrorCode {
    const ALL: [ProgramErrorCode; 23] = [
        Self::AccountAlreadyInUse,
        Self::ConstraintSigner,
        Self::ConstraintRaw,
        Self::ConstraintSeeds,
        Self::ConstraintAddress,
        Self::AccountNotInitialized,
        Self::NotPersonalPostbox,
        Self::BadDescriptionSetting,
        Self::PostIdTooLarge,
        Self::ReplyToNotPost,
        Self::ReplyCannotRestrictReplies,
        Self::PostInvalidSettingsType,
        Self::NotTokenAccount,
        Self::MissingTokenRestriction,
        Self::InvalidMetadataKey,
        Self::MetadataAccountInvalid,
        Self::NoCollectionOnMetadata,
        Self::MissingCollectionNftRestriction,
        Self::MalformedSetting,
        Self::InvalidRestrictionExtraAccounts,
        Self::MissingRequiredOffsets,
        Self::TestError,
        Self::AlreadyVoted,
    ];

    /// Numeric code.
    pub fn code(self) -> u32 {
        self as u32
    }

    /// Looks up a known code.
    pub fn from_code(code: u32) -> Option<Self> {
        Self::ALL.iter().copied().find(|c| c.code() == code)
    }

    /// Program message for this code.
    pub fn message(self) -> &'static str {
        match self {
            Self::AccountAlreadyInUse => "Account already in use",
            Self::ConstraintSigner => "A signature constraint was violated",
            Self::ConstraintRaw => "A raw constraint was violated",
            Self::ConstraintSeeds => "A seeds constraint was violated",
            Self::ConstraintAddress => "An address constraint was violated",
            Self::AccountNotInitialized => "The program expected this account to be already initialized",
            Self::NotPersonalPostbox => "If no target string, target account must be the signer",
            Self::BadDescriptionSetting => "The description provided is not a description setting",
            Self::PostIdTooLarge => "The provided post ID is too large an increase",
            Self::ReplyToNotPost => "The reply-to account is not a Post account",
            Self::ReplyCannotRestrictReplies => "Replies cannot have a further reply restriction",
            Self::PostInvalidSettingsType => "Invalid setting type for post",
            Self::NotTokenAccount => "The provided token account is not a token account",
            Self::MissingTokenRestriction => "Missing the token required by the restriction",
            Self::InvalidMetadataKey => "Account provided is not expected metadata key",
            Self::MetadataAccountInvalid => "The provided account is not a metadata account",
            Self::NoCollectionOnMetadata => "No collection set on the metadata",
            Self::MissingCollectionNftRestriction => {
                "Missing an NFT from the collection required by the restriction"
            }
            Self::MalformedSetting => "Cannot parse a setting",
            Self::InvalidRestrictionExtraAccounts => {
                "Extra account offsets invalid for this restriction type"
            }
            Self::MissingRequiredOffsets => "Must supply offsets when a post restriction applies",
            Self::TestError => "We hit the test error",
            Self::AlreadyVoted => "Already voted on this post",
        }
    }

    /// Maps the code onto the client error taxonomy.
    pub fn into_error(self) -> DispatchError {
        let message = self.message();
        match self {
            Self::AccountAlreadyInUse | Self::ConstraintSeeds | Self::PostIdTooLarge => {
                DispatchError::conflict(format!("{} (slot taken or counter stale)", message))
            }
            Self::AlreadyVoted => DispatchError::conflict(message),
            Self::AccountNotInitialized => DispatchError::not_found(message),
            Self::ConstraintSigner => DispatchError::signing(message),
            Self::ConstraintRaw
            | Self::ConstraintAddress
            | Self::NotPersonalPostbox
            | Self::NotTokenAccount
            | Self::MissingTokenRestriction
            | Self::InvalidMetadataKey
            | Self::MetadataAccountInvalid
            | Self::NoCollectionOnMetadata
            | Self::MissingCollectionNftRestriction
            | Self::InvalidRestrictionExtraAccounts
            | Self::MissingRequiredOffsets => DispatchError::permission_denied(message),
            _ => DispatchError::Program {
                code: self.code(),
                message: message.to_string(),
            },
        }
    }
}

impl fmt::Display for ProgramErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (0x{:x}): {}", self.code(), self.code(), self.message())
    }
}

impl From<ProgramErrorCode> for DispatchError {
    fn from(code: ProgramErrorCode) -> Self {
        code.into_error()
    }
}

/// Maps a raw custom error code, known or not, onto a client error.
pub fn decode_program_error(code: u32) -> DispatchError {
    match ProgramErrorCode::from_code(code) {
        Some(known) => known.into_error(),
        None => DispatchError::Program {
            code,
            message: format!("Unknown program error 0x{:x}", code),
        },
    }
}

//! Error types for Dispatch protocol operations.

use thiserror::Error;

/// Result type alias for Dispatch operations.
pub type Result<T> = std::result::Result<T, DispatchError>;

/// Main error type for Dispatch operations.
#[derive(Error, Debug)]
pub enum DispatchError {
    /// A ledger account that the operation requires does not exist
    #[error("Not found: {0}")]
    NotFound(String),

    /// Seed material exceeded the derivation limits
    #[error("Address derivation error: {0}")]
    AddressDerivation(String),

    /// Local gating check failed or the ledger rejected a constraint
    #[error("Permission denied: {0}")]
    PermissionDenied(String),

    /// Stale counter or a concurrent allocation won the slot
    #[error("Conflict: {0}")]
    Conflict(String),

    /// Required signer or wallet capability is missing
    #[error("Signing error: {0}")]
    Signing(String),

    /// Network failure that may succeed on retry
    #[error("Transient network error: {0}")]
    TransientNetwork(String),

    /// The postbox (or other one-time account) already exists
    #[error("Already initialized: {0}")]
    AlreadyInitialized(String),

    /// A bucket's local counter would exceed its capacity
    #[error("Bucket {bucket} is full (capacity {capacity})")]
    BucketOverflow {
        /// Bucket index
        bucket: u32,
        /// Slots per bucket
        capacity: u32,
    },

    /// Decoded ledger program error without a narrower category
    #[error("Program error {code}: {message}")]
    Program {
        /// Program error code
        code: u32,
        /// Program error message
        message: String,
    },

    /// Ledger rejected the transaction for a reason we could not decode
    #[error("Ledger error: {0}")]
    Ledger(String),

    /// Payload compression or obfuscation errors
    #[error("Codec error: {0}")]
    Codec(String),

    /// Serialization/deserialization errors
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Invalid input or arguments
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl DispatchError {
    /// Creates a new not found error.
    pub fn not_found<T: ToString>(msg: T) -> Self {
        Self::NotFound(msg.to_string())
    }

    /// Creates a new address derivation error.
    pub fn address_derivation<T: ToString>(msg: T) -> Self {
        Self::AddressDerivation(msg.to_string())
    }

    /// Creates a new permission denied error.
    pub fn permission_denied<T: ToString>(msg: T) -> Self {
        Self::PermissionDenied(msg.to_string())
    }

    /// Creates a new conflict error.
    pub fn conflict<T: ToString>(msg: T) -> Self {
        Self::Conflict(msg.to_string())
    }

    /// Creates a new signing error.
    pub fn signing<T: ToString>(msg: T) -> Self {
        Self::Signing(msg.to_string())
    }

    /// Creates a new transient network error.
    pub fn transient<T: ToString>(msg: T) -> Self {
        Self::TransientNetwork(msg.to_string())
    }

    /// Creates a new already initialized error.
    pub fn already_initialized<T: ToString>(msg: T) -> Self {
        Self::AlreadyInitialized(msg.to_string())
    }

    /// Creates a new ledger error.
    pub fn ledger<T: ToString>(msg: T) -> Self {
        Self::Ledger(msg.to_string())
    }

    /// Creates a new codec error.
    pub fn codec<T: ToString>(msg: T) -> Self {
        Self::Codec(msg.to_string())
    }

    /// Creates a new serialization error.
    pub fn serialization<T: ToString>(msg: T) -> Self {
        Self::Serialization(msg.to_string())
    }

    /// Creates a new invalid input error.
    pub fn invalid_input<T: ToString>(msg: T) -> Self {
        Self::InvalidInput(msg.to_string())
    }

    /// Creates a new configuration error.
    pub fn config<T: ToString>(msg: T) -> Self {
        Self::Config(msg.to_string())
    }

    /// Returns true if retrying the same request may succeed.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::TransientNetwork(_))
    }

    /// Returns true if this error reports an absent account.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }

    /// Returns true if this error reports a lost allocation race.
    pub fn is_conflict(&self) -> bool {
        matches!(self, Self::Conflict(_))
    }
}

impl From<reqwest::Error> for DispatchError {
    fn from(err: reqwest::Error) -> Self {
        Self::TransientNetwork(err.to_string())
    }
}

impl From<serde_json::Error> for DispatchError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}

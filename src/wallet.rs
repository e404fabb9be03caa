//! Signing keys and wallet capabilities.
//!
//! A [`Wallet`] decides how transactions get signed once, at construction:
//! either a local [`Keypair`] signs and the ledger submits, or an external
//! [`WalletAdapter`] signs and submits on its own. A read-only wallet can
//! derive addresses and read state but any submission fails fast.

use crate::error::{DispatchError, Result};
use crate::ledger::{Ledger, Transaction};
use crate::pubkey::{Pubkey, Signature};
use async_trait::async_trait;
use ed25519_dalek::{Signer as _, SigningKey, SECRET_KEY_LENGTH};
use rand::rngs::OsRng;
use std::fmt;
use std::path::Path;
use std::sync::Arc;
use zeroize::Zeroizing;

/// Something that can produce a signature over a serialized message.
pub trait TransactionSigner: Send + Sync {
    /// Public key the signature verifies under.
    fn pubkey(&self) -> Pubkey;

    /// Signs the serialized transaction message.
    fn sign_message(&self, message: &[u8]) -> Result<Signature>;
}

/// An ed25519 keypair.
pub struct Keypair {
    signing_key: SigningKey,
}

impl Keypair {
    /// Generates a fresh keypair.
    pub fn generate() -> Self {
        Self {
            signing_key: SigningKey::generate(&mut OsRng),
        }
    }

    /// Creates a keypair from a 32-byte secret.
    pub fn from_secret(secret: &[u8; SECRET_KEY_LENGTH]) -> Self {
        Self {
            signing_key: SigningKey::from_bytes(secret),
        }
    }

    /// Parses the 64-byte `secret ‖ public` form, checking the halves agree.
    pub fn from_keypair_bytes(bytes: &[u8]) -> Result<Self> {
        if bytes.len() != 64 {
            return Err(DispatchError::invalid_input(format!(
                "Keypair must be 64 bytes, got {}",
                bytes.len()
            )));
        }
        let mut secret = Zeroizing::new([0u8; SECRET_KEY_LENGTH]);
        secret.copy_from_slice(&bytes[..SECRET_KEY_LENGTH]);
        let keypair = Self::from_secret(&secret);
        if keypair.pubkey().as_bytes()[..] != bytes[SECRET_KEY_LENGTH..] {
            return Err(DispatchError::invalid_input(
                "Keypair public half does not match its secret",
            ));
        }
        Ok(keypair)
    }

    /// Loads a keypair from the conventional JSON byte-array key file.
    pub fn read_from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let contents = Zeroizing::new(std::fs::read_to_string(path).map_err(|e| {
            DispatchError::config(format!("Cannot read wallet file {}: {}", path.display(), e))
        })?);
        let bytes: Zeroizing<Vec<u8>> = Zeroizing::new(serde_json::from_str(&contents).map_err(
            |e| DispatchError::config(format!("Wallet file {} is not a key array: {}", path.display(), e)),
        )?);
        Self::from_keypair_bytes(&bytes)
    }

    /// Returns the 64-byte `secret ‖ public` form.
    pub fn to_keypair_bytes(&self) -> Zeroizing<[u8; 64]> {
        Zeroizing::new(self.signing_key.to_keypair_bytes())
    }

    /// Signs arbitrary bytes.
    pub fn sign(&self, message: &[u8]) -> Signature {
        Signature::from_bytes(self.signing_key.sign(message).to_bytes())
    }
}

impl TransactionSigner for Keypair {
    fn pubkey(&self) -> Pubkey {
        Pubkey::new_from_array(self.signing_key.verifying_key().to_bytes())
    }

    fn sign_message(&self, message: &[u8]) -> Result<Signature> {
        Ok(self.sign(message))
    }
}

impl fmt::Debug for Keypair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Keypair")
            .field("pubkey", &self.pubkey())
            .finish_non_exhaustive()
    }
}

/// An external wallet that signs and submits transactions itself.
#[async_trait]
pub trait WalletAdapter: Send + Sync {
    /// The wallet's public key.
    fn pubkey(&self) -> Pubkey;

    /// Signs `tx` and submits it through `ledger`.
    async fn send_transaction(&self, tx: &Transaction, ledger: &dyn Ledger) -> Result<Signature>;
}

/// How a wallet gets transactions signed.
#[derive(Clone)]
pub enum WalletCapability {
    /// An external adapter signs and submits.
    AdapterBacked(Arc<dyn WalletAdapter>),
    /// A local key signs; the ledger submits.
    KeyBacked(Arc<Keypair>),
}

impl fmt::Debug for WalletCapability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WalletCapability::AdapterBacked(adapter) => {
                write!(f, "AdapterBacked({})", adapter.pubkey())
            }
            WalletCapability::KeyBacked(keypair) => write!(f, "KeyBacked({})", keypair.pubkey()),
        }
    }
}

/// The identity the protocol acts as.
#[derive(Debug, Clone)]
pub struct Wallet {
    pubkey: Pubkey,
    capability: Option<WalletCapability>,
}

impl Wallet {
    /// Wallet signing with a local keypair.
    pub fn from_keypair(keypair: Arc<Keypair>) -> Self {
        Self {
            pubkey: keypair.pubkey(),
            capability: Some(WalletCapability::KeyBacked(keypair)),
        }
    }

    /// Wallet delegating to an external adapter.
    pub fn from_adapter(adapter: Arc<dyn WalletAdapter>) -> Self {
        Self {
            pubkey: adapter.pubkey(),
            capability: Some(WalletCapability::AdapterBacked(adapter)),
        }
    }

    /// Wallet that can read but never sign.
    pub fn read_only(pubkey: Pubkey) -> Self {
        Self {
            pubkey,
            capability: None,
        }
    }

    /// Public key of this wallet.
    pub fn pubkey(&self) -> Pubkey {
        self.pubkey
    }

    /// Signing capability, if any.
    pub fn capability(&self) -> Option<&WalletCapability> {
        self.capability.as_ref()
    }

    /// Fails fast if this wallet cannot sign.
    pub fn ensure_can_sign(&self) -> Result<()> {
        if self.capability.is_none() {
            return Err(DispatchError::signing(format!(
                "Wallet {} is read-only and cannot sign transactions",
                self.pubkey
            )));
        }
        Ok(())
    }

    /// Signs and submits `tx` through the wallet's capability.
    pub async fn send(&self, ledger: &dyn Ledger, tx: &Transaction) -> Result<Signature> {
        match &self.capability {
            Some(WalletCapability::KeyBacked(keypair)) => {
                let signer: &dyn TransactionSigner = keypair.as_ref();
                ledger.submit_transaction(tx, &[signer]).await
            }
            Some(WalletCapability::AdapterBacked(adapter)) => {
                adapter.send_transaction(tx, ledger).await
            }
            None => Err(DispatchError::signing(format!(
                "Wallet {} is read-only and cannot sign transactions",
                self.pubkey
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ed25519_dalek::{Verifier, VerifyingKey};
    use tempfile::TempDir;

    #[test]
    fn test_signature_verifies() {
        let keypair = Keypair::generate();
        let sig = keypair.sign(b"message");
        let vk = VerifyingKey::from_bytes(keypair.pubkey().as_bytes()).unwrap();
        let sig = ed25519_dalek::Signature::from_bytes(sig.as_bytes());
        assert!(vk.verify(b"message", &sig).is_ok());
    }

    #[test]
    fn test_key_file_roundtrip() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("id.json");
        let keypair = Keypair::generate();
        let bytes: Vec<u8> = keypair.to_keypair_bytes().to_vec();
        std::fs::write(&path, serde_json::to_string(&bytes).unwrap()).unwrap();

        let loaded = Keypair::read_from_file(&path).unwrap();
        assert_eq!(loaded.pubkey(), keypair.pubkey());
    }

    #[test]
    fn test_mismatched_halves_rejected() {
        let mut bytes = Keypair::generate().to_keypair_bytes().to_vec();
        bytes[40] ^= 0xff;
        assert!(Keypair::from_keypair_bytes(&bytes).is_err());
    }

    #[test]
    fn test_missing_key_file() {
        let err = Keypair::read_from_file("/nonexistent/id.json").unwrap_err();
        assert!(matches!(err, DispatchError::Config(_)));
    }

    #[test]
    fn test_read_only_wallet_cannot_sign() {
        let wallet = Wallet::read_only(Pubkey::new_unique());
        assert!(matches!(
            wallet.ensure_can_sign().unwrap_err(),
            DispatchError::Signing(_)
        ));
        let keyed = Wallet::from_keypair(Arc::new(Keypair::generate()));
        assert!(keyed.ensure_can_sign().is_ok());
    }
}

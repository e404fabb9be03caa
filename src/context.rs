//! Shared context handed to every protocol component.

use crate::address::AddressDeriver;
use crate::config::DispatchConfig;
use crate::error::Result;
use crate::ledger::{Instruction, Ledger, Transaction};
use crate::pubkey::{Pubkey, Signature};
use crate::wallet::Wallet;
use std::sync::Arc;
use tracing::{debug, instrument, warn};

/// Ledger handle, acting wallet, configuration and address deriver.
#[derive(Clone)]
pub struct DispatchContext {
    ledger: Arc<dyn Ledger>,
    wallet: Wallet,
    config: DispatchConfig,
    deriver: AddressDeriver,
}

impl DispatchContext {
    /// Creates a context for the configured cluster.
    pub fn new(ledger: Arc<dyn Ledger>, wallet: Wallet, config: DispatchConfig) -> Result<Self> {
        let deriver = AddressDeriver::new(config.addresses()?);
        Ok(Self {
            ledger,
            wallet,
            config,
            deriver,
        })
    }

    /// Returns a copy of this context acting as a different wallet.
    pub fn with_wallet(&self, wallet: Wallet) -> Self {
        Self {
            wallet,
            ..self.clone()
        }
    }

    /// The ledger.
    pub fn ledger(&self) -> &dyn Ledger {
        self.ledger.as_ref()
    }

    /// Shared handle to the ledger.
    pub fn ledger_handle(&self) -> Arc<dyn Ledger> {
        Arc::clone(&self.ledger)
    }

    /// The acting wallet.
    pub fn wallet(&self) -> &Wallet {
        &self.wallet
    }

    /// The acting wallet's key.
    pub fn wallet_pubkey(&self) -> Pubkey {
        self.wallet.pubkey()
    }

    /// Configuration.
    pub fn config(&self) -> &DispatchConfig {
        &self.config
    }

    /// Address deriver for the configured cluster.
    pub fn deriver(&self) -> &AddressDeriver {
        &self.deriver
    }

    /// Submits `instructions` as one transaction paid by the wallet and
    /// waits for the configured commitment.
    ///
    /// Signing capability is checked before any network call. Transient
    /// failures are retried up to the retry policy's ceiling; every other
    /// error, including `Conflict`, is returned as is.
    #[instrument(skip(self, instructions), fields(count = instructions.len()))]
    pub async fn submit(&self, instructions: Vec<Instruction>) -> Result<Signature> {
        self.wallet.ensure_can_sign()?;
        let tx = Transaction::new(self.wallet.pubkey(), instructions);
        let policy = self.config.retry;

        let mut attempt = 1;
        let signature = loop {
            match self.wallet.send(self.ledger.as_ref(), &tx).await {
                Ok(signature) => break signature,
                Err(e) if e.is_transient() && attempt < policy.max_attempts => {
                    let delay = policy.delay_after(attempt);
                    warn!(
                        "Submission attempt {}/{} failed: {}; retrying in {:?}",
                        attempt, policy.max_attempts, e, delay
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        };

        debug!("Submitted {} after {} attempt(s)", signature, attempt);
        self.ledger
            .confirm_transaction(&signature, self.config.commitment)
            .await?;
        Ok(signature)
    }
}

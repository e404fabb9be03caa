//! Ledger access over a node's HTTP JSON-RPC interface.

use super::wire::{encode_transaction, CompiledMessage};
use super::{AccountFetch, Commitment, Ledger, ProgramEvent, Transaction};
use crate::config::DispatchConfig;
use crate::constants::TOKEN_PROGRAM_ID;
use crate::error::{DispatchError, Result};
use crate::program::accounts::{AccountLayout, TokenAccount, TOKEN_ACCOUNT_LEN};
use crate::program::errors::decode_program_error;
use crate::pubkey::{Pubkey, Signature};
use crate::rpc::types::{
    custom_error_code, KeyedAccount, LatestBlockhash, SignatureStatus, UiAccount, WithContext,
};
use crate::rpc::RpcClient;
use crate::wallet::TransactionSigner;
use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use serde_json::{json, Value};
use std::time::Duration;
use tokio::sync::broadcast;
use tracing::{debug, instrument, warn};

/// Most addresses a node accepts in one `getMultipleAccounts` call.
pub const MAX_MULTIPLE_ACCOUNTS: usize = 100;

/// Ledger backed by a JSON-RPC endpoint.
#[derive(Debug, Clone)]
pub struct RpcLedger {
    client: RpcClient,
    commitment: Commitment,
    poll_interval: Duration,
    confirm_timeout: Duration,
}

impl RpcLedger {
    /// Connects to `endpoint` reading at `commitment`.
    pub fn new(endpoint: impl Into<String>, commitment: Commitment) -> Self {
        Self {
            client: RpcClient::new(endpoint),
            commitment,
            poll_interval: Duration::from_millis(500),
            confirm_timeout: Duration::from_secs(60),
        }
    }

    /// Connects to the configured endpoint.
    pub fn from_config(config: &DispatchConfig) -> Self {
        Self::new(config.rpc_url.clone(), config.commitment)
    }

    /// Overrides how often and how long confirmation is polled.
    pub fn with_confirmation_polling(mut self, interval: Duration, timeout: Duration) -> Self {
        self.poll_interval = interval;
        self.confirm_timeout = timeout;
        self
    }

    fn account_config(&self) -> Value {
        json!({ "encoding": "base64", "commitment": self.commitment.as_str() })
    }

    async fn latest_blockhash(&self) -> Result<[u8; 32]> {
        let result: WithContext<LatestBlockhash> = self
            .client
            .call(
                "getLatestBlockhash",
                json!([{ "commitment": self.commitment.as_str() }]),
            )
            .await?;
        decode_blockhash(&result.value.blockhash)
    }

    async fn signature_status(&self, signature: &Signature) -> Result<Option<SignatureStatus>> {
        let result: WithContext<Vec<Option<SignatureStatus>>> = self
            .client
            .call(
                "getSignatureStatuses",
                json!([[signature.to_base58()], { "searchTransactionHistory": false }]),
            )
            .await?;
        Ok(result.value.into_iter().next().flatten())
    }
}

fn decode_blockhash(text: &str) -> Result<[u8; 32]> {
    let bytes = bs58::decode(text)
        .into_vec()
        .map_err(|e| DispatchError::serialization(format!("Bad blockhash: {}", e)))?;
    bytes
        .try_into()
        .map_err(|_| DispatchError::serialization("Blockhash is not 32 bytes"))
}

fn parse_commitment(status: &str) -> Option<Commitment> {
    match status {
        "processed" => Some(Commitment::Processed),
        "confirmed" => Some(Commitment::Confirmed),
        "finalized" => Some(Commitment::Finalized),
        _ => None,
    }
}

fn to_fetch(account: Option<UiAccount>) -> Result<AccountFetch> {
    match account {
        Some(account) => Ok(AccountFetch::Found(account.decode_data()?)),
        None => Ok(AccountFetch::NotFound),
    }
}

fn decode_token_accounts(keyed: Vec<KeyedAccount>) -> Result<Vec<(Pubkey, TokenAccount)>> {
    let mut accounts = keyed
        .into_iter()
        .map(|entry| {
            let address: Pubkey = entry.pubkey.parse()?;
            let token = TokenAccount::from_bytes(&entry.account.decode_data()?)?;
            Ok((address, token))
        })
        .collect::<Result<Vec<_>>>()?;
    accounts.sort_by_key(|(address, _)| *address);
    Ok(accounts)
}

/// Maps a failed transaction's `err` value onto a client error.
fn transaction_error(err: &Value) -> DispatchError {
    match custom_error_code(err) {
        Some(code) => decode_program_error(code),
        None => DispatchError::ledger(format!("Transaction failed: {}", err)),
    }
}

#[async_trait]
impl Ledger for RpcLedger {
    async fn get_account(&self, address: &Pubkey) -> Result<AccountFetch> {
        let result: WithContext<Option<UiAccount>> = self
            .client
            .call(
                "getAccountInfo",
                json!([address.to_base58(), self.account_config()]),
            )
            .await?;
        to_fetch(result.value)
    }

    async fn get_multiple_accounts(&self, addresses: &[Pubkey]) -> Result<Vec<AccountFetch>> {
        let mut fetched = Vec::with_capacity(addresses.len());
        for chunk in addresses.chunks(MAX_MULTIPLE_ACCOUNTS) {
            let keys: Vec<String> = chunk.iter().map(Pubkey::to_base58).collect();
            let result: WithContext<Vec<Option<UiAccount>>> = self
                .client
                .call("getMultipleAccounts", json!([keys, self.account_config()]))
                .await?;
            if result.value.len() != chunk.len() {
                return Err(DispatchError::ledger(format!(
                    "Asked for {} accounts, node returned {}",
                    chunk.len(),
                    result.value.len()
                )));
            }
            for account in result.value {
                fetched.push(to_fetch(account)?);
            }
        }
        Ok(fetched)
    }

    #[instrument(skip(self, tx, signers), fields(instructions = tx.instructions.len()))]
    async fn submit_transaction(
        &self,
        tx: &Transaction,
        signers: &[&dyn TransactionSigner],
    ) -> Result<Signature> {
        let message = CompiledMessage::compile(tx, self.latest_blockhash().await?)?;
        let bytes = message.serialize()?;

        let mut signatures = Vec::with_capacity(message.signer_keys().len());
        for key in message.signer_keys() {
            let signer = signers
                .iter()
                .find(|signer| signer.pubkey() == *key)
                .ok_or_else(|| DispatchError::signing(format!("Missing signature for {}", key)))?;
            signatures.push(signer.sign_message(&bytes)?);
        }
        let wire = encode_transaction(&signatures, &bytes)?;

        let sent: String = self
            .client
            .call(
                "sendTransaction",
                json!([
                    BASE64.encode(wire),
                    {
                        "encoding": "base64",
                        "preflightCommitment": self.commitment.as_str(),
                    }
                ]),
            )
            .await?;
        let signature: Signature = sent.parse()?;
        debug!("Sent transaction {}", signature);
        Ok(signature)
    }

    #[instrument(skip(self, signature), fields(signature = %signature))]
    async fn confirm_transaction(&self, signature: &Signature, commitment: Commitment) -> Result<()> {
        let deadline = tokio::time::Instant::now() + self.confirm_timeout;
        loop {
            match self.signature_status(signature).await {
                Ok(Some(status)) => {
                    if let Some(err) = &status.err {
                        return Err(transaction_error(err));
                    }
                    let reached = status
                        .confirmation_status
                        .as_deref()
                        .and_then(parse_commitment);
                    if reached.is_some_and(|level| level >= commitment) {
                        return Ok(());
                    }
                }
                Ok(None) => {}
                Err(e) if e.is_transient() => warn!("Status poll failed: {}", e),
                Err(e) => return Err(e),
            }
            if tokio::time::Instant::now() >= deadline {
                return Err(DispatchError::ledger(format!(
                    "Transaction {} not {} within {:?}",
                    signature,
                    commitment.as_str(),
                    self.confirm_timeout
                )));
            }
            tokio::time::sleep(self.poll_interval).await;
        }
    }

    async fn token_accounts_by_owner(&self, owner: &Pubkey) -> Result<Vec<(Pubkey, TokenAccount)>> {
        let result: WithContext<Vec<KeyedAccount>> = self
            .client
            .call(
                "getTokenAccountsByOwner",
                json!([
                    owner.to_base58(),
                    { "programId": TOKEN_PROGRAM_ID.to_base58() },
                    self.account_config(),
                ]),
            )
            .await?;
        decode_token_accounts(result.value)
    }

    async fn token_holders(&self, mint: &Pubkey) -> Result<Vec<(Pubkey, TokenAccount)>> {
        let keyed: Vec<KeyedAccount> = self
            .client
            .call(
                "getProgramAccounts",
                json!([
                    TOKEN_PROGRAM_ID.to_base58(),
                    {
                        "encoding": "base64",
                        "commitment": self.commitment.as_str(),
                        "filters": [
                            { "dataSize": TOKEN_ACCOUNT_LEN },
                            { "memcmp": { "offset": 0, "bytes": mint.to_base58() } },
                        ],
                    }
                ]),
            )
            .await?;
        let mut holders = decode_token_accounts(keyed)?;
        holders.retain(|(_, account)| account.amount > 0);
        Ok(holders)
    }

    fn subscribe(&self) -> Result<broadcast::Receiver<ProgramEvent>> {
        Err(DispatchError::ledger(
            "Event subscription needs a streaming endpoint; HTTP JSON-RPC cannot deliver events",
        ))
    }
}

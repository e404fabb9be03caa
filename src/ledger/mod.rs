//! The ledger collaborator.
//!
//! Protocol components never touch account bytes except through this
//! interface: reads return [`AccountFetch`] so absence is a value rather
//! than an error, and every mutation is a single all-or-nothing
//! [`Transaction`].

pub mod memory;
pub mod rpc;
pub mod wire;

use crate::error::Result;
use crate::program::accounts::{AccountLayout, TokenAccount};
use crate::pubkey::{Pubkey, Signature};
use crate::wallet::TransactionSigner;
use async_trait::async_trait;
use tokio::sync::broadcast;

pub use memory::MemoryLedger;
pub use rpc::RpcLedger;

/// Result of reading one account.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AccountFetch {
    /// The account exists with this data.
    Found(Vec<u8>),
    /// No account at this address.
    NotFound,
}

impl AccountFetch {
    /// Returns true if the account exists.
    pub fn is_found(&self) -> bool {
        matches!(self, AccountFetch::Found(_))
    }

    /// Returns the data if the account exists.
    pub fn into_option(self) -> Option<Vec<u8>> {
        match self {
            AccountFetch::Found(data) => Some(data),
            AccountFetch::NotFound => None,
        }
    }

    /// Decodes the account, keeping absence as `None`.
    pub fn decode<T: AccountLayout>(&self) -> Result<Option<T>> {
        match self {
            AccountFetch::Found(data) => Ok(Some(T::from_bytes(data)?)),
            AccountFetch::NotFound => Ok(None),
        }
    }
}

/// Confirmation level to wait for after submission.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub enum Commitment {
    /// Seen by the connected node.
    Processed,
    /// Voted on by a supermajority.
    #[default]
    Confirmed,
    /// Rooted.
    Finalized,
}

impl Commitment {
    /// Wire name of this commitment level.
    pub fn as_str(&self) -> &'static str {
        match self {
            Commitment::Processed => "processed",
            Commitment::Confirmed => "confirmed",
            Commitment::Finalized => "finalized",
        }
    }
}

/// An account referenced by an instruction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AccountMeta {
    /// Account address.
    pub pubkey: Pubkey,
    /// Must sign the transaction.
    pub is_signer: bool,
    /// May be modified by the instruction.
    pub is_writable: bool,
}

impl AccountMeta {
    /// Writable account.
    pub fn new(pubkey: Pubkey, is_signer: bool) -> Self {
        Self {
            pubkey,
            is_signer,
            is_writable: true,
        }
    }

    /// Read-only account.
    pub fn new_readonly(pubkey: Pubkey, is_signer: bool) -> Self {
        Self {
            pubkey,
            is_signer,
            is_writable: false,
        }
    }
}

/// One program invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Instruction {
    /// Invoked program.
    pub program_id: Pubkey,
    /// Accounts in program-defined order.
    pub accounts: Vec<AccountMeta>,
    /// Instruction data.
    pub data: Vec<u8>,
}

impl Instruction {
    /// Returns the key at `index`, if present.
    pub fn account(&self, index: usize) -> Option<&Pubkey> {
        self.accounts.get(index).map(|meta| &meta.pubkey)
    }
}

/// An unsigned transaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transaction {
    /// Account paying transaction fees; always the first signer.
    pub fee_payer: Pubkey,
    /// Instructions executed atomically in order.
    pub instructions: Vec<Instruction>,
}

impl Transaction {
    /// Creates a transaction.
    pub fn new(fee_payer: Pubkey, instructions: Vec<Instruction>) -> Self {
        Self {
            fee_payer,
            instructions,
        }
    }

    /// Keys that must sign, fee payer first, without duplicates.
    pub fn required_signers(&self) -> Vec<Pubkey> {
        let mut signers = vec![self.fee_payer];
        for meta in self.instructions.iter().flat_map(|ix| ix.accounts.iter()) {
            if meta.is_signer && !signers.contains(&meta.pubkey) {
                signers.push(meta.pubkey);
            }
        }
        signers
    }
}

/// Decoded program events.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProgramEvent {
    /// A message was written to a mailbox.
    MessageSent {
        /// Logical author.
        sender: Pubkey,
        /// Mailbox owner.
        receiver: Pubkey,
        /// Slot index.
        index: u32,
        /// Encoded payload.
        data: Vec<u8>,
    },
    /// A receiver claimed a message's incentive.
    IncentiveClaimed {
        /// Original sender.
        sender: Pubkey,
        /// Claiming receiver.
        receiver: Pubkey,
        /// Slot index.
        index: u32,
        /// Incentive mint.
        mint: Pubkey,
        /// Claimed amount.
        amount: u64,
    },
}

impl ProgramEvent {
    /// Event name as emitted by the program.
    pub fn name(&self) -> &'static str {
        match self {
            ProgramEvent::MessageSent { .. } => crate::constants::EVENT_MESSAGE_SENT,
            ProgramEvent::IncentiveClaimed { .. } => crate::constants::EVENT_INCENTIVE_CLAIMED,
        }
    }
}

/// Remote ledger operations used by the protocol layer.
#[async_trait]
pub trait Ledger: Send + Sync {
    /// Reads one account.
    async fn get_account(&self, address: &Pubkey) -> Result<AccountFetch>;

    /// Reads several accounts in one round trip; results follow input order.
    async fn get_multiple_accounts(&self, addresses: &[Pubkey]) -> Result<Vec<AccountFetch>>;

    /// Signs with `signers` and submits. Fails if a required signer is absent.
    async fn submit_transaction(
        &self,
        tx: &Transaction,
        signers: &[&dyn TransactionSigner],
    ) -> Result<Signature>;

    /// Waits until the transaction reaches `commitment`, surfacing its error.
    async fn confirm_transaction(&self, signature: &Signature, commitment: Commitment)
        -> Result<()>;

    /// Token accounts owned by `owner`.
    async fn token_accounts_by_owner(&self, owner: &Pubkey) -> Result<Vec<(Pubkey, TokenAccount)>>;

    /// Token accounts of `mint` with a non-zero balance.
    async fn token_holders(&self, mint: &Pubkey) -> Result<Vec<(Pubkey, TokenAccount)>>;

    /// Subscribes to decoded program events.
    fn subscribe(&self) -> Result<broadcast::Receiver<ProgramEvent>>;
}

/// Fetches and decodes one account, keeping absence as `None`.
pub async fn fetch_decoded<T: AccountLayout>(
    ledger: &dyn Ledger,
    address: &Pubkey,
) -> Result<Option<T>> {
    ledger.get_account(address).await?.decode()
}

/// Fetches and decodes several accounts, keeping absence as `None`.
pub async fn fetch_many_decoded<T: AccountLayout>(
    ledger: &dyn Ledger,
    addresses: &[Pubkey],
) -> Result<Vec<Option<T>>> {
    ledger
        .get_multiple_accounts(addresses)
        .await?
        .iter()
        .map(|fetch| fetch.decode())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::program::accounts::MailboxAccount;

    #[test]
    fn test_required_signers_dedup() {
        let payer = Pubkey::new_unique();
        let other = Pubkey::new_unique();
        let program = Pubkey::new_unique();
        let tx = Transaction::new(
            payer,
            vec![Instruction {
                program_id: program,
                accounts: vec![
                    AccountMeta::new(payer, true),
                    AccountMeta::new_readonly(other, true),
                    AccountMeta::new(Pubkey::new_unique(), false),
                ],
                data: vec![],
            }],
        );
        assert_eq!(tx.required_signers(), vec![payer, other]);
    }

    #[test]
    fn test_fetch_decode_absent() {
        let decoded: Option<MailboxAccount> = AccountFetch::NotFound.decode().unwrap();
        assert!(decoded.is_none());
    }
}

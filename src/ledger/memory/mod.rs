//! In-process ledger.
//!
//! [`MemoryLedger`] executes transactions against a local account map,
//! simulating the messaging and postbox programs closely enough for the
//! protocol layer to be tested end to end: derived addresses are checked
//! against their seeds, counters are enforced, fees and rent move
//! lamports, and every transaction is applied all-or-nothing. Token
//! accounts and asset metadata are kept in their real byte layouts so
//! the gating path reads them exactly as it would from a cluster.

mod messaging;
mod postbox;

use super::wire::CompiledMessage;
use super::{AccountFetch, Commitment, Instruction, Ledger, ProgramEvent, Transaction};
use crate::address::{associated_token_address, metadata_address, AddressDeriver};
use crate::config::{Cluster, ClusterAddresses};
use crate::constants::{ACCOUNT_RENT_LAMPORTS, METADATA_PROGRAM_ID, TOKEN_PROGRAM_ID};
use crate::error::{DispatchError, Result};
use crate::gating::metadata::{AssetMetadata, Collection};
use crate::program::accounts::{AccountLayout, TokenAccount};
use crate::program::errors::ProgramErrorCode;
use crate::pubkey::{Pubkey, Signature};
use crate::wallet::TransactionSigner;
use async_trait::async_trait;
use sha2::{Digest, Sha256};
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard};
use tokio::sync::broadcast;
use tracing::{debug, warn};

/// Event channel depth.
const EVENT_CAPACITY: usize = 256;

/// Fails with `code` unless `cond` holds.
fn require(cond: bool, code: ProgramErrorCode) -> Result<()> {
    if cond {
        Ok(())
    } else {
        Err(code.into())
    }
}

#[derive(Debug, Clone)]
struct StoredAccount {
    owner: Pubkey,
    kind: &'static str,
    data: Vec<u8>,
}

#[derive(Debug, Clone, Default)]
struct LedgerState {
    accounts: HashMap<Pubkey, StoredAccount>,
    lamports: HashMap<Pubkey, u64>,
    mint_supply: HashMap<Pubkey, u64>,
    processed: HashSet<Signature>,
    slot: u64,
}

impl LedgerState {
    fn exists(&self, address: &Pubkey) -> bool {
        self.accounts.contains_key(address)
    }

    /// Loads a typed account; accounts of another kind or owner read as a
    /// constraint failure, absence as `None`.
    fn load<T: AccountLayout>(&self, address: &Pubkey, owner: &Pubkey) -> Result<Option<T>> {
        match self.accounts.get(address) {
            None => Ok(None),
            Some(account) => {
                require(
                    account.owner == *owner && account.kind == T::KIND,
                    ProgramErrorCode::ConstraintRaw,
                )?;
                Ok(Some(T::from_bytes(&account.data)?))
            }
        }
    }

    /// Loads an account that must exist.
    fn load_required<T: AccountLayout>(&self, address: &Pubkey, owner: &Pubkey) -> Result<T> {
        self.load(address, owner)?
            .ok_or_else(|| ProgramErrorCode::AccountNotInitialized.into())
    }

    fn store<T: AccountLayout>(&mut self, address: Pubkey, owner: Pubkey, value: &T) {
        self.accounts.insert(
            address,
            StoredAccount {
                owner,
                kind: T::KIND,
                data: value.to_bytes(),
            },
        );
    }

    /// Creates an account, charging its rent to `payer`.
    fn create<T: AccountLayout>(
        &mut self,
        address: Pubkey,
        owner: Pubkey,
        value: &T,
        payer: &Pubkey,
    ) -> Result<()> {
        require(!self.exists(&address), ProgramErrorCode::AccountAlreadyInUse)?;
        self.debit(payer, ACCOUNT_RENT_LAMPORTS)?;
        self.store(address, owner, value);
        Ok(())
    }

    /// Closes an account, returning its rent to `rent_destination`.
    fn close(&mut self, address: &Pubkey, rent_destination: &Pubkey) {
        if self.accounts.remove(address).is_some() {
            self.credit(rent_destination, ACCOUNT_RENT_LAMPORTS);
        }
    }

    fn balance(&self, key: &Pubkey) -> u64 {
        self.lamports.get(key).copied().unwrap_or(0)
    }

    fn debit(&mut self, key: &Pubkey, amount: u64) -> Result<()> {
        let balance = self.balance(key);
        if balance < amount {
            return Err(DispatchError::ledger(format!(
                "Insufficient lamports in {}: need {}, have {}",
                key, amount, balance
            )));
        }
        self.lamports.insert(*key, balance - amount);
        Ok(())
    }

    fn credit(&mut self, key: &Pubkey, amount: u64) {
        *self.lamports.entry(*key).or_insert(0) += amount;
    }

    /// Moves `amount` lamports, as a fee transfer.
    fn transfer(&mut self, from: &Pubkey, to: &Pubkey, amount: u64) -> Result<()> {
        self.debit(from, amount)?;
        self.credit(to, amount);
        Ok(())
    }

    fn token(&self, address: &Pubkey) -> Option<TokenAccount> {
        self.load::<TokenAccount>(address, &TOKEN_PROGRAM_ID)
            .ok()
            .flatten()
    }

    /// Adds `amount` to a token account, creating it for `owner` if needed.
    fn credit_token(
        &mut self,
        address: Pubkey,
        owner: &Pubkey,
        mint: &Pubkey,
        amount: u64,
        rent_payer: &Pubkey,
    ) -> Result<()> {
        match self.token(&address) {
            Some(mut account) => {
                require(account.mint == *mint, ProgramErrorCode::ConstraintRaw)?;
                account.amount += amount;
                self.store(address, *TOKEN_PROGRAM_ID, &account);
            }
            None => {
                let account = TokenAccount {
                    mint: *mint,
                    owner: *owner,
                    amount,
                };
                self.create(address, *TOKEN_PROGRAM_ID, &account, rent_payer)?;
            }
        }
        Ok(())
    }

    fn debit_token(&mut self, address: &Pubkey, amount: u64) -> Result<()> {
        let mut account = self
            .token(address)
            .ok_or_else(|| DispatchError::ledger(format!("{} is not a token account", address)))?;
        if account.amount < amount {
            return Err(DispatchError::ledger(format!(
                "Insufficient token balance in {}: need {}, have {}",
                address, amount, account.amount
            )));
        }
        account.amount -= amount;
        self.store(*address, *TOKEN_PROGRAM_ID, &account);
        Ok(())
    }

    fn token_accounts(&self) -> impl Iterator<Item = (Pubkey, TokenAccount)> + '_ {
        self.accounts
            .keys()
            .filter_map(|address| self.token(address).map(|account| (*address, account)))
    }
}

/// Accounts of the instruction being executed.
struct InstructionAccounts<'a> {
    ix: &'a Instruction,
}

impl<'a> InstructionAccounts<'a> {
    fn key(&self, index: usize) -> Result<Pubkey> {
        self.ix.account(index).copied().ok_or_else(|| {
            DispatchError::ledger(format!(
                "Instruction has {} accounts, needs at least {}",
                self.ix.accounts.len(),
                index + 1
            ))
        })
    }

    fn signer(&self, index: usize) -> Result<Pubkey> {
        let key = self.key(index)?;
        require(
            self.ix.accounts[index].is_signer,
            ProgramErrorCode::ConstraintSigner,
        )?;
        Ok(key)
    }

    fn remaining(&self, from: usize) -> Vec<Pubkey> {
        self.ix
            .accounts
            .iter()
            .skip(from)
            .map(|meta| meta.pubkey)
            .collect()
    }
}

/// Execution of one transaction against a scratch copy of the state.
struct Runtime<'a> {
    state: &'a mut LedgerState,
    deriver: &'a AddressDeriver,
    events: Vec<ProgramEvent>,
}

impl<'a> Runtime<'a> {
    fn execute(&mut self, ix: &Instruction) -> Result<()> {
        let accounts = InstructionAccounts { ix };
        if ix.program_id == *self.deriver.messaging_program() {
            self.execute_messaging(&accounts)
        } else if ix.program_id == *self.deriver.postbox_program() {
            self.execute_postbox(&accounts)
        } else {
            Err(DispatchError::ledger(format!(
                "Unsupported program {}",
                ix.program_id
            )))
        }
    }
}

/// Ledger simulated in process memory.
pub struct MemoryLedger {
    deriver: AddressDeriver,
    state: Mutex<LedgerState>,
    events: broadcast::Sender<ProgramEvent>,
    fail_next: AtomicU32,
    attempts: AtomicU64,
}

impl MemoryLedger {
    /// Creates an empty ledger running the programs at `addresses`.
    pub fn new(addresses: ClusterAddresses) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            deriver: AddressDeriver::new(addresses),
            state: Mutex::new(LedgerState::default()),
            events,
            fail_next: AtomicU32::new(0),
            attempts: AtomicU64::new(0),
        }
    }

    /// Creates an empty ledger with the programs of `cluster`.
    pub fn for_cluster(cluster: Cluster) -> Result<Self> {
        Ok(Self::new(ClusterAddresses::for_cluster(cluster)?))
    }

    fn state(&self) -> MutexGuard<'_, LedgerState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Credits lamports to `key`.
    pub fn airdrop(&self, key: &Pubkey, lamports: u64) {
        self.state().credit(key, lamports);
    }

    /// Lamport balance of `key`.
    pub fn balance(&self, key: &Pubkey) -> u64 {
        self.state().balance(key)
    }

    /// Returns true if an account exists at `address`.
    pub fn account_exists(&self, address: &Pubkey) -> bool {
        self.state().exists(address)
    }

    /// Creates a new token mint with zero supply.
    pub fn create_mint(&self) -> Pubkey {
        let mint = Pubkey::new_unique();
        self.state().mint_supply.insert(mint, 0);
        mint
    }

    /// Total supply minted so far.
    pub fn mint_supply(&self, mint: &Pubkey) -> u64 {
        self.state().mint_supply.get(mint).copied().unwrap_or(0)
    }

    /// Mints `amount` to `owner`'s associated token account and returns it.
    pub fn mint_to(&self, mint: &Pubkey, owner: &Pubkey, amount: u64) -> Result<Pubkey> {
        let ata = associated_token_address(owner, mint)?;
        let mut state = self.state();
        if !state.mint_supply.contains_key(mint) {
            return Err(DispatchError::invalid_input(format!("Unknown mint {}", mint)));
        }
        let mut account = state.token(&ata).unwrap_or(TokenAccount {
            mint: *mint,
            owner: *owner,
            amount: 0,
        });
        account.amount += amount;
        state.store(ata, *TOKEN_PROGRAM_ID, &account);
        *state.mint_supply.entry(*mint).or_insert(0) += amount;
        Ok(ata)
    }

    /// Mints a one-of-one asset to `owner`, optionally in a collection,
    /// and writes its metadata account. Returns the asset mint.
    pub fn create_nft(&self, owner: &Pubkey, collection: Option<Collection>) -> Result<Pubkey> {
        let mint = self.create_mint();
        self.mint_to(&mint, owner, 1)?;
        let metadata = AssetMetadata::new(mint, "Dispatch Test Asset", collection);
        let address = metadata_address(&mint)?;
        self.state().store(address, *METADATA_PROGRAM_ID, &metadata);
        Ok(mint)
    }

    /// Moves `amount` of a token between two owners' associated accounts.
    pub fn transfer_tokens(
        &self,
        mint: &Pubkey,
        from: &Pubkey,
        to: &Pubkey,
        amount: u64,
    ) -> Result<()> {
        let source = associated_token_address(from, mint)?;
        let destination = associated_token_address(to, mint)?;
        let mut state = self.state();
        let mut scratch = state.clone();
        scratch.debit_token(&source, amount)?;
        let mut account = scratch.token(&destination).unwrap_or(TokenAccount {
            mint: *mint,
            owner: *to,
            amount: 0,
        });
        account.amount += amount;
        scratch.store(destination, *TOKEN_PROGRAM_ID, &account);
        *state = scratch;
        Ok(())
    }

    /// Writes raw account data, bypassing every program.
    pub fn insert_raw_account(&self, address: Pubkey, owner: Pubkey, data: Vec<u8>) {
        self.state().accounts.insert(
            address,
            StoredAccount {
                owner,
                kind: "raw",
                data,
            },
        );
    }

    /// Makes the next `count` submissions fail with a transient error.
    pub fn fail_next_submissions(&self, count: u32) {
        self.fail_next.store(count, Ordering::SeqCst);
    }

    /// Number of submissions attempted, including injected failures.
    pub fn submission_attempts(&self) -> u64 {
        self.attempts.load(Ordering::SeqCst)
    }

    fn take_injected_failure(&self) -> bool {
        self.fail_next
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
    }
}

impl std::fmt::Debug for MemoryLedger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.state();
        f.debug_struct("MemoryLedger")
            .field("accounts", &state.accounts.len())
            .field("slot", &state.slot)
            .finish()
    }
}

#[async_trait]
impl Ledger for MemoryLedger {
    async fn get_account(&self, address: &Pubkey) -> Result<AccountFetch> {
        Ok(match self.state().accounts.get(address) {
            Some(account) => AccountFetch::Found(account.data.clone()),
            None => AccountFetch::NotFound,
        })
    }

    async fn get_multiple_accounts(&self, addresses: &[Pubkey]) -> Result<Vec<AccountFetch>> {
        let state = self.state();
        Ok(addresses
            .iter()
            .map(|address| match state.accounts.get(address) {
                Some(account) => AccountFetch::Found(account.data.clone()),
                None => AccountFetch::NotFound,
            })
            .collect())
    }

    async fn submit_transaction(
        &self,
        tx: &Transaction,
        signers: &[&dyn TransactionSigner],
    ) -> Result<Signature> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        if self.take_injected_failure() {
            warn!("Injected transient failure");
            return Err(DispatchError::transient("Injected transient failure"));
        }

        let mut state = self.state();
        state.slot += 1;
        let blockhash: [u8; 32] = Sha256::digest(state.slot.to_le_bytes()).into();
        let message = CompiledMessage::compile(tx, blockhash)?;
        let bytes = message.serialize()?;

        let mut signatures = Vec::with_capacity(message.signer_keys().len());
        for key in message.signer_keys() {
            let signer = signers
                .iter()
                .find(|signer| signer.pubkey() == *key)
                .ok_or_else(|| DispatchError::signing(format!("Missing signature for {}", key)))?;
            signatures.push(signer.sign_message(&bytes)?);
        }
        let signature = signatures[0];

        let mut scratch = state.clone();
        let mut runtime = Runtime {
            state: &mut scratch,
            deriver: &self.deriver,
            events: Vec::new(),
        };
        for (i, ix) in tx.instructions.iter().enumerate() {
            if let Err(e) = runtime.execute(ix) {
                debug!("Instruction {} failed: {}", i, e);
                return Err(e);
            }
        }
        let events = std::mem::take(&mut runtime.events);
        scratch.processed.insert(signature);
        *state = scratch;
        drop(state);

        for event in events {
            // No receivers is not an error.
            let _ = self.events.send(event);
        }
        debug!("Applied transaction {}", signature);
        Ok(signature)
    }

    async fn confirm_transaction(
        &self,
        signature: &Signature,
        _commitment: Commitment,
    ) -> Result<()> {
        if self.state().processed.contains(signature) {
            Ok(())
        } else {
            Err(DispatchError::ledger(format!(
                "Unknown transaction {}",
                signature
            )))
        }
    }

    async fn token_accounts_by_owner(&self, owner: &Pubkey) -> Result<Vec<(Pubkey, TokenAccount)>> {
        let state = self.state();
        let mut accounts: Vec<_> = state
            .token_accounts()
            .filter(|(_, account)| account.owner == *owner)
            .collect();
        accounts.sort_by_key(|(address, _)| *address);
        Ok(accounts)
    }

    async fn token_holders(&self, mint: &Pubkey) -> Result<Vec<(Pubkey, TokenAccount)>> {
        let state = self.state();
        let mut accounts: Vec<_> = state
            .token_accounts()
            .filter(|(_, account)| account.mint == *mint && account.amount > 0)
            .collect();
        accounts.sort_by_key(|(address, _)| *address);
        Ok(accounts)
    }

    fn subscribe(&self) -> Result<broadcast::Receiver<ProgramEvent>> {
        Ok(self.events.subscribe())
    }
}

//! Shared fixtures for the integration tests.

#![allow(dead_code)]

use async_trait::async_trait;
use dispatch::ledger::{AccountFetch, Commitment, ProgramEvent, Transaction};
use dispatch::program::accounts::TokenAccount;
use dispatch::{
    Cluster, DispatchConfig, DispatchContext, Keypair, Ledger, MemoryLedger, Pubkey, Result,
    RetryPolicy, Signature, TransactionSigner, Wallet,
};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::broadcast;

/// Lamports handed to every test identity.
pub const STARTING_LAMPORTS: u64 = 10_000_000_000;

/// One participant: a funded key and a context acting as it.
pub struct Actor {
    pub keypair: Arc<Keypair>,
    pub ctx: DispatchContext,
}

impl Actor {
    pub fn pubkey(&self) -> Pubkey {
        self.keypair.pubkey()
    }
}

pub fn test_config() -> DispatchConfig {
    DispatchConfig::new(Cluster::Devnet).with_retry(RetryPolicy::immediate())
}

pub fn ledger() -> Arc<MemoryLedger> {
    Arc::new(MemoryLedger::for_cluster(Cluster::Devnet).expect("devnet addresses"))
}

/// Creates a funded identity on `ledger`.
pub fn actor(ledger: &Arc<MemoryLedger>) -> Actor {
    actor_with_config(ledger, test_config())
}

pub fn actor_with_config(ledger: &Arc<MemoryLedger>, config: DispatchConfig) -> Actor {
    let keypair = Arc::new(Keypair::generate());
    ledger.airdrop(&keypair.pubkey(), STARTING_LAMPORTS);
    let ctx = DispatchContext::new(
        ledger.clone(),
        Wallet::from_keypair(keypair.clone()),
        config,
    )
    .expect("context");
    Actor { keypair, ctx }
}

/// Ledger that counts every call before delegating to a [`MemoryLedger`].
pub struct CountingLedger {
    inner: Arc<MemoryLedger>,
    calls: AtomicU64,
}

impl CountingLedger {
    pub fn new(inner: Arc<MemoryLedger>) -> Arc<Self> {
        Arc::new(Self {
            inner,
            calls: AtomicU64::new(0),
        })
    }

    pub fn calls(&self) -> u64 {
        self.calls.load(Ordering::SeqCst)
    }

    fn tick(&self) {
        self.calls.fetch_add(1, Ordering::SeqCst);
    }
}

#[async_trait]
impl Ledger for CountingLedger {
    async fn get_account(&self, address: &Pubkey) -> Result<AccountFetch> {
        self.tick();
        self.inner.get_account(address).await
    }

    async fn get_multiple_accounts(&self, addresses: &[Pubkey]) -> Result<Vec<AccountFetch>> {
        self.tick();
        self.inner.get_multiple_accounts(addresses).await
    }

    async fn submit_transaction(
        &self,
        tx: &Transaction,
        signers: &[&dyn TransactionSigner],
    ) -> Result<Signature> {
        self.tick();
        self.inner.submit_transaction(tx, signers).await
    }

    async fn confirm_transaction(&self, signature: &Signature, commitment: Commitment) -> Result<()> {
        self.tick();
        self.inner.confirm_transaction(signature, commitment).await
    }

    async fn token_accounts_by_owner(&self, owner: &Pubkey) -> Result<Vec<(Pubkey, TokenAccount)>> {
        self.tick();
        self.inner.token_accounts_by_owner(owner).await
    }

    async fn token_holders(&self, mint: &Pubkey) -> Result<Vec<(Pubkey, TokenAccount)>> {
        self.tick();
        self.inner.token_holders(mint).await
    }

    fn subscribe(&self) -> Result<broadcast::Receiver<ProgramEvent>> {
        self.inner.subscribe()
    }
}

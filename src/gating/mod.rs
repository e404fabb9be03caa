//! Local evaluation of post restrictions.
//!
//! The evaluator reads the caller's token accounts and, for collection
//! restrictions, the metadata of each held asset. A positive verdict also
//! yields the accounts the postbox program needs to re-check the same
//! predicate on submission, so the client never submits a post or vote it
//! already knows will be rejected. The ledger program remains the final
//! arbiter.

pub mod metadata;

use crate::address::metadata_address;
use crate::error::Result;
use crate::ledger::Ledger;
use crate::program::accounts::TokenAccount;
use crate::pubkey::Pubkey;
use metadata::AssetMetadata;
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{debug, instrument};

pub use crate::program::accounts::PostRestriction;

/// Outcome of evaluating a restriction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GateVerdict {
    /// The identity satisfies the restriction; `proof` lists the accounts
    /// to pass to the program after the fixed accounts.
    Allowed {
        /// Token account, then metadata account for collection gates.
        proof: Vec<Pubkey>,
    },
    /// The identity does not hold what the restriction requires.
    Denied,
}

impl GateVerdict {
    /// Returns true for `Allowed`.
    pub fn is_allowed(&self) -> bool {
        matches!(self, GateVerdict::Allowed { .. })
    }

    /// Proof accounts, if allowed.
    pub fn into_proof(self) -> Option<Vec<Pubkey>> {
        match self {
            GateVerdict::Allowed { proof } => Some(proof),
            GateVerdict::Denied => None,
        }
    }
}

/// Picks the restriction that governs: the first override that is set,
/// else the forum-level one. A set override replaces the forum
/// restriction entirely, including when it is `PostRestriction::None`.
pub fn effective_restriction<'r>(
    overrides: impl IntoIterator<Item = Option<&'r PostRestriction>>,
    forum: &'r PostRestriction,
) -> &'r PostRestriction {
    overrides.into_iter().flatten().next().unwrap_or(forum)
}

/// Read-only evaluator of restrictions against a caller's holdings.
#[derive(Clone)]
pub struct GatingEvaluator {
    ledger: Arc<dyn Ledger>,
}

impl GatingEvaluator {
    /// Creates an evaluator reading through `ledger`.
    pub fn new(ledger: Arc<dyn Ledger>) -> Self {
        Self { ledger }
    }

    /// Whether `identity` may post under `restriction`.
    pub async fn can_post(&self, identity: &Pubkey, restriction: &PostRestriction) -> Result<bool> {
        Ok(self.evaluate(identity, restriction).await?.is_allowed())
    }

    /// Whether `identity` may vote under `restriction`.
    pub async fn can_vote(&self, identity: &Pubkey, restriction: &PostRestriction) -> Result<bool> {
        Ok(self.evaluate(identity, restriction).await?.is_allowed())
    }

    /// Evaluates `restriction` for `identity`.
    #[instrument(skip(self, identity), fields(identity = %identity.short()))]
    pub async fn evaluate(
        &self,
        identity: &Pubkey,
        restriction: &PostRestriction,
    ) -> Result<GateVerdict> {
        let verdict = match restriction {
            PostRestriction::None => GateVerdict::Allowed { proof: Vec::new() },
            PostRestriction::TokenOwnership { mint, amount } => {
                self.check_token(identity, mint, *amount).await?
            }
            PostRestriction::NftOwnership { collection_id } => {
                self.check_collections(identity, std::slice::from_ref(collection_id))
                    .await?
            }
            PostRestriction::NftListAnyOwnership { collection_ids } => {
                self.check_collections(identity, collection_ids).await?
            }
        };
        debug!("Gate verdict: {:?}", verdict);
        Ok(verdict)
    }

    async fn check_token(&self, identity: &Pubkey, mint: &Pubkey, amount: u64) -> Result<GateVerdict> {
        let held = self.ledger.token_accounts_by_owner(identity).await?;
        Ok(held
            .into_iter()
            .find(|(_, account)| account.mint == *mint && account.amount >= amount)
            .map(|(address, _)| GateVerdict::Allowed {
                proof: vec![address],
            })
            .unwrap_or(GateVerdict::Denied))
    }

    /// Verified collection memberships of `identity`'s held assets, with
    /// the token and metadata account proving each.
    pub async fn verified_collections(
        &self,
        identity: &Pubkey,
    ) -> Result<Vec<(Pubkey, Pubkey, Pubkey)>> {
        let held: Vec<(Pubkey, TokenAccount)> = self
            .ledger
            .token_accounts_by_owner(identity)
            .await?
            .into_iter()
            .filter(|(_, account)| account.amount >= 1)
            .collect();
        if held.is_empty() {
            return Ok(Vec::new());
        }

        let metadata_keys = held
            .iter()
            .map(|(_, account)| metadata_address(&account.mint))
            .collect::<Result<Vec<_>>>()?;
        let fetched = self.ledger.get_multiple_accounts(&metadata_keys).await?;

        let mut found = Vec::new();
        for (((token_address, _), metadata_key), fetch) in
            held.iter().zip(&metadata_keys).zip(fetched)
        {
            let metadata = match fetch.decode::<AssetMetadata>() {
                Ok(Some(metadata)) => metadata,
                Ok(None) => continue,
                Err(e) => {
                    debug!("Skipping unreadable metadata {}: {}", metadata_key, e);
                    continue;
                }
            };
            if let Some(collection) = metadata.verified_collection() {
                found.push((*collection, *token_address, *metadata_key));
            }
        }
        Ok(found)
    }

    async fn check_collections(
        &self,
        identity: &Pubkey,
        accepted: &[Pubkey],
    ) -> Result<GateVerdict> {
        let accepted: HashSet<&Pubkey> = accepted.iter().collect();
        Ok(self
            .verified_collections(identity)
            .await?
            .into_iter()
            .find(|(collection, _, _)| accepted.contains(collection))
            .map(|(_, token, metadata)| GateVerdict::Allowed {
                proof: vec![token, metadata],
            })
            .unwrap_or(GateVerdict::Denied))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_first_set_override_wins() {
        let forum = PostRestriction::NftOwnership {
            collection_id: Pubkey::new_unique(),
        };
        let topic = PostRestriction::None;
        assert_eq!(effective_restriction([None, Some(&topic)], &forum), &topic);
        assert_eq!(effective_restriction([None, None], &forum), &forum);
        assert_eq!(effective_restriction([], &forum), &forum);
    }

    #[test]
    fn test_verdict_proof() {
        let key = Pubkey::new_unique();
        assert_eq!(
            GateVerdict::Allowed { proof: vec![key] }.into_proof(),
            Some(vec![key])
        );
        assert!(!GateVerdict::Denied.is_allowed());
        assert!(GateVerdict::Denied.into_proof().is_none());
    }
}

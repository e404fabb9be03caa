//! Deterministic account address derivation.
//!
//! Every ledger entity (mailbox, message slot, postbox, post, vote entry,
//! settings account, bucket counter) lives at an address computed from a
//! list of seeds and the owning program id. Anyone who knows the seeds can
//! locate the account without a lookup table.
//!
//! An address is `sha256(seeds ‖ bump ‖ program_id ‖ "ProgramDerivedAddress")`
//! for the highest `bump` in `255..=0` whose digest is not a valid ed25519
//! point, so no private key can ever sign for it.

use crate::config::ClusterAddresses;
use crate::constants::{
    ASSOCIATED_TOKEN_PROGRAM_ID, BUCKET_SEED, DESCRIPTION_SETTINGS_SEED, MAILBOX_SEED, MAX_SEEDS,
    MAX_SEED_LEN, MESSAGE_SEED, MESSAGING_PROTOCOL_SEED, METADATA_PROGRAM_ID, METADATA_SEED,
    MODERATOR_SEED, OWNER_INFO_SETTINGS_SEED, PDA_MARKER, POSTBOX_PROTOCOL_SEED, POSTBOX_SEED,
    POST_SEED, RESTRICTION_SETTINGS_SEED, SETTINGS_SEED, TOKEN_PROGRAM_ID, VOTE_SEED,
};
use crate::error::{DispatchError, Result};
use crate::pubkey::Pubkey;
use curve25519_dalek::edwards::CompressedEdwardsY;
use sha2::{Digest, Sha256};

/// Encodes a slot index as the fixed-width little-endian seed.
pub fn index_seed(index: u32) -> [u8; 4] {
    index.to_le_bytes()
}

fn check_seeds(seeds: &[&[u8]]) -> Result<()> {
    // One slot is reserved for the bump seed.
    if seeds.len() >= MAX_SEEDS {
        return Err(DispatchError::address_derivation(format!(
            "Too many seeds: {} (max {})",
            seeds.len(),
            MAX_SEEDS - 1
        )));
    }
    for (i, seed) in seeds.iter().enumerate() {
        if seed.len() > MAX_SEED_LEN {
            return Err(DispatchError::address_derivation(format!(
                "Seed {} is {} bytes (max {})",
                i,
                seed.len(),
                MAX_SEED_LEN
            )));
        }
    }
    Ok(())
}

fn hash_seeds(seeds: &[&[u8]], bump: Option<u8>, program_id: &Pubkey) -> [u8; 32] {
    let mut hasher = Sha256::new();
    for seed in seeds {
        hasher.update(seed);
    }
    if let Some(bump) = bump {
        hasher.update([bump]);
    }
    hasher.update(program_id.as_bytes());
    hasher.update(PDA_MARKER);
    hasher.finalize().into()
}

/// Returns true if the bytes decode to a point on the ed25519 curve.
pub fn is_on_curve(bytes: &[u8; 32]) -> bool {
    CompressedEdwardsY(*bytes).decompress().is_some()
}

/// Derives the program address and bump for a seed list.
pub fn find_program_address(seeds: &[&[u8]], program_id: &Pubkey) -> Result<(Pubkey, u8)> {
    check_seeds(seeds)?;
    for bump in (0..=u8::MAX).rev() {
        let digest = hash_seeds(seeds, Some(bump), program_id);
        if !is_on_curve(&digest) {
            return Ok((Pubkey::new_from_array(digest), bump));
        }
    }
    Err(DispatchError::address_derivation(
        "No off-curve bump found for seeds",
    ))
}

/// Derives an address from seeds that already include the bump.
pub fn create_program_address(seeds: &[&[u8]], program_id: &Pubkey) -> Result<Pubkey> {
    if seeds.len() > MAX_SEEDS {
        return Err(DispatchError::address_derivation("Too many seeds"));
    }
    for seed in seeds {
        if seed.len() > MAX_SEED_LEN {
            return Err(DispatchError::address_derivation("Seed too long"));
        }
    }
    let digest = hash_seeds(seeds, None, program_id);
    if is_on_curve(&digest) {
        return Err(DispatchError::address_derivation(
            "Derived address lies on the curve",
        ));
    }
    Ok(Pubkey::new_from_array(digest))
}

/// Kinds of postbox settings accounts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SettingsKind {
    /// Title and description.
    Description,
    /// Owner list.
    OwnerInfo,
    /// Forum-level post restriction.
    PostRestriction,
}

impl SettingsKind {
    fn seed(&self) -> &'static [u8] {
        match self {
            SettingsKind::Description => DESCRIPTION_SETTINGS_SEED,
            SettingsKind::OwnerInfo => OWNER_INFO_SETTINGS_SEED,
            SettingsKind::PostRestriction => RESTRICTION_SETTINGS_SEED,
        }
    }
}

/// Typed derivations for every protocol entity on one cluster.
#[derive(Debug, Clone)]
pub struct AddressDeriver {
    addresses: ClusterAddresses,
}

impl AddressDeriver {
    /// Creates a deriver for the given cluster addresses.
    pub fn new(addresses: ClusterAddresses) -> Self {
        Self { addresses }
    }

    /// Returns the cluster addresses this deriver is bound to.
    pub fn addresses(&self) -> &ClusterAddresses {
        &self.addresses
    }

    /// Messaging program id.
    pub fn messaging_program(&self) -> &Pubkey {
        &self.addresses.messaging_program
    }

    /// Postbox program id.
    pub fn postbox_program(&self) -> &Pubkey {
        &self.addresses.postbox_program
    }

    /// Fee treasury.
    pub fn treasury(&self) -> &Pubkey {
        &self.addresses.treasury
    }

    // =========================================================================
    // Messaging
    // =========================================================================

    /// Mailbox of a receiver.
    pub fn mailbox(&self, owner: &Pubkey) -> Result<Pubkey> {
        let (address, _) = find_program_address(
            &[MESSAGING_PROTOCOL_SEED, MAILBOX_SEED, owner.as_ref()],
            &self.addresses.messaging_program,
        )?;
        Ok(address)
    }

    /// Message slot `index` of a receiver's mailbox.
    pub fn message(&self, owner: &Pubkey, index: u32) -> Result<Pubkey> {
        let mailbox = self.mailbox(owner)?;
        self.message_in(&mailbox, index)
    }

    /// Message slot `index` given an already-derived mailbox address.
    pub fn message_in(&self, mailbox: &Pubkey, index: u32) -> Result<Pubkey> {
        let idx = index_seed(index);
        let (address, _) = find_program_address(
            &[MESSAGING_PROTOCOL_SEED, MESSAGE_SEED, mailbox.as_ref(), &idx],
            &self.addresses.messaging_program,
        )?;
        Ok(address)
    }

    // =========================================================================
    // Postbox
    // =========================================================================

    /// Postbox root for a subject key and optional label.
    pub fn postbox(&self, target: &Pubkey, label: Option<&str>) -> Result<Pubkey> {
        let label = label.unwrap_or("").as_bytes();
        let (address, _) = find_program_address(
            &[POSTBOX_PROTOCOL_SEED, POSTBOX_SEED, target.as_ref(), label],
            &self.addresses.postbox_program,
        )?;
        Ok(address)
    }

    /// Post slot `id` under a postbox or a parent post.
    pub fn post(&self, parent: &Pubkey, id: u32) -> Result<Pubkey> {
        let idx = index_seed(id);
        let (address, _) = find_program_address(
            &[POSTBOX_PROTOCOL_SEED, POST_SEED, parent.as_ref(), &idx],
            &self.addresses.postbox_program,
        )?;
        Ok(address)
    }

    /// Moderator credential mint of a postbox.
    pub fn moderator_mint(&self, postbox: &Pubkey) -> Result<Pubkey> {
        let (address, _) = find_program_address(
            &[POSTBOX_PROTOCOL_SEED, MODERATOR_SEED, postbox.as_ref()],
            &self.addresses.postbox_program,
        )?;
        Ok(address)
    }

    /// Settings account of the given kind.
    pub fn settings(&self, postbox: &Pubkey, kind: SettingsKind) -> Result<Pubkey> {
        let (address, _) = find_program_address(
            &[
                POSTBOX_PROTOCOL_SEED,
                SETTINGS_SEED,
                postbox.as_ref(),
                kind.seed(),
            ],
            &self.addresses.postbox_program,
        )?;
        Ok(address)
    }

    /// Owner list settings account.
    pub fn owner_info(&self, postbox: &Pubkey) -> Result<Pubkey> {
        self.settings(postbox, SettingsKind::OwnerInfo)
    }

    /// Forum-level restriction settings account.
    pub fn post_restrictions(&self, postbox: &Pubkey) -> Result<Pubkey> {
        self.settings(postbox, SettingsKind::PostRestriction)
    }

    /// Description settings account.
    pub fn description(&self, postbox: &Pubkey) -> Result<Pubkey> {
        self.settings(postbox, SettingsKind::Description)
    }

    /// Local counter for one allocation bucket.
    pub fn bucket_counter(&self, postbox: &Pubkey, bucket: u32) -> Result<Pubkey> {
        let idx = index_seed(bucket);
        let (address, _) = find_program_address(
            &[POSTBOX_PROTOCOL_SEED, BUCKET_SEED, postbox.as_ref(), &idx],
            &self.addresses.postbox_program,
        )?;
        Ok(address)
    }

    /// Vote entry of a voter on a post. Same pair, same slot.
    pub fn vote_entry(&self, post: &Pubkey, voter: &Pubkey) -> Result<Pubkey> {
        let (address, _) = find_program_address(
            &[POSTBOX_PROTOCOL_SEED, VOTE_SEED, post.as_ref(), voter.as_ref()],
            &self.addresses.postbox_program,
        )?;
        Ok(address)
    }

    // =========================================================================
    // Token accounts
    // =========================================================================

    /// Associated token account of `owner` for `mint`.
    pub fn associated_token(&self, owner: &Pubkey, mint: &Pubkey) -> Result<Pubkey> {
        associated_token_address(owner, mint)
    }

    /// Metadata account of a mint.
    pub fn metadata(&self, mint: &Pubkey) -> Result<Pubkey> {
        metadata_address(mint)
    }
}

/// Associated token account of `owner` for `mint`.
pub fn associated_token_address(owner: &Pubkey, mint: &Pubkey) -> Result<Pubkey> {
    let (address, _) = find_program_address(
        &[owner.as_ref(), TOKEN_PROGRAM_ID.as_bytes(), mint.as_ref()],
        &ASSOCIATED_TOKEN_PROGRAM_ID,
    )?;
    Ok(address)
}

/// Metadata account of a mint.
pub fn metadata_address(mint: &Pubkey) -> Result<Pubkey> {
    let (address, _) = find_program_address(
        &[METADATA_SEED, METADATA_PROGRAM_ID.as_bytes(), mint.as_ref()],
        &METADATA_PROGRAM_ID,
    )?;
    Ok(address)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Cluster;

    fn deriver() -> AddressDeriver {
        AddressDeriver::new(ClusterAddresses::for_cluster(Cluster::Devnet).unwrap())
    }

    #[test]
    fn test_index_seed_is_little_endian() {
        assert_eq!(index_seed(1), [1, 0, 0, 0]);
        assert_eq!(index_seed(0x0102_0304), [4, 3, 2, 1]);
    }

    #[test]
    fn test_derivation_is_deterministic() {
        let d = deriver();
        let owner = Pubkey::new_unique();
        assert_eq!(d.message(&owner, 3).unwrap(), d.message(&owner, 3).unwrap());
        assert_eq!(d.mailbox(&owner).unwrap(), d.mailbox(&owner).unwrap());
    }

    #[test]
    fn test_index_and_owner_change_address() {
        let d = deriver();
        let owner = Pubkey::new_unique();
        let other = Pubkey::new_unique();
        assert_ne!(d.message(&owner, 3).unwrap(), d.message(&owner, 4).unwrap());
        assert_ne!(d.message(&owner, 3).unwrap(), d.message(&other, 3).unwrap());
    }

    #[test]
    fn test_entity_tags_separate_addresses() {
        let d = deriver();
        let key = Pubkey::new_unique();
        assert_ne!(d.post(&key, 0).unwrap(), d.bucket_counter(&key, 0).unwrap());
        assert_ne!(d.owner_info(&key).unwrap(), d.description(&key).unwrap());
        assert_ne!(d.postbox(&key, None).unwrap(), d.postbox(&key, Some("x")).unwrap());
    }

    #[test]
    fn test_derived_addresses_are_off_curve() {
        let d = deriver();
        for _ in 0..16 {
            let addr = d.mailbox(&Pubkey::new_unique()).unwrap();
            assert!(!is_on_curve(addr.as_bytes()));
        }
    }

    #[test]
    fn test_create_matches_find() {
        let program = Pubkey::new_unique();
        let seeds: &[&[u8]] = &[b"abc", b"def"];
        let (address, bump) = find_program_address(seeds, &program).unwrap();
        let bump_seed = [bump];
        let recreated =
            create_program_address(&[b"abc", b"def", &bump_seed], &program).unwrap();
        assert_eq!(address, recreated);
    }

    #[test]
    fn test_seed_limits() {
        let program = Pubkey::new_unique();
        let long = [0u8; 33];
        let err = find_program_address(&[&long], &program).unwrap_err();
        assert!(matches!(err, DispatchError::AddressDerivation(_)));

        let seed: &[u8] = b"s";
        let many = vec![seed; MAX_SEEDS];
        assert!(find_program_address(&many, &program).is_err());
    }

    #[test]
    fn test_long_postbox_label_fails() {
        let d = deriver();
        let label = "a".repeat(40);
        assert!(d.postbox(&Pubkey::new_unique(), Some(&label)).is_err());
    }
}

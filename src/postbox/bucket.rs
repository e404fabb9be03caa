//! Sharded post-id allocation.
//!
//! The top-level id space of a postbox is split into `B` buckets of `P`
//! slots. A poster always lands in the same bucket, and each bucket keeps
//! its own counter account, so posts from different buckets never write
//! the same counter. Global ids are `P * bucket + local` with `local` in
//! `1..=P`; a bucket that would pass `P` is full and the allocation is
//! rejected with [`DispatchError::BucketOverflow`].

use crate::config::BucketConfig;
use crate::error::{DispatchError, Result};
use crate::program::instructions::BucketSlot;
use crate::pubkey::Pubkey;
use sha2::{Digest, Sha256};
use tracing::debug;

/// One allocated id.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Allocation {
    /// Bucket the id came from.
    pub bucket: u32,
    /// Bucket-local id, `1..=capacity`.
    pub local_id: u32,
    /// Postbox-wide id.
    pub global_id: u32,
}

/// Maps identities to buckets and bucket-local counters to global ids.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BucketAllocator {
    config: BucketConfig,
}

impl BucketAllocator {
    /// Creates an allocator for a bucket shape.
    pub fn new(config: BucketConfig) -> Self {
        Self { config }
    }

    /// Number of buckets.
    pub fn num_buckets(&self) -> u32 {
        self.config.num_buckets()
    }

    /// Slots per bucket.
    pub fn capacity(&self) -> u32 {
        self.config.posts_per_bucket()
    }

    /// Bucket of a key: SHA-256 of the key bytes, first 8 bytes as a
    /// little-endian integer, modulo the bucket count.
    pub fn bucket_for(&self, key: &Pubkey) -> u32 {
        let digest = Sha256::digest(key.as_bytes());
        let mut head = [0u8; 8];
        head.copy_from_slice(&digest[..8]);
        (u64::from_le_bytes(head) % u64::from(self.config.num_buckets())) as u32
    }

    /// Bucket of an identity that is already a small integer.
    pub fn bucket_for_id(&self, id: u64) -> u32 {
        (id % u64::from(self.config.num_buckets())) as u32
    }

    /// Global id of `local_id` in `bucket`.
    pub fn global_id(&self, bucket: u32, local_id: u32) -> Result<u32> {
        let capacity = self.capacity();
        if bucket >= self.num_buckets() {
            return Err(DispatchError::invalid_input(format!(
                "Bucket {} out of range (0..{})",
                bucket,
                self.num_buckets()
            )));
        }
        if local_id == 0 || local_id > capacity {
            return Err(DispatchError::BucketOverflow { bucket, capacity });
        }
        // BucketConfig::new guarantees capacity * (buckets + 1) fits in u32.
        Ok(capacity * bucket + local_id)
    }

    /// Splits a global id back into `(bucket, local_id)`.
    pub fn split(&self, global_id: u32) -> Option<(u32, u32)> {
        if global_id == 0 {
            return None;
        }
        let capacity = self.capacity();
        let bucket = (global_id - 1) / capacity;
        if bucket >= self.num_buckets() {
            return None;
        }
        Some((bucket, global_id - capacity * bucket))
    }

    /// Next id in `bucket` given its current counter value.
    pub fn next(&self, bucket: u32, max_post_id: u32) -> Result<Allocation> {
        let local_id = max_post_id
            .checked_add(1)
            .ok_or(DispatchError::BucketOverflow {
                bucket,
                capacity: self.capacity(),
            })?;
        let global_id = self.global_id(bucket, local_id)?;
        debug!(
            "Allocated local id {} in bucket {} (global {})",
            local_id, bucket, global_id
        );
        Ok(Allocation {
            bucket,
            local_id,
            global_id,
        })
    }

    /// Global ids already handed out by `bucket`, ascending.
    pub fn issued_ids(&self, bucket: u32, max_post_id: u32) -> impl Iterator<Item = u32> {
        let capacity = self.capacity();
        let last = max_post_id.min(capacity);
        (1..=last).map(move |local| capacity * bucket + local)
    }

    /// Wire form of `bucket` for the create-post instruction.
    pub fn slot(&self, bucket: u32) -> BucketSlot {
        BucketSlot {
            index: bucket,
            capacity: self.capacity(),
        }
    }
}

/// Local tally of every bucket counter, for planning allocations without
/// a ledger round trip per bucket.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BucketState {
    allocator: BucketAllocator,
    bucket_max_post_id: Vec<u32>,
}

impl BucketState {
    /// All buckets empty.
    pub fn new(allocator: BucketAllocator) -> Self {
        Self {
            allocator,
            bucket_max_post_id: vec![0; allocator.num_buckets() as usize],
        }
    }

    /// Starts from counters read off the ledger; missing entries are empty.
    pub fn from_counters(allocator: BucketAllocator, counters: &[u32]) -> Self {
        let mut state = Self::new(allocator);
        for (slot, value) in state.bucket_max_post_id.iter_mut().zip(counters) {
            *slot = *value;
        }
        state
    }

    /// Current counter of `bucket`.
    pub fn max_post_id(&self, bucket: u32) -> u32 {
        self.bucket_max_post_id
            .get(bucket as usize)
            .copied()
            .unwrap_or(0)
    }

    /// Global ids already handed out across all buckets, bucket by bucket.
    pub fn issued_ids(&self) -> impl Iterator<Item = u32> + '_ {
        self.bucket_max_post_id
            .iter()
            .enumerate()
            .flat_map(move |(bucket, max)| self.allocator.issued_ids(bucket as u32, *max))
    }

    /// Allocates the next id in `bucket`, leaving the counter unchanged on
    /// overflow.
    pub fn allocate(&mut self, bucket: u32) -> Result<Allocation> {
        let current = self.max_post_id(bucket);
        let allocation = self.allocator.next(bucket, current)?;
        self.bucket_max_post_id[bucket as usize] = allocation.local_id;
        Ok(allocation)
    }

    /// Allocates for a key in its hashed bucket.
    pub fn allocate_for(&mut self, key: &Pubkey) -> Result<Allocation> {
        self.allocate(self.allocator.bucket_for(key))
    }
}

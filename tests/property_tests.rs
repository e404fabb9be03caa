//! Property tests over randomly generated inputs.
//!
//! These check that the allocation, derivation and codec properties hold
//! across many generated cases, and that the mailbox and vote state seen
//! through the client matches a simple model of the ledger rules.

mod common;

use common::{actor, ledger};
use dispatch::address::{find_program_address, index_seed, is_on_curve};
use dispatch::postbox::{BucketAllocator, BucketState};
use dispatch::program::accounts::VoteDirection;
use dispatch::{
    BucketConfig, DispatchError, Forum, ForumInfo, Mailbox, MailboxOptions, MessagePayload,
    PayloadCodec, Pubkey,
};
use rand::{rngs::OsRng, seq::SliceRandom, Rng};
use std::collections::{BTreeSet, HashSet};

fn random_text(rng: &mut impl Rng, max_len: usize) -> String {
    let len = rng.gen_range(0..max_len);
    (0..len)
        .map(|_| match rng.gen_range(0..4) {
            0 => rng.gen_range('a'..='z'),
            1 => rng.gen_range('0'..='9'),
            2 => ['é', 'ß', '漢', '🦀', ' '][rng.gen_range(0..5)],
            _ => rng.gen_range('A'..='Z'),
        })
        .collect()
}

/// Property: derived addresses are deterministic, off-curve and distinct
#[test]
fn property_address_derivation() {
    let mut rng = OsRng;
    let program = Pubkey::new_unique();
    let mut seen = HashSet::new();

    for _ in 0..100 {
        let owner = Pubkey::new_unique();
        let index = index_seed(rng.gen());
        let seeds: [&[u8]; 4] = [b"messaging", b"message", owner.as_bytes(), &index];

        let (address, bump) = find_program_address(&seeds, &program).unwrap();
        let (again, bump_again) = find_program_address(&seeds, &program).unwrap();
        assert_eq!((address, bump), (again, bump_again));
        assert!(!is_on_curve(address.as_bytes()));
        assert!(seen.insert(address), "Derived address collision");
    }
}

/// Property: over-long seeds are always rejected, never panicking
#[test]
fn property_seed_limits() {
    let mut rng = OsRng;
    let program = Pubkey::new_unique();

    for _ in 0..50 {
        let len = rng.gen_range(33..100);
        let seed = vec![rng.gen::<u8>(); len];
        let err = find_program_address(&[&seed], &program).unwrap_err();
        assert!(matches!(err, DispatchError::AddressDerivation(_)));
    }
}

/// Property: bucketed allocation never issues the same id twice and
/// every id maps back to the bucket that issued it
#[test]
fn property_bucket_allocation_unique() {
    let mut rng = OsRng;

    for _ in 0..30 {
        let buckets = rng.gen_range(1..16);
        let capacity = rng.gen_range(1..32);
        let allocator = BucketAllocator::new(BucketConfig::new(buckets, capacity).unwrap());
        let mut state = BucketState::new(allocator);
        let mut issued = HashSet::new();

        for _ in 0..200 {
            let key = Pubkey::new_unique();
            let bucket = allocator.bucket_for(&key);
            assert!(bucket < buckets);
            assert_eq!(allocator.bucket_for(&key), bucket);

            match state.allocate_for(&key) {
                Ok(allocation) => {
                    assert_eq!(allocation.bucket, bucket);
                    assert!((1..=capacity).contains(&allocation.local_id));
                    assert!(issued.insert(allocation.global_id), "Duplicate id");
                    assert_eq!(
                        allocator.split(allocation.global_id),
                        Some((bucket, allocation.local_id))
                    );
                }
                Err(DispatchError::BucketOverflow { bucket: full, .. }) => {
                    assert_eq!(full, bucket);
                    assert_eq!(state.max_post_id(bucket), capacity);
                }
                Err(e) => panic!("Unexpected error: {}", e),
            }
        }
    }
}

/// Property: encode then decode returns the payload, plain or obfuscated
#[test]
fn property_codec_roundtrip() {
    let mut rng = OsRng;

    for _ in 0..100 {
        let mut payload = MessagePayload::new(random_text(&mut rng, 400)).with_ts(rng.gen());
        if rng.gen_bool(0.5) {
            payload = payload.with_subject(random_text(&mut rng, 40));
        }
        if rng.gen_bool(0.3) {
            payload = payload.with_meta("topic", serde_json::Value::Bool(true));
        }

        let plain = PayloadCodec::encode(&payload).unwrap();
        assert_eq!(PayloadCodec::decode(&plain).unwrap(), payload);

        let receiver = Pubkey::new_unique();
        let sealed = PayloadCodec::encode_obfuscated(&payload, &receiver).unwrap();
        assert_eq!(PayloadCodec::decode_for(&sealed, &receiver).unwrap(), payload);
        assert!(PayloadCodec::decode_for(&sealed, &Pubkey::new_unique()).is_err());
    }
}

/// Property: arbitrary bytes never make the lenient decoder panic
#[test]
fn property_lenient_decode_total() {
    let mut rng = OsRng;
    let reader = Pubkey::new_unique();

    for _ in 0..200 {
        let len = rng.gen_range(0..512);
        let mut bytes = vec![0u8; len];
        rng.fill(&mut bytes[..]);
        let result = std::panic::catch_unwind(|| PayloadCodec::decode_lenient(&bytes, &reader));
        assert!(result.is_ok(), "Lenient decode panicked on {} bytes", len);
    }
}

/// Property: after random sends and deletes the visible range is exactly
/// the live slots at or above the read pointer
#[tokio::test]
async fn property_mailbox_holes_match_model() {
    let mut rng = OsRng;

    for _ in 0..5 {
        let ledger = ledger();
        let sender = actor(&ledger);
        let receiver = actor(&ledger);
        let outbox = Mailbox::new(sender.ctx.clone(), MailboxOptions::default());
        let inbox = Mailbox::new(receiver.ctx.clone(), MailboxOptions::default());

        let sends = rng.gen_range(1..10u32);
        for i in 0..sends {
            outbox
                .send_text(&receiver.pubkey(), &format!("#{}", i))
                .await
                .unwrap();
        }

        let mut live: BTreeSet<u32> = (0..sends).collect();
        let mut read = 0u32;
        let mut order: Vec<u32> = (0..sends).collect();
        order.shuffle(&mut rng);
        let deletes = rng.gen_range(0..=sends as usize);
        for index in order.into_iter().take(deletes) {
            inbox.delete(index, None).await.unwrap();
            live.remove(&index);
            if index == read {
                read += 1;
            }
        }

        let expected: Vec<u32> = live.range(read..).copied().collect();
        let visible: Vec<u32> = inbox
            .fetch_messages()
            .await
            .unwrap()
            .iter()
            .map(|m| m.index)
            .collect();
        assert_eq!(visible, expected);

        let counters = inbox.count_ex().await.unwrap();
        assert_eq!(counters.message_count, sends);
        assert_eq!(counters.read_message_count, read);
        assert_eq!(inbox.count().await.unwrap(), expected.len());
    }
}

/// Property: however a voter votes, they count at most once
#[tokio::test]
async fn property_votes_counted_once_per_voter() {
    let mut rng = OsRng;
    let ledger = ledger();
    let owner = actor(&ledger);
    let forum_id = Pubkey::new_unique();
    let forum = Forum::new(owner.ctx.clone(), forum_id).unwrap();
    forum.create_forum(&ForumInfo::default()).await.unwrap();
    forum
        .create_topic(MessagePayload::new("vote on me"), None)
        .await
        .unwrap();

    let voters: Vec<_> = (0..4).map(|_| actor(&ledger)).collect();
    let mut model: Vec<Option<VoteDirection>> = vec![None; voters.len()];

    for _ in 0..30 {
        let who = rng.gen_range(0..voters.len());
        let direction = if rng.gen_bool(0.5) {
            VoteDirection::Up
        } else {
            VoteDirection::Down
        };
        let voter_forum = Forum::new(voters[who].ctx.clone(), forum_id).unwrap();
        let topic = voter_forum.topics().await.unwrap().remove(0);

        let result = match direction {
            VoteDirection::Up => voter_forum.vote_up(&topic).await,
            VoteDirection::Down => voter_forum.vote_down(&topic).await,
        };
        if model[who] == Some(direction) {
            assert!(result.unwrap_err().is_conflict());
        } else {
            result.unwrap();
            model[who] = Some(direction);
        }
        assert_eq!(voter_forum.vote_of(&topic).await.unwrap(), model[who]);

        let topic = forum.topics().await.unwrap().remove(0);
        let ups = model.iter().filter(|v| **v == Some(VoteDirection::Up)).count();
        let downs = model.iter().filter(|v| **v == Some(VoteDirection::Down)).count();
        assert_eq!(topic.up_votes as usize, ups);
        assert_eq!(topic.down_votes as usize, downs);
    }
}

//! End-to-end tests for forums and the post tree.
//!
//! These tests drive complete workflows from forum creation through
//! topics, threads, votes and moderation against the in-memory ledger.

mod common;

use common::{actor, actor_with_config, ledger, test_config, CountingLedger};
use dispatch::constants::{POSTBOX_CREATION_FEE_LAMPORTS, POST_FEE_LAMPORTS, VOTE_FEE_LAMPORTS};
use dispatch::postbox::{PostParent, MAX_REPLY_DEPTH};
use dispatch::program::accounts::VoteDirection;
use dispatch::{
    BucketConfig, DispatchContext, DispatchError, Forum, ForumInfo, MessagePayload, Postbox,
    PostRestriction, PostboxTarget, Pubkey, Wallet,
};

fn info(title: &str) -> ForumInfo {
    ForumInfo {
        title: title.to_string(),
        description: format!("{} discussion", title),
        ..ForumInfo::default()
    }
}

// =============================================================================
// Forum workflow
// =============================================================================

/// Complete forum workflow: create forum -> topic -> posts -> replies
#[tokio::test]
async fn test_complete_forum_workflow() {
    let ledger = ledger();
    let owner = actor(&ledger);
    let alice = actor(&ledger);
    let bob = actor(&ledger);
    let forum_id = Pubkey::new_unique();

    let owner_forum = Forum::new(owner.ctx.clone(), forum_id).unwrap();
    assert!(!owner_forum.exists().await.unwrap());
    assert!(owner_forum.topics().await.unwrap().is_empty());

    let signatures = owner_forum.create_forum(&info("Rust")).await.unwrap();
    assert_eq!(signatures.len(), 1);
    assert!(owner_forum.exists().await.unwrap());
    assert_eq!(owner_forum.owners().await.unwrap(), vec![owner.pubkey()]);
    let description = owner_forum.description().await.unwrap().unwrap();
    assert_eq!(description.title, "Rust");

    // Alice opens a topic, Bob posts into it, Alice replies to Bob.
    let alice_forum = Forum::new(alice.ctx.clone(), forum_id).unwrap();
    let bob_forum = Forum::new(bob.ctx.clone(), forum_id).unwrap();
    assert_eq!(alice_forum.address(), owner_forum.address());

    let created = alice_forum
        .create_topic(MessagePayload::new("Borrow checker tips"), None)
        .await
        .unwrap();
    assert_eq!(created.id, 0);

    let topics = bob_forum.topics().await.unwrap();
    assert_eq!(topics.len(), 1);
    let topic = &topics[0];
    assert!(topic.is_topic());
    assert_eq!(topic.poster, alice.pubkey());
    assert_eq!(topic.payload.body, "Borrow checker tips");

    let bob_post = bob_forum
        .create_forum_post(&MessagePayload::new("Clone less"), topic)
        .await
        .unwrap();
    assert_eq!(bob_post.parent, PostParent::Post(topic.address));

    let thread = alice_forum.topic_messages(topic).await.unwrap();
    assert_eq!(thread.len(), 1);
    assert!(thread[0].is_reply());
    assert!(!thread[0].is_topic());

    alice_forum
        .reply_to_forum_post(&MessagePayload::new("Agreed"), &thread[0])
        .await
        .unwrap();
    alice_forum
        .reply_to_forum_post(&MessagePayload::new("Also: lifetimes"), &thread[0])
        .await
        .unwrap();

    let replies = bob_forum.replies(&thread[0]).await.unwrap();
    let bodies: Vec<&str> = replies.iter().map(|p| p.payload.body.as_str()).collect();
    assert_eq!(bodies, vec!["Agreed", "Also: lifetimes"]);

    // Replies never show up as topics.
    assert_eq!(bob_forum.topics().await.unwrap().len(), 1);
}

#[tokio::test]
async fn test_topics_are_newest_first() {
    let ledger = ledger();
    let owner = actor(&ledger);
    let forum = Forum::new(owner.ctx.clone(), Pubkey::new_unique()).unwrap();
    forum.create_forum(&info("Ordering")).await.unwrap();

    for (i, ts) in [100u64, 300, 200].into_iter().enumerate() {
        forum
            .create_topic(MessagePayload::new(format!("topic {}", i)).with_ts(ts), None)
            .await
            .unwrap();
    }

    let stamps: Vec<u64> = forum
        .topics()
        .await
        .unwrap()
        .iter()
        .map(|t| t.payload.ts)
        .collect();
    assert_eq!(stamps, vec![300, 200, 100]);

    let topic = forum.topics().await.unwrap().remove(0);
    for ts in [50u64, 10, 30] {
        forum
            .create_forum_post(&MessagePayload::new("post").with_ts(ts), &topic)
            .await
            .unwrap();
    }
    let stamps: Vec<u64> = forum
        .topic_messages(&topic)
        .await
        .unwrap()
        .iter()
        .map(|p| p.payload.ts)
        .collect();
    assert_eq!(stamps, vec![10, 30, 50]);
}

#[tokio::test]
async fn test_forum_post_requires_topic() {
    let ledger = ledger();
    let owner = actor(&ledger);
    let forum = Forum::new(owner.ctx.clone(), Pubkey::new_unique()).unwrap();
    forum.create_forum(&info("Topics")).await.unwrap();

    let topic = forum
        .create_topic(MessagePayload::new("topic"), None)
        .await
        .unwrap();
    let topic = forum
        .postbox()
        .get_post(topic.parent, topic.id)
        .await
        .unwrap();
    forum
        .create_forum_post(&MessagePayload::new("inside"), &topic)
        .await
        .unwrap();
    let inner = forum.topic_messages(&topic).await.unwrap().remove(0);

    let err = forum
        .create_forum_post(&MessagePayload::new("nested"), &inner)
        .await
        .unwrap_err();
    assert!(matches!(err, DispatchError::InvalidInput(_)));
}

#[tokio::test]
async fn test_create_forum_twice_is_already_initialized() {
    let ledger = ledger();
    let owner = actor(&ledger);
    let other = actor(&ledger);
    let forum_id = Pubkey::new_unique();
    let treasury = *owner.ctx.deriver().treasury();
    let treasury_before = ledger.balance(&treasury);

    Forum::new(owner.ctx.clone(), forum_id)
        .unwrap()
        .create_forum(&info("Once"))
        .await
        .unwrap();
    assert_eq!(
        ledger.balance(&treasury) - treasury_before,
        POSTBOX_CREATION_FEE_LAMPORTS
    );

    let err = Forum::new(other.ctx.clone(), forum_id)
        .unwrap()
        .create_forum(&info("Twice"))
        .await
        .unwrap_err();
    assert!(matches!(err, DispatchError::AlreadyInitialized(_)));
}

#[tokio::test]
async fn test_posting_into_missing_forum_is_not_found() {
    let ledger = ledger();
    let alice = actor(&ledger);
    let forum = Forum::new(alice.ctx.clone(), Pubkey::new_unique()).unwrap();
    let err = forum
        .create_topic(MessagePayload::new("hello?"), None)
        .await
        .unwrap_err();
    assert!(err.is_not_found());
}

// =============================================================================
// Editing and deleting
// =============================================================================

#[tokio::test]
async fn test_edit_keeps_topic_flag_and_checks_poster() {
    let ledger = ledger();
    let owner = actor(&ledger);
    let mallory = actor(&ledger);
    let forum_id = Pubkey::new_unique();
    let forum = Forum::new(owner.ctx.clone(), forum_id).unwrap();
    forum.create_forum(&info("Edits")).await.unwrap();
    forum
        .create_topic(MessagePayload::new("Typo in titel"), None)
        .await
        .unwrap();
    let topic = forum.topics().await.unwrap().remove(0);

    forum
        .edit_forum_post(&topic, MessagePayload::new("Typo in title"))
        .await
        .unwrap();
    let topic = forum.topics().await.unwrap().remove(0);
    assert_eq!(topic.payload.body, "Typo in title");
    assert!(topic.is_topic());

    let err = Forum::new(mallory.ctx.clone(), forum_id)
        .unwrap()
        .edit_forum_post(&topic, MessagePayload::new("pwned"))
        .await
        .unwrap_err();
    assert!(matches!(err, DispatchError::PermissionDenied(_)));
}

#[tokio::test]
async fn test_delete_own_post_and_moderator_delete() {
    let ledger = ledger();
    let owner = actor(&ledger);
    let moderator = actor(&ledger);
    let alice = actor(&ledger);
    let forum_id = Pubkey::new_unique();

    let owner_forum = Forum::new(owner.ctx.clone(), forum_id).unwrap();
    let signatures = owner_forum
        .create_forum(&ForumInfo {
            moderators: vec![moderator.pubkey()],
            ..info("Moderated")
        })
        .await
        .unwrap();
    assert_eq!(signatures.len(), 2);
    assert_eq!(
        owner_forum.moderators().await.unwrap(),
        vec![moderator.pubkey()]
    );
    assert!(owner_forum.is_moderator(&moderator.pubkey()).await.unwrap());
    assert!(!owner_forum.is_moderator(&alice.pubkey()).await.unwrap());

    let alice_forum = Forum::new(alice.ctx.clone(), forum_id).unwrap();
    alice_forum
        .create_topic(MessagePayload::new("spam"), None)
        .await
        .unwrap();
    alice_forum
        .create_topic(MessagePayload::new("regret"), None)
        .await
        .unwrap();
    let topics = alice_forum.topics().await.unwrap();
    assert_eq!(topics.len(), 2);
    let (regret, spam) = (&topics[0], &topics[1]);
    assert_eq!(spam.payload.body, "spam");

    // Alice is no moderator, and the owner holds no credential either.
    let err = alice_forum.delete_forum_post(spam, true).await.unwrap_err();
    assert!(matches!(err, DispatchError::PermissionDenied(_)));
    let err = owner_forum.delete_forum_post(spam, true).await.unwrap_err();
    assert!(matches!(err, DispatchError::PermissionDenied(_)));

    Forum::new(moderator.ctx.clone(), forum_id)
        .unwrap()
        .delete_forum_post(spam, true)
        .await
        .unwrap();
    alice_forum.delete_forum_post(regret, false).await.unwrap();
    assert!(alice_forum.topics().await.unwrap().is_empty());

    // Deleted slots stay holes; new topics take fresh ids.
    let created = alice_forum
        .create_topic(MessagePayload::new("fresh start"), None)
        .await
        .unwrap();
    assert_eq!(created.id, 2);
}

#[tokio::test]
async fn test_read_only_wallet_cannot_delete_posts() {
    let ledger = ledger();
    let alice = actor(&ledger);
    let target = PostboxTarget::labeled(Pubkey::new_unique(), "read only");
    let alice_box = Postbox::new(alice.ctx.clone(), target.clone()).unwrap();
    alice_box.initialize(Vec::new(), None).await.unwrap();
    let created = alice_box
        .create_post(&MessagePayload::new("mine"), None)
        .await
        .unwrap();

    let counting = CountingLedger::new(ledger.clone());
    let viewer = DispatchContext::new(
        counting.clone(),
        Wallet::read_only(alice.pubkey()),
        test_config(),
    )
    .unwrap();
    let viewer_box = Postbox::new(viewer, target).unwrap();
    let attempts = ledger.submission_attempts();

    let err = viewer_box.delete_post(&created.address).await.unwrap_err();
    assert!(matches!(err, DispatchError::Signing(_)));
    let err = viewer_box
        .delete_post_as_moderator(&created.address)
        .await
        .unwrap_err();
    assert!(matches!(err, DispatchError::Signing(_)));

    assert_eq!(counting.calls(), 0);
    assert_eq!(ledger.submission_attempts(), attempts);
    assert_eq!(alice_box.fetch_posts().await.unwrap().len(), 1);
}

// =============================================================================
// Votes
// =============================================================================

#[tokio::test]
async fn test_votes_flip_and_reject_repeats() {
    let ledger = ledger();
    let owner = actor(&ledger);
    let alice = actor(&ledger);
    let bob = actor(&ledger);
    let forum_id = Pubkey::new_unique();
    let owner_forum = Forum::new(owner.ctx.clone(), forum_id).unwrap();
    owner_forum.create_forum(&info("Votes")).await.unwrap();
    owner_forum
        .create_topic(MessagePayload::new("Rate me"), None)
        .await
        .unwrap();
    let topic = owner_forum.topics().await.unwrap().remove(0);

    let alice_forum = Forum::new(alice.ctx.clone(), forum_id).unwrap();
    let bob_forum = Forum::new(bob.ctx.clone(), forum_id).unwrap();
    assert!(alice_forum.can_vote(&topic).await.unwrap());
    assert_eq!(alice_forum.vote_of(&topic).await.unwrap(), None);

    let treasury = *owner.ctx.deriver().treasury();
    let before = ledger.balance(&treasury);
    alice_forum.vote_up(&topic).await.unwrap();
    bob_forum.vote_up(&topic).await.unwrap();
    assert_eq!(ledger.balance(&treasury) - before, 2 * VOTE_FEE_LAMPORTS);

    let topic = owner_forum.topics().await.unwrap().remove(0);
    assert_eq!((topic.up_votes, topic.down_votes), (2, 0));
    assert_eq!(
        alice_forum.vote_of(&topic).await.unwrap(),
        Some(VoteDirection::Up)
    );

    let err = alice_forum.vote_up(&topic).await.unwrap_err();
    assert!(err.is_conflict());

    alice_forum.vote_down(&topic).await.unwrap();
    let topic = owner_forum.topics().await.unwrap().remove(0);
    assert_eq!((topic.up_votes, topic.down_votes), (1, 1));
    assert_eq!(topic.score(), 0);
    assert_eq!(
        alice_forum.vote_of(&topic).await.unwrap(),
        Some(VoteDirection::Down)
    );
    assert_eq!(owner_forum.vote_of(&topic).await.unwrap(), None);
}

// =============================================================================
// Settings
// =============================================================================

#[tokio::test]
async fn test_settings_are_owner_only() {
    let ledger = ledger();
    let owner = actor(&ledger);
    let co_owner = actor(&ledger);
    let mallory = actor(&ledger);
    let forum_id = Pubkey::new_unique();
    let forum = Forum::new(owner.ctx.clone(), forum_id).unwrap();
    forum.create_forum(&info("Settings")).await.unwrap();

    forum
        .set_description("Settings v2", "Now with co-owners")
        .await
        .unwrap();
    let description = forum.description().await.unwrap().unwrap();
    assert_eq!(description.title, "Settings v2");
    assert_eq!(description.desc, "Now with co-owners");

    forum
        .set_owners(vec![owner.pubkey(), co_owner.pubkey()])
        .await
        .unwrap();
    assert!(forum.is_owner(&co_owner.pubkey()).await.unwrap());

    let co_forum = Forum::new(co_owner.ctx.clone(), forum_id).unwrap();
    co_forum.add_moderator(&mallory.pubkey()).await.unwrap();
    assert!(forum.is_moderator(&mallory.pubkey()).await.unwrap());

    let mallory_forum = Forum::new(mallory.ctx.clone(), forum_id).unwrap();
    let err = mallory_forum
        .set_description("Mine now", "")
        .await
        .unwrap_err();
    assert!(matches!(err, DispatchError::PermissionDenied(_)));
    let err = mallory_forum
        .add_moderator(&mallory.pubkey())
        .await
        .unwrap_err();
    assert!(matches!(err, DispatchError::PermissionDenied(_)));
    assert!(!forum.is_owner(&mallory.pubkey()).await.unwrap());
}

#[tokio::test]
async fn test_initialize_with_explicit_owners() {
    let ledger = ledger();
    let payer = actor(&ledger);
    let owner = actor(&ledger);
    let forum = Forum::new(payer.ctx.clone(), Pubkey::new_unique()).unwrap();
    forum
        .create_forum(&ForumInfo {
            owners: vec![owner.pubkey()],
            ..info("Delegated")
        })
        .await
        .unwrap();
    assert_eq!(forum.owners().await.unwrap(), vec![owner.pubkey()]);
    assert!(!forum.is_owner(&payer.pubkey()).await.unwrap());
}

// =============================================================================
// Personal postboxes and buckets
// =============================================================================

#[tokio::test]
async fn test_personal_postbox_requires_target_signer() {
    let ledger = ledger();
    let alice = actor(&ledger);
    let bob = actor(&ledger);

    let own = Postbox::new(alice.ctx.clone(), PostboxTarget::personal(alice.pubkey())).unwrap();
    own.initialize(Vec::new(), None).await.unwrap();
    assert_eq!(own.owners().await.unwrap(), vec![alice.pubkey()]);
    assert!(own.description().await.unwrap().is_none());

    let foreign = Postbox::new(bob.ctx.clone(), PostboxTarget::personal(alice.pubkey())).unwrap();
    assert_eq!(foreign.address(), own.address());

    let stranger = Postbox::new(bob.ctx.clone(), PostboxTarget::personal(Pubkey::new_unique()))
        .unwrap();
    let err = stranger.initialize(Vec::new(), None).await.unwrap_err();
    assert!(matches!(err, DispatchError::PermissionDenied(_)));
}

#[tokio::test]
async fn test_post_fee_and_slot_order() {
    let ledger = ledger();
    let alice = actor(&ledger);
    let postbox = Postbox::new(
        alice.ctx.clone(),
        PostboxTarget::labeled(Pubkey::new_unique(), "general"),
    )
    .unwrap();
    postbox.initialize(Vec::new(), None).await.unwrap();

    let treasury = *alice.ctx.deriver().treasury();
    let before = ledger.balance(&treasury);
    for i in 0..3 {
        let created = postbox
            .create_post(&MessagePayload::new(format!("post {}", i)), None)
            .await
            .unwrap();
        assert_eq!(created.id, i);
    }
    assert_eq!(ledger.balance(&treasury) - before, 3 * POST_FEE_LAMPORTS);
    assert_eq!(postbox.account().await.unwrap().max_child_id, 3);

    let ids: Vec<u32> = postbox.fetch_posts().await.unwrap().iter().map(|p| p.id).collect();
    assert_eq!(ids, vec![0, 1, 2]);
    assert!(postbox
        .get_post(PostParent::Postbox(*postbox.address()), 9)
        .await
        .unwrap_err()
        .is_not_found());
}

#[tokio::test]
async fn test_bucketed_posts_get_disjoint_ids() {
    let ledger = ledger();
    let buckets = BucketConfig::new(4, 16).unwrap();
    let config = test_config().with_buckets(buckets);
    let owner = actor_with_config(&ledger, config.clone());
    let target = PostboxTarget::labeled(Pubkey::new_unique(), "sharded");

    let owner_box = Postbox::new(owner.ctx.clone(), target.clone()).unwrap();
    owner_box.initialize(Vec::new(), None).await.unwrap();

    let mut ids = Vec::new();
    for _ in 0..5 {
        let user = actor_with_config(&ledger, config.clone());
        let postbox = Postbox::new(user.ctx.clone(), target.clone()).unwrap();
        for _ in 0..2 {
            let created = postbox
                .create_post(&MessagePayload::new("sharded"), None)
                .await
                .unwrap();
            let bucket = (created.id - 1) / 16;
            assert!(bucket < 4);
            ids.push(created.id);
        }
    }

    let mut unique = ids.clone();
    unique.sort_unstable();
    unique.dedup();
    assert_eq!(unique.len(), ids.len());
    // Bucketed allocation never moves the unsharded counter.
    assert_eq!(owner_box.account().await.unwrap().max_child_id, 0);

    let mut listed: Vec<u32> = owner_box
        .fetch_posts()
        .await
        .unwrap()
        .iter()
        .map(|p| p.id)
        .collect();
    listed.sort_unstable();
    assert_eq!(listed, unique);
}

#[tokio::test]
async fn test_bucketed_allocation_follows_bucket_counters() {
    let ledger = ledger();
    let config = test_config().with_buckets(BucketConfig::new(2, 2).unwrap());
    let alice = actor_with_config(&ledger, config);
    let target = PostboxTarget::labeled(Pubkey::new_unique(), "tiny buckets");
    let postbox = Postbox::new(alice.ctx.clone(), target).unwrap();
    postbox.initialize(Vec::new(), None).await.unwrap();

    let first = postbox
        .create_post(&MessagePayload::new("one"), None)
        .await
        .unwrap();
    let second = postbox
        .create_post(&MessagePayload::new("two"), None)
        .await
        .unwrap();
    let bucket = (first.id - 1) / 2;
    assert_eq!(first.id, 2 * bucket + 1);
    assert_eq!(second.id, first.id + 1);

    let err = postbox
        .create_post(&MessagePayload::new("three"), None)
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        DispatchError::BucketOverflow { capacity: 2, .. }
    ));
    let listed: Vec<u32> = postbox
        .fetch_posts()
        .await
        .unwrap()
        .iter()
        .map(|p| p.id)
        .collect();
    assert_eq!(listed, vec![first.id, second.id]);
}

#[tokio::test]
async fn test_restriction_resolves_through_reply_chain() {
    let ledger = ledger();
    let alice = actor(&ledger);
    let postbox = Postbox::new(
        alice.ctx.clone(),
        PostboxTarget::labeled(Pubkey::new_unique(), "chain"),
    )
    .unwrap();
    postbox.initialize(Vec::new(), None).await.unwrap();

    let open = postbox
        .create_post(&MessagePayload::new("open"), Some(PostRestriction::None))
        .await
        .unwrap();
    let plain = postbox
        .create_post(&MessagePayload::new("plain"), None)
        .await
        .unwrap();
    let child = postbox
        .reply(&open.address, &MessagePayload::new("child"))
        .await
        .unwrap();
    let grandchild = postbox
        .reply(&child.address, &MessagePayload::new("grandchild"))
        .await
        .unwrap();

    let gated = PostRestriction::NftOwnership {
        collection_id: Pubkey::new_unique(),
    };
    postbox.set_restriction(gated.clone()).await.unwrap();

    assert_eq!(postbox.restriction_for(None).await.unwrap(), gated);
    assert_eq!(
        postbox.restriction_for(Some(&plain.address)).await.unwrap(),
        gated
    );
    // The nearest set override wins, even when it is an explicit `None`.
    assert_eq!(
        postbox
            .restriction_for(Some(&grandchild.address))
            .await
            .unwrap(),
        PostRestriction::None
    );
    assert!(postbox.can_post(Some(&grandchild.address)).await.unwrap());
    assert!(!postbox.can_post(Some(&plain.address)).await.unwrap());
}

#[tokio::test]
async fn test_reply_chain_depth_is_bounded() {
    let ledger = ledger();
    let alice = actor(&ledger);
    let postbox = Postbox::new(
        alice.ctx.clone(),
        PostboxTarget::labeled(Pubkey::new_unique(), "deep"),
    )
    .unwrap();
    postbox.initialize(Vec::new(), None).await.unwrap();

    let mut parent = postbox
        .create_post(&MessagePayload::new("root"), None)
        .await
        .unwrap()
        .address;
    for depth in 0..MAX_REPLY_DEPTH {
        parent = postbox
            .reply(&parent, &MessagePayload::new(format!("level {}", depth)))
            .await
            .unwrap()
            .address;
    }
    assert!(postbox.restriction_for(Some(&parent)).await.is_err());
}

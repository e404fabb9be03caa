//! Topic and thread semantics over a postbox.
//!
//! A forum is the labeled postbox of a community key (typically an NFT
//! collection id). Topics are top-level posts whose payload carries
//! `meta.topic = true`; forum posts are replies under a topic and replies
//! under those. Listings are sorted client-side: topics newest first,
//! thread contents oldest first.

use crate::codec::MessagePayload;
use crate::context::DispatchContext;
use crate::error::{DispatchError, Result};
use crate::postbox::{CreatedPost, Post, Postbox, PostboxTarget};
use crate::program::accounts::{DescriptionAccount, PostRestriction, VoteDirection};
use crate::pubkey::{Pubkey, Signature};
use serde_json::Value;
use tracing::{info, instrument};

/// Postbox label under which forums are created.
pub const FORUM_LABEL: &str = "Public";

/// Metadata key marking a post as a topic.
pub const TOPIC_META_KEY: &str = "topic";

/// Initial forum settings.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ForumInfo {
    /// Owners; the wallet when empty.
    pub owners: Vec<Pubkey>,
    /// Keys to receive a moderator credential at creation.
    pub moderators: Vec<Pubkey>,
    /// Forum title.
    pub title: String,
    /// Forum description.
    pub description: String,
}

/// Forum facade bound to one community key and the context's wallet.
#[derive(Debug, Clone)]
pub struct Forum {
    postbox: Postbox,
}

impl Forum {
    /// Opens the forum of `forum_id`; no ledger access happens here.
    pub fn new(ctx: DispatchContext, forum_id: Pubkey) -> Result<Self> {
        Ok(Self {
            postbox: Postbox::new(ctx, PostboxTarget::labeled(forum_id, FORUM_LABEL))?,
        })
    }

    /// The underlying postbox.
    pub fn postbox(&self) -> &Postbox {
        &self.postbox
    }

    /// Forum address.
    pub fn address(&self) -> &Pubkey {
        self.postbox.address()
    }

    /// Whether the forum has been created.
    pub async fn exists(&self) -> Result<bool> {
        self.postbox.exists().await
    }

    /// Creates the forum and appoints its initial moderators. Returns one
    /// signature per submitted transaction.
    #[instrument(skip(self, info), fields(forum = %self.address().short()))]
    pub async fn create_forum(&self, info: &ForumInfo) -> Result<Vec<Signature>> {
        let description = DescriptionAccount {
            title: info.title.clone(),
            desc: info.description.clone(),
        };
        let mut signatures = vec![
            self.postbox
                .initialize(info.owners.clone(), Some(description))
                .await?,
        ];
        for moderator in &info.moderators {
            signatures.push(self.postbox.add_moderator(moderator).await?);
        }
        info!(
            "Created forum '{}' with {} moderator(s)",
            info.title,
            info.moderators.len()
        );
        Ok(signatures)
    }

    // =========================================================================
    // Settings
    // =========================================================================

    /// Current owners.
    pub async fn owners(&self) -> Result<Vec<Pubkey>> {
        self.postbox.owners().await
    }

    /// Replaces the owner list.
    pub async fn set_owners(&self, owners: Vec<Pubkey>) -> Result<Signature> {
        self.postbox.set_owners(owners).await
    }

    /// Whether `key` is an owner.
    pub async fn is_owner(&self, key: &Pubkey) -> Result<bool> {
        self.postbox.is_owner(key).await
    }

    /// Current moderators.
    pub async fn moderators(&self) -> Result<Vec<Pubkey>> {
        self.postbox.moderators().await
    }

    /// Appoints a moderator.
    pub async fn add_moderator(&self, moderator: &Pubkey) -> Result<Signature> {
        self.postbox.add_moderator(moderator).await
    }

    /// Whether `key` holds a moderator credential.
    pub async fn is_moderator(&self, key: &Pubkey) -> Result<bool> {
        self.postbox.is_moderator(key).await
    }

    /// Title and description, if set.
    pub async fn description(&self) -> Result<Option<DescriptionAccount>> {
        self.postbox.description().await
    }

    /// Sets the title and description.
    pub async fn set_description(&self, title: &str, description: &str) -> Result<Signature> {
        self.postbox
            .set_description(DescriptionAccount {
                title: title.to_string(),
                desc: description.to_string(),
            })
            .await
    }

    /// Forum-wide restriction inherited by topics without their own.
    pub async fn forum_restriction(&self) -> Result<PostRestriction> {
        self.postbox.restriction().await
    }

    /// Sets the forum-wide restriction; `PostRestriction::None` clears it.
    pub async fn set_forum_restriction(&self, restriction: PostRestriction) -> Result<Signature> {
        self.postbox.set_restriction(restriction).await
    }

    // =========================================================================
    // Topics and posts
    // =========================================================================

    /// Creates a topic. A `restriction` replaces the forum restriction for
    /// everything posted under the topic.
    #[instrument(skip(self, payload, restriction), fields(forum = %self.address().short()))]
    pub async fn create_topic(
        &self,
        payload: MessagePayload,
        restriction: Option<PostRestriction>,
    ) -> Result<CreatedPost> {
        let payload = payload.with_meta(TOPIC_META_KEY, Value::Bool(true));
        self.postbox.create_post(&payload, restriction).await
    }

    /// Topics, newest first.
    pub async fn topics(&self) -> Result<Vec<Post>> {
        let mut topics: Vec<Post> = self
            .postbox
            .fetch_posts()
            .await?
            .into_iter()
            .filter(Post::is_topic)
            .collect();
        topics.sort_by(Post::newest_first);
        Ok(topics)
    }

    /// Posts directly under `topic`, oldest first.
    pub async fn topic_messages(&self, topic: &Post) -> Result<Vec<Post>> {
        self.replies(topic).await
    }

    /// Replies to `post`, oldest first.
    pub async fn replies(&self, post: &Post) -> Result<Vec<Post>> {
        let mut replies = self.postbox.fetch_replies(&post.address).await?;
        replies.sort_by(Post::chronological);
        Ok(replies)
    }

    /// Posts into `topic`, which must be flagged as a topic.
    pub async fn create_forum_post(
        &self,
        payload: &MessagePayload,
        topic: &Post,
    ) -> Result<CreatedPost> {
        if !topic.is_topic() {
            return Err(DispatchError::invalid_input(format!(
                "Post {} is not a topic",
                topic.address
            )));
        }
        self.postbox.reply(&topic.address, payload).await
    }

    /// Replies to a forum post.
    pub async fn reply_to_forum_post(
        &self,
        payload: &MessagePayload,
        post: &Post,
    ) -> Result<CreatedPost> {
        self.postbox.reply(&post.address, payload).await
    }

    /// Deletes a post, either the wallet's own or as a moderator.
    pub async fn delete_forum_post(&self, post: &Post, as_moderator: bool) -> Result<Signature> {
        if as_moderator {
            self.postbox.delete_post_as_moderator(&post.address).await
        } else {
            self.postbox.delete_post(&post.address).await
        }
    }

    /// Replaces the payload of one of the wallet's posts. Topic posts keep
    /// their topic flag.
    pub async fn edit_forum_post(&self, post: &Post, payload: MessagePayload) -> Result<Signature> {
        let payload = if post.is_topic() {
            payload.with_meta(TOPIC_META_KEY, Value::Bool(true))
        } else {
            payload
        };
        self.postbox.edit_post(&post.address, &payload).await
    }

    // =========================================================================
    // Votes and permissions
    // =========================================================================

    /// Up-votes `post`.
    pub async fn vote_up(&self, post: &Post) -> Result<Signature> {
        self.postbox.vote(&post.address, VoteDirection::Up).await
    }

    /// Down-votes `post`.
    pub async fn vote_down(&self, post: &Post) -> Result<Signature> {
        self.postbox.vote(&post.address, VoteDirection::Down).await
    }

    /// The wallet's recorded vote on `post`.
    pub async fn vote_of(&self, post: &Post) -> Result<Option<VoteDirection>> {
        self.postbox.vote_of(&post.address).await
    }

    /// Whether the wallet may create a topic.
    pub async fn can_create_topic(&self) -> Result<bool> {
        self.postbox.can_post(None).await
    }

    /// Whether the wallet may post under `topic`.
    pub async fn can_post(&self, topic: &Post) -> Result<bool> {
        self.postbox.can_post(Some(&topic.address)).await
    }

    /// Whether the wallet may vote on `post`.
    pub async fn can_vote(&self, post: &Post) -> Result<bool> {
        self.postbox.can_vote(&post.address).await
    }
}

//! Per-subject post trees.
//!
//! A postbox roots a tree of posts: top-level posts are allocated from the
//! postbox's `max_child_id` counter (or from bucket counters when sharding
//! is configured), replies from their parent's `max_reply_id`. Every slot
//! address is derived from `(parent, id)`, so reads compute the id range
//! from the counters, batch-fetch and drop the holes left by deletes.
//!
//! Posting and voting are gated: the effective restriction is resolved by
//! walking the reply chain up to the forum-level setting, evaluated
//! locally, and the resulting proof accounts are attached to the
//! instruction for the program to re-check.

pub mod bucket;
pub mod post;

pub use bucket::{Allocation, BucketAllocator, BucketState};
pub use post::{Post, PostParent};

use crate::address::SettingsKind;
use crate::codec::{MessagePayload, PayloadCodec};
use crate::context::DispatchContext;
use crate::error::{DispatchError, Result};
use crate::gating::{effective_restriction, GateVerdict, GatingEvaluator};
use crate::ledger::{fetch_decoded, fetch_many_decoded};
use crate::program::accounts::{
    BucketCounterAccount, DescriptionAccount, OwnerInfoAccount, PostAccount, PostRestriction,
    PostboxAccount, RestrictionAccount, VoteDirection, VoteEntryAccount,
};
use crate::program::instructions::{
    self, CreatePostKeys, DesignateModeratorKeys, InitializeKeys, SettingsData, VoteKeys,
};
use crate::pubkey::{Pubkey, Signature};
use std::collections::BTreeSet;
use tracing::{debug, info, instrument};

/// Reply chains longer than this are treated as malformed.
pub const MAX_REPLY_DEPTH: usize = 64;

/// Subject a postbox is rooted at.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PostboxTarget {
    /// Subject key: a wallet for personal postboxes, else any key.
    pub key: Pubkey,
    /// Label distinguishing several postboxes on one key.
    pub label: Option<String>,
}

impl PostboxTarget {
    /// Personal postbox of `key`; only `key` can initialize it.
    pub fn personal(key: Pubkey) -> Self {
        Self { key, label: None }
    }

    /// Labeled postbox on `key`.
    pub fn labeled(key: Pubkey, label: impl Into<String>) -> Self {
        Self {
            key,
            label: Some(label.into()),
        }
    }
}

/// A post slot claimed by a successful submission.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CreatedPost {
    /// Post address.
    pub address: Pubkey,
    /// Parent the slot was allocated under.
    pub parent: PostParent,
    /// Slot id.
    pub id: u32,
    /// Transaction signature.
    pub signature: Signature,
}

/// Post tree protocol bound to one postbox and the context's wallet.
#[derive(Clone)]
pub struct Postbox {
    ctx: DispatchContext,
    target: PostboxTarget,
    address: Pubkey,
    gating: GatingEvaluator,
    buckets: Option<BucketAllocator>,
}

impl Postbox {
    /// Creates a handle; no ledger access happens here.
    pub fn new(ctx: DispatchContext, target: PostboxTarget) -> Result<Self> {
        let address = ctx.deriver().postbox(&target.key, target.label.as_deref())?;
        let gating = GatingEvaluator::new(ctx.ledger_handle());
        let buckets = ctx.config().buckets.map(BucketAllocator::new);
        Ok(Self {
            ctx,
            target,
            address,
            gating,
            buckets,
        })
    }

    /// Postbox address.
    pub fn address(&self) -> &Pubkey {
        &self.address
    }

    /// Subject of this postbox.
    pub fn target(&self) -> &PostboxTarget {
        &self.target
    }

    /// The gating evaluator used for pre-checks.
    pub fn gating(&self) -> &GatingEvaluator {
        &self.gating
    }

    /// The wallet acting on this postbox.
    pub fn wallet_pubkey(&self) -> Pubkey {
        self.ctx.wallet_pubkey()
    }

    fn program(&self) -> &Pubkey {
        self.ctx.deriver().postbox_program()
    }

    // =========================================================================
    // Lifecycle and settings
    // =========================================================================

    /// Whether the postbox has been initialized.
    pub async fn exists(&self) -> Result<bool> {
        Ok(self.ctx.ledger().get_account(&self.address).await?.is_found())
    }

    /// Reads the postbox root; `NotFound` if uninitialized.
    pub async fn account(&self) -> Result<PostboxAccount> {
        fetch_decoded::<PostboxAccount>(self.ctx.ledger(), &self.address)
            .await?
            .ok_or_else(|| DispatchError::not_found(format!("Postbox {} not found", self.address)))
    }

    /// One-time creation with owners (the wallet when empty) and an
    /// optional description.
    #[instrument(skip(self, owners, description), fields(postbox = %self.address.short()))]
    pub async fn initialize(
        &self,
        owners: Vec<Pubkey>,
        description: Option<DescriptionAccount>,
    ) -> Result<Signature> {
        self.ctx.wallet().ensure_can_sign()?;
        if self.exists().await? {
            return Err(DispatchError::already_initialized(format!(
                "Postbox {} already exists",
                self.address
            )));
        }

        let deriver = self.ctx.deriver();
        let keys = InitializeKeys {
            postbox: self.address,
            payer: self.ctx.wallet_pubkey(),
            target: self.target.key,
            moderator_mint: deriver.moderator_mint(&self.address)?,
            owner_info: deriver.owner_info(&self.address)?,
            post_restrictions: deriver.post_restrictions(&self.address)?,
            description: deriver.description(&self.address)?,
            treasury: *deriver.treasury(),
        };
        let ix = instructions::initialize_postbox(
            self.program(),
            &keys,
            self.target.label.clone().unwrap_or_default(),
            owners,
            description,
        );
        match self.ctx.submit(vec![ix]).await {
            Ok(signature) => {
                info!("Initialized postbox {}", self.address);
                Ok(signature)
            }
            Err(DispatchError::Conflict(msg)) => Err(DispatchError::already_initialized(msg)),
            Err(e) => Err(e),
        }
    }

    /// Current owners.
    pub async fn owners(&self) -> Result<Vec<Pubkey>> {
        let address = self.ctx.deriver().owner_info(&self.address)?;
        fetch_decoded::<OwnerInfoAccount>(self.ctx.ledger(), &address)
            .await?
            .map(|info| info.owners)
            .ok_or_else(|| DispatchError::not_found(format!("Postbox {} has no owner list", self.address)))
    }

    /// Whether `key` is an owner.
    pub async fn is_owner(&self, key: &Pubkey) -> Result<bool> {
        Ok(self.owners().await?.contains(key))
    }

    /// Replaces the owner list.
    pub async fn set_owners(&self, owners: Vec<Pubkey>) -> Result<Signature> {
        self.update_setting(SettingsKind::OwnerInfo, SettingsData::OwnerInfo { owners })
            .await
    }

    /// Title and description, if set.
    pub async fn description(&self) -> Result<Option<DescriptionAccount>> {
        let address = self.ctx.deriver().description(&self.address)?;
        fetch_decoded::<DescriptionAccount>(self.ctx.ledger(), &address).await
    }

    /// Sets the title and description.
    pub async fn set_description(&self, description: DescriptionAccount) -> Result<Signature> {
        self.update_setting(
            SettingsKind::Description,
            SettingsData::Description(description),
        )
        .await
    }

    /// Forum-level restriction; unset reads as `None`.
    pub async fn restriction(&self) -> Result<PostRestriction> {
        let address = self.ctx.deriver().post_restrictions(&self.address)?;
        Ok(fetch_decoded::<RestrictionAccount>(self.ctx.ledger(), &address)
            .await?
            .map(|account| account.restriction)
            .unwrap_or_default())
    }

    /// Sets the forum-level restriction; `PostRestriction::None` clears it.
    pub async fn set_restriction(&self, restriction: PostRestriction) -> Result<Signature> {
        self.update_setting(
            SettingsKind::PostRestriction,
            SettingsData::PostRestriction { restriction },
        )
        .await
    }

    #[instrument(skip(self, setting), fields(postbox = %self.address.short()))]
    async fn update_setting(&self, kind: SettingsKind, setting: SettingsData) -> Result<Signature> {
        let deriver = self.ctx.deriver();
        let ix = instructions::update_setting(
            self.program(),
            &self.address,
            &self.ctx.wallet_pubkey(),
            &deriver.owner_info(&self.address)?,
            &deriver.settings(&self.address, kind)?,
            setting,
        );
        let signature = self.ctx.submit(vec![ix]).await?;
        info!("Updated {:?} setting", kind);
        Ok(signature)
    }

    // =========================================================================
    // Moderation
    // =========================================================================

    /// Mint of the moderator credential.
    pub fn moderator_mint(&self) -> Result<Pubkey> {
        self.ctx.deriver().moderator_mint(&self.address)
    }

    /// Mints a moderator credential to `moderator`. Owners only.
    #[instrument(skip(self, moderator), fields(moderator = %moderator.short()))]
    pub async fn add_moderator(&self, moderator: &Pubkey) -> Result<Signature> {
        let deriver = self.ctx.deriver();
        let mint = self.moderator_mint()?;
        let keys = DesignateModeratorKeys {
            postbox: self.address,
            owner: self.ctx.wallet_pubkey(),
            owner_info: deriver.owner_info(&self.address)?,
            moderator_mint: mint,
            new_moderator: *moderator,
            new_moderator_token_account: deriver.associated_token(moderator, &mint)?,
        };
        let ix = instructions::designate_moderator(self.program(), &keys);
        let signature = self.ctx.submit(vec![ix]).await?;
        info!("Designated moderator {}", moderator.short());
        Ok(signature)
    }

    /// Current credential holders.
    pub async fn moderators(&self) -> Result<Vec<Pubkey>> {
        let mint = self.moderator_mint()?;
        let holders: BTreeSet<Pubkey> = self
            .ctx
            .ledger()
            .token_holders(&mint)
            .await?
            .into_iter()
            .map(|(_, account)| account.owner)
            .collect();
        Ok(holders.into_iter().collect())
    }

    /// Whether `key` holds a moderator credential.
    pub async fn is_moderator(&self, key: &Pubkey) -> Result<bool> {
        let mint = self.moderator_mint()?;
        Ok(self
            .ctx
            .ledger()
            .token_accounts_by_owner(key)
            .await?
            .iter()
            .any(|(_, account)| account.mint == mint && account.amount > 0))
    }

    // =========================================================================
    // Restrictions
    // =========================================================================

    /// Restriction governing a new post under `parent` (`None` for a
    /// top-level post): the first restriction set on the parent or its
    /// ancestors, else the forum-level one.
    pub async fn restriction_for(&self, parent: Option<&Pubkey>) -> Result<PostRestriction> {
        let mut overrides: Vec<Option<PostRestriction>> = Vec::new();
        let mut cursor = parent.copied();
        while let Some(key) = cursor {
            if overrides.len() >= MAX_REPLY_DEPTH {
                return Err(DispatchError::invalid_input(format!(
                    "Reply chain above {} exceeds {} levels",
                    key, MAX_REPLY_DEPTH
                )));
            }
            let post = self.require_post(&key).await?;
            if post.restriction.is_some() {
                debug!("Restriction inherited from post {}", key.short());
                overrides.push(post.restriction);
                break;
            }
            overrides.push(None);
            cursor = post.reply_to;
        }
        let forum = self.restriction().await?;
        Ok(effective_restriction(overrides.iter().map(Option::as_ref), &forum).clone())
    }

    /// Evaluates the restriction for `parent` against the wallet and
    /// returns the proof accounts, failing with `PermissionDenied`.
    async fn gate(&self, parent: Option<&Pubkey>, action: &str) -> Result<Vec<Pubkey>> {
        let restriction = self.restriction_for(parent).await?;
        let wallet = self.ctx.wallet_pubkey();
        match self.gating.evaluate(&wallet, &restriction).await? {
            GateVerdict::Allowed { proof } => Ok(proof),
            GateVerdict::Denied => Err(DispatchError::permission_denied(format!(
                "{} does not satisfy the restriction to {} ({:?})",
                wallet, action, restriction
            ))),
        }
    }

    /// Whether the wallet may post under `parent` (`None` for top-level).
    pub async fn can_post(&self, parent: Option<&Pubkey>) -> Result<bool> {
        let restriction = self.restriction_for(parent).await?;
        self.gating
            .can_post(&self.ctx.wallet_pubkey(), &restriction)
            .await
    }

    /// Whether the wallet may vote on `post`.
    pub async fn can_vote(&self, post: &Pubkey) -> Result<bool> {
        let restriction = self.restriction_for(Some(post)).await?;
        self.gating
            .can_vote(&self.ctx.wallet_pubkey(), &restriction)
            .await
    }

    // =========================================================================
    // Posts
    // =========================================================================

    async fn require_post(&self, address: &Pubkey) -> Result<PostAccount> {
        fetch_decoded::<PostAccount>(self.ctx.ledger(), address)
            .await?
            .ok_or_else(|| DispatchError::not_found(format!("Post {} not found", address)))
    }

    /// Creates a top-level post, optionally restricting replies under it.
    #[instrument(skip(self, payload, restriction), fields(postbox = %self.address.short()))]
    pub async fn create_post(
        &self,
        payload: &MessagePayload,
        restriction: Option<PostRestriction>,
    ) -> Result<CreatedPost> {
        self.ctx.wallet().ensure_can_sign()?;
        let deriver = self.ctx.deriver();
        let poster = self.ctx.wallet_pubkey();
        let gating_accounts = self.gate(None, "post").await?;

        let (id, bucket_counter, bucket) = match &self.buckets {
            Some(allocator) => {
                let mut state = self.bucket_state(allocator).await?;
                let allocation = state.allocate_for(&poster)?;
                (
                    allocation.global_id,
                    Some(deriver.bucket_counter(&self.address, allocation.bucket)?),
                    Some(allocator.slot(allocation.bucket)),
                )
            }
            None => (self.account().await?.max_child_id, None, None),
        };

        let address = deriver.post(&self.address, id)?;
        let keys = CreatePostKeys {
            postbox: self.address,
            parent: self.address,
            post: address,
            poster,
            treasury: *deriver.treasury(),
            post_restrictions: deriver.post_restrictions(&self.address)?,
            bucket_counter,
            gating_accounts,
        };
        let ix = instructions::create_post(
            self.program(),
            &keys,
            PayloadCodec::encode(payload)?,
            id,
            restriction,
            bucket,
        );
        let signature = self.ctx.submit(vec![ix]).await?;
        info!("Created post {} ({})", id, address.short());
        Ok(CreatedPost {
            address,
            parent: PostParent::Postbox(self.address),
            id,
            signature,
        })
    }

    /// Replies to `parent`, allocating from the parent's reply counter.
    #[instrument(skip(self, parent, payload), fields(parent = %parent.short()))]
    pub async fn reply(&self, parent: &Pubkey, payload: &MessagePayload) -> Result<CreatedPost> {
        self.ctx.wallet().ensure_can_sign()?;
        let deriver = self.ctx.deriver();
        let parent_post = self.require_post(parent).await?;
        let gating_accounts = self.gate(Some(parent), "reply").await?;

        let id = parent_post.max_reply_id;
        let address = deriver.post(parent, id)?;
        let keys = CreatePostKeys {
            postbox: self.address,
            parent: *parent,
            post: address,
            poster: self.ctx.wallet_pubkey(),
            treasury: *deriver.treasury(),
            post_restrictions: deriver.post_restrictions(&self.address)?,
            bucket_counter: None,
            gating_accounts,
        };
        let ix = instructions::create_post(
            self.program(),
            &keys,
            PayloadCodec::encode(payload)?,
            id,
            None,
            None,
        );
        let signature = self.ctx.submit(vec![ix]).await?;
        info!("Replied with slot {} under {}", id, parent.short());
        Ok(CreatedPost {
            address,
            parent: PostParent::Post(*parent),
            id,
            signature,
        })
    }

    /// Replaces the payload of one of the wallet's posts.
    #[instrument(skip(self, post, payload), fields(post = %post.short()))]
    pub async fn edit_post(&self, post: &Pubkey, payload: &MessagePayload) -> Result<Signature> {
        let ix = instructions::edit_post(
            self.program(),
            &self.address,
            post,
            &self.ctx.wallet_pubkey(),
            PayloadCodec::encode(payload)?,
        );
        self.ctx.submit(vec![ix]).await
    }

    /// Deletes one of the wallet's posts; rent returns to the poster.
    #[instrument(skip(self, post), fields(post = %post.short()))]
    pub async fn delete_post(&self, post: &Pubkey) -> Result<Signature> {
        self.ctx.wallet().ensure_can_sign()?;
        let account = self.require_post(post).await?;
        let ix = instructions::delete_own_post(
            self.program(),
            &self.address,
            post,
            &self.ctx.wallet_pubkey(),
            &account.poster,
        );
        let signature = self.ctx.submit(vec![ix]).await?;
        info!("Deleted own post {}", post.short());
        Ok(signature)
    }

    /// Deletes any post using the wallet's moderator credential.
    #[instrument(skip(self, post), fields(post = %post.short()))]
    pub async fn delete_post_as_moderator(&self, post: &Pubkey) -> Result<Signature> {
        self.ctx.wallet().ensure_can_sign()?;
        let moderator = self.ctx.wallet_pubkey();
        let account = self.require_post(post).await?;
        let credential = self
            .ctx
            .deriver()
            .associated_token(&moderator, &self.moderator_mint()?)?;
        let ix = instructions::delete_post_by_moderator(
            self.program(),
            &self.address,
            post,
            &moderator,
            &credential,
            &account.poster,
        );
        let signature = self.ctx.submit(vec![ix]).await?;
        info!("Moderator deleted post {}", post.short());
        Ok(signature)
    }

    /// Reads one post slot; `NotFound` if absent.
    pub async fn get_post(&self, parent: PostParent, id: u32) -> Result<Post> {
        let address = self.ctx.deriver().post(parent.address(), id)?;
        let account = self.require_post(&address).await?;
        Ok(Post::from_account(address, parent, id, account))
    }

    /// Live top-level posts in slot order, skipping holes.
    #[instrument(skip(self), fields(postbox = %self.address.short()))]
    pub async fn fetch_posts(&self) -> Result<Vec<Post>> {
        let root = match fetch_decoded::<PostboxAccount>(self.ctx.ledger(), &self.address).await? {
            Some(root) => root,
            None => return Ok(Vec::new()),
        };
        let mut ids: BTreeSet<u32> = (0..root.max_child_id).collect();

        if let Some(allocator) = &self.buckets {
            ids.extend(self.bucket_state(allocator).await?.issued_ids());
        }

        self.fetch_slots(PostParent::Postbox(self.address), ids)
            .await
    }

    /// Reads every bucket counter in one round trip.
    async fn bucket_state(&self, allocator: &BucketAllocator) -> Result<BucketState> {
        let counter_keys = (0..allocator.num_buckets())
            .map(|bucket| self.ctx.deriver().bucket_counter(&self.address, bucket))
            .collect::<Result<Vec<_>>>()?;
        let counters: Vec<u32> =
            fetch_many_decoded::<BucketCounterAccount>(self.ctx.ledger(), &counter_keys)
                .await?
                .into_iter()
                .map(|counter| counter.map_or(0, |c| c.max_post_id))
                .collect();
        Ok(BucketState::from_counters(*allocator, &counters))
    }

    /// Live replies to `parent` in slot order, skipping holes.
    #[instrument(skip(self, parent), fields(parent = %parent.short()))]
    pub async fn fetch_replies(&self, parent: &Pubkey) -> Result<Vec<Post>> {
        let parent_post = self.require_post(parent).await?;
        self.fetch_slots(PostParent::Post(*parent), 0..parent_post.max_reply_id)
            .await
    }

    async fn fetch_slots(
        &self,
        parent: PostParent,
        ids: impl IntoIterator<Item = u32>,
    ) -> Result<Vec<Post>> {
        let ids: Vec<u32> = ids.into_iter().collect();
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let deriver = self.ctx.deriver();
        let addresses = ids
            .iter()
            .map(|id| deriver.post(parent.address(), *id))
            .collect::<Result<Vec<_>>>()?;
        let accounts = fetch_many_decoded::<PostAccount>(self.ctx.ledger(), &addresses).await?;

        let mut posts = Vec::with_capacity(accounts.len());
        for ((id, address), account) in ids.into_iter().zip(addresses).zip(accounts) {
            match account {
                Some(account) => posts.push(Post::from_account(address, parent, id, account)),
                None => debug!("Skipping hole at slot {}", id),
            }
        }
        Ok(posts)
    }

    // =========================================================================
    // Votes
    // =========================================================================

    /// Records the wallet's vote on `post`, flipping an opposite one. A
    /// repeat vote in the same direction fails with `Conflict`.
    #[instrument(skip(self, post), fields(post = %post.short()))]
    pub async fn vote(&self, post: &Pubkey, direction: VoteDirection) -> Result<Signature> {
        self.ctx.wallet().ensure_can_sign()?;
        let deriver = self.ctx.deriver();
        let voter = self.ctx.wallet_pubkey();
        let gating_accounts = self.gate(Some(post), "vote").await?;
        let keys = VoteKeys {
            postbox: self.address,
            post: *post,
            vote_entry: deriver.vote_entry(post, &voter)?,
            voter,
            treasury: *deriver.treasury(),
            post_restrictions: deriver.post_restrictions(&self.address)?,
            gating_accounts,
        };
        let ix = instructions::vote(self.program(), &keys, direction.is_up());
        let signature = self.ctx.submit(vec![ix]).await?;
        info!("Voted {:?} on {}", direction, post.short());
        Ok(signature)
    }

    /// The wallet's recorded vote on `post`.
    pub async fn vote_of(&self, post: &Pubkey) -> Result<Option<VoteDirection>> {
        let entry = self
            .ctx
            .deriver()
            .vote_entry(post, &self.ctx.wallet_pubkey())?;
        Ok(fetch_decoded::<VoteEntryAccount>(self.ctx.ledger(), &entry)
            .await?
            .map(|entry| entry.direction))
    }
}

impl std::fmt::Debug for Postbox {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Postbox")
            .field("target", &self.target)
            .field("address", &self.address)
            .field("buckets", &self.buckets)
            .finish()
    }
}

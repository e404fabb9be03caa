//! Simulated postbox program.

use super::{require, InstructionAccounts, Runtime};
use crate::address::{associated_token_address, metadata_address, SettingsKind};
use crate::constants::{
    METADATA_PROGRAM_ID, POSTBOX_CREATION_FEE_LAMPORTS, POST_FEE_LAMPORTS, VOTE_FEE_LAMPORTS,
};
use crate::error::Result;
use crate::gating::metadata::AssetMetadata;
use crate::program::accounts::{
    BucketCounterAccount, DescriptionAccount, OwnerInfoAccount, PostAccount, PostRestriction,
    PostboxAccount, RestrictionAccount, VoteDirection, VoteEntryAccount,
};
use crate::program::errors::ProgramErrorCode;
use crate::program::instructions::{
    BucketSlot, PostboxInstruction, SettingsData, CREATE_POST_FIXED_ACCOUNTS, VOTE_FIXED_ACCOUNTS,
};
use crate::pubkey::Pubkey;

/// Reply chains longer than this are treated as malformed.
const MAX_REPLY_DEPTH: usize = 64;

impl<'a> Runtime<'a> {
    pub(super) fn execute_postbox(&mut self, accounts: &InstructionAccounts<'_>) -> Result<()> {
        match PostboxInstruction::decode(&accounts.ix.data)? {
            PostboxInstruction::Initialize {
                target_label,
                owners,
                description,
            } => self.initialize(accounts, target_label, owners, description),
            PostboxInstruction::CreatePost {
                data,
                post_id,
                restriction,
                bucket,
            } => self.create_post(accounts, data, post_id, restriction, bucket),
            PostboxInstruction::EditPost { data } => self.edit_post(accounts, data),
            PostboxInstruction::DeleteOwnPost => self.delete_own_post(accounts),
            PostboxInstruction::DeletePostByModerator => self.delete_post_by_moderator(accounts),
            PostboxInstruction::Vote { up } => self.vote(accounts, VoteDirection::from_up(up)),
            PostboxInstruction::DesignateModerator => self.designate_moderator(accounts),
            PostboxInstruction::UpdateSetting { setting } => self.update_setting(accounts, setting),
        }
    }

    fn postbox_program(&self) -> Pubkey {
        *self.deriver.postbox_program()
    }

    fn require_owner(&self, postbox: &Pubkey, owner_info: &Pubkey, owner: &Pubkey) -> Result<()> {
        let program = self.postbox_program();
        require(
            *owner_info == self.deriver.owner_info(postbox)?,
            ProgramErrorCode::ConstraintAddress,
        )?;
        let info = self
            .state
            .load_required::<OwnerInfoAccount>(owner_info, &program)?;
        require(info.owners.contains(owner), ProgramErrorCode::ConstraintRaw)
    }

    fn initialize(
        &mut self,
        accounts: &InstructionAccounts<'_>,
        target_label: String,
        owners: Vec<Pubkey>,
        description: Option<DescriptionAccount>,
    ) -> Result<()> {
        let program = self.postbox_program();
        let postbox_key = accounts.key(0)?;
        let payer = accounts.signer(1)?;
        let target = accounts.key(2)?;
        let moderator_mint = accounts.key(3)?;
        let owner_info = accounts.key(4)?;
        let post_restrictions = accounts.key(5)?;
        let description_key = accounts.key(6)?;
        let treasury = accounts.key(7)?;

        if target_label.is_empty() {
            require(target == payer, ProgramErrorCode::NotPersonalPostbox)?;
        }
        require(
            postbox_key == self.deriver.postbox(&target, Some(target_label.as_str()))?,
            ProgramErrorCode::ConstraintSeeds,
        )?;
        require(
            moderator_mint == self.deriver.moderator_mint(&postbox_key)?
                && owner_info == self.deriver.owner_info(&postbox_key)?
                && post_restrictions == self.deriver.post_restrictions(&postbox_key)?
                && description_key == self.deriver.description(&postbox_key)?
                && treasury == *self.deriver.treasury(),
            ProgramErrorCode::ConstraintAddress,
        )?;

        let postbox = PostboxAccount {
            max_child_id: 0,
            moderator_mint,
            owner_info_account: owner_info,
            post_restrictions_account: post_restrictions,
        };
        self.state.create(postbox_key, program, &postbox, &payer)?;
        let owners = if owners.is_empty() { vec![payer] } else { owners };
        self.state
            .create(owner_info, program, &OwnerInfoAccount { owners }, &payer)?;
        self.state.create(
            post_restrictions,
            program,
            &RestrictionAccount::default(),
            &payer,
        )?;
        if let Some(description) = description {
            self.state
                .create(description_key, program, &description, &payer)?;
        }
        self.state.mint_supply.entry(moderator_mint).or_insert(0);
        self.state
            .transfer(&payer, &treasury, POSTBOX_CREATION_FEE_LAMPORTS)?;
        Ok(())
    }

    /// Restriction governing replies under `start`: the first restriction
    /// set on the post or its ancestors, else the forum's.
    fn effective_restriction(
        &self,
        start: Option<Pubkey>,
        forum_restrictions: &Pubkey,
    ) -> Result<PostRestriction> {
        let program = self.postbox_program();
        let mut cursor = start;
        let mut depth = 0;
        while let Some(key) = cursor {
            require(depth < MAX_REPLY_DEPTH, ProgramErrorCode::ReplyToNotPost)?;
            let post = self
                .state
                .load::<PostAccount>(&key, &program)
                .ok()
                .flatten()
                .ok_or_else(|| ProgramErrorCode::ReplyToNotPost.into_error())?;
            if let Some(restriction) = post.restriction {
                return Ok(restriction);
            }
            cursor = post.reply_to;
            depth += 1;
        }
        Ok(self
            .state
            .load::<RestrictionAccount>(forum_restrictions, &program)?
            .map(|account| account.restriction)
            .unwrap_or_default())
    }

    /// Checks the gating accounts against `restriction` for `actor`.
    fn check_restriction(
        &self,
        restriction: &PostRestriction,
        actor: &Pubkey,
        extras: &[Pubkey],
    ) -> Result<()> {
        if restriction.is_none() {
            return Ok(());
        }
        require(!extras.is_empty(), ProgramErrorCode::MissingRequiredOffsets)?;
        require(
            extras.len() >= restriction.extra_account_count(),
            ProgramErrorCode::InvalidRestrictionExtraAccounts,
        )?;
        let token = self
            .state
            .token(&extras[0])
            .ok_or_else(|| ProgramErrorCode::NotTokenAccount.into_error())?;

        let collections: &[Pubkey] = match restriction {
            PostRestriction::None => return Ok(()),
            PostRestriction::TokenOwnership { mint, amount } => {
                return require(
                    token.owner == *actor && token.mint == *mint && token.amount >= *amount,
                    ProgramErrorCode::MissingTokenRestriction,
                );
            }
            PostRestriction::NftOwnership { collection_id } => std::slice::from_ref(collection_id),
            PostRestriction::NftListAnyOwnership { collection_ids } => collection_ids,
        };

        require(
            token.owner == *actor && token.amount >= 1,
            ProgramErrorCode::MissingTokenRestriction,
        )?;
        require(
            extras[1] == metadata_address(&token.mint)?,
            ProgramErrorCode::InvalidMetadataKey,
        )?;
        let metadata = self
            .state
            .load::<AssetMetadata>(&extras[1], &METADATA_PROGRAM_ID)
            .ok()
            .flatten()
            .ok_or_else(|| ProgramErrorCode::MetadataAccountInvalid.into_error())?;
        let collection = metadata
            .collection
            .ok_or_else(|| ProgramErrorCode::NoCollectionOnMetadata.into_error())?;
        require(
            collection.verified && collections.contains(&collection.key),
            ProgramErrorCode::MissingCollectionNftRestriction,
        )
    }

    fn create_post(
        &mut self,
        accounts: &InstructionAccounts<'_>,
        data: Vec<u8>,
        post_id: u32,
        restriction: Option<PostRestriction>,
        bucket: Option<BucketSlot>,
    ) -> Result<()> {
        let program = self.postbox_program();
        let postbox_key = accounts.key(0)?;
        let parent_key = accounts.key(1)?;
        let post_key = accounts.key(2)?;
        let poster = accounts.signer(3)?;
        let treasury = accounts.key(4)?;
        let restrictions_key = accounts.key(6)?;
        let bucket_key = accounts.key(7)?;
        let extras = accounts.remaining(CREATE_POST_FIXED_ACCOUNTS);

        let mut postbox = self
            .state
            .load_required::<PostboxAccount>(&postbox_key, &program)?;
        require(
            treasury == *self.deriver.treasury()
                && restrictions_key == postbox.post_restrictions_account,
            ProgramErrorCode::ConstraintAddress,
        )?;
        require(
            post_key == self.deriver.post(&parent_key, post_id)?,
            ProgramErrorCode::ConstraintSeeds,
        )?;

        let top_level = parent_key == postbox_key;
        let gate_from = if top_level {
            None
        } else {
            let parent = self
                .state
                .load::<PostAccount>(&parent_key, &program)
                .ok()
                .flatten()
                .ok_or_else(|| ProgramErrorCode::ReplyToNotPost.into_error())?;
            require(
                restriction.is_none(),
                ProgramErrorCode::ReplyCannotRestrictReplies,
            )?;
            require(bucket.is_none(), ProgramErrorCode::ConstraintRaw)?;
            let mut parent = parent;
            require(
                post_id <= parent.max_reply_id,
                ProgramErrorCode::PostIdTooLarge,
            )?;
            if post_id == parent.max_reply_id {
                parent.max_reply_id += 1;
                self.state.store(parent_key, program, &parent);
            }
            Some(parent_key)
        };

        let restriction_to_meet = self.effective_restriction(gate_from, &restrictions_key)?;
        self.check_restriction(&restriction_to_meet, &poster, &extras)?;

        if top_level {
            match bucket {
                Some(slot) => {
                    require(
                        slot.capacity > 0
                            && bucket_key == self.deriver.bucket_counter(&postbox_key, slot.index)?,
                        ProgramErrorCode::ConstraintSeeds,
                    )?;
                    let existing = self
                        .state
                        .load::<BucketCounterAccount>(&bucket_key, &program)?;
                    let mut counter = existing.unwrap_or(BucketCounterAccount {
                        max_post_id: 0,
                        capacity: slot.capacity,
                    });
                    require(
                        counter.capacity == slot.capacity,
                        ProgramErrorCode::ConstraintRaw,
                    )?;
                    let base = u64::from(slot.capacity) * u64::from(slot.index);
                    require(u64::from(post_id) > base, ProgramErrorCode::ConstraintSeeds)?;
                    let local = u64::from(post_id) - base;
                    require(
                        local <= u64::from(counter.max_post_id) + 1
                            && local <= u64::from(slot.capacity),
                        ProgramErrorCode::PostIdTooLarge,
                    )?;
                    if existing.is_none() {
                        self.state.create(bucket_key, program, &counter, &poster)?;
                    }
                    if local == u64::from(counter.max_post_id) + 1 {
                        counter.max_post_id += 1;
                        self.state.store(bucket_key, program, &counter);
                    }
                }
                None => {
                    require(
                        post_id <= postbox.max_child_id,
                        ProgramErrorCode::PostIdTooLarge,
                    )?;
                    if post_id == postbox.max_child_id {
                        postbox.max_child_id += 1;
                        self.state.store(postbox_key, program, &postbox);
                    }
                }
            }
        }

        let post = PostAccount {
            poster,
            data,
            max_reply_id: 0,
            up_votes: 0,
            down_votes: 0,
            reply_to: if top_level { None } else { Some(parent_key) },
            restriction,
        };
        self.state.create(post_key, program, &post, &poster)?;
        self.state.transfer(&poster, &treasury, POST_FEE_LAMPORTS)?;
        Ok(())
    }

    fn edit_post(&mut self, accounts: &InstructionAccounts<'_>, data: Vec<u8>) -> Result<()> {
        let program = self.postbox_program();
        let post_key = accounts.key(1)?;
        let poster = accounts.signer(2)?;
        let mut post = self.state.load_required::<PostAccount>(&post_key, &program)?;
        require(post.poster == poster, ProgramErrorCode::ConstraintRaw)?;
        post.data = data;
        self.state.store(post_key, program, &post);
        Ok(())
    }

    fn delete_own_post(&mut self, accounts: &InstructionAccounts<'_>) -> Result<()> {
        let program = self.postbox_program();
        let post_key = accounts.key(1)?;
        let poster = accounts.signer(2)?;
        let rent_destination = accounts.key(3)?;
        let post = self.state.load_required::<PostAccount>(&post_key, &program)?;
        require(post.poster == poster, ProgramErrorCode::ConstraintRaw)?;
        require(
            rent_destination == post.poster,
            ProgramErrorCode::ConstraintAddress,
        )?;
        self.state.close(&post_key, &rent_destination);
        Ok(())
    }

    fn delete_post_by_moderator(&mut self, accounts: &InstructionAccounts<'_>) -> Result<()> {
        let program = self.postbox_program();
        let postbox_key = accounts.key(0)?;
        let post_key = accounts.key(1)?;
        let moderator = accounts.signer(2)?;
        let credential = accounts.key(3)?;
        let rent_destination = accounts.key(4)?;

        let postbox = self
            .state
            .load_required::<PostboxAccount>(&postbox_key, &program)?;
        let post = self.state.load_required::<PostAccount>(&post_key, &program)?;
        let held = self.state.token(&credential).is_some_and(|token| {
            token.mint == postbox.moderator_mint && token.owner == moderator && token.amount > 0
        });
        require(held, ProgramErrorCode::ConstraintRaw)?;
        require(
            rent_destination == post.poster,
            ProgramErrorCode::ConstraintAddress,
        )?;
        self.state.close(&post_key, &rent_destination);
        Ok(())
    }

    fn vote(&mut self, accounts: &InstructionAccounts<'_>, direction: VoteDirection) -> Result<()> {
        let program = self.postbox_program();
        let postbox_key = accounts.key(0)?;
        let post_key = accounts.key(1)?;
        let entry_key = accounts.key(2)?;
        let voter = accounts.signer(3)?;
        let treasury = accounts.key(4)?;
        let restrictions_key = accounts.key(6)?;
        let extras = accounts.remaining(VOTE_FIXED_ACCOUNTS);

        let postbox = self
            .state
            .load_required::<PostboxAccount>(&postbox_key, &program)?;
        require(
            treasury == *self.deriver.treasury()
                && restrictions_key == postbox.post_restrictions_account,
            ProgramErrorCode::ConstraintAddress,
        )?;
        require(
            entry_key == self.deriver.vote_entry(&post_key, &voter)?,
            ProgramErrorCode::ConstraintSeeds,
        )?;
        let mut post = self.state.load_required::<PostAccount>(&post_key, &program)?;

        let restriction = self.effective_restriction(Some(post_key), &restrictions_key)?;
        self.check_restriction(&restriction, &voter, &extras)?;

        match self.state.load::<VoteEntryAccount>(&entry_key, &program)? {
            Some(entry) if entry.direction == direction => {
                return Err(ProgramErrorCode::AlreadyVoted.into());
            }
            Some(mut entry) => {
                match direction {
                    VoteDirection::Up => {
                        post.down_votes = post.down_votes.saturating_sub(1);
                        post.up_votes += 1;
                    }
                    VoteDirection::Down => {
                        post.up_votes = post.up_votes.saturating_sub(1);
                        post.down_votes += 1;
                    }
                }
                entry.direction = direction;
                self.state.store(entry_key, program, &entry);
            }
            None => {
                match direction {
                    VoteDirection::Up => post.up_votes += 1,
                    VoteDirection::Down => post.down_votes += 1,
                }
                let entry = VoteEntryAccount {
                    post: post_key,
                    voter,
                    direction,
                };
                self.state.create(entry_key, program, &entry, &voter)?;
            }
        }
        self.state.store(post_key, program, &post);
        self.state.transfer(&voter, &treasury, VOTE_FEE_LAMPORTS)?;
        Ok(())
    }

    fn designate_moderator(&mut self, accounts: &InstructionAccounts<'_>) -> Result<()> {
        let program = self.postbox_program();
        let postbox_key = accounts.key(0)?;
        let owner = accounts.signer(1)?;
        let owner_info = accounts.key(2)?;
        let moderator_mint = accounts.key(3)?;
        let new_moderator = accounts.key(4)?;
        let credential = accounts.key(5)?;

        let postbox = self
            .state
            .load_required::<PostboxAccount>(&postbox_key, &program)?;
        self.require_owner(&postbox_key, &owner_info, &owner)?;
        require(
            moderator_mint == postbox.moderator_mint
                && credential == associated_token_address(&new_moderator, &moderator_mint)?,
            ProgramErrorCode::ConstraintAddress,
        )?;

        self.state
            .credit_token(credential, &new_moderator, &moderator_mint, 1, &owner)?;
        *self.state.mint_supply.entry(moderator_mint).or_insert(0) += 1;
        Ok(())
    }

    fn update_setting(
        &mut self,
        accounts: &InstructionAccounts<'_>,
        setting: SettingsData,
    ) -> Result<()> {
        let program = self.postbox_program();
        let postbox_key = accounts.key(0)?;
        let owner = accounts.signer(1)?;
        let owner_info = accounts.key(2)?;
        let settings_key = accounts.key(3)?;

        self.state
            .load_required::<PostboxAccount>(&postbox_key, &program)?;
        self.require_owner(&postbox_key, &owner_info, &owner)?;

        let kind = match &setting {
            SettingsData::Description(_) => SettingsKind::Description,
            SettingsData::OwnerInfo { .. } => SettingsKind::OwnerInfo,
            SettingsData::PostRestriction { .. } => SettingsKind::PostRestriction,
        };
        require(
            settings_key == self.deriver.settings(&postbox_key, kind)?,
            ProgramErrorCode::PostInvalidSettingsType,
        )?;

        match setting {
            SettingsData::Description(description) => {
                self.write_setting(settings_key, &description, &owner)
            }
            SettingsData::OwnerInfo { owners } => {
                require(!owners.is_empty(), ProgramErrorCode::MalformedSetting)?;
                self.write_setting(settings_key, &OwnerInfoAccount { owners }, &owner)
            }
            SettingsData::PostRestriction { restriction } => {
                self.write_setting(settings_key, &RestrictionAccount { restriction }, &owner)
            }
        }
    }

    fn write_setting<T: crate::program::accounts::AccountLayout>(
        &mut self,
        address: Pubkey,
        value: &T,
        payer: &Pubkey,
    ) -> Result<()> {
        let program = self.postbox_program();
        if self.state.exists(&address) {
            self.state.store(address, program, value);
            Ok(())
        } else {
            self.state.create(address, program, value, payer)
        }
    }
}

//! Per-owner inbox of sequential messages.
//!
//! A mailbox is two counters: `message_count` (slots ever allocated) and
//! `read_message_count` (the FIFO read pointer). Messages live at derived
//! addresses `(mailbox, index)`. Sending writes slot `message_count`;
//! popping closes slot `read_message_count`; deleting may close any slot
//! and leaves a hole unless it is the one under the read pointer. Reads
//! always re-fetch the counters and tolerate holes.

use crate::codec::{MessagePayload, PayloadCodec};
use crate::context::DispatchContext;
use crate::error::{DispatchError, Result};
use crate::ledger::{fetch_decoded, ProgramEvent};
use crate::program::accounts::{AccountLayout, MailboxAccount, MessageAccount};
use crate::program::instructions::{
    self, ClaimIncentiveKeys, DeleteMessageKeys, IncentiveKeys, SendMessageKeys,
};
use crate::pubkey::{Pubkey, Signature};
use tokio::sync::broadcast;
use tracing::{debug, info, instrument, warn};

/// Construction options for [`Mailbox`].
#[derive(Debug, Clone, Copy, Default)]
pub struct MailboxOptions {
    /// Mailbox owner; defaults to the wallet.
    pub owner: Option<Pubkey>,
    /// Rent payer for sends; defaults to the owner.
    pub payer: Option<Pubkey>,
    /// Obfuscate outgoing payloads for their receiver.
    pub obfuscate: bool,
}

/// Token deposit attached to a send, claimable by the receiver.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Incentive {
    /// Token mint.
    pub mint: Pubkey,
    /// Amount in base units.
    pub amount: u64,
    /// Sender's token account the deposit is drawn from.
    pub payer_token_account: Pubkey,
}

/// A live message slot with its decoded payload.
#[derive(Debug, Clone, PartialEq)]
pub struct ReceivedMessage {
    /// Slot index.
    pub index: u32,
    /// Logical author.
    pub sender: Pubkey,
    /// Account that paid rent and receives it back on close.
    pub payer: Pubkey,
    /// Decoded content.
    pub payload: MessagePayload,
    /// Unclaimed incentive, if any.
    pub incentive: Option<crate::program::accounts::Incentive>,
}

/// A message-sent notification for this mailbox.
#[derive(Debug, Clone, PartialEq)]
pub struct MessageNotice {
    /// Slot index.
    pub index: u32,
    /// Logical author.
    pub sender: Pubkey,
    /// Decoded content.
    pub payload: MessagePayload,
}

/// An incentive-claimed notification involving this mailbox's owner.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IncentiveNotice {
    /// Slot index.
    pub index: u32,
    /// Original sender.
    pub sender: Pubkey,
    /// Claiming receiver.
    pub receiver: Pubkey,
    /// Incentive mint.
    pub mint: Pubkey,
    /// Claimed amount.
    pub amount: u64,
}

/// Stream of messages sent to one owner.
pub struct MessageSubscription {
    events: broadcast::Receiver<ProgramEvent>,
    owner: Pubkey,
}

impl MessageSubscription {
    /// Waits for the next message to this owner; `None` once the event
    /// source shuts down.
    pub async fn next(&mut self) -> Option<MessageNotice> {
        loop {
            match self.events.recv().await {
                Ok(ProgramEvent::MessageSent {
                    sender,
                    receiver,
                    index,
                    data,
                }) if receiver == self.owner => {
                    return Some(MessageNotice {
                        index,
                        sender,
                        payload: PayloadCodec::decode_lenient(&data, &self.owner),
                    });
                }
                Ok(_) => continue,
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!("Message subscription lagged, {} events dropped", skipped);
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }
}

/// Stream of incentive claims where the owner is sender or receiver.
pub struct IncentiveSubscription {
    events: broadcast::Receiver<ProgramEvent>,
    owner: Pubkey,
}

impl IncentiveSubscription {
    /// Waits for the next claim involving this owner.
    pub async fn next(&mut self) -> Option<IncentiveNotice> {
        loop {
            match self.events.recv().await {
                Ok(ProgramEvent::IncentiveClaimed {
                    sender,
                    receiver,
                    index,
                    mint,
                    amount,
                }) if sender == self.owner || receiver == self.owner => {
                    return Some(IncentiveNotice {
                        index,
                        sender,
                        receiver,
                        mint,
                        amount,
                    });
                }
                Ok(_) => continue,
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!("Incentive subscription lagged, {} events dropped", skipped);
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }
}

/// Mailbox protocol bound to one owner.
#[derive(Clone)]
pub struct Mailbox {
    ctx: DispatchContext,
    owner: Pubkey,
    payer: Pubkey,
    obfuscate: bool,
}

impl Mailbox {
    /// Creates a mailbox handle. No ledger access happens here.
    pub fn new(ctx: DispatchContext, options: MailboxOptions) -> Self {
        let owner = options.owner.unwrap_or_else(|| ctx.wallet_pubkey());
        let payer = options.payer.unwrap_or(owner);
        Self {
            ctx,
            owner,
            payer,
            obfuscate: options.obfuscate,
        }
    }

    /// Mailbox owner.
    pub fn owner(&self) -> &Pubkey {
        &self.owner
    }

    /// Address of this owner's mailbox account.
    pub fn address(&self) -> Result<Pubkey> {
        self.ctx.deriver().mailbox(&self.owner)
    }

    /// Address of slot `index` in `receiver`'s mailbox.
    pub fn message_address(&self, receiver: &Pubkey, index: u32) -> Result<Pubkey> {
        self.ctx.deriver().message(receiver, index)
    }

    /// Local checks that must pass before any transaction is built.
    fn validate_wallet(&self) -> Result<()> {
        let wallet = self.ctx.wallet_pubkey();
        if wallet != self.owner {
            return Err(DispatchError::invalid_input(format!(
                "Mailbox owner {} must equal the wallet {} to send transactions",
                self.owner, wallet
            )));
        }
        if self.payer != self.owner {
            return Err(DispatchError::invalid_input(format!(
                "Payer {} must equal the mailbox owner {} to send transactions",
                self.payer, self.owner
            )));
        }
        self.ctx.wallet().ensure_can_sign()
    }

    /// Counters of `owner`'s mailbox; a missing mailbox reads as empty.
    async fn counters_of(&self, owner: &Pubkey) -> Result<(Pubkey, MailboxAccount)> {
        let address = self.ctx.deriver().mailbox(owner)?;
        let mailbox = fetch_decoded::<MailboxAccount>(self.ctx.ledger(), &address)
            .await?
            .unwrap_or_default();
        Ok((address, mailbox))
    }

    /// Sends `payload` to `receiver`, optionally escrowing an incentive.
    ///
    /// The slot is `receiver`'s current `message_count`. If another sender
    /// takes that slot first the ledger rejects the transaction and this
    /// returns `Conflict`; call again to re-read the counter.
    #[instrument(skip(self, receiver, payload, incentive), fields(receiver = %receiver.short()))]
    pub async fn send(
        &self,
        receiver: &Pubkey,
        payload: &MessagePayload,
        incentive: Option<&Incentive>,
    ) -> Result<Signature> {
        self.validate_wallet()?;
        let deriver = self.ctx.deriver();
        let (mailbox, counters) = self.counters_of(receiver).await?;
        let index = counters.message_count;
        let message = deriver.message_in(&mailbox, index)?;
        debug!("Sending into slot {}", index);

        let data = if self.obfuscate {
            PayloadCodec::encode_obfuscated(payload, receiver)?
        } else {
            PayloadCodec::encode(payload)?
        };
        let incentive_keys = match incentive {
            Some(incentive) => Some(IncentiveKeys {
                mint: incentive.mint,
                payer_token_account: incentive.payer_token_account,
                escrow: deriver.associated_token(&message, &incentive.mint)?,
                amount: incentive.amount,
            }),
            None => None,
        };

        let keys = SendMessageKeys {
            mailbox,
            receiver: *receiver,
            message,
            payer: self.payer,
            sender: self.owner,
            treasury: *deriver.treasury(),
        };
        let ix = instructions::send_message(
            deriver.messaging_program(),
            &keys,
            data,
            incentive_keys.as_ref(),
        );
        let signature = self.ctx.submit(vec![ix]).await?;
        info!("Sent message {} to {}", index, receiver.short());
        Ok(signature)
    }

    /// Sends a plain text body.
    pub async fn send_text(&self, receiver: &Pubkey, body: &str) -> Result<Signature> {
        self.send(receiver, &MessagePayload::new(body), None).await
    }

    /// Closes the oldest unread slot and advances the read pointer.
    ///
    /// Rent goes back to the message's original payer. If the slot under
    /// the pointer is already a hole, the pointer still advances by one.
    #[instrument(skip(self))]
    pub async fn pop(&self) -> Result<Signature> {
        self.validate_wallet()?;
        let deriver = self.ctx.deriver();
        let address = self.address()?;
        let mailbox = fetch_decoded::<MailboxAccount>(self.ctx.ledger(), &address)
            .await?
            .ok_or_else(|| DispatchError::not_found(format!("Mailbox {} not found", address)))?;
        if mailbox.read_message_count >= mailbox.message_count {
            return Err(DispatchError::not_found(format!(
                "Mailbox {} has no unread messages",
                address
            )));
        }

        let index = mailbox.read_message_count;
        let message_key = deriver.message_in(&address, index)?;
        let rent_destination =
            match fetch_decoded::<MessageAccount>(self.ctx.ledger(), &message_key).await? {
                Some(message) => message.payer,
                None => {
                    debug!("Slot {} is a hole; advancing past it", index);
                    self.owner
                }
            };

        let ix = instructions::close_message(
            deriver.messaging_program(),
            &address,
            &self.owner,
            &message_key,
            &rent_destination,
        );
        let signature = self.ctx.submit(vec![ix]).await?;
        info!("Popped message {}", index);
        Ok(signature)
    }

    /// Deletes slot `index` of `receiver`'s mailbox (this owner's by
    /// default). The ledger only accepts the receiver or the sender.
    #[instrument(skip(self, receiver))]
    pub async fn delete(&self, index: u32, receiver: Option<&Pubkey>) -> Result<Signature> {
        self.validate_wallet()?;
        let deriver = self.ctx.deriver();
        let receiver = receiver.copied().unwrap_or(self.owner);
        let mailbox = deriver.mailbox(&receiver)?;
        let message_key = deriver.message_in(&mailbox, index)?;
        let message = self.require_message(&message_key, index).await?;

        let keys = DeleteMessageKeys {
            mailbox,
            receiver,
            deleter: self.owner,
            message: message_key,
            rent_destination: message.payer,
        };
        let ix = instructions::delete_message(deriver.messaging_program(), &keys, index);
        let signature = self.ctx.submit(vec![ix]).await?;
        info!("Deleted message {} of {}", index, receiver.short());
        Ok(signature)
    }

    /// Takes the incentive escrowed on slot `index` and closes the slot.
    #[instrument(skip(self))]
    pub async fn claim_incentive(&self, index: u32) -> Result<Signature> {
        self.validate_wallet()?;
        let deriver = self.ctx.deriver();
        let mailbox = self.address()?;
        let message_key = deriver.message_in(&mailbox, index)?;
        let message = self.require_message(&message_key, index).await?;
        let incentive = message.incentive.ok_or_else(|| {
            DispatchError::invalid_input(format!("Message {} carries no incentive", index))
        })?;

        let keys = ClaimIncentiveKeys {
            mailbox,
            receiver: self.owner,
            message: message_key,
            rent_destination: message.payer,
            escrow: deriver.associated_token(&message_key, &incentive.mint)?,
            receiver_token_account: deriver.associated_token(&self.owner, &incentive.mint)?,
        };
        let ix = instructions::claim_incentive(deriver.messaging_program(), &keys, index);
        let signature = self.ctx.submit(vec![ix]).await?;
        info!(
            "Claimed {} of {} from message {}",
            incentive.amount,
            incentive.mint.short(),
            index
        );
        Ok(signature)
    }

    async fn require_message(&self, address: &Pubkey, index: u32) -> Result<MessageAccount> {
        fetch_decoded::<MessageAccount>(self.ctx.ledger(), address)
            .await?
            .ok_or_else(|| DispatchError::not_found(format!("Message {} ({}) not found", index, address)))
    }

    /// Live messages in `receiver`'s unread range, index ascending.
    async fn fetch_unread(&self, receiver: &Pubkey) -> Result<Vec<ReceivedMessage>> {
        let deriver = self.ctx.deriver();
        let (mailbox, counters) = self.counters_of(receiver).await?;
        if counters.read_message_count >= counters.message_count {
            return Ok(Vec::new());
        }

        let indices: Vec<u32> = (counters.read_message_count..counters.message_count).collect();
        let addresses = indices
            .iter()
            .map(|index| deriver.message_in(&mailbox, *index))
            .collect::<Result<Vec<_>>>()?;
        let fetched = self.ctx.ledger().get_multiple_accounts(&addresses).await?;

        let mut messages = Vec::with_capacity(fetched.len());
        for (index, fetch) in indices.into_iter().zip(fetched) {
            let Some(data) = fetch.into_option() else {
                debug!("Skipping hole at slot {}", index);
                continue;
            };
            let account = MessageAccount::from_bytes(&data)?;
            messages.push(ReceivedMessage {
                index,
                sender: account.sender,
                payer: account.payer,
                payload: PayloadCodec::decode_lenient(&account.data, receiver),
                incentive: account.incentive,
            });
        }
        Ok(messages)
    }

    /// Unread messages of this mailbox, oldest first, skipping holes.
    #[instrument(skip(self))]
    pub async fn fetch_messages(&self) -> Result<Vec<ReceivedMessage>> {
        self.fetch_unread(&self.owner).await
    }

    /// Unread messages this owner sent to `receiver`, oldest first.
    #[instrument(skip(self, receiver), fields(receiver = %receiver.short()))]
    pub async fn fetch_sent(&self, receiver: &Pubkey) -> Result<Vec<ReceivedMessage>> {
        let mut messages = self.fetch_unread(receiver).await?;
        messages.retain(|message| message.sender == self.owner);
        Ok(messages)
    }

    /// Reads slot `index` of this mailbox; a missing slot is `NotFound`.
    pub async fn get_message(&self, index: u32) -> Result<ReceivedMessage> {
        let address = self.ctx.deriver().message(&self.owner, index)?;
        let account = self.require_message(&address, index).await?;
        Ok(ReceivedMessage {
            index,
            sender: account.sender,
            payer: account.payer,
            payload: PayloadCodec::decode_lenient(&account.data, &self.owner),
            incentive: account.incentive,
        })
    }

    /// Number of live unread messages.
    pub async fn count(&self) -> Result<usize> {
        Ok(self.fetch_messages().await?.len())
    }

    /// Raw counters; a missing mailbox reads as zeros.
    pub async fn count_ex(&self) -> Result<MailboxAccount> {
        Ok(self.counters_of(&self.owner).await?.1)
    }

    /// Subscribes to messages sent to this owner.
    pub fn subscribe(&self) -> Result<MessageSubscription> {
        Ok(MessageSubscription {
            events: self.ctx.ledger().subscribe()?,
            owner: self.owner,
        })
    }

    /// Subscribes to incentive claims involving this owner.
    pub fn subscribe_incentives(&self) -> Result<IncentiveSubscription> {
        Ok(IncentiveSubscription {
            events: self.ctx.ledger().subscribe()?,
            owner: self.owner,
        })
    }
}

impl std::fmt::Debug for Mailbox {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Mailbox")
            .field("owner", &self.owner)
            .field("payer", &self.payer)
            .field("obfuscate", &self.obfuscate)
            .finish()
    }
}

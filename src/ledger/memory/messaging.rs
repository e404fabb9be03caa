//! Simulated messaging program.

use super::{require, InstructionAccounts, Runtime};
use crate::address::associated_token_address;
use crate::constants::{MESSAGE_FEE_LAMPORTS, TOKEN_PROGRAM_ID};
use crate::error::Result;
use crate::ledger::ProgramEvent;
use crate::program::accounts::{Incentive, MailboxAccount, MessageAccount};
use crate::program::errors::ProgramErrorCode;
use crate::program::instructions::MessagingInstruction;
use crate::pubkey::Pubkey;

impl<'a> Runtime<'a> {
    pub(super) fn execute_messaging(&mut self, accounts: &InstructionAccounts<'_>) -> Result<()> {
        match MessagingInstruction::decode(&accounts.ix.data)? {
            MessagingInstruction::SendMessage { data } => self.send_message(accounts, data, None),
            MessagingInstruction::SendMessageWithIncentive {
                data,
                incentive_amount,
            } => self.send_message(accounts, data, Some(incentive_amount)),
            MessagingInstruction::CloseMessage => self.close_message(accounts),
            MessagingInstruction::DeleteMessage { index } => self.delete_message(accounts, index),
            MessagingInstruction::ClaimIncentive { index } => self.claim_incentive(accounts, index),
        }
    }

    fn program(&self) -> Pubkey {
        *self.deriver.messaging_program()
    }

    /// Checks the mailbox address against its receiver.
    fn mailbox_of(&self, mailbox: &Pubkey, receiver: &Pubkey) -> Result<()> {
        require(
            *mailbox == self.deriver.mailbox(receiver)?,
            ProgramErrorCode::ConstraintSeeds,
        )
    }

    fn send_message(
        &mut self,
        accounts: &InstructionAccounts<'_>,
        data: Vec<u8>,
        incentive_amount: Option<u64>,
    ) -> Result<()> {
        let program = self.program();
        let mailbox_key = accounts.key(0)?;
        let receiver = accounts.key(1)?;
        let message_key = accounts.key(2)?;
        let payer = accounts.signer(3)?;
        let sender = accounts.key(4)?;
        let treasury = accounts.key(5)?;

        self.mailbox_of(&mailbox_key, &receiver)?;
        require(
            treasury == *self.deriver.treasury(),
            ProgramErrorCode::ConstraintAddress,
        )?;

        let existing = self.state.load::<MailboxAccount>(&mailbox_key, &program)?;
        let mut mailbox = existing.unwrap_or_default();
        let index = mailbox.message_count;
        require(
            message_key == self.deriver.message_in(&mailbox_key, index)?,
            ProgramErrorCode::ConstraintSeeds,
        )?;

        let incentive = match incentive_amount {
            Some(amount) => {
                let mint = accounts.key(7)?;
                let payer_token = accounts.key(8)?;
                let escrow = accounts.key(9)?;
                require(
                    accounts.key(10)? == *TOKEN_PROGRAM_ID,
                    ProgramErrorCode::ConstraintAddress,
                )?;
                require(
                    escrow == associated_token_address(&message_key, &mint)?,
                    ProgramErrorCode::ConstraintSeeds,
                )?;
                let source = self
                    .state
                    .token(&payer_token)
                    .ok_or_else(|| ProgramErrorCode::ConstraintRaw.into_error())?;
                require(
                    source.owner == payer && source.mint == mint,
                    ProgramErrorCode::ConstraintRaw,
                )?;
                self.state.debit_token(&payer_token, amount)?;
                self.state
                    .credit_token(escrow, &message_key, &mint, amount, &payer)?;
                Some(Incentive { mint, amount })
            }
            None => None,
        };

        let message = MessageAccount {
            sender,
            payer,
            data: data.clone(),
            incentive,
        };
        self.state.create(message_key, program, &message, &payer)?;
        if existing.is_none() {
            self.state.create(mailbox_key, program, &mailbox, &payer)?;
        }
        self.state.transfer(&payer, &treasury, MESSAGE_FEE_LAMPORTS)?;

        mailbox.message_count += 1;
        self.state.store(mailbox_key, program, &mailbox);
        self.events.push(ProgramEvent::MessageSent {
            sender,
            receiver,
            index,
            data,
        });
        Ok(())
    }

    /// Returns an unclaimed incentive deposit to the message's payer.
    fn refund_incentive(&mut self, message_key: &Pubkey, message: &MessageAccount) -> Result<()> {
        if let Some(incentive) = &message.incentive {
            let escrow = associated_token_address(message_key, &incentive.mint)?;
            let refund = associated_token_address(&message.payer, &incentive.mint)?;
            if self.state.token(&escrow).is_some() {
                self.state.debit_token(&escrow, incentive.amount)?;
                self.state.credit_token(
                    refund,
                    &message.payer,
                    &incentive.mint,
                    incentive.amount,
                    &message.payer,
                )?;
                self.state.close(&escrow, &message.payer);
            }
        }
        Ok(())
    }

    fn close_message(&mut self, accounts: &InstructionAccounts<'_>) -> Result<()> {
        let program = self.program();
        let mailbox_key = accounts.key(0)?;
        let receiver = accounts.signer(1)?;
        let message_key = accounts.key(2)?;
        let rent_destination = accounts.key(3)?;

        self.mailbox_of(&mailbox_key, &receiver)?;
        let mut mailbox = self
            .state
            .load_required::<MailboxAccount>(&mailbox_key, &program)?;
        require(
            mailbox.read_message_count < mailbox.message_count,
            ProgramErrorCode::AccountNotInitialized,
        )?;
        require(
            message_key == self.deriver.message_in(&mailbox_key, mailbox.read_message_count)?,
            ProgramErrorCode::ConstraintSeeds,
        )?;

        // A hole at the read pointer is skipped without closing anything.
        if let Some(message) = self.state.load::<MessageAccount>(&message_key, &program)? {
            require(
                rent_destination == message.payer,
                ProgramErrorCode::ConstraintAddress,
            )?;
            self.refund_incentive(&message_key, &message)?;
            self.state.close(&message_key, &rent_destination);
        }

        mailbox.read_message_count += 1;
        self.state.store(mailbox_key, program, &mailbox);
        Ok(())
    }

    fn delete_message(&mut self, accounts: &InstructionAccounts<'_>, index: u32) -> Result<()> {
        let program = self.program();
        let mailbox_key = accounts.key(0)?;
        let receiver = accounts.key(1)?;
        let deleter = accounts.signer(2)?;
        let message_key = accounts.key(3)?;
        let rent_destination = accounts.key(4)?;

        self.mailbox_of(&mailbox_key, &receiver)?;
        require(
            message_key == self.deriver.message_in(&mailbox_key, index)?,
            ProgramErrorCode::ConstraintSeeds,
        )?;
        let mut mailbox = self
            .state
            .load_required::<MailboxAccount>(&mailbox_key, &program)?;
        let message = self
            .state
            .load_required::<MessageAccount>(&message_key, &program)?;
        require(
            deleter == receiver || deleter == message.sender,
            ProgramErrorCode::ConstraintRaw,
        )?;
        require(
            rent_destination == message.payer,
            ProgramErrorCode::ConstraintAddress,
        )?;

        self.refund_incentive(&message_key, &message)?;
        self.state.close(&message_key, &rent_destination);
        if index == mailbox.read_message_count {
            mailbox.read_message_count += 1;
            self.state.store(mailbox_key, program, &mailbox);
        }
        Ok(())
    }

    fn claim_incentive(&mut self, accounts: &InstructionAccounts<'_>, index: u32) -> Result<()> {
        let program = self.program();
        let mailbox_key = accounts.key(0)?;
        let receiver = accounts.signer(1)?;
        let message_key = accounts.key(2)?;
        let rent_destination = accounts.key(3)?;
        let escrow = accounts.key(4)?;
        let receiver_token = accounts.key(5)?;

        self.mailbox_of(&mailbox_key, &receiver)?;
        require(
            message_key == self.deriver.message_in(&mailbox_key, index)?,
            ProgramErrorCode::ConstraintSeeds,
        )?;
        let mut mailbox = self
            .state
            .load_required::<MailboxAccount>(&mailbox_key, &program)?;
        let message = self
            .state
            .load_required::<MessageAccount>(&message_key, &program)?;
        let incentive = message
            .incentive
            .ok_or_else(|| ProgramErrorCode::ConstraintRaw.into_error())?;
        require(
            rent_destination == message.payer,
            ProgramErrorCode::ConstraintAddress,
        )?;
        require(
            escrow == associated_token_address(&message_key, &incentive.mint)?,
            ProgramErrorCode::ConstraintAddress,
        )?;
        require(
            receiver_token == associated_token_address(&receiver, &incentive.mint)?,
            ProgramErrorCode::ConstraintAddress,
        )?;

        self.state.debit_token(&escrow, incentive.amount)?;
        self.state.credit_token(
            receiver_token,
            &receiver,
            &incentive.mint,
            incentive.amount,
            &receiver,
        )?;
        self.state.close(&escrow, &message.payer);
        self.state.close(&message_key, &rent_destination);
        if index == mailbox.read_message_count {
            mailbox.read_message_count += 1;
            self.state.store(mailbox_key, program, &mailbox);
        }

        self.events.push(ProgramEvent::IncentiveClaimed {
            sender: message.sender,
            receiver,
            index,
            mint: incentive.mint,
            amount: incentive.amount,
        });
        Ok(())
    }
}

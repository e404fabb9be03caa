//! Ledger wire format for transactions.
//!
//! A message lists every referenced account once, ordered signers first
//! (writable before read-only) and then non-signers (writable before
//! read-only), with the fee payer at index 0. Instructions refer to
//! accounts by their index in that list. Lengths use the compact-u16
//! varint encoding.

use super::{Instruction, Transaction};
use crate::error::{DispatchError, Result};
use crate::pubkey::{Pubkey, Signature};

/// Largest serialized transaction the ledger accepts.
pub const PACKET_DATA_SIZE: usize = 1232;

/// Appends `value` as a compact-u16.
pub fn encode_compact_u16(out: &mut Vec<u8>, value: u16) {
    let mut rem = value;
    loop {
        let mut byte = (rem & 0x7f) as u8;
        rem >>= 7;
        if rem == 0 {
            out.push(byte);
            return;
        }
        byte |= 0x80;
        out.push(byte);
    }
}

/// Reads a compact-u16, returning the value and the bytes consumed.
pub fn decode_compact_u16(bytes: &[u8]) -> Result<(u16, usize)> {
    let mut value: u32 = 0;
    for (i, byte) in bytes.iter().take(3).enumerate() {
        value |= ((byte & 0x7f) as u32) << (7 * i);
        if byte & 0x80 == 0 {
            return u16::try_from(value)
                .map(|v| (v, i + 1))
                .map_err(|_| DispatchError::serialization("compact-u16 overflow"));
        }
    }
    Err(DispatchError::serialization("Truncated compact-u16"))
}

fn compact_len(out: &mut Vec<u8>, len: usize, what: &str) -> Result<()> {
    let len = u16::try_from(len)
        .map_err(|_| DispatchError::invalid_input(format!("Too many {}: {}", what, len)))?;
    encode_compact_u16(out, len);
    Ok(())
}

/// Message header counts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MessageHeader {
    /// Signatures required.
    pub num_required_signatures: u8,
    /// Read-only accounts among the signers.
    pub num_readonly_signed: u8,
    /// Read-only accounts among the non-signers.
    pub num_readonly_unsigned: u8,
}

/// One instruction with account references replaced by indices.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompiledInstruction {
    /// Index of the invoked program.
    pub program_id_index: u8,
    /// Indices of the instruction's accounts.
    pub accounts: Vec<u8>,
    /// Instruction data.
    pub data: Vec<u8>,
}

/// A transaction message ready to be signed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompiledMessage {
    /// Header counts.
    pub header: MessageHeader,
    /// Every account referenced, in canonical order.
    pub account_keys: Vec<Pubkey>,
    /// Recent blockhash bounding the message's lifetime.
    pub recent_blockhash: [u8; 32],
    /// Compiled instructions.
    pub instructions: Vec<CompiledInstruction>,
}

#[derive(Clone, Copy)]
struct KeyFlags {
    key: Pubkey,
    signer: bool,
    writable: bool,
}

impl CompiledMessage {
    /// Compiles `tx` against `recent_blockhash`.
    pub fn compile(tx: &Transaction, recent_blockhash: [u8; 32]) -> Result<Self> {
        let mut keys: Vec<KeyFlags> = vec![KeyFlags {
            key: tx.fee_payer,
            signer: true,
            writable: true,
        }];
        let mut merge = |key: Pubkey, signer: bool, writable: bool| {
            match keys.iter_mut().find(|k| k.key == key) {
                Some(existing) => {
                    existing.signer |= signer;
                    existing.writable |= writable;
                }
                None => keys.push(KeyFlags {
                    key,
                    signer,
                    writable,
                }),
            }
        };
        for ix in &tx.instructions {
            for meta in &ix.accounts {
                merge(meta.pubkey, meta.is_signer, meta.is_writable);
            }
            merge(ix.program_id, false, false);
        }

        // Stable, so the fee payer keeps index 0.
        keys.sort_by_key(|k| (!k.signer, !k.writable));
        if keys.len() > u8::MAX as usize + 1 {
            return Err(DispatchError::invalid_input(format!(
                "Transaction references {} accounts",
                keys.len()
            )));
        }

        let count = |signer: bool, writable: bool| {
            keys.iter()
                .filter(|k| k.signer == signer && k.writable == writable)
                .count() as u8
        };
        let header = MessageHeader {
            num_required_signatures: keys.iter().filter(|k| k.signer).count() as u8,
            num_readonly_signed: count(true, false),
            num_readonly_unsigned: count(false, false),
        };
        let account_keys: Vec<Pubkey> = keys.iter().map(|k| k.key).collect();

        let index_of = |key: &Pubkey| -> Result<u8> {
            account_keys
                .iter()
                .position(|k| k == key)
                .map(|i| i as u8)
                .ok_or_else(|| DispatchError::invalid_input(format!("Unlisted account {}", key)))
        };
        let instructions = tx
            .instructions
            .iter()
            .map(|ix: &Instruction| {
                Ok(CompiledInstruction {
                    program_id_index: index_of(&ix.program_id)?,
                    accounts: ix
                        .accounts
                        .iter()
                        .map(|meta| index_of(&meta.pubkey))
                        .collect::<Result<Vec<_>>>()?,
                    data: ix.data.clone(),
                })
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(Self {
            header,
            account_keys,
            recent_blockhash,
            instructions,
        })
    }

    /// Keys that must sign, in signature order.
    pub fn signer_keys(&self) -> &[Pubkey] {
        &self.account_keys[..self.header.num_required_signatures as usize]
    }

    /// Serializes the message; this is what signers sign.
    pub fn serialize(&self) -> Result<Vec<u8>> {
        let mut out = vec![
            self.header.num_required_signatures,
            self.header.num_readonly_signed,
            self.header.num_readonly_unsigned,
        ];
        compact_len(&mut out, self.account_keys.len(), "accounts")?;
        for key in &self.account_keys {
            out.extend_from_slice(key.as_bytes());
        }
        out.extend_from_slice(&self.recent_blockhash);
        compact_len(&mut out, self.instructions.len(), "instructions")?;
        for ix in &self.instructions {
            out.push(ix.program_id_index);
            compact_len(&mut out, ix.accounts.len(), "instruction accounts")?;
            out.extend_from_slice(&ix.accounts);
            compact_len(&mut out, ix.data.len(), "instruction data bytes")?;
            out.extend_from_slice(&ix.data);
        }
        Ok(out)
    }
}

/// Serializes a signed transaction, checking the packet size limit.
pub fn encode_transaction(signatures: &[Signature], message: &[u8]) -> Result<Vec<u8>> {
    let mut out = Vec::with_capacity(1 + signatures.len() * 64 + message.len());
    compact_len(&mut out, signatures.len(), "signatures")?;
    for signature in signatures {
        out.extend_from_slice(signature.as_bytes());
    }
    out.extend_from_slice(message);
    if out.len() > PACKET_DATA_SIZE {
        return Err(DispatchError::invalid_input(format!(
            "Transaction is {} bytes, limit is {}",
            out.len(),
            PACKET_DATA_SIZE
        )));
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ledger::AccountMeta;

    #[test]
    fn test_compact_u16_boundaries() {
        for (value, expected) in [
            (0u16, vec![0x00]),
            (0x7f, vec![0x7f]),
            (0x80, vec![0x80, 0x01]),
            (0x3fff, vec![0xff, 0x7f]),
            (0x4000, vec![0x80, 0x80, 0x01]),
            (u16::MAX, vec![0xff, 0xff, 0x03]),
        ] {
            let mut out = Vec::new();
            encode_compact_u16(&mut out, value);
            assert_eq!(out, expected, "value {}", value);
            assert_eq!(decode_compact_u16(&out).unwrap(), (value, expected.len()));
        }
        assert!(decode_compact_u16(&[0x80]).is_err());
    }

    #[test]
    fn test_account_ordering() {
        let payer = Pubkey::new_unique();
        let cosigner = Pubkey::new_unique();
        let writable = Pubkey::new_unique();
        let readonly = Pubkey::new_unique();
        let program = Pubkey::new_unique();
        let tx = Transaction::new(
            payer,
            vec![Instruction {
                program_id: program,
                accounts: vec![
                    AccountMeta::new_readonly(readonly, false),
                    AccountMeta::new(writable, false),
                    AccountMeta::new_readonly(cosigner, true),
                    AccountMeta::new(payer, true),
                ],
                data: vec![7],
            }],
        );
        let message = CompiledMessage::compile(&tx, [0u8; 32]).unwrap();
        assert_eq!(
            message.account_keys,
            vec![payer, cosigner, writable, readonly, program]
        );
        assert_eq!(
            message.header,
            MessageHeader {
                num_required_signatures: 2,
                num_readonly_signed: 1,
                num_readonly_unsigned: 2,
            }
        );
        assert_eq!(message.signer_keys(), &[payer, cosigner]);
        assert_eq!(message.instructions[0].program_id_index, 4);
        assert_eq!(message.instructions[0].accounts, vec![3, 2, 1, 0]);
    }

    #[test]
    fn test_oversized_transaction_rejected() {
        let message = vec![0u8; PACKET_DATA_SIZE];
        assert!(encode_transaction(&[Signature::default()], &message).is_err());
    }
}

//! Message payload encoding.
//!
//! Payloads are JSON objects `{subj?, body, ts, meta?}` compressed with
//! brotli. The obfuscated variant is the JSON text itself sealed for the
//! receiver in the OpenSSL passphrase format; see [`obfuscate`].
//!
//! `ts` is written as a number but older writers stored it as a numeric
//! string, so both are accepted on decode.

pub mod obfuscate;

use crate::error::{DispatchError, Result};
use crate::pubkey::Pubkey;
use serde::de::{self, Deserializer, Visitor};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::io::{Read, Write};
use std::time::{SystemTime, UNIX_EPOCH};
use tracing::warn;

pub use obfuscate::is_obfuscated;

/// Upper bound on a decompressed payload (1 MiB).
pub const MAX_DECODED_SIZE: u64 = 1024 * 1024;

const BROTLI_BUFFER_SIZE: usize = 4096;
const BROTLI_QUALITY: u32 = 11;
const BROTLI_LG_WINDOW: u32 = 22;

/// Free-form metadata attached to a payload.
pub type PayloadMeta = serde_json::Map<String, serde_json::Value>;

/// Decoded message or post content.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MessagePayload {
    /// Optional subject line.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subj: Option<String>,
    /// Message body.
    pub body: String,
    /// Creation time in epoch seconds.
    #[serde(default, deserialize_with = "deserialize_ts")]
    pub ts: u64,
    /// Application metadata (e.g. `{"topic": true}`).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub meta: Option<PayloadMeta>,
}

impl MessagePayload {
    /// Creates a payload with the given body, stamped with the current time.
    pub fn new(body: impl Into<String>) -> Self {
        Self {
            subj: None,
            body: body.into(),
            ts: now_secs(),
            meta: None,
        }
    }

    /// Sets the subject.
    pub fn with_subject(mut self, subj: impl Into<String>) -> Self {
        self.subj = Some(subj.into());
        self
    }

    /// Sets one metadata entry, creating the map if needed.
    pub fn with_meta(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.meta
            .get_or_insert_with(PayloadMeta::new)
            .insert(key.into(), value);
        self
    }

    /// Sets the timestamp.
    pub fn with_ts(mut self, ts: u64) -> Self {
        self.ts = ts;
        self
    }

    /// Returns a metadata value by key.
    pub fn meta_value(&self, key: &str) -> Option<&serde_json::Value> {
        self.meta.as_ref().and_then(|m| m.get(key))
    }

    /// Returns true if `meta.topic` is `true`.
    pub fn is_topic(&self) -> bool {
        matches!(self.meta_value("topic"), Some(serde_json::Value::Bool(true)))
    }
}

/// Accepts `ts` as an integer, a float or a numeric string.
fn deserialize_ts<'de, D>(deserializer: D) -> std::result::Result<u64, D::Error>
where
    D: Deserializer<'de>,
{
    struct TsVisitor;

    impl<'de> Visitor<'de> for TsVisitor {
        type Value = u64;

        fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
            f.write_str("epoch seconds as a number or numeric string")
        }

        fn visit_u64<E: de::Error>(self, v: u64) -> std::result::Result<u64, E> {
            Ok(v)
        }

        fn visit_i64<E: de::Error>(self, v: i64) -> std::result::Result<u64, E> {
            u64::try_from(v).map_err(|_| E::custom(format!("negative timestamp {}", v)))
        }

        fn visit_f64<E: de::Error>(self, v: f64) -> std::result::Result<u64, E> {
            if v.is_finite() && v >= 0.0 {
                Ok(v.trunc() as u64)
            } else {
                Err(E::custom(format!("invalid timestamp {}", v)))
            }
        }

        fn visit_str<E: de::Error>(self, v: &str) -> std::result::Result<u64, E> {
            let v = v.trim();
            match v.parse::<u64>() {
                Ok(ts) => Ok(ts),
                Err(_) => v
                    .parse::<f64>()
                    .map_err(|_| E::custom(format!("invalid timestamp {:?}", v)))
                    .and_then(|f| self.visit_f64(f)),
            }
        }

        fn visit_unit<E: de::Error>(self) -> std::result::Result<u64, E> {
            Ok(0)
        }
    }

    deserializer.deserialize_any(TsVisitor)
}

/// Current time in epoch seconds.
pub fn now_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

/// Encodes and decodes [`MessagePayload`] values for the ledger.
#[derive(Debug, Clone, Copy, Default)]
pub struct PayloadCodec;

impl PayloadCodec {
    /// Serializes and brotli-compresses a payload.
    pub fn encode(payload: &MessagePayload) -> Result<Vec<u8>> {
        let json = serde_json::to_vec(payload)?;
        compress(&json)
    }

    /// Decompresses and parses a payload.
    pub fn decode(bytes: &[u8]) -> Result<MessagePayload> {
        if is_obfuscated(bytes) {
            return Err(DispatchError::codec(
                "Payload is obfuscated; decode it with the receiver key",
            ));
        }
        let json = decompress(bytes)?;
        Ok(serde_json::from_slice(&json)?)
    }

    /// Encodes a payload readable only by parties that know `receiver`.
    /// The sealed plaintext is the uncompressed JSON text.
    pub fn encode_obfuscated(payload: &MessagePayload, receiver: &Pubkey) -> Result<Vec<u8>> {
        let json = serde_json::to_vec(payload)?;
        obfuscate::seal(&json, receiver)
    }

    /// Decodes a payload, removing obfuscation keyed to `reader` if present.
    pub fn decode_for(bytes: &[u8], reader: &Pubkey) -> Result<MessagePayload> {
        if is_obfuscated(bytes) {
            let json = obfuscate::open(bytes, reader)?;
            Ok(serde_json::from_slice(&json)?)
        } else {
            Self::decode(bytes)
        }
    }

    /// Like [`decode_for`](Self::decode_for) but never fails. Uncompressed
    /// JSON payloads are still parsed; anything else is surfaced as a raw
    /// UTF-8 body with `ts = 0`.
    pub fn decode_lenient(bytes: &[u8], reader: &Pubkey) -> MessagePayload {
        match Self::decode_for(bytes, reader) {
            Ok(payload) => payload,
            Err(e) if !is_obfuscated(bytes) => match serde_json::from_slice(bytes) {
                Ok(payload) => payload,
                Err(_) => {
                    warn!("Falling back to raw payload body: {}", e);
                    raw_payload(bytes)
                }
            },
            Err(e) => {
                warn!("Falling back to raw payload body: {}", e);
                raw_payload(bytes)
            }
        }
    }
}

fn raw_payload(bytes: &[u8]) -> MessagePayload {
    MessagePayload {
        subj: None,
        body: String::from_utf8_lossy(bytes).into_owned(),
        ts: 0,
        meta: None,
    }
}

fn compress(data: &[u8]) -> Result<Vec<u8>> {
    let mut encoder = brotli::CompressorWriter::new(
        Vec::new(),
        BROTLI_BUFFER_SIZE,
        BROTLI_QUALITY,
        BROTLI_LG_WINDOW,
    );
    encoder
        .write_all(data)
        .map_err(|e| DispatchError::codec(format!("Compression failed: {}", e)))?;
    encoder
        .flush()
        .map_err(|e| DispatchError::codec(format!("Compression failed: {}", e)))?;
    Ok(encoder.into_inner())
}

fn decompress(data: &[u8]) -> Result<Vec<u8>> {
    let mut out = Vec::new();
    brotli::Decompressor::new(data, BROTLI_BUFFER_SIZE)
        .take(MAX_DECODED_SIZE + 1)
        .read_to_end(&mut out)
        .map_err(|e| DispatchError::codec(format!("Decompression failed: {}", e)))?;
    if out.len() as u64 > MAX_DECODED_SIZE {
        return Err(DispatchError::codec("Decoded payload too large"));
    }
    Ok(out)
}

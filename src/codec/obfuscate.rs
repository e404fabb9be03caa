//! Receiver-keyed payload obfuscation.
//!
//! The passphrase is `"PK_" ‖ base58(receiver)`, so anyone who knows the
//! receiver's address can read the payload. This keeps content away from
//! casual explorers; it is not confidentiality.
//!
//! Layout: `"__o__" ‖ base64("Salted__" ‖ salt (8) ‖ AES-256-CBC ciphertext)`,
//! the OpenSSL passphrase format that CryptoJS emits. Key and IV come from
//! `EVP_BytesToKey` with MD5 and one iteration.

use crate::constants::{OBFUSCATION_KEY_PREFIX, OBFUSCATION_PREFIX};
use crate::error::{DispatchError, Result};
use crate::pubkey::Pubkey;
use aes::Aes256;
use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use cbc::cipher::{block_padding::Pkcs7, BlockDecryptMut, BlockEncryptMut, KeyIvInit};
use md5::{Digest, Md5};
use rand::RngCore;
use zeroize::Zeroizing;

type Aes256CbcEnc = cbc::Encryptor<Aes256>;
type Aes256CbcDec = cbc::Decryptor<Aes256>;

/// OpenSSL salted-format magic.
const SALT_MAGIC: &[u8] = b"Salted__";
const SALT_SIZE: usize = 8;
const KEY_SIZE: usize = 32;
const IV_SIZE: usize = 16;

/// Returns true if the bytes carry the obfuscation marker.
pub fn is_obfuscated(bytes: &[u8]) -> bool {
    bytes.starts_with(OBFUSCATION_PREFIX)
}

fn passphrase(receiver: &Pubkey) -> Zeroizing<Vec<u8>> {
    Zeroizing::new(format!("{}{}", OBFUSCATION_KEY_PREFIX, receiver.to_base58()).into_bytes())
}

/// `EVP_BytesToKey(MD5, count = 1)`: key ‖ iv.
fn derive_key_iv(passphrase: &[u8], salt: &[u8]) -> Zeroizing<[u8; KEY_SIZE + IV_SIZE]> {
    let mut out = Zeroizing::new([0u8; KEY_SIZE + IV_SIZE]);
    let mut filled = 0;
    let mut previous: Vec<u8> = Vec::new();
    while filled < out.len() {
        let mut hasher = Md5::new();
        hasher.update(&previous);
        hasher.update(passphrase);
        hasher.update(salt);
        previous = hasher.finalize().to_vec();
        let take = previous.len().min(out.len() - filled);
        out[filled..filled + take].copy_from_slice(&previous[..take]);
        filled += take;
    }
    out
}

fn seal_with_salt(plaintext: &[u8], receiver: &Pubkey, salt: [u8; SALT_SIZE]) -> Result<Vec<u8>> {
    let key_iv = derive_key_iv(&passphrase(receiver), &salt);
    let cipher = Aes256CbcEnc::new_from_slices(&key_iv[..KEY_SIZE], &key_iv[KEY_SIZE..])
        .map_err(|_| DispatchError::codec("Obfuscation failed"))?;
    let ciphertext = cipher.encrypt_padded_vec_mut::<Pkcs7>(plaintext);

    let mut salted = Vec::with_capacity(SALT_MAGIC.len() + SALT_SIZE + ciphertext.len());
    salted.extend_from_slice(SALT_MAGIC);
    salted.extend_from_slice(&salt);
    salted.extend_from_slice(&ciphertext);

    let mut out = OBFUSCATION_PREFIX.to_vec();
    out.extend_from_slice(BASE64.encode(salted).as_bytes());
    Ok(out)
}

/// Obfuscates `plaintext` for `receiver` under a fresh random salt.
pub fn seal(plaintext: &[u8], receiver: &Pubkey) -> Result<Vec<u8>> {
    let mut salt = [0u8; SALT_SIZE];
    rand::thread_rng().fill_bytes(&mut salt);
    seal_with_salt(plaintext, receiver, salt)
}

/// Removes obfuscation applied for `reader`.
pub fn open(bytes: &[u8], reader: &Pubkey) -> Result<Vec<u8>> {
    let body = bytes
        .strip_prefix(OBFUSCATION_PREFIX)
        .ok_or_else(|| DispatchError::codec("Missing obfuscation marker"))?;
    let salted = BASE64
        .decode(body)
        .map_err(|e| DispatchError::codec(format!("Obfuscated payload is not base64: {}", e)))?;
    let rest = salted
        .strip_prefix(SALT_MAGIC)
        .ok_or_else(|| DispatchError::codec("Obfuscated payload lacks a salt header"))?;
    if rest.len() < SALT_SIZE + IV_SIZE {
        return Err(DispatchError::codec("Obfuscated payload truncated"));
    }
    let (salt, ciphertext) = rest.split_at(SALT_SIZE);

    let key_iv = derive_key_iv(&passphrase(reader), salt);
    let cipher = Aes256CbcDec::new_from_slices(&key_iv[..KEY_SIZE], &key_iv[KEY_SIZE..])
        .map_err(|_| DispatchError::codec("Obfuscation failed"))?;
    cipher
        .decrypt_padded_vec_mut::<Pkcs7>(ciphertext)
        .map_err(|_| DispatchError::codec("Payload was not obfuscated for this reader"))
}

#[cfg(test)]
mod tests {
    use super::*;

    const RECEIVER: &str = "4wBqpZM9xaSheZzJSMawUKKwhdpChKbZ5eu5ky4Vigw";
    const PLAINTEXT: &str = r#"{"subj":"hi","body":"secret","ts":"1660000000"}"#;
    /// `CryptoJS.AES.encrypt(PLAINTEXT, "PK_" + RECEIVER)` with salt 0102030405060708.
    const CRYPTOJS_CIPHERTEXT: &str =
        "U2FsdGVkX18BAgMEBQYHCDxgLwACbhKZG3HLvQRj3bEQvuhnxo7j4qC1O15CltDwiI3YRuW3alnTKQtkpuBSJw==";

    fn receiver() -> Pubkey {
        RECEIVER.parse().unwrap()
    }

    #[test]
    fn test_seal_open() {
        let receiver = Pubkey::new_unique();
        let sealed = seal(b"data", &receiver).unwrap();
        assert!(is_obfuscated(&sealed));
        assert_eq!(open(&sealed, &receiver).unwrap(), b"data");
    }

    #[test]
    fn test_opens_cryptojs_ciphertext() {
        let stored = format!("__o__{}", CRYPTOJS_CIPHERTEXT);
        assert_eq!(open(stored.as_bytes(), &receiver()).unwrap(), PLAINTEXT.as_bytes());
    }

    #[test]
    fn test_seal_matches_cryptojs_output() {
        let sealed = seal_with_salt(PLAINTEXT.as_bytes(), &receiver(), [1, 2, 3, 4, 5, 6, 7, 8])
            .unwrap();
        assert_eq!(sealed, format!("__o__{}", CRYPTOJS_CIPHERTEXT).into_bytes());
    }

    #[test]
    fn test_salt_varies() {
        let receiver = Pubkey::new_unique();
        assert_ne!(seal(b"data", &receiver).unwrap(), seal(b"data", &receiver).unwrap());
    }

    #[test]
    fn test_malformed_rejected() {
        let reader = Pubkey::new_unique();
        assert!(open(b"__o__short", &reader).is_err());
        assert!(open(b"no marker", &reader).is_err());
        let headerless = format!("__o__{}", BASE64.encode([0u8; 32]));
        assert!(open(headerless.as_bytes(), &reader).is_err());
    }

    #[test]
    fn test_wrong_reader_rejected() {
        let stored = format!("__o__{}", CRYPTOJS_CIPHERTEXT);
        let result = open(stored.as_bytes(), &Pubkey::new_unique());
        // A wrong key almost always breaks the padding; if not, it yields garbage.
        assert!(result.map_or(true, |plain| plain != PLAINTEXT.as_bytes()));
    }
}

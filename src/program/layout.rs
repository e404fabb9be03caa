//! Bounds-checked little-endian byte reader and writer for account and
//! instruction layouts.

use crate::error::{DispatchError, Result};
use crate::pubkey::{Pubkey, PUBKEY_BYTES};

/// Maximum length of a single length-prefixed field (10KB).
pub const MAX_FIELD_SIZE: usize = 10 * 1024;

/// Maximum number of elements in a length-prefixed list.
pub const MAX_LIST_LEN: usize = 256;

/// Sequential reader over a byte slice.
#[derive(Debug)]
pub struct ByteReader<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> ByteReader<'a> {
    /// Creates a reader positioned at the start of `data`.
    pub fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    /// Number of bytes not yet consumed.
    pub fn remaining(&self) -> usize {
        self.data.len() - self.pos
    }

    /// Takes the next `len` bytes.
    pub fn take(&mut self, len: usize) -> Result<&'a [u8]> {
        let end = self
            .pos
            .checked_add(len)
            .filter(|end| *end <= self.data.len())
            .ok_or_else(|| {
                DispatchError::serialization(format!(
                    "Unexpected end of data: need {} bytes at offset {}, have {}",
                    len,
                    self.pos,
                    self.remaining()
                ))
            })?;
        let slice = &self.data[self.pos..end];
        self.pos = end;
        Ok(slice)
    }

    /// Reads one byte.
    pub fn read_u8(&mut self) -> Result<u8> {
        Ok(self.take(1)?[0])
    }

    /// Reads a strict boolean (0 or 1).
    pub fn read_bool(&mut self) -> Result<bool> {
        match self.read_u8()? {
            0 => Ok(false),
            1 => Ok(true),
            other => Err(DispatchError::serialization(format!(
                "Invalid bool byte: {}",
                other
            ))),
        }
    }

    /// Reads a little-endian u16.
    pub fn read_u16(&mut self) -> Result<u16> {
        let bytes = self.take(2)?;
        Ok(u16::from_le_bytes([bytes[0], bytes[1]]))
    }

    /// Reads a little-endian u32.
    pub fn read_u32(&mut self) -> Result<u32> {
        let bytes = self.take(4)?;
        Ok(u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
    }

    /// Reads a little-endian u64.
    pub fn read_u64(&mut self) -> Result<u64> {
        let mut buf = [0u8; 8];
        buf.copy_from_slice(self.take(8)?);
        Ok(u64::from_le_bytes(buf))
    }

    /// Reads a 32-byte key.
    pub fn read_pubkey(&mut self) -> Result<Pubkey> {
        Pubkey::try_from_slice(self.take(PUBKEY_BYTES)?)
    }

    /// Reads u32-length-prefixed bytes.
    pub fn read_bytes(&mut self) -> Result<Vec<u8>> {
        let len = self.read_u32()? as usize;
        if len > MAX_FIELD_SIZE {
            return Err(DispatchError::serialization(format!(
                "Field too large: {} bytes (max {})",
                len, MAX_FIELD_SIZE
            )));
        }
        Ok(self.take(len)?.to_vec())
    }

    /// Reads a u32-length-prefixed UTF-8 string.
    pub fn read_string(&mut self) -> Result<String> {
        String::from_utf8(self.read_bytes()?)
            .map_err(|e| DispatchError::serialization(format!("Invalid UTF-8: {}", e)))
    }

    /// Reads a one-byte option tag.
    pub fn read_option_tag(&mut self) -> Result<bool> {
        match self.read_u8()? {
            0 => Ok(false),
            1 => Ok(true),
            other => Err(DispatchError::serialization(format!(
                "Invalid option tag: {}",
                other
            ))),
        }
    }

    /// Reads an optional key.
    pub fn read_option_pubkey(&mut self) -> Result<Option<Pubkey>> {
        if self.read_option_tag()? {
            Ok(Some(self.read_pubkey()?))
        } else {
            Ok(None)
        }
    }

    /// Reads a u32-length-prefixed list of keys.
    pub fn read_pubkey_list(&mut self) -> Result<Vec<Pubkey>> {
        let len = self.read_list_len()?;
        (0..len).map(|_| self.read_pubkey()).collect()
    }

    /// Reads and validates a u32 list length.
    pub fn read_list_len(&mut self) -> Result<usize> {
        let len = self.read_u32()? as usize;
        if len > MAX_LIST_LEN {
            return Err(DispatchError::serialization(format!(
                "List too long: {} (max {})",
                len, MAX_LIST_LEN
            )));
        }
        Ok(len)
    }
}

/// Append-only little-endian writer.
#[derive(Debug, Default)]
pub struct ByteWriter {
    buf: Vec<u8>,
}

impl ByteWriter {
    /// Creates an empty writer.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the written bytes.
    pub fn into_bytes(self) -> Vec<u8> {
        self.buf
    }

    /// Appends raw bytes with no prefix.
    pub fn put_raw(&mut self, bytes: &[u8]) -> &mut Self {
        self.buf.extend_from_slice(bytes);
        self
    }

    /// Appends one byte.
    pub fn put_u8(&mut self, v: u8) -> &mut Self {
        self.buf.push(v);
        self
    }

    /// Appends a boolean byte.
    pub fn put_bool(&mut self, v: bool) -> &mut Self {
        self.put_u8(v as u8)
    }

    /// Appends a little-endian u16.
    pub fn put_u16(&mut self, v: u16) -> &mut Self {
        self.put_raw(&v.to_le_bytes())
    }

    /// Appends a little-endian u32.
    pub fn put_u32(&mut self, v: u32) -> &mut Self {
        self.put_raw(&v.to_le_bytes())
    }

    /// Appends a little-endian u64.
    pub fn put_u64(&mut self, v: u64) -> &mut Self {
        self.put_raw(&v.to_le_bytes())
    }

    /// Appends a 32-byte key.
    pub fn put_pubkey(&mut self, key: &Pubkey) -> &mut Self {
        self.put_raw(key.as_bytes())
    }

    /// Appends u32-length-prefixed bytes.
    pub fn put_bytes(&mut self, bytes: &[u8]) -> &mut Self {
        self.put_u32(bytes.len() as u32).put_raw(bytes)
    }

    /// Appends a u32-length-prefixed UTF-8 string.
    pub fn put_string(&mut self, s: &str) -> &mut Self {
        self.put_bytes(s.as_bytes())
    }

    /// Appends an optional key.
    pub fn put_option_pubkey(&mut self, key: Option<&Pubkey>) -> &mut Self {
        match key {
            Some(key) => self.put_u8(1).put_pubkey(key),
            None => self.put_u8(0),
        }
    }

    /// Appends a u32-length-prefixed list of keys.
    pub fn put_pubkey_list(&mut self, keys: &[Pubkey]) -> &mut Self {
        self.put_u32(keys.len() as u32);
        for key in keys {
            self.put_pubkey(key);
        }
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reader_reports_truncation() {
        let mut reader = ByteReader::new(&[1, 2, 3]);
        assert!(reader.read_u32().is_err());
    }

    #[test]
    fn test_writer_layout() {
        let mut writer = ByteWriter::new();
        writer.put_u32(1).put_string("hi").put_option_pubkey(None);
        assert_eq!(writer.into_bytes(), vec![1, 0, 0, 0, 2, 0, 0, 0, b'h', b'i', 0]);
    }

    #[test]
    fn test_oversized_field_rejected() {
        let mut writer = ByteWriter::new();
        writer.put_u32((MAX_FIELD_SIZE + 1) as u32);
        let bytes = writer.into_bytes();
        assert!(ByteReader::new(&bytes).read_bytes().is_err());
    }

    #[test]
    fn test_invalid_bool_rejected() {
        assert!(ByteReader::new(&[2]).read_bool().is_err());
    }
}

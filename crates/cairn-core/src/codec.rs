//! Canonical byte encoding for hash-relevant structures
//!
//! Every variable-length field is prefixed with its length as a little-endian
//! `u32`, so two different field sequences can never produce the same bytes.

use sha2::{Digest as _, Sha256};

use crate::error::{Error, Result};
use crate::types::Digest;

/// Hash data using SHA-256
pub fn sha256(data: &[u8]) -> Digest {
    Digest::new(Sha256::digest(data).into())
}

/// Append-only canonical writer
#[derive(Debug, Default, Clone)]
pub struct Encoder {
    buf: Vec<u8>,
}

impl Encoder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn put_u8(&mut self, v: u8) -> &mut Self {
        self.buf.push(v);
        self
    }

    pub fn put_u32(&mut self, v: u32) -> &mut Self {
        self.buf.extend_from_slice(&v.to_le_bytes());
        self
    }

    pub fn put_u64(&mut self, v: u64) -> &mut Self {
        self.buf.extend_from_slice(&v.to_le_bytes());
        self
    }

    /// Fixed-width bytes, written without a length prefix
    pub fn put_raw(&mut self, bytes: &[u8]) -> &mut Self {
        self.buf.extend_from_slice(bytes);
        self
    }

    /// Variable-length bytes with a u32 length prefix
    pub fn put_bytes(&mut self, bytes: &[u8]) -> &mut Self {
        self.put_u32(bytes.len() as u32);
        self.buf.extend_from_slice(bytes);
        self
    }

    /// Optional fixed-width field: a presence byte followed by the value
    pub fn put_option(&mut self, value: Option<&[u8]>) -> &mut Self {
        match value {
            Some(bytes) => self.put_u8(1).put_raw(bytes),
            None => self.put_u8(0),
        }
    }

    pub fn digest(&self) -> Digest {
        sha256(&self.buf)
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.buf
    }
}

/// Reader over bytes produced by [`Encoder`]
#[derive(Debug)]
pub struct Decoder<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> Decoder<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    fn take(&mut self, n: usize) -> Result<&'a [u8]> {
        let end = self
            .pos
            .checked_add(n)
            .filter(|end| *end <= self.data.len())
            .ok_or_else(|| {
                Error::Encoding(format!(
                    "Truncated input: need {} bytes at offset {}, have {}",
                    n,
                    self.pos,
                    self.data.len() - self.pos
                ))
            })?;
        let out = &self.data[self.pos..end];
        self.pos = end;
        Ok(out)
    }

    pub fn get_u8(&mut self) -> Result<u8> {
        Ok(self.take(1)?[0])
    }

    pub fn get_u32(&mut self) -> Result<u32> {
        let mut b = [0u8; 4];
        b.copy_from_slice(self.take(4)?);
        Ok(u32::from_le_bytes(b))
    }

    pub fn get_u64(&mut self) -> Result<u64> {
        let mut b = [0u8; 8];
        b.copy_from_slice(self.take(8)?);
        Ok(u64::from_le_bytes(b))
    }

    pub fn get_array32(&mut self) -> Result<[u8; 32]> {
        let mut b = [0u8; 32];
        b.copy_from_slice(self.take(32)?);
        Ok(b)
    }

    pub fn get_bytes(&mut self) -> Result<&'a [u8]> {
        let len = self.get_u32()? as usize;
        self.take(len)
    }

    pub fn get_option32(&mut self) -> Result<Option<[u8; 32]>> {
        match self.get_u8()? {
            0 => Ok(None),
            1 => Ok(Some(self.get_array32()?)),
            tag => Err(Error::Encoding(format!("Invalid option tag {}", tag))),
        }
    }

    /// Fail if any bytes remain unread
    pub fn finish(self) -> Result<()> {
        if self.pos != self.data.len() {
            return Err(Error::Encoding(format!(
                "{} trailing bytes",
                self.data.len() - self.pos
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_length_prefix_separates_fields() {
        let mut a = Encoder::new();
        a.put_bytes(b"ab").put_bytes(b"c");
        let mut b = Encoder::new();
        b.put_bytes(b"a").put_bytes(b"bc");
        assert_ne!(a.digest(), b.digest());
    }

    #[test]
    fn test_decoder_reads_back_fields() {
        let mut enc = Encoder::new();
        enc.put_u64(7).put_bytes(b"hello").put_option(None);
        let bytes = enc.into_bytes();

        let mut dec = Decoder::new(&bytes);
        assert_eq!(dec.get_u64().unwrap(), 7);
        assert_eq!(dec.get_bytes().unwrap(), b"hello");
        assert_eq!(dec.get_option32().unwrap(), None);
        dec.finish().unwrap();
    }

    #[test]
    fn test_decoder_rejects_truncated_length() {
        let mut enc = Encoder::new();
        enc.put_u32(1000);
        let bytes = enc.into_bytes();
        assert!(Decoder::new(&bytes).get_bytes().is_err());
    }

    #[test]
    fn test_decoder_rejects_trailing_bytes() {
        let dec = Decoder::new(&[0u8; 3]);
        assert!(dec.finish().is_err());
    }
}

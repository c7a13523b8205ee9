//! Posting lists stored as token tree values
//!
//! A posting list is a run of `len u16 | utf-8 bytes` items, each naming an
//! entry that contains the token.

use crate::codec::Scanner;
use crate::error::{DictError, Result};

/// Encode entry names as a posting list
pub fn encode_postings<T: AsRef<str>>(names: &[T]) -> Result<Vec<u8>> {
    let mut buf = Vec::with_capacity(names.iter().map(|n| 2 + n.as_ref().len()).sum());
    for name in names {
        let bytes = name.as_ref().as_bytes();
        let len = u16::try_from(bytes.len()).map_err(|_| {
            DictError::InvalidInput(format!(
                "posting of {} bytes exceeds {}",
                bytes.len(),
                u16::MAX
            ))
        })?;
        buf.extend_from_slice(&len.to_le_bytes());
        buf.extend_from_slice(bytes);
    }
    Ok(buf)
}

/// Decode a posting list
pub fn decode_postings(bytes: &[u8]) -> Result<Vec<String>> {
    let mut scanner = Scanner::new(bytes, 0);
    let mut names = Vec::new();
    while !scanner.is_end() {
        let len = scanner.read_u16()? as usize;
        let raw = scanner.read(len)?;
        let name = std::str::from_utf8(raw)
            .map_err(|e| scanner.corrupt(format!("posting is not utf-8: {}", e)))?;
        names.push(name.to_string());
    }
    Ok(names)
}

//! Persistence for keys written during a run, so later runs can read or delete them.
//!
//! An entry is the key, a newline, and the encoded [`StoredValue`]. The value
//! encoding starts with a one-byte tag; payloads additionally carry a big-endian
//! `u64` length prefix, so a payload can never be mistaken for one of the
//! marker states, whatever its length or contents.

use std::collections::BTreeSet;
use std::fmt;

use bytes::Bytes;

use crate::error::{Error, Result};
use crate::lifecycle::Lifecycle;

mod hierarchical;
mod memory;

pub use hierarchical::{HierarchicalKeyStore, entry_path};
pub use memory::MemoryKeyStore;

const TAG_NULL: u8 = b'N';
const TAG_NOT_STORED: u8 = b'X';
const TAG_BYTES: u8 = b'B';
const LENGTH_PREFIX: usize = size_of::<u64>();

/// The value persisted alongside a key.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum StoredValue {
    /// No value was available for the key.
    Null,
    /// The payload was deliberately not persisted.
    NotStored,
    /// The raw payload.
    Bytes(Bytes),
}

impl StoredValue {
    /// Encodes the value into its tagged, length-prefixed form.
    pub fn encode(&self) -> Vec<u8> {
        match self {
            StoredValue::Null => vec![TAG_NULL],
            StoredValue::NotStored => vec![TAG_NOT_STORED],
            StoredValue::Bytes(bytes) => {
                let mut buf = Vec::with_capacity(1 + LENGTH_PREFIX + bytes.len());
                buf.push(TAG_BYTES);
                buf.extend_from_slice(&(bytes.len() as u64).to_be_bytes());
                buf.extend_from_slice(bytes);
                buf
            }
        }
    }

    /// Decodes a value produced by [`encode`](Self::encode).
    ///
    /// On failure, returns a description of what is wrong with the input.
    pub fn decode(buf: &[u8]) -> Result<Self, String> {
        let Some((&tag, rest)) = buf.split_first() else {
            return Err("value encoding is empty".into());
        };

        match tag {
            TAG_NULL | TAG_NOT_STORED if !rest.is_empty() => Err(format!(
                "{} trailing bytes after value marker",
                rest.len()
            )),
            TAG_NULL => Ok(StoredValue::Null),
            TAG_NOT_STORED => Ok(StoredValue::NotStored),
            TAG_BYTES => {
                let Some((prefix, payload)) = rest.split_first_chunk::<LENGTH_PREFIX>() else {
                    return Err("truncated length prefix".into());
                };
                let len = u64::from_be_bytes(*prefix);
                if len != payload.len() as u64 {
                    return Err(format!(
                        "length prefix says {len} bytes, found {}",
                        payload.len()
                    ));
                }
                Ok(StoredValue::Bytes(Bytes::copy_from_slice(payload)))
            }
            other => Err(format!("unknown value tag {other:#04x}")),
        }
    }
}

impl From<Option<Bytes>> for StoredValue {
    fn from(value: Option<Bytes>) -> Self {
        value.map_or(StoredValue::Null, StoredValue::Bytes)
    }
}

/// Rejects keys that cannot be framed by the entry format.
pub(crate) fn validate_key(key: &str) -> Result<()> {
    if key.contains('\n') {
        return Err(Error::InvalidKey(key.to_owned()));
    }
    Ok(())
}

/// Encodes a full entry: `key`, a newline, then the encoded value.
pub fn encode_entry(key: &str, value: &StoredValue) -> Result<Vec<u8>> {
    validate_key(key)?;

    let value = value.encode();
    let mut buf = Vec::with_capacity(key.len() + 1 + value.len());
    buf.extend_from_slice(key.as_bytes());
    buf.push(b'\n');
    buf.extend_from_slice(&value);
    Ok(buf)
}

/// Splits an entry into its key and value.
pub fn decode_entry(buf: &[u8]) -> Result<(String, StoredValue), String> {
    let Some(separator) = buf.iter().position(|&b| b == b'\n') else {
        return Err("missing newline separator".into());
    };
    let key = std::str::from_utf8(&buf[..separator])
        .map_err(|err| format!("key is not valid UTF-8: {err}"))?;
    let value = StoredValue::decode(&buf[separator + 1..])?;
    Ok((key.to_owned(), value))
}

/// A store for keys (and optionally values) written during a run.
///
/// Shared by all worker threads; implementations must be internally synchronized.
pub trait KeyStore: Lifecycle + fmt::Debug {
    /// Persists `key` with `value`, replacing any previous entry.
    ///
    /// Fails with [`Error::InvalidKey`] without writing anything if the key
    /// contains a newline.
    fn store(&self, key: &str, value: &StoredValue) -> Result<()>;

    /// Returns the entry for `key`, or `None` if there is none.
    fn retrieve(&self, key: &str) -> Result<Option<StoredValue>>;

    /// Returns every stored key.
    fn keys(&self) -> Result<BTreeSet<String>>;

    /// Whether written payloads should be persisted, or only
    /// [`StoredValue::NotStored`] markers.
    fn store_values(&self) -> bool;
}

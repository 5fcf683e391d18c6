//! Count map wire codec
//!
//! # Format (version 1)
//!
//! All integers are little-endian, matching the frame length prefix used by
//! the TCP transport.
//!
//! ```text
//! [1 byte: version][4 bytes: entry count]
//! entry count x [4 bytes: key length][key bytes (UTF-8)][8 bytes: count]
//! ```
//!
//! Entries are written in ascending key order, so two equal maps always
//! encode to the same bytes. The receiver only needs the total payload length
//! (reported by a transport probe) to decode.

use super::CountMap;
use thiserror::Error;

/// Current encoding version
///
/// Bump when the layout changes; decoders reject versions they don't know.
pub const CODEC_VERSION: u8 = 1;

/// Encoded size of a scalar count
pub const SCALAR_LEN: usize = 8;

const HEADER_LEN: usize = 1 + 4;

/// Count map (de)serialization failure
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CodecError {
    #[error("empty payload")]
    Empty,

    #[error("unsupported codec version {0} (expected {CODEC_VERSION})")]
    UnsupportedVersion(u8),

    #[error("payload truncated: need {needed} bytes at offset {offset}, have {available}")]
    Truncated {
        offset: usize,
        needed: usize,
        available: usize,
    },

    #[error("key at offset {0} is not valid UTF-8")]
    InvalidKey(usize),

    #[error("duplicate key in payload: {0}")]
    DuplicateKey(String),

    #[error("{0} trailing bytes after last entry")]
    TrailingBytes(usize),

    #[error("{what} too large to encode: {len}")]
    TooLarge { what: &'static str, len: usize },

    #[error("scalar payload must be {SCALAR_LEN} bytes, got {0}")]
    ScalarLength(usize),
}

/// Encode `map` into a self-describing payload
pub fn encode(map: &CountMap) -> Result<Vec<u8>, CodecError> {
    let entry_count = u32::try_from(map.len()).map_err(|_| CodecError::TooLarge {
        what: "entry count",
        len: map.len(),
    })?;

    let mut entries: Vec<(&String, &u64)> = map.iter().collect();
    entries.sort_unstable_by(|a, b| a.0.cmp(b.0));

    let body_len: usize = entries.iter().map(|(key, _)| 4 + key.len() + 8).sum();
    let mut buf = Vec::with_capacity(HEADER_LEN + body_len);
    buf.push(CODEC_VERSION);
    buf.extend_from_slice(&entry_count.to_le_bytes());

    for (key, count) in entries {
        let key_len = u32::try_from(key.len()).map_err(|_| CodecError::TooLarge {
            what: "key",
            len: key.len(),
        })?;
        buf.extend_from_slice(&key_len.to_le_bytes());
        buf.extend_from_slice(key.as_bytes());
        buf.extend_from_slice(&count.to_le_bytes());
    }

    Ok(buf)
}

/// Decode a payload produced by [`encode`]
pub fn decode(buf: &[u8]) -> Result<CountMap, CodecError> {
    let mut reader = Reader { buf, pos: 0 };

    let version = match buf.first() {
        Some(&v) => v,
        None => return Err(CodecError::Empty),
    };
    if version != CODEC_VERSION {
        return Err(CodecError::UnsupportedVersion(version));
    }
    reader.pos = 1;

    let entry_count = u32::from_le_bytes(reader.take_array()?) as usize;
    let mut map = CountMap::new();

    for _ in 0..entry_count {
        let key_len = u32::from_le_bytes(reader.take_array()?) as usize;
        let key_offset = reader.pos;
        let key_bytes = reader.take(key_len)?;
        let key = std::str::from_utf8(key_bytes).map_err(|_| CodecError::InvalidKey(key_offset))?;
        let count = u64::from_le_bytes(reader.take_array()?);

        if map.contains(key) {
            return Err(CodecError::DuplicateKey(key.to_owned()));
        }
        map.add(key, count);
    }

    let remaining = buf.len() - reader.pos;
    if remaining != 0 {
        return Err(CodecError::TrailingBytes(remaining));
    }

    Ok(map)
}

/// Encode a scalar count (fixed width)
pub fn encode_scalar(value: u64) -> [u8; SCALAR_LEN] {
    value.to_le_bytes()
}

/// Decode a scalar count
pub fn decode_scalar(buf: &[u8]) -> Result<u64, CodecError> {
    let bytes: [u8; SCALAR_LEN] = buf
        .try_into()
        .map_err(|_| CodecError::ScalarLength(buf.len()))?;
    Ok(u64::from_le_bytes(bytes))
}

struct Reader<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    fn take(&mut self, len: usize) -> Result<&'a [u8], CodecError> {
        let available = self.buf.len() - self.pos;
        if len > available {
            return Err(CodecError::Truncated {
                offset: self.pos,
                needed: len,
                available,
            });
        }

        let slice = &self.buf[self.pos..self.pos + len];
        self.pos += len;
        Ok(slice)
    }

    fn take_array<const N: usize>(&mut self) -> Result<[u8; N], CodecError> {
        let slice = self.take(N)?;
        let mut out = [0u8; N];
        out.copy_from_slice(slice);
        Ok(out)
    }
}

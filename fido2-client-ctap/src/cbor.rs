//! CBOR encoding and decoding for CTAP messages using cbor4ii
//!
//! CTAP requests and responses are CBOR maps with small integer keys, encoded
//! in canonical form. The maximum CTAP message is 7609 bytes, so encoding
//! runs through a stack buffer and anything larger is rejected outright.
//!
//! # Usage
//!
//! ```rust,ignore
//! // Build a canonical integer-keyed request map
//! let request = MapBuilder::new()
//!     .insert(0x01, rp_id)?
//!     .insert_bytes(0x02, &client_data_hash)?
//!     .build()?;
//!
//! // Pick apart a response map
//! let map = MapParser::from_bytes(&payload)?;
//! let count: u64 = map.get(0x01)?;
//! ```

use std::collections::BTreeMap;
use std::fmt;
use std::io::{self, Write};

use serde::{Deserialize, Serialize};

/// CBOR Value from cbor4ii, used for dynamic map inspection
pub type Value = cbor4ii::core::Value;

/// Maximum CTAP message size in bytes, after CTAPHID reassembly
pub const MAX_CTAP_MESSAGE_SIZE: usize = 7609;

/// Codec errors
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CborError {
    /// Serialization failed or the value does not fit in a CTAP message
    Encode,

    /// The bytes are not well-formed CBOR or not the expected shape
    Decode,

    /// The top-level value is not an integer-keyed map
    NotAMap,

    /// The same integer key appears twice in one map
    DuplicateKey(i32),

    /// A required map key is absent
    MissingKey(i32),

    /// A byte string claims a length beyond the CTAP message bound
    ByteStringTooLong(usize),

    /// More map entries than a CTAP message can legitimately carry
    MapTooLarge,
}

impl fmt::Display for CborError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CborError::Encode => write!(f, "CBOR encoding failed"),
            CborError::Decode => write!(f, "Invalid CBOR"),
            CborError::NotAMap => write!(f, "Expected an integer-keyed CBOR map"),
            CborError::DuplicateKey(k) => write!(f, "Duplicate map key {}", k),
            CborError::MissingKey(k) => write!(f, "Missing map key {}", k),
            CborError::ByteStringTooLong(len) => {
                write!(f, "Byte string of {} bytes exceeds message bound", len)
            }
            CborError::MapTooLarge => write!(f, "CBOR map has too many entries"),
        }
    }
}

impl std::error::Error for CborError {}

/// Codec result type
pub type Result<T> = std::result::Result<T, CborError>;

/// Fixed-size encode buffer sized to the CTAP message bound
///
/// Implements `Write` so cbor4ii can serialize into it directly; a value
/// that would not fit in one CTAP message fails the write.
pub struct StackBuffer {
    buf: [u8; MAX_CTAP_MESSAGE_SIZE],
    pos: usize,
}

impl StackBuffer {
    pub const fn new() -> Self {
        Self {
            buf: [0u8; MAX_CTAP_MESSAGE_SIZE],
            pos: 0,
        }
    }

    /// Filled portion of the buffer
    pub fn as_slice(&self) -> &[u8] {
        &self.buf[..self.pos]
    }

    pub fn to_vec(&self) -> Vec<u8> {
        self.buf[..self.pos].to_vec()
    }

    pub fn len(&self) -> usize {
        self.pos
    }

    pub fn is_empty(&self) -> bool {
        self.pos == 0
    }

    pub fn clear(&mut self) {
        self.pos = 0;
    }
}

impl Write for StackBuffer {
    fn write(&mut self, data: &[u8]) -> io::Result<usize> {
        let available = self.buf.len() - self.pos;
        if data.len() > available {
            return Err(io::Error::new(
                io::ErrorKind::WriteZero,
                "CBOR message exceeds 7609 bytes",
            ));
        }

        self.buf[self.pos..self.pos + data.len()].copy_from_slice(data);
        self.pos += data.len();
        Ok(data.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl fmt::Debug for StackBuffer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "StackBuffer {{ len: {}, cap: {} }}",
            self.pos,
            self.buf.len()
        )
    }
}

impl Default for StackBuffer {
    fn default() -> Self {
        Self::new()
    }
}

/// Encode a value to CBOR bytes
pub fn encode<T: Serialize>(value: &T) -> Result<Vec<u8>> {
    let mut buffer = StackBuffer::new();
    cbor4ii::serde::to_writer(&mut buffer, value).map_err(|_| CborError::Encode)?;
    Ok(buffer.to_vec())
}

/// Decode CBOR bytes to a value
pub fn decode<T: for<'de> Deserialize<'de>>(data: &[u8]) -> Result<T> {
    cbor4ii::serde::from_slice(data).map_err(|_| CborError::Decode)
}

/// Convert a serializable value into a dynamic `Value`
pub fn to_value<T: Serialize>(value: &T) -> Result<Value> {
    let bytes = encode(value)?;
    cbor4ii::serde::from_slice(&bytes).map_err(|_| CborError::Decode)
}

/// Decode a dynamic `Value` into a typed value
pub fn from_value<T: for<'de> Deserialize<'de>>(value: &Value) -> Result<T> {
    let bytes = encode(value)?;
    decode(&bytes)
}

/// Write the canonical encoding of an integer map key
///
/// Positive keys sort before negative keys; within a sign, keys sort by the
/// bytes of their encoding, which for positives is numeric order and for
/// negatives is ascending absolute value.
fn write_int_key(buffer: &mut StackBuffer, k: i32) -> Result<()> {
    let result = if k >= 0 {
        if k <= 23 {
            buffer.write_all(&[k as u8])
        } else if k <= 255 {
            buffer.write_all(&[0x18, k as u8])
        } else if k <= 65535 {
            buffer.write_all(&[0x19, (k >> 8) as u8, k as u8])
        } else {
            buffer
                .write_all(&[0x1a])
                .and_then(|_| buffer.write_all(&k.to_be_bytes()))
        }
    } else {
        let abs = (-(k as i64) - 1) as u32;
        if abs <= 23 {
            buffer.write_all(&[0x20 | abs as u8])
        } else if abs <= 255 {
            buffer.write_all(&[0x38, abs as u8])
        } else if abs <= 65535 {
            buffer.write_all(&[0x39, (abs >> 8) as u8, abs as u8])
        } else {
            buffer
                .write_all(&[0x3a])
                .and_then(|_| buffer.write_all(&abs.to_be_bytes()))
        }
    };
    result.map_err(|_| CborError::Encode)
}

/// Wrapper for i32 that sorts in canonical CBOR key order
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct CanonicalKey(i32);

impl PartialOrd for CanonicalKey {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for CanonicalKey {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        use std::cmp::Ordering;

        let (a, b) = (self.0, other.0);
        match (a >= 0, b >= 0) {
            (true, true) => a.cmp(&b),
            // -1 encodes as 0x20, -2 as 0x21: smaller magnitude sorts first
            (false, false) => b.cmp(&a),
            (true, false) => Ordering::Less,
            (false, true) => Ordering::Greater,
        }
    }
}

/// Build a canonical CBOR map with integer keys
///
/// Values are encoded eagerly; `build` emits the map header and the keys in
/// canonical order with the pre-encoded values in place.
pub struct MapBuilder {
    entries: Vec<(i32, Vec<u8>)>,
}

impl MapBuilder {
    pub fn new() -> Self {
        Self {
            entries: Vec::new(),
        }
    }

    /// Insert an integer key and value
    pub fn insert<T: Serialize>(mut self, key: i32, value: T) -> Result<Self> {
        let encoded = encode(&value)?;
        self.entries.push((key, encoded));
        Ok(self)
    }

    /// Insert only if the value is present
    pub fn insert_opt<T: Serialize>(self, key: i32, value: Option<T>) -> Result<Self> {
        if let Some(v) = value {
            self.insert(key, v)
        } else {
            Ok(self)
        }
    }

    /// Insert a CBOR byte string
    pub fn insert_bytes(mut self, key: i32, bytes: &[u8]) -> Result<Self> {
        let encoded = encode(&serde_bytes::Bytes::new(bytes))?;
        self.entries.push((key, encoded));
        Ok(self)
    }

    /// Insert pre-encoded CBOR verbatim
    ///
    /// Used to nest maps that are themselves canonically encoded, such as a
    /// COSE key inside an extension input.
    pub fn insert_raw(mut self, key: i32, cbor: Vec<u8>) -> Self {
        self.entries.push((key, cbor));
        self
    }

    /// Encode the map in canonical key order
    pub fn build(self) -> Result<Vec<u8>> {
        let mut map = BTreeMap::new();
        for (key, value_bytes) in self.entries {
            if map.insert(CanonicalKey(key), value_bytes).is_some() {
                return Err(CborError::DuplicateKey(key));
            }
        }

        let mut buffer = StackBuffer::new();

        let len = map.len();
        if len <= 23 {
            buffer
                .write_all(&[0xa0 | len as u8])
                .map_err(|_| CborError::Encode)?;
        } else if len <= 255 {
            buffer
                .write_all(&[0xb8, len as u8])
                .map_err(|_| CborError::Encode)?;
        } else {
            return Err(CborError::MapTooLarge);
        }

        for (key, value) in map {
            write_int_key(&mut buffer, key.0)?;
            buffer.write_all(&value).map_err(|_| CborError::Encode)?;
        }

        Ok(buffer.to_vec())
    }
}

impl Default for MapBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Parse a CBOR map with integer keys
///
/// Rejects non-map top-level values, non-integer keys and duplicate keys.
pub struct MapParser {
    map: BTreeMap<i32, Vec<u8>>,
}

impl MapParser {
    /// Parse from CBOR bytes
    pub fn from_bytes(data: &[u8]) -> Result<Self> {
        let value: Value = decode(data)?;
        Self::from_value(value)
    }

    /// Parse from a dynamic `Value`
    pub fn from_value(value: Value) -> Result<Self> {
        let Value::Map(entries) = value else {
            return Err(CborError::NotAMap);
        };

        let mut map = BTreeMap::new();
        for (k, v) in entries {
            let Value::Integer(i) = k else {
                return Err(CborError::NotAMap);
            };
            let key = i32::try_from(i).map_err(|_| CborError::Decode)?;
            let encoded = encode(&v)?;
            if map.insert(key, encoded).is_some() {
                return Err(CborError::DuplicateKey(key));
            }
        }

        Ok(Self { map })
    }

    /// Get a required value by key
    pub fn get<T: for<'de> Deserialize<'de>>(&self, key: i32) -> Result<T> {
        let value_bytes = self.map.get(&key).ok_or(CborError::MissingKey(key))?;
        decode(value_bytes)
    }

    /// Get an optional value by key
    pub fn get_opt<T: for<'de> Deserialize<'de>>(&self, key: i32) -> Result<Option<T>> {
        match self.map.get(&key) {
            Some(value_bytes) => Ok(Some(decode(value_bytes)?)),
            None => Ok(None),
        }
    }

    pub fn contains_key(&self, key: i32) -> bool {
        self.map.contains_key(&key)
    }

    /// Get the dynamic `Value` for a key
    pub fn get_raw(&self, key: i32) -> Option<Value> {
        self.map
            .get(&key)
            .and_then(|bytes| cbor4ii::serde::from_slice(bytes).ok())
    }

    /// Get a required byte string
    ///
    /// A declared length past the CTAP message bound fails even when the
    /// surrounding message happened to decode.
    pub fn get_bytes(&self, key: i32) -> Result<Vec<u8>> {
        let value_bytes = self.map.get(&key).ok_or(CborError::MissingKey(key))?;
        let byte_buf: serde_bytes::ByteBuf = decode(value_bytes)?;
        if byte_buf.len() > MAX_CTAP_MESSAGE_SIZE {
            return Err(CborError::ByteStringTooLong(byte_buf.len()));
        }
        Ok(byte_buf.into_vec())
    }

    /// Get an optional byte string
    pub fn get_bytes_opt(&self, key: i32) -> Result<Option<Vec<u8>>> {
        if self.map.contains_key(&key) {
            Ok(Some(self.get_bytes(key)?))
        } else {
            Ok(None)
        }
    }
}

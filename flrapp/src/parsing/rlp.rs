//! RLP (Recursive Length Prefix) decoder.
//!
//! Items are never copied out of the transaction buffer. Decoding
//! yields [`RlpItem`] values holding a kind plus an offset/length pair
//! into the buffer; callers resolve them against the same bytes with
//! [`RlpItem::bytes`].
//!
//! # Encoding
//!
//! RLP encoding rules:
//! - Single byte [0x00, 0x7f]: itself
//! - String [0x80, 0xb7]: 0x80 + len, then data
//! - String [0xb8, 0xbf]: 0xb7 + len_of_len, then len, then data
//! - List [0xc0, 0xf7]: 0xc0 + len, then items
//! - List [0xf8, 0xff]: 0xf7 + len_of_len, then len, then items
//!
//! # Security
//!
//! - Validates all length fields before access
//! - Length arithmetic is checked; no declared length may pass the end
//!   of the enclosing region
//! - No allocations

/// Maximum bytes in a long-form length field.
const MAX_LEN_OF_LEN: usize = 8;

/// Envelope byte of an EIP-2930 transaction.
pub const EIP2930_MARKER: u8 = 0x01;

/// Envelope byte of an EIP-1559 transaction.
pub const EIP1559_MARKER: u8 = 0x02;

/// RLP decoding errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RlpError {
    /// Input is empty when data expected.
    EmptyInput,
    /// Input too short for declared length.
    UnexpectedEof,
    /// Length field is too large.
    LengthOverflow,
    /// Expected list but got string.
    ExpectedList,
    /// Extra data after RLP item.
    TrailingData,
}

/// Shape of a decoded item.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RlpKind {
    /// A byte below 0x80 encoded as itself.
    Byte,
    /// A byte string (may be empty).
    String,
    /// A list; its payload is the concatenated encoding of its items.
    List,
}

/// A decoded RLP item: kind plus the payload range in the source buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RlpItem {
    /// Item kind.
    pub kind: RlpKind,
    /// Offset of the first payload byte.
    pub offset: usize,
    /// Payload length in bytes.
    pub len: usize,
}

impl RlpItem {
    /// Returns true if this is a list item.
    #[inline]
    pub fn is_list(&self) -> bool {
        self.kind == RlpKind::List
    }

    /// Returns true if the payload is empty.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Resolves the payload against the buffer it was decoded from.
    ///
    /// Returns an empty slice if `buf` no longer covers the range.
    pub fn bytes<'a>(&self, buf: &'a [u8]) -> &'a [u8] {
        self.offset
            .checked_add(self.len)
            .and_then(|end| buf.get(self.offset..end))
            .unwrap_or(&[])
    }

    /// Interprets a string payload as a big-endian u64.
    ///
    /// Empty strings are zero. Lists and payloads over 8 bytes are `None`.
    pub fn as_u64(&self, buf: &[u8]) -> Option<u64> {
        if self.is_list() || self.len > 8 {
            return None;
        }
        let mut value = 0u64;
        for &byte in self.bytes(buf) {
            value = value << 8 | byte as u64;
        }
        Some(value)
    }
}

/// Decoded item prefix.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Header {
    /// Item kind.
    pub kind: RlpKind,
    /// Bytes taken by the prefix and any length field.
    pub header_len: usize,
    /// Bytes of payload following the header.
    pub payload_len: usize,
}

impl Header {
    /// Header plus payload.
    pub fn total_len(&self) -> Result<usize, RlpError> {
        self.header_len
            .checked_add(self.payload_len)
            .ok_or(RlpError::LengthOverflow)
    }
}

/// Decodes the prefix of the item at the start of `input`.
///
/// Only the prefix and length bytes need to be present; the payload is
/// not checked.
pub fn decode_header(input: &[u8]) -> Result<Header, RlpError> {
    let (&first, rest) = input.split_first().ok_or(RlpError::EmptyInput)?;

    let header = match first {
        // Single byte
        0x00..=0x7f => Header {
            kind: RlpKind::Byte,
            header_len: 0,
            payload_len: 1,
        },

        // Short string (0-55 bytes)
        0x80..=0xb7 => Header {
            kind: RlpKind::String,
            header_len: 1,
            payload_len: (first - 0x80) as usize,
        },

        // Long string (56+ bytes)
        0xb8..=0xbf => {
            let len_of_len = (first - 0xb7) as usize;
            Header {
                kind: RlpKind::String,
                header_len: 1 + len_of_len,
                payload_len: read_length(rest, len_of_len)?,
            }
        }

        // Short list (0-55 bytes total)
        0xc0..=0xf7 => Header {
            kind: RlpKind::List,
            header_len: 1,
            payload_len: (first - 0xc0) as usize,
        },

        // Long list (56+ bytes total)
        0xf8..=0xff => {
            let len_of_len = (first - 0xf7) as usize;
            Header {
                kind: RlpKind::List,
                header_len: 1 + len_of_len,
                payload_len: read_length(rest, len_of_len)?,
            }
        }
    };

    Ok(header)
}

/// Reads a `len_of_len`-byte big-endian length.
fn read_length(input: &[u8], len_of_len: usize) -> Result<usize, RlpError> {
    let bytes = input.get(..len_of_len).ok_or(RlpError::UnexpectedEof)?;
    decode_length(bytes)
}

/// Decodes a big-endian length value.
fn decode_length(bytes: &[u8]) -> Result<usize, RlpError> {
    if bytes.len() > MAX_LEN_OF_LEN {
        return Err(RlpError::LengthOverflow);
    }

    let mut len = 0usize;
    for &byte in bytes {
        len = len.checked_mul(256).ok_or(RlpError::LengthOverflow)?;
        len = len.checked_add(byte as usize).ok_or(RlpError::LengthOverflow)?;
    }

    Ok(len)
}

/// Declared size of a whole transaction from its first bytes.
///
/// Accounts for the typed-envelope byte. Saturates instead of
/// overflowing so the caller can compare against what it has received.
pub fn declared_tx_len(input: &[u8]) -> Result<usize, RlpError> {
    let (envelope, body) = match input.first() {
        Some(&EIP2930_MARKER) | Some(&EIP1559_MARKER) => (1usize, &input[1..]),
        Some(_) => (0, input),
        None => return Err(RlpError::EmptyInput),
    };

    let header = decode_header(body)?;
    Ok(envelope
        .saturating_add(header.header_len)
        .saturating_add(header.payload_len))
}

/// Sequential reader over a region of a buffer.
pub struct RlpReader<'a> {
    buf: &'a [u8],
    pos: usize,
    end: usize,
}

impl<'a> RlpReader<'a> {
    /// Reader over the whole buffer.
    pub fn new(buf: &'a [u8]) -> Self {
        Self {
            buf,
            pos: 0,
            end: buf.len(),
        }
    }

    /// Reader over the items of a list previously decoded from `buf`.
    pub fn list(buf: &'a [u8], item: &RlpItem) -> Result<Self, RlpError> {
        if !item.is_list() {
            return Err(RlpError::ExpectedList);
        }
        let end = item
            .offset
            .checked_add(item.len)
            .filter(|&end| end <= buf.len())
            .ok_or(RlpError::UnexpectedEof)?;
        Ok(Self {
            buf,
            pos: item.offset,
            end,
        })
    }

    /// Current absolute offset.
    #[inline]
    pub fn position(&self) -> usize {
        self.pos
    }

    /// Returns true if the region is exhausted.
    #[inline]
    pub fn is_at_end(&self) -> bool {
        self.pos >= self.end
    }

    /// Skips `n` raw bytes (an envelope marker, for instance).
    pub fn skip(&mut self, n: usize) -> Result<(), RlpError> {
        let next = self
            .pos
            .checked_add(n)
            .filter(|&next| next <= self.end)
            .ok_or(RlpError::UnexpectedEof)?;
        self.pos = next;
        Ok(())
    }

    /// Decodes the next item and advances past it.
    pub fn read(&mut self) -> Result<RlpItem, RlpError> {
        let region = &self.buf[self.pos..self.end];
        let header = decode_header(region)?;
        let total = header.total_len()?;
        if total > region.len() {
            return Err(RlpError::UnexpectedEof);
        }

        let item = RlpItem {
            kind: header.kind,
            offset: self.pos + header.header_len,
            len: header.payload_len,
        };
        self.pos += total;
        Ok(item)
    }

    /// Decodes the next item, which must be the last one in the region.
    pub fn read_last(&mut self) -> Result<RlpItem, RlpError> {
        let item = self.read()?;
        if !self.is_at_end() {
            return Err(RlpError::TrailingData);
        }
        Ok(item)
    }
}

// =============================================================================
// Encoding (host-side construction of transactions)
// =============================================================================

/// Encodes a u64 as RLP bytes.
pub fn encode_u64(value: u64) -> Vec<u8> {
    if value == 0 {
        return vec![0x80]; // Empty string for zero
    }

    let bytes = value.to_be_bytes();
    let start = bytes.iter().position(|&b| b != 0).unwrap_or(8);
    encode_bytes(&bytes[start..])
}

/// Encodes a byte slice as RLP.
pub fn encode_bytes(data: &[u8]) -> Vec<u8> {
    if data.len() == 1 && data[0] < 0x80 {
        return data.to_vec();
    }
    with_prefix(0x80, data)
}

/// Encodes a list of already-encoded items as RLP.
pub fn encode_list(items: &[u8]) -> Vec<u8> {
    with_prefix(0xc0, items)
}

fn with_prefix(short_base: u8, payload: &[u8]) -> Vec<u8> {
    let mut result = if payload.len() <= 55 {
        vec![short_base + payload.len() as u8]
    } else {
        let len_bytes = encode_length_bytes(payload.len());
        let mut head = vec![short_base + 55 + len_bytes.len() as u8];
        head.extend_from_slice(&len_bytes);
        head
    };
    result.extend_from_slice(payload);
    result
}

/// Encodes a length as big-endian bytes.
fn encode_length_bytes(len: usize) -> Vec<u8> {
    let bytes = len.to_be_bytes();
    let start = bytes.iter().position(|&b| b != 0).unwrap_or(bytes.len());
    bytes[start..].to_vec()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_single_byte() {
        let buf = [0x42];
        let item = RlpReader::new(&buf).read_last().unwrap();
        assert_eq!(item.kind, RlpKind::Byte);
        assert_eq!(item.bytes(&buf), &[0x42]);
    }

    #[test]
    fn test_decode_empty_string() {
        let buf = [0x80];
        let item = RlpReader::new(&buf).read_last().unwrap();
        assert_eq!(item.kind, RlpKind::String);
        assert!(item.is_empty());
        assert_eq!(item.as_u64(&buf), Some(0));
    }

    #[test]
    fn test_decode_short_string() {
        let buf = [0x83, b'c', b'a', b't'];
        let item = RlpReader::new(&buf).read_last().unwrap();
        assert_eq!(item.offset, 1);
        assert_eq!(item.bytes(&buf), b"cat");
    }

    #[test]
    fn test_decode_long_string() {
        let payload = [0xabu8; 60];
        let buf = encode_bytes(&payload);
        assert_eq!(&buf[..2], &[0xb8, 60]);

        let item = RlpReader::new(&buf).read_last().unwrap();
        assert_eq!(item.offset, 2);
        assert_eq!(item.bytes(&buf), &payload[..]);
    }

    #[test]
    fn test_nested_ranges_match_source() {
        // [ "dog", [ 0x05, "" ] ]
        let mut inner = encode_u64(5);
        inner.extend(encode_bytes(b""));
        let mut outer = encode_bytes(b"dog");
        outer.extend(encode_list(&inner));
        let buf = encode_list(&outer);

        let top = RlpReader::new(&buf).read_last().unwrap();
        let mut fields = RlpReader::list(&buf, &top).unwrap();
        let dog = fields.read().unwrap();
        let nested = fields.read().unwrap();
        assert!(fields.is_at_end());

        assert_eq!(dog.bytes(&buf), b"dog");
        assert_eq!(&buf[dog.offset..dog.offset + 3], b"dog");

        let mut inner_reader = RlpReader::list(&buf, &nested).unwrap();
        assert_eq!(inner_reader.read().unwrap().as_u64(&buf), Some(5));
        assert!(inner_reader.read().unwrap().is_empty());
        assert!(inner_reader.is_at_end());
    }

    #[test]
    fn test_declared_length_past_end() {
        let buf = [0x85, 1, 2];
        assert_eq!(RlpReader::new(&buf).read(), Err(RlpError::UnexpectedEof));

        // Long-form length field itself truncated
        assert_eq!(decode_header(&[0xb9, 0x01]), Err(RlpError::UnexpectedEof));
    }

    #[test]
    fn test_length_overflow() {
        let buf = [0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff];
        let header = decode_header(&buf).unwrap();
        assert_eq!(header.header_len, 9);
        assert!(RlpReader::new(&buf).read().is_err());
    }

    #[test]
    fn test_trailing_data() {
        let buf = [0x80, 0x80];
        assert_eq!(RlpReader::new(&buf).read_last(), Err(RlpError::TrailingData));
    }

    #[test]
    fn test_list_reader_rejects_strings() {
        let buf = [0x83, b'c', b'a', b't'];
        let item = RlpReader::new(&buf).read().unwrap();
        assert!(matches!(
            RlpReader::list(&buf, &item),
            Err(RlpError::ExpectedList)
        ));
    }

    #[test]
    fn test_declared_tx_len() {
        // legacy short list
        assert_eq!(declared_tx_len(&[0xc3, 1, 2, 3]), Ok(4));
        // typed long list, only the head present
        assert_eq!(declared_tx_len(&[0x02, 0xf9, 0x01, 0x00]), Ok(1 + 3 + 256));
        assert_eq!(declared_tx_len(&[]), Err(RlpError::EmptyInput));
        assert_eq!(declared_tx_len(&[0x01]), Err(RlpError::EmptyInput));
    }

    #[test]
    fn test_encode_u64() {
        assert_eq!(encode_u64(0), vec![0x80]);
        assert_eq!(encode_u64(127), vec![0x7f]);
        assert_eq!(encode_u64(128), vec![0x81, 0x80]);
        assert_eq!(encode_u64(256), vec![0x82, 0x01, 0x00]);
    }

    #[test]
    fn test_encode_bytes() {
        assert_eq!(encode_bytes(b""), vec![0x80]);
        assert_eq!(encode_bytes(&[0x42]), vec![0x42]);
        assert_eq!(encode_bytes(&[0x80]), vec![0x81, 0x80]);
        assert_eq!(encode_bytes(b"cat"), vec![0x83, b'c', b'a', b't']);
    }
}

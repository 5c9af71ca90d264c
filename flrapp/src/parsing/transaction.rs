//! EVM transaction decoder.
//!
//! Supports three envelopes:
//! - Legacy: `rlp([nonce, gasPrice, gasLimit, to, value, data])`, optionally
//!   followed by the EIP-155 triplet `chainId, 0, 0`
//! - EIP-2930: `0x01 || rlp([chainId, ...])`
//! - EIP-1559: `0x02 || rlp([chainId, ...])`
//!
//! Typed envelopes are decoded only as far as the chain id; their review
//! is a blind-signing warning plus the transaction hash.

use core::fmt;

use flrapp_common::{AppError, Network};

use super::rlp::{RlpError, RlpItem, RlpReader, EIP1559_MARKER, EIP2930_MARKER};

/// First byte of every legacy transaction (an RLP list prefix).
const LEGACY_MIN_MARKER: u8 = 0xc0;

/// Transaction parsing errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParserError {
    /// Buffer is empty.
    NoData,
    /// A declared length runs past the available bytes.
    UnexpectedBufferEnd,
    /// Field has the wrong kind.
    UnexpectedValue,
    /// Bytes left after the transaction list.
    TrailingData,
    /// Unknown envelope byte.
    UnsupportedTx,
    /// Chain id outside the Flare networks.
    InvalidChainId,
    /// `r`/`s` placeholders are not empty.
    InvalidRsValues,
    /// Numeric field too wide.
    ValueOutOfRange,
}

impl From<RlpError> for ParserError {
    fn from(e: RlpError) -> Self {
        match e {
            RlpError::EmptyInput | RlpError::UnexpectedEof => ParserError::UnexpectedBufferEnd,
            RlpError::LengthOverflow => ParserError::ValueOutOfRange,
            RlpError::ExpectedList => ParserError::UnexpectedValue,
            RlpError::TrailingData => ParserError::TrailingData,
        }
    }
}

impl From<ParserError> for AppError {
    fn from(e: ParserError) -> Self {
        match e {
            ParserError::NoData => AppError::NoData,
            ParserError::UnexpectedBufferEnd => AppError::UnexpectedBufferEnd,
            ParserError::UnexpectedValue => AppError::UnexpectedValue,
            ParserError::TrailingData => AppError::TrailingData,
            ParserError::UnsupportedTx => AppError::UnsupportedTx,
            ParserError::InvalidChainId => AppError::InvalidChainId,
            ParserError::InvalidRsValues => AppError::InvalidRsValues,
            ParserError::ValueOutOfRange => AppError::ValueOutOfRange,
        }
    }
}

impl fmt::Display for ParserError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Shares the wording of the status word it maps to.
        fmt::Display::fmt(&AppError::from(*self), f)
    }
}

/// Envelope kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TxType {
    /// Pre-EIP-2718 transaction.
    Legacy,
    /// EIP-2930 access list transaction.
    Eip2930,
    /// EIP-1559 fee market transaction.
    Eip1559,
}

/// Fields of a legacy transaction, as ranges into the buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LegacyTx {
    pub nonce: RlpItem,
    pub gas_price: RlpItem,
    pub gas_limit: RlpItem,
    pub to: RlpItem,
    pub value: RlpItem,
    pub data: RlpItem,
    /// Absent for pre-EIP-155 transactions.
    pub chain: Option<Network>,
}

/// A decoded transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EthTransaction {
    Legacy(LegacyTx),
    Eip2930 { chain: Network },
    Eip1559 { chain: Network },
}

impl EthTransaction {
    /// Decodes and validates the transaction held in `buf`.
    pub fn parse(buf: &[u8]) -> Result<Self, ParserError> {
        let marker = *buf.first().ok_or(ParserError::NoData)?;

        let mut reader = RlpReader::new(buf);
        let tx_type = match marker {
            EIP2930_MARKER => TxType::Eip2930,
            EIP1559_MARKER => TxType::Eip1559,
            m if m >= LEGACY_MIN_MARKER => TxType::Legacy,
            _ => return Err(ParserError::UnsupportedTx),
        };
        if tx_type != TxType::Legacy {
            reader.skip(1)?;
        }

        let list = reader.read()?;
        if !list.is_list() {
            return Err(ParserError::UnexpectedValue);
        }
        if !reader.is_at_end() {
            return Err(ParserError::TrailingData);
        }

        let mut fields = RlpReader::list(buf, &list)?;
        match tx_type {
            TxType::Legacy => parse_legacy(buf, &mut fields).map(EthTransaction::Legacy),
            TxType::Eip2930 => Ok(EthTransaction::Eip2930 {
                chain: read_chain(buf, &mut fields)?,
            }),
            TxType::Eip1559 => Ok(EthTransaction::Eip1559 {
                chain: read_chain(buf, &mut fields)?,
            }),
        }
    }

    /// Envelope kind.
    pub fn tx_type(&self) -> TxType {
        match self {
            EthTransaction::Legacy(_) => TxType::Legacy,
            EthTransaction::Eip2930 { .. } => TxType::Eip2930,
            EthTransaction::Eip1559 { .. } => TxType::Eip1559,
        }
    }

    /// Network the transaction is bound to, if any.
    pub fn network(&self) -> Option<Network> {
        match self {
            EthTransaction::Legacy(tx) => tx.chain,
            EthTransaction::Eip2930 { chain } | EthTransaction::Eip1559 { chain } => Some(*chain),
        }
    }

    /// Chain id, if the transaction carries one.
    pub fn chain_id(&self) -> Option<u64> {
        self.network().map(Network::chain_id)
    }

    /// Legacy fields, for legacy transactions.
    pub fn as_legacy(&self) -> Option<&LegacyTx> {
        match self {
            EthTransaction::Legacy(tx) => Some(tx),
            _ => None,
        }
    }
}

fn parse_legacy(buf: &[u8], fields: &mut RlpReader<'_>) -> Result<LegacyTx, ParserError> {
    let nonce = fields.read()?;
    let gas_price = fields.read()?;
    let gas_limit = fields.read()?;
    let to = fields.read()?;
    let value = fields.read()?;
    let data = fields.read()?;

    // Six fields only: pre-EIP-155, no chain binding.
    let chain = if fields.is_at_end() {
        None
    } else {
        let chain = read_chain(buf, fields)?;
        let r = fields.read()?;
        let s = fields.read()?;
        if !is_unsigned_placeholder(&r, buf) || !is_unsigned_placeholder(&s, buf) {
            return Err(ParserError::InvalidRsValues);
        }
        if !fields.is_at_end() {
            return Err(ParserError::TrailingData);
        }
        Some(chain)
    };

    Ok(LegacyTx {
        nonce,
        gas_price,
        gas_limit,
        to,
        value,
        data,
        chain,
    })
}

/// Reads the chain id and checks it against the Flare networks.
fn read_chain(buf: &[u8], fields: &mut RlpReader<'_>) -> Result<Network, ParserError> {
    let item = fields.read()?;
    if item.is_list() {
        return Err(ParserError::UnexpectedValue);
    }
    let id = item.as_u64(buf).ok_or(ParserError::ValueOutOfRange)?;
    Network::from_chain_id(id).ok_or_else(|| {
        log::warn!("Parser: rejected chain id {}", id);
        ParserError::InvalidChainId
    })
}

/// `r`/`s` of an unsigned EIP-155 transaction: empty or a single zero.
fn is_unsigned_placeholder(item: &RlpItem, buf: &[u8]) -> bool {
    !item.is_list() && matches!(item.bytes(buf), [] | [0x00])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parsing::rlp::{encode_bytes, encode_list, encode_u64};
    use hex_literal::hex;

    /// Unsigned legacy transaction; `r`/`s` are only encoded with a chain id.
    fn legacy(chain: Option<u64>, r: &[u8], s: &[u8], to: &[u8], data: &[u8]) -> Vec<u8> {
        let mut items = Vec::new();
        items.extend(encode_u64(9));
        items.extend(encode_u64(20_000_000_000));
        items.extend(encode_u64(21000));
        items.extend(encode_bytes(to));
        items.extend(encode_u64(1_000_000_000_000_000_000));
        items.extend(encode_bytes(data));
        if let Some(id) = chain {
            items.extend(encode_u64(id));
            items.extend(encode_bytes(r));
            items.extend(encode_bytes(s));
        }
        encode_list(&items)
    }

    const TO: [u8; 20] = hex!("df073477da421520cf03af261b782282c304ad66");

    #[test]
    fn test_parse_legacy_eip155() {
        let buf = legacy(Some(14), b"", b"", &TO, &hex!("deadbeef"));
        let tx = EthTransaction::parse(&buf).unwrap();

        assert_eq!(tx.tx_type(), TxType::Legacy);
        assert_eq!(tx.chain_id(), Some(14));

        let fields = tx.as_legacy().unwrap();
        assert_eq!(fields.nonce.as_u64(&buf), Some(9));
        assert_eq!(fields.gas_limit.as_u64(&buf), Some(21000));
        assert_eq!(fields.to.bytes(&buf), &TO);
        assert_eq!(fields.data.bytes(&buf), &hex!("deadbeef"));
        // ranges point into the encoded buffer
        assert_eq!(&buf[fields.to.offset..fields.to.offset + 20], &TO);
    }

    #[test]
    fn test_parse_legacy_without_chain_id() {
        let buf = legacy(None, b"", b"", &TO, b"");
        let tx = EthTransaction::parse(&buf).unwrap();
        assert_eq!(tx.chain_id(), None);
        assert!(tx.as_legacy().unwrap().data.is_empty());
    }

    #[test]
    fn test_zero_byte_placeholders_accepted() {
        let buf = legacy(Some(19), &[0x00], &[0x00], &TO, b"");
        assert_eq!(EthTransaction::parse(&buf).unwrap().chain_id(), Some(19));

        let buf = legacy(Some(16), b"", &[0x00], &TO, b"");
        assert_eq!(EthTransaction::parse(&buf).unwrap().chain_id(), Some(16));
    }

    #[test]
    fn test_already_signed_rejected() {
        let buf = legacy(Some(14), &[0x01], b"", &TO, b"");
        assert_eq!(EthTransaction::parse(&buf), Err(ParserError::InvalidRsValues));

        let buf = legacy(Some(14), b"", &hex!("1234"), &TO, b"");
        assert_eq!(EthTransaction::parse(&buf), Err(ParserError::InvalidRsValues));
    }

    #[test]
    fn test_chain_id_allow_list() {
        for id in [14u64, 16, 19, 114] {
            let buf = legacy(Some(id), b"", b"", &TO, b"");
            assert_eq!(EthTransaction::parse(&buf).unwrap().chain_id(), Some(id));
        }
        for id in [0u64, 1, 15, 999] {
            let buf = legacy(Some(id), b"", b"", &TO, b"");
            assert_eq!(EthTransaction::parse(&buf), Err(ParserError::InvalidChainId));
        }
    }

    #[test]
    fn test_typed_envelopes_decode_chain_only() {
        let mut items = encode_u64(114);
        items.extend(encode_u64(3)); // remaining fields are ignored
        let mut buf = vec![0x02];
        buf.extend(encode_list(&items));

        let tx = EthTransaction::parse(&buf).unwrap();
        assert_eq!(tx.tx_type(), TxType::Eip1559);
        assert_eq!(tx.network(), Some(Network::Coston2));

        buf[0] = 0x01;
        assert_eq!(EthTransaction::parse(&buf).unwrap().tx_type(), TxType::Eip2930);

        let mut bad = vec![0x02];
        bad.extend(encode_list(&encode_u64(1)));
        assert_eq!(EthTransaction::parse(&bad), Err(ParserError::InvalidChainId));
    }

    #[test]
    fn test_envelope_errors() {
        assert_eq!(EthTransaction::parse(&[]), Err(ParserError::NoData));
        assert_eq!(EthTransaction::parse(&[0x03, 0xc0]), Err(ParserError::UnsupportedTx));
        assert_eq!(EthTransaction::parse(&[0x7f]), Err(ParserError::UnsupportedTx));
        // typed envelope whose payload is a string
        assert_eq!(
            EthTransaction::parse(&[0x02, 0x81, 0x0e]),
            Err(ParserError::UnexpectedValue)
        );
    }

    #[test]
    fn test_trailing_bytes_rejected() {
        let mut buf = legacy(None, b"", b"", &TO, b"");
        buf.push(0x80);
        assert_eq!(EthTransaction::parse(&buf), Err(ParserError::TrailingData));
    }

    #[test]
    fn test_truncated_transaction() {
        let buf = legacy(Some(14), b"", b"", &TO, b"");
        assert_eq!(
            EthTransaction::parse(&buf[..buf.len() - 5]),
            Err(ParserError::UnexpectedBufferEnd)
        );
    }

    #[test]
    fn test_error_maps_to_status() {
        assert_eq!(AppError::from(ParserError::InvalidChainId).status_word(), 0x6806);
        assert_eq!(ParserError::InvalidRsValues.to_string(), "Invalid rs values");
    }
}

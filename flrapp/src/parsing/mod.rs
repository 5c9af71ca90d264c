//! Transaction parsing for the Flare app.
//!
//! This module provides:
//! - RLP (Recursive Length Prefix) decoding over buffer ranges
//! - Transaction decoding (legacy, EIP-2930, EIP-1559)
//! - ERC-20 transfer recognition
//!
//! # Security
//!
//! All parsing happens on untrusted input. Parsers must:
//! - Validate all length fields before access
//! - Fail closed on any malformed data
//! - Avoid unbounded allocations

pub mod erc20;
pub mod rlp;
pub mod transaction;

pub use erc20::{as_erc20_transfer, is_erc20_transfer, Erc20Transfer};
pub use rlp::{RlpError, RlpItem, RlpKind, RlpReader};
pub use transaction::{EthTransaction, LegacyTx, ParserError, TxType};

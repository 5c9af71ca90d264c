//! Review items for the on-device confirmation screens.
//!
//! A decoded transaction is turned into an ordered list of `(key, value)`
//! items, produced on demand and split into pages of a caller-chosen
//! width. Three layouts exist:
//! - ERC-20 transfers: clear signing, nine items
//! - Other legacy transactions (expert mode): field by field
//! - Typed envelopes (expert mode): blind-signing warning and hash
//!
//! # Security
//!
//! Nothing is rendered unless the policy check in [`ReviewMode::select`]
//! passes. The transaction hash is recomputed from the raw buffer on
//! every request.

use core::fmt;

use flrapp_common::AppError;

use crate::crypto::keccak256;
use crate::parsing::{as_erc20_transfer, EthTransaction, LegacyTx, RlpItem, TxType};
use crate::platform::ItemSource;
use crate::print::{data_preview, format_evm_address, uint_to_decimal};

/// Key of the transaction hash item.
pub const HASH_KEY: &str = "Eth-Hash";

/// Warning shown before blind-signing a typed envelope.
pub const BLIND_WARNING: &str = "Blind-signing EVM Tx";

/// One page of one review item.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DisplayItem {
    pub key: String,
    /// Text of page `page_idx`.
    pub value: String,
    pub page_idx: u8,
    pub page_count: u8,
}

impl DisplayItem {
    /// Page `page` of `value` split every `width` characters.
    ///
    /// An empty value still has one (empty) page.
    pub fn paged(key: &str, value: &str, page: u8, width: usize) -> Result<Self, AppError> {
        let width = width.max(1);
        let chars: Vec<char> = value.chars().collect();
        let pages = chars.len().div_ceil(width).max(1);
        let page_count = u8::try_from(pages).map_err(|_| AppError::ValueOutOfRange)?;

        if page >= page_count {
            return Err(AppError::NoData);
        }

        let start = page as usize * width;
        let end = (start + width).min(chars.len());
        Ok(Self {
            key: key.to_string(),
            value: chars[start..end].iter().collect(),
            page_idx: page,
            page_count,
        })
    }
}

impl fmt::Display for DisplayItem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} [{}/{}]: {}", self.key, self.page_idx + 1, self.page_count, self.value)
    }
}

/// Review layout chosen for a transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReviewMode {
    Erc20,
    Itemized,
    BlindWarning,
}

impl ReviewMode {
    /// Applies the signing policy: clear signing for ERC-20 transfers,
    /// anything else only in expert mode.
    pub fn select(tx: &EthTransaction, buf: &[u8], expert_mode: bool) -> Result<Self, AppError> {
        if as_erc20_transfer(tx, buf).is_some() {
            return Ok(ReviewMode::Erc20);
        }
        if !expert_mode {
            log::info!("Display: non-ERC-20 transaction refused outside expert mode");
            return Err(AppError::UnsupportedTx);
        }
        Ok(match tx.tx_type() {
            TxType::Legacy => ReviewMode::Itemized,
            TxType::Eip2930 | TxType::Eip1559 => ReviewMode::BlindWarning,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Field {
    Receiver,
    Contract,
    Amount,
    To,
    Nonce,
    GasPrice,
    GasLimit,
    Value,
    Data,
    Warning,
    Hash,
}

const ERC20_FIELDS: [Field; 9] = [
    Field::Receiver,
    Field::Contract,
    Field::Amount,
    Field::Nonce,
    Field::GasPrice,
    Field::GasLimit,
    Field::Value,
    Field::Data,
    Field::Hash,
];

const ITEMIZED_FIELDS: [Field; 7] = [
    Field::To,
    Field::Value,
    Field::Data,
    Field::GasPrice,
    Field::GasLimit,
    Field::Nonce,
    Field::Hash,
];

const BLIND_FIELDS: [Field; 2] = [Field::Warning, Field::Hash];

impl Field {
    fn key(self) -> &'static str {
        match self {
            Field::Receiver => "Receiver",
            Field::Contract => "Contract",
            Field::Amount => "Amount",
            Field::To => "To",
            Field::Nonce => "Nonce",
            Field::GasPrice => "Gas price",
            Field::GasLimit => "Gas limit",
            Field::Value => "Value",
            Field::Data => "Data",
            Field::Warning => "Warning:",
            Field::Hash => HASH_KEY,
        }
    }
}

/// A transaction under review, borrowed from the reassembled buffer.
pub struct TxReview<'a> {
    tx: &'a EthTransaction,
    buf: &'a [u8],
    mode: ReviewMode,
}

impl<'a> TxReview<'a> {
    /// Checks policy and picks the layout.
    pub fn new(tx: &'a EthTransaction, buf: &'a [u8], expert_mode: bool) -> Result<Self, AppError> {
        let mode = ReviewMode::select(tx, buf, expert_mode)?;
        Ok(Self { tx, buf, mode })
    }

    pub fn mode(&self) -> ReviewMode {
        self.mode
    }

    fn fields(&self) -> Vec<Field> {
        match self.mode {
            ReviewMode::Erc20 => ERC20_FIELDS.to_vec(),
            ReviewMode::BlindWarning => BLIND_FIELDS.to_vec(),
            ReviewMode::Itemized => {
                let legacy = self.tx.as_legacy();
                let to_empty = legacy.map_or(true, |l| l.to.is_empty());
                let data_empty = legacy.map_or(true, |l| l.data.is_empty());
                ITEMIZED_FIELDS
                    .iter()
                    .copied()
                    .filter(|f| match f {
                        Field::To => !to_empty,
                        Field::Data => !data_empty,
                        _ => true,
                    })
                    .collect()
            }
        }
    }

    fn legacy(&self) -> Result<&LegacyTx, AppError> {
        self.tx.as_legacy().ok_or(AppError::UnexpectedValue)
    }

    fn number(&self, item: RlpItem) -> Result<String, AppError> {
        uint_to_decimal(item.bytes(self.buf))
    }

    fn render(&self, field: Field) -> Result<String, AppError> {
        match field {
            Field::Hash => Ok(hex::encode(keccak256(self.buf))),
            Field::Warning => Ok(BLIND_WARNING.to_string()),
            Field::Receiver | Field::Contract | Field::Amount => {
                let transfer = as_erc20_transfer(self.tx, self.buf).ok_or(AppError::UnexpectedValue)?;
                match field {
                    Field::Receiver => Ok(format_evm_address(transfer.receiver)),
                    Field::Contract => Ok(format_evm_address(transfer.contract)),
                    _ => uint_to_decimal(transfer.amount),
                }
            }
            Field::To => Ok(format_evm_address(self.legacy()?.to.bytes(self.buf))),
            Field::Nonce => self.number(self.legacy()?.nonce),
            Field::GasPrice => self.number(self.legacy()?.gas_price),
            Field::GasLimit => self.number(self.legacy()?.gas_limit),
            Field::Value => self.number(self.legacy()?.value),
            Field::Data => Ok(data_preview(self.legacy()?.data.bytes(self.buf))),
        }
    }
}

impl ItemSource for TxReview<'_> {
    fn num_items(&self) -> Result<u8, AppError> {
        u8::try_from(self.fields().len()).map_err(|_| AppError::ValueOutOfRange)
    }

    fn item(&self, idx: u8, page: u8, width: usize) -> Result<DisplayItem, AppError> {
        let field = *self.fields().get(idx as usize).ok_or(AppError::NoData)?;
        DisplayItem::paged(field.key(), &self.render(field)?, page, width)
    }
}

/// Review of a pre-hashed message: a single `Hash` item.
pub struct HashReview<'a> {
    hash: &'a [u8],
}

impl<'a> HashReview<'a> {
    pub fn new(hash: &'a [u8]) -> Self {
        Self { hash }
    }
}

impl ItemSource for HashReview<'_> {
    fn num_items(&self) -> Result<u8, AppError> {
        Ok(1)
    }

    fn item(&self, idx: u8, page: u8, width: usize) -> Result<DisplayItem, AppError> {
        if idx != 0 {
            return Err(AppError::NoData);
        }
        DisplayItem::paged("Hash", &hex::encode(self.hash), page, width)
    }
}

/// Address confirmation: a single `Address` item.
pub struct AddressReview<'a> {
    address: &'a str,
}

impl<'a> AddressReview<'a> {
    pub fn new(address: &'a str) -> Self {
        Self { address }
    }
}

impl ItemSource for AddressReview<'_> {
    fn num_items(&self) -> Result<u8, AppError> {
        Ok(1)
    }

    fn item(&self, idx: u8, page: u8, width: usize) -> Result<DisplayItem, AppError> {
        match idx {
            0 => DisplayItem::paged("Address", self.address, page, width),
            _ => Err(AppError::NoData),
        }
    }
}

/// Signature `v` for `tx` given the signer's y-parity.
///
/// Typed envelopes use the bare parity, pre-EIP-155 legacy transactions
/// 27 + parity and EIP-155 ones 35 + parity + 2 * chainId. The wire field
/// is one byte, so large chain ids wrap.
pub fn compute_v(tx: &EthTransaction, parity: u8) -> u8 {
    let parity = parity & 1;
    match tx.tx_type() {
        TxType::Eip2930 | TxType::Eip1559 => parity,
        TxType::Legacy => match tx.chain_id() {
            None => 27 + parity,
            Some(id) => {
                let doubled = u32::try_from(id).unwrap_or(u32::MAX).saturating_mul(2);
                let v = (35 + parity as u32).saturating_add(doubled);
                if v > u8::MAX as u32 {
                    log::warn!("Display: v = {} for chain {} truncated to {}", v, id, v as u8);
                }
                v as u8
            }
        },
    }
}

//! Value rendering for review screens.
//!
//! Numbers arrive as big-endian byte strings of up to 256 bits and are
//! printed in decimal. Amounts are printed in fixed point with the
//! network ticker; native addresses in bech32; node ids in base58-check.
//!
//! The EVM review path uses [`uint_to_decimal`], [`format_evm_address`]
//! and [`data_preview`]. [`format_amount`], [`network_address`] and
//! [`format_node_id`] are exported for front-ends that render native
//! P-chain values (staking amounts, validator node ids) with the same
//! rules; the dispatcher itself does not call them.

use flrapp_common::{AppError, Network, DATA_PREVIEW_BYTES};

use crate::crypto::{format_address_checksummed, sha256};

/// Prefix of a rendered node id.
pub const NODE_ID_PREFIX: &str = "NodeID-";

/// Length of a raw node id.
pub const NODE_ID_LEN: usize = 20;

/// Checksum bytes appended to a node id before base58.
const CB58_CHECKSUM_LEN: usize = 4;

const MAX_UINT_BYTES: usize = 32;

/// Decimal rendering of a big-endian unsigned integer of up to 32 bytes.
///
/// The empty string is zero.
pub fn uint_to_decimal(be: &[u8]) -> Result<String, AppError> {
    if be.len() > MAX_UINT_BYTES {
        return Err(AppError::ValueOutOfRange);
    }

    let mut value: Vec<u8> = be.iter().copied().skip_while(|&b| b == 0).collect();
    if value.is_empty() {
        return Ok("0".to_string());
    }

    // Schoolbook division by 10, least significant digit first.
    let mut digits = Vec::with_capacity(78);
    while !value.is_empty() {
        let mut rem = 0u16;
        for byte in value.iter_mut() {
            let acc = (rem << 8) | *byte as u16;
            *byte = (acc / 10) as u8;
            rem = acc % 10;
        }
        digits.push(b'0' + rem as u8);
        let lead = value.iter().take_while(|&&b| b == 0).count();
        value.drain(..lead);
    }

    digits.reverse();
    String::from_utf8(digits).map_err(|_| AppError::ExecutionError)
}

/// Inserts a decimal point `decimals` digits from the right, padding
/// with leading zeros as needed.
fn to_fixed_point(int_str: &str, decimals: usize) -> String {
    if decimals == 0 {
        return int_str.to_string();
    }
    let mut padded = String::new();
    if int_str.len() <= decimals {
        padded.extend(core::iter::repeat('0').take(decimals + 1 - int_str.len()));
    }
    padded.push_str(int_str);
    let split = padded.len() - decimals;
    format!("{}.{}", &padded[..split], &padded[split..])
}

/// Drops trailing fractional zeros, then a bare trailing decimal point.
fn trim_fraction(s: &mut String) {
    if !s.contains('.') {
        return;
    }
    while s.ends_with('0') {
        s.pop();
    }
    if s.ends_with('.') {
        s.pop();
    }
}

/// Fixed-point amount with the network ticker, e.g. `1.5 FLR`.
pub fn format_amount(amount_be: &[u8], decimals: u8, network: Network) -> Result<String, AppError> {
    let mut amount = to_fixed_point(&uint_to_decimal(amount_be)?, decimals as usize);
    trim_fraction(&mut amount);
    amount.push(' ');
    amount.push_str(network.symbol());
    Ok(amount)
}

/// Bech32 address of `data` under `hrp`.
pub fn bech32_address(hrp: &str, data: &[u8]) -> Result<String, AppError> {
    use bech32::{Bech32, Hrp};

    let hrp = Hrp::parse(hrp).map_err(|_| AppError::DataInvalid)?;
    bech32::encode::<Bech32>(hrp, data).map_err(|_| AppError::DataInvalid)
}

/// Native address of a 20-byte key hash on `network`.
pub fn network_address(network: Network, hash: &[u8; 20]) -> Result<String, AppError> {
    bech32_address(network.hrp(), hash)
}

/// `NodeID-` + base58(id || last 4 bytes of sha256(id)).
pub fn format_node_id(id: &[u8; NODE_ID_LEN]) -> String {
    let checksum = sha256(id);
    let mut data = [0u8; NODE_ID_LEN + CB58_CHECKSUM_LEN];
    data[..NODE_ID_LEN].copy_from_slice(id);
    data[NODE_ID_LEN..].copy_from_slice(&checksum[checksum.len() - CB58_CHECKSUM_LEN..]);

    let mut out = String::from(NODE_ID_PREFIX);
    out.push_str(&bs58::encode(data).into_string());
    out
}

/// EVM address: EIP-55 for 20-byte values, plain hex otherwise.
pub fn format_evm_address(bytes: &[u8]) -> String {
    match <&[u8; 20]>::try_from(bytes) {
        Ok(address) => format_address_checksummed(address),
        Err(_) => format!("0x{}", hex::encode(bytes)),
    }
}

/// First bytes of call data in hex, `...` when there is more.
pub fn data_preview(data: &[u8]) -> String {
    let shown = &data[..data.len().min(DATA_PREVIEW_BYTES)];
    let mut out = hex::encode(shown);
    if data.len() > DATA_PREVIEW_BYTES {
        out.push_str("...");
    }
    out
}

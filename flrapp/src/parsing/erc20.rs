//! ERC-20 `transfer(address,uint256)` recognition.
//!
//! A legacy transaction is a token transfer when it calls a 20-byte
//! contract with exactly the selector, one left-padded address word and
//! one amount word. Anything else is not recognized; there is no
//! general ABI decoding here.

use super::transaction::EthTransaction;

/// `keccak256("transfer(address,uint256)")[..4]`.
pub const TRANSFER_SELECTOR: [u8; 4] = [0xa9, 0x05, 0x9c, 0xbb];

const ADDRESS_LEN: usize = 20;
const WORD_LEN: usize = 32;
const CALL_LEN: usize = 4 + 2 * WORD_LEN;

/// A recognized token transfer, borrowed from the transaction buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Erc20Transfer<'a> {
    /// Token contract (the transaction's `to`).
    pub contract: &'a [u8],
    /// Recipient of the tokens.
    pub receiver: &'a [u8],
    /// Amount in the token's base units, big-endian.
    pub amount: &'a [u8],
}

/// Matches `tx` against the transfer call shape.
pub fn as_erc20_transfer<'a>(tx: &EthTransaction, buf: &'a [u8]) -> Option<Erc20Transfer<'a>> {
    let legacy = tx.as_legacy()?;
    let to = legacy.to.bytes(buf);
    let data = legacy.data.bytes(buf);

    if legacy.to.is_list() || legacy.data.is_list() {
        return None;
    }
    if to.len() != ADDRESS_LEN || data.len() != CALL_LEN {
        return None;
    }
    if data[..4] != TRANSFER_SELECTOR {
        return None;
    }

    let receiver_word = &data[4..4 + WORD_LEN];
    let (padding, receiver) = receiver_word.split_at(WORD_LEN - ADDRESS_LEN);
    if padding.iter().any(|&b| b != 0) {
        return None;
    }

    Some(Erc20Transfer {
        contract: to,
        receiver,
        amount: &data[4 + WORD_LEN..],
    })
}

/// Deterministic ERC-20 transfer predicate.
pub fn is_erc20_transfer(tx: &EthTransaction, buf: &[u8]) -> bool {
    as_erc20_transfer(tx, buf).is_some()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parsing::rlp::{encode_bytes, encode_list, encode_u64};
    use hex_literal::hex;

    const CONTRACT: [u8; 20] = hex!("1D80c49BbBCd1C0911346656B529DF9E5c2F783d");
    const CALL: [u8; 68] = hex!(
        "a9059cbb"
        "000000000000000000000000b7784e5ad303d44067d2a6353441b784c226ccaf"
        "00000000000000000000000000000000000000000000000000000000075bca00"
    );

    fn tx_with(to: &[u8], data: &[u8]) -> Vec<u8> {
        let mut items = Vec::new();
        items.extend(encode_u64(0));
        items.extend(encode_u64(0x6d6e2edc00));
        items.extend(encode_u64(0x2dc6c0));
        items.extend(encode_bytes(to));
        items.extend(encode_u64(0x03e8));
        items.extend(encode_bytes(data));
        items.extend(encode_u64(14));
        items.extend(encode_bytes(b""));
        items.extend(encode_bytes(b""));
        encode_list(&items)
    }

    #[test]
    fn test_recognizes_transfer() {
        let buf = tx_with(&CONTRACT, &CALL);
        let tx = EthTransaction::parse(&buf).unwrap();
        let transfer = as_erc20_transfer(&tx, &buf).unwrap();

        assert_eq!(transfer.contract, &CONTRACT);
        assert_eq!(transfer.receiver, &hex!("b7784e5ad303d44067d2a6353441b784c226ccaf"));
        assert_eq!(transfer.amount[28..], hex!("075bca00"));
    }

    #[test]
    fn test_rejects_other_shapes() {
        // wrong selector
        let mut call = CALL;
        call[0] = 0x23;
        let buf = tx_with(&CONTRACT, &call);
        assert!(!is_erc20_transfer(&EthTransaction::parse(&buf).unwrap(), &buf));

        // dirty address padding
        let mut call = CALL;
        call[5] = 1;
        let buf = tx_with(&CONTRACT, &call);
        assert!(!is_erc20_transfer(&EthTransaction::parse(&buf).unwrap(), &buf));

        // truncated call data
        let buf = tx_with(&CONTRACT, &CALL[..36]);
        assert!(!is_erc20_transfer(&EthTransaction::parse(&buf).unwrap(), &buf));

        // contract creation
        let buf = tx_with(b"", &CALL);
        assert!(!is_erc20_transfer(&EthTransaction::parse(&buf).unwrap(), &buf));
    }
}

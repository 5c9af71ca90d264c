//! Shared helpers for the dispatcher integration tests.
//!
//! Builds commands and RLP transactions the way a host library would and
//! drives them through a [`Dispatcher`] backed by [`MockPlatform`].

#![allow(dead_code)]

use flrapp::crypto::{Seed, SoftwareEngine};
use flrapp::parsing::rlp::{encode_bytes, encode_list, encode_u64};
use flrapp::{ApduResponse, AppConfig, Dispatcher, MockPlatform, VersionInfo};
use hex_literal::hex;

pub const CLA_NATIVE: u8 = 0x58;
pub const CLA_EVM: u8 = 0xE0;

pub const INS_GET_VERSION: u8 = 0x00;
pub const INS_GET_ADDR: u8 = 0x01;
pub const INS_SIGN: u8 = 0x02;
pub const INS_GET_ADDR_EVM: u8 = 0x02;
pub const INS_SIGN_HASH: u8 = 0x03;
pub const INS_SIGN_EVM: u8 = 0x04;

pub const P1_INIT: u8 = 0x00;
pub const P1_ADD: u8 = 0x01;
pub const P1_LAST: u8 = 0x02;
pub const P1_FIRST: u8 = 0x00;
pub const P1_MORE: u8 = 0x80;

/// BIP39 "abandon abandon ... about".
pub const ABANDON_SEED: [u8; 64] = hex!(
    "5eb00bbddcf069084889a8ab9155568165f5c453ccb85e70811aaed6f6da5fc1"
    "9a5ac40b389cd370d086206dec8aa6c43daea6690f20ad3d8d48b2d2ce9e38e4"
);

/// m/44'/60'/0'/0/0
pub const ETH_PATH: [u32; 5] = [0x8000_002c, 0x8000_003c, 0x8000_0000, 0, 0];

pub const VERSION: VersionInfo = VersionInfo {
    major: 1,
    minor: 2,
    patch: 3,
};
pub const TARGET_ID: u32 = 0x3300_0004;

pub type TestDispatcher = Dispatcher<MockPlatform, SoftwareEngine>;

pub fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// Unlocked dispatcher over the test seed.
pub fn dispatcher(expert_mode: bool) -> TestDispatcher {
    init_logging();
    let config = AppConfig {
        version: VERSION,
        expert_mode,
        target_id: TARGET_ID,
        test_mode: false,
    };
    let engine = SoftwareEngine::new(Seed::from_bytes(&ABANDON_SEED));
    let mut d = Dispatcher::new(config, MockPlatform::new(), engine);
    d.init().expect("buffer init");
    d
}

pub fn apdu(cla: u8, ins: u8, p1: u8, p2: u8, data: &[u8]) -> Vec<u8> {
    let mut out = vec![cla, ins, p1, p2, data.len().min(255) as u8];
    out.extend_from_slice(data);
    out
}

/// `[n][n x u32 BE]`
pub fn evm_path(path: &[u32]) -> Vec<u8> {
    let mut out = vec![path.len() as u8];
    for c in path {
        out.extend_from_slice(&c.to_be_bytes());
    }
    out
}

/// `[5 x u32 LE]`
pub fn native_path(path: &[u32]) -> Vec<u8> {
    path.iter().flat_map(|c| c.to_le_bytes()).collect()
}

/// Status word of a reply.
pub fn status(reply: &[u8]) -> u16 {
    let n = reply.len();
    u16::from_be_bytes([reply[n - 2], reply[n - 1]])
}

/// Unsigned legacy transaction.
#[derive(Debug, Clone)]
pub struct LegacyBuilder {
    pub nonce: u64,
    pub gas_price: u64,
    pub gas_limit: u64,
    pub to: Vec<u8>,
    pub value: u64,
    pub data: Vec<u8>,
    pub chain_id: Option<u64>,
    pub r: Vec<u8>,
    pub s: Vec<u8>,
}

impl LegacyBuilder {
    /// Defaults of the host test-suite: nonce 0, 470 gwei, 3M gas.
    pub fn new(chain_id: Option<u64>) -> Self {
        Self {
            nonce: 0,
            gas_price: 0x6d6e2edc00,
            gas_limit: 0x2dc6c0,
            to: Vec::new(),
            value: 0,
            data: Vec::new(),
            chain_id,
            r: Vec::new(),
            s: Vec::new(),
        }
    }

    pub fn to(mut self, to: &[u8]) -> Self {
        self.to = to.to_vec();
        self
    }

    pub fn value(mut self, value: u64) -> Self {
        self.value = value;
        self
    }

    pub fn data(mut self, data: &[u8]) -> Self {
        self.data = data.to_vec();
        self
    }

    pub fn rs(mut self, r: &[u8], s: &[u8]) -> Self {
        self.r = r.to_vec();
        self.s = s.to_vec();
        self
    }

    pub fn encode(&self) -> Vec<u8> {
        let mut items = Vec::new();
        items.extend(encode_u64(self.nonce));
        items.extend(encode_u64(self.gas_price));
        items.extend(encode_u64(self.gas_limit));
        items.extend(encode_bytes(&self.to));
        items.extend(encode_u64(self.value));
        items.extend(encode_bytes(&self.data));
        if let Some(id) = self.chain_id {
            items.extend(encode_u64(id));
            items.extend(encode_bytes(&self.r));
            items.extend(encode_bytes(&self.s));
        }
        encode_list(&items)
    }
}

/// `marker || rlp([chainId, nonce, ...])`; only the chain id matters.
pub fn typed_tx(marker: u8, chain_id: u64) -> Vec<u8> {
    let mut items = encode_u64(chain_id);
    items.extend(encode_u64(7));
    items.extend(encode_u64(21000));
    let mut out = vec![marker];
    out.extend(encode_list(&items));
    out
}

/// Sends `tx` as EVM First/More chunks of at most `chunk` bytes.
/// Returns the response to the last chunk sent.
pub fn send_evm(d: &mut TestDispatcher, path: &[u32], tx: &[u8], chunk: usize) -> ApduResponse {
    let mut first = evm_path(path);
    let head = tx.len().min(chunk.saturating_sub(first.len()));
    first.extend_from_slice(&tx[..head]);

    let mut response = d.handle_apdu(&apdu(CLA_EVM, INS_SIGN_EVM, P1_FIRST, 0, &first));
    for part in tx[head..].chunks(chunk) {
        assert_eq!(response.status_word(), Some(0x9000), "intermediate chunk refused");
        response = d.handle_apdu(&apdu(CLA_EVM, INS_SIGN_EVM, P1_MORE, 0, part));
    }
    response
}

/// Sends `data` as native Init/Add.../Last under `ins`.
pub fn send_native(
    d: &mut TestDispatcher,
    ins: u8,
    path: &[u32],
    data: &[u8],
    chunk: usize,
) -> ApduResponse {
    let init = d.handle_apdu(&apdu(CLA_NATIVE, ins, P1_INIT, 0, &native_path(path)));
    assert_eq!(init.status_word(), Some(0x9000), "init refused");

    let parts: Vec<&[u8]> = if data.is_empty() {
        vec![&[][..]]
    } else {
        data.chunks(chunk).collect()
    };
    let (last, body) = parts.split_last().expect("at least one chunk");
    for part in body {
        let r = d.handle_apdu(&apdu(CLA_NATIVE, ins, P1_ADD, 0, part));
        assert_eq!(r.status_word(), Some(0x9000), "add refused");
    }
    d.handle_apdu(&apdu(CLA_NATIVE, ins, P1_LAST, 0, last))
}

//! Class, instruction and chunk parameter bytes.
//!
//! Two class identities share one instruction table. The class selects
//! the chunking dialect and, for `0x02`, whether the instruction is a
//! native sign or an EVM get-address.

use num_derive::{FromPrimitive, ToPrimitive};

/// Command class.
#[derive(Debug, Clone, Copy, PartialEq, Eq, FromPrimitive, ToPrimitive)]
#[repr(u8)]
pub enum Cla {
    /// Native Flare commands.
    Native = 0x58,
    /// Ethereum-compatible commands.
    Evm = 0xE0,
}

/// Instruction byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq, FromPrimitive, ToPrimitive)]
#[repr(u8)]
pub enum Ins {
    /// Version block; bypasses the session.
    GetVersion = 0x00,

    /// Native public key and bech32 address.
    /// P1: require confirmation.
    GetAddr = 0x01,

    /// Native chunked sign, or EVM get-address under [`Cla::Evm`].
    /// P1: [`NativeChunk`] for sign, confirmation flag for get-address.
    Sign = 0x02,

    /// Sign a 32-byte pre-hashed digest (expert mode only).
    /// P1: [`NativeChunk`].
    SignHash = 0x03,

    /// Sign an RLP-encoded EVM transaction.
    /// P1: [`EvmChunk`], P2: 0.
    SignEvm = 0x04,
}

impl Ins {
    /// EVM get-address shares its byte with native sign.
    pub const GET_ADDR_EVM: u8 = 0x02;
}

/// P1 for native chunked transfers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, FromPrimitive, ToPrimitive)]
#[repr(u8)]
pub enum NativeChunk {
    /// Carries the derivation path; resets the buffer.
    Init = 0x00,
    /// Transaction bytes, more to follow.
    Add = 0x01,
    /// Final transaction bytes.
    Last = 0x02,
}

/// P1 for EVM chunked transfers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, FromPrimitive, ToPrimitive)]
#[repr(u8)]
pub enum EvmChunk {
    /// Path followed by the head of the transaction.
    First = 0x00,
    /// Continuation bytes.
    More = 0x80,
}

/// P2 values for EVM get-address.
pub mod p2 {
    /// Return the address without chain code.
    pub const NO_CHAIN_CODE: u8 = 0x00;
    /// Append the 32-byte chain code.
    pub const CHAIN_CODE: u8 = 0x01;
}

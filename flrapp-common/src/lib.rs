//! Common types for the Flare signing app.
//!
//! This crate holds everything that both sides of the command channel
//! agree on: class and instruction bytes, status words, derivation
//! paths and network identities. It carries no parsing or signing logic.
//!
//! # Security Note
//!
//! Every value decoded here comes from the host and is untrusted.
//! Constructors validate shape only; policy lives in the app crate.

#![no_std]

extern crate alloc;

pub mod error;
pub mod opcodes;
pub mod types;

pub use error::{AppError, StatusWord};
pub use opcodes::{Cla, EvmChunk, Ins, NativeChunk};
pub use types::*;

/// Offset of the first payload byte in a command.
pub const OFFSET_DATA: usize = 5;

/// Minimum command length: CLA, INS, P1, P2, Lc.
pub const MIN_COMMAND_LEN: usize = OFFSET_DATA;

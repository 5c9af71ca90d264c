//! Flare signing app: transaction-processing core.
//!
//! The host sends transactions over a command/response protocol in
//! bounded chunks. This crate reassembles them, decodes the RLP wire
//! encoding, applies the signing policy and produces the paginated items
//! shown on the review screen before a signature is released.
//!
//! # Architecture
//!
//! - [`handlers`]: command dispatcher and chunk reassembly
//! - [`buffer`]: two-tier append-only transaction buffer
//! - [`parsing`]: RLP and transaction decoding, ERC-20 recognition
//! - [`display`]: review items, pagination and the signature `v`
//! - [`print`]: amount, address and node id rendering, also exported as
//!   the print API for native-chain front-ends
//! - [`platform`]: review UI and crypto engine traits, host mocks
//! - [`crypto`]: hashing and the software signing engine
//!
//! # Security Model
//!
//! - Every byte from the host is untrusted; parsers fail closed
//! - Nothing is displayed or signed before the transaction is complete
//! - Non-ERC-20 transactions need expert mode
//! - Keys and derivation paths are zeroized on drop

pub mod buffer;
pub mod crypto;
pub mod display;
pub mod handlers;
pub mod parsing;
pub mod platform;
pub mod print;
pub mod state;

pub use flrapp_common::{AppConfig, AppError, DerivationPath, Network, VersionInfo};
pub use handlers::{ApduResponse, Dispatcher};
pub use platform::{CryptoEngine, MockPlatform, Platform};

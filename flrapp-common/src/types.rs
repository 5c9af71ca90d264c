//! Core types shared by the Flare signing app.
//!
//! Derivation paths arrive in two wire layouts (native: five fixed
//! little-endian words; EVM: a count byte then big-endian words). Both
//! decode into the same [`DerivationPath`].

use alloc::vec::Vec;
use zeroize::Zeroize;

use crate::error::AppError;

/// Maximum derivation path depth.
pub const MAX_PATH_DEPTH: usize = 10;

/// Component count of a native path.
pub const NATIVE_PATH_LEN: usize = 5;

/// Maximum bech32 human-readable prefix length.
pub const MAX_HRP_LEN: usize = 83;

/// Capacity of the fast (RAM) buffer tier.
pub const RAM_TIER_SIZE: usize = 8192;

/// Capacity of the persistent (flash) buffer tier.
pub const NV_TIER_SIZE: usize = 16384;

/// Write granularity of the persistent tier.
pub const NV_BLOCK_SIZE: usize = 64;

/// Bytes of call data shown before the `...` marker.
pub const DATA_PREVIEW_BYTES: usize = 10;

/// Size of a pre-hashed digest for sign-hash.
pub const HASH_LEN: usize = 32;

/// EVM address (20 bytes).
pub type EvmAddress = [u8; 20];

// =============================================================================
// Derivation Path
// =============================================================================

/// BIP32 derivation path.
///
/// Hardened indices have bit 31 set. Only paths under `m/44'/60'`
/// are accepted by the decoders.
#[derive(Debug, Clone, Default, PartialEq, Eq, Zeroize)]
#[zeroize(drop)]
pub struct DerivationPath {
    components: Vec<u32>,
}

impl DerivationPath {
    /// Hardened index marker (bit 31).
    pub const HARDENED: u32 = 0x8000_0000;

    /// Purpose component every accepted path starts with.
    pub const PURPOSE: u32 = 44 | Self::HARDENED;

    /// Coin type every accepted path continues with.
    pub const COIN_TYPE: u32 = 60 | Self::HARDENED;

    /// Creates a path from a slice without validation.
    pub fn from_slice(path: &[u32]) -> Self {
        Self {
            components: path.to_vec(),
        }
    }

    /// Standard account path: m/44'/60'/account'/change/index.
    pub fn account(account: u32, change: u32, index: u32) -> Self {
        Self::from_slice(&[
            Self::PURPOSE,
            Self::COIN_TYPE,
            account | Self::HARDENED,
            change,
            index,
        ])
    }

    /// Decodes a native path: five little-endian u32 words.
    ///
    /// Returns the path and the number of bytes consumed.
    pub fn from_native_bytes(data: &[u8]) -> Result<(Self, usize), AppError> {
        let needed = NATIVE_PATH_LEN * 4;
        let raw = data.get(..needed).ok_or(AppError::WrongLength)?;

        let components = raw
            .chunks_exact(4)
            .map(|w| u32::from_le_bytes([w[0], w[1], w[2], w[3]]))
            .collect();

        let path = Self { components };
        path.require_mainnet()?;
        Ok((path, needed))
    }

    /// Decodes an EVM path: a count byte in `1..=10` then big-endian words.
    ///
    /// Returns the path and the number of bytes consumed.
    pub fn from_evm_bytes(data: &[u8]) -> Result<(Self, usize), AppError> {
        let (&count, rest) = data.split_first().ok_or(AppError::WrongLength)?;
        let count = count as usize;
        if count == 0 || count > MAX_PATH_DEPTH {
            return Err(AppError::WrongLength);
        }

        let raw = rest.get(..count * 4).ok_or(AppError::WrongLength)?;
        let components = raw
            .chunks_exact(4)
            .map(|w| u32::from_be_bytes([w[0], w[1], w[2], w[3]]))
            .collect();

        let path = Self { components };
        path.require_mainnet()?;
        Ok((path, 1 + count * 4))
    }

    /// Returns the path length.
    #[inline]
    pub fn len(&self) -> usize {
        self.components.len()
    }

    /// Returns true if the path is empty.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.components.is_empty()
    }

    /// Returns the path as a slice.
    #[inline]
    pub fn as_slice(&self) -> &[u32] {
        &self.components
    }

    /// True for non-empty paths of at most [`MAX_PATH_DEPTH`] that start
    /// with `44'/60'`.
    pub fn is_mainnet(&self) -> bool {
        self.components.len() >= 2
            && self.components.len() <= MAX_PATH_DEPTH
            && self.components[0] == Self::PURPOSE
            && self.components[1] == Self::COIN_TYPE
    }

    fn require_mainnet(&self) -> Result<(), AppError> {
        if self.is_mainnet() {
            Ok(())
        } else {
            Err(AppError::DataInvalid)
        }
    }
}

// =============================================================================
// Networks
// =============================================================================

/// Flare networks the app will sign for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Network {
    /// Flare mainnet.
    Flare,
    /// Coston test network.
    Coston,
    /// Songbird canary network.
    Songbird,
    /// Coston2 test network.
    Coston2,
}

impl Network {
    /// All networks, in chain-id order.
    pub const ALL: [Network; 4] = [
        Network::Flare,
        Network::Coston,
        Network::Songbird,
        Network::Coston2,
    ];

    /// Looks up a network by its EVM chain id.
    pub fn from_chain_id(chain_id: u64) -> Option<Self> {
        Self::ALL.into_iter().find(|n| n.chain_id() == chain_id)
    }

    /// EVM chain id.
    pub const fn chain_id(self) -> u64 {
        match self {
            Network::Flare => 14,
            Network::Coston => 16,
            Network::Songbird => 19,
            Network::Coston2 => 114,
        }
    }

    /// Currency ticker appended to amounts.
    pub const fn symbol(self) -> &'static str {
        match self {
            Network::Flare => "FLR",
            Network::Coston => "CFLR",
            Network::Songbird => "SGB",
            Network::Coston2 => "C2FLR",
        }
    }

    /// Bech32 human-readable prefix for native addresses.
    pub const fn hrp(self) -> &'static str {
        match self {
            Network::Flare => "flare",
            Network::Coston => "coston",
            Network::Songbird => "song",
            Network::Coston2 => "costwo",
        }
    }
}

/// Chunking dialect, selected by the command class.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Dialect {
    /// Init/Add/Last with an explicit final chunk.
    #[default]
    Native,
    /// First/More with completion derived from the RLP header.
    Evm,
}

// =============================================================================
// Version and Configuration
// =============================================================================

/// Application version.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct VersionInfo {
    /// Major version.
    pub major: u16,
    /// Minor version.
    pub minor: u16,
    /// Patch version.
    pub patch: u16,
}

/// Length of the get-version reply payload.
pub const VERSION_REPLY_LEN: usize = 12;

impl VersionInfo {
    /// Encodes the get-version block:
    /// `[test_mode][major BE16][minor BE16][patch BE16][locked][target_id BE32]`.
    ///
    /// `locked` is the inverse of `ux_allowed`.
    pub fn to_reply(
        self,
        test_mode: bool,
        ux_allowed: bool,
        target_id: u32,
    ) -> [u8; VERSION_REPLY_LEN] {
        let mut out = [0u8; VERSION_REPLY_LEN];
        out[0] = test_mode as u8;
        out[1..3].copy_from_slice(&self.major.to_be_bytes());
        out[3..5].copy_from_slice(&self.minor.to_be_bytes());
        out[5..7].copy_from_slice(&self.patch.to_be_bytes());
        out[7] = (!ux_allowed) as u8;
        out[8..12].copy_from_slice(&target_id.to_be_bytes());
        out
    }
}

/// Runtime configuration of the app.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AppConfig {
    /// Version reported by get-version.
    pub version: VersionInfo,
    /// Expert mode: allows blind and field-by-field review.
    pub expert_mode: bool,
    /// Device target identifier reported by get-version.
    pub target_id: u32,
    /// Test-mode flag reported by get-version.
    pub test_mode: bool,
}

//! Cryptographic helpers for the Flare app.
//!
//! This module provides:
//! - Keccak256 (transaction hash shown on screen, EVM signing digest)
//! - SHA-256 (native signing digest, node id checksum)
//! - A software signing engine over BIP32/secp256k1 for host builds
//!
//! # Security
//!
//! - Seeds and derived keys are zeroized on drop
//! - Signing uses k256's constant-time, low-S implementation
//! - On a device, [`SoftwareEngine`] is replaced by the secure element

use flrapp_common::{AppError, DerivationPath, EvmAddress};
use k256::{
    ecdsa::{SigningKey, VerifyingKey},
    elliptic_curve::sec1::ToEncodedPoint,
};
use sha2::{Digest, Sha256};
use tiny_keccak::{Hasher as KeccakHasher, Keccak};
use zeroize::Zeroize;

use crate::platform::{AddressReply, CryptoEngine, RecoverableSignature, SignKind};
use crate::print;

/// 32-byte digest.
pub type Hash256 = [u8; 32];

// =============================================================================
// Hashing
// =============================================================================

/// Keccak256 hash function as used by Ethereum.
pub fn keccak256(data: &[u8]) -> Hash256 {
    let mut hasher = Keccak::v256();
    hasher.update(data);
    let mut output = [0u8; 32];
    hasher.finalize(&mut output);
    output
}

/// SHA-256.
pub fn sha256(data: &[u8]) -> Hash256 {
    Sha256::digest(data).into()
}

// =============================================================================
// Key Derivation
// =============================================================================

/// Seed for key derivation.
#[derive(Zeroize)]
#[zeroize(drop)]
pub struct Seed([u8; 64]);

impl Seed {
    /// Create from bytes.
    pub fn from_bytes(bytes: &[u8; 64]) -> Self {
        Self(*bytes)
    }

    /// Get the underlying bytes.
    pub fn as_bytes(&self) -> &[u8; 64] {
        &self.0
    }
}

/// Development test seed (BIP39: "abandon abandon ... about").
///
/// WARNING: NEVER use this in production!
#[cfg(feature = "dev-mode")]
pub fn get_dev_seed() -> Seed {
    let seed_bytes: [u8; 64] = [
        0x5e, 0xb0, 0x0b, 0xbd, 0xdc, 0xf0, 0x69, 0x08, 0x48, 0x89, 0xa8, 0xab, 0x91, 0x55, 0x56,
        0x81, 0x65, 0xf5, 0xc4, 0x53, 0xcc, 0xb8, 0x5e, 0x70, 0x81, 0x1a, 0xae, 0xd6, 0xf6, 0xda,
        0x5f, 0xc1, 0x9a, 0x5a, 0xc4, 0x0b, 0x38, 0x9c, 0xd3, 0x70, 0xd0, 0x86, 0x20, 0x6d, 0xec,
        0x8a, 0xa6, 0xc4, 0x3d, 0xae, 0xa6, 0x69, 0x0f, 0x20, 0xad, 0x3d, 0x8d, 0x48, 0xb2, 0xd2,
        0xce, 0x9e, 0x38, 0xe4,
    ];
    Seed::from_bytes(&seed_bytes)
}

/// Derived extended key material.
struct DerivedKey {
    signing_key: SigningKey,
    chain_code: [u8; 32],
}

/// Derive a private key and chain code from seed along `path`.
fn derive(seed: &Seed, path: &DerivationPath) -> Result<DerivedKey, AppError> {
    use bip32::{ChildNumber, XPrv};

    let mut xprv = XPrv::new(seed.as_bytes()).map_err(|_| AppError::ExecutionError)?;

    for &component in path.as_slice() {
        let hardened = component & DerivationPath::HARDENED != 0;
        let child = ChildNumber::new(component & !DerivationPath::HARDENED, hardened)
            .map_err(|_| AppError::DataInvalid)?;
        xprv = xprv
            .derive_child(child)
            .map_err(|_| AppError::ExecutionError)?;
    }

    Ok(DerivedKey {
        signing_key: xprv.private_key().clone(),
        chain_code: xprv.attrs().chain_code,
    })
}

/// Derive the signing key for `path`.
pub fn derive_private_key(seed: &Seed, path: &DerivationPath) -> Result<SigningKey, AppError> {
    derive(seed, path).map(|k| k.signing_key)
}

/// Uncompressed SEC1 public key (65 bytes).
pub fn uncompressed_pubkey(key: &VerifyingKey) -> [u8; 65] {
    let encoded = key.to_encoded_point(false);
    let mut out = [0u8; 65];
    out.copy_from_slice(encoded.as_bytes());
    out
}

/// Compressed SEC1 public key (33 bytes).
pub fn compressed_pubkey(key: &VerifyingKey) -> [u8; 33] {
    let encoded = key.to_encoded_point(true);
    let mut out = [0u8; 33];
    out.copy_from_slice(encoded.as_bytes());
    out
}

/// EVM address: last 20 bytes of keccak256 over the uncompressed key
/// without its 0x04 prefix.
pub fn public_key_to_address(key: &VerifyingKey) -> EvmAddress {
    let uncompressed = uncompressed_pubkey(key);
    let hash = keccak256(&uncompressed[1..]);

    let mut address = [0u8; 20];
    address.copy_from_slice(&hash[12..]);
    address
}

/// Native address hash: the last 20 bytes of sha256 over the
/// compressed key.
pub fn native_address_hash(key: &VerifyingKey) -> [u8; 20] {
    let hash = sha256(&compressed_pubkey(key));
    let mut out = [0u8; 20];
    out.copy_from_slice(&hash[12..]);
    out
}

// =============================================================================
// Address Formatting
// =============================================================================

/// Format address with EIP-55 checksum.
pub fn format_address_checksummed(address: &EvmAddress) -> String {
    let hex_lower = hex::encode(address);
    let hash = keccak256(hex_lower.as_bytes());

    let mut result = String::with_capacity(42);
    result.push_str("0x");

    for (i, c) in hex_lower.chars().enumerate() {
        let hash_byte = hash[i / 2];
        let nibble = if i % 2 == 0 {
            hash_byte >> 4
        } else {
            hash_byte & 0x0F
        };

        if c.is_ascii_alphabetic() && nibble >= 8 {
            result.push(c.to_ascii_uppercase());
        } else {
            result.push(c);
        }
    }

    result
}

// =============================================================================
// Software Engine
// =============================================================================

/// Host signing engine backed by an in-memory seed.
pub struct SoftwareEngine {
    seed: Seed,
}

impl SoftwareEngine {
    /// Engine over `seed`.
    pub fn new(seed: Seed) -> Self {
        Self { seed }
    }

    /// Engine over the development seed.
    #[cfg(feature = "dev-mode")]
    pub fn dev() -> Self {
        log::warn!("SoftwareEngine: using the development seed");
        Self::new(get_dev_seed())
    }
}

impl CryptoEngine for SoftwareEngine {
    fn sign(
        &mut self,
        path: &DerivationPath,
        kind: SignKind,
        message: &[u8],
    ) -> Result<RecoverableSignature, AppError> {
        let digest = match kind {
            SignKind::EvmTransaction => keccak256(message),
            SignKind::NativeTransaction => sha256(message),
            SignKind::PreHashed => {
                message.try_into().map_err(|_| AppError::DataInvalid)?
            }
        };

        let key = derive_private_key(&self.seed, path)?;
        let (sig, recid) = key
            .sign_prehash_recoverable(&digest)
            .map_err(|_| AppError::SignVerifyError)?;

        let mut r = [0u8; 32];
        let mut s = [0u8; 32];
        r.copy_from_slice(&sig.r().to_bytes());
        s.copy_from_slice(&sig.s().to_bytes());

        Ok(RecoverableSignature {
            r,
            s,
            parity: recid.is_y_odd() as u8,
        })
    }

    fn evm_address(
        &mut self,
        path: &DerivationPath,
        with_chain_code: bool,
    ) -> Result<AddressReply, AppError> {
        let derived = derive(&self.seed, path)?;
        let verifying = derived.signing_key.verifying_key();
        let pubkey = uncompressed_pubkey(verifying);
        let address = public_key_to_address(verifying);
        let hex_address = hex::encode(address);

        let mut payload = Vec::with_capacity(1 + 65 + 1 + 40 + 32);
        payload.push(pubkey.len() as u8);
        payload.extend_from_slice(&pubkey);
        payload.push(hex_address.len() as u8);
        payload.extend_from_slice(hex_address.as_bytes());
        if with_chain_code {
            payload.extend_from_slice(&derived.chain_code);
        }

        Ok(AddressReply {
            payload,
            display: format_address_checksummed(&address),
        })
    }

    fn native_address(
        &mut self,
        path: &DerivationPath,
        hrp: &str,
    ) -> Result<AddressReply, AppError> {
        let key = derive_private_key(&self.seed, path)?;
        let verifying = key.verifying_key();
        let address = print::bech32_address(hrp, &native_address_hash(verifying))?;

        let mut payload = Vec::with_capacity(33 + address.len());
        payload.extend_from_slice(&compressed_pubkey(verifying));
        payload.extend_from_slice(address.as_bytes());

        Ok(AddressReply {
            payload,
            display: address,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hex_literal::hex;
    use k256::ecdsa::{RecoveryId, Signature};

    const ABANDON_SEED: [u8; 64] = hex!(
        "5eb00bbddcf069084889a8ab9155568165f5c453ccb85e70811aaed6f6da5fc1"
        "9a5ac40b389cd370d086206dec8aa6c43daea6690f20ad3d8d48b2d2ce9e38e4"
    );

    // Keccak256 test vectors from Ethereum
    #[test]
    fn test_keccak256_empty() {
        let hash = keccak256(b"");
        let expected = hex!("c5d2460186f7233c927e7db2dcc703c0e500b653ca82273b7bfad8045d85a470");
        assert_eq!(hash, expected);
    }

    #[test]
    fn test_sha256_abc() {
        let expected = hex!("ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad");
        assert_eq!(sha256(b"abc"), expected);
    }

    #[test]
    fn test_address_checksum() {
        // Standard EIP-55 test address
        let address = hex!("5aAeb6053F3E94C9b9A09f33669435E7Ef1BeAed");
        assert_eq!(
            format_address_checksummed(&address),
            "0x5aAeb6053F3E94C9b9A09f33669435E7Ef1BeAed"
        );
    }

    #[test]
    fn test_key_derivation() {
        let seed = Seed::from_bytes(&ABANDON_SEED);
        let key = derive_private_key(&seed, &DerivationPath::account(0, 0, 0)).unwrap();
        let address = public_key_to_address(key.verifying_key());

        // "abandon abandon ... about" at m/44'/60'/0'/0/0
        assert_eq!(address, hex!("9858EfFD232B4033E47d90003D41EC34EcaEda94"));
    }

    #[test]
    fn test_sign_recovers_to_derived_key() {
        let mut engine = SoftwareEngine::new(Seed::from_bytes(&ABANDON_SEED));
        let path = DerivationPath::account(0, 0, 0);
        let message = b"flare";

        let sig = engine.sign(&path, SignKind::EvmTransaction, message).unwrap();
        let signature = Signature::from_scalars(sig.r, sig.s).unwrap();
        let recid = RecoveryId::from_byte(sig.parity).unwrap();
        let recovered =
            VerifyingKey::recover_from_prehash(&keccak256(message), &signature, recid).unwrap();

        let seed = Seed::from_bytes(&ABANDON_SEED);
        let expected = derive_private_key(&seed, &path).unwrap();
        assert_eq!(&recovered, expected.verifying_key());
    }

    #[test]
    fn test_prehashed_requires_32_bytes() {
        let mut engine = SoftwareEngine::new(Seed::from_bytes(&ABANDON_SEED));
        let path = DerivationPath::account(0, 0, 0);
        assert_eq!(
            engine.sign(&path, SignKind::PreHashed, &[0u8; 31]).err(),
            Some(AppError::DataInvalid)
        );
        assert!(engine.sign(&path, SignKind::PreHashed, &[7u8; 32]).is_ok());
    }

    #[test]
    fn test_evm_address_reply_layout() {
        let mut engine = SoftwareEngine::new(Seed::from_bytes(&ABANDON_SEED));
        let path = DerivationPath::account(0, 0, 0);

        let reply = engine.evm_address(&path, false).unwrap();
        assert_eq!(reply.payload.len(), 1 + 65 + 1 + 40);
        assert_eq!(reply.payload[0], 65);
        assert_eq!(reply.payload[66], 40);
        assert_eq!(
            &reply.payload[67..],
            b"9858effd232b4033e47d90003d41ec34ecaeda94"
        );
        assert_eq!(reply.display, "0x9858EfFD232B4033E47d90003D41EC34EcaEda94");

        let with_code = engine.evm_address(&path, true).unwrap();
        assert_eq!(with_code.payload.len(), 1 + 65 + 1 + 40 + 32);
    }

    #[test]
    fn test_native_address_uses_hrp() {
        let mut engine = SoftwareEngine::new(Seed::from_bytes(&ABANDON_SEED));
        let reply = engine
            .native_address(&DerivationPath::account(0, 0, 0), "flare")
            .unwrap();
        assert!(reply.display.starts_with("flare1"));
        assert_eq!(&reply.payload[33..], reply.display.as_bytes());
    }
}

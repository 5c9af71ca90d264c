//! Platform abstraction layer.
//!
//! The transaction core drives two external collaborators:
//! - The review UI, which renders paginated items and later reports the
//!   user's decision back through [`crate::Dispatcher::complete_review`]
//! - The crypto engine, which derives keys and signs
//!
//! # Design
//!
//! Both are traits so the dispatcher can be exercised on the host with
//! [`MockPlatform`] and [`crate::crypto::SoftwareEngine`].

use flrapp_common::{AppError, DerivationPath};

use crate::display::DisplayItem;

/// What the review screen is asking the user to approve.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReviewKind {
    /// A transaction or digest to sign.
    Transaction,
    /// An address to confirm before it is returned.
    Address,
}

/// Read access to the items under review.
pub trait ItemSource {
    /// Number of items.
    fn num_items(&self) -> Result<u8, AppError>;

    /// Page `page` of item `idx`, split at `width` characters.
    fn item(&self, idx: u8, page: u8, width: usize) -> Result<DisplayItem, AppError>;
}

/// On-device UI and session services.
pub trait Platform {
    /// False while the device is locked (PIN not validated).
    fn is_ux_allowed(&self) -> bool;

    /// Puts a review on screen. The decision arrives later, exactly once.
    fn begin_review(&mut self, kind: ReviewKind, items: &dyn ItemSource) -> Result<(), AppError>;

    /// Show a brief info message (success/failure).
    fn show_info(&mut self, success: bool, message: &str);
}

/// How the engine turns the message into a digest.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignKind {
    /// keccak256 of an EVM transaction.
    EvmTransaction,
    /// sha256 of a native transaction.
    NativeTransaction,
    /// The message is already a 32-byte digest.
    PreHashed,
}

/// secp256k1 signature with its recovery parity.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RecoverableSignature {
    /// R component (32 bytes, big-endian).
    pub r: [u8; 32],
    /// S component (32 bytes, big-endian, low-S normalized).
    pub s: [u8; 32],
    /// 1 if the nonce point has an odd y coordinate.
    pub parity: u8,
}

/// Reply of an address request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AddressReply {
    /// Bytes returned to the host.
    pub payload: Vec<u8>,
    /// Address shown on the confirmation screen.
    pub display: String,
}

/// Key derivation and signing.
pub trait CryptoEngine {
    /// Signs `message` with the key at `path`.
    fn sign(
        &mut self,
        path: &DerivationPath,
        kind: SignKind,
        message: &[u8],
    ) -> Result<RecoverableSignature, AppError>;

    /// Uncompressed key and hex EVM address, optionally with chain code.
    fn evm_address(
        &mut self,
        path: &DerivationPath,
        with_chain_code: bool,
    ) -> Result<AddressReply, AppError>;

    /// Compressed key and bech32 address under `hrp`.
    fn native_address(&mut self, path: &DerivationPath, hrp: &str)
        -> Result<AddressReply, AppError>;
}

// =============================================================================
// Mock Platform (for host testing)
// =============================================================================

/// A review captured by [`MockPlatform`], pages joined back together.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedReview {
    pub kind: ReviewKind,
    pub items: Vec<(String, String)>,
}

impl RecordedReview {
    /// Item keys in display order.
    pub fn keys(&self) -> Vec<&str> {
        self.items.iter().map(|(k, _)| k.as_str()).collect()
    }

    /// Value of the first item named `key`.
    pub fn value(&self, key: &str) -> Option<&str> {
        self.items
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }
}

/// Mock platform for host-side testing.
pub struct MockPlatform {
    ux_allowed: bool,
    page_width: usize,
    reviews: Vec<RecordedReview>,
    infos: Vec<(bool, String)>,
}

impl MockPlatform {
    /// Unlocked device with a 20-character page width.
    pub fn new() -> Self {
        Self {
            ux_allowed: true,
            page_width: 20,
            reviews: Vec::new(),
            infos: Vec::new(),
        }
    }

    /// Locks or unlocks the mock device.
    pub fn set_ux_allowed(&mut self, allowed: bool) {
        self.ux_allowed = allowed;
    }

    /// Width used when paging item values.
    pub fn set_page_width(&mut self, width: usize) {
        self.page_width = width;
    }

    /// Reviews shown so far.
    pub fn reviews(&self) -> &[RecordedReview] {
        &self.reviews
    }

    /// Most recent review.
    pub fn last_review(&self) -> Option<&RecordedReview> {
        self.reviews.last()
    }

    /// Info messages shown so far.
    pub fn infos(&self) -> &[(bool, String)] {
        &self.infos
    }
}

impl Default for MockPlatform {
    fn default() -> Self {
        Self::new()
    }
}

impl Platform for MockPlatform {
    fn is_ux_allowed(&self) -> bool {
        self.ux_allowed
    }

    fn begin_review(&mut self, kind: ReviewKind, source: &dyn ItemSource) -> Result<(), AppError> {
        let mut items = Vec::new();
        for idx in 0..source.num_items()? {
            let first = source.item(idx, 0, self.page_width)?;
            let mut value = first.value;
            for page in 1..first.page_count {
                value.push_str(&source.item(idx, page, self.page_width)?.value);
            }
            log::debug!("[MOCK] {}: {}", first.key, value);
            items.push((first.key, value));
        }
        self.reviews.push(RecordedReview { kind, items });
        Ok(())
    }

    fn show_info(&mut self, success: bool, message: &str) {
        let icon = if success { "[OK]" } else { "[FAIL]" };
        log::info!("[MOCK] {} {}", icon, message);
        self.infos.push((success, message.to_string()));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct TwoItems;

    impl ItemSource for TwoItems {
        fn num_items(&self) -> Result<u8, AppError> {
            Ok(2)
        }

        fn item(&self, idx: u8, page: u8, width: usize) -> Result<DisplayItem, AppError> {
            let (key, value) = match idx {
                0 => ("Short", "abc"),
                1 => ("Long", "0123456789abcdef"),
                _ => return Err(AppError::NoData),
            };
            DisplayItem::paged(key, value, page, width)
        }
    }

    #[test]
    fn test_mock_joins_pages() {
        let mut platform = MockPlatform::new();
        platform.set_page_width(5);
        platform.begin_review(ReviewKind::Transaction, &TwoItems).unwrap();

        let review = platform.last_review().unwrap();
        assert_eq!(review.keys(), vec!["Short", "Long"]);
        assert_eq!(review.value("Long"), Some("0123456789abcdef"));
    }

    #[test]
    fn test_mock_records_info() {
        let mut platform = MockPlatform::new();
        platform.show_info(false, "Rejected");
        assert_eq!(platform.infos(), &[(false, "Rejected".to_string())]);
    }
}

//! Error codes and status words for the Flare signing app.
//!
//! Every command reply ends with a two-byte status word. Codes already in
//! the ISO 7816 `0x6xxx` range go out unchanged; the app's internal
//! codes are folded into `0x68xx` so a host only ever sees one family.

use core::fmt;
use num_derive::{FromPrimitive, ToPrimitive};

/// Two-byte status word appended to every reply.
pub type StatusWord = u16;

/// Error codes for the Flare signing app.
///
/// The discriminant is the internal code; use [`AppError::status_word`]
/// for the value that goes on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, FromPrimitive, ToPrimitive)]
#[repr(u16)]
pub enum AppError {
    /// Operation completed successfully (not an error).
    Success = 0x9000,

    // === Malformed command ===
    /// Command shorter than the fixed header.
    WrongLength = 0x6700,
    /// P1 or P2 outside the values the instruction accepts.
    InvalidP1P2 = 0x6B00,
    /// Unknown instruction byte.
    InsNotSupported = 0x6D00,
    /// Unknown class byte.
    ClaNotSupported = 0x6E00,
    /// Instruction is not available under this class.
    CommandNotAllowed = 0x6986,
    /// Device is locked; the PIN has not been validated.
    PinNotValidated = 0x6982,

    // === Protocol state ===
    /// Continuation chunk without a preceding first chunk.
    TxNotInitialized = 0x6987,
    /// A review is on screen; only get-version is served.
    ReviewPending = 0xA00A,

    // === Data validation ===
    /// Path, HRP or address request failed validation.
    DataInvalid = 0x6984,
    /// Nothing to parse or display.
    NoData = 0xA001,
    /// Declared length runs past the available bytes.
    UnexpectedBufferEnd = 0xA002,
    /// Field has an unexpected kind or value.
    UnexpectedValue = 0xA003,
    /// Bytes left over after the transaction list.
    TrailingData = 0xA004,
    /// Envelope or transaction shape is not supported.
    UnsupportedTx = 0xA005,
    /// Chain id is not one of the Flare networks.
    InvalidChainId = 0xA006,
    /// Signature placeholders are not empty: transaction already signed.
    InvalidRsValues = 0xA007,
    /// Numeric field does not fit its target width.
    ValueOutOfRange = 0xA008,
    /// RLP prefix could not be decoded.
    MalformedRlp = 0xA009,

    // === Resources ===
    /// Transaction buffer capacity exhausted.
    OutputBufferTooSmall = 0x6983,

    // === Policy ===
    /// Operation requires expert mode.
    BlindSigningDisabled = 0xA00B,
    /// User rejected the operation on the device.
    RejectedByUser = 0x6985,

    // === Engine ===
    /// The signing engine failed.
    SignVerifyError = 0x6F01,
    /// Unexpected internal failure.
    ExecutionError = 0x6400,

    // === Integrity ===
    /// Integrity canary mismatch; the app halts.
    IntegrityFailure = 0xA00F,
}

impl AppError {
    /// Returns the internal error code.
    #[inline]
    pub fn code(self) -> u16 {
        self as u16
    }

    /// Returns the status word sent to the host.
    #[inline]
    pub fn status_word(self) -> StatusWord {
        map_status_word(self.code())
    }

    /// Returns true if this represents success.
    #[inline]
    pub fn is_success(self) -> bool {
        matches!(self, AppError::Success)
    }

    /// Returns true if this is a user-initiated rejection.
    #[inline]
    pub fn is_user_rejection(self) -> bool {
        matches!(self, AppError::RejectedByUser)
    }

    /// Returns true if the app must stop serving commands.
    #[inline]
    pub fn is_fatal(self) -> bool {
        matches!(self, AppError::IntegrityFailure)
    }
}

/// Folds an internal code into the status-word space.
///
/// `0x9000` and anything in `0x6000..=0x6FFF` pass through; every other
/// code becomes `0x6800 | (code & 0x07FF)`.
pub const fn map_status_word(code: u16) -> StatusWord {
    if code == 0x9000 || code & 0xF000 == 0x6000 {
        code
    } else {
        0x6800 | (code & 0x07FF)
    }
}

impl Default for AppError {
    fn default() -> Self {
        AppError::Success
    }
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let msg = match self {
            AppError::Success => "No error",
            AppError::WrongLength => "Wrong length",
            AppError::InvalidP1P2 => "Invalid P1/P2",
            AppError::InsNotSupported => "Instruction not supported",
            AppError::ClaNotSupported => "Class not supported",
            AppError::CommandNotAllowed => "Command not allowed",
            AppError::PinNotValidated => "Security status not satisfied",
            AppError::TxNotInitialized => "Transaction not initialized",
            AppError::ReviewPending => "Review pending",
            AppError::DataInvalid => "Data invalid",
            AppError::NoData => "No data",
            AppError::UnexpectedBufferEnd => "Unexpected buffer end",
            AppError::UnexpectedValue => "Unexpected value",
            AppError::TrailingData => "Unexpected characters",
            AppError::UnsupportedTx => "Unsupported transaction",
            AppError::InvalidChainId => "Invalid chain id",
            AppError::InvalidRsValues => "Invalid rs values",
            AppError::ValueOutOfRange => "Value out of range",
            AppError::MalformedRlp => "Invalid rlp data",
            AppError::OutputBufferTooSmall => "Output buffer too small",
            AppError::BlindSigningDisabled => "Expert mode required",
            AppError::RejectedByUser => "Rejected by user",
            AppError::SignVerifyError => "Sign/verify error",
            AppError::ExecutionError => "Execution error",
            AppError::IntegrityFailure => "Integrity check failed",
        };
        f.write_str(msg)
    }
}

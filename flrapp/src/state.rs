//! Session state management.
//!
//! This module tracks the state of one signing session:
//! - The chunking dialect, instruction and derivation path set by the
//!   first chunk
//! - The phase of the command state machine
//! - Counters for debugging
//!
//! # Security
//!
//! - Any failure returns the session to `Idle` with `initialized = false`
//! - The derivation path is zeroized when the session is dropped or reset

use flrapp_common::{AppError, DerivationPath, Dialect, Ins};

/// Operation waiting for the user's decision.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Pending {
    /// EVM transaction; reply `v || r || s`.
    EvmSign,
    /// Native transaction; reply `r || s || parity`.
    NativeSign,
    /// Pre-hashed message; reply `r || s || parity`.
    SignHash,
    /// Address confirmation; the reply is already built.
    Address(Vec<u8>),
}

/// Where the command state machine stands.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum Phase {
    #[default]
    Idle,
    /// Chunks are being reassembled.
    Accumulating,
    /// A review is on screen.
    AwaitingApproval(Pending),
}

/// State of the current signing session.
#[derive(Debug, Default)]
pub struct Session {
    phase: Phase,
    dialect: Dialect,
    command: Option<Ins>,
    path: DerivationPath,
    initialized: bool,
}

impl Session {
    pub fn new() -> Self {
        Self::default()
    }

    /// Starts accumulating `command` chunks under `dialect` with the key
    /// at `path`.
    pub fn begin(&mut self, dialect: Dialect, command: Ins, path: DerivationPath) {
        log::debug!(
            "Session: begin {:?} session for {:?}, path depth {}",
            dialect,
            command,
            path.len()
        );
        self.dialect = dialect;
        self.command = Some(command);
        self.path = path;
        self.initialized = true;
        self.phase = Phase::Accumulating;
    }

    /// Forgets everything; back to `Idle`.
    pub fn reset(&mut self) {
        self.phase = Phase::Idle;
        self.command = None;
        self.path = DerivationPath::default();
        self.initialized = false;
    }

    /// Fails unless a first chunk of `command` under `dialect` has been
    /// accepted.
    pub fn require_initialized(&self, dialect: Dialect, command: Ins) -> Result<(), AppError> {
        if self.initialized && self.dialect == dialect && self.command == Some(command) {
            Ok(())
        } else {
            Err(AppError::TxNotInitialized)
        }
    }

    /// Reassembly is over; the path stays for signing.
    pub fn finish_accumulating(&mut self) {
        self.initialized = false;
    }

    /// Parks the session until the user decides.
    pub fn await_approval(&mut self, pending: Pending) {
        self.initialized = false;
        self.phase = Phase::AwaitingApproval(pending);
    }

    /// The parked operation, if a review is on screen.
    pub fn pending(&self) -> Option<&Pending> {
        match &self.phase {
            Phase::AwaitingApproval(pending) => Some(pending),
            _ => None,
        }
    }

    pub fn is_awaiting_approval(&self) -> bool {
        matches!(self.phase, Phase::AwaitingApproval(_))
    }

    pub fn is_initialized(&self) -> bool {
        self.initialized
    }

    pub fn phase(&self) -> &Phase {
        &self.phase
    }

    pub fn path(&self) -> &DerivationPath {
        &self.path
    }
}

/// Session statistics.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct Stats {
    /// Number of successful sign operations.
    pub signs_completed: u64,
    /// Number of rejected operations.
    pub signs_rejected: u64,
    /// Number of errors.
    pub errors: u64,
}

impl Stats {
    /// Record a successful signing operation.
    pub fn record_sign_success(&mut self) {
        self.signs_completed += 1;
    }

    /// Record a rejected operation.
    pub fn record_sign_rejected(&mut self) {
        self.signs_rejected += 1;
    }

    /// Record an error.
    pub fn record_error(&mut self) {
        self.errors += 1;
    }
}

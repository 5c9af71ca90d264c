//! Command handlers for the Flare app.
//!
//! [`Dispatcher::handle_apdu`] is the protocol entry point. Each command
//! is validated, routed to its handler and answered with a payload
//! followed by a two-byte status word. Signing commands arrive in chunks;
//! once the transaction is complete it is decoded, checked against the
//! signing policy and put on screen. The reply to the final chunk is
//! deferred until [`Dispatcher::complete_review`] reports the user's
//! decision.
//!
//! # Security
//!
//! - Every failure drops the session back to `Idle`
//! - An integrity canary is checked after each decode and validation
//!   step; a mismatch halts the dispatcher for good
//! - While a review is on screen only get-version is served

use flrapp_common::opcodes::p2;
use flrapp_common::{
    AppConfig, AppError, Cla, DerivationPath, Dialect, EvmChunk, Ins, NativeChunk, HASH_LEN,
    MAX_HRP_LEN, MIN_COMMAND_LEN, OFFSET_DATA,
};
use num_traits::FromPrimitive;

use crate::buffer::{MemoryFlash, NvStorage, TxBuffer};
use crate::display::{compute_v, AddressReview, HashReview, TxReview};
use crate::parsing::rlp::declared_tx_len;
use crate::parsing::EthTransaction;
use crate::platform::{AddressReply, CryptoEngine, Platform, ReviewKind, SignKind};
use crate::state::{Pending, Session, Stats};

/// Canary value; anything else means memory was corrupted.
const CANARY: u32 = 0x5AFE_C0DE;

/// Result of one command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ApduResponse {
    /// Payload followed by the status word.
    Reply(Vec<u8>),
    /// A review is on screen; the reply comes from
    /// [`Dispatcher::complete_review`].
    Deferred,
}

impl ApduResponse {
    /// Status word of an immediate reply.
    pub fn status_word(&self) -> Option<u16> {
        match self {
            ApduResponse::Reply(bytes) if bytes.len() >= 2 => {
                let n = bytes.len();
                Some(u16::from_be_bytes([bytes[n - 2], bytes[n - 1]]))
            }
            _ => None,
        }
    }

    /// Reply bytes before the status word.
    pub fn payload(&self) -> Option<&[u8]> {
        match self {
            ApduResponse::Reply(bytes) => Some(&bytes[..bytes.len().saturating_sub(2)]),
            ApduResponse::Deferred => None,
        }
    }

    pub fn is_deferred(&self) -> bool {
        matches!(self, ApduResponse::Deferred)
    }
}

/// A failed command: the error and whether its description goes back to
/// the host as payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Failure {
    error: AppError,
    describe: bool,
}

impl Failure {
    fn described(error: AppError) -> Self {
        Self {
            error,
            describe: true,
        }
    }
}

impl From<AppError> for Failure {
    fn from(error: AppError) -> Self {
        Self {
            error,
            describe: false,
        }
    }
}

fn check_canary(canary: u32) -> Result<(), AppError> {
    if canary == CANARY {
        Ok(())
    } else {
        log::error!("Dispatcher: integrity canary mismatch");
        Err(AppError::IntegrityFailure)
    }
}

/// Appends the status word for `status` to `payload`.
fn with_status(mut payload: Vec<u8>, status: AppError) -> Vec<u8> {
    payload.extend_from_slice(&status.status_word().to_be_bytes());
    payload
}

/// Command dispatcher and session state machine.
pub struct Dispatcher<P: Platform, E: CryptoEngine, N: NvStorage = MemoryFlash> {
    config: AppConfig,
    platform: P,
    engine: E,
    buffer: TxBuffer<N>,
    session: Session,
    stats: Stats,
    canary: u32,
    halted: bool,
}

impl<P: Platform, E: CryptoEngine> Dispatcher<P, E> {
    /// Dispatcher with the default buffer tiers.
    pub fn new(config: AppConfig, platform: P, engine: E) -> Self {
        Self::with_buffer(config, platform, engine, TxBuffer::new())
    }
}

impl<P: Platform, E: CryptoEngine, N: NvStorage> Dispatcher<P, E, N> {
    /// Dispatcher over a caller-provided transaction buffer.
    pub fn with_buffer(mut config: AppConfig, platform: P, engine: E, buffer: TxBuffer<N>) -> Self {
        config.test_mode |= cfg!(feature = "app-testing");
        Self {
            config,
            platform,
            engine,
            buffer,
            session: Session::new(),
            stats: Stats::default(),
            canary: CANARY,
            halted: false,
        }
    }

    /// Prepares the transaction buffer. Called once at boot.
    pub fn init(&mut self) -> Result<(), AppError> {
        self.buffer.initialize()?;
        self.session.reset();
        log::info!(
            "Dispatcher: ready, buffer capacity {} bytes",
            self.buffer.capacity()
        );
        Ok(())
    }

    // =========================================================================
    // Accessors
    // =========================================================================

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    /// Toggled from the settings menu.
    pub fn set_expert_mode(&mut self, enabled: bool) {
        log::info!("Dispatcher: expert mode {}", if enabled { "on" } else { "off" });
        self.config.expert_mode = enabled;
    }

    pub fn platform(&self) -> &P {
        &self.platform
    }

    pub fn platform_mut(&mut self) -> &mut P {
        &mut self.platform
    }

    pub fn engine(&self) -> &E {
        &self.engine
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    pub fn buffer(&self) -> &TxBuffer<N> {
        &self.buffer
    }

    pub fn stats(&self) -> &Stats {
        &self.stats
    }

    /// True once an integrity failure has stopped the dispatcher.
    pub fn is_halted(&self) -> bool {
        self.halted
    }

    // =========================================================================
    // Entry Points
    // =========================================================================

    /// Handles one command.
    pub fn handle_apdu(&mut self, apdu: &[u8]) -> ApduResponse {
        match self.dispatch(apdu) {
            Ok(ApduResponse::Reply(payload)) => {
                ApduResponse::Reply(with_status(payload, AppError::Success))
            }
            Ok(ApduResponse::Deferred) => ApduResponse::Deferred,
            Err(failure) => ApduResponse::Reply(self.fail(failure)),
        }
    }

    /// Delivers the user's decision on the review on screen and returns
    /// the reply to the command that started it.
    pub fn complete_review(&mut self, approved: bool) -> Vec<u8> {
        let Some(pending) = self.session.pending().cloned() else {
            log::warn!("Dispatcher: review decision without a pending review");
            return with_status(Vec::new(), AppError::CommandNotAllowed);
        };

        if !approved {
            log::info!("Dispatcher: {:?} rejected by user", pending);
            self.stats.record_sign_rejected();
            self.platform.show_info(false, "Rejected");
            self.reset_session();
            return with_status(Vec::new(), AppError::RejectedByUser);
        }

        let result = self.finish(&pending);
        self.reset_session();
        match result {
            Ok(payload) => {
                if !matches!(pending, Pending::Address(_)) {
                    self.stats.record_sign_success();
                    self.platform.show_info(true, "Signed");
                }
                with_status(payload, AppError::Success)
            }
            Err(error) => {
                log::warn!("Dispatcher: {:?} failed after approval: {}", pending, error);
                self.stats.record_error();
                self.platform.show_info(false, "Signing failed");
                with_status(Vec::new(), error)
            }
        }
    }

    // =========================================================================
    // Routing
    // =========================================================================

    fn dispatch(&mut self, apdu: &[u8]) -> Result<ApduResponse, Failure> {
        if self.halted {
            return Err(AppError::IntegrityFailure.into());
        }

        let cla = apdu.first().copied().ok_or(AppError::WrongLength)?;
        let cla = Cla::from_u8(cla).ok_or(AppError::ClaNotSupported)?;
        if apdu.len() < MIN_COMMAND_LEN {
            return Err(AppError::WrongLength.into());
        }

        let (ins, p1, p2) = (apdu[1], apdu[2], apdu[3]);
        let data = &apdu[OFFSET_DATA..];

        if self.session.is_awaiting_approval() && ins != Ins::GetVersion as u8 {
            return Err(AppError::ReviewPending.into());
        }

        // 0x02 is EVM get-address under the EVM class, native sign otherwise.
        if cla == Cla::Evm && ins == Ins::GET_ADDR_EVM {
            self.require_unlocked()?;
            return self.handle_get_addr_evm(p1, p2, data);
        }

        match Ins::from_u8(ins) {
            Some(Ins::GetVersion) => Ok(self.handle_get_version()),
            Some(Ins::GetAddr) => {
                self.require_unlocked()?;
                self.handle_get_addr(p1, data)
            }
            Some(Ins::Sign) => {
                self.require_unlocked()?;
                self.handle_sign(p1, data)
            }
            Some(Ins::SignHash) => {
                self.require_unlocked()?;
                self.handle_sign_hash(p1, data)
            }
            Some(Ins::SignEvm) => {
                self.require_unlocked()?;
                if cla != Cla::Evm {
                    return Err(AppError::CommandNotAllowed.into());
                }
                self.handle_sign_evm(p1, p2, data)
            }
            None => Err(AppError::InsNotSupported.into()),
        }
    }

    fn require_unlocked(&self) -> Result<(), AppError> {
        if self.platform.is_ux_allowed() {
            Ok(())
        } else {
            Err(AppError::PinNotValidated)
        }
    }

    /// Error reply; drops the session unless a review is still on screen.
    fn fail(&mut self, failure: Failure) -> Vec<u8> {
        let Failure { error, describe } = failure;
        log::warn!("Dispatcher: command failed: {} ({:#06x})", error, error.status_word());

        if error.is_fatal() {
            self.halted = true;
        }
        // A review on screen is only ended by the user's decision.
        if error.is_fatal() || !self.session.is_awaiting_approval() {
            self.reset_session();
        }
        self.stats.record_error();

        let payload = if describe {
            error.to_string().into_bytes()
        } else {
            Vec::new()
        };
        with_status(payload, error)
    }

    fn reset_session(&mut self) {
        self.session.reset();
        self.buffer.reset();
    }

    // =========================================================================
    // Version
    // =========================================================================

    fn handle_get_version(&self) -> ApduResponse {
        let reply = self.config.version.to_reply(
            self.config.test_mode,
            self.platform.is_ux_allowed(),
            self.config.target_id,
        );
        ApduResponse::Reply(reply.to_vec())
    }

    // =========================================================================
    // Addresses
    // =========================================================================

    /// `[hrp_len][hrp][5 x u32 LE path]`; P1 asks for on-screen confirmation.
    fn handle_get_addr(&mut self, p1: u8, data: &[u8]) -> Result<ApduResponse, Failure> {
        self.reset_session();

        let (&hrp_len, rest) = data.split_first().ok_or(AppError::DataInvalid)?;
        let hrp_len = hrp_len as usize;
        if hrp_len == 0 || hrp_len > MAX_HRP_LEN {
            return Err(AppError::DataInvalid.into());
        }
        let hrp = rest.get(..hrp_len).ok_or(AppError::DataInvalid)?;
        let hrp = core::str::from_utf8(hrp).map_err(|_| AppError::DataInvalid)?;
        let (path, _) = DerivationPath::from_native_bytes(&rest[hrp_len..])?;

        let reply = self.engine.native_address(&path, hrp).map_err(|e| {
            log::warn!("Dispatcher: native address fill failed: {}", e);
            AppError::DataInvalid
        })?;
        self.confirm_address(p1 != 0, reply)
    }

    /// `[n][n x u32 BE path]`; P1 asks for confirmation, P2 for the chain code.
    fn handle_get_addr_evm(&mut self, p1: u8, p2: u8, data: &[u8]) -> Result<ApduResponse, Failure> {
        self.reset_session();

        let (path, _) = DerivationPath::from_evm_bytes(data)?;
        let with_chain_code = match p2 {
            p2::NO_CHAIN_CODE => false,
            p2::CHAIN_CODE => true,
            _ => return Err(AppError::InvalidP1P2.into()),
        };

        let reply = self.engine.evm_address(&path, with_chain_code).map_err(|e| {
            log::warn!("Dispatcher: EVM address fill failed: {}", e);
            AppError::DataInvalid
        })?;
        self.confirm_address(p1 != 0, reply)
    }

    fn confirm_address(&mut self, confirm: bool, reply: AddressReply) -> Result<ApduResponse, Failure> {
        if !confirm {
            return Ok(ApduResponse::Reply(reply.payload));
        }
        self.platform
            .begin_review(ReviewKind::Address, &AddressReview::new(&reply.display))?;
        self.session.await_approval(Pending::Address(reply.payload));
        Ok(ApduResponse::Deferred)
    }

    // =========================================================================
    // Chunk Reassembly
    // =========================================================================

    fn append_exact(&mut self, data: &[u8]) -> Result<(), AppError> {
        if self.buffer.append(data) == data.len() {
            Ok(())
        } else {
            Err(AppError::OutputBufferTooSmall)
        }
    }

    /// Init / Add / Last for `ins`. Returns true once the transaction is
    /// complete.
    fn process_native_chunk(&mut self, ins: Ins, p1: u8, data: &[u8]) -> Result<bool, AppError> {
        match NativeChunk::from_u8(p1).ok_or(AppError::InvalidP1P2)? {
            NativeChunk::Init => {
                self.reset_session();
                let (path, _) = DerivationPath::from_native_bytes(data)?;
                self.session.begin(Dialect::Native, ins, path);
                Ok(false)
            }
            NativeChunk::Add => {
                self.session.require_initialized(Dialect::Native, ins)?;
                self.append_exact(data)?;
                Ok(false)
            }
            NativeChunk::Last => {
                self.session.require_initialized(Dialect::Native, ins)?;
                self.append_exact(data)?;
                self.session.finish_accumulating();
                Ok(true)
            }
        }
    }

    /// First / More. The total length comes from the RLP header at the
    /// head of the transaction; bytes past it are ignored.
    fn process_evm_chunk(&mut self, p1: u8, p2: u8, data: &[u8]) -> Result<bool, AppError> {
        if p2 != 0 {
            return Err(AppError::InvalidP1P2);
        }

        match EvmChunk::from_u8(p1).ok_or(AppError::InvalidP1P2)? {
            EvmChunk::First => {
                self.reset_session();
                let (path, used) = DerivationPath::from_evm_bytes(data)?;
                let tx = &data[used..];

                let total = declared_tx_len(tx).map_err(|_| AppError::MalformedRlp)?;
                let take = total.min(tx.len());
                self.append_exact(&tx[..take])?;
                self.session.begin(Dialect::Evm, Ins::SignEvm, path);

                Ok(take >= total)
            }
            EvmChunk::More => {
                self.session.require_initialized(Dialect::Evm, Ins::SignEvm)?;

                let total = declared_tx_len(self.buffer.view()).map_err(|_| AppError::MalformedRlp)?;
                let missing = total.saturating_sub(self.buffer.len());
                let take = missing.min(data.len());
                self.append_exact(&data[..take])?;

                Ok(take >= missing)
            }
        }
    }

    // =========================================================================
    // Signing
    // =========================================================================

    fn handle_sign(&mut self, p1: u8, data: &[u8]) -> Result<ApduResponse, Failure> {
        if !self.process_native_chunk(Ins::Sign, p1, data)? {
            return Ok(ApduResponse::Reply(Vec::new()));
        }
        self.review_transaction(Pending::NativeSign)
    }

    fn handle_sign_evm(&mut self, p1: u8, p2: u8, data: &[u8]) -> Result<ApduResponse, Failure> {
        if !self.process_evm_chunk(p1, p2, data)? {
            return Ok(ApduResponse::Reply(Vec::new()));
        }
        self.review_transaction(Pending::EvmSign)
    }

    fn handle_sign_hash(&mut self, p1: u8, data: &[u8]) -> Result<ApduResponse, Failure> {
        if !self.process_native_chunk(Ins::SignHash, p1, data)? {
            return Ok(ApduResponse::Reply(Vec::new()));
        }

        if !self.config.expert_mode {
            self.platform.show_info(false, "Expert Mode Required");
            return Err(AppError::BlindSigningDisabled.into());
        }

        let hash = self.buffer.view();
        if hash.is_empty() {
            return Err(Failure::described(AppError::NoData));
        }
        if hash.len() != HASH_LEN {
            return Err(Failure::described(AppError::UnexpectedBufferEnd));
        }
        check_canary(self.canary)?;

        self.platform
            .begin_review(ReviewKind::Transaction, &HashReview::new(hash))?;
        self.session.await_approval(Pending::SignHash);
        Ok(ApduResponse::Deferred)
    }

    /// Decodes the reassembled transaction, applies the signing policy and
    /// puts the review on screen.
    fn review_transaction(&mut self, pending: Pending) -> Result<ApduResponse, Failure> {
        check_canary(self.canary)?;

        let buf = self.buffer.view();
        let tx = EthTransaction::parse(buf).map_err(|e| Failure::described(e.into()))?;
        check_canary(self.canary)?;

        let review =
            TxReview::new(&tx, buf, self.config.expert_mode).map_err(Failure::described)?;
        check_canary(self.canary)?;

        log::info!(
            "Dispatcher: reviewing {:?} transaction ({} bytes, {:?} layout)",
            tx.tx_type(),
            buf.len(),
            review.mode()
        );
        self.platform.begin_review(ReviewKind::Transaction, &review)?;
        self.session.await_approval(pending);
        Ok(ApduResponse::Deferred)
    }

    /// Builds the reply of an approved operation.
    fn finish(&mut self, pending: &Pending) -> Result<Vec<u8>, AppError> {
        let path = self.session.path();
        let message = self.buffer.view();

        match pending {
            Pending::Address(payload) => Ok(payload.clone()),
            Pending::EvmSign => {
                let tx = EthTransaction::parse(message).map_err(AppError::from)?;
                let sig = self.engine.sign(path, SignKind::EvmTransaction, message)?;

                let mut out = Vec::with_capacity(65);
                out.push(compute_v(&tx, sig.parity));
                out.extend_from_slice(&sig.r);
                out.extend_from_slice(&sig.s);
                Ok(out)
            }
            Pending::NativeSign | Pending::SignHash => {
                let kind = if *pending == Pending::SignHash {
                    SignKind::PreHashed
                } else {
                    SignKind::NativeTransaction
                };
                let sig = self.engine.sign(path, kind, message)?;

                let mut out = Vec::with_capacity(65);
                out.extend_from_slice(&sig.r);
                out.extend_from_slice(&sig.s);
                out.push(sig.parity);
                Ok(out)
            }
        }
    }
}

//! Two-tier append-only transaction buffer.
//!
//! Chunks land in a fast RAM tier first. When an append would overflow
//! it, the RAM contents move into the larger persistent tier and every
//! later append goes there, so readers always see one contiguous slice.
//!
//! # Security
//!
//! - An append is all-or-nothing: a short store reports 0 bytes
//! - The persistent tier commits whole blocks, never a torn write
//! - Nothing outside this module can grow the logical length

use flrapp_common::{AppError, NV_BLOCK_SIZE, NV_TIER_SIZE, RAM_TIER_SIZE};

/// Block-addressed persistent storage behind the overflow tier.
///
/// Implementations write whole blocks; a failed write must leave the
/// previously committed contents untouched.
pub trait NvStorage {
    /// Total bytes addressable.
    fn capacity(&self) -> usize;

    /// Writes `data` at `offset`.
    fn write(&mut self, offset: usize, data: &[u8]) -> Result<(), AppError>;

    /// The committed contents, `capacity()` bytes long.
    fn contents(&self) -> &[u8];

    /// Clears the region.
    fn erase(&mut self) -> Result<(), AppError>;
}

/// In-memory flash model with block-granular commits.
pub struct MemoryFlash {
    data: Vec<u8>,
    block_size: usize,
    blocks_written: usize,
}

impl MemoryFlash {
    /// Creates a region of `capacity` bytes written in `block_size` units.
    pub fn new(capacity: usize, block_size: usize) -> Self {
        Self {
            data: vec![0u8; capacity],
            block_size: block_size.max(1),
            blocks_written: 0,
        }
    }

    /// Number of block programs issued so far.
    pub fn blocks_written(&self) -> usize {
        self.blocks_written
    }
}

impl Default for MemoryFlash {
    fn default() -> Self {
        Self::new(NV_TIER_SIZE, NV_BLOCK_SIZE)
    }
}

impl NvStorage for MemoryFlash {
    fn capacity(&self) -> usize {
        self.data.len()
    }

    fn write(&mut self, offset: usize, data: &[u8]) -> Result<(), AppError> {
        let end = offset
            .checked_add(data.len())
            .filter(|&end| end <= self.data.len())
            .ok_or(AppError::OutputBufferTooSmall)?;
        if data.is_empty() {
            return Ok(());
        }

        // Stage every touched block before committing any of them.
        let first = offset / self.block_size;
        let last = (end - 1) / self.block_size;
        let span_start = first * self.block_size;
        let span_end = ((last + 1) * self.block_size).min(self.data.len());

        let mut staged = self.data[span_start..span_end].to_vec();
        staged[offset - span_start..end - span_start].copy_from_slice(data);

        self.data[span_start..span_end].copy_from_slice(&staged);
        self.blocks_written += last - first + 1;
        Ok(())
    }

    fn contents(&self) -> &[u8] {
        &self.data
    }

    fn erase(&mut self) -> Result<(), AppError> {
        self.data.fill(0);
        Ok(())
    }
}

/// Which tier currently holds the logical contents.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Tier {
    Ram,
    Nv,
}

/// Append-only transaction buffer over a RAM tier and a persistent tier.
pub struct TxBuffer<N: NvStorage = MemoryFlash> {
    ram: Vec<u8>,
    ram_capacity: usize,
    nv: N,
    tier: Tier,
    len: usize,
}

impl TxBuffer<MemoryFlash> {
    /// Buffer with the default tier sizes.
    pub fn new() -> Self {
        Self::with_storage(RAM_TIER_SIZE, MemoryFlash::default())
    }
}

impl Default for TxBuffer<MemoryFlash> {
    fn default() -> Self {
        Self::new()
    }
}

impl<N: NvStorage> TxBuffer<N> {
    /// Buffer with a RAM tier of `ram_capacity` bytes over `nv`.
    pub fn with_storage(ram_capacity: usize, nv: N) -> Self {
        Self {
            ram: Vec::with_capacity(ram_capacity),
            ram_capacity,
            nv,
            tier: Tier::Ram,
            len: 0,
        }
    }

    /// Prepares both tiers. Called once per boot or storage reset.
    pub fn initialize(&mut self) -> Result<(), AppError> {
        self.nv.erase()?;
        self.reset();
        Ok(())
    }

    /// Drops the current contents; starts a new session.
    pub fn reset(&mut self) {
        self.ram.clear();
        self.tier = Tier::Ram;
        self.len = 0;
    }

    /// Appends `data` and returns the number of bytes stored.
    ///
    /// The result is either `data.len()` or 0; a short store leaves the
    /// buffer unchanged and the caller must abandon the session.
    pub fn append(&mut self, data: &[u8]) -> usize {
        let Some(new_len) = self.len.checked_add(data.len()) else {
            return 0;
        };

        if self.tier == Tier::Ram && new_len <= self.ram_capacity {
            self.ram.extend_from_slice(data);
            self.len = new_len;
            return data.len();
        }

        if new_len > self.nv.capacity() {
            log::warn!(
                "TxBuffer: append of {} bytes exceeds capacity ({} stored)",
                data.len(),
                self.len
            );
            return 0;
        }

        if self.tier == Tier::Ram {
            if self.nv.write(0, &self.ram).is_err() {
                return 0;
            }
            log::debug!("TxBuffer: moved {} bytes to persistent tier", self.len);
            self.ram.clear();
            self.tier = Tier::Nv;
        }

        if self.nv.write(self.len, data).is_err() {
            return 0;
        }
        self.len = new_len;
        data.len()
    }

    /// Logical length in bytes.
    #[inline]
    pub fn len(&self) -> usize {
        self.len
    }

    /// Returns true if nothing has been appended since the last reset.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Largest logical length the buffer can hold.
    pub fn capacity(&self) -> usize {
        self.nv.capacity().max(self.ram_capacity)
    }

    /// Contiguous view of everything appended since the last reset.
    pub fn view(&self) -> &[u8] {
        match self.tier {
            Tier::Ram => &self.ram[..self.len],
            Tier::Nv => &self.nv.contents()[..self.len],
        }
    }

    /// Access to the persistent tier.
    pub fn storage(&self) -> &N {
        &self.nv
    }
}

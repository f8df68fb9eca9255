//! Configuration options for NoFS engine operations.

use crate::layout::SECTOR_SIZE;

/// Default upper bound for a device to be considered a removable card.
pub const DEFAULT_MAX_DEVICE_SIZE: u64 = 64 * 1024 * 1024 * 1024;

/// Default transfer chunk size.
pub const DEFAULT_CHUNK_SIZE: usize = 64 * 1024;

/// Options for controlling device selection and transfers.
#[derive(Debug, Clone)]
pub struct Options {
    /// Largest device size, in bytes, the locator accepts as a card.
    ///
    /// Devices above this size are rejected during automatic selection,
    /// protecting large internal or external drives.
    pub max_device_size: u64,

    /// Accept devices that are not flagged removable.
    ///
    /// Some USB card readers report their slot as a fixed disk. When
    /// disabled (default), such devices are rejected.
    pub allow_fixed: bool,

    /// Size of each read or write issued to the device.
    ///
    /// Always a non-zero multiple of the NoFS sector size.
    pub chunk_size: usize,

    /// Number of consecutive sentinel bytes that end the logical stream.
    ///
    /// The existing logger firmware terminates with a single byte, which is
    /// the default. Never less than one.
    pub sentinel_run: usize,

    /// Fill the whole data region with the erase pattern on initialization.
    ///
    /// When disabled (default), only the first data block is written, which
    /// is enough to make the card decode as empty. Pre-filling a large card
    /// can take a long time.
    pub prefill: bool,

    /// Allow erasing a device that carries no NoFS header.
    ///
    /// The erase then covers the whole device. DANGEROUS.
    pub force: bool,

    /// Dry run mode - skip actual device writes.
    ///
    /// When enabled, initialize and erase open the device read-only,
    /// compute and log the ranges they would write, and return without
    /// touching the device.
    pub dry_run: bool,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            max_device_size: DEFAULT_MAX_DEVICE_SIZE,
            allow_fixed: false,
            chunk_size: DEFAULT_CHUNK_SIZE,
            sentinel_run: 1,
            prefill: false,
            force: false,
            dry_run: false,
        }
    }
}

impl Options {
    /// Create a new Options with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the largest device size accepted by automatic selection.
    pub fn with_max_device_size(mut self, bytes: u64) -> Self {
        self.max_device_size = bytes;
        self
    }

    /// Accept or reject devices not flagged removable.
    pub fn with_allow_fixed(mut self, allow: bool) -> Self {
        self.allow_fixed = allow;
        self
    }

    /// Set the transfer chunk size.
    ///
    /// The value is rounded up to a multiple of the sector size.
    pub fn with_chunk_size(mut self, bytes: usize) -> Self {
        let sectors = bytes.div_ceil(SECTOR_SIZE).max(1);
        self.chunk_size = sectors * SECTOR_SIZE;
        self
    }

    /// Set the sentinel run length (clamped to at least one byte).
    pub fn with_sentinel_run(mut self, run: usize) -> Self {
        self.sentinel_run = run.max(1);
        self
    }

    /// Enable or disable pre-filling the data region on initialization.
    pub fn with_prefill(mut self, prefill: bool) -> Self {
        self.prefill = prefill;
        self
    }

    /// Enable or disable erasing devices without a NoFS header.
    pub fn with_force(mut self, force: bool) -> Self {
        self.force = force;
        self
    }

    /// Enable or disable dry run mode.
    pub fn with_dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }
}

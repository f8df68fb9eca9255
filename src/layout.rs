//! NoFS on-card layout.
//!
//! ```text
//! offset 0        512                              512 + L or device end
//! +---------------+--------------------------------+
//! | header block  | data region                    |
//! +---------------+--------------------------------+
//! ```
//!
//! Header block (512 bytes):
//!
//! | bytes  | content                                              |
//! |--------|------------------------------------------------------|
//! | 0..7   | magic `k621.de`                                      |
//! | 7      | `0x03`, the legacy terminal byte                     |
//! | 8      | format version (`0` legacy, `1` current)             |
//! | 9..16  | reserved, zero                                       |
//! | 16..24 | declared data-region length, little-endian, 0 = none |
//! | 24..   | zero                                                 |
//!
//! Legacy cards (version byte `0`, or any byte other than `0x03` right
//! after the magic) have no header fields: the data region starts at byte 7
//! of block 0, directly after the magic, and is always sentinel-terminated.
//! The legacy initializer put the terminal byte there, so a fresh legacy card
//! decodes as empty; firmware overwrites it with payload.
//!
//! The logical stream is the data region up to the first run of
//! [`SENTINEL`] bytes, further limited by the declared length when present.
//! The erase pattern is the sentinel byte itself, so erased space always
//! decodes as end-of-data.

use crate::error::{Error, Result};
use std::path::Path;

/// Size of the header block and the unit all transfers are aligned to.
pub const SECTOR_SIZE: usize = 512;

/// Byte offset of the data region on current-version cards.
pub const DATA_START: u64 = SECTOR_SIZE as u64;

/// Signature at the start of every NoFS card.
pub const MAGIC: &[u8; 7] = b"k621.de";

/// End-of-data marker and erase fill value (ASCII ETX).
pub const SENTINEL: u8 = 0x03;

/// Erase pattern byte; identical to the sentinel.
pub const ERASE_BYTE: u8 = SENTINEL;

/// Byte offset of the data region on legacy cards.
pub const LEGACY_DATA_START: u64 = 7;

/// Newest header version this crate reads and the one it writes.
pub const CURRENT_VERSION: u8 = 1;

/// Smallest device that can hold a header and one data block.
pub const MIN_DEVICE_SIZE: u64 = 2 * SECTOR_SIZE as u64;

const VERSION_OFFSET: usize = 8;
const LENGTH_OFFSET: usize = 16;

/// Decoded header block.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Header {
    pub version: u8,
    /// Declared data-region length in bytes; `None` when sentinel-terminated.
    pub region_length: Option<u64>,
    /// Byte offset where the data region begins.
    pub data_start: u64,
}

impl Header {
    /// Header written when initializing a card.
    pub fn fresh() -> Self {
        Self {
            version: CURRENT_VERSION,
            region_length: None,
            data_start: DATA_START,
        }
    }

    /// Header with a declared data-region length.
    pub fn bounded(length: u64) -> Self {
        Self {
            version: CURRENT_VERSION,
            region_length: Some(length),
            data_start: DATA_START,
        }
    }

    /// Encode into a full header block.
    pub fn encode(&self) -> [u8; SECTOR_SIZE] {
        let mut block = [0u8; SECTOR_SIZE];
        block[..MAGIC.len()].copy_from_slice(MAGIC);
        block[MAGIC.len()] = SENTINEL;
        block[VERSION_OFFSET] = self.version;
        let length = self.region_length.unwrap_or(0);
        block[LENGTH_OFFSET..LENGTH_OFFSET + 8].copy_from_slice(&length.to_le_bytes());
        block
    }

    /// Validate and decode a header block read from `path`.
    ///
    /// A block without the magic is never treated as an empty card.
    pub fn decode(path: &Path, block: &[u8]) -> Result<Self> {
        if !has_magic(block) || block.len() < SECTOR_SIZE {
            return Err(Error::NotNoFsFormatted(path.to_path_buf()));
        }

        let version = block[VERSION_OFFSET];
        if block[MAGIC.len()] != SENTINEL || version == 0 {
            return Ok(Self::legacy());
        }
        if version > CURRENT_VERSION {
            return Err(Error::UnsupportedVersion {
                found: version,
                supported: CURRENT_VERSION,
            });
        }

        let mut raw = [0u8; 8];
        raw.copy_from_slice(&block[LENGTH_OFFSET..LENGTH_OFFSET + 8]);
        let region_length = match u64::from_le_bytes(raw) {
            0 => None,
            n => Some(n),
        };

        Ok(Self {
            version,
            region_length,
            data_start: DATA_START,
        })
    }

    /// Layout of a card written by the legacy tool and firmware.
    pub fn legacy() -> Self {
        Self {
            version: 0,
            region_length: None,
            data_start: LEGACY_DATA_START,
        }
    }

    /// Whether the data region starts inside the header block.
    pub fn is_legacy(&self) -> bool {
        self.data_start < DATA_START
    }

    /// Physical byte range of the data region on a device of `device_size`.
    pub fn region(&self, path: &Path, device_size: u64) -> Result<Region> {
        region_for(path, self.data_start, self.region_length, device_size)
    }
}

/// Whether `block` starts with the NoFS signature.
pub fn has_magic(block: &[u8]) -> bool {
    block.starts_with(MAGIC)
}

/// Half-open physical byte range `[start, end)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Region {
    pub start: u64,
    pub end: u64,
}

impl Region {
    pub fn len(&self) -> u64 {
        self.end - self.start
    }

    pub fn is_empty(&self) -> bool {
        self.start == self.end
    }
}

/// Data-region bounds starting at `start` for an optional declared length.
pub fn region_for(path: &Path, start: u64, declared: Option<u64>, device_size: u64) -> Result<Region> {
    if device_size < MIN_DEVICE_SIZE {
        return Err(Error::DeviceTooSmall {
            size: device_size,
            required: MIN_DEVICE_SIZE,
        });
    }

    match declared {
        None => Ok(Region {
            start,
            end: device_size,
        }),
        Some(length) => match start.checked_add(length) {
            Some(end) if end <= device_size => Ok(Region { start, end }),
            _ => Err(Error::OutOfRange {
                path: path.to_path_buf(),
                offset: start,
                length,
                size: device_size,
            }),
        },
    }
}

/// Incremental end-of-data detector.
///
/// Chunks are fed strictly in order. Sentinel bytes that might begin the
/// terminating run are held back until the run either completes (end of
/// data) or is broken by payload (they were payload after all).
#[derive(Debug, Clone)]
pub struct SentinelScanner {
    run: usize,
    pending: usize,
    done: bool,
}

impl SentinelScanner {
    pub fn new(run: usize) -> Self {
        Self {
            run: run.max(1),
            pending: 0,
            done: false,
        }
    }

    pub fn is_done(&self) -> bool {
        self.done
    }

    /// Consume `chunk`, appending payload bytes to `out`.
    ///
    /// Returns `true` once the terminating run has been seen; bytes after it
    /// are ignored, and so are all later chunks.
    pub fn feed(&mut self, mut chunk: &[u8], out: &mut Vec<u8>) -> bool {
        while !self.done && !chunk.is_empty() {
            let lead = chunk
                .iter()
                .position(|&b| b != SENTINEL)
                .unwrap_or(chunk.len());

            if lead > 0 {
                if self.pending + lead >= self.run {
                    self.done = true;
                    break;
                }
                self.pending += lead;
                chunk = &chunk[lead..];
                continue;
            }

            self.flush_pending(out);
            let payload = chunk
                .iter()
                .position(|&b| b == SENTINEL)
                .unwrap_or(chunk.len());
            out.extend_from_slice(&chunk[..payload]);
            chunk = &chunk[payload..];
        }
        self.done
    }

    /// Signal the physical end of the region.
    ///
    /// An incomplete run held back so far is payload.
    pub fn finish(&mut self, out: &mut Vec<u8>) {
        if !self.done {
            self.flush_pending(out);
            self.done = true;
        }
    }

    fn flush_pending(&mut self, out: &mut Vec<u8>) {
        out.extend(std::iter::repeat(SENTINEL).take(self.pending));
        self.pending = 0;
    }
}

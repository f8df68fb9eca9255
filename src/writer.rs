//! Card initialization.
//!
//! Writing is not safe to interrupt: a card whose initialization was cut
//! short is in an unknown state and must be initialized again.

use crate::device::{Access, DeviceHandle};
use crate::error::Result;
use crate::layout::{self, Header, Region, DATA_START, ERASE_BYTE, SECTOR_SIZE};
use crate::options::Options;
use crate::state::State;

use std::path::Path;
use tracing::{info, warn};

/// Lay down a fresh NoFS structure on the device at `path`.
///
/// The header declares an unbounded, sentinel-terminated region and the
/// first data block is filled with the erase pattern, so the card decodes
/// as an empty stream. With [`Options::prefill`] the whole data region is
/// filled, making the card indistinguishable from an erased one.
pub fn initialize(path: &Path, options: &Options) -> Result<State> {
    let access = if options.dry_run { Access::Read } else { Access::Write };
    let handle = DeviceHandle::open(path, access)?;

    let region = layout::region_for(path, DATA_START, None, handle.size())?;
    let fill = if options.prefill {
        region
    } else {
        Region {
            start: region.start,
            end: region.start + SECTOR_SIZE as u64,
        }
    };
    let total = SECTOR_SIZE as u64 + fill.len();

    if options.dry_run {
        info!(device = %path.display(), bytes = total, "dry run: would initialize NoFS");
        return Ok(State::new(path.to_path_buf(), total, true, true));
    }

    info!(device = %path.display(), prefill = options.prefill, "initializing NoFS");
    let result = write_initial(&handle, fill, options.chunk_size).and_then(|()| handle.close());
    if let Err(e) = &result {
        warn!(device = %path.display(), error = %e, "initialization failed, card state unknown");
    }
    result?;

    info!(device = %path.display(), bytes = total, "device initialized");
    Ok(State::new(path.to_path_buf(), total, true, false))
}

fn write_initial(handle: &DeviceHandle, fill: Region, chunk_size: usize) -> Result<()> {
    // Data first, header last: the card only claims to be NoFS once its
    // data region already reads as empty.
    fill_region(handle, fill, ERASE_BYTE, chunk_size)?;
    handle.write_at(0, &Header::fresh().encode())
}

/// Overwrite `region` with `byte` in chunks of `chunk_size`.
pub(crate) fn fill_region(handle: &DeviceHandle, region: Region, byte: u8, chunk_size: usize) -> Result<()> {
    let pattern = vec![byte; chunk_size];
    let mut offset = region.start;
    while offset < region.end {
        let length = (region.end - offset).min(chunk_size as u64) as usize;
        handle.write_at(offset, &pattern[..length])?;
        offset += length as u64;
    }
    Ok(())
}

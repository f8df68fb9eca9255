//! Card erasure.
//!
//! Erasing overwrites the physical data region, not just the logical
//! stream. If an erase fails part way the card status is unknown: do not
//! assume the original data is intact, and do not interrupt an erase in
//! progress.

use crate::device::{Access, DeviceHandle};
use crate::error::{Error, Result};
use crate::layout::{self, Header, Region, DATA_START, ERASE_BYTE, SECTOR_SIZE};
use crate::options::Options;
use crate::reader::decode_header;
use crate::state::State;
use crate::writer::fill_region;

use std::path::Path;
use tracing::{info, warn};

/// Which parts of the card an erase overwrites.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EraseMode {
    /// Overwrite the data region only; the card stays NoFS-formatted and
    /// decodes as empty.
    KeepHeader,
    /// Overwrite the header block as well; the card no longer reads as NoFS.
    WipeHeader,
}

/// Overwrite the card at `path` with the erase pattern.
///
/// The region bounds come from the header: the declared length when there
/// is one, otherwise the rest of the device. A device without a valid
/// header is refused unless [`Options::force`] is set, in which case the
/// whole device after the header block is erased.
///
/// A legacy card is upgraded: its data region moves behind a current
/// header block, so a kept header decodes as an empty stream afterwards.
pub fn erase(path: &Path, mode: EraseMode, options: &Options) -> Result<State> {
    let access = if options.dry_run { Access::Read } else { Access::Write };
    let handle = DeviceHandle::open(path, access)?;

    let mut upgrade = false;
    let region = match decode_header(&handle) {
        Ok(header) if header.is_legacy() => {
            info!(device = %path.display(), "legacy card, erase rewrites the header block");
            upgrade = true;
            layout::region_for(path, DATA_START, None, handle.size())?
        }
        Ok(header) => header.region(path, handle.size())?,
        Err(e @ (Error::NotNoFsFormatted(_) | Error::UnsupportedVersion { .. })) => {
            if !options.force {
                return Err(e);
            }
            warn!(device = %path.display(), error = %e, "forcing erase of device without a usable NoFS header");
            layout::region_for(path, DATA_START, None, handle.size())?
        }
        Err(e) => return Err(e),
    };

    let wipe_header = mode == EraseMode::WipeHeader;
    let header_written = wipe_header || upgrade;
    let total = region.len() + if header_written { SECTOR_SIZE as u64 } else { 0 };

    if options.dry_run {
        info!(device = %path.display(), ?mode, bytes = total, "dry run: would erase");
        return Ok(State::new(path.to_path_buf(), total, header_written, true));
    }

    info!(device = %path.display(), ?mode, start = region.start, end = region.end, "erasing");
    let result = overwrite(&handle, region, mode, upgrade, options.chunk_size).and_then(|()| handle.close());
    if let Err(e) = &result {
        warn!(device = %path.display(), error = %e, "erase failed, card status unknown; original data may be partly destroyed");
    }
    result?;

    info!(device = %path.display(), bytes = total, "erase complete");
    Ok(State::new(path.to_path_buf(), total, header_written, false))
}

fn overwrite(handle: &DeviceHandle, region: Region, mode: EraseMode, upgrade: bool, chunk_size: usize) -> Result<()> {
    fill_region(handle, region, ERASE_BYTE, chunk_size)?;
    match mode {
        EraseMode::WipeHeader => {
            let header = Region {
                start: 0,
                end: SECTOR_SIZE as u64,
            };
            fill_region(handle, header, ERASE_BYTE, chunk_size)
        }
        EraseMode::KeepHeader if upgrade => handle.write_at(0, &Header::fresh().encode()),
        EraseMode::KeepHeader => Ok(()),
    }
}

//! Block device abstraction.
//!
//! A [`DeviceHandle`] gives positional, blocking access to a raw device or a
//! disk image addressed by byte offset. Handles are scoped to one engine
//! operation: they hold a [`Lease`] in the process-wide registry and release
//! it when dropped.

use crate::error::{Error, Result};
use crate::registry::Lease;

use std::fs::{File, OpenOptions};
use std::io::{self, Seek, SeekFrom};
use std::os::unix::fs::{FileExt, FileTypeExt, OpenOptionsExt};
use std::path::{Path, PathBuf};
use tracing::debug;

/// A storage device discovered by the locator.
///
/// The identifier is an opaque path; nothing above this module interprets
/// it beyond passing it back to [`DeviceHandle::open`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlockDevice {
    /// Platform path of the device (e.g. `/dev/sdb`) or of a disk image.
    pub path: PathBuf,
    /// Total size in bytes.
    pub size: u64,
    /// Logical sector size in bytes.
    pub block_size: u32,
    /// Whether the host reports the media as removable.
    pub removable: bool,
    /// Whether the host reports the device as read-only.
    pub read_only: bool,
    /// Whether the device backs the host's own system (root, boot, swap).
    pub system: bool,
}

impl BlockDevice {
    /// Describe a device or image by opening it briefly.
    ///
    /// Used for explicitly named paths that the platform enumeration did
    /// not report, such as disk images.
    pub fn probe(path: &Path) -> Result<Self> {
        let handle = DeviceHandle::open(path, Access::Read)?;
        Ok(Self {
            path: path.to_path_buf(),
            size: handle.size(),
            block_size: 512,
            removable: false,
            read_only: false,
            system: false,
        })
    }

    pub fn size_human(&self) -> String {
        const KB: u64 = 1024;
        const MB: u64 = KB * 1024;
        const GB: u64 = MB * 1024;

        if self.size >= GB {
            format!("{:.2} GB", self.size as f64 / GB as f64)
        } else if self.size >= MB {
            format!("{:.2} MB", self.size as f64 / MB as f64)
        } else if self.size >= KB {
            format!("{:.2} KB", self.size as f64 / KB as f64)
        } else {
            format!("{} B", self.size)
        }
    }
}

/// Access mode requested when opening a device.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Access {
    Read,
    Write,
}

/// An open, exclusively held device.
#[derive(Debug)]
pub struct DeviceHandle {
    path: PathBuf,
    file: File,
    size: u64,
    access: Access,
    _lease: Lease,
}

impl DeviceHandle {
    /// Open `path` for the duration of one scoped transfer.
    ///
    /// Block devices are opened with `O_EXCL`, so a device that is mounted
    /// or held by another process is reported as unavailable.
    pub fn open(path: &Path, access: Access) -> Result<Self> {
        let lease = Lease::acquire(path)?;

        let is_block = std::fs::metadata(path)
            .map(|m| m.file_type().is_block_device())
            .map_err(|e| open_error(path, e))?;

        let mut opts = OpenOptions::new();
        opts.read(true).write(access == Access::Write);
        if is_block {
            opts.custom_flags(libc::O_EXCL);
        }
        let mut file = opts.open(path).map_err(|e| open_error(path, e))?;

        let size = if is_block {
            let size = file
                .seek(SeekFrom::End(0))
                .map_err(|e| Error::io(format!("seek to end of {}", path.display()), e))?;
            file.seek(SeekFrom::Start(0))
                .map_err(|e| Error::io(format!("rewind {}", path.display()), e))?;
            size
        } else {
            file.metadata()
                .map_err(|e| Error::io(format!("stat {}", path.display()), e))?
                .len()
        };

        debug!(device = %path.display(), size, ?access, "opened device");
        Ok(Self {
            path: path.to_path_buf(),
            file,
            size,
            access,
            _lease: lease,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Total size of the device in bytes.
    pub fn size(&self) -> u64 {
        self.size
    }

    pub fn access(&self) -> Access {
        self.access
    }

    /// Read exactly `length` bytes starting at `offset`.
    pub fn read_at(&self, offset: u64, length: usize) -> Result<Vec<u8>> {
        self.check_range(offset, length as u64)?;

        let mut buf = vec![0u8; length];
        self.file.read_exact_at(&mut buf, offset).map_err(|e| {
            Error::io(
                format!("read {} bytes from {} at offset {}", length, self.path.display(), offset),
                e,
            )
        })?;
        Ok(buf)
    }

    /// Write all of `data` at `offset` in a single call.
    ///
    /// A short write is reported as an error rather than continued, so the
    /// caller always knows the transfer did not complete.
    pub fn write_at(&self, offset: u64, data: &[u8]) -> Result<()> {
        if self.access != Access::Write {
            return Err(Error::ReadOnlyDevice(self.path.clone()));
        }
        self.check_range(offset, data.len() as u64)?;

        let context = || format!("write {} bytes to {} at offset {}", data.len(), self.path.display(), offset);
        let written = FileExt::write_at(&self.file, data, offset).map_err(|e| Error::io(context(), e))?;
        if written != data.len() {
            return Err(Error::io(
                context(),
                io::Error::new(
                    io::ErrorKind::WriteZero,
                    format!("short write: {} of {} bytes", written, data.len()),
                ),
            ));
        }
        Ok(())
    }

    /// Flush written data to the device.
    pub fn sync(&self) -> Result<()> {
        self.file
            .sync_data()
            .map_err(|e| Error::io(format!("sync {}", self.path.display()), e))
    }

    /// Release the device, flushing first if it was opened for writing.
    pub fn close(self) -> Result<()> {
        if self.access == Access::Write {
            self.sync()?;
        }
        debug!(device = %self.path.display(), "closed device");
        Ok(())
    }

    fn check_range(&self, offset: u64, length: u64) -> Result<()> {
        match offset.checked_add(length) {
            Some(end) if end <= self.size => Ok(()),
            _ => Err(Error::OutOfRange {
                path: self.path.clone(),
                offset,
                length,
                size: self.size,
            }),
        }
    }
}

fn open_error(path: &Path, e: io::Error) -> Error {
    let unavailable = |reason: &str| Error::DeviceUnavailable {
        path: path.to_path_buf(),
        reason: reason.to_string(),
    };

    match e.raw_os_error() {
        Some(libc::EROFS) => return Error::ReadOnlyDevice(path.to_path_buf()),
        Some(libc::EBUSY) => return unavailable("device is busy (mounted or in use)"),
        Some(libc::ENOMEDIUM) => return unavailable("no medium present"),
        _ => {}
    }

    match e.kind() {
        io::ErrorKind::NotFound => unavailable("device not present"),
        io::ErrorKind::PermissionDenied => unavailable("permission denied - try running with sudo"),
        _ => Error::io(format!("open {}", path.display()), e),
    }
}

//! State returned from write and erase operations.

use std::path::PathBuf;

/// Result state from a destructive operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct State {
    /// Path of the device that was written.
    pub device_path: PathBuf,

    /// Number of bytes written (or that would have been, in a dry run).
    pub bytes_written: u64,

    /// Whether the header block was part of the write.
    pub header_written: bool,

    /// Whether the operation was a dry run that left the device untouched.
    pub dry_run: bool,
}

impl State {
    /// Create a new State with the given parameters.
    pub fn new(device_path: PathBuf, bytes_written: u64, header_written: bool, dry_run: bool) -> Self {
        Self {
            device_path,
            bytes_written,
            header_written,
            dry_run,
        }
    }
}

//! Error taxonomy shared by every engine operation.
//!
//! Each variant names the safety check or I/O call that failed. The engine
//! never retries: the first failure aborts the operation and is returned
//! unchanged.

use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Result alias used throughout the crate.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors produced by the NoFS engine.
#[derive(Error, Debug)]
pub enum Error {
    #[error("device unavailable: {}: {reason}", .path.display())]
    DeviceUnavailable { path: PathBuf, reason: String },

    #[error("I/O error: {context}: {source}")]
    Io {
        context: String,
        #[source]
        source: io::Error,
    },

    #[error("out of range on {}: offset {offset} + length {length} exceeds device size {size}", .path.display())]
    OutOfRange {
        path: PathBuf,
        offset: u64,
        length: u64,
        size: u64,
    },

    #[error("device {} is read-only", .0.display())]
    ReadOnlyDevice(PathBuf),

    #[error("ambiguous device selection, {} candidates remain: {}; select one explicitly", .candidates.len(), join_paths(.candidates))]
    AmbiguousDevice { candidates: Vec<PathBuf> },

    #[error("no suitable device found{}", describe_rejections(.rejected))]
    NoDeviceFound { rejected: Vec<String> },

    #[error("{} does not contain a NoFS header", .0.display())]
    NotNoFsFormatted(PathBuf),

    #[error("unsupported NoFS version {found} (newest supported is {supported})")]
    UnsupportedVersion { found: u8, supported: u8 },

    #[error("device too small: {size} bytes, at least {required} bytes required")]
    DeviceTooSmall { size: u64, required: u64 },
}

/// Fieldless discriminant of [`Error`], used for exit statuses and matching.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    DeviceUnavailable,
    Io,
    OutOfRange,
    ReadOnlyDevice,
    AmbiguousDevice,
    NoDeviceFound,
    NotNoFsFormatted,
    UnsupportedVersion,
    DeviceTooSmall,
}

impl ErrorKind {
    /// Distinct non-zero process exit status for this kind.
    pub fn exit_code(self) -> i32 {
        match self {
            ErrorKind::DeviceUnavailable => 10,
            ErrorKind::Io => 11,
            ErrorKind::OutOfRange => 12,
            ErrorKind::ReadOnlyDevice => 13,
            ErrorKind::AmbiguousDevice => 14,
            ErrorKind::NoDeviceFound => 15,
            ErrorKind::NotNoFsFormatted => 16,
            ErrorKind::UnsupportedVersion => 17,
            ErrorKind::DeviceTooSmall => 18,
        }
    }
}

impl Error {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::DeviceUnavailable { .. } => ErrorKind::DeviceUnavailable,
            Error::Io { .. } => ErrorKind::Io,
            Error::OutOfRange { .. } => ErrorKind::OutOfRange,
            Error::ReadOnlyDevice(_) => ErrorKind::ReadOnlyDevice,
            Error::AmbiguousDevice { .. } => ErrorKind::AmbiguousDevice,
            Error::NoDeviceFound { .. } => ErrorKind::NoDeviceFound,
            Error::NotNoFsFormatted(_) => ErrorKind::NotNoFsFormatted,
            Error::UnsupportedVersion { .. } => ErrorKind::UnsupportedVersion,
            Error::DeviceTooSmall { .. } => ErrorKind::DeviceTooSmall,
        }
    }

    /// Wrap an `io::Error` with a description of the call that produced it.
    pub fn io(context: impl Into<String>, source: io::Error) -> Self {
        Error::Io {
            context: context.into(),
            source,
        }
    }
}

fn join_paths(paths: &[PathBuf]) -> String {
    paths
        .iter()
        .map(|p| p.display().to_string())
        .collect::<Vec<_>>()
        .join(", ")
}

fn describe_rejections(rejected: &[String]) -> String {
    if rejected.is_empty() {
        String::new()
    } else {
        format!(" (rejected: {})", rejected.join("; "))
    }
}

//! Process-wide device acquisition registry.
//!
//! Every device the engine opens is registered here under its canonical
//! path for as long as the handle lives. A second open of the same device
//! from anywhere in the process fails instead of interleaving transfers.

use crate::error::{Error, Result};
use once_cell::sync::Lazy;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};
use tracing::debug;

/// Canonical paths of devices currently held by this process.
static ACQUIRED: Lazy<Mutex<HashSet<PathBuf>>> = Lazy::new(|| Mutex::new(HashSet::new()));

/// Exclusive claim on a device path, released on drop.
#[derive(Debug)]
pub struct Lease {
    key: PathBuf,
}

impl Lease {
    /// Claim `path` for exclusive use by the caller.
    ///
    /// Symlinks such as `/dev/disk/by-id/...` are resolved so that two names
    /// for the same device share one claim.
    pub fn acquire(path: &Path) -> Result<Self> {
        let key = std::fs::canonicalize(path).unwrap_or_else(|_| path.to_path_buf());
        let mut held = ACQUIRED.lock().unwrap_or_else(PoisonError::into_inner);

        if !held.insert(key.clone()) {
            return Err(Error::DeviceUnavailable {
                path: path.to_path_buf(),
                reason: "already in use by this process".to_string(),
            });
        }

        debug!(device = %key.display(), "acquired device");
        Ok(Self { key })
    }
}

impl Drop for Lease {
    fn drop(&mut self) {
        let mut held = ACQUIRED.lock().unwrap_or_else(PoisonError::into_inner);
        held.remove(&self.key);
        debug!(device = %self.key.display(), "released device");
    }
}

//! Error types.
//!
//! Download failures form a closed set matched exhaustively by the download
//! loop: local errors end the attempt, per-device errors move on to the next
//! device, and "update in progress" retries the same device.

use std::io;
use std::time::Duration;

use thiserror::Error;

use crate::tree::TxId;
use crate::types::{ObjectId, Target};

pub type Result<T> = std::result::Result<T, SyncError>;

/// Crate-level errors outside the download loop.
#[derive(Error, Debug)]
pub enum SyncError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("Invalid config file: {0}")]
    ConfigParse(#[from] toml::de::Error),
}

/// A property of the local system. Never retried against another device.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LocalError {
    #[error("no space left on local device")]
    NoSpace,

    #[error("local permission denied: {0}")]
    PermissionDenied(String),

    #[error("local storage error: {0}")]
    Storage(String),

    #[error("{0} no longer exists locally")]
    ObjectGone(Target),
}

/// A failure attributable to the device that was asked for content.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PerDeviceError {
    #[error("device lacks permission to share this object")]
    NoPermission,

    #[error("device offered a version we can't use")]
    VersionMismatch,

    #[error("content stream invalidated")]
    StreamInvalidated,

    #[error("no reply within {0:?}")]
    Timeout(Duration),

    #[error("request aborted")]
    Aborted,

    #[error("update still in progress after {attempts} attempts")]
    UpdateInProgress { attempts: u32 },

    #[error("remote changes remain after device was exhausted")]
    ChangesRemain,

    #[error("remote error: {0}")]
    Remote(String),
}

/// Outcome classification for a single request/apply against one device.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DownloadError {
    #[error(transparent)]
    Local(#[from] LocalError),

    #[error(transparent)]
    PerDevice(#[from] PerDeviceError),

    #[error("remote is updating the object")]
    UpdateInProgress,
}

/// Pseudo-pause expiry.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum PauseError {
    #[error("pseudo-pause timed out after {0:?}")]
    TimedOut(Duration),
}

impl From<PauseError> for PerDeviceError {
    fn from(e: PauseError) -> Self {
        match e {
            PauseError::TimedOut(after) => PerDeviceError::Timeout(after),
        }
    }
}

/// Directory-tree collaborator failures.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TreeError {
    #[error("object {0} not found")]
    NotFound(ObjectId),

    #[error("name {name:?} already taken under {parent}")]
    NameTaken { parent: ObjectId, name: String },

    #[error("a transaction is already open")]
    TransactionActive,

    #[error("transaction {0:?} is not open")]
    NoTransaction(TxId),

    #[error("storage error: {0}")]
    Storage(String),
}

/// Deadlock resolution failures. These are internal errors and propagate.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ResolveError {
    #[error("cycle of {edges} edges has no name-conflict edge")]
    NoNameConflict { edges: usize },

    #[error("rename failed: {0}")]
    Tree(#[from] TreeError),

    #[error("dependency still cycles after resolution ({edges} edges)")]
    StillCyclic { edges: usize },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pause_timeout_is_per_device() {
        let err: PerDeviceError = PauseError::TimedOut(Duration::from_secs(3)).into();
        assert_eq!(err, PerDeviceError::Timeout(Duration::from_secs(3)));
    }

    #[test]
    fn test_download_error_display_is_transparent() {
        let err = DownloadError::from(LocalError::NoSpace);
        assert_eq!(err.to_string(), "no space left on local device");

        let err = DownloadError::from(PerDeviceError::UpdateInProgress { attempts: 4 });
        assert_eq!(err.to_string(), "update still in progress after 4 attempts");
    }
}

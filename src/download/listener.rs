//! Completion notifications for the collector that requested a download.

use std::collections::BTreeMap;

use crate::error::{LocalError, PerDeviceError};
use crate::types::{DeviceId, Target};

/// Failure reason for every device tried during an attempt.
pub type DeviceErrors = BTreeMap<DeviceId, PerDeviceError>;

/// Receives the progress of one download attempt.
///
/// Any number of `on_partial_download_success` calls, then exactly one of
/// the other three. Called while holding the core.
pub trait DownloadListener: Send + Sync {
    /// Content from `device` was applied but more remote changes may remain.
    fn on_partial_download_success(&self, target: &Target, device: DeviceId);

    /// All known remote changes are now local. `device` supplied the last of them.
    fn on_download_success(&self, target: &Target, device: DeviceId);

    /// Every candidate device failed.
    fn on_per_device_errors(&self, target: &Target, errors: &DeviceErrors);

    /// A local failure ended the attempt.
    fn on_general_error(&self, target: &Target, error: &LocalError);
}

/// Terminal result of an attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DownloadOutcome {
    Success(DeviceId),
    PerDeviceErrors(DeviceErrors),
    GeneralError(LocalError),
}

impl DownloadOutcome {
    /// Deliver this outcome to `listener`.
    pub fn notify(&self, target: &Target, listener: &dyn DownloadListener) {
        match self {
            DownloadOutcome::Success(device) => listener.on_download_success(target, *device),
            DownloadOutcome::PerDeviceErrors(errors) => {
                listener.on_per_device_errors(target, errors)
            }
            DownloadOutcome::GeneralError(error) => listener.on_general_error(target, error),
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, DownloadOutcome::Success(_))
    }
}

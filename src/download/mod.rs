//! Per-object download state machine.
//!
//! Fetches content for one target from remote devices, one device at a time.
//!
//! # States
//!
//! ```text
//!            +-----------------+
//!   +------> | SelectingDevice | --(none left)--> DeviceExhausted
//!   |        +-----------------+
//!   |                 |
//!   |        +---------------------+   (core released)
//!   |        | AwaitingRemoteReply |
//!   |        +---------------------+
//!   |                 |
//!   |        +------------------+
//!   |        | ApplyingResponse | --(local error)--> FatalLocalError
//!   |        +------------------+
//!   |           |            |
//!   +--(changes remain /     +--(no changes remain)--> Success
//!       per-device error)
//! ```
//!
//! "Update in progress" re-enters AwaitingRemoteReply for the same device
//! after a fixed delay, a bounded number of times.

mod collab;
mod listener;
mod registry;

pub use collab::{
    ContentApplier, DeviceSelector, OrderedDevices, RemoteChangeChecker, RemoteContent,
    RemoteReply,
};
pub use listener::{DeviceErrors, DownloadListener, DownloadOutcome};
pub use registry::Downloads;

use std::collections::{BTreeSet, VecDeque};
use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::config::DownloadConfig;
use crate::context::Token;
use crate::error::{DownloadError, PerDeviceError};
use crate::types::{DeviceId, Target};

/// Shared collaborators for downloads. Cloning copies the `Arc`s.
pub struct DownloadDeps<S> {
    pub remote: Arc<dyn RemoteContent>,
    pub applier: Arc<dyn ContentApplier<S>>,
    pub checker: Arc<dyn RemoteChangeChecker<S>>,
    pub config: DownloadConfig,
}

impl<S> Clone for DownloadDeps<S> {
    fn clone(&self) -> Self {
        Self {
            remote: Arc::clone(&self.remote),
            applier: Arc::clone(&self.applier),
            checker: Arc::clone(&self.checker),
            config: self.config.clone(),
        }
    }
}

/// One download attempt for one target.
pub struct Download<S> {
    target: Target,
    selector: Box<dyn DeviceSelector>,
    deps: DownloadDeps<S>,
    listener: Arc<dyn DownloadListener>,

    /// Why each failed device failed
    errors: DeviceErrors,
    /// Devices whose content was applied while changes remained, not yet
    /// re-offered. Oldest partial success first.
    partial: VecDeque<DeviceId>,
    /// Devices already re-offered after the selector ran dry
    reoffered: BTreeSet<DeviceId>,
    /// Device asked most recently
    last: Option<DeviceId>,
}

impl<S: Send + 'static> Download<S> {
    pub fn new(
        target: Target,
        selector: Box<dyn DeviceSelector>,
        deps: DownloadDeps<S>,
        listener: Arc<dyn DownloadListener>,
    ) -> Self {
        Self {
            target,
            selector,
            deps,
            listener,
            errors: DeviceErrors::new(),
            partial: VecDeque::new(),
            reoffered: BTreeSet::new(),
            last: None,
        }
    }

    /// Drive the attempt to a terminal state.
    ///
    /// The core is released only while waiting on a remote device (and during
    /// update-in-progress back-off). The listener has been notified of the
    /// returned outcome by the time this returns.
    pub async fn run(mut self, mut token: Token<S>) -> (Token<S>, DownloadOutcome) {
        debug!(object = %self.target, "Starting download");

        // (device, attempt number) when re-asking the same device
        let mut retry: Option<(DeviceId, u32)> = None;

        loop {
            let (device, attempt) = match retry.take() {
                Some(retry) => retry,
                None => match self.next_device() {
                    Some(device) => (device, 1),
                    None => {
                        let errors = std::mem::take(&mut self.errors);
                        return self.finish(token, DownloadOutcome::PerDeviceErrors(errors));
                    }
                },
            };

            debug!(object = %self.target, %device, attempt, "Requesting content");
            self.last = Some(device);

            let (t, result) = fetch(&self.deps, self.target, token, device).await;
            token = t;

            match result {
                Ok(()) => {
                    self.listener
                        .on_partial_download_success(&self.target, device);

                    if !self.deps.checker.has_remote_changes(&self.target, &token) {
                        return self.finish(token, DownloadOutcome::Success(device));
                    }

                    debug!(object = %self.target, %device, "Remote changes remain");
                    self.selector.avoid(device);
                    if self.reoffered.contains(&device) {
                        self.errors.insert(device, PerDeviceError::ChangesRemain);
                    } else {
                        self.partial.push_back(device);
                    }
                }
                Err(DownloadError::Local(e)) => {
                    return self.finish(token, DownloadOutcome::GeneralError(e));
                }
                Err(DownloadError::PerDevice(e)) => {
                    self.fail_device(device, e);
                }
                Err(DownloadError::UpdateInProgress) => {
                    if attempt <= self.deps.config.max_update_retries {
                        debug!(
                            object = %self.target,
                            %device,
                            attempt,
                            "Update in progress, retrying after back-off"
                        );
                        token = token
                            .sleep(self.deps.config.update_retry_delay())
                            .await;
                        retry = Some((device, attempt + 1));
                    } else {
                        self.fail_device(
                            device,
                            PerDeviceError::UpdateInProgress { attempts: attempt },
                        );
                    }
                }
            }
        }
    }

    /// Next selector candidate, then partially successful devices once more.
    ///
    /// Re-offers keep the order of the first partial successes. The device
    /// just asked goes last unless it is the only one left.
    fn next_device(&mut self) -> Option<DeviceId> {
        if let Some(device) = self.selector.next_candidate(&self.target) {
            return Some(device);
        }
        if self.partial.len() > 1 && self.partial.front() == self.last.as_ref() {
            self.partial.rotate_left(1);
        }
        let device = self.partial.pop_front()?;
        self.reoffered.insert(device);
        debug!(object = %self.target, %device, "Re-offering partially successful device");
        Some(device)
    }

    fn fail_device(&mut self, device: DeviceId, error: PerDeviceError) {
        warn!(object = %self.target, %device, "Download failed: {}", error);
        self.partial.retain(|d| *d != device);
        self.selector.avoid(device);
        self.errors.insert(device, error);
    }

    fn finish(self, token: Token<S>, outcome: DownloadOutcome) -> (Token<S>, DownloadOutcome) {
        match &outcome {
            DownloadOutcome::Success(device) => {
                info!(object = %self.target, %device, "Download complete");
            }
            DownloadOutcome::PerDeviceErrors(errors) => {
                warn!(
                    object = %self.target,
                    devices = errors.len(),
                    "Download failed on every device"
                );
            }
            DownloadOutcome::GeneralError(e) => {
                warn!(object = %self.target, "Download aborted: {}", e);
            }
        }
        outcome.notify(&self.target, self.listener.as_ref());
        (token, outcome)
    }
}

/// Request from `device` with the core released, then apply holding it.
async fn fetch<S: Send + 'static>(
    deps: &DownloadDeps<S>,
    target: Target,
    token: Token<S>,
    device: DeviceId,
) -> (Token<S>, Result<(), DownloadError>) {
    let (mut token, reply) = token
        .pseudo_pause(deps.remote.request_content(&target, device))
        .await;

    let reply = match reply {
        Ok(Ok(reply)) => reply,
        Ok(Err(e)) => return (token, Err(e)),
        Err(pause) => return (token, Err(PerDeviceError::from(pause).into())),
    };

    let result = deps.applier.apply(&target, reply, &mut token);
    (token, result)
}

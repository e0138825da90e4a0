//! Collaborators the download state machine drives.
//!
//! Device selection, the wire protocol, content application and the
//! remote-change check all live in other subsystems; these traits are the
//! seams.

use std::collections::BTreeSet;

use async_trait::async_trait;
use bytes::Bytes;

use crate::context::Token;
use crate::error::DownloadError;
use crate::types::{DeviceId, Target, Version};

/// Content received from one device for one target.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteReply {
    /// Device that sent it
    pub device: DeviceId,

    /// Version of the content on that device
    pub version: Version,

    /// Raw content bytes
    pub content: Bytes,
}

/// Candidate devices for one download attempt.
///
/// A fresh selector is handed to every attempt, so avoidance is scoped to
/// that attempt.
pub trait DeviceSelector: Send {
    /// Next device to try, skipping avoided ones. `None` when exhausted.
    fn next_candidate(&mut self, target: &Target) -> Option<DeviceId>;

    /// Don't offer `device` again during this attempt.
    fn avoid(&mut self, device: DeviceId);
}

/// Remote content protocol.
///
/// Called with the core released, so implementations may block on the
/// network freely but must not touch core state.
#[async_trait]
pub trait RemoteContent: Send + Sync {
    async fn request_content(
        &self,
        target: &Target,
        device: DeviceId,
    ) -> Result<RemoteReply, DownloadError>;
}

/// Applies received content to local state. Runs holding the core.
pub trait ContentApplier<S>: Send + Sync {
    fn apply(
        &self,
        target: &Target,
        reply: RemoteReply,
        token: &mut Token<S>,
    ) -> Result<(), DownloadError>;
}

/// Whether remotely known versions of `target` are still missing locally.
pub trait RemoteChangeChecker<S>: Send + Sync {
    fn has_remote_changes(&self, target: &Target, token: &Token<S>) -> bool;
}

/// Selector over a fixed, ordered device list. First listed, first tried.
#[derive(Debug, Clone, Default)]
pub struct OrderedDevices {
    devices: Vec<DeviceId>,
    avoided: BTreeSet<DeviceId>,
}

impl OrderedDevices {
    pub fn new(devices: impl IntoIterator<Item = DeviceId>) -> Self {
        Self {
            devices: devices.into_iter().collect(),
            avoided: BTreeSet::new(),
        }
    }

    pub fn remaining(&self) -> usize {
        self.devices
            .iter()
            .filter(|d| !self.avoided.contains(d))
            .count()
    }
}

impl DeviceSelector for OrderedDevices {
    fn next_candidate(&mut self, _target: &Target) -> Option<DeviceId> {
        self.devices
            .iter()
            .copied()
            .find(|d| !self.avoided.contains(d))
    }

    fn avoid(&mut self, device: DeviceId) {
        self.avoided.insert(device);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{ObjectId, StoreId};

    #[test]
    fn test_ordered_devices() {
        let target = Target::content(StoreId(1), ObjectId(7));
        let mut devices = OrderedDevices::new([DeviceId(3), DeviceId(1), DeviceId(2)]);

        assert_eq!(devices.next_candidate(&target), Some(DeviceId(3)));
        // Asking again without avoiding yields the same device
        assert_eq!(devices.next_candidate(&target), Some(DeviceId(3)));

        devices.avoid(DeviceId(3));
        assert_eq!(devices.next_candidate(&target), Some(DeviceId(1)));
        devices.avoid(DeviceId(2));
        assert_eq!(devices.remaining(), 1);
        devices.avoid(DeviceId(1));
        assert_eq!(devices.next_candidate(&target), None);
    }

    #[test]
    fn test_empty_selector() {
        let target = Target::content(StoreId(1), ObjectId(7));
        assert_eq!(OrderedDevices::default().next_candidate(&target), None);
    }
}

// Registry of in-flight downloads
//
// One attempt per target at a time. A second request for a target already
// being downloaded joins the running attempt instead of starting another.
// The joiner is notified of every event from the moment it joined, and its
// candidate devices are tried once the runner's own selector is exhausted.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::{Arc, Mutex, MutexGuard};

use tracing::debug;

use crate::context::Token;
use crate::error::LocalError;
use crate::types::{DeviceId, Target};

use super::{
    DeviceErrors, DeviceSelector, Download, DownloadDeps, DownloadListener, DownloadOutcome,
};

/// Everyone waiting on one target's attempt.
#[derive(Default)]
struct Entry {
    listeners: Vec<Arc<dyn DownloadListener>>,
    /// Selectors handed in by joiners
    joined: Vec<Box<dyn DeviceSelector>>,
    /// Devices the running attempt no longer wants offered
    avoided: BTreeSet<DeviceId>,
}

type Ongoing = BTreeMap<Target, Entry>;

pub struct Downloads<S> {
    deps: DownloadDeps<S>,
    ongoing: Arc<Mutex<Ongoing>>,
}

impl<S: Send + 'static> Downloads<S> {
    pub fn new(deps: DownloadDeps<S>) -> Self {
        Self {
            deps,
            ongoing: Arc::new(Mutex::new(BTreeMap::new())),
        }
    }

    /// Download `target`, or join the attempt already running for it.
    ///
    /// Returns the outcome when this call ran the attempt, `None` when it
    /// joined one. A joiner's listener still gets the terminal notification,
    /// and its selector's devices are offered after the runner's. Devices the
    /// attempt already gave up on are not offered again. Joining after the
    /// attempt has run out of devices only adds the listener.
    pub async fn download(
        &self,
        token: Token<S>,
        target: Target,
        mut selector: Box<dyn DeviceSelector>,
        listener: Arc<dyn DownloadListener>,
    ) -> (Token<S>, Option<DownloadOutcome>) {
        {
            let mut ongoing = lock(&self.ongoing);
            if let Some(entry) = ongoing.get_mut(&target) {
                debug!(object = %target, "Joining ongoing download");
                for device in &entry.avoided {
                    selector.avoid(*device);
                }
                entry.joined.push(selector);
                entry.listeners.push(listener);
                return (token, None);
            }
            ongoing.insert(
                target,
                Entry {
                    listeners: vec![listener],
                    ..Default::default()
                },
            );
        }

        let selector = Box::new(JoinedSelector {
            target,
            primary: selector,
            ongoing: Arc::clone(&self.ongoing),
        });
        let fan_out = Arc::new(FanOut {
            target,
            ongoing: Arc::clone(&self.ongoing),
        });
        let download = Download::new(target, selector, self.deps.clone(), fan_out);
        let (token, outcome) = download.run(token).await;
        (token, Some(outcome))
    }

    pub fn is_ongoing(&self, target: &Target) -> bool {
        lock(&self.ongoing).contains_key(target)
    }

    /// Number of targets with an attempt in flight
    pub fn len(&self) -> usize {
        lock(&self.ongoing).len()
    }

    pub fn is_empty(&self) -> bool {
        lock(&self.ongoing).is_empty()
    }
}

fn lock(ongoing: &Mutex<Ongoing>) -> MutexGuard<'_, Ongoing> {
    // Listeners never run under this lock, so a poisoned map is still consistent
    ongoing.lock().unwrap_or_else(|e| e.into_inner())
}

/// The runner's selector, then whatever joiners brought.
struct JoinedSelector {
    target: Target,
    primary: Box<dyn DeviceSelector>,
    ongoing: Arc<Mutex<Ongoing>>,
}

impl DeviceSelector for JoinedSelector {
    fn next_candidate(&mut self, target: &Target) -> Option<DeviceId> {
        if let Some(device) = self.primary.next_candidate(target) {
            return Some(device);
        }
        let mut ongoing = lock(&self.ongoing);
        let entry = ongoing.get_mut(&self.target)?;
        entry
            .joined
            .iter_mut()
            .find_map(|selector| selector.next_candidate(target))
    }

    fn avoid(&mut self, device: DeviceId) {
        self.primary.avoid(device);
        if let Some(entry) = lock(&self.ongoing).get_mut(&self.target) {
            entry.avoided.insert(device);
            for selector in &mut entry.joined {
                selector.avoid(device);
            }
        }
    }
}

/// Forwards one attempt's events to everyone registered for its target.
struct FanOut {
    target: Target,
    ongoing: Arc<Mutex<Ongoing>>,
}

impl FanOut {
    fn current(&self) -> Vec<Arc<dyn DownloadListener>> {
        lock(&self.ongoing)
            .get(&self.target)
            .map(|entry| entry.listeners.clone())
            .unwrap_or_default()
    }

    /// Unregister the target; later requests start a fresh attempt.
    fn finished(&self) -> Vec<Arc<dyn DownloadListener>> {
        lock(&self.ongoing)
            .remove(&self.target)
            .map(|entry| entry.listeners)
            .unwrap_or_default()
    }
}

impl DownloadListener for FanOut {
    fn on_partial_download_success(&self, target: &Target, device: DeviceId) {
        for listener in self.current() {
            listener.on_partial_download_success(target, device);
        }
    }

    fn on_download_success(&self, target: &Target, device: DeviceId) {
        for listener in self.finished() {
            listener.on_download_success(target, device);
        }
    }

    fn on_per_device_errors(&self, target: &Target, errors: &DeviceErrors) {
        for listener in self.finished() {
            listener.on_per_device_errors(target, errors);
        }
    }

    fn on_general_error(&self, target: &Target, error: &LocalError) {
        for listener in self.finished() {
            listener.on_general_error(target, error);
        }
    }
}

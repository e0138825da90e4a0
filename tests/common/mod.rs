// Scripted collaborators shared by the integration tests
#![allow(dead_code)]

use std::collections::{BTreeMap, VecDeque};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use sy_fetch::{
    ContentApplier, DeviceErrors, DeviceId, DownloadError, DownloadListener, LocalError,
    RemoteChangeChecker, RemoteContent, RemoteReply, Target, Token, Version,
};

/// What a device does when asked for content.
#[derive(Debug, Clone)]
pub enum Step {
    Reply,
    ReplyAfter(Duration),
    Fail(DownloadError),
    Hang,
}

/// Remote that plays back a per-device script. Unscripted requests succeed.
#[derive(Default)]
pub struct ScriptedRemote {
    script: Mutex<BTreeMap<DeviceId, VecDeque<Step>>>,
    calls: Mutex<Vec<(Target, DeviceId)>>,
}

impl ScriptedRemote {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on(self, device: DeviceId, steps: impl IntoIterator<Item = Step>) -> Self {
        self.script
            .lock()
            .unwrap()
            .entry(device)
            .or_default()
            .extend(steps);
        self
    }

    /// Devices asked, in order
    pub fn devices(&self) -> Vec<DeviceId> {
        self.calls.lock().unwrap().iter().map(|(_, d)| *d).collect()
    }

    pub fn request_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }
}

#[async_trait]
impl RemoteContent for ScriptedRemote {
    async fn request_content(
        &self,
        target: &Target,
        device: DeviceId,
    ) -> Result<RemoteReply, DownloadError> {
        self.calls.lock().unwrap().push((*target, device));
        let step = self
            .script
            .lock()
            .unwrap()
            .get_mut(&device)
            .and_then(|q| q.pop_front())
            .unwrap_or(Step::Reply);

        match step {
            Step::Reply => {}
            Step::ReplyAfter(delay) => tokio::time::sleep(delay).await,
            Step::Fail(e) => return Err(e),
            Step::Hang => std::future::pending::<()>().await,
        }

        Ok(RemoteReply {
            device,
            version: Version::new().with(device, 1),
            content: Bytes::from(format!("{} from {}", target, device)),
        })
    }
}

/// Applies every reply; fails the ones scripted per device.
#[derive(Default)]
pub struct ScriptedApplier {
    failures: Mutex<BTreeMap<DeviceId, DownloadError>>,
    applied: Mutex<Vec<DeviceId>>,
}

impl ScriptedApplier {
    pub fn failing(device: DeviceId, error: DownloadError) -> Self {
        let applier = Self::default();
        applier.failures.lock().unwrap().insert(device, error);
        applier
    }

    pub fn applied(&self) -> Vec<DeviceId> {
        self.applied.lock().unwrap().clone()
    }
}

impl<S> ContentApplier<S> for ScriptedApplier {
    fn apply(
        &self,
        _target: &Target,
        reply: RemoteReply,
        _token: &mut Token<S>,
    ) -> Result<(), DownloadError> {
        if let Some(e) = self.failures.lock().unwrap().get(&reply.device) {
            return Err(e.clone());
        }
        self.applied.lock().unwrap().push(reply.device);
        Ok(())
    }
}

/// Reports remaining changes from a queue, then none.
#[derive(Default)]
pub struct ScriptedChecker(Mutex<VecDeque<bool>>);

impl ScriptedChecker {
    pub fn new(answers: impl IntoIterator<Item = bool>) -> Self {
        Self(Mutex::new(answers.into_iter().collect()))
    }
}

impl<S> RemoteChangeChecker<S> for ScriptedChecker {
    fn has_remote_changes(&self, _target: &Target, _token: &Token<S>) -> bool {
        self.0.lock().unwrap().pop_front().unwrap_or(false)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    Partial(DeviceId),
    Success(DeviceId),
    PerDeviceErrors(DeviceErrors),
    General(LocalError),
}

#[derive(Default)]
pub struct RecordingListener(Mutex<Vec<Event>>);

impl RecordingListener {
    pub fn events(&self) -> Vec<Event> {
        self.0.lock().unwrap().clone()
    }

    /// Number of success/error notifications
    pub fn terminal_count(&self) -> usize {
        self.events()
            .iter()
            .filter(|e| !matches!(e, Event::Partial(_)))
            .count()
    }
}

impl DownloadListener for RecordingListener {
    fn on_partial_download_success(&self, _: &Target, device: DeviceId) {
        self.0.lock().unwrap().push(Event::Partial(device));
    }

    fn on_download_success(&self, _: &Target, device: DeviceId) {
        self.0.lock().unwrap().push(Event::Success(device));
    }

    fn on_per_device_errors(&self, _: &Target, errors: &DeviceErrors) {
        self.0
            .lock()
            .unwrap()
            .push(Event::PerDeviceErrors(errors.clone()));
    }

    fn on_general_error(&self, _: &Target, error: &LocalError) {
        self.0.lock().unwrap().push(Event::General(error.clone()));
    }
}

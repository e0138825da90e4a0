//! Identifiers shared by the graph, resolver and download engine.

use std::collections::BTreeMap;
use std::fmt;

/// A remote (or the local) device taking part in sync.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct DeviceId(pub u128);

impl fmt::Display for DeviceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "d{:x}", self.0)
    }
}

/// A store (shared folder root) on the local device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct StoreId(pub u64);

impl fmt::Display for StoreId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "s{}", self.0)
    }
}

/// Identity of a file or directory, stable across renames and devices.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ObjectId(pub u128);

impl ObjectId {
    /// The root directory of every store.
    pub const ROOT: ObjectId = ObjectId(0);

    pub fn is_root(&self) -> bool {
        *self == Self::ROOT
    }
}

impl fmt::Display for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:032x}", self.0)
    }
}

/// Which part of an object a download is for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Component {
    /// Name, parent and attributes
    Meta,
    /// File bytes
    Content,
}

/// A unit of download/apply work: one component of one object in one store.
///
/// Ordering is lexicographic on (store, object, component) and is what makes
/// cycle tie-breaks deterministic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Target {
    pub store: StoreId,
    pub object: ObjectId,
    pub component: Component,
}

impl Target {
    pub fn new(store: StoreId, object: ObjectId, component: Component) -> Self {
        Self {
            store,
            object,
            component,
        }
    }

    pub fn meta(store: StoreId, object: ObjectId) -> Self {
        Self::new(store, object, Component::Meta)
    }

    pub fn content(store: StoreId, object: ObjectId) -> Self {
        Self::new(store, object, Component::Content)
    }
}

impl fmt::Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let component = match self.component {
            Component::Meta => "m",
            Component::Content => "c",
        };
        write!(f, "{}:{}:{}", self.store, self.object, component)
    }
}

/// Version vector: per-device tick counts for one object.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Version {
    ticks: BTreeMap<DeviceId, u64>,
}

impl Version {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder used mostly by tests and fixtures.
    pub fn with(mut self, device: DeviceId, tick: u64) -> Self {
        self.ticks.insert(device, tick);
        self
    }

    pub fn get(&self, device: DeviceId) -> u64 {
        self.ticks.get(&device).copied().unwrap_or(0)
    }

    /// Record a local change made by `device`.
    pub fn tick(&mut self, device: DeviceId) {
        *self.ticks.entry(device).or_insert(0) += 1;
    }

    /// Pointwise maximum of the two vectors.
    pub fn merge(&mut self, other: &Version) {
        for (device, tick) in &other.ticks {
            let entry = self.ticks.entry(*device).or_insert(0);
            *entry = (*entry).max(*tick);
        }
    }

    /// True if every tick in `other` is covered by `self`.
    pub fn dominates(&self, other: &Version) -> bool {
        other
            .ticks
            .iter()
            .all(|(device, tick)| self.get(*device) >= *tick)
    }

    pub fn is_empty(&self) -> bool {
        self.ticks.values().all(|t| *t == 0)
    }
}

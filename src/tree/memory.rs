// In-memory directory tree
//
// Holds object metadata keyed by object id. Transactions snapshot the whole
// map on begin and restore it on rollback; trees here are small fixtures or
// single-store caches, so copying is fine.

use std::collections::BTreeMap;
use std::path::PathBuf;

use crate::error::TreeError;
use crate::graph::NameConflict;
use crate::types::{DeviceId, ObjectId, Version};

use super::{DirectoryTree, ObjectMeta, TxId};

/// Parent chains longer than this are treated as corrupt
const MAX_DEPTH: usize = 4096;

pub struct MemoryTree {
    /// Device local renames are attributed to
    local: DeviceId,
    objects: BTreeMap<ObjectId, ObjectMeta>,
    open: Option<(TxId, BTreeMap<ObjectId, ObjectMeta>)>,
    next_tx: u64,
}

impl MemoryTree {
    /// Empty tree containing only the root directory
    pub fn new(local: DeviceId) -> Self {
        let mut objects = BTreeMap::new();
        objects.insert(
            ObjectId::ROOT,
            ObjectMeta {
                object: ObjectId::ROOT,
                parent: ObjectId::ROOT,
                name: String::new(),
                is_dir: true,
                version: Version::new(),
            },
        );
        Self {
            local,
            objects,
            open: None,
            next_tx: 1,
        }
    }

    /// Insert or overwrite an object (fixture setup, no name checks)
    pub fn insert(&mut self, meta: ObjectMeta) {
        self.objects.insert(meta.object, meta);
    }

    pub fn insert_file(&mut self, object: ObjectId, parent: ObjectId, name: &str) {
        self.insert(ObjectMeta {
            object,
            parent,
            name: name.to_string(),
            is_dir: false,
            version: Version::new(),
        });
    }

    pub fn insert_dir(&mut self, object: ObjectId, parent: ObjectId, name: &str) {
        self.insert(ObjectMeta {
            object,
            parent,
            name: name.to_string(),
            is_dir: true,
            version: Version::new(),
        });
    }

    /// Children of `parent`, sorted by name
    pub fn children(&self, parent: ObjectId) -> Vec<&ObjectMeta> {
        let mut children: Vec<&ObjectMeta> = self
            .objects
            .values()
            .filter(|m| m.parent == parent && !m.object.is_root())
            .collect();
        children.sort_by(|a, b| a.name.cmp(&b.name));
        children
    }

    pub fn len(&self) -> usize {
        self.objects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }

    fn check_tx(&self, tx: TxId) -> Result<(), TreeError> {
        match &self.open {
            Some((open, _)) if *open == tx => Ok(()),
            _ => Err(TreeError::NoTransaction(tx)),
        }
    }

    fn check_name_free(
        &self,
        parent: ObjectId,
        name: &str,
        mover: ObjectId,
    ) -> Result<(), TreeError> {
        match self.child(parent, name) {
            Some(holder) if holder != mover => Err(TreeError::NameTaken {
                parent,
                name: name.to_string(),
            }),
            _ => Ok(()),
        }
    }

    fn check_parent(&self, parent: ObjectId) -> Result<(), TreeError> {
        match self.objects.get(&parent) {
            Some(meta) if meta.is_dir => Ok(()),
            Some(_) => Err(TreeError::Storage(format!("{} is not a directory", parent))),
            None => Err(TreeError::NotFound(parent)),
        }
    }
}

impl DirectoryTree for MemoryTree {
    fn lookup(&self, object: ObjectId) -> Option<ObjectMeta> {
        self.objects.get(&object).cloned()
    }

    fn child(&self, parent: ObjectId, name: &str) -> Option<ObjectId> {
        self.objects
            .values()
            .find(|m| m.parent == parent && m.name == name && !m.object.is_root())
            .map(|m| m.object)
    }

    fn resolve_path(&self, object: ObjectId) -> Option<PathBuf> {
        let mut names = Vec::new();
        let mut current = self.objects.get(&object)?;
        while !current.object.is_root() {
            if names.len() >= MAX_DEPTH {
                return None;
            }
            names.push(current.name.as_str());
            current = self.objects.get(&current.parent)?;
        }
        Some(names.iter().rev().collect())
    }

    fn begin(&mut self) -> Result<TxId, TreeError> {
        if self.open.is_some() {
            return Err(TreeError::TransactionActive);
        }
        let tx = TxId(self.next_tx);
        self.next_tx += 1;
        self.open = Some((tx, self.objects.clone()));
        Ok(tx)
    }

    fn commit(&mut self, tx: TxId) -> Result<(), TreeError> {
        self.check_tx(tx)?;
        self.open = None;
        Ok(())
    }

    fn rollback(&mut self, tx: TxId) {
        if self.check_tx(tx).is_err() {
            return;
        }
        if let Some((_, snapshot)) = self.open.take() {
            self.objects = snapshot;
        }
    }

    fn rename(
        &mut self,
        tx: TxId,
        object: ObjectId,
        parent: ObjectId,
        name: &str,
    ) -> Result<(), TreeError> {
        self.check_tx(tx)?;
        self.check_parent(parent)?;
        self.check_name_free(parent, name, object)?;

        let local = self.local;
        let meta = self
            .objects
            .get_mut(&object)
            .ok_or(TreeError::NotFound(object))?;
        meta.parent = parent;
        meta.name = name.to_string();
        meta.version.tick(local);
        Ok(())
    }

    fn replay_remote_meta(&mut self, tx: TxId, conflict: &NameConflict) -> Result<(), TreeError> {
        self.check_tx(tx)?;
        self.check_parent(conflict.parent)?;
        self.check_name_free(conflict.parent, &conflict.name, conflict.remote)?;

        let meta = self
            .objects
            .entry(conflict.remote)
            .or_insert_with(|| ObjectMeta {
                object: conflict.remote,
                parent: conflict.parent,
                name: conflict.name.clone(),
                is_dir: false,
                version: Version::new(),
            });
        meta.parent = conflict.parent;
        meta.name = conflict.name.clone();
        meta.version.merge(&conflict.remote_version);
        Ok(())
    }
}

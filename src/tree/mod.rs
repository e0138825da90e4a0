//! Directory-tree collaborator.
//!
//! The object database itself (identity, version vectors, physical I/O) is
//! outside this crate. The deadlock resolver only needs the operations on
//! [`DirectoryTree`]; [`MemoryTree`] implements them in memory.

mod memory;

pub use memory::MemoryTree;

use std::path::PathBuf;

use crate::error::TreeError;
use crate::graph::NameConflict;
use crate::types::{ObjectId, Version};

/// Handle for an open directory-tree transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TxId(pub u64);

/// Metadata of one object in the tree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectMeta {
    pub object: ObjectId,
    pub parent: ObjectId,
    pub name: String,
    pub is_dir: bool,
    pub version: Version,
}

pub trait DirectoryTree {
    fn lookup(&self, object: ObjectId) -> Option<ObjectMeta>;

    /// Object named `name` directly under `parent`.
    fn child(&self, parent: ObjectId, name: &str) -> Option<ObjectId>;

    /// Path of `object` relative to the store root.
    fn resolve_path(&self, object: ObjectId) -> Option<PathBuf>;

    fn begin(&mut self) -> Result<TxId, TreeError>;

    fn commit(&mut self, tx: TxId) -> Result<(), TreeError>;

    /// Undo everything done under `tx`.
    fn rollback(&mut self, tx: TxId);

    /// Move `object` to `(parent, name)` as a local change.
    fn rename(
        &mut self,
        tx: TxId,
        object: ObjectId,
        parent: ObjectId,
        name: &str,
    ) -> Result<(), TreeError>;

    /// Re-apply the incoming metadata that produced `conflict`.
    ///
    /// The contested name must be free by now.
    fn replay_remote_meta(&mut self, tx: TxId, conflict: &NameConflict) -> Result<(), TreeError>;
}

//! Dependency edges.

use std::fmt;

use crate::types::{ObjectId, Version};

/// An ordering constraint: `from` must be applied before `to`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DependencyEdge<T> {
    pub from: T,
    pub to: T,
    pub kind: EdgeKind,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EdgeKind {
    /// A child can only be placed once its parent exists locally
    Parent,
    /// Two objects want the same name under the same parent
    NameConflict(NameConflict),
}

/// Everything needed to later resolve a name conflict by renaming.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NameConflict {
    /// Common parent of both objects
    pub parent: ObjectId,
    /// The contested name
    pub name: String,
    /// Incoming object whose metadata wants `(parent, name)`
    pub remote: ObjectId,
    /// Object currently holding `(parent, name)`; this one gets renamed
    pub dependee: ObjectId,
    /// Version of the incoming metadata
    pub remote_version: Version,
}

impl<T> DependencyEdge<T> {
    pub fn parent(from: T, to: T) -> Self {
        Self {
            from,
            to,
            kind: EdgeKind::Parent,
        }
    }

    pub fn name_conflict(from: T, to: T, conflict: NameConflict) -> Self {
        Self {
            from,
            to,
            kind: EdgeKind::NameConflict(conflict),
        }
    }

    pub fn conflict(&self) -> Option<&NameConflict> {
        match &self.kind {
            EdgeKind::NameConflict(c) => Some(c),
            EdgeKind::Parent => None,
        }
    }

    pub fn is_name_conflict(&self) -> bool {
        self.conflict().is_some()
    }
}

impl<T: fmt::Display> fmt::Display for DependencyEdge<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.kind {
            EdgeKind::Parent => write!(f, "{} -> {}", self.from, self.to),
            EdgeKind::NameConflict(c) => {
                write!(f, "{} -[{:?}]-> {}", self.from, c.name, self.to)
            }
        }
    }
}

//! Deadlock resolution.
//!
//! Parent edges alone never cycle (the object tree is a tree), so every cycle
//! the graph reports runs through a name-conflict edge. Renaming the object
//! that currently holds the contested name frees the slot: the incoming
//! metadata is replayed against it, the conflict edge disappears and both
//! halves of the cycle can proceed independently.

use std::fmt;

use tracing::{debug, info, warn};

use crate::error::{ResolveError, TreeError};
use crate::graph::{DeadlockDetected, DependencyEdge, DependencyGraph, NameConflict};
use crate::tree::{DirectoryTree, TxId};
use crate::types::ObjectId;

/// Access to the core state the resolver works on.
pub trait CoreContext<T> {
    type Tree: DirectoryTree;

    fn parts(&mut self) -> (&mut DependencyGraph<T>, &mut Self::Tree);
}

/// What a resolution did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resolution<T> {
    /// The name-conflict edge that was resolved and removed from the graph
    pub edge: DependencyEdge<T>,
    /// Object that was moved out of the way
    pub renamed: ObjectId,
    /// Its new name under the same parent
    pub new_name: String,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct DeadlockResolver;

impl DeadlockResolver {
    pub fn new() -> Self {
        Self
    }

    /// Break `cycle` by renaming the dependee of its name-conflict edge.
    ///
    /// Runs in one directory-tree transaction. Any tree error rolls the
    /// transaction back and is returned as is. On success the resolved edge
    /// is removed from the graph; re-inserting the dependency that reported
    /// the cycle is up to the caller.
    pub fn resolve_deadlock<T, C>(
        &self,
        cycle: &[DependencyEdge<T>],
        ctx: &mut C,
    ) -> Result<Resolution<T>, ResolveError>
    where
        T: Ord + Clone + fmt::Display,
        C: CoreContext<T>,
    {
        let (edge, conflict) = Self::conflict_edge(cycle)?;

        let (graph, tree) = ctx.parts();

        let tx = tree.begin()?;
        let new_name = match Self::rename_and_replay(tree, tx, conflict) {
            Ok(name) => name,
            Err(e) => {
                warn!("Rolling back deadlock resolution for {}: {}", edge, e);
                tree.rollback(tx);
                return Err(e.into());
            }
        };
        tree.commit(tx)?;

        graph.remove_edge(&edge.from, &edge.to);

        info!(
            dependee = %conflict.dependee,
            name = %conflict.name,
            new_name = %new_name,
            cycle_len = cycle.len(),
            "Resolved download deadlock by renaming"
        );

        Ok(Resolution {
            edge: edge.clone(),
            renamed: conflict.dependee,
            new_name,
        })
    }

    /// The name-conflict edge to resolve.
    ///
    /// Cycles normally carry exactly one. If there are several, the one with
    /// the smallest `(from, to)` wins so the choice doesn't depend on where the
    /// cycle happens to start.
    fn conflict_edge<T: Ord>(
        cycle: &[DependencyEdge<T>],
    ) -> Result<(&DependencyEdge<T>, &NameConflict), ResolveError> {
        cycle
            .iter()
            .filter_map(|e| e.conflict().map(|c| (e, c)))
            .min_by(|(a, _), (b, _)| (&a.from, &a.to).cmp(&(&b.from, &b.to)))
            .ok_or(ResolveError::NoNameConflict { edges: cycle.len() })
    }

    fn rename_and_replay<D: DirectoryTree>(
        tree: &mut D,
        tx: TxId,
        conflict: &NameConflict,
    ) -> Result<String, TreeError> {
        let new_name = next_free_name(&*tree, conflict.parent, &conflict.name);
        debug!(
            "Renaming {} from {:?} to {:?}",
            conflict.dependee, conflict.name, new_name
        );
        tree.rename(tx, conflict.dependee, conflict.parent, &new_name)?;
        tree.replay_remote_meta(tx, conflict)?;
        Ok(new_name)
    }
}

/// First of `stem (2).ext`, `stem (3).ext`, ... not used under `parent`.
pub fn next_free_name<D: DirectoryTree + ?Sized>(
    tree: &D,
    parent: ObjectId,
    name: &str,
) -> String {
    // Leading dot is part of the stem (".profile" has no extension)
    let (stem, ext) = match name.rfind('.') {
        Some(i) if i > 0 => name.split_at(i),
        _ => (name, ""),
    };

    let mut n: u64 = 2;
    loop {
        let candidate = format!("{} ({}){}", stem, n, ext);
        if tree.child(parent, &candidate).is_none() {
            return candidate;
        }
        n += 1;
    }
}

/// Insert `edge`, resolving a deadlock if it would close a cycle.
///
/// This is the caller's side of the resolution protocol: on a reported cycle
/// the resolver runs, then the insertion is retried. When the refused edge
/// was itself the conflict that got resolved there is nothing left to
/// insert. Returns the resolution if one was needed.
pub fn add_dependency<T, C>(
    ctx: &mut C,
    resolver: &DeadlockResolver,
    edge: DependencyEdge<T>,
) -> Result<Option<Resolution<T>>, ResolveError>
where
    T: Ord + Clone + fmt::Debug + fmt::Display,
    C: CoreContext<T>,
{
    let cycle = match ctx.parts().0.add_edge(edge.clone()) {
        Ok(()) => return Ok(None),
        Err(DeadlockDetected { cycle }) => cycle,
    };

    debug!(
        "Dependency {} would deadlock: {}",
        edge,
        cycle
            .iter()
            .map(|e| e.to_string())
            .collect::<Vec<_>>()
            .join(", ")
    );

    let resolution = resolver.resolve_deadlock(&cycle, ctx)?;

    let resolved_self = resolution.edge.from == edge.from && resolution.edge.to == edge.to;
    if !resolved_self {
        ctx.parts()
            .0
            .add_edge(edge)
            .map_err(|d| ResolveError::StillCyclic {
                edges: d.cycle.len(),
            })?;
    }

    Ok(Some(resolution))
}

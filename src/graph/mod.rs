//! Download dependency graph.
//!
//! A directed graph over download/apply targets. The graph is acyclic at all
//! times: [`DependencyGraph::add_edge`] searches for a path from the new
//! edge's head back to its tail before inserting, and refuses the edge with
//! the would-be cycle if one exists.
//!
//! No internal locking. The graph lives in the core state and is only
//! reachable through a held [`crate::context::Token`].

mod edge;

pub use edge::{DependencyEdge, EdgeKind, NameConflict};

use std::collections::{BTreeMap, VecDeque};
use std::fmt;

use thiserror::Error;

/// Inserting an edge would have closed a cycle.
///
/// `cycle` runs `to -> ... -> from` along existing edges, followed by the
/// refused edge itself.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("dependency cycle detected ({} edges)", .cycle.len())]
pub struct DeadlockDetected<T: fmt::Debug> {
    pub cycle: Vec<DependencyEdge<T>>,
}

#[derive(Debug, Clone)]
pub struct DependencyGraph<T> {
    /// from -> (to -> edge)
    out: BTreeMap<T, BTreeMap<T, DependencyEdge<T>>>,
    edge_count: usize,
}

impl<T: Ord + Clone> Default for DependencyGraph<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Ord + Clone> DependencyGraph<T> {
    pub fn new() -> Self {
        Self {
            out: BTreeMap::new(),
            edge_count: 0,
        }
    }

    /// Insert `edge` unless it would close a cycle.
    ///
    /// Re-adding an existing `(from, to)` pair replaces its kind.
    pub fn add_edge(&mut self, edge: DependencyEdge<T>) -> Result<(), DeadlockDetected<T>>
    where
        T: fmt::Debug,
    {
        let mut cycle = self.path_between(&edge.to, &edge.from);
        if !cycle.is_empty() || edge.from == edge.to {
            cycle.push(edge);
            return Err(DeadlockDetected { cycle });
        }

        let targets = self.out.entry(edge.from.clone()).or_default();
        if targets.insert(edge.to.clone(), edge).is_none() {
            self.edge_count += 1;
        }
        Ok(())
    }

    /// Edges of some directed path from `a` to `b`, or empty if there is none.
    ///
    /// Breadth-first, so the returned path is a shortest one. `a == b` yields
    /// the empty path.
    pub fn path_between(&self, a: &T, b: &T) -> Vec<DependencyEdge<T>> {
        if a == b {
            return Vec::new();
        }

        // node -> edge we reached it by
        let mut reached: BTreeMap<&T, &DependencyEdge<T>> = BTreeMap::new();
        let mut queue: VecDeque<&T> = VecDeque::new();
        queue.push_back(a);

        while let Some(node) = queue.pop_front() {
            let Some(targets) = self.out.get(node) else {
                continue;
            };
            for (next, edge) in targets {
                if next == a || reached.contains_key(next) {
                    continue;
                }
                reached.insert(next, edge);
                if next == b {
                    return Self::unwind(&reached, a, b);
                }
                queue.push_back(next);
            }
        }

        Vec::new()
    }

    fn unwind(reached: &BTreeMap<&T, &DependencyEdge<T>>, a: &T, b: &T) -> Vec<DependencyEdge<T>> {
        let mut path = Vec::new();
        let mut node = b;
        while node != a {
            // Every node but `a` on the path was reached through an edge
            let Some(edge) = reached.get(node) else {
                break;
            };
            path.push((*edge).clone());
            node = &edge.from;
        }
        path.reverse();
        path
    }

    pub fn remove_edge(&mut self, from: &T, to: &T) -> Option<DependencyEdge<T>> {
        let targets = self.out.get_mut(from)?;
        let removed = targets.remove(to)?;
        if targets.is_empty() {
            self.out.remove(from);
        }
        self.edge_count -= 1;
        Some(removed)
    }

    /// Forget every edge touching `target`, typically once it is fully applied.
    pub fn remove_target(&mut self, target: &T) -> usize {
        let mut removed = self.out.remove(target).map_or(0, |targets| targets.len());
        self.out.retain(|_, targets| {
            if targets.remove(target).is_some() {
                removed += 1;
            }
            !targets.is_empty()
        });
        self.edge_count -= removed;
        removed
    }

    pub fn contains_edge(&self, from: &T, to: &T) -> bool {
        self.out
            .get(from)
            .is_some_and(|targets| targets.contains_key(to))
    }

    /// Targets that must wait for `from`.
    pub fn dependents(&self, from: &T) -> impl Iterator<Item = &DependencyEdge<T>> {
        self.out.get(from).into_iter().flat_map(|t| t.values())
    }

    pub fn edges(&self) -> impl Iterator<Item = &DependencyEdge<T>> {
        self.out.values().flat_map(|t| t.values())
    }

    /// Every target with at least one edge, sorted and deduplicated.
    pub fn targets(&self) -> Vec<&T> {
        let mut targets: Vec<&T> = self
            .out
            .iter()
            .flat_map(|(from, to)| std::iter::once(from).chain(to.keys()))
            .collect();
        targets.sort();
        targets.dedup();
        targets
    }

    pub fn len(&self) -> usize {
        self.edge_count
    }

    pub fn is_empty(&self) -> bool {
        self.edge_count == 0
    }

    pub fn clear(&mut self) {
        self.out.clear();
        self.edge_count = 0;
    }
}

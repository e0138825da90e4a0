//! The exclusive core context.
//!
//! At most one task runs core logic (graph mutation, metadata diffing,
//! directory-tree access) at a time. [`Token`] is the capability for doing
//! so: the core state is only reachable through a held token.
//!
//! The guarantee covers state owned by a [`Core`]. [`DependencyGraph`] and
//! the resolver take plain `&mut` so they can be unit-tested on their own; a
//! [`CoreState`] handed to [`Core::new`] is only reachable again through a
//! token, and that is where the engine mutates it.
//!
//! Remote I/O is the single sanctioned suspension point. Before blocking on
//! the network a holder calls [`Token::pseudo_pause`], which hands the core
//! to the next queued task and re-acquires it (FIFO) once the I/O is done.
//!
//! ```text
//! task A: [core]──pause──────────────(wait)──[core]
//! task B:        (wait)──[core]──pause──────────────(wait)──[core]
//! ```

use std::future::Future;
use std::ops::{Deref, DerefMut};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{Mutex, OwnedMutexGuard};

use crate::config::CoreConfig;
use crate::error::PauseError;
use crate::graph::DependencyGraph;
use crate::resolver::CoreContext;
use crate::tree::DirectoryTree;

/// Owner of the core state. Cheap to clone; clones share the same state.
pub struct Core<S> {
    state: Arc<Mutex<S>>,
    pause_timeout: Duration,
}

impl<S> Clone for Core<S> {
    fn clone(&self) -> Self {
        Self {
            state: Arc::clone(&self.state),
            pause_timeout: self.pause_timeout,
        }
    }
}

impl<S: Send + 'static> Core<S> {
    pub fn new(state: S, config: &CoreConfig) -> Self {
        Self {
            state: Arc::new(Mutex::new(state)),
            pause_timeout: config.pause_timeout(),
        }
    }

    /// Wait for exclusive ownership of the core.
    ///
    /// Waiters are served in arrival order.
    pub async fn acquire(&self) -> Token<S> {
        let guard = Arc::clone(&self.state).lock_owned().await;
        Token {
            guard,
            pause_timeout: self.pause_timeout,
        }
    }

    /// Non-blocking variant of [`Core::acquire`].
    pub fn try_acquire(&self) -> Option<Token<S>> {
        let guard = Arc::clone(&self.state).try_lock_owned().ok()?;
        Some(Token {
            guard,
            pause_timeout: self.pause_timeout,
        })
    }

}

/// Exclusive right to run core logic. Derefs to the core state.
///
/// Dropping the token releases the core.
pub struct Token<S> {
    guard: OwnedMutexGuard<S>,
    pause_timeout: Duration,
}

impl<S: Send + 'static> Token<S> {
    /// Release the core while `fut` runs, then block until it is ours again.
    ///
    /// The wait on `fut` is bounded by the configured pause timeout; on expiry
    /// `fut` is dropped and `PauseError::TimedOut` is returned. Either way the
    /// returned token holds the core.
    pub async fn pseudo_pause<F>(self, fut: F) -> (Token<S>, Result<F::Output, PauseError>)
    where
        F: Future,
    {
        let timeout = self.pause_timeout;
        let lock = OwnedMutexGuard::mutex(&self.guard).clone();
        drop(self.guard);

        let result = tokio::time::timeout(timeout, fut)
            .await
            .map_err(|_| PauseError::TimedOut(timeout));

        let guard = lock.lock_owned().await;
        (
            Token {
                guard,
                pause_timeout: timeout,
            },
            result,
        )
    }

    /// Release the core for a fixed delay.
    pub async fn sleep(self, delay: Duration) -> Token<S> {
        let timeout = self.pause_timeout;
        let lock = OwnedMutexGuard::mutex(&self.guard).clone();
        drop(self.guard);

        tokio::time::sleep(delay).await;

        Token {
            guard: lock.lock_owned().await,
            pause_timeout: timeout,
        }
    }
}

impl<S> Deref for Token<S> {
    type Target = S;

    fn deref(&self) -> &S {
        &self.guard
    }
}

impl<S> DerefMut for Token<S> {
    fn deref_mut(&mut self) -> &mut S {
        &mut self.guard
    }
}

/// Standard core state: the download dependency graph plus the directory tree.
///
/// Fields are public for setup before the state moves into a [`Core`].
pub struct CoreState<T, D> {
    pub graph: DependencyGraph<T>,
    pub tree: D,
}

impl<T: Ord + Clone, D> CoreState<T, D> {
    pub fn new(tree: D) -> Self {
        Self {
            graph: DependencyGraph::new(),
            tree,
        }
    }
}

impl<T: Ord + Clone, D: DirectoryTree> CoreContext<T> for CoreState<T, D> {
    type Tree = D;

    fn parts(&mut self) -> (&mut DependencyGraph<T>, &mut D) {
        (&mut self.graph, &mut self.tree)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::{DependencyEdge, NameConflict};
    use crate::resolver::{add_dependency, DeadlockResolver};
    use crate::tree::MemoryTree;
    use crate::types::{DeviceId, ObjectId, Version};
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn core(timeout_ms: u64) -> Core<Vec<&'static str>> {
        Core::new(
            Vec::new(),
            &CoreConfig {
                pause_timeout_ms: timeout_ms,
            },
        )
    }

    #[tokio::test]
    async fn test_token_is_exclusive() {
        let core = core(1_000);
        let token = core.acquire().await;
        assert!(core.try_acquire().is_none());
        drop(token);
        assert!(core.try_acquire().is_some());
    }

    #[tokio::test]
    async fn test_pseudo_pause_releases_core() {
        let core = core(1_000);
        let mut token = core.acquire().await;
        token.push("a-before");

        let (tx, rx) = tokio::sync::oneshot::channel::<()>();
        let other = core.clone();
        let handle = tokio::spawn(async move {
            let mut token = other.acquire().await;
            token.push("b");
            drop(token);
            tx.send(()).unwrap();
        });

        // B can only run while A is paused
        let (mut token, result) = token.pseudo_pause(rx).await;
        assert!(result.unwrap().is_ok());
        token.push("a-after");

        handle.await.unwrap();
        assert_eq!(*token, vec!["a-before", "b", "a-after"]);
    }

    #[tokio::test]
    async fn test_pseudo_pause_timeout() {
        let core = core(20);
        let token = core.acquire().await;

        let (token, result) = token.pseudo_pause(std::future::pending::<()>()).await;
        assert_eq!(
            result.unwrap_err(),
            PauseError::TimedOut(Duration::from_millis(20))
        );

        // Core is held again after the timeout
        assert!(core.try_acquire().is_none());
        drop(token);
    }

    #[tokio::test]
    async fn test_sleep_lets_others_run() {
        let core = core(1_000);
        let counter = Arc::new(AtomicUsize::new(0));
        let token = core.acquire().await;

        let other = core.clone();
        let seen = Arc::clone(&counter);
        let handle = tokio::spawn(async move {
            let _token = other.acquire().await;
            seen.fetch_add(1, Ordering::SeqCst);
        });

        let token = token.sleep(Duration::from_millis(20)).await;
        assert_eq!(counter.load(Ordering::SeqCst), 1);
        drop(token);
        handle.await.unwrap();
    }

    #[tokio::test]
    async fn test_core_state_resolved_through_token() {
        let mut tree = MemoryTree::new(DeviceId(1));
        tree.insert_file(ObjectId(11), ObjectId::ROOT, "a.txt");
        let core = Core::new(CoreState::<u32, _>::new(tree), &CoreConfig::default());
        let resolver = DeadlockResolver::new();

        let mut token = core.acquire().await;
        add_dependency(&mut *token, &resolver, DependencyEdge::parent(1, 2)).unwrap();
        let conflict = NameConflict {
            parent: ObjectId::ROOT,
            name: "a.txt".to_string(),
            remote: ObjectId(10),
            dependee: ObjectId(11),
            remote_version: Version::new(),
        };
        let resolution = add_dependency(
            &mut *token,
            &resolver,
            DependencyEdge::name_conflict(2, 1, conflict),
        )
        .unwrap()
        .unwrap();
        assert_eq!(resolution.new_name, "a (2).txt");
        drop(token);

        // The next holder sees the committed rename
        let token = core.acquire().await;
        assert!(core.try_acquire().is_none());
        assert_eq!(token.graph.len(), 1);
        assert_eq!(token.tree.child(ObjectId::ROOT, "a.txt"), Some(ObjectId(10)));
    }
}

//! Content download engine for sy peer sync.
//!
//! Fetches missing object content from remote devices, orders dependent
//! applies through a dependency graph, and breaks ordering cycles by
//! renaming one side of a name conflict.
//!
//! # Architecture
//!
//! ```text
//! collector ──> Downloads ──> Download ──(pseudo-pause)──> RemoteContent
//!                                │
//!                                ├──> ContentApplier ──> add_dependency
//!                                │                          │
//!                                │                 DependencyGraph ──(cycle)──> DeadlockResolver ──> DirectoryTree
//!                                └──> DownloadListener
//! ```
//!
//! All core state lives behind a single [`context::Core`]; a [`context::Token`] is
//! the only way to reach it. Remote I/O releases the token for the duration
//! of the round trip and re-acquires it before the reply is applied.

pub mod config;
pub mod context;
pub mod download;
pub mod error;
pub mod graph;
pub mod logging;
pub mod resolver;
pub mod tree;
pub mod types;

pub use config::Config;
pub use context::{Core, CoreState, Token};
pub use download::{
    ContentApplier, DeviceErrors, DeviceSelector, Download, DownloadDeps, DownloadListener,
    DownloadOutcome, Downloads, OrderedDevices, RemoteChangeChecker, RemoteContent, RemoteReply,
};
pub use error::{
    DownloadError, LocalError, PauseError, PerDeviceError, ResolveError, Result, SyncError,
    TreeError,
};
pub use graph::{DeadlockDetected, DependencyEdge, DependencyGraph, EdgeKind, NameConflict};
pub use resolver::{add_dependency, CoreContext, DeadlockResolver, Resolution};
pub use tree::{DirectoryTree, MemoryTree, ObjectMeta, TxId};
pub use types::{Component, DeviceId, ObjectId, StoreId, Target, Version};

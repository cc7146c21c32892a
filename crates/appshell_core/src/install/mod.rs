//! Install-prompt lifecycle.
//!
//! # Responsibility
//! - `lifecycle`: pure state machine and suppression policy.
//! - `storage`: durable key-value contract and the dismissal anchor.
//! - `controller`: platform prompt capture, persistence and notifications.

pub mod controller;
pub mod lifecycle;
pub mod storage;

pub use controller::{DeferredPrompt, DisplayMode, InstallController};
pub use lifecycle::{
    InstallEvent, InstallLifecycle, InstallOutcome, InstallState, SuppressionPolicy, Transition,
};
pub use storage::{
    DismissalStore, KeyValueStore, MemoryKeyValueStore, SqliteKeyValueStore, StorageError,
    StorageResult,
};

//! Version history of live notes.
//!
//! [`SnapshotPolicy`] turns a stream of mutation events into a bounded list of
//! [`Version`]s kept by a [`VersionStore`], which in turn writes through any
//! [`VersionStorage`] backend ([`MemoryStorage`], or `SqliteStorage` with the
//! `sqlite` feature).

mod fingerprint;
mod memory_storage;
mod policy;
#[cfg(all(not(target_arch = "wasm32"), feature = "sqlite"))]
mod sqlite_storage;
mod storage;
mod types;
mod version_store;

pub use fingerprint::fingerprint;
pub use memory_storage::MemoryStorage;
pub use policy::SnapshotPolicy;
#[cfg(all(not(target_arch = "wasm32"), feature = "sqlite"))]
pub use sqlite_storage::SqliteStorage;
pub use storage::{BatchOp, StorageResult, VersionStorage};
pub use types::{EditorInfo, RestoreOutcome, SnapshotOutcome, Version};
pub use version_store::{VersionStore, editor_key, version_key};

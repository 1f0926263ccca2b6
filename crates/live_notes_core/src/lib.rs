#![doc = include_str!("../README.md")]
#![warn(missing_docs)]

/// Configuration options
pub mod config;

/// Live note documents (yrs) and their structural snapshot
pub mod crdt;

/// Structural diff of note snapshots
pub mod diff;

/// Error (common error types)
pub mod error;

/// Version history (snapshot policy, version store, storage backends)
pub mod history;

pub use crdt::{DocNode, DocTree, NoteDoc, TextRun};
pub use diff::{DocumentDiff, compute_diff};
pub use error::{NotesError, Result};
pub use history::{SnapshotOutcome, SnapshotPolicy, Version, VersionStore};

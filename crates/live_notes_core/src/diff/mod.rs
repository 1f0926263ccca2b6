//! Structural diff of note snapshots.
//!
//! A snapshot is replayed into a fresh document, flattened into typed
//! [`Block`]s, and aligned against another snapshot's blocks. Matched blocks
//! get an inline diff: formatting-only when their text is equal, word-level
//! otherwise.
//!
//! ```ignore
//! use live_notes_core::diff::{BlockStatus, compute_diff};
//!
//! let diff = compute_diff(Some(&old_state), Some(&new_state));
//! for block in &diff.blocks {
//!     if block.status != BlockStatus::Unchanged {
//!         println!("{:?}: {}", block.status, block.display_text());
//!     }
//! }
//! ```

mod engine;
mod extract;
mod matcher;
mod segment;
mod types;

pub use engine::{compute_block_diff, compute_diff};
pub use extract::{extract_blocks, extract_blocks_from_snapshot};
pub use matcher::{SIMILARITY_THRESHOLD, match_blocks, similarity};
pub use segment::{SegmentDiff, diff_segments};
pub use types::{
    Block, BlockStatus, BlockType, DiffBlock, DiffSegment, DiffSummary, DocumentDiff, SegmentKind,
    Style, StyledRun, plain_text,
};

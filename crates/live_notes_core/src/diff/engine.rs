//! Snapshot-level diff entry points.

use super::extract::extract_blocks_from_snapshot;
use super::matcher::match_blocks;
use super::types::{Block, DocumentDiff};

/// Diff two full-state snapshots.
///
/// A missing or unreadable snapshot counts as a document without blocks, so
/// diffing against nothing reports every block as added (or removed).
pub fn compute_diff(old_snapshot: Option<&[u8]>, new_snapshot: Option<&[u8]>) -> DocumentDiff {
    let old = old_snapshot.map(extract_blocks_from_snapshot).unwrap_or_default();
    let new = new_snapshot.map(extract_blocks_from_snapshot).unwrap_or_default();
    compute_block_diff(&old, &new)
}

/// Diff two already-extracted block sequences.
pub fn compute_block_diff(old: &[Block], new: &[Block]) -> DocumentDiff {
    DocumentDiff::new(match_blocks(old, new))
}

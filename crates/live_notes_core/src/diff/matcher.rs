//! Aligning old and new block sequences.
//!
//! Blocks carry no identity across snapshots, so correspondence is rebuilt on
//! every comparison: first by identical text, then by word overlap. The
//! threshold and the pass order decide whether a rewritten paragraph reads as
//! `modified` or as `removed` plus `added`, and must not drift.

use std::collections::HashSet;

use super::segment::diff_segments;
use super::types::{Block, BlockStatus, DiffBlock, SegmentKind};

/// Minimum word overlap (exclusive) for a similarity match.
pub const SIMILARITY_THRESHOLD: f64 = 0.5;

/// Words shorter than this many characters are ignored by [`similarity`].
const MIN_WORD_LEN: usize = 3;

/// A matched old/new block pair.
#[derive(Debug, Clone, Copy, PartialEq)]
struct BlockMatch {
    old_idx: usize,
    new_idx: usize,
}

/// Word-overlap similarity of two texts in `[0, 1]`.
///
/// Equal texts score 1. Otherwise both texts are lower-cased and split on
/// whitespace, words of two characters or fewer are dropped, and the score is
/// the size of the intersection over the size of the larger word set.
pub fn similarity(a: &str, b: &str) -> f64 {
    if a == b {
        return 1.0;
    }
    if a.is_empty() || b.is_empty() {
        return 0.0;
    }

    let a_words = word_set(a);
    let b_words = word_set(b);
    if a_words.is_empty() || b_words.is_empty() {
        return 0.0;
    }

    let shared = a_words.intersection(&b_words).count();
    shared as f64 / a_words.len().max(b_words.len()) as f64
}

fn word_set(text: &str) -> HashSet<String> {
    text.to_lowercase()
        .split_whitespace()
        .filter(|w| w.chars().count() >= MIN_WORD_LEN)
        .map(str::to_string)
        .collect()
}

/// Pair up old and new blocks.
///
/// Pass one takes, for each old block in order, the first unused new block
/// with identical text. Pass two takes, for each remaining old block, the
/// unused new block with the highest similarity strictly above
/// [`SIMILARITY_THRESHOLD`]; the earliest candidate wins ties.
fn find_matches(old_texts: &[String], new_texts: &[String]) -> Vec<BlockMatch> {
    let mut matches = Vec::new();
    let mut used_old = vec![false; old_texts.len()];
    let mut used_new = vec![false; new_texts.len()];

    for (old_idx, old_text) in old_texts.iter().enumerate() {
        let exact = new_texts
            .iter()
            .enumerate()
            .find(|(new_idx, new_text)| !used_new[*new_idx] && *new_text == old_text);
        if let Some((new_idx, _)) = exact {
            matches.push(BlockMatch { old_idx, new_idx });
            used_old[old_idx] = true;
            used_new[new_idx] = true;
        }
    }

    for (old_idx, old_text) in old_texts.iter().enumerate() {
        if used_old[old_idx] {
            continue;
        }

        let mut best: Option<usize> = None;
        let mut best_score = SIMILARITY_THRESHOLD;
        for (new_idx, new_text) in new_texts.iter().enumerate() {
            if used_new[new_idx] {
                continue;
            }
            let score = similarity(old_text, new_text);
            if score > best_score {
                best_score = score;
                best = Some(new_idx);
            }
        }

        if let Some(new_idx) = best {
            matches.push(BlockMatch { old_idx, new_idx });
            used_old[old_idx] = true;
            used_new[new_idx] = true;
        }
    }

    matches
}

/// Compute the document-level diff of two block sequences.
///
/// Output follows new-document order. Unmatched old blocks are emitted as
/// `removed` just before the first match whose old index follows them, and
/// any left over are appended at the end.
pub fn match_blocks(old: &[Block], new: &[Block]) -> Vec<DiffBlock> {
    let old_texts: Vec<String> = old.iter().map(Block::plain_text).collect();
    let new_texts: Vec<String> = new.iter().map(Block::plain_text).collect();

    let matches = find_matches(&old_texts, &new_texts);
    let mut old_for_new: Vec<Option<usize>> = vec![None; new.len()];
    let mut matched_old = vec![false; old.len()];
    for m in &matches {
        old_for_new[m.new_idx] = Some(m.old_idx);
        matched_old[m.old_idx] = true;
    }

    let mut processed_old = vec![false; old.len()];
    let mut result = Vec::with_capacity(old.len().max(new.len()));

    for (new_idx, new_block) in new.iter().enumerate() {
        let Some(old_idx) = old_for_new[new_idx] else {
            result.push(DiffBlock::uniform(
                new_block,
                BlockStatus::Added,
                SegmentKind::Added,
            ));
            continue;
        };

        for (idx, old_block) in old.iter().enumerate().take(old_idx) {
            if !processed_old[idx] && !matched_old[idx] {
                result.push(removed(old_block));
                processed_old[idx] = true;
            }
        }
        processed_old[old_idx] = true;

        let old_block = &old[old_idx];
        let same_text = old_texts[old_idx] == new_texts[new_idx];
        let same_type = old_block.block_type == new_block.block_type;

        result.push(if same_text && same_type {
            let diff = diff_segments(&old_block.content, &new_block.content);
            let style_changed = diff
                .segments
                .iter()
                .any(|s| s.classification == SegmentKind::StyleChanged);
            DiffBlock {
                block_type: new_block.block_type,
                status: if style_changed || diff.is_style_only {
                    BlockStatus::StyleOnly
                } else {
                    BlockStatus::Unchanged
                },
                segments: diff.segments,
            }
        } else if same_text {
            // A type change (paragraph to heading) is reported as formatting.
            DiffBlock::uniform(new_block, BlockStatus::StyleOnly, SegmentKind::StyleChanged)
        } else {
            DiffBlock {
                block_type: new_block.block_type,
                status: BlockStatus::Modified,
                segments: diff_segments(&old_block.content, &new_block.content).segments,
            }
        });
    }

    for (idx, old_block) in old.iter().enumerate() {
        if !processed_old[idx] {
            result.push(removed(old_block));
        }
    }

    result
}

fn removed(block: &Block) -> DiffBlock {
    DiffBlock::uniform(block, BlockStatus::Removed, SegmentKind::Removed)
}

//! Flattening a note's structural tree into typed blocks.

use log::debug;

use super::types::{Block, BlockType, StyledRun};
use crate::crdt::{DocNode, DocTree, NoteDoc};

/// List kind inherited by `listItem` paragraphs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ListContext {
    Bullet,
    Ordered,
}

/// Flatten a structural tree into blocks in reading order.
///
/// - `paragraph` becomes a paragraph block
/// - `heading` becomes `heading1` for level 1 and `heading2` otherwise
/// - each direct `paragraph` child of a `listItem` becomes a list-item block
///   whose kind comes from the enclosing list
/// - any other element is transparent: its children are walked in place
pub fn extract_blocks(tree: &DocTree) -> Vec<Block> {
    let mut blocks = Vec::new();
    walk(&tree.nodes, None, &mut blocks);
    blocks
}

/// Replay a full-state snapshot and extract its blocks.
///
/// Snapshots that cannot be decoded yield no blocks; the diff then treats the
/// whole document as absent content.
pub fn extract_blocks_from_snapshot(snapshot: &[u8]) -> Vec<Block> {
    match NoteDoc::from_state(snapshot) {
        Ok(doc) => extract_blocks(&doc.structure()),
        Err(e) => {
            debug!("Skipping block extraction for unreadable snapshot: {}", e);
            Vec::new()
        }
    }
}

fn walk(nodes: &[DocNode], list: Option<ListContext>, blocks: &mut Vec<Block>) {
    for node in nodes {
        let Some(name) = node.name() else {
            continue;
        };

        match name {
            "paragraph" => blocks.push(Block::new(BlockType::Paragraph, collect_runs(node))),
            "heading" => {
                let block_type = if is_level_one(node) {
                    BlockType::Heading1
                } else {
                    BlockType::Heading2
                };
                blocks.push(Block::new(block_type, collect_runs(node)));
            }
            "bulletList" => walk(node.children(), Some(ListContext::Bullet), blocks),
            "orderedList" => walk(node.children(), Some(ListContext::Ordered), blocks),
            "listItem" => {
                let block_type = match list {
                    Some(ListContext::Ordered) => BlockType::OrderedListItem,
                    _ => BlockType::BulletListItem,
                };
                for child in node.children() {
                    if child.name() == Some("paragraph") {
                        blocks.push(Block::new(block_type, collect_runs(child)));
                    }
                }
            }
            _ => walk(node.children(), list, blocks),
        }
    }
}

fn is_level_one(heading: &DocNode) -> bool {
    heading
        .attr("level")
        .and_then(|level| level.trim().parse::<f64>().ok())
        .is_some_and(|level| level == 1.0)
}

/// Runs of a block element, with nested elements flattened in order.
fn collect_runs(node: &DocNode) -> Vec<StyledRun> {
    let mut runs = Vec::new();
    push_runs(node, &mut runs);
    runs
}

fn push_runs(node: &DocNode, runs: &mut Vec<StyledRun>) {
    match node {
        DocNode::Text { runs: text_runs } => {
            runs.extend(text_runs.iter().map(|r| r.run.clone()))
        }
        DocNode::Element { children, .. } => {
            for child in children {
                push_runs(child, runs);
            }
        }
    }
}

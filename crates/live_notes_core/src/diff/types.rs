//! Data types shared by the block extractor, matcher and segment differ.
//!
//! All types serialize to camelCase JSON and export TypeScript bindings so the
//! presentation layer can render a [`DocumentDiff`] directly.

use serde::{Deserialize, Serialize};
use ts_rs::TS;

/// Kind of a structural block.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export, export_to = "bindings/")]
pub enum BlockType {
    /// Plain paragraph
    Paragraph,
    /// Heading with level 1
    Heading1,
    /// Heading with any other level
    Heading2,
    /// Paragraph inside a bullet list item
    BulletListItem,
    /// Paragraph inside an ordered list item
    OrderedListItem,
}

/// A contiguous span of text sharing one formatting state.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
pub struct StyledRun {
    /// The text of this run
    pub text: String,
    /// Bold mark
    #[serde(default)]
    pub bold: bool,
    /// Italic mark
    #[serde(default)]
    pub italic: bool,
    /// Strikethrough mark
    #[serde(default)]
    pub strike: bool,
}

impl StyledRun {
    /// Create an unstyled run.
    pub fn plain(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            ..Default::default()
        }
    }

    /// Create a bold run.
    pub fn bold(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            bold: true,
            ..Default::default()
        }
    }

    /// Create an italic run.
    pub fn italic(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            italic: true,
            ..Default::default()
        }
    }

    /// Create a struck-through run.
    pub fn strike(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            strike: true,
            ..Default::default()
        }
    }

    /// The `(bold, italic, strike)` tuple of this run.
    pub fn style(&self) -> Style {
        Style {
            bold: self.bold,
            italic: self.italic,
            strike: self.strike,
        }
    }

    /// Copy this run's formatting onto different text.
    pub fn with_text(&self, text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            bold: self.bold,
            italic: self.italic,
            strike: self.strike,
        }
    }

    /// Whether any mark is set.
    pub fn is_styled(&self) -> bool {
        self.bold || self.italic || self.strike
    }
}

/// Formatting state of a single character.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct Style {
    /// Bold
    pub bold: bool,
    /// Italic
    pub italic: bool,
    /// Strikethrough
    pub strike: bool,
}

impl Style {
    /// Build a run with this style.
    pub fn run(self, text: impl Into<String>) -> StyledRun {
        StyledRun {
            text: text.into(),
            bold: self.bold,
            italic: self.italic,
            strike: self.strike,
        }
    }
}

/// One structural unit of document content.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
pub struct Block {
    /// Block kind
    #[serde(rename = "type")]
    pub block_type: BlockType,
    /// Styled runs; never empty (an empty block holds one empty run)
    pub content: Vec<StyledRun>,
}

impl Block {
    /// Create a block, normalizing empty content to a single empty run.
    pub fn new(block_type: BlockType, content: Vec<StyledRun>) -> Self {
        let content = if content.is_empty() {
            vec![StyledRun::default()]
        } else {
            content
        };
        Self {
            block_type,
            content,
        }
    }

    /// Convenience constructor for a block holding one unstyled run.
    pub fn plain(block_type: BlockType, text: impl Into<String>) -> Self {
        Self::new(block_type, vec![StyledRun::plain(text)])
    }

    /// Concatenated text of all runs.
    pub fn plain_text(&self) -> String {
        plain_text(&self.content)
    }
}

/// Concatenate the text of a run sequence.
pub fn plain_text(runs: &[StyledRun]) -> String {
    runs.iter().map(|r| r.text.as_str()).collect()
}

/// Classification of a diff segment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export, export_to = "bindings/")]
pub enum SegmentKind {
    /// Text only in the new version
    Added,
    /// Text only in the old version
    Removed,
    Unchanged,
    /// Same text, different formatting (`prior_run` holds the old one)
    StyleChanged,
}

/// A classified span of text inside a diff block.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export, export_to = "bindings/")]
pub struct DiffSegment {
    /// How this span changed
    pub classification: SegmentKind,
    /// The span, carrying its (new) formatting
    pub run: StyledRun,
    /// Formatting before the change, for style changes
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prior_run: Option<StyledRun>,
}

impl DiffSegment {
    /// A segment without prior formatting.
    pub fn new(classification: SegmentKind, run: StyledRun) -> Self {
        Self {
            classification,
            run,
            prior_run: None,
        }
    }

    /// A style change, recording the old formatting of the same text.
    pub fn style_changed(run: StyledRun, prior_run: StyledRun) -> Self {
        Self {
            classification: SegmentKind::StyleChanged,
            run,
            prior_run: Some(prior_run),
        }
    }
}

/// Status of a whole block in a document diff.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export, export_to = "bindings/")]
pub enum BlockStatus {
    Unchanged,
    /// Matched by similarity; the text differs
    Modified,
    Added,
    Removed,
    /// Same text, but the formatting or block type changed
    StyleOnly,
}

/// A block of the document-level diff.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
pub struct DiffBlock {
    /// The new block type, or the old one for removed blocks
    #[serde(rename = "type")]
    pub block_type: BlockType,
    /// Block-level classification
    pub status: BlockStatus,
    /// Ordered segments
    pub segments: Vec<DiffSegment>,
}

impl DiffBlock {
    /// Build a block whose runs all share one classification.
    pub(crate) fn uniform(block: &Block, status: BlockStatus, kind: SegmentKind) -> Self {
        Self {
            block_type: block.block_type,
            status,
            segments: block
                .content
                .iter()
                .map(|run| DiffSegment::new(kind, run.clone()))
                .collect(),
        }
    }

    /// Text of the block as displayed (all segments, including removed ones).
    pub fn display_text(&self) -> String {
        self.segments.iter().map(|s| s.run.text.as_str()).collect()
    }
}

/// Per-status block counts for summary display.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export, export_to = "bindings/")]
pub struct DiffSummary {
    /// Blocks only in the new version
    pub added: usize,
    /// Blocks only in the old version
    pub removed: usize,
    /// Similar blocks with edited text
    pub modified: usize,
    /// Blocks whose formatting changed
    pub style_only: usize,
}

impl DiffSummary {
    /// Count block statuses.
    pub fn from_blocks(blocks: &[DiffBlock]) -> Self {
        let mut summary = Self::default();
        for block in blocks {
            match block.status {
                BlockStatus::Added => summary.added += 1,
                BlockStatus::Removed => summary.removed += 1,
                BlockStatus::Modified => summary.modified += 1,
                BlockStatus::StyleOnly => summary.style_only += 1,
                BlockStatus::Unchanged => {}
            }
        }
        summary
    }

    /// True when no block changed.
    pub fn is_empty(&self) -> bool {
        self.added == 0 && self.removed == 0 && self.modified == 0 && self.style_only == 0
    }
}

/// The complete diff between two document snapshots.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
pub struct DocumentDiff {
    /// Ordered diff blocks, in new-document order
    pub blocks: Vec<DiffBlock>,
    /// Block counts by status
    pub summary: DiffSummary,
}

impl DocumentDiff {
    /// Wrap diff blocks, computing the summary.
    pub fn new(blocks: Vec<DiffBlock>) -> Self {
        let summary = DiffSummary::from_blocks(&blocks);
        Self { blocks, summary }
    }
}

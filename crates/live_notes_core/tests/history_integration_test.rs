//! Integration tests for version history and structural diffs

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use live_notes_core::crdt::{DocNode, NoteDoc};
use live_notes_core::diff::{
    Block, BlockStatus, BlockType, DiffSegment, SegmentKind, StyledRun, compute_block_diff,
    compute_diff, diff_segments, extract_blocks, extract_blocks_from_snapshot, match_blocks,
};
use live_notes_core::error::NotesError;
use live_notes_core::history::{
    BatchOp, MemoryStorage, SnapshotOutcome, SnapshotPolicy, StorageResult, VersionStorage,
};
use live_notes_core::config::HistoryConfig;

fn policy() -> SnapshotPolicy {
    SnapshotPolicy::new(Arc::new(MemoryStorage::new()), HistoryConfig::default())
}

fn paragraph(text: &str) -> DocNode {
    DocNode::paragraph(vec![StyledRun::plain(text)])
}

fn sample_doc() -> NoteDoc {
    let doc = NoteDoc::new();
    doc.set_title("Trip plan");
    doc.push_nodes(&[
        DocNode::heading(1, vec![StyledRun::plain("Trip plan")]),
        DocNode::paragraph(vec![
            StyledRun::plain("Leave on "),
            StyledRun::bold("Friday"),
            StyledRun::plain(" morning"),
        ]),
        DocNode::bullet_list(vec![
            vec![StyledRun::plain("passport")],
            vec![StyledRun::italic("charger")],
        ]),
        DocNode::ordered_list(vec![vec![StyledRun::plain("book hotel")]]),
    ]);
    doc
}

fn is_saved(outcome: &SnapshotOutcome) -> bool {
    matches!(outcome, SnapshotOutcome::Saved(_))
}

// ==================== Diff properties ====================

#[test]
fn diff_of_identical_snapshots_is_all_unchanged() {
    let state = sample_doc().encode_state_as_update();
    let diff = compute_diff(Some(&state), Some(&state));

    assert_eq!(diff.blocks.len(), 5);
    assert!(diff.blocks.iter().all(|b| b.status == BlockStatus::Unchanged));
    assert_eq!(diff.summary.added, 0);
    assert_eq!(diff.summary.removed, 0);
    assert_eq!(diff.summary.modified, 0);
    assert_eq!(diff.summary.style_only, 0);
}

#[test]
fn extracted_block_types_follow_document_structure() {
    let blocks = extract_blocks(&sample_doc().structure());
    let types: Vec<_> = blocks.iter().map(|b| b.block_type).collect();
    assert_eq!(
        types,
        vec![
            BlockType::Heading1,
            BlockType::Paragraph,
            BlockType::BulletListItem,
            BlockType::BulletListItem,
            BlockType::OrderedListItem,
        ]
    );
    assert_eq!(blocks[1].plain_text(), "Leave on Friday morning");
    assert_eq!(
        blocks[1].content,
        vec![
            StyledRun::plain("Leave on "),
            StyledRun::bold("Friday"),
            StyledRun::plain(" morning"),
        ]
    );
}

#[test]
fn word_diff_of_hello_world() {
    let diff = diff_segments(
        &[StyledRun::plain("Hello world")],
        &[StyledRun::plain("Hello there")],
    );

    let segments: Vec<_> = diff
        .segments
        .iter()
        .map(|s| (s.classification, s.run.text.as_str()))
        .collect();
    assert_eq!(
        segments,
        vec![
            (SegmentKind::Unchanged, "Hello"),
            (SegmentKind::Unchanged, " "),
            (SegmentKind::Removed, "world"),
            (SegmentKind::Added, "there"),
        ]
    );
}

#[test]
fn matched_rewrite_is_one_modified_block() {
    let old = [Block::plain(BlockType::Paragraph, "Hello wide world")];
    let new = [Block::plain(BlockType::Paragraph, "Hello wide there")];
    let diff = compute_block_diff(&old, &new);

    assert_eq!(diff.blocks.len(), 1);
    assert_eq!(diff.blocks[0].status, BlockStatus::Modified);
    let changed: Vec<_> = diff.blocks[0]
        .segments
        .iter()
        .filter(|s| s.classification != SegmentKind::Unchanged)
        .map(|s| (s.classification, s.run.text.as_str()))
        .collect();
    assert_eq!(
        changed,
        vec![(SegmentKind::Removed, "world"), (SegmentKind::Added, "there")]
    );
}

#[test]
fn appended_block_is_added() {
    let old = [Block::plain(BlockType::Paragraph, "A")];
    let new = [
        Block::plain(BlockType::Paragraph, "A"),
        Block::plain(BlockType::Paragraph, "B"),
    ];
    let diff = compute_block_diff(&old, &new);

    let statuses: Vec<_> = diff.blocks.iter().map(|b| b.status).collect();
    assert_eq!(statuses, vec![BlockStatus::Unchanged, BlockStatus::Added]);
    assert_eq!(diff.summary.added, 1);
}

#[test]
fn bold_toggle_is_style_only() {
    let old = [Block::new(BlockType::Paragraph, vec![StyledRun::plain("note")])];
    let new = [Block::new(BlockType::Paragraph, vec![StyledRun::bold("note")])];
    let diff = compute_block_diff(&old, &new);

    assert_eq!(diff.blocks.len(), 1);
    assert_eq!(diff.blocks[0].status, BlockStatus::StyleOnly);
    assert_eq!(
        diff.blocks[0].segments,
        vec![DiffSegment::style_changed(
            StyledRun::bold("note"),
            StyledRun::plain("note")
        )]
    );
    assert_eq!(diff.summary.style_only, 1);
}

#[test]
fn block_matching_is_deterministic() {
    let old: Vec<Block> = ["shopping list for saturday", "call the plumber", "x", "x"]
        .iter()
        .map(|t| Block::plain(BlockType::Paragraph, *t))
        .collect();
    let new: Vec<Block> = [
        "x",
        "shopping list for sunday",
        "call the plumber today",
        "x",
        "water plants",
    ]
    .iter()
    .map(|t| Block::plain(BlockType::BulletListItem, *t))
    .collect();

    let first = match_blocks(&old, &new);
    for _ in 0..20 {
        assert_eq!(match_blocks(&old, &new), first);
    }
}

#[test]
fn diff_between_edited_snapshots() {
    let doc = sample_doc();
    let before = doc.encode_state_as_update();

    // Drop the ordered list, add a closing paragraph
    doc.remove_nodes(3, 1);
    doc.push_nodes(&[paragraph("Bring snacks")]);
    let after = doc.encode_state_as_update();

    let diff = compute_diff(Some(&before), Some(&after));
    assert_eq!(diff.summary.added, 1);
    assert_eq!(diff.summary.removed, 1);
    assert_eq!(diff.summary.modified, 0);
    let last = diff.blocks.last().unwrap();
    assert_eq!(last.status, BlockStatus::Removed);
    assert_eq!(last.block_type, BlockType::OrderedListItem);
}

// ==================== Snapshot policy ====================

#[test]
fn two_edits_within_window_store_one_version() {
    let policy = policy();
    let doc = NoteDoc::new();

    doc.push_nodes(&[paragraph("first edit")]);
    assert!(is_saved(&policy.maybe_snapshot("note", &doc, 100_000).unwrap()));

    doc.push_nodes(&[paragraph("second edit")]);
    assert_eq!(
        policy.maybe_snapshot("note", &doc, 103_000).unwrap(),
        SnapshotOutcome::Throttled
    );
    assert_eq!(policy.list_versions("note").unwrap().len(), 1);

    doc.push_nodes(&[paragraph("third edit")]);
    assert!(is_saved(&policy.maybe_snapshot("note", &doc, 109_000).unwrap()));
    assert_eq!(policy.list_versions("note").unwrap().len(), 2);
}

#[test]
fn unchanged_document_records_nothing_after_window() {
    let policy = policy();
    let doc = sample_doc();
    assert!(is_saved(&policy.maybe_snapshot("note", &doc, 0).unwrap()));
    assert_eq!(
        policy.maybe_snapshot("note", &doc, 10_000).unwrap(),
        SnapshotOutcome::Unchanged
    );
    assert_eq!(policy.list_versions("note").unwrap().len(), 1);
}

#[test]
fn retention_keeps_most_recent_hundred() {
    let storage = Arc::new(MemoryStorage::new());
    let policy = SnapshotPolicy::new(storage.clone(), HistoryConfig::default());
    let doc = NoteDoc::new();

    for n in 0..150i64 {
        doc.set_title(&format!("revision {}", n));
        let outcome = policy.maybe_snapshot("note", &doc, n * 5_000).unwrap();
        assert!(is_saved(&outcome), "revision {} not saved", n);
    }

    let versions = policy.list_versions("note").unwrap();
    assert_eq!(versions.len(), 100);
    let expected: Vec<String> = (50..150i64).rev().map(|n| format!("v_{}", n * 5_000)).collect();
    let ids: Vec<String> = versions.iter().map(|v| v.id.clone()).collect();
    assert_eq!(ids, expected);
    assert_eq!(versions[0].title, "revision 149");

    let blobs = storage
        .keys("note")
        .unwrap()
        .into_iter()
        .filter(|k| k.starts_with("version:"))
        .count();
    assert_eq!(blobs, 100);
    assert!(policy.get_version_content("note", "v_0").unwrap_err().is_not_found());
}

#[test]
fn restore_round_trip_reproduces_version() {
    let policy = policy();
    let doc = sample_doc();
    let original = policy.maybe_snapshot("note", &doc, 0).unwrap();
    let original_id = original.version().unwrap().id.clone();
    let original_blocks =
        extract_blocks_from_snapshot(&policy.get_version_content("note", &original_id).unwrap());

    // Rewrite the note heavily
    doc.remove_nodes(0, 2);
    doc.push_nodes(&[paragraph("completely different"), paragraph("content")]);
    doc.set_title("Other");
    assert!(is_saved(&policy.maybe_snapshot("note", &doc, 10_000).unwrap()));

    let restored = policy
        .restore_version("note", &original_id, &doc, 20_000)
        .unwrap();
    let latest = restored.snapshot.version().unwrap();
    assert_eq!(latest.title, "Trip plan");

    let latest_blocks =
        extract_blocks_from_snapshot(&policy.get_version_content("note", &latest.id).unwrap());
    assert_eq!(latest_blocks, original_blocks);
    assert!(compute_block_diff(&original_blocks, &latest_blocks).summary.is_empty());
}

/// A note written the way the editor writes it: marks are closed with
/// explicit nulls and links are their own attribute.
fn editor_written_state() -> Vec<u8> {
    use yrs::types::Attrs;
    use yrs::{
        Any, Doc, Map, ReadTxn, Text, Transact, Xml, XmlElementPrelim, XmlFragment, XmlTextPrelim,
    };

    let doc = Doc::new();
    let content = doc.get_or_insert_xml_fragment("default");
    let meta = doc.get_or_insert_map("meta");
    {
        let mut txn = doc.transact_mut();
        meta.insert(&mut txn, "title", "Release");

        let heading = content.push_back(&mut txn, XmlElementPrelim::empty("heading"));
        heading.insert_attribute(&mut txn, "level", Any::Number(1.0));
        let text = heading.push_back(&mut txn, XmlTextPrelim::new(""));
        text.insert(&mut txn, 0, "Release");

        let paragraph = content.push_back(&mut txn, XmlElementPrelim::empty("paragraph"));
        let text = paragraph.push_back(&mut txn, XmlTextPrelim::new(""));
        let bold = |set: bool| {
            let value = if set { Any::Bool(true) } else { Any::Null };
            Attrs::from([(Arc::from("bold"), value)])
        };
        text.insert_with_attributes(&mut txn, 0, "Ship", bold(true));
        text.insert_with_attributes(&mut txn, 4, " it", bold(false));
        text.insert_with_attributes(&mut txn, 7, " now", bold(true));
        let link = Attrs::from([
            (Arc::from("bold"), Any::Null),
            (Arc::from("link"), Any::from("https://example.com/notes")),
        ]);
        text.insert_with_attributes(&mut txn, 11, " (notes)", link);
    }
    let txn = doc.transact();
    txn.encode_state_as_update_v1(&yrs::StateVector::default())
}

#[test]
fn restore_of_editor_written_note_is_exact() {
    let policy = policy();
    let source = NoteDoc::from_state(&editor_written_state()).unwrap();
    let source_blocks = extract_blocks(&source.structure());
    assert_eq!(
        source_blocks[1].content,
        vec![
            StyledRun::bold("Ship"),
            StyledRun::plain(" it"),
            StyledRun::bold(" now"),
            StyledRun::plain(" (notes)"),
        ]
    );

    let live = NoteDoc::from_state(&source.encode_state_as_update()).unwrap();
    let v1 = policy.maybe_snapshot("note", &live, 0).unwrap();
    let v1_id = v1.version().unwrap().id.clone();

    live.remove_nodes(1, 1);
    live.push_nodes(&[DocNode::paragraph(vec![StyledRun::italic("rewritten")])]);
    assert!(is_saved(&policy.maybe_snapshot("note", &live, 10_000).unwrap()));

    let restored = policy.restore_version("note", &v1_id, &live, 20_000).unwrap();
    let latest = restored.snapshot.version().unwrap();

    let v1_blob = policy.get_version_content("note", &v1_id).unwrap();
    let restored_blob = policy.get_version_content("note", &latest.id).unwrap();
    let diff = compute_diff(Some(&v1_blob), Some(&restored_blob));
    assert!(diff.summary.is_empty());
    assert_eq!(extract_blocks_from_snapshot(&restored_blob), source_blocks);

    // The link survives too, not only the marks the diff compares
    let restored_doc = NoteDoc::from_state(&restored_blob).unwrap();
    assert_eq!(restored_doc.structure(), source.structure());
    assert_eq!(restored_doc.title().as_deref(), Some("Release"));
}

#[test]
fn restore_update_converges_peers() {
    let policy = policy();
    let server_doc = sample_doc();
    let v1 = policy.maybe_snapshot("note", &server_doc, 0).unwrap();

    server_doc.push_nodes(&[paragraph("later addition")]);
    let peer = NoteDoc::from_state(&server_doc.encode_state_as_update()).unwrap();

    let outcome = policy
        .restore_version("note", &v1.version().unwrap().id, &server_doc, 30_000)
        .unwrap();
    peer.apply_update(&outcome.update).unwrap();

    assert_eq!(peer.structure(), server_doc.structure());
    assert_eq!(
        extract_blocks(&peer.structure()),
        extract_blocks(&sample_doc().structure())
    );
}

#[test]
fn restore_unknown_version_is_not_found() {
    let policy = policy();
    let doc = sample_doc();
    let err = policy
        .restore_version("note", "v_missing", &doc, 0)
        .unwrap_err();
    assert!(matches!(err, NotesError::NotFound { .. }));
    // Live document untouched
    assert_eq!(doc.structure(), sample_doc().structure());
}

#[test]
fn malformed_attribution_changes_nothing() {
    let policy = policy();
    policy
        .register_active_editor("note", "conn-1", "Grace", "#00aa00")
        .unwrap();

    let err = policy
        .register_active_editor("note", "conn-2", "", "#123456")
        .unwrap_err();
    assert!(matches!(err, NotesError::MalformedInput(_)));

    let outcome = policy.maybe_snapshot("note", &sample_doc(), 0).unwrap();
    assert_eq!(outcome.version().unwrap().edited_by, "Grace");
    assert!(policy.store().editor("note", "conn-2").unwrap().is_none());
}

#[test]
fn documents_are_independent() {
    let policy = policy();
    let a = sample_doc();
    let b = NoteDoc::new();
    b.push_nodes(&[paragraph("other note")]);

    assert!(is_saved(&policy.maybe_snapshot("a", &a, 0).unwrap()));
    assert!(is_saved(&policy.maybe_snapshot("b", &b, 1).unwrap()));
    assert_eq!(policy.list_versions("a").unwrap().len(), 1);
    assert_eq!(policy.list_versions("b").unwrap().len(), 1);
}

#[test]
fn racing_snapshots_record_one_version() {
    let policy = Arc::new(policy());
    let state = sample_doc().encode_state_as_update();

    let handles: Vec<_> = (0..8)
        .map(|_| {
            let policy = Arc::clone(&policy);
            let state = state.clone();
            std::thread::spawn(move || {
                let doc = NoteDoc::from_state(&state).unwrap();
                policy.maybe_snapshot("note", &doc, 42_000).unwrap()
            })
        })
        .collect();

    let saved = handles
        .into_iter()
        .map(|h| h.join().unwrap())
        .filter(is_saved)
        .count();
    assert_eq!(saved, 1);
    assert_eq!(policy.list_versions("note").unwrap().len(), 1);
}

// ==================== Storage failures ====================

/// Memory storage whose batches can be made to fail.
#[derive(Default)]
struct FlakyStorage {
    inner: MemoryStorage,
    fail_batches: AtomicBool,
}

impl VersionStorage for FlakyStorage {
    fn get(&self, doc_id: &str, key: &str) -> StorageResult<Option<Vec<u8>>> {
        self.inner.get(doc_id, key)
    }

    fn put(&self, doc_id: &str, key: &str, value: &[u8]) -> StorageResult<()> {
        self.inner.put(doc_id, key, value)
    }

    fn delete(&self, doc_id: &str, key: &str) -> StorageResult<()> {
        self.inner.delete(doc_id, key)
    }

    fn keys(&self, doc_id: &str) -> StorageResult<Vec<String>> {
        self.inner.keys(doc_id)
    }

    fn apply_batch(&self, doc_id: &str, ops: &[BatchOp]) -> StorageResult<()> {
        if self.fail_batches.load(Ordering::SeqCst) {
            return Err(NotesError::Storage("disk full".to_string()));
        }
        self.inner.apply_batch(doc_id, ops)
    }
}

#[test]
fn failed_write_leaves_policy_state_for_retry() {
    let storage = Arc::new(FlakyStorage::default());
    let policy = SnapshotPolicy::new(storage.clone(), HistoryConfig::default());
    let doc = sample_doc();

    storage.fail_batches.store(true, Ordering::SeqCst);
    let err = policy.maybe_snapshot("note", &doc, 1_000).unwrap_err();
    assert!(matches!(err, NotesError::Storage(_)));
    assert!(policy.list_versions("note").unwrap().is_empty());
    assert!(policy.store().last_save("note").unwrap().is_none());
    assert!(policy.store().last_state_hash("note").unwrap().is_none());

    // The retry is neither throttled nor treated as unchanged
    storage.fail_batches.store(false, Ordering::SeqCst);
    let outcome = policy.maybe_snapshot("note", &doc, 1_500).unwrap();
    assert!(is_saved(&outcome));
    assert_eq!(policy.list_versions("note").unwrap().len(), 1);
}

#[cfg(feature = "sqlite")]
mod sqlite {
    use super::*;
    use live_notes_core::history::SqliteStorage;

    #[test]
    fn history_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("notes.db");
        let doc = sample_doc();

        let saved_id = {
            let storage = Arc::new(SqliteStorage::open(&path).unwrap());
            let policy = SnapshotPolicy::new(storage, HistoryConfig::default());
            policy
                .register_active_editor("note", "conn-1", "Ada", "#ff5722")
                .unwrap();
            let outcome = policy.maybe_snapshot("note", &doc, 0).unwrap();
            outcome.version().unwrap().id.clone()
        };

        let storage = Arc::new(SqliteStorage::open(&path).unwrap());
        let policy = SnapshotPolicy::new(storage, HistoryConfig::default());
        let versions = policy.list_versions("note").unwrap();
        assert_eq!(versions.len(), 1);
        assert_eq!(versions[0].id, saved_id);
        assert_eq!(versions[0].edited_by, "Ada");

        // Throttle state persisted too
        assert_eq!(
            policy.maybe_snapshot("note", &doc, 1_000).unwrap(),
            SnapshotOutcome::Throttled
        );
        assert_eq!(
            policy.maybe_snapshot("note", &doc, 6_000).unwrap(),
            SnapshotOutcome::Unchanged
        );
    }
}

//! CRDT layer for live notes.
//!
//! [`NoteDoc`] wraps the yrs document that editors mutate in real time, and
//! [`DocTree`] is the read-only structural copy of its content that the diff
//! engine walks.

mod note_doc;
mod structure;

pub use note_doc::NoteDoc;
pub use structure::{DocNode, DocTree, TextRun};

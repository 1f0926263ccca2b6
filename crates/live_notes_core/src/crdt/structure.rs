//! Read-only structural snapshot of a note document.
//!
//! The editor stores its content in a Y.XmlFragment: element nodes named after
//! the rich-text schema (`paragraph`, `heading`, `bulletList`, ...) whose leaves
//! are Y.XmlText values carrying formatting attributes. This module copies that
//! tree into plain [`DocNode`] values so the diff engine never touches yrs
//! branches, transactions or item identity.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use yrs::types::text::{Diff, YChange};
use yrs::{
    Any, Out, ReadTxn, Text, TransactionMut, Xml, XmlElementPrelim, XmlFragment, XmlOut,
    XmlTextPrelim,
};

use crate::diff::StyledRun;

/// Text attribute names that map onto [`StyledRun`] marks.
const BOLD_ATTR: &str = "bold";
const ITALIC_ATTR: &str = "italic";
const STRIKE_ATTR: &str = "strike";

/// A node of the structural snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum DocNode {
    /// A typed element with attributes and ordered children.
    Element {
        name: String,
        #[serde(default)]
        attrs: BTreeMap<String, String>,
        #[serde(default)]
        children: Vec<DocNode>,
    },
    /// A text leaf, already split into runs of uniform formatting.
    Text { runs: Vec<TextRun> },
}

/// One formatted span of a text leaf.
///
/// The marks the diff engine compares live in `run`; every other formatting
/// attribute (links, inline code, colors) is kept in `extra` so a restore
/// writes it back unchanged.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TextRun {
    #[serde(flatten)]
    pub run: StyledRun,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub extra: BTreeMap<String, Value>,
}

impl TextRun {
    /// Attach a formatting attribute the diff engine does not compare.
    pub fn with_extra(mut self, name: impl Into<String>, value: Value) -> Self {
        self.extra.insert(name.into(), value);
        self
    }
}

impl From<StyledRun> for TextRun {
    fn from(run: StyledRun) -> Self {
        Self {
            run,
            extra: BTreeMap::new(),
        }
    }
}

impl DocNode {
    /// Create an element node.
    pub fn element(name: impl Into<String>, children: Vec<DocNode>) -> Self {
        DocNode::Element {
            name: name.into(),
            attrs: BTreeMap::new(),
            children,
        }
    }

    /// Create a text leaf.
    pub fn text(runs: Vec<StyledRun>) -> Self {
        DocNode::Text {
            runs: runs.into_iter().map(TextRun::from).collect(),
        }
    }

    /// A `paragraph` holding the given runs.
    pub fn paragraph(runs: Vec<StyledRun>) -> Self {
        Self::element("paragraph", text_children(runs))
    }

    /// A `heading` with a `level` attribute.
    pub fn heading(level: u8, runs: Vec<StyledRun>) -> Self {
        Self::element("heading", text_children(runs)).with_attr("level", level.to_string())
    }

    /// A `bulletList` with one `listItem` per entry.
    pub fn bullet_list(items: Vec<Vec<StyledRun>>) -> Self {
        Self::element("bulletList", list_items(items))
    }

    /// An `orderedList` with one `listItem` per entry.
    pub fn ordered_list(items: Vec<Vec<StyledRun>>) -> Self {
        Self::element("orderedList", list_items(items))
    }

    /// Set an attribute on an element node. Text nodes are returned unchanged.
    pub fn with_attr(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        if let DocNode::Element { attrs, .. } = &mut self {
            attrs.insert(key.into(), value.into());
        }
        self
    }

    /// Element name, or `None` for text leaves.
    pub fn name(&self) -> Option<&str> {
        match self {
            DocNode::Element { name, .. } => Some(name),
            DocNode::Text { .. } => None,
        }
    }

    /// Attribute value of an element node.
    pub fn attr(&self, key: &str) -> Option<&str> {
        match self {
            DocNode::Element { attrs, .. } => attrs.get(key).map(String::as_str),
            DocNode::Text { .. } => None,
        }
    }

    /// Ordered children (empty for text leaves).
    pub fn children(&self) -> &[DocNode] {
        match self {
            DocNode::Element { children, .. } => children,
            DocNode::Text { .. } => &[],
        }
    }
}

fn text_children(runs: Vec<StyledRun>) -> Vec<DocNode> {
    if runs.is_empty() {
        Vec::new()
    } else {
        vec![DocNode::text(runs)]
    }
}

fn list_items(items: Vec<Vec<StyledRun>>) -> Vec<DocNode> {
    items
        .into_iter()
        .map(|runs| DocNode::element("listItem", vec![DocNode::paragraph(runs)]))
        .collect()
}

/// The top-level forest of a note document.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocTree {
    /// Top-level nodes in document order
    pub nodes: Vec<DocNode>,
}

impl DocTree {
    /// Wrap a list of top-level nodes.
    pub fn new(nodes: Vec<DocNode>) -> Self {
        Self { nodes }
    }

    /// True when the document has no top-level nodes.
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }
}

// ==================== Reading from yrs ====================

/// Copy the children of an XML fragment (or element) into [`DocNode`]s.
pub(crate) fn read_children<F: XmlFragment, T: ReadTxn>(parent: &F, txn: &T) -> Vec<DocNode> {
    let len = parent.len(txn);
    let mut nodes = Vec::with_capacity(len as usize);
    for index in 0..len {
        if let Some(child) = parent.get(txn, index)
            && let Some(node) = read_node(child, txn)
        {
            nodes.push(node);
        }
    }
    nodes
}

fn read_node<T: ReadTxn>(node: XmlOut, txn: &T) -> Option<DocNode> {
    match node {
        XmlOut::Element(element) => {
            let attrs = element
                .attributes(txn)
                .map(|(key, value)| (key.to_string(), value.to_string(txn)))
                .collect();
            Some(DocNode::Element {
                name: element.tag().to_string(),
                attrs,
                children: read_children(&element, txn),
            })
        }
        XmlOut::Text(text) => {
            let runs = text
                .diff(txn, YChange::identity)
                .into_iter()
                .filter_map(run_from_diff)
                .collect();
            Some(DocNode::Text { runs })
        }
        // Nested fragments carry no schema name; keep their children in place.
        XmlOut::Fragment(fragment) => Some(DocNode::element(
            "fragment",
            read_children(&fragment, txn),
        )),
    }
}

fn run_from_diff(diff: Diff<YChange>) -> Option<TextRun> {
    let text = match diff.insert {
        Out::Any(Any::String(s)) => s.to_string(),
        // Embeds (images, mentions) have no text to diff.
        _ => return None,
    };
    let attrs = diff.attributes.map(|a| *a).unwrap_or_default();
    let mark = |name: &str| attrs.get(name).is_some_and(is_truthy);
    let run = StyledRun {
        text,
        bold: mark(BOLD_ATTR),
        italic: mark(ITALIC_ATTR),
        strike: mark(STRIKE_ATTR),
    };
    let extra = attrs
        .iter()
        .filter(|(name, value)| !is_mark(name) && !matches!(value, Any::Null | Any::Undefined))
        .map(|(name, value)| (name.to_string(), any_to_json(value)))
        .collect();
    Some(TextRun { run, extra })
}

fn is_mark(name: &str) -> bool {
    matches!(name, BOLD_ATTR | ITALIC_ATTR | STRIKE_ATTR)
}

/// Mark attributes are usually `{}` or `true`; anything but an explicit
/// null/false/empty value counts as set.
fn is_truthy(value: &Any) -> bool {
    match value {
        Any::Null | Any::Undefined => false,
        Any::Bool(b) => *b,
        Any::Number(n) => *n != 0.0,
        Any::BigInt(n) => *n != 0,
        Any::String(s) => !s.is_empty(),
        _ => true,
    }
}

// ==================== Writing to yrs ====================

/// Append [`DocNode`]s to an XML fragment (or element) inside a transaction.
pub(crate) fn write_children<F: XmlFragment>(
    parent: &F,
    txn: &mut TransactionMut,
    children: &[DocNode],
) {
    for child in children {
        match child {
            DocNode::Element {
                name,
                attrs,
                children,
            } => {
                let element = parent.push_back(txn, XmlElementPrelim::empty(name.as_str()));
                for (key, value) in attrs {
                    element.insert_attribute(txn, key.as_str(), attr_value(value));
                }
                write_children(&element, txn, children);
            }
            DocNode::Text { runs } => {
                let text = parent.push_back(txn, XmlTextPrelim::new(""));
                // Every run states all of its attributes; text appended after a
                // formatted run would otherwise inherit that formatting.
                let mut previous: Vec<&str> = Vec::new();
                for run in runs.iter().filter(|r| !r.run.text.is_empty()) {
                    let end = text.len(&*txn);
                    let attrs = run_attributes(run, &previous);
                    text.insert_with_attributes(txn, end, &run.run.text, attrs);
                    previous = run.extra.keys().map(String::as_str).collect();
                }
            }
        }
    }
}

/// Numeric attributes (heading levels) are written back as numbers, the way
/// the editor schema stores them.
fn attr_value(value: &str) -> Any {
    match value.parse::<i64>() {
        Ok(n) => Any::Number(n as f64),
        Err(_) => Any::String(Arc::from(value)),
    }
}

/// Attributes for one run: its marks (null when unset), its other attributes,
/// and null for whatever the previous run set that this one does not.
fn run_attributes(run: &TextRun, previous: &[&str]) -> yrs::types::Attrs {
    let mut attrs: yrs::types::Attrs = previous
        .iter()
        .map(|name| (Arc::from(*name), Any::Null))
        .collect();
    for (name, value) in &run.extra {
        attrs.insert(Arc::from(name.as_str()), json_to_any(value));
    }
    for (name, set) in [
        (BOLD_ATTR, run.run.bold),
        (ITALIC_ATTR, run.run.italic),
        (STRIKE_ATTR, run.run.strike),
    ] {
        let value = if set { Any::Bool(true) } else { Any::Null };
        attrs.insert(Arc::from(name), value);
    }
    attrs
}

fn any_to_json(value: &Any) -> Value {
    match value {
        Any::Null | Any::Undefined => Value::Null,
        Any::Bool(b) => Value::Bool(*b),
        Any::Number(n) if n.fract() == 0.0 && n.abs() < i64::MAX as f64 => Value::from(*n as i64),
        Any::Number(n) => Value::from(*n),
        Any::BigInt(n) => Value::from(*n),
        Any::String(s) => Value::String(s.to_string()),
        Any::Buffer(bytes) => Value::Array(bytes.iter().map(|b| Value::from(*b)).collect()),
        Any::Array(items) => Value::Array(items.iter().map(any_to_json).collect()),
        Any::Map(entries) => Value::Object(
            entries
                .iter()
                .map(|(key, value)| (key.to_string(), any_to_json(value)))
                .collect(),
        ),
    }
}

fn json_to_any(value: &Value) -> Any {
    match value {
        Value::Null => Any::Null,
        Value::Bool(b) => Any::Bool(*b),
        Value::Number(n) => Any::Number(n.as_f64().unwrap_or_default()),
        Value::String(s) => Any::String(Arc::from(s.as_str())),
        Value::Array(items) => {
            Any::Array(items.iter().map(json_to_any).collect::<Vec<_>>().into())
        }
        Value::Object(entries) => Any::Map(Arc::new(
            entries
                .iter()
                .map(|(key, value)| (key.clone(), json_to_any(value)))
                .collect::<HashMap<_, _>>(),
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builders_shape() {
        let heading = DocNode::heading(1, vec![StyledRun::plain("Title")]);
        assert_eq!(heading.name(), Some("heading"));
        assert_eq!(heading.attr("level"), Some("1"));
        assert_eq!(heading.children().len(), 1);

        let list = DocNode::bullet_list(vec![vec![StyledRun::plain("a")], vec![]]);
        assert_eq!(list.children().len(), 2);
        assert_eq!(list.children()[0].name(), Some("listItem"));
        assert_eq!(list.children()[0].children()[0].name(), Some("paragraph"));
        // Empty item has a paragraph with no text leaf.
        assert!(list.children()[1].children()[0].children().is_empty());
    }

    #[test]
    fn test_text_node_has_no_attrs_or_children() {
        let text = DocNode::text(vec![StyledRun::plain("x")]).with_attr("level", "1");
        assert_eq!(text.attr("level"), None);
        assert!(text.children().is_empty());
        assert_eq!(text.name(), None);
    }

    #[test]
    fn test_truthiness_of_mark_values() {
        assert!(is_truthy(&Any::Bool(true)));
        assert!(!is_truthy(&Any::Bool(false)));
        assert!(!is_truthy(&Any::Null));
        assert!(is_truthy(&Any::Number(1.0)));
        assert!(!is_truthy(&Any::String(Arc::from(""))));
    }

    #[test]
    fn test_attr_value_numbers() {
        assert_eq!(attr_value("2"), Any::Number(2.0));
        assert_eq!(attr_value("left"), Any::String(Arc::from("left")));
    }

    #[test]
    fn test_attribute_values_convert_both_ways() {
        let link = serde_json::json!({ "href": "https://example.com", "target": null });
        assert_eq!(any_to_json(&json_to_any(&link)), link);
        assert_eq!(any_to_json(&Any::Number(2.0)), serde_json::json!(2));
        assert_eq!(any_to_json(&Any::Number(0.5)), serde_json::json!(0.5));
    }

    #[test]
    fn test_marks_are_always_written() {
        let attrs = run_attributes(&TextRun::from(StyledRun::plain("x")), &["link"]);
        assert_eq!(attrs.get(BOLD_ATTR), Some(&Any::Null));
        assert_eq!(attrs.get(ITALIC_ATTR), Some(&Any::Null));
        assert_eq!(attrs.get(STRIKE_ATTR), Some(&Any::Null));
        assert_eq!(attrs.get("link"), Some(&Any::Null));

        let code =
            TextRun::from(StyledRun::bold("y")).with_extra("code", serde_json::json!(true));
        let attrs = run_attributes(&code, &["code"]);
        assert_eq!(attrs.get(BOLD_ATTR), Some(&Any::Bool(true)));
        assert_eq!(attrs.get("code"), Some(&Any::Bool(true)));
    }

    #[test]
    fn test_tree_json_roundtrip_shape() {
        let tree = DocTree::new(vec![DocNode::paragraph(vec![StyledRun::bold("x")])]);
        let json = serde_json::to_value(&tree).unwrap();
        assert_eq!(json["nodes"][0]["kind"], "element");
        assert_eq!(json["nodes"][0]["children"][0]["kind"], "text");
        assert_eq!(json["nodes"][0]["children"][0]["runs"][0]["bold"], true);
        assert!(json["nodes"][0]["children"][0]["runs"][0].get("extra").is_none());
    }
}

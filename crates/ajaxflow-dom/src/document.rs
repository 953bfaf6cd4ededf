//! Arena-backed document.
//!
//! # Layout
//!
//! ```text
//! slots: [ #0 Document ─┐
//!          #1 <html>  ◄─┘ ─┬─► #2 <head> ─► ...
//!                          └─► #3 <body> ─► ...
//!          #4.. everything else, attached or detached ]
//! ```
//!
//! The root, `<html>`, `<head>` and `<body>` always exist and never
//! move. Everything below them changes only through
//! [`Document::apply`](crate::DomPatch).
//!
//! Lookups such as [`element_by_id`](Document::element_by_id) walk the
//! live tree every time. There is no id cache, so a lookup made after
//! a replacement sees the replacement.

use crate::markup::{Fragment, MarkupNode};
use crate::node::{ElementData, NodeData, NodeId, Slot};
use crate::serialize::{write_comment, write_end_tag, write_start_tag, write_text};
use crate::{DomError, MarkupError};
use parking_lot::Mutex;
use std::sync::Arc;

/// A document shared between the runtime, calls and script hosts.
///
/// The lock is only ever held for the duration of a synchronous
/// mutation or query, never across an `.await` or a subscriber call.
pub type SharedDocument = Arc<Mutex<Document>>;

/// A live HTML document.
///
/// # Example
///
/// ```
/// use ajaxflow_dom::Document;
///
/// let doc = Document::parse(
///     "<html><head><title>Shop</title></head><body><div id=\"cart\">0</div></body></html>",
/// ).unwrap();
///
/// let cart = doc.element_by_id("cart").unwrap();
/// assert_eq!(doc.text_content(cart), "0");
/// assert_eq!(doc.title(), "Shop");
/// ```
#[derive(Debug, Clone)]
pub struct Document {
    slots: Vec<Slot>,
    root: NodeId,
    html: NodeId,
    head: NodeId,
    body: NodeId,
}

impl Document {
    /// Creates `<html><head></head><body></body></html>`.
    #[must_use]
    pub fn new() -> Self {
        let mut doc = Self {
            slots: Vec::new(),
            root: NodeId::from_raw(0),
            html: NodeId::from_raw(0),
            head: NodeId::from_raw(0),
            body: NodeId::from_raw(0),
        };
        doc.root = doc.alloc(NodeData::Document);
        doc.html = doc.alloc_element("html");
        doc.head = doc.alloc_element("head");
        doc.body = doc.alloc_element("body");
        doc.append(doc.root, doc.html);
        doc.append(doc.html, doc.head);
        doc.append(doc.html, doc.body);
        doc
    }

    /// Parses a full or partial HTML document.
    ///
    /// Missing `<html>`, `<head>` or `<body>` are synthesized. Top-level
    /// content outside `<head>` lands in `<body>`.
    ///
    /// # Errors
    ///
    /// Returns [`MarkupError`] on lexical errors in `src`.
    pub fn parse(src: &str) -> Result<Self, MarkupError> {
        let fragment = Fragment::parse_html(src)?;
        let mut doc = Self::new();
        for node in fragment.nodes() {
            doc.place(node);
        }
        Ok(doc)
    }

    /// Wraps the document for sharing.
    #[must_use]
    pub fn into_shared(self) -> SharedDocument {
        Arc::new(Mutex::new(self))
    }

    fn place(&mut self, node: &MarkupNode) {
        match node {
            MarkupNode::Element(el) if el.tag == "html" => {
                self.merge_attrs(self.html, &el.attrs);
                for child in &el.children {
                    self.place(child);
                }
            }
            MarkupNode::Element(el) if el.tag == "head" || el.tag == "body" => {
                let target = if el.tag == "head" { self.head } else { self.body };
                self.merge_attrs(target, &el.attrs);
                for child in &el.children {
                    let id = self.build(child);
                    self.append(target, id);
                }
            }
            n if n.is_blank_text() => {}
            other => {
                let id = self.build(other);
                self.append(self.body, id);
            }
        }
    }

    fn merge_attrs(&mut self, target: NodeId, attrs: &[(String, String)]) {
        if let Some(el) = self.element_mut(target) {
            for (name, value) in attrs {
                el.set_attr(name, value.clone());
            }
        }
    }

    // ─── Structure ─────────────────────────────────────────────────

    /// The arena root.
    #[must_use]
    pub fn root(&self) -> NodeId {
        self.root
    }

    /// The `<html>` element.
    #[must_use]
    pub fn html(&self) -> NodeId {
        self.html
    }

    /// The `<head>` element.
    #[must_use]
    pub fn head(&self) -> NodeId {
        self.head
    }

    /// The `<body>` element.
    #[must_use]
    pub fn body(&self) -> NodeId {
        self.body
    }

    /// Whether `id` was allocated by this document.
    #[must_use]
    pub fn contains(&self, id: NodeId) -> bool {
        id.index() < self.slots.len()
    }

    /// Node data.
    #[must_use]
    pub fn data(&self, id: NodeId) -> Option<&NodeData> {
        self.slots.get(id.index()).map(|s| &s.data)
    }

    /// Element data, if `id` is an element.
    #[must_use]
    pub fn element(&self, id: NodeId) -> Option<&ElementData> {
        match self.data(id)? {
            NodeData::Element(el) => Some(el),
            _ => None,
        }
    }

    pub(crate) fn element_mut(&mut self, id: NodeId) -> Option<&mut ElementData> {
        match self.slots.get_mut(id.index()).map(|s| &mut s.data) {
            Some(NodeData::Element(el)) => Some(el),
            _ => None,
        }
    }

    /// Tag name, if `id` is an element.
    #[must_use]
    pub fn tag(&self, id: NodeId) -> Option<&str> {
        self.element(id).map(|el| el.tag.as_str())
    }

    /// Attribute value, if `id` is an element carrying `name`.
    #[must_use]
    pub fn attr(&self, id: NodeId, name: &str) -> Option<&str> {
        self.element(id)?.attr(name)
    }

    /// Parent node.
    #[must_use]
    pub fn parent(&self, id: NodeId) -> Option<NodeId> {
        self.slots.get(id.index())?.parent
    }

    /// Child nodes in order.
    #[must_use]
    pub fn children(&self, id: NodeId) -> &[NodeId] {
        self.slots
            .get(id.index())
            .map_or(&[], |s| s.children.as_slice())
    }

    /// Whether `id` is reachable from the root.
    #[must_use]
    pub fn is_attached(&self, id: NodeId) -> bool {
        let mut current = Some(id);
        while let Some(node) = current {
            if node == self.root {
                return true;
            }
            current = self.parent(node);
        }
        false
    }

    // ─── Queries ───────────────────────────────────────────────────

    /// All descendants of `scope` in document order.
    #[must_use]
    pub fn descendants(&self, scope: NodeId) -> Vec<NodeId> {
        let mut out = Vec::new();
        let mut stack: Vec<NodeId> = self.children(scope).iter().rev().copied().collect();
        while let Some(node) = stack.pop() {
            out.push(node);
            stack.extend(self.children(node).iter().rev().copied());
        }
        out
    }

    /// First descendant element of `scope` matching `pred`.
    pub fn find_element(
        &self,
        scope: NodeId,
        pred: impl Fn(&ElementData) -> bool,
    ) -> Option<NodeId> {
        self.descendants(scope)
            .into_iter()
            .find(|&n| self.element(n).is_some_and(&pred))
    }

    /// Looks up an element by its `id` attribute in the live tree.
    #[must_use]
    pub fn element_by_id(&self, id: &str) -> Option<NodeId> {
        self.find_element(self.root, |el| el.attr("id") == Some(id))
    }

    /// Descendant elements of `scope` with the given tag.
    #[must_use]
    pub fn elements_by_tag(&self, scope: NodeId, tag: &str) -> Vec<NodeId> {
        self.descendants(scope)
            .into_iter()
            .filter(|&n| self.tag(n).is_some_and(|t| t.eq_ignore_ascii_case(tag)))
            .collect()
    }

    /// Concatenated text of `id` and its descendants.
    #[must_use]
    pub fn text_content(&self, id: NodeId) -> String {
        let mut out = String::new();
        if let Some(NodeData::Text(t)) = self.data(id) {
            out.push_str(t);
        }
        for node in self.descendants(id) {
            if let Some(NodeData::Text(t)) = self.data(node) {
                out.push_str(t);
            }
        }
        out
    }

    /// The `<title>` element, if any.
    #[must_use]
    pub fn title_element(&self) -> Option<NodeId> {
        self.elements_by_tag(self.root, "title").into_iter().next()
    }

    /// Document title, empty when there is no `<title>`.
    #[must_use]
    pub fn title(&self) -> String {
        self.title_element()
            .map(|t| self.text_content(t))
            .unwrap_or_default()
    }

    // ─── Serialization ─────────────────────────────────────────────

    /// Markup of `id` including itself.
    #[must_use]
    pub fn outer_html(&self, id: NodeId) -> String {
        let mut out = String::new();
        let parent_tag = self.parent(id).and_then(|p| self.tag(p));
        self.write_node(id, parent_tag, &mut out);
        out
    }

    /// Markup of the children of `id`.
    #[must_use]
    pub fn inner_html(&self, id: NodeId) -> String {
        let mut out = String::new();
        let tag = self.tag(id);
        for &child in self.children(id) {
            self.write_node(child, tag, &mut out);
        }
        out
    }

    /// The whole document with a doctype.
    #[must_use]
    pub fn to_html(&self) -> String {
        format!("<!DOCTYPE html>\n{}", self.outer_html(self.html))
    }

    fn write_node(&self, id: NodeId, parent_tag: Option<&str>, out: &mut String) {
        enum Step<'t> {
            Enter(NodeId, Option<&'t str>),
            Leave(&'t str),
        }

        let mut steps = vec![Step::Enter(id, parent_tag)];
        while let Some(step) = steps.pop() {
            let (id, parent_tag) = match step {
                Step::Leave(tag) => {
                    write_end_tag(tag, out);
                    continue;
                }
                Step::Enter(id, parent_tag) => (id, parent_tag),
            };
            match self.data(id) {
                Some(NodeData::Element(el)) => {
                    let tag = el.tag.as_str();
                    write_start_tag(tag, &el.attrs, out);
                    steps.push(Step::Leave(tag));
                    let children = self.children(id).iter().rev();
                    steps.extend(children.map(|&child| Step::Enter(child, Some(tag))));
                }
                Some(NodeData::Text(t)) => write_text(t, parent_tag, out),
                Some(NodeData::Comment(c)) => write_comment(c, out),
                Some(NodeData::Document) => {
                    let children = self.children(id).iter().rev();
                    steps.extend(children.map(|&child| Step::Enter(child, None)));
                }
                None => {}
            }
        }
    }

    // ─── Low-level mutation (used by DomPatch) ─────────────────────

    fn alloc(&mut self, data: NodeData) -> NodeId {
        let raw = u32::try_from(self.slots.len()).unwrap_or(u32::MAX);
        self.slots.push(Slot::new(data));
        NodeId::from_raw(raw)
    }

    fn alloc_element(&mut self, tag: &str) -> NodeId {
        self.alloc(NodeData::Element(ElementData {
            tag: tag.to_string(),
            attrs: Vec::new(),
        }))
    }

    /// Builds a detached subtree from parsed markup.
    pub(crate) fn build(&mut self, node: &MarkupNode) -> NodeId {
        let top = self.alloc_markup(node);
        let mut pending = vec![(node, top)];
        while let Some((node, id)) = pending.pop() {
            let MarkupNode::Element(el) = node else {
                continue;
            };
            for child in &el.children {
                let child_id = self.alloc_markup(child);
                self.append(id, child_id);
                pending.push((child, child_id));
            }
        }
        top
    }

    fn alloc_markup(&mut self, node: &MarkupNode) -> NodeId {
        match node {
            MarkupNode::Element(el) => self.alloc(NodeData::Element(ElementData {
                tag: el.tag.to_ascii_lowercase(),
                attrs: el.attrs.clone(),
            })),
            MarkupNode::Text(t) => self.alloc(NodeData::Text(t.clone())),
            MarkupNode::Comment(c) => self.alloc(NodeData::Comment(c.clone())),
        }
    }

    pub(crate) fn append(&mut self, parent: NodeId, child: NodeId) {
        let index = self.children(parent).len();
        self.insert_at(parent, index, child);
    }

    pub(crate) fn insert_at(&mut self, parent: NodeId, index: usize, child: NodeId) {
        if let Some(slot) = self.slots.get_mut(parent.index()) {
            let index = index.min(slot.children.len());
            slot.children.insert(index, child);
        }
        if let Some(slot) = self.slots.get_mut(child.index()) {
            slot.parent = Some(parent);
        }
    }

    /// Detaches `id`, returning its former parent and position.
    pub(crate) fn detach(&mut self, id: NodeId) -> Option<(NodeId, usize)> {
        let parent = self.parent(id)?;
        let index = self.children(parent).iter().position(|&c| c == id)?;
        self.slots[parent.index()].children.remove(index);
        self.slots[id.index()].parent = None;
        Some((parent, index))
    }

    pub(crate) fn check_live(&self, id: NodeId) -> Result<(), DomError> {
        if !self.contains(id) {
            return Err(DomError::UnknownNode(id));
        }
        if !self.is_attached(id) {
            return Err(DomError::Detached(id));
        }
        Ok(())
    }

    pub(crate) fn check_replaceable(&self, id: NodeId) -> Result<(), DomError> {
        self.check_live(id)?;
        if id == self.root || id == self.html || id == self.head || id == self.body {
            let tag = self.tag(id).unwrap_or("#document").to_string();
            return Err(DomError::StructuralNode { node: id, tag });
        }
        Ok(())
    }
}

impl Default for Document {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn skeleton() {
        let doc = Document::new();
        assert_eq!(doc.tag(doc.html()), Some("html"));
        assert_eq!(doc.tag(doc.head()), Some("head"));
        assert_eq!(doc.tag(doc.body()), Some("body"));
        assert_eq!(doc.to_html(), "<!DOCTYPE html>\n<html><head></head><body></body></html>");
    }

    #[test]
    fn parse_full_document() {
        let doc = Document::parse(
            "<!DOCTYPE html>\n<html lang=\"en\">\n<head><title>T</title></head>\n<body class=\"b\"><p id=\"x\">hi</p></body></html>",
        )
        .unwrap();
        assert_eq!(doc.attr(doc.html(), "lang"), Some("en"));
        assert_eq!(doc.attr(doc.body(), "class"), Some("b"));
        assert_eq!(doc.title(), "T");
        let p = doc.element_by_id("x").unwrap();
        assert_eq!(doc.parent(p), Some(doc.body()));
    }

    #[test]
    fn parse_bare_fragment_goes_to_body() {
        let doc = Document::parse("<div id=\"a\"></div>text").unwrap();
        assert_eq!(doc.children(doc.body()).len(), 2);
        assert!(doc.children(doc.head()).is_empty());
        assert_eq!(doc.title(), "");
    }

    #[test]
    fn descendants_in_document_order() {
        let doc = Document::parse("<a id=1><b id=2></b><c id=3><d id=4></d></c></a><e id=5></e>")
            .unwrap();
        let ids: Vec<_> = doc
            .descendants(doc.body())
            .into_iter()
            .filter_map(|n| doc.attr(n, "id").map(str::to_string))
            .collect();
        assert_eq!(ids, ["1", "2", "3", "4", "5"]);
    }

    #[test]
    fn detach_and_attachment() {
        let mut doc = Document::parse("<div id=\"a\"><span id=\"b\"></span></div>").unwrap();
        let a = doc.element_by_id("a").unwrap();
        let b = doc.element_by_id("b").unwrap();
        assert!(doc.is_attached(b));

        assert_eq!(doc.detach(a), Some((doc.body(), 0)));
        assert!(!doc.is_attached(a));
        assert!(!doc.is_attached(b));
        assert_eq!(doc.element_by_id("b"), None);
        assert!(matches!(doc.check_live(b), Err(DomError::Detached(_))));
    }

    #[test]
    fn structural_nodes_protected() {
        let doc = Document::new();
        for id in [doc.root(), doc.html(), doc.head(), doc.body()] {
            assert!(matches!(
                doc.check_replaceable(id),
                Err(DomError::StructuralNode { .. })
            ));
        }
        assert!(matches!(
            doc.check_live(NodeId::from_raw(999)),
            Err(DomError::UnknownNode(_))
        ));
    }

    #[test]
    fn outer_and_inner_html() {
        let doc = Document::parse("<div id=\"a\" title='x&quot;y'>1 &amp; <i>2</i></div>").unwrap();
        let a = doc.element_by_id("a").unwrap();
        assert_eq!(
            doc.outer_html(a),
            "<div id=\"a\" title=\"x&quot;y\">1 &amp; <i>2</i></div>"
        );
        assert_eq!(doc.inner_html(a), "1 &amp; <i>2</i>");
        assert_eq!(doc.text_content(a), "1 & 2");
    }

    #[test]
    fn very_deep_tree_serializes() {
        const DEPTH: usize = 100_000;
        let mut doc = Document::new();
        let mut parent = doc.body();
        for _ in 0..DEPTH {
            let child = doc.alloc_element("b");
            doc.append(parent, child);
            parent = child;
        }
        let leaf = doc.alloc(NodeData::Text("x<".into()));
        doc.append(parent, leaf);

        let html = doc.inner_html(doc.body());
        assert_eq!(html.len(), DEPTH * "<b></b>".len() + "x&lt;".len());
        assert!(html.starts_with("<b><b>"));
        assert!(html.contains("x&lt;</b>"));
        assert_eq!(doc.text_content(doc.body()), "x<");
    }
}

//! Node references and node data.

use std::fmt;

/// Reference to a node in a [`Document`](crate::Document) arena.
///
/// Ids are never reused. A removed node keeps its id but is detached,
/// so a stale id fails with [`DomError::Detached`](crate::DomError::Detached)
/// instead of silently pointing at another node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(u32);

impl NodeId {
    pub(crate) fn from_raw(raw: u32) -> Self {
        Self(raw)
    }

    pub(crate) fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Element name and attributes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ElementData {
    /// Lower-case tag name.
    pub tag: String,
    /// Attributes in insertion order.
    pub attrs: Vec<(String, String)>,
}

impl ElementData {
    /// Attribute value by name (ASCII case-insensitive).
    #[must_use]
    pub fn attr(&self, name: &str) -> Option<&str> {
        self.attrs
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// Sets or adds an attribute.
    pub fn set_attr(&mut self, name: &str, value: impl Into<String>) {
        let value = value.into();
        match self
            .attrs
            .iter_mut()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
        {
            Some((_, v)) => *v = value,
            None => self.attrs.push((name.to_ascii_lowercase(), value)),
        }
    }

    /// Removes an attribute; returns whether it was present.
    pub fn remove_attr(&mut self, name: &str) -> bool {
        let before = self.attrs.len();
        self.attrs.retain(|(k, _)| !k.eq_ignore_ascii_case(name));
        self.attrs.len() != before
    }
}

/// What a node holds.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NodeData {
    /// The arena root.
    Document,
    /// An element.
    Element(ElementData),
    /// Character data.
    Text(String),
    /// A comment.
    Comment(String),
}

#[derive(Debug, Clone)]
pub(crate) struct Slot {
    pub(crate) data: NodeData,
    pub(crate) parent: Option<NodeId>,
    pub(crate) children: Vec<NodeId>,
}

impl Slot {
    pub(crate) fn new(data: NodeData) -> Self {
        Self {
            data,
            parent: None,
            children: Vec::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn attributes_case_insensitive() {
        let mut el = ElementData {
            tag: "div".into(),
            attrs: vec![("ID".into(), "a".into())],
        };
        assert_eq!(el.attr("id"), Some("a"));

        el.set_attr("id", "b");
        assert_eq!(el.attrs.len(), 1);
        assert_eq!(el.attr("Id"), Some("b"));

        el.set_attr("class", "c");
        assert_eq!(el.attrs.len(), 2);

        assert!(el.remove_attr("CLASS"));
        assert!(!el.remove_attr("class"));
    }

    #[test]
    fn display() {
        assert_eq!(NodeId::from_raw(7).to_string(), "#7");
    }
}

//! DOM patch operations.
//!
//! [`DomPatch`] is the only way markup enters a [`Document`]. Response
//! processing, head contribution and the CLI all describe their change
//! as a patch and hand it to [`Document::apply`].
//!
//! Invariants:
//! - Patches are applied in order; [`Document::apply_all`] stops at the
//!   first failure and leaves earlier patches applied.
//! - Every referenced node must be attached at the time it is used.
//! - Structural nodes (root, `<html>`, `<head>`, `<body>`) are never
//!   removed or replaced.
//! - A patch either fully applies or returns an error without
//!   mutating the document.

use crate::markup::Fragment;
use crate::node::NodeData;
use crate::{Document, DomError, NodeId};
use tracing::trace;

/// One mutation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DomPatch {
    /// Replace `target` (outer) with the fragment's nodes.
    ///
    /// A blank fragment removes `target` without inserting anything.
    Replace {
        /// Node to replace.
        target: NodeId,
        /// Replacement nodes.
        fragment: Fragment,
    },
    /// Detach `target`.
    Remove {
        /// Node to remove.
        target: NodeId,
    },
    /// Append the fragment's nodes to `parent`.
    Append {
        /// Receiving element.
        parent: NodeId,
        /// Nodes to add.
        fragment: Fragment,
    },
    /// Insert the fragment's nodes right before `before`.
    InsertBefore {
        /// Sibling anchor.
        before: NodeId,
        /// Nodes to add.
        fragment: Fragment,
    },
    /// Set an attribute on an element.
    SetAttribute {
        /// Element.
        target: NodeId,
        /// Attribute name.
        name: String,
        /// New value.
        value: String,
    },
    /// Remove an attribute from an element.
    RemoveAttribute {
        /// Element.
        target: NodeId,
        /// Attribute name.
        name: String,
    },
    /// Replace all children of an element with a single text node.
    SetText {
        /// Element.
        target: NodeId,
        /// New text; empty clears the element.
        text: String,
    },
}

impl DomPatch {
    /// Short name for logs.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Replace { .. } => "replace",
            Self::Remove { .. } => "remove",
            Self::Append { .. } => "append",
            Self::InsertBefore { .. } => "insert_before",
            Self::SetAttribute { .. } => "set_attribute",
            Self::RemoveAttribute { .. } => "remove_attribute",
            Self::SetText { .. } => "set_text",
        }
    }
}

impl Document {
    /// Applies one patch.
    ///
    /// Returns the ids of the top-level nodes it inserted, in order.
    ///
    /// # Errors
    ///
    /// Returns [`DomError`] when a referenced node is unknown, detached,
    /// structural, or of the wrong kind. The document is unchanged in
    /// that case.
    pub fn apply(&mut self, patch: DomPatch) -> Result<Vec<NodeId>, DomError> {
        trace!(kind = patch.kind(), "Applying DOM patch");
        match patch {
            DomPatch::Replace { target, fragment } => {
                self.check_replaceable(target)?;
                let Some((parent, index)) = self.detach(target) else {
                    return Err(DomError::Detached(target));
                };
                Ok(self.insert_fragment(parent, index, &fragment))
            }
            DomPatch::Remove { target } => {
                self.check_replaceable(target)?;
                self.detach(target);
                Ok(Vec::new())
            }
            DomPatch::Append { parent, fragment } => {
                self.check_container(parent)?;
                let index = self.children(parent).len();
                Ok(self.insert_fragment(parent, index, &fragment))
            }
            DomPatch::InsertBefore { before, fragment } => {
                self.check_live(before)?;
                let parent = self.parent(before).ok_or(DomError::Detached(before))?;
                let index = self
                    .children(parent)
                    .iter()
                    .position(|&c| c == before)
                    .ok_or(DomError::Detached(before))?;
                Ok(self.insert_fragment(parent, index, &fragment))
            }
            DomPatch::SetAttribute {
                target,
                name,
                value,
            } => {
                self.check_live(target)?;
                let el = self
                    .element_mut(target)
                    .ok_or(DomError::NotAnElement(target))?;
                el.set_attr(&name, value);
                Ok(Vec::new())
            }
            DomPatch::RemoveAttribute { target, name } => {
                self.check_live(target)?;
                let el = self
                    .element_mut(target)
                    .ok_or(DomError::NotAnElement(target))?;
                el.remove_attr(&name);
                Ok(Vec::new())
            }
            DomPatch::SetText { target, text } => {
                self.check_live(target)?;
                if self.element(target).is_none() {
                    return Err(DomError::NotAnElement(target));
                }
                for child in self.children(target).to_vec() {
                    self.detach(child);
                }
                if text.is_empty() {
                    return Ok(Vec::new());
                }
                let node = self.build(&crate::MarkupNode::Text(text));
                self.append(target, node);
                Ok(vec![node])
            }
        }
    }

    /// Applies patches in order, stopping at the first error.
    ///
    /// # Errors
    ///
    /// Returns the first [`DomError`]; earlier patches stay applied.
    pub fn apply_all(
        &mut self,
        patches: impl IntoIterator<Item = DomPatch>,
    ) -> Result<Vec<NodeId>, DomError> {
        let mut inserted = Vec::new();
        for patch in patches {
            inserted.extend(self.apply(patch)?);
        }
        Ok(inserted)
    }

    fn check_container(&self, id: NodeId) -> Result<(), DomError> {
        self.check_live(id)?;
        match self.data(id) {
            Some(NodeData::Element(_) | NodeData::Document) => Ok(()),
            _ => Err(DomError::NotAnElement(id)),
        }
    }

    fn insert_fragment(&mut self, parent: NodeId, index: usize, fragment: &Fragment) -> Vec<NodeId> {
        if fragment.is_blank() {
            return Vec::new();
        }
        let mut inserted = Vec::with_capacity(fragment.nodes().len());
        for (offset, node) in fragment.nodes().iter().enumerate() {
            let id = self.build(node);
            self.insert_at(parent, index + offset, id);
            inserted.push(id);
        }
        inserted
    }
}

//! DOM layer errors.
//!
//! # Error Codes
//!
//! | Variant | Code | Recoverable |
//! |---------|------|-------------|
//! | [`MarkupError::UnterminatedComment`] | `MARKUP_UNTERMINATED_COMMENT` | No |
//! | [`MarkupError::UnterminatedCdata`] | `MARKUP_UNTERMINATED_CDATA` | No |
//! | [`MarkupError::MalformedTag`] | `MARKUP_MALFORMED_TAG` | No |
//! | [`MarkupError::UnexpectedClosingTag`] | `MARKUP_UNEXPECTED_CLOSING_TAG` | No |
//! | [`MarkupError::MismatchedClosingTag`] | `MARKUP_MISMATCHED_CLOSING_TAG` | No |
//! | [`MarkupError::UnclosedElement`] | `MARKUP_UNCLOSED_ELEMENT` | No |
//! | [`MarkupError::TooDeep`] | `MARKUP_TOO_DEEP` | No |
//! | [`DomError::UnknownNode`] | `DOM_UNKNOWN_NODE` | No |
//! | [`DomError::Detached`] | `DOM_DETACHED` | Yes |
//! | [`DomError::NotAnElement`] | `DOM_NOT_AN_ELEMENT` | No |
//! | [`DomError::StructuralNode`] | `DOM_STRUCTURAL_NODE` | No |
//!
//! `DOM_DETACHED` is recoverable: the node was removed by an earlier
//! mutation, and looking it up again by id may find its replacement.

use crate::NodeId;
use ajaxflow_types::ErrorCode;
use thiserror::Error;

/// Markup that cannot be turned into a node tree.
///
/// HTML mode tolerates unclosed and stray tags, so in practice only
/// the lexical variants occur there. XML mode (response envelopes)
/// reports every structural problem.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MarkupError {
    /// `<!--` without `-->`.
    #[error("unterminated comment at byte {offset}")]
    UnterminatedComment {
        /// Byte offset of `<!--`.
        offset: usize,
    },

    /// `<![CDATA[` without `]]>`.
    #[error("unterminated CDATA section at byte {offset}")]
    UnterminatedCdata {
        /// Byte offset of `<![CDATA[`.
        offset: usize,
    },

    /// A tag that runs into end of input or has a broken attribute.
    #[error("malformed tag at byte {offset}")]
    MalformedTag {
        /// Byte offset of `<`.
        offset: usize,
    },

    /// `</x>` with no open `x`.
    #[error("unexpected closing tag </{tag}> at byte {offset}")]
    UnexpectedClosingTag {
        /// Tag name.
        tag: String,
        /// Byte offset of `</`.
        offset: usize,
    },

    /// `</x>` while `y` is the innermost open element.
    #[error("closing tag </{found}> does not match <{expected}>")]
    MismatchedClosingTag {
        /// Innermost open element.
        expected: String,
        /// Closing tag seen.
        found: String,
    },

    /// Input ended while an element was open.
    #[error("element <{tag}> is never closed")]
    UnclosedElement {
        /// Tag name.
        tag: String,
    },

    /// An element opened more than `limit` levels deep.
    #[error("elements nested deeper than {limit} at byte {offset}")]
    TooDeep {
        /// Maximum number of open elements.
        limit: usize,
        /// Byte offset of the offending start tag.
        offset: usize,
    },
}

impl ErrorCode for MarkupError {
    fn code(&self) -> &'static str {
        match self {
            Self::UnterminatedComment { .. } => "MARKUP_UNTERMINATED_COMMENT",
            Self::UnterminatedCdata { .. } => "MARKUP_UNTERMINATED_CDATA",
            Self::MalformedTag { .. } => "MARKUP_MALFORMED_TAG",
            Self::UnexpectedClosingTag { .. } => "MARKUP_UNEXPECTED_CLOSING_TAG",
            Self::MismatchedClosingTag { .. } => "MARKUP_MISMATCHED_CLOSING_TAG",
            Self::UnclosedElement { .. } => "MARKUP_UNCLOSED_ELEMENT",
            Self::TooDeep { .. } => "MARKUP_TOO_DEEP",
        }
    }

    fn is_recoverable(&self) -> bool {
        false
    }
}

/// A patch that cannot be applied to the current document.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DomError {
    /// The id does not belong to this document.
    #[error("unknown node {0}")]
    UnknownNode(NodeId),

    /// The node exists but is no longer attached to the document.
    #[error("node {0} is detached from the document")]
    Detached(NodeId),

    /// The operation needs an element.
    #[error("node {0} is not an element")]
    NotAnElement(NodeId),

    /// The document root, `<html>`, `<head>` and `<body>` cannot be
    /// removed or replaced.
    #[error("node {node} (<{tag}>) is structural and cannot be replaced")]
    StructuralNode {
        /// Offending node.
        node: NodeId,
        /// Its tag, or `#document`.
        tag: String,
    },
}

impl ErrorCode for DomError {
    fn code(&self) -> &'static str {
        match self {
            Self::UnknownNode(_) => "DOM_UNKNOWN_NODE",
            Self::Detached(_) => "DOM_DETACHED",
            Self::NotAnElement(_) => "DOM_NOT_AN_ELEMENT",
            Self::StructuralNode { .. } => "DOM_STRUCTURAL_NODE",
        }
    }

    fn is_recoverable(&self) -> bool {
        matches!(self, Self::Detached(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ajaxflow_types::{assert_error_codes, assert_unique_error_codes};

    fn markup_variants() -> Vec<MarkupError> {
        vec![
            MarkupError::UnterminatedComment { offset: 0 },
            MarkupError::UnterminatedCdata { offset: 0 },
            MarkupError::MalformedTag { offset: 0 },
            MarkupError::UnexpectedClosingTag {
                tag: "p".into(),
                offset: 0,
            },
            MarkupError::MismatchedClosingTag {
                expected: "a".into(),
                found: "b".into(),
            },
            MarkupError::UnclosedElement { tag: "div".into() },
            MarkupError::TooDeep {
                limit: 1,
                offset: 0,
            },
        ]
    }

    fn dom_variants() -> Vec<DomError> {
        vec![
            DomError::UnknownNode(NodeId::from_raw(9)),
            DomError::Detached(NodeId::from_raw(9)),
            DomError::NotAnElement(NodeId::from_raw(9)),
            DomError::StructuralNode {
                node: NodeId::from_raw(0),
                tag: "#document".into(),
            },
        ]
    }

    #[test]
    fn all_error_codes_valid() {
        assert_error_codes(&markup_variants(), "MARKUP_");
        assert_unique_error_codes(&markup_variants());
        assert_error_codes(&dom_variants(), "DOM_");
        assert_unique_error_codes(&dom_variants());
    }

    #[test]
    fn only_detached_is_recoverable() {
        for err in dom_variants() {
            assert_eq!(err.is_recoverable(), matches!(err, DomError::Detached(_)));
        }
    }

    #[test]
    fn display_mentions_tags() {
        let err = MarkupError::MismatchedClosingTag {
            expected: "component".into(),
            found: "ajax-response".into(),
        };
        let msg = err.to_string();
        assert!(msg.contains("component"));
        assert!(msg.contains("ajax-response"));
    }
}

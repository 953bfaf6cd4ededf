//! Response envelope parsing.
//!
//! # Wire Format
//!
//! ```text
//! <ajax-response>
//!   <priority-evaluate><![CDATA[ ... ]]></priority-evaluate>
//!   <header-contribution><![CDATA[<head> ... </head>]]></header-contribution>
//!   <component id="panel" encoding="wicket1"><![CDATA[<div id="panel">..]^]></div>]]></component>
//!   <evaluate><![CDATA[ ... ]]></evaluate>
//!   <redirect><![CDATA[/login]]></redirect>
//! </ajax-response>
//! ```
//!
//! Payloads are decoded here, so every [`Directive`] carries plain text.

use ajaxflow_dom::{Fragment, MarkupElement, MarkupError};
use ajaxflow_types::ErrorCode;
use thiserror::Error;
use tracing::warn;

/// Root element name.
pub const ROOT_ELEMENT: &str = "ajax-response";

/// The transport encoding that escapes `]` inside CDATA.
pub const ENCODING_WICKET1: &str = "wicket1";

/// Envelope failure. Always routed to the call's failure path.
///
/// # Error Codes
///
/// | Variant | Code | Recoverable |
/// |---------|------|-------------|
/// | [`EnvelopeError::Malformed`] | `ENVELOPE_MALFORMED` | No |
/// | [`EnvelopeError::MissingRoot`] | `ENVELOPE_MISSING_ROOT` | No |
/// | [`EnvelopeError::MissingAttribute`] | `ENVELOPE_MISSING_ATTRIBUTE` | No |
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EnvelopeError {
    /// Not well-formed XML.
    #[error("malformed envelope: {0}")]
    Malformed(#[from] MarkupError),
    /// The document element is not `<ajax-response>`.
    #[error("envelope root must be <{ROOT_ELEMENT}>, found {}", found.as_deref().unwrap_or("nothing"))]
    MissingRoot {
        /// The element found instead.
        found: Option<String>,
    },
    /// A directive lacks a required attribute.
    #[error("<{element}> requires attribute '{attribute}'")]
    MissingAttribute {
        /// Directive element.
        element: String,
        /// Missing attribute.
        attribute: String,
    },
}

impl ErrorCode for EnvelopeError {
    fn code(&self) -> &'static str {
        match self {
            Self::Malformed(_) => "ENVELOPE_MALFORMED",
            Self::MissingRoot { .. } => "ENVELOPE_MISSING_ROOT",
            Self::MissingAttribute { .. } => "ENVELOPE_MISSING_ATTRIBUTE",
        }
    }

    fn is_recoverable(&self) -> bool {
        false
    }
}

/// One instruction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Directive {
    /// Replace the element with `id` by `markup`.
    Component {
        /// Target element id.
        id: String,
        /// Replacement outer markup; empty removes the target.
        markup: String,
    },
    /// Evaluate a script.
    Evaluate {
        /// Script text.
        script: String,
    },
    /// Evaluate a script before any other directive.
    PriorityEvaluate {
        /// Script text.
        script: String,
    },
    /// Merge a head fragment into the document head.
    HeaderContribution {
        /// Head markup, usually wrapped in `<head>`.
        markup: String,
    },
    /// Navigate away.
    Redirect {
        /// Target URL.
        url: String,
    },
}

impl Directive {
    /// Element name on the wire.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Component { .. } => "component",
            Self::Evaluate { .. } => "evaluate",
            Self::PriorityEvaluate { .. } => "priority-evaluate",
            Self::HeaderContribution { .. } => "header-contribution",
            Self::Redirect { .. } => "redirect",
        }
    }
}

/// A parsed envelope.
///
/// # Example
///
/// ```
/// use ajaxflow_runtime::{Directive, Envelope};
///
/// let env = Envelope::parse(
///     r#"<ajax-response>
///          <component id="a"><![CDATA[<b id="a">]^]></b>]]></component>
///          <priority-evaluate>first()</priority-evaluate>
///        </ajax-response>"#,
/// )
/// .unwrap();
///
/// let order: Vec<&str> = env.processing_order().map(Directive::kind).collect();
/// assert_eq!(order, ["priority-evaluate", "component"]);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Envelope {
    directives: Vec<Directive>,
}

impl Envelope {
    /// Parses an envelope.
    ///
    /// Unknown child elements are skipped with a warning.
    ///
    /// # Errors
    ///
    /// Returns [`EnvelopeError`] when the text is not XML, the root is
    /// wrong, or a `component` has no `id`.
    pub fn parse(raw: &str) -> Result<Self, EnvelopeError> {
        let fragment = Fragment::parse_xml(raw)?;
        let root = fragment
            .elements()
            .next()
            .ok_or(EnvelopeError::MissingRoot { found: None })?;
        if root.tag != ROOT_ELEMENT {
            return Err(EnvelopeError::MissingRoot {
                found: Some(root.tag.clone()),
            });
        }

        let mut directives = Vec::new();
        for el in root.child_elements() {
            let directive = match el.tag.as_str() {
                "component" => {
                    let id = el.attr("id").ok_or_else(|| EnvelopeError::MissingAttribute {
                        element: el.tag.clone(),
                        attribute: "id".into(),
                    })?;
                    Directive::Component {
                        id: id.to_string(),
                        markup: payload(el),
                    }
                }
                "evaluate" => Directive::Evaluate {
                    script: payload(el),
                },
                "priority-evaluate" => Directive::PriorityEvaluate {
                    script: payload(el),
                },
                "header-contribution" => Directive::HeaderContribution {
                    markup: payload(el),
                },
                "redirect" => Directive::Redirect {
                    url: payload(el).trim().to_string(),
                },
                other => {
                    warn!(element = other, "Skipping unknown envelope element");
                    continue;
                }
            };
            directives.push(directive);
        }
        Ok(Self { directives })
    }

    /// Builds an envelope from directives.
    #[must_use]
    pub fn from_directives(directives: Vec<Directive>) -> Self {
        Self { directives }
    }

    /// Directives in document order.
    #[must_use]
    pub fn directives(&self) -> &[Directive] {
        &self.directives
    }

    /// Whether there is nothing to apply.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.directives.is_empty()
    }

    /// Application order: `priority-evaluate` first, then the rest in
    /// document order.
    pub fn processing_order(&self) -> impl Iterator<Item = &Directive> {
        let (priority, rest): (Vec<_>, Vec<_>) = self
            .directives
            .iter()
            .partition(|d| matches!(d, Directive::PriorityEvaluate { .. }));
        priority.into_iter().chain(rest)
    }
}

fn payload(el: &MarkupElement) -> String {
    decode(el.attr("encoding"), el.content())
}

/// Undoes a transport encoding.
///
/// Unknown encodings are logged and the text is used as-is.
#[must_use]
pub fn decode(encoding: Option<&str>, text: String) -> String {
    match encoding {
        None | Some("") => text,
        Some(ENCODING_WICKET1) => text.replace("]^", "]"),
        Some(other) => {
            warn!(encoding = other, "Unknown payload encoding, using text as-is");
            text
        }
    }
}

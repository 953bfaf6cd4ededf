//! Markup parsing.
//!
//! One hand-written parser serves two dialects:
//!
//! | Mode | Used for | Tag case | Void elements | Raw text | Structural errors |
//! |------|----------|----------|---------------|----------|-------------------|
//! | [`ParseMode::Html`] | component markup, head fragments, documents | lowered | yes | `script`, `style` | tolerated |
//! | [`ParseMode::Xml`] | response envelopes | kept | no (`/>` only) | no (use CDATA) | rejected |
//!
//! HTML mode closes unclosed elements at end of input and ignores
//! stray end tags, matching what a browser does with a sloppy
//! fragment. XML mode is strict because a structurally broken envelope
//! must reach the call's failure path instead of being half-applied.
//!
//! The parser produces an owned [`Fragment`]. Nothing here touches a
//! [`Document`](crate::Document); fragments enter a document only
//! through [`DomPatch`](crate::DomPatch).

use crate::serialize::write_markup_nodes;
use crate::MarkupError;

/// Elements that never have children or an end tag in HTML.
const VOID_ELEMENTS: &[&str] = &[
    "area", "base", "br", "col", "embed", "hr", "img", "input", "link", "meta", "param",
    "source", "track", "wbr",
];

/// Maximum number of simultaneously open elements in parsed markup.
pub const MAX_NESTING_DEPTH: usize = 512;

/// Elements whose content is taken verbatim in HTML.
const RAW_TEXT_ELEMENTS: &[&str] = &["script", "style"];

/// Returns `true` for HTML void elements.
#[must_use]
pub fn is_void_element(tag: &str) -> bool {
    VOID_ELEMENTS.contains(&tag)
}

/// Returns `true` for elements whose text is never entity-escaped.
#[must_use]
pub fn is_raw_text_element(tag: &str) -> bool {
    RAW_TEXT_ELEMENTS.contains(&tag)
}

/// Parser dialect.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParseMode {
    /// Forgiving HTML.
    Html,
    /// Strict, case-preserving XML.
    Xml,
}

/// A parsed node, detached from any document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MarkupNode {
    /// An element with its subtree.
    Element(MarkupElement),
    /// Decoded character data.
    Text(String),
    /// Comment body without `<!--` `-->`.
    Comment(String),
}

impl MarkupNode {
    /// The element, if this node is one.
    #[must_use]
    pub fn as_element(&self) -> Option<&MarkupElement> {
        match self {
            Self::Element(el) => Some(el),
            _ => None,
        }
    }

    /// Whether this is a text node holding only whitespace.
    #[must_use]
    pub fn is_blank_text(&self) -> bool {
        matches!(self, Self::Text(t) if t.trim().is_empty())
    }
}

/// A parsed element.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct MarkupElement {
    /// Tag name (lower-case in HTML mode).
    pub tag: String,
    /// Attributes in source order, values decoded.
    pub attrs: Vec<(String, String)>,
    /// Child nodes.
    pub children: Vec<MarkupNode>,
}

impl MarkupElement {
    /// Creates an element with no attributes or children.
    #[must_use]
    pub fn new(tag: impl Into<String>) -> Self {
        Self {
            tag: tag.into(),
            attrs: Vec::new(),
            children: Vec::new(),
        }
    }

    /// Adds an attribute.
    #[must_use]
    pub fn with_attr(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.attrs.push((name.into(), value.into()));
        self
    }

    /// Adds a text child.
    #[must_use]
    pub fn with_text(mut self, text: impl Into<String>) -> Self {
        self.children.push(MarkupNode::Text(text.into()));
        self
    }

    /// Attribute value by name (ASCII case-insensitive).
    #[must_use]
    pub fn attr(&self, name: &str) -> Option<&str> {
        self.attrs
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// The `id` attribute.
    #[must_use]
    pub fn id(&self) -> Option<&str> {
        self.attr("id")
    }

    /// Concatenated text of all descendant text nodes.
    #[must_use]
    pub fn text(&self) -> String {
        let mut out = String::new();
        collect_text(&self.children, &mut out);
        out
    }

    /// Child elements, skipping text and comments.
    pub fn child_elements(&self) -> impl Iterator<Item = &MarkupElement> {
        self.children.iter().filter_map(MarkupNode::as_element)
    }

    /// Whether any child is an element.
    #[must_use]
    pub fn has_element_children(&self) -> bool {
        self.child_elements().next().is_some()
    }

    /// Content as a markup string.
    ///
    /// Text-only content (the usual CDATA payload of an envelope
    /// directive) is returned verbatim. Element content is serialized.
    #[must_use]
    pub fn content(&self) -> String {
        if self.has_element_children() {
            let mut out = String::new();
            write_markup_nodes(&self.children, &mut out);
            out
        } else {
            self.text()
        }
    }
}

fn collect_text(nodes: &[MarkupNode], out: &mut String) {
    let mut pending: Vec<&MarkupNode> = nodes.iter().rev().collect();
    while let Some(node) = pending.pop() {
        match node {
            MarkupNode::Text(t) => out.push_str(t),
            MarkupNode::Element(el) => pending.extend(el.children.iter().rev()),
            MarkupNode::Comment(_) => {}
        }
    }
}

/// An ordered list of top-level nodes.
///
/// # Example
///
/// ```
/// use ajaxflow_dom::Fragment;
///
/// let frag = Fragment::parse_html("<p class=x>a &amp; b<br>c</p>").unwrap();
/// let p = frag.elements().next().unwrap();
/// assert_eq!(p.attr("class"), Some("x"));
/// assert_eq!(p.text(), "a & bc");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Fragment {
    nodes: Vec<MarkupNode>,
}

impl Fragment {
    /// Parses forgiving HTML.
    ///
    /// # Errors
    ///
    /// Returns [`MarkupError`] for lexical problems (unterminated
    /// comments, tags running into end of input).
    pub fn parse_html(src: &str) -> Result<Self, MarkupError> {
        Self::parse(src, ParseMode::Html)
    }

    /// Parses strict XML.
    ///
    /// # Errors
    ///
    /// Returns [`MarkupError`] for lexical problems and for any
    /// unbalanced element.
    pub fn parse_xml(src: &str) -> Result<Self, MarkupError> {
        Self::parse(src, ParseMode::Xml)
    }

    /// Parses in the given mode.
    ///
    /// # Errors
    ///
    /// See [`parse_html`](Self::parse_html) and [`parse_xml`](Self::parse_xml).
    pub fn parse(src: &str, mode: ParseMode) -> Result<Self, MarkupError> {
        let nodes = Parser::new(src, mode).run()?;
        Ok(Self { nodes })
    }

    /// Wraps already-built nodes.
    #[must_use]
    pub fn from_nodes(nodes: Vec<MarkupNode>) -> Self {
        Self { nodes }
    }

    /// Top-level nodes.
    #[must_use]
    pub fn nodes(&self) -> &[MarkupNode] {
        &self.nodes
    }

    /// Consumes the fragment.
    #[must_use]
    pub fn into_nodes(self) -> Vec<MarkupNode> {
        self.nodes
    }

    /// Top-level elements.
    pub fn elements(&self) -> impl Iterator<Item = &MarkupElement> {
        self.nodes.iter().filter_map(MarkupNode::as_element)
    }

    /// True when there is nothing but whitespace.
    #[must_use]
    pub fn is_blank(&self) -> bool {
        self.nodes.iter().all(MarkupNode::is_blank_text)
    }

    /// Serializes back to markup.
    #[must_use]
    pub fn to_markup(&self) -> String {
        let mut out = String::new();
        write_markup_nodes(&self.nodes, &mut out);
        out
    }
}

struct Parser<'a> {
    src: &'a str,
    pos: usize,
    mode: ParseMode,
    stack: Vec<MarkupElement>,
    roots: Vec<MarkupNode>,
}

impl<'a> Parser<'a> {
    fn new(src: &'a str, mode: ParseMode) -> Self {
        Self {
            src,
            pos: 0,
            mode,
            stack: Vec::new(),
            roots: Vec::new(),
        }
    }

    fn run(mut self) -> Result<Vec<MarkupNode>, MarkupError> {
        while self.pos < self.src.len() {
            let rest = &self.src[self.pos..];
            if rest.starts_with("<!--") {
                self.comment()?;
            } else if rest.starts_with("<![CDATA[") {
                self.cdata()?;
            } else if rest.starts_with("<!") || rest.starts_with("<?") {
                self.declaration()?;
            } else if rest.starts_with("</") {
                self.end_tag()?;
            } else if rest.starts_with('<') && rest[1..].starts_with(|c: char| c.is_ascii_alphabetic())
            {
                self.start_tag()?;
            } else {
                self.text();
            }
        }
        self.finish()
    }

    fn normalize(&self, name: &str) -> String {
        match self.mode {
            ParseMode::Html => name.to_ascii_lowercase(),
            ParseMode::Xml => name.to_string(),
        }
    }

    fn siblings(&mut self) -> &mut Vec<MarkupNode> {
        match self.stack.last_mut() {
            Some(el) => &mut el.children,
            None => &mut self.roots,
        }
    }

    fn push_node(&mut self, node: MarkupNode) {
        self.siblings().push(node);
    }

    fn push_text(&mut self, text: String) {
        if text.is_empty() {
            return;
        }
        let siblings = self.siblings();
        if let Some(MarkupNode::Text(prev)) = siblings.last_mut() {
            prev.push_str(&text);
        } else {
            siblings.push(MarkupNode::Text(text));
        }
    }

    fn close_top(&mut self) {
        if let Some(el) = self.stack.pop() {
            self.push_node(MarkupNode::Element(el));
        }
    }

    fn text(&mut self) {
        let rest = &self.src[self.pos..];
        // A '<' that does not open a tag is literal text.
        let skip = usize::from(rest.starts_with('<'));
        let end = rest[skip..].find('<').map_or(rest.len(), |i| i + skip);
        self.pos += end;
        self.push_text(decode_entities(&rest[..end]));
    }

    fn comment(&mut self) -> Result<(), MarkupError> {
        let start = self.pos;
        let body_start = start + "<!--".len();
        let len = self.src[body_start..]
            .find("-->")
            .ok_or(MarkupError::UnterminatedComment { offset: start })?;
        let body = self.src[body_start..body_start + len].to_string();
        self.pos = body_start + len + "-->".len();
        self.push_node(MarkupNode::Comment(body));
        Ok(())
    }

    fn cdata(&mut self) -> Result<(), MarkupError> {
        let start = self.pos;
        let body_start = start + "<![CDATA[".len();
        let len = self.src[body_start..]
            .find("]]>")
            .ok_or(MarkupError::UnterminatedCdata { offset: start })?;
        let body = self.src[body_start..body_start + len].to_string();
        self.pos = body_start + len + "]]>".len();
        self.push_text(body);
        Ok(())
    }

    fn declaration(&mut self) -> Result<(), MarkupError> {
        let start = self.pos;
        let len = self.src[start..]
            .find('>')
            .ok_or(MarkupError::MalformedTag { offset: start })?;
        self.pos = start + len + 1;
        Ok(())
    }

    fn end_tag(&mut self) -> Result<(), MarkupError> {
        let start = self.pos;
        let len = self.src[start..]
            .find('>')
            .ok_or(MarkupError::MalformedTag { offset: start })?;
        let name = self.normalize(self.src[start + 2..start + len].trim());
        self.pos = start + len + 1;

        match self.stack.iter().rposition(|el| el.tag == name) {
            Some(idx) => {
                if self.mode == ParseMode::Xml && idx + 1 != self.stack.len() {
                    let expected = self
                        .stack
                        .last()
                        .map(|el| el.tag.clone())
                        .unwrap_or_default();
                    return Err(MarkupError::MismatchedClosingTag {
                        expected,
                        found: name,
                    });
                }
                while self.stack.len() > idx {
                    self.close_top();
                }
            }
            None if self.mode == ParseMode::Xml => {
                return Err(MarkupError::UnexpectedClosingTag {
                    tag: name,
                    offset: start,
                });
            }
            None => {}
        }
        Ok(())
    }

    fn start_tag(&mut self) -> Result<(), MarkupError> {
        let start = self.pos;
        let bytes = self.src.as_bytes();
        let malformed = MarkupError::MalformedTag { offset: start };

        let mut i = start + 1;
        while i < bytes.len() && is_name_byte(bytes[i]) {
            i += 1;
        }
        let mut element = MarkupElement::new(self.normalize(&self.src[start + 1..i]));
        let mut self_closing = false;

        loop {
            i = skip_whitespace(bytes, i);
            match bytes.get(i) {
                None => return Err(malformed),
                Some(b'>') => {
                    i += 1;
                    break;
                }
                Some(b'/') => {
                    if bytes.get(i + 1) == Some(&b'>') {
                        self_closing = true;
                        i += 2;
                        break;
                    }
                    i += 1;
                }
                Some(_) => {
                    let name_start = i;
                    while i < bytes.len()
                        && !bytes[i].is_ascii_whitespace()
                        && !matches!(bytes[i], b'=' | b'>' | b'/')
                    {
                        i += 1;
                    }
                    let name = self.normalize(&self.src[name_start..i]);
                    i = skip_whitespace(bytes, i);

                    let mut value = String::new();
                    if bytes.get(i) == Some(&b'=') {
                        i = skip_whitespace(bytes, i + 1);
                        match bytes.get(i) {
                            Some(&quote) if quote == b'"' || quote == b'\'' => {
                                let value_start = i + 1;
                                let len = self.src[value_start..]
                                    .find(char::from(quote))
                                    .ok_or_else(|| malformed.clone())?;
                                value = decode_entities(&self.src[value_start..value_start + len]);
                                i = value_start + len + 1;
                            }
                            Some(_) => {
                                let value_start = i;
                                while i < bytes.len()
                                    && !bytes[i].is_ascii_whitespace()
                                    && bytes[i] != b'>'
                                {
                                    i += 1;
                                }
                                value = decode_entities(&self.src[value_start..i]);
                            }
                            None => return Err(malformed),
                        }
                    }
                    if !name.is_empty() {
                        element.attrs.push((name, value));
                    }
                }
            }
        }
        self.pos = i;

        let html = self.mode == ParseMode::Html;
        if self_closing || (html && is_void_element(&element.tag)) {
            self.push_node(MarkupNode::Element(element));
        } else if html && is_raw_text_element(&element.tag) {
            self.raw_text(element);
        } else if self.stack.len() >= MAX_NESTING_DEPTH {
            return Err(MarkupError::TooDeep {
                limit: MAX_NESTING_DEPTH,
                offset: start,
            });
        } else {
            self.stack.push(element);
        }
        Ok(())
    }

    /// Takes everything up to the matching end tag as one text child.
    fn raw_text(&mut self, mut element: MarkupElement) {
        let rest = &self.src[self.pos..];
        let close = format!("</{}", element.tag);
        let end = rest
            .to_ascii_lowercase()
            .find(&close)
            .unwrap_or(rest.len());

        if end > 0 {
            element
                .children
                .push(MarkupNode::Text(rest[..end].to_string()));
        }
        self.pos += end;
        if end < rest.len() {
            self.pos = match self.src[self.pos..].find('>') {
                Some(gt) => self.pos + gt + 1,
                None => self.src.len(),
            };
        }
        self.push_node(MarkupNode::Element(element));
    }

    fn finish(mut self) -> Result<Vec<MarkupNode>, MarkupError> {
        if self.mode == ParseMode::Xml {
            if let Some(open) = self.stack.last() {
                return Err(MarkupError::UnclosedElement {
                    tag: open.tag.clone(),
                });
            }
        }
        while !self.stack.is_empty() {
            self.close_top();
        }
        Ok(self.roots)
    }
}

fn is_name_byte(b: u8) -> bool {
    b.is_ascii_alphanumeric() || matches!(b, b'-' | b'_' | b':' | b'.')
}

fn skip_whitespace(bytes: &[u8], mut i: usize) -> usize {
    while i < bytes.len() && bytes[i].is_ascii_whitespace() {
        i += 1;
    }
    i
}

/// Decodes character references. Unknown references are kept literally.
#[must_use]
pub fn decode_entities(raw: &str) -> String {
    if !raw.contains('&') {
        return raw.to_string();
    }

    let mut out = String::with_capacity(raw.len());
    let mut rest = raw;
    while let Some(amp) = rest.find('&') {
        out.push_str(&rest[..amp]);
        let after = &rest[amp + 1..];
        let decoded = after
            .find(';')
            .filter(|&semi| semi <= 10)
            .and_then(|semi| decode_entity(&after[..semi]).map(|c| (c, semi)));
        match decoded {
            Some((c, semi)) => {
                out.push(c);
                rest = &after[semi + 1..];
            }
            None => {
                out.push('&');
                rest = after;
            }
        }
    }
    out.push_str(rest);
    out
}

fn decode_entity(name: &str) -> Option<char> {
    match name {
        "amp" => Some('&'),
        "lt" => Some('<'),
        "gt" => Some('>'),
        "quot" => Some('"'),
        "apos" => Some('\''),
        "nbsp" => Some('\u{a0}'),
        _ => {
            let num = name.strip_prefix('#')?;
            let code = match num.strip_prefix(['x', 'X']) {
                Some(hex) => u32::from_str_radix(hex, 16).ok()?,
                None => num.parse().ok()?,
            };
            char::from_u32(code)
        }
    }
}

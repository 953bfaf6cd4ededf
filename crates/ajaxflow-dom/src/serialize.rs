//! Markup serialization.

use crate::markup::{is_raw_text_element, is_void_element, MarkupNode};

/// Escapes character data.
#[must_use]
pub fn escape_text(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            _ => out.push(c),
        }
    }
    out
}

/// Escapes a double-quoted attribute value.
#[must_use]
pub fn escape_attr(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '"' => out.push_str("&quot;"),
            '<' => out.push_str("&lt;"),
            _ => out.push(c),
        }
    }
    out
}

pub(crate) fn write_start_tag(tag: &str, attrs: &[(String, String)], out: &mut String) {
    out.push('<');
    out.push_str(tag);
    for (name, value) in attrs {
        out.push(' ');
        out.push_str(name);
        out.push_str("=\"");
        out.push_str(&escape_attr(value));
        out.push('"');
    }
    out.push('>');
}

pub(crate) fn write_end_tag(tag: &str, out: &mut String) {
    if !is_void_element(tag) {
        out.push_str("</");
        out.push_str(tag);
        out.push('>');
    }
}

pub(crate) fn write_comment(body: &str, out: &mut String) {
    out.push_str("<!--");
    out.push_str(body);
    out.push_str("-->");
}

/// Text inside `script`/`style` is written as-is.
pub(crate) fn write_text(text: &str, parent_tag: Option<&str>, out: &mut String) {
    if parent_tag.is_some_and(is_raw_text_element) {
        out.push_str(text);
    } else {
        out.push_str(&escape_text(text));
    }
}

pub(crate) fn write_markup_nodes(nodes: &[MarkupNode], out: &mut String) {
    write_markup_children(nodes, None, out);
}

fn write_markup_children(nodes: &[MarkupNode], parent_tag: Option<&str>, out: &mut String) {
    for node in nodes {
        match node {
            MarkupNode::Element(el) => {
                write_start_tag(&el.tag, &el.attrs, out);
                write_markup_children(&el.children, Some(&el.tag), out);
                write_end_tag(&el.tag, out);
            }
            MarkupNode::Text(t) => write_text(t, parent_tag, out),
            MarkupNode::Comment(c) => write_comment(c, out),
        }
    }
}

//! Integration tests: realistic pages through parse, patch, serialize.

use ajaxflow_dom::{Document, DomPatch, Fragment, NodeData};

const PAGE: &str = r#"<!DOCTYPE html>
<html>
<head>
  <title>Orders</title>
  <script src="/res/app.js;jsessionid=ABC"></script>
  <link rel="stylesheet" href="/res/app.css">
</head>
<body>
  <table id="orders">
    <tr id="order1"><td>1</td></tr>
  </table>
  <!-- footer -->
  <div id="footer">&copy; shop</div>
</body>
</html>"#;

#[test]
fn page_parses_into_head_and_body() {
    let doc = Document::parse(PAGE).unwrap();
    assert_eq!(doc.title(), "Orders");
    assert_eq!(doc.elements_by_tag(doc.head(), "script").len(), 1);
    assert_eq!(doc.elements_by_tag(doc.head(), "link").len(), 1);
    assert!(doc.element_by_id("order1").is_some());

    let comments = doc
        .descendants(doc.body())
        .into_iter()
        .filter(|&n| matches!(doc.data(n), Some(NodeData::Comment(_))))
        .count();
    assert_eq!(comments, 1);
}

#[test]
fn unknown_entities_survive_serialization() {
    let doc = Document::parse(PAGE).unwrap();
    let footer = doc.element_by_id("footer").unwrap();
    assert_eq!(doc.text_content(footer), "&copy; shop");
    assert_eq!(doc.inner_html(footer), "&amp;copy; shop");
}

#[test]
fn nested_replacement_then_lookup_sees_new_tree() {
    let mut doc = Document::parse(PAGE).unwrap();
    let table = doc.element_by_id("orders").unwrap();
    let old_row = doc.element_by_id("order1").unwrap();

    doc.apply(DomPatch::Replace {
        target: table,
        fragment: Fragment::parse_html(
            "<table id=\"orders\"><tr id=\"order1\"><td>1</td></tr><tr id=\"order2\"><td>2</td></tr></table>",
        )
        .unwrap(),
    })
    .unwrap();

    let new_row = doc.element_by_id("order1").unwrap();
    assert_ne!(new_row, old_row);
    assert!(!doc.is_attached(old_row));
    assert!(doc.element_by_id("order2").is_some());

    // Stale nested id from before the replacement is rejected.
    assert!(doc.apply(DomPatch::Remove { target: old_row }).is_err());
}

#[test]
fn serialization_is_stable_across_reparse() {
    let doc = Document::parse(PAGE).unwrap();
    let once = doc.to_html();
    let twice = Document::parse(&once).unwrap().to_html();
    assert_eq!(once, twice);
}

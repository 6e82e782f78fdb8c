//! Thin helpers over the `markup5ever_rcdom` tree.
//!
//! Parsed trees are inert: nothing in them runs, so they are safe to mutate
//! and serialize.

use std::rc::{Rc, Weak};

use html5ever::tendril::TendrilSink;
use html5ever::{local_name, namespace_url, ns, parse_document, parse_fragment, ParseOpts, QualName};
use markup5ever_rcdom::{Handle, NodeData, RcDom};

/// Elements whose text never renders.
const NON_RENDERED: &[&str] = &["script", "style", "noscript", "template", "head", "title"];

/// Elements serialized without a closing tag.
const VOID_ELEMENTS: &[&str] = &[
    "area", "base", "br", "col", "embed", "hr", "img", "input", "link", "meta", "param",
    "source", "track", "wbr",
];

/// A parsed page: its document node plus the URL it was loaded from.
#[derive(Clone)]
pub struct Page {
    document: Handle,
    url: String,
}

impl Page {
    pub fn parse(html: &str, url: impl Into<String>) -> Self {
        Self {
            document: parse_html_document(html),
            url: url.into(),
        }
    }

    pub fn document(&self) -> &Handle {
        &self.document
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    /// The root `<html>` element.
    pub fn root_element(&self) -> Option<Handle> {
        first_element_child(&self.document)
    }

    pub fn head(&self) -> Option<Handle> {
        find_element(&self.document, &|n| is_element(n, "head"))
    }

    pub fn body(&self) -> Option<Handle> {
        find_element(&self.document, &|n| is_element(n, "body"))
    }

    /// First element with the given `id`.
    pub fn element_by_id(&self, id: &str) -> Option<Handle> {
        find_element(&self.document, &|n| attr(n, "id").as_deref() == Some(id))
    }
}

pub fn parse_html_document(html: &str) -> Handle {
    let dom = parse_document(RcDom::default(), ParseOpts::default()).one(html);
    dom.document
}

/// Parse `html` as the children of a `<body>`; returns the synthetic root
/// element whose children are the fragment's nodes.
///
/// The root is detached from the parser's document first. Dropping an
/// `RcDom` node clears the children of every descendant it still owns.
pub fn parse_html_fragment(html: &str) -> Handle {
    let dom = parse_fragment(
        RcDom::default(),
        ParseOpts::default(),
        QualName::new(None, ns!(html), local_name!("body")),
        Vec::new(),
    )
    .one(html);
    match first_element_child(&dom.document) {
        Some(root) => {
            detach(&root);
            root
        }
        None => dom.document,
    }
}

pub fn parent(node: &Handle) -> Option<Handle> {
    let weak = node.parent.take();
    let parent = weak.as_ref().and_then(Weak::upgrade);
    node.parent.set(weak);
    parent
}

pub fn children(node: &Handle) -> Vec<Handle> {
    node.children.borrow().clone()
}

pub fn index_in_parent(node: &Handle) -> Option<usize> {
    let parent = parent(node)?;
    let siblings = parent.children.borrow();
    siblings.iter().position(|c| Rc::ptr_eq(c, node))
}

/// Append `child` to `parent`, detaching it from any previous parent.
pub fn append_child(parent: &Handle, child: Handle) {
    detach(&child);
    child.parent.set(Some(Rc::downgrade(parent)));
    parent.children.borrow_mut().push(child);
}

pub fn detach(node: &Handle) {
    if let Some(parent) = parent(node) {
        parent.children.borrow_mut().retain(|c| !Rc::ptr_eq(c, node));
    }
    node.parent.set(None);
}

/// Move every child of `from` under `to`, preserving order.
pub fn move_children(from: &Handle, to: &Handle) {
    for child in children(from) {
        append_child(to, child);
    }
}

/// Whether `node` is reachable from `root` through parent links.
pub fn is_connected(node: &Handle, root: &Handle) -> bool {
    let mut current = Some(node.clone());
    while let Some(n) = current {
        if Rc::ptr_eq(&n, root) {
            return true;
        }
        current = parent(&n);
    }
    false
}

/// Lowercase local name of an element, `None` for other node kinds.
pub fn tag_name(node: &Handle) -> Option<String> {
    match &node.data {
        NodeData::Element { name, .. } => Some((*name.local).to_ascii_lowercase()),
        _ => None,
    }
}

pub fn is_element(node: &Handle, tag: &str) -> bool {
    match &node.data {
        NodeData::Element { name, .. } => (*name.local).eq_ignore_ascii_case(tag),
        _ => false,
    }
}

pub fn attr(node: &Handle, name: &str) -> Option<String> {
    match &node.data {
        NodeData::Element { attrs, .. } => attrs
            .borrow()
            .iter()
            .find(|a| (*a.name.local).eq_ignore_ascii_case(name))
            .map(|a| a.value.to_string()),
        _ => None,
    }
}

pub fn first_element_child(node: &Handle) -> Option<Handle> {
    node.children
        .borrow()
        .iter()
        .find(|c| matches!(c.data, NodeData::Element { .. }))
        .cloned()
}

/// Depth-first search for the first element matching `pred`.
pub fn find_element(root: &Handle, pred: &dyn Fn(&Handle) -> bool) -> Option<Handle> {
    for child in root.children.borrow().iter() {
        if matches!(child.data, NodeData::Element { .. }) && pred(child) {
            return Some(child.clone());
        }
        if let Some(found) = find_element(child, pred) {
            return Some(found);
        }
    }
    None
}

/// Raw concatenated text of every descendant text node.
pub fn text_content(node: &Handle) -> String {
    let mut out = String::new();
    collect_text(node, &mut out);
    out
}

fn collect_text(node: &Handle, out: &mut String) {
    match &node.data {
        NodeData::Text { contents } => out.push_str(&contents.borrow()),
        _ => {
            for child in node.children.borrow().iter() {
                collect_text(child, out);
            }
        }
    }
}

/// Collapse runs of whitespace to single spaces and trim.
pub fn collapse_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Whether an element's text is never rendered.
pub fn is_non_rendered(node: &Handle) -> bool {
    tag_name(node).is_some_and(|t| NON_RENDERED.contains(&t.as_str()))
}

pub fn is_void_element(tag: &str) -> bool {
    VOID_ELEMENTS.contains(&tag)
}

pub fn escape_text(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '\u{a0}' => out.push_str("&nbsp;"),
            _ => out.push(c),
        }
    }
    out
}

pub fn escape_attr(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '"' => out.push_str("&quot;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '\u{a0}' => out.push_str("&nbsp;"),
            _ => out.push(c),
        }
    }
    out
}

/// Opening tag for an element, attributes included.
pub fn open_tag(node: &Handle) -> Option<String> {
    let NodeData::Element { name, attrs, .. } = &node.data else {
        return None;
    };
    let mut tag = format!("<{}", name.local);
    for a in attrs.borrow().iter() {
        let attr_name = match &a.name.prefix {
            Some(prefix) => format!("{}:{}", prefix, a.name.local),
            None => a.name.local.to_string(),
        };
        tag.push_str(&format!(" {}=\"{}\"", attr_name, escape_attr(&a.value)));
    }
    tag.push('>');
    Some(tag)
}

#[cfg(test)]
mod tests {
    use super::*;

    const PAGE: &str = r#"<!doctype html><html lang="en"><head><title>T</title></head>
        <body><div id="main"><p>Hello <b>world</b></p></div></body></html>"#;

    #[test]
    fn test_lookup_and_parent_links() {
        let page = Page::parse(PAGE, "https://example.com/");
        let main = page.element_by_id("main").unwrap();
        let p = first_element_child(&main).unwrap();
        assert!(is_element(&p, "p"));
        assert!(Rc::ptr_eq(&parent(&p).unwrap(), &main));
        assert_eq!(index_in_parent(&p), Some(0));
        assert!(is_connected(&p, page.document()));
        assert_eq!(attr(&page.root_element().unwrap(), "LANG").as_deref(), Some("en"));
    }

    #[test]
    fn test_detach_and_append() {
        let page = Page::parse(PAGE, "");
        let main = page.element_by_id("main").unwrap();
        let body = page.body().unwrap();
        let p = first_element_child(&main).unwrap();

        detach(&p);
        assert!(!is_connected(&p, page.document()));
        assert!(main.children.borrow().is_empty());

        append_child(&body, p.clone());
        assert!(is_connected(&p, page.document()));
        assert_eq!(text_content(&body).trim(), "Hello world");
    }

    #[test]
    fn test_fragment_root_holds_nodes() {
        let root = parse_html_fragment("<em>a</em> b");
        assert_eq!(children(&root).len(), 2);
        assert_eq!(text_content(&root), "a b");
    }

    #[test]
    fn test_fragment_survives_parser_teardown() {
        let root = parse_html_fragment("<div><p>one <b>two</b></p></div>");
        assert!(parent(&root).is_none());
        let div = first_element_child(&root).unwrap();
        let p = first_element_child(&div).unwrap();
        assert_eq!(children(&p).len(), 2);
        assert_eq!(text_content(&div), "one two");

        let page = Page::parse(PAGE, "");
        let body = page.body().unwrap();
        append_child(&body, div.clone());
        drop(root);
        assert!(is_connected(&p, page.document()));
        assert_eq!(text_content(&p), "one two");
    }

    #[test]
    fn test_escaping() {
        assert_eq!(escape_text("a < b & c"), "a &lt; b &amp; c");
        assert_eq!(escape_attr(r#"say "hi""#), "say &quot;hi&quot;");
        assert_eq!(collapse_whitespace("  a \n\t b  "), "a b");
    }
}

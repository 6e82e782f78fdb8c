//! Selection and range model over the page tree.
//!
//! Offsets follow DOM rules: inside a text node they count characters,
//! inside any other node they count children.

use std::rc::Rc;

use markup5ever_rcdom::{Handle, NodeData};

use crate::dom;

/// One end of a range.
#[derive(Clone)]
pub struct Boundary {
    pub node: Handle,
    pub offset: usize,
}

impl Boundary {
    pub fn new(node: Handle, offset: usize) -> Self {
        Self { node, offset }
    }
}

/// A contiguous span of the document. `start` must not follow `end`.
#[derive(Clone)]
pub struct Range {
    start: Boundary,
    end: Boundary,
}

/// Receives the pieces of a range in document order.
trait RangeVisitor {
    fn text(&mut self, text: &str);
    fn open(&mut self, element: &Handle);
    fn close(&mut self, element: &Handle);
}

type Bound<'a> = Option<(&'a [usize], usize)>;

impl Range {
    pub fn new(start: Boundary, end: Boundary) -> Self {
        Self { start, end }
    }

    /// Range covering all children of `node`.
    pub fn select_node_contents(node: &Handle) -> Self {
        let len = match &node.data {
            NodeData::Text { contents } => contents.borrow().chars().count(),
            _ => node.children.borrow().len(),
        };
        Self::new(Boundary::new(node.clone(), 0), Boundary::new(node.clone(), len))
    }

    pub fn start(&self) -> &Boundary {
        &self.start
    }

    pub fn end(&self) -> &Boundary {
        &self.end
    }

    pub fn is_collapsed(&self) -> bool {
        Rc::ptr_eq(&self.start.node, &self.end.node) && self.start.offset == self.end.offset
    }

    /// Deepest node containing both boundaries.
    pub fn common_ancestor(&self) -> Option<Handle> {
        let mut start_chain = Vec::new();
        let mut current = Some(self.start.node.clone());
        while let Some(node) = current {
            current = dom::parent(&node);
            start_chain.push(node);
        }

        let mut current = Some(self.end.node.clone());
        while let Some(node) = current {
            if start_chain.iter().any(|n| Rc::ptr_eq(n, &node)) {
                return Some(node);
            }
            current = dom::parent(&node);
        }
        None
    }

    /// Text covered by the range. Text inside script/style-like elements is skipped.
    pub fn text(&self) -> String {
        let mut collector = TextCollector::default();
        self.walk(&mut collector);
        collector.out
    }

    /// HTML of the range's contents as a detached clone would serialize:
    /// boundary text nodes are sliced and partially selected ancestors
    /// are cloned without their unselected children.
    pub fn contents_html(&self) -> String {
        let mut writer = HtmlWriter::default();
        self.walk(&mut writer);
        writer.out
    }

    fn walk(&self, visitor: &mut dyn RangeVisitor) {
        let Some(ancestor) = self.common_ancestor() else {
            return;
        };
        let (Some(start_path), Some(end_path)) = (
            path_from(&ancestor, &self.start.node),
            path_from(&ancestor, &self.end.node),
        ) else {
            return;
        };

        if let NodeData::Text { contents } = &ancestor.data {
            let text = slice_chars(&contents.borrow(), self.start.offset, self.end.offset);
            if !text.is_empty() {
                visitor.text(&text);
            }
            return;
        }

        walk_children(
            &ancestor,
            Some((&start_path, self.start.offset)),
            Some((&end_path, self.end.offset)),
            visitor,
        );
    }
}

/// Child-index path from `ancestor` down to `node`.
fn path_from(ancestor: &Handle, node: &Handle) -> Option<Vec<usize>> {
    let mut path = Vec::new();
    let mut current = node.clone();
    while !Rc::ptr_eq(&current, ancestor) {
        path.push(dom::index_in_parent(&current)?);
        current = dom::parent(&current)?;
    }
    path.reverse();
    Some(path)
}

fn walk_children(node: &Handle, start: Bound<'_>, end: Bound<'_>, visitor: &mut dyn RangeVisitor) {
    let children = dom::children(node);

    let (first, start_inner) = match start {
        None => (0, None),
        Some(([], offset)) => (offset, None),
        Some(([index, rest @ ..], offset)) => (*index, Some((rest, offset))),
    };
    let (stop, end_inner) = match end {
        None => (children.len(), None),
        Some(([], offset)) => (offset, None),
        Some(([index, rest @ ..], offset)) => (index + 1, Some((rest, offset))),
    };

    for (index, child) in children.iter().enumerate().take(stop).skip(first) {
        let s = if index == first { start_inner } else { None };
        let e = if index + 1 == stop { end_inner } else { None };
        walk_node(child, s, e, visitor);
    }
}

fn walk_node(node: &Handle, start: Bound<'_>, end: Bound<'_>, visitor: &mut dyn RangeVisitor) {
    match &node.data {
        NodeData::Text { contents } => {
            let contents = contents.borrow();
            let lo = start.map_or(0, |(_, offset)| offset);
            let hi = end.map_or(usize::MAX, |(_, offset)| offset);
            let text = slice_chars(&contents, lo, hi);
            if !text.is_empty() {
                visitor.text(&text);
            }
        }
        NodeData::Element { .. } => {
            visitor.open(node);
            walk_children(node, start, end, visitor);
            visitor.close(node);
        }
        _ => {}
    }
}

fn slice_chars(text: &str, lo: usize, hi: usize) -> String {
    if hi <= lo {
        return String::new();
    }
    text.chars().skip(lo).take(hi - lo).collect()
}

#[derive(Default)]
struct TextCollector {
    out: String,
    skip_depth: usize,
}

impl RangeVisitor for TextCollector {
    fn text(&mut self, text: &str) {
        if self.skip_depth == 0 {
            self.out.push_str(text);
        }
    }

    fn open(&mut self, element: &Handle) {
        if dom::is_non_rendered(element) {
            self.skip_depth += 1;
        }
    }

    fn close(&mut self, element: &Handle) {
        if dom::is_non_rendered(element) {
            self.skip_depth = self.skip_depth.saturating_sub(1);
        }
    }
}

#[derive(Default)]
struct HtmlWriter {
    out: String,
}

impl RangeVisitor for HtmlWriter {
    fn text(&mut self, text: &str) {
        self.out.push_str(&dom::escape_text(text));
    }

    fn open(&mut self, element: &Handle) {
        if let Some(tag) = dom::open_tag(element) {
            self.out.push_str(&tag);
        }
    }

    fn close(&mut self, element: &Handle) {
        if let Some(tag) = dom::tag_name(element) {
            if !dom::is_void_element(&tag) {
                self.out.push_str(&format!("</{}>", tag));
            }
        }
    }
}

/// The user's current selection: zero or more ranges.
#[derive(Clone, Default)]
pub struct Selection {
    ranges: Vec<Range>,
}

impl Selection {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn from_range(range: Range) -> Self {
        Self { ranges: vec![range] }
    }

    pub fn range_count(&self) -> usize {
        self.ranges.len()
    }

    pub fn first_range(&self) -> Option<&Range> {
        self.ranges.first()
    }

    pub fn add_range(&mut self, range: Range) {
        self.ranges.push(range);
    }

    pub fn is_collapsed(&self) -> bool {
        self.ranges.iter().all(Range::is_collapsed)
    }

    /// Text of every range, concatenated (untrimmed).
    pub fn text(&self) -> String {
        self.ranges.iter().map(Range::text).collect()
    }

    /// Select the first occurrence of `needle` inside a single text node under `root`.
    pub fn find_text(root: &Handle, needle: &str) -> Option<Self> {
        if needle.is_empty() {
            return None;
        }
        let (node, offset) = find_in_text_nodes(root, needle)?;
        let len = needle.chars().count();
        Some(Self::from_range(Range::new(
            Boundary::new(node.clone(), offset),
            Boundary::new(node, offset + len),
        )))
    }
}

fn find_in_text_nodes(node: &Handle, needle: &str) -> Option<(Handle, usize)> {
    if let NodeData::Text { contents } = &node.data {
        let contents = contents.borrow();
        let contents: &str = &contents;
        let byte_idx = contents.find(needle)?;
        return Some((node.clone(), contents[..byte_idx].chars().count()));
    }
    if dom::is_non_rendered(node) {
        return None;
    }
    node.children
        .borrow()
        .iter()
        .find_map(|child| find_in_text_nodes(child, needle))
}

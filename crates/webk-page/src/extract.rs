//! Builds a bounded [`PageContext`] from a page and the user's selection.
//!
//! Extraction reads the page but never changes it, and never fails: a piece
//! of context that cannot be determined is simply left out.

use markup5ever_rcdom::{Handle, NodeData};
use tracing::debug;
use webk_core::context::{truncate_chars, MAX_BLOCK_TEXT, MAX_SELECTION_HTML};
use webk_core::PageContext;

use crate::dom::{self, Page};
use crate::sanitize::sanitize;
use crate::selection::Selection;
use crate::style::{is_block_like, is_hidden, StyleQuery, UserAgentStyles};

/// Upper bound on ancestors visited while looking for the context block.
pub const MAX_BLOCK_WALK: usize = 64;

/// Context for `selection` using the default user-agent styles.
pub fn build_context(page: &Page, selection: &Selection) -> PageContext {
    build_context_with(page, selection, &UserAgentStyles)
}

pub fn build_context_with(page: &Page, selection: &Selection, styles: &dyn StyleQuery) -> PageContext {
    let mut builder = PageContext::builder()
        .title(page_title(page))
        .url(page.url())
        .lang(page.root_element().and_then(|html| dom::attr(&html, "lang")).unwrap_or_default())
        .meta_description(meta_description(page));

    let Some(range) = selection.first_range() else {
        return builder.build();
    };

    let html = sanitize(&range.contents_html());
    builder = builder.selection_html(truncate_chars(&html, MAX_SELECTION_HTML));

    let Some(block) = range.common_ancestor().and_then(|n| context_block(styles, &n)) else {
        return builder.build();
    };
    let block_text = truncate_chars(&rendered_text(styles, &block), MAX_BLOCK_TEXT);

    let selected = selection.text();
    let selected = selected.trim();
    if let Some((before, after)) = surrounding(&block_text, selected) {
        builder = builder.surrounding(before, after);
    } else {
        debug!("Selection not found verbatim in its context block");
    }

    builder.block_text(block_text).build()
}

fn page_title(page: &Page) -> String {
    dom::find_element(page.document(), &|n| dom::is_element(n, "title"))
        .map(|t| dom::collapse_whitespace(&dom::text_content(&t)))
        .unwrap_or_default()
}

fn meta_description(page: &Page) -> String {
    dom::find_element(page.document(), &|n| {
        dom::is_element(n, "meta")
            && dom::attr(n, "name").is_some_and(|name| name.eq_ignore_ascii_case("description"))
    })
    .and_then(|meta| dom::attr(&meta, "content"))
    .unwrap_or_default()
}

/// Nearest block-like ancestor of `start`, inclusive.
///
/// Text nodes start at their parent. Stops at the first block-like element,
/// at the root, or after [`MAX_BLOCK_WALK`] elements; in the last two cases
/// the last element visited is returned.
pub fn context_block(styles: &dyn StyleQuery, start: &Handle) -> Option<Handle> {
    let mut current = match start.data {
        NodeData::Element { .. } => Some(start.clone()),
        _ => dom::parent(start),
    };
    let mut last_element = None;
    let mut visited = 0;

    while let Some(node) = current {
        if !matches!(node.data, NodeData::Element { .. }) {
            break;
        }
        if is_block_like(styles, &node) {
            return Some(node);
        }
        visited += 1;
        current = dom::parent(&node);
        last_element = Some(node);
        if visited >= MAX_BLOCK_WALK {
            debug!("Block walk hit the {} ancestor cap", MAX_BLOCK_WALK);
            break;
        }
    }
    last_element
}

/// Visible text of `node`, word-separated at block boundaries and `<br>`,
/// whitespace collapsed.
pub fn rendered_text(styles: &dyn StyleQuery, node: &Handle) -> String {
    let mut out = String::new();
    collect_rendered(styles, node, &mut out);
    dom::collapse_whitespace(&out)
}

fn collect_rendered(styles: &dyn StyleQuery, node: &Handle, out: &mut String) {
    match &node.data {
        NodeData::Text { contents } => out.push_str(&contents.borrow()),
        NodeData::Element { .. } => {
            if dom::is_non_rendered(node) || is_hidden(styles, node) {
                return;
            }
            if dom::is_element(node, "br") {
                out.push('\n');
                return;
            }
            let block = is_block_like(styles, node);
            if block {
                out.push('\n');
            }
            for child in node.children.borrow().iter() {
                collect_rendered(styles, child, out);
            }
            if block {
                out.push('\n');
            }
        }
        NodeData::Document => {
            for child in node.children.borrow().iter() {
                collect_rendered(styles, child, out);
            }
        }
        _ => {}
    }
}

/// Text immediately before and after the first exact occurrence of
/// `selected` in `block`, each bounded by the builder.
fn surrounding(block: &str, selected: &str) -> Option<(String, String)> {
    if selected.is_empty() {
        return None;
    }
    let byte_idx = block.find(selected)?;
    let before = &block[..byte_idx];
    let after = &block[byte_idx + selected.len()..];
    Some((before.to_string(), after.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::selection::{Boundary, Range};
    use webk_core::context::MAX_SURROUNDING_TEXT;

    const FOX: &str = "The quick brown fox jumps over the lazy dog";

    fn fox_page() -> Page {
        Page::parse(
            &format!(
                r#"<!doctype html><html lang="en-GB"><head><title>  Animal
                facts </title><META NAME="Description" content="All about foxes"></head>
                <body><article><p id="p">{}</p><script>var x = 1;</script></article></body></html>"#,
                FOX
            ),
            "https://www.example.com/foxes",
        )
    }

    #[test]
    fn test_fox_example() {
        let page = fox_page();
        let sel = Selection::find_text(page.document(), "fox").unwrap();
        let ctx = build_context(&page, &sel);

        assert_eq!(ctx.title(), "Animal facts");
        assert_eq!(ctx.url(), "https://www.example.com/foxes");
        assert_eq!(ctx.lang(), "en-GB");
        assert_eq!(ctx.meta_description(), "All about foxes");
        assert_eq!(ctx.selection_html(), Some("fox"));
        assert_eq!(ctx.block_text(), Some(FOX));
        assert_eq!(ctx.before_text(), Some("The quick brown "));
        assert_eq!(ctx.after_text(), Some(" jumps over the lazy dog"));
    }

    #[test]
    fn test_no_selection_gives_metadata_only() {
        let page = fox_page();
        let ctx = build_context(&page, &Selection::empty());
        assert_eq!(ctx.title(), "Animal facts");
        assert!(ctx.selection_html().is_none());
        assert!(ctx.block_text().is_none());
        assert!(ctx.before_text().is_none());
    }

    #[test]
    fn test_missing_metadata_defaults_to_empty() {
        let page = Page::parse("<p>only text</p>", "");
        let ctx = build_context(&page, &Selection::empty());
        assert_eq!(ctx.title(), "");
        assert_eq!(ctx.lang(), "");
        assert_eq!(ctx.meta_description(), "");
    }

    #[test]
    fn test_selection_not_in_block_leaves_surrounding_unset() {
        let page = Page::parse(r#"<p id="p">Hello <b>bold</b>   world</p>"#, "");
        let p = page.element_by_id("p").unwrap();
        // Raw text "Hello bold   world" collapses to "Hello bold world" in the block.
        let sel = Selection::from_range(Range::select_node_contents(&p));
        let ctx = build_context(&page, &sel);
        assert_eq!(ctx.block_text(), Some("Hello bold world"));
        assert!(ctx.before_text().is_none());
        assert!(ctx.after_text().is_none());
    }

    #[test]
    fn test_selection_spanning_inline_elements() {
        let page = Page::parse(r#"<div><p id="p">Say <em>hello</em> there, friend</p></div>"#, "");
        let p = page.element_by_id("p").unwrap();
        let first = p.children.borrow()[0].clone();
        let last = p.children.borrow()[2].clone();
        let sel = Selection::from_range(Range::new(Boundary::new(first, 4), Boundary::new(last, 6)));

        let ctx = build_context(&page, &sel);
        assert_eq!(ctx.selection_html(), Some("<em>hello</em> there"));
        assert_eq!(ctx.before_text(), Some("Say "));
        assert_eq!(ctx.after_text(), Some(", friend"));
    }

    #[test]
    fn test_selection_html_is_sanitized() {
        let page = Page::parse(
            r#"<div id="d"><span onclick="steal()">click</span><style>x{}</style> me</div>"#,
            "",
        );
        let d = page.element_by_id("d").unwrap();
        let ctx = build_context(&page, &Selection::from_range(Range::select_node_contents(&d)));
        assert_eq!(ctx.selection_html(), Some("<span>click</span> me"));
        assert_eq!(ctx.block_text(), Some("click me"));
    }

    #[test]
    fn test_block_text_skips_hidden_and_separates_blocks() {
        let page = Page::parse(
            r#"<section id="s"><div>one</div><div>two<br>three</div><div style="display:none">secret</div><noscript>ns</noscript></section>"#,
            "",
        );
        let s = page.element_by_id("s").unwrap();
        assert_eq!(rendered_text(&UserAgentStyles, &s), "one two three");
    }

    #[test]
    fn test_context_block_from_inline_ancestor() {
        let page = Page::parse(r#"<li id="li"><span><b id="b">deep</b></span></li>"#, "");
        let b = page.element_by_id("b").unwrap();
        let text = b.children.borrow()[0].clone();
        let block = context_block(&UserAgentStyles, &text).unwrap();
        assert_eq!(dom::attr(&block, "id").as_deref(), Some("li"));
    }

    #[test]
    fn test_context_block_walk_is_capped() {
        let depth = MAX_BLOCK_WALK + 10;
        let html = format!(
            "<div>{}<i id=\"leaf\">x</i>{}</div>",
            "<span>".repeat(depth),
            "</span>".repeat(depth)
        );
        let page = Page::parse(&html, "");
        let leaf = page.element_by_id("leaf").unwrap();
        let block = context_block(&UserAgentStyles, &leaf).unwrap();
        assert!(dom::is_element(&block, "span"));
    }

    #[test]
    fn test_bounds_applied_to_large_blocks() {
        let long = "a".repeat(MAX_BLOCK_TEXT + 500);
        let html = format!(r#"<p id="p">{}NEEDLE{}</p>"#, "x".repeat(2000), long);
        let page = Page::parse(&html, "");
        let sel = Selection::find_text(page.document(), "NEEDLE").unwrap();
        let ctx = build_context(&page, &sel);

        let block = ctx.block_text().unwrap();
        assert_eq!(block.chars().count(), MAX_BLOCK_TEXT);
        let before = ctx.before_text().unwrap();
        assert_eq!(before.chars().count(), MAX_SURROUNDING_TEXT);
        assert!(before.chars().all(|c| c == 'x'));
        assert_eq!(ctx.after_text().unwrap().chars().count(), MAX_SURROUNDING_TEXT);
    }
}

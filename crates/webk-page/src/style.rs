//! Display-role queries used to find the block enclosing a selection.
//!
//! Only elements expose a display capability; text, comments and the
//! document node answer `None`.

use markup5ever_rcdom::Handle;

use crate::dom;

/// Computed `display` value, reduced to what block detection needs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Display {
    Block,
    ListItem,
    Table,
    Inline,
    InlineBlock,
    Flex,
    Grid,
    None,
    Other,
}

impl Display {
    pub fn parse(value: &str) -> Self {
        match value.trim().to_ascii_lowercase().as_str() {
            "block" | "flow-root" => Display::Block,
            "list-item" => Display::ListItem,
            "table" => Display::Table,
            "inline" | "contents" => Display::Inline,
            "inline-block" | "inline-flex" | "inline-grid" | "inline-table" => Display::InlineBlock,
            "flex" => Display::Flex,
            "grid" => Display::Grid,
            "none" => Display::None,
            _ => Display::Other,
        }
    }
}

/// Capability query: does this node expose a display role, and which one?
pub trait StyleQuery {
    fn display(&self, node: &Handle) -> Option<Display>;
}

/// Inline `style` declarations first, then the HTML user-agent default.
#[derive(Debug, Default, Clone, Copy)]
pub struct UserAgentStyles;

const BLOCK_TAGS: &[&str] = &[
    "address", "article", "aside", "blockquote", "body", "center", "dd", "details", "dialog",
    "dir", "div", "dl", "dt", "fieldset", "figcaption", "figure", "footer", "form", "h1", "h2",
    "h3", "h4", "h5", "h6", "header", "hgroup", "hr", "html", "legend", "listing", "main", "menu",
    "nav", "ol", "p", "plaintext", "pre", "search", "section", "summary", "ul", "xmp",
];

const HIDDEN_TAGS: &[&str] = &[
    "area", "base", "datalist", "head", "link", "meta", "noscript", "script", "style", "template",
    "title",
];

impl StyleQuery for UserAgentStyles {
    fn display(&self, node: &Handle) -> Option<Display> {
        let tag = dom::tag_name(node)?;

        if let Some(inline) = dom::attr(node, "style").and_then(|s| inline_display(&s)) {
            return Some(inline);
        }
        if dom::attr(node, "hidden").is_some() {
            return Some(Display::None);
        }

        let display = match tag.as_str() {
            "li" => Display::ListItem,
            "table" => Display::Table,
            t if HIDDEN_TAGS.contains(&t) => Display::None,
            t if BLOCK_TAGS.contains(&t) => Display::Block,
            "tr" | "td" | "th" | "tbody" | "thead" | "tfoot" | "caption" | "colgroup" | "col" => {
                Display::Other
            }
            _ => Display::Inline,
        };
        Some(display)
    }
}

/// Last `display` declaration in an inline style attribute.
fn inline_display(style: &str) -> Option<Display> {
    style
        .split(';')
        .filter_map(|decl| decl.split_once(':'))
        .filter(|(prop, _)| prop.trim().eq_ignore_ascii_case("display"))
        .map(|(_, value)| Display::parse(value.trim_end_matches("!important")))
        .last()
}

/// Whether `node` bounds a context block: a block, list-item or table
/// display, or a paragraph/heading tag regardless of its styling.
pub fn is_block_like(styles: &dyn StyleQuery, node: &Handle) -> bool {
    if let Some(tag) = dom::tag_name(node) {
        if matches!(tag.as_str(), "p" | "h1" | "h2" | "h3" | "h4" | "h5" | "h6") {
            return true;
        }
    }
    matches!(
        styles.display(node),
        Some(Display::Block | Display::ListItem | Display::Table)
    )
}

/// Whether `node` renders nothing (display `none`).
pub fn is_hidden(styles: &dyn StyleQuery, node: &Handle) -> bool {
    styles.display(node) == Some(Display::None)
}

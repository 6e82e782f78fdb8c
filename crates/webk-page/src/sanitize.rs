//! HTML sanitizer for selection fragments and rendered answers.
//!
//! Input is parsed into an inert tree, pruned, and serialized again. The
//! output keeps structure, text, links and inline formatting.

use std::collections::VecDeque;
use std::rc::Rc;

use html5ever::serialize::{serialize, SerializeOpts, TraversalScope};
use html5ever::tendril::StrTendril;
use markup5ever_rcdom::{Handle, NodeData, SerializableHandle};
use once_cell::sync::Lazy;
use regex::Regex;
use tracing::debug;

use crate::dom;

/// Elements removed together with their whole subtree.
const BLOCKED_ELEMENTS: &[&str] = &[
    "script", "style", "noscript", "template", "iframe", "frame", "frameset", "object", "embed",
    "applet", "xmp", "noembed", "noframes", "plaintext",
];

/// Attributes whose value is navigated to or loaded.
const URL_ATTRIBUTES: &[&str] = &["href", "src", "action", "formaction", "xlink:href", "poster", "background"];

/// Reparse passes before the output is taken as settled. Tree fixups such as
/// misnested `<a>` or table content can change the markup once more on the
/// way back in.
const MAX_PASSES: usize = 4;

/// Elements whose first newline the parser drops.
const NEWLINE_STRIPPING: &[&str] = &["pre", "textarea", "listing"];

static EVENT_HANDLER_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)^on").unwrap());

static TAG_NAME_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[A-Za-z][A-Za-z0-9-]*$").unwrap());

static ATTR_NAME_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Za-z_:][A-Za-z0-9_.:-]*$").unwrap());

// Browsers strip ASCII whitespace and control characters before reading a scheme.
static SCRIPT_URL_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)^[\x00-\x20]*(j[\t\n\r]*a[\t\n\r]*v[\t\n\r]*a[\t\n\r]*s[\t\n\r]*c[\t\n\r]*r[\t\n\r]*i[\t\n\r]*p[\t\n\r]*t|vbscript|data[\t\n\r]*:[\t\n\r]*text/html)")
        .unwrap()
});

/// Remove executable content from an HTML fragment.
///
/// Never fails: malformed input is sanitized as far as it parses. The
/// result is stable, so sanitizing it again returns it unchanged.
pub fn sanitize(html: &str) -> String {
    let mut out = sanitize_pass(html);
    for pass in 1..MAX_PASSES {
        let next = sanitize_pass(&out);
        if next == out {
            return out;
        }
        debug!("Sanitizer output changed on pass {}", pass + 1);
        out = next;
    }
    out
}

fn sanitize_pass(html: &str) -> String {
    let root = dom::parse_html_fragment(html);
    scrub(&root);
    keep_leading_newlines(&root);
    serialize_children(&root)
}

/// Prune `node`'s subtree in place.
///
/// Blocked elements, comments and processing instructions are dropped with
/// their subtrees. Elements whose name is not a plain tag name are replaced
/// by their children.
pub fn scrub(node: &Handle) {
    let mut queue: VecDeque<Handle> = std::mem::take(&mut *node.children.borrow_mut()).into();
    let mut kept = Vec::with_capacity(queue.len());
    let mut removed = 0;
    while let Some(child) = queue.pop_front() {
        let unwrap = match &child.data {
            NodeData::Element { name, .. } if is_blocked(&name.local) => {
                removed += 1;
                continue;
            }
            NodeData::Element { name, .. } => !TAG_NAME_RE.is_match(&name.local),
            NodeData::Text { .. } => false,
            _ => {
                removed += 1;
                continue;
            }
        };
        if unwrap {
            let inner = std::mem::take(&mut *child.children.borrow_mut());
            for grandchild in inner.into_iter().rev() {
                queue.push_front(grandchild);
            }
            removed += 1;
        } else {
            kept.push(child);
        }
    }
    for child in &kept {
        child.parent.set(Some(Rc::downgrade(node)));
    }
    *node.children.borrow_mut() = kept;
    if removed > 0 {
        debug!("Sanitizer removed {} nodes", removed);
    }

    for child in node.children.borrow().iter() {
        if let NodeData::Element { attrs, .. } = &child.data {
            attrs.borrow_mut().retain(|a| {
                let name = match &a.name.prefix {
                    Some(prefix) => format!("{}:{}", prefix, a.name.local),
                    None => a.name.local.to_string(),
                };
                is_allowed_attribute(&name, &a.value)
            });
        }
        scrub(child);
    }
}

/// The serializer does not write back the newline the parser drops after
/// `<pre>`, `<textarea>` and `<listing>`; add it where the text needs it.
fn keep_leading_newlines(node: &Handle) {
    for child in node.children.borrow().iter() {
        let strips = dom::tag_name(child).is_some_and(|t| NEWLINE_STRIPPING.contains(&t.as_str()));
        if strips {
            if let Some(first) = child.children.borrow().first() {
                if let NodeData::Text { contents } = &first.data {
                    let mut text = contents.borrow_mut();
                    if text.starts_with('\n') {
                        let mut padded = StrTendril::from_slice("\n");
                        padded.push_tendril(&text);
                        *text = padded;
                    }
                }
            }
        }
        keep_leading_newlines(child);
    }
}

fn is_blocked(tag: &str) -> bool {
    BLOCKED_ELEMENTS.iter().any(|b| b.eq_ignore_ascii_case(tag))
}

fn is_allowed_attribute(name: &str, value: &str) -> bool {
    if !ATTR_NAME_RE.is_match(name)
        || EVENT_HANDLER_RE.is_match(name)
        || name.eq_ignore_ascii_case("srcdoc")
    {
        return false;
    }
    let is_url = URL_ATTRIBUTES.iter().any(|u| u.eq_ignore_ascii_case(name));
    !(is_url && SCRIPT_URL_RE.is_match(value))
}

/// Serialize the children of `node` with the html5ever serializer.
pub fn serialize_children(node: &Handle) -> String {
    let mut out = Vec::new();
    let handle: SerializableHandle = node.clone().into();
    let opts = SerializeOpts {
        traversal_scope: TraversalScope::ChildrenOnly(None),
        ..Default::default()
    };
    if let Err(e) = serialize(&mut out, &handle, opts) {
        debug!("Serialization stopped early: {}", e);
    }
    String::from_utf8_lossy(&out).into_owned()
}

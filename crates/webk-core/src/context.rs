//! Page context captured around a user's selection.
//!
//! Every field is bounded when the value is built, whether through
//! [`PageContextBuilder`] or through deserialization, so consumers never
//! have to re-check lengths. Lengths count `char`s.

use serde::{Deserialize, Serialize};

/// Maximum sanitized selection HTML length.
pub const MAX_SELECTION_HTML: usize = 4000;
/// Maximum context block text length.
pub const MAX_BLOCK_TEXT: usize = 6000;
/// Maximum length of the text on either side of the selection.
pub const MAX_SURROUNDING_TEXT: usize = 1500;
pub const MAX_TITLE: usize = 300;
pub const MAX_URL: usize = 2048;
pub const MAX_LANG: usize = 35;
pub const MAX_META_DESCRIPTION: usize = 1000;

/// Keep at most `max` leading characters of `s`.
pub fn truncate_chars(s: &str, max: usize) -> String {
    match s.char_indices().nth(max) {
        Some((idx, _)) => s[..idx].to_string(),
        None => s.to_string(),
    }
}

/// Keep at most `max` trailing characters of `s`.
pub fn tail_chars(s: &str, max: usize) -> String {
    let count = s.chars().count();
    if count <= max {
        return s.to_string();
    }
    s.chars().skip(count - max).collect()
}

/// Bounded page context attached to every chat request.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "RawPageContext")]
#[serde(rename_all = "camelCase")]
pub struct PageContext {
    title: String,
    url: String,
    lang: String,
    meta_description: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    selection_html: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    block_text: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    before_text: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    after_text: Option<String>,
}

impl PageContext {
    pub fn builder() -> PageContextBuilder {
        PageContextBuilder::default()
    }

    pub fn title(&self) -> &str {
        &self.title
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn lang(&self) -> &str {
        &self.lang
    }

    pub fn meta_description(&self) -> &str {
        &self.meta_description
    }

    pub fn selection_html(&self) -> Option<&str> {
        self.selection_html.as_deref()
    }

    pub fn block_text(&self) -> Option<&str> {
        self.block_text.as_deref()
    }

    pub fn before_text(&self) -> Option<&str> {
        self.before_text.as_deref()
    }

    pub fn after_text(&self) -> Option<&str> {
        self.after_text.as_deref()
    }
}

/// Collects page context fields; bounds are applied in [`build`](Self::build).
#[derive(Debug, Clone, Default)]
pub struct PageContextBuilder {
    title: String,
    url: String,
    lang: String,
    meta_description: String,
    selection_html: Option<String>,
    block_text: Option<String>,
    before_text: Option<String>,
    after_text: Option<String>,
}

impl PageContextBuilder {
    pub fn title(mut self, title: impl Into<String>) -> Self {
        self.title = title.into();
        self
    }

    pub fn url(mut self, url: impl Into<String>) -> Self {
        self.url = url.into();
        self
    }

    pub fn lang(mut self, lang: impl Into<String>) -> Self {
        self.lang = lang.into();
        self
    }

    pub fn meta_description(mut self, description: impl Into<String>) -> Self {
        self.meta_description = description.into();
        self
    }

    pub fn selection_html(mut self, html: impl Into<String>) -> Self {
        self.selection_html = Some(html.into());
        self
    }

    pub fn block_text(mut self, text: impl Into<String>) -> Self {
        self.block_text = Some(text.into());
        self
    }

    /// Set the text on both sides of the selection. Either both are present or neither.
    pub fn surrounding(mut self, before: impl Into<String>, after: impl Into<String>) -> Self {
        self.before_text = Some(before.into());
        self.after_text = Some(after.into());
        self
    }

    pub fn build(self) -> PageContext {
        let (before_text, after_text) = match (self.before_text, self.after_text) {
            (Some(before), Some(after)) => (
                Some(tail_chars(&before, MAX_SURROUNDING_TEXT)),
                Some(truncate_chars(&after, MAX_SURROUNDING_TEXT)),
            ),
            _ => (None, None),
        };

        PageContext {
            title: truncate_chars(&self.title, MAX_TITLE),
            url: truncate_chars(&self.url, MAX_URL),
            lang: truncate_chars(&self.lang, MAX_LANG),
            meta_description: truncate_chars(&self.meta_description, MAX_META_DESCRIPTION),
            selection_html: self
                .selection_html
                .map(|h| truncate_chars(&h, MAX_SELECTION_HTML)),
            block_text: self.block_text.map(|t| truncate_chars(&t, MAX_BLOCK_TEXT)),
            before_text,
            after_text,
        }
    }
}

/// Unchecked wire shape; converted through the builder so bounds always hold.
#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawPageContext {
    #[serde(default)]
    title: Option<String>,
    #[serde(default)]
    url: Option<String>,
    #[serde(default)]
    lang: Option<String>,
    #[serde(default)]
    meta_description: Option<String>,
    #[serde(default)]
    selection_html: Option<String>,
    #[serde(default)]
    block_text: Option<String>,
    #[serde(default)]
    before_text: Option<String>,
    #[serde(default)]
    after_text: Option<String>,
}

impl From<RawPageContext> for PageContext {
    fn from(raw: RawPageContext) -> Self {
        let mut builder = PageContext::builder()
            .title(raw.title.unwrap_or_default())
            .url(raw.url.unwrap_or_default())
            .lang(raw.lang.unwrap_or_default())
            .meta_description(raw.meta_description.unwrap_or_default());
        if let Some(html) = raw.selection_html {
            builder = builder.selection_html(html);
        }
        if let Some(text) = raw.block_text {
            builder = builder.block_text(text);
        }
        if let (Some(before), Some(after)) = (raw.before_text, raw.after_text) {
            builder = builder.surrounding(before, after);
        }
        builder.build()
    }
}

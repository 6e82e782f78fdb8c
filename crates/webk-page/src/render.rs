//! Chat panel rendering.
//!
//! The panel is rebuilt from session state after every change. Rendering
//! produces a detached tree; the host swaps it in with
//! [`IsolationHost::mount`](crate::host::IsolationHost::mount).

use markup5ever_rcdom::Handle;
use pulldown_cmark::{html, Options, Parser};
use url::Url;
use webk_chat::{ChatStatus, Role, UiMessage};
use webk_core::{Error, Result};

use crate::dom::{self, escape_attr, escape_text};
use crate::sanitize::sanitize;
use crate::session::ModalSession;

pub const PRODUCT_NAME: &str = "Web-K";
const DRAFT_PLACEHOLDER: &str = "Ask about the selection…";

/// Host name of `page_url` without a leading `www.`.
pub fn display_domain(page_url: &str) -> Option<String> {
    let url = Url::parse(page_url).ok()?;
    let host = url.host_str()?;
    Some(host.strip_prefix("www.").unwrap_or(host).to_string())
}

/// Markdown to sanitized HTML.
pub fn render_markdown(markdown: &str) -> String {
    let mut options = Options::empty();
    options.insert(Options::ENABLE_STRIKETHROUGH);
    options.insert(Options::ENABLE_TABLES);
    let parser = Parser::new_ext(markdown, options);
    let mut out = String::new();
    html::push_html(&mut out, parser);
    sanitize(&out)
}

/// Renders a [`ModalSession`] into panel markup.
pub struct ChatView<'a> {
    session: &'a ModalSession,
}

impl<'a> ChatView<'a> {
    pub fn new(session: &'a ModalSession) -> Self {
        Self { session }
    }

    /// Build the panel as a detached tree ready to mount.
    pub fn render(&self) -> Result<Handle> {
        let root = dom::parse_html_fragment(&self.to_html());
        if dom::first_element_child(&root).is_none() {
            return Err(Error::Render("panel markup produced no elements".into()));
        }
        Ok(root)
    }

    pub fn to_html(&self) -> String {
        let s = self.session;
        let mut out = format!(
            r#"<div class="wk-panel" role="dialog" aria-label="{}" data-theme="{}" data-session="{}">"#,
            PRODUCT_NAME,
            s.theme.label().to_ascii_lowercase(),
            s.id()
        );
        out.push_str(&self.header());
        out.push_str(&self.selection());

        let status = s.conversation().status();
        if status.is_busy() {
            out.push_str(r#"<div class="wk-streaming" aria-live="polite">Streaming…</div>"#);
        }
        if let Some(error) = s.conversation().error() {
            out.push_str(&format!(
                r#"<div class="wk-error" role="alert">{}</div>"#,
                escape_text(error)
            ));
        }

        let messages = s.conversation().messages();
        if !messages.is_empty() {
            out.push_str(r#"<div class="wk-messages">"#);
            for message in messages {
                out.push_str(&message_html(message));
            }
            out.push_str("</div>");
        }

        out.push_str(&self.form(status));
        out.push_str("</div>");
        out
    }

    fn header(&self) -> String {
        let s = self.session;
        let mut out = format!(
            r#"<div class="wk-header"><strong>{}</strong><span class="wk-beta">Beta</span>"#,
            PRODUCT_NAME
        );
        if let Some(domain) = display_domain(s.context().url()) {
            out.push_str(&format!(r#"<span class="wk-domain">{}</span>"#, escape_text(&domain)));
        }
        out.push_str(&format!(
            r#"<button class="wk-theme" aria-label="Toggle theme" title="Theme: {}">{}</button>"#,
            s.theme.label().to_ascii_lowercase(),
            s.theme.label()
        ));
        if !s.conversation().assistant_text().is_empty() {
            out.push_str(r#"<button class="wk-copy" aria-live="polite">Copy</button>"#);
        }
        out.push_str(r#"<button class="wk-close" aria-label="Close">×</button></div>"#);
        out
    }

    fn selection(&self) -> String {
        let text = self.session.selected_text();
        format!(
            r#"<div class="wk-selection"><div class="wk-selection-meta"><span>Selection</span><span>{} chars</span></div><p>{}</p></div>"#,
            text.chars().count(),
            escape_text(text)
        )
    }

    fn form(&self, status: ChatStatus) -> String {
        let button = if status.is_busy() {
            r#"<button class="wk-stop" aria-label="Stop generating">Stop</button>"#
        } else {
            r#"<button class="wk-ask" aria-label="Send message">Ask</button>"#
        };
        format!(
            r#"<div class="wk-form"><textarea rows="2" placeholder="{}">{}</textarea>{}</div>"#,
            escape_attr(DRAFT_PLACEHOLDER),
            escape_text(&self.session.draft),
            button
        )
    }
}

fn message_html(message: &UiMessage) -> String {
    let (role, body) = match message.role {
        Role::Assistant => ("assistant", render_markdown(&message.plain_text())),
        Role::User => ("user", escape_text(&message.plain_text())),
        Role::System => return String::new(),
    };
    format!(
        r#"<div class="wk-message" data-role="{}" data-id="{}">{}</div>"#,
        role,
        escape_attr(&message.id),
        body
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::Theme;
    use webk_chat::{ChatRelay, StreamChunk};
    use webk_core::PageContext;

    fn session(url: &str) -> ModalSession {
        let ctx = PageContext::builder().url(url).build();
        ModalSession::new("a <b>fox</b>", ctx, &ChatRelay::new("http://127.0.0.1:9/api/ask"))
    }

    #[test]
    fn test_domain_strips_www() {
        assert_eq!(display_domain("https://www.example.com/a").as_deref(), Some("example.com"));
        assert_eq!(display_domain("https://docs.rs/x").as_deref(), Some("docs.rs"));
        assert_eq!(display_domain("not a url"), None);
    }

    #[test]
    fn test_markdown_is_sanitized() {
        let html = render_markdown("**bold** <img src=x onerror=alert(1)>\n\n<script>bad()</script>");
        assert!(html.contains("<strong>bold</strong>"));
        assert!(!html.contains("onerror"));
        assert!(!html.contains("<script"));
    }

    #[test]
    fn test_initial_panel() {
        let s = session("https://www.example.com/foxes");
        let html = ChatView::new(&s).to_html();
        assert!(html.contains("Web-K"));
        assert!(html.contains("Beta"));
        assert!(html.contains(r#"<span class="wk-domain">example.com</span>"#));
        assert!(html.contains("12 chars"));
        assert!(html.contains("a &lt;b&gt;fox&lt;/b&gt;"));
        assert!(html.contains(">Ask</button>"));
        assert!(!html.contains("wk-copy"));
        assert!(!html.contains("Streaming"));
    }

    #[tokio::test]
    async fn test_streaming_panel_and_answer() {
        let mut s = session("");
        s.theme = Theme::Dark;
        let stream = s.submit(Some("What *is* it?")).unwrap();
        s.apply_chunk(stream.id(), StreamChunk::Token("A **fox**.".into()));

        let html = ChatView::new(&s).to_html();
        assert!(html.contains("Streaming…"));
        assert!(html.contains(">Stop</button>"));
        assert!(html.contains(r#"data-theme="dark""#));
        assert!(html.contains("What *is* it?"));
        assert!(html.contains("<strong>fox</strong>"));
        assert!(html.contains("wk-copy"));
        assert!(!html.contains("wk-domain"));
    }

    #[tokio::test]
    async fn test_error_box() {
        let mut s = session("");
        let stream = s.submit(Some("q")).unwrap();
        s.apply_chunk(stream.id(), StreamChunk::Error("HTTP error! status: 500".into()));
        let root = ChatView::new(&s).render().unwrap();
        let error = dom::find_element(&root, &|n| dom::attr(n, "class").as_deref() == Some("wk-error")).unwrap();
        assert_eq!(dom::text_content(&error), "HTTP error! status: 500");
    }
}

//! Prompt construction for `POST /api/ask`.

use webk_core::PageContext;

use crate::types::{AskRequest, ChatMessage, Role};

const SYSTEM_PREAMBLE: &str = "You are Web-K, an assistant embedded in a web page. \
The user highlighted a passage and is asking about it. Answer using the selection and the \
surrounding page context below; say so when the context is not enough. Be concise and use \
Markdown for structure.";

/// System prompt describing the selection and its page context.
pub fn system_prompt(selected_text: &str, context: Option<&PageContext>) -> String {
    let mut prompt = String::from(SYSTEM_PREAMBLE);

    if let Some(ctx) = context {
        let mut page = Vec::new();
        for (label, value) in [
            ("Title", ctx.title()),
            ("URL", ctx.url()),
            ("Language", ctx.lang()),
            ("Description", ctx.meta_description()),
        ] {
            if !value.is_empty() {
                page.push(format!("{}: {}", label, value));
            }
        }
        if !page.is_empty() {
            prompt.push_str("\n\n## Page\n");
            prompt.push_str(&page.join("\n"));
        }
    }

    prompt.push_str("\n\n## Selection\n");
    prompt.push_str(selected_text);

    if let Some(ctx) = context {
        if let (Some(before), Some(after)) = (ctx.before_text(), ctx.after_text()) {
            prompt.push_str("\n\n## Surrounding text\n");
            prompt.push_str(&format!("…{}[SELECTION]{}…", before, after));
        } else if let Some(block) = ctx.block_text() {
            prompt.push_str("\n\n## Enclosing block\n");
            prompt.push_str(block);
        }
        if let Some(html) = ctx.selection_html() {
            prompt.push_str("\n\n## Selection HTML\n");
            prompt.push_str(html);
        }
    }

    prompt
}

/// Convert the request's UI messages to provider messages.
///
/// Legacy single-question requests become a one-message conversation.
pub fn build_messages(req: &AskRequest) -> Vec<ChatMessage> {
    let mut messages: Vec<ChatMessage> = req
        .messages
        .iter()
        .filter(|m| m.role != Role::System)
        .map(|m| ChatMessage {
            role: match m.role {
                Role::Assistant => "assistant".into(),
                _ => "user".into(),
            },
            content: m.plain_text(),
        })
        .filter(|m| !m.content.trim().is_empty())
        .collect();

    if messages.is_empty() {
        if let Some(q) = req.latest_question() {
            messages.push(ChatMessage {
                role: "user".into(),
                content: q,
            });
        }
    }

    messages
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::UiMessage;

    #[test]
    fn test_system_prompt_includes_context() {
        let ctx = PageContext::builder()
            .title("Foxes")
            .url("https://example.com/foxes")
            .block_text("The quick brown fox jumps")
            .surrounding("The quick brown ", " jumps")
            .build();
        let prompt = system_prompt("fox", Some(&ctx));
        assert!(prompt.contains("Title: Foxes"));
        assert!(prompt.contains("## Selection\nfox"));
        assert!(prompt.contains("The quick brown [SELECTION] jumps"));
        assert!(!prompt.contains("Language:"));
    }

    #[test]
    fn test_block_used_without_surrounding() {
        let ctx = PageContext::builder().block_text("Whole paragraph").build();
        let prompt = system_prompt("missing", Some(&ctx));
        assert!(prompt.contains("## Enclosing block\nWhole paragraph"));
    }

    #[test]
    fn test_build_messages() {
        let req = AskRequest {
            selected_text: "fox".into(),
            messages: vec![
                UiMessage::text(Role::System, "ignored"),
                UiMessage::text(Role::User, "q"),
                UiMessage::text(Role::Assistant, "a"),
                UiMessage::text(Role::User, "   "),
            ],
            ..Default::default()
        };
        let msgs = build_messages(&req);
        assert_eq!(msgs.len(), 2);
        assert_eq!(msgs[1].role, "assistant");
    }

    #[test]
    fn test_build_messages_legacy_question() {
        let req = AskRequest {
            selected_text: "fox".into(),
            question: Some("What?".into()),
            ..Default::default()
        };
        let msgs = build_messages(&req);
        assert_eq!(msgs.len(), 1);
        assert_eq!(msgs[0].content, "What?");
    }
}

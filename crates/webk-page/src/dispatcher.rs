//! The content script: reacts to the activation hotkey and to OPEN requests
//! from nested frames, and owns the one chat session a document may show.

use std::cell::RefCell;
use std::rc::Rc;

use futures::StreamExt;
use serde_json::Value;
use tokio::sync::mpsc::UnboundedReceiver;
use tracing::{debug, info, warn};
use uuid::Uuid;
use webk_chat::{ActiveStream, ChatRelay, StreamChunk};
use webk_core::{PageContext, Result};

use crate::dom::Page;
use crate::extract::build_context;
use crate::frame::{self, FrameMessage, FramePort};
use crate::host::IsolationHost;
use crate::hotkey::{Combo, KeyEvent, KeyEventTarget, Phase, Platform};
use crate::render::ChatView;
use crate::scope::{DocumentScope, SetupStep};
use crate::selection::Selection;
use crate::session::ModalSession;

/// Where this script runs.
enum FrameRole {
    /// The top-level document; may receive OPEN requests.
    Top {
        inbox: Option<UnboundedReceiver<Value>>,
    },
    /// A nested frame; forwards OPEN requests to the top frame.
    Nested { top: FramePort },
}

/// Outcome of a key-down event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dispatch {
    Ignored,
    /// Hotkey pressed with nothing selected.
    EmptySelection,
    /// Hotkey in a nested frame; the top frame was asked to open.
    Relayed,
    Opened(Uuid),
    Closed,
    /// Keystroke routed into the open session's draft.
    Typed,
}

pub struct ContentScript {
    page: Page,
    selection: Selection,
    platform: Platform,
    scope: Rc<RefCell<DocumentScope>>,
    role: FrameRole,
    relay: ChatRelay,
    host: IsolationHost,
    session: Option<ModalSession>,
}

impl ContentScript {
    /// Script for the top-level document, plus the port nested frames post to.
    pub fn top_frame(
        page: Page,
        platform: Platform,
        relay: ChatRelay,
        scope: Rc<RefCell<DocumentScope>>,
    ) -> (Self, FramePort) {
        let (port, inbox) = frame::channel();
        let script = Self::new(page, platform, relay, scope, FrameRole::Top { inbox: Some(inbox) });
        (script, port)
    }

    pub fn nested_frame(
        page: Page,
        platform: Platform,
        relay: ChatRelay,
        scope: Rc<RefCell<DocumentScope>>,
        top: FramePort,
    ) -> Self {
        Self::new(page, platform, relay, scope, FrameRole::Nested { top })
    }

    fn new(
        page: Page,
        platform: Platform,
        relay: ChatRelay,
        scope: Rc<RefCell<DocumentScope>>,
        role: FrameRole,
    ) -> Self {
        Self {
            page,
            selection: Selection::empty(),
            platform,
            scope,
            role,
            relay,
            host: IsolationHost::new(),
            session: None,
        }
    }

    /// Register the capture-phase key listener once per document.
    /// Returns whether a listener was added.
    pub fn install(this: &Rc<RefCell<Self>>, target: &mut KeyEventTarget) -> bool {
        let scope = Rc::clone(&this.borrow().scope);
        let installed = scope.borrow_mut().run_once(SetupStep::KeyListener, || {
            let script = Rc::clone(this);
            target.add_listener(
                Phase::Capture,
                Box::new(move |event: &mut KeyEvent| {
                    script.borrow_mut().handle_key_down(event);
                }),
            );
        });
        if installed {
            debug!("Key listener installed");
        }
        installed
    }

    pub fn page(&self) -> &Page {
        &self.page
    }

    pub fn host(&self) -> &IsolationHost {
        &self.host
    }

    pub fn session(&self) -> Option<&ModalSession> {
        self.session.as_ref()
    }

    pub fn session_mut(&mut self) -> Option<&mut ModalSession> {
        self.session.as_mut()
    }

    pub fn is_top_frame(&self) -> bool {
        matches!(self.role, FrameRole::Top { .. })
    }

    /// Replace the user's current selection.
    pub fn select(&mut self, selection: Selection) {
        self.selection = selection;
    }

    pub fn handle_key_down(&mut self, event: &mut KeyEvent) -> Dispatch {
        if Combo::matching(event, self.platform).is_some() {
            return self.activate(event);
        }
        if self.session.is_none() {
            return Dispatch::Ignored;
        }

        if event.key == "Escape" {
            self.close();
            return Dispatch::Closed;
        }
        if event.target_editable {
            return Dispatch::Ignored;
        }
        let Some(c) = event.printable_char() else {
            return Dispatch::Ignored;
        };
        // The page's own listeners still see the key.
        event.prevent_default();
        if let Some(session) = self.session.as_mut() {
            session.draft.push(c);
        }
        self.rerender();
        Dispatch::Typed
    }

    fn activate(&mut self, event: &mut KeyEvent) -> Dispatch {
        let text = self.selection.text();
        let selected = text.trim();
        if selected.is_empty() {
            debug!("Hotkey pressed with no text selected");
            return Dispatch::EmptySelection;
        }

        event.prevent_default();
        event.stop_propagation();

        if let FrameRole::Nested { top } = &self.role {
            top.post(&FrameMessage::open(selected));
            debug!("Asked top frame to open");
            return Dispatch::Relayed;
        }

        let context = build_context(&self.page, &self.selection);
        match self.open(selected.to_string(), context) {
            Ok(id) => Dispatch::Opened(id),
            Err(e) => {
                warn!("Failed to open chat panel: {}", e);
                Dispatch::Ignored
            }
        }
    }

    /// Handle one message from the cross-frame channel.
    pub fn handle_message(&mut self, value: &Value) -> Option<Uuid> {
        if !self.is_top_frame() {
            return None;
        }
        let Some(FrameMessage::Open { selected_text }) = FrameMessage::from_value(value) else {
            return None;
        };
        if selected_text.trim().is_empty() {
            return None;
        }
        // The selection lives in the other frame; only page metadata is ours.
        let context = build_context(&self.page, &Selection::empty());
        match self.open(selected_text.trim().to_string(), context) {
            Ok(id) => Some(id),
            Err(e) => {
                warn!("Failed to open chat panel for relayed request: {}", e);
                None
            }
        }
    }

    /// Process every message already queued for this frame.
    pub fn drain_messages(&mut self) -> usize {
        let mut values = Vec::new();
        if let FrameRole::Top { inbox: Some(inbox) } = &mut self.role {
            while let Ok(value) = inbox.try_recv() {
                values.push(value);
            }
        }
        values.iter().filter(|v| self.handle_message(v).is_some()).count()
    }

    /// Serve cross-frame messages until every sender is gone. Installed once
    /// per document; later calls return immediately.
    pub async fn listen(this: Rc<RefCell<Self>>) {
        let inbox = {
            let mut script = this.borrow_mut();
            let scope = Rc::clone(&script.scope);
            let mut taken = None;
            scope.borrow_mut().run_once(SetupStep::MessageListener, || {
                if let FrameRole::Top { inbox } = &mut script.role {
                    taken = inbox.take();
                }
            });
            taken
        };
        let Some(mut inbox) = inbox else {
            return;
        };
        while let Some(value) = inbox.recv().await {
            this.borrow_mut().handle_message(&value);
        }
    }

    /// Open a session for `selected_text`, replacing any current one.
    pub fn open(&mut self, selected_text: String, context: PageContext) -> Result<Uuid> {
        {
            let mut scope = self.scope.borrow_mut();
            self.host.ensure_host(&self.page, &mut scope)?;
        }
        let session = ModalSession::new(selected_text, context, &self.relay);
        let view = ChatView::new(&session).render()?;
        self.host.mount(&view)?;

        let id = session.id();
        if let Some(mut previous) = self.session.replace(session) {
            previous.stop();
            debug!("Replaced session {}", previous.id());
        }
        info!("Opened chat session {}", id);
        Ok(id)
    }

    /// Close the current session and unmount its panel.
    pub fn close(&mut self) {
        if let Some(mut session) = self.session.take() {
            session.stop();
            info!("Closed chat session {}", session.id());
        }
        self.host.teardown();
    }

    /// The page is navigating away: close and remove the host element.
    pub fn navigate(&mut self) {
        self.close();
        self.host.remove_from_document();
    }

    pub fn toggle_theme(&mut self) {
        if let Some(session) = self.session.as_mut() {
            session.theme = session.theme.next();
        }
        self.rerender();
    }

    pub fn set_draft(&mut self, draft: impl Into<String>) {
        if let Some(session) = self.session.as_mut() {
            session.draft = draft.into();
        }
        self.rerender();
    }

    /// Latest answer text for the Copy control.
    pub fn copy_answer(&self) -> Option<String> {
        let text = self.session.as_ref()?.conversation().assistant_text();
        (!text.is_empty()).then_some(text)
    }

    /// Send the draft question.
    pub fn submit(&mut self, question: Option<&str>) -> Option<ActiveStream> {
        let stream = self.session.as_mut()?.submit(question)?;
        self.rerender();
        Some(stream)
    }

    pub fn apply_chunk(&mut self, stream_id: Uuid, chunk: StreamChunk) {
        let applied = self
            .session
            .as_mut()
            .is_some_and(|s| s.apply_chunk(stream_id, chunk));
        if applied {
            self.rerender();
        }
    }

    pub fn finish_stream(&mut self, stream_id: Uuid) {
        if let Some(session) = self.session.as_mut() {
            session.finish_stream(stream_id);
        }
        self.rerender();
    }

    pub fn stop(&mut self) {
        if let Some(session) = self.session.as_mut() {
            session.stop();
        }
        self.rerender();
    }

    /// Submit and drive the answer stream to completion.
    pub async fn ask(this: &Rc<RefCell<Self>>, question: Option<String>) -> Option<Uuid> {
        let mut stream = this.borrow_mut().submit(question.as_deref())?;
        let id = stream.id();
        while let Some(chunk) = stream.next().await {
            this.borrow_mut().apply_chunk(id, chunk);
        }
        this.borrow_mut().finish_stream(id);
        Some(id)
    }

    fn rerender(&mut self) {
        let Some(session) = self.session.as_ref() else {
            return;
        };
        match ChatView::new(session).render() {
            Ok(view) => {
                if let Err(e) = self.host.mount(&view) {
                    warn!("Failed to mount chat panel: {}", e);
                }
            }
            Err(e) => warn!("Failed to render chat panel: {}", e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dom;
    use crate::host::host_count;
    use std::cell::Cell;
    use webk_chat::ChatStatus;

    const PAGE: &str = r#"<!doctype html><html lang="en"><head><title>Foxes</title></head>
        <body><p>The quick brown fox jumps over the lazy dog</p></body></html>"#;

    fn relay() -> ChatRelay {
        ChatRelay::new("http://127.0.0.1:9/api/ask")
    }

    fn top() -> (Rc<RefCell<ContentScript>>, FramePort) {
        let page = Page::parse(PAGE, "https://www.example.com/foxes");
        let scope = Rc::new(RefCell::new(DocumentScope::new()));
        let (script, port) = ContentScript::top_frame(page, Platform::Other, relay(), scope);
        (Rc::new(RefCell::new(script)), port)
    }

    fn select(script: &Rc<RefCell<ContentScript>>, needle: &str) {
        let mut s = script.borrow_mut();
        let selection = Selection::find_text(s.page().document(), needle).unwrap();
        s.select(selection);
    }

    fn hotkey() -> KeyEvent {
        KeyEvent::key("K").with_ctrl().with_shift()
    }

    fn mounted_text(script: &ContentScript) -> String {
        script
            .host()
            .mount_point()
            .map(|m| dom::text_content(&m.container))
            .unwrap_or_default()
    }

    #[test]
    fn test_top_frame_hotkey_opens_one_panel() {
        let (script, _port) = top();
        let mut target = KeyEventTarget::new();
        assert!(ContentScript::install(&script, &mut target));
        select(&script, "fox");

        let event = target.dispatch(hotkey());
        assert!(event.default_prevented());
        assert!(event.propagation_stopped());

        let s = script.borrow();
        let session = s.session().unwrap();
        assert_eq!(session.selected_text(), "fox");
        assert_eq!(session.context().before_text(), Some("The quick brown "));
        assert_eq!(s.host().live_trees(), 1);
        assert_eq!(host_count(s.page()), 1);
        assert!(mounted_text(&s).contains("3 chars"));
    }

    #[test]
    fn test_nested_frame_posts_open_and_mounts_nothing() {
        let (top_script, port) = top();
        let page = Page::parse("<body><p>inner frame text</p></body>", "https://cdn.example.com/embed");
        let scope = Rc::new(RefCell::new(DocumentScope::new()));
        let nested = Rc::new(RefCell::new(ContentScript::nested_frame(
            page,
            Platform::Other,
            relay(),
            scope,
            port,
        )));
        let mut target = KeyEventTarget::new();
        ContentScript::install(&nested, &mut target);
        select(&nested, "inner frame");

        let event = target.dispatch(hotkey());
        assert!(event.default_prevented());
        assert!(nested.borrow().session().is_none());
        assert_eq!(host_count(nested.borrow().page()), 0);

        assert_eq!(top_script.borrow_mut().drain_messages(), 1);
        let s = top_script.borrow();
        assert_eq!(s.session().unwrap().selected_text(), "inner frame");
        // Only page metadata travels with a relayed open.
        assert_eq!(s.session().unwrap().context().title(), "Foxes");
        assert!(s.session().unwrap().context().block_text().is_none());
        assert_eq!(s.host().live_trees(), 1);
    }

    #[test]
    fn test_top_frame_sends_no_messages() {
        let (script, port) = top();
        select(&script, "fox");
        script.borrow_mut().handle_key_down(&mut hotkey());
        drop(port);
        assert_eq!(script.borrow_mut().drain_messages(), 0);
        assert!(script.borrow().session().is_some());
    }

    #[test]
    fn test_empty_selection_has_no_side_effects() {
        let (script, _port) = top();
        let mut target = KeyEventTarget::new();
        ContentScript::install(&script, &mut target);

        let event = target.dispatch(hotkey());
        assert!(!event.default_prevented());
        assert!(!event.propagation_stopped());
        let s = script.borrow();
        assert!(s.session().is_none());
        assert!(s.host().mount_point().is_none());
        assert_eq!(host_count(s.page()), 0);
        assert!(s.page().element_by_id(crate::host::GLOBAL_STYLE_ID).is_none());
    }

    #[test]
    fn test_reopen_replaces_session() {
        let (script, _port) = top();
        select(&script, "fox");
        let first = script.borrow_mut().handle_key_down(&mut hotkey());
        select(&script, "lazy dog");
        let second = script.borrow_mut().handle_key_down(&mut hotkey());
        assert_ne!(first, second);

        let s = script.borrow();
        assert_eq!(s.session().unwrap().selected_text(), "lazy dog");
        assert_eq!(s.host().live_trees(), 1);
        assert_eq!(host_count(s.page()), 1);
        assert!(mounted_text(&s).contains("lazy dog"));
    }

    #[test]
    fn test_each_combo_dispatches_once() {
        let (script, _port) = top();
        let mut target = KeyEventTarget::new();
        ContentScript::install(&script, &mut target);
        // A second injection into the same document adds no listener.
        let scope = Rc::clone(&script.borrow().scope);
        let page = script.borrow().page().clone();
        let (again, _) = ContentScript::top_frame(page, Platform::Other, relay(), scope);
        assert!(!ContentScript::install(&Rc::new(RefCell::new(again)), &mut target));
        assert_eq!(target.listener_count(Phase::Capture), 1);

        let page_saw = Rc::new(Cell::new(0));
        let seen = Rc::clone(&page_saw);
        target.add_listener(Phase::Bubble, Box::new(move |_: &mut KeyEvent| seen.set(seen.get() + 1)));

        select(&script, "fox");
        target.dispatch(hotkey());
        let first = script.borrow().session().unwrap().id();
        target.dispatch(KeyEvent::key("k").with_alt());
        let second = script.borrow().session().unwrap().id();
        assert_ne!(first, second);
        assert_eq!(page_saw.get(), 0);

        for event in [
            KeyEvent::key("K").with_shift(),
            KeyEvent::key("K").with_ctrl().with_alt().with_shift(),
            KeyEvent::key("k").with_alt().with_shift(),
            KeyEvent::key("L").with_ctrl().with_shift(),
        ] {
            script.borrow_mut().close();
            target.dispatch(event);
            assert!(script.borrow().session().is_none());
        }
        assert_eq!(page_saw.get(), 4);
    }

    #[test]
    fn test_escape_closes_and_typing_fills_draft() {
        let (script, _port) = top();
        let mut target = KeyEventTarget::new();
        ContentScript::install(&script, &mut target);
        let page_saw = Rc::new(Cell::new(0));
        let seen = Rc::clone(&page_saw);
        target.add_listener(Phase::Bubble, Box::new(move |_: &mut KeyEvent| seen.set(seen.get() + 1)));
        select(&script, "fox");
        target.dispatch(hotkey());

        for key in ["W", "h", "y", "?"] {
            let event = target.dispatch(KeyEvent::key(key));
            assert!(event.default_prevented());
            assert!(!event.propagation_stopped());
        }
        assert_eq!(page_saw.get(), 4);
        let mut editable = KeyEvent::key("x");
        editable.target_editable = true;
        assert!(!target.dispatch(editable).default_prevented());
        assert_eq!(script.borrow().session().unwrap().draft, "Why?");
        assert!(mounted_text(&script.borrow()).contains("Why?"));

        let event = target.dispatch(KeyEvent::key("Escape"));
        assert!(!event.default_prevented());
        assert!(!event.propagation_stopped());
        let s = script.borrow();
        assert!(s.session().is_none());
        assert_eq!(s.host().live_trees(), 0);
        assert_eq!(host_count(s.page()), 1);
    }

    #[test]
    fn test_failed_open_keeps_current_session() {
        let (script, _port) = top();
        select(&script, "fox");
        let first = script.borrow_mut().handle_key_down(&mut hotkey());

        // Without a <body> no host element can be created.
        let body = script.borrow().page().body().unwrap();
        dom::detach(&body);
        let context = PageContext::builder().build();
        assert!(script.borrow_mut().open("lazy dog".into(), context).is_err());

        let s = script.borrow();
        assert_eq!(Dispatch::Opened(s.session().unwrap().id()), first);
        assert_eq!(s.session().unwrap().selected_text(), "fox");
        assert_eq!(s.host().live_trees(), 1);
        assert!(mounted_text(&s).contains("3 chars"));
    }

    #[test]
    fn test_invalid_messages_are_ignored() {
        let (script, port) = top();
        port.post_raw(serde_json::json!({"type": "OPEN", "selectedText": "x"}));
        port.post_raw(serde_json::json!({"__webK": true, "type": "OPEN", "selectedText": "  "}));
        port.post_raw(serde_json::json!("hello"));
        assert_eq!(script.borrow_mut().drain_messages(), 0);
        assert!(script.borrow().session().is_none());
    }

    #[test]
    fn test_navigate_removes_host() {
        let (script, _port) = top();
        select(&script, "fox");
        script.borrow_mut().handle_key_down(&mut hotkey());
        script.borrow_mut().navigate();
        let s = script.borrow();
        assert!(s.session().is_none());
        assert_eq!(host_count(s.page()), 0);
    }

    #[tokio::test]
    async fn test_stream_chunks_update_panel() {
        let (script, _port) = top();
        select(&script, "fox");
        script.borrow_mut().handle_key_down(&mut hotkey());

        let stream = script.borrow_mut().submit(Some("What is it?")).unwrap();
        assert!(mounted_text(&script.borrow()).contains("Stop"));

        script
            .borrow_mut()
            .apply_chunk(stream.id(), StreamChunk::Token("A small canid.".into()));
        script.borrow_mut().apply_chunk(Uuid::new_v4(), StreamChunk::Token("stale".into()));
        script.borrow_mut().finish_stream(stream.id());

        let s = script.borrow();
        assert_eq!(s.copy_answer().as_deref(), Some("A small canid."));
        assert_eq!(s.session().unwrap().conversation().status(), ChatStatus::Ready);
        let text = mounted_text(&s);
        assert!(text.contains("A small canid."));
        assert!(!text.contains("stale"));
        assert!(text.contains("Ask"));
    }

    #[tokio::test]
    async fn test_ask_reports_unreachable_relay() {
        let (script, _port) = top();
        select(&script, "fox");
        script.borrow_mut().handle_key_down(&mut hotkey());

        assert!(ContentScript::ask(&script, Some("Hello?".into())).await.is_some());
        let s = script.borrow();
        let conversation = s.session().unwrap().conversation();
        assert_eq!(conversation.status(), ChatStatus::Error);
        assert!(conversation.error().unwrap().starts_with("Request failed"));
        assert!(mounted_text(&s).contains("Request failed"));
    }

    #[tokio::test]
    async fn test_listen_serves_relayed_opens() {
        let (script, port) = top();
        port.post(&FrameMessage::open("fox"));
        drop(port);
        ContentScript::listen(Rc::clone(&script)).await;
        assert!(script.borrow().session().is_some());
        // The listener is installed only once per document.
        ContentScript::listen(Rc::clone(&script)).await;
    }
}

//! Isolated mount point for the chat panel.
//!
//! The host element lives in the page's `<body>`, but the panel itself sits
//! under a separate root that is not a child of the host, so nothing that
//! walks the page tree reaches the panel and the panel's styles never leak
//! into the page.

use markup5ever_rcdom::Handle;
use tracing::{debug, info};
use webk_core::{Error, Result};

use crate::dom::{self, Page};
use crate::scope::{DocumentScope, SetupStep};

pub const HOST_ELEMENT_ID: &str = "web-k-modal-root";
pub const GLOBAL_STYLE_ID: &str = "web-k-global-styles";
pub const CONTAINER_CLASS: &str = "web-k-container";

/// Custom property registrations. `@property` is ignored inside shadow
/// roots, so these go into the document head.
pub const GLOBAL_PROPERTIES_CSS: &str = "\
@property --wk-ring-offset-width{syntax:\"<length>\";inherits:true;initial-value:0px}\
@property --wk-shadow{syntax:\"*\";inherits:true;initial-value:0 0 #0000}\
@property --wk-translate-y{syntax:\"*\";inherits:true;initial-value:0}\
@property --wk-opacity{syntax:\"<number>\";inherits:true;initial-value:1}";

/// Panel stylesheet, scoped to the isolated root.
pub const PANEL_CSS: &str = "\
:host{all:initial}\
.web-k-container{position:fixed;inset:0;z-index:2147483647;pointer-events:none;font-family:system-ui,sans-serif}\
.wk-panel{pointer-events:auto;position:absolute;right:24px;bottom:24px;width:420px;max-height:70vh;display:flex;flex-direction:column;border-radius:12px;box-shadow:var(--wk-shadow);background:#fff;color:#111;opacity:var(--wk-opacity)}\
.wk-panel[data-theme=dark]{background:#18181b;color:#f4f4f5}\
.wk-header{display:flex;align-items:center;gap:8px;padding:10px 14px;border-bottom:1px solid #e4e4e7}\
.wk-beta{font-size:10px;padding:1px 6px;border-radius:999px;background:#ede9fe;color:#6d28d9}\
.wk-domain{margin-left:auto;font-size:12px;opacity:.7}\
.wk-selection{margin:10px 14px;padding:8px;border-left:3px solid #8b5cf6;font-size:13px;max-height:96px;overflow:auto}\
.wk-messages{flex:1;overflow:auto;padding:0 14px}\
.wk-message[data-role=user]{font-weight:600}\
.wk-error{margin:8px 14px;padding:8px;border-radius:8px;background:#fef2f2;color:#b91c1c}\
.wk-streaming{font-size:12px;opacity:.7;padding:0 14px}\
.wk-form{display:flex;gap:8px;padding:10px 14px;border-top:1px solid #e4e4e7}\
.wk-form textarea{flex:1;resize:none;min-height:40px}";

/// Lifecycle of the mount point.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HostState {
    Absent,
    Empty,
    Populated,
}

/// The host element, its isolated root, and the container the panel renders into.
#[derive(Clone)]
pub struct MountPoint {
    pub host: Handle,
    pub shadow_root: Handle,
    pub container: Handle,
}

#[derive(Default)]
pub struct IsolationHost {
    mount: Option<MountPoint>,
}

impl IsolationHost {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> HostState {
        match &self.mount {
            None => HostState::Absent,
            Some(m) if m.container.children.borrow().is_empty() => HostState::Empty,
            Some(_) => HostState::Populated,
        }
    }

    pub fn mount_point(&self) -> Option<&MountPoint> {
        self.mount.as_ref()
    }

    /// Return the mount point, creating it on first use or when the host
    /// element has been removed from the document.
    pub fn ensure_host(&mut self, page: &Page, scope: &mut DocumentScope) -> Result<&MountPoint> {
        install_global_styles(page, scope)?;

        let connected = self
            .mount
            .as_ref()
            .is_some_and(|m| dom::is_connected(&m.host, page.document()));
        if !connected {
            if self.mount.is_some() {
                debug!("Host element was disconnected; recreating");
            }
            self.mount = Some(create_mount_point(page)?);
        }
        self.mount
            .as_ref()
            .ok_or_else(|| Error::Internal("mount point missing after creation".into()))
    }

    /// Replace whatever is mounted with the children of `view`.
    ///
    /// `view` must be fully built before this is called; the previous tree
    /// is removed only once the new one is ready to attach.
    pub fn mount(&mut self, view: &Handle) -> Result<()> {
        let mount = self
            .mount
            .as_ref()
            .ok_or_else(|| Error::Dom("cannot mount without a host element".into()))?;
        if view.children.borrow().is_empty() {
            return Err(Error::Render("view has no content".into()));
        }
        clear_children(&mount.container);
        dom::move_children(view, &mount.container);
        Ok(())
    }

    /// Remove the mounted tree and keep the host for reuse.
    pub fn unmount(&mut self) {
        if let Some(mount) = &self.mount {
            clear_children(&mount.container);
        }
    }

    pub fn teardown(&mut self) {
        self.unmount();
    }

    /// Take the host element out of the document entirely.
    pub fn remove_from_document(&mut self) {
        if let Some(mount) = self.mount.take() {
            clear_children(&mount.container);
            dom::detach(&mount.host);
            info!("Removed host element");
        }
    }

    /// Number of panel trees currently attached to the container.
    pub fn live_trees(&self) -> usize {
        self.mount.as_ref().map_or(0, |m| {
            m.container
                .children
                .borrow()
                .iter()
                .filter(|c| dom::tag_name(c).is_some())
                .count()
        })
    }
}

fn clear_children(node: &Handle) {
    for child in dom::children(node) {
        dom::detach(&child);
    }
}

/// Number of host elements in the page.
pub fn host_count(page: &Page) -> usize {
    fn count(node: &Handle) -> usize {
        let own = usize::from(dom::attr(node, "id").as_deref() == Some(HOST_ELEMENT_ID));
        own + node.children.borrow().iter().map(count).sum::<usize>()
    }
    count(page.document())
}

fn install_global_styles(page: &Page, scope: &mut DocumentScope) -> Result<()> {
    if scope.is_done(SetupStep::GlobalStyles) {
        return Ok(());
    }
    let head = page
        .head()
        .ok_or_else(|| Error::Dom("document has no <head>".into()))?;
    scope.run_once(SetupStep::GlobalStyles, || {
        if page.element_by_id(GLOBAL_STYLE_ID).is_some() {
            debug!("Global styles already present");
            return;
        }
        let fragment = dom::parse_html_fragment(&format!(
            r#"<style id="{}">{}</style>"#,
            GLOBAL_STYLE_ID, GLOBAL_PROPERTIES_CSS
        ));
        dom::move_children(&fragment, &head);
    });
    Ok(())
}

fn create_mount_point(page: &Page) -> Result<MountPoint> {
    let body = page
        .body()
        .ok_or_else(|| Error::Dom("document has no <body>".into()))?;

    // A copy left behind by an earlier instance is replaced.
    while let Some(stale) = page.element_by_id(HOST_ELEMENT_ID) {
        dom::detach(&stale);
    }

    let host_fragment = dom::parse_html_fragment(&format!(r#"<div id="{}"></div>"#, HOST_ELEMENT_ID));
    let host = dom::first_element_child(&host_fragment)
        .ok_or_else(|| Error::Dom("failed to create host element".into()))?;

    let shadow_root = dom::parse_html_fragment(&format!(
        r#"<style>{}</style><div class="{}"></div>"#,
        PANEL_CSS, CONTAINER_CLASS
    ));
    let container = dom::find_element(&shadow_root, &|n| {
        dom::attr(n, "class").as_deref() == Some(CONTAINER_CLASS)
    })
    .ok_or_else(|| Error::Dom("failed to create panel container".into()))?;

    dom::append_child(&body, host.clone());
    info!("Created isolated host element");
    Ok(MountPoint {
        host,
        shadow_root,
        container,
    })
}

//! Content-side logic for Web-K: reading the page around a selection,
//! sanitizing markup, mounting the chat panel in an isolated root, and
//! dispatching the activation hotkey across frames.
//!
//! Pages are modelled as inert `markup5ever_rcdom` trees, so everything here
//! runs without a browser.

pub mod dispatcher;
pub mod dom;
pub mod extract;
pub mod frame;
pub mod host;
pub mod hotkey;
pub mod render;
pub mod sanitize;
pub mod scope;
pub mod selection;
pub mod session;
pub mod style;

pub use dispatcher::{ContentScript, Dispatch};
pub use dom::Page;
pub use extract::{build_context, build_context_with};
pub use host::{HostState, IsolationHost, MountPoint};
pub use hotkey::{KeyEvent, KeyEventTarget, Platform};
pub use sanitize::sanitize;
pub use scope::{DocumentScope, SetupStep};
pub use selection::{Boundary, Range, Selection};
pub use session::{ModalSession, Theme};
pub use style::{StyleQuery, UserAgentStyles};

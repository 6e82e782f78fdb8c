//! Web-K relay backend: receives a selection, its page context and the
//! conversation so far, and streams a hosted LLM's answer back.

pub mod routes;
pub mod state;

pub use routes::build_router;
pub use state::AppState;

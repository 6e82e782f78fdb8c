//! Web-K core: page-context model, configuration and error types.

pub mod config;
pub mod context;
pub mod error;

pub use config::WebKConfig;
pub use context::{PageContext, PageContextBuilder};
pub use error::{Error, Result};

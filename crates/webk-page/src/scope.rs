//! Per-document setup state.
//!
//! A content script may be injected more than once into the same document.
//! Anything that must exist only once per document is installed through
//! [`DocumentScope::run_once`].

use std::collections::HashSet;

use tracing::debug;

/// Document-wide setup performed at most once.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SetupStep {
    GlobalStyles,
    KeyListener,
    MessageListener,
}

#[derive(Debug, Default)]
pub struct DocumentScope {
    done: HashSet<SetupStep>,
}

impl DocumentScope {
    pub fn new() -> Self {
        Self::default()
    }

    /// Run `setup` unless `step` already ran in this document.
    /// Returns whether `setup` ran.
    pub fn run_once(&mut self, step: SetupStep, setup: impl FnOnce()) -> bool {
        if !self.done.insert(step) {
            debug!("Setup step {:?} already done", step);
            return false;
        }
        setup();
        true
    }

    pub fn is_done(&self, step: SetupStep) -> bool {
        self.done.contains(&step)
    }
}

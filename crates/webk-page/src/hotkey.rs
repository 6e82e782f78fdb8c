//! Keyboard events, the activation combos, and a capture/bubble listener target.

/// Key code of the `K` key.
pub const KEY_CODE_K: u32 = 75;

/// A key-down event as seen by document listeners.
#[derive(Debug, Clone, Default)]
pub struct KeyEvent {
    pub key: String,
    pub code: String,
    pub key_code: u32,
    pub ctrl: bool,
    pub shift: bool,
    pub alt: bool,
    pub meta: bool,
    /// Event target is an input, textarea or contenteditable element.
    pub target_editable: bool,
    default_prevented: bool,
    propagation_stopped: bool,
}

impl KeyEvent {
    /// Plain key press with no modifiers.
    pub fn key(key: &str) -> Self {
        let upper = key.to_ascii_uppercase();
        let (code, key_code) = match upper.as_bytes() {
            [c @ b'A'..=b'Z'] => (format!("Key{}", upper), u32::from(*c)),
            _ => (key.to_string(), 0),
        };
        Self {
            key: key.to_string(),
            code,
            key_code,
            ..Default::default()
        }
    }

    pub fn with_ctrl(mut self) -> Self {
        self.ctrl = true;
        self
    }

    pub fn with_shift(mut self) -> Self {
        self.shift = true;
        self
    }

    pub fn with_alt(mut self) -> Self {
        self.alt = true;
        self
    }

    pub fn with_meta(mut self) -> Self {
        self.meta = true;
        self
    }

    pub fn prevent_default(&mut self) {
        self.default_prevented = true;
    }

    pub fn stop_propagation(&mut self) {
        self.propagation_stopped = true;
    }

    pub fn default_prevented(&self) -> bool {
        self.default_prevented
    }

    pub fn propagation_stopped(&self) -> bool {
        self.propagation_stopped
    }

    fn is_k(&self) -> bool {
        self.key_code == KEY_CODE_K || self.code == "KeyK" || self.key.eq_ignore_ascii_case("k")
    }

    /// A single printable character typed without a command modifier.
    pub fn printable_char(&self) -> Option<char> {
        if self.ctrl || self.meta || self.alt {
            return None;
        }
        let mut chars = self.key.chars();
        match (chars.next(), chars.next()) {
            (Some(c), None) if !c.is_control() => Some(c),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Platform {
    Mac,
    Other,
}

impl Platform {
    /// Classify a `navigator.platform` string.
    pub fn from_navigator(platform: &str) -> Self {
        if platform.to_ascii_uppercase().contains("MAC") {
            Platform::Mac
        } else {
            Platform::Other
        }
    }
}

/// Which activation combo an event matched.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Combo {
    /// Platform modifier + Shift + K.
    Primary,
    /// Alt + K.
    Fallback,
}

impl Combo {
    pub fn matching(event: &KeyEvent, platform: Platform) -> Option<Self> {
        if !event.is_k() {
            return None;
        }
        let (modifier, other) = match platform {
            Platform::Mac => (event.meta, event.ctrl),
            Platform::Other => (event.ctrl, event.meta),
        };
        if modifier && event.shift && !event.alt && !other {
            Some(Combo::Primary)
        } else if event.alt && !event.ctrl && !event.meta && !event.shift {
            Some(Combo::Fallback)
        } else {
            None
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Capture,
    Bubble,
}

pub type KeyListener = Box<dyn FnMut(&mut KeyEvent)>;

/// Document-level key-down listeners. Capture listeners run first; a
/// listener that stops propagation keeps the event from later phases.
#[derive(Default)]
pub struct KeyEventTarget {
    capture: Vec<KeyListener>,
    bubble: Vec<KeyListener>,
}

impl KeyEventTarget {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_listener(&mut self, phase: Phase, listener: KeyListener) {
        match phase {
            Phase::Capture => self.capture.push(listener),
            Phase::Bubble => self.bubble.push(listener),
        }
    }

    pub fn listener_count(&self, phase: Phase) -> usize {
        match phase {
            Phase::Capture => self.capture.len(),
            Phase::Bubble => self.bubble.len(),
        }
    }

    pub fn dispatch(&mut self, mut event: KeyEvent) -> KeyEvent {
        for listener in self.capture.iter_mut() {
            listener(&mut event);
        }
        if event.propagation_stopped {
            return event;
        }
        for listener in self.bubble.iter_mut() {
            listener(&mut event);
            if event.propagation_stopped {
                break;
            }
        }
        event
    }
}

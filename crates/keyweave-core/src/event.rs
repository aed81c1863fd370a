#![forbid(unsafe_code)]

//! Input events as delivered by a platform backend.
//!
//! A backend (winit, a terminal decoder, a browser bridge) maps whatever the
//! OS reports into [`Event`]. The resolver consumes key presses and bare
//! modifier transitions; every other variant is forwarded by the caller to
//! focus, pointer, or text handling and never touches chord state.
//!
//! - [`KeyCode::Unknown`] stands for keys the backend could not name. They
//!   reach the resolver and always resolve to no match.
//! - A backend that cannot distinguish presses from repeats reports
//!   [`KeyEventKind::Press`].
//! - IME composition is opaque here; it is text input, not a keystroke.

use bitflags::bitflags;

/// One unit of input from the backend.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    Key(KeyEvent),

    /// Modifiers went up or down with no other key involved.
    ModifiersChanged(ModifiersChangedEvent),

    Mouse(MouseEvent),

    /// Wheel or trackpad motion.
    Scroll(ScrollEvent),

    Ime(ImeEvent),

    /// Bracketed or clipboard paste.
    Paste(String),

    /// Window focus; `true` when gained.
    Focus(bool),
}

/// A physical key transition with the modifiers held at the time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KeyEvent {
    pub code: KeyCode,
    pub modifiers: Modifiers,
    pub kind: KeyEventKind,

    /// Text the key produces under the active layout (`'@'` for shift-2 on
    /// a US layout). Not used for matching.
    pub key_char: Option<char>,
}

impl KeyEvent {
    /// A press of `code` with nothing held.
    #[must_use]
    pub const fn new(code: KeyCode) -> Self {
        Self {
            code,
            modifiers: Modifiers::empty(),
            kind: KeyEventKind::Press,
            key_char: None,
        }
    }

    #[must_use]
    pub const fn with_modifiers(mut self, modifiers: Modifiers) -> Self {
        self.modifiers = modifiers;
        self
    }

    #[must_use]
    pub const fn with_kind(mut self, kind: KeyEventKind) -> Self {
        self.kind = kind;
        self
    }

    #[must_use]
    pub const fn with_key_char(mut self, key_char: char) -> Self {
        self.key_char = Some(key_char);
        self
    }

    /// Whether this transition can produce a keystroke.
    #[must_use]
    pub const fn is_actionable(&self) -> bool {
        !matches!(self.kind, KeyEventKind::Release) && self.code.is_known()
    }
}

/// Logical key identity, independent of modifiers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum KeyCode {
    /// A key producing a character. Letters are stored lowercase once
    /// normalized into a keystroke.
    Char(char),

    Enter,
    Escape,
    Backspace,
    Tab,

    /// Shift-tab as reported by some terminals. Keystrokes normalize it to
    /// `Tab` with `SHIFT`.
    BackTab,

    Delete,
    Insert,
    Home,
    End,
    PageUp,
    PageDown,

    // Arrows.
    Up,
    Down,
    Left,
    Right,

    /// `F1` through `F24`.
    F(u8),

    MediaPlayPause,
    MediaStop,
    MediaNextTrack,
    MediaPrevTrack,

    /// A modifier on its own, for modifier-tap bindings (`"shift shift"`).
    Modifier(ModifierKey),

    /// Reported by the backend but not identifiable.
    Unknown,
}

impl KeyCode {
    /// Whether this code can take part in binding resolution.
    #[must_use]
    pub const fn is_known(&self) -> bool {
        !matches!(self, Self::Unknown)
    }
}

/// A single modifier key, as named by a modifier-tap binding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ModifierKey {
    Shift,
    Alt,
    Ctrl,
    Super,
}

impl ModifierKey {
    /// The modifier flag this key sets.
    #[must_use]
    pub const fn flag(self) -> Modifiers {
        match self {
            Self::Shift => Modifiers::SHIFT,
            Self::Alt => Modifiers::ALT,
            Self::Ctrl => Modifiers::CTRL,
            Self::Super => Modifiers::SUPER,
        }
    }

    /// The key for a set containing exactly one modifier.
    #[must_use]
    pub fn from_single(modifiers: Modifiers) -> Option<Self> {
        if modifiers == Modifiers::SHIFT {
            Some(Self::Shift)
        } else if modifiers == Modifiers::ALT {
            Some(Self::Alt)
        } else if modifiers == Modifiers::CTRL {
            Some(Self::Ctrl)
        } else if modifiers == Modifiers::SUPER {
            Some(Self::Super)
        } else {
            None
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum KeyEventKind {
    #[default]
    Press,
    /// Auto-repeat while held. Dispatched like a press.
    Repeat,
    Release,
}

bitflags! {
    /// Held modifier set. Left and right variants are not distinguished.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct Modifiers: u8 {
        const NONE = 0;
        const SHIFT = 1;
        const ALT = 1 << 1;
        const CTRL = 1 << 2;
        /// Command on macOS, the Windows key elsewhere.
        const SUPER = 1 << 3;
    }
}

impl Default for Modifiers {
    fn default() -> Self {
        Self::NONE
    }
}

/// Modifier state transition reported without an accompanying key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ModifiersChangedEvent {
    /// Modifiers held before the change.
    pub previous: Modifiers,

    /// Modifiers held after the change.
    pub current: Modifiers,
}

impl ModifiersChangedEvent {
    #[must_use]
    pub const fn new(previous: Modifiers, current: Modifiers) -> Self {
        Self { previous, current }
    }

    /// Modifiers that went down in this transition.
    #[must_use]
    pub fn pressed(&self) -> Modifiers {
        self.current.difference(self.previous)
    }

    /// Modifiers that went up in this transition.
    #[must_use]
    pub fn released(&self) -> Modifiers {
        self.previous.difference(self.current)
    }
}

/// Pointer input at a position in logical pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MouseEvent {
    pub kind: MouseEventKind,
    pub x: i32,
    pub y: i32,
    pub modifiers: Modifiers,
}

impl MouseEvent {
    #[must_use]
    pub const fn new(kind: MouseEventKind, x: i32, y: i32) -> Self {
        Self {
            kind,
            x,
            y,
            modifiers: Modifiers::empty(),
        }
    }

    #[must_use]
    pub const fn with_modifiers(mut self, modifiers: Modifiers) -> Self {
        self.modifiers = modifiers;
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MouseEventKind {
    Down(MouseButton),
    Up(MouseButton),
    /// Motion with the button held.
    Drag(MouseButton),
    /// Motion with no button held.
    Moved,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MouseButton {
    Left,
    Right,
    Middle,
    Back,
    Forward,
}

/// A scroll event with signed deltas in lines.
///
/// Positive `delta_y` scrolls down, positive `delta_x` scrolls right.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScrollEvent {
    pub x: i32,
    pub y: i32,
    pub delta_x: i16,
    pub delta_y: i16,
    pub modifiers: Modifiers,
}

impl ScrollEvent {
    #[must_use]
    pub const fn new(x: i32, y: i32, delta_x: i16, delta_y: i16) -> Self {
        Self {
            x,
            y,
            delta_x,
            delta_y,
            modifiers: Modifiers::empty(),
        }
    }

    #[must_use]
    pub const fn with_modifiers(mut self, modifiers: Modifiers) -> Self {
        self.modifiers = modifiers;
        self
    }
}

/// Phase of an IME composition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ImePhase {
    Start,
    Update,
    Commit,
    Cancel,
}

/// IME composition event. Passed through to text input unmodified.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImeEvent {
    pub phase: ImePhase,

    /// Preedit text for `Start`/`Update`, committed text for `Commit`.
    pub text: String,
}

impl ImeEvent {
    #[must_use]
    pub fn new(phase: ImePhase, text: impl Into<String>) -> Self {
        Self {
            phase,
            text: text.into(),
        }
    }
}

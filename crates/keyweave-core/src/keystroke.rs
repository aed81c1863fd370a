#![forbid(unsafe_code)]

//! Keystrokes: one key press plus the modifiers held with it.
//!
//! A [`Keystroke`] is the unit the resolver matches on. It is built either
//! from a live [`KeyEvent`] or parsed from keymap text such as
//! `"cmd-shift-p"`.
//!
//! # Normalization
//!
//! Construction folds platform quirks into one canonical form so that a
//! binding written as text compares equal to the event a backend reports:
//!
//! - an ASCII uppercase character becomes lowercase plus `SHIFT`
//!   (`Char('P')` == `shift-p`),
//! - `BackTab` becomes `Tab` plus `SHIFT`.
//!
//! The produced character (`key_char`) is carried for display and
//! layout-aware consumers but never takes part in equality.
//!
//! # Text format
//!
//! Modifiers come first, joined by `-`, and the key name comes last. The
//! order of modifiers does not matter. A trailing `--` names the minus key.
//!
//! ```
//! use keyweave_core::keystroke::Keystroke;
//!
//! let a: Keystroke = "ctrl-alt-delete".parse().unwrap();
//! let b: Keystroke = "alt-ctrl-delete".parse().unwrap();
//! assert_eq!(a, b);
//! assert_eq!(a.to_string(), "ctrl-alt-delete");
//! ```

use std::fmt;
use std::hash::{Hash, Hasher};
use std::str::FromStr;

use crate::error::ParseError;
use crate::event::{KeyCode, KeyEvent, KeyEventKind, ModifierKey, Modifiers, ModifiersChangedEvent};

/// One key press combined with a modifier state.
#[derive(Debug, Clone, Copy)]
pub struct Keystroke {
    key: KeyCode,
    modifiers: Modifiers,
    key_char: Option<char>,
}

impl Keystroke {
    /// Create a normalized keystroke.
    #[must_use]
    pub fn new(key: KeyCode, modifiers: Modifiers) -> Self {
        let (key, modifiers) = match key {
            KeyCode::Char(c) if c.is_ascii_uppercase() => {
                (KeyCode::Char(c.to_ascii_lowercase()), modifiers | Modifiers::SHIFT)
            }
            KeyCode::BackTab => (KeyCode::Tab, modifiers | Modifiers::SHIFT),
            other => (other, modifiers),
        };
        Self {
            key,
            modifiers,
            key_char: None,
        }
    }

    /// Attach the layout-produced character.
    #[must_use]
    pub const fn with_key_char(mut self, key_char: char) -> Self {
        self.key_char = Some(key_char);
        self
    }

    /// Parse a keystroke from text like `"ctrl-shift-p"`.
    ///
    /// # Errors
    ///
    /// - [`ParseError::EmptySequence`] for empty input.
    /// - [`ParseError::MalformedModifier`] for an empty, unknown, or repeated
    ///   modifier segment.
    /// - [`ParseError::UnknownKey`] for an unrecognized key name.
    pub fn parse(text: &str) -> Result<Self, ParseError> {
        let text = text.trim();
        if text.is_empty() {
            return Err(ParseError::EmptySequence);
        }

        let (prefix, key_part) = split_key(text)?;

        let mut modifiers = Modifiers::NONE;
        if !prefix.is_empty() {
            for segment in prefix.split('-') {
                let flag = parse_modifier(segment)
                    .ok_or_else(|| ParseError::MalformedModifier(segment.to_string()))?;
                if modifiers.contains(flag) {
                    return Err(ParseError::MalformedModifier(segment.to_string()));
                }
                modifiers |= flag;
            }
        }

        let key = parse_key(key_part)?;
        Ok(Self::new(key, modifiers))
    }

    /// Build a keystroke from a press or repeat event.
    ///
    /// Releases produce no keystroke.
    #[must_use]
    pub fn from_key_event(event: &KeyEvent) -> Option<Self> {
        if event.kind == KeyEventKind::Release {
            return None;
        }
        let stroke = Self::new(event.code, event.modifiers);
        let key_char = event.key_char.or(match event.code {
            KeyCode::Char(c) => Some(c),
            _ => None,
        });
        Some(match key_char {
            Some(c) => stroke.with_key_char(c),
            None => stroke,
        })
    }

    /// Convert a bare modifier change into a modifier-tap keystroke.
    ///
    /// Yields `Some` only when exactly one modifier was held and the change
    /// releases it, leaving nothing held. Any other transition carries no
    /// matchable keystroke.
    #[must_use]
    pub fn is_modifiers_only(event: &ModifiersChangedEvent) -> Option<Self> {
        if !event.current.is_empty() {
            return None;
        }
        ModifierKey::from_single(event.previous)
            .map(|key| Self::new(KeyCode::Modifier(key), Modifiers::NONE))
    }

    /// Exact key and modifier equality.
    #[must_use]
    pub fn matches(&self, other: &Keystroke) -> bool {
        self.key == other.key && self.modifiers == other.modifiers
    }

    #[must_use]
    pub const fn key(&self) -> KeyCode {
        self.key
    }

    #[must_use]
    pub const fn modifiers(&self) -> Modifiers {
        self.modifiers
    }

    #[must_use]
    pub const fn key_char(&self) -> Option<char> {
        self.key_char
    }

    /// Whether this keystroke is a lone modifier tap.
    #[must_use]
    pub const fn is_modifier_tap(&self) -> bool {
        matches!(self.key, KeyCode::Modifier(_))
    }
}

impl PartialEq for Keystroke {
    fn eq(&self, other: &Self) -> bool {
        self.matches(other)
    }
}

impl Eq for Keystroke {}

impl Hash for Keystroke {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.key.hash(state);
        self.modifiers.hash(state);
    }
}

impl FromStr for Keystroke {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl fmt::Display for Keystroke {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (flag, name) in [
            (Modifiers::CTRL, "ctrl"),
            (Modifiers::ALT, "alt"),
            (Modifiers::SHIFT, "shift"),
            (Modifiers::SUPER, "cmd"),
        ] {
            if self.modifiers.contains(flag) {
                write!(f, "{name}-")?;
            }
        }
        write_key(f, self.key)
    }
}

/// Parse whitespace-separated keystrokes (`"ctrl-k ctrl-s"`).
///
/// # Errors
///
/// Returns [`ParseError::EmptySequence`] when the text holds no keystroke,
/// or the first keystroke error otherwise.
pub fn parse_sequence(text: &str) -> Result<Vec<Keystroke>, ParseError> {
    let sequence = text
        .split_whitespace()
        .map(Keystroke::parse)
        .collect::<Result<Vec<_>, _>>()?;
    if sequence.is_empty() {
        return Err(ParseError::EmptySequence);
    }
    Ok(sequence)
}

/// Render a sequence back to its text form.
#[must_use]
pub fn format_sequence(sequence: &[Keystroke]) -> String {
    sequence
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(" ")
}

/// Split `text` into (modifier prefix, key name).
fn split_key(text: &str) -> Result<(&str, &str), ParseError> {
    if text == "-" {
        return Ok(("", "-"));
    }
    if let Some(prefix) = text.strip_suffix("--") {
        return Ok((prefix, "-"));
    }
    match text.rfind('-') {
        Some(idx) => {
            let key = &text[idx + 1..];
            if key.is_empty() {
                return Err(ParseError::MalformedModifier(text.to_string()));
            }
            Ok((&text[..idx], key))
        }
        None => Ok(("", text)),
    }
}

fn parse_modifier(segment: &str) -> Option<Modifiers> {
    match segment.to_ascii_lowercase().as_str() {
        "ctrl" | "control" => Some(Modifiers::CTRL),
        "alt" | "opt" | "option" => Some(Modifiers::ALT),
        "shift" => Some(Modifiers::SHIFT),
        "cmd" | "command" | "super" | "meta" | "win" => Some(Modifiers::SUPER),
        _ => None,
    }
}

fn parse_key(part: &str) -> Result<KeyCode, ParseError> {
    let mut chars = part.chars();
    if let (Some(c), None) = (chars.next(), chars.next()) {
        return Ok(KeyCode::Char(c));
    }

    let lower = part.to_ascii_lowercase();
    let code = match lower.as_str() {
        "enter" | "return" => KeyCode::Enter,
        "esc" | "escape" => KeyCode::Escape,
        "backspace" => KeyCode::Backspace,
        "tab" => KeyCode::Tab,
        "backtab" => KeyCode::BackTab,
        "delete" | "del" => KeyCode::Delete,
        "insert" | "ins" => KeyCode::Insert,
        "home" => KeyCode::Home,
        "end" => KeyCode::End,
        "pageup" | "pgup" => KeyCode::PageUp,
        "pagedown" | "pgdn" => KeyCode::PageDown,
        "up" => KeyCode::Up,
        "down" => KeyCode::Down,
        "left" => KeyCode::Left,
        "right" => KeyCode::Right,
        "space" => KeyCode::Char(' '),
        "minus" => KeyCode::Char('-'),
        "plus" => KeyCode::Char('+'),
        "mediaplaypause" => KeyCode::MediaPlayPause,
        "mediastop" => KeyCode::MediaStop,
        "medianexttrack" => KeyCode::MediaNextTrack,
        "mediaprevtrack" => KeyCode::MediaPrevTrack,
        "shift" => KeyCode::Modifier(ModifierKey::Shift),
        "alt" | "opt" | "option" => KeyCode::Modifier(ModifierKey::Alt),
        "ctrl" | "control" => KeyCode::Modifier(ModifierKey::Ctrl),
        "cmd" | "command" | "super" | "meta" | "win" => KeyCode::Modifier(ModifierKey::Super),
        _ => match parse_function_key(&lower) {
            Some(code) => code,
            None => return Err(ParseError::UnknownKey(part.to_string())),
        },
    };
    Ok(code)
}

fn parse_function_key(lower: &str) -> Option<KeyCode> {
    let n = lower.strip_prefix('f')?.parse::<u8>().ok()?;
    (1..=24).contains(&n).then_some(KeyCode::F(n))
}

fn write_key(f: &mut fmt::Formatter<'_>, key: KeyCode) -> fmt::Result {
    let name = match key {
        KeyCode::Char(' ') => "space",
        KeyCode::Char(c) => return write!(f, "{c}"),
        KeyCode::F(n) => return write!(f, "f{n}"),
        KeyCode::Enter => "enter",
        KeyCode::Escape => "escape",
        KeyCode::Backspace => "backspace",
        KeyCode::Tab => "tab",
        KeyCode::BackTab => "backtab",
        KeyCode::Delete => "delete",
        KeyCode::Insert => "insert",
        KeyCode::Home => "home",
        KeyCode::End => "end",
        KeyCode::PageUp => "pageup",
        KeyCode::PageDown => "pagedown",
        KeyCode::Up => "up",
        KeyCode::Down => "down",
        KeyCode::Left => "left",
        KeyCode::Right => "right",
        KeyCode::MediaPlayPause => "mediaplaypause",
        KeyCode::MediaStop => "mediastop",
        KeyCode::MediaNextTrack => "medianexttrack",
        KeyCode::MediaPrevTrack => "mediaprevtrack",
        KeyCode::Modifier(ModifierKey::Shift) => "shift",
        KeyCode::Modifier(ModifierKey::Alt) => "alt",
        KeyCode::Modifier(ModifierKey::Ctrl) => "ctrl",
        KeyCode::Modifier(ModifierKey::Super) => "cmd",
        KeyCode::Unknown => "unknown",
    };
    f.write_str(name)
}

#![forbid(unsafe_code)]

//! Declarative keymap records.
//!
//! A [`BindingSpec`] is the text form of one binding as it appears in a
//! settings file. Loaders (JSON, TOML, or hand-built tables) produce a list
//! of specs; [`Keymap::from_specs`] compiles them in order, so later records
//! override earlier ones exactly as with [`Keymap::insert`].
//!
//! With the `serde` feature, `BindingSpec` derives `Serialize` and
//! `Deserialize`:
//!
//! ```json
//! [
//!   { "keys": "ctrl-k ctrl-s", "action": "file::SaveAll", "context": "editor" },
//!   { "keys": "ctrl-1", "action": "pane::Activate", "payload": "1" }
//! ]
//! ```

use std::fmt;

use crate::error::ParseError;
use crate::keymap::{KeyBinding, Keymap, SharedKeymap};

/// One binding in source form.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct BindingSpec {
    /// Whitespace-separated keystrokes, e.g. `"ctrl-k ctrl-s"`.
    pub keys: String,
    /// Action name.
    pub action: String,
    /// Opaque argument handed back with the action.
    #[cfg_attr(
        feature = "serde",
        serde(default, skip_serializing_if = "Option::is_none")
    )]
    pub payload: Option<String>,
    /// Context predicate; absent means the binding is always active.
    #[cfg_attr(
        feature = "serde",
        serde(default, skip_serializing_if = "Option::is_none")
    )]
    pub context: Option<String>,
}

impl BindingSpec {
    #[must_use]
    pub fn new(keys: impl Into<String>, action: impl Into<String>) -> Self {
        Self {
            keys: keys.into(),
            action: action.into(),
            payload: None,
            context: None,
        }
    }

    #[must_use]
    pub fn with_payload(mut self, payload: impl Into<String>) -> Self {
        self.payload = Some(payload.into());
        self
    }

    #[must_use]
    pub fn with_context(mut self, context: impl Into<String>) -> Self {
        self.context = Some(context.into());
        self
    }

    /// Compile into a [`KeyBinding`].
    ///
    /// # Errors
    ///
    /// Returns the keystroke or predicate [`ParseError`].
    pub fn compile(&self) -> Result<KeyBinding, ParseError> {
        let binding = KeyBinding::parse(
            &self.keys,
            self.action.as_str(),
            self.context.as_deref().unwrap_or_default(),
        )?;
        Ok(match &self.payload {
            Some(payload) => binding.with_payload(payload),
            None => binding,
        })
    }
}

/// A source record failed to compile.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadError {
    /// Position of the record in the source list.
    pub index: usize,
    /// The record's key text, for diagnostics.
    pub keys: String,
    pub source: ParseError,
}

impl fmt::Display for LoadError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "keymap record {} ({:?}): {}",
            self.index, self.keys, self.source
        )
    }
}

impl std::error::Error for LoadError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(&self.source)
    }
}

impl Keymap {
    /// Compile `specs` in order into a new table.
    ///
    /// # Errors
    ///
    /// Fails on the first record that does not parse. No partial table is
    /// returned.
    pub fn from_specs(specs: &[BindingSpec]) -> Result<Self, LoadError> {
        let mut keymap = Self::new();
        for (index, spec) in specs.iter().enumerate() {
            let binding = spec.compile().map_err(|source| LoadError {
                index,
                keys: spec.keys.clone(),
                source,
            })?;
            keymap.insert(binding);
        }
        tracing::debug!(records = specs.len(), bindings = keymap.len(), "keymap compiled");
        Ok(keymap)
    }
}

impl SharedKeymap {
    /// Compile `specs` and swap them in.
    ///
    /// # Errors
    ///
    /// On failure the current table stays in place.
    pub fn reload(&self, specs: &[BindingSpec]) -> Result<(), LoadError> {
        match Keymap::from_specs(specs) {
            Ok(keymap) => {
                self.store(keymap);
                Ok(())
            }
            Err(err) => {
                tracing::debug!(error = %err, "keymap reload rejected");
                Err(err)
            }
        }
    }
}

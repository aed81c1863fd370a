#![forbid(unsafe_code)]

//! Core: keystroke-to-action resolution for interactive applications.
//!
//! # Role in keyweave
//! `keyweave-core` turns raw key input into named actions. It owns the
//! keystroke model, context predicates, the binding table, and the chord
//! resolver. Invoking the action is left to the caller.
//!
//! # Primary responsibilities
//! - **Keystroke**: normalized key + modifier value with a text form
//!   (`"ctrl-shift-p"`).
//! - **Context**: the stack of active UI scopes and the predicates bindings
//!   are gated on.
//! - **Keymap**: ordered binding table with deterministic precedence, shared
//!   across threads via [`SharedKeymap`] for tear-free reloads.
//! - **Resolver**: per-session state machine for multi-key chords and their
//!   timeout.
//!
//! # Precedence
//! When several bindings match, the one anchored to the innermost context
//! frame wins; among equals, the one added to the table last wins.

pub mod context;
pub mod error;
pub mod event;
pub mod keymap;
pub mod keystroke;
pub mod resolver;
pub mod source;

pub use context::{ContextFrame, ContextPredicate, ContextStack};
pub use error::ParseError;
pub use event::{Event, KeyCode, KeyEvent, KeyEventKind, Modifiers};
pub use keymap::{Action, ActionTypeId, KeyBinding, Keymap, SharedKeymap};
pub use keystroke::Keystroke;
pub use resolver::{Outcome, Resolver, ResolverConfig};
pub use source::{BindingSpec, LoadError};

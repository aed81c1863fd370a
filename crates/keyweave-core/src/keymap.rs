#![forbid(unsafe_code)]

//! Binding table: keystroke sequences mapped to actions under a context.
//!
//! # Precedence
//!
//! [`Keymap::bindings_for`] orders the bindings that apply to a context
//! stack by:
//!
//! 1. **Context specificity**: a binding anchored to an inner frame beats
//!    one anchored to an outer frame (see
//!    [`ContextPredicate::specificity`]).
//! 2. **Recency**: among equal specificity, the later insertion wins.
//!
//! Inserting a binding with the same sequence and predicate as an existing
//! one removes the old entry and appends the new one, so user overrides
//! layered on defaults always win deterministically.
//!
//! # Reload
//!
//! [`SharedKeymap`] holds the table behind [`arc_swap::ArcSwap`]. Readers
//! take a snapshot without locking; [`SharedKeymap::clear_and_replace`]
//! swaps the whole table at once, and readers holding the previous snapshot
//! keep a complete, consistent view of it.
//!
//! ```
//! use keyweave_core::context::ContextStack;
//! use keyweave_core::keymap::{KeyBinding, Keymap};
//!
//! let mut keymap = Keymap::new();
//! keymap.insert(KeyBinding::parse("ctrl-s", "file::Save", "").unwrap());
//! keymap.insert(KeyBinding::parse("ctrl-s", "search::Next", "search").unwrap());
//!
//! let stack = ContextStack::from_labels(["search", "editor"]);
//! let best = &keymap.bindings_for(&stack)[0];
//! assert_eq!(best.action().id().as_str(), "search::Next");
//! ```

use std::fmt;
use std::sync::Arc;

use arc_swap::ArcSwap;

use crate::context::{ContextPredicate, ContextStack};
use crate::error::ParseError;
use crate::keystroke::{Keystroke, format_sequence, parse_sequence};

// ---------------------------------------------------------------------------
// Actions
// ---------------------------------------------------------------------------

/// Opaque name of an application action, resolved by the caller's registry.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ActionTypeId(Arc<str>);

impl ActionTypeId {
    #[must_use]
    pub fn new(name: impl AsRef<str>) -> Self {
        Self(Arc::from(name.as_ref()))
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ActionTypeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ActionTypeId {
    fn from(name: &str) -> Self {
        Self::new(name)
    }
}

impl From<String> for ActionTypeId {
    fn from(name: String) -> Self {
        Self(Arc::from(name))
    }
}

/// An action identifier plus the opaque payload handed to it.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Action {
    id: ActionTypeId,
    payload: Option<Arc<str>>,
}

impl Action {
    #[must_use]
    pub fn new(id: impl Into<ActionTypeId>) -> Self {
        Self {
            id: id.into(),
            payload: None,
        }
    }

    #[must_use]
    pub fn with_payload(mut self, payload: impl AsRef<str>) -> Self {
        self.payload = Some(Arc::from(payload.as_ref()));
        self
    }

    #[must_use]
    pub fn id(&self) -> &ActionTypeId {
        &self.id
    }

    #[must_use]
    pub fn payload(&self) -> Option<&str> {
        self.payload.as_deref()
    }
}

// ---------------------------------------------------------------------------
// Bindings
// ---------------------------------------------------------------------------

/// A keystroke sequence bound to an action under a context predicate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyBinding {
    sequence: Vec<Keystroke>,
    action: Action,
    predicate: ContextPredicate,
}

impl KeyBinding {
    /// Create a binding.
    ///
    /// # Errors
    ///
    /// Returns [`ParseError::EmptySequence`] if `sequence` is empty.
    pub fn new(
        sequence: Vec<Keystroke>,
        action: Action,
        predicate: ContextPredicate,
    ) -> Result<Self, ParseError> {
        if sequence.is_empty() {
            return Err(ParseError::EmptySequence);
        }
        Ok(Self {
            sequence,
            action,
            predicate,
        })
    }

    /// Parse a binding from sequence text, an action name, and predicate
    /// text.
    ///
    /// # Errors
    ///
    /// Propagates keystroke and predicate parse errors.
    pub fn parse(
        keys: &str,
        action: impl Into<ActionTypeId>,
        context: &str,
    ) -> Result<Self, ParseError> {
        Self::new(
            parse_sequence(keys)?,
            Action::new(action),
            ContextPredicate::parse(context)?,
        )
    }

    #[must_use]
    pub fn with_payload(mut self, payload: impl AsRef<str>) -> Self {
        self.action = self.action.with_payload(payload);
        self
    }

    #[must_use]
    pub fn sequence(&self) -> &[Keystroke] {
        &self.sequence
    }

    #[must_use]
    pub fn action(&self) -> &Action {
        &self.action
    }

    #[must_use]
    pub fn predicate(&self) -> &ContextPredicate {
        &self.predicate
    }

    /// Number of keystrokes in the sequence (always at least one).
    #[must_use]
    pub fn len(&self) -> usize {
        self.sequence.len()
    }

    /// Whether `other` is triggered by the same sequence under the same
    /// predicate, making one an override of the other.
    #[must_use]
    pub fn same_trigger(&self, other: &KeyBinding) -> bool {
        self.sequence == other.sequence && self.predicate == other.predicate
    }
}

impl fmt::Display for KeyBinding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} -> {} [{}]",
            format_sequence(&self.sequence),
            self.action.id,
            self.predicate
        )
    }
}

/// A binding tagged with its table position and rank for one context stack.
#[derive(Debug, Clone)]
pub(crate) struct Candidate {
    pub(crate) binding: Arc<KeyBinding>,
    pub(crate) order: usize,
    pub(crate) specificity: usize,
}

/// Re-rank `candidates` against `stack`, dropping those whose predicate no
/// longer holds.
pub(crate) fn rank_candidates(candidates: &mut Vec<Candidate>, stack: &ContextStack) {
    candidates.retain_mut(|candidate| match candidate.binding.predicate.specificity(stack) {
        Some(specificity) => {
            candidate.specificity = specificity;
            true
        }
        None => false,
    });
    candidates.sort_by(|a, b| {
        b.specificity
            .cmp(&a.specificity)
            .then_with(|| b.order.cmp(&a.order))
    });
}

// ---------------------------------------------------------------------------
// Keymap
// ---------------------------------------------------------------------------

/// Ordered binding table. Position in the table is insertion recency.
#[derive(Debug, Clone, Default)]
pub struct Keymap {
    bindings: Vec<Arc<KeyBinding>>,
}

impl Keymap {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a binding, replacing any binding with the same sequence and
    /// predicate. The new binding takes the most recent position.
    pub fn insert(&mut self, binding: KeyBinding) {
        if let Some(index) = self.bindings.iter().position(|b| b.same_trigger(&binding)) {
            let previous = self.bindings.remove(index);
            tracing::debug!(
                binding = %binding,
                replaced = %previous.action.id,
                "keymap binding overridden"
            );
        }
        self.bindings.push(Arc::new(binding));
    }

    /// Insert bindings in order.
    pub fn extend(&mut self, bindings: impl IntoIterator<Item = KeyBinding>) {
        for binding in bindings {
            self.insert(binding);
        }
    }

    /// Remove all bindings.
    pub fn clear(&mut self) {
        self.bindings.clear();
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.bindings.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.bindings.is_empty()
    }

    /// All bindings, oldest first.
    #[must_use]
    pub fn bindings(&self) -> &[Arc<KeyBinding>] {
        &self.bindings
    }

    /// Bindings that apply to `stack`, highest precedence first.
    #[must_use]
    pub fn bindings_for(&self, stack: &ContextStack) -> Vec<Arc<KeyBinding>> {
        self.candidates(stack)
            .into_iter()
            .map(|candidate| candidate.binding)
            .collect()
    }

    /// Bindings for an action, oldest first. Used for help and palette
    /// display.
    #[must_use]
    pub fn bindings_for_action(&self, id: &ActionTypeId) -> Vec<Arc<KeyBinding>> {
        self.bindings
            .iter()
            .filter(|binding| binding.action.id == *id)
            .cloned()
            .collect()
    }

    pub(crate) fn candidates(&self, stack: &ContextStack) -> Vec<Candidate> {
        let mut candidates = self
            .bindings
            .iter()
            .enumerate()
            .map(|(order, binding)| Candidate {
                binding: Arc::clone(binding),
                order,
                specificity: 0,
            })
            .collect();
        rank_candidates(&mut candidates, stack);
        candidates
    }
}

impl FromIterator<KeyBinding> for Keymap {
    fn from_iter<I: IntoIterator<Item = KeyBinding>>(iter: I) -> Self {
        let mut keymap = Self::new();
        keymap.extend(iter);
        keymap
    }
}

// ---------------------------------------------------------------------------
// SharedKeymap
// ---------------------------------------------------------------------------

/// A keymap shared between the resolver and a reloader.
///
/// - `load()`: wait-free snapshot, no allocation.
/// - `clear_and_replace()` / `store()`: allocates one `Arc`, atomically swaps.
pub struct SharedKeymap {
    inner: ArcSwap<Keymap>,
}

impl SharedKeymap {
    #[must_use]
    pub fn new(keymap: Keymap) -> Self {
        Self {
            inner: ArcSwap::from_pointee(keymap),
        }
    }

    /// Current table snapshot. Stays valid across later swaps.
    #[must_use]
    pub fn load(&self) -> Arc<Keymap> {
        self.inner.load_full()
    }

    /// Borrow the current table without bumping the refcount.
    ///
    /// Prefer this for short-lived lookups.
    pub fn load_ref(&self) -> arc_swap::Guard<Arc<Keymap>> {
        self.inner.load()
    }

    /// Atomically replace the table.
    pub fn store(&self, keymap: Keymap) {
        tracing::debug!(bindings = keymap.len(), "keymap swapped");
        self.inner.store(Arc::new(keymap));
    }

    /// Build a fresh table from `bindings` and swap it in as one step.
    pub fn clear_and_replace(&self, bindings: impl IntoIterator<Item = KeyBinding>) {
        self.store(bindings.into_iter().collect());
    }

    /// Bindings that apply to `stack` in the current table.
    #[must_use]
    pub fn bindings_for(&self, stack: &ContextStack) -> Vec<Arc<KeyBinding>> {
        self.load_ref().bindings_for(stack)
    }
}

impl Default for SharedKeymap {
    fn default() -> Self {
        Self::new(Keymap::new())
    }
}

impl fmt::Debug for SharedKeymap {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SharedKeymap")
            .field("bindings", &self.load_ref().len())
            .finish()
    }
}

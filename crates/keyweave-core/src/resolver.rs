#![forbid(unsafe_code)]

//! Keystroke-to-action resolution with multi-key chords.
//!
//! The [`Resolver`] turns a stream of keystrokes into [`Outcome`]s by
//! matching them against a [`SharedKeymap`] under the caller's
//! [`ContextStack`]. It never invokes actions itself.
//!
//! # State Machine
//!
//! ```text
//!              no candidate                 exact only
//!            ┌──────────────┐           ┌──────────────┐
//!            ▼              │           │              ▼
//!      ┌──────────┐  key    │    ┌─────────────┐   Matched(action)
//!      │   Idle   │─────────┴───▶│   Pending   │──────────────────▶ Idle
//!      └──────────┘  longer      └─────────────┘
//!            ▲       candidates     │   │    │
//!            │                      │   │    │ key, still longer
//!            │   NoMatch / cancel   │   │    └──────▶ Pending
//!            └──────────────────────┘   │
//!            ▲                          │ timeout
//!            └──────────────────────────┘ Matched(remembered) or NoMatch
//! ```
//!
//! - From **Idle**, a keystroke whose only candidates are single-key
//!   bindings fires the highest-precedence one at once.
//! - When any candidate needs more keys the resolver goes **Pending**,
//!   remembering the best exact match seen so far (if any).
//! - A keystroke that continues no candidate yields `NoMatch` and discards
//!   the whole partial sequence. There is no backtracking.
//! - On timeout the remembered exact match fires; without one the chord
//!   resolves to `NoMatch`.
//!
//! Context is re-checked on every step: candidates whose predicate no
//! longer holds for the current stack are dropped, so focus changes
//! mid-chord cancel naturally.
//!
//! # Example
//!
//! ```
//! use std::sync::Arc;
//! use std::time::{Duration, Instant};
//! use keyweave_core::context::ContextStack;
//! use keyweave_core::keymap::{KeyBinding, SharedKeymap};
//! use keyweave_core::keystroke::Keystroke;
//! use keyweave_core::resolver::{Outcome, Resolver};
//!
//! let keymap = Arc::new(SharedKeymap::default());
//! keymap.clear_and_replace([
//!     KeyBinding::parse("ctrl-k ctrl-s", "file::SaveAll", "editor").unwrap(),
//! ]);
//!
//! let mut resolver = Resolver::with_defaults(keymap);
//! let stack = ContextStack::from_labels(["editor"]);
//! let now = Instant::now();
//!
//! let k = Keystroke::parse("ctrl-k").unwrap();
//! assert_eq!(resolver.dispatch(&k, &stack, now), Outcome::Pending);
//!
//! let s = Keystroke::parse("ctrl-s").unwrap();
//! let outcome = resolver.dispatch(&s, &stack, now + Duration::from_millis(200));
//! assert_eq!(outcome.action().unwrap().id().as_str(), "file::SaveAll");
//! ```

use std::sync::Arc;

use web_time::{Duration, Instant};

use crate::context::ContextStack;
use crate::event::{Event, KeyEventKind, ModifierKey};
use crate::keymap::{Action, Candidate, SharedKeymap, rank_candidates};
use crate::keystroke::{Keystroke, format_sequence};

// ---------------------------------------------------------------------------
// Configuration Constants
// ---------------------------------------------------------------------------

/// Default window for completing a chord.
pub const DEFAULT_CHORD_TIMEOUT_MS: u64 = 1000;

/// Minimum allowed chord timeout.
pub const MIN_CHORD_TIMEOUT_MS: u64 = 50;

/// Maximum allowed chord timeout.
pub const MAX_CHORD_TIMEOUT_MS: u64 = 5000;

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

/// Configuration for the resolver.
///
/// # Environment Variables
///
/// | Variable | Type | Default | Description |
/// |----------|------|---------|-------------|
/// | `KEYWEAVE_CHORD_TIMEOUT_MS` | u64 | 1000 | Chord completion window |
///
/// A longer timeout favors completing long chords; a shorter one makes an
/// ambiguous exact match (`a` vs. `a b`) fire sooner.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolverConfig {
    /// Window, measured from the first key of a pending chord, in which the
    /// chord must complete. Default: 1000ms.
    pub chord_timeout: Duration,
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self {
            chord_timeout: Duration::from_millis(DEFAULT_CHORD_TIMEOUT_MS),
        }
    }
}

impl ResolverConfig {
    /// Create a new config with custom timeout.
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.chord_timeout = timeout;
        self
    }

    /// Load config from environment variables.
    ///
    /// Reads `KEYWEAVE_CHORD_TIMEOUT_MS`. Unparseable values are ignored and
    /// the result is clamped to the valid range.
    #[must_use]
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(val) = std::env::var("KEYWEAVE_CHORD_TIMEOUT_MS")
            && let Ok(ms) = val.trim().parse::<u64>()
        {
            config.chord_timeout = Duration::from_millis(ms);
        }

        config.validated()
    }

    /// Clamp the timeout to 50-5000ms.
    ///
    /// ```
    /// use keyweave_core::resolver::ResolverConfig;
    /// use std::time::Duration;
    ///
    /// let config = ResolverConfig::default()
    ///     .with_timeout(Duration::from_millis(10))
    ///     .validated();
    /// assert_eq!(config.chord_timeout.as_millis(), 50);
    /// ```
    #[must_use]
    pub fn validated(mut self) -> Self {
        let ms = u64::try_from(self.chord_timeout.as_millis()).unwrap_or(u64::MAX);
        self.chord_timeout =
            Duration::from_millis(ms.clamp(MIN_CHORD_TIMEOUT_MS, MAX_CHORD_TIMEOUT_MS));
        self
    }

    /// Check if values are within valid ranges.
    #[must_use]
    pub fn is_valid(&self) -> bool {
        let ms = self.chord_timeout.as_millis();
        (u128::from(MIN_CHORD_TIMEOUT_MS)..=u128::from(MAX_CHORD_TIMEOUT_MS)).contains(&ms)
    }
}

// ---------------------------------------------------------------------------
// Outcome
// ---------------------------------------------------------------------------

/// Result of feeding one keystroke to the resolver.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    /// No binding applies; the caller may forward the key as text input.
    NoMatch,

    /// The keystroke extended a chord; wait for more input or a timeout.
    Pending,

    /// A binding fired. The caller invokes the action.
    Matched(Action),
}

impl Outcome {
    /// The fired action, if any.
    #[must_use]
    pub fn action(&self) -> Option<&Action> {
        match self {
            Self::Matched(action) => Some(action),
            _ => None,
        }
    }

    #[must_use]
    pub const fn is_match(&self) -> bool {
        matches!(self, Self::Matched(_))
    }

    /// Whether the keystroke was claimed by the keymap (pending or fired).
    #[must_use]
    pub const fn consumes_event(&self) -> bool {
        !matches!(self, Self::NoMatch)
    }
}

// ---------------------------------------------------------------------------
// Resolver
// ---------------------------------------------------------------------------

/// A partially typed chord.
#[derive(Debug, Clone)]
struct PendingChord {
    partial: Vec<Keystroke>,
    started_at: Instant,
    /// Bindings longer than `partial` whose prefix matches it.
    candidates: Vec<Candidate>,
    /// Best exact match seen during this run; fires on timeout.
    exact: Option<Candidate>,
}

#[derive(Debug, Clone, Default)]
enum ResolverState {
    #[default]
    Idle,
    Pending(PendingChord),
}

/// Stateful keystroke resolver for one input-focus session.
///
/// Calls must be serialized: `dispatch`, `check_timeout`, and `cancel` take
/// `&mut self`, so a keystroke and a timeout for the same chord can never
/// race.
#[derive(Debug)]
pub struct Resolver {
    keymap: Arc<SharedKeymap>,
    config: ResolverConfig,
    state: ResolverState,
    /// A lone modifier went down and no key has been pressed since.
    tap_armed: bool,
}

impl Resolver {
    #[must_use]
    pub fn new(keymap: Arc<SharedKeymap>, config: ResolverConfig) -> Self {
        Self {
            keymap,
            config,
            state: ResolverState::Idle,
            tap_armed: false,
        }
    }

    #[must_use]
    pub fn with_defaults(keymap: Arc<SharedKeymap>) -> Self {
        Self::new(keymap, ResolverConfig::default())
    }

    /// Create a resolver loading config from environment.
    #[must_use]
    pub fn from_env(keymap: Arc<SharedKeymap>) -> Self {
        Self::new(keymap, ResolverConfig::from_env())
    }

    /// Feed one keystroke.
    ///
    /// If a pending chord has outlived its timeout without a
    /// [`check_timeout`](Self::check_timeout) call, it is discarded and the
    /// keystroke starts fresh from Idle.
    pub fn dispatch(&mut self, keystroke: &Keystroke, stack: &ContextStack, now: Instant) -> Outcome {
        if !keystroke.key().is_known() {
            if self.is_pending() {
                tracing::debug!("chord abandoned on unidentified key");
            }
            self.state = ResolverState::Idle;
            return Outcome::NoMatch;
        }

        match std::mem::take(&mut self.state) {
            ResolverState::Idle => self.start(keystroke, stack, now),
            ResolverState::Pending(pending) if self.expired(&pending, now) => {
                tracing::debug!(
                    partial = %format_sequence(&pending.partial),
                    dropped_match = pending.exact.is_some(),
                    "stale chord discarded"
                );
                self.start(keystroke, stack, now)
            }
            ResolverState::Pending(pending) => self.advance(pending, keystroke, stack),
        }
    }

    /// Feed a raw input event.
    ///
    /// - Key presses and repeats are dispatched; releases are ignored.
    /// - A modifier pressed and released alone dispatches a modifier tap.
    /// - Focus changes cancel any pending chord.
    /// - Mouse, scroll, IME and paste events never match and leave chord
    ///   state untouched.
    pub fn dispatch_event(&mut self, event: &Event, stack: &ContextStack, now: Instant) -> Outcome {
        match event {
            Event::Key(key) => {
                if key.kind == KeyEventKind::Release {
                    return Outcome::NoMatch;
                }
                self.tap_armed = false;
                match Keystroke::from_key_event(key) {
                    Some(keystroke) => self.dispatch(&keystroke, stack, now),
                    None => Outcome::NoMatch,
                }
            }
            Event::ModifiersChanged(change) => {
                if change.previous.is_empty() && ModifierKey::from_single(change.current).is_some() {
                    self.tap_armed = true;
                    return Outcome::NoMatch;
                }
                let armed = std::mem::replace(&mut self.tap_armed, false);
                match Keystroke::is_modifiers_only(change) {
                    Some(tap) if armed => self.dispatch(&tap, stack, now),
                    _ => Outcome::NoMatch,
                }
            }
            Event::Focus(_) => {
                self.tap_armed = false;
                self.cancel();
                Outcome::NoMatch
            }
            Event::Mouse(_) | Event::Scroll(_) | Event::Ime(_) | Event::Paste(_) => Outcome::NoMatch,
        }
    }

    /// Resolve a pending chord whose timeout has elapsed.
    ///
    /// Call this from the event loop's timer (see [`deadline`](Self::deadline)).
    /// Returns `None` when nothing is pending or the window is still open.
    pub fn check_timeout(&mut self, now: Instant) -> Option<Outcome> {
        let ResolverState::Pending(pending) = &self.state else {
            return None;
        };
        if !self.expired(pending, now) {
            return None;
        }

        let ResolverState::Pending(pending) = std::mem::take(&mut self.state) else {
            return None;
        };
        let outcome = match pending.exact {
            Some(exact) => Outcome::Matched(exact.binding.action().clone()),
            None => Outcome::NoMatch,
        };
        tracing::debug!(
            partial = %format_sequence(&pending.partial),
            fired = outcome.is_match(),
            "chord timed out"
        );
        Some(outcome)
    }

    /// Drop any pending chord.
    pub fn cancel(&mut self) {
        if let ResolverState::Pending(pending) = std::mem::take(&mut self.state) {
            tracing::debug!(
                partial = %format_sequence(&pending.partial),
                "chord cancelled"
            );
        }
    }

    /// Whether a chord is in progress.
    #[must_use]
    pub fn is_pending(&self) -> bool {
        matches!(self.state, ResolverState::Pending(_))
    }

    /// Keystrokes of the chord in progress, empty when idle.
    #[must_use]
    pub fn pending_keystrokes(&self) -> &[Keystroke] {
        match &self.state {
            ResolverState::Pending(pending) => &pending.partial,
            ResolverState::Idle => &[],
        }
    }

    /// When the pending chord times out, if one is in progress.
    ///
    /// `None` when idle, or when the timeout is too large for the clock to
    /// represent; such a chord only resolves by further input or `cancel`.
    #[must_use]
    pub fn deadline(&self) -> Option<Instant> {
        match &self.state {
            ResolverState::Pending(pending) => pending.started_at.checked_add(self.config.chord_timeout),
            ResolverState::Idle => None,
        }
    }

    #[must_use]
    pub fn config(&self) -> &ResolverConfig {
        &self.config
    }

    /// Update the configuration.
    ///
    /// Does not reset pending state.
    pub fn set_config(&mut self, config: ResolverConfig) {
        self.config = config;
    }

    #[must_use]
    pub fn keymap(&self) -> &Arc<SharedKeymap> {
        &self.keymap
    }

    fn expired(&self, pending: &PendingChord, now: Instant) -> bool {
        now.saturating_duration_since(pending.started_at) > self.config.chord_timeout
    }

    /// Handle the first keystroke of a potential chord.
    fn start(&mut self, keystroke: &Keystroke, stack: &ContextStack, now: Instant) -> Outcome {
        let keymap = self.keymap.load_ref();
        let (exact, longer): (Vec<Candidate>, Vec<Candidate>) = keymap
            .candidates(stack)
            .into_iter()
            .filter(|c| c.binding.sequence()[0] == *keystroke)
            .partition(|c| c.binding.len() == 1);

        tracing::trace!(
            keystroke = %keystroke,
            exact = exact.len(),
            longer = longer.len(),
            "resolving keystroke"
        );

        if longer.is_empty() {
            return match exact.into_iter().next() {
                Some(winner) => {
                    tracing::debug!(keystroke = %keystroke, action = %winner.binding.action().id(), "binding matched");
                    Outcome::Matched(winner.binding.action().clone())
                }
                None => Outcome::NoMatch,
            };
        }

        tracing::debug!(keystroke = %keystroke, candidates = longer.len(), "chord pending");
        self.state = ResolverState::Pending(PendingChord {
            partial: vec![*keystroke],
            started_at: now,
            candidates: longer,
            exact: exact.into_iter().next(),
        });
        Outcome::Pending
    }

    /// Extend a pending chord with the next keystroke.
    fn advance(&mut self, mut pending: PendingChord, keystroke: &Keystroke, stack: &ContextStack) -> Outcome {
        let position = pending.partial.len();
        pending.partial.push(*keystroke);

        pending
            .candidates
            .retain(|c| c.binding.sequence().get(position) == Some(keystroke));
        rank_candidates(&mut pending.candidates, stack);
        if let Some(exact) = &pending.exact
            && !exact.binding.predicate().evaluate(stack)
        {
            pending.exact = None;
        }

        let (exact, longer): (Vec<Candidate>, Vec<Candidate>) = pending
            .candidates
            .into_iter()
            .partition(|c| c.binding.len() == pending.partial.len());

        tracing::trace!(
            partial = %format_sequence(&pending.partial),
            exact = exact.len(),
            longer = longer.len(),
            "advancing chord"
        );

        if longer.is_empty() {
            return match exact.into_iter().next() {
                Some(winner) => {
                    tracing::debug!(
                        partial = %format_sequence(&pending.partial),
                        action = %winner.binding.action().id(),
                        "chord matched"
                    );
                    Outcome::Matched(winner.binding.action().clone())
                }
                None => {
                    tracing::debug!(partial = %format_sequence(&pending.partial), "chord broken");
                    Outcome::NoMatch
                }
            };
        }

        self.state = ResolverState::Pending(PendingChord {
            partial: pending.partial,
            started_at: pending.started_at,
            candidates: longer,
            exact: exact.into_iter().next().or(pending.exact),
        });
        Outcome::Pending
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::{ImeEvent, ImePhase, KeyCode, KeyEvent, Modifiers, ModifiersChangedEvent};
    use crate::keymap::KeyBinding;

    const MS_100: Duration = Duration::from_millis(100);
    const MS_500: Duration = Duration::from_millis(500);

    fn now() -> Instant {
        Instant::now()
    }

    fn ks(text: &str) -> Keystroke {
        Keystroke::parse(text).unwrap()
    }

    fn resolver(bindings: &[(&str, &str, &str)]) -> Resolver {
        let keymap = Arc::new(SharedKeymap::default());
        keymap.clear_and_replace(
            bindings
                .iter()
                .map(|(keys, action, context)| KeyBinding::parse(keys, *action, context).unwrap()),
        );
        Resolver::with_defaults(keymap)
    }

    fn matched(id: &str) -> Outcome {
        Outcome::Matched(Action::new(id))
    }

    fn editor() -> ContextStack {
        ContextStack::from_labels(["editor"])
    }

    // --- Single keystrokes ---

    #[test]
    fn single_key_matches_immediately() {
        let mut r = resolver(&[("ctrl-s", "save", "editor")]);
        assert_eq!(r.dispatch(&ks("ctrl-s"), &editor(), now()), matched("save"));
        assert!(!r.is_pending());
    }

    #[test]
    fn unbound_key_is_no_match() {
        let mut r = resolver(&[("ctrl-s", "save", "")]);
        assert_eq!(r.dispatch(&ks("ctrl-x"), &editor(), now()), Outcome::NoMatch);
        assert!(!r.is_pending());
    }

    #[test]
    fn predicate_failure_is_no_match() {
        let mut r = resolver(&[("ctrl-s", "save", "terminal")]);
        assert_eq!(r.dispatch(&ks("ctrl-s"), &editor(), now()), Outcome::NoMatch);
    }

    #[test]
    fn modifiers_must_match_exactly() {
        let mut r = resolver(&[("ctrl-s", "save", "")]);
        assert_eq!(
            r.dispatch(&ks("ctrl-shift-s"), &editor(), now()),
            Outcome::NoMatch
        );
    }

    #[test]
    fn payload_travels_with_match() {
        let keymap = Arc::new(SharedKeymap::default());
        keymap.clear_and_replace([KeyBinding::parse("ctrl-1", "pane::Activate", "")
            .unwrap()
            .with_payload("1")]);
        let mut r = Resolver::with_defaults(keymap);

        let outcome = r.dispatch(&ks("ctrl-1"), &editor(), now());
        assert_eq!(outcome.action().and_then(Action::payload), Some("1"));
    }

    #[test]
    fn unknown_key_never_matches() {
        let mut r = resolver(&[("a b", "ab", "")]);
        let t = now();
        assert_eq!(r.dispatch(&ks("a"), &editor(), t), Outcome::Pending);

        let unknown = Keystroke::new(KeyCode::Unknown, Modifiers::NONE);
        assert_eq!(r.dispatch(&unknown, &editor(), t + MS_100), Outcome::NoMatch);
        assert!(!r.is_pending());
    }

    // --- Chords ---

    #[test]
    fn two_key_chord() {
        let mut r = resolver(&[("ctrl-k ctrl-s", "save_all", "editor")]);
        let t = now();

        assert_eq!(r.dispatch(&ks("ctrl-k"), &editor(), t), Outcome::Pending);
        assert_eq!(r.pending_keystrokes(), &[ks("ctrl-k")]);
        assert_eq!(
            r.dispatch(&ks("ctrl-s"), &editor(), t + MS_100),
            matched("save_all")
        );
        assert!(!r.is_pending());
        assert!(r.pending_keystrokes().is_empty());
    }

    #[test]
    fn three_key_chord() {
        let mut r = resolver(&[("g g g", "triple", "")]);
        let t = now();

        assert_eq!(r.dispatch(&ks("g"), &editor(), t), Outcome::Pending);
        assert_eq!(r.dispatch(&ks("g"), &editor(), t + MS_100), Outcome::Pending);
        assert_eq!(r.dispatch(&ks("g"), &editor(), t + MS_100 * 2), matched("triple"));
    }

    #[test]
    fn wrong_second_key_discards_whole_chord() {
        let mut r = resolver(&[("ctrl-k ctrl-s", "save_all", ""), ("x", "cut", "")]);
        let t = now();

        r.dispatch(&ks("ctrl-k"), &editor(), t);
        // `x` alone is bound, but a broken chord does not retry its suffix.
        assert_eq!(r.dispatch(&ks("x"), &editor(), t + MS_100), Outcome::NoMatch);
        assert!(!r.is_pending());

        assert_eq!(r.dispatch(&ks("x"), &editor(), t + MS_500), matched("cut"));
    }

    #[test]
    fn sibling_chords_disambiguate_on_second_key() {
        let mut r = resolver(&[("g g", "top", ""), ("g e", "end", "")]);
        let t = now();

        assert_eq!(r.dispatch(&ks("g"), &editor(), t), Outcome::Pending);
        assert_eq!(r.dispatch(&ks("e"), &editor(), t + MS_100), matched("end"));

        assert_eq!(r.dispatch(&ks("g"), &editor(), t + MS_500), Outcome::Pending);
        assert_eq!(r.dispatch(&ks("g"), &editor(), t + MS_500 + MS_100), matched("top"));
    }

    // --- Prefix ambiguity and timeout ---

    #[test]
    fn prefix_ambiguity_waits_then_fires_exact_on_timeout() {
        let mut r = resolver(&[("a b", "A", ""), ("a", "B", "")]);
        let t = now();

        assert_eq!(r.dispatch(&ks("a"), &editor(), t), Outcome::Pending);
        assert_eq!(r.check_timeout(t + MS_500), None);
        assert!(r.is_pending());

        let fired = r.check_timeout(t + Duration::from_millis(1001));
        assert_eq!(fired, Some(matched("B")));
        assert!(!r.is_pending());
    }

    #[test]
    fn prefix_ambiguity_resolves_to_longer_chord_when_completed() {
        let mut r = resolver(&[("a b", "A", ""), ("a", "B", "")]);
        let t = now();

        r.dispatch(&ks("a"), &editor(), t);
        assert_eq!(r.dispatch(&ks("b"), &editor(), t + MS_100), matched("A"));
    }

    #[test]
    fn timeout_without_exact_is_no_match() {
        let mut r = resolver(&[("a b", "A", "")]);
        let t = now();

        r.dispatch(&ks("a"), &editor(), t);
        assert_eq!(
            r.check_timeout(t + Duration::from_millis(1001)),
            Some(Outcome::NoMatch)
        );
        assert!(!r.is_pending());
    }

    #[test]
    fn timeout_boundary_is_inclusive() {
        let mut r = resolver(&[("a b", "A", "")]);
        let t = now();

        r.dispatch(&ks("a"), &editor(), t);
        assert_eq!(r.check_timeout(t + Duration::from_millis(1000)), None);
        assert_eq!(
            r.dispatch(&ks("b"), &editor(), t + Duration::from_millis(1000)),
            matched("A")
        );
    }

    #[test]
    fn timeout_measured_from_chord_start() {
        let mut r = resolver(&[("a b c", "ABC", "")]);
        let t = now();

        r.dispatch(&ks("a"), &editor(), t);
        r.dispatch(&ks("b"), &editor(), t + Duration::from_millis(900));
        assert_eq!(
            r.deadline(),
            Some(t + Duration::from_millis(DEFAULT_CHORD_TIMEOUT_MS))
        );
        assert_eq!(
            r.check_timeout(t + Duration::from_millis(1001)),
            Some(Outcome::NoMatch)
        );
    }

    #[test]
    fn remembered_exact_survives_intermediate_key() {
        let mut r = resolver(&[("a", "A", ""), ("a b c", "ABC", "")]);
        let t = now();

        r.dispatch(&ks("a"), &editor(), t);
        assert_eq!(r.dispatch(&ks("b"), &editor(), t + MS_100), Outcome::Pending);
        assert_eq!(
            r.check_timeout(t + Duration::from_millis(1001)),
            Some(matched("A"))
        );
    }

    #[test]
    fn longer_exact_replaces_remembered_match() {
        let mut r = resolver(&[("a", "A", ""), ("a b", "AB", ""), ("a b c", "ABC", "")]);
        let t = now();

        r.dispatch(&ks("a"), &editor(), t);
        r.dispatch(&ks("b"), &editor(), t + MS_100);
        assert_eq!(
            r.check_timeout(t + Duration::from_millis(1001)),
            Some(matched("AB"))
        );
    }

    #[test]
    fn stale_chord_discarded_on_late_keystroke() {
        let mut r = resolver(&[("a b", "A", ""), ("c", "C", "")]);
        let t = now();

        r.dispatch(&ks("a"), &editor(), t);
        // No check_timeout call; the next key arrives after the window.
        assert_eq!(
            r.dispatch(&ks("c"), &editor(), t + Duration::from_millis(1500)),
            matched("C")
        );
        assert!(!r.is_pending());
    }

    #[test]
    fn stale_chord_restarts_with_new_prefix() {
        let mut r = resolver(&[("a b", "A", "")]);
        let t = now();

        r.dispatch(&ks("a"), &editor(), t);
        let late = t + Duration::from_millis(1500);
        assert_eq!(r.dispatch(&ks("a"), &editor(), late), Outcome::Pending);
        assert_eq!(r.deadline(), Some(late + Duration::from_millis(1000)));
    }

    #[test]
    fn unrepresentable_deadline_is_none() {
        let mut r = resolver(&[("a b", "A", "")]);
        r.set_config(ResolverConfig::default().with_timeout(Duration::MAX));
        let t = now();

        assert_eq!(r.dispatch(&ks("a"), &editor(), t), Outcome::Pending);
        assert_eq!(r.deadline(), None);
        assert!(r.is_pending());
        assert_eq!(r.check_timeout(t + Duration::from_secs(3600)), None);
        assert_eq!(r.dispatch(&ks("b"), &editor(), t + Duration::from_secs(3600)), matched("A"));
    }

    #[test]
    fn check_timeout_idle_is_none() {
        let mut r = resolver(&[("a", "A", "")]);
        assert_eq!(r.check_timeout(now()), None);
        assert_eq!(r.deadline(), None);
    }

    // --- Context handling ---

    #[test]
    fn inner_context_wins() {
        let mut r = resolver(&[("enter", "inner", "editor.input"), ("enter", "outer", "editor")]);
        let stack = ContextStack::from_labels(["editor.input", "editor"]);
        assert_eq!(r.dispatch(&ks("enter"), &stack, now()), matched("inner"));
    }

    #[test]
    fn multiple_exact_candidates_pick_highest_precedence() {
        let mut r = resolver(&[("enter", "global", ""), ("enter", "editor", "editor")]);
        assert_eq!(r.dispatch(&ks("enter"), &editor(), now()), matched("editor"));
        assert!(!r.is_pending());
    }

    #[test]
    fn context_change_mid_chord_cancels() {
        let mut r = resolver(&[("a b", "A", "editor")]);
        let t = now();

        assert_eq!(r.dispatch(&ks("a"), &editor(), t), Outcome::Pending);
        let terminal = ContextStack::from_labels(["terminal"]);
        assert_eq!(r.dispatch(&ks("b"), &terminal, t + MS_100), Outcome::NoMatch);
        assert!(!r.is_pending());
    }

    #[test]
    fn context_change_drops_remembered_exact() {
        let mut r = resolver(&[("a", "A", "editor"), ("a b c", "ABC", "")]);
        let t = now();

        r.dispatch(&ks("a"), &editor(), t);
        let terminal = ContextStack::from_labels(["terminal"]);
        assert_eq!(r.dispatch(&ks("b"), &terminal, t + MS_100), Outcome::Pending);
        assert_eq!(
            r.check_timeout(t + Duration::from_millis(1001)),
            Some(Outcome::NoMatch)
        );
    }

    #[test]
    fn context_change_reranks_candidates() {
        let mut r = resolver(&[("a b", "panel", "panel"), ("a b", "editor", "editor")]);
        let t = now();

        let both = ContextStack::from_labels(["editor", "panel"]);
        r.dispatch(&ks("a"), &both, t);
        let flipped = ContextStack::from_labels(["panel", "editor"]);
        assert_eq!(r.dispatch(&ks("b"), &flipped, t + MS_100), matched("panel"));
    }

    // --- Cancel and reload ---

    #[test]
    fn cancel_clears_pending() {
        let mut r = resolver(&[("a b", "A", "")]);
        let t = now();

        r.dispatch(&ks("a"), &editor(), t);
        r.cancel();
        assert!(!r.is_pending());
        assert_eq!(r.check_timeout(t + Duration::from_secs(5)), None);
        assert_eq!(r.dispatch(&ks("b"), &editor(), t + MS_100), Outcome::NoMatch);
    }

    #[test]
    fn reload_mid_chord_keeps_pending_candidates() {
        let mut r = resolver(&[("a b", "A", "")]);
        let t = now();

        r.dispatch(&ks("a"), &editor(), t);
        r.keymap().clear_and_replace([KeyBinding::parse("z", "Z", "").unwrap()]);
        assert_eq!(r.dispatch(&ks("b"), &editor(), t + MS_100), matched("A"));

        // New chords see the new table.
        assert_eq!(r.dispatch(&ks("a"), &editor(), t + MS_500), Outcome::NoMatch);
        assert_eq!(r.dispatch(&ks("z"), &editor(), t + MS_500), matched("Z"));
    }

    // --- Raw events ---

    #[test]
    fn key_events_are_dispatched() {
        let mut r = resolver(&[("ctrl-shift-p", "palette", "")]);
        let event = Event::Key(KeyEvent::new(KeyCode::Char('P')).with_modifiers(Modifiers::CTRL));
        assert_eq!(r.dispatch_event(&event, &editor(), now()), matched("palette"));
    }

    #[test]
    fn key_release_is_ignored() {
        let mut r = resolver(&[("a b", "A", "")]);
        let t = now();

        r.dispatch(&ks("a"), &editor(), t);
        let release = Event::Key(KeyEvent::new(KeyCode::Char('a')).with_kind(KeyEventKind::Release));
        assert_eq!(r.dispatch_event(&release, &editor(), t), Outcome::NoMatch);
        assert!(r.is_pending());
    }

    #[test]
    fn modifier_tap_dispatches() {
        let mut r = resolver(&[("shift shift", "search_everywhere", "")]);
        let t = now();
        let down = Event::ModifiersChanged(ModifiersChangedEvent::new(Modifiers::NONE, Modifiers::SHIFT));
        let up = Event::ModifiersChanged(ModifiersChangedEvent::new(Modifiers::SHIFT, Modifiers::NONE));

        assert_eq!(r.dispatch_event(&down, &editor(), t), Outcome::NoMatch);
        assert_eq!(r.dispatch_event(&up, &editor(), t), Outcome::Pending);
        assert_eq!(r.dispatch_event(&down, &editor(), t + MS_100), Outcome::NoMatch);
        assert_eq!(
            r.dispatch_event(&up, &editor(), t + MS_100),
            matched("search_everywhere")
        );
    }

    #[test]
    fn modifier_used_with_key_is_not_a_tap() {
        let mut r = resolver(&[("shift", "tap", "")]);
        let t = now();
        let down = Event::ModifiersChanged(ModifiersChangedEvent::new(Modifiers::NONE, Modifiers::SHIFT));
        let key = Event::Key(KeyEvent::new(KeyCode::Char('A')));
        let up = Event::ModifiersChanged(ModifiersChangedEvent::new(Modifiers::SHIFT, Modifiers::NONE));

        r.dispatch_event(&down, &editor(), t);
        r.dispatch_event(&key, &editor(), t);
        assert_eq!(r.dispatch_event(&up, &editor(), t), Outcome::NoMatch);
    }

    #[test]
    fn focus_change_cancels_chord() {
        let mut r = resolver(&[("a b", "A", "")]);
        let t = now();

        r.dispatch(&ks("a"), &editor(), t);
        assert_eq!(r.dispatch_event(&Event::Focus(false), &editor(), t), Outcome::NoMatch);
        assert!(!r.is_pending());
    }

    #[test]
    fn ime_and_paste_pass_through_untouched() {
        let mut r = resolver(&[("a b", "A", "")]);
        let t = now();

        r.dispatch(&ks("a"), &editor(), t);
        let ime = Event::Ime(ImeEvent::new(ImePhase::Update, "に"));
        assert_eq!(r.dispatch_event(&ime, &editor(), t), Outcome::NoMatch);
        assert_eq!(
            r.dispatch_event(&Event::Paste("x".into()), &editor(), t),
            Outcome::NoMatch
        );
        assert!(r.is_pending());
    }

    // --- Outcome helpers ---

    #[test]
    fn outcome_helpers() {
        assert!(matched("x").is_match());
        assert!(matched("x").consumes_event());
        assert!(Outcome::Pending.consumes_event());
        assert!(!Outcome::NoMatch.consumes_event());
        assert_eq!(Outcome::Pending.action(), None);
    }

    // --- Config ---

    #[test]
    fn config_default_values() {
        let config = ResolverConfig::default();
        assert_eq!(config.chord_timeout, Duration::from_millis(1000));
        assert!(config.is_valid());
    }

    #[test]
    fn config_validation_clamps() {
        let high = ResolverConfig::default()
            .with_timeout(Duration::from_secs(60))
            .validated();
        assert_eq!(high.chord_timeout, Duration::from_millis(MAX_CHORD_TIMEOUT_MS));

        let low = ResolverConfig::default()
            .with_timeout(Duration::ZERO)
            .validated();
        assert_eq!(low.chord_timeout, Duration::from_millis(MIN_CHORD_TIMEOUT_MS));

        assert!(!ResolverConfig::default().with_timeout(Duration::ZERO).is_valid());
    }

    #[test]
    fn custom_timeout_applies() {
        let mut r = resolver(&[("a b", "A", ""), ("a", "B", "")]);
        r.set_config(ResolverConfig::default().with_timeout(Duration::from_millis(200)));
        let t = now();

        r.dispatch(&ks("a"), &editor(), t);
        assert_eq!(r.check_timeout(t + Duration::from_millis(201)), Some(matched("B")));
        assert_eq!(r.config().chord_timeout, Duration::from_millis(200));
    }

    #[test]
    fn deterministic_outcomes() {
        let script = ["ctrl-k", "ctrl-s", "x", "g", "g", "ctrl-k", "q"];
        let run = || {
            let mut r = resolver(&[
                ("ctrl-k ctrl-s", "save_all", ""),
                ("g g", "top", ""),
                ("x", "cut", ""),
            ]);
            let t = now();
            script
                .iter()
                .enumerate()
                .map(|(i, key)| r.dispatch(&ks(key), &editor(), t + MS_100 * i as u32))
                .collect::<Vec<_>>()
        };
        assert_eq!(run(), run());
    }

    #[tracing_test::traced_test]
    #[test]
    fn stale_chord_logs_dropped_match() {
        let mut r = resolver(&[("a b", "A", ""), ("a", "B", "")]);
        let t = now();

        r.dispatch(&ks("a"), &editor(), t);
        assert_eq!(
            r.dispatch(&ks("x"), &editor(), t + Duration::from_millis(1500)),
            Outcome::NoMatch
        );
        assert!(logs_contain("stale chord discarded"));
        assert!(logs_contain("dropped_match=true"));
    }

    #[tracing_test::traced_test]
    #[test]
    fn transitions_are_logged() {
        let mut r = resolver(&[("a b", "A", "")]);
        let t = now();

        r.dispatch(&ks("a"), &editor(), t);
        r.check_timeout(t + Duration::from_secs(2));
        assert!(logs_contain("chord pending"));
        assert!(logs_contain("chord timed out"));
    }
}

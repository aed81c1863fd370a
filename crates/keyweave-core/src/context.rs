#![forbid(unsafe_code)]

//! Context stacks and the predicates that gate bindings on them.
//!
//! The UI tree hands the resolver a [`ContextStack`] on every dispatch:
//! frames ordered from the focused element (innermost) out to the root.
//! A binding only applies while its [`ContextPredicate`] holds for that
//! stack.
//!
//! # Predicate grammar
//!
//! ```text
//! expr   := or
//! or     := and ( "||" and )*
//! and    := unary ( "&&" unary )*
//! unary  := "!" unary | "(" expr ")" | term
//! term   := "*" | ident ( "[" ident ( "=" | "!=" ) value "]" )?
//! ```
//!
//! An empty predicate or `*` always holds. Labels and values may contain
//! alphanumerics, `_`, `-` and `.`, so `editor.input` is a single label.
//! Nesting is capped at [`MAX_PREDICATE_DEPTH`] and the term count at
//! [`MAX_PREDICATE_TERMS`].
//!
//! ```
//! use keyweave_core::context::{ContextFrame, ContextPredicate, ContextStack};
//!
//! let stack = ContextStack::new()
//!     .with(ContextFrame::new("editor.input"))
//!     .with(ContextFrame::new("editor").with_attribute("mode", "vim"));
//!
//! let pred: ContextPredicate = "editor[mode=vim] && !terminal".parse().unwrap();
//! assert!(pred.evaluate(&stack));
//! ```
//!
//! # Evaluation
//!
//! Evaluation is pure and total. A label term holds if any frame carries the
//! label. An attribute term holds if a frame carrying the label also carries
//! the attribute with the given value. Unknown labels or attributes simply
//! evaluate to false.
//!
//! # Specificity
//!
//! Satisfied positive terms anchor a predicate to the innermost frame they
//! touched. Bindings anchored closer to the focused element outrank those
//! anchored further out; `*` and purely negated predicates rank lowest.

use std::fmt;
use std::str::FromStr;

use ahash::AHashMap;

use crate::error::ParseError;

// ---------------------------------------------------------------------------
// Context Stack
// ---------------------------------------------------------------------------

/// One UI scope: a label plus string attributes.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ContextFrame {
    label: String,
    attributes: AHashMap<String, String>,
}

impl ContextFrame {
    #[must_use]
    pub fn new(label: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            attributes: AHashMap::new(),
        }
    }

    #[must_use]
    pub fn with_attribute(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.set(key, value);
        self
    }

    pub fn set(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.attributes.insert(key.into(), value.into());
    }

    #[must_use]
    pub fn label(&self) -> &str {
        &self.label
    }

    #[must_use]
    pub fn attribute(&self, key: &str) -> Option<&str> {
        self.attributes.get(key).map(String::as_str)
    }
}

/// Ordered context frames, innermost (focused) first.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ContextStack {
    frames: Vec<ContextFrame>,
}

impl ContextStack {
    /// An empty stack. Only `*` predicates hold against it.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a stack of attribute-less frames, innermost first.
    #[must_use]
    pub fn from_labels<I, S>(labels: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            frames: labels.into_iter().map(ContextFrame::new).collect(),
        }
    }

    /// Append `frame` outside the current outermost frame.
    #[must_use]
    pub fn with(mut self, frame: ContextFrame) -> Self {
        self.push(frame);
        self
    }

    /// Append `frame` outside the current outermost frame.
    pub fn push(&mut self, frame: ContextFrame) {
        self.frames.push(frame);
    }

    #[must_use]
    pub fn frames(&self) -> &[ContextFrame] {
        &self.frames
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.frames.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    /// Index of the innermost frame carrying `label`.
    #[must_use]
    pub fn position(&self, label: &str) -> Option<usize> {
        self.frames.iter().position(|frame| frame.label == label)
    }
}

// ---------------------------------------------------------------------------
// Predicates
// ---------------------------------------------------------------------------

/// Comparison used by an attribute term.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AttributeOp {
    Eq,
    Ne,
}

/// Boolean expression over context labels and attributes.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub enum ContextPredicate {
    /// Holds for every stack, including an empty one.
    #[default]
    Always,

    /// Some frame carries this label.
    Label(String),

    /// A frame with `label` carries `key` compared to `value` by `op`.
    Attribute {
        label: String,
        key: String,
        op: AttributeOp,
        value: String,
    },

    Not(Box<ContextPredicate>),
    And(Box<ContextPredicate>, Box<ContextPredicate>),
    Or(Box<ContextPredicate>, Box<ContextPredicate>),
}

impl ContextPredicate {
    /// Parse predicate text.
    ///
    /// # Errors
    ///
    /// Returns [`ParseError::MalformedPredicate`] with the byte offset of the
    /// first token that does not fit the grammar.
    pub fn parse(text: &str) -> Result<Self, ParseError> {
        let trimmed = text.trim();
        if trimmed.is_empty() || trimmed == "*" {
            return Ok(Self::Always);
        }
        let mut parser = Parser::new(text);
        let predicate = parser.parse_or()?;
        parser.skip_ws();
        if !parser.at_end() {
            return Err(parser.error("unexpected trailing input"));
        }
        Ok(predicate)
    }

    #[must_use]
    pub fn label(label: impl Into<String>) -> Self {
        Self::Label(label.into())
    }

    #[must_use]
    pub fn attribute(
        label: impl Into<String>,
        key: impl Into<String>,
        value: impl Into<String>,
    ) -> Self {
        Self::Attribute {
            label: label.into(),
            key: key.into(),
            op: AttributeOp::Eq,
            value: value.into(),
        }
    }

    #[must_use]
    pub fn and(self, other: Self) -> Self {
        Self::And(Box::new(self), Box::new(other))
    }

    #[must_use]
    pub fn or(self, other: Self) -> Self {
        Self::Or(Box::new(self), Box::new(other))
    }

    #[must_use]
    pub fn negate(self) -> Self {
        Self::Not(Box::new(self))
    }

    /// Whether the predicate holds for `stack`.
    #[must_use]
    pub fn evaluate(&self, stack: &ContextStack) -> bool {
        match self {
            Self::Always => true,
            Self::Label(label) => stack.position(label).is_some(),
            Self::Attribute { .. } => self.attribute_frame(stack).is_some(),
            Self::Not(inner) => !inner.evaluate(stack),
            Self::And(lhs, rhs) => lhs.evaluate(stack) && rhs.evaluate(stack),
            Self::Or(lhs, rhs) => lhs.evaluate(stack) || rhs.evaluate(stack),
        }
    }

    /// Precedence rank against `stack`, or `None` if the predicate fails.
    ///
    /// A predicate anchored to frame `i` ranks `stack.len() - i`, so the
    /// focused frame ranks highest. Unanchored predicates rank `0`.
    #[must_use]
    pub fn specificity(&self, stack: &ContextStack) -> Option<usize> {
        if !self.evaluate(stack) {
            return None;
        }
        Some(match self.anchor(stack) {
            Some(index) => stack.len() - index,
            None => 0,
        })
    }

    /// Innermost frame touched by a satisfied positive term.
    ///
    /// Only meaningful when `self.evaluate(stack)` holds.
    fn anchor(&self, stack: &ContextStack) -> Option<usize> {
        match self {
            Self::Always | Self::Not(_) => None,
            Self::Label(label) => stack.position(label),
            Self::Attribute { .. } => self.attribute_frame(stack),
            Self::And(lhs, rhs) => min_anchor(lhs.anchor(stack), rhs.anchor(stack)),
            Self::Or(lhs, rhs) => {
                let left = lhs.evaluate(stack).then(|| lhs.anchor(stack)).flatten();
                let right = rhs.evaluate(stack).then(|| rhs.anchor(stack)).flatten();
                min_anchor(left, right)
            }
        }
    }

    fn attribute_frame(&self, stack: &ContextStack) -> Option<usize> {
        let Self::Attribute {
            label,
            key,
            op,
            value,
        } = self
        else {
            return None;
        };
        stack.frames.iter().position(|frame| {
            frame.label == *label
                && match (op, frame.attribute(key)) {
                    (AttributeOp::Eq, Some(found)) => found == value,
                    (AttributeOp::Ne, Some(found)) => found != value,
                    (_, None) => false,
                }
        })
    }
}

fn min_anchor(a: Option<usize>, b: Option<usize>) -> Option<usize> {
    match (a, b) {
        (Some(a), Some(b)) => Some(a.min(b)),
        (a, None) => a,
        (None, b) => b,
    }
}

impl FromStr for ContextPredicate {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl fmt::Display for ContextPredicate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Always => f.write_str("*"),
            Self::Label(label) => f.write_str(label),
            Self::Attribute {
                label,
                key,
                op,
                value,
            } => {
                let op = match op {
                    AttributeOp::Eq => "=",
                    AttributeOp::Ne => "!=",
                };
                write!(f, "{label}[{key}{op}{value}]")
            }
            Self::Not(inner) => match inner.as_ref() {
                Self::And(..) | Self::Or(..) => write!(f, "!({inner})"),
                _ => write!(f, "!{inner}"),
            },
            Self::And(lhs, rhs) => {
                write_operand(f, lhs)?;
                f.write_str(" && ")?;
                write_operand(f, rhs)
            }
            Self::Or(lhs, rhs) => write!(f, "{lhs} || {rhs}"),
        }
    }
}

fn write_operand(f: &mut fmt::Formatter<'_>, operand: &ContextPredicate) -> fmt::Result {
    match operand {
        ContextPredicate::Or(..) => write!(f, "({operand})"),
        _ => write!(f, "{operand}"),
    }
}

// ---------------------------------------------------------------------------
// Parser
// ---------------------------------------------------------------------------

/// Deepest `!`/`(` nesting accepted by the parser.
pub const MAX_PREDICATE_DEPTH: usize = 64;

/// Most terms accepted in one predicate. Bounds the height of the
/// `&&`/`||` chains, which evaluation walks recursively.
pub const MAX_PREDICATE_TERMS: usize = 256;

struct Parser<'a> {
    input: &'a str,
    pos: usize,
    depth: usize,
    terms: usize,
}

impl<'a> Parser<'a> {
    fn new(input: &'a str) -> Self {
        Self {
            input,
            pos: 0,
            depth: 0,
            terms: 0,
        }
    }

    fn rest(&self) -> &'a str {
        &self.input[self.pos..]
    }

    fn at_end(&self) -> bool {
        self.pos >= self.input.len()
    }

    fn skip_ws(&mut self) {
        let rest = self.rest();
        self.pos += rest.len() - rest.trim_start().len();
    }

    fn eat(&mut self, token: &str) -> bool {
        if self.rest().starts_with(token) {
            self.pos += token.len();
            true
        } else {
            false
        }
    }

    fn error(&self, reason: &'static str) -> ParseError {
        ParseError::MalformedPredicate {
            input: self.input.to_string(),
            position: self.pos,
            reason,
        }
    }

    fn parse_or(&mut self) -> Result<ContextPredicate, ParseError> {
        let mut lhs = self.parse_and()?;
        loop {
            self.skip_ws();
            if !self.eat("||") {
                return Ok(lhs);
            }
            let rhs = self.parse_and()?;
            lhs = lhs.or(rhs);
        }
    }

    fn parse_and(&mut self) -> Result<ContextPredicate, ParseError> {
        let mut lhs = self.parse_unary()?;
        loop {
            self.skip_ws();
            if !self.eat("&&") {
                return Ok(lhs);
            }
            let rhs = self.parse_unary()?;
            lhs = lhs.and(rhs);
        }
    }

    fn parse_unary(&mut self) -> Result<ContextPredicate, ParseError> {
        self.skip_ws();
        if self.eat("!") {
            self.descend()?;
            let inner = self.parse_unary()?;
            self.depth -= 1;
            return Ok(inner.negate());
        }
        if self.eat("(") {
            self.descend()?;
            let inner = self.parse_or()?;
            self.depth -= 1;
            self.skip_ws();
            if !self.eat(")") {
                return Err(self.error("expected ')'"));
            }
            return Ok(inner);
        }
        self.parse_term()
    }

    fn descend(&mut self) -> Result<(), ParseError> {
        self.depth += 1;
        if self.depth > MAX_PREDICATE_DEPTH {
            return Err(self.error("predicate nested too deeply"));
        }
        Ok(())
    }

    fn parse_term(&mut self) -> Result<ContextPredicate, ParseError> {
        self.terms += 1;
        if self.terms > MAX_PREDICATE_TERMS {
            return Err(self.error("predicate has too many terms"));
        }
        if self.eat("*") {
            return Ok(ContextPredicate::Always);
        }
        let label = self.ident("expected a context label")?;
        self.skip_ws();
        if !self.eat("[") {
            return Ok(ContextPredicate::Label(label));
        }

        self.skip_ws();
        let key = self.ident("expected an attribute name")?;
        self.skip_ws();
        let op = if self.eat("!=") {
            AttributeOp::Ne
        } else if self.eat("==") || self.eat("=") {
            AttributeOp::Eq
        } else {
            return Err(self.error("expected '=' or '!='"));
        };
        self.skip_ws();
        let value = self.ident("expected an attribute value")?;
        self.skip_ws();
        if !self.eat("]") {
            return Err(self.error("expected ']'"));
        }
        Ok(ContextPredicate::Attribute {
            label,
            key,
            op,
            value,
        })
    }

    fn ident(&mut self, reason: &'static str) -> Result<String, ParseError> {
        let rest = self.rest();
        let len = rest
            .find(|c: char| !(c.is_alphanumeric() || matches!(c, '_' | '-' | '.')))
            .unwrap_or(rest.len());
        if len == 0 {
            return Err(self.error(reason));
        }
        self.pos += len;
        Ok(rest[..len].to_string())
    }
}

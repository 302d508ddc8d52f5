//! Routing vocabulary: context keys, route tokens, stacks and navigation
//! requests.

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize, Serializer};

use crate::error::StoreError;

/// Identifier of an independent navigation context (for example a tab).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ContextKey(String);

impl ContextKey {
    /// Creates a context key.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Validation`] if `key` is blank.
    pub fn new(key: impl Into<String>) -> Result<Self, StoreError> {
        let key = key.into();
        let trimmed = key.trim();
        if trimmed.is_empty() {
            return Err(StoreError::validation("context key must not be empty"));
        }
        Ok(Self(trimmed.to_string()))
    }

    /// Returns the key as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for ContextKey {
    type Error = StoreError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<ContextKey> for String {
    fn from(key: ContextKey) -> Self {
        key.0
    }
}

impl fmt::Display for ContextKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// One entry of a navigation stack (a screen or route path).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct RouteToken(String);

impl RouteToken {
    /// Creates a route token.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Validation`] if `token` is blank.
    pub fn new(token: impl Into<String>) -> Result<Self, StoreError> {
        let token = token.into();
        if token.trim().is_empty() {
            return Err(StoreError::validation("route token must not be empty"));
        }
        Ok(Self(token))
    }

    /// Returns the token as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for RouteToken {
    type Error = StoreError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<RouteToken> for String {
    fn from(token: RouteToken) -> Self {
        token.0
    }
}

impl fmt::Display for RouteToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Immutable navigation stack.
///
/// Every change produces a new stack; existing snapshots keep the sequence
/// they were built with. Cloning shares the underlying storage.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RouteStack(Arc<Vec<RouteToken>>);

impl RouteStack {
    /// Creates a stack from tokens, bottom first.
    #[must_use]
    pub fn from_tokens(tokens: Vec<RouteToken>) -> Self {
        Self(Arc::new(tokens))
    }

    /// Returns the tokens, bottom first.
    #[must_use]
    pub fn tokens(&self) -> &[RouteToken] {
        self.0.as_slice()
    }

    /// Returns the top of the stack.
    #[must_use]
    pub fn top(&self) -> Option<&RouteToken> {
        self.0.last()
    }

    /// Returns the depth of the stack.
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Returns `true` if the stack is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Returns a new stack with `token` appended.
    #[must_use]
    pub fn pushed(&self, token: RouteToken) -> Self {
        let mut tokens = Vec::with_capacity(self.len().saturating_add(1));
        tokens.extend_from_slice(self.tokens());
        tokens.push(token);
        Self::from_tokens(tokens)
    }

    /// Returns a new stack without its top, or `None` if empty.
    #[must_use]
    pub fn popped(&self) -> Option<Self> {
        let (_, rest) = self.tokens().split_last()?;
        Some(Self::from_tokens(rest.to_vec()))
    }

    /// Returns `true` if both stacks share the same storage.
    #[must_use]
    pub fn shares_storage_with(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

impl Serialize for RouteStack {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.tokens().serialize(serializer)
    }
}

/// What a navigation request asks the router to do.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "action", content = "route", rename_all = "snake_case")]
pub enum NavigationAction {
    /// Push a route onto the context's stack.
    Push(RouteToken),
    /// Pop the top route.
    Pop,
    /// Replace the stack with a baseline (empty clears it).
    Reset(Vec<RouteToken>),
    /// Make the context the active one.
    Select,
}

/// Destination-agnostic navigation request raised by any producer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NavigationRequest {
    /// Context whose stack is affected.
    pub context: ContextKey,
    /// Requested change.
    pub action: NavigationAction,
}

impl NavigationRequest {
    /// Request to push `token` onto `context`.
    #[must_use]
    pub const fn push(context: ContextKey, token: RouteToken) -> Self {
        Self {
            context,
            action: NavigationAction::Push(token),
        }
    }

    /// Request to pop the top of `context`.
    #[must_use]
    pub const fn pop(context: ContextKey) -> Self {
        Self {
            context,
            action: NavigationAction::Pop,
        }
    }

    /// Request to replace the stack of `context` with `baseline`.
    #[must_use]
    pub const fn reset(context: ContextKey, baseline: Vec<RouteToken>) -> Self {
        Self {
            context,
            action: NavigationAction::Reset(baseline),
        }
    }
}

/// Events that may carry a navigation request.
///
/// The composition root forwards the request of every such event emitted
/// by a wired producer to the router.
pub trait Navigates {
    /// Returns the navigation request carried by this event, if any.
    fn navigation(&self) -> Option<NavigationRequest>;
}

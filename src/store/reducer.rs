//! Command-handling contract implemented by every bounded context.

use std::fmt;

use async_trait::async_trait;

use crate::error::StoreError;

/// Result of applying one command to the current state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Transition<S, E> {
    /// The command was valid but changes nothing: no commit, no emission.
    Unchanged,
    /// Replace the state with `next`, then emit `events` in order.
    Commit {
        /// The next snapshot.
        next: S,
        /// Events describing the change, emitted after the commit.
        events: Vec<E>,
    },
}

impl<S, E> Transition<S, E> {
    /// Shorthand for [`Transition::Unchanged`].
    #[must_use]
    pub const fn unchanged() -> Self {
        Self::Unchanged
    }

    /// Commits `next` and emits a single event.
    #[must_use]
    pub fn commit(next: S, event: E) -> Self {
        Self::Commit {
            next,
            events: vec![event],
        }
    }

    /// Commits `next` and emits `events` (possibly none).
    #[must_use]
    pub fn commit_all(next: S, events: Vec<E>) -> Self {
        Self::Commit { next, events }
    }

    /// Returns `true` for [`Transition::Commit`].
    #[must_use]
    pub const fn is_commit(&self) -> bool {
        matches!(self, Self::Commit { .. })
    }
}

/// Domain logic of one store.
///
/// `reduce` sees an immutable snapshot and returns the next one; it never
/// mutates shared state. The owning [`super::Store`] guarantees that calls
/// never interleave, so a reducer may await injected clients freely.
#[async_trait]
pub trait Reducer: Send + Sync + 'static {
    /// Bounded-context name; also names the store's event channel.
    const CONTEXT: &'static str;

    /// Snapshot type.
    type State: Clone + fmt::Debug + Send + Sync + 'static;
    /// Command type accepted by `dispatch`.
    type Command: fmt::Debug + Send + 'static;
    /// Closed event type emitted after commits.
    type Event: fmt::Debug + Send + Sync + 'static;

    /// Validates `command` against `state` and computes the transition.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Validation`] for invalid commands and
    /// [`StoreError::Transient`] when an injected dependency fails.
    async fn reduce(
        &self,
        state: &Self::State,
        command: Self::Command,
    ) -> Result<Transition<Self::State, Self::Event>, StoreError>;

    /// Folds a transient failure into a new snapshot (typically by setting
    /// an error field). Returning `None` leaves the state untouched.
    fn record_failure(&self, _state: &Self::State, _error: &StoreError) -> Option<Self::State> {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn constructors() {
        let t: Transition<u8, &str> = Transition::commit(1, "a");
        assert!(t.is_commit());
        assert_eq!(
            t,
            Transition::Commit {
                next: 1,
                events: vec!["a"]
            }
        );
        let none: Transition<u8, &str> = Transition::unchanged();
        assert!(!none.is_commit());
        let silent: Transition<u8, &str> = Transition::commit_all(2, Vec::new());
        assert!(silent.is_commit());
    }
}

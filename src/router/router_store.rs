//! Navigation store: one independent route stack per context.
//!
//! The router is an ordinary [`Reducer`] run by an ordinary
//! [`crate::store::Store`]. Every successful mutation emits
//! [`RouterEvent::Navigated`] with the new stack so the presentation layer
//! can render navigation purely from state.

use std::collections::{BTreeMap, BTreeSet};

use async_trait::async_trait;
use serde::Serialize;

use super::route::{ContextKey, NavigationAction, NavigationRequest, RouteStack, RouteToken};
use crate::error::StoreError;
use crate::store::{Reducer, Store, StoreHandle, Transition};

/// Handle to a running router store.
pub type RouterStore = StoreHandle<RouterReducer>;

/// Snapshot of every navigation context.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RouterState {
    stacks: BTreeMap<ContextKey, RouteStack>,
    active: Option<ContextKey>,
}

impl RouterState {
    /// Creates a state with an empty stack per context; the first context
    /// becomes active.
    #[must_use]
    pub fn with_contexts(contexts: impl IntoIterator<Item = ContextKey>) -> Self {
        let stacks: BTreeMap<_, _> = contexts
            .into_iter()
            .map(|key| (key, RouteStack::default()))
            .collect();
        let active = stacks.keys().next().cloned();
        Self { stacks, active }
    }

    /// Returns the stack of `context`.
    #[must_use]
    pub fn stack(&self, context: &ContextKey) -> Option<&RouteStack> {
        self.stacks.get(context)
    }

    /// Returns the top route of `context`.
    #[must_use]
    pub fn top(&self, context: &ContextKey) -> Option<&RouteToken> {
        self.stacks.get(context).and_then(RouteStack::top)
    }

    /// Returns the active context.
    #[must_use]
    pub fn active(&self) -> Option<&ContextKey> {
        self.active.as_ref()
    }

    /// Iterates over the known contexts in key order.
    pub fn contexts(&self) -> impl Iterator<Item = &ContextKey> {
        self.stacks.keys()
    }

    fn with_stack(&self, context: ContextKey, stack: RouteStack) -> Self {
        let mut next = self.clone();
        next.stacks.insert(context, stack);
        next
    }
}

/// Commands accepted by the router.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RouterCommand {
    /// Append `token` to `context`'s stack.
    Push {
        /// Target context.
        context: ContextKey,
        /// Route to append.
        token: RouteToken,
    },
    /// Remove the top of `context`'s stack; no-op when empty.
    Pop {
        /// Target context.
        context: ContextKey,
    },
    /// Replace `context`'s stack with `baseline`.
    Reset {
        /// Target context.
        context: ContextKey,
        /// New stack contents, bottom first. Empty clears the stack.
        baseline: Vec<RouteToken>,
    },
    /// Make `context` the active one.
    Select {
        /// Context to activate.
        context: ContextKey,
    },
}

impl From<NavigationRequest> for RouterCommand {
    fn from(request: NavigationRequest) -> Self {
        let context = request.context;
        match request.action {
            NavigationAction::Push(token) => Self::Push { context, token },
            NavigationAction::Pop => Self::Pop { context },
            NavigationAction::Reset(baseline) => Self::Reset { context, baseline },
            NavigationAction::Select => Self::Select { context },
        }
    }
}

/// Events emitted by the router.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "event_type", rename_all = "snake_case")]
pub enum RouterEvent {
    /// A context's stack changed.
    Navigated {
        /// Context that changed.
        context: ContextKey,
        /// Its new stack.
        stack: RouteStack,
    },
    /// The active context changed.
    ContextSelected {
        /// Newly active context.
        context: ContextKey,
    },
}

impl RouterEvent {
    /// Returns the event type as a static string slice.
    #[must_use]
    pub const fn event_type_str(&self) -> &'static str {
        match self {
            Self::Navigated { .. } => "navigated",
            Self::ContextSelected { .. } => "context_selected",
        }
    }
}

/// Router rules: known contexts and maximum stack depth.
#[derive(Debug, Clone)]
pub struct RouterReducer {
    contexts: BTreeSet<ContextKey>,
    max_depth: usize,
}

impl RouterReducer {
    /// Creates router rules for `contexts` with a depth bound.
    #[must_use]
    pub fn new(contexts: impl IntoIterator<Item = ContextKey>, max_depth: usize) -> Self {
        Self {
            contexts: contexts.into_iter().collect(),
            max_depth,
        }
    }

    /// Initial state: one empty stack per known context.
    #[must_use]
    pub fn initial_state(&self) -> RouterState {
        RouterState::with_contexts(self.contexts.iter().cloned())
    }

    /// Starts a router store with the initial state.
    #[must_use]
    pub fn spawn(self, mailbox_capacity: usize) -> RouterStore {
        let initial = self.initial_state();
        Store::spawn(self, initial, mailbox_capacity)
    }

    fn current<'s>(
        &self,
        state: &'s RouterState,
        context: &ContextKey,
    ) -> Result<&'s RouteStack, StoreError> {
        state
            .stack(context)
            .ok_or_else(|| StoreError::validation(format!("unknown routing context {context}")))
    }

    fn check_depth(&self, depth: usize) -> Result<(), StoreError> {
        if depth > self.max_depth {
            return Err(StoreError::validation(format!(
                "stack depth {depth} exceeds limit {}",
                self.max_depth
            )));
        }
        Ok(())
    }
}

fn navigated(
    state: &RouterState,
    context: ContextKey,
    stack: RouteStack,
) -> Transition<RouterState, RouterEvent> {
    let next = state.with_stack(context.clone(), stack.clone());
    Transition::commit(next, RouterEvent::Navigated { context, stack })
}

#[async_trait]
impl Reducer for RouterReducer {
    const CONTEXT: &'static str = "router";
    type State = RouterState;
    type Command = RouterCommand;
    type Event = RouterEvent;

    async fn reduce(
        &self,
        state: &RouterState,
        command: RouterCommand,
    ) -> Result<Transition<RouterState, RouterEvent>, StoreError> {
        match command {
            RouterCommand::Push { context, token } => {
                let stack = self.current(state, &context)?;
                self.check_depth(stack.len().saturating_add(1))?;
                let stack = stack.pushed(token);
                Ok(navigated(state, context, stack))
            }
            RouterCommand::Pop { context } => {
                let stack = self.current(state, &context)?;
                match stack.popped() {
                    Some(stack) => Ok(navigated(state, context, stack)),
                    None => Ok(Transition::unchanged()),
                }
            }
            RouterCommand::Reset { context, baseline } => {
                let stack = self.current(state, &context)?;
                self.check_depth(baseline.len())?;
                if stack.tokens() == baseline.as_slice() {
                    return Ok(Transition::unchanged());
                }
                Ok(navigated(state, context, RouteStack::from_tokens(baseline)))
            }
            RouterCommand::Select { context } => {
                self.current(state, &context)?;
                if state.active.as_ref() == Some(&context) {
                    return Ok(Transition::unchanged());
                }
                let mut next = state.clone();
                next.active = Some(context.clone());
                Ok(Transition::commit(
                    next,
                    RouterEvent::ContextSelected { context },
                ))
            }
        }
    }
}

//! User profiles and their dependents.
//!
//! The user store is the producer in the enrollment flow: adding a
//! dependent emits [`UserEvent::DependentAdded`], which the insurance and
//! document stores react to without the user store knowing about them.

use std::collections::BTreeMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::ids::{DependentId, UserId};
use crate::error::StoreError;
use crate::store::{Reducer, Store, StoreHandle, Transition};

/// Handle to a running user store.
pub type UserStore = StoreHandle<UserReducer>;

/// How a dependent relates to the user.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Relationship {
    /// Spouse or partner.
    Spouse,
    /// Child.
    Child,
    /// Any other covered person.
    Other,
}

/// A person covered through a user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Dependent {
    /// Dependent identifier.
    pub id: DependentId,
    /// Display name.
    pub name: String,
    /// Relationship to the user.
    pub relationship: Relationship,
}

impl Dependent {
    /// Creates a dependent with a fresh identifier.
    pub fn new(name: impl Into<String>, relationship: Relationship) -> Self {
        Self {
            id: DependentId::new(),
            name: name.into(),
            relationship,
        }
    }
}

/// A registered user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UserProfile {
    /// User identifier.
    pub id: UserId,
    /// Display name.
    pub name: String,
    /// Dependents in insertion order.
    pub dependents: Vec<Dependent>,
    /// Registration timestamp.
    pub registered_at: DateTime<Utc>,
}

/// Snapshot of all users.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct UserState {
    users: BTreeMap<UserId, UserProfile>,
}

impl UserState {
    /// Returns a user profile.
    #[must_use]
    pub fn user(&self, id: UserId) -> Option<&UserProfile> {
        self.users.get(&id)
    }

    /// Returns the dependents of a user (empty for unknown users).
    #[must_use]
    pub fn dependents(&self, id: UserId) -> &[Dependent] {
        self.users
            .get(&id)
            .map(|user| user.dependents.as_slice())
            .unwrap_or_default()
    }

    /// Number of registered users.
    #[must_use]
    pub fn len(&self) -> usize {
        self.users.len()
    }

    /// Returns `true` if nobody is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.users.is_empty()
    }
}

/// Commands accepted by the user store.
#[derive(Debug, Clone)]
pub enum UserCommand {
    /// Register a new user.
    RegisterUser {
        /// Identifier chosen by the caller.
        user_id: UserId,
        /// Display name.
        name: String,
    },
    /// Attach a dependent to a user.
    AddDependent {
        /// Owning user.
        user_id: UserId,
        /// Dependent to add.
        dependent: Dependent,
    },
    /// Detach a dependent from a user.
    RemoveDependent {
        /// Owning user.
        user_id: UserId,
        /// Dependent to remove.
        dependent_id: DependentId,
    },
}

/// Events emitted by the user store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "event_type", rename_all = "snake_case")]
pub enum UserEvent {
    /// A user registered.
    UserRegistered {
        /// New user.
        user_id: UserId,
    },
    /// A dependent was attached.
    DependentAdded {
        /// Owning user.
        user_id: UserId,
        /// Added dependent.
        dependent_id: DependentId,
    },
    /// A dependent was detached.
    DependentRemoved {
        /// Owning user.
        user_id: UserId,
        /// Removed dependent.
        dependent_id: DependentId,
    },
}

impl UserEvent {
    /// Returns the user the event is about.
    #[must_use]
    pub const fn user_id(&self) -> UserId {
        match self {
            Self::UserRegistered { user_id }
            | Self::DependentAdded { user_id, .. }
            | Self::DependentRemoved { user_id, .. } => *user_id,
        }
    }

    /// Returns the event type as a static string slice.
    #[must_use]
    pub const fn event_type_str(&self) -> &'static str {
        match self {
            Self::UserRegistered { .. } => "user_registered",
            Self::DependentAdded { .. } => "dependent_added",
            Self::DependentRemoved { .. } => "dependent_removed",
        }
    }
}

/// User rules.
#[derive(Debug, Clone)]
pub struct UserReducer {
    max_dependents: usize,
}

impl UserReducer {
    /// Creates the reducer with a bound on dependents per user.
    #[must_use]
    pub const fn new(max_dependents: usize) -> Self {
        Self { max_dependents }
    }

    /// Starts a user store with no users.
    #[must_use]
    pub fn spawn(self, mailbox_capacity: usize) -> UserStore {
        Store::spawn(self, UserState::default(), mailbox_capacity)
    }
}

fn require_user(state: &UserState, user_id: UserId) -> Result<&UserProfile, StoreError> {
    state
        .users
        .get(&user_id)
        .ok_or_else(|| StoreError::validation(format!("unknown user {user_id}")))
}

fn with_profile(state: &UserState, profile: UserProfile) -> UserState {
    let mut next = state.clone();
    next.users.insert(profile.id, profile);
    next
}

#[async_trait]
impl Reducer for UserReducer {
    const CONTEXT: &'static str = "user";
    type State = UserState;
    type Command = UserCommand;
    type Event = UserEvent;

    async fn reduce(
        &self,
        state: &UserState,
        command: UserCommand,
    ) -> Result<Transition<UserState, UserEvent>, StoreError> {
        match command {
            UserCommand::RegisterUser { user_id, name } => {
                let name = name.trim();
                if name.is_empty() {
                    return Err(StoreError::validation("user name must not be empty"));
                }
                if state.users.contains_key(&user_id) {
                    return Err(StoreError::validation(format!(
                        "user {user_id} already registered"
                    )));
                }
                let profile = UserProfile {
                    id: user_id,
                    name: name.to_string(),
                    dependents: Vec::new(),
                    registered_at: Utc::now(),
                };
                Ok(Transition::commit(
                    with_profile(state, profile),
                    UserEvent::UserRegistered { user_id },
                ))
            }
            UserCommand::AddDependent { user_id, dependent } => {
                let user = require_user(state, user_id)?;
                if dependent.name.trim().is_empty() {
                    return Err(StoreError::validation("dependent name must not be empty"));
                }
                if user.dependents.iter().any(|d| d.id == dependent.id) {
                    return Err(StoreError::validation(format!(
                        "dependent {} already attached",
                        dependent.id
                    )));
                }
                if user.dependents.len() >= self.max_dependents {
                    return Err(StoreError::validation(format!(
                        "user {user_id} already has {} dependents",
                        self.max_dependents
                    )));
                }
                let dependent_id = dependent.id;
                let mut profile = user.clone();
                profile.dependents.push(dependent);
                Ok(Transition::commit(
                    with_profile(state, profile),
                    UserEvent::DependentAdded {
                        user_id,
                        dependent_id,
                    },
                ))
            }
            UserCommand::RemoveDependent {
                user_id,
                dependent_id,
            } => {
                let user = require_user(state, user_id)?;
                if !user.dependents.iter().any(|d| d.id == dependent_id) {
                    return Err(StoreError::validation(format!(
                        "dependent {dependent_id} not attached to {user_id}"
                    )));
                }
                let mut profile = user.clone();
                profile.dependents.retain(|d| d.id != dependent_id);
                Ok(Transition::commit(
                    with_profile(state, profile),
                    UserEvent::DependentRemoved {
                        user_id,
                        dependent_id,
                    },
                ))
            }
        }
    }
}

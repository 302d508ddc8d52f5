//! Insurance pricing per household.
//!
//! The insurance store mirrors household membership from user events and
//! keeps a quoted `insurance_rate` per policyholder. Quotes come from an
//! injected [`RateQuoteClient`]; failures are recorded in `last_error`.
//!
//! Membership changes and re-quoting are separate commands: a membership
//! change emits [`InsuranceEvent::HouseholdChanged`], and the composition
//! root wires that event back into this store as a
//! [`InsuranceCommand::Recalculate`]. A failed quote therefore never loses
//! the membership update, and `Recalculate` can simply be retried.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;

use super::ids::{DependentId, UserId};
use crate::clients::RateQuoteClient;
use crate::error::{ClientError, StoreError};
use crate::store::{Reducer, Store, StoreHandle, Transition};

/// Handle to a running insurance store.
pub type InsuranceStore = StoreHandle<InsuranceReducer>;

/// Monthly premium in cents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(transparent)]
pub struct Premium(u64);

impl Premium {
    /// Creates a premium from cents.
    #[must_use]
    pub const fn from_cents(cents: u64) -> Self {
        Self(cents)
    }

    /// Returns the amount in cents.
    #[must_use]
    pub const fn cents(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for Premium {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{:02}", self.0 / 100, self.0 % 100)
    }
}

/// Coverage of one policyholder.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Policy {
    /// Covered dependents.
    pub household: BTreeSet<DependentId>,
    /// Latest quoted premium; `None` until the first successful quote.
    pub insurance_rate: Option<Premium>,
    /// When the current rate was quoted.
    pub quoted_at: Option<DateTime<Utc>>,
}

impl Policy {
    /// Policyholder plus dependents.
    #[must_use]
    pub fn household_size(&self) -> usize {
        self.household.len().saturating_add(1)
    }
}

/// Snapshot of all policies.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct InsuranceState {
    policies: BTreeMap<UserId, Policy>,
    last_error: Option<String>,
}

impl InsuranceState {
    /// Returns the policy of a user.
    #[must_use]
    pub fn policy(&self, user_id: UserId) -> Option<&Policy> {
        self.policies.get(&user_id)
    }

    /// Returns the current rate of a user.
    #[must_use]
    pub fn insurance_rate(&self, user_id: UserId) -> Option<Premium> {
        self.policies
            .get(&user_id)
            .and_then(|policy| policy.insurance_rate)
    }

    /// Latest quote failure, cleared by the next successful quote.
    #[must_use]
    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    fn with_policy(&self, user_id: UserId, policy: Policy) -> Self {
        let mut next = self.clone();
        next.policies.insert(user_id, policy);
        next
    }
}

/// Commands accepted by the insurance store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InsuranceCommand {
    /// Open a policy for a user.
    EnrollPolicyholder {
        /// New policyholder.
        user_id: UserId,
    },
    /// Add a dependent to a household.
    DependentJoined {
        /// Policyholder.
        user_id: UserId,
        /// Joining dependent.
        dependent_id: DependentId,
    },
    /// Remove a dependent from a household.
    DependentLeft {
        /// Policyholder.
        user_id: UserId,
        /// Leaving dependent.
        dependent_id: DependentId,
    },
    /// Re-quote the premium of a policy.
    Recalculate {
        /// Policyholder.
        user_id: UserId,
    },
}

/// Events emitted by the insurance store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "event_type", rename_all = "snake_case")]
pub enum InsuranceEvent {
    /// Household membership changed; the rate needs a new quote.
    HouseholdChanged {
        /// Policyholder.
        user_id: UserId,
        /// New household size.
        household_size: usize,
    },
    /// A new premium was quoted.
    RateUpdated {
        /// Policyholder.
        user_id: UserId,
        /// Previous premium.
        previous: Option<Premium>,
        /// New premium.
        insurance_rate: Premium,
    },
}

impl InsuranceEvent {
    /// Returns the policyholder the event is about.
    #[must_use]
    pub const fn user_id(&self) -> UserId {
        match self {
            Self::HouseholdChanged { user_id, .. } | Self::RateUpdated { user_id, .. } => *user_id,
        }
    }

    /// Returns the event type as a static string slice.
    #[must_use]
    pub const fn event_type_str(&self) -> &'static str {
        match self {
            Self::HouseholdChanged { .. } => "household_changed",
            Self::RateUpdated { .. } => "rate_updated",
        }
    }
}

/// Insurance rules with the injected quote client.
#[derive(Debug)]
pub struct InsuranceReducer {
    rates: Arc<dyn RateQuoteClient>,
    quote_timeout: Duration,
}

impl InsuranceReducer {
    /// Creates the reducer. Quotes slower than `quote_timeout` fail with
    /// [`ClientError::Timeout`].
    #[must_use]
    pub fn new(rates: Arc<dyn RateQuoteClient>, quote_timeout: Duration) -> Self {
        Self {
            rates,
            quote_timeout,
        }
    }

    /// Starts an insurance store with no policies.
    #[must_use]
    pub fn spawn(self, mailbox_capacity: usize) -> InsuranceStore {
        Store::spawn(self, InsuranceState::default(), mailbox_capacity)
    }

    async fn quote(&self, user_id: UserId, household_size: usize) -> Result<Premium, StoreError> {
        let fetch = self.rates.fetch_quote(user_id, household_size);
        match tokio::time::timeout(self.quote_timeout, fetch).await {
            Ok(result) => result.map_err(StoreError::from),
            Err(_elapsed) => Err(ClientError::Timeout.into()),
        }
    }
}

fn household_changed(
    state: &InsuranceState,
    user_id: UserId,
    policy: Policy,
) -> Transition<InsuranceState, InsuranceEvent> {
    let household_size = policy.household_size();
    Transition::commit(
        state.with_policy(user_id, policy),
        InsuranceEvent::HouseholdChanged {
            user_id,
            household_size,
        },
    )
}

#[async_trait]
impl Reducer for InsuranceReducer {
    const CONTEXT: &'static str = "insurance";
    type State = InsuranceState;
    type Command = InsuranceCommand;
    type Event = InsuranceEvent;

    async fn reduce(
        &self,
        state: &InsuranceState,
        command: InsuranceCommand,
    ) -> Result<Transition<InsuranceState, InsuranceEvent>, StoreError> {
        match command {
            InsuranceCommand::EnrollPolicyholder { user_id } => {
                if state.policies.contains_key(&user_id) {
                    return Ok(Transition::unchanged());
                }
                Ok(household_changed(state, user_id, Policy::default()))
            }
            InsuranceCommand::DependentJoined {
                user_id,
                dependent_id,
            } => {
                let mut policy = state.policies.get(&user_id).cloned().unwrap_or_default();
                if !policy.household.insert(dependent_id) {
                    return Ok(Transition::unchanged());
                }
                Ok(household_changed(state, user_id, policy))
            }
            InsuranceCommand::DependentLeft {
                user_id,
                dependent_id,
            } => {
                let Some(policy) = state.policies.get(&user_id) else {
                    return Ok(Transition::unchanged());
                };
                let mut policy = policy.clone();
                if !policy.household.remove(&dependent_id) {
                    return Ok(Transition::unchanged());
                }
                Ok(household_changed(state, user_id, policy))
            }
            InsuranceCommand::Recalculate { user_id } => {
                let Some(policy) = state.policies.get(&user_id) else {
                    return Err(StoreError::validation(format!(
                        "no policy for user {user_id}"
                    )));
                };
                let rate = self.quote(user_id, policy.household_size()).await?;
                let previous = policy.insurance_rate;

                let mut policy = policy.clone();
                policy.insurance_rate = Some(rate);
                policy.quoted_at = Some(Utc::now());
                let mut next = state.with_policy(user_id, policy);
                next.last_error = None;
                Ok(Transition::commit(
                    next,
                    InsuranceEvent::RateUpdated {
                        user_id,
                        previous,
                        insurance_rate: rate,
                    },
                ))
            }
        }
    }

    fn record_failure(&self, state: &InsuranceState, error: &StoreError) -> Option<InsuranceState> {
        let mut next = state.clone();
        next.last_error = Some(error.to_string());
        Some(next)
    }
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;
    use crate::clients::RateTable;

    /// Fails the first `failures` quotes, then answers from a rate table.
    #[derive(Debug)]
    struct Flaky {
        failures: AtomicUsize,
        table: RateTable,
    }

    #[async_trait]
    impl RateQuoteClient for Flaky {
        async fn fetch_quote(&self, user_id: UserId, size: usize) -> Result<Premium, ClientError> {
            let remaining = self.failures.load(Ordering::SeqCst);
            if remaining > 0 {
                self.failures.store(remaining - 1, Ordering::SeqCst);
                return Err(ClientError::Unavailable("quote service down".into()));
            }
            self.table.fetch_quote(user_id, size).await
        }
    }

    #[derive(Debug)]
    struct Stalled;

    #[async_trait]
    impl RateQuoteClient for Stalled {
        async fn fetch_quote(&self, _: UserId, _: usize) -> Result<Premium, ClientError> {
            tokio::time::sleep(Duration::from_secs(3600)).await;
            Err(ClientError::Timeout)
        }
    }

    fn store_with(client: Arc<dyn RateQuoteClient>) -> InsuranceStore {
        InsuranceReducer::new(client, Duration::from_millis(50)).spawn(16)
    }

    #[tokio::test]
    async fn membership_changes_emit_household_changed() {
        let store = store_with(Arc::new(RateTable::new(100, 10)));
        let user_id = UserId::new();
        let dependent_id = DependentId::new();

        assert!(
            store
                .dispatch(InsuranceCommand::EnrollPolicyholder { user_id })
                .await
                .is_ok()
        );
        assert!(
            store
                .dispatch(InsuranceCommand::DependentJoined {
                    user_id,
                    dependent_id
                })
                .await
                .is_ok()
        );
        let state = store.current_state();
        assert_eq!(state.policy(user_id).map(Policy::household_size), Some(2));
        assert_eq!(state.insurance_rate(user_id), None);

        // Re-delivery of the same membership change is a no-op.
        let revision = store.snapshot().revision;
        assert!(
            store
                .dispatch(InsuranceCommand::DependentJoined {
                    user_id,
                    dependent_id
                })
                .await
                .is_ok()
        );
        assert_eq!(store.snapshot().revision, revision);
    }

    #[tokio::test]
    async fn recalculate_quotes_household() {
        let store = store_with(Arc::new(RateTable::new(100, 10)));
        let user_id = UserId::new();
        for command in [
            InsuranceCommand::EnrollPolicyholder { user_id },
            InsuranceCommand::DependentJoined {
                user_id,
                dependent_id: DependentId::new(),
            },
            InsuranceCommand::Recalculate { user_id },
        ] {
            assert!(store.dispatch(command).await.is_ok());
        }
        assert_eq!(
            store.current_state().insurance_rate(user_id),
            Some(Premium::from_cents(110))
        );
    }

    #[tokio::test]
    async fn recalculate_without_policy_is_invalid() {
        let store = store_with(Arc::new(RateTable::new(100, 10)));
        let result = store
            .dispatch(InsuranceCommand::Recalculate {
                user_id: UserId::new(),
            })
            .await;
        assert!(matches!(result, Err(StoreError::Validation(_))));
        assert_eq!(store.current_state().last_error(), None);
    }

    #[tokio::test]
    async fn quote_failure_is_recorded_then_cleared_on_retry() {
        let store = store_with(Arc::new(Flaky {
            failures: AtomicUsize::new(1),
            table: RateTable::new(100, 10),
        }));
        let user_id = UserId::new();
        assert!(
            store
                .dispatch(InsuranceCommand::EnrollPolicyholder { user_id })
                .await
                .is_ok()
        );

        let failed = store
            .dispatch(InsuranceCommand::Recalculate { user_id })
            .await;
        let Err(err) = failed else {
            panic!("first quote should fail");
        };
        assert!(err.is_retryable());
        let state = store.current_state();
        assert!(state.last_error().is_some());
        assert_eq!(state.insurance_rate(user_id), None);

        assert!(
            store
                .dispatch(InsuranceCommand::Recalculate { user_id })
                .await
                .is_ok()
        );
        let state = store.current_state();
        assert_eq!(state.last_error(), None);
        assert_eq!(state.insurance_rate(user_id), Some(Premium::from_cents(100)));
    }

    #[tokio::test]
    async fn slow_quote_times_out() {
        let store = store_with(Arc::new(Stalled));
        let user_id = UserId::new();
        assert!(
            store
                .dispatch(InsuranceCommand::EnrollPolicyholder { user_id })
                .await
                .is_ok()
        );
        let result = store
            .dispatch(InsuranceCommand::Recalculate { user_id })
            .await;
        assert_eq!(result, Err(StoreError::Transient(ClientError::Timeout)));
    }

    #[test]
    fn premium_display() {
        assert_eq!(Premium::from_cents(12_345).to_string(), "123.45");
        assert_eq!(Premium::from_cents(5).to_string(), "0.05");
    }
}

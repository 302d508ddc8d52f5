//! Subscription handles and cooperative cancellation.
//!
//! A [`Subscription`] is a plain value returned by
//! [`super::EventChannel::subscribe`]. Dropping it does nothing; the
//! registration ends only when [`Subscription::cancel`] is called or the
//! owning channel is dropped.

use std::fmt;
use std::sync::Arc;
use std::sync::Weak;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use serde::Serialize;
use tokio_util::sync::CancellationToken;

static NEXT_SUBSCRIPTION_ID: AtomicU64 = AtomicU64::new(1);

/// Process-wide unique identifier of a subscription.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct SubscriptionId(u64);

impl SubscriptionId {
    /// Allocates the next identifier.
    pub(crate) fn next() -> Self {
        Self(NEXT_SUBSCRIPTION_ID.fetch_add(1, Ordering::Relaxed))
    }

    /// Builds an identifier from a raw value.
    #[must_use]
    pub const fn from_raw(raw: u64) -> Self {
        Self(raw)
    }

    /// Returns the raw value.
    #[must_use]
    pub const fn as_u64(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for SubscriptionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "sub-{}", self.0)
    }
}

/// Shared, single-use cancellation signal.
///
/// Handlers that spawn long-running work keep a clone and either poll
/// [`CancelFlag::is_cancelled`] between steps or race their work against
/// [`CancelFlag::cancelled`].
#[derive(Debug, Clone, Default)]
pub struct CancelFlag {
    token: CancellationToken,
    raised: Arc<AtomicBool>,
}

impl CancelFlag {
    /// Creates a flag in the active state.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns `true` once the owning subscription has been cancelled.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Completes when the owning subscription is cancelled.
    pub async fn cancelled(&self) {
        self.token.cancelled().await;
    }

    /// Returns the underlying token, for `tokio::select!` or child tokens.
    #[must_use]
    pub fn token(&self) -> CancellationToken {
        self.token.clone()
    }

    /// Cancels the token. Returns `true` only for the call that raised it.
    pub(crate) fn raise(&self) -> bool {
        if self.raised.swap(true, Ordering::AcqRel) {
            return false;
        }
        self.token.cancel();
        true
    }
}

/// Removal hook implemented by channel registries.
pub(crate) trait Detach: Send + Sync {
    /// Removes the entry with `id`. Returns `true` if it was present.
    fn detach(&self, id: SubscriptionId) -> bool;
}

/// Cancellable registration of one handler on one channel.
pub struct Subscription {
    id: SubscriptionId,
    channel: &'static str,
    flag: CancelFlag,
    registry: Weak<dyn Detach>,
}

impl Subscription {
    pub(crate) fn new(
        id: SubscriptionId,
        channel: &'static str,
        flag: CancelFlag,
        registry: Weak<dyn Detach>,
    ) -> Self {
        Self {
            id,
            channel,
            flag,
            registry,
        }
    }

    /// Returns the subscription identifier.
    #[must_use]
    pub const fn id(&self) -> SubscriptionId {
        self.id
    }

    /// Returns the name of the channel this subscription is registered on.
    #[must_use]
    pub const fn channel(&self) -> &'static str {
        self.channel
    }

    /// Returns `true` once cancelled.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.flag.is_cancelled()
    }

    /// Returns a clone of the cancellation flag for cooperative checks.
    #[must_use]
    pub fn cancel_flag(&self) -> CancelFlag {
        self.flag.clone()
    }

    /// Cancels the subscription and removes it from its channel.
    ///
    /// Idempotent: a second call, or a call after the channel was dropped,
    /// is a no-op. Returns `true` only for the call that cancelled it.
    pub fn cancel(&self) -> bool {
        if !self.flag.raise() {
            return false;
        }
        if let Some(registry) = self.registry.upgrade() {
            registry.detach(self.id);
        }
        tracing::debug!(subscription = %self.id, channel = self.channel, "subscription cancelled");
        true
    }
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("id", &self.id)
            .field("channel", &self.channel)
            .field("cancelled", &self.is_cancelled())
            .finish_non_exhaustive()
    }
}

/// Per-delivery context handed to every handler invocation.
#[derive(Debug, Clone)]
pub struct Delivery {
    channel: &'static str,
    subscription: SubscriptionId,
    sequence: u64,
    cancel: CancelFlag,
}

impl Delivery {
    pub(crate) fn new(
        channel: &'static str,
        subscription: SubscriptionId,
        sequence: u64,
        cancel: CancelFlag,
    ) -> Self {
        Self {
            channel,
            subscription,
            sequence,
            cancel,
        }
    }

    /// Name of the emitting channel.
    #[must_use]
    pub const fn channel(&self) -> &'static str {
        self.channel
    }

    /// Subscription being delivered to.
    #[must_use]
    pub const fn subscription(&self) -> SubscriptionId {
        self.subscription
    }

    /// Emission sequence number on the channel, starting at 1.
    #[must_use]
    pub const fn sequence(&self) -> u64 {
        self.sequence
    }

    /// Cancellation flag of the receiving subscription.
    #[must_use]
    pub fn cancel_flag(&self) -> CancelFlag {
        self.cancel.clone()
    }

    /// Returns `true` if the receiving subscription was cancelled.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }
}

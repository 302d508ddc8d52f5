//! Error taxonomy for stores, channels, wiring and configuration.
//!
//! [`StoreError`] is what a `dispatch` call returns. Handler failures never
//! reach a dispatcher: they are captured at the channel boundary as a
//! [`DeliveryFault`] and logged. [`WiringError`] is raised only while the
//! composition root assembles the application.

use crate::channel::SubscriptionId;

/// Failure reported by an injected external client (network, storage).
///
/// Stores fold these into [`StoreError::Transient`] and into a
/// presentation-visible error field of their state.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ClientError {
    /// The dependency did not answer in time.
    #[error("request timed out")]
    Timeout,

    /// The dependency is temporarily unreachable.
    #[error("service unavailable: {0}")]
    Unavailable(String),

    /// The dependency refused the request.
    #[error("request rejected: {0}")]
    Rejected(String),
}

/// Error returned from [`crate::store::StoreHandle::dispatch`].
///
/// # Error Code Ranges
///
/// | Range     | Category   | Retryable |
/// |-----------|------------|-----------|
/// | 1000–1999 | Validation | no (fix the input) |
/// | 2000–2999 | Transient  | yes |
/// | 3000–3999 | Framework  | depends |
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StoreError {
    /// The command is invalid against the current state. Nothing was
    /// committed and nothing was emitted.
    #[error("validation failed: {0}")]
    Validation(String),

    /// An external dependency failed while the command was processed.
    #[error("transient failure: {0}")]
    Transient(#[from] ClientError),

    /// The store's actor is no longer running.
    #[error("store {0} is unavailable")]
    Unavailable(&'static str),

    /// The store's mailbox is full; a `try_post` was refused.
    #[error("store {0} mailbox is full")]
    Backpressure(&'static str),
}

impl StoreError {
    /// Shorthand for [`StoreError::Validation`].
    pub fn validation(reason: impl Into<String>) -> Self {
        Self::Validation(reason.into())
    }

    /// Returns the numeric error code for this variant.
    #[must_use]
    pub const fn error_code(&self) -> u32 {
        match self {
            Self::Validation(_) => 1001,
            Self::Transient(ClientError::Timeout) => 2001,
            Self::Transient(ClientError::Unavailable(_)) => 2002,
            Self::Transient(ClientError::Rejected(_)) => 2003,
            Self::Unavailable(_) => 3001,
            Self::Backpressure(_) => 3002,
        }
    }

    /// Returns `true` when re-issuing the same command may succeed.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(self, Self::Transient(_) | Self::Backpressure(_))
    }
}

/// Error returned by a subscription handler.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{0}")]
pub struct HandlerError(String);

impl HandlerError {
    /// Creates a handler error with a human-readable message.
    pub fn new(message: impl Into<String>) -> Self {
        Self(message.into())
    }

    /// Returns the message.
    #[must_use]
    pub fn message(&self) -> &str {
        &self.0
    }
}

impl From<StoreError> for HandlerError {
    fn from(err: StoreError) -> Self {
        Self(err.to_string())
    }
}

/// A handler failure caught and isolated by an [`crate::channel::EventChannel`].
///
/// Faults are logged and counted; they never remove the subscription.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DeliveryFault {
    /// The handler returned an error.
    #[error("subscription {subscription} on {channel} failed: {source}")]
    Failed {
        /// Channel that was emitting.
        channel: &'static str,
        /// Subscription whose handler failed.
        subscription: SubscriptionId,
        /// Error returned by the handler.
        source: HandlerError,
    },

    /// The handler panicked.
    #[error("subscription {subscription} on {channel} panicked: {message}")]
    Panicked {
        /// Channel that was emitting.
        channel: &'static str,
        /// Subscription whose handler panicked.
        subscription: SubscriptionId,
        /// Panic payload rendered as text.
        message: String,
    },
}

impl DeliveryFault {
    /// Returns the subscription whose handler failed.
    #[must_use]
    pub const fn subscription(&self) -> SubscriptionId {
        match self {
            Self::Failed { subscription, .. } | Self::Panicked { subscription, .. } => {
                *subscription
            }
        }
    }
}

/// Fatal inconsistency in the wiring graph detected at startup.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum WiringError {
    /// The same producer → consumer edge was wired twice.
    #[error("duplicate wiring {producer} -> {consumer} ({label})")]
    Duplicate {
        /// Producing store context.
        producer: &'static str,
        /// Consuming store context.
        consumer: &'static str,
        /// Edge label.
        label: &'static str,
    },

    /// A required edge was never wired.
    #[error("missing wiring {producer} -> {consumer} ({label})")]
    Missing {
        /// Producing store context.
        producer: &'static str,
        /// Consuming store context.
        consumer: &'static str,
        /// Edge label.
        label: &'static str,
    },

    /// A producer navigates to a router context that is not configured.
    #[error("{producer} navigates to unknown router context {context}")]
    UnroutableContext {
        /// Producing store context.
        producer: &'static str,
        /// Router context it targets.
        context: &'static str,
    },
}

/// Invalid configuration value.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    /// A variable is set but cannot be parsed.
    #[error("invalid value {value:?} for {key}")]
    InvalidValue {
        /// Environment variable name.
        key: &'static str,
        /// Raw value found.
        value: String,
    },
}

impl ConfigError {
    /// Shorthand for [`ConfigError::InvalidValue`].
    pub fn invalid(key: &'static str, value: impl Into<String>) -> Self {
        Self::InvalidValue {
            key,
            value: value.into(),
        }
    }
}

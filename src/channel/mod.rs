//! Event channel layer: fan-out broadcaster and subscription handles.
//!
//! Every store owns one [`EventChannel`] for its event type. Consumers
//! register handlers and receive a [`Subscription`] they can cancel at any
//! time, including from inside a running handler.

pub mod event_channel;
pub mod subscription;

pub use event_channel::{EmitReport, EventChannel, Handler};
pub use subscription::{CancelFlag, Delivery, Subscription, SubscriptionId};

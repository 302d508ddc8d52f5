//! Store layer: reducer contract, single-writer actor and its handle.
//!
//! A store couples a [`Reducer`] (domain rules) with an
//! [`crate::channel::EventChannel`] (notification). Commands flow in through
//! a [`StoreHandle`]; committed snapshots flow out through a `watch`
//! channel and events through the event channel.

pub mod actor;
pub mod handle;
pub mod reducer;

pub use actor::Store;
pub use handle::{Snapshot, StoreHandle};
pub use reducer::{Reducer, Transition};

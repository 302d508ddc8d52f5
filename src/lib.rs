//! # storewire
//!
//! Decoupled domain-event propagation between independently owned stores.
//!
//! Each bounded context owns its state inside a [`store::Store`]: a single
//! tokio task that validates commands, commits new snapshots and emits
//! domain events on its own [`channel::EventChannel`]. Stores never import
//! each other. A [`composition::CompositionRoot`] subscribes consumers to
//! producers and keeps every edge in a [`composition::WiringTable`].
//!
//! ## Architecture
//!
//! ```text
//! Presentation (snapshots via watch)
//!     │
//!     ├── UserStore ──DependentAdded──┬──> InsuranceStore ──HouseholdChanged──┐
//!     │                               │          ^                            │
//!     │                               │          └────────Recalculate─────────┘
//!     │                               │
//!     │                               └──> DocumentStore ──DocumentIssued──> RouterStore
//!     │
//!     ├── EventChannel + Subscription (channel/)
//!     ├── Store actor + StoreHandle   (store/)
//!     │
//!     └── Injected clients            (clients/)
//! ```

pub mod channel;
pub mod clients;
pub mod composition;
pub mod config;
pub mod domain;
pub mod error;
pub mod router;
pub mod store;
pub mod telemetry;

//! Reference bounded contexts: users, insurance pricing and documents.
//!
//! Each context is a [`crate::store::Reducer`] run by its own store. None
//! of them imports another; the composition root connects the user store's
//! events to the insurance and document stores.

pub mod document;
pub mod ids;
pub mod insurance;
pub mod user;

pub use document::{
    DOCUMENTS_CONTEXT, Document, DocumentCommand, DocumentEvent, DocumentKind, DocumentReducer,
    DocumentState, DocumentStore,
};
pub use ids::{DependentId, DocumentId, UserId};
pub use insurance::{
    InsuranceCommand, InsuranceEvent, InsuranceReducer, InsuranceState, InsuranceStore, Policy,
    Premium,
};
pub use user::{
    Dependent, Relationship, UserCommand, UserEvent, UserProfile, UserReducer, UserState,
    UserStore,
};

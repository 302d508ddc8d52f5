//! External dependencies injected into stores.
//!
//! Stores never reach for network or storage backends on their own; the
//! composition root hands them trait objects. The in-memory implementations
//! in [`in_memory`] back the demo binary and the tests.

pub mod in_memory;

use std::fmt;

use async_trait::async_trait;

use crate::domain::document::Document;
use crate::domain::ids::UserId;
use crate::domain::insurance::Premium;
use crate::error::ClientError;

pub use in_memory::{InMemoryDocumentRepository, RateTable};

/// Source of insurance premium quotes.
#[async_trait]
pub trait RateQuoteClient: Send + Sync + fmt::Debug {
    /// Fetches the monthly premium for a household of `household_size`
    /// people (the policyholder plus dependents).
    ///
    /// # Errors
    ///
    /// Returns a [`ClientError`] when the quote service fails.
    async fn fetch_quote(&self, user_id: UserId, household_size: usize)
    -> Result<Premium, ClientError>;
}

/// Storage for issued documents.
#[async_trait]
pub trait DocumentRepository: Send + Sync + fmt::Debug {
    /// Persists `document`.
    ///
    /// # Errors
    ///
    /// Returns a [`ClientError`] when the backend rejects or cannot store
    /// the document.
    async fn save(&self, document: &Document) -> Result<(), ClientError>;
}

//! In-memory client implementations.

use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::RwLock;

use super::{DocumentRepository, RateQuoteClient};
use crate::domain::document::Document;
use crate::domain::ids::{DocumentId, UserId};
use crate::domain::insurance::Premium;
use crate::error::ClientError;

/// Flat rate table: a base premium plus a fixed amount per dependent.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateTable {
    base_cents: u64,
    per_dependent_cents: u64,
}

impl RateTable {
    /// Creates a rate table.
    #[must_use]
    pub const fn new(base_cents: u64, per_dependent_cents: u64) -> Self {
        Self {
            base_cents,
            per_dependent_cents,
        }
    }

    /// Computes the premium for a household size.
    #[must_use]
    pub fn premium_for(&self, household_size: usize) -> Premium {
        let dependents = u64::try_from(household_size.saturating_sub(1)).unwrap_or(u64::MAX);
        Premium::from_cents(
            self.base_cents
                .saturating_add(self.per_dependent_cents.saturating_mul(dependents)),
        )
    }
}

#[async_trait]
impl RateQuoteClient for RateTable {
    async fn fetch_quote(
        &self,
        _user_id: UserId,
        household_size: usize,
    ) -> Result<Premium, ClientError> {
        if household_size == 0 {
            return Err(ClientError::Rejected("household must not be empty".into()));
        }
        Ok(self.premium_for(household_size))
    }
}

/// Document repository backed by a `HashMap` behind a `tokio` lock.
#[derive(Debug, Default)]
pub struct InMemoryDocumentRepository {
    documents: RwLock<HashMap<DocumentId, Document>>,
}

impl InMemoryDocumentRepository {
    /// Creates an empty repository.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a stored document.
    pub async fn get(&self, id: DocumentId) -> Option<Document> {
        self.documents.read().await.get(&id).cloned()
    }

    /// Returns the number of stored documents.
    pub async fn len(&self) -> usize {
        self.documents.read().await.len()
    }

    /// Returns `true` if nothing has been stored.
    pub async fn is_empty(&self) -> bool {
        self.documents.read().await.is_empty()
    }
}

#[async_trait]
impl DocumentRepository for InMemoryDocumentRepository {
    async fn save(&self, document: &Document) -> Result<(), ClientError> {
        let mut map = self.documents.write().await;
        if map.contains_key(&document.id) {
            return Err(ClientError::Rejected(format!(
                "document {} already stored",
                document.id
            )));
        }
        map.insert(document.id, document.clone());
        Ok(())
    }
}

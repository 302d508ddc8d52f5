//! Enrollment paperwork.
//!
//! The document store issues a form whenever a dependent joins or leaves a
//! household. Each issued document is saved through an injected
//! [`DocumentRepository`] and announced with a
//! [`DocumentEvent::DocumentIssued`] that asks the router to open it. The
//! request resets the documents stack to the new document, so the stack
//! holds at most one route however many documents are issued.

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;

use super::ids::{DependentId, DocumentId, UserId};
use crate::clients::DocumentRepository;
use crate::error::StoreError;
use crate::router::{ContextKey, NavigationRequest, Navigates, RouteToken};
use crate::store::{Reducer, Store, StoreHandle, Transition};

/// Handle to a running document store.
pub type DocumentStore = StoreHandle<DocumentReducer>;

/// Router context that shows issued documents.
pub const DOCUMENTS_CONTEXT: &str = "documents";

/// Kind of document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DocumentKind {
    /// Issued when a dependent joins.
    EnrollmentForm,
    /// Issued when a dependent leaves.
    WithdrawalNotice,
}

impl DocumentKind {
    /// Returns the kind as a static string slice.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::EnrollmentForm => "enrollment_form",
            Self::WithdrawalNotice => "withdrawal_notice",
        }
    }
}

/// An issued document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Document {
    /// Document identifier.
    pub id: DocumentId,
    /// Policyholder.
    pub user_id: UserId,
    /// Dependent the document concerns.
    pub dependent_id: DependentId,
    /// Document kind.
    pub kind: DocumentKind,
    /// Issue timestamp.
    pub issued_at: DateTime<Utc>,
}

/// Snapshot of issued documents.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DocumentState {
    documents: BTreeMap<DocumentId, Document>,
    last_error: Option<String>,
}

impl DocumentState {
    /// Returns a document by id.
    #[must_use]
    pub fn document(&self, id: DocumentId) -> Option<&Document> {
        self.documents.get(&id)
    }

    /// Returns the documents of a user.
    pub fn for_user(&self, user_id: UserId) -> impl Iterator<Item = &Document> {
        self.documents
            .values()
            .filter(move |doc| doc.user_id == user_id)
    }

    /// Number of issued documents.
    #[must_use]
    pub fn len(&self) -> usize {
        self.documents.len()
    }

    /// Returns `true` if nothing was issued.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.documents.is_empty()
    }

    /// Latest repository failure, cleared by the next successful issue.
    #[must_use]
    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    fn find(&self, user_id: UserId, dependent_id: DependentId, kind: DocumentKind) -> bool {
        self.documents.values().any(|doc| {
            doc.user_id == user_id && doc.dependent_id == dependent_id && doc.kind == kind
        })
    }
}

/// Commands accepted by the document store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DocumentCommand {
    /// Issue a document unless an identical one exists.
    Issue {
        /// Policyholder.
        user_id: UserId,
        /// Dependent concerned.
        dependent_id: DependentId,
        /// Kind to issue.
        kind: DocumentKind,
    },
}

/// Events emitted by the document store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "event_type", rename_all = "snake_case")]
pub enum DocumentEvent {
    /// A document was saved.
    DocumentIssued {
        /// New document.
        document_id: DocumentId,
        /// Policyholder.
        user_id: UserId,
        /// Document kind.
        kind: DocumentKind,
    },
}

impl DocumentEvent {
    /// Returns the event type as a static string slice.
    #[must_use]
    pub const fn event_type_str(&self) -> &'static str {
        match self {
            Self::DocumentIssued { .. } => "document_issued",
        }
    }
}

impl Navigates for DocumentEvent {
    fn navigation(&self) -> Option<NavigationRequest> {
        match self {
            Self::DocumentIssued { document_id, .. } => {
                let context = ContextKey::new(DOCUMENTS_CONTEXT).ok()?;
                let token = RouteToken::new(format!("document/{document_id}")).ok()?;
                Some(NavigationRequest::reset(context, vec![token]))
            }
        }
    }
}

/// Document rules with the injected repository.
#[derive(Debug)]
pub struct DocumentReducer {
    repository: Arc<dyn DocumentRepository>,
}

impl DocumentReducer {
    /// Creates the reducer.
    #[must_use]
    pub fn new(repository: Arc<dyn DocumentRepository>) -> Self {
        Self { repository }
    }

    /// Starts a document store with no documents.
    #[must_use]
    pub fn spawn(self, mailbox_capacity: usize) -> DocumentStore {
        Store::spawn(self, DocumentState::default(), mailbox_capacity)
    }
}

#[async_trait]
impl Reducer for DocumentReducer {
    const CONTEXT: &'static str = "documents";
    type State = DocumentState;
    type Command = DocumentCommand;
    type Event = DocumentEvent;

    async fn reduce(
        &self,
        state: &DocumentState,
        command: DocumentCommand,
    ) -> Result<Transition<DocumentState, DocumentEvent>, StoreError> {
        match command {
            DocumentCommand::Issue {
                user_id,
                dependent_id,
                kind,
            } => {
                if state.find(user_id, dependent_id, kind) {
                    return Ok(Transition::unchanged());
                }
                let document = Document {
                    id: DocumentId::new(),
                    user_id,
                    dependent_id,
                    kind,
                    issued_at: Utc::now(),
                };
                self.repository.save(&document).await?;

                let document_id = document.id;
                let mut next = state.clone();
                next.documents.insert(document_id, document);
                next.last_error = None;
                Ok(Transition::commit(
                    next,
                    DocumentEvent::DocumentIssued {
                        document_id,
                        user_id,
                        kind,
                    },
                ))
            }
        }
    }

    fn record_failure(&self, state: &DocumentState, error: &StoreError) -> Option<DocumentState> {
        let mut next = state.clone();
        next.last_error = Some(error.to_string());
        Some(next)
    }
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use super::*;
    use crate::clients::InMemoryDocumentRepository;
    use crate::error::ClientError;
    use crate::router::NavigationAction;

    #[derive(Debug)]
    struct Offline;

    #[async_trait]
    impl DocumentRepository for Offline {
        async fn save(&self, _: &Document) -> Result<(), ClientError> {
            Err(ClientError::Unavailable("archive offline".into()))
        }
    }

    fn issue(user_id: UserId, dependent_id: DependentId) -> DocumentCommand {
        DocumentCommand::Issue {
            user_id,
            dependent_id,
            kind: DocumentKind::EnrollmentForm,
        }
    }

    #[tokio::test]
    async fn issue_saves_through_repository() {
        let repository = Arc::new(InMemoryDocumentRepository::new());
        let store = DocumentReducer::new(Arc::clone(&repository) as Arc<dyn DocumentRepository>)
            .spawn(16);
        let user_id = UserId::new();

        assert!(store.dispatch(issue(user_id, DependentId::new())).await.is_ok());
        let state = store.current_state();
        assert_eq!(state.len(), 1);
        let Some(doc) = state.for_user(user_id).next() else {
            panic!("document missing from state");
        };
        assert_eq!(repository.get(doc.id).await.as_ref(), Some(doc));
    }

    #[tokio::test]
    async fn reissue_is_unchanged() {
        let store = DocumentReducer::new(Arc::new(InMemoryDocumentRepository::new())).spawn(16);
        let command = issue(UserId::new(), DependentId::new());
        assert!(store.dispatch(command.clone()).await.is_ok());
        let revision = store.snapshot().revision;
        assert!(store.dispatch(command).await.is_ok());
        assert_eq!(store.snapshot().revision, revision);
        assert_eq!(store.current_state().len(), 1);
    }

    #[tokio::test]
    async fn repository_failure_is_recorded() {
        let store = DocumentReducer::new(Arc::new(Offline)).spawn(16);
        let result = store.dispatch(issue(UserId::new(), DependentId::new())).await;
        assert!(matches!(result, Err(StoreError::Transient(_))));
        let state = store.current_state();
        assert!(state.is_empty());
        assert_eq!(
            state.last_error(),
            Some("transient failure: service unavailable: archive offline")
        );
    }

    #[test]
    fn issued_event_navigates_to_document() {
        let document_id = DocumentId::new();
        let event = DocumentEvent::DocumentIssued {
            document_id,
            user_id: UserId::new(),
            kind: DocumentKind::EnrollmentForm,
        };
        let Some(request) = event.navigation() else {
            panic!("expected a navigation request");
        };
        assert_eq!(request.context.as_str(), DOCUMENTS_CONTEXT);
        let NavigationAction::Reset(baseline) = request.action else {
            panic!("expected a reset");
        };
        let routes: Vec<&str> = baseline.iter().map(RouteToken::as_str).collect();
        assert_eq!(routes, vec![format!("document/{document_id}")]);
    }
}

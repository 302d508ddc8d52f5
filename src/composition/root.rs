//! Application assembly.
//!
//! The composition root is the only place that knows about more than one
//! store. It starts every store, then connects producers to consumers
//! through a [`WiringTable`] and verifies the wiring before handing out the
//! assembled [`App`].

use std::sync::Arc;

use crate::clients::{DocumentRepository, InMemoryDocumentRepository, RateQuoteClient, RateTable};
use crate::config::FrameworkConfig;
use crate::domain::{
    DOCUMENTS_CONTEXT, DocumentCommand, DocumentEvent, DocumentKind, DocumentReducer,
    DocumentStore, InsuranceCommand, InsuranceEvent, InsuranceReducer, InsuranceStore, UserEvent,
    UserReducer, UserStore,
};
use crate::error::WiringError;
use crate::router::{Navigates, RouterCommand, RouterReducer, RouterStore};
use crate::store::Reducer;

use super::wiring::{Edge, WiringTable};

/// Edges every composed application must have.
pub const REQUIRED_EDGES: [Edge; 4] = [
    Edge::new("user", "insurance", "household"),
    Edge::new("insurance", "insurance", "recalculate"),
    Edge::new("user", "documents", "forms"),
    Edge::new("documents", "router", "navigation"),
];

/// External clients injected into the stores.
#[derive(Debug, Clone)]
pub struct Dependencies {
    /// Premium quote source.
    pub rates: Arc<dyn RateQuoteClient>,
    /// Document storage.
    pub documents: Arc<dyn DocumentRepository>,
}

impl Dependencies {
    /// In-memory clients sized from `config`.
    #[must_use]
    pub fn in_memory(config: &FrameworkConfig) -> Self {
        Self {
            rates: Arc::new(RateTable::new(
                config.insurance_base_premium_cents,
                config.insurance_dependent_premium_cents,
            )),
            documents: Arc::new(InMemoryDocumentRepository::new()),
        }
    }
}

/// The assembled application: store handles plus the wiring that connects
/// them.
#[derive(Debug)]
pub struct App {
    /// User store.
    pub users: UserStore,
    /// Insurance store.
    pub insurance: InsuranceStore,
    /// Document store.
    pub documents: DocumentStore,
    /// Router store.
    pub router: RouterStore,
    wiring: WiringTable,
}

impl App {
    /// Returns the wiring table.
    #[must_use]
    pub const fn wiring(&self) -> &WiringTable {
        &self.wiring
    }

    /// Cancels every wired subscription. Stores stop once their handles
    /// are dropped afterwards. Returns the number of edges removed.
    pub fn shutdown(&mut self) -> usize {
        let removed = self.wiring.teardown();
        tracing::info!(removed, "application wiring torn down");
        removed
    }
}

/// Builds an [`App`] from configuration and injected dependencies.
#[derive(Debug, Clone, Copy, Default)]
pub struct CompositionRoot;

impl CompositionRoot {
    /// Starts all stores and wires them together.
    ///
    /// Must be called inside a tokio runtime.
    ///
    /// # Errors
    ///
    /// Returns [`WiringError::UnroutableContext`] if the router is not
    /// configured with the documents context, and a [`WiringError`] if an
    /// edge is wired twice or a required edge is missing.
    pub fn compose(config: &FrameworkConfig, deps: Dependencies) -> Result<App, WiringError> {
        check_routable(config, DocumentReducer::CONTEXT, DOCUMENTS_CONTEXT)?;
        let capacity = config.store_mailbox_capacity;
        let users = UserReducer::new(config.user_max_dependents).spawn(capacity);
        let insurance =
            InsuranceReducer::new(deps.rates, config.insurance_quote_timeout).spawn(capacity);
        let documents = DocumentReducer::new(deps.documents).spawn(capacity);
        let router = RouterReducer::new(config.router_contexts.iter().cloned(), config.router_max_depth)
            .spawn(capacity);

        let mut app = App {
            users,
            insurance,
            documents,
            router,
            wiring: WiringTable::new(),
        };
        if let Err(err) = Self::wire(&mut app) {
            app.shutdown();
            return Err(err);
        }
        if let Err(err) = app.wiring.verify(&REQUIRED_EDGES) {
            app.shutdown();
            return Err(err);
        }
        tracing::info!(edges = app.wiring.len(), "application composed");
        Ok(app)
    }

    fn wire(app: &mut App) -> Result<(), WiringError> {
        let App {
            ref users,
            ref insurance,
            ref documents,
            ref router,
            ref mut wiring,
        } = *app;

        wiring.forward(users, insurance, "household", |event: &UserEvent| {
            Some(match *event {
                UserEvent::UserRegistered { user_id } => {
                    InsuranceCommand::EnrollPolicyholder { user_id }
                }
                UserEvent::DependentAdded {
                    user_id,
                    dependent_id,
                } => InsuranceCommand::DependentJoined {
                    user_id,
                    dependent_id,
                },
                UserEvent::DependentRemoved {
                    user_id,
                    dependent_id,
                } => InsuranceCommand::DependentLeft {
                    user_id,
                    dependent_id,
                },
            })
        })?;

        wiring.forward(insurance, insurance, "recalculate", |event: &InsuranceEvent| {
            match *event {
                InsuranceEvent::HouseholdChanged { user_id, .. } => {
                    Some(InsuranceCommand::Recalculate { user_id })
                }
                InsuranceEvent::RateUpdated { .. } => None,
            }
        })?;

        wiring.forward(users, documents, "forms", |event: &UserEvent| match *event {
            UserEvent::DependentAdded {
                user_id,
                dependent_id,
            } => Some(DocumentCommand::Issue {
                user_id,
                dependent_id,
                kind: DocumentKind::EnrollmentForm,
            }),
            UserEvent::DependentRemoved {
                user_id,
                dependent_id,
            } => Some(DocumentCommand::Issue {
                user_id,
                dependent_id,
                kind: DocumentKind::WithdrawalNotice,
            }),
            UserEvent::UserRegistered { .. } => None,
        })?;

        wiring.forward(documents, router, "navigation", |event: &DocumentEvent| {
            event.navigation().map(RouterCommand::from)
        })?;

        Ok(())
    }
}

fn check_routable(
    config: &FrameworkConfig,
    producer: &'static str,
    context: &'static str,
) -> Result<(), WiringError> {
    if config.router_contexts.iter().any(|key| key.as_str() == context) {
        return Ok(());
    }
    Err(WiringError::UnroutableContext { producer, context })
}

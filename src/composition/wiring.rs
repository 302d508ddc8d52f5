//! Wiring table: every cross-store edge together with its subscription.

use std::fmt;

use crate::channel::Subscription;
use crate::error::{HandlerError, WiringError};
use crate::store::{Reducer, StoreHandle};

/// One directed producer → consumer connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Edge {
    /// Producing store context.
    pub producer: &'static str,
    /// Consuming store context.
    pub consumer: &'static str,
    /// What the edge carries.
    pub label: &'static str,
}

impl Edge {
    /// Creates an edge.
    #[must_use]
    pub const fn new(producer: &'static str, consumer: &'static str, label: &'static str) -> Self {
        Self {
            producer,
            consumer,
            label,
        }
    }
}

impl fmt::Display for Edge {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} -> {} ({})", self.producer, self.consumer, self.label)
    }
}

/// Records every wired edge and owns its [`Subscription`].
///
/// A table rejects a second registration of the same edge so that no event
/// is ever delivered twice to one consumer.
#[derive(Debug, Default)]
pub struct WiringTable {
    edges: Vec<(Edge, Subscription)>,
}

impl WiringTable {
    /// Creates an empty table.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns `true` if `edge` is already wired.
    #[must_use]
    pub fn contains(&self, edge: Edge) -> bool {
        self.edges.iter().any(|(wired, _)| *wired == edge)
    }

    /// Records an edge wired by hand.
    ///
    /// # Errors
    ///
    /// Returns [`WiringError::Duplicate`] if the edge exists; the given
    /// subscription is cancelled in that case.
    pub fn connect(&mut self, edge: Edge, subscription: Subscription) -> Result<(), WiringError> {
        if self.contains(edge) {
            subscription.cancel();
            return Err(duplicate(edge));
        }
        tracing::info!(%edge, subscription = %subscription.id(), "edge wired");
        self.edges.push((edge, subscription));
        Ok(())
    }

    /// Subscribes `consumer` to `producer`'s events.
    ///
    /// `map` turns a producer event into a consumer command, or `None` to
    /// ignore it. Commands are posted on the consumer's unbounded relay
    /// lane, so the producer's emission never waits on the consumer, no
    /// command is dropped while the consumer runs, and commands from one
    /// producer arrive in emission order.
    ///
    /// # Errors
    ///
    /// Returns [`WiringError::Duplicate`] if the edge exists. Nothing is
    /// subscribed in that case.
    pub fn forward<P, C, M>(
        &mut self,
        producer: &StoreHandle<P>,
        consumer: &StoreHandle<C>,
        label: &'static str,
        map: M,
    ) -> Result<(), WiringError>
    where
        P: Reducer,
        C: Reducer,
        M: Fn(&P::Event) -> Option<C::Command> + Send + Sync + 'static,
    {
        let edge = Edge::new(producer.context(), consumer.context(), label);
        if self.contains(edge) {
            return Err(duplicate(edge));
        }
        let target = consumer.clone();
        let subscription = producer.subscribe(move |event, delivery| {
            if delivery.is_cancelled() {
                return Ok(());
            }
            match map(event) {
                Some(command) => target.post(command).map_err(HandlerError::from),
                None => Ok(()),
            }
        });
        self.connect(edge, subscription)
    }

    /// Checks that every `required` edge is wired.
    ///
    /// # Errors
    ///
    /// Returns [`WiringError::Missing`] for the first absent edge.
    pub fn verify(&self, required: &[Edge]) -> Result<(), WiringError> {
        match required.iter().find(|edge| !self.contains(**edge)) {
            Some(edge) => Err(WiringError::Missing {
                producer: edge.producer,
                consumer: edge.consumer,
                label: edge.label,
            }),
            None => Ok(()),
        }
    }

    /// Wired edges in wiring order.
    pub fn edges(&self) -> impl Iterator<Item = Edge> + '_ {
        self.edges.iter().map(|(edge, _)| *edge)
    }

    /// Number of wired edges.
    #[must_use]
    pub fn len(&self) -> usize {
        self.edges.len()
    }

    /// Returns `true` if nothing is wired.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.edges.is_empty()
    }

    /// Cancels every subscription and empties the table. Returns how many
    /// edges were removed.
    pub fn teardown(&mut self) -> usize {
        let count = self.edges.len();
        for (edge, subscription) in self.edges.drain(..) {
            subscription.cancel();
            tracing::debug!(%edge, "edge removed");
        }
        count
    }
}

const fn duplicate(edge: Edge) -> WiringError {
    WiringError::Duplicate {
        producer: edge.producer,
        consumer: edge.consumer,
        label: edge.label,
    }
}

//! Cloneable async handle to a running store.

use std::fmt;
use std::sync::Arc;

use tokio::sync::{mpsc, oneshot, watch};

use super::Reducer;
use super::actor::StoreMessage;
use crate::channel::{Delivery, EventChannel, Subscription};
use crate::error::{HandlerError, StoreError};

/// A committed state together with its revision number.
///
/// Revision 0 is the initial state; each commit increments it by one.
#[derive(Debug)]
pub struct Snapshot<S> {
    /// Commit counter.
    pub revision: u64,
    /// The committed state.
    pub state: Arc<S>,
}

impl<S> Clone for Snapshot<S> {
    fn clone(&self) -> Self {
        Self {
            revision: self.revision,
            state: Arc::clone(&self.state),
        }
    }
}

/// Handle used by the presentation layer, tests and wiring handlers.
///
/// Cloning is cheap. The store keeps running while at least one handle
/// exists.
pub struct StoreHandle<R: Reducer> {
    mailbox: mpsc::Sender<StoreMessage<R>>,
    relay: mpsc::UnboundedSender<StoreMessage<R>>,
    snapshots: watch::Receiver<Snapshot<R::State>>,
    channel: Arc<EventChannel<R::Event>>,
}

impl<R: Reducer> StoreHandle<R> {
    pub(crate) fn new(
        mailbox: mpsc::Sender<StoreMessage<R>>,
        relay: mpsc::UnboundedSender<StoreMessage<R>>,
        snapshots: watch::Receiver<Snapshot<R::State>>,
        channel: Arc<EventChannel<R::Event>>,
    ) -> Self {
        Self {
            mailbox,
            relay,
            snapshots,
            channel,
        }
    }

    /// Bounded-context name of the store.
    #[must_use]
    pub const fn context(&self) -> &'static str {
        R::CONTEXT
    }

    /// Returns the latest committed state without blocking on writers.
    #[must_use]
    pub fn current_state(&self) -> Arc<R::State> {
        Arc::clone(&self.snapshots.borrow().state)
    }

    /// Returns the latest committed state with its revision.
    #[must_use]
    pub fn snapshot(&self) -> Snapshot<R::State> {
        self.snapshots.borrow().clone()
    }

    /// Returns a receiver notified after every commit.
    #[must_use]
    pub fn watch(&self) -> watch::Receiver<Snapshot<R::State>> {
        self.snapshots.clone()
    }

    /// Applies `command` and waits for the outcome.
    ///
    /// On success the new state is committed and its events have been
    /// emitted before this returns.
    ///
    /// # Errors
    ///
    /// Returns the reducer's [`StoreError`], or
    /// [`StoreError::Unavailable`] if the store has stopped.
    pub async fn dispatch(&self, command: R::Command) -> Result<(), StoreError> {
        let (reply, outcome) = oneshot::channel();
        self.mailbox
            .send(StoreMessage::Dispatch {
                command,
                reply: Some(reply),
            })
            .await
            .map_err(|_| StoreError::Unavailable(R::CONTEXT))?;
        outcome
            .await
            .map_err(|_| StoreError::Unavailable(R::CONTEXT))?
    }

    /// Enqueues `command` on the relay lane without waiting. Used by
    /// cross-store handlers to hand work to this store's own task.
    ///
    /// The relay is unbounded: a posted command is never refused while the
    /// store runs. Commands posted from one caller are applied in posting
    /// order. The outcome is only logged.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Unavailable`] when the store has stopped.
    pub fn post(&self, command: R::Command) -> Result<(), StoreError> {
        self.relay
            .send(StoreMessage::Dispatch {
                command,
                reply: None,
            })
            .map_err(|_| StoreError::Unavailable(R::CONTEXT))
    }

    /// Enqueues `command` on the bounded mailbox without waiting.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Backpressure`] when the mailbox is full and
    /// [`StoreError::Unavailable`] when the store has stopped.
    pub fn try_post(&self, command: R::Command) -> Result<(), StoreError> {
        self.mailbox
            .try_send(StoreMessage::Dispatch {
                command,
                reply: None,
            })
            .map_err(|err| match err {
                mpsc::error::TrySendError::Full(_) => StoreError::Backpressure(R::CONTEXT),
                mpsc::error::TrySendError::Closed(_) => StoreError::Unavailable(R::CONTEXT),
            })
    }

    /// Waits until every command enqueued before this call, on either lane,
    /// has been applied.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Unavailable`] if the store has stopped.
    pub async fn settle(&self) -> Result<(), StoreError> {
        // Each lane is FIFO, so one barrier per lane covers both.
        let (reply, relayed) = oneshot::channel();
        self.relay
            .send(StoreMessage::Barrier { reply })
            .map_err(|_| StoreError::Unavailable(R::CONTEXT))?;
        relayed
            .await
            .map_err(|_| StoreError::Unavailable(R::CONTEXT))?;

        let (reply, mailed) = oneshot::channel();
        self.mailbox
            .send(StoreMessage::Barrier { reply })
            .await
            .map_err(|_| StoreError::Unavailable(R::CONTEXT))?;
        mailed.await.map_err(|_| StoreError::Unavailable(R::CONTEXT))
    }

    /// Waits until a committed state satisfies `predicate`.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Unavailable`] if the store stops first.
    pub async fn wait_for<F>(&self, mut predicate: F) -> Result<Arc<R::State>, StoreError>
    where
        F: FnMut(&R::State) -> bool,
    {
        let mut rx = self.snapshots.clone();
        let snapshot = rx
            .wait_for(|snapshot| predicate(&snapshot.state))
            .await
            .map_err(|_| StoreError::Unavailable(R::CONTEXT))?;
        Ok(Arc::clone(&snapshot.state))
    }

    /// Registers a handler on this store's event channel.
    pub fn subscribe<F>(&self, handler: F) -> Subscription
    where
        F: Fn(&R::Event, &Delivery) -> Result<(), HandlerError> + Send + Sync + 'static,
    {
        self.channel.subscribe(handler)
    }

    /// Number of handlers registered on this store's channel.
    #[must_use]
    pub fn subscriber_count(&self) -> usize {
        self.channel.subscriber_count()
    }
}

impl<R: Reducer> Clone for StoreHandle<R> {
    fn clone(&self) -> Self {
        Self {
            mailbox: self.mailbox.clone(),
            relay: self.relay.clone(),
            snapshots: self.snapshots.clone(),
            channel: Arc::clone(&self.channel),
        }
    }
}

impl<R: Reducer> fmt::Debug for StoreHandle<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StoreHandle")
            .field("context", &R::CONTEXT)
            .field("revision", &self.snapshots.borrow().revision)
            .field("channel", &self.channel)
            .finish()
    }
}

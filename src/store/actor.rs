//! Store actor: the single writer of one bounded context's state.
//!
//! Each store runs as one tokio task that owns the reducer, the current
//! snapshot and the write side of the snapshot `watch` channel. Commands
//! arrive through two lanes: a bounded `mpsc` mailbox for callers that can
//! wait, and an unbounded relay for commands posted from event handlers,
//! which must never block nor be dropped. Either way they are applied
//! strictly one at a time, so the read → validate → commit → emit sequence
//! never interleaves.

use std::fmt;
use std::sync::Arc;

use tokio::sync::{mpsc, oneshot, watch};
use tracing::Instrument;

use super::handle::{Snapshot, StoreHandle};
use super::reducer::{Reducer, Transition};
use crate::channel::EventChannel;
use crate::error::StoreError;

/// Messages processed by the store task.
pub(crate) enum StoreMessage<R: Reducer> {
    /// Apply a command. `reply` is `None` for fire-and-forget posts.
    Dispatch {
        command: R::Command,
        reply: Option<oneshot::Sender<Result<(), StoreError>>>,
    },
    /// Answer once every earlier message has been processed.
    Barrier { reply: oneshot::Sender<()> },
}

/// Observable state container for one bounded context.
///
/// Constructed with [`Store::spawn`], which moves the store onto its own
/// task and returns a [`StoreHandle`].
pub struct Store<R: Reducer> {
    reducer: R,
    state: Arc<R::State>,
    revision: u64,
    snapshots: watch::Sender<Snapshot<R::State>>,
    channel: Arc<EventChannel<R::Event>>,
}

impl<R: Reducer> Store<R> {
    /// Starts a store task with `initial` as revision 0.
    ///
    /// Must be called from within a tokio runtime. The task stops once
    /// every [`StoreHandle`] has been dropped.
    #[must_use]
    pub fn spawn(reducer: R, initial: R::State, mailbox_capacity: usize) -> StoreHandle<R> {
        let state = Arc::new(initial);
        let (snapshots, snapshot_rx) = watch::channel(Snapshot {
            revision: 0,
            state: Arc::clone(&state),
        });
        let channel = Arc::new(EventChannel::new(R::CONTEXT));
        let (tx, rx) = mpsc::channel(mailbox_capacity.max(1));
        let (relay_tx, relay_rx) = mpsc::unbounded_channel();

        let store = Self {
            reducer,
            state,
            revision: 0,
            snapshots,
            channel: Arc::clone(&channel),
        };
        tokio::spawn(store.run(rx, relay_rx));
        tracing::debug!(context = R::CONTEXT, mailbox_capacity, "store started");

        StoreHandle::new(tx, relay_tx, snapshot_rx, channel)
    }

    async fn run(
        mut self,
        mut rx: mpsc::Receiver<StoreMessage<R>>,
        mut relay: mpsc::UnboundedReceiver<StoreMessage<R>>,
    ) {
        loop {
            // Relayed reactions take priority over the mailbox.
            let message = tokio::select! {
                biased;
                Some(message) = relay.recv() => message,
                Some(message) = rx.recv() => message,
                else => break,
            };
            match message {
                StoreMessage::Dispatch { command, reply } => {
                    let span = tracing::info_span!("dispatch", context = R::CONTEXT);
                    let result = self.apply(command).instrument(span).await;
                    match reply {
                        // The caller may have stopped waiting; nothing to do then.
                        Some(reply) => {
                            let _ = reply.send(result);
                        }
                        None => {
                            if let Err(err) = result {
                                tracing::warn!(
                                    context = R::CONTEXT,
                                    code = err.error_code(),
                                    error = %err,
                                    "posted command failed"
                                );
                            }
                        }
                    }
                }
                StoreMessage::Barrier { reply } => {
                    let _ = reply.send(());
                }
            }
        }
        tracing::debug!(context = R::CONTEXT, revision = self.revision, "store stopped");
    }

    async fn apply(&mut self, command: R::Command) -> Result<(), StoreError> {
        tracing::debug!(?command, "applying command");
        let current = Arc::clone(&self.state);

        match self.reducer.reduce(&current, command).await {
            Ok(Transition::Unchanged) => {
                tracing::debug!("command left state unchanged");
                Ok(())
            }
            Ok(Transition::Commit { next, events }) => {
                self.commit(next);
                for event in &events {
                    let report = self.channel.emit(event);
                    tracing::debug!(
                        ?event,
                        sequence = report.sequence,
                        delivered = report.delivered,
                        faults = report.faults.len(),
                        "event emitted"
                    );
                }
                Ok(())
            }
            Err(err) => {
                if matches!(err, StoreError::Transient(_)) {
                    tracing::warn!(code = err.error_code(), error = %err, "transient failure");
                    if let Some(next) = self.reducer.record_failure(&current, &err) {
                        self.commit(next);
                    }
                } else {
                    tracing::debug!(code = err.error_code(), error = %err, "command rejected");
                }
                Err(err)
            }
        }
    }

    fn commit(&mut self, next: R::State) {
        self.revision = self.revision.saturating_add(1);
        self.state = Arc::new(next);
        self.snapshots.send_replace(Snapshot {
            revision: self.revision,
            state: Arc::clone(&self.state),
        });
        tracing::info!(context = R::CONTEXT, revision = self.revision, "state committed");
    }
}

impl<R: Reducer> fmt::Debug for Store<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Store")
            .field("context", &R::CONTEXT)
            .field("revision", &self.revision)
            .field("state", &self.state)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use async_trait::async_trait;

    use super::*;
    use crate::error::{ClientError, HandlerError};

    #[derive(Debug, Clone, Default, PartialEq, Eq)]
    struct Pair {
        left: u64,
        right: u64,
        last_error: Option<String>,
    }

    #[derive(Debug)]
    enum PairCommand {
        Set(u64),
        Noop,
        Reject,
        Outage,
    }

    #[derive(Debug, Clone, PartialEq, Eq)]
    enum PairEvent {
        Set(u64),
    }

    struct PairReducer;

    #[async_trait]
    impl Reducer for PairReducer {
        const CONTEXT: &'static str = "pair";
        type State = Pair;
        type Command = PairCommand;
        type Event = PairEvent;

        async fn reduce(
            &self,
            state: &Pair,
            command: PairCommand,
        ) -> Result<Transition<Pair, PairEvent>, StoreError> {
            match command {
                PairCommand::Set(value) => {
                    let mut next = state.clone();
                    next.left = value;
                    // Give other tasks a chance to run mid-command.
                    tokio::task::yield_now().await;
                    next.right = value;
                    next.last_error = None;
                    Ok(Transition::commit(next, PairEvent::Set(value)))
                }
                PairCommand::Noop => Ok(Transition::unchanged()),
                PairCommand::Reject => Err(StoreError::validation("rejected")),
                PairCommand::Outage => Err(ClientError::Unavailable("backend".into()).into()),
            }
        }

        fn record_failure(&self, state: &Pair, error: &StoreError) -> Option<Pair> {
            let mut next = state.clone();
            next.last_error = Some(error.to_string());
            Some(next)
        }
    }

    #[tokio::test]
    async fn dispatch_commits_then_emits() {
        let store = Store::spawn(PairReducer, Pair::default(), 16);
        let observed = Arc::new(std::sync::Mutex::new(Vec::new()));
        let reader = store.clone();
        let sink = Arc::clone(&observed);
        let _sub = store.subscribe(move |event: &PairEvent, _| {
            // State is already committed when the event arrives.
            let state = reader.current_state();
            if let Ok(mut seen) = sink.lock() {
                seen.push((event.clone(), state.left));
            }
            Ok(())
        });

        let result = store.dispatch(PairCommand::Set(5)).await;
        assert!(result.is_ok());
        assert_eq!(store.snapshot().revision, 1);
        let seen = observed.lock().map(|s| s.clone()).unwrap_or_default();
        assert_eq!(seen, vec![(PairEvent::Set(5), 5)]);
    }

    #[tokio::test]
    async fn validation_error_leaves_state_and_emits_nothing() {
        let store = Store::spawn(PairReducer, Pair::default(), 16);
        let hits = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&hits);
        let _sub = store.subscribe(move |_, _| {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(())
        });

        let result = store.dispatch(PairCommand::Reject).await;
        assert!(matches!(result, Err(StoreError::Validation(_))));
        assert_eq!(store.snapshot().revision, 0);
        assert_eq!(hits.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn unchanged_transition_does_not_commit() {
        let store = Store::spawn(PairReducer, Pair::default(), 16);
        assert!(store.dispatch(PairCommand::Noop).await.is_ok());
        assert_eq!(store.snapshot().revision, 0);
    }

    #[tokio::test]
    async fn transient_error_is_recorded_and_store_stays_usable() {
        let store = Store::spawn(PairReducer, Pair::default(), 16);

        let result = store.dispatch(PairCommand::Outage).await;
        let Err(err) = result else {
            panic!("expected a transient failure");
        };
        assert!(err.is_retryable());
        let state = store.current_state();
        assert_eq!(
            state.last_error.as_deref(),
            Some("transient failure: service unavailable: backend")
        );

        assert!(store.dispatch(PairCommand::Set(1)).await.is_ok());
        assert_eq!(store.current_state().last_error, None);
    }

    #[tokio::test]
    async fn failing_subscriber_does_not_fail_dispatch() {
        let store = Store::spawn(PairReducer, Pair::default(), 16);
        let _bad = store.subscribe(|_, _| Err(HandlerError::new("broken consumer")));
        assert!(store.dispatch(PairCommand::Set(3)).await.is_ok());
        assert_eq!(store.current_state().left, 3);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_dispatches_never_expose_partial_state() {
        let store = Store::spawn(PairReducer, Pair::default(), 64);
        let mut watcher = store.watch();
        let observer = tokio::spawn(async move {
            let mut torn = 0usize;
            while watcher.changed().await.is_ok() {
                let snapshot = watcher.borrow_and_update().clone();
                if snapshot.state.left != snapshot.state.right {
                    torn += 1;
                }
                if snapshot.revision == 50 {
                    break;
                }
            }
            torn
        });

        let mut tasks = Vec::new();
        for value in 1..=50u64 {
            let store = store.clone();
            tasks.push(tokio::spawn(async move { store.dispatch(PairCommand::Set(value)).await }));
        }
        for _ in 0..200 {
            let state = store.current_state();
            assert_eq!(state.left, state.right);
            tokio::task::yield_now().await;
        }
        for task in tasks {
            let Ok(result) = task.await else {
                panic!("dispatch task panicked");
            };
            assert!(result.is_ok());
        }

        let Ok(torn) = observer.await else {
            panic!("observer panicked");
        };
        assert_eq!(torn, 0);
        assert_eq!(store.snapshot().revision, 50);
    }

    #[tokio::test]
    async fn posted_commands_apply_in_order() {
        let store = Store::spawn(PairReducer, Pair::default(), 16);
        for value in 1..=5 {
            assert!(store.post(PairCommand::Set(value)).is_ok());
        }
        assert!(store.settle().await.is_ok());
        assert_eq!(store.current_state().left, 5);
        assert_eq!(store.snapshot().revision, 5);
    }

    #[tokio::test]
    async fn try_post_reports_backpressure_when_mailbox_full() {
        let store = Store::spawn(PairReducer, Pair::default(), 1);
        let mut refused = false;
        for value in 0..64 {
            if let Err(err) = store.try_post(PairCommand::Set(value)) {
                assert_eq!(err, StoreError::Backpressure("pair"));
                refused = true;
                break;
            }
        }
        assert!(refused);
    }

    #[tokio::test]
    async fn post_accepts_bursts_beyond_mailbox_capacity() {
        let store = Store::spawn(PairReducer, Pair::default(), 1);
        for value in 1..=64 {
            assert!(store.post(PairCommand::Set(value)).is_ok());
        }
        assert!(store.settle().await.is_ok());
        assert_eq!(store.snapshot().revision, 64);
        assert_eq!(store.current_state().left, 64);
    }

    #[tokio::test]
    async fn wait_for_resolves_on_matching_commit() {
        let store = Store::spawn(PairReducer, Pair::default(), 16);
        let waiter = store.clone();
        let pending = tokio::spawn(async move { waiter.wait_for(|s| s.left == 9).await });
        assert!(store.dispatch(PairCommand::Set(9)).await.is_ok());
        let Ok(Ok(state)) = pending.await else {
            panic!("wait_for failed");
        };
        assert_eq!(state.right, 9);
    }

    #[tokio::test]
    async fn watch_notifies_each_commit() {
        let store = Store::spawn(PairReducer, Pair::default(), 16);
        let mut rx = store.watch();
        assert!(store.dispatch(PairCommand::Set(3)).await.is_ok());
        assert!(rx.changed().await.is_ok());
        let snapshot = rx.borrow_and_update().clone();
        assert_eq!(snapshot.revision, 1);
        assert_eq!(snapshot.state.left, 3);

        assert!(store.dispatch(PairCommand::Noop).await.is_ok());
        assert!(!rx.has_changed().unwrap_or(true));
    }
}

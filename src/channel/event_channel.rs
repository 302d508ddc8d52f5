//! Typed fan-out channel with per-subscriber fault isolation.
//!
//! [`EventChannel`] keeps its registry as a copy-on-write list behind an
//! `RwLock`. `emit` clones the current list (one `Arc` clone under a read
//! lock) and delivers outside the lock, so handlers may subscribe or cancel
//! re-entrantly while a fan-out is running.

use std::any::Any;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, PoisonError, RwLock, Weak};

use super::subscription::{CancelFlag, Delivery, Detach, Subscription, SubscriptionId};
use crate::error::{DeliveryFault, HandlerError};

/// Boxed delivery endpoint.
pub type Handler<E> = dyn Fn(&E, &Delivery) -> Result<(), HandlerError> + Send + Sync;

struct Entry<E> {
    id: SubscriptionId,
    flag: CancelFlag,
    handler: Box<Handler<E>>,
}

type Snapshot<E> = Arc<Vec<Arc<Entry<E>>>>;

struct Registry<E> {
    entries: RwLock<Snapshot<E>>,
}

impl<E> Registry<E> {
    fn snapshot(&self) -> Snapshot<E> {
        let guard = self.entries.read().unwrap_or_else(PoisonError::into_inner);
        Arc::clone(&guard)
    }

    fn insert(&self, entry: Entry<E>) {
        let mut guard = self.entries.write().unwrap_or_else(PoisonError::into_inner);
        let mut next = Vec::with_capacity(guard.len().saturating_add(1));
        next.extend(guard.iter().map(Arc::clone));
        next.push(Arc::new(entry));
        *guard = Arc::new(next);
    }

    fn remove(&self, id: SubscriptionId) -> bool {
        let mut guard = self.entries.write().unwrap_or_else(PoisonError::into_inner);
        if !guard.iter().any(|entry| entry.id == id) {
            return false;
        }
        let next: Vec<_> = guard
            .iter()
            .filter(|entry| entry.id != id)
            .map(Arc::clone)
            .collect();
        *guard = Arc::new(next);
        true
    }

    fn len(&self) -> usize {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }
}

impl<E> Detach for Registry<E>
where
    E: 'static,
{
    fn detach(&self, id: SubscriptionId) -> bool {
        self.remove(id)
    }
}

/// Outcome of a single [`EventChannel::emit`] call.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EmitReport {
    /// Emission sequence number on the channel.
    pub sequence: u64,
    /// Handlers that completed successfully.
    pub delivered: usize,
    /// Snapshotted entries skipped because they were cancelled mid fan-out.
    pub skipped: usize,
    /// Handler failures caught during this fan-out.
    pub faults: Vec<DeliveryFault>,
}

impl EmitReport {
    /// Returns `true` if no handler failed.
    #[must_use]
    pub fn is_clean(&self) -> bool {
        self.faults.is_empty()
    }
}

/// Broadcast channel for events of type `E`.
///
/// Owned by exactly one store. Delivery is synchronous and in registration
/// order; a handler that needs asynchronous work must hand it off (for
/// example by posting a command to its own store) and return.
pub struct EventChannel<E> {
    name: &'static str,
    registry: Arc<Registry<E>>,
    sequence: AtomicU64,
}

impl<E> EventChannel<E>
where
    E: Send + Sync + 'static,
{
    /// Creates an empty channel named after its owning store's context.
    #[must_use]
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            registry: Arc::new(Registry {
                entries: RwLock::new(Arc::new(Vec::new())),
            }),
            sequence: AtomicU64::new(0),
        }
    }

    /// Returns the channel name.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        self.name
    }

    /// Registers a handler. It sees every emission issued after this call
    /// returns.
    pub fn subscribe<F>(&self, handler: F) -> Subscription
    where
        F: Fn(&E, &Delivery) -> Result<(), HandlerError> + Send + Sync + 'static,
    {
        let id = SubscriptionId::next();
        let flag = CancelFlag::new();
        self.registry.insert(Entry {
            id,
            flag: flag.clone(),
            handler: Box::new(handler),
        });
        let registry: Weak<dyn Detach> = Arc::downgrade(&self.registry) as Weak<dyn Detach>;
        tracing::debug!(channel = self.name, subscription = %id, "subscription registered");
        Subscription::new(id, self.name, flag, registry)
    }

    /// Removes `subscription` from this channel if it is registered here.
    ///
    /// Safe to call from inside a handler. Returns `true` if an entry was
    /// removed.
    pub fn unsubscribe(&self, subscription: &Subscription) -> bool {
        if !self.registry.remove(subscription.id()) {
            return false;
        }
        subscription.cancel();
        true
    }

    /// Delivers `event` to every subscription registered at call time.
    ///
    /// Handler errors and panics are caught, logged and reported in the
    /// returned [`EmitReport`]; they never abort the fan-out.
    pub fn emit(&self, event: &E) -> EmitReport {
        let sequence = self.sequence.fetch_add(1, Ordering::AcqRel).saturating_add(1);
        let snapshot = self.registry.snapshot();
        let mut report = EmitReport {
            sequence,
            ..EmitReport::default()
        };

        for entry in snapshot.iter() {
            if entry.flag.is_cancelled() {
                report.skipped = report.skipped.saturating_add(1);
                continue;
            }
            let delivery = Delivery::new(self.name, entry.id, sequence, entry.flag.clone());
            let outcome = panic::catch_unwind(AssertUnwindSafe(|| {
                (entry.handler)(event, &delivery)
            }));
            let fault = match outcome {
                Ok(Ok(())) => {
                    report.delivered = report.delivered.saturating_add(1);
                    continue;
                }
                Ok(Err(source)) => DeliveryFault::Failed {
                    channel: self.name,
                    subscription: entry.id,
                    source,
                },
                Err(payload) => DeliveryFault::Panicked {
                    channel: self.name,
                    subscription: entry.id,
                    message: panic_message(payload.as_ref()),
                },
            };
            tracing::warn!(
                channel = self.name,
                subscription = %entry.id,
                sequence,
                error = %fault,
                "delivery fault isolated"
            );
            report.faults.push(fault);
        }

        report
    }

    /// Returns the number of registered subscriptions.
    #[must_use]
    pub fn subscriber_count(&self) -> usize {
        self.registry.len()
    }
}

impl<E> fmt::Debug for EventChannel<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventChannel")
            .field("name", &self.name)
            .field("subscribers", &self.registry.len())
            .field("sequence", &self.sequence.load(Ordering::Relaxed))
            .finish()
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use super::*;
    use std::sync::Mutex;
    use std::sync::atomic::AtomicUsize;

    fn counter() -> Arc<AtomicUsize> {
        Arc::new(AtomicUsize::new(0))
    }

    fn counting(
        hits: &Arc<AtomicUsize>,
    ) -> impl Fn(&u32, &Delivery) -> Result<(), HandlerError> + Send + Sync + 'static {
        let hits = Arc::clone(hits);
        move |_: &u32, _: &Delivery| {
            hits.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    #[test]
    fn emit_without_subscribers_delivers_nothing() {
        let channel = EventChannel::<u32>::new("test");
        let report = channel.emit(&1);
        assert_eq!(report.delivered, 0);
        assert_eq!(report.sequence, 1);
        assert!(report.is_clean());
    }

    #[test]
    fn every_subscriber_receives_each_event_once() {
        let channel = EventChannel::<u32>::new("test");
        let a = counter();
        let b = counter();
        let _sa = channel.subscribe(counting(&a));
        let _sb = channel.subscribe(counting(&b));

        let report = channel.emit(&7);
        assert_eq!(report.delivered, 2);
        assert_eq!(a.load(Ordering::SeqCst), 1);
        assert_eq!(b.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn late_subscriber_misses_earlier_events() {
        let channel = EventChannel::<u32>::new("test");
        let _ = channel.emit(&1);
        let late = counter();
        let _sub = channel.subscribe(counting(&late));
        assert_eq!(late.load(Ordering::SeqCst), 0);

        let _ = channel.emit(&2);
        assert_eq!(late.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn delivery_follows_registration_order() {
        let channel = EventChannel::<u32>::new("test");
        let order = Arc::new(Mutex::new(Vec::new()));
        let mut subs = Vec::new();
        for tag in 0..4u32 {
            let order = Arc::clone(&order);
            subs.push(channel.subscribe(move |_, _| {
                if let Ok(mut order) = order.lock() {
                    order.push(tag);
                }
                Ok(())
            }));
        }

        let _ = channel.emit(&0);
        let seen = order.lock().map(|o| o.clone()).unwrap_or_default();
        assert_eq!(seen, vec![0, 1, 2, 3]);
    }

    #[test]
    fn subscription_added_during_fanout_is_not_notified() {
        let channel = Arc::new(EventChannel::<u32>::new("test"));
        let late_hits = counter();
        let added = Arc::new(Mutex::new(Vec::new()));

        let chan = Arc::clone(&channel);
        let hits = Arc::clone(&late_hits);
        let store = Arc::clone(&added);
        let _adder = channel.subscribe(move |event, _| {
            if *event == 1 {
                let sub = chan.subscribe(counting(&hits));
                if let Ok(mut added) = store.lock() {
                    added.push(sub);
                }
            }
            Ok(())
        });

        let report = channel.emit(&1);
        assert_eq!(report.delivered, 1);
        assert_eq!(late_hits.load(Ordering::SeqCst), 0);
        assert_eq!(channel.subscriber_count(), 2);

        let _ = channel.emit(&2);
        assert_eq!(late_hits.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn handler_can_cancel_itself_during_fanout() {
        let channel = EventChannel::<u32>::new("test");
        let slot: Arc<Mutex<Option<Subscription>>> = Arc::new(Mutex::new(None));
        let hits = counter();

        let own = Arc::clone(&slot);
        let own_hits = Arc::clone(&hits);
        let sub = channel.subscribe(move |_, _| {
            own_hits.fetch_add(1, Ordering::SeqCst);
            if let Ok(guard) = own.lock()
                && let Some(sub) = guard.as_ref()
            {
                sub.cancel();
            }
            Ok(())
        });
        if let Ok(mut guard) = slot.lock() {
            *guard = Some(sub);
        }
        let other = counter();
        let _other_sub = channel.subscribe(counting(&other));

        let first = channel.emit(&1);
        assert_eq!(first.delivered, 2);
        let second = channel.emit(&2);
        assert_eq!(second.delivered, 1);
        assert_eq!(hits.load(Ordering::SeqCst), 1);
        assert_eq!(other.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn cancelled_mid_fanout_entry_is_skipped() {
        let channel = EventChannel::<u32>::new("test");
        let victim_hits = counter();
        let slot: Arc<Mutex<Option<Subscription>>> = Arc::new(Mutex::new(None));

        let target = Arc::clone(&slot);
        let _killer = channel.subscribe(move |_, _| {
            if let Ok(guard) = target.lock()
                && let Some(victim) = guard.as_ref()
            {
                victim.cancel();
            }
            Ok(())
        });
        let victim = channel.subscribe(counting(&victim_hits));
        if let Ok(mut guard) = slot.lock() {
            *guard = Some(victim);
        }

        let report = channel.emit(&1);
        assert_eq!(report.delivered, 1);
        assert_eq!(report.skipped, 1);
        assert_eq!(victim_hits.load(Ordering::SeqCst), 0);
        assert_eq!(channel.subscriber_count(), 1);
    }

    #[test]
    fn failing_handler_does_not_stop_fanout() {
        let channel = EventChannel::<u32>::new("test");
        let after = counter();
        let failing = channel.subscribe(|_, _| Err(HandlerError::new("nope")));
        let _ok = channel.subscribe(counting(&after));

        let report = channel.emit(&1);
        assert_eq!(report.delivered, 1);
        assert_eq!(report.faults.len(), 1);
        assert_eq!(after.load(Ordering::SeqCst), 1);

        let Some(DeliveryFault::Failed { subscription, .. }) = report.faults.first() else {
            panic!("expected a handler failure");
        };
        assert_eq!(*subscription, failing.id());
        // Faults never unsubscribe.
        assert_eq!(channel.subscriber_count(), 2);
        assert!(!failing.is_cancelled());
    }

    #[test]
    fn panicking_handler_is_isolated() {
        let channel = EventChannel::<u32>::new("test");
        let after = counter();
        let _bad = channel.subscribe(|_, _| panic!("handler exploded"));
        let _ok = channel.subscribe(counting(&after));

        let report = channel.emit(&1);
        assert_eq!(after.load(Ordering::SeqCst), 1);
        let Some(DeliveryFault::Panicked { message, .. }) = report.faults.first() else {
            panic!("expected a panic fault");
        };
        assert_eq!(message, "handler exploded");

        let again = channel.emit(&2);
        assert_eq!(again.faults.len(), 1);
        assert_eq!(after.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn unsubscribe_is_idempotent_and_channel_scoped() {
        let a = EventChannel::<u32>::new("a");
        let b = EventChannel::<u32>::new("b");
        let sub = a.subscribe(|_, _| Ok(()));

        assert!(!b.unsubscribe(&sub));
        assert!(!sub.is_cancelled());
        assert!(a.unsubscribe(&sub));
        assert!(!a.unsubscribe(&sub));
        assert!(!sub.cancel());
        assert_eq!(a.subscriber_count(), 0);
    }

    #[test]
    fn cancel_after_channel_dropped_is_noop() {
        let channel = EventChannel::<u32>::new("gone");
        let sub = channel.subscribe(|_, _| Ok(()));
        drop(channel);
        assert!(sub.cancel());
        assert!(!sub.cancel());
    }

    #[test]
    fn delivery_carries_sequence_and_subscription() {
        let channel = EventChannel::<u32>::new("seq");
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let sub = channel.subscribe(move |_, delivery| {
            if let Ok(mut seen) = sink.lock() {
                seen.push((delivery.sequence(), delivery.subscription(), delivery.channel()));
            }
            Ok(())
        });

        let _ = channel.emit(&1);
        let _ = channel.emit(&2);
        let seen = seen.lock().map(|s| s.clone()).unwrap_or_default();
        assert_eq!(seen, vec![(1, sub.id(), "seq"), (2, sub.id(), "seq")]);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn cancel_from_another_task_stops_an_ongoing_fan_out() {
        let channel = Arc::new(EventChannel::<u32>::new("slow"));
        let hits = counter();
        let seen = Arc::clone(&hits);
        let sub = channel.subscribe(move |_, _| {
            seen.fetch_add(1, Ordering::SeqCst);
            std::thread::sleep(std::time::Duration::from_millis(2));
            Ok(())
        });

        let emitter = Arc::clone(&channel);
        let emitting = tokio::task::spawn_blocking(move || {
            for value in 0..200 {
                let _ = emitter.emit(&value);
            }
        });
        while hits.load(Ordering::SeqCst) < 5 {
            tokio::time::sleep(std::time::Duration::from_millis(1)).await;
        }

        let Ok(cancelled) = tokio::spawn(async move { sub.cancel() }).await else {
            panic!("cancelling task failed");
        };
        assert!(cancelled);
        let at_cancel = hits.load(Ordering::SeqCst);
        assert!(emitting.await.is_ok());

        // At most the delivery already in flight completes after cancel.
        let total = hits.load(Ordering::SeqCst);
        assert!(at_cancel < 200);
        assert!(total <= at_cancel.saturating_add(1), "{total} > {at_cancel} + 1");
        assert_eq!(channel.subscriber_count(), 0);
    }
}

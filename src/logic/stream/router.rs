//! Event Router
//!
//! Typed publish/subscribe registry. Handlers are partitioned by
//! [`EventKind`] and invoked synchronously, in registration order.
//! A failing handler never stops delivery to the handlers after it.

use std::collections::HashMap;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::RwLock;

use super::frame::{EventKind, StreamEvent};
use crate::error::{StreamError, StreamResult};

/// Subscriber callback
pub type Handler = Arc<dyn Fn(&StreamEvent) -> StreamResult<()> + Send + Sync>;

/// Handle returned by [`EventRouter::subscribe`], used to unsubscribe
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Subscription {
    kind: EventKind,
    id: u64,
}

impl Subscription {
    pub fn kind(&self) -> EventKind {
        self.kind
    }
}

/// Result of a single dispatch
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DispatchOutcome {
    pub delivered: usize,
    pub failed: usize,
}

#[derive(Default)]
pub struct EventRouter {
    handlers: RwLock<HashMap<EventKind, Vec<(u64, Handler)>>>,
    next_id: AtomicU64,
}

impl EventRouter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a handler for one event kind
    pub fn subscribe<F>(&self, kind: EventKind, handler: F) -> Subscription
    where
        F: Fn(&StreamEvent) -> StreamResult<()> + Send + Sync + 'static,
    {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.handlers
            .write()
            .entry(kind)
            .or_default()
            .push((id, Arc::new(handler)));

        tracing::trace!(kind = %kind, id, "handler subscribed");
        Subscription { kind, id }
    }

    /// Remove exactly one registration; returns false if it was already gone
    pub fn unsubscribe(&self, subscription: &Subscription) -> bool {
        let mut handlers = self.handlers.write();
        let Some(list) = handlers.get_mut(&subscription.kind) else {
            return false;
        };

        match list.iter().position(|(id, _)| *id == subscription.id) {
            Some(index) => {
                list.remove(index);
                if list.is_empty() {
                    handlers.remove(&subscription.kind);
                }
                true
            }
            None => false,
        }
    }

    pub fn handler_count(&self, kind: EventKind) -> usize {
        self.handlers.read().get(&kind).map_or(0, Vec::len)
    }

    /// Deliver an event to every handler registered for its kind
    ///
    /// The handler list is snapshotted first, so handlers may subscribe or
    /// unsubscribe from inside a callback.
    pub fn dispatch(&self, event: &StreamEvent) -> DispatchOutcome {
        let kind = event.kind();
        let snapshot: Vec<(u64, Handler)> = match self.handlers.read().get(&kind) {
            Some(list) => list.clone(),
            None => return DispatchOutcome::default(),
        };

        let mut outcome = DispatchOutcome::default();
        for (id, handler) in snapshot {
            let result = panic::catch_unwind(AssertUnwindSafe(|| handler(event)))
                .unwrap_or_else(|payload| Err(StreamError::Handler(panic_message(payload))));

            match result {
                Ok(()) => outcome.delivered += 1,
                Err(e) => {
                    outcome.failed += 1;
                    tracing::error!(kind = %kind, handler = id, "Handler failed: {}", e);
                }
            }
        }

        outcome
    }
}

impl std::fmt::Debug for EventRouter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let counts: HashMap<EventKind, usize> = self
            .handlers
            .read()
            .iter()
            .map(|(kind, list)| (*kind, list.len()))
            .collect();
        f.debug_struct("EventRouter").field("handlers", &counts).finish()
    }
}

fn panic_message(payload: Box<dyn std::any::Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        format!("handler panicked: {}", s)
    } else if let Some(s) = payload.downcast_ref::<String>() {
        format!("handler panicked: {}", s)
    } else {
        "handler panicked".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::logic::stream::ConnectionState;
    use parking_lot::Mutex;

    fn stats_event() -> StreamEvent {
        StreamEvent::Stats(serde_json::json!({"total_flows": 3}))
    }

    #[test]
    fn test_handlers_run_in_registration_order() {
        let router = EventRouter::new();
        let seen = Arc::new(Mutex::new(Vec::new()));

        for label in ["first", "second", "third"] {
            let seen = seen.clone();
            router.subscribe(EventKind::Stats, move |_| {
                seen.lock().push(label);
                Ok(())
            });
        }

        let outcome = router.dispatch(&stats_event());
        assert_eq!(outcome, DispatchOutcome { delivered: 3, failed: 0 });
        assert_eq!(*seen.lock(), vec!["first", "second", "third"]);
    }

    #[test]
    fn test_strict_partitioning_by_kind() {
        let router = EventRouter::new();
        let hits = Arc::new(AtomicU64::new(0));

        let counter = hits.clone();
        router.subscribe(EventKind::VmStatus, move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(())
        });

        router.dispatch(&stats_event());
        router.dispatch(&StreamEvent::Connection(ConnectionState::Connected));
        assert_eq!(hits.load(Ordering::SeqCst), 0);

        router.dispatch(&StreamEvent::VmStatus(serde_json::Value::Null));
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_failing_handler_is_isolated() {
        let router = EventRouter::new();
        let reached = Arc::new(AtomicU64::new(0));

        router.subscribe(EventKind::Stats, |_| Err(StreamError::Handler("boom".into())));
        router.subscribe(EventKind::Stats, |_| panic!("handler exploded"));
        let counter = reached.clone();
        router.subscribe(EventKind::Stats, move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(())
        });

        let outcome = router.dispatch(&stats_event());
        assert_eq!(outcome, DispatchOutcome { delivered: 1, failed: 2 });
        assert_eq!(reached.load(Ordering::SeqCst), 1);

        // Future dispatches are unaffected
        router.dispatch(&stats_event());
        assert_eq!(reached.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_unsubscribe_removes_exactly_one() {
        let router = EventRouter::new();
        let a = router.subscribe(EventKind::Stats, |_| Ok(()));
        let b = router.subscribe(EventKind::Stats, |_| Ok(()));

        assert_eq!(router.handler_count(EventKind::Stats), 2);
        assert!(router.unsubscribe(&a));
        assert!(!router.unsubscribe(&a));
        assert_eq!(router.handler_count(EventKind::Stats), 1);

        assert!(router.unsubscribe(&b));
        assert_eq!(router.handler_count(EventKind::Stats), 0);
        assert_eq!(router.dispatch(&stats_event()), DispatchOutcome::default());
    }

    #[test]
    fn test_unsubscribe_from_inside_handler() {
        let router = Arc::new(EventRouter::new());
        let slot: Arc<Mutex<Option<Subscription>>> = Arc::new(Mutex::new(None));
        let calls = Arc::new(AtomicU64::new(0));

        let (r, s, c) = (router.clone(), slot.clone(), calls.clone());
        let sub = router.subscribe(EventKind::Stats, move |_| {
            c.fetch_add(1, Ordering::SeqCst);
            if let Some(sub) = s.lock().take() {
                r.unsubscribe(&sub);
            }
            Ok(())
        });
        *slot.lock() = Some(sub);

        router.dispatch(&stats_event());
        router.dispatch(&stats_event());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}

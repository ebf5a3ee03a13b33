//! Stream Client
//!
//! Explicitly owned entry point for a UI layer. Wires the connection
//! manager, router, aggregator and notification manager together and
//! exposes pull-based snapshots for any render cadence.
//!
//! Window arithmetic (ingest, snapshots and the eviction tick) reads one
//! injectable wall clock, so window expiry can be driven from tests.

use std::collections::BTreeMap;
use std::sync::{Arc, Weak};

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::Serialize;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use super::aggregator::{AggregatorSnapshot, StreamAggregator, TimelinePoint};
use super::detection::{Category, DetectionEvent};
use super::notifications::{Notification, NotificationManager};
use super::stream::{
    decode_frame, ConnectionManager, ConnectionState, ConnectionStatus, Connector,
    DispatchOutcome, EventKind, EventRouter, StreamEvent, Subscription, WebSocketConnector,
};
use crate::config::StreamConfig;
use crate::error::StreamResult;

/// Wall-clock source for the recent window
pub type Clock = Arc<dyn Fn() -> DateTime<Utc> + Send + Sync>;

/// Full state for one render tick
#[derive(Debug, Clone, Serialize)]
pub struct StreamSnapshot {
    pub connection: ConnectionStatus,
    pub aggregates: AggregatorSnapshot,
    pub notifications: Vec<Notification>,
}

pub struct StreamClient {
    config: StreamConfig,
    router: Arc<EventRouter>,
    connection: ConnectionManager,
    aggregator: Arc<Mutex<StreamAggregator>>,
    notifications: NotificationManager,
    clock: Clock,
    internal_subscriptions: Vec<Subscription>,
    eviction_tick: Mutex<Option<JoinHandle<()>>>,
}

impl StreamClient {
    /// Client on the WebSocket transport
    pub fn new(config: StreamConfig) -> StreamResult<Self> {
        Self::with_connector(config, Arc::new(WebSocketConnector))
    }

    pub fn with_connector(config: StreamConfig, connector: Arc<dyn Connector>) -> StreamResult<Self> {
        Self::with_clock(config, connector, Arc::new(Utc::now))
    }

    /// Client with an explicit wall clock for the recent window
    pub fn with_clock(
        config: StreamConfig,
        connector: Arc<dyn Connector>,
        clock: Clock,
    ) -> StreamResult<Self> {
        config.validate()?;

        let router = Arc::new(EventRouter::new());
        let aggregator = Arc::new(Mutex::new(StreamAggregator::from_config(&config)));
        let notifications = NotificationManager::from_config(&config);

        // Each consumer gets its own copy of the event
        let (agg, now) = (aggregator.clone(), clock.clone());
        let aggregate_sub = router.subscribe(EventKind::Detection, move |event| {
            if let Some(detection) = event.as_detection() {
                agg.lock().ingest_at(detection.clone(), now());
            }
            Ok(())
        });

        let notifier = notifications.clone();
        let notify_sub = router.subscribe(EventKind::Detection, move |event| {
            if let Some(detection) = event.as_detection() {
                notifier.ingest(detection);
            }
            Ok(())
        });

        let connection = ConnectionManager::new(
            config.ws_url.clone(),
            config.reconnect_delay(),
            connector,
            router.clone(),
        );

        tracing::debug!(url = %config.ws_url, "Stream client created");

        Ok(Self {
            config,
            router,
            connection,
            aggregator,
            notifications,
            clock,
            internal_subscriptions: vec![aggregate_sub, notify_sub],
            eviction_tick: Mutex::new(None),
        })
    }

    pub fn config(&self) -> &StreamConfig {
        &self.config
    }

    // ------------------------------------------------------------------------
    // Lifecycle
    // ------------------------------------------------------------------------

    /// Start streaming; must be called inside a tokio runtime
    pub fn connect(&self) {
        self.connection.connect();

        let mut tick = self.eviction_tick.lock();
        if tick.is_none() {
            *tick = Some(spawn_eviction_tick(
                Arc::downgrade(&self.aggregator),
                self.clock.clone(),
                self.config.eviction_tick(),
            ));
        }
    }

    /// Stop streaming and cancel every background timer of the connection
    pub fn disconnect(&self) {
        self.connection.disconnect();

        if let Some(tick) = self.eviction_tick.lock().take() {
            tick.abort();
        }
    }

    pub fn connection_state(&self) -> ConnectionState {
        self.connection.state()
    }

    pub fn connection_status(&self) -> ConnectionStatus {
        self.connection.status()
    }

    /// Whether the periodic window eviction is running
    pub fn eviction_tick_active(&self) -> bool {
        self.eviction_tick
            .lock()
            .as_ref()
            .is_some_and(|tick| !tick.is_finished())
    }

    // ------------------------------------------------------------------------
    // Routing
    // ------------------------------------------------------------------------

    /// Subscribe an external collaborator (e.g. VM status panel)
    pub fn subscribe<F>(&self, kind: EventKind, handler: F) -> Subscription
    where
        F: Fn(&StreamEvent) -> StreamResult<()> + Send + Sync + 'static,
    {
        self.router.subscribe(kind, handler)
    }

    pub fn unsubscribe(&self, subscription: &Subscription) -> bool {
        if self.internal_subscriptions.contains(subscription) {
            tracing::warn!("Refusing to remove an internal subscription");
            return false;
        }
        self.router.unsubscribe(subscription)
    }

    pub fn router(&self) -> &Arc<EventRouter> {
        &self.router
    }

    /// Feed an already decoded event through the router
    pub fn dispatch(&self, event: &StreamEvent) -> DispatchOutcome {
        self.router.dispatch(event)
    }

    /// Decode and dispatch one raw frame, as if read from the transport
    ///
    /// Counts and the timeline update anywhere; attack notifications need a
    /// tokio runtime for their TTL timer and are skipped without one.
    pub fn ingest_frame(&self, text: &str) -> StreamResult<DispatchOutcome> {
        let event = decode_frame(text)?;
        Ok(self.router.dispatch(&event))
    }

    // ------------------------------------------------------------------------
    // Snapshots
    // ------------------------------------------------------------------------

    pub fn current_counts(&self) -> BTreeMap<Category, u64> {
        self.aggregator.lock().counts_at((self.clock)())
    }

    pub fn current_timeline(&self) -> Vec<TimelinePoint> {
        self.aggregator.lock().current_timeline()
    }

    pub fn current_recent(&self) -> Vec<DetectionEvent> {
        self.aggregator.lock().recent_at((self.clock)())
    }

    /// Events held in the window buffer, before the read-time cutoff
    pub fn retained_events(&self) -> usize {
        self.aggregator.lock().retained()
    }

    pub fn current_notifications(&self) -> Vec<Notification> {
        self.notifications.current_notifications()
    }

    pub fn snapshot(&self) -> StreamSnapshot {
        StreamSnapshot {
            connection: self.connection.status(),
            aggregates: self.aggregator.lock().snapshot_at((self.clock)()),
            notifications: self.notifications.current_notifications(),
        }
    }

    pub fn dismiss(&self, id: &str) -> bool {
        self.notifications.dismiss(id)
    }

    pub fn dismiss_all(&self) -> usize {
        self.notifications.dismiss_all()
    }
}

impl Drop for StreamClient {
    fn drop(&mut self) {
        self.disconnect();
        self.notifications.dismiss_all();
    }
}

impl std::fmt::Debug for StreamClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StreamClient")
            .field("connection", &self.connection)
            .field("notifications", &self.notifications)
            .finish()
    }
}

fn spawn_eviction_tick(
    aggregator: Weak<Mutex<StreamAggregator>>,
    clock: Clock,
    period: std::time::Duration,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            interval.tick().await;
            let Some(aggregator) = aggregator.upgrade() else {
                break;
            };
            let evicted = aggregator.lock().evict_expired(clock());
            if evicted > 0 {
                tracing::trace!(evicted, "window eviction tick");
            }
        }
    })
}

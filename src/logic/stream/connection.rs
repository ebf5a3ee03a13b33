//! Connection Manager
//!
//! Owns the single persistent connection to the backend and drives the
//! 4-state machine:
//!
//! ```text
//!  Disconnected ──connect()──▶ Connecting ──open ok──▶ Connected
//!       ▲                         │  ▲                    │
//!       │                  open   │  │ delay              │ loss
//!  disconnect()            failed ▼  │ elapsed            ▼
//!   (any state)               Reconnecting ◀──────────────┘
//! ```
//!
//! Every `connect()` and `disconnect()` bumps an epoch. Sessions and
//! reconnect timers carry the epoch they were started under and do
//! nothing once it is stale, so an attempt in flight during `disconnect()`
//! cannot revive the connection.
//!
//! State changes are queued under the same lock that performs them and
//! delivered in that order by a single emitter at a time. A transition made
//! from inside a Connection handler is delivered after the current one.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use futures::StreamExt;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tokio::task::JoinHandle;

use super::frame::{decode_frame, StreamEvent};
use super::router::EventRouter;
use super::transport::Connector;

// ============================================================================
// STATE
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionState {
    #[default]
    Disconnected,
    Connecting,
    Connected,
    Reconnecting,
}

impl ConnectionState {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConnectionState::Disconnected => "disconnected",
            ConnectionState::Connecting => "connecting",
            ConnectionState::Connected => "connected",
            ConnectionState::Reconnecting => "reconnecting",
        }
    }
}

impl std::fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Connection status snapshot
#[derive(Debug, Clone, Default, Serialize)]
pub struct ConnectionStatus {
    pub state: ConnectionState,
    pub epoch: u64,
    /// Reconnects scheduled since the last successful open
    pub reconnect_attempts: u64,
    /// Reconnect timers that fired over the manager's lifetime
    pub total_reconnects: u64,
    pub connected_at: Option<DateTime<Utc>>,
    pub last_error: Option<String>,
    pub frames_received: u64,
    pub frames_dropped: u64,
}

struct Inner {
    status: ConnectionStatus,
    session: Option<JoinHandle<()>>,
    reconnect_timer: Option<JoinHandle<()>>,
    /// Transitions not yet delivered to subscribers, oldest first
    pending: VecDeque<ConnectionState>,
    /// Set while one caller is draining `pending`
    emitting: bool,
}

struct Shared {
    url: String,
    reconnect_delay: Duration,
    connector: Arc<dyn Connector>,
    router: Arc<EventRouter>,
    inner: Mutex<Inner>,
}

// ============================================================================
// MANAGER
// ============================================================================

/// Cheap to clone; all clones drive the same connection.
///
/// `connect()` spawns onto the current tokio runtime. Background tasks keep
/// the manager alive until `disconnect()` is called.
#[derive(Clone)]
pub struct ConnectionManager {
    shared: Arc<Shared>,
}

impl ConnectionManager {
    pub fn new(
        url: impl Into<String>,
        reconnect_delay: Duration,
        connector: Arc<dyn Connector>,
        router: Arc<EventRouter>,
    ) -> Self {
        Self {
            shared: Arc::new(Shared {
                url: url.into(),
                reconnect_delay,
                connector,
                router,
                inner: Mutex::new(Inner {
                    status: ConnectionStatus::default(),
                    session: None,
                    reconnect_timer: None,
                    pending: VecDeque::new(),
                    emitting: false,
                }),
            }),
        }
    }

    pub fn url(&self) -> &str {
        &self.shared.url
    }

    pub fn state(&self) -> ConnectionState {
        self.shared.inner.lock().status.state
    }

    pub fn is_connected(&self) -> bool {
        self.state() == ConnectionState::Connected
    }

    pub fn status(&self) -> ConnectionStatus {
        self.shared.inner.lock().status.clone()
    }

    pub fn router(&self) -> &Arc<EventRouter> {
        &self.shared.router
    }

    /// Open the connection unless one is already open or opening
    pub fn connect(&self) {
        let epoch = {
            let mut inner = self.shared.inner.lock();
            match inner.status.state {
                ConnectionState::Connecting | ConnectionState::Connected => {
                    tracing::debug!("connect() ignored, already {}", inner.status.state);
                    return;
                }
                ConnectionState::Disconnected | ConnectionState::Reconnecting => {}
            }

            if let Some(timer) = inner.reconnect_timer.take() {
                timer.abort();
            }
            inner.status.epoch += 1;
            inner.status.state = ConnectionState::Connecting;
            inner.pending.push_back(ConnectionState::Connecting);
            inner.status.epoch
        };

        tracing::info!(epoch, "Connecting to stream: {}", self.shared.url);
        self.deliver_transitions();

        // A Connecting handler may already have called disconnect()
        let mut inner = self.shared.inner.lock();
        if inner.status.epoch != epoch {
            return;
        }
        let manager = self.clone();
        inner.session = Some(tokio::spawn(async move {
            manager.run_session(epoch).await;
        }));
    }

    /// Close the connection and cancel any pending reconnect
    pub fn disconnect(&self) {
        let previous = {
            let mut inner = self.shared.inner.lock();
            inner.status.epoch += 1;

            if let Some(timer) = inner.reconnect_timer.take() {
                timer.abort();
            }
            // Aborting the session drops its frame stream, closing the transport
            if let Some(session) = inner.session.take() {
                session.abort();
            }

            let previous = inner.status.state;
            inner.status.state = ConnectionState::Disconnected;
            inner.status.connected_at = None;
            if previous != ConnectionState::Disconnected {
                inner.pending.push_back(ConnectionState::Disconnected);
            }
            previous
        };

        if previous != ConnectionState::Disconnected {
            tracing::info!("Stream disconnected (was {})", previous);
        }
        self.deliver_transitions();
    }

    // ------------------------------------------------------------------------
    // Background tasks
    // ------------------------------------------------------------------------

    async fn run_session(self, epoch: u64) {
        let mut frames = match self.shared.connector.connect(&self.shared.url).await {
            Ok(frames) => frames,
            Err(e) => {
                tracing::warn!(epoch, "Stream connection failed: {}", e);
                self.schedule_reconnect(epoch, e.to_string());
                return;
            }
        };

        if !self.mark_connected(epoch) {
            tracing::debug!(epoch, "Discarding stale connection attempt");
            return;
        }
        tracing::info!(epoch, "Stream connected");
        self.deliver_transitions();

        let reason = loop {
            match frames.next().await {
                Some(Ok(text)) => {
                    if !self.is_current(epoch) {
                        return;
                    }
                    self.handle_frame(&text);
                }
                Some(Err(e)) if e.is_decode() => {
                    self.shared.inner.lock().status.frames_dropped += 1;
                    tracing::warn!("Dropping undecodable frame: {}", e);
                }
                Some(Err(e)) => break e.to_string(),
                None => break "stream closed by peer".to_string(),
            }
        };

        drop(frames);
        tracing::warn!(epoch, "Stream lost: {}", reason);
        self.schedule_reconnect(epoch, reason);
    }

    fn handle_frame(&self, text: &str) {
        self.shared.inner.lock().status.frames_received += 1;

        match decode_frame(text) {
            Ok(event) => {
                tracing::trace!(kind = %event.kind(), "frame decoded");
                self.shared.router.dispatch(&event);
            }
            Err(e) => {
                self.shared.inner.lock().status.frames_dropped += 1;
                tracing::warn!("Dropping malformed frame: {}", e);
            }
        }
    }

    fn mark_connected(&self, epoch: u64) -> bool {
        let mut inner = self.shared.inner.lock();
        if inner.status.epoch != epoch || inner.status.state != ConnectionState::Connecting {
            return false;
        }

        if let Some(timer) = inner.reconnect_timer.take() {
            timer.abort();
        }
        inner.status.state = ConnectionState::Connected;
        inner.status.connected_at = Some(Utc::now());
        inner.status.reconnect_attempts = 0;
        inner.status.last_error = None;
        inner.pending.push_back(ConnectionState::Connected);
        true
    }

    fn schedule_reconnect(&self, epoch: u64, reason: String) {
        {
            let mut inner = self.shared.inner.lock();
            if inner.status.epoch != epoch || inner.status.state == ConnectionState::Disconnected {
                return;
            }

            inner.status.state = ConnectionState::Reconnecting;
            inner.status.connected_at = None;
            inner.status.last_error = Some(reason);
            inner.status.reconnect_attempts += 1;
            inner.pending.push_back(ConnectionState::Reconnecting);
            // The session calling us is finishing; detach its handle
            inner.session = None;

            if let Some(old) = inner.reconnect_timer.take() {
                old.abort();
            }
            let manager = self.clone();
            let delay = self.shared.reconnect_delay;
            inner.reconnect_timer = Some(tokio::spawn(async move {
                tokio::time::sleep(delay).await;
                manager.fire_reconnect(epoch);
            }));
        }

        tracing::info!(
            epoch,
            "Reconnecting in {}ms",
            self.shared.reconnect_delay.as_millis()
        );
        self.deliver_transitions();
    }

    fn fire_reconnect(&self, epoch: u64) {
        {
            let mut inner = self.shared.inner.lock();
            if inner.status.epoch != epoch || inner.status.state != ConnectionState::Reconnecting {
                return;
            }
            // This task is the timer; clear it so connect() does not abort it
            inner.reconnect_timer = None;
            inner.status.total_reconnects += 1;
        }

        tracing::info!("Attempting to reconnect...");
        self.connect();
    }

    fn is_current(&self, epoch: u64) -> bool {
        self.shared.inner.lock().status.epoch == epoch
    }

    /// Deliver queued transitions in the order they happened
    ///
    /// Returns at once if another caller (an outer frame on this thread, or
    /// another thread) is already draining; that caller delivers ours too.
    fn deliver_transitions(&self) {
        {
            let mut inner = self.shared.inner.lock();
            if inner.emitting {
                return;
            }
            inner.emitting = true;
        }

        loop {
            let next = {
                let mut inner = self.shared.inner.lock();
                let next = inner.pending.pop_front();
                if next.is_none() {
                    inner.emitting = false;
                }
                next
            };

            match next {
                Some(state) => {
                    self.shared.router.dispatch(&StreamEvent::Connection(state));
                }
                None => break,
            }
        }
    }
}

impl std::fmt::Debug for ConnectionManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionManager")
            .field("url", &self.shared.url)
            .field("reconnect_delay", &self.shared.reconnect_delay)
            .field("status", &self.status())
            .finish()
    }
}

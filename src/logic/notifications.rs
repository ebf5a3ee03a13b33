//! Notification Manager
//!
//! Ephemeral alerts for attack detections:
//! - One notification per `flow_id` in the live set
//! - Removed after the TTL or on dismissal, whichever comes first
//! - At most `capacity` live entries, oldest evicted first
//!
//! Each entry carries a serial. The TTL task only removes the entry with
//! the serial it was started for, so a dismissed (or evicted and re-added)
//! id is never removed twice.

use std::collections::VecDeque;
use std::sync::{Arc, Weak};
use std::time::Duration;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::Serialize;
use tokio::task::JoinHandle;

use crate::config::StreamConfig;
use crate::logic::detection::{Category, DetectionEvent};

/// One live attack alert
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Notification {
    /// The originating `flow_id`
    pub id: String,
    pub category: Category,
    pub title: String,
    pub message: String,
    pub confidence: f64,
    pub created_at: DateTime<Utc>,
}

impl Notification {
    fn from_event(event: &DetectionEvent) -> Self {
        Self {
            id: event.flow_id.clone(),
            category: event.prediction.clone(),
            title: format!("{} Detected", event.prediction),
            message: format!("From {}", event.route()),
            confidence: event.confidence,
            created_at: Utc::now(),
        }
    }
}

struct Entry {
    notification: Notification,
    serial: u64,
    expiry: Option<JoinHandle<()>>,
}

impl Entry {
    fn cancel(&mut self) {
        if let Some(timer) = self.expiry.take() {
            timer.abort();
        }
    }
}

#[derive(Default)]
struct Inner {
    /// Oldest at the front
    entries: VecDeque<Entry>,
    next_serial: u64,
}

impl Drop for Inner {
    fn drop(&mut self) {
        for entry in self.entries.iter_mut() {
            entry.cancel();
        }
    }
}

/// Cheap to clone; clones share the same live set.
///
/// `ingest()` spawns TTL timers onto the current tokio runtime. Called
/// outside a runtime it logs an error and creates nothing, since the entry
/// could never expire.
#[derive(Clone)]
pub struct NotificationManager {
    ttl: Duration,
    capacity: usize,
    inner: Arc<Mutex<Inner>>,
}

impl NotificationManager {
    pub fn new(ttl: Duration, capacity: usize) -> Self {
        Self {
            ttl,
            capacity,
            inner: Arc::new(Mutex::new(Inner::default())),
        }
    }

    pub fn from_config(config: &StreamConfig) -> Self {
        Self::new(config.notification_ttl(), config.notification_capacity)
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Create a notification for a new attack; `None` for benign or duplicate
    /// flows, and when no tokio runtime is available for the TTL timer
    pub fn ingest(&self, event: &DetectionEvent) -> Option<Notification> {
        if !event.is_attack {
            return None;
        }

        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            tracing::error!(
                flow_id = %event.flow_id,
                "No tokio runtime for the notification timer, alert not shown"
            );
            return None;
        };

        let mut inner = self.inner.lock();
        if inner.entries.iter().any(|e| e.notification.id == event.flow_id) {
            tracing::debug!(flow_id = %event.flow_id, "duplicate attack flow, notification exists");
            return None;
        }

        let notification = Notification::from_event(event);
        let serial = inner.next_serial;
        inner.next_serial += 1;

        let expiry = spawn_expiry(
            &runtime,
            Arc::downgrade(&self.inner),
            notification.id.clone(),
            serial,
            self.ttl,
        );
        inner.entries.push_back(Entry {
            notification: notification.clone(),
            serial,
            expiry: Some(expiry),
        });

        while inner.entries.len() > self.capacity {
            if let Some(mut oldest) = inner.entries.pop_front() {
                oldest.cancel();
                tracing::debug!(id = %oldest.notification.id, "notification evicted by capacity");
            }
        }

        tracing::info!(
            id = %notification.id,
            category = %notification.category,
            confidence = notification.confidence,
            "🚨 {}",
            notification.title
        );
        Some(notification)
    }

    /// Remove one notification now; returns false if it was already gone
    pub fn dismiss(&self, id: &str) -> bool {
        let mut inner = self.inner.lock();
        let Some(index) = inner.entries.iter().position(|e| e.notification.id == id) else {
            return false;
        };

        if let Some(mut entry) = inner.entries.remove(index) {
            entry.cancel();
        }
        true
    }

    /// Remove every notification; returns how many were live
    pub fn dismiss_all(&self) -> usize {
        let mut inner = self.inner.lock();
        let count = inner.entries.len();
        for mut entry in inner.entries.drain(..) {
            entry.cancel();
        }
        count
    }

    /// Live notifications, newest first
    pub fn current_notifications(&self) -> Vec<Notification> {
        self.inner
            .lock()
            .entries
            .iter()
            .rev()
            .map(|e| e.notification.clone())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.inner.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// TTL timers not yet fired or cancelled
    pub fn pending_timers(&self) -> usize {
        self.inner
            .lock()
            .entries
            .iter()
            .filter(|e| e.expiry.as_ref().is_some_and(|t| !t.is_finished()))
            .count()
    }
}

impl std::fmt::Debug for NotificationManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NotificationManager")
            .field("ttl", &self.ttl)
            .field("capacity", &self.capacity)
            .field("live", &self.len())
            .finish()
    }
}

fn spawn_expiry(
    runtime: &tokio::runtime::Handle,
    inner: Weak<Mutex<Inner>>,
    id: String,
    serial: u64,
    ttl: Duration,
) -> JoinHandle<()> {
    runtime.spawn(async move {
        tokio::time::sleep(ttl).await;

        let Some(inner) = inner.upgrade() else {
            return;
        };
        let mut inner = inner.lock();
        let position = inner
            .entries
            .iter()
            .position(|e| e.serial == serial && e.notification.id == id);

        if let Some(index) = position {
            // This task is the timer being fired; nothing to abort
            if let Some(mut entry) = inner.entries.remove(index) {
                entry.expiry = None;
            }
            tracing::debug!(id = %id, "notification expired");
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn attack(id: &str) -> DetectionEvent {
        DetectionEvent::new(id, Category::SshBruteforce, 0.92, Utc::now())
            .with_endpoints(("10.0.0.5", 40000), ("10.0.0.9", 22))
    }

    #[tokio::test(start_paused = true)]
    async fn test_attack_creates_notification() {
        let manager = NotificationManager::new(Duration::from_secs(10), 50);
        assert_eq!(manager.ttl(), Duration::from_secs(10));
        let created = manager.ingest(&attack("f1")).unwrap();

        assert_eq!(created.id, "f1");
        assert_eq!(created.category, Category::SshBruteforce);
        assert_eq!(created.title, "SSH-Bruteforce Detected");
        assert_eq!(created.message, "From 10.0.0.5:40000 → 10.0.0.9:22");
        assert_eq!(manager.len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_benign_never_notifies() {
        let manager = NotificationManager::new(Duration::from_secs(10), 50);
        let benign = DetectionEvent::new("f1", Category::Benign, 0.99, Utc::now());

        assert!(manager.ingest(&benign).is_none());
        assert!(manager.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_duplicate_flow_id_notifies_once() {
        let manager = NotificationManager::new(Duration::from_secs(10), 50);

        assert!(manager.ingest(&attack("f1")).is_some());
        assert!(manager.ingest(&attack("f1")).is_none());
        assert_eq!(manager.len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_expires_after_ttl() {
        let manager = NotificationManager::new(Duration::from_secs(10), 50);
        manager.ingest(&attack("f1"));

        tokio::time::sleep(Duration::from_millis(9_999)).await;
        assert_eq!(manager.len(), 1);

        tokio::time::sleep(Duration::from_millis(2)).await;
        assert!(manager.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_dismiss_then_ttl_is_noop() {
        let manager = NotificationManager::new(Duration::from_secs(10), 50);
        manager.ingest(&attack("f1"));

        assert!(manager.dismiss("f1"));
        assert!(!manager.dismiss("f1"));
        assert_eq!(manager.pending_timers(), 0);

        // A re-notified flow must survive the first entry's old deadline
        tokio::time::sleep(Duration::from_secs(5)).await;
        manager.ingest(&attack("f1"));
        tokio::time::sleep(Duration::from_secs(6)).await;
        assert_eq!(manager.len(), 1);

        tokio::time::sleep(Duration::from_secs(5)).await;
        assert!(manager.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_dismiss_all_cancels_timers() {
        let manager = NotificationManager::new(Duration::from_secs(10), 50);
        for i in 0..5 {
            manager.ingest(&attack(&format!("f{}", i)));
        }
        assert_eq!(manager.pending_timers(), 5);

        assert_eq!(manager.dismiss_all(), 5);
        assert!(manager.is_empty());
        assert_eq!(manager.pending_timers(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_capacity_evicts_oldest() {
        let manager = NotificationManager::new(Duration::from_secs(10), 50);
        for i in 0..60 {
            manager.ingest(&attack(&format!("f{}", i)));
        }

        let live = manager.current_notifications();
        assert_eq!(live.len(), 50);
        assert_eq!(live.first().unwrap().id, "f59");
        assert_eq!(live.last().unwrap().id, "f10");
        assert_eq!(manager.pending_timers(), 50);
    }

    #[test]
    fn test_ingest_without_runtime_creates_nothing() {
        let manager = NotificationManager::new(Duration::from_secs(10), 50);

        assert!(manager.ingest(&attack("f1")).is_none());
        assert!(manager.is_empty());
        assert_eq!(manager.pending_timers(), 0);
    }
}

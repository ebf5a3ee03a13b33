//! Stream Aggregator
//!
//! Bounded, derived views over the detection stream:
//! - Category counts over the recent window
//! - Recent window (events newer than `now - window`, exact at read time)
//! - Timeline (last N events in arrival order)
//!
//! The window buffer and the timeline are kept separately because one is
//! bounded by age and the other by count.

use std::collections::{BTreeMap, VecDeque};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::config::StreamConfig;
use crate::logic::detection::{Category, DetectionEvent};

// ============================================================================
// VIEWS
// ============================================================================

/// One charted point of the timeline
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TimelinePoint {
    /// 0 for the oldest retained point
    pub sequence_index: usize,
    /// `HH:MM:SS` (UTC)
    pub timestamp_label: String,
    pub category: Category,
    /// Confidence × 100, one decimal
    pub confidence_percent: f64,
    pub is_attack: bool,
}

/// Everything a render tick needs, taken at one instant
#[derive(Debug, Clone, Serialize)]
pub struct AggregatorSnapshot {
    pub counts: BTreeMap<Category, u64>,
    pub timeline: Vec<TimelinePoint>,
    pub recent_events: usize,
    pub total_events: u64,
    pub attack_events: u64,
    pub taken_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
struct TimelineEntry {
    timestamp: DateTime<Utc>,
    category: Category,
    confidence: f64,
    is_attack: bool,
}

// ============================================================================
// AGGREGATOR
// ============================================================================

#[derive(Debug)]
pub struct StreamAggregator {
    timeline_capacity: usize,
    window: chrono::Duration,
    window_capacity: usize,
    recent: VecDeque<DetectionEvent>,
    timeline: VecDeque<TimelineEntry>,
    total_events: u64,
    attack_events: u64,
}

impl StreamAggregator {
    pub fn new(timeline_capacity: usize, recent_window: Duration, window_capacity: usize) -> Self {
        let window_ms = i64::try_from(recent_window.as_millis()).unwrap_or(i64::MAX);

        Self {
            timeline_capacity,
            window: chrono::Duration::milliseconds(window_ms),
            window_capacity,
            recent: VecDeque::new(),
            timeline: VecDeque::with_capacity(timeline_capacity),
            total_events: 0,
            attack_events: 0,
        }
    }

    pub fn from_config(config: &StreamConfig) -> Self {
        Self::new(
            config.timeline_capacity,
            config.recent_window(),
            config.window_capacity,
        )
    }

    /// Consume one detection event
    pub fn ingest(&mut self, event: DetectionEvent) {
        self.ingest_at(event, Utc::now());
    }

    /// Consume one detection event, using `now` for window housekeeping
    pub fn ingest_at(&mut self, event: DetectionEvent, now: DateTime<Utc>) {
        self.total_events += 1;
        if event.is_attack {
            self.attack_events += 1;
        }

        // Timeline: strict FIFO by arrival
        self.timeline.push_back(TimelineEntry {
            timestamp: event.timestamp,
            category: event.prediction.clone(),
            confidence: event.confidence,
            is_attack: event.is_attack,
        });
        while self.timeline.len() > self.timeline_capacity {
            self.timeline.pop_front();
        }

        // Window: cheap front pruning here, exact filtering on read
        let cutoff = self.cutoff(now);
        while self.recent.front().is_some_and(|e| e.timestamp < cutoff) {
            self.recent.pop_front();
        }

        if event.timestamp >= cutoff {
            self.recent.push_back(event);
            while self.recent.len() > self.window_capacity {
                self.recent.pop_front();
            }
        } else {
            tracing::debug!(flow_id = %event.flow_id, "event older than recent window, not retained");
        }
    }

    /// Drop every retained event older than the window; returns how many
    pub fn evict_expired(&mut self, now: DateTime<Utc>) -> usize {
        let cutoff = self.cutoff(now);
        let before = self.recent.len();
        self.recent.retain(|e| e.timestamp >= cutoff);

        let evicted = before - self.recent.len();
        if evicted > 0 {
            tracing::trace!(evicted, "recent window evicted expired events");
        }
        evicted
    }

    // ------------------------------------------------------------------------
    // Snapshots
    // ------------------------------------------------------------------------

    pub fn current_counts(&self) -> BTreeMap<Category, u64> {
        self.counts_at(Utc::now())
    }

    pub fn counts_at(&self, now: DateTime<Utc>) -> BTreeMap<Category, u64> {
        let mut counts = BTreeMap::new();
        for event in self.window_iter(now) {
            *counts.entry(event.prediction.clone()).or_insert(0) += 1;
        }
        counts
    }

    pub fn current_recent(&self) -> Vec<DetectionEvent> {
        self.recent_at(Utc::now())
    }

    pub fn recent_at(&self, now: DateTime<Utc>) -> Vec<DetectionEvent> {
        self.window_iter(now).cloned().collect()
    }

    pub fn current_timeline(&self) -> Vec<TimelinePoint> {
        self.timeline
            .iter()
            .enumerate()
            .map(|(index, entry)| TimelinePoint {
                sequence_index: index,
                timestamp_label: entry.timestamp.format("%H:%M:%S").to_string(),
                category: entry.category.clone(),
                confidence_percent: (entry.confidence * 1000.0).round() / 10.0,
                is_attack: entry.is_attack,
            })
            .collect()
    }

    pub fn snapshot(&self) -> AggregatorSnapshot {
        self.snapshot_at(Utc::now())
    }

    pub fn snapshot_at(&self, now: DateTime<Utc>) -> AggregatorSnapshot {
        AggregatorSnapshot {
            counts: self.counts_at(now),
            timeline: self.current_timeline(),
            recent_events: self.window_iter(now).count(),
            total_events: self.total_events,
            attack_events: self.attack_events,
            taken_at: now,
        }
    }

    pub fn total_events(&self) -> u64 {
        self.total_events
    }

    pub fn attack_events(&self) -> u64 {
        self.attack_events
    }

    /// Events currently held for the window, expired or not
    pub fn retained(&self) -> usize {
        self.recent.len()
    }

    pub fn clear(&mut self) {
        self.recent.clear();
        self.timeline.clear();
        self.total_events = 0;
        self.attack_events = 0;
    }

    fn cutoff(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        now.checked_sub_signed(self.window)
            .unwrap_or(DateTime::<Utc>::MIN_UTC)
    }

    fn window_iter(&self, now: DateTime<Utc>) -> impl Iterator<Item = &DetectionEvent> {
        let cutoff = self.cutoff(now);
        self.recent.iter().filter(move |e| e.timestamp >= cutoff)
    }
}

impl Default for StreamAggregator {
    fn default() -> Self {
        Self::from_config(&StreamConfig::default())
    }
}

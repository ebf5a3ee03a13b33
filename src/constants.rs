//! Central Configuration Constants
//!
//! Single source of truth for all stream client defaults.
//! To change the default backend endpoint, only edit this file.

/// Default stream endpoint
///
/// Fallback URL when `IDS_WS_URL` is not set.
pub const DEFAULT_WS_URL: &str = "ws://localhost:8000/ws";

/// Fixed delay between reconnect attempts (milliseconds)
pub const DEFAULT_RECONNECT_DELAY_MS: u64 = 3_000;

/// Notification time-to-live (milliseconds)
pub const DEFAULT_NOTIFICATION_TTL_MS: u64 = 10_000;

/// Maximum points kept in the timeline series
pub const DEFAULT_TIMELINE_CAPACITY: usize = 100;

/// Recent activity window (milliseconds) - 5 minutes
pub const DEFAULT_RECENT_WINDOW_MS: u64 = 300_000;

/// Maximum live notifications
pub const DEFAULT_NOTIFICATION_CAPACITY: usize = 50;

/// Hard cap on events retained for the recent window
pub const DEFAULT_WINDOW_CAPACITY: usize = 1_000;

/// Interval of the background window-eviction tick (milliseconds)
pub const DEFAULT_EVICTION_TICK_MS: u64 = 5_000;

/// App version
pub const APP_VERSION: &str = env!("CARGO_PKG_VERSION");

/// App name
pub const APP_NAME: &str = "IDS Stream";

//! Configuration module
//!
//! Every knob of the stream client, loaded from the environment with
//! defaults from [`crate::constants`].

use std::env;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::constants;
use crate::error::{StreamError, StreamResult};

/// Stream client configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StreamConfig {
    /// WebSocket endpoint of the IDS backend
    pub ws_url: String,

    /// Fixed delay before each reconnect attempt (ms)
    pub reconnect_delay_ms: u64,

    /// Lifetime of an attack notification (ms)
    pub notification_ttl_ms: u64,

    /// Maximum points in the timeline series
    pub timeline_capacity: usize,

    /// Recent activity window (ms)
    pub recent_window_ms: u64,

    /// Maximum live notifications
    pub notification_capacity: usize,

    /// Hard cap on events retained for the recent window
    pub window_capacity: usize,

    /// Background eviction tick for the recent window (ms)
    pub eviction_tick_ms: u64,
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            ws_url: constants::DEFAULT_WS_URL.to_string(),
            reconnect_delay_ms: constants::DEFAULT_RECONNECT_DELAY_MS,
            notification_ttl_ms: constants::DEFAULT_NOTIFICATION_TTL_MS,
            timeline_capacity: constants::DEFAULT_TIMELINE_CAPACITY,
            recent_window_ms: constants::DEFAULT_RECENT_WINDOW_MS,
            notification_capacity: constants::DEFAULT_NOTIFICATION_CAPACITY,
            window_capacity: constants::DEFAULT_WINDOW_CAPACITY,
            eviction_tick_ms: constants::DEFAULT_EVICTION_TICK_MS,
        }
    }
}

impl StreamConfig {
    /// Load configuration from environment variables
    pub fn from_env() -> Self {
        let defaults = Self::default();

        Self {
            ws_url: env::var("IDS_WS_URL").unwrap_or(defaults.ws_url),
            reconnect_delay_ms: env_or("IDS_RECONNECT_DELAY_MS", defaults.reconnect_delay_ms),
            notification_ttl_ms: env_or("IDS_NOTIFICATION_TTL_MS", defaults.notification_ttl_ms),
            timeline_capacity: env_or("IDS_TIMELINE_CAPACITY", defaults.timeline_capacity),
            recent_window_ms: env_or("IDS_RECENT_WINDOW_MS", defaults.recent_window_ms),
            notification_capacity: env_or("IDS_NOTIFICATION_CAPACITY", defaults.notification_capacity),
            window_capacity: env_or("IDS_WINDOW_CAPACITY", defaults.window_capacity),
            eviction_tick_ms: env_or("IDS_EVICTION_TICK_MS", defaults.eviction_tick_ms),
        }
    }

    /// Reject values the components cannot run with
    pub fn validate(&self) -> StreamResult<()> {
        if !(self.ws_url.starts_with("ws://") || self.ws_url.starts_with("wss://")) {
            return Err(StreamError::Config(format!(
                "stream url must use ws:// or wss://, got '{}'",
                self.ws_url
            )));
        }

        let zero_field = [
            ("reconnect_delay_ms", self.reconnect_delay_ms == 0),
            ("notification_ttl_ms", self.notification_ttl_ms == 0),
            ("timeline_capacity", self.timeline_capacity == 0),
            ("recent_window_ms", self.recent_window_ms == 0),
            ("notification_capacity", self.notification_capacity == 0),
            ("window_capacity", self.window_capacity == 0),
            ("eviction_tick_ms", self.eviction_tick_ms == 0),
        ]
        .into_iter()
        .find(|(_, is_zero)| *is_zero);

        match zero_field {
            Some((name, _)) => Err(StreamError::Config(format!("{} must be greater than zero", name))),
            None => Ok(()),
        }
    }

    pub fn reconnect_delay(&self) -> Duration {
        Duration::from_millis(self.reconnect_delay_ms)
    }

    pub fn notification_ttl(&self) -> Duration {
        Duration::from_millis(self.notification_ttl_ms)
    }

    pub fn recent_window(&self) -> Duration {
        Duration::from_millis(self.recent_window_ms)
    }

    pub fn eviction_tick(&self) -> Duration {
        Duration::from_millis(self.eviction_tick_ms)
    }
}

/// Parse an env var, falling back to the default when unset or malformed
fn env_or<T: FromStr>(key: &str, default: T) -> T {
    env::var(key)
        .ok()
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or(default)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_dashboard() {
        let config = StreamConfig::default();
        assert_eq!(config.ws_url, "ws://localhost:8000/ws");
        assert_eq!(config.reconnect_delay(), Duration::from_secs(3));
        assert_eq!(config.notification_ttl(), Duration::from_secs(10));
        assert_eq!(config.timeline_capacity, 100);
        assert_eq!(config.recent_window(), Duration::from_secs(300));
        assert_eq!(config.notification_capacity, 50);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_reject_http_url() {
        let config = StreamConfig {
            ws_url: "http://localhost:8000/ws".to_string(),
            ..Default::default()
        };
        assert!(matches!(config.validate(), Err(StreamError::Config(_))));
    }

    #[test]
    fn test_reject_zero_capacity() {
        let config = StreamConfig {
            timeline_capacity: 0,
            ..Default::default()
        };

        match config.validate() {
            Err(StreamError::Config(msg)) => assert!(msg.contains("timeline_capacity")),
            other => panic!("Expected Config error, got {:?}", other),
        }
    }

    #[test]
    fn test_env_or_falls_back_on_garbage() {
        env::set_var("IDS_TEST_GARBAGE_VALUE", "not-a-number");
        assert_eq!(env_or("IDS_TEST_GARBAGE_VALUE", 42u64), 42);
        env::set_var("IDS_TEST_GARBAGE_VALUE", " 7 ");
        assert_eq!(env_or("IDS_TEST_GARBAGE_VALUE", 42u64), 7);
        env::remove_var("IDS_TEST_GARBAGE_VALUE");
    }
}

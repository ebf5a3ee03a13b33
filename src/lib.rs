//! IDS Stream Client
//!
//! Real-time client for the IDS backend's detection stream.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                       STREAM CLIENT                         │
//! ├─────────────────────────────────────────────────────────────┤
//! │  ┌──────────────────┐      ┌────────────────────────────┐  │
//! │  │ ConnectionManager│─────▶│ EventRouter                │  │
//! │  │ (WebSocket,      │frames│ (typed pub/sub by kind)    │  │
//! │  │  reconnect loop) │      └─────┬───────────────┬──────┘  │
//! │  └──────────────────┘            │ detection     │         │
//! │                                  ▼               ▼         │
//! │                    ┌──────────────────┐ ┌───────────────┐  │
//! │                    │ StreamAggregator │ │ Notification  │  │
//! │                    │ counts / window /│ │ Manager (TTL, │  │
//! │                    │ timeline         │ │ dedupe, cap)  │  │
//! │                    └──────────────────┘ └───────────────┘  │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Usage
//! ```ignore
//! let client = StreamClient::new(StreamConfig::from_env())?;
//! client.connect();
//!
//! // On each render tick
//! let snapshot = client.snapshot();
//!
//! client.disconnect();
//! ```

pub mod config;
pub mod constants;
pub mod error;
pub mod logic;

pub use config::StreamConfig;
pub use error::{DecodeError, StreamError, StreamResult};
pub use logic::aggregator::{AggregatorSnapshot, StreamAggregator, TimelinePoint};
pub use logic::client::{Clock, StreamClient, StreamSnapshot};
pub use logic::detection::{Category, DetectionEvent};
pub use logic::notifications::{Notification, NotificationManager};
pub use logic::stream::{
    decode_frame, ConnectionManager, ConnectionState, ConnectionStatus, Connector,
    DispatchOutcome, EventKind, EventRouter, FrameStream, StreamEvent, Subscription,
    WebSocketConnector,
};

//! Stream Module - Backend Event Stream
//!
//! This module handles:
//! - The persistent connection and its reconnect loop (`connection`)
//! - Frame decoding into typed events (`frame`)
//! - Fan-out of events to subscribers (`router`)
//! - The pluggable transport (`transport`)

pub mod connection;
pub mod frame;
pub mod router;
pub mod transport;

pub use connection::{ConnectionManager, ConnectionState, ConnectionStatus};
pub use frame::{decode_frame, EventKind, StreamEvent};
pub use router::{DispatchOutcome, EventRouter, Handler, Subscription};
pub use transport::{Connector, FrameStream, WebSocketConnector};

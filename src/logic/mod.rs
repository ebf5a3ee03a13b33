//! Logic Module - Stream Engines
//!
//! ## Structure
//! - `stream/` - Connection, frame decoding, routing, transport
//! - `detection/` - Detection event data model
//! - `aggregator` - Bounded counts / window / timeline views
//! - `notifications` - Deduplicated, expiring attack alerts
//! - `client` - Facade wiring everything together

pub mod aggregator;
pub mod client;
pub mod detection;
pub mod notifications;
pub mod stream;

//! Detection Module
//!
//! Data model of the `detection` event class.

pub mod types;

pub use types::{parse_timestamp, Category, DetectionEvent};

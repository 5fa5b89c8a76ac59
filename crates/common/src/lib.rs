//! Capburn Common Utilities
//!
//! Shared infrastructure for all Capburn crates:
//! - Error types and result aliases
//! - Playback clocks, frame cadence, and drift measurement
//! - Tracing/logging initialization
//! - Configuration loading

pub mod clock;
pub mod config;
pub mod error;
pub mod logging;

pub use clock::*;
pub use config::*;
pub use error::*;

//! Trellis - streaming server-side templates
//!
//! File-routed template pages compiled through a two-tier content-addressed
//! cache, rendered as a stream with concurrently resolved slots, and
//! dispatched with bounded internal reroutes.

pub mod app;
pub mod cli;
pub mod compile;
pub mod config;
pub mod dispatch;
pub mod error;
pub mod render;
pub mod transport;
pub mod ui;

pub use error::{TrellisError, TrellisResult};

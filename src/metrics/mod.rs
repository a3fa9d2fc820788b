//! Metrics Module
//!
//! Prometheus counters for sessions, rejections and relayed bytes.

pub mod collector;

pub use collector::Metrics;

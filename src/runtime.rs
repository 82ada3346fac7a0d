//! Runtime glue: configuration, tracing and counters, and the runner that owns
//! the shutdown token.

pub mod config;
pub mod runner;
pub mod telemetry;

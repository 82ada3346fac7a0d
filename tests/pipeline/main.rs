#[path = "../support/mod.rs"]
mod support;

mod monitor_pipeline;
mod runner;

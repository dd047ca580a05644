#![allow(clippy::result_large_err)]

pub mod app;
pub mod config;
pub mod domain;
pub mod error;
pub mod graph;
pub mod logging;
pub mod mesh;
pub mod metrics;
pub mod prometheus;
pub mod telemetry;

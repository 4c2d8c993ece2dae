//! auditpost daemon library.
//!
//! This library exposes internal modules for integration testing.
//! In production, `auditpost-daemon` is used as a binary (main.rs).

pub mod cli;
pub mod dispatch;
pub mod logging;
pub mod metrics_server;
pub mod orchestrator;
pub mod signals;
pub mod source;

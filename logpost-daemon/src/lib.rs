//! Logpost daemon library.
//!
//! Exposes the daemon internals for integration testing. In production,
//! `logpost-daemon` is used as a binary (main.rs).

pub mod cli;
pub mod health;
pub mod logging;
pub mod metrics_server;
pub mod modules;
pub mod orchestrator;
pub mod pid;

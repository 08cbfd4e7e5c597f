//! Logpost operations CLI
//!
//! Command handlers are exposed as a library so integration tests can drive
//! them without spawning the `logpost` binary.

pub mod cli;
pub mod commands;
pub mod error;
pub mod output;

//! Command handlers -- one module per subcommand

pub mod buffer;
pub mod config;
pub mod keys;
pub mod seal;
pub mod status;

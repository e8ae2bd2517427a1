//! Logging utilities.
//!
//! The compositor logs through the `log` facade only; this module wires up
//! `env_logger` for binaries that want a ready-made backend.

mod init;

pub use init::{init_logging, LoggingConfig};

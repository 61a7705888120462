//! rb-core: Core types, errors and configuration for relaybus
//!
//! This crate provides the error taxonomy, endpoint addresses and the
//! configuration structures shared by the bus engine and the CLI.

pub mod config;
pub mod error;
pub mod types;

pub use error::{BusError, CallError, ConfigError, ConnectionError, UsageError};
pub use types::Address;

//! rb-cli: Command-line interface for relaybus
//!
//! Provides the `relaybus` CLI: an echo server plus one-shot client
//! commands for calling, publishing, reading cached events and listening.

pub mod commands;
pub mod output;

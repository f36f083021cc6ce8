//! CLI module
//!
//! Command-line interface for running the source.
//!
//! # Commands
//!
//! - `spec` - Print the configuration specification
//! - `check` - Test connection to the gateway
//! - `discover` - List available streams with their schemas
//! - `read` - Extract data from streams

mod commands;
mod runner;

pub use commands::{parse_stream_list, Cli, Commands, OutputFormat};
pub use runner::{message_json, Runner};

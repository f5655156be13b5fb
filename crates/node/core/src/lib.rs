//! Tether node infrastructure.
//!
//! - [`cli`] - command-line arguments
//! - [`commands`] - `dev` and `config` command implementations
//! - [`config`] - TOML node configuration
//! - [`dirs`] - data directory management
//! - [`logging`] - tracing subscriber initialization
//! - [`version`] - version information

pub mod cli;
pub mod commands;
pub mod config;
pub mod constants;
pub mod dirs;
pub mod logging;
pub mod version;

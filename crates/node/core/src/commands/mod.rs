//! Node commands
//!
//! Each command resolves its data directory, loads the node configuration
//! and performs the requested operation.

pub mod config;
pub mod dev;

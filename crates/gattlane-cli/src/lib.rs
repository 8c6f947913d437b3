//! gattlane CLI library
//!
//! Command-line driver for the command lane. Every command runs against a
//! simulated radio populated from the configuration file.

pub mod cli;
pub mod commands;
pub mod config;
pub mod error;

pub use cli::{Cli, Commands};
pub use commands::CommandDispatcher;
pub use config::AppConfig;
pub use error::{CliError, Result};

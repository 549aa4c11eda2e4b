//! meshdb CLI library
//!
//! Command-line management of a Bluetooth Mesh network database stored as a
//! JSON file: creating networks, managing keys and provisioners, removing
//! nodes and exporting.

pub mod cli;
pub mod commands;
pub mod config;
pub mod error;
pub mod store;

pub use cli::{Cli, Commands, KeyKind};
pub use commands::CommandDispatcher;
pub use config::AppConfig;
pub use error::{CliError, Result};
pub use store::NetworkStore;

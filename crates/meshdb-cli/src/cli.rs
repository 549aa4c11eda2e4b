//! Command-line interface definitions and parsing

use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};
use meshdb_core::{Address, AddressRange};

#[derive(Parser, Debug)]
#[command(name = "meshdb", author, version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Configuration file path (TOML)
    #[arg(short, long, global = true)]
    pub config: Option<String>,

    /// Mesh network database file (JSON)
    #[arg(short, long, global = true)]
    pub file: Option<PathBuf>,
}

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Commands {
    /// Create a new network with a local provisioner
    Create {
        /// Name of the network
        #[arg(short, long)]
        name: String,
        /// Name of the local provisioner
        #[arg(short, long, default_value = "meshdb")]
        provisioner: String,
        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
    /// Print a summary of the network
    Show,
    /// Check that the file is a consistent network
    Validate,
    /// Add a network key
    AddNetKey {
        /// Key index; the next free one by default
        #[arg(short, long)]
        index: Option<u16>,
        #[arg(short, long)]
        name: Option<String>,
        /// Key material as 32 hex characters; random by default
        #[arg(short, long)]
        key: Option<String>,
    },
    /// Add an application key
    AddAppKey {
        /// Key index; the next free one by default
        #[arg(short, long)]
        index: Option<u16>,
        #[arg(short, long)]
        name: Option<String>,
        /// Network key to bind to; the first one by default
        #[arg(short, long)]
        bound: Option<u16>,
        /// Key material as 32 hex characters; random by default
        #[arg(short, long)]
        key: Option<String>,
    },
    /// Remove a network or application key
    RemoveKey {
        #[arg(long, value_enum)]
        kind: KeyKind,
        #[arg(short, long)]
        index: u16,
        /// Remove the key even if nodes use it
        #[arg(long)]
        force: bool,
    },
    /// Add a provisioner
    AddProvisioner {
        #[arg(short, long)]
        name: String,
        /// Unicast range as LOW-HIGH in hex; the next free ranges by default
        #[arg(short, long, value_parser = parse_unicast_range)]
        unicast: Vec<AddressRange>,
    },
    /// Remove a node
    RemoveNode {
        /// UUID of the node, with or without dashes
        #[arg(short, long)]
        uuid: String,
    },
    /// Export the network, optionally restricted to some keys
    Export {
        /// Network key to export; all keys by default
        #[arg(long = "net-key")]
        net_keys: Vec<u16>,
        /// Application key to export; all keys bound to exported network keys by default
        #[arg(long = "app-key")]
        app_keys: Vec<u16>,
        /// Leave device keys out of the export
        #[arg(long)]
        no_device_keys: bool,
        /// Write the export here instead of printing it
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyKind {
    Net,
    App,
}

/// Parse `LOW-HIGH`, both bounds in hex
pub fn parse_unicast_range(s: &str) -> Result<AddressRange, String> {
    let (low, high) = s
        .split_once('-')
        .ok_or_else(|| format!("expected LOW-HIGH, got '{}'", s))?;
    let low: Address = low.trim().parse().map_err(|e| format!("{}", e))?;
    let high: Address = high.trim().parse().map_err(|e| format!("{}", e))?;
    let range = AddressRange::new(low, high);
    if !range.is_unicast_range() {
        return Err(format!("{} is not a unicast range", range));
    }
    Ok(range)
}

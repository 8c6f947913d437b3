//! Command-line interface definitions and parsing

use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Enable verbose logging
    #[arg(short, long)]
    pub verbose: bool,

    /// Configuration file path
    #[arg(short, long)]
    pub config: Option<String>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Publish a local GATT service and advertise it
    Advertise {
        /// Service uuid or name
        #[arg(short, long)]
        service: String,
        /// Readable characteristic as `name=value`
        #[arg(short = 'r', long = "characteristic")]
        characteristics: Vec<String>,
        /// How long to keep advertising
        #[arg(short, long, default_value_t = 1000)]
        duration_ms: u64,
    },
    /// Scan for nearby peers
    Scan {
        /// Only report peers advertising these services (uuids or names)
        #[arg(short, long)]
        filter: Vec<String>,
        /// How long to scan
        #[arg(short, long, default_value_t = 500)]
        duration_ms: u64,
    },
    /// Read one characteristic from a peer
    Read {
        /// Peer address
        #[arg(short, long)]
        address: String,
        /// Service uuid or name
        #[arg(short, long)]
        service: String,
        /// Characteristic uuid or name
        #[arg(short = 'r', long)]
        characteristic: String,
    },
    /// Publish a document for a group and fetch one back from a virtual peer
    Demo {
        /// Group identifier shared by every device in the demo
        #[arg(short, long, default_value = "com.example.gattlane")]
        group: String,
    },
}

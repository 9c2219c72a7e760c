//! Command-line interface definitions and parsing
//!
//! Every option is optional; `lanchat` with no arguments runs with defaults.

use std::net::Ipv4Addr;
use std::path::PathBuf;

use clap::Parser;
use lanchat_core::{ChatConfig, DirectorySource};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Configuration file path
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Port to listen on and to address peers at
    #[arg(short, long)]
    pub port: Option<u16>,

    /// Send to this peer instead of reading the neighbor table (repeatable)
    #[arg(long = "peer", value_name = "IP")]
    pub peers: Vec<Ipv4Addr>,

    /// Enable verbose logging
    #[arg(short, long)]
    pub verbose: bool,

    /// Write logs to this file; logs are discarded otherwise
    #[arg(long)]
    pub log_file: Option<PathBuf>,

    /// Print an example configuration file and exit
    #[arg(long)]
    pub print_config: bool,
}

impl Cli {
    /// Apply command line overrides on top of a loaded configuration
    pub fn apply_overrides(&self, config: &mut ChatConfig) {
        if let Some(port) = self.port {
            config.network.port = port;
        }
        if !self.peers.is_empty() {
            config.directory.source = DirectorySource::Static;
            config.directory.peers = self.peers.clone();
        }
    }
}

//! LanChat configuration
//!
//! Every field has a default, so an instance started with no arguments and no
//! file behaves exactly like the reference setup: port 3998, path `/receive`,
//! peers taken from `arp -an`. A TOML file can override any subset.

use std::net::{Ipv4Addr, SocketAddr};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::directory::{ArpSource, ArpTableDirectory, PeerDirectory, StaticDirectory};
use crate::errors::ConfigError;
use crate::listener::is_literal_path;

/// Well-known port every instance listens on
pub const DEFAULT_PORT: u16 = 3998;
/// Well-known receiving path
pub const DEFAULT_RECEIVE_PATH: &str = "/receive";

// ----------------------------------------------------------------------------
// Configuration Types
// ----------------------------------------------------------------------------

/// Complete configuration for a LanChat instance
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChatConfig {
    pub network: NetworkConfig,
    pub directory: DirectoryConfig,
    pub ui: UiConfig,
}

/// Receiving endpoint and outbound request settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NetworkConfig {
    /// Port used both for listening and for addressing peers
    pub port: u16,
    /// Path of the receiving endpoint
    pub receive_path: String,
    /// Interface to bind the receiving endpoint on
    pub bind_address: Ipv4Addr,
    /// Per-request timeout; transport defaults apply when unset
    pub request_timeout_ms: Option<u64>,
}

/// Where peers come from
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DirectorySource {
    /// The operating system's neighbor table
    #[default]
    Arp,
    /// The `peers` list only
    Static,
}

/// Peer directory settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DirectoryConfig {
    pub source: DirectorySource,
    /// Utility printing the neighbor table
    pub arp_command: Vec<String>,
    /// Read this table file instead of running `arp_command`
    pub arp_file: Option<PathBuf>,
    /// Fixed peers for the static source
    pub peers: Vec<Ipv4Addr>,
    /// Additional local addresses never treated as peers
    pub exclude: Vec<Ipv4Addr>,
}

/// Presentation settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct UiConfig {
    /// Number of messages kept on screen
    pub history_size: usize,
    /// Maximum characters per message
    pub char_limit: usize,
    /// Hint shown in the empty input
    pub placeholder: String,
    /// Redraw and spinner interval
    pub tick_rate_ms: u64,
}

// ----------------------------------------------------------------------------
// Default Implementations
// ----------------------------------------------------------------------------

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            port: DEFAULT_PORT,
            receive_path: DEFAULT_RECEIVE_PATH.to_string(),
            bind_address: Ipv4Addr::UNSPECIFIED,
            request_timeout_ms: None,
        }
    }
}

impl Default for DirectoryConfig {
    fn default() -> Self {
        Self {
            source: DirectorySource::Arp,
            arp_command: vec!["arp".to_string(), "-an".to_string()],
            arp_file: None,
            peers: Vec::new(),
            exclude: Vec::new(),
        }
    }
}

impl Default for UiConfig {
    fn default() -> Self {
        Self {
            history_size: 8,
            char_limit: 156,
            placeholder: "hello there".to_string(),
            tick_rate_ms: 100,
        }
    }
}

// ----------------------------------------------------------------------------
// Loading and Validation
// ----------------------------------------------------------------------------

impl ChatConfig {
    /// Load configuration from a TOML file, filling gaps with defaults
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path.as_ref()).map_err(|e| {
            ConfigError::Loading(format!("Failed to read {}: {}", path.as_ref().display(), e))
        })?;
        let config = Self::from_toml(&text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_toml(text: &str) -> Result<Self, ConfigError> {
        toml::from_str(text).map_err(|e| ConfigError::Loading(e.to_string()))
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.network.port == 0 {
            return Err(ConfigError::Validation("Port must be greater than 0".to_string()));
        }
        if !is_literal_path(&self.network.receive_path) {
            return Err(ConfigError::Validation(format!(
                "Receive path must start with '/' and contain only literal segments: {}",
                self.network.receive_path
            )));
        }
        if self.network.request_timeout_ms == Some(0) {
            return Err(ConfigError::Validation(
                "Request timeout must be greater than 0".to_string(),
            ));
        }
        if self.directory.source == DirectorySource::Arp
            && self.directory.arp_file.is_none()
            && self.directory.arp_command.is_empty()
        {
            return Err(ConfigError::Validation(
                "Either arp_command or arp_file must be set".to_string(),
            ));
        }
        if self.ui.history_size == 0 {
            return Err(ConfigError::Validation("History size must be greater than 0".to_string()));
        }
        if self.ui.char_limit == 0 {
            return Err(ConfigError::Validation("Char limit must be greater than 0".to_string()));
        }
        if self.ui.tick_rate_ms == 0 {
            return Err(ConfigError::Validation("Tick rate must be greater than 0".to_string()));
        }
        Ok(())
    }

    /// Example configuration file content
    pub fn example_config() -> Result<String, ConfigError> {
        toml::to_string_pretty(&Self::default())
            .map_err(|e| ConfigError::Serialization(e.to_string()))
    }
}

impl NetworkConfig {
    /// Address the receiving endpoint binds to
    pub fn listen_addr(&self) -> SocketAddr {
        SocketAddr::from((self.bind_address, self.port))
    }

    pub fn request_timeout(&self) -> Option<Duration> {
        self.request_timeout_ms.map(Duration::from_millis)
    }
}

impl DirectoryConfig {
    /// Build the directory this configuration describes
    pub fn build(&self, port: u16) -> Arc<dyn PeerDirectory> {
        match self.source {
            DirectorySource::Static => {
                Arc::new(StaticDirectory::from_ips(self.peers.iter().copied(), port))
            }
            DirectorySource::Arp => {
                let source = match &self.arp_file {
                    Some(path) => ArpSource::File(path.clone()),
                    None => ArpSource::Command(self.arp_command.clone()),
                };
                Arc::new(
                    ArpTableDirectory::new(source, port).with_excluded(self.exclude.iter().copied()),
                )
            }
        }
    }
}

//! Relay configuration.
//!
//! Loaded from TOML. Every field has a default and the defaults describe the
//! two-scanner deployment, so an empty file is a complete configuration.

use std::collections::HashSet;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::channel::ChannelSettings;
use crate::protocols::scanner::SCANNER_LAYOUT;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("TOML write error: {0}")]
    TomlWrite(#[from] toml::ser::Error),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Process-wide relay settings plus one entry per scanner.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RelayConfig {
    /// Host receiving every decoded message.
    #[serde(default = "default_relay_host")]
    pub relay_host: IpAddr,

    /// Upper bound on one wait for socket readiness.
    #[serde(default = "default_poll_timeout_ms")]
    pub poll_timeout_ms: u64,

    /// Simulator silence after which the real feed takes over again.
    #[serde(default = "default_sim_silence_timeout_ms")]
    pub sim_silence_timeout_ms: u64,

    /// Largest partial frame kept per source before it is discarded.
    #[serde(default = "default_max_frame_len")]
    pub max_frame_len: usize,

    #[serde(default = "default_recv_buffer_len")]
    pub recv_buffer_len: usize,

    #[serde(default = "default_channels")]
    pub channels: Vec<ChannelConfig>,
}

/// Sockets of one physical scanner.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChannelConfig {
    pub name: String,
    /// Where the real scanner sends its telegrams.
    pub real_bind: SocketAddr,
    /// Where the simulator sends its telegrams.
    pub sim_bind: SocketAddr,
    /// Port on `relay_host` receiving decoded messages.
    pub output_port: u16,
}

fn default_relay_host() -> IpAddr {
    IpAddr::V4(Ipv4Addr::LOCALHOST)
}

fn default_poll_timeout_ms() -> u64 {
    1000
}

fn default_sim_silence_timeout_ms() -> u64 {
    10_000
}

fn default_max_frame_len() -> usize {
    64 * 1024
}

fn default_recv_buffer_len() -> usize {
    8192
}

fn default_channels() -> Vec<ChannelConfig> {
    vec![
        ChannelConfig {
            name: "scanner-1".to_string(),
            real_bind: SocketAddr::from(([10, 0, 2, 1], 10940)),
            sim_bind: SocketAddr::from(([192, 168, 179, 158], 10940)),
            output_port: 5005,
        },
        ChannelConfig {
            name: "scanner-2".to_string(),
            real_bind: SocketAddr::from(([10, 0, 3, 1], 10940)),
            sim_bind: SocketAddr::from(([192, 168, 179, 158], 10941)),
            output_port: 5006,
        },
    ]
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            relay_host: default_relay_host(),
            poll_timeout_ms: default_poll_timeout_ms(),
            sim_silence_timeout_ms: default_sim_silence_timeout_ms(),
            max_frame_len: default_max_frame_len(),
            recv_buffer_len: default_recv_buffer_len(),
            channels: default_channels(),
        }
    }
}

impl RelayConfig {
    /// Load and validate a TOML file.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_toml_string(&self) -> Result<String, ConfigError> {
        Ok(toml::to_string_pretty(self)?)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.channels.is_empty() {
            return Err(ConfigError::Invalid("No channels configured".into()));
        }
        if self.poll_timeout_ms == 0 {
            return Err(ConfigError::Invalid("poll_timeout_ms must be > 0".into()));
        }
        if self.sim_silence_timeout_ms == 0 {
            return Err(ConfigError::Invalid(
                "sim_silence_timeout_ms must be > 0".into(),
            ));
        }
        if self.recv_buffer_len == 0 {
            return Err(ConfigError::Invalid("recv_buffer_len must be > 0".into()));
        }
        let frame_len = SCANNER_LAYOUT.frame_len();
        if self.max_frame_len < frame_len {
            return Err(ConfigError::Invalid(format!(
                "max_frame_len {} is smaller than a scanner frame ({} bytes)",
                self.max_frame_len, frame_len
            )));
        }

        let mut names = HashSet::new();
        for channel in &self.channels {
            if channel.name.trim().is_empty() {
                return Err(ConfigError::Invalid("Channel with empty name".into()));
            }
            if !names.insert(channel.name.as_str()) {
                return Err(ConfigError::Invalid(format!(
                    "Duplicate channel name '{}'",
                    channel.name
                )));
            }
            if channel.real_bind == channel.sim_bind {
                return Err(ConfigError::Invalid(format!(
                    "Channel '{}' binds real and simulated feeds to the same address {}",
                    channel.name, channel.real_bind
                )));
            }
        }
        Ok(())
    }

    /// Resolve runtime settings for every channel, in file order.
    pub fn channel_settings(&self) -> Vec<ChannelSettings> {
        self.channels
            .iter()
            .map(|channel| ChannelSettings {
                name: channel.name.clone(),
                real_bind: channel.real_bind,
                sim_bind: channel.sim_bind,
                target: SocketAddr::new(self.relay_host, channel.output_port),
                poll_timeout: Duration::from_millis(self.poll_timeout_ms),
                silence_timeout: Duration::from_millis(self.sim_silence_timeout_ms),
                max_frame_len: self.max_frame_len,
                recv_buffer_len: self.recv_buffer_len,
                layout: SCANNER_LAYOUT,
            })
            .collect()
    }
}

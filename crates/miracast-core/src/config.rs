//! Daemon configuration.
//!
//! Resolution order: environment variables → config file → defaults.
//!
//! Config file location:
//!   1. $MIRACAST_CONFIG (explicit override)
//!   2. $XDG_CONFIG_HOME/miracast/config.toml
//!   3. ~/.config/miracast/config.toml

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Top-level configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MiracastConfig {
    pub network: NetworkConfig,
    pub supplicant: SupplicantConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NetworkConfig {
    /// P2P interface the daemon is bound to for its whole lifetime.
    pub interface: String,
    /// Device name advertised to remote peers.
    pub device_name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SupplicantConfig {
    /// Path to the wpa_supplicant binary.
    pub binary_path: PathBuf,
}

// ── Defaults ──────────────────────────────────────────────────────────────────

impl Default for MiracastConfig {
    fn default() -> Self {
        Self {
            network: NetworkConfig::default(),
            supplicant: SupplicantConfig::default(),
        }
    }
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            // The P2P interface is p2p0 on most platforms we target.
            interface: "p2p0".to_string(),
            device_name: "miracast".to_string(),
        }
    }
}

impl Default for SupplicantConfig {
    fn default() -> Self {
        Self {
            binary_path: PathBuf::from("/sbin/wpa_supplicant"),
        }
    }
}

// ── Errors ────────────────────────────────────────────────────────────────────

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read {0}: {1}")]
    ReadFailed(PathBuf, std::io::Error),
    #[error("failed to parse {0}: {1}")]
    ParseFailed(PathBuf, toml::de::Error),
}

// ── Loading ───────────────────────────────────────────────────────────────────

impl MiracastConfig {
    /// Load config: env vars → file → defaults.
    pub fn load() -> Result<Self, ConfigError> {
        let path = Self::file_path();
        let mut config = if path.exists() {
            Self::from_file(&path)?
        } else {
            MiracastConfig::default()
        };
        config.apply_env_overrides();
        Ok(config)
    }

    /// Config file path.
    pub fn file_path() -> PathBuf {
        std::env::var("MIRACAST_CONFIG")
            .map(PathBuf::from)
            .unwrap_or_else(|_| config_dir().join("config.toml"))
    }

    fn from_file(path: &PathBuf) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::ReadFailed(path.clone(), e))?;
        toml::from_str(&text).map_err(|e| ConfigError::ParseFailed(path.clone(), e))
    }

    /// Apply MIRACAST_* env var overrides.
    fn apply_env_overrides(&mut self) {
        if let Ok(v) = std::env::var("MIRACAST_NETWORK__INTERFACE") {
            self.network.interface = v;
        }
        if let Ok(v) = std::env::var("MIRACAST_NETWORK__DEVICE_NAME") {
            self.network.device_name = v;
        }
        if let Ok(v) = std::env::var("MIRACAST_SUPPLICANT__BINARY_PATH") {
            self.supplicant.binary_path = PathBuf::from(v);
        }
    }
}

fn config_dir() -> PathBuf {
    std::env::var("XDG_CONFIG_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| dirs_or_home().join(".config"))
        .join("miracast")
}

fn dirs_or_home() -> PathBuf {
    std::env::var("HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("/tmp"))
}

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use common::commit::DEFAULT_API_VERSION;
use common::peering::PeerLinkConfig;

#[derive(Debug, thiserror::Error)]
pub enum SettingsError {
    #[error("failed to read settings file {0}: {1}")]
    Io(PathBuf, std::io::Error),
    #[error("invalid settings file {0}: {1}")]
    Toml(PathBuf, toml::de::Error),
    #[error("invalid settings: {0}")]
    Invalid(String),
}

/// Tool settings. Every field has a default, so the file is optional and may
/// name only what it changes.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub peering: PeeringSettings,
    pub account_service: AccountServiceSettings,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PeeringSettings {
    /// How long a confirmed peer link is trusted before it is probed again
    pub keep_alive_secs: u64,
    pub initial_backoff_ms: u64,
    pub max_backoff_ms: u64,
    pub probe_timeout_secs: u64,
    pub connect_timeout_secs: u64,
    /// Rounds of dialling the cluster before giving up
    pub connect_attempts: u32,
}

impl Default for PeeringSettings {
    fn default() -> Self {
        let defaults = PeerLinkConfig::default();
        Self {
            keep_alive_secs: defaults.keep_alive.as_secs(),
            initial_backoff_ms: defaults.initial_backoff.as_millis() as u64,
            max_backoff_ms: defaults.max_backoff.as_millis() as u64,
            probe_timeout_secs: defaults.probe_timeout.as_secs(),
            connect_timeout_secs: defaults.connect_timeout.as_secs(),
            connect_attempts: defaults.connect_attempts,
        }
    }
}

impl PeeringSettings {
    pub fn link_config(&self) -> PeerLinkConfig {
        PeerLinkConfig {
            keep_alive: Duration::from_secs(self.keep_alive_secs),
            initial_backoff: Duration::from_millis(self.initial_backoff_ms),
            max_backoff: Duration::from_millis(self.max_backoff_ms),
            probe_timeout: Duration::from_secs(self.probe_timeout_secs),
            connect_timeout: Duration::from_secs(self.connect_timeout_secs),
            connect_attempts: self.connect_attempts,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AccountServiceSettings {
    pub api_version: String,
}

impl Default for AccountServiceSettings {
    fn default() -> Self {
        Self {
            api_version: DEFAULT_API_VERSION.to_string(),
        }
    }
}

impl Settings {
    /// Load settings from `path`, or the defaults when no path is given.
    pub fn load(path: Option<&Path>) -> Result<Self, SettingsError> {
        let Some(path) = path else {
            return Ok(Self::default());
        };
        let raw = std::fs::read_to_string(path)
            .map_err(|e| SettingsError::Io(path.to_path_buf(), e))?;
        let settings: Settings =
            toml::from_str(&raw).map_err(|e| SettingsError::Toml(path.to_path_buf(), e))?;
        settings.validate()?;
        Ok(settings)
    }

    fn validate(&self) -> Result<(), SettingsError> {
        let peering = &self.peering;
        for (name, value) in [
            ("keep_alive_secs", peering.keep_alive_secs),
            ("initial_backoff_ms", peering.initial_backoff_ms),
            ("probe_timeout_secs", peering.probe_timeout_secs),
            ("connect_timeout_secs", peering.connect_timeout_secs),
        ] {
            if value == 0 {
                return Err(SettingsError::Invalid(format!(
                    "peering.{} must be positive",
                    name
                )));
            }
        }
        if peering.max_backoff_ms < peering.initial_backoff_ms {
            return Err(SettingsError::Invalid(format!(
                "peering.max_backoff_ms ({}) is below peering.initial_backoff_ms ({})",
                peering.max_backoff_ms, peering.initial_backoff_ms
            )));
        }
        if peering.connect_attempts == 0 {
            return Err(SettingsError::Invalid(
                "peering.connect_attempts must be at least 1".into(),
            ));
        }
        if self.account_service.api_version.trim_matches('/').is_empty() {
            return Err(SettingsError::Invalid(
                "account_service.api_version must not be empty".into(),
            ));
        }
        Ok(())
    }
}

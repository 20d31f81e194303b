//! Bridge configuration.
//!
//! Loaded once at startup from defaults, an optional `config.toml` and the
//! environment, in that order of precedence.

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::models::{Tier, TierTable};
use crate::probe::ProbeThresholds;

pub const ENV_URL: &str = "TUNNELRUN_URL";
pub const ENV_SAVE_DIR: &str = "TUNNELRUN_SAVE_DIR";
pub const ENV_CHECKPOINT_DIR: &str = "TUNNELRUN_CHECKPOINT_DIR";

const APP_DIR: &str = "tunnelrun";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BridgeConfig {
    /// Public tunnel URL of the remote runtime.
    pub base_url: String,

    /// Where downloads land.
    pub save_dir: PathBuf,

    /// Where chunked-task checkpoint records live.
    pub checkpoint_dir: PathBuf,

    pub connect_timeout_secs: u64,

    /// Added to the remote's execution budget to form the HTTP deadline.
    pub network_grace_secs: u64,

    pub tiers: TierTable,

    pub probe: ProbeThresholds,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        let home = dirs::home_dir().unwrap_or_else(|| PathBuf::from("."));
        let cache = dirs::cache_dir().unwrap_or_else(|| home.join(".cache"));
        Self {
            base_url: String::new(),
            save_dir: home.join("tunnelrun_results"),
            checkpoint_dir: cache.join(APP_DIR).join("checkpoints"),
            connect_timeout_secs: 10,
            network_grace_secs: 30,
            tiers: TierTable::default(),
            probe: ProbeThresholds::default(),
        }
    }
}

impl BridgeConfig {
    /// Load configuration from `path`, or from the default config file if it
    /// exists, then apply environment overrides and validate.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = match path {
            Some(path) => Self::from_file(path)?,
            None => match default_config_path().filter(|p| p.exists()) {
                Some(path) => Self::from_file(&path)?,
                None => Self::default(),
            },
        };
        config.apply_env(|key| std::env::var(key).ok());
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        Self::from_toml(&content)
            .with_context(|| format!("Failed to parse config file {}", path.display()))
    }

    pub fn from_toml(content: &str) -> Result<Self> {
        Ok(toml::from_str(content)?)
    }

    /// Apply overrides from a variable lookup. Empty values are ignored.
    pub fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        let lookup = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        if let Some(url) = lookup(ENV_URL) {
            self.base_url = url.trim().to_string();
        }
        if let Some(dir) = lookup(ENV_SAVE_DIR) {
            self.save_dir = PathBuf::from(dir);
        }
        if let Some(dir) = lookup(ENV_CHECKPOINT_DIR) {
            self.checkpoint_dir = PathBuf::from(dir);
        }
    }

    pub fn validate(&self) -> Result<()> {
        let url = self.base_url.trim();
        if !url.is_empty() && !(url.starts_with("http://") || url.starts_with("https://")) {
            bail!("base_url must start with http:// or https://, got '{url}'");
        }
        for tier in Tier::ALL {
            if self.tiers.policy(tier).timeout_secs == 0 {
                bail!("timeout for the {tier} tier must be greater than zero");
            }
        }
        if self.connect_timeout_secs == 0 {
            bail!("connect_timeout_secs must be greater than zero");
        }
        if let Err(reason) = self.probe.validate() {
            bail!("invalid probe settings: {reason}");
        }
        Ok(())
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }

    pub fn network_grace(&self) -> Duration {
        Duration::from_secs(self.network_grace_secs)
    }
}

/// `$XDG_CONFIG_HOME/tunnelrun/config.toml` or the platform equivalent.
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join(APP_DIR).join("config.toml"))
}

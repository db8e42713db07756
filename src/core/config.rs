use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};
use std::time::Duration;
use tracing::{info, warn};

use crate::platform::{NativePlatform, Platform};

/// Controller configuration, loaded once at startup and replaced wholesale on
/// reload. Components never hold a `Config` directly; they hold a
/// [`ConfigHandle`] and take a fresh snapshot per operation, so whitelist and
/// operator edits take effect immediately, including for tasks scheduled
/// before the edit.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub telegram: TelegramConfig,

    #[serde(default)]
    pub security: SecurityConfig,

    #[serde(default)]
    pub paths: PathsConfig,

    #[serde(default)]
    pub gpio: GpioConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TelegramConfig {
    pub token: String,

    #[serde(default)]
    pub authorized_users: Vec<i64>,

    /// API key for voice transcription. Voice commands are refused when absent.
    #[serde(default)]
    pub stt_api_key: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SecurityConfig {
    /// Commands an operator may run. Matching is exact-string, arguments
    /// included: `"uptime -p"` does not authorize `"uptime -p --since"`.
    #[serde(default)]
    pub commands_whitelist: Vec<String>,

    #[serde(default = "default_command_timeout_secs")]
    pub command_timeout_secs: u64,

    #[serde(default = "default_motion_cooldown_secs")]
    pub motion_cooldown_secs: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PathsConfig {
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct GpioConfig {
    /// Pins the /gpio command may drive. An empty list refuses every pin.
    #[serde(default)]
    pub allowed_pins: Vec<u8>,
}

fn default_command_timeout_secs() -> u64 {
    30
}
fn default_motion_cooldown_secs() -> u64 {
    30
}
fn default_data_dir() -> PathBuf {
    NativePlatform::data_dir()
}

impl Default for SecurityConfig {
    fn default() -> Self {
        Self {
            commands_whitelist: Vec::new(),
            command_timeout_secs: default_command_timeout_secs(),
            motion_cooldown_secs: default_motion_cooldown_secs(),
        }
    }
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
        }
    }
}

impl Config {
    pub async fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("failed to read config file {}", path.display()))?;
        let config: Config = toml::from_str(&content)
            .with_context(|| format!("failed to parse config file {}", path.display()))?;

        if config.telegram.authorized_users.is_empty() {
            warn!("no authorized operators configured; every inbound request will be denied");
        }
        info!(
            "Loaded config: {} operator(s), {} whitelisted command(s), timeout={}s, cooldown={}s",
            config.telegram.authorized_users.len(),
            config.security.commands_whitelist.len(),
            config.security.command_timeout_secs,
            config.security.motion_cooldown_secs,
        );
        Ok(config)
    }

    pub fn is_authorized(&self, identity: i64) -> bool {
        self.telegram.authorized_users.contains(&identity)
    }

    /// Exact-string whitelist membership, arguments included.
    pub fn is_whitelisted(&self, command: &str) -> bool {
        self.security
            .commands_whitelist
            .iter()
            .any(|allowed| allowed == command)
    }

    pub fn pin_allowed(&self, pin: u8) -> bool {
        self.gpio.allowed_pins.contains(&pin)
    }

    pub fn command_timeout(&self) -> Duration {
        Duration::from_secs(self.security.command_timeout_secs)
    }

    pub fn db_path(&self) -> PathBuf {
        self.paths.data_dir.join("db").join("security.db")
    }

    pub fn media_dir(&self) -> PathBuf {
        self.paths.data_dir.join("media")
    }

    pub fn logs_dir(&self) -> PathBuf {
        self.paths.data_dir.join("logs")
    }
}

/// Shared, atomically swappable view of the configuration. Cloning the handle
/// is cheap; `snapshot()` yields an immutable `Arc<Config>` that stays
/// consistent for the duration of one operation.
#[derive(Clone)]
pub struct ConfigHandle {
    inner: Arc<RwLock<Arc<Config>>>,
}

impl ConfigHandle {
    pub fn new(config: Config) -> Self {
        Self {
            inner: Arc::new(RwLock::new(Arc::new(config))),
        }
    }

    pub fn snapshot(&self) -> Arc<Config> {
        match self.inner.read() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    /// Replace the active snapshot. In-flight operations keep the snapshot
    /// they already took; everything started afterwards sees the new one.
    pub fn swap(&self, config: Config) {
        let next = Arc::new(config);
        match self.inner.write() {
            Ok(mut guard) => *guard = next,
            Err(poisoned) => *poisoned.into_inner() = next,
        }
        info!("configuration snapshot replaced");
    }

    pub async fn reload_from<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let config = Config::load(path).await?;
        self.swap(config);
        Ok(())
    }
}

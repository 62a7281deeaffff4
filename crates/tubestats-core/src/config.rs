//! Store configuration and its layered resolution.
//!
//! Later layers win:
//!
//! 1. built-in defaults
//! 2. user file `<config_dir>/tubestats/config.toml`
//! 3. data-folder file `<data>/tubestats.toml`
//! 4. environment (`TUBESTATS_DATA_DIR`, `TUBESTATS_MAX_THREADS`,
//!    `TUBESTATS_MISS_TOLERANCE`, `TUBESTATS_API_HOST`)
//! 5. command-line overrides

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::ErrorCode;

/// Name of the per-data-folder config file.
pub const DATA_CONFIG_FILE: &str = "tubestats.toml";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreConfig {
    /// Root of snapshots and state files.
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,
    /// Upper bound on worker threads for file fan-out.
    #[serde(default = "default_max_threads")]
    pub max_threads: usize,
    /// Days searched on either side of a missing raw day.
    #[serde(default)]
    pub miss_tolerance_days: u32,
    /// How long an import waits for another import to finish.
    #[serde(default = "default_lock_timeout_ms")]
    pub lock_timeout_ms: u64,
    /// Host of the video platform, used for report links.
    #[serde(default = "default_api_host")]
    pub api_host: String,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            max_threads: default_max_threads(),
            miss_tolerance_days: 0,
            lock_timeout_ms: default_lock_timeout_ms(),
            api_host: default_api_host(),
        }
    }
}

impl StoreConfig {
    /// Config rooted at `data_dir` with every other setting at its default.
    #[must_use]
    pub fn for_data_dir(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            data_dir: data_dir.into(),
            ..Self::default()
        }
    }

    /// Worker count actually used: never below one.
    #[must_use]
    pub fn workers(&self) -> usize {
        self.max_threads.max(1)
    }

    #[must_use]
    pub const fn lock_timeout(&self) -> std::time::Duration {
        std::time::Duration::from_millis(self.lock_timeout_ms)
    }

    fn apply(&mut self, layer: &ConfigLayer) {
        if let Some(data_dir) = &layer.data_dir {
            self.data_dir.clone_from(data_dir);
        }
        if let Some(max_threads) = layer.max_threads {
            self.max_threads = max_threads;
        }
        if let Some(days) = layer.miss_tolerance_days {
            self.miss_tolerance_days = days;
        }
        if let Some(ms) = layer.lock_timeout_ms {
            self.lock_timeout_ms = ms;
        }
        if let Some(host) = &layer.api_host {
            self.api_host.clone_from(host);
        }
    }
}

/// A config file that exists but cannot be used.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to parse {}: {source}", path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
}

impl ConfigError {
    #[must_use]
    pub const fn code(&self) -> ErrorCode {
        match self {
            Self::Parse { .. } => ErrorCode::ConfigParseError,
        }
    }
}

/// A partial config: one file, the environment, or command-line flags.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfigLayer {
    #[serde(default)]
    pub data_dir: Option<PathBuf>,
    #[serde(default)]
    pub max_threads: Option<usize>,
    #[serde(default)]
    pub miss_tolerance_days: Option<u32>,
    #[serde(default)]
    pub lock_timeout_ms: Option<u64>,
    #[serde(default)]
    pub api_host: Option<String>,
}

/// Read a layer from `path`; a missing file is an empty layer.
///
/// Invalid TOML surfaces as [`ConfigError::Parse`] inside the returned error.
pub fn load_layer(path: &Path) -> Result<ConfigLayer> {
    if !path.exists() {
        return Ok(ConfigLayer::default());
    }

    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;

    let layer = toml::from_str::<ConfigLayer>(&content).map_err(|source| ConfigError::Parse {
        path: path.to_path_buf(),
        source,
    })?;
    Ok(layer)
}

pub fn load_user_layer() -> Result<ConfigLayer> {
    let Some(config_dir) = dirs::config_dir() else {
        return Ok(ConfigLayer::default());
    };
    load_layer(&config_dir.join("tubestats/config.toml"))
}

/// Build a layer from environment variables looked up through `var`.
pub fn env_layer(var: impl Fn(&str) -> Option<String>) -> Result<ConfigLayer> {
    fn parsed<T: std::str::FromStr>(name: &str, raw: Option<String>) -> Result<Option<T>>
    where
        T::Err: std::error::Error + Send + Sync + 'static,
    {
        raw.map(|value| {
            value
                .trim()
                .parse::<T>()
                .with_context(|| format!("Invalid value '{value}' for {name}"))
        })
        .transpose()
    }

    Ok(ConfigLayer {
        data_dir: var("TUBESTATS_DATA_DIR").map(PathBuf::from),
        max_threads: parsed("TUBESTATS_MAX_THREADS", var("TUBESTATS_MAX_THREADS"))?,
        miss_tolerance_days: parsed("TUBESTATS_MISS_TOLERANCE", var("TUBESTATS_MISS_TOLERANCE"))?,
        lock_timeout_ms: None,
        api_host: var("TUBESTATS_API_HOST"),
    })
}

/// Resolve the effective config from every layer.
///
/// The data folder is settled first (user file, environment, flags) so that
/// its own `tubestats.toml` can be read; that file cannot move the folder.
pub fn resolve_config(cli: &ConfigLayer) -> Result<StoreConfig> {
    let user = load_user_layer()?;
    let env = env_layer(|name| std::env::var(name).ok())?;
    resolve_with(&user, &env, cli)
}

fn resolve_with(user: &ConfigLayer, env: &ConfigLayer, cli: &ConfigLayer) -> Result<StoreConfig> {
    let mut located = StoreConfig::default();
    for layer in [user, env, cli] {
        located.apply(&ConfigLayer {
            data_dir: layer.data_dir.clone(),
            ..ConfigLayer::default()
        });
    }

    let mut data_layer = load_layer(&located.data_dir.join(DATA_CONFIG_FILE))?;
    data_layer.data_dir = None;

    let mut config = StoreConfig::default();
    for layer in [user, &data_layer, env, cli] {
        config.apply(layer);
    }
    tracing::debug!(
        data_dir = %config.data_dir.display(),
        max_threads = config.max_threads,
        miss_tolerance_days = config.miss_tolerance_days,
        "config resolved"
    );
    Ok(config)
}

fn default_data_dir() -> PathBuf {
    PathBuf::from("./Data")
}

const fn default_max_threads() -> usize {
    10
}

const fn default_lock_timeout_ms() -> u64 {
    5000
}

fn default_api_host() -> String {
    "localhost".to_string()
}

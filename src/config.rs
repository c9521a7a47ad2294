//! Global configuration parsing and validation.

use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::{AppError, Result};

/// Environment variable holding the sudo password used for Linux reboot/shutdown.
pub const ROOT_PASSWORD_ENV: &str = "PROCWARDEN_ROOT_PASSWORD";

/// Local API server settings. The port is the one arbitrated at startup.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct ServerConfig {
    /// Interface the API listens on.
    #[serde(default = "default_host")]
    pub host: String,
    /// TCP port the API listens on.
    #[serde(default = "default_port")]
    pub port: u16,
    /// Entry asset served at `/`; must exist before the server binds.
    #[serde(default = "default_entry_asset")]
    pub entry_asset: PathBuf,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            entry_asset: default_entry_asset(),
        }
    }
}

/// Local IPC settings for `procwarden-ctl`.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct IpcConfig {
    /// Named pipe / Unix socket identifier.
    #[serde(default = "default_ipc_name")]
    pub name: String,
}

impl Default for IpcConfig {
    fn default() -> Self {
        Self {
            name: default_ipc_name(),
        }
    }
}

/// Restart supervision settings.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct RestartConfig {
    /// Interval between restart-record checks.
    #[serde(default = "default_poll_seconds")]
    pub poll_seconds: u64,
}

impl Default for RestartConfig {
    fn default() -> Self {
        Self {
            poll_seconds: default_poll_seconds(),
        }
    }
}

/// Startup hygiene settings.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct HygieneConfig {
    /// Reserved directory name purged recursively under the working tree.
    #[serde(default = "default_cache_dir_name")]
    pub cache_dir_name: String,
    /// Files in the data directory with this extension keep their mode.
    #[serde(default = "default_exempt_extension")]
    pub exempt_extension: String,
}

impl Default for HygieneConfig {
    fn default() -> Self {
        Self {
            cache_dir_name: default_cache_dir_name(),
            exempt_extension: default_exempt_extension(),
        }
    }
}

/// Keyword vocabulary used to classify phrases and confirm destructive actions.
///
/// Only a minimal default set ships; deployments override it in TOML.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case", default)]
pub struct KeywordConfig {
    /// Affirmative acknowledgement tokens.
    pub ok: Vec<String>,
    /// Restart intent keywords.
    pub restart: Vec<String>,
    /// Host shutdown intent keywords.
    pub shutdown: Vec<String>,
    /// Sleep (lock screen) intent keywords.
    pub sleep: Vec<String>,
    /// Sentry mode intent keywords.
    pub sentry: Vec<String>,
    /// Stop-the-controller intent keywords.
    pub kill: Vec<String>,
}

impl Default for KeywordConfig {
    fn default() -> Self {
        let list = |words: &[&str]| words.iter().map(|w| (*w).to_owned()).collect();
        Self {
            ok: list(&["yes", "yeah", "yep", "sure", "ok", "okay", "proceed", "go ahead"]),
            restart: list(&["restart", "reboot", "relaunch"]),
            shutdown: list(&["shutdown", "shut down", "power off", "turn off"]),
            sleep: list(&["sleep", "lock"]),
            sentry: list(&["sentry"]),
            kill: list(&["kill", "terminate", "stop listening"]),
        }
    }
}

/// A background process launched and supervised by the controller.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct BackgroundProcess {
    /// Registry name used for matching and restart records.
    pub name: String,
    /// Program and arguments.
    pub command: Vec<String>,
}

fn default_host() -> String {
    "127.0.0.1".into()
}

fn default_port() -> u16 {
    4483
}

fn default_entry_asset() -> PathBuf {
    PathBuf::from("fileio").join("index.html")
}

fn default_ipc_name() -> String {
    "procwarden".into()
}

fn default_poll_seconds() -> u64 {
    5
}

fn default_cache_dir_name() -> String {
    "__cache__".into()
}

fn default_exempt_extension() -> String {
    "cid".into()
}

fn default_name() -> String {
    "procwarden".into()
}

fn default_working_dir() -> PathBuf {
    PathBuf::from(".")
}

fn default_data_dir() -> PathBuf {
    PathBuf::from("fileio")
}

fn default_logs_dir() -> PathBuf {
    PathBuf::from("logs")
}

fn default_log_retention_days() -> u32 {
    10
}

fn default_volume() -> u8 {
    50
}

fn default_title() -> String {
    "sir".into()
}

/// Global configuration parsed from `procwarden.toml`.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct GlobalConfig {
    /// The controller's own process name; never a restart or match target.
    #[serde(default = "default_name")]
    pub name: String,
    /// Root for relative paths and for the cache purge walk.
    #[serde(default = "default_working_dir")]
    pub working_dir: PathBuf,
    /// Data directory holding the database and state files.
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,
    /// Log directory purged by age at startup.
    #[serde(default = "default_logs_dir")]
    pub logs_dir: PathBuf,
    /// Days a log file is kept after its last status change.
    #[serde(default = "default_log_retention_days")]
    pub log_retention_days: u32,
    /// Default output volume applied at startup.
    #[serde(default = "default_volume")]
    pub volume: u8,
    /// Honorific used in spoken responses.
    #[serde(default = "default_title")]
    pub title: String,
    /// API server settings.
    #[serde(default)]
    pub server: ServerConfig,
    /// IPC settings.
    #[serde(default)]
    pub ipc: IpcConfig,
    /// Restart supervision settings.
    #[serde(default)]
    pub restart: RestartConfig,
    /// Startup hygiene settings.
    #[serde(default)]
    pub hygiene: HygieneConfig,
    /// Intent and acknowledgement vocabulary.
    #[serde(default)]
    pub keywords: KeywordConfig,
    /// Background processes launched at startup.
    #[serde(default)]
    pub background: Vec<BackgroundProcess>,
}

impl GlobalConfig {
    /// Load and validate configuration from a TOML file path.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` if the file cannot be read or contains
    /// invalid TOML, or if validation fails.
    pub fn load_from_path(path: impl AsRef<Path>) -> Result<Self> {
        let raw = fs::read_to_string(path)
            .map_err(|err| AppError::Config(format!("failed to read config: {err}")))?;
        Self::from_toml_str(&raw)
    }

    /// Parse configuration from a TOML string and normalize paths.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` if parsing or validation fails.
    pub fn from_toml_str(raw: &str) -> Result<Self> {
        let mut config: Self = toml::from_str(raw)?;
        config.validate()?;
        Ok(config)
    }

    /// Resolve a configured path against the working directory.
    #[must_use]
    pub fn resolve(&self, path: &Path) -> PathBuf {
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.working_dir.join(path)
        }
    }

    /// Absolute data directory.
    #[must_use]
    pub fn data_dir(&self) -> PathBuf {
        self.resolve(&self.data_dir)
    }

    /// Absolute log directory.
    #[must_use]
    pub fn logs_dir(&self) -> PathBuf {
        self.resolve(&self.logs_dir)
    }

    /// Path of the `SQLite` database holding restart records.
    #[must_use]
    pub fn db_path(&self) -> PathBuf {
        self.data_dir().join("database.db")
    }

    /// Path of the process registry state file.
    #[must_use]
    pub fn registry_path(&self) -> PathBuf {
        self.data_dir().join("processes.json")
    }

    /// Marker file recording the speech-synthesis container id.
    #[must_use]
    pub fn container_id_path(&self) -> PathBuf {
        self.data_dir().join("speech_synthesis.cid")
    }

    /// File the IPC shared secret is written to for `procwarden-ctl`.
    #[must_use]
    pub fn ipc_token_path(&self) -> PathBuf {
        self.data_dir().join("ipc.token")
    }

    /// Absolute path of the server entry asset.
    #[must_use]
    pub fn entry_asset(&self) -> PathBuf {
        self.resolve(&self.server.entry_asset)
    }

    /// Sudo password for Linux power actions, read from the environment.
    #[must_use]
    pub fn root_password() -> Option<String> {
        env::var(ROOT_PASSWORD_ENV).ok().filter(|v| !v.is_empty())
    }

    fn validate(&mut self) -> Result<()> {
        if self.name.trim().is_empty() {
            return Err(AppError::Config("name must not be empty".into()));
        }

        if !(1..90).contains(&self.log_retention_days) {
            return Err(AppError::Config(
                "log_retention_days must be between 1 and 89".into(),
            ));
        }

        if self.volume > 100 {
            return Err(AppError::Config("volume must be at most 100".into()));
        }

        if self.restart.poll_seconds == 0 {
            return Err(AppError::Config(
                "restart.poll_seconds must be greater than zero".into(),
            ));
        }

        if self.keywords.ok.is_empty() {
            return Err(AppError::Config("keywords.ok must not be empty".into()));
        }

        for process in &self.background {
            if process.command.is_empty() {
                return Err(AppError::Config(format!(
                    "background process '{}' has an empty command",
                    process.name
                )));
            }
            if process.name == self.name {
                return Err(AppError::Config(format!(
                    "background process may not reuse the controller name '{}'",
                    self.name
                )));
            }
        }

        let canonical_root = self
            .working_dir
            .canonicalize()
            .map_err(|err| AppError::Config(format!("working_dir invalid: {err}")))?;
        self.working_dir = canonical_root;

        Ok(())
    }
}

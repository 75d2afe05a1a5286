//! Configuration system for the `kanban` client.
//!
//! Supports layered configuration with the following priority (highest first):
//! 1. CLI arguments
//! 2. Environment variables (via clap `env` attribute)
//! 3. TOML config file (`~/.config/kanban/config.toml`)
//! 4. Compiled defaults
//!
//! Missing config file is not an error (defaults are used). An explicit
//! `--config` path that doesn't exist is an error.

use std::path::PathBuf;
use std::time::Duration;

use kanban_proto::task::{MAX_TASK_DESCRIPTION_LENGTH, MAX_TASK_TITLE_LENGTH};

/// Errors that can occur when loading configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Failed to read the configuration file.
    #[error("failed to read config file {path}: {source}")]
    ReadFile {
        /// Path that was attempted.
        path: PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },

    /// Failed to parse the TOML configuration.
    #[error("failed to parse config file: {0}")]
    ParseToml(#[from] toml::de::Error),
}

// ---------------------------------------------------------------------------
// TOML file structs (all fields Option for partial overrides)
// ---------------------------------------------------------------------------

/// Top-level TOML config file structure.
#[derive(Debug, Default, serde::Deserialize)]
#[serde(default)]
struct ConfigFile {
    server: ServerFileConfig,
    sync: SyncFileConfig,
    board: BoardFileConfig,
}

/// `[server]` section of the config file.
#[derive(Debug, Default, serde::Deserialize)]
#[serde(default)]
struct ServerFileConfig {
    base_url: Option<String>,
    channel_url: Option<String>,
    user_id: Option<String>,
}

/// `[sync]` section of the config file.
#[derive(Debug, Default, serde::Deserialize)]
#[serde(default)]
struct SyncFileConfig {
    request_timeout_secs: Option<u64>,
    connect_timeout_secs: Option<u64>,
    join_timeout_secs: Option<u64>,
    prefer_push: Option<bool>,
    channel_capacity: Option<usize>,
    reconnect_attempts: Option<u32>,
    reconnect_initial_delay_ms: Option<u64>,
    reconnect_max_delay_secs: Option<u64>,
}

/// `[board]` section of the config file.
#[derive(Debug, Default, serde::Deserialize)]
#[serde(default)]
struct BoardFileConfig {
    max_title_len: Option<usize>,
    max_description_len: Option<usize>,
    notice_ttl_secs: Option<u64>,
}

// ---------------------------------------------------------------------------
// Resolved configuration (concrete types, all fields populated)
// ---------------------------------------------------------------------------

/// Board-level limits and timings used by the reconciliation controller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BoardSettings {
    /// Maximum task title length in characters.
    pub max_title_len: usize,
    /// Maximum task description length in characters.
    pub max_description_len: usize,
    /// How long a transient error stays visible.
    pub notice_ttl: Duration,
}

impl Default for BoardSettings {
    fn default() -> Self {
        Self {
            max_title_len: MAX_TASK_TITLE_LENGTH,
            max_description_len: MAX_TASK_DESCRIPTION_LENGTH,
            notice_ttl: Duration::from_secs(5),
        }
    }
}

/// Transport timeouts and preferences.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncSettings {
    /// Per-request timeout for the HTTP client.
    pub request_timeout: Duration,
    /// Timeout for the push channel handshake.
    pub connect_timeout: Duration,
    /// Timeout for the push channel `joined` acknowledgment.
    pub join_timeout: Duration,
    /// Whether to open the push channel at all.
    pub prefer_push: bool,
    /// Inbound notification buffer size.
    pub channel_capacity: usize,
    /// Attempts to rejoin a lost push channel. Zero disables reconnecting.
    pub reconnect_attempts: u32,
    /// Wait before the first reconnect attempt; doubles after each failure.
    pub reconnect_initial_delay: Duration,
    /// Upper bound on the wait between reconnect attempts.
    pub reconnect_max_delay: Duration,
}

impl Default for SyncSettings {
    fn default() -> Self {
        Self {
            request_timeout: Duration::from_secs(10),
            connect_timeout: Duration::from_secs(10),
            join_timeout: Duration::from_secs(5),
            prefer_push: true,
            channel_capacity: 256,
            reconnect_attempts: 5,
            reconnect_initial_delay: Duration::from_millis(500),
            reconnect_max_delay: Duration::from_secs(30),
        }
    }
}

/// Fully resolved client configuration.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Base URL of the REST endpoints. `None` runs against the demo store.
    pub base_url: Option<String>,
    /// Explicit push channel URL. Derived from `base_url` when absent.
    pub channel_url: Option<String>,
    /// The signed-in user.
    pub user_id: String,
    /// Transport settings.
    pub sync: SyncSettings,
    /// Board settings.
    pub board: BoardSettings,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            base_url: None,
            channel_url: None,
            user_id: "local".to_string(),
            sync: SyncSettings::default(),
            board: BoardSettings::default(),
        }
    }
}

impl ClientConfig {
    /// Load configuration by merging CLI args, env vars, and a TOML file.
    ///
    /// If `--config` is given and the file does not exist, returns an
    /// error. Otherwise the default path (`~/.config/kanban/config.toml`)
    /// is tried and silently ignored if missing.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if the config file cannot be read or parsed.
    pub fn load(cli: &CliArgs) -> Result<Self, ConfigError> {
        let file = load_config_file(cli.config.as_deref())?;
        Ok(Self::resolve(cli, &file))
    }

    /// Resolve a `ClientConfig` from CLI args and a parsed config file.
    ///
    /// Priority: CLI > file > default.
    #[must_use]
    fn resolve(cli: &CliArgs, file: &ConfigFile) -> Self {
        let defaults = Self::default();

        Self {
            base_url: cli
                .base_url
                .clone()
                .or_else(|| file.server.base_url.clone()),
            channel_url: cli
                .channel_url
                .clone()
                .or_else(|| file.server.channel_url.clone()),
            user_id: cli
                .user_id
                .clone()
                .or_else(|| file.server.user_id.clone())
                .unwrap_or(defaults.user_id),
            sync: SyncSettings {
                request_timeout: file
                    .sync
                    .request_timeout_secs
                    .map_or(defaults.sync.request_timeout, Duration::from_secs),
                connect_timeout: file
                    .sync
                    .connect_timeout_secs
                    .map_or(defaults.sync.connect_timeout, Duration::from_secs),
                join_timeout: file
                    .sync
                    .join_timeout_secs
                    .map_or(defaults.sync.join_timeout, Duration::from_secs),
                prefer_push: !cli.no_push
                    && file.sync.prefer_push.unwrap_or(defaults.sync.prefer_push),
                channel_capacity: file
                    .sync
                    .channel_capacity
                    .unwrap_or(defaults.sync.channel_capacity),
                reconnect_attempts: file
                    .sync
                    .reconnect_attempts
                    .unwrap_or(defaults.sync.reconnect_attempts),
                reconnect_initial_delay: file
                    .sync
                    .reconnect_initial_delay_ms
                    .map_or(defaults.sync.reconnect_initial_delay, Duration::from_millis),
                reconnect_max_delay: file
                    .sync
                    .reconnect_max_delay_secs
                    .map_or(defaults.sync.reconnect_max_delay, Duration::from_secs),
            },
            board: BoardSettings {
                max_title_len: file
                    .board
                    .max_title_len
                    .unwrap_or(defaults.board.max_title_len),
                max_description_len: file
                    .board
                    .max_description_len
                    .unwrap_or(defaults.board.max_description_len),
                notice_ttl: file
                    .board
                    .notice_ttl_secs
                    .map_or(defaults.board.notice_ttl, Duration::from_secs),
            },
        }
    }

    /// The push channel URL: the explicit one, or `base_url` with a
    /// `ws`/`wss` scheme and a trailing `/ws` segment.
    ///
    /// Returns `None` without a base URL or when push is disabled.
    #[must_use]
    pub fn resolved_channel_url(&self) -> Option<String> {
        if !self.sync.prefer_push {
            return None;
        }
        if let Some(explicit) = &self.channel_url {
            return Some(explicit.clone());
        }
        let mut url = url::Url::parse(self.base_url.as_deref()?).ok()?;
        let scheme = match url.scheme() {
            "https" => "wss",
            "http" => "ws",
            _ => return None,
        };
        url.set_scheme(scheme).ok()?;
        url.path_segments_mut().ok()?.pop_if_empty().push("ws");
        Some(url.to_string())
    }
}

/// CLI arguments parsed by clap.
#[derive(clap::Parser, Debug, Default)]
#[command(version, about = "Kanban board client with optimistic sync")]
pub struct CliArgs {
    /// Base URL of the task store REST API.
    #[arg(long, env = "KANBAN_BASE_URL")]
    pub base_url: Option<String>,

    /// WebSocket URL of the push channel (default: derived from base URL).
    #[arg(long, env = "KANBAN_CHANNEL_URL")]
    pub channel_url: Option<String>,

    /// The user whose board to open.
    #[arg(long, env = "KANBAN_USER_ID")]
    pub user_id: Option<String>,

    /// Never open the push channel.
    #[arg(long)]
    pub no_push: bool,

    /// Path to config file (default: `~/.config/kanban/config.toml`).
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Log level filter (trace, debug, info, warn, error).
    #[arg(long, default_value = "info", env = "KANBAN_LOG")]
    pub log_level: String,

    /// Path to log file (default: `$TMPDIR/kanban.log`).
    #[arg(long)]
    pub log_file: Option<PathBuf>,

    /// What to do. Defaults to `show`.
    #[command(subcommand)]
    pub command: Option<Command>,
}

/// Board operations available from the command line.
#[derive(clap::Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Print the board.
    Show,
    /// Add a task.
    Add {
        /// Task title.
        title: String,
        /// Task description.
        #[arg(long, short, default_value = "")]
        description: String,
        /// Lane label (default: To-Do).
        #[arg(long)]
        category: Option<String>,
    },
    /// Drop a task onto another task or a lane label.
    Move {
        /// The dragged task.
        active: String,
        /// The task or lane label it is dropped on.
        over: String,
    },
    /// Edit a task's title or description.
    Edit {
        /// Task to edit.
        id: String,
        /// New title.
        #[arg(long)]
        title: Option<String>,
        /// New description.
        #[arg(long)]
        description: Option<String>,
    },
    /// Delete a task.
    Delete {
        /// Task to delete.
        id: String,
        /// Skip the confirmation prompt.
        #[arg(long, short)]
        yes: bool,
    },
    /// Follow push notifications and print the board on every change.
    Watch,
}

// ---------------------------------------------------------------------------
// Internal helpers
// ---------------------------------------------------------------------------

/// Load and parse a TOML config file.
///
/// If `explicit_path` is `Some`, the file must exist (error if not).
/// If `explicit_path` is `None`, the default path is tried and missing file
/// is treated as empty config.
fn load_config_file(explicit_path: Option<&std::path::Path>) -> Result<ConfigFile, ConfigError> {
    if let Some(p) = explicit_path {
        let contents = std::fs::read_to_string(p).map_err(|e| ConfigError::ReadFile {
            path: p.to_path_buf(),
            source: e,
        })?;
        return Ok(toml::from_str(&contents)?);
    }

    let Some(config_dir) = dirs::config_dir() else {
        return Ok(ConfigFile::default());
    };
    let path = config_dir.join("kanban").join("config.toml");

    match std::fs::read_to_string(&path) {
        Ok(contents) => Ok(toml::from_str(&contents)?),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(ConfigFile::default()),
        Err(e) => Err(ConfigError::ReadFile { path, source: e }),
    }
}

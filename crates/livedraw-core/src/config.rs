// Configuration loading and parsing (livedraw.toml, credentials.toml).

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;
use thiserror::Error;

use crate::model::LeagueId;

// ---------------------------------------------------------------------------
// Error types
// ---------------------------------------------------------------------------

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("config file not found: {path}")]
    FileNotFound { path: PathBuf },

    #[error("failed to parse config file {path}: {source}")]
    ParseError {
        path: PathBuf,
        source: toml::de::Error,
    },

    #[error("validation error for field `{field}`: {message}")]
    ValidationError { field: String, message: String },

    #[error("failed to initialize config from defaults: {message}")]
    DefaultsCopyError { message: String },
}

// ---------------------------------------------------------------------------
// Top-level assembled Config
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct Config {
    pub server: ServerConfig,
    pub draw: DrawConfig,
    pub timing: TimingConfig,
    pub logging: LoggingConfig,
    pub credentials: Credentials,
}

// ---------------------------------------------------------------------------
// livedraw.toml structs
// ---------------------------------------------------------------------------

/// Raw deserialization target for the entire livedraw.toml file.
#[derive(Debug, Clone, Deserialize)]
struct LivedrawFile {
    server: ServerConfig,
    draw: DrawConfig,
    #[serde(default)]
    timing: TimingConfig,
    #[serde(default)]
    logging: LoggingConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    /// API root, e.g. `http://localhost:8000/api`.
    pub base_url: String,
}

/// Whether this client drives the draw or only watches it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DrawRole {
    /// Triggers start-draw and perform-draw.
    Driver,
    /// Polls and displays only.
    Observer,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DrawConfig {
    pub league_id: LeagueId,
    pub role: DrawRole,
    /// Poll the live-reactions feed alongside the draw.
    #[serde(default = "default_true")]
    pub reactions: bool,
}

/// Delays and intervals, in milliseconds.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct TimingConfig {
    pub poll_interval_ms: u64,
    pub assign_delay_ms: u64,
    pub complete_delay_ms: u64,
    pub clock_tick_ms: u64,
    pub reactions_interval_ms: u64,
}

impl Default for TimingConfig {
    fn default() -> Self {
        TimingConfig {
            poll_interval_ms: 5000,
            assign_delay_ms: 2000,
            complete_delay_ms: 1000,
            clock_tick_ms: 1000,
            reactions_interval_ms: 5000,
        }
    }
}

impl TimingConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn assign_delay(&self) -> Duration {
        Duration::from_millis(self.assign_delay_ms)
    }

    pub fn complete_delay(&self) -> Duration {
        Duration::from_millis(self.complete_delay_ms)
    }

    pub fn clock_tick(&self) -> Duration {
        Duration::from_millis(self.clock_tick_ms)
    }

    pub fn reactions_interval(&self) -> Duration {
        Duration::from_millis(self.reactions_interval_ms)
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub dir: String,
    /// `EnvFilter` directive used when `RUST_LOG` is unset.
    pub filter: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        LoggingConfig {
            dir: "logs".into(),
            filter: "livedraw=info,warn".into(),
        }
    }
}

fn default_true() -> bool {
    true
}

// ---------------------------------------------------------------------------
// credentials.toml structs
// ---------------------------------------------------------------------------

/// Bearer credential passed explicitly to the API client.
#[derive(Clone, Deserialize, Default)]
pub struct Credentials {
    pub token: Option<String>,
}

impl Credentials {
    pub fn bearer(token: impl Into<String>) -> Self {
        Credentials {
            token: Some(token.into()),
        }
    }

    /// The token, if one is configured and non-empty.
    pub fn token(&self) -> Option<&str> {
        self.token.as_deref().filter(|t| !t.is_empty())
    }
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("token", &self.token().map(|_| "<redacted>"))
            .finish()
    }
}

// ---------------------------------------------------------------------------
// Loading logic
// ---------------------------------------------------------------------------

/// Load and validate configuration from `config/livedraw.toml` and
/// (optionally) `config/credentials.toml`, relative to `base_dir`.
///
/// Does not copy defaults; `load_config()` does that first.
pub fn load_config_from(base_dir: &Path) -> Result<Config, ConfigError> {
    let config_dir = base_dir.join("config");

    // --- livedraw.toml (required) ---
    let main_path = config_dir.join("livedraw.toml");
    let main_text = read_file(&main_path)?;
    let file: LivedrawFile = toml::from_str(&main_text).map_err(|e| ConfigError::ParseError {
        path: main_path.clone(),
        source: e,
    })?;

    // --- credentials.toml (optional) ---
    let credentials_path = config_dir.join("credentials.toml");
    let credentials = if credentials_path.exists() {
        let cred_text = read_file(&credentials_path)?;
        toml::from_str(&cred_text).map_err(|e| ConfigError::ParseError {
            path: credentials_path.clone(),
            source: e,
        })?
    } else {
        Credentials::default()
    };

    let config = Config {
        server: file.server,
        draw: file.draw,
        timing: file.timing,
        logging: file.logging,
        credentials,
    };

    validate(&config)?;

    Ok(config)
}

/// Shipped templates and the `config/` file each one seeds.
const TEMPLATES: [(&str, &str); 2] = [
    ("livedraw.toml", "livedraw.toml"),
    ("credentials.toml.example", "credentials.toml"),
];

/// Seed `config/` from the templates in `defaults/` on first run.
///
/// `livedraw.toml` is copied as-is; `credentials.toml` is created from
/// `credentials.toml.example` so a token can be pasted in without editing
/// tracked files. Existing files are never overwritten. Returns the paths
/// that were created.
pub fn ensure_config_files(base_dir: &Path) -> Result<Vec<PathBuf>, ConfigError> {
    let defaults_dir = base_dir.join("defaults");
    let config_dir = base_dir.join("config");

    if !defaults_dir.is_dir() {
        if config_dir.join("livedraw.toml").is_file() {
            return Ok(vec![]);
        }
        return Err(ConfigError::DefaultsCopyError {
            message: format!(
                "no config/livedraw.toml and no defaults/ to seed it from in {}",
                base_dir.display()
            ),
        });
    }

    std::fs::create_dir_all(&config_dir).map_err(|e| ConfigError::DefaultsCopyError {
        message: format!("failed to create config directory: {e}"),
    })?;

    let mut created = Vec::new();
    for (template, target) in TEMPLATES {
        let source = defaults_dir.join(template);
        if !source.is_file() {
            continue;
        }
        let target = config_dir.join(target);
        if seed_file(&source, &target)? {
            created.push(target);
        }
    }

    Ok(created)
}

/// Copy `source` to `target` unless `target` already exists.
fn seed_file(source: &Path, target: &Path) -> Result<bool, ConfigError> {
    let mut dest = match std::fs::OpenOptions::new()
        .write(true)
        .create_new(true)
        .open(target)
    {
        Ok(dest) => dest,
        Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => return Ok(false),
        Err(e) => {
            return Err(ConfigError::DefaultsCopyError {
                message: format!("failed to create {}: {e}", target.display()),
            })
        }
    };
    let content = std::fs::read(source).map_err(|e| ConfigError::DefaultsCopyError {
        message: format!("failed to read {}: {e}", source.display()),
    })?;
    std::io::Write::write_all(&mut dest, &content).map_err(|e| ConfigError::DefaultsCopyError {
        message: format!("failed to write {}: {e}", target.display()),
    })?;
    Ok(true)
}

/// Load config relative to the current working directory, copying
/// defaults into place first.
pub fn load_config() -> Result<Config, ConfigError> {
    let cwd = std::env::current_dir().map_err(|_| ConfigError::FileNotFound {
        path: PathBuf::from("."),
    })?;
    ensure_config_files(&cwd)?;
    load_config_from(&cwd)
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn read_file(path: &Path) -> Result<String, ConfigError> {
    std::fs::read_to_string(path).map_err(|_| ConfigError::FileNotFound {
        path: path.to_path_buf(),
    })
}

// ---------------------------------------------------------------------------
// Validation
// ---------------------------------------------------------------------------

fn validate(config: &Config) -> Result<(), ConfigError> {
    let url = config.server.base_url.trim();
    if !(url.starts_with("http://") || url.starts_with("https://")) {
        return Err(ConfigError::ValidationError {
            field: "server.base_url".into(),
            message: format!("must be an http(s) URL, got {url:?}"),
        });
    }

    if config.draw.league_id == 0 {
        return Err(ConfigError::ValidationError {
            field: "draw.league_id".into(),
            message: "must be greater than 0".into(),
        });
    }

    // Intervals must be positive; delays may be zero.
    let t = &config.timing;
    let interval_fields: &[(&str, u64)] = &[
        ("timing.poll_interval_ms", t.poll_interval_ms),
        ("timing.clock_tick_ms", t.clock_tick_ms),
        ("timing.reactions_interval_ms", t.reactions_interval_ms),
    ];
    for (name, val) in interval_fields {
        if *val == 0 {
            return Err(ConfigError::ValidationError {
                field: name.to_string(),
                message: "must be > 0".into(),
            });
        }
    }

    if config.logging.filter.trim().is_empty() {
        return Err(ConfigError::ValidationError {
            field: "logging.filter".into(),
            message: "must not be empty".into(),
        });
    }

    Ok(())
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------

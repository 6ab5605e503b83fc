// Configuration loading and parsing (config/matchday.toml).

use std::path::{Path, PathBuf};

use chrono::Duration;
use directories::ProjectDirs;
use serde::Deserialize;
use thiserror::Error;

use crate::lifecycle::DEFAULT_LIVE_WINDOW_MINUTES;
use crate::model::PointsSystem;

/// File name looked up under `config/` and `defaults/`.
pub const CONFIG_FILE: &str = "matchday.toml";

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
// Config structs
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    /// Points system given to newly created leagues.
    pub points: PointsSystem,
    pub schedule: ScheduleConfig,
    /// SQLite path. Empty means "use the platform data directory".
    pub db_path: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub struct ScheduleConfig {
    /// Gap between the placeholder dates of consecutive rounds.
    #[serde(default = "default_days_between_rounds")]
    pub days_between_rounds: u32,
    /// How long after kick-off a timed fixture may still be auto-started.
    #[serde(default = "default_live_window_minutes")]
    pub live_window_minutes: u32,
}

impl ScheduleConfig {
    pub fn live_window(&self) -> Duration {
        Duration::minutes(i64::from(self.live_window_minutes))
    }
}

impl Default for ScheduleConfig {
    fn default() -> Self {
        ScheduleConfig {
            days_between_rounds: DEFAULT_DAYS_BETWEEN_ROUNDS,
            live_window_minutes: DEFAULT_LIVE_WINDOW_MINUTES,
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Config {
            points: PointsSystem::default(),
            schedule: ScheduleConfig::default(),
            db_path: String::new(),
        }
    }
}

const DEFAULT_DAYS_BETWEEN_ROUNDS: u32 = 7;

fn default_days_between_rounds() -> u32 {
    DEFAULT_DAYS_BETWEEN_ROUNDS
}

fn default_live_window_minutes() -> u32 {
    DEFAULT_LIVE_WINDOW_MINUTES
}

/// Raw deserialization target for the whole file.
#[derive(Debug, Deserialize)]
struct ConfigFile {
    #[serde(default)]
    points: PointsSystem,
    #[serde(default)]
    schedule: ScheduleConfig,
    #[serde(default)]
    database: DatabaseSection,
}

#[derive(Debug, Default, Deserialize)]
struct DatabaseSection {
    #[serde(default)]
    path: String,
}

// ---------------------------------------------------------------------------
// Loading logic
// ---------------------------------------------------------------------------

/// Parse and validate configuration text. `path` is only used in errors.
pub fn parse_config(text: &str, path: &Path) -> Result<Config, ConfigError> {
    let file: ConfigFile = toml::from_str(text).map_err(|e| ConfigError::ParseError {
        path: path.to_path_buf(),
        source: e,
    })?;

    let config = Config {
        points: file.points,
        schedule: file.schedule,
        db_path: file.database.path,
    };
    validate(&config)?;
    Ok(config)
}

/// Load and validate `config/matchday.toml` relative to `base_dir`.
///
/// Does not copy defaults; prefer `load_config()`.
pub fn load_config_from(base_dir: &Path) -> Result<Config, ConfigError> {
    let path = base_dir.join("config").join(CONFIG_FILE);
    let text = std::fs::read_to_string(&path)
        .map_err(|_| ConfigError::FileNotFound { path: path.clone() })?;
    parse_config(&text, &path)
}

/// Copy `defaults/matchday.toml` into `config/` if it is not there yet.
/// Returns the copied path, if any.
pub fn ensure_config_file(base_dir: &Path) -> Result<Option<PathBuf>, ConfigError> {
    let source = base_dir.join("defaults").join(CONFIG_FILE);
    let config_dir = base_dir.join("config");
    let target = config_dir.join(CONFIG_FILE);

    if target.exists() {
        return Ok(None);
    }
    if !source.exists() {
        return Err(ConfigError::DefaultsCopyError {
            message: format!(
                "neither defaults/{CONFIG_FILE} nor config/{CONFIG_FILE} found in {}",
                base_dir.display()
            ),
        });
    }

    std::fs::create_dir_all(&config_dir).map_err(|e| ConfigError::DefaultsCopyError {
        message: format!("failed to create config directory: {e}"),
    })?;
    std::fs::copy(&source, &target).map_err(|e| ConfigError::DefaultsCopyError {
        message: format!("failed to copy {}: {e}", source.display()),
    })?;
    Ok(Some(target))
}

/// Loads config relative to the current working directory, copying the
/// default file first when needed.
pub fn load_config() -> Result<Config, ConfigError> {
    let cwd = std::env::current_dir().map_err(|_| ConfigError::FileNotFound {
        path: PathBuf::from("."),
    })?;
    ensure_config_file(&cwd)?;
    load_config_from(&cwd)
}

/// The database path to open: the configured one, or `matchday.db` in the
/// platform data directory.
pub fn resolve_db_path(config: &Config) -> Result<PathBuf, ConfigError> {
    if !config.db_path.is_empty() {
        return Ok(PathBuf::from(&config.db_path));
    }
    let dirs = ProjectDirs::from("org", "matchday", "matchday").ok_or_else(|| {
        ConfigError::ValidationError {
            field: "database.path".into(),
            message: "empty and no home directory to derive a default from".into(),
        }
    })?;
    let data_dir = dirs.data_dir();
    std::fs::create_dir_all(data_dir).map_err(|e| ConfigError::ValidationError {
        field: "database.path".into(),
        message: format!("cannot create {}: {e}", data_dir.display()),
    })?;
    Ok(data_dir.join("matchday.db"))
}

// ---------------------------------------------------------------------------
// Validation
// ---------------------------------------------------------------------------

fn validate(config: &Config) -> Result<(), ConfigError> {
    let points = &config.points;
    if points.win <= points.draw {
        return Err(ConfigError::ValidationError {
            field: "points.win".into(),
            message: format!("must be greater than points.draw ({}), got {}", points.draw, points.win),
        });
    }
    if points.draw < points.loss {
        return Err(ConfigError::ValidationError {
            field: "points.draw".into(),
            message: format!("must be at least points.loss ({}), got {}", points.loss, points.draw),
        });
    }

    let schedule_fields: &[(&str, u32)] = &[
        ("schedule.days_between_rounds", config.schedule.days_between_rounds),
        ("schedule.live_window_minutes", config.schedule.live_window_minutes),
    ];
    for (name, val) in schedule_fields {
        if *val == 0 {
            return Err(ConfigError::ValidationError {
                field: name.to_string(),
                message: "must be > 0".into(),
            });
        }
    }

    Ok(())
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------

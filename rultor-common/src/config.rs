//! Configuration loading and database path resolution
//!
//! Database path priority order:
//! 1. Command-line argument (highest priority)
//! 2. Environment variable (`RULTOR_DATABASE`)
//! 3. TOML config file (`database = "..."`)
//! 4. OS-dependent compiled default (fallback)
//!
//! A missing config file never aborts startup; compiled defaults are used.

use crate::model::is_valid_label;
use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Environment variable overriding the database path
pub const ENV_DATABASE: &str = "RULTOR_DATABASE";

/// Environment variable naming the TOML config file
pub const ENV_CONFIG: &str = "RULTOR_CONFIG";

/// Label pairs merged by default, in application order
pub const DEFAULT_MERGE_PAIRS: [(&str, &str); 2] =
    [("on-pull-request", "merge"), ("ci", "on-commit")];

/// Logging section of the TOML config
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Default tracing filter when RUST_LOG is unset
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

/// One `[[merge_pairs]]` entry: tags labeled `right` fold into a tag labeled `left`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MergePairConfig {
    pub left: String,
    pub right: String,
}

/// Contents of the TOML config file
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TomlConfig {
    /// Path of the SQLite document database
    pub database: Option<PathBuf>,

    #[serde(default)]
    pub logging: LoggingConfig,

    /// Merge pairs; empty means [`DEFAULT_MERGE_PAIRS`]
    #[serde(default)]
    pub merge_pairs: Vec<MergePairConfig>,
}

impl TomlConfig {
    /// Merge pairs to apply, falling back to the defaults
    pub fn effective_merge_pairs(&self) -> Vec<MergePairConfig> {
        if self.merge_pairs.is_empty() {
            DEFAULT_MERGE_PAIRS
                .iter()
                .map(|(left, right)| MergePairConfig {
                    left: left.to_string(),
                    right: right.to_string(),
                })
                .collect()
        } else {
            self.merge_pairs.clone()
        }
    }

    /// Reject merge pairs with malformed or identical labels
    pub fn validate(&self) -> Result<()> {
        for pair in &self.merge_pairs {
            for label in [&pair.left, &pair.right] {
                if !is_valid_label(label) {
                    return Err(Error::Config(format!(
                        "invalid merge pair label '{}'",
                        label
                    )));
                }
            }
            if pair.left == pair.right {
                return Err(Error::Config(format!(
                    "merge pair labels must differ, got '{}' twice",
                    pair.left
                )));
            }
        }
        Ok(())
    }
}

/// OS-dependent fallbacks used when nothing else is configured
#[derive(Debug, Clone)]
pub struct CompiledDefaults {
    pub database: PathBuf,
    pub log_level: String,
}

impl CompiledDefaults {
    pub fn for_current_platform() -> Self {
        // ~/.local/share/rultor (Linux), ~/Library/Application Support/rultor (macOS),
        // %LOCALAPPDATA%\rultor (Windows)
        let data_dir = dirs::data_local_dir()
            .map(|d| d.join("rultor"))
            .unwrap_or_else(|| PathBuf::from("./rultor_data"));

        Self {
            database: data_dir.join("stands.db"),
            log_level: default_log_level(),
        }
    }
}

/// Default config file location (`<config dir>/rultor/migrate.toml`)
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("rultor").join("migrate.toml"))
}

/// Read and parse a TOML config file
pub fn load_toml_config(path: &Path) -> Result<TomlConfig> {
    let content = std::fs::read_to_string(path)?;
    let config: TomlConfig = toml::from_str(&content)
        .map_err(|e| Error::Config(format!("{}: {}", path.display(), e)))?;
    config.validate()?;
    Ok(config)
}

/// Load the config file, degrading to defaults when it is missing
///
/// An explicitly named file that exists but does not parse is still an error.
pub fn load_config_or_default(explicit: Option<&Path>) -> Result<TomlConfig> {
    let named = explicit
        .map(Path::to_path_buf)
        .or_else(|| std::env::var(ENV_CONFIG).ok().map(PathBuf::from));

    let path = match named.clone().or_else(default_config_path) {
        Some(path) => path,
        None => return Ok(TomlConfig::default()),
    };

    if !path.exists() {
        if named.is_some() {
            warn!("Config file {} not found - using defaults", path.display());
        } else {
            debug!("No config file at {} - using defaults", path.display());
        }
        return Ok(TomlConfig::default());
    }

    load_toml_config(&path)
}

/// Resolve the database path following the priority order above
pub fn resolve_database_path(cli_arg: Option<&Path>, config: &TomlConfig) -> PathBuf {
    // Priority 1: Command-line argument
    if let Some(path) = cli_arg {
        return path.to_path_buf();
    }

    // Priority 2: Environment variable
    if let Ok(path) = std::env::var(ENV_DATABASE) {
        if !path.is_empty() {
            return PathBuf::from(path);
        }
    }

    // Priority 3: TOML config file
    if let Some(path) = &config.database {
        return path.clone();
    }

    // Priority 4: OS-dependent compiled default
    CompiledDefaults::for_current_platform().database
}

//! Application configuration for insertster.
//!
//! User config lives at `~/.insertster/insertster.toml`.
//! CLI flags override config file values, which override defaults.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{InsertsterError, Result};

/// Default configuration file name.
const CONFIG_FILE_NAME: &str = "insertster.toml";

/// Default config directory name under the user's home.
const CONFIG_DIR_NAME: &str = ".insertster";

// ---------------------------------------------------------------------------
// Config structs (matching insertster.toml schema)
// ---------------------------------------------------------------------------

/// Top-level application config, deserialized from TOML.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Global defaults.
    #[serde(default)]
    pub defaults: DefaultsConfig,
}

/// `[defaults]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DefaultsConfig {
    /// Default output directory for placement runs.
    #[serde(default = "default_output_dir")]
    pub output_dir: String,

    /// Minimum raw hit score accepted by decoration.
    #[serde(default)]
    pub query_threshold: f64,

    /// Minimum final score a candidate needs to be inserted.
    #[serde(default)]
    pub insert_threshold: f64,

    /// Query-result parser name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub query_parser: Option<String>,

    /// Score function name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub score_function: Option<String>,

    /// Selection policy name (unset means global maximum).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub best_function: Option<String>,

    /// Branch length function name (unset means zero length).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub length_function: Option<String>,

    /// Propagation combination rule.
    #[serde(default = "default_combine")]
    pub combine: String,
}

impl Default for DefaultsConfig {
    fn default() -> Self {
        Self {
            output_dir: default_output_dir(),
            query_threshold: 0.0,
            insert_threshold: 0.0,
            query_parser: None,
            score_function: None,
            best_function: None,
            length_function: None,
            combine: default_combine(),
        }
    }
}

fn default_output_dir() -> String {
    "insertster-out".into()
}
fn default_combine() -> String {
    "max".into()
}

// ---------------------------------------------------------------------------
// Placement config (runtime, merged from config + CLI flags)
// ---------------------------------------------------------------------------

/// Runtime placement configuration, merged from config file and CLI flags.
///
/// Strategy names are checked against the registries by the pipeline;
/// [`PlacementConfig::validate`] only checks the numeric parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlacementConfig {
    /// Hits scoring below this are discarded during decoration.
    pub query_threshold: f64,
    /// Candidates scoring below this are not inserted.
    pub insert_threshold: f64,
    /// Query-result parser name.
    pub query_parser: String,
    /// Score function name.
    pub score_function: String,
    /// Selection policy name; `None` selects the global maximum.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub best_function: Option<String>,
    /// Branch length function name; `None` attaches at zero length.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub length_function: Option<String>,
    /// Propagation combination rule.
    pub combine: String,
}

impl PlacementConfig {
    /// Start from the config file defaults. Parser and score function have
    /// no built-in default and must come from the file or the caller.
    pub fn from_defaults(config: &AppConfig) -> Self {
        let d = &config.defaults;
        Self {
            query_threshold: d.query_threshold,
            insert_threshold: d.insert_threshold,
            query_parser: d.query_parser.clone().unwrap_or_default(),
            score_function: d.score_function.clone().unwrap_or_default(),
            best_function: d.best_function.clone(),
            length_function: d.length_function.clone(),
            combine: d.combine.clone(),
        }
    }

    /// Check thresholds and required names.
    pub fn validate(&self) -> Result<()> {
        validate_query_threshold(self.query_threshold)?;

        if !self.insert_threshold.is_finite() {
            return Err(InsertsterError::config(format!(
                "insert_threshold must be finite, got {}",
                self.insert_threshold
            )));
        }
        if self.query_parser.trim().is_empty() {
            return Err(InsertsterError::config("query_parser is required"));
        }
        if self.score_function.trim().is_empty() {
            return Err(InsertsterError::config("score_function is required"));
        }
        Ok(())
    }
}

/// Reject negative or non-finite acceptance thresholds.
pub fn validate_query_threshold(threshold: f64) -> Result<()> {
    if !threshold.is_finite() || threshold < 0.0 {
        return Err(InsertsterError::config(format!(
            "query_threshold must be a finite value >= 0, got {threshold}"
        )));
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Config loading
// ---------------------------------------------------------------------------

/// Get the path to the config directory (`~/.insertster/`).
pub fn config_dir() -> Result<PathBuf> {
    let home = dirs::home_dir()
        .ok_or_else(|| InsertsterError::config("could not determine home directory"))?;
    Ok(home.join(CONFIG_DIR_NAME))
}

/// Get the path to the config file (`~/.insertster/insertster.toml`).
pub fn config_file_path() -> Result<PathBuf> {
    Ok(config_dir()?.join(CONFIG_FILE_NAME))
}

/// Load the application config from disk. Returns defaults if the file does not exist.
pub fn load_config() -> Result<AppConfig> {
    let path = config_file_path()?;

    if !path.exists() {
        tracing::debug!(?path, "config file not found, using defaults");
        return Ok(AppConfig::default());
    }

    load_config_from(&path)
}

/// Load the application config from a specific file path.
pub fn load_config_from(path: &Path) -> Result<AppConfig> {
    let content = std::fs::read_to_string(path).map_err(|e| InsertsterError::io(path, e))?;

    toml::from_str(&content).map_err(|e| {
        InsertsterError::config(format!("failed to parse {}: {e}", path.display()))
    })
}

/// Create the config directory and write a default config file.
/// Returns the path to the created file.
pub fn init_config() -> Result<PathBuf> {
    let dir = config_dir()?;
    std::fs::create_dir_all(&dir).map_err(|e| InsertsterError::io(&dir, e))?;

    let path = dir.join(CONFIG_FILE_NAME);
    let config = AppConfig::default();
    let content =
        toml::to_string_pretty(&config).map_err(|e| InsertsterError::config(e.to_string()))?;

    std::fs::write(&path, content).map_err(|e| InsertsterError::io(&path, e))?;
    tracing::info!(?path, "created default config file");

    Ok(path)
}

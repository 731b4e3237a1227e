//! Engine configuration: TOML file, environment overrides, defaults.

use crate::grade::Grade;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::time::Duration;

pub const DEFAULT_CONFIG_FILE: &str = "gradesync.toml";
pub const DEFAULT_PROMPT_MAX_ATTEMPTS: u32 = 3;

pub const ENV_TOTAL_MARKS: &str = "GRADESYNC_TOTAL_MARKS";
pub const ENV_STATUS_COLUMN: &str = "GRADESYNC_STATUS_COLUMN";
pub const ENV_SETTLE_MS: &str = "GRADESYNC_SETTLE_MS";
pub const ENV_ROSTER_ID: &str = "GRADESYNC_ROSTER_ID";

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read {path}: {message}")]
    Read { path: String, message: String },

    #[error("failed to parse {path}: {message}")]
    Parse { path: String, message: String },

    #[error("failed to write {path}: {message}")]
    Write { path: String, message: String },

    #[error("failed to render config: {0}")]
    Render(String),

    #[error("invalid {field}: {message}")]
    Invalid { field: &'static str, message: String },
}

/// Whether status is written alongside grades.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StatusColumnMode {
    /// Follow the roster: write status only if it carries a status column.
    #[default]
    Auto,
    /// Always write status (rows without a value default to Present).
    On,
    /// Never write status.
    Off,
}

impl StatusColumnMode {
    pub fn resolve(&self, roster_has_status: bool) -> bool {
        match self {
            Self::Auto => roster_has_status,
            Self::On => true,
            Self::Off => false,
        }
    }
}

impl std::str::FromStr for StatusColumnMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "auto" => Ok(Self::Auto),
            "on" | "true" | "yes" => Ok(Self::On),
            "off" | "false" | "no" => Ok(Self::Off),
            other => Err(format!("expected auto, on or off (got {other:?})")),
        }
    }
}

/// Fixed waits that absorb the target's rendering latency.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SettleConfig {
    pub after_write_ms: u64,
    pub after_dropdown_ms: u64,
    pub between_records_ms: u64,
}

impl Default for SettleConfig {
    fn default() -> Self {
        Self {
            after_write_ms: 300,
            after_dropdown_ms: 1000,
            between_records_ms: 500,
        }
    }
}

impl SettleConfig {
    /// No waiting at all, for surfaces that apply writes synchronously.
    pub fn none() -> Self {
        Self::uniform(0)
    }

    pub fn uniform(ms: u64) -> Self {
        Self {
            after_write_ms: ms,
            after_dropdown_ms: ms,
            between_records_ms: ms,
        }
    }

    pub fn after_write(&self) -> Duration {
        Duration::from_millis(self.after_write_ms)
    }

    pub fn after_dropdown(&self) -> Duration {
        Duration::from_millis(self.after_dropdown_ms)
    }

    pub fn between_records(&self) -> Duration {
        Duration::from_millis(self.between_records_ms)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Roster identifier; keys the mismatch report.
    pub roster_id: Option<String>,
    /// Total-marks normalization value written before the batch.
    pub total_marks: Option<String>,
    pub status_column: StatusColumnMode,
    /// Bound on re-asking a prompt after an invalid answer.
    pub prompt_max_attempts: u32,
    pub settle: SettleConfig,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            roster_id: None,
            total_marks: None,
            status_column: StatusColumnMode::Auto,
            prompt_max_attempts: DEFAULT_PROMPT_MAX_ATTEMPTS,
            settle: SettleConfig::default(),
        }
    }
}

impl EngineConfig {
    pub fn from_toml_str(contents: &str, origin: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(contents).map_err(|e| ConfigError::Parse {
            path: origin.to_string(),
            message: e.to_string(),
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Load from `path`; a missing file yields defaults.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        if !path.exists() {
            return Ok(Self::default());
        }
        let contents = fs::read_to_string(path).map_err(|e| ConfigError::Read {
            path: path.display().to_string(),
            message: e.to_string(),
        })?;
        Self::from_toml_str(&contents, &path.display().to_string())
    }

    pub fn to_toml_string(&self) -> Result<String, ConfigError> {
        toml::to_string_pretty(self).map_err(|e| ConfigError::Render(e.to_string()))
    }

    pub fn write(&self, path: impl AsRef<Path>) -> Result<(), ConfigError> {
        let path = path.as_ref();
        let write_err = |e: std::io::Error| ConfigError::Write {
            path: path.display().to_string(),
            message: e.to_string(),
        };
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            fs::create_dir_all(parent).map_err(write_err)?;
        }
        fs::write(path, self.to_toml_string()?).map_err(write_err)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if let Some(total) = &self.total_marks {
            validate_total_marks(total).map_err(|message| ConfigError::Invalid {
                field: "total_marks",
                message,
            })?;
        }
        if self.prompt_max_attempts == 0 {
            return Err(ConfigError::Invalid {
                field: "prompt_max_attempts",
                message: "must be at least 1".to_string(),
            });
        }
        Ok(())
    }

    pub fn apply_env_overrides(&mut self) {
        self.apply_overrides_from(|key| std::env::var(key).ok());
    }

    /// Apply overrides from a key lookup. Invalid values are logged and ignored.
    pub fn apply_overrides_from(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(raw) = lookup(ENV_TOTAL_MARKS) {
            let trimmed = raw.trim();
            if !trimmed.is_empty() {
                match validate_total_marks(trimmed) {
                    Ok(value) => self.total_marks = Some(value),
                    Err(err) => tracing::warn!("invalid {ENV_TOTAL_MARKS}, ignoring: {err}"),
                }
            }
        }

        if let Some(raw) = lookup(ENV_STATUS_COLUMN) {
            let trimmed = raw.trim();
            if !trimmed.is_empty() {
                match trimmed.parse::<StatusColumnMode>() {
                    Ok(mode) => self.status_column = mode,
                    Err(err) => tracing::warn!("invalid {ENV_STATUS_COLUMN}, ignoring: {err}"),
                }
            }
        }

        if let Some(raw) = lookup(ENV_SETTLE_MS) {
            let trimmed = raw.trim();
            if !trimmed.is_empty() {
                match trimmed.parse::<u64>() {
                    Ok(ms) => self.settle = SettleConfig::uniform(ms),
                    Err(err) => tracing::warn!("invalid {ENV_SETTLE_MS}, ignoring: {err}"),
                }
            }
        }

        if let Some(raw) = lookup(ENV_ROSTER_ID) {
            let trimmed = raw.trim();
            if !trimmed.is_empty() {
                self.roster_id = Some(trimmed.to_string());
            }
        }
    }
}

/// Accept a positive decimal total-marks value; returns it trimmed.
pub fn validate_total_marks(raw: &str) -> Result<String, String> {
    let trimmed = raw.trim();
    let grade = Grade::from_decimal_str(trimmed).map_err(|e| e.to_string())?;
    if grade.hundredths() <= 0 {
        return Err(format!("total marks must be positive (got {trimmed})"));
    }
    Ok(trimmed.to_string())
}

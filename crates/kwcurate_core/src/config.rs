//! Curator configuration.
//!
//! Loaded from a TOML file; every key is optional.
//!
//! ```toml
//! [logging]
//! level = "info"
//! dir = "/var/log/kwcurate"
//!
//! [logging.modules]
//! dispatch = "debug"
//!
//! [storage]
//! db_path = "kwcurate.db"
//!
//! [trash]
//! retention_days = 30
//!
//! [enrichment]
//! price_per_page_micros = 600
//! max_attempts = 3
//! backoff_base_ms = 500
//! our_domains = ["example.com"]
//! ```

use crate::dispatch::{CostModel, DispatchSettings, EnrichParams};
use crate::logging::log_spec;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const DEFAULT_DB_FILE: &str = "kwcurate.db";
pub const DEFAULT_RETENTION_DAYS: u32 = 30;

#[derive(Debug)]
pub enum ConfigError {
    Read { path: PathBuf, source: std::io::Error },
    Parse(toml::de::Error),
    Invalid(String),
}

impl Display for ConfigError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Read { path, source } => {
                write!(f, "failed to read config `{}`: {source}", path.display())
            }
            Self::Parse(err) => write!(f, "failed to parse config: {err}"),
            Self::Invalid(message) => write!(f, "invalid config: {message}"),
        }
    }
}

impl Error for ConfigError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Read { source, .. } => Some(source),
            Self::Parse(err) => Some(err),
            Self::Invalid(_) => None,
        }
    }
}

impl From<toml::de::Error> for ConfigError {
    fn from(value: toml::de::Error) -> Self {
        Self::Parse(value)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Falls back to the build-mode default when unset.
    pub level: Option<String>,
    /// Absolute directory for rolling log files; logging stays off when unset.
    pub dir: Option<PathBuf>,
    /// Per-module level overrides, keyed by top-level module (`dispatch`).
    pub modules: BTreeMap<String, String>,
    /// Mirror warnings and errors to stderr.
    pub stderr: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    pub db_path: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            db_path: PathBuf::from(DEFAULT_DB_FILE),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrashConfig {
    /// Used until a retention value is persisted in the settings table.
    pub retention_days: u32,
}

impl Default for TrashConfig {
    fn default() -> Self {
        Self {
            retention_days: DEFAULT_RETENTION_DAYS,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EnrichmentConfig {
    pub price_per_page_micros: u64,
    pub max_attempts: u32,
    pub backoff_base_ms: u64,
    pub depth: u32,
    pub location_code: u32,
    pub language_code: String,
    pub our_domains: Vec<String>,
    pub competitor_domains: Vec<String>,
}

impl Default for EnrichmentConfig {
    fn default() -> Self {
        let params = EnrichParams::default();
        let settings = DispatchSettings::default();
        Self {
            price_per_page_micros: settings.cost_model.price_per_page_micros,
            max_attempts: settings.max_attempts,
            backoff_base_ms: 500,
            depth: params.depth,
            location_code: params.location_code,
            language_code: params.language_code,
            our_domains: Vec::new(),
            competitor_domains: Vec::new(),
        }
    }
}

impl EnrichmentConfig {
    pub fn dispatch_settings(&self) -> DispatchSettings {
        DispatchSettings {
            cost_model: CostModel::new(self.price_per_page_micros),
            max_attempts: self.max_attempts,
            backoff_base: Duration::from_millis(self.backoff_base_ms),
        }
    }

    pub fn params(&self, skip_enriched: bool) -> EnrichParams {
        EnrichParams {
            depth: self.depth,
            location_code: self.location_code,
            language_code: self.language_code.clone(),
            skip_enriched,
            ..EnrichParams::default()
        }
    }
}

/// Root configuration.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct CuratorConfig {
    pub logging: LoggingConfig,
    pub storage: StorageConfig,
    pub trash: TrashConfig,
    pub enrichment: EnrichmentConfig,
}

impl CuratorConfig {
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&content)
    }

    /// Loads `path` when it exists, defaults otherwise.
    pub fn load_or_default(path: &Path) -> Result<Self, ConfigError> {
        if path.exists() {
            Self::load_from(path)
        } else {
            Ok(Self::default())
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.enrichment.max_attempts == 0 {
            return Err(ConfigError::Invalid(
                "enrichment.max_attempts must be at least 1".to_string(),
            ));
        }
        if self.storage.db_path.as_os_str().is_empty() {
            return Err(ConfigError::Invalid(
                "storage.db_path cannot be empty".to_string(),
            ));
        }
        log_spec(&self.logging).map_err(|err| ConfigError::Invalid(err.to_string()))?;
        if let Some(dir) = &self.logging.dir {
            if !dir.is_absolute() {
                return Err(ConfigError::Invalid(format!(
                    "logging.dir must be absolute, got `{}`",
                    dir.display()
                )));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::{ConfigError, CuratorConfig, DEFAULT_RETENTION_DAYS};

    #[test]
    fn empty_file_yields_defaults() {
        let config = CuratorConfig::from_toml_str("").unwrap();
        assert_eq!(config, CuratorConfig::default());
        assert_eq!(config.trash.retention_days, DEFAULT_RETENTION_DAYS);
        assert_eq!(config.enrichment.max_attempts, 3);
    }

    #[test]
    fn partial_sections_keep_other_defaults() {
        let config = CuratorConfig::from_toml_str(
            "[trash]\nretention_days = 7\n\n[enrichment]\nprice_per_page_micros = 1000\n",
        )
        .unwrap();
        assert_eq!(config.trash.retention_days, 7);
        assert_eq!(config.enrichment.price_per_page_micros, 1000);
        assert_eq!(config.enrichment.depth, 10);
    }

    #[test]
    fn zero_attempts_is_rejected() {
        let err = CuratorConfig::from_toml_str("[enrichment]\nmax_attempts = 0\n").unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));
    }

    #[test]
    fn module_levels_are_checked_on_load() {
        let config = CuratorConfig::from_toml_str(
            "[logging]\nstderr = true\n\n[logging.modules]\ndispatch = \"debug\"\n",
        )
        .unwrap();
        assert!(config.logging.stderr);
        assert_eq!(config.logging.modules["dispatch"], "debug");

        let err = CuratorConfig::from_toml_str("[logging.modules]\nui = \"debug\"\n").unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));
    }

    #[test]
    fn relative_log_dir_is_rejected() {
        let err = CuratorConfig::from_toml_str("[logging]\ndir = \"logs\"\n").unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));
    }
}

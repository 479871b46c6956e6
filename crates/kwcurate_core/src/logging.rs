//! Logging bootstrap for the curator.
//!
//! Lines are `event=... module=... status=...` pairs carrying ids and
//! counts, never keyword text or clipboard payloads.
//!
//! ```toml
//! [logging]
//! level = "info"
//! dir = "/var/log/kwcurate"
//! stderr = true
//!
//! [logging.modules]
//! dispatch = "debug"
//! ```
//!
//! # Invariants
//! - Files roll by size under `dir`; no `dir` means no logger.
//! - The first successful init wins; a later init with another level spec,
//!   directory or stderr mirror is rejected.
//! - Initialization never panics.

use crate::config::LoggingConfig;
use flexi_logger::{
    Cleanup, Criterion, Duplicate, FileSpec, FlexiLoggerError, Logger, LoggerHandle, Naming,
    WriteMode,
};
use log::{error, info, LevelFilter};
use once_cell::sync::OnceCell;
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::path::{Path, PathBuf};
use std::str::FromStr;

/// Modules of this crate that accept a level override.
pub const LOGGED_MODULES: &[&str] = &[
    "codec", "config", "db", "dispatch", "engine", "repo", "service",
];

const LOG_FILE_BASENAME: &str = "kwcurate";
const MAX_LOG_FILE_SIZE_BYTES: u64 = 10 * 1024 * 1024;
const MAX_LOG_FILES: usize = 5;
const MAX_PANIC_PAYLOAD_CHARS: usize = 160;

static ACTIVE: OnceCell<ActiveLogger> = OnceCell::new();
static PANIC_HOOK: OnceCell<()> = OnceCell::new();

struct ActiveLogger {
    spec: String,
    dir: PathBuf,
    stderr: bool,
    _handle: LoggerHandle,
}

#[derive(Debug)]
pub enum LoggingError {
    InvalidLevel { key: String, value: String },
    UnknownModule(String),
    RelativeDir(PathBuf),
    CreateDir {
        path: PathBuf,
        source: std::io::Error,
    },
    Backend(FlexiLoggerError),
    /// A logger with a different setup is already running.
    AlreadyActive { spec: String, dir: PathBuf },
}

impl Display for LoggingError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InvalidLevel { key, value } => write!(
                f,
                "invalid log level `{value}` for `{key}`; expected off|error|warn|info|debug|trace"
            ),
            Self::UnknownModule(module) => write!(
                f,
                "unknown log module `{module}`; expected one of {}",
                LOGGED_MODULES.join("|")
            ),
            Self::RelativeDir(dir) => {
                write!(f, "log dir must be an absolute path, got `{}`", dir.display())
            }
            Self::CreateDir { path, source } => {
                write!(f, "failed to create log dir `{}`: {source}", path.display())
            }
            Self::Backend(err) => write!(f, "failed to start logger: {err}"),
            Self::AlreadyActive { spec, dir } => write!(
                f,
                "logging already active with `{spec}` at `{}`",
                dir.display()
            ),
        }
    }
}

impl Error for LoggingError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::CreateDir { source, .. } => Some(source),
            Self::Backend(err) => Some(err),
            _ => None,
        }
    }
}

impl From<FlexiLoggerError> for LoggingError {
    fn from(value: FlexiLoggerError) -> Self {
        Self::Backend(value)
    }
}

/// Level for builds without a configured one: `debug` in debug builds,
/// `info` otherwise.
pub fn default_log_level() -> LevelFilter {
    if cfg!(debug_assertions) {
        LevelFilter::Debug
    } else {
        LevelFilter::Info
    }
}

/// Builds the logger spec, e.g. `info, kwcurate_core::dispatch=debug`.
pub fn log_spec(config: &LoggingConfig) -> Result<String, LoggingError> {
    let base = match &config.level {
        Some(level) => parse_level("level", level)?,
        None => default_log_level(),
    };
    let mut spec = level_name(base);
    for (module, level) in &config.modules {
        if !LOGGED_MODULES.contains(&module.as_str()) {
            return Err(LoggingError::UnknownModule(module.clone()));
        }
        let level = parse_level(module, level)?;
        spec.push_str(&format!(
            ", {}::{module}={}",
            env!("CARGO_PKG_NAME"),
            level_name(level)
        ));
    }
    Ok(spec)
}

/// Starts rolling file logs from `[logging]`.
///
/// Returns `Ok(false)` when no directory is configured, `Ok(true)` once the
/// logger runs with exactly this setup.
///
/// # Errors
/// - `RelativeDir` when `dir` is not absolute.
/// - `InvalidLevel` and `UnknownModule` for a bad level spec.
/// - `AlreadyActive` when an earlier init used another setup.
pub fn init_logging(config: &LoggingConfig) -> Result<bool, LoggingError> {
    let Some(dir) = &config.dir else {
        return Ok(false);
    };
    if !dir.is_absolute() {
        return Err(LoggingError::RelativeDir(dir.clone()));
    }
    let spec = log_spec(config)?;

    let active = ACTIVE.get_or_try_init(|| start(&spec, dir, config.stderr))?;
    if active.spec != spec || active.dir != *dir || active.stderr != config.stderr {
        return Err(LoggingError::AlreadyActive {
            spec: active.spec.clone(),
            dir: active.dir.clone(),
        });
    }
    Ok(true)
}

/// `(spec, dir)` of the running logger.
pub fn logging_status() -> Option<(String, PathBuf)> {
    ACTIVE
        .get()
        .map(|active| (active.spec.clone(), active.dir.clone()))
}

/// Collapses `value` to one line of at most `max_chars` characters.
pub(crate) fn one_line(value: &str, max_chars: usize) -> String {
    let normalized = value.replace(['\n', '\r'], " ");
    let mut truncated: String = normalized.chars().take(max_chars).collect();
    if normalized.chars().count() > max_chars {
        truncated.push_str("...");
    }
    truncated
}

fn start(spec: &str, dir: &Path, stderr: bool) -> Result<ActiveLogger, LoggingError> {
    std::fs::create_dir_all(dir).map_err(|source| LoggingError::CreateDir {
        path: dir.to_path_buf(),
        source,
    })?;

    let duplicate = if stderr {
        Duplicate::Warn
    } else {
        Duplicate::None
    };
    let handle = Logger::try_with_str(spec)?
        .log_to_file(
            FileSpec::default()
                .directory(dir)
                .basename(LOG_FILE_BASENAME),
        )
        .rotate(
            Criterion::Size(MAX_LOG_FILE_SIZE_BYTES),
            Naming::Numbers,
            Cleanup::KeepLogFiles(MAX_LOG_FILES),
        )
        .duplicate_to_stderr(duplicate)
        .write_mode(WriteMode::BufferAndFlush)
        .append()
        .format_for_files(flexi_logger::detailed_format)
        .start()?;

    PANIC_HOOK.get_or_init(install_panic_hook);
    info!(
        "event=logging_start module=logging status=ok spec={} dir={} version={}",
        spec,
        dir.display(),
        env!("CARGO_PKG_VERSION")
    );

    Ok(ActiveLogger {
        spec: spec.to_string(),
        dir: dir.to_path_buf(),
        stderr,
        _handle: handle,
    })
}

fn parse_level(key: &str, value: &str) -> Result<LevelFilter, LoggingError> {
    let trimmed = value.trim();
    let name = if trimmed.eq_ignore_ascii_case("warning") {
        "warn"
    } else {
        trimmed
    };
    LevelFilter::from_str(name).map_err(|_| LoggingError::InvalidLevel {
        key: key.to_string(),
        value: value.to_string(),
    })
}

fn level_name(level: LevelFilter) -> String {
    level.as_str().to_ascii_lowercase()
}

fn install_panic_hook() {
    let previous_hook = std::panic::take_hook();
    std::panic::set_hook(Box::new(move |panic_info| {
        // Payload may carry keyword text.
        let location = panic_info
            .location()
            .map(|loc| format!("{}:{}", loc.file(), loc.line()))
            .unwrap_or_else(|| "unknown".to_string());
        let payload = panic_info
            .payload()
            .downcast_ref::<&str>()
            .map(|text| (*text).to_string())
            .or_else(|| panic_info.payload().downcast_ref::<String>().cloned())
            .unwrap_or_else(|| "non-string panic payload".to_string());
        error!(
            "event=panic_captured module=logging status=error location={} payload={}",
            location,
            one_line(&payload, MAX_PANIC_PAYLOAD_CHARS)
        );
        previous_hook(panic_info);
    }));
}

#[cfg(test)]
mod tests {
    use super::{
        default_log_level, init_logging, log_spec, logging_status, one_line, LoggingError,
    };
    use crate::config::LoggingConfig;
    use std::collections::BTreeMap;
    use std::path::PathBuf;

    fn modules(entries: &[(&str, &str)]) -> BTreeMap<String, String> {
        entries
            .iter()
            .map(|(module, level)| (module.to_string(), level.to_string()))
            .collect()
    }

    #[test]
    fn spec_lists_module_overrides_after_the_base_level() {
        let config = LoggingConfig {
            level: Some("Warning".to_string()),
            modules: modules(&[("dispatch", "DEBUG"), ("db", "trace")]),
            ..LoggingConfig::default()
        };
        assert_eq!(
            log_spec(&config).unwrap(),
            "warn, kwcurate_core::db=trace, kwcurate_core::dispatch=debug"
        );
    }

    #[test]
    fn spec_falls_back_to_build_level() {
        let spec = log_spec(&LoggingConfig::default()).unwrap();
        assert_eq!(spec, default_log_level().as_str().to_ascii_lowercase());
    }

    #[test]
    fn spec_rejects_unknown_modules_and_levels() {
        let unknown = LoggingConfig {
            modules: modules(&[("network", "debug")]),
            ..LoggingConfig::default()
        };
        assert!(matches!(
            log_spec(&unknown),
            Err(LoggingError::UnknownModule(module)) if module == "network"
        ));

        let loud = LoggingConfig {
            level: Some("loud".to_string()),
            ..LoggingConfig::default()
        };
        assert!(matches!(
            log_spec(&loud),
            Err(LoggingError::InvalidLevel { key, .. }) if key == "level"
        ));
    }

    #[test]
    fn init_without_dir_is_a_noop() {
        let config = LoggingConfig {
            level: Some("debug".to_string()),
            ..LoggingConfig::default()
        };
        assert!(matches!(init_logging(&config), Ok(false)));
    }

    #[test]
    fn init_rejects_relative_dir() {
        let config = LoggingConfig {
            dir: Some(PathBuf::from("logs/dev")),
            ..LoggingConfig::default()
        };
        assert!(matches!(
            init_logging(&config),
            Err(LoggingError::RelativeDir(_))
        ));
    }

    #[test]
    fn one_line_flattens_and_truncates() {
        let flattened = one_line("line1\nline2\rline3", 8);
        assert_eq!(flattened, "line1 li...");
        assert_eq!(one_line("short", 8), "short");
    }

    #[test]
    fn first_init_wins_and_conflicting_setups_are_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let config = LoggingConfig {
            level: Some("info".to_string()),
            dir: Some(dir.path().to_path_buf()),
            ..LoggingConfig::default()
        };

        assert!(matches!(init_logging(&config), Ok(true)));
        assert!(matches!(init_logging(&config), Ok(true)));

        let louder = LoggingConfig {
            level: Some("debug".to_string()),
            ..config.clone()
        };
        assert!(matches!(
            init_logging(&louder),
            Err(LoggingError::AlreadyActive { .. })
        ));

        let elsewhere = tempfile::tempdir().unwrap();
        let moved = LoggingConfig {
            dir: Some(elsewhere.path().to_path_buf()),
            ..config.clone()
        };
        assert!(matches!(
            init_logging(&moved),
            Err(LoggingError::AlreadyActive { .. })
        ));

        let (spec, active_dir) = logging_status().unwrap();
        assert_eq!(spec, "info");
        assert_eq!(active_dir, dir.path());
    }
}

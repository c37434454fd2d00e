// FlashBatch - platform/config.rs
//
// Platform-specific data directory resolution and config.toml loading with
// startup validation.
//
// Uses the `directories` crate for XDG (Linux), AppData (Windows),
// Library (macOS) compliance.

use crate::util::constants;
use directories::ProjectDirs;
use std::path::{Path, PathBuf};

/// Resolved platform paths for FlashBatch data and configuration.
#[derive(Debug, Clone)]
pub struct PlatformPaths {
    /// Configuration directory (e.g. ~/.config/flashbatch/ or %APPDATA%\FlashBatch\config\)
    pub config_dir: PathBuf,

    /// Data directory holding the settings and session log documents.
    pub data_dir: PathBuf,

    /// Runtime log directory inside `data_dir`.
    pub log_dir: PathBuf,
}

impl PlatformPaths {
    /// Resolve platform-appropriate paths.
    ///
    /// Falls back to current directory if platform dirs cannot be determined.
    pub fn resolve() -> Self {
        if let Some(proj_dirs) = ProjectDirs::from("", "", constants::APP_ID) {
            let config_dir = proj_dirs.config_dir().to_path_buf();
            let data_dir = proj_dirs.data_dir().to_path_buf();
            let log_dir = data_dir.join(constants::RUNTIME_LOG_DIR_NAME);

            tracing::debug!(
                config = %config_dir.display(),
                data = %data_dir.display(),
                "Platform paths resolved"
            );

            Self {
                config_dir,
                data_dir,
                log_dir,
            }
        } else {
            tracing::warn!("Could not determine platform directories, using current directory");
            let fallback = PathBuf::from(".");
            Self {
                config_dir: fallback.clone(),
                log_dir: fallback.join(constants::RUNTIME_LOG_DIR_NAME),
                data_dir: fallback,
            }
        }
    }

    /// Override the data directory (and the log directory under it).
    pub fn with_data_dir(mut self, data_dir: PathBuf) -> Self {
        self.log_dir = data_dir.join(constants::RUNTIME_LOG_DIR_NAME);
        self.data_dir = data_dir;
        self
    }

    /// Path of the settings document.
    pub fn settings_path(&self) -> PathBuf {
        self.data_dir.join(constants::SETTINGS_STORE_FILE)
    }

    /// Path of the session log document.
    pub fn session_log_path(&self) -> PathBuf {
        self.data_dir.join(constants::LOG_STORE_FILE)
    }

    /// Path of the runtime log file written by `util::logging`.
    pub fn runtime_log_path(&self) -> PathBuf {
        self.log_dir.join(constants::RUNTIME_LOG_FILE_NAME)
    }

    pub fn config_path(&self) -> PathBuf {
        self.config_dir.join(constants::CONFIG_FILE_NAME)
    }
}

// =============================================================================
// config.toml loading and validation
// =============================================================================

/// Raw deserialisable shape of config.toml.
///
/// Unknown keys are silently ignored for forward compatibility -- a newer
/// config file can be used with an older binary without crashing.
#[derive(Debug, Default, serde::Deserialize)]
#[serde(default)]
pub struct RawConfig {
    /// `[sessions]` section.
    pub sessions: SessionsSection,
    /// `[log]` section.
    pub log: LogSection,
    /// `[logging]` section.
    pub logging: LoggingSection,
}

/// `[sessions]` config section.
#[derive(Debug, Default, serde::Deserialize)]
#[serde(default)]
pub struct SessionsSection {
    /// Days a finalized session is kept.
    pub retention_days: Option<i64>,
}

/// `[log]` config section.
#[derive(Debug, Default, serde::Deserialize)]
#[serde(default)]
pub struct LogSection {
    /// Rolling cap on log buffer lines.
    pub max_messages: Option<i64>,
}

/// `[logging]` config section.
#[derive(Debug, Default, serde::Deserialize)]
#[serde(default)]
pub struct LoggingSection {
    /// Log level: "error", "warn", "info", "debug", "trace".
    pub level: Option<String>,
    /// Log file path (empty = stderr only).
    pub file: Option<String>,
}

/// Validated application configuration derived from `config.toml`.
///
/// Invalid values produce actionable warnings and fall back to defaults.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppConfig {
    /// Session log retention in days.
    pub retention_days: u32,
    /// Rolling cap on log buffer lines.
    pub max_log_messages: usize,
    /// Logging level string (for init before tracing is available).
    pub log_level: Option<String>,
    /// Log file path.
    pub log_file: Option<String>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            retention_days: constants::DEFAULT_LOG_RETENTION_DAYS,
            max_log_messages: constants::DEFAULT_MAX_LOG_MESSAGES,
            log_level: None,
            log_file: None,
        }
    }
}

/// Load and validate `config.toml` from the given config directory.
///
/// Returns `AppConfig` with validated values and a list of non-fatal warnings.
/// If the file does not exist, returns defaults with no warnings (first-run).
/// If the file is unparseable, returns defaults with an error warning; the
/// application still starts but the user is informed.
pub fn load_config(config_dir: &Path) -> (AppConfig, Vec<String>) {
    let config_path = config_dir.join(constants::CONFIG_FILE_NAME);

    let mut warnings: Vec<String> = Vec::new();

    if !config_path.exists() {
        tracing::debug!(path = %config_path.display(), "No config.toml found; using defaults");
        return (AppConfig::default(), warnings);
    }

    let content = match std::fs::read_to_string(&config_path) {
        Ok(c) => c,
        Err(e) => {
            let msg = format!(
                "Could not read config file '{}': {e}. Using defaults.",
                config_path.display()
            );
            tracing::warn!("{}", msg);
            warnings.push(msg);
            return (AppConfig::default(), warnings);
        }
    };

    let raw: RawConfig = match toml::from_str(&content) {
        Ok(r) => r,
        Err(e) => {
            let msg = format!(
                "Failed to parse config file '{}': {e}. Using defaults.",
                config_path.display()
            );
            tracing::warn!("{}", msg);
            warnings.push(msg);
            return (AppConfig::default(), warnings);
        }
    };

    tracing::info!(path = %config_path.display(), "Loaded config.toml");

    // Validate each field against named constants, accumulating all errors.
    let mut config = AppConfig::default();

    // -- Sessions: retention_days --
    if let Some(days) = raw.sessions.retention_days {
        let range = i64::from(constants::MIN_LOG_RETENTION_DAYS)
            ..=i64::from(constants::MAX_LOG_RETENTION_DAYS);
        match u32::try_from(days) {
            Ok(d) if range.contains(&days) => config.retention_days = d,
            _ => warnings.push(format!(
                "[sessions] retention_days = {days} is out of range ({}-{}). Using default ({}).",
                constants::MIN_LOG_RETENTION_DAYS,
                constants::MAX_LOG_RETENTION_DAYS,
                constants::DEFAULT_LOG_RETENTION_DAYS,
            )),
        }
    }

    // -- Log: max_messages --
    if let Some(max) = raw.log.max_messages {
        match usize::try_from(max) {
            Ok(m) if (constants::MIN_MAX_LOG_MESSAGES..=constants::MAX_MAX_LOG_MESSAGES)
                .contains(&m) =>
            {
                config.max_log_messages = m;
            }
            _ => warnings.push(format!(
                "[log] max_messages = {max} is out of range ({}-{}). Using default ({}).",
                constants::MIN_MAX_LOG_MESSAGES,
                constants::MAX_MAX_LOG_MESSAGES,
                constants::DEFAULT_MAX_LOG_MESSAGES,
            )),
        }
    }

    // -- Logging: level --
    if let Some(ref level) = raw.logging.level {
        let valid = ["error", "warn", "info", "debug", "trace"];
        if valid.contains(&level.to_lowercase().as_str()) {
            config.log_level = Some(level.clone());
        } else {
            warnings.push(format!(
                "[logging] level = \"{level}\" is not recognised. \
                 Valid values: error, warn, info, debug, trace. Using default (info).",
            ));
        }
    }

    // -- Logging: file --
    if let Some(ref file) = raw.logging.file {
        if !file.is_empty() {
            config.log_file = Some(file.clone());
        }
    }

    if !warnings.is_empty() {
        tracing::warn!(
            count = warnings.len(),
            "Config validation produced warnings"
        );
    }

    (config, warnings)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn write_config(dir: &TempDir, body: &str) {
        std::fs::write(dir.path().join(constants::CONFIG_FILE_NAME), body).unwrap();
    }

    #[test]
    fn test_missing_config_uses_defaults() {
        let dir = TempDir::new().unwrap();
        let (config, warnings) = load_config(dir.path());
        assert_eq!(config, AppConfig::default());
        assert!(warnings.is_empty());
    }

    #[test]
    fn test_valid_values_are_applied() {
        let dir = TempDir::new().unwrap();
        write_config(
            &dir,
            "[sessions]\nretention_days = 7\n[log]\nmax_messages = 500\n[logging]\nlevel = \"debug\"\n",
        );
        let (config, warnings) = load_config(dir.path());
        assert!(warnings.is_empty(), "{warnings:?}");
        assert_eq!(config.retention_days, 7);
        assert_eq!(config.max_log_messages, 500);
        assert_eq!(config.log_level.as_deref(), Some("debug"));
    }

    #[test]
    fn test_out_of_range_values_warn_and_default() {
        let dir = TempDir::new().unwrap();
        write_config(
            &dir,
            "[sessions]\nretention_days = 0\n[log]\nmax_messages = 5\n[logging]\nlevel = \"loud\"\n",
        );
        let (config, warnings) = load_config(dir.path());
        assert_eq!(warnings.len(), 3);
        assert_eq!(config, AppConfig::default());
    }

    #[test]
    fn test_unparseable_config_warns() {
        let dir = TempDir::new().unwrap();
        write_config(&dir, "[sessions\nretention_days = ");
        let (config, warnings) = load_config(dir.path());
        assert_eq!(config, AppConfig::default());
        assert_eq!(warnings.len(), 1);
    }

    #[test]
    fn test_data_dir_override_moves_documents() {
        let paths = PlatformPaths::resolve().with_data_dir(PathBuf::from("/tmp/fb"));
        assert_eq!(paths.settings_path(), PathBuf::from("/tmp/fb/massProduction.json"));
        assert_eq!(
            paths.session_log_path(),
            PathBuf::from("/tmp/fb/massProduction-log.json")
        );
        assert_eq!(paths.runtime_log_path(), PathBuf::from("/tmp/fb/logs/flashbatch.log"));
    }
}

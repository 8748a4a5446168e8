//! INI configuration file.

use std::path::{Path, PathBuf};
use std::time::Duration;

use ini::Ini;
use thiserror::Error;
use tracing::debug;

use super::keys::ConfigKey;
use crate::claim::{ClaimStoreConfig, RetryPolicy};
use crate::discovery::{DiscoveryConfig, SessionConfig};
use crate::location::WatchOptions;
use crate::logging::{LoggingConfig, DEFAULT_LOG_FILE_PREFIX};
use crate::treasure::RadiusDefaults;

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to access config file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config file {path}: {reason}")]
    Parse { path: PathBuf, reason: String },

    #[error("Invalid value '{value}' for {key}: {reason}")]
    InvalidValue {
        key: String,
        value: String,
        reason: String,
    },

    #[error("Unknown configuration key '{0}'")]
    UnknownKey(String),

    #[error("Could not determine the user configuration directory")]
    NoConfigDir,
}

/// `[discovery]` section.
#[derive(Debug, Clone, PartialEq)]
pub struct DiscoverySettings {
    pub notify_cooldown_secs: u64,
    pub max_query_radius_m: f64,
    pub marker_window_secs: u64,
    pub default_claim_radius_m: f64,
    pub default_notify_radius_m: f64,
}

impl Default for DiscoverySettings {
    fn default() -> Self {
        let discovery = DiscoveryConfig::default();
        let radii = RadiusDefaults::default();
        Self {
            notify_cooldown_secs: discovery.notify_cooldown.as_secs(),
            max_query_radius_m: discovery.max_query_radius_m,
            marker_window_secs: discovery.marker_window.as_secs(),
            default_claim_radius_m: radii.claim_radius_m,
            default_notify_radius_m: radii.notify_radius_m,
        }
    }
}

/// `[location]` section.
#[derive(Debug, Clone, PartialEq)]
pub struct LocationSettings {
    pub min_movement_m: f64,
    pub max_age_ms: u64,
    pub timeout_ms: u64,
    pub max_accuracy_m: Option<f64>,
}

impl Default for LocationSettings {
    fn default() -> Self {
        let watch = WatchOptions::default();
        Self {
            min_movement_m: watch.min_movement_m,
            max_age_ms: watch.max_age.as_millis() as u64,
            timeout_ms: watch.timeout.as_millis() as u64,
            max_accuracy_m: watch.max_accuracy_m,
        }
    }
}

/// `[claims]` section.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClaimSettings {
    pub timeout_secs: u64,
    pub retry_attempts: u32,
    pub retry_interval_secs: u64,
}

impl Default for ClaimSettings {
    fn default() -> Self {
        let claims = ClaimStoreConfig::default();
        Self {
            timeout_secs: claims.claim_timeout.as_secs(),
            retry_attempts: claims.retry.max_attempts,
            retry_interval_secs: claims.retry.interval.as_secs(),
        }
    }
}

/// `[logging]` section.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoggingSettings {
    pub level: String,
    pub directory: Option<PathBuf>,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        let logging = LoggingConfig::default();
        Self {
            level: logging.level,
            directory: logging.directory,
        }
    }
}

/// Parsed configuration file.
///
/// Missing keys keep their defaults; unknown keys are ignored.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ConfigFile {
    pub discovery: DiscoverySettings,
    pub location: LocationSettings,
    pub claims: ClaimSettings,
    pub logging: LoggingSettings,
}

/// Location of the user configuration file (`<config dir>/trove/config.ini`).
pub fn config_file_path() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("trove")
        .join("config.ini")
}

impl ConfigFile {
    /// Load from [`config_file_path`]. A missing file yields defaults.
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from(&config_file_path())
    }

    /// Load from `path`. A missing file yields defaults.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            debug!(path = %path.display(), "No config file, using defaults");
            return Ok(Self::default());
        }

        let ini = Ini::load_from_file(path).map_err(|e| ConfigError::Parse {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;
        Self::from_ini(&ini)
    }

    /// Parse from INI text.
    pub fn parse(contents: &str) -> Result<Self, ConfigError> {
        let ini = Ini::load_from_str(contents).map_err(|e| ConfigError::Parse {
            path: PathBuf::new(),
            reason: e.to_string(),
        })?;
        Self::from_ini(&ini)
    }

    fn from_ini(ini: &Ini) -> Result<Self, ConfigError> {
        let mut config = Self::default();
        for key in ConfigKey::all() {
            if let Some(value) = ini.get_from(Some(key.section()), key.key_name()) {
                key.set(&mut config, value)?;
            }
        }
        config.validate()?;
        Ok(config)
    }

    /// Check constraints that span more than one key.
    ///
    /// The default claim radius must fit inside the default notify radius,
    /// otherwise catalog entries without radii could never be built.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let claim = self.discovery.default_claim_radius_m;
        let notify = self.discovery.default_notify_radius_m;
        if claim > notify {
            return Err(ConfigError::InvalidValue {
                key: ConfigKey::DiscoveryDefaultClaimRadiusM.name(),
                value: claim.to_string(),
                reason: format!(
                    "exceeds {} ({})",
                    ConfigKey::DiscoveryDefaultNotifyRadiusM.name(),
                    notify
                ),
            });
        }
        Ok(())
    }

    /// Save to [`config_file_path`], creating the directory if needed.
    pub fn save(&self) -> Result<(), ConfigError> {
        self.save_to(&config_file_path())
    }

    /// Save every key to `path`. Unset optional keys are omitted.
    pub fn save_to(&self, path: &Path) -> Result<(), ConfigError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|source| ConfigError::Io {
                path: parent.to_path_buf(),
                source,
            })?;
        }

        let mut ini = Ini::new();
        for key in ConfigKey::all() {
            let value = key.get(self);
            if !value.is_empty() {
                ini.with_section(Some(key.section()))
                    .set(key.key_name(), value);
            }
        }

        ini.write_to_file(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn discovery_config(&self) -> DiscoveryConfig {
        DiscoveryConfig {
            notify_cooldown: Duration::from_secs(self.discovery.notify_cooldown_secs),
            max_query_radius_m: self.discovery.max_query_radius_m,
            marker_window: Duration::from_secs(self.discovery.marker_window_secs),
        }
    }

    pub fn radius_defaults(&self) -> RadiusDefaults {
        RadiusDefaults {
            claim_radius_m: self.discovery.default_claim_radius_m,
            notify_radius_m: self.discovery.default_notify_radius_m,
        }
    }

    pub fn watch_options(&self) -> WatchOptions {
        WatchOptions {
            min_movement_m: self.location.min_movement_m,
            max_age: Duration::from_millis(self.location.max_age_ms),
            timeout: Duration::from_millis(self.location.timeout_ms),
            max_accuracy_m: self.location.max_accuracy_m,
        }
    }

    pub fn claim_store_config(&self) -> ClaimStoreConfig {
        ClaimStoreConfig {
            claim_timeout: Duration::from_secs(self.claims.timeout_secs),
            retry: RetryPolicy {
                max_attempts: self.claims.retry_attempts,
                interval: Duration::from_secs(self.claims.retry_interval_secs),
            },
        }
    }

    pub fn session_config(&self) -> SessionConfig {
        SessionConfig {
            discovery: self.discovery_config(),
            watch: self.watch_options(),
        }
    }

    pub fn logging_config(&self) -> LoggingConfig {
        LoggingConfig {
            level: self.logging.level.clone(),
            directory: self.logging.directory.clone(),
            file_prefix: DEFAULT_LOG_FILE_PREFIX.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_missing_file_gives_defaults() {
        let dir = TempDir::new().unwrap();
        let config = ConfigFile::load_from(&dir.path().join("absent.ini")).unwrap();
        assert_eq!(config, ConfigFile::default());
    }

    #[test]
    fn test_defaults_match_module_defaults() {
        let config = ConfigFile::default();
        assert_eq!(config.discovery_config(), DiscoveryConfig::default());
        assert_eq!(config.watch_options(), WatchOptions::default());
        assert_eq!(config.claim_store_config(), ClaimStoreConfig::default());
        assert_eq!(config.radius_defaults(), RadiusDefaults::default());
        assert_eq!(config.logging_config(), LoggingConfig::default());
    }

    #[test]
    fn test_parse_overrides_and_ignores_unknown() {
        let config = ConfigFile::parse(
            "[discovery]\nnotify_cooldown_secs = 30\nmystery = 1\n\n[location]\nmax_accuracy_m = 25\n\n[claims]\nretry_attempts = 3\n",
        )
        .unwrap();

        assert_eq!(config.discovery.notify_cooldown_secs, 30);
        assert_eq!(config.discovery.max_query_radius_m, 500.0);
        assert_eq!(config.location.max_accuracy_m, Some(25.0));
        assert_eq!(config.claims.retry_attempts, 3);
        assert!(config.claim_store_config().retry.is_enabled());
    }

    #[test]
    fn test_parse_rejects_invalid_value() {
        let result = ConfigFile::parse("[discovery]\nmax_query_radius_m = far\n");
        assert!(matches!(result, Err(ConfigError::InvalidValue { .. })));
    }

    #[test]
    fn test_claim_radius_must_fit_notify_radius() {
        let result = ConfigFile::parse(
            "[discovery]\ndefault_claim_radius_m = 150\ndefault_notify_radius_m = 100\n",
        );
        match result {
            Err(ConfigError::InvalidValue { key, .. }) => {
                assert_eq!(key, "discovery.default_claim_radius_m")
            }
            other => panic!("expected invalid value, got {:?}", other),
        }

        let config = ConfigFile::parse(
            "[discovery]\ndefault_claim_radius_m = 150\ndefault_notify_radius_m = 200\n",
        )
        .unwrap();
        assert_eq!(config.radius_defaults().claim_radius_m, 150.0);
    }

    #[test]
    fn test_save_and_reload() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested").join("config.ini");

        let mut config = ConfigFile::default();
        config.discovery.max_query_radius_m = 750.0;
        config.location.max_accuracy_m = Some(30.0);
        config.logging.directory = Some(dir.path().join("logs"));
        config.save_to(&path).unwrap();

        let reloaded = ConfigFile::load_from(&path).unwrap();
        assert_eq!(reloaded, config);

        let contents = std::fs::read_to_string(&path).unwrap();
        assert!(contents.contains("[discovery]"));
        assert!(contents.contains("max_query_radius_m=750"));
    }

    #[test]
    fn test_config_path_ends_with_trove() {
        let path = config_file_path();
        assert!(path.ends_with("trove/config.ini"));
    }
}

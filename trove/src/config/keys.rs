//! Typed access to configuration keys by `section.key` name.

use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use super::file::{ConfigError, ConfigFile};

/// Log levels accepted by `logging.level`.
const LOG_LEVELS: [&str; 5] = ["trace", "debug", "info", "warn", "error"];

/// Every settable configuration key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConfigKey {
    DiscoveryNotifyCooldownSecs,
    DiscoveryMaxQueryRadiusM,
    DiscoveryMarkerWindowSecs,
    DiscoveryDefaultClaimRadiusM,
    DiscoveryDefaultNotifyRadiusM,
    LocationMinMovementM,
    LocationMaxAgeMs,
    LocationTimeoutMs,
    LocationMaxAccuracyM,
    ClaimsTimeoutSecs,
    ClaimsRetryAttempts,
    ClaimsRetryIntervalSecs,
    LoggingLevel,
    LoggingDirectory,
}

impl ConfigKey {
    /// All keys in file order.
    pub fn all() -> &'static [ConfigKey] {
        &[
            ConfigKey::DiscoveryNotifyCooldownSecs,
            ConfigKey::DiscoveryMaxQueryRadiusM,
            ConfigKey::DiscoveryMarkerWindowSecs,
            ConfigKey::DiscoveryDefaultClaimRadiusM,
            ConfigKey::DiscoveryDefaultNotifyRadiusM,
            ConfigKey::LocationMinMovementM,
            ConfigKey::LocationMaxAgeMs,
            ConfigKey::LocationTimeoutMs,
            ConfigKey::LocationMaxAccuracyM,
            ConfigKey::ClaimsTimeoutSecs,
            ConfigKey::ClaimsRetryAttempts,
            ConfigKey::ClaimsRetryIntervalSecs,
            ConfigKey::LoggingLevel,
            ConfigKey::LoggingDirectory,
        ]
    }

    pub fn section(&self) -> &'static str {
        match self {
            ConfigKey::DiscoveryNotifyCooldownSecs
            | ConfigKey::DiscoveryMaxQueryRadiusM
            | ConfigKey::DiscoveryMarkerWindowSecs
            | ConfigKey::DiscoveryDefaultClaimRadiusM
            | ConfigKey::DiscoveryDefaultNotifyRadiusM => "discovery",
            ConfigKey::LocationMinMovementM
            | ConfigKey::LocationMaxAgeMs
            | ConfigKey::LocationTimeoutMs
            | ConfigKey::LocationMaxAccuracyM => "location",
            ConfigKey::ClaimsTimeoutSecs
            | ConfigKey::ClaimsRetryAttempts
            | ConfigKey::ClaimsRetryIntervalSecs => "claims",
            ConfigKey::LoggingLevel | ConfigKey::LoggingDirectory => "logging",
        }
    }

    pub fn key_name(&self) -> &'static str {
        match self {
            ConfigKey::DiscoveryNotifyCooldownSecs => "notify_cooldown_secs",
            ConfigKey::DiscoveryMaxQueryRadiusM => "max_query_radius_m",
            ConfigKey::DiscoveryMarkerWindowSecs => "marker_window_secs",
            ConfigKey::DiscoveryDefaultClaimRadiusM => "default_claim_radius_m",
            ConfigKey::DiscoveryDefaultNotifyRadiusM => "default_notify_radius_m",
            ConfigKey::LocationMinMovementM => "min_movement_m",
            ConfigKey::LocationMaxAgeMs => "max_age_ms",
            ConfigKey::LocationTimeoutMs => "timeout_ms",
            ConfigKey::LocationMaxAccuracyM => "max_accuracy_m",
            ConfigKey::ClaimsTimeoutSecs => "timeout_secs",
            ConfigKey::ClaimsRetryAttempts => "retry_attempts",
            ConfigKey::ClaimsRetryIntervalSecs => "retry_interval_secs",
            ConfigKey::LoggingLevel => "level",
            ConfigKey::LoggingDirectory => "directory",
        }
    }

    /// Full `section.key` name.
    pub fn name(&self) -> String {
        format!("{}.{}", self.section(), self.key_name())
    }

    /// Current value as a string; empty for unset optional keys.
    pub fn get(&self, config: &ConfigFile) -> String {
        match self {
            ConfigKey::DiscoveryNotifyCooldownSecs => {
                config.discovery.notify_cooldown_secs.to_string()
            }
            ConfigKey::DiscoveryMaxQueryRadiusM => config.discovery.max_query_radius_m.to_string(),
            ConfigKey::DiscoveryMarkerWindowSecs => config.discovery.marker_window_secs.to_string(),
            ConfigKey::DiscoveryDefaultClaimRadiusM => {
                config.discovery.default_claim_radius_m.to_string()
            }
            ConfigKey::DiscoveryDefaultNotifyRadiusM => {
                config.discovery.default_notify_radius_m.to_string()
            }
            ConfigKey::LocationMinMovementM => config.location.min_movement_m.to_string(),
            ConfigKey::LocationMaxAgeMs => config.location.max_age_ms.to_string(),
            ConfigKey::LocationTimeoutMs => config.location.timeout_ms.to_string(),
            ConfigKey::LocationMaxAccuracyM => config
                .location
                .max_accuracy_m
                .map(|v| v.to_string())
                .unwrap_or_default(),
            ConfigKey::ClaimsTimeoutSecs => config.claims.timeout_secs.to_string(),
            ConfigKey::ClaimsRetryAttempts => config.claims.retry_attempts.to_string(),
            ConfigKey::ClaimsRetryIntervalSecs => config.claims.retry_interval_secs.to_string(),
            ConfigKey::LoggingLevel => config.logging.level.clone(),
            ConfigKey::LoggingDirectory => config
                .logging
                .directory
                .as_ref()
                .map(|p| p.display().to_string())
                .unwrap_or_default(),
        }
    }

    /// Parse and store `value`. An empty value clears optional keys.
    pub fn set(&self, config: &mut ConfigFile, value: &str) -> Result<(), ConfigError> {
        let value = value.trim();
        match self {
            ConfigKey::DiscoveryNotifyCooldownSecs => {
                config.discovery.notify_cooldown_secs = self.parse(value)?
            }
            ConfigKey::DiscoveryMaxQueryRadiusM => {
                config.discovery.max_query_radius_m = self.parse_distance(value)?
            }
            ConfigKey::DiscoveryMarkerWindowSecs => {
                config.discovery.marker_window_secs = self.parse(value)?
            }
            ConfigKey::DiscoveryDefaultClaimRadiusM => {
                config.discovery.default_claim_radius_m = self.parse_distance(value)?
            }
            ConfigKey::DiscoveryDefaultNotifyRadiusM => {
                config.discovery.default_notify_radius_m = self.parse_distance(value)?
            }
            ConfigKey::LocationMinMovementM => {
                let meters: f64 = self.parse(value)?;
                if !meters.is_finite() || meters < 0.0 {
                    return Err(self.invalid(value, "must be a non-negative distance in meters"));
                }
                config.location.min_movement_m = meters;
            }
            ConfigKey::LocationMaxAgeMs => config.location.max_age_ms = self.parse(value)?,
            ConfigKey::LocationTimeoutMs => {
                let ms: u64 = self.parse(value)?;
                if ms == 0 {
                    return Err(self.invalid(value, "must be greater than zero"));
                }
                config.location.timeout_ms = ms;
            }
            ConfigKey::LocationMaxAccuracyM => {
                config.location.max_accuracy_m = if value.is_empty() {
                    None
                } else {
                    Some(self.parse_distance(value)?)
                }
            }
            ConfigKey::ClaimsTimeoutSecs => {
                let secs: u64 = self.parse(value)?;
                if secs == 0 {
                    return Err(self.invalid(value, "must be greater than zero"));
                }
                config.claims.timeout_secs = secs;
            }
            ConfigKey::ClaimsRetryAttempts => config.claims.retry_attempts = self.parse(value)?,
            ConfigKey::ClaimsRetryIntervalSecs => {
                let secs: u64 = self.parse(value)?;
                if secs == 0 {
                    return Err(self.invalid(value, "must be greater than zero"));
                }
                config.claims.retry_interval_secs = secs;
            }
            ConfigKey::LoggingLevel => {
                let level = value.to_ascii_lowercase();
                if !LOG_LEVELS.contains(&level.as_str()) {
                    return Err(
                        self.invalid(value, "expected one of trace, debug, info, warn, error")
                    );
                }
                config.logging.level = level;
            }
            ConfigKey::LoggingDirectory => {
                config.logging.directory = if value.is_empty() {
                    None
                } else {
                    Some(PathBuf::from(value))
                }
            }
        }
        Ok(())
    }

    fn parse<T>(&self, value: &str) -> Result<T, ConfigError>
    where
        T: FromStr,
        T::Err: fmt::Display,
    {
        value
            .parse()
            .map_err(|e: T::Err| self.invalid(value, &e.to_string()))
    }

    fn parse_distance(&self, value: &str) -> Result<f64, ConfigError> {
        let meters: f64 = self.parse(value)?;
        if !meters.is_finite() || meters <= 0.0 {
            return Err(self.invalid(value, "must be a positive distance in meters"));
        }
        Ok(meters)
    }

    fn invalid(&self, value: &str, reason: &str) -> ConfigError {
        ConfigError::InvalidValue {
            key: self.name(),
            value: value.to_string(),
            reason: reason.to_string(),
        }
    }
}

impl FromStr for ConfigKey {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ConfigKey::all()
            .iter()
            .copied()
            .find(|key| key.name() == s)
            .ok_or_else(|| ConfigError::UnknownKey(s.to_string()))
    }
}

impl fmt::Display for ConfigKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.section(), self.key_name())
    }
}

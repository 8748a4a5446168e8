//! Configuration file support.
//!
//! Settings live in an INI file at `<config dir>/trove/config.ini`:
//!
//! ```ini
//! [discovery]
//! notify_cooldown_secs = 10
//! max_query_radius_m = 500
//! marker_window_secs = 5
//! default_claim_radius_m = 50
//! default_notify_radius_m = 100
//!
//! [location]
//! min_movement_m = 1
//! max_age_ms = 30000
//! timeout_ms = 30000
//! ; max_accuracy_m = 25
//!
//! [claims]
//! timeout_secs = 15
//! retry_attempts = 0
//! retry_interval_secs = 30
//!
//! [logging]
//! level = info
//! ; directory = /var/log/trove
//! ```
//!
//! [`ConfigFile`] holds the parsed sections and converts them into the
//! per-module configuration types. [`ConfigKey`] addresses individual keys
//! by `section.key` name for the CLI's `config get/set`.

mod file;
mod keys;

pub use file::{
    config_file_path, ClaimSettings, ConfigError, ConfigFile, DiscoverySettings,
    LocationSettings, LoggingSettings,
};
pub use keys::ConfigKey;

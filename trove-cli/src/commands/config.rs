//! `trove config`: inspect and edit `config.ini`.
//!
//! Keys are addressed as `section.key` (see [`ConfigKey`]). `set` re-checks
//! the whole file before saving, so a claim radius larger than the notify
//! radius is refused even when only one of the two keys changes.

use clap::Subcommand;
use trove::config::{config_file_path, ConfigFile, ConfigKey};

use crate::error::CliError;

/// Config subcommands.
#[derive(Debug, Subcommand)]
pub enum ConfigCommands {
    /// Print the value of one key
    Get {
        /// Key as section.key (e.g. discovery.notify_cooldown_secs)
        key: String,
    },

    /// Change one key and save the file
    Set {
        /// Key as section.key (e.g. claims.retry_attempts)
        key: String,

        /// New value; an empty string clears optional keys
        value: String,
    },

    /// Print every key, marking values that differ from the defaults
    List,

    /// Print the path of the configuration file
    Path,
}

pub fn run(command: ConfigCommands) -> Result<(), CliError> {
    match command {
        ConfigCommands::Get { key } => {
            let key = lookup(&key)?;
            let value = key.get(&ConfigFile::load()?);
            println!("{}", display_value(&value));
            Ok(())
        }
        ConfigCommands::Set { key, value } => set(lookup(&key)?, &value),
        ConfigCommands::List => {
            print!("{}", render_list(&ConfigFile::load()?));
            Ok(())
        }
        ConfigCommands::Path => {
            println!("{}", config_file_path().display());
            Ok(())
        }
    }
}

fn lookup(name: &str) -> Result<ConfigKey, CliError> {
    name.parse().map_err(|_| {
        CliError::Config(format!(
            "Unknown key '{}' (run `trove config list` for the available keys)",
            name
        ))
    })
}

fn set(key: ConfigKey, value: &str) -> Result<(), CliError> {
    let mut config = ConfigFile::load()?;
    let previous = key.get(&config);

    key.set(&mut config, value)?;
    config.validate()?;
    config.save()?;

    println!(
        "{}: {} -> {}",
        key,
        display_value(&previous),
        display_value(&key.get(&config))
    );

    if key.section() == "discovery" {
        let radii = config.radius_defaults();
        println!(
            "Catalog defaults: claim {} m, notify {} m",
            radii.claim_radius_m, radii.notify_radius_m
        );
    }

    Ok(())
}

fn display_value(value: &str) -> &str {
    if value.is_empty() {
        "(unset)"
    } else {
        value
    }
}

/// One `[section]` block per section; non-default values carry the default.
fn render_list(config: &ConfigFile) -> String {
    let defaults = ConfigFile::default();
    let mut out = String::new();
    let mut section = "";

    for key in ConfigKey::all() {
        if key.section() != section {
            if !section.is_empty() {
                out.push('\n');
            }
            section = key.section();
            out.push_str(&format!("[{}]\n", section));
        }

        let value = key.get(config);
        let default = key.get(&defaults);
        out.push_str(&format!("{} = {}", key.key_name(), display_value(&value)));
        if value != default {
            out.push_str(&format!("  (default: {})", display_value(&default)));
        }
        out.push('\n');
    }

    out
}

//! Subcommand implementations.

pub mod config;
pub mod distance;
pub mod simulate;

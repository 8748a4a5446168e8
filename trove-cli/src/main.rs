//! Trove CLI - Command-line interface
//!
//! Replays location tracks against a treasure catalog, computes distances,
//! and manages the configuration file.

mod commands;
mod error;

use clap::{Parser, Subcommand};
use trove::config::ConfigFile;
use trove::geo::Coordinate;
use trove::logging::init_logging;

use commands::config::ConfigCommands;
use commands::simulate::SimulateArgs;
use error::CliError;

#[derive(Debug, Parser)]
#[command(name = "trove", version = trove::VERSION, about = "Proximity discovery and claim engine")]
struct Cli {
    /// Enable debug logging (overrides the configured level)
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Great-circle distance and bearing between two points
    Distance {
        #[arg(allow_negative_numbers = true)]
        lat1: f64,
        #[arg(allow_negative_numbers = true)]
        lon1: f64,
        #[arg(allow_negative_numbers = true)]
        lat2: f64,
        #[arg(allow_negative_numbers = true)]
        lon2: f64,
    },

    /// Replay a location track against a treasure catalog
    Simulate(SimulateArgs),

    /// View and modify configuration
    #[command(subcommand)]
    Config(ConfigCommands),
}

fn main() {
    let cli = Cli::parse();

    if let Err(e) = run(cli) {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}

fn run(cli: Cli) -> Result<(), CliError> {
    match cli.command {
        Commands::Distance {
            lat1,
            lon1,
            lat2,
            lon2,
        } => commands::distance::run(Coordinate::new(lat1, lon1)?, Coordinate::new(lat2, lon2)?),
        Commands::Simulate(args) => {
            let config = ConfigFile::load()?;
            let mut logging = config.logging_config();
            if cli.verbose {
                logging = logging.with_level("debug");
            }
            // Flushes the log file on exit.
            let _guard = init_logging(&logging)?;
            commands::simulate::run(args, &config)
        }
        Commands::Config(command) => commands::config::run(command),
    }
}

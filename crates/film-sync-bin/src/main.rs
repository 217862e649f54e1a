//! film-sync - film catalogue write API and downstream synchronizers.

mod app;

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use film_sync_config::{init_logging, Config};

use app::Side;

/// film-sync command-line interface.
#[derive(Parser)]
#[command(name = "film-sync")]
#[command(about = "Keeps the film catalogue and the legacy film store in sync")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// JSON config file, applied over the environment
    #[arg(short, long, global = true, env = "FILM_SYNC_CONFIG")]
    config: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long, global = true)]
    log_level: Option<String>,
}

#[derive(Subcommand)]
enum Commands {
    /// Serve the catalogue write API
    Api,
    /// Apply the legacy store's change feed to the catalogue
    SyncCatalogue,
    /// Apply catalogue events to the legacy store
    SyncLegacy,
}

impl Commands {
    fn service_name(&self) -> &'static str {
        match self {
            Self::Api => "film-sync-api",
            Self::SyncCatalogue => "catalogue-synchronizer",
            Self::SyncLegacy => "legacydb-synchronizer",
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let mut config = Config::load(cli.config.as_deref())?;
    if let Some(level) = cli.log_level {
        config.log_level = level;
    }
    init_logging(cli.command.service_name(), &config.log_level, config.log_format);
    config.validate()?;

    match cli.command {
        Commands::Api => app::run_api(config).await,
        Commands::SyncCatalogue => app::run_sync(config, Side::Catalogue).await,
        Commands::SyncLegacy => app::run_sync(config, Side::Legacy).await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_global_flags_after_subcommand() {
        let cli = Cli::try_parse_from([
            "film-sync",
            "sync-legacy",
            "--config",
            "/etc/film-sync.json",
            "--log-level",
            "debug",
        ])
        .unwrap();

        assert!(matches!(cli.command, Commands::SyncLegacy));
        assert_eq!(cli.config, Some(PathBuf::from("/etc/film-sync.json")));
        assert_eq!(cli.log_level.as_deref(), Some("debug"));
    }
}

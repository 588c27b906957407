//! rBioSync library root.
//! Exposes the CLI parser, the high-level run() function and the pipeline modules.

pub mod cli;
pub mod config;
pub mod core;
pub mod daemon;
pub mod db;
pub mod errors;
pub mod export;
pub mod gateway;
pub mod models;
pub mod ui;
pub mod utils;

use cli::parser::{Cli, Commands};
use config::Config;
use errors::AppResult;

/// Central command dispatcher
pub async fn dispatch(cli: &Cli, cfg: &Config) -> AppResult<()> {
    match &cli.command {
        Commands::Init => cli::commands::init::handle(cli),
        Commands::Config { .. } => cli::commands::config::handle(&cli.command, cfg),
        Commands::Run => cli::commands::run::handle(cfg).await,
        Commands::Sync { .. } => cli::commands::sync::handle(&cli.command, cfg).await,
        Commands::Status => cli::commands::status::handle(cfg).await,
        Commands::Gaps => cli::commands::gaps::handle(cfg).await,
        Commands::List { .. } => cli::commands::list::handle(&cli.command, cfg),
        Commands::Shift { .. } => cli::commands::shift::handle(&cli.command, cfg),
        Commands::Finalize { .. } => cli::commands::finalize::handle(&cli.command, cfg),
        Commands::Export { .. } => cli::commands::export::handle(&cli.command, cfg),
        Commands::Log { .. } => cli::commands::log::handle(&cli.command, cfg),
    }
}

/// Entry point used by main.rs
pub async fn run(cli: Cli) -> AppResult<()> {
    // Load the config once; `init` does not need an existing one
    let mut cfg = if matches!(cli.command, Commands::Init) {
        Config::default()
    } else {
        Config::load()?
    };

    // Command-line database override
    if let Some(custom_db) = &cli.db {
        cfg.database = custom_db.clone();
    }

    dispatch(&cli, &cfg).await
}

//! rBioSync main entrypoint.

use clap::Parser;
use rbiosync::cli::parser::Cli;
use rbiosync::run;
use rbiosync::ui::messages::error;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

fn init_tracing(verbose: bool) {
    let default = if verbose { "rbiosync=debug" } else { "rbiosync=info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr).with_target(false))
        .with(filter)
        .init();
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    if let Err(e) = run(cli).await {
        error(e);
        std::process::exit(1);
    }
}

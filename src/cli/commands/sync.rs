use crate::cli::parser::Commands;
use crate::config::Config;
use crate::core::puller::{DeviceFilter, PullOutcome, Puller};
use crate::core::stitcher::{StitchRules, Stitcher};
use crate::db::initialize::open;
use crate::errors::AppResult;
use crate::gateway::HttpGateway;
use crate::ui::messages::{info, success, warning};
use crate::utils::time::parse_bound;
use std::sync::Arc;

/// Handle the `sync` command: one incremental run, or a backfill.
pub async fn handle(cmd: &Commands, cfg: &Config) -> AppResult<()> {
    let Commands::Sync { from, to, limit } = cmd else {
        return Ok(());
    };

    let pool = open(&cfg.database)?;
    let gateway = Arc::new(HttpGateway::new(&cfg.gateway)?);
    let stitcher = Stitcher::new(pool.clone(), StitchRules::from(&cfg.stitcher));
    let puller = Puller::new(
        pool,
        gateway,
        stitcher,
        DeviceFilter::from_config(&cfg.gateway)?,
        cfg.puller.clone(),
        cfg.gateway.page_size,
    );

    let outcome = match (from, to) {
        (Some(f), Some(t)) => {
            let (from, to) = (parse_bound(f, false)?, parse_bound(t, true)?);
            info(format!("Historical sync {from} → {to}"));
            puller.pull_range(from, to, *limit).await?
        }
        _ => {
            info("Incremental sync");
            puller.pull_incremental(*limit).await?
        }
    };

    match outcome {
        PullOutcome::Completed { fetched, ingested } => {
            success(format!("Sync completed: {fetched} fetched, {ingested} new"));
        }
        PullOutcome::AlreadyRunning => warning("A sync of this kind is already running."),
    }
    Ok(())
}

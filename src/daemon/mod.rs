//! Long-running service: the three periodic workers under the watchdog,
//! plus the admin API.

pub mod admin;

use crate::config::Config;
use crate::core::gaps::GapDetector;
use crate::core::puller::{DeviceFilter, PullOutcome, Puller};
use crate::core::stitcher::{StitchRules, Stitcher};
use crate::core::watchdog::{Watchdog, WatchdogEvent};
use crate::core::worker::{Job, ScheduledWorker};
use crate::db::initialize::open;
use crate::db::log::oplog;
use crate::db::pool::DbPool;
use crate::errors::AppResult;
use crate::gateway::{HttpGateway, TerminalGateway};
use async_trait::async_trait;
use chrono::{Duration as ChronoDuration, Local};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};

pub const PULLER: &str = "puller";
pub const STITCHER: &str = "stitcher";
pub const GAP_DETECTOR: &str = "gap_detector";

/// Groups re-stitched per stitcher cycle.
const RESTITCH_BATCH: usize = 500;

struct PullJob {
    puller: Arc<Puller>,
}

#[async_trait]
impl Job for PullJob {
    async fn run_once(&self) -> AppResult<()> {
        match self.puller.pull_incremental(None).await? {
            PullOutcome::AlreadyRunning => debug!("Scheduled pull skipped, a manual one is running"),
            PullOutcome::Completed { .. } => {}
        }
        Ok(())
    }
}

struct StitchJob {
    stitcher: Stitcher,
    finalize_previous_day: bool,
}

#[async_trait]
impl Job for StitchJob {
    async fn run_once(&self) -> AppResult<()> {
        self.stitcher.restitch_pending(RESTITCH_BATCH)?;
        if self.finalize_previous_day {
            let yesterday = Local::now().date_naive() - ChronoDuration::days(1);
            self.stitcher.finalize_day(yesterday)?;
        }
        Ok(())
    }
}

struct GapJob {
    detector: Arc<GapDetector>,
    puller: Arc<Puller>,
}

#[async_trait]
impl Job for GapJob {
    async fn run_once(&self) -> AppResult<()> {
        let cycle = self.detector.run_cycle_at(Local::now().naive_local()).await;
        if let Some(start) = cycle.recovery_start {
            info!(
                start = %start,
                priority = cycle.window.priority.as_str(),
                reason = %cycle.window.reason,
                "Redirecting puller to recover a gap"
            );
            self.puller.set_override(start);
        }
        Ok(())
    }
}

/// Every component of the running service.
pub struct Pipeline {
    pub pool: DbPool,
    pub puller: Arc<Puller>,
    pub stitcher: Stitcher,
    pub detector: Arc<GapDetector>,
    pub watchdog: Watchdog,
    pub gap_worker: Arc<ScheduledWorker>,
}

impl Pipeline {
    /// Wire components and register the workers; nothing is started.
    pub async fn build(
        cfg: &Config,
        pool: DbPool,
        gateway: Arc<dyn TerminalGateway>,
    ) -> AppResult<Self> {
        let stitcher = Stitcher::new(pool.clone(), StitchRules::from(&cfg.stitcher));
        let puller = Arc::new(Puller::new(
            pool.clone(),
            gateway.clone(),
            stitcher.clone(),
            DeviceFilter::from_config(&cfg.gateway)?,
            cfg.puller.clone(),
            cfg.gateway.page_size,
        ));
        let detector = Arc::new(GapDetector::new(
            pool.clone(),
            gateway,
            cfg.gap_detector.clone(),
        ));

        let pull_worker = Arc::new(ScheduledWorker::new(
            PULLER,
            Arc::new(PullJob {
                puller: puller.clone(),
            }),
            Duration::from_secs(cfg.puller.interval_secs),
        ));
        let stitch_worker = Arc::new(ScheduledWorker::new(
            STITCHER,
            Arc::new(StitchJob {
                stitcher: stitcher.clone(),
                finalize_previous_day: cfg.stitcher.finalize_previous_day,
            }),
            Duration::from_secs(cfg.stitcher.interval_secs),
        ));
        let gap_worker = Arc::new(ScheduledWorker::new(
            GAP_DETECTOR,
            Arc::new(GapJob {
                detector: detector.clone(),
                puller: puller.clone(),
            }),
            Duration::from_secs(cfg.gap_detector.interval_secs),
        ));

        let watchdog = Watchdog::new(cfg.watchdog.clone());
        watchdog.register(pull_worker).await;
        watchdog.register(stitch_worker).await;
        watchdog.register(gap_worker.clone()).await;

        Ok(Self {
            pool,
            puller,
            stitcher,
            detector,
            watchdog,
            gap_worker,
        })
    }

    /// Persist restart events in the operation log.
    fn spawn_event_recorder(&self) -> tokio::task::JoinHandle<()> {
        let mut events = self.watchdog.subscribe();
        let pool = self.pool.clone();

        tokio::spawn(async move {
            loop {
                let event = match events.recv().await {
                    Ok(ev) => ev,
                    Err(tokio::sync::broadcast::error::RecvError::Lagged(n)) => {
                        warn!(skipped = n, "Watchdog event recorder lagged");
                        continue;
                    }
                    Err(_) => break,
                };

                let (operation, target, message) = match &event {
                    WatchdogEvent::Restarted { worker } => {
                        ("worker_restarted", worker.clone(), "restarted by watchdog".to_string())
                    }
                    WatchdogEvent::RestartFailed { worker, error } => {
                        ("worker_restart_failed", worker.clone(), error.clone())
                    }
                    WatchdogEvent::Unhealthy { worker, reason } => {
                        ("worker_unhealthy", worker.clone(), reason.clone())
                    }
                    WatchdogEvent::Recovered { .. } => continue,
                };

                if let Err(e) = pool.with_conn(|conn| oplog(conn, operation, &target, &message)) {
                    warn!(error = %e, "Failed to record watchdog event");
                }
            }
        })
    }
}

/// Run the service until Ctrl-C.
pub async fn run(cfg: Config) -> AppResult<()> {
    info!(database = %cfg.database, gateway = %cfg.gateway.base_url, "Starting rBioSync daemon");

    let pool = open(&cfg.database)?;
    let gateway: Arc<dyn TerminalGateway> = Arc::new(HttpGateway::new(&cfg.gateway)?);
    let pipeline = Pipeline::build(&cfg, pool, gateway).await?;

    let recorder = pipeline.spawn_event_recorder();
    pipeline.watchdog.start_all().await?;

    let state = admin::AdminState::new(&pipeline, &cfg.admin);
    let server = admin::start_server(&cfg.admin.bind, state).await?;

    tokio::signal::ctrl_c().await?;
    info!("Shutdown requested");

    server.abort();
    if let Err(e) = pipeline.watchdog.stop_all().await {
        error!(error = %e, "Error while stopping workers");
    }
    recorder.abort();
    info!("rBioSync daemon stopped");
    Ok(())
}

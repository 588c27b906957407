//! Periodic background workers and the interface the watchdog supervises.

use crate::errors::{AppError, AppResult};
use async_trait::async_trait;
use chrono::{DateTime, Local, TimeZone};
use std::sync::Arc;
use std::sync::atomic::{AtomicI64, Ordering};
use std::time::Duration;
use tokio::sync::{Mutex, watch};
use tokio::task::JoinHandle;
use tokio::time::{MissedTickBehavior, interval};
use tracing::{debug, info, warn};

/// What the watchdog needs from every supervised component.
#[async_trait]
pub trait Worker: Send + Sync {
    fn name(&self) -> &str;

    async fn start(&self) -> AppResult<()>;

    async fn stop(&self) -> AppResult<()>;

    /// Explicit liveness answer. `None` lets the watchdog fall back to the
    /// activity timeout.
    fn liveness(&self) -> Option<bool> {
        None
    }

    fn last_activity(&self) -> Option<DateTime<Local>>;
}

/// Last-activity timestamp shared between a worker task and its handle.
#[derive(Debug, Default)]
pub struct Heartbeat {
    millis: AtomicI64,
}

impl Heartbeat {
    pub fn beat(&self) {
        self.millis.store(Local::now().timestamp_millis(), Ordering::Release);
    }

    pub fn last(&self) -> Option<DateTime<Local>> {
        match self.millis.load(Ordering::Acquire) {
            0 => None,
            ms => Local.timestamp_millis_opt(ms).single(),
        }
    }
}

/// One unit of periodic work.
#[async_trait]
pub trait Job: Send + Sync + 'static {
    async fn run_once(&self) -> AppResult<()>;
}

struct Running {
    handle: JoinHandle<()>,
    shutdown: watch::Sender<bool>,
}

/// Runs a [`Job`] on a fixed interval. A tick never starts while the
/// previous run is still going; missed ticks are skipped.
pub struct ScheduledWorker {
    name: String,
    job: Arc<dyn Job>,
    interval: std::sync::Mutex<Duration>,
    heartbeat: Arc<Heartbeat>,
    task: Mutex<Option<Running>>,
}

impl ScheduledWorker {
    pub fn new(name: impl Into<String>, job: Arc<dyn Job>, every: Duration) -> Self {
        Self {
            name: name.into(),
            job,
            interval: std::sync::Mutex::new(every),
            heartbeat: Arc::new(Heartbeat::default()),
            task: Mutex::new(None),
        }
    }

    pub fn interval(&self) -> Duration {
        self.interval
            .lock()
            .map(|d| *d)
            .unwrap_or(Duration::from_secs(60))
    }

    /// Takes effect on the next start.
    pub fn set_interval(&self, every: Duration) {
        if let Ok(mut d) = self.interval.lock() {
            *d = every;
        }
    }

    pub fn heartbeat(&self) -> Arc<Heartbeat> {
        self.heartbeat.clone()
    }
}

#[async_trait]
impl Worker for ScheduledWorker {
    fn name(&self) -> &str {
        &self.name
    }

    async fn start(&self) -> AppResult<()> {
        let mut task = self.task.lock().await;
        if task.as_ref().is_some_and(|r| !r.handle.is_finished()) {
            debug!(worker = %self.name, "Worker already running");
            return Ok(());
        }

        let every = self.interval();
        if every.is_zero() {
            return Err(AppError::Worker(format!("{}: interval must be positive", self.name)));
        }

        let (tx, mut rx) = watch::channel(false);
        let job = self.job.clone();
        let heartbeat = self.heartbeat.clone();
        let name = self.name.clone();

        heartbeat.beat();
        let handle = tokio::spawn(async move {
            let mut ticker = interval(every);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            info!(worker = %name, "Worker started (interval: {:?})", every);

            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        heartbeat.beat();
                        if let Err(e) = job.run_once().await {
                            warn!(worker = %name, error = %e, "Worker cycle failed");
                        }
                        heartbeat.beat();
                    }
                    changed = rx.changed() => {
                        if changed.is_err() || *rx.borrow() {
                            break;
                        }
                    }
                }
            }
            info!(worker = %name, "Worker stopped");
        });

        *task = Some(Running {
            handle,
            shutdown: tx,
        });
        Ok(())
    }

    async fn stop(&self) -> AppResult<()> {
        let Some(running) = self.task.lock().await.take() else {
            return Ok(());
        };

        let _ = running.shutdown.send(true);
        let abort = running.handle.abort_handle();
        // A job stuck in I/O does not observe the shutdown signal.
        match tokio::time::timeout(Duration::from_secs(5), running.handle).await {
            Ok(_) => Ok(()),
            Err(_) => {
                abort.abort();
                warn!(worker = %self.name, "Worker did not stop in time, aborted");
                Ok(())
            }
        }
    }

    fn liveness(&self) -> Option<bool> {
        match self.task.try_lock() {
            Ok(task) => match task.as_ref() {
                None => Some(false),
                Some(r) if r.handle.is_finished() => Some(false),
                Some(_) => None,
            },
            // Being started or stopped right now
            Err(_) => None,
        }
    }

    fn last_activity(&self) -> Option<DateTime<Local>> {
        self.heartbeat.last()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicU32;

    struct Counting(AtomicU32);

    #[async_trait]
    impl Job for Counting {
        async fn run_once(&self) -> AppResult<()> {
            self.0.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    #[test]
    fn heartbeat_starts_empty() {
        let hb = Heartbeat::default();
        assert!(hb.last().is_none());
        hb.beat();
        assert!(hb.last().is_some());
    }

    #[tokio::test]
    async fn scheduled_worker_runs_and_stops() {
        let job = Arc::new(Counting(AtomicU32::new(0)));
        let worker = ScheduledWorker::new("counter", job.clone(), Duration::from_millis(10));

        assert_eq!(worker.liveness(), Some(false));
        worker.start().await.unwrap();
        assert_eq!(worker.liveness(), None);

        tokio::time::sleep(Duration::from_millis(60)).await;
        assert!(job.0.load(Ordering::SeqCst) >= 1);
        assert!(worker.last_activity().is_some());

        worker.stop().await.unwrap();
        assert_eq!(worker.liveness(), Some(false));
    }

    #[tokio::test]
    async fn start_is_idempotent() {
        let job = Arc::new(Counting(AtomicU32::new(0)));
        let worker = ScheduledWorker::new("counter", job, Duration::from_secs(3600));
        worker.start().await.unwrap();
        worker.start().await.unwrap();
        worker.stop().await.unwrap();
        worker.stop().await.unwrap();
    }

    #[tokio::test]
    async fn zero_interval_is_rejected() {
        let job = Arc::new(Counting(AtomicU32::new(0)));
        let worker = ScheduledWorker::new("counter", job, Duration::ZERO);
        assert!(matches!(worker.start().await, Err(AppError::Worker(_))));
    }
}

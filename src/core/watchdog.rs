//! Health supervisor for the background workers.
//!
//! Every check compares each worker's liveness answer (or its last activity
//! against a per-worker timeout) and restarts workers that fail
//! `failure_threshold` checks in a row.

use crate::config::WatchdogConfig;
use crate::core::worker::Worker;
use crate::errors::{AppError, AppResult};
use crate::models::health::{HealthStatus, ServiceHealth};
use chrono::{DateTime, Local};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock, broadcast, watch};
use tokio::task::JoinHandle;
use tokio::time::{MissedTickBehavior, interval};
use tracing::{debug, error, info, warn};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum WatchdogEvent {
    Unhealthy { worker: String, reason: String },
    Restarted { worker: String },
    RestartFailed { worker: String, error: String },
    Recovered { worker: String },
}

#[derive(Debug, Clone, Serialize)]
pub struct WorkerReport {
    pub name: String,
    pub uptime_secs: i64,
    #[serde(flatten)]
    pub health: ServiceHealth,
}

#[derive(Debug, Clone, Serialize)]
pub struct WatchdogStatus {
    pub started_at: DateTime<Local>,
    pub running: bool,
    pub total: usize,
    pub healthy: usize,
    pub unhealthy: usize,
    pub workers: Vec<WorkerReport>,
}

struct LoopHandle {
    handle: JoinHandle<()>,
    shutdown: watch::Sender<bool>,
}

struct Inner {
    workers: RwLock<Vec<Arc<dyn Worker>>>,
    health: RwLock<HashMap<String, ServiceHealth>>,
    last_restart: RwLock<HashMap<String, DateTime<Local>>>,
    config: RwLock<WatchdogConfig>,
    started_at: DateTime<Local>,
    events: broadcast::Sender<WatchdogEvent>,
    check_lock: Mutex<()>,
}

#[derive(Clone)]
pub struct Watchdog {
    inner: Arc<Inner>,
    task: Arc<Mutex<Option<LoopHandle>>>,
}

impl Watchdog {
    pub fn new(config: WatchdogConfig) -> Self {
        let (events, _) = broadcast::channel(64);
        Self {
            inner: Arc::new(Inner {
                workers: RwLock::new(Vec::new()),
                health: RwLock::new(HashMap::new()),
                last_restart: RwLock::new(HashMap::new()),
                config: RwLock::new(config),
                started_at: Local::now(),
                events,
                check_lock: Mutex::new(()),
            }),
            task: Arc::new(Mutex::new(None)),
        }
    }

    pub async fn register(&self, worker: Arc<dyn Worker>) {
        let name = worker.name().to_string();
        self.inner
            .health
            .write()
            .await
            .insert(name.clone(), ServiceHealth::default());
        self.inner.workers.write().await.push(worker);
        debug!(worker = %name, "Worker registered");
    }

    pub fn subscribe(&self) -> broadcast::Receiver<WatchdogEvent> {
        self.inner.events.subscribe()
    }

    pub async fn config(&self) -> WatchdogConfig {
        self.inner.config.read().await.clone()
    }

    /// Start every registered worker, then the supervision loop.
    pub async fn start_all(&self) -> AppResult<()> {
        let workers = self.inner.workers.read().await.clone();
        for w in &workers {
            w.start().await?;
            self.set_status(w.name(), HealthStatus::Healthy).await;
        }
        self.start().await
    }

    /// Stop the loop, then every worker.
    pub async fn stop_all(&self) -> AppResult<()> {
        self.stop().await;
        let workers = self.inner.workers.read().await.clone();
        for w in &workers {
            if let Err(e) = w.stop().await {
                warn!(worker = %w.name(), error = %e, "Worker failed to stop cleanly");
            }
            self.set_status(w.name(), HealthStatus::Stopped).await;
        }
        Ok(())
    }

    /// Start the supervision loop. No-op when it already runs.
    pub async fn start(&self) -> AppResult<()> {
        let mut task = self.task.lock().await;
        if task.as_ref().is_some_and(|t| !t.handle.is_finished()) {
            return Ok(());
        }

        let every = self.inner.config.read().await.check_interval();
        let (tx, mut rx) = watch::channel(false);
        let this = self.clone();

        let handle = tokio::spawn(async move {
            let mut ticker = interval(every);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            // The first tick fires immediately; let workers settle first.
            ticker.tick().await;
            info!("Watchdog started (interval: {:?})", every);

            loop {
                tokio::select! {
                    _ = ticker.tick() => this.check_once().await,
                    changed = rx.changed() => {
                        if changed.is_err() || *rx.borrow() {
                            break;
                        }
                    }
                }
            }
            info!("Watchdog stopped");
        });

        *task = Some(LoopHandle {
            handle,
            shutdown: tx,
        });
        Ok(())
    }

    pub async fn stop(&self) {
        if let Some(t) = self.task.lock().await.take() {
            let _ = t.shutdown.send(true);
            let _ = t.handle.await;
        }
    }

    pub async fn is_running(&self) -> bool {
        self.task
            .lock()
            .await
            .as_ref()
            .is_some_and(|t| !t.handle.is_finished())
    }

    /// Replace the configuration and restart the loop so the new interval
    /// applies.
    pub async fn update_config(&self, config: WatchdogConfig) -> AppResult<()> {
        let was_running = self.is_running().await;
        self.stop().await;
        *self.inner.config.write().await = config;
        info!("Watchdog configuration reloaded");
        if was_running {
            self.start().await?;
        }
        Ok(())
    }

    /// One supervision pass over every worker. Never runs concurrently with
    /// itself.
    pub async fn check_once(&self) {
        let _pass = self.inner.check_lock.lock().await;
        let cfg = self.inner.config.read().await.clone();
        let workers = self.inner.workers.read().await.clone();
        let now = Local::now();

        for worker in workers {
            let name = worker.name().to_string();
            let activity = worker.last_activity();
            let verdict = self.evaluate(&*worker, activity, &cfg, now).await;

            let should_restart = {
                let mut health = self.inner.health.write().await;
                let h = health.entry(name.clone()).or_default();
                h.last_check = Some(now);
                h.last_activity = activity;

                match &verdict {
                    Ok(()) => {
                        if h.status != HealthStatus::Healthy {
                            info!(worker = %name, "Worker healthy again");
                            let _ = self
                                .inner
                                .events
                                .send(WatchdogEvent::Recovered { worker: name.clone() });
                        }
                        h.status = HealthStatus::Healthy;
                        h.consecutive_failures = 0;
                        false
                    }
                    Err(reason) => {
                        h.consecutive_failures += 1;
                        h.error_count += 1;
                        h.last_error = Some(reason.clone());
                        warn!(
                            worker = %name,
                            failures = h.consecutive_failures,
                            reason = %reason,
                            "Worker health check failed"
                        );
                        if h.consecutive_failures >= cfg.failure_threshold.max(1) {
                            h.status = HealthStatus::Unhealthy;
                            let _ = self.inner.events.send(WatchdogEvent::Unhealthy {
                                worker: name.clone(),
                                reason: reason.clone(),
                            });
                            true
                        } else {
                            false
                        }
                    }
                }
            };

            if should_restart {
                let _ = self.restart(&*worker, &cfg).await;
            }
        }
    }

    async fn evaluate(
        &self,
        worker: &dyn Worker,
        activity: Option<DateTime<Local>>,
        cfg: &WatchdogConfig,
        now: DateTime<Local>,
    ) -> Result<(), String> {
        if let Some(alive) = worker.liveness() {
            return if alive {
                Ok(())
            } else {
                Err("worker is not running".to_string())
            };
        }

        let baseline = match activity {
            Some(a) => a,
            None => {
                let restarted = self.inner.last_restart.read().await.get(worker.name()).copied();
                restarted.unwrap_or(self.inner.started_at)
            }
        };

        let timeout = cfg.timeout_for(worker.name());
        let idle = (now - baseline).to_std().unwrap_or_default();
        if idle > timeout {
            Err(format!(
                "no activity for {}s (timeout {}s)",
                idle.as_secs(),
                timeout.as_secs()
            ))
        } else {
            Ok(())
        }
    }

    async fn restart(&self, worker: &dyn Worker, cfg: &WatchdogConfig) -> AppResult<()> {
        let name = worker.name().to_string();
        self.set_status(&name, HealthStatus::Restarting).await;
        info!(worker = %name, "Restarting worker");

        let result = async {
            if let Err(e) = worker.stop().await {
                warn!(worker = %name, error = %e, "Stop before restart failed");
            }
            tokio::time::sleep(cfg.restart_delay()).await;
            worker.start().await
        }
        .await;

        let mut health = self.inner.health.write().await;
        let h = health.entry(name.clone()).or_default();
        match result {
            Ok(()) => {
                h.consecutive_failures = 0;
                self.inner
                    .last_restart
                    .write()
                    .await
                    .insert(name.clone(), Local::now());
                info!(worker = %name, "Worker restarted");
                let _ = self.inner.events.send(WatchdogEvent::Restarted { worker: name });
                Ok(())
            }
            Err(e) => {
                // A new attempt needs a fresh run of failed checks
                h.status = HealthStatus::Unhealthy;
                h.consecutive_failures = 0;
                h.error_count += 1;
                h.last_error = Some(e.to_string());
                error!(worker = %name, error = %e, "Worker restart failed");
                let _ = self.inner.events.send(WatchdogEvent::RestartFailed {
                    worker: name,
                    error: e.to_string(),
                });
                Err(e)
            }
        }
    }

    /// Operator-initiated restart of a named worker.
    pub async fn restart_worker(&self, name: &str) -> AppResult<()> {
        let worker = self
            .inner
            .workers
            .read()
            .await
            .iter()
            .find(|w| w.name() == name)
            .cloned()
            .ok_or_else(|| AppError::UnknownWorker(name.to_string()))?;

        let cfg = self.inner.config.read().await.clone();
        self.restart(&*worker, &cfg).await
    }

    async fn set_status(&self, name: &str, status: HealthStatus) {
        let mut health = self.inner.health.write().await;
        health.entry(name.to_string()).or_default().status = status;
    }

    pub async fn health_of(&self, name: &str) -> Option<ServiceHealth> {
        self.inner.health.read().await.get(name).cloned()
    }

    pub async fn status(&self) -> WatchdogStatus {
        let now = Local::now();
        let running = self.is_running().await;
        let health = self.inner.health.read().await;
        let restarts = self.inner.last_restart.read().await;
        let names: Vec<String> = self
            .inner
            .workers
            .read()
            .await
            .iter()
            .map(|w| w.name().to_string())
            .collect();

        let workers: Vec<WorkerReport> = names
            .into_iter()
            .map(|name| {
                let since = restarts.get(&name).copied().unwrap_or(self.inner.started_at);
                WorkerReport {
                    uptime_secs: (now - since).num_seconds().max(0),
                    health: health.get(&name).cloned().unwrap_or_default(),
                    name,
                }
            })
            .collect();

        WatchdogStatus {
            started_at: self.inner.started_at,
            running,
            total: workers.len(),
            healthy: workers
                .iter()
                .filter(|w| w.health.status == HealthStatus::Healthy)
                .count(),
            unhealthy: workers
                .iter()
                .filter(|w| w.health.status == HealthStatus::Unhealthy)
                .count(),
            workers,
        }
    }
}

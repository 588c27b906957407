use crate::errors::{AppError, AppResult};
use crate::models::gap::Severity;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::env;
use std::fs;
use std::io::Write;
use std::path::PathBuf;
use std::time::Duration;

pub const ENV_GATEWAY_USERNAME: &str = "RBIOSYNC_GATEWAY_USERNAME";
pub const ENV_GATEWAY_PASSWORD: &str = "RBIOSYNC_GATEWAY_PASSWORD";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub database: String,
    #[serde(default)]
    pub gateway: GatewayConfig,
    #[serde(default)]
    pub puller: PullerConfig,
    #[serde(default)]
    pub stitcher: StitcherConfig,
    #[serde(default)]
    pub gap_detector: GapDetectorConfig,
    #[serde(default)]
    pub watchdog: WatchdogConfig,
    #[serde(default)]
    pub admin: AdminConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GatewayConfig {
    pub base_url: String,
    pub username: Option<String>,
    pub password: Option<String>,
    pub page_size: u32,
    pub timeout_secs: u64,
    /// Regexes over the terminal alias. Matching terminals are access-control
    /// devices whose punches never reach attendance.
    pub excluded_terminal_patterns: Vec<String>,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            base_url: "http://127.0.0.1:8081".to_string(),
            username: None,
            password: None,
            page_size: 100,
            timeout_secs: 30,
            excluded_terminal_patterns: vec![
                "(?i)lock".to_string(),
                "(?i)door".to_string(),
                "(?i)access".to_string(),
            ],
        }
    }
}

impl GatewayConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs.max(1))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PullerConfig {
    pub interval_secs: u64,
    pub first_run_lookback_hours: i64,
    /// Distance kept from "now" so we do not race the gateway's own commits.
    pub commit_buffer_secs: i64,
    pub max_pages_per_run: u32,
}

impl Default for PullerConfig {
    fn default() -> Self {
        Self {
            interval_secs: 300,
            first_run_lookback_hours: 24,
            commit_buffer_secs: 60,
            max_pages_per_run: 50,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StitcherConfig {
    pub interval_secs: u64,
    pub grace_minutes: i64,
    pub max_hours: f64,
    /// Insert `absent` rows for shift-assigned employees on the previous day.
    pub finalize_previous_day: bool,
}

impl Default for StitcherConfig {
    fn default() -> Self {
        Self {
            interval_secs: 600,
            grace_minutes: 15,
            max_hours: 12.0,
            finalize_previous_day: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct SeverityThresholds {
    pub critical_pct: f64,
    pub critical_count: u64,
    pub high_pct: f64,
    pub high_count: u64,
    pub medium_pct: f64,
    pub medium_count: u64,
}

impl Default for SeverityThresholds {
    fn default() -> Self {
        Self {
            critical_pct: 50.0,
            critical_count: 100,
            high_pct: 25.0,
            high_count: 50,
            medium_pct: 10.0,
            medium_count: 20,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct GapDetectorConfig {
    pub interval_secs: u64,
    pub windows_hours: Vec<u32>,
    pub thresholds: SeverityThresholds,
    /// Worst gap severity from which the puller is redirected.
    pub recovery_min_severity: Severity,
    pub normal_window_minutes: i64,
    pub end_buffer_minutes: i64,
    pub buffer_minutes_per_hour: i64,
    pub max_buffer_minutes: i64,
    pub fallback_window_minutes: i64,
}

impl Default for GapDetectorConfig {
    fn default() -> Self {
        Self {
            interval_secs: 900,
            windows_hours: vec![1, 3, 6, 12, 24],
            thresholds: SeverityThresholds::default(),
            recovery_min_severity: Severity::High,
            normal_window_minutes: 7,
            end_buffer_minutes: 1,
            buffer_minutes_per_hour: 5,
            max_buffer_minutes: 30,
            fallback_window_minutes: 30,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct WatchdogConfig {
    pub check_interval_secs: u64,
    pub failure_threshold: u32,
    pub restart_delay_secs: u64,
    pub default_timeout_secs: u64,
    /// Per-worker activity timeout, keyed by worker name.
    pub service_timeouts: HashMap<String, u64>,
}

impl Default for WatchdogConfig {
    fn default() -> Self {
        let mut service_timeouts = HashMap::new();
        service_timeouts.insert("puller".to_string(), 15 * 60);
        service_timeouts.insert("stitcher".to_string(), 30 * 60);
        service_timeouts.insert("gap_detector".to_string(), 2 * 60 * 60);
        Self {
            check_interval_secs: 60,
            failure_threshold: 3,
            restart_delay_secs: 5,
            default_timeout_secs: 10 * 60,
            service_timeouts,
        }
    }
}

impl WatchdogConfig {
    pub fn check_interval(&self) -> Duration {
        Duration::from_secs(self.check_interval_secs.max(1))
    }

    pub fn restart_delay(&self) -> Duration {
        Duration::from_secs(self.restart_delay_secs)
    }

    pub fn timeout_for(&self, worker: &str) -> Duration {
        let secs = self
            .service_timeouts
            .get(worker)
            .copied()
            .unwrap_or(self.default_timeout_secs);
        Duration::from_secs(secs)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AdminConfig {
    pub bind: String,
    pub manual_sync_limit: usize,
    pub manual_sync_window_secs: u64,
}

impl Default for AdminConfig {
    fn default() -> Self {
        Self {
            bind: "127.0.0.1:8787".to_string(),
            manual_sync_limit: 5,
            manual_sync_window_secs: 60,
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            database: Self::database_file().to_string_lossy().to_string(),
            gateway: GatewayConfig::default(),
            puller: PullerConfig::default(),
            stitcher: StitcherConfig::default(),
            gap_detector: GapDetectorConfig::default(),
            watchdog: WatchdogConfig::default(),
            admin: AdminConfig::default(),
        }
    }
}

impl Config {
    /// Return the standard configuration directory depending on the platform
    pub fn config_dir() -> PathBuf {
        if cfg!(target_os = "windows") {
            let appdata = env::var("APPDATA").unwrap_or_else(|_| ".".to_string());
            PathBuf::from(appdata).join("rbiosync")
        } else {
            dirs::home_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join(".rbiosync")
        }
    }

    /// Return the full path of the config file
    pub fn config_file() -> PathBuf {
        Self::config_dir().join("rbiosync.conf")
    }

    /// Return the full path of the SQLite database
    pub fn database_file() -> PathBuf {
        Self::config_dir().join("rbiosync.sqlite")
    }

    /// Load configuration from file, or return defaults if not found.
    /// Credentials from the environment win over the file.
    pub fn load() -> AppResult<Self> {
        let path = Self::config_file();

        let mut cfg = if path.exists() {
            let content = fs::read_to_string(&path).map_err(|_| AppError::ConfigLoad)?;
            Self::from_yaml(&content)?
        } else {
            Config::default()
        };

        cfg.apply_env();
        Ok(cfg)
    }

    pub fn from_yaml(content: &str) -> AppResult<Self> {
        let cfg: Config = serde_yaml::from_str(content)?;
        Ok(cfg)
    }

    fn apply_env(&mut self) {
        if let Ok(user) = env::var(ENV_GATEWAY_USERNAME)
            && !user.trim().is_empty()
        {
            self.gateway.username = Some(user);
        }
        if let Ok(pass) = env::var(ENV_GATEWAY_PASSWORD)
            && !pass.is_empty()
        {
            self.gateway.password = Some(pass);
        }
    }

    /// Initialize configuration and database files
    pub fn init_all(custom_db: Option<String>, is_test: bool) -> AppResult<PathBuf> {
        let dir = Self::config_dir();
        fs::create_dir_all(&dir)?;

        // DB name: user provided or default
        let db_path = if let Some(name) = custom_db {
            let p = std::path::Path::new(&name);
            if p.is_absolute() {
                p.to_path_buf()
            } else {
                dir.join(p)
            }
        } else {
            dir.join("rbiosync.sqlite")
        };

        let config = Config {
            database: db_path.to_string_lossy().to_string(),
            ..Config::default()
        };

        // Write config file
        if !is_test {
            let yaml = serde_yaml::to_string(&config)?;
            let mut file = fs::File::create(Self::config_file()).map_err(|_| AppError::ConfigSave)?;
            file.write_all(yaml.as_bytes())
                .map_err(|_| AppError::ConfigSave)?;
        }

        Ok(db_path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_yaml_falls_back_to_defaults() {
        let yaml = r#"
database: /tmp/x.sqlite
gateway:
  base_url: http://bio.local
  page_size: 50
watchdog:
  failure_threshold: 5
"#;
        let cfg = Config::from_yaml(yaml).unwrap();
        assert_eq!(cfg.gateway.base_url, "http://bio.local");
        assert_eq!(cfg.gateway.page_size, 50);
        assert_eq!(cfg.gateway.timeout_secs, 30);
        assert_eq!(cfg.watchdog.failure_threshold, 5);
        assert_eq!(cfg.watchdog.check_interval_secs, 60);
        assert_eq!(cfg.gap_detector.windows_hours, vec![1, 3, 6, 12, 24]);
        assert_eq!(cfg.stitcher.grace_minutes, 15);
    }

    #[test]
    fn unknown_worker_uses_default_timeout() {
        let cfg = WatchdogConfig::default();
        assert_eq!(cfg.timeout_for("puller"), Duration::from_secs(900));
        assert_eq!(cfg.timeout_for("something"), Duration::from_secs(600));
    }

    #[test]
    fn thresholds_are_overridable() {
        let yaml = r#"
database: db.sqlite
gap_detector:
  thresholds:
    critical_pct: 80.0
  recovery_min_severity: critical
"#;
        let cfg = Config::from_yaml(yaml).unwrap();
        assert_eq!(cfg.gap_detector.thresholds.critical_pct, 80.0);
        assert_eq!(cfg.gap_detector.thresholds.high_pct, 25.0);
        assert_eq!(cfg.gap_detector.recovery_min_severity, Severity::Critical);
    }
}

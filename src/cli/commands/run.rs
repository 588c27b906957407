use crate::config::Config;
use crate::daemon;
use crate::errors::AppResult;

/// Handle the `run` command: serve until Ctrl-C.
pub async fn handle(cfg: &Config) -> AppResult<()> {
    daemon::run(cfg.clone()).await
}

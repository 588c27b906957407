use crate::cli::parser::Commands;
use crate::config::Config;
use crate::db::initialize::open;
use crate::errors::AppResult;
use crate::export::export_attendance;
use crate::utils::date::resolve_period;
use crate::utils::path::expand_tilde;

pub fn handle(cmd: &Commands, cfg: &Config) -> AppResult<()> {
    if let Commands::Export {
        format,
        file,
        range,
        force,
    } = cmd
    {
        let (from, to) = resolve_period(range.as_deref())?;
        let pool = open(&cfg.database)?;
        export_attendance(&pool, *format, &expand_tilde(file), from, to, *force)?;
    }
    Ok(())
}

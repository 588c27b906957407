use crate::cli::parser::Commands;
use crate::config::Config;
use crate::core::stitcher::{StitchRules, Stitcher};
use crate::db::initialize::open;
use crate::errors::AppResult;
use crate::ui::messages::success;
use crate::utils::date::parse_date;

pub fn handle(cmd: &Commands, cfg: &Config) -> AppResult<()> {
    if let Commands::Finalize { date } = cmd {
        let date = parse_date(date)?;
        let pool = open(&cfg.database)?;
        let stitcher = Stitcher::new(pool, StitchRules::from(&cfg.stitcher));
        let n = stitcher.finalize_day(date)?;
        success(format!("{date}: {n} employee(s) marked absent"));
    }
    Ok(())
}

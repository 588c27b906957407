use crate::cli::parser::Commands;
use crate::config::Config;
use crate::db::initialize::open;
use crate::db::log::load_log;
use crate::errors::AppResult;
use crate::ui::messages::{header, info};
use crate::utils::table::{Column, Table};

pub fn handle(cmd: &Commands, cfg: &Config) -> AppResult<()> {
    let Commands::Log { print: true, limit } = cmd else {
        return Ok(());
    };

    let pool = open(&cfg.database)?;
    let rows = pool.with_conn(|conn| load_log(conn, *limit))?;
    if rows.is_empty() {
        info("The internal log is empty.");
        return Ok(());
    }

    header("Internal log");
    let mut table = Table::new(vec![
        Column::new("ID", 5),
        Column::new("DATE", 25),
        Column::new("OPERATION", 24),
        Column::new("TARGET", 30),
        Column::new("MESSAGE", 0),
    ]);
    for r in rows {
        table.add_row(vec![
            r.id.to_string(),
            r.date,
            r.operation,
            r.target,
            r.message,
        ]);
    }
    print!("{}", table.render());
    Ok(())
}

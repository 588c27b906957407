use crate::cli::parser::Commands;
use crate::config::Config;
use crate::db::initialize::open;
use crate::db::queries::list_attendance;
use crate::errors::AppResult;
use crate::ui::messages::{header, info};
use crate::utils::colors::{color_for_status, colorize_optional, paint};
use crate::utils::date::resolve_period;
use crate::utils::table::{Column, Table};
use crate::utils::time::{hhmm, hours2readable};

/// Handle the `list` command
pub fn handle(cmd: &Commands, cfg: &Config) -> AppResult<()> {
    let Commands::List { period, employee } = cmd else {
        return Ok(());
    };

    let (from, to) = resolve_period(period.as_deref())?;
    let pool = open(&cfg.database)?;
    let records = pool.with_conn(|conn| list_attendance(conn, &from, &to, employee.as_deref()))?;

    if records.is_empty() {
        info(format!("No attendance records between {from} and {to}."));
        return Ok(());
    }

    header(format!("Attendance {from} → {to}"));
    let mut table = Table::new(vec![
        Column::new("DATE", 11),
        Column::new("EMPLOYEE", 10),
        Column::new("IN", 6),
        Column::new("OUT", 6),
        Column::new("WORKED", 8),
        Column::new("STATUS", 0),
    ]);

    let mut total = 0.0;
    for r in &records {
        total += r.hours_worked;
        table.add_row(vec![
            r.date_str(),
            r.employee_code.clone(),
            colorize_optional(&hhmm(r.check_in.as_ref())),
            colorize_optional(&hhmm(r.check_out.as_ref())),
            colorize_optional(&hours2readable(r.hours_worked)),
            paint(r.status.to_db_str(), color_for_status(r.status)),
        ]);
    }
    print!("{}", table.render());
    println!(
        "\n{} record(s), {} worked in total",
        records.len(),
        hours2readable(total)
    );
    Ok(())
}

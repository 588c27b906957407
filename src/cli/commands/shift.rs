use crate::cli::parser::Commands;
use crate::config::Config;
use crate::db::initialize::open;
use crate::db::log::oplog;
use crate::db::queries::{list_shifts, upsert_shift};
use crate::errors::{AppError, AppResult};
use crate::models::attendance::EmployeeShift;
use crate::ui::messages::{info, success};
use crate::utils::table::{Column, Table};
use crate::utils::time::parse_time;

/// Handle the `shift` command: assign or list shifts.
pub fn handle(cmd: &Commands, cfg: &Config) -> AppResult<()> {
    let Commands::Shift {
        employee,
        start,
        end,
        list,
    } = cmd
    else {
        return Ok(());
    };

    let pool = open(&cfg.database)?;

    if *list {
        let shifts = pool.with_conn(|conn| list_shifts(conn))?;
        if shifts.is_empty() {
            info("No shifts assigned.");
            return Ok(());
        }
        let mut table = Table::new(vec![
            Column::new("EMPLOYEE", 12),
            Column::new("START", 7),
            Column::new("END", 0),
        ]);
        for s in shifts {
            table.add_row(vec![
                s.employee_code,
                s.shift_start.format("%H:%M").to_string(),
                s.shift_end.format("%H:%M").to_string(),
            ]);
        }
        print!("{}", table.render());
        return Ok(());
    }

    let (Some(employee), Some(start), Some(end)) = (employee, start, end) else {
        return Err(AppError::Other(
            "--employee, --start and --end are required together".into(),
        ));
    };

    let shift = EmployeeShift {
        employee_code: employee.trim().to_string(),
        shift_start: parse_time(start)?,
        shift_end: parse_time(end)?,
    };

    pool.with_conn(|conn| {
        upsert_shift(conn, &shift)?;
        oplog(
            conn,
            "shift",
            &shift.employee_code,
            &format!("{} - {}", start, end),
        )
    })?;

    success(format!(
        "Shift {start} - {end} assigned to {}",
        shift.employee_code
    ));
    Ok(())
}

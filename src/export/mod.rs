// src/export/mod.rs

mod csv;
mod fs_utils;
mod json;
mod model;

pub use model::AttendanceExport;

use crate::db::pool::DbPool;
use crate::db::queries::list_attendance;
use crate::errors::{AppError, AppResult};
use crate::ui::messages::{success, warning};
use chrono::NaiveDate;
use clap::ValueEnum;
use std::path::Path;

#[derive(Clone, Copy, Debug, ValueEnum)]
pub enum ExportFormat {
    Csv,
    Json,
}

impl ExportFormat {
    pub fn as_str(&self) -> &'static str {
        match self {
            ExportFormat::Csv => "csv",
            ExportFormat::Json => "json",
        }
    }
}

/// Write the attendance records of `[from, to]` to `path`.
/// Returns the number of exported rows.
pub fn export_attendance(
    pool: &DbPool,
    format: ExportFormat,
    path: &Path,
    from: NaiveDate,
    to: NaiveDate,
    force: bool,
) -> AppResult<usize> {
    if !path.is_absolute() {
        return Err(AppError::Export(format!(
            "Output file path must be absolute: {}",
            path.display()
        )));
    }
    fs_utils::ensure_writable(path, force)?;

    let rows: Vec<AttendanceExport> = pool
        .with_conn(|conn| list_attendance(conn, &from, &to, None))?
        .iter()
        .map(AttendanceExport::from)
        .collect();

    if rows.is_empty() {
        warning(format!("No attendance records between {from} and {to}."));
        return Ok(0);
    }

    match format {
        ExportFormat::Csv => csv::write_csv(path, &rows)?,
        ExportFormat::Json => json::write_json(path, &rows)?,
    }

    success(format!(
        "{} export completed: {} ({} rows)",
        format.as_str().to_uppercase(),
        path.display(),
        rows.len()
    ));
    Ok(rows.len())
}

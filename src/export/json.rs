use super::model::AttendanceExport;
use crate::errors::AppResult;
use std::path::Path;

pub fn write_json(path: &Path, rows: &[AttendanceExport]) -> AppResult<()> {
    let json = serde_json::to_string_pretty(rows)?;
    std::fs::write(path, json)?;
    Ok(())
}

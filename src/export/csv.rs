use super::model::AttendanceExport;
use crate::errors::AppResult;
use std::path::Path;

/// Write attendance rows as CSV with a header line.
pub fn write_csv(path: &Path, rows: &[AttendanceExport]) -> AppResult<()> {
    let mut wtr = ::csv::Writer::from_path(path)?;
    for row in rows {
        wtr.serialize(row)?;
    }
    wtr.flush()?;
    Ok(())
}

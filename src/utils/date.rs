use crate::errors::{AppError, AppResult};
use chrono::{Datelike, NaiveDate};

pub fn today() -> NaiveDate {
    chrono::Local::now().date_naive()
}

pub fn parse_date(s: &str) -> AppResult<NaiveDate> {
    NaiveDate::parse_from_str(s.trim(), "%Y-%m-%d").map_err(|_| AppError::InvalidDate(s.to_string()))
}

/// Bounds of a single period: `YYYY`, `YYYY-MM` or `YYYY-MM-DD`.
fn period_bounds(p: &str) -> AppResult<(NaiveDate, NaiveDate)> {
    let p = p.trim();
    let invalid = || AppError::InvalidDate(format!("Invalid period: {p}"));

    match p.len() {
        // YYYY
        4 => {
            let y: i32 = p.parse().map_err(|_| invalid())?;
            let first = NaiveDate::from_ymd_opt(y, 1, 1).ok_or_else(invalid)?;
            let last = NaiveDate::from_ymd_opt(y, 12, 31).ok_or_else(invalid)?;
            Ok((first, last))
        }
        // YYYY-MM
        7 => {
            let first = NaiveDate::parse_from_str(&format!("{p}-01"), "%Y-%m-%d")
                .map_err(|_| invalid())?;
            Ok((first, last_day_of_month(first)))
        }
        // YYYY-MM-DD
        10 => {
            let d = parse_date(p)?;
            Ok((d, d))
        }
        _ => Err(invalid()),
    }
}

/// Resolve `--period` / `--range` into inclusive date bounds.
///
/// Accepts `YYYY`, `YYYY-MM`, `YYYY-MM-DD` or `START:END` with any of those
/// on each side. No period means the current month.
pub fn resolve_period(period: Option<&str>) -> AppResult<(NaiveDate, NaiveDate)> {
    let Some(p) = period else {
        let t = today();
        let first = t.with_day(1).unwrap_or(t);
        return Ok((first, last_day_of_month(first)));
    };

    let (from, to) = match p.split_once(':') {
        Some((start, end)) => (period_bounds(start)?.0, period_bounds(end)?.1),
        None => period_bounds(p)?,
    };

    if from > to {
        return Err(AppError::InvalidDate(format!("{p}: start is after end")));
    }
    Ok((from, to))
}

pub fn last_day_of_month(d: NaiveDate) -> NaiveDate {
    let (y, m) = if d.month() == 12 {
        (d.year() + 1, 1)
    } else {
        (d.year(), d.month() + 1)
    };
    NaiveDate::from_ymd_opt(y, m, 1)
        .and_then(|n| n.pred_opt())
        .unwrap_or(d)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    #[test]
    fn single_periods() {
        assert_eq!(resolve_period(Some("2025")).unwrap(), (d(2025, 1, 1), d(2025, 12, 31)));
        assert_eq!(resolve_period(Some("2024-02")).unwrap(), (d(2024, 2, 1), d(2024, 2, 29)));
        assert_eq!(resolve_period(Some("2025-01-10")).unwrap(), (d(2025, 1, 10), d(2025, 1, 10)));
    }

    #[test]
    fn ranges() {
        assert_eq!(
            resolve_period(Some("2025-01:2025-03")).unwrap(),
            (d(2025, 1, 1), d(2025, 3, 31))
        );
        assert_eq!(
            resolve_period(Some("2025-01-10:2025-01-12")).unwrap(),
            (d(2025, 1, 10), d(2025, 1, 12))
        );
        assert!(resolve_period(Some("2025-03:2025-01")).is_err());
    }

    #[test]
    fn garbage_is_rejected() {
        assert!(matches!(resolve_period(Some("jan")), Err(AppError::InvalidDate(_))));
        assert!(resolve_period(Some("2025-13")).is_err());
    }
}

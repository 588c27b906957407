//! ANSI color helper utilities for terminal output.

use crate::models::attendance::AttendanceStatus;
use crate::models::gap::Severity;
use crate::models::health::HealthStatus;

pub const RESET: &str = "\x1b[0m";

pub const GREY: &str = "\x1b[90m";
pub const RED: &str = "\x1b[31m";
pub const GREEN: &str = "\x1b[32m";
pub const YELLOW: &str = "\x1b[33m";
pub const MAGENTA: &str = "\x1b[35m";
pub const CYAN: &str = "\x1b[36m";

pub fn color_for_status(status: AttendanceStatus) -> &'static str {
    match status {
        AttendanceStatus::Present => GREEN,
        AttendanceStatus::Late => YELLOW,
        AttendanceStatus::Incomplete => CYAN,
        AttendanceStatus::Absent => RED,
    }
}

pub fn color_for_severity(severity: Severity) -> &'static str {
    match severity {
        Severity::Low => GREY,
        Severity::Medium => YELLOW,
        Severity::High => MAGENTA,
        Severity::Critical => RED,
    }
}

pub fn color_for_health(status: HealthStatus) -> &'static str {
    match status {
        HealthStatus::Healthy => GREEN,
        HealthStatus::Restarting => YELLOW,
        HealthStatus::Unhealthy => RED,
        HealthStatus::Stopped => GREY,
    }
}

/// Grey for empty placeholders ("", "--:--", "00h 00m").
pub fn colorize_optional(value: &str) -> String {
    let v = value.trim();
    if v.is_empty() || v == "--:--" || v == "00h 00m" {
        format!("{GREY}{value}{RESET}")
    } else {
        value.to_string()
    }
}

pub fn paint(value: &str, color: &str) -> String {
    format!("{color}{value}{RESET}")
}

use chrono::{NaiveDate, NaiveDateTime};

/// Placeholder shown for any display field the record did not carry.
pub const MISSING: &str = "-";

/// Rounds to `places` decimals, halves away from zero.
///
/// A tiny nudge keeps values such as `2.675` (stored as `2.67499..`) on the commercial side.
pub fn round_half_up(value: f64, places: u32) -> f64 {
    if !value.is_finite() {
        return 0.0;
    }
    let factor = 10f64.powi(places as i32);
    let nudged = value * factor + value.signum() * 1e-7;
    let rounded = nudged.round() / factor;
    if rounded == 0.0 {
        0.0
    } else {
        rounded
    }
}

pub fn format_qtls(value: f64) -> String {
    format!("{:.2}", round_half_up(value, 2))
}

pub fn format_percent(value: f64) -> String {
    format!("{:.2}", round_half_up(value, 2))
}

/// Quintals compared at display precision.
pub fn qtls_eq(a: f64, b: f64) -> bool {
    format_qtls(a) == format_qtls(b)
}

/// Hard cut at `max_chars` characters, no ellipsis.
pub fn truncate_chars(text: &str, max_chars: usize) -> String {
    text.chars().take(max_chars).collect()
}

/// Trims, collapses inner whitespace and upper-cases a code so that grouping keys that differ
/// only in case or spacing compare equal.
pub fn normalize_code(raw: &str) -> String {
    raw.split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_uppercase()
}

/// Like [`normalize_code`] but yields `None` for blank input.
pub fn normalize_optional_code(raw: Option<&str>) -> Option<String> {
    raw.map(normalize_code).filter(|s| !s.is_empty())
}

pub fn parse_movement_date(raw: &str) -> Option<NaiveDate> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return None;
    }

    for format in ["%Y-%m-%d", "%d-%m-%Y", "%d/%m/%Y", "%Y/%m/%d"] {
        if let Ok(date) = NaiveDate::parse_from_str(trimmed, format) {
            return Some(date);
        }
    }

    // ISO date-times such as "2024-04-01T10:15:00.000Z"
    trimmed
        .get(..10)
        .and_then(|prefix| NaiveDate::parse_from_str(prefix, "%Y-%m-%d").ok())
}

pub fn format_display_date(date: NaiveDate) -> String {
    date.format("%d-%m-%Y").to_string()
}

pub fn filename_timestamp(at: NaiveDateTime) -> String {
    at.format("%Y%m%d_%H%M%S").to_string()
}

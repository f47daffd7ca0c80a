use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use tracing::info;

use crate::mix::ingest::parse_timestamp;
use crate::mix::{MixError, TimeSeriesStore, TimestepRecord};

const DAY_MS: f64 = 86_400_000.0;

/// Window presets offered to the user
pub const DURATION_OPTIONS: [(u32, &str); 8] = [
    (1, "1 day"),
    (3, "3 days"),
    (7, "1 week"),
    (14, "2 weeks"),
    (30, "1 month (30 days)"),
    (42, "6 weeks"),
    (60, "2 months (60 days)"),
    (90, "3 months (90 days)"),
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Bound {
    Minimum,
    Maximum,
}

/// A non-fatal adjustment applied to the requested window
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum PeriodWarning {
    StartClamped { bound: Bound, date: DateTime<Utc> },
    EndClamped { days: i64 },
}

impl std::fmt::Display for PeriodWarning {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PeriodWarning::StartClamped { bound, date } => {
                let which = match bound {
                    Bound::Minimum => "minimum",
                    Bound::Maximum => "maximum",
                };
                write!(
                    f,
                    "Start date adjusted to {which}: {}",
                    date.format("%Y-%m-%d")
                )
            }
            PeriodWarning::EndClamped { days } => write!(
                f,
                "Window extends beyond available data. Limited to {days} days."
            ),
        }
    }
}

/// The contiguous window that feeds the scenarios
#[derive(Debug, Clone)]
pub struct PeriodSelection<'a> {
    pub records: &'a [TimestepRecord],
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub warnings: Vec<PeriodWarning>,
}

impl PeriodSelection<'_> {
    /// Rounded day count for display, at least 1
    pub fn analyzed_days(&self) -> i64 {
        span_days(self.start, self.end).max(1)
    }
}

fn span_days(start: DateTime<Utc>, end: DateTime<Utc>) -> i64 {
    ((end - start).num_milliseconds() as f64 / DAY_MS).round() as i64
}

/// Non-positive or non-finite durations fall back to a single day
pub fn normalize_duration(duration_days: f64) -> f64 {
    if duration_days.is_finite() && duration_days > 0.0 {
        duration_days
    } else {
        1.0
    }
}

/// Parse the user-supplied start date; missing or blank input is an error too
pub fn parse_start_date(raw: Option<&str>) -> Result<DateTime<Utc>, MixError> {
    let raw = raw.map(str::trim).unwrap_or("");
    if raw.is_empty() {
        return Err(MixError::InvalidDate("please select a start date".to_string()));
    }
    parse_timestamp(raw).ok_or_else(|| MixError::InvalidDate(raw.to_string()))
}

/// Clamp `[start, start + duration_days]` into the store's range and slice it
pub fn select(
    store: &TimeSeriesStore,
    start: DateTime<Utc>,
    duration_days: f64,
) -> Result<PeriodSelection<'_>, MixError> {
    let (Some(min), Some(max)) = (store.min_timestamp(), store.max_timestamp()) else {
        return Err(MixError::EmptyPeriod);
    };

    let mut warnings = Vec::new();

    let effective_start = if start < min {
        warnings.push(PeriodWarning::StartClamped {
            bound: Bound::Minimum,
            date: min,
        });
        min
    } else if start > max {
        warnings.push(PeriodWarning::StartClamped {
            bound: Bound::Maximum,
            date: max,
        });
        max
    } else {
        start
    };

    let span = Duration::milliseconds((normalize_duration(duration_days) * DAY_MS).round() as i64);
    let effective_end = match effective_start.checked_add_signed(span) {
        Some(end) if end <= max => end,
        _ => {
            warnings.push(PeriodWarning::EndClamped {
                days: span_days(effective_start, max).max(1),
            });
            max
        }
    };

    for warning in &warnings {
        info!(%warning, "period clamped");
    }

    let records = store.between(effective_start, effective_end);
    if records.is_empty() {
        return Err(MixError::EmptyPeriod);
    }

    Ok(PeriodSelection {
        records,
        start: effective_start,
        end: effective_end,
        warnings,
    })
}

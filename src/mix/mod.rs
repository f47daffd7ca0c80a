pub(crate) mod compare;
pub(crate) mod ingest;
pub(crate) mod period;
pub(crate) mod scenario;
pub(crate) mod sources;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum MixError {
    #[error("HTTP request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("CSV parsing failed: {0}")]
    Csv(#[from] csv::Error),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Missing column: {0}")]
    MissingColumn(String),
    #[error("Invalid date: {0}")]
    InvalidDate(String),
    #[error("Nuclear share must be within 0..=100 percent, got {0}")]
    InvalidShare(f64),
    #[error("Invalid capacity factor profile: {0}")]
    InvalidProfile(String),
    #[error("Data source contains no usable records")]
    NoRecords,
    #[error("No data available for the selected period")]
    EmptyPeriod,
}

/// Generation technologies modelled by the scenarios
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Source {
    Nuclear,
    WindOffshore,
    WindOnshore,
    Solar,
}

impl Source {
    /// Stacking order used for installed capacity and charts
    pub const ALL: [Source; 4] = [
        Source::Nuclear,
        Source::WindOffshore,
        Source::WindOnshore,
        Source::Solar,
    ];

    pub fn is_renewable(self) -> bool {
        !matches!(self, Source::Nuclear)
    }
}

/// One value per generation source (GW for capacities, fraction for capacity factors)
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct SourceValues {
    pub nuclear: f64,
    pub wind_offshore: f64,
    pub wind_onshore: f64,
    pub solar: f64,
}

impl SourceValues {
    pub fn get(&self, source: Source) -> f64 {
        match source {
            Source::Nuclear => self.nuclear,
            Source::WindOffshore => self.wind_offshore,
            Source::WindOnshore => self.wind_onshore,
            Source::Solar => self.solar,
        }
    }

    pub fn set(&mut self, source: Source, value: f64) {
        match source {
            Source::Nuclear => self.nuclear = value,
            Source::WindOffshore => self.wind_offshore = value,
            Source::WindOnshore => self.wind_onshore = value,
            Source::Solar => self.solar = value,
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (Source, f64)> + '_ {
        Source::ALL.into_iter().map(|s| (s, self.get(s)))
    }

    pub fn total(&self) -> f64 {
        self.iter().map(|(_, v)| v).sum()
    }
}

/// Nameplate capacity per source, in GW
pub type InstalledCapacity = SourceValues;

/// One row of the hourly input series
#[derive(Debug, Clone, PartialEq)]
pub struct TimestepRecord {
    pub timestamp: DateTime<Utc>,
    pub capacity_factors: SourceValues,
    pub load: f64,
}

/// Mean annual capacity factors of the renewables.
///
/// Only the ratio between the three values matters to the sizing: it fixes the
/// shape of the renewable build-out while demand decides its scale.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CapacityFactorProfile {
    pub solar: f64,
    pub wind_onshore: f64,
    pub wind_offshore: f64,
}

impl Default for CapacityFactorProfile {
    fn default() -> Self {
        Self {
            solar: 0.6416666666666667,
            wind_onshore: 0.24166666666666667,
            wind_offshore: 0.11666666666666667,
        }
    }
}

impl CapacityFactorProfile {
    #[cfg(test)]
    pub fn new(solar: f64, wind_onshore: f64, wind_offshore: f64) -> Result<Self, MixError> {
        let profile = Self {
            solar,
            wind_onshore,
            wind_offshore,
        };
        profile.validate()?;
        Ok(profile)
    }

    /// Each entry has to lie in (0, 1]
    pub fn validate(&self) -> Result<(), MixError> {
        for (name, value) in [
            ("solar", self.solar),
            ("wind_onshore", self.wind_onshore),
            ("wind_offshore", self.wind_offshore),
        ] {
            if !(value > 0.0 && value <= 1.0) {
                return Err(MixError::InvalidProfile(format!(
                    "{name} = {value} is outside (0, 1]"
                )));
            }
        }
        Ok(())
    }

    /// Mix ratio of a source; nuclear is sized separately and has none
    pub fn ratio(&self, source: Source) -> f64 {
        match source {
            Source::Solar => self.solar,
            Source::WindOnshore => self.wind_onshore,
            Source::WindOffshore => self.wind_offshore,
            Source::Nuclear => 0.0,
        }
    }
}

/// Chronologically sorted, read-only series handed out by ingestion
#[derive(Debug, Clone, Default)]
pub struct TimeSeriesStore {
    records: Vec<TimestepRecord>,
}

impl TimeSeriesStore {
    /// Sorts by timestamp. The sort is stable so duplicates keep their input order.
    pub fn from_records(mut records: Vec<TimestepRecord>) -> Self {
        records.sort_by_key(|r| r.timestamp);
        Self { records }
    }

    #[cfg(test)]
    pub fn records(&self) -> &[TimestepRecord] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn min_timestamp(&self) -> Option<DateTime<Utc>> {
        self.records.first().map(|r| r.timestamp)
    }

    pub fn max_timestamp(&self) -> Option<DateTime<Utc>> {
        self.records.last().map(|r| r.timestamp)
    }

    /// All records with `start <= timestamp <= end`, in store order
    pub fn between(&self, start: DateTime<Utc>, end: DateTime<Utc>) -> &[TimestepRecord] {
        let lo = self.records.partition_point(|r| r.timestamp < start);
        let hi = self.records.partition_point(|r| r.timestamp <= end);
        if lo >= hi {
            return &[];
        }
        &self.records[lo..hi]
    }
}

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{info, warn};

use crate::mix::period::{self, PeriodSelection};
use crate::mix::scenario::{ScenarioEngine, ScenarioResult};
use crate::mix::{MixError, TimeSeriesStore, TimestepRecord};

/// Differences below this count as a tie
pub const TIE_EPSILON: f64 = 1e-9;

/// Which of two scenarios has the larger value of a metric
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Dominance {
    First,
    Second,
    Tie,
    /// A value is not finite, nothing to highlight
    Undecided,
}

pub fn dominance(first: f64, second: f64) -> Dominance {
    if !first.is_finite() || !second.is_finite() {
        return Dominance::Undecided;
    }
    if (first - second).abs() < TIE_EPSILON {
        Dominance::Tie
    } else if first > second {
        Dominance::First
    } else {
        Dominance::Second
    }
}

/// Two scenarios over the same period and the metric highlights between them
#[derive(Debug, Clone, Serialize)]
pub struct Comparison {
    pub first: ScenarioResult,
    pub second: ScenarioResult,
    pub battery_capacity: Dominance,
    pub storage_requirement: Dominance,
}

impl Comparison {
    pub fn new(first: ScenarioResult, second: ScenarioResult) -> Self {
        Self {
            battery_capacity: dominance(first.battery_capacity, second.battery_capacity),
            storage_requirement: dominance(first.storage_requirement, second.storage_requirement),
            first,
            second,
        }
    }

    pub fn unavailable(fractions: [f64; 2]) -> Self {
        Self::new(
            ScenarioResult::unavailable(fractions[0]),
            ScenarioResult::unavailable(fractions[1]),
        )
    }

    pub fn scenarios(&self) -> [&ScenarioResult; 2] {
        [&self.first, &self.second]
    }
}

pub fn compare(
    engine: &ScenarioEngine,
    records: &[TimestepRecord],
    first_fraction: f64,
    second_fraction: f64,
) -> Comparison {
    Comparison::new(
        engine.compute(records, first_fraction),
        engine.compute(records, second_fraction),
    )
}

/// Any number of scenarios over the same period, computed lazily one at a time
pub fn compare_all<'a>(
    engine: &'a ScenarioEngine,
    records: &'a [TimestepRecord],
    fractions: &'a [f64],
) -> impl Iterator<Item = ScenarioResult> + 'a {
    fractions
        .iter()
        .map(move |&fraction| engine.compute(records, fraction))
}

/// One user interaction: window plus the two nuclear shares (fractions)
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScenarioRequest {
    pub start: DateTime<Utc>,
    pub duration_days: f64,
    pub nuclear_fractions: [f64; 2],
}

/// Everything the rendering side needs after one recomputation
#[derive(Debug, Clone, Serialize)]
pub struct AnalysisReport {
    pub period_start: Option<String>,
    pub period_end: Option<String>,
    pub analyzed_days: Option<i64>,
    pub records: usize,
    pub warnings: Vec<String>,
    pub comparison: Comparison,
}

impl AnalysisReport {
    pub fn is_available(&self) -> bool {
        self.period_start.is_some()
    }

    pub fn date_info(&self) -> String {
        match (&self.period_start, &self.period_end, self.analyzed_days) {
            (Some(start), Some(end), Some(days)) => {
                format!("Analyzing: {start} to {end} ({days} days)")
            }
            _ => "No data available for the selected period".to_string(),
        }
    }

    fn from_selection(selection: &PeriodSelection<'_>, comparison: Comparison) -> Self {
        Self {
            period_start: Some(selection.start.format("%Y-%m-%d").to_string()),
            period_end: Some(selection.end.format("%Y-%m-%d").to_string()),
            analyzed_days: Some(selection.analyzed_days()),
            records: selection.records.len(),
            warnings: selection.warnings.iter().map(ToString::to_string).collect(),
            comparison,
        }
    }

    fn empty(fractions: [f64; 2]) -> Self {
        Self {
            period_start: None,
            period_end: None,
            analyzed_days: None,
            records: 0,
            warnings: vec![MixError::EmptyPeriod.to_string()],
            comparison: Comparison::unavailable(fractions),
        }
    }
}

/// Select the period and run both scenarios. An empty period skips the
/// computation and reports N/A metrics.
pub fn analyze(
    store: &TimeSeriesStore,
    engine: &ScenarioEngine,
    request: &ScenarioRequest,
) -> AnalysisReport {
    let [first, second] = request.nuclear_fractions;

    match period::select(store, request.start, request.duration_days) {
        Ok(selection) => {
            let comparison = compare(engine, selection.records, first, second);
            info!(
                start = %selection.start,
                end = %selection.end,
                records = selection.records.len(),
                first_fraction = first,
                second_fraction = second,
                "scenarios compared"
            );
            AnalysisReport::from_selection(&selection, comparison)
        }
        Err(e) => {
            warn!(error = %e, start = %request.start, "no scenario computed");
            AnalysisReport::empty(request.nuclear_fractions)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mix::CapacityFactorProfile;
    use crate::mix::testutil::*;

    fn engine() -> ScenarioEngine {
        ScenarioEngine::new(CapacityFactorProfile::default())
    }

    #[test]
    fn test_dominance() {
        assert_eq!(dominance(2.0, 1.0), Dominance::First);
        assert_eq!(dominance(1.0, 2.0), Dominance::Second);
        assert_eq!(dominance(1.0, 1.0 + 1e-12), Dominance::Tie);
        assert_eq!(dominance(f64::NAN, f64::NAN), Dominance::Undecided);
        assert_eq!(dominance(f64::NAN, 3.0), Dominance::Undecided);
        assert_eq!(dominance(f64::INFINITY, 3.0), Dominance::Undecided);
    }

    #[test]
    fn test_compare_is_order_insensitive() {
        let store = synthetic_store(24 * 7);
        let forward = compare(&engine(), store.records(), 0.0, 0.6);
        let backward = compare(&engine(), store.records(), 0.6, 0.0);

        assert_eq!(forward.first, backward.second);
        assert_eq!(forward.second, backward.first);
        let flipped = |d: Dominance| match d {
            Dominance::First => Dominance::Second,
            Dominance::Second => Dominance::First,
            other => other,
        };
        assert_eq!(forward.battery_capacity, flipped(backward.battery_capacity));
        assert_eq!(forward.storage_requirement, flipped(backward.storage_requirement));
    }

    #[test]
    fn test_identical_fractions_tie() {
        let store = synthetic_store(24 * 2);
        let comparison = compare(&engine(), store.records(), 0.2, 0.2);
        assert_eq!(comparison.battery_capacity, Dominance::Tie);
        assert_eq!(comparison.storage_requirement, Dominance::Tie);
    }

    #[test]
    fn test_compare_all_matches_single_runs() {
        let store = synthetic_store(24 * 3);
        let fractions = [0.0, 0.25, 0.5, 1.0];
        let engine = engine();
        let results: Vec<ScenarioResult> = compare_all(&engine, store.records(), &fractions).collect();
        assert_eq!(results.len(), 4);
        for (result, fraction) in results.iter().zip(fractions) {
            assert_eq!(result, &engine.compute(store.records(), fraction));
        }
    }

    #[test]
    fn test_analyze_clamped_start_still_computes() {
        let store = synthetic_store(24 * 10);
        let request = ScenarioRequest {
            start: hour(-48),
            duration_days: 7.0,
            nuclear_fractions: [0.0, 0.2],
        };
        let report = analyze(&store, &engine(), &request);

        assert!(report.is_available());
        assert_eq!(report.period_start.as_deref(), Some("2023-01-01"));
        assert_eq!(report.period_end.as_deref(), Some("2023-01-08"));
        assert_eq!(report.analyzed_days, Some(7));
        assert_eq!(
            report.warnings,
            vec!["Start date adjusted to minimum: 2023-01-01".to_string()]
        );
        assert!(report.comparison.first.battery_capacity.is_finite());
        assert_eq!(report.comparison.second.nuclear_fraction, 0.2);
        assert_eq!(
            report.date_info(),
            "Analyzing: 2023-01-01 to 2023-01-08 (7 days)"
        );
    }

    #[test]
    fn test_analyze_empty_store_reports_unavailable() {
        let request = ScenarioRequest {
            start: hour(0),
            duration_days: 7.0,
            nuclear_fractions: [0.0, 0.2],
        };
        let report = analyze(&TimeSeriesStore::default(), &engine(), &request);

        assert!(!report.is_available());
        assert_eq!(report.records, 0);
        assert!(report.comparison.first.battery_capacity.is_nan());
        assert_eq!(report.comparison.battery_capacity, Dominance::Undecided);
        assert_eq!(report.comparison.storage_requirement, Dominance::Undecided);
        assert_eq!(
            report.warnings,
            vec!["No data available for the selected period".to_string()]
        );
    }

    #[test]
    fn test_analyze_gap_in_data_is_empty_period() {
        let store = TimeSeriesStore::from_records(vec![
            record(0, 0.1, 0.2, 0.3, 0.9, 10.0),
            record(24 * 30, 0.1, 0.2, 0.3, 0.9, 10.0),
        ]);
        let request = ScenarioRequest {
            start: hour(24 * 5),
            duration_days: 3.0,
            nuclear_fractions: [0.5, 1.0],
        };
        let report = analyze(&store, &engine(), &request);
        assert!(!report.is_available());
        assert!(report.comparison.second.storage_requirement.is_nan());
    }
}

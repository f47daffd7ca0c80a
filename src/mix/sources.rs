use std::collections::HashMap;
use once_cell::sync::Lazy;
use serde::Serialize;

use crate::mix::Source;

/// Every series that appears in input data or in the rendered charts
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum Series {
    Source(Source),
    Load,
    StoragePotential,
    StorageConsumption,
}

/// Display and ingestion metadata of a series
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SeriesInfo {
    pub series: Series,
    pub label: &'static str,
    pub color: &'static str,
    /// CSV header spellings; empty for derived series
    #[serde(skip)]
    pub aliases: &'static [&'static str],
}

impl SeriesInfo {
    pub const fn new(
        series: Series,
        label: &'static str,
        color: &'static str,
        aliases: &'static [&'static str],
    ) -> Self {
        Self {
            series,
            label,
            color,
            aliases,
        }
    }
}

pub static SERIES: Lazy<Vec<SeriesInfo>> = Lazy::new(|| {
    vec![
        SeriesInfo::new(Series::Source(Source::Nuclear), "Nuclear", "#9B59B6", &["Nuclear"]),
        SeriesInfo::new(
            Series::Source(Source::WindOffshore),
            "Wind offshore",
            "#4A90E2",
            &["Wind offshore", "WindOffshore", "offshore"],
        ),
        SeriesInfo::new(
            Series::Source(Source::WindOnshore),
            "Wind onshore",
            "#7CB9E8",
            &["Wind onshore", "WindOnshore", "onshore"],
        ),
        SeriesInfo::new(Series::Source(Source::Solar), "Solar", "#FDB813", &["Solar", "PV"]),
        SeriesInfo::new(Series::StoragePotential, "Storage potential", "#2ECC71", &[]),
        SeriesInfo::new(
            Series::StorageConsumption,
            "Storage consumption requirement",
            "#E74C3C",
            &[],
        ),
        SeriesInfo::new(Series::Load, "Load", "#000000", &["Load", "Demand"]),
    ]
});

/// Normalized header spelling -> series
static COLUMN_INDEX: Lazy<HashMap<String, Series>> = Lazy::new(|| {
    let mut map = HashMap::new();
    for info in SERIES.iter() {
        for alias in info.aliases {
            map.insert(normalize_column_name(alias), info.series);
        }
    }
    map
});

/// Lowercase, strip a BOM and all separators so "Wind onshore" == "wind_onshore"
pub fn normalize_column_name(name: &str) -> String {
    name.trim()
        .trim_start_matches('\u{feff}')
        .chars()
        .filter(|c| !matches!(c, ' ' | '_' | '-'))
        .flat_map(char::to_lowercase)
        .collect()
}

/// Resolve a CSV header to the series it carries
pub fn lookup_column(name: &str) -> Option<Series> {
    COLUMN_INDEX.get(&normalize_column_name(name)).copied()
}

pub fn info(series: Series) -> &'static SeriesInfo {
    SERIES
        .iter()
        .find(|info| info.series == series)
        .unwrap_or_else(|| unreachable!("series catalog is exhaustive"))
}

pub fn label(source: Source) -> &'static str {
    info(Series::Source(source)).label
}

pub fn color(series: Series) -> &'static str {
    info(series).color
}

use std::io::Read;
use std::path::Path;

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use csv::StringRecord;
use reqwest::Client;
use tracing::{info, warn};

use crate::mix::sources::{self, Series};
use crate::mix::{MixError, Source, SourceValues, TimeSeriesStore, TimestepRecord};

const NAIVE_FORMATS: [&str; 4] = [
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%d %H:%M",
    "%Y-%m-%dT%H:%M",
];

/// Where the capacity factor CSV comes from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DataSource {
    File(String),
    Url(String),
}

impl DataSource {
    pub fn parse(location: &str) -> Self {
        if location.starts_with("http://") || location.starts_with("https://") {
            DataSource::Url(location.to_string())
        } else {
            DataSource::File(location.to_string())
        }
    }
}

impl std::fmt::Display for DataSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DataSource::File(path) => write!(f, "file {path}"),
            DataSource::Url(url) => write!(f, "url {url}"),
        }
    }
}

/// Ingestion output: the sorted store plus bookkeeping about skipped rows
#[derive(Debug)]
pub struct IngestReport {
    pub store: TimeSeriesStore,
    pub rows_read: usize,
    pub rows_dropped: usize,
}

/// Column positions of the required fields
struct ColumnMap {
    timestamp: usize,
    sources: [(Source, usize); 4],
    load: usize,
}

impl ColumnMap {
    fn from_headers(headers: &StringRecord) -> Result<Self, MixError> {
        let position = |wanted: Series| {
            headers
                .iter()
                .enumerate()
                .skip(1)
                .find(|(_, name)| sources::lookup_column(name) == Some(wanted))
                .map(|(idx, _)| idx)
                .ok_or_else(|| MixError::MissingColumn(sources::info(wanted).label.to_string()))
        };

        if headers.is_empty() {
            return Err(MixError::MissingColumn("timestamp".to_string()));
        }

        let mut sources = [(Source::Nuclear, 0); 4];
        for (slot, source) in sources.iter_mut().zip(Source::ALL) {
            *slot = (source, position(Series::Source(source))?);
        }

        Ok(Self {
            // first column is the index
            timestamp: 0,
            sources,
            load: position(Series::Load)?,
        })
    }

    fn parse_row(&self, record: &StringRecord) -> Result<TimestepRecord, String> {
        let field = |idx: usize| record.get(idx).unwrap_or("").trim();

        let timestamp = parse_timestamp(field(self.timestamp))
            .ok_or_else(|| format!("unparseable timestamp {:?}", field(self.timestamp)))?;

        let mut capacity_factors = SourceValues::default();
        for (source, idx) in self.sources {
            capacity_factors.set(source, parse_value(field(idx))?);
        }

        Ok(TimestepRecord {
            timestamp,
            capacity_factors,
            load: parse_value(field(self.load))?,
        })
    }
}

fn parse_value(raw: &str) -> Result<f64, String> {
    match raw.parse::<f64>() {
        Ok(value) if value.is_finite() => Ok(value),
        _ => Err(format!("non-numeric value {raw:?}")),
    }
}

/// Parse an index timestamp. Naive values are taken as UTC.
pub fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }

    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.with_timezone(&Utc));
    }

    NAIVE_FORMATS
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(raw, fmt).ok())
        .or_else(|| {
            NaiveDate::parse_from_str(raw, "%Y-%m-%d")
                .ok()
                .and_then(|d| d.and_hms_opt(0, 0, 0))
        })
        .map(|naive| naive.and_utc())
}

/// Parse CSV text into a sorted store
pub fn read_csv<R: Read>(input: R) -> Result<IngestReport, MixError> {
    let mut reader = csv::ReaderBuilder::new()
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(input);

    let headers = reader.headers()?.clone();
    let columns = ColumnMap::from_headers(&headers)?;

    let mut records = Vec::new();
    let mut rows_read = 0usize;
    let mut rows_dropped = 0usize;

    for (idx, result) in reader.records().enumerate() {
        rows_read += 1;
        // header is line 1
        let line = idx + 2;

        let parsed = result
            .map_err(|e| e.to_string())
            .and_then(|record| columns.parse_row(&record));

        match parsed {
            Ok(record) => records.push(record),
            Err(reason) => {
                rows_dropped += 1;
                warn!(line, %reason, "dropping input row");
            }
        }
    }

    let store = TimeSeriesStore::from_records(records);
    if store.is_empty() {
        return Err(MixError::NoRecords);
    }

    Ok(IngestReport {
        store,
        rows_read,
        rows_dropped,
    })
}

pub fn load_file(path: impl AsRef<Path>) -> Result<IngestReport, MixError> {
    let file = std::fs::File::open(path.as_ref())?;
    read_csv(file)
}

pub async fn fetch_url(client: &Client, url: &str) -> Result<IngestReport, MixError> {
    let body = client
        .get(url)
        .send()
        .await?
        .error_for_status()?
        .text()
        .await?;
    read_csv(body.as_bytes())
}

/// One-time ingestion step run at startup
pub async fn load(source: &DataSource) -> Result<IngestReport, MixError> {
    let report = match source {
        DataSource::File(path) => {
            let path = path.clone();
            tokio::task::spawn_blocking(move || load_file(path))
                .await
                .map_err(|e| MixError::Io(std::io::Error::other(e)))??
        }
        DataSource::Url(url) => fetch_url(&Client::new(), url).await?,
    };

    info!(
        %source,
        rows = report.rows_read,
        dropped = report.rows_dropped,
        first = ?report.store.min_timestamp(),
        last = ?report.store.max_timestamp(),
        "time series loaded"
    );

    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Datelike, Timelike};

    const SAMPLE: &str = "\
,Solar,Wind onshore,Wind offshore,Nuclear,Load
2023-01-01 02:00:00,0.0,0.30,0.50,0.9,48.0
2023-01-01 00:00:00,0.0,0.25,0.40,0.9,45.5
2023-01-01 01:00:00,0.1,0.28,0.45,0.9,46.0
";

    #[test]
    fn test_parse_timestamp_formats() {
        let ts = parse_timestamp("2023-08-14T22:00:00Z").unwrap();
        assert_eq!((ts.year(), ts.month(), ts.day(), ts.hour()), (2023, 8, 14, 22));

        let ts = parse_timestamp("2023-08-14 22:00:00").unwrap();
        assert_eq!(ts.hour(), 22);

        let ts = parse_timestamp("2023-08-14T05:30").unwrap();
        assert_eq!((ts.hour(), ts.minute()), (5, 30));

        let ts = parse_timestamp("2023-08-14").unwrap();
        assert_eq!((ts.day(), ts.hour()), (14, 0));

        let ts = parse_timestamp("2023-08-14T22:00:00+02:00").unwrap();
        assert_eq!(ts.hour(), 20);

        assert!(parse_timestamp("").is_none());
        assert!(parse_timestamp("yesterday").is_none());
    }

    #[test]
    fn test_read_csv_sorts_rows() {
        let report = read_csv(SAMPLE.as_bytes()).unwrap();
        assert_eq!(report.rows_read, 3);
        assert_eq!(report.rows_dropped, 0);

        let records = report.store.records();
        assert_eq!(records[0].load, 45.5);
        assert_eq!(records[1].capacity_factors.solar, 0.1);
        assert_eq!(records[2].capacity_factors.wind_offshore, 0.50);
        assert_eq!(records[2].capacity_factors.nuclear, 0.9);
    }

    #[test]
    fn test_read_csv_drops_bad_rows() {
        let csv = "\
timestamp,Solar,WindOnshore,WindOffshore,Nuclear,Load
not-a-date,0.0,0.3,0.5,0.9,48.0
2023-01-01 00:00:00,0.0,0.2,0.4,0.9,45.0
2023-01-01 01:00:00,abc,0.2,0.4,0.9,45.0
2023-01-01 02:00:00,0.0,0.2,0.4,0.9,inf
";
        let report = read_csv(csv.as_bytes()).unwrap();
        assert_eq!(report.rows_read, 4);
        assert_eq!(report.rows_dropped, 3);
        assert_eq!(report.store.len(), 1);
    }

    #[test]
    fn test_read_csv_missing_column() {
        let csv = "time,Solar,Wind onshore,Nuclear,Load\n2023-01-01,0,0,0,1\n";
        match read_csv(csv.as_bytes()) {
            Err(MixError::MissingColumn(name)) => assert_eq!(name, "Wind offshore"),
            other => panic!("expected missing column, got {other:?}"),
        }
    }

    #[test]
    fn test_read_csv_without_rows() {
        let csv = ",Solar,Wind onshore,Wind offshore,Nuclear,Load\n";
        assert!(matches!(read_csv(csv.as_bytes()), Err(MixError::NoRecords)));
    }

    #[test]
    fn test_data_source_parse() {
        assert_eq!(
            DataSource::parse("https://example.com/df_cf.csv"),
            DataSource::Url("https://example.com/df_cf.csv".to_string())
        );
        assert_eq!(
            DataSource::parse("scenarios/df_cf.csv"),
            DataSource::File("scenarios/df_cf.csv".to_string())
        );
    }

    #[tokio::test]
    async fn test_load_missing_file_is_hard_failure() {
        let source = DataSource::File("/nonexistent/df_cf.csv".to_string());
        assert!(matches!(load(&source).await, Err(MixError::Io(_))));
    }
}

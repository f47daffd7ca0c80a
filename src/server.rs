use axum::{
    Router,
    extract::{FromRequestParts, Query, State, rejection::QueryRejection},
    response::{Html, IntoResponse, Json, Response},
    routing::get,
};
use http::{StatusCode, request::Parts};
use serde::{Deserialize, Serialize, de::DeserializeOwned};
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{error, info};

use crate::config::{Config, ScenarioDefaults};
use crate::mix::compare::{self, AnalysisReport, Dominance, ScenarioRequest};
use crate::mix::period::{self, DURATION_OPTIONS};
use crate::mix::scenario::{ScenarioEngine, ScenarioResult};
use crate::mix::sources::{self, SeriesInfo};
use crate::mix::{MixError, TimeSeriesStore};
use crate::plot;

/// Outcome of the one-time ingestion step
#[derive(Debug)]
pub enum DataState {
    Ready(TimeSeriesStore),
    /// Ingestion failed; every data endpoint reports this instead of computing
    Unavailable(String),
}

#[derive(Clone)]
pub struct AppState {
    data: Arc<DataState>,
    engine: ScenarioEngine,
    defaults: ScenarioDefaults,
}

impl AppState {
    pub fn new(data: DataState, engine: ScenarioEngine, defaults: ScenarioDefaults) -> Self {
        Self {
            data: Arc::new(data),
            engine,
            defaults,
        }
    }

    fn store(&self) -> Result<&TimeSeriesStore, ApiError> {
        match self.data.as_ref() {
            DataState::Ready(store) => Ok(store),
            DataState::Unavailable(reason) => Err(ApiError {
                status: StatusCode::SERVICE_UNAVAILABLE,
                message: format!("Data unavailable: {reason}"),
            }),
        }
    }
}

#[derive(Serialize)]
struct ApiResponse<T> {
    success: bool,
    data: Option<T>,
    error: Option<String>,
}

impl<T> ApiResponse<T> {
    fn success(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
        }
    }

    fn error(message: String) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(message),
        }
    }
}

#[derive(Debug)]
struct ApiError {
    status: StatusCode,
    message: String,
}

impl From<MixError> for ApiError {
    fn from(err: MixError) -> Self {
        let status = match &err {
            MixError::InvalidDate(_) | MixError::InvalidShare(_) | MixError::InvalidProfile(_) => {
                StatusCode::BAD_REQUEST
            }
            MixError::EmptyPeriod => StatusCode::NOT_FOUND,
            MixError::Request(_)
            | MixError::Csv(_)
            | MixError::Io(_)
            | MixError::MissingColumn(_)
            | MixError::NoRecords => StatusCode::SERVICE_UNAVAILABLE,
        };
        Self {
            status,
            message: err.to_string(),
        }
    }
}

impl From<QueryRejection> for ApiError {
    fn from(rejection: QueryRejection) -> Self {
        Self {
            status: rejection.status(),
            message: rejection.body_text(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(ApiResponse::<()>::error(self.message))).into_response()
    }
}

/// `Query` whose rejections use the JSON envelope
struct ApiQuery<T>(T);

impl<T, S> FromRequestParts<S> for ApiQuery<T>
where
    T: DeserializeOwned,
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let Query(value) = Query::<T>::try_from_uri(&parts.uri)?;
        Ok(Self(value))
    }
}

#[derive(Debug, Default, Deserialize)]
struct ScenarioQuery {
    /// Start date, `YYYY-MM-DD`
    start: Option<String>,
    /// Window length in days
    days: Option<f64>,
    /// Nuclear share of scenario 1, percent
    nuclear_a: Option<f64>,
    /// Nuclear share of scenario 2, percent
    nuclear_b: Option<f64>,
}

fn percent_to_fraction(percent: f64) -> Result<f64, MixError> {
    if (0.0..=100.0).contains(&percent) {
        Ok(percent / 100.0)
    } else {
        Err(MixError::InvalidShare(percent))
    }
}

impl ScenarioQuery {
    fn to_request(&self, defaults: &ScenarioDefaults) -> Result<ScenarioRequest, MixError> {
        Ok(ScenarioRequest {
            start: period::parse_start_date(self.start.as_deref())?,
            duration_days: self.days.unwrap_or(defaults.duration_days),
            nuclear_fractions: [
                percent_to_fraction(self.nuclear_a.unwrap_or(defaults.nuclear_percent_a))?,
                percent_to_fraction(self.nuclear_b.unwrap_or(defaults.nuclear_percent_b))?,
            ],
        })
    }
}

/// GET /api/v1/scenarios?start=YYYY-MM-DD&days=N&nuclear_a=P&nuclear_b=P
/// Run both scenarios over the selected window
async fn get_scenarios(
    State(state): State<AppState>,
    ApiQuery(query): ApiQuery<ScenarioQuery>,
) -> Result<Json<ApiResponse<AnalysisReport>>, ApiError> {
    let store = state.store()?;
    let request = query.to_request(&state.defaults)?;
    let report = compare::analyze(store, &state.engine, &request);
    Ok(Json(ApiResponse::success(report)))
}

#[derive(Debug, Deserialize)]
struct SweepQuery {
    start: Option<String>,
    days: Option<f64>,
    /// Spacing between nuclear shares, percent
    step: Option<f64>,
}

#[derive(Serialize)]
struct SweepPoint {
    nuclear_percent: f64,
    battery_capacity: f64,
    storage_requirement: f64,
    peak_power_requirement: f64,
}

/// Finest sweep spacing, percent; caps a sweep at 101 scenarios
const MIN_SWEEP_STEP: f64 = 1.0;

fn sweep_fractions(step: f64) -> Result<Vec<f64>, MixError> {
    if !(MIN_SWEEP_STEP..=100.0).contains(&step) {
        return Err(MixError::InvalidShare(step));
    }
    let count = (100.0 / step + 1e-9).floor() as usize;
    Ok((0..=count).map(|i| (i as f64 * step).min(100.0) / 100.0).collect())
}

/// GET /api/v1/scenarios/sweep?start=YYYY-MM-DD&days=N&step=P
/// Peak requirements across nuclear shares 0..=100%
async fn get_sweep(
    State(state): State<AppState>,
    ApiQuery(query): ApiQuery<SweepQuery>,
) -> Result<Json<ApiResponse<Vec<SweepPoint>>>, ApiError> {
    let store = state.store()?;
    let start = period::parse_start_date(query.start.as_deref())?;
    let fractions = sweep_fractions(query.step.unwrap_or(10.0))?;
    let selection = period::select(
        store,
        start,
        query.days.unwrap_or(state.defaults.duration_days),
    )?;

    let points = compare::compare_all(&state.engine, selection.records, &fractions)
        .map(|result| SweepPoint {
            nuclear_percent: (result.nuclear_fraction * 100.0).round(),
            battery_capacity: result.battery_capacity,
            storage_requirement: result.storage_requirement,
            peak_power_requirement: result.peak_power_requirement(),
        })
        .collect();

    Ok(Json(ApiResponse::success(points)))
}

#[derive(Serialize)]
struct RangeInfo {
    first: Option<String>,
    last: Option<String>,
    records: usize,
}

/// GET /api/v1/range
/// Span of the loaded time series
async fn get_range(State(state): State<AppState>) -> Result<Json<ApiResponse<RangeInfo>>, ApiError> {
    let store = state.store()?;
    Ok(Json(ApiResponse::success(RangeInfo {
        first: store.min_timestamp().map(|t| t.to_rfc3339()),
        last: store.max_timestamp().map(|t| t.to_rfc3339()),
        records: store.len(),
    })))
}

#[derive(Serialize)]
struct DurationInfo {
    days: u32,
    label: String,
}

/// GET /api/v1/durations
/// Window presets
async fn list_durations() -> Json<ApiResponse<Vec<DurationInfo>>> {
    let options = DURATION_OPTIONS
        .iter()
        .map(|&(days, label)| DurationInfo {
            days,
            label: label.to_string(),
        })
        .collect();

    Json(ApiResponse::success(options))
}

/// GET /api/v1/sources
/// Series labels and colors
async fn list_sources() -> Json<ApiResponse<Vec<SeriesInfo>>> {
    Json(ApiResponse::success(sources::SERIES.clone()))
}

use askama::Template;

struct DurationOption {
    days: u32,
    label: &'static str,
    selected: bool,
}

struct ScenarioCard {
    name: String,
    field: &'static str,
    percent: f64,
    battery: String,
    storage: String,
    peak: String,
    battery_class: &'static str,
    storage_class: &'static str,
    donut_json: String,
}

#[derive(Template)]
#[template(path = "plot.html")]
struct PlotTemplate {
    title: String,
    start: String,
    min_date: String,
    max_date: String,
    duration_options: Vec<DurationOption>,
    date_info: String,
    warnings: Vec<String>,
    scenarios: Vec<ScenarioCard>,
    figure_json: String,
}

fn highlight(dominance: Dominance, index: usize) -> &'static str {
    match (dominance, index) {
        (Dominance::First, 0) | (Dominance::Second, 1) => "dominant",
        _ => "",
    }
}

fn scenario_card(
    index: usize,
    scenario: &ScenarioResult,
    report: &AnalysisReport,
) -> ScenarioCard {
    ScenarioCard {
        name: format!("Scenario {}", index + 1),
        field: if index == 0 { "nuclear_a" } else { "nuclear_b" },
        percent: (scenario.nuclear_fraction * 100.0).round(),
        battery: plot::format_metric(scenario.battery_capacity),
        storage: plot::format_metric(scenario.storage_requirement),
        peak: plot::format_metric(scenario.peak_power_requirement()),
        battery_class: highlight(report.comparison.battery_capacity, index),
        storage_class: highlight(report.comparison.storage_requirement, index),
        donut_json: plot::capacity_donut(&scenario.installed_capacity).to_string(),
    }
}

fn render_page(
    store: &TimeSeriesStore,
    request: &ScenarioRequest,
    report: &AnalysisReport,
) -> Result<String, ApiError> {
    let date_label = |t: Option<chrono::DateTime<chrono::Utc>>| {
        t.map(|t| t.format("%Y-%m-%d").to_string()).unwrap_or_default()
    };

    let title = match (&report.period_start, &report.period_end) {
        (Some(start), Some(end)) => format!("Energy Mix Analysis: {start} to {end}"),
        _ => "Energy Mix Analysis".to_string(),
    };

    let scenarios = report.comparison.scenarios();
    let figure = plot::energy_mix_figure(&scenarios, &title);

    let template = PlotTemplate {
        title,
        start: request.start.format("%Y-%m-%d").to_string(),
        min_date: date_label(store.min_timestamp()),
        max_date: date_label(store.max_timestamp()),
        duration_options: DURATION_OPTIONS
            .iter()
            .map(|&(days, label)| DurationOption {
                days,
                label,
                selected: f64::from(days) == request.duration_days,
            })
            .collect(),
        date_info: report.date_info(),
        warnings: report.warnings.clone(),
        scenarios: scenarios
            .iter()
            .enumerate()
            .map(|(i, s)| scenario_card(i, s, report))
            .collect(),
        figure_json: figure.to_json(),
    };

    template.render().map_err(|e| {
        error!("Template rendering error: {}", e);
        ApiError {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            message: "Template rendering failed".to_string(),
        }
    })
}

/// GET /api/v1/scenarios/plot?start=...&days=...&nuclear_a=...&nuclear_b=...
/// Interactive chart page
async fn get_plot(
    State(state): State<AppState>,
    ApiQuery(query): ApiQuery<ScenarioQuery>,
) -> Result<Html<String>, ApiError> {
    let store = state.store()?;
    let request = query.to_request(&state.defaults)?;
    let report = compare::analyze(store, &state.engine, &request);
    Ok(Html(render_page(store, &request, &report)?))
}

/// GET /
/// Chart page starting at the first available day
async fn index(
    State(state): State<AppState>,
    ApiQuery(mut query): ApiQuery<ScenarioQuery>,
) -> Result<Html<String>, ApiError> {
    if query.start.is_none() {
        let store = state.store()?;
        query.start = store
            .min_timestamp()
            .map(|t| t.format("%Y-%m-%d").to_string());
    }
    get_plot(State(state), ApiQuery(query)).await
}

/// GET /health
async fn health() -> &'static str {
    "OK"
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/", get(index))
        .route("/health", get(health))
        .route("/api/v1/range", get(get_range))
        .route("/api/v1/durations", get(list_durations))
        .route("/api/v1/sources", get(list_sources))
        .route("/api/v1/scenarios", get(get_scenarios))
        .route("/api/v1/scenarios/plot", get(get_plot))
        .route("/api/v1/scenarios/sweep", get(get_sweep))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

pub async fn start_server(config: &Config, data: DataState) -> anyhow::Result<()> {
    let state = AppState::new(data, ScenarioEngine::new(config.profile), config.scenarios.clone());
    let app = router(state);

    let addr = config.server.socket_addr()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!(%addr, "server running");
    info!("endpoints: GET / | /health | /api/v1/range | /api/v1/durations | /api/v1/sources | /api/v1/scenarios | /api/v1/scenarios/plot | /api/v1/scenarios/sweep");

    axum::serve(listener, app).await?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mix::CapacityFactorProfile;
    use crate::mix::testutil::*;
    use axum::body::{Body, to_bytes};
    use http::Request;
    use serde_json::Value;
    use tower::ServiceExt;

    fn app(data: DataState) -> Router {
        router(AppState::new(
            data,
            ScenarioEngine::new(CapacityFactorProfile::default()),
            ScenarioDefaults::default(),
        ))
    }

    async fn get_json(app: Router, uri: &str) -> (StatusCode, Value) {
        let response = app
            .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
            .await
            .unwrap();
        let status = response.status();
        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, serde_json::from_slice(&body).unwrap())
    }

    #[tokio::test]
    async fn test_scenarios_endpoint() {
        let app = app(DataState::Ready(synthetic_store(24 * 10)));
        let (status, body) = get_json(
            app,
            "/api/v1/scenarios?start=2022-12-25&days=3&nuclear_a=0&nuclear_b=40",
        )
        .await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["success"], true);
        let report = &body["data"];
        assert_eq!(report["period_start"], "2023-01-01");
        assert_eq!(report["analyzed_days"], 3);
        assert_eq!(
            report["warnings"][0],
            "Start date adjusted to minimum: 2023-01-01"
        );
        assert_eq!(report["comparison"]["second"]["nuclear_fraction"], 0.4);
        assert!(report["comparison"]["first"]["battery_capacity"].is_number());
    }

    #[tokio::test]
    async fn test_missing_start_is_bad_request() {
        let app = app(DataState::Ready(synthetic_store(48)));
        let (status, body) = get_json(app, "/api/v1/scenarios?days=3").await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["success"], false);
    }

    #[tokio::test]
    async fn test_share_out_of_range_is_bad_request() {
        let app = app(DataState::Ready(synthetic_store(48)));
        let (status, _) = get_json(app, "/api/v1/scenarios?start=2023-01-01&nuclear_a=150").await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_unavailable_data() {
        let app = app(DataState::Unavailable("connection refused".to_string()));
        let (status, body) = get_json(app, "/api/v1/scenarios?start=2023-01-01").await;
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(body["error"], "Data unavailable: connection refused");
    }

    #[tokio::test]
    async fn test_range_and_durations() {
        let (status, body) = get_json(app(DataState::Ready(synthetic_store(48))), "/api/v1/range").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"]["records"], 48);
        assert_eq!(body["data"]["first"], "2023-01-01T00:00:00+00:00");

        let (_, body) = get_json(app(DataState::Ready(synthetic_store(1))), "/api/v1/durations").await;
        assert_eq!(body["data"].as_array().unwrap().len(), 8);
        assert_eq!(body["data"][2]["label"], "1 week");
    }

    #[tokio::test]
    async fn test_plot_page_renders() {
        let app = app(DataState::Ready(synthetic_store(24 * 3)));
        let response = app
            .oneshot(Request::builder().uri("/").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let html = String::from_utf8(body.to_vec()).unwrap();
        assert!(html.contains("Energy Mix Analysis: 2023-01-01"));
        assert!(html.contains("Scenario 2"));
        assert!(html.contains("Plotly.newPlot"));
    }

    #[tokio::test]
    async fn test_sweep_endpoint() {
        let app = app(DataState::Ready(synthetic_store(24 * 4)));
        let (status, body) = get_json(app, "/api/v1/scenarios/sweep?start=2023-01-01&days=2&step=25").await;
        assert_eq!(status, StatusCode::OK);
        let points = body["data"].as_array().unwrap();
        assert_eq!(points.len(), 5);
        assert_eq!(points[0]["nuclear_percent"], 0.0);
        assert_eq!(points[4]["nuclear_percent"], 100.0);
    }

    #[tokio::test]
    async fn test_sweep_empty_period_is_not_found() {
        let store = crate::mix::TimeSeriesStore::from_records(vec![
            record(0, 0.1, 0.2, 0.3, 0.9, 10.0),
            record(24 * 30, 0.1, 0.2, 0.3, 0.9, 10.0),
        ]);
        let (status, body) = get_json(
            app(DataState::Ready(store)),
            "/api/v1/scenarios/sweep?start=2023-01-05&days=2",
        )
        .await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["error"], "No data available for the selected period");
    }

    #[test]
    fn test_sweep_fractions() {
        assert_eq!(sweep_fractions(50.0).unwrap(), vec![0.0, 0.5, 1.0]);
        assert_eq!(sweep_fractions(30.0).unwrap(), vec![0.0, 0.3, 0.6, 0.9]);
        assert!(sweep_fractions(0.0).is_err());
        assert!(sweep_fractions(f64::NAN).is_err());
        assert_eq!(sweep_fractions(1.0).unwrap().len(), 101);
    }

    #[tokio::test]
    async fn test_sweep_rejects_step_below_one_percent() {
        assert!(matches!(
            sweep_fractions(0.0001),
            Err(MixError::InvalidShare(_))
        ));

        let app = app(DataState::Ready(synthetic_store(48)));
        let (status, body) =
            get_json(app, "/api/v1/scenarios/sweep?start=2023-01-01&days=1&step=0.5").await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["success"], false);
    }

    #[tokio::test]
    async fn test_malformed_query_uses_json_envelope() {
        let app = app(DataState::Ready(synthetic_store(48)));
        let (status, body) = get_json(app, "/api/v1/scenarios?start=2023-01-01&days=abc").await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["success"], false);
        assert!(body["data"].is_null());
        assert!(body["error"].is_string());
    }

    #[test]
    fn test_highlight() {
        assert_eq!(highlight(Dominance::First, 0), "dominant");
        assert_eq!(highlight(Dominance::First, 1), "");
        assert_eq!(highlight(Dominance::Second, 1), "dominant");
        assert_eq!(highlight(Dominance::Tie, 0), "");
        assert_eq!(highlight(Dominance::Undecided, 1), "");
    }
}

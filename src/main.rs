mod config;
mod mix;
mod plot;
mod server;

use crate::config::Config;
use crate::mix::compare::{self, ScenarioRequest};
use crate::mix::scenario::{ScenarioEngine, ScenarioResult};
use crate::mix::{Source, ingest, period, sources};
use crate::server::DataState;
use anyhow::{Context, Result, bail};
use tracing::error;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

fn init_tracing() {
    tracing_subscriber::registry()
        .with(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();

    let config = Config::load().context("loading configuration")?;
    let args: Vec<String> = std::env::args().skip(1).collect();

    match args.first().map(String::as_str) {
        None | Some("serve") => serve(&config).await,
        Some("report") => report(&config, &args[1..]).await,
        Some(other) => bail!("unknown command {other:?}, expected `serve` or `report`"),
    }
}

async fn serve(config: &Config) -> Result<()> {
    let source = config.data.data_source();
    let data = match ingest::load(&source).await {
        Ok(report) => DataState::Ready(report.store),
        Err(e) => {
            error!(%source, error = %e, "time series unavailable");
            DataState::Unavailable(e.to_string())
        }
    };

    server::start_server(config, data).await
}

fn parse_percent(arg: Option<&String>, default: f64) -> Result<f64> {
    let percent = match arg {
        Some(raw) => raw
            .parse::<f64>()
            .with_context(|| format!("invalid nuclear share {raw:?}"))?,
        None => default,
    };
    if !(0.0..=100.0).contains(&percent) {
        bail!(mix::MixError::InvalidShare(percent));
    }
    Ok(percent / 100.0)
}

/// `report <start> [days] [nuclear_a%] [nuclear_b%]`
async fn report(config: &Config, args: &[String]) -> Result<()> {
    let defaults = &config.scenarios;
    let start = period::parse_start_date(args.first().map(String::as_str))?;
    let duration_days = match args.get(1) {
        Some(raw) => raw
            .parse::<f64>()
            .with_context(|| format!("invalid duration {raw:?}"))?,
        None => defaults.duration_days,
    };
    let request = ScenarioRequest {
        start,
        duration_days,
        nuclear_fractions: [
            parse_percent(args.get(2), defaults.nuclear_percent_a)?,
            parse_percent(args.get(3), defaults.nuclear_percent_b)?,
        ],
    };

    // ingestion failures are fatal here
    let ingested = ingest::load(&config.data.data_source()).await?;
    let engine = ScenarioEngine::new(config.profile);
    let analysis = compare::analyze(&ingested.store, &engine, &request);

    println!("=== Energy Mix Scenarios ===\n");
    println!("{}", analysis.date_info());
    for warning in &analysis.warnings {
        println!("  ! {warning}");
    }

    for (i, scenario) in analysis.comparison.scenarios().into_iter().enumerate() {
        println!("\n--- Scenario {} ({}) ---", i + 1, plot::share_title(scenario.nuclear_fraction));
        print_scenario(scenario);
    }

    if analysis.is_available() {
        println!(
            "\nLower requirement -> battery capacity: {:?} | storage requirement: {:?}",
            analysis.comparison.battery_capacity, analysis.comparison.storage_requirement
        );
    }

    Ok(())
}

fn print_scenario(scenario: &ScenarioResult) {
    println!("Installed capacity:");
    for (source, capacity) in scenario.installed_capacity.iter() {
        println!("  {:<14} {:>10.2} GW", sources::label(source), capacity);
    }
    println!("  {:<14} {:>10.2} GW", "Total", scenario.installed_capacity.total());
    println!(
        "Backup capacity (peak deficit):     {} GW",
        plot::format_metric(scenario.battery_capacity)
    );
    println!(
        "Storage requirement (peak surplus): {} GW",
        plot::format_metric(scenario.storage_requirement)
    );

    if scenario.is_empty() {
        return;
    }

    println!("\nTimestamp,Nuclear,Wind offshore,Wind onshore,Solar,Load,Storage potential,Storage consumption");
    for i in 0..scenario.len().min(24) {
        let generation: Vec<String> = Source::ALL
            .iter()
            .map(|&s| format!("{:.2}", scenario.generation.get(s)[i]))
            .collect();
        println!(
            "{},{},{:.2},{:.2},{:.2}",
            scenario.timestamps[i].to_rfc3339(),
            generation.join(","),
            scenario.load[i],
            scenario.storage_potential[i],
            scenario.storage_consumption[i]
        );
    }
}

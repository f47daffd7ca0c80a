use plotly::common::{Line, Marker, Mode, Title};
use plotly::layout::{Axis, BarMode, GridPattern, HoverMode, LayoutGrid};
use plotly::{Bar, Layout, Plot, Scatter};
use serde_json::{Value, json};

use crate::mix::scenario::ScenarioResult;
use crate::mix::sources::{self, Series};
use crate::mix::{InstalledCapacity, Source};

const ROW_HEIGHT: usize = 400;
const RANGE_PADDING: f64 = 0.1;
const HOVER: &str = "<b>%{fullData.name}</b><br>Time: %{x}<br>Power: %{y:.2f} GW<extra></extra>";

/// "N/A" for anything non-finite, one decimal otherwise
pub fn format_metric(value: f64) -> String {
    if value.is_finite() {
        format!("{value:.1}")
    } else {
        "N/A".to_string()
    }
}

pub fn share_title(nuclear_fraction: f64) -> String {
    format!("Nuclear share: {}%", (nuclear_fraction * 100.0).round())
}

/// Common y-range for all scenario rows, padded by 10% of the span
pub fn shared_y_range(scenarios: &[&ScenarioResult]) -> Option<(f64, f64)> {
    let mut top = f64::NEG_INFINITY;
    let mut bottom = f64::INFINITY;

    for scenario in scenarios.iter().filter(|s| !s.is_empty()) {
        let totals = scenario.total_generation();
        for (i, total) in totals.iter().enumerate() {
            top = top.max(total + scenario.storage_consumption[i]);
            bottom = bottom.min(-scenario.storage_potential[i]);
        }
    }

    if !top.is_finite() || !bottom.is_finite() {
        return None;
    }

    let padding = (top - bottom) * RANGE_PADDING;
    Some((bottom - padding, top + padding))
}

fn axis_ref(prefix: &str, row: usize) -> String {
    if row == 0 {
        prefix.to_string()
    } else {
        format!("{prefix}{}", row + 1)
    }
}

fn bar(name: &str, color: &'static str, x: &[String], y: Vec<f64>, row: usize) -> Box<Bar<String, f64>> {
    Bar::new(x.to_vec(), y)
        .name(name)
        .marker(Marker::new().color(color))
        .legend_group(name)
        .show_legend(row == 0)
        .y_axis(&axis_ref("y", row))
        .hover_template(HOVER)
}

/// Stacked generation chart, one row per scenario
pub fn energy_mix_figure(scenarios: &[&ScenarioResult], title: &str) -> Plot {
    let mut plot = Plot::new();

    for (row, scenario) in scenarios.iter().enumerate() {
        let x: Vec<String> = scenario
            .timestamps
            .iter()
            .map(|ts| ts.format("%Y-%m-%d %H:%M").to_string())
            .collect();

        for source in Source::ALL {
            plot.add_trace(bar(
                sources::label(source),
                sources::color(Series::Source(source)),
                &x,
                scenario.generation.get(source).to_vec(),
                row,
            ));
        }

        // surplus is drawn below the axis
        plot.add_trace(bar(
            sources::info(Series::StoragePotential).label,
            sources::color(Series::StoragePotential),
            &x,
            scenario.storage_potential.iter().map(|v| -v).collect(),
            row,
        ));
        plot.add_trace(bar(
            sources::info(Series::StorageConsumption).label,
            sources::color(Series::StorageConsumption),
            &x,
            scenario.storage_consumption.clone(),
            row,
        ));

        let load_label = sources::info(Series::Load).label;
        plot.add_trace(
            Scatter::new(x.clone(), scenario.load.clone())
                .name(load_label)
                .mode(Mode::Lines)
                .line(Line::new().color(sources::color(Series::Load)).width(2.0))
                .legend_group(load_label)
                .show_legend(row == 0)
                .y_axis(&axis_ref("y", row))
                .hover_template(HOVER),
        );
    }

    let range = shared_y_range(scenarios);
    let mut layout = Layout::new()
        .title(Title::with_text(title))
        .height(ROW_HEIGHT * scenarios.len().max(1))
        .bar_mode(BarMode::Relative)
        .hover_mode(HoverMode::XUnified)
        .show_legend(true)
        .grid(
            LayoutGrid::new()
                .rows(scenarios.len().max(1))
                .columns(1)
                .pattern(GridPattern::Coupled),
        )
        .x_axis(Axis::new().title(Title::with_text("Time")));

    for (row, scenario) in scenarios.iter().enumerate() {
        let mut axis = Axis::new()
            .title(Title::with_text(&format!(
                "{} | Power (GW)",
                share_title(scenario.nuclear_fraction)
            )))
            .zero_line(true);
        if let Some((lo, hi)) = range {
            axis = axis.range(vec![lo, hi]);
        }
        layout = match row {
            0 => layout.y_axis(axis),
            1 => layout.y_axis2(axis),
            2 => layout.y_axis3(axis),
            3 => layout.y_axis4(axis),
            _ => layout,
        };
    }

    plot.set_layout(layout);
    plot
}

/// Installed capacity donut (plotly JSON: data + layout)
pub fn capacity_donut(installed: &InstalledCapacity) -> Value {
    let labels: Vec<&str> = Source::ALL.iter().map(|&s| sources::label(s)).collect();
    let values: Vec<f64> = Source::ALL.iter().map(|&s| installed.get(s)).collect();
    let colors: Vec<&str> = Source::ALL
        .iter()
        .map(|&s| sources::color(Series::Source(s)))
        .collect();

    json!({
        "data": [{
            "type": "pie",
            "labels": labels,
            "values": values,
            "hole": 0.5,
            "marker": { "colors": colors },
            "textposition": "inside",
            "textinfo": "label+percent",
            "hovertemplate": "<b>%{label}</b><br>Capacity: %{value:.0f} GW<br>%{percent}<extra></extra>"
        }],
        "layout": {
            "showlegend": false,
            "height": 200,
            "width": 200,
            "margin": { "l": 10, "r": 10, "t": 30, "b": 10 },
            "annotations": [{
                "text": format!("{:.0} GW", installed.total()),
                "x": 0.5,
                "y": 0.5,
                "font": { "size": 14 },
                "showarrow": false
            }]
        }
    })
}

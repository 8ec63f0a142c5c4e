use super::ExportError;
use std::io::Write;
use std::path::Path;
use tabled::{settings::Style, Table, Tabled};

use crate::analysis::{AnalysisResult, MetricForecast};
use crate::models::Metric;

#[derive(Tabled)]
struct TrendRow {
    #[tabled(rename = "Metric")]
    metric: String,
    #[tabled(rename = "Model")]
    model: String,
    #[tabled(rename = "Days")]
    days: usize,
    #[tabled(rename = "Average")]
    average: String,
    #[tabled(rename = "Current")]
    current: String,
    #[tabled(rename = "7-day")]
    projected: String,
    #[tabled(rename = "Slope/day")]
    slope: String,
    #[tabled(rename = "Status")]
    status: String,
    #[tabled(rename = "Outlook")]
    outlook: String,
}

#[derive(Tabled)]
struct PredictionRow {
    #[tabled(rename = "Date")]
    date: String,
    #[tabled(rename = "Estimate")]
    estimate: String,
    #[tabled(rename = "Lower")]
    lower: String,
    #[tabled(rename = "Upper")]
    upper: String,
}

fn format_value(metric: Metric, value: f64) -> String {
    format!("{:.*}", metric.display_decimals() as usize, value)
}

fn format_bound(metric: Metric, value: Option<f64>) -> String {
    value.map_or_else(|| "-".to_string(), |v| format_value(metric, v))
}

/// Write a human-readable analysis report
pub fn write_analysis_report<W: Write>(
    result: &AnalysisResult,
    writer: &mut W,
) -> Result<(), ExportError> {
    writeln!(writer, "HEALTH TREND REPORT")?;
    writeln!(writer, "===================")?;
    writeln!(writer, "Source: {}", result.source)?;
    writeln!(writer)?;

    writeln!(writer, "TRENDS")?;
    writeln!(writer, "------")?;
    if result.trends.is_empty() {
        writeln!(writer, "No metrics recorded in this period.")?;
    } else {
        let rows: Vec<TrendRow> = result
            .trends
            .values()
            .map(|trend| TrendRow {
                metric: trend.metric.label().to_string(),
                model: trend.model_type.to_string(),
                days: trend.sample_size,
                average: format_value(trend.metric, trend.average),
                current: format_value(trend.metric, trend.current),
                projected: format_value(trend.metric, trend.projected_7_days),
                slope: format!("{:+.3}", trend.slope),
                status: trend.status_from_average.to_string(),
                outlook: trend.predicted_status.to_string(),
            })
            .collect();
        writeln!(writer, "{}", Table::new(rows).with(Style::modern()))?;
    }
    writeln!(writer)?;

    writeln!(writer, "CORRELATED METRICS")?;
    writeln!(writer, "------------------")?;
    if result.correlation_clusters.is_empty() {
        writeln!(writer, "No strongly correlated groups.")?;
    }
    for cluster in &result.correlation_clusters {
        let names: Vec<&str> = cluster.metrics.iter().map(|m| m.label()).collect();
        writeln!(
            writer,
            "{} (mean |r| {:.2}, {} links)",
            names.join(", "),
            cluster.mean_abs_correlation,
            cluster.edge_count
        )?;
    }
    writeln!(writer)?;

    writeln!(writer, "FLARE-UP RISK")?;
    writeln!(writer, "-------------")?;
    match &result.flare_up_risk {
        Some(risk) => {
            writeln!(
                writer,
                "Risk: {} ({} of {} warning signs match the flare-up profile)",
                risk.level.to_string().to_uppercase(),
                risk.matching_metrics,
                risk.total_criteria
            )?;
            for comparison in &risk.comparisons {
                let marker = if comparison.matches_flare { "!" } else { " " };
                let calm = comparison
                    .non_flare_average
                    .map_or_else(|| "-".to_string(), |v| format!("{:.1}", v));
                writeln!(
                    writer,
                    "  {} {:<12} recent {:.1}  flare {:.1}  calm {}",
                    marker,
                    comparison.metric.label(),
                    comparison.recent,
                    comparison.flare_average,
                    calm
                )?;
            }
        }
        None => writeln!(writer, "Not enough flare history to assess.")?,
    }
    writeln!(writer)?;

    writeln!(writer, "ANOMALIES")?;
    writeln!(writer, "---------")?;
    if result.anomalies.is_empty() {
        writeln!(writer, "None detected.")?;
    }
    for finding in &result.anomalies {
        writeln!(writer, "- {}", finding.message)?;
    }

    Ok(())
}

/// Render the analysis report to a string
pub fn render_analysis_report(result: &AnalysisResult) -> Result<String, ExportError> {
    let mut buffer = Vec::new();
    write_analysis_report(result, &mut buffer)?;
    String::from_utf8(buffer).map_err(|e| ExportError::SerializationError(e.to_string()))
}

/// Export the analysis report to a text file
pub fn export_text<P: AsRef<Path>>(result: &AnalysisResult, output_path: P) -> Result<(), ExportError> {
    let mut file = std::fs::File::create(output_path)?;
    write_analysis_report(result, &mut file)
}

/// Render a forecast as a table of dated predictions
pub fn render_forecast(forecast: &MetricForecast) -> String {
    let metric = forecast.metric;
    let rows: Vec<PredictionRow> = forecast
        .predictions
        .iter()
        .map(|p| PredictionRow {
            date: forecast
                .date_of(p)
                .map_or_else(|| format!("+{}", p.day_offset), |d| d.to_string()),
            estimate: format_value(metric, p.point_estimate),
            lower: format_bound(metric, p.lower_bound),
            upper: format_bound(metric, p.upper_bound),
        })
        .collect();

    let level = forecast
        .predictions
        .first()
        .and_then(|p| p.confidence_level)
        .map(|l| format!(", {:.0}% interval", l * 100.0))
        .unwrap_or_default();

    format!(
        "{} forecast ({} model, {} days of history{})\n{}",
        metric.label(),
        forecast.model.model_type,
        forecast.model.fitted_size,
        level,
        Table::new(rows).with(Style::modern())
    )
}

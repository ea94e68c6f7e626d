use anyhow::{Context, Result};
use chrono::{DateTime, Local};
use netsim_lab_abstract::{Metric, ResultRecord};
use std::fs;
use std::path::PathBuf;
use tracing::{info, warn};

use crate::store::{GroupKey, GroupSummary, MetricStats, ResultStore};

/// Whether this build can render charts.
pub fn plotting_available() -> bool {
    cfg!(feature = "plot")
}

#[derive(Debug, Clone)]
pub struct ReportConfig {
    /// Render PNG charts; normally [`plotting_available`].
    pub plotting: bool,
    pub output_dir: PathBuf,
    pub prefix: String,
    /// Run timestamp shared by every artifact name.
    pub stamp: String,
}

impl ReportConfig {
    pub fn new(output_dir: impl Into<PathBuf>, prefix: impl Into<String>, stamp: impl Into<String>) -> Self {
        Self {
            plotting: plotting_available(),
            output_dir: output_dir.into(),
            prefix: prefix.into(),
            stamp: stamp.into(),
        }
    }

    fn artifact(&self, kind: &str, extension: &str) -> PathBuf {
        self.output_dir
            .join(format!("{}_{kind}_{}.{extension}", self.prefix, self.stamp))
    }

    pub fn analysis_path(&self) -> PathBuf {
        self.artifact("analysis", "txt")
    }

    pub fn plots_path(&self) -> PathBuf {
        self.artifact("plots", "png")
    }

    pub fn protocols_path(&self) -> PathBuf {
        self.artifact("protocols", "png")
    }
}

/// Files written by one [`ReportGenerator::generate`] call.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ReportArtifacts {
    pub analysis: Option<PathBuf>,
    pub charts: Vec<PathBuf>,
}

pub struct ReportGenerator {
    config: ReportConfig,
}

impl ReportGenerator {
    pub fn new(config: ReportConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &ReportConfig {
        &self.config
    }

    /// Write the text analysis and, when plotting is enabled, the charts.
    /// A chart failure is logged and does not fail the report.
    pub fn generate(&self, store: &ResultStore) -> Result<ReportArtifacts> {
        if store.is_empty() {
            info!("No results, nothing to report or plot");
            return Ok(ReportArtifacts::default());
        }

        let analysis = self.write_analysis(store)?;
        let charts = if self.config.plotting {
            match draw_charts(store, &self.config) {
                Ok(charts) => charts,
                Err(err) => {
                    warn!("Chart rendering failed, skipping charts: {err:#}");
                    Vec::new()
                }
            }
        } else {
            info!("Plotting is unavailable in this build; skipping charts");
            Vec::new()
        };

        Ok(ReportArtifacts {
            analysis: Some(analysis),
            charts,
        })
    }

    pub fn write_analysis(&self, store: &ResultStore) -> Result<PathBuf> {
        let path = self.config.analysis_path();
        let text = render_analysis(store, Local::now());
        fs::write(&path, text)
            .with_context(|| format!("Failed to write analysis report {}", path.display()))?;
        info!("Analysis report written to {}", path.display());
        Ok(path)
    }
}

#[cfg(feature = "plot")]
fn draw_charts(store: &ResultStore, config: &ReportConfig) -> Result<Vec<PathBuf>> {
    let mut charts = Vec::new();
    let sweep_path = config.plots_path();
    if crate::plot::render_sweep_panels(store, &sweep_path)? {
        info!("Charts written to {}", sweep_path.display());
        charts.push(sweep_path);
    }
    let protocol_path = config.protocols_path();
    if crate::plot::render_protocol_panels(store, &protocol_path)? {
        info!("Protocol charts written to {}", protocol_path.display());
        charts.push(protocol_path);
    }
    Ok(charts)
}

#[cfg(not(feature = "plot"))]
fn draw_charts(_: &ResultStore, _: &ReportConfig) -> Result<Vec<PathBuf>> {
    anyhow::bail!("built without the `plot` feature")
}

fn parameter_summary(record: &ResultRecord) -> String {
    let mut summary = record.params().describe();
    if let Some(protocol) = &record.protocol {
        summary = format!("{protocol}, {summary}");
    }
    if let Some(scenario) = &record.scenario {
        summary = format!("{scenario}: {summary}");
    }
    summary
}

fn best_by(
    records: &[ResultRecord],
    metric: Metric,
    better: fn(f64, f64) -> bool,
) -> Option<(&ResultRecord, f64)> {
    records
        .iter()
        .filter_map(|r| r.metric(metric).map(|v| (r, v)))
        .fold(None, |best, (record, value)| match best {
            Some((_, current)) if !better(value, current) => best,
            _ => Some((record, value)),
        })
}

fn range_line(label: &str, stats: Option<MetricStats>, unit: &str) -> String {
    match stats {
        Some(s) => format!(
            "- {label}: {:.4} - {:.4} {unit} (mean {:.4}, {} samples)",
            s.min, s.max, s.mean, s.samples
        ),
        None => format!("- {label}: no data"),
    }
}

fn cell(stats: Option<&MetricStats>) -> String {
    stats.map_or_else(|| "n/a".to_string(), |s| format!("{:.4}", s.mean))
}

fn group_table(title: &str, groups: &[GroupSummary], lines: &mut Vec<String>) {
    lines.push(String::new());
    lines.push(title.to_string());
    lines.push(format!(
        "  {:<24} {:>6} {:>16} {:>12} {:>10}",
        groups.first().map_or("value", |g| g.key.as_str()),
        "runs",
        "throughput(Mbps)",
        "delay(ms)",
        "loss(%)"
    ));
    for group in groups {
        lines.push(format!(
            "  {:<24} {:>6} {:>16} {:>12} {:>10}",
            group.value,
            group.count,
            cell(group.stats(Metric::Throughput)),
            cell(group.stats(Metric::Delay)),
            cell(group.stats(Metric::LossRate)),
        ));
    }
}

/// Text analysis of the collected records.
pub fn render_analysis(store: &ResultStore, generated_at: DateTime<Local>) -> String {
    let records = store.records();
    let mut lines = vec![
        "=== Network Simulation Analysis Report ===".to_string(),
        format!("Generated: {}", generated_at.format("%Y-%m-%d %H:%M:%S")),
        format!("Total records: {}", records.len()),
    ];

    if records.is_empty() {
        lines.push("No results were collected.".to_string());
        return lines.join("\n") + "\n";
    }

    lines.push(String::new());
    lines.push("Best results:".to_string());
    let higher = |a: f64, b: f64| a > b;
    let lower = |a: f64, b: f64| a < b;
    for (label, metric, better) in [
        ("Highest throughput", Metric::Throughput, higher as fn(f64, f64) -> bool),
        ("Lowest delay", Metric::Delay, lower),
        ("Lowest loss rate", Metric::LossRate, lower),
    ] {
        match best_by(records, metric, better) {
            Some((record, value)) => lines.push(format!(
                "- {label}: {value:.4} {} ({})",
                metric.unit(),
                parameter_summary(record)
            )),
            None => lines.push(format!("- {label}: no data")),
        }
    }

    lines.push(String::new());
    lines.push("Overall:".to_string());
    for (label, metric) in [
        ("Throughput", Metric::Throughput),
        ("Delay", Metric::Delay),
        ("Loss rate", Metric::LossRate),
    ] {
        lines.push(range_line(label, MetricStats::of(records, metric), metric.unit()));
    }
    let missing = records.iter().filter(|r| !r.missing.is_empty()).count();
    if missing > 0 {
        lines.push(format!(
            "- {missing} records lacked one or more metrics; those values are excluded above"
        ));
    }

    for key in GroupKey::AXES {
        let groups = store.aggregate(key);
        if groups.len() > 1 {
            group_table(&format!("Mean by {key}:"), &groups, &mut lines);
        }
    }

    let protocols = store.aggregate(GroupKey::Protocol);
    if !protocols.is_empty() {
        group_table("Per-protocol averages:", &protocols, &mut lines);
    }

    let scenario_rows: Vec<&ResultRecord> =
        records.iter().filter(|r| r.scenario.is_some()).collect();
    if !scenario_rows.is_empty() {
        lines.push(String::new());
        lines.push("Scenarios:".to_string());
        for record in scenario_rows {
            let fairness = record
                .fairness_index
                .map(|f| format!(", fairness {f:.4}"))
                .unwrap_or_default();
            lines.push(format!(
                "  {} [{}]: throughput {:.4} Mbps, delay {:.2} ms, loss {:.2}%{fairness}",
                record.scenario.as_deref().unwrap_or_default(),
                record.protocol.as_deref().unwrap_or("-"),
                record.throughput,
                record.avg_delay,
                record.loss_rate,
            ));
        }
    }

    lines.join("\n") + "\n"
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use std::path::Path;
    use netsim_lab_abstract::{Measurement, ParameterSet};

    fn record(packet_size: u32, throughput: f64, delay: f64, loss: f64) -> ResultRecord {
        let params = ParameterSet {
            packet_size,
            data_rate: Some("5Mbps".into()),
            ..Default::default()
        };
        let measurement = Measurement {
            throughput,
            avg_delay: delay,
            loss_rate: loss,
            ..Default::default()
        };
        ResultRecord::new(&params, None, measurement, Local::now())
    }

    fn generated_at() -> DateTime<Local> {
        Local.with_ymd_and_hms(2026, 10, 16, 9, 30, 0).unwrap()
    }

    #[test]
    fn artifact_names_share_prefix_and_stamp() {
        let config = ReportConfig::new("results", "lab3", "20261016_093000");
        assert_eq!(
            config.analysis_path(),
            Path::new("results/lab3_analysis_20261016_093000.txt")
        );
        assert_eq!(
            config.protocols_path(),
            Path::new("results/lab3_protocols_20261016_093000.png")
        );
        assert_eq!(config.plotting, plotting_available());
    }

    #[test]
    fn analysis_lists_best_runs_and_axis_tables() {
        let mut store = ResultStore::new();
        store.append(record(512, 0.02, 3.0, 1.0));
        store.append(record(2048, 0.08, 5.0, 0.0));

        let text = render_analysis(&store, generated_at());

        assert!(text.contains("Generated: 2026-10-16 09:30:00"));
        assert!(text.contains("Total records: 2"));
        assert!(text.contains("- Highest throughput: 0.0800 Mbps (packet_size=2048B, data_rate=5Mbps)"));
        assert!(text.contains("- Lowest delay: 3.0000 ms (packet_size=512B, data_rate=5Mbps)"));
        assert!(text.contains("Mean by packet_size:"));
        // Only one distinct data rate.
        assert!(!text.contains("Mean by data_rate:"));
        assert!(!text.contains("Per-protocol averages:"));
    }

    #[test]
    fn missing_metrics_are_not_best_results() {
        let mut store = ResultStore::new();
        let mut absent = record(512, 0.0, 0.0, 0.0);
        absent.missing = vec![Metric::Delay];
        store.append(absent);
        store.append(record(1024, 0.04, 4.0, 0.0));

        let text = render_analysis(&store, generated_at());

        assert!(text.contains("- Lowest delay: 4.0000 ms (packet_size=1024B"));
        assert!(text.contains("1 records lacked one or more metrics"));
    }

    #[test]
    fn protocol_runs_get_protocol_and_scenario_sections() {
        let mut store = ResultStore::new();
        for (protocol, throughput) in [("TCP", 8.5), ("UDP", 9.1)] {
            let mut r = record(1024, throughput, 5.0, 0.2);
            r.protocol = Some(protocol.into());
            r.scenario = Some("Ideal Network".into());
            r.fairness_index = Some(0.9981);
            store.append(r);
        }

        let text = render_analysis(&store, generated_at());

        assert!(text.contains("Per-protocol averages:"));
        assert!(text.contains("  Ideal Network [UDP]: throughput 9.1000 Mbps, delay 5.00 ms, loss 0.20%, fairness 0.9981"));
        assert!(text.contains("(Ideal Network: UDP, packet_size=1024B"));
    }

    #[test]
    fn empty_store_generates_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let generator = ReportGenerator::new(ReportConfig::new(dir.path(), "lab", "stamp"));
        let artifacts = generator.generate(&ResultStore::new()).unwrap();
        assert_eq!(artifacts, ReportArtifacts::default());
        assert!(!generator.config().analysis_path().exists());
    }

    #[test]
    fn disabled_plotting_still_writes_analysis() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = ReportConfig::new(dir.path(), "lab", "stamp");
        config.plotting = false;
        let mut store = ResultStore::new();
        store.append(record(64, 0.01, 2.0, 0.0));

        let artifacts = ReportGenerator::new(config.clone()).generate(&store).unwrap();

        assert_eq!(artifacts.analysis, Some(config.analysis_path()));
        assert!(artifacts.charts.is_empty());
        assert!(!config.plots_path().exists());
    }
}

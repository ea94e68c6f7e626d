use anyhow::Result;
use netsim_lab_abstract::{Metric, ResultRecord};
use plotters::coord::Shift;
use plotters::prelude::*;
use plotters::style::full_palette::ORANGE;
use std::ops::Range;
use std::path::Path;

use crate::store::{GroupKey, MetricStats, ResultStore};

const PANEL_SIZE: (u32, u32) = (640, 400);

/// One chart of group means against a numeric parameter.
struct Panel {
    title: String,
    x_desc: &'static str,
    y_desc: &'static str,
    points: Vec<(f64, f64)>,
    bars: bool,
}

fn axis_desc(key: GroupKey) -> &'static str {
    match key {
        GroupKey::PacketSize => "Packet size (bytes)",
        GroupKey::Interval => "Send interval (s)",
        GroupKey::DataRate => "Data rate (bps)",
        GroupKey::Delay => "Link delay (s)",
        GroupKey::ErrorRate => "Error rate",
        GroupKey::TcpAlgorithm | GroupKey::Protocol | GroupKey::Scenario => "",
    }
}

fn metric_desc(metric: Metric) -> &'static str {
    match metric {
        Metric::Throughput => "Throughput (Mbps)",
        Metric::Delay => "Average delay (ms)",
        Metric::LossRate => "Loss rate (%)",
        Metric::ReceivedPackets => "Received packets",
        Metric::TotalBytes => "Received bytes",
    }
}

fn sweep_panels(store: &ResultStore) -> Vec<Panel> {
    let mut panels = Vec::new();
    for key in GroupKey::AXES.into_iter().filter(GroupKey::is_ordered) {
        let groups = store.aggregate(key);
        if groups.len() < 2 {
            continue;
        }
        let mut metrics = vec![Metric::Throughput, Metric::Delay];
        if key == GroupKey::PacketSize {
            metrics.push(Metric::LossRate);
        }
        for metric in metrics {
            // Groups come back ordered by parameter value.
            let points: Vec<(f64, f64)> = groups
                .iter()
                .filter_map(|g| Some((g.numeric?, g.stats(metric)?.mean)))
                .collect();
            if points.is_empty() {
                continue;
            }
            panels.push(Panel {
                title: format!("{} vs {key}", metric_desc(metric)),
                x_desc: axis_desc(key),
                y_desc: metric_desc(metric),
                points,
                bars: metric == Metric::LossRate,
            });
        }
    }
    panels
}

fn span(values: impl Iterator<Item = f64>, include_zero: bool) -> Range<f64> {
    let (mut lo, hi) = values.fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), v| {
        (lo.min(v), hi.max(v))
    });
    if include_zero {
        lo = lo.min(0.0);
    }
    if !lo.is_finite() || !hi.is_finite() {
        return 0.0..1.0;
    }
    let pad = if hi > lo { (hi - lo) * 0.05 } else { hi.abs().max(1.0) * 0.5 };
    if include_zero && lo >= 0.0 {
        return 0.0..hi + pad;
    }
    lo - pad..hi + pad
}

fn draw_panel<DB: DrawingBackend>(area: &DrawingArea<DB, Shift>, panel: &Panel) -> Result<()>
where
    DB::ErrorType: 'static,
{
    let x_range = span(panel.points.iter().map(|p| p.0), false);
    let y_range = span(panel.points.iter().map(|p| p.1), true);
    let bar_half_width = (x_range.end - x_range.start) * 0.02;

    let mut chart = ChartBuilder::on(area)
        .caption(&panel.title, ("sans-serif", 20))
        .margin(10)
        .x_label_area_size(40)
        .y_label_area_size(60)
        .build_cartesian_2d(x_range, y_range)?;

    chart
        .configure_mesh()
        .x_desc(panel.x_desc)
        .y_desc(panel.y_desc)
        .label_style(("sans-serif", 13))
        .draw()?;

    if panel.bars {
        chart.draw_series(panel.points.iter().map(|&(x, y)| {
            Rectangle::new(
                [(x - bar_half_width, 0.0), (x + bar_half_width, y)],
                ORANGE.mix(0.7).filled(),
            )
        }))?;
    } else {
        chart.draw_series(LineSeries::new(panel.points.iter().copied(), &BLUE))?;
        chart.draw_series(
            panel
                .points
                .iter()
                .map(|&point| Circle::new(point, 4, BLUE.filled())),
        )?;
    }
    Ok(())
}

/// Grid of per-axis charts. Returns `false` without writing when no axis was
/// swept over more than one value.
pub fn render_sweep_panels(store: &ResultStore, path: &Path) -> Result<bool> {
    let panels = sweep_panels(store);
    if panels.is_empty() {
        return Ok(false);
    }

    let cols = panels.len().min(2);
    let rows = panels.len().div_ceil(cols);
    let root = BitMapBackend::new(
        path,
        (PANEL_SIZE.0 * cols as u32, PANEL_SIZE.1 * rows as u32),
    )
    .into_drawing_area();
    root.fill(&WHITE)?;

    for (area, panel) in root.split_evenly((rows, cols)).iter().zip(&panels) {
        draw_panel(area, panel)?;
    }

    root.present()?;
    Ok(true)
}

/// Records of protocol runs grouped by scenario, in first-appearance order.
fn scenario_groups(records: &[ResultRecord]) -> Vec<(String, Vec<&ResultRecord>)> {
    let mut groups: Vec<(String, Vec<&ResultRecord>)> = Vec::new();
    for record in records.iter().filter(|r| r.protocol.is_some()) {
        let name = record
            .scenario
            .clone()
            .unwrap_or_else(|| record.params().describe());
        match groups.iter_mut().find(|(n, _)| *n == name) {
            Some((_, members)) => members.push(record),
            None => groups.push((name, vec![record])),
        }
    }
    groups
}

/// One bar per (scenario, protocol) for `metric`, or one bar per scenario for
/// the fairness index when `metric` is `None`.
fn draw_grouped_bars<DB: DrawingBackend>(
    area: &DrawingArea<DB, Shift>,
    title: &str,
    y_desc: &str,
    scenarios: &[(String, Vec<&ResultRecord>)],
    protocols: &[String],
    metric: Option<Metric>,
) -> Result<()>
where
    DB::ErrorType: 'static,
{
    let mut bars: Vec<(f64, f64, f64, usize)> = Vec::new();
    let series = if metric.is_some() { protocols.len().max(1) } else { 1 };
    let width = 0.8 / series as f64;

    for (idx, (_, members)) in scenarios.iter().enumerate() {
        let left = idx as f64 - 0.4;
        match metric {
            Some(metric) => {
                for (slot, protocol) in protocols.iter().enumerate() {
                    let of_protocol = members
                        .iter()
                        .copied()
                        .filter(|r| r.protocol.as_deref() == Some(protocol.as_str()));
                    if let Some(stats) = MetricStats::of(of_protocol, metric) {
                        let x0 = left + slot as f64 * width;
                        bars.push((x0, x0 + width, stats.mean, slot));
                    }
                }
            }
            None => {
                if let Some(fairness) = members.iter().find_map(|r| r.fairness_index) {
                    bars.push((left, left + width, fairness, 0));
                }
            }
        }
    }

    let y_range = span(bars.iter().map(|b| b.2), true);
    let names: Vec<&str> = scenarios.iter().map(|(name, _)| name.as_str()).collect();
    let mut chart = ChartBuilder::on(area)
        .caption(title, ("sans-serif", 20))
        .margin(10)
        .x_label_area_size(40)
        .y_label_area_size(60)
        .build_cartesian_2d(-0.5..(scenarios.len() as f64 - 0.5), y_range)?;

    let label_scenario = |x: &f64| {
        let idx = x.round();
        if (x - idx).abs() < 1e-6 && idx >= 0.0 {
            names.get(idx as usize).map(|n| n.to_string()).unwrap_or_default()
        } else {
            String::new()
        }
    };
    chart
        .configure_mesh()
        .disable_x_mesh()
        .x_labels(scenarios.len() * 2 + 1)
        .x_label_formatter(&label_scenario)
        .y_desc(y_desc)
        .label_style(("sans-serif", 12))
        .draw()?;

    if metric.is_some() {
        for (slot, protocol) in protocols.iter().enumerate() {
            let color = Palette99::pick(slot);
            chart
                .draw_series(
                    bars.iter()
                        .filter(|b| b.3 == slot)
                        .map(|&(x0, x1, y, _)| Rectangle::new([(x0, 0.0), (x1, y)], color.filled())),
                )?
                .label(protocol.as_str())
                .legend(move |(x, y)| {
                    Rectangle::new([(x, y - 5), (x + 12, y + 5)], Palette99::pick(slot).filled())
                });
        }
        chart
            .configure_series_labels()
            .border_style(BLACK)
            .background_style(WHITE.mix(0.8))
            .draw()?;
    } else {
        chart.draw_series(
            bars.iter()
                .map(|&(x0, x1, y, _)| Rectangle::new([(x0, 0.0), (x1, y)], GREEN.mix(0.7).filled())),
        )?;
    }
    Ok(())
}

/// Per-scenario protocol comparison. Returns `false` without writing when no
/// record carries a protocol label.
pub fn render_protocol_panels(store: &ResultStore, path: &Path) -> Result<bool> {
    let scenarios = scenario_groups(store.records());
    if scenarios.is_empty() {
        return Ok(false);
    }
    let protocols: Vec<String> = store
        .aggregate(GroupKey::Protocol)
        .into_iter()
        .map(|g| g.value)
        .collect();

    let root = BitMapBackend::new(path, (PANEL_SIZE.0 * 2, PANEL_SIZE.1 * 2)).into_drawing_area();
    root.fill(&WHITE)?;
    let areas = root.split_evenly((2, 2));

    let panels = [
        ("Throughput by scenario", Some(Metric::Throughput)),
        ("Average delay by scenario", Some(Metric::Delay)),
        ("Loss rate by scenario", Some(Metric::LossRate)),
        ("Fairness index by scenario", None),
    ];
    for (area, (title, metric)) in areas.iter().zip(panels) {
        let y_desc = metric.map_or("Jain fairness index", metric_desc);
        draw_grouped_bars(area, title, y_desc, &scenarios, &protocols, metric)?;
    }

    root.present()?;
    Ok(true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Local;
    use netsim_lab_abstract::{Measurement, ParameterSet};

    fn record(packet_size: u32, interval: f64, throughput: f64) -> ResultRecord {
        let params = ParameterSet {
            packet_size,
            interval: Some(interval),
            ..Default::default()
        };
        let measurement = Measurement {
            throughput,
            avg_delay: 1.0,
            ..Default::default()
        };
        ResultRecord::new(&params, None, measurement, Local::now())
    }

    #[test]
    fn panels_cover_swept_axes_only() {
        let mut store = ResultStore::new();
        store.append(record(1024, 0.1, 0.08));
        store.append(record(64, 0.1, 0.005));
        store.append(record(512, 0.1, 0.04));

        let panels = sweep_panels(&store);

        let titles: Vec<_> = panels.iter().map(|p| p.title.as_str()).collect();
        assert_eq!(
            titles,
            [
                "Throughput (Mbps) vs packet_size",
                "Average delay (ms) vs packet_size",
                "Loss rate (%) vs packet_size",
            ]
        );
        assert_eq!(panels[0].points, vec![(64.0, 0.005), (512.0, 0.04), (1024.0, 0.08)]);
        assert!(panels[2].bars);
    }

    #[test]
    fn span_pads_and_keeps_zero_baseline() {
        let padded = span([2.0, 4.0].into_iter(), true);
        assert_eq!(padded.start, 0.0);
        assert!((padded.end - 4.2).abs() < 1e-9);
        assert_eq!(span(std::iter::empty(), true), 0.0..1.0);
        let single = span([5.0].into_iter(), false);
        assert!(single.start < 5.0 && single.end > 5.0);
    }

    #[test]
    fn protocol_runs_group_by_scenario() {
        let mut records = Vec::new();
        for (scenario, protocol) in [("Ideal", "TCP"), ("Ideal", "UDP"), ("Lossy", "TCP")] {
            let mut r = record(1024, 0.1, 1.0);
            r.scenario = Some(scenario.into());
            r.protocol = Some(protocol.into());
            records.push(r);
        }
        records.push(record(64, 0.1, 1.0));

        let groups = scenario_groups(&records);

        let shape: Vec<_> = groups.iter().map(|(n, m)| (n.as_str(), m.len())).collect();
        assert_eq!(shape, [("Ideal", 2), ("Lossy", 1)]);
    }

    #[test]
    fn nothing_to_draw_writes_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("plots.png");
        let mut store = ResultStore::new();
        store.append(record(64, 0.1, 1.0));
        assert!(!render_sweep_panels(&store, &path).unwrap());
        assert!(!render_protocol_panels(&store, &path).unwrap());
        assert!(!path.exists());
    }
}

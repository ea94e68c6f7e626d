use netsim_lab_abstract::{Measurement, Metric};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::NumberScanner;

/// Cells per protocol entry: name, throughput, delay, loss.
const CELLS_PER_PROTOCOL: usize = 4;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProtocolTableContract {
    /// Line opening a results section.
    pub marker: String,
    /// Tab rows starting with this token are column headers.
    pub header_token: String,
    /// Label of the fairness-index line closing a section.
    pub fairness_label: String,
}

impl Default for ProtocolTableContract {
    fn default() -> Self {
        Self {
            marker: "性能统计结果:".to_string(),
            header_token: "协议".to_string(),
            fairness_label: "公平性指数:".to_string(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Section {
    Outside,
    /// Inside a section, before any row.
    Open,
    /// At least one row read.
    Rows,
    /// Rows closed by a blank line; only a fairness line may still attach.
    Closed,
}

impl ProtocolTableContract {
    pub(crate) fn parse(&self, stdout: &str, numbers: &NumberScanner) -> Vec<Measurement> {
        let mut measurements: Vec<Measurement> = Vec::new();
        let mut section = Section::Outside;
        // Index of the first measurement of the current section.
        let mut section_start = 0;

        for line in stdout.lines() {
            if line.contains(&self.marker) {
                section = Section::Open;
                section_start = measurements.len();
                continue;
            }
            if section == Section::Outside {
                continue;
            }

            if line.contains(&self.fairness_label) {
                let fairness = line
                    .split_once(&self.fairness_label)
                    .and_then(|(_, rest)| numbers.first_decimal(rest));
                match fairness {
                    Some(value) => {
                        for measurement in &mut measurements[section_start..] {
                            measurement.fairness_index = Some(value);
                        }
                    }
                    None => warn!("No number after fairness label {:?}", self.fairness_label),
                }
                section = Section::Outside;
                continue;
            }

            if line.trim().is_empty() {
                if section == Section::Rows {
                    section = Section::Closed;
                }
                continue;
            }
            if section == Section::Closed
                || !line.contains('\t')
                || line.trim_start().starts_with(&self.header_token)
            {
                continue;
            }

            let cells: Vec<&str> = line
                .split('\t')
                .map(str::trim)
                .filter(|cell| !cell.is_empty())
                .collect();
            for chunk in cells.chunks(CELLS_PER_PROTOCOL) {
                if chunk.len() < CELLS_PER_PROTOCOL {
                    debug!("Ignoring incomplete protocol row cells {chunk:?}");
                    continue;
                }
                measurements.push(protocol_row(chunk));
                section = Section::Rows;
            }
        }

        measurements
    }
}

fn protocol_row(cells: &[&str]) -> Measurement {
    let mut missing = Vec::new();
    let protocol = cells[0];
    let mut cell = |metric: Metric, value: &str| -> f64 {
        value.parse().unwrap_or_else(|_| {
            warn!("Protocol {protocol}: {metric} cell {value:?} is not a number; using 0.0");
            missing.push(metric);
            0.0
        })
    };
    let throughput = cell(Metric::Throughput, cells[1]);
    let avg_delay = cell(Metric::Delay, cells[2]);
    let loss_rate = cell(Metric::LossRate, cells[3]);

    Measurement {
        protocol: Some(protocol.to_string()),
        throughput,
        avg_delay,
        loss_rate,
        missing,
        ..Default::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(stdout: &str) -> Vec<Measurement> {
        ProtocolTableContract::default().parse(stdout, &NumberScanner::new().unwrap())
    }

    #[test]
    fn two_rows_share_one_fairness_value() {
        let stdout = "性能统计结果:\n\
                      协议\t吞吐量(Mbps)\t平均延迟(ms)\t丢包率(%)\t公平性指数\n\
                      TCP\t8.5\t12.1\t0.2\n\
                      UDP\t9.1\t5.0\t1.5\n\
                      公平性指数: 0.9981\n";
        let rows = parse(stdout);
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].protocol.as_deref(), Some("TCP"));
        assert_eq!(rows[0].throughput, 8.5);
        assert_eq!(rows[0].avg_delay, 12.1);
        assert_eq!(rows[0].loss_rate, 0.2);
        assert_eq!(rows[1].protocol.as_deref(), Some("UDP"));
        assert_eq!(rows[1].loss_rate, 1.5);
        assert!(rows.iter().all(|row| row.fairness_index == Some(0.9981)));
    }

    #[test]
    fn protocols_printed_on_one_line_are_split_in_groups_of_four() {
        let stdout = "\n性能统计结果:\n\
                      协议\t吞吐量(Mbps)\t平均延迟(ms)\t丢包率(%)\t公平性指数\n\
                      TCP\t4.2310\t\t10.52\t\t0.00\t\tUDP\t0.8192\t\t2.31\t\t0.00\t\t\n\
                      公平性指数: 0.6868\n";
        let rows = parse(stdout);
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].throughput, 4.231);
        assert_eq!(rows[1].protocol.as_deref(), Some("UDP"));
        assert_eq!(rows[1].avg_delay, 2.31);
        assert_eq!(rows[1].fairness_index, Some(0.6868));
    }

    #[test]
    fn bad_cells_default_to_zero() {
        let rows = parse("性能统计结果:\nTCP\tnan?\t3.0\t-\n");
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].throughput, 0.0);
        assert_eq!(rows[0].avg_delay, 3.0);
        assert_eq!(rows[0].missing, vec![Metric::Throughput, Metric::LossRate]);
        assert_eq!(rows[0].fairness_index, None);
    }

    #[test]
    fn rows_outside_a_section_are_ignored() {
        let stdout = "TCP\t1.0\t1.0\t1.0\n性能统计结果:\n\nUDP\t2.0\t2.0\t2.0\n\nTCP\t3.0\t3.0\t3.0\n";
        let rows = parse(stdout);
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].protocol.as_deref(), Some("UDP"));
    }

    #[test]
    fn fairness_attaches_only_to_its_own_section() {
        let stdout = "性能统计结果:\nTCP\t1.0\t1.0\t0.0\n公平性指数: 1.0\n\
                      性能统计结果:\nUDP\t2.0\t2.0\t0.0\n\n公平性指数: 0.5\n";
        let rows = parse(stdout);
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].fairness_index, Some(1.0));
        assert_eq!(rows[1].fairness_index, Some(0.5));
    }

    #[test]
    fn fairness_before_any_row_is_not_carried_over() {
        let stdout = "性能统计结果:\n公平性指数: 0.9\n\
                      性能统计结果:\nTCP\t1.0\t1.0\t0.0\n";
        let rows = parse(stdout);
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].fairness_index, None);
    }

    #[test]
    fn marker_without_rows_yields_nothing() {
        assert!(parse("性能统计结果:\n协议\t吞吐量\n公平性指数: 0.0\n").is_empty());
        assert!(parse("").is_empty());
    }
}

use anyhow::{Context, Result};
use netsim_lab_abstract::{Metric, ResultRecord, quantity_value};
use std::cmp::Ordering;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::info;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExportFormat {
    Csv,
    Json,
}

impl ExportFormat {
    pub fn extension(&self) -> &'static str {
        match self {
            ExportFormat::Csv => "csv",
            ExportFormat::Json => "json",
        }
    }
}

/// Record field a summary can be grouped by.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum GroupKey {
    PacketSize,
    Interval,
    DataRate,
    Delay,
    ErrorRate,
    TcpAlgorithm,
    Protocol,
    Scenario,
}

impl GroupKey {
    /// Keys that correspond to a swept simulator input.
    pub const AXES: [GroupKey; 6] = [
        GroupKey::PacketSize,
        GroupKey::Interval,
        GroupKey::DataRate,
        GroupKey::Delay,
        GroupKey::ErrorRate,
        GroupKey::TcpAlgorithm,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            GroupKey::PacketSize => "packet_size",
            GroupKey::Interval => "interval",
            GroupKey::DataRate => "data_rate",
            GroupKey::Delay => "delay",
            GroupKey::ErrorRate => "error_rate",
            GroupKey::TcpAlgorithm => "tcp_algorithm",
            GroupKey::Protocol => "protocol",
            GroupKey::Scenario => "scenario",
        }
    }

    /// Whether groups under this key have a numeric order.
    pub fn is_ordered(&self) -> bool {
        !matches!(
            self,
            GroupKey::TcpAlgorithm | GroupKey::Protocol | GroupKey::Scenario
        )
    }

    /// Display value and sort value of `record` under this key.
    fn value_of(&self, record: &ResultRecord) -> Option<(String, Option<f64>)> {
        match self {
            GroupKey::PacketSize => Some((
                record.packet_size.to_string(),
                Some(f64::from(record.packet_size)),
            )),
            GroupKey::Interval => record.interval.map(|v| (v.to_string(), Some(v))),
            GroupKey::DataRate => record
                .data_rate
                .as_ref()
                .map(|v| (v.clone(), quantity_value(v))),
            GroupKey::Delay => record
                .delay
                .as_ref()
                .map(|v| (v.clone(), quantity_value(v))),
            GroupKey::ErrorRate => record.error_rate.map(|v| (v.to_string(), Some(v))),
            GroupKey::TcpAlgorithm => record.tcp_algorithm.map(|v| (v.to_string(), None)),
            GroupKey::Protocol => record.protocol.clone().map(|v| (v, None)),
            GroupKey::Scenario => record.scenario.clone().map(|v| (v, None)),
        }
    }
}

impl fmt::Display for GroupKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MetricStats {
    pub samples: usize,
    pub mean: f64,
    pub min: f64,
    pub max: f64,
}

impl MetricStats {
    pub fn from_values(values: impl IntoIterator<Item = f64>) -> Option<Self> {
        let mut samples = 0;
        let mut sum = 0.0;
        let mut min = f64::INFINITY;
        let mut max = f64::NEG_INFINITY;
        for value in values {
            samples += 1;
            sum += value;
            min = min.min(value);
            max = max.max(value);
        }
        (samples > 0).then(|| MetricStats {
            samples,
            mean: sum / samples as f64,
            min,
            max,
        })
    }

    /// Stats of `metric` over `records`, skipping records that did not report it.
    pub fn of<'a>(
        records: impl IntoIterator<Item = &'a ResultRecord>,
        metric: Metric,
    ) -> Option<Self> {
        Self::from_values(records.into_iter().filter_map(|r| r.metric(metric)))
    }
}

/// Statistics for the records sharing one value of a [`GroupKey`].
#[derive(Debug, Clone, PartialEq)]
pub struct GroupSummary {
    pub key: GroupKey,
    pub value: String,
    /// Numeric position of `value`, when the key is ordered and the value parses.
    pub numeric: Option<f64>,
    pub count: usize,
    pub throughput: Option<MetricStats>,
    pub delay: Option<MetricStats>,
    pub loss_rate: Option<MetricStats>,
}

impl GroupSummary {
    pub fn stats(&self, metric: Metric) -> Option<&MetricStats> {
        match metric {
            Metric::Throughput => self.throughput.as_ref(),
            Metric::Delay => self.delay.as_ref(),
            Metric::LossRate => self.loss_rate.as_ref(),
            Metric::ReceivedPackets | Metric::TotalBytes => None,
        }
    }
}

/// Records collected during one automation run, in arrival order.
#[derive(Debug, Clone, Default)]
pub struct ResultStore {
    records: Vec<ResultRecord>,
}

impl ResultStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn append(&mut self, record: ResultRecord) {
        self.records.push(record);
    }

    pub fn records(&self) -> &[ResultRecord] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Write all records to `path`. Returns `None` without touching the
    /// filesystem when the store is empty.
    pub fn export(&self, format: ExportFormat, path: &Path) -> Result<Option<PathBuf>> {
        if self.records.is_empty() {
            info!("No results, nothing to save");
            return Ok(None);
        }

        match format {
            ExportFormat::Csv => {
                let mut writer = csv::Writer::from_path(path)
                    .with_context(|| format!("Failed to open CSV file {}", path.display()))?;
                for record in &self.records {
                    writer
                        .serialize(record)
                        .context("Failed to serialize result row")?;
                }
                writer
                    .flush()
                    .with_context(|| format!("Failed to write CSV file {}", path.display()))?;
            }
            ExportFormat::Json => {
                let data = serde_json::to_vec_pretty(&self.records)
                    .context("Failed to serialize results")?;
                fs::write(path, &data)
                    .with_context(|| format!("Failed to write JSON file {}", path.display()))?;
            }
        }

        info!(
            "Saved {} results to {}",
            self.records.len(),
            path.display()
        );
        Ok(Some(path.to_path_buf()))
    }

    /// Export both formats as `<dir>/<prefix>_results_<stamp>.{csv,json}`.
    pub fn export_all(&self, dir: &Path, prefix: &str, stamp: &str) -> Result<Vec<PathBuf>> {
        let mut written = Vec::new();
        for format in [ExportFormat::Csv, ExportFormat::Json] {
            let path = dir.join(format!(
                "{prefix}_results_{stamp}.{}",
                format.extension()
            ));
            if let Some(path) = self.export(format, &path)? {
                written.push(path);
            }
        }
        Ok(written)
    }

    /// Read records back from a CSV written by [`ResultStore::export`].
    ///
    /// The exported files do not carry [`ResultRecord::missing`]: a metric
    /// the simulator never reported was written as 0 and reads back as a
    /// measured 0, so it counts towards [`ResultStore::aggregate`].
    pub fn load_csv(path: &Path) -> Result<Self> {
        let mut reader = csv::Reader::from_path(path)
            .with_context(|| format!("Failed to open CSV file {}", path.display()))?;
        let records = reader
            .deserialize()
            .collect::<Result<Vec<ResultRecord>, _>>()
            .with_context(|| format!("Failed to parse CSV file {}", path.display()))?;
        Ok(Self { records })
    }

    /// Group records by `key`. Records without the field are left out.
    pub fn aggregate(&self, key: GroupKey) -> Vec<GroupSummary> {
        let mut groups: Vec<(String, Option<f64>, Vec<&ResultRecord>)> = Vec::new();
        for record in &self.records {
            let Some((value, numeric)) = key.value_of(record) else {
                continue;
            };
            match groups.iter_mut().find(|(v, _, _)| *v == value) {
                Some((_, _, members)) => members.push(record),
                None => groups.push((value, numeric, vec![record])),
            }
        }

        if key.is_ordered() {
            // Stable: unparseable values keep first-appearance order at the end.
            groups.sort_by(|(_, a, _), (_, b, _)| match (a, b) {
                (Some(a), Some(b)) => a.total_cmp(b),
                (Some(_), None) => Ordering::Less,
                (None, Some(_)) => Ordering::Greater,
                (None, None) => Ordering::Equal,
            });
        }

        groups
            .into_iter()
            .map(|(value, numeric, members)| GroupSummary {
                key,
                value,
                numeric,
                count: members.len(),
                throughput: MetricStats::of(members.iter().copied(), Metric::Throughput),
                delay: MetricStats::of(members.iter().copied(), Metric::Delay),
                loss_rate: MetricStats::of(members.iter().copied(), Metric::LossRate),
            })
            .collect()
    }
}

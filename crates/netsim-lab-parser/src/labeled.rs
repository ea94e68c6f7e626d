use netsim_lab_abstract::{Measurement, Metric};
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::NumberScanner;

/// Label prefixes for the labeled-line contract. Each label includes its colon.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LabelSet {
    pub throughput: String,
    pub delay: String,
    pub loss_rate: String,
    pub received_packets: String,
    pub total_bytes: String,
}

impl Default for LabelSet {
    /// Labels printed by the link-sweep scenario's statistics block.
    fn default() -> Self {
        Self {
            throughput: "网络吞吐量:".to_string(),
            delay: "平均延迟:".to_string(),
            loss_rate: "丢包率:".to_string(),
            received_packets: "接收数据包总数:".to_string(),
            total_bytes: "总接收字节数:".to_string(),
        }
    }
}

impl LabelSet {
    /// Labels printed by FlowMonitor-style English statistics.
    pub fn english() -> Self {
        Self {
            throughput: "Throughput:".to_string(),
            delay: "Mean Delay:".to_string(),
            loss_rate: "Packet Loss Rate:".to_string(),
            received_packets: "Rx Packets:".to_string(),
            total_bytes: "Rx Bytes:".to_string(),
        }
    }

    pub fn label(&self, metric: Metric) -> &str {
        match metric {
            Metric::Throughput => &self.throughput,
            Metric::Delay => &self.delay,
            Metric::LossRate => &self.loss_rate,
            Metric::ReceivedPackets => &self.received_packets,
            Metric::TotalBytes => &self.total_bytes,
        }
    }

    pub(crate) fn parse(&self, stdout: &str, numbers: &NumberScanner) -> Option<Measurement> {
        let mut lookup = Lookup {
            stdout,
            numbers,
            labels: self,
            matched: 0,
            missing: Vec::new(),
        };

        let throughput = lookup.decimal(Metric::Throughput);
        let avg_delay = lookup.decimal(Metric::Delay);
        let loss_rate = lookup.decimal(Metric::LossRate);
        let received_packets = lookup.integer(Metric::ReceivedPackets);
        let total_bytes = lookup.integer(Metric::TotalBytes);

        if lookup.matched == 0 {
            warn!("Simulator output carries none of the expected labels");
            return None;
        }

        Some(Measurement {
            throughput,
            avg_delay,
            loss_rate,
            received_packets: Some(received_packets),
            total_bytes: Some(total_bytes),
            missing: lookup.missing,
            ..Default::default()
        })
    }
}

/// Text following `label` on the first line that contains it.
fn text_after<'a>(stdout: &'a str, label: &str) -> Option<&'a str> {
    let line = stdout.lines().find(|line| line.contains(label))?;
    line.split_once(label).map(|(_, rest)| rest)
}

pub(crate) fn find_decimal(stdout: &str, label: &str, numbers: &NumberScanner) -> Option<f64> {
    text_after(stdout, label).and_then(|rest| numbers.first_decimal(rest))
}

struct Lookup<'a> {
    stdout: &'a str,
    numbers: &'a NumberScanner,
    labels: &'a LabelSet,
    matched: usize,
    missing: Vec<Metric>,
}

impl Lookup<'_> {
    fn value<T: Default>(&mut self, metric: Metric, scan: impl Fn(&str) -> Option<T>) -> T {
        let label = self.labels.label(metric);
        let Some(rest) = text_after(self.stdout, label) else {
            warn!("Label {label:?} not found; {metric} recorded as 0 (no data)");
            self.missing.push(metric);
            return T::default();
        };
        self.matched += 1;
        match scan(rest) {
            Some(value) => value,
            None => {
                warn!("No number after label {label:?}; {metric} recorded as 0 (no data)");
                self.missing.push(metric);
                T::default()
            }
        }
    }

    fn decimal(&mut self, metric: Metric) -> f64 {
        let numbers = self.numbers;
        self.value(metric, |rest| numbers.first_decimal(rest))
    }

    fn integer(&mut self, metric: Metric) -> u64 {
        let numbers = self.numbers;
        self.value(metric, |rest| numbers.first_integer(rest))
    }
}

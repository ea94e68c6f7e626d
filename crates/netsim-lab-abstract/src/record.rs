use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::config::{CongestionControl, ParameterSet};

/// Output metrics a simulator run can report.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Metric {
    Throughput,
    Delay,
    LossRate,
    ReceivedPackets,
    TotalBytes,
}

impl Metric {
    pub fn unit(&self) -> &'static str {
        match self {
            Metric::Throughput => "Mbps",
            Metric::Delay => "ms",
            Metric::LossRate => "%",
            Metric::ReceivedPackets => "packets",
            Metric::TotalBytes => "bytes",
        }
    }
}

impl fmt::Display for Metric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Metric::Throughput => "throughput",
            Metric::Delay => "delay",
            Metric::LossRate => "loss rate",
            Metric::ReceivedPackets => "received packets",
            Metric::TotalBytes => "total bytes",
        };
        f.write_str(name)
    }
}

/// Inputs the simulator repeats back in its CSV row.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EchoedInputs {
    pub packet_size: u32,
    pub interval: f64,
}

/// Metrics parsed from one simulator run, for one protocol.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Measurement {
    pub protocol: Option<String>,
    pub throughput: f64,
    pub avg_delay: f64,
    pub loss_rate: f64,
    pub received_packets: Option<u64>,
    pub total_bytes: Option<u64>,
    pub fairness_index: Option<f64>,
    /// Metrics the output did not carry; their value above is a placeholder zero.
    pub missing: Vec<Metric>,
    pub echoed: Option<EchoedInputs>,
}

/// One exported row: the inputs of a run plus its measured outputs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResultRecord {
    pub scenario: Option<String>,
    pub protocol: Option<String>,
    pub packet_size: u32,
    pub interval: Option<f64>,
    pub max_packets: Option<u32>,
    pub simulation_time: Option<f64>,
    pub data_rate: Option<String>,
    pub delay: Option<String>,
    pub error_rate: Option<f64>,
    pub tcp_algorithm: Option<CongestionControl>,
    pub throughput: f64,
    pub avg_delay: f64,
    pub loss_rate: f64,
    pub received_packets: Option<u64>,
    pub total_bytes: Option<u64>,
    pub fairness_index: Option<f64>,
    pub timestamp: DateTime<Local>,
    /// Metrics the run did not report. Not exported; the field holds 0.
    #[serde(skip)]
    pub missing: Vec<Metric>,
}

impl ResultRecord {
    pub fn new(
        params: &ParameterSet,
        scenario: Option<&str>,
        measurement: Measurement,
        timestamp: DateTime<Local>,
    ) -> Self {
        Self {
            scenario: scenario.map(str::to_string),
            protocol: measurement.protocol,
            packet_size: params.packet_size,
            interval: params.interval,
            max_packets: params.max_packets,
            simulation_time: params.simulation_time,
            data_rate: params.data_rate.clone(),
            delay: params.delay.clone(),
            error_rate: params.error_rate,
            tcp_algorithm: params.tcp_algorithm,
            throughput: measurement.throughput,
            avg_delay: measurement.avg_delay,
            loss_rate: measurement.loss_rate,
            received_packets: measurement.received_packets,
            total_bytes: measurement.total_bytes,
            fairness_index: measurement.fairness_index,
            timestamp,
            missing: measurement.missing,
        }
    }

    /// The parameter set this record was produced from.
    pub fn params(&self) -> ParameterSet {
        ParameterSet {
            packet_size: self.packet_size,
            interval: self.interval,
            max_packets: self.max_packets,
            simulation_time: self.simulation_time,
            data_rate: self.data_rate.clone(),
            delay: self.delay.clone(),
            error_rate: self.error_rate,
            tcp_algorithm: self.tcp_algorithm,
        }
    }

    /// Measured value of `metric`, or `None` when the run did not report it.
    pub fn metric(&self, metric: Metric) -> Option<f64> {
        if self.missing.contains(&metric) {
            return None;
        }
        match metric {
            Metric::Throughput => Some(self.throughput),
            Metric::Delay => Some(self.avg_delay),
            Metric::LossRate => Some(self.loss_rate),
            Metric::ReceivedPackets => self.received_packets.map(|v| v as f64),
            Metric::TotalBytes => self.total_bytes.map(|v| v as f64),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_params() -> ParameterSet {
        ParameterSet {
            packet_size: 2048,
            max_packets: Some(100),
            simulation_time: Some(20.0),
            data_rate: Some("10Mbps".into()),
            delay: Some("2ms".into()),
            ..Default::default()
        }
    }

    #[test]
    fn record_echoes_its_parameter_set() {
        let params = sample_params();
        let measurement = Measurement {
            throughput: 0.8,
            avg_delay: 3.4,
            loss_rate: 0.0,
            received_packets: Some(100),
            total_bytes: Some(204800),
            ..Default::default()
        };
        let record = ResultRecord::new(&params, None, measurement, Local::now());
        assert_eq!(record.params(), params);
        assert_eq!(record.received_packets, Some(100));
        assert!(record.protocol.is_none());
    }

    #[test]
    fn missing_metrics_read_as_absent() {
        let measurement = Measurement {
            throughput: 1.5,
            missing: vec![Metric::Delay],
            ..Default::default()
        };
        let record = ResultRecord::new(&sample_params(), None, measurement, Local::now());
        assert_eq!(record.metric(Metric::Throughput), Some(1.5));
        assert_eq!(record.metric(Metric::Delay), None);
        assert_eq!(record.avg_delay, 0.0);
        assert_eq!(record.metric(Metric::TotalBytes), None);
    }
}

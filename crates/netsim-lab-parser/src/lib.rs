//! Line grammar for simulator stdout.
//!
//! A run's stdout is matched against exactly one [`OutputContract`]:
//!
//! * `csv_row` - `packet_size,interval,throughput,delay,loss_rate` rows after a
//!   header line; the first valid row wins.
//! * `labeled` - free text with one `label: number` line per metric.
//! * `protocol_table` - a results section of tab-separated protocol rows closed
//!   by a fairness-index line.
//!
//! Parsing never fails on malformed input: bad lines are skipped and absent
//! metrics read as zero while being listed in [`Measurement::missing`].

pub mod csv_row;
pub mod labeled;
pub mod table;

use netsim_lab_abstract::Measurement;
use regex::Regex;
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub use csv_row::{CsvRow, CsvRowContract, RowError};
pub use labeled::LabelSet;
pub use table::ProtocolTableContract;

/// Bumped whenever a contract's accepted input changes.
pub const GRAMMAR_VERSION: u32 = 1;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum OutputContract {
    CsvRow(CsvRowContract),
    Labeled(LabelSet),
    ProtocolTable(ProtocolTableContract),
}

impl OutputContract {
    pub fn name(&self) -> &'static str {
        match self {
            OutputContract::CsvRow(_) => "csv_row",
            OutputContract::Labeled(_) => "labeled",
            OutputContract::ProtocolTable(_) => "protocol_table",
        }
    }
}

#[derive(Debug, Error)]
pub enum GrammarError {
    #[error("invalid number pattern: {0}")]
    Pattern(#[from] regex::Error),
}

/// Number patterns shared by the contracts.
#[derive(Debug, Clone)]
pub(crate) struct NumberScanner {
    decimal: Regex,
    integer: Regex,
}

impl NumberScanner {
    fn new() -> Result<Self, GrammarError> {
        Ok(Self {
            decimal: Regex::new(r"\d+(?:\.\d+)?(?:[eE][-+]?\d+)?")?,
            integer: Regex::new(r"\d+")?,
        })
    }

    pub(crate) fn first_decimal(&self, text: &str) -> Option<f64> {
        self.decimal
            .find(text)
            .and_then(|m| m.as_str().parse().ok())
    }

    pub(crate) fn first_integer(&self, text: &str) -> Option<u64> {
        self.integer
            .find(text)
            .and_then(|m| m.as_str().parse().ok())
    }
}

/// A contract with its patterns compiled, ready to parse many runs.
#[derive(Debug, Clone)]
pub struct OutputParser {
    contract: OutputContract,
    numbers: NumberScanner,
}

impl OutputParser {
    pub fn new(contract: OutputContract) -> Result<Self, GrammarError> {
        Ok(Self {
            contract,
            numbers: NumberScanner::new()?,
        })
    }

    pub fn contract(&self) -> &OutputContract {
        &self.contract
    }

    /// Measurements found in one run's stdout; empty when the output does not
    /// match the contract.
    pub fn parse(&self, stdout: &str) -> Vec<Measurement> {
        match &self.contract {
            OutputContract::CsvRow(contract) => contract.parse(stdout).into_iter().collect(),
            OutputContract::Labeled(labels) => {
                labels.parse(stdout, &self.numbers).into_iter().collect()
            }
            OutputContract::ProtocolTable(contract) => contract.parse(stdout, &self.numbers),
        }
    }

    /// Value of the first number after `label` on the first line containing
    /// it, or `0.0` when there is none.
    pub fn labeled_metric(&self, stdout: &str, label: &str) -> f64 {
        labeled::find_decimal(stdout, label, &self.numbers).unwrap_or(0.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn number_scanner_takes_first_number() {
        let numbers = NumberScanner::new().unwrap();
        assert_eq!(numbers.first_decimal(" 0.8192 Mbps"), Some(0.8192));
        assert_eq!(numbers.first_decimal(" 12%"), Some(12.0));
        assert_eq!(numbers.first_decimal(" 1.5e-05 Mbps"), Some(1.5e-5));
        assert_eq!(numbers.first_decimal(" n/a"), None);
        assert_eq!(numbers.first_integer(" 204800 字节"), Some(204800));
    }

    #[test]
    fn labeled_metric_defaults_to_zero() {
        let parser = OutputParser::new(OutputContract::Labeled(LabelSet::default())).unwrap();
        let stdout = "仿真时间: 20 秒\n平均延迟: 3.25 ms\n";
        assert_eq!(parser.labeled_metric(stdout, "平均延迟:"), 3.25);
        assert_eq!(parser.labeled_metric(stdout, "网络吞吐量:"), 0.0);
        assert_eq!(parser.labeled_metric("", "丢包率:"), 0.0);
    }

    #[test]
    fn contract_is_selected_by_kind_tag() {
        let contract: OutputContract = toml::from_str(
            r#"
            kind = "labeled"
            throughput = "Throughput:"
            "#,
        )
        .unwrap();
        match contract {
            OutputContract::Labeled(labels) => {
                assert_eq!(labels.throughput, "Throughput:");
                assert_eq!(labels.delay, LabelSet::default().delay);
            }
            other => panic!("unexpected contract {other:?}"),
        }

        let contract: OutputContract = toml::from_str(r#"kind = "csv_row""#).unwrap();
        assert_eq!(contract.name(), "csv_row");
    }

    #[test]
    fn dispatches_to_protocol_table() {
        let parser =
            OutputParser::new(OutputContract::ProtocolTable(ProtocolTableContract::default()))
                .unwrap();
        let stdout = "性能统计结果:\nTCP\t8.5\t12.1\t0.2\n公平性指数: 0.9\n";
        let measurements = parser.parse(stdout);
        assert_eq!(measurements.len(), 1);
        assert_eq!(measurements[0].protocol.as_deref(), Some("TCP"));
    }
}

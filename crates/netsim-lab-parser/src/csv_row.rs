use netsim_lab_abstract::{EchoedInputs, Measurement};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, warn};

/// Fields per data row: packet size, interval, throughput, delay, loss rate.
pub const FIELD_COUNT: usize = 5;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CsvRowContract {
    /// Lines starting with this token are headers.
    pub header_token: String,
}

impl Default for CsvRowContract {
    fn default() -> Self {
        Self {
            header_token: "PACKET_SIZE".to_string(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CsvRow {
    pub packet_size: u32,
    pub interval: f64,
    pub throughput: f64,
    pub delay: f64,
    pub loss_rate: f64,
}

impl From<CsvRow> for Measurement {
    fn from(row: CsvRow) -> Self {
        Measurement {
            throughput: row.throughput,
            avg_delay: row.delay,
            loss_rate: row.loss_rate,
            echoed: Some(EchoedInputs {
                packet_size: row.packet_size,
                interval: row.interval,
            }),
            ..Default::default()
        }
    }
}

#[derive(Debug, Error, PartialEq)]
pub enum RowError {
    #[error("expected 5 comma-separated fields, found {0}")]
    FieldCount(usize),
    #[error("field `{field}` is not a valid {kind}: '{value}'")]
    InvalidField {
        field: &'static str,
        kind: &'static str,
        value: String,
    },
}

fn float_field(field: &'static str, value: &str) -> Result<f64, RowError> {
    value.parse().map_err(|_| RowError::InvalidField {
        field,
        kind: "float",
        value: value.to_string(),
    })
}

/// Parse one `packet_size,interval,throughput,delay,loss_rate` line.
pub fn parse_row(line: &str) -> Result<CsvRow, RowError> {
    let fields: Vec<&str> = line.split(',').map(str::trim).collect();
    if fields.len() != FIELD_COUNT {
        return Err(RowError::FieldCount(fields.len()));
    }
    let packet_size = fields[0].parse().map_err(|_| RowError::InvalidField {
        field: "packet_size",
        kind: "integer",
        value: fields[0].to_string(),
    })?;
    Ok(CsvRow {
        packet_size,
        interval: float_field("interval", fields[1])?,
        throughput: float_field("throughput", fields[2])?,
        delay: float_field("delay", fields[3])?,
        loss_rate: float_field("loss_rate", fields[4])?,
    })
}

impl CsvRowContract {
    fn is_header(&self, line: &str) -> bool {
        !self.header_token.is_empty() && line.starts_with(&self.header_token)
    }

    /// First valid data row of the output.
    pub fn first_row(&self, stdout: &str) -> Option<CsvRow> {
        for line in stdout.lines() {
            if line.trim().is_empty() || self.is_header(line) {
                continue;
            }
            match parse_row(line) {
                Ok(row) => return Some(row),
                Err(RowError::FieldCount(_)) => {}
                Err(err) => warn!("Skipping result line: {err} (line: {line:?})"),
            }
        }
        debug!("No CSV data row found in simulator output");
        None
    }

    pub fn parse(&self, stdout: &str) -> Option<Measurement> {
        self.first_row(stdout).map(Measurement::from)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn well_formed_row_parses_exactly() {
        let row = parse_row("64,0.1,12.5,3.2,0.0").unwrap();
        assert_eq!(
            row,
            CsvRow {
                packet_size: 64,
                interval: 0.1,
                throughput: 12.5,
                delay: 3.2,
                loss_rate: 0.0,
            }
        );
    }

    #[test]
    fn invalid_fields_are_reported() {
        assert_eq!(parse_row("a,b"), Err(RowError::FieldCount(2)));
        assert_eq!(
            parse_row("64.5,0.1,1,1,0"),
            Err(RowError::InvalidField {
                field: "packet_size",
                kind: "integer",
                value: "64.5".into(),
            })
        );
        assert!(matches!(
            parse_row("64,0.1,fast,1,0"),
            Err(RowError::InvalidField { field: "throughput", .. })
        ));
    }

    #[test]
    fn header_without_data_yields_nothing() {
        let contract = CsvRowContract::default();
        let stdout = "PACKET_SIZE,INTERVAL,THROUGHPUT,DELAY,LOSS_RATE\n\n";
        assert!(contract.parse(stdout).is_none());
    }

    #[test]
    fn first_valid_row_wins_after_bad_lines() {
        let contract = CsvRowContract::default();
        let stdout = "Starting simulation with parameters:\n\
                      PACKET_SIZE,INTERVAL,THROUGHPUT,DELAY,LOSS_RATE\n\
                      128,0.1,oops,2.0,0.0\n\
                      128,0.1,0.0102,2.15,0.0\n\
                      256,0.1,0.0204,2.30,0.0\n";
        let measurement = contract.parse(stdout).unwrap();
        assert_eq!(measurement.throughput, 0.0102);
        assert_eq!(measurement.avg_delay, 2.15);
        assert_eq!(
            measurement.echoed,
            Some(EchoedInputs {
                packet_size: 128,
                interval: 0.1
            })
        );
        assert!(measurement.missing.is_empty());
        assert!(measurement.received_packets.is_none());
    }
}

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// TCP congestion-control variants understood by the simulator's `--tcpAlgorithm` flag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CongestionControl {
    NewReno,
    Cubic,
    Vegas,
    Bic,
    Westwood,
}

impl CongestionControl {
    pub const ALL: [CongestionControl; 5] = [
        CongestionControl::NewReno,
        CongestionControl::Cubic,
        CongestionControl::Vegas,
        CongestionControl::Bic,
        CongestionControl::Westwood,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            CongestionControl::NewReno => "NewReno",
            CongestionControl::Cubic => "Cubic",
            CongestionControl::Vegas => "Vegas",
            CongestionControl::Bic => "Bic",
            CongestionControl::Westwood => "Westwood",
        }
    }
}

impl fmt::Display for CongestionControl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Error)]
#[error("unknown congestion-control variant '{0}' (expected NewReno, Cubic, Vegas, Bic or Westwood)")]
pub struct UnknownVariant(pub String);

impl FromStr for CongestionControl {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        CongestionControl::ALL
            .into_iter()
            .find(|variant| variant.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| UnknownVariant(s.to_string()))
    }
}

/// One combination of simulator inputs. Every present field becomes a
/// `--flag=value` argument, in declaration order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParameterSet {
    pub packet_size: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub interval: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_packets: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub simulation_time: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data_rate: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub delay: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_rate: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tcp_algorithm: Option<CongestionControl>,
}

impl Default for ParameterSet {
    fn default() -> Self {
        Self {
            packet_size: 1024,
            interval: None,
            max_packets: None,
            simulation_time: None,
            data_rate: None,
            delay: None,
            error_rate: None,
            tcp_algorithm: None,
        }
    }
}

impl ParameterSet {
    /// Simulator command-line flags for this parameter set.
    pub fn to_flags(&self) -> Vec<String> {
        let mut flags = vec![format!("--packetSize={}", self.packet_size)];
        if let Some(v) = self.interval {
            flags.push(format!("--interval={v}"));
        }
        if let Some(v) = self.max_packets {
            flags.push(format!("--maxPackets={v}"));
        }
        if let Some(v) = self.simulation_time {
            flags.push(format!("--simulationTime={v}"));
        }
        if let Some(v) = &self.data_rate {
            flags.push(format!("--dataRate={v}"));
        }
        if let Some(v) = &self.delay {
            flags.push(format!("--delay={v}"));
        }
        if let Some(v) = self.error_rate {
            flags.push(format!("--errorRate={v}"));
        }
        if let Some(v) = self.tcp_algorithm {
            flags.push(format!("--tcpAlgorithm={v}"));
        }
        flags
    }

    /// Short human-readable description used in progress logs.
    pub fn describe(&self) -> String {
        let mut parts = vec![format!("packet_size={}B", self.packet_size)];
        if let Some(v) = self.interval {
            parts.push(format!("interval={v}s"));
        }
        if let Some(v) = self.max_packets {
            parts.push(format!("max_packets={v}"));
        }
        if let Some(v) = self.simulation_time {
            parts.push(format!("simulation_time={v}s"));
        }
        if let Some(v) = &self.data_rate {
            parts.push(format!("data_rate={v}"));
        }
        if let Some(v) = &self.delay {
            parts.push(format!("delay={v}"));
        }
        if let Some(v) = self.error_rate {
            parts.push(format!("error_rate={v}"));
        }
        if let Some(v) = self.tcp_algorithm {
            parts.push(format!("tcp_algorithm={v}"));
        }
        parts.join(", ")
    }
}

/// Numeric value of a simulator unit token such as `10Mbps` or `2ms`, in base
/// units (bits per second, seconds). Used only for ordering.
pub fn quantity_value(token: &str) -> Option<f64> {
    let token = token.trim();
    let split = token
        .find(|c: char| !(c.is_ascii_digit() || c == '.'))
        .unwrap_or(token.len());
    let (number, unit) = token.split_at(split);
    let value: f64 = number.parse().ok()?;
    let scale = match unit.trim().to_ascii_lowercase().as_str() {
        "" | "bps" | "s" => 1.0,
        "kbps" => 1e3,
        "mbps" => 1e6,
        "gbps" => 1e9,
        "ms" => 1e-3,
        "us" => 1e-6,
        "ns" => 1e-9,
        _ => return None,
    };
    Some(value * scale)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flags_follow_declaration_order_and_skip_absent_fields() {
        let params = ParameterSet {
            packet_size: 512,
            max_packets: Some(100),
            data_rate: Some("5Mbps".into()),
            delay: Some("2ms".into()),
            tcp_algorithm: Some(CongestionControl::Cubic),
            ..Default::default()
        };
        assert_eq!(
            params.to_flags(),
            vec![
                "--packetSize=512",
                "--maxPackets=100",
                "--dataRate=5Mbps",
                "--delay=2ms",
                "--tcpAlgorithm=Cubic",
            ]
        );
    }

    #[test]
    fn float_flags_render_without_padding() {
        let params = ParameterSet {
            packet_size: 64,
            interval: Some(0.01),
            error_rate: Some(0.005),
            ..Default::default()
        };
        let flags = params.to_flags();
        assert!(flags.contains(&"--interval=0.01".to_string()));
        assert!(flags.contains(&"--errorRate=0.005".to_string()));
    }

    #[test]
    fn congestion_control_parses_case_insensitively() {
        assert_eq!(
            "newreno".parse::<CongestionControl>().unwrap(),
            CongestionControl::NewReno
        );
        assert!("Reno2".parse::<CongestionControl>().is_err());
    }

    #[test]
    fn quantity_tokens_order_by_magnitude() {
        assert_eq!(quantity_value("10Mbps"), Some(10e6));
        assert_eq!(quantity_value("500Kbps"), Some(500e3));
        assert_eq!(quantity_value("2ms"), Some(2e-3));
        assert_eq!(quantity_value("fast"), None);
        assert!(quantity_value("1Mbps") < quantity_value("5Mbps"));
    }
}

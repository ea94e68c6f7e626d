use crate::config::{CongestionControl, ParameterSet};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Partial parameter set layered over a profile's defaults.
#[derive(Deserialize, Serialize, Debug, Clone, Default, PartialEq)]
pub struct ParameterOverride {
    pub packet_size: Option<u32>,
    pub interval: Option<f64>,
    pub max_packets: Option<u32>,
    pub simulation_time: Option<f64>,
    pub data_rate: Option<String>,
    pub delay: Option<String>,
    pub error_rate: Option<f64>,
    pub tcp_algorithm: Option<CongestionControl>,
}

impl ParameterOverride {
    pub fn apply_to(&self, params: &mut ParameterSet) {
        if let Some(v) = self.packet_size {
            params.packet_size = v;
        }
        if let Some(v) = self.interval {
            params.interval = Some(v);
        }
        if let Some(v) = self.max_packets {
            params.max_packets = Some(v);
        }
        if let Some(v) = self.simulation_time {
            params.simulation_time = Some(v);
        }
        if let Some(v) = &self.data_rate {
            params.data_rate = Some(v.clone());
        }
        if let Some(v) = &self.delay {
            params.delay = Some(v.clone());
        }
        if let Some(v) = self.error_rate {
            params.error_rate = Some(v);
        }
        if let Some(v) = self.tcp_algorithm {
            params.tcp_algorithm = Some(v);
        }
    }

    /// Defaults with this override applied.
    pub fn resolve(&self, defaults: &ParameterSet) -> ParameterSet {
        let mut params = defaults.clone();
        self.apply_to(&mut params);
        params
    }
}

#[derive(Deserialize, Serialize, Debug, Clone, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Step {
    /// Vary packet size at one fixed interval
    PacketSize {
        sizes: Vec<u32>,
        interval: Option<f64>,
    },
    /// Vary send interval at one fixed packet size
    Interval {
        intervals: Vec<f64>,
        packet_size: Option<u32>,
    },
    DataRate {
        rates: Vec<String>,
    },
    Delay {
        delays: Vec<String>,
    },
    ErrorRate {
        rates: Vec<f64>,
    },
    /// Vary the TCP variant; `label` names each run's scenario, `{value}` is replaced by the variant
    CongestionControl {
        variants: Vec<CongestionControl>,
        label: Option<String>,
    },
    /// A single named run
    Scenario {
        name: String,
        #[serde(default)]
        params: ParameterOverride,
    },
}

impl Step {
    /// Number of simulator runs this step performs.
    pub fn run_count(&self) -> usize {
        match self {
            Step::PacketSize { sizes, .. } => sizes.len(),
            Step::Interval { intervals, .. } => intervals.len(),
            Step::DataRate { rates } => rates.len(),
            Step::Delay { delays } => delays.len(),
            Step::ErrorRate { rates } => rates.len(),
            Step::CongestionControl { variants, .. } => variants.len(),
            Step::Scenario { .. } => 1,
        }
    }
}

#[derive(Deserialize, Serialize, Debug, Clone, Default, PartialEq)]
pub struct ModePlan {
    /// Run the profile baseline first and abort the remaining steps if it yields nothing.
    #[serde(default)]
    pub validate_baseline: bool,
    #[serde(default)]
    pub steps: Vec<Step>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Mode {
    Basic,
    Quick,
    Comprehensive,
}

impl Mode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Mode::Basic => "basic",
            Mode::Quick => "quick",
            Mode::Comprehensive => "comprehensive",
        }
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Mode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "basic" => Ok(Mode::Basic),
            "quick" => Ok(Mode::Quick),
            "comprehensive" => Ok(Mode::Comprehensive),
            other => Err(format!(
                "unknown mode '{other}' (expected basic, quick or comprehensive)"
            )),
        }
    }
}

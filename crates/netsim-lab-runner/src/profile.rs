use netsim_lab_abstract::{CongestionControl, Mode, ModePlan, ParameterOverride, ParameterSet, Step};
use netsim_lab_parser::{CsvRowContract, GrammarError, LabelSet, OutputContract, ProtocolTableContract};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::invoker::SimulatorCommand;

pub const BUILTIN_PROFILES: [&str; 3] = ["udp-sweep", "link-sweep", "protocol-comparison"];

#[derive(Debug, Error)]
pub enum ProfileError {
    #[error("unknown profile '{0}' (built-in profiles: udp-sweep, link-sweep, protocol-comparison)")]
    Unknown(String),
    #[error("profile '{profile}' has no {mode} mode")]
    ModeUnavailable { profile: String, mode: Mode },
    #[error("failed to read profile file {}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse profile file {}", path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
    #[error(transparent)]
    Grammar(#[from] GrammarError),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModePlans {
    pub basic: ModePlan,
    #[serde(default)]
    pub quick: Option<ModePlan>,
    pub comprehensive: ModePlan,
}

/// Everything needed to run one family of experiments: how to launch the
/// simulator, how to read its output, and what each mode sweeps.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExperimentProfile {
    pub name: String,
    /// Leading part of every artifact file name.
    pub file_prefix: String,
    /// Scenario name recorded for the validation run.
    #[serde(default)]
    pub baseline_scenario: Option<String>,
    pub simulator: SimulatorCommand,
    pub contract: OutputContract,
    pub defaults: ParameterSet,
    /// Layered over `defaults` for the validation run.
    #[serde(default)]
    pub baseline: ParameterOverride,
    pub modes: ModePlans,
}

impl ExperimentProfile {
    pub fn plan(&self, mode: Mode) -> Result<&ModePlan, ProfileError> {
        match mode {
            Mode::Basic => Ok(&self.modes.basic),
            Mode::Quick => self
                .modes
                .quick
                .as_ref()
                .ok_or_else(|| ProfileError::ModeUnavailable {
                    profile: self.name.clone(),
                    mode,
                }),
            Mode::Comprehensive => Ok(&self.modes.comprehensive),
        }
    }

    pub fn baseline_params(&self) -> ParameterSet {
        self.baseline.resolve(&self.defaults)
    }

    /// Number of simulator runs `mode` performs, baseline included.
    pub fn planned_runs(&self, mode: Mode) -> Result<usize, ProfileError> {
        let plan = self.plan(mode)?;
        let steps: usize = plan.steps.iter().map(Step::run_count).sum();
        Ok(steps + usize::from(plan.validate_baseline))
    }
}

pub fn profile_by_name(name: &str) -> Result<ExperimentProfile, ProfileError> {
    match name {
        "udp-sweep" => Ok(udp_sweep()),
        "link-sweep" => Ok(link_sweep()),
        "protocol-comparison" => Ok(protocol_comparison()),
        other => Err(ProfileError::Unknown(other.to_string())),
    }
}

pub fn load_profile(path: &Path) -> Result<ExperimentProfile, ProfileError> {
    let content = fs::read_to_string(path).map_err(|source| ProfileError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    toml::from_str(&content).map_err(|source| ProfileError::Parse {
        path: path.to_path_buf(),
        source,
    })
}

/// UDP echo sweep over packet size and send interval; the simulator prints one
/// CSV row per run.
pub fn udp_sweep() -> ExperimentProfile {
    let sizes = vec![64, 128, 256, 512, 1024, 1500];
    ExperimentProfile {
        name: "udp-sweep".to_string(),
        file_prefix: "udp_sweep".to_string(),
        simulator: SimulatorCommand::new("./ns3")
            .with_args(["run", "scratch/exp2/third_task1"])
            .with_separator("--"),
        contract: OutputContract::CsvRow(CsvRowContract::default()),
        defaults: ParameterSet {
            packet_size: 1024,
            interval: Some(0.1),
            max_packets: Some(1000),
            simulation_time: Some(30.0),
            ..Default::default()
        },
        baseline: ParameterOverride {
            max_packets: Some(50),
            simulation_time: Some(10.0),
            ..Default::default()
        },
        baseline_scenario: None,
        modes: ModePlans {
            basic: ModePlan {
                validate_baseline: false,
                steps: vec![Step::PacketSize {
                    sizes: vec![64, 128, 256, 512, 1024],
                    interval: Some(0.1),
                }],
            },
            quick: Some(ModePlan {
                validate_baseline: false,
                steps: vec![
                    Step::PacketSize {
                        sizes: vec![64, 128, 256, 512, 1024],
                        interval: Some(0.1),
                    },
                    Step::Interval {
                        intervals: vec![0.01, 0.02, 0.05, 0.1, 0.2],
                        packet_size: Some(1024),
                    },
                ],
            }),
            comprehensive: ModePlan {
                validate_baseline: true,
                steps: vec![
                    Step::PacketSize {
                        sizes,
                        interval: Some(0.1),
                    },
                    Step::Interval {
                        intervals: vec![0.001, 0.005, 0.01, 0.02, 0.05, 0.1, 0.2, 0.5, 1.0],
                        packet_size: Some(1024),
                    },
                ],
            },
        },
    }
}

/// Point-to-point link sweep; the simulator prints a labeled statistics block.
pub fn link_sweep() -> ExperimentProfile {
    let sizes = |sizes: &[u32]| Step::PacketSize {
        sizes: sizes.to_vec(),
        interval: None,
    };
    let rates = |rates: &[&str]| Step::DataRate {
        rates: rates.iter().map(|r| r.to_string()).collect(),
    };
    let delays = |delays: &[&str]| Step::Delay {
        delays: delays.iter().map(|d| d.to_string()).collect(),
    };

    ExperimentProfile {
        name: "link-sweep".to_string(),
        file_prefix: "lab3".to_string(),
        simulator: SimulatorCommand::new("./ns3")
            .with_args(["run", "scratch/exp3/lab3_task1"])
            .with_separator("--"),
        contract: OutputContract::Labeled(LabelSet::default()),
        defaults: ParameterSet {
            packet_size: 1024,
            max_packets: Some(100),
            simulation_time: Some(20.0),
            data_rate: Some("5Mbps".to_string()),
            delay: Some("2ms".to_string()),
            ..Default::default()
        },
        baseline: ParameterOverride {
            max_packets: Some(50),
            simulation_time: Some(10.0),
            ..Default::default()
        },
        baseline_scenario: None,
        modes: ModePlans {
            basic: ModePlan {
                validate_baseline: true,
                steps: vec![sizes(&[512, 2048])],
            },
            quick: Some(ModePlan {
                validate_baseline: true,
                steps: vec![
                    sizes(&[512, 2048]),
                    rates(&["1Mbps", "10Mbps"]),
                    delays(&["10ms"]),
                ],
            }),
            comprehensive: ModePlan {
                validate_baseline: true,
                steps: vec![
                    sizes(&[512, 1024, 2048]),
                    rates(&["1Mbps", "5Mbps", "10Mbps"]),
                    delays(&["2ms", "10ms", "50ms"]),
                ],
            },
        },
    }
}

/// TCP and UDP flows sharing one bottleneck; the simulator prints a
/// per-protocol table and a fairness index.
pub fn protocol_comparison() -> ExperimentProfile {
    let scenario = |name: &str, params: ParameterOverride| Step::Scenario {
        name: name.to_string(),
        params,
    };

    ExperimentProfile {
        name: "protocol-comparison".to_string(),
        file_prefix: "tcp_udp_comparison".to_string(),
        simulator: SimulatorCommand::new(
            "./cmake-cache/scratch/exp3/ns3.46-lab3_tcp_udp_comparison-default",
        ),
        contract: OutputContract::ProtocolTable(ProtocolTableContract::default()),
        defaults: ParameterSet {
            packet_size: 1024,
            simulation_time: Some(20.0),
            data_rate: Some("10Mbps".to_string()),
            delay: Some("2ms".to_string()),
            error_rate: Some(0.0),
            tcp_algorithm: Some(CongestionControl::NewReno),
            ..Default::default()
        },
        baseline: ParameterOverride {
            simulation_time: Some(10.0),
            ..Default::default()
        },
        baseline_scenario: Some("Baseline".to_string()),
        modes: ModePlans {
            basic: ModePlan {
                validate_baseline: false,
                steps: vec![
                    scenario("Ideal Network", ParameterOverride::default()),
                    scenario(
                        "Packet Loss Network",
                        ParameterOverride {
                            error_rate: Some(0.01),
                            ..Default::default()
                        },
                    ),
                ],
            },
            quick: None,
            comprehensive: ModePlan {
                validate_baseline: true,
                steps: vec![
                    scenario("Ideal Network", ParameterOverride::default()),
                    scenario(
                        "High Delay Network",
                        ParameterOverride {
                            delay: Some("50ms".to_string()),
                            ..Default::default()
                        },
                    ),
                    scenario(
                        "Packet Loss Network",
                        ParameterOverride {
                            error_rate: Some(0.01),
                            ..Default::default()
                        },
                    ),
                    scenario(
                        "Low Bandwidth Network",
                        ParameterOverride {
                            data_rate: Some("1Mbps".to_string()),
                            ..Default::default()
                        },
                    ),
                    Step::CongestionControl {
                        variants: vec![
                            CongestionControl::NewReno,
                            CongestionControl::Cubic,
                            CongestionControl::Vegas,
                        ],
                        label: Some("TCP {value} Algorithm".to_string()),
                    },
                    scenario(
                        "Mixed Network Conditions",
                        ParameterOverride {
                            data_rate: Some("5Mbps".to_string()),
                            delay: Some("20ms".to_string()),
                            error_rate: Some(0.005),
                            ..Default::default()
                        },
                    ),
                ],
            },
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builtins_resolve_by_name() {
        for name in BUILTIN_PROFILES {
            assert_eq!(profile_by_name(name).unwrap().name, name);
        }
        assert!(matches!(
            profile_by_name("lab9"),
            Err(ProfileError::Unknown(name)) if name == "lab9"
        ));
    }

    #[test]
    fn protocol_comparison_has_no_quick_mode() {
        let profile = protocol_comparison();
        let err = profile.plan(Mode::Quick).unwrap_err();
        assert_eq!(
            err.to_string(),
            "profile 'protocol-comparison' has no quick mode"
        );
        assert_eq!(profile.planned_runs(Mode::Basic).unwrap(), 2);
        assert_eq!(profile.planned_runs(Mode::Comprehensive).unwrap(), 1 + 5 + 3);
    }

    #[test]
    fn link_baseline_is_a_short_run() {
        let baseline = link_sweep().baseline_params();
        assert_eq!(baseline.packet_size, 1024);
        assert_eq!(baseline.max_packets, Some(50));
        assert_eq!(baseline.simulation_time, Some(10.0));
        assert_eq!(baseline.data_rate.as_deref(), Some("5Mbps"));
    }

    #[test]
    fn builtins_survive_a_toml_round_trip() {
        for name in BUILTIN_PROFILES {
            let profile = profile_by_name(name).unwrap();
            let text = toml::to_string(&profile).unwrap();
            let parsed: ExperimentProfile = toml::from_str(&text).unwrap();
            assert_eq!(parsed, profile);
        }
    }

    #[test]
    fn custom_profile_loads_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("flow.toml");
        fs::write(
            &path,
            r#"
name = "flow-monitor"
file_prefix = "flow"

[simulator]
program = "./build/flow-sim"
timeout_secs = 120

[contract]
kind = "labeled"
throughput = "Throughput:"
delay = "Mean Delay:"
loss_rate = "Packet Loss Rate:"
received_packets = "Rx Packets:"
total_bytes = "Rx Bytes:"

[defaults]
packet_size = 1024
data_rate = "5Mbps"

[modes.basic]
steps = [{ type = "data_rate", rates = ["1Mbps", "10Mbps"] }]

[modes.comprehensive]
validate_baseline = true
steps = [
    { type = "delay", delays = ["2ms", "50ms"] },
    { type = "scenario", name = "lossy", params = { error_rate = 0.01 } },
]
"#,
        )
        .unwrap();

        let profile = load_profile(&path).unwrap();
        assert_eq!(profile.simulator.timeout_secs, 120);
        assert_eq!(profile.contract, OutputContract::Labeled(LabelSet::english()));
        assert!(profile.modes.quick.is_none());
        assert_eq!(profile.planned_runs(Mode::Comprehensive).unwrap(), 4);
    }

    #[test]
    fn bundled_sample_profile_loads() {
        let path = Path::new(env!("CARGO_MANIFEST_DIR")).join("../../profiles/flow-monitor.toml");
        let profile = load_profile(&path).unwrap();
        assert_eq!(profile.name, "flow-monitor");
        assert_eq!(profile.baseline_params().max_packets, Some(50));
        assert_eq!(profile.planned_runs(Mode::Quick).unwrap(), 5);
        assert_eq!(profile.planned_runs(Mode::Comprehensive).unwrap(), 1 + 4 + 3 + 3 + 3 + 1);
    }

    #[test]
    fn unreadable_profile_reports_path() {
        let err = load_profile(Path::new("/nonexistent/profile.toml")).unwrap_err();
        assert!(err.to_string().contains("/nonexistent/profile.toml"));
    }
}

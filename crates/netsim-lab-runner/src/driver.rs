use chrono::Local;
use netsim_lab_abstract::{
    CongestionControl, Measurement, Mode, ParameterOverride, ParameterSet, ResultRecord, Step,
};
use netsim_lab_parser::OutputParser;
use tracing::{debug, error, info, warn};

use crate::invoker::{Invoker, RunOutcome};
use crate::profile::{ExperimentProfile, ProfileError};
use crate::store::ResultStore;

/// Characters of unmatched output echoed at debug level.
const PREVIEW_CHARS: usize = 500;

/// Counters for one executed mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ModeSummary {
    pub mode: Mode,
    pub runs_attempted: usize,
    pub runs_succeeded: usize,
    pub records_collected: usize,
    /// The baseline run failed and the remaining steps were skipped.
    pub aborted: bool,
}

/// Runs parameter sweeps through an [`Invoker`] and collects parsed records.
pub struct SweepDriver<I> {
    invoker: I,
    parser: OutputParser,
    profile: ExperimentProfile,
    store: ResultStore,
    runs_attempted: usize,
    runs_succeeded: usize,
}

impl<I: Invoker> SweepDriver<I> {
    pub fn new(profile: ExperimentProfile, invoker: I) -> Result<Self, ProfileError> {
        let parser = OutputParser::new(profile.contract.clone())?;
        Ok(Self {
            invoker,
            parser,
            profile,
            store: ResultStore::new(),
            runs_attempted: 0,
            runs_succeeded: 0,
        })
    }

    pub fn profile(&self) -> &ExperimentProfile {
        &self.profile
    }

    pub fn store(&self) -> &ResultStore {
        &self.store
    }

    pub fn into_store(self) -> ResultStore {
        self.store
    }

    /// Invoke the simulator once, parse its output and store the records.
    /// Returns the number of records appended; failures are logged and yield 0.
    pub async fn run_once(&mut self, params: &ParameterSet, scenario: Option<&str>) -> usize {
        self.runs_attempted += 1;
        match scenario {
            Some(name) => info!("Running scenario '{name}': {}", params.describe()),
            None => info!("Running: {}", params.describe()),
        }

        let outcome = match self.invoker.invoke(params).await {
            Ok(outcome) => outcome,
            Err(err) => {
                error!("Run skipped: {:#}", anyhow::Error::from(err));
                return 0;
            }
        };

        if !outcome.success() {
            report_failed_exit(&outcome);
            return 0;
        }
        debug!("Simulator finished in {:.1?}", outcome.elapsed);

        let measurements = self.parser.parse(&outcome.stdout);
        if measurements.is_empty() {
            warn!(
                "Output did not match the {} contract; no result recorded",
                self.parser.contract().name()
            );
            debug!(
                "Output preview: {}",
                outcome.stdout.chars().take(PREVIEW_CHARS).collect::<String>()
            );
            return 0;
        }

        let timestamp = Local::now();
        let count = measurements.len();
        for measurement in measurements {
            check_echo(params, &measurement);
            log_measurement(&measurement);
            self.store
                .append(ResultRecord::new(params, scenario, measurement, timestamp));
        }
        self.runs_succeeded += 1;
        count
    }

    /// Runs each parameter set in order, logging progress.
    async fn sweep(&mut self, axis: &str, runs: Vec<(ParameterSet, Option<String>)>) -> usize {
        info!("=== {axis} sweep: {} runs ===", runs.len());
        let total = runs.len();
        let mut collected = 0;
        for (idx, (params, scenario)) in runs.into_iter().enumerate() {
            debug!("{axis} sweep progress: {}/{total}", idx + 1);
            collected += self.run_once(&params, scenario.as_deref()).await;
        }
        collected
    }

    fn with_defaults(&self, modify: impl FnOnce(&mut ParameterSet)) -> (ParameterSet, Option<String>) {
        let mut params = self.profile.defaults.clone();
        modify(&mut params);
        (params, None)
    }

    pub async fn sweep_packet_size(&mut self, sizes: &[u32], interval: Option<f64>) -> usize {
        let runs = sizes
            .iter()
            .map(|&size| {
                self.with_defaults(|p| {
                    p.packet_size = size;
                    if interval.is_some() {
                        p.interval = interval;
                    }
                })
            })
            .collect();
        self.sweep("Packet size", runs).await
    }

    pub async fn sweep_interval(&mut self, packet_size: Option<u32>, intervals: &[f64]) -> usize {
        let runs = intervals
            .iter()
            .map(|&interval| {
                self.with_defaults(|p| {
                    if let Some(size) = packet_size {
                        p.packet_size = size;
                    }
                    p.interval = Some(interval);
                })
            })
            .collect();
        self.sweep("Interval", runs).await
    }

    pub async fn sweep_data_rate<S: AsRef<str>>(&mut self, rates: &[S]) -> usize {
        let runs = rates
            .iter()
            .map(|rate| self.with_defaults(|p| p.data_rate = Some(rate.as_ref().to_string())))
            .collect();
        self.sweep("Data rate", runs).await
    }

    pub async fn sweep_delay<S: AsRef<str>>(&mut self, delays: &[S]) -> usize {
        let runs = delays
            .iter()
            .map(|delay| self.with_defaults(|p| p.delay = Some(delay.as_ref().to_string())))
            .collect();
        self.sweep("Delay", runs).await
    }

    pub async fn sweep_error_rate(&mut self, rates: &[f64]) -> usize {
        let runs = rates
            .iter()
            .map(|&rate| self.with_defaults(|p| p.error_rate = Some(rate)))
            .collect();
        self.sweep("Error rate", runs).await
    }

    /// `label` names each run's scenario; `{value}` is replaced by the variant.
    pub async fn sweep_congestion_control(
        &mut self,
        variants: &[CongestionControl],
        label: Option<&str>,
    ) -> usize {
        let runs = variants
            .iter()
            .map(|&variant| {
                let (params, _) = self.with_defaults(|p| p.tcp_algorithm = Some(variant));
                let scenario = label.map(|l| l.replace("{value}", variant.as_str()));
                (params, scenario)
            })
            .collect();
        self.sweep("Congestion control", runs).await
    }

    pub async fn run_scenario(&mut self, name: &str, overrides: &ParameterOverride) -> usize {
        let params = overrides.resolve(&self.profile.defaults);
        self.run_once(&params, Some(name)).await
    }

    pub async fn run_step(&mut self, step: &Step) -> usize {
        match step {
            Step::PacketSize { sizes, interval } => self.sweep_packet_size(sizes, *interval).await,
            Step::Interval {
                intervals,
                packet_size,
            } => self.sweep_interval(*packet_size, intervals).await,
            Step::DataRate { rates } => self.sweep_data_rate(rates).await,
            Step::Delay { delays } => self.sweep_delay(delays).await,
            Step::ErrorRate { rates } => self.sweep_error_rate(rates).await,
            Step::CongestionControl { variants, label } => {
                self.sweep_congestion_control(variants, label.as_deref())
                    .await
            }
            Step::Scenario { name, params } => self.run_scenario(name, params).await,
        }
    }

    /// Execute the profile's plan for `mode`. Fails only when the profile
    /// does not define the mode.
    pub async fn run_mode(&mut self, mode: Mode) -> Result<ModeSummary, ProfileError> {
        let plan = self.profile.plan(mode)?.clone();
        info!(
            "Starting {mode} mode of profile '{}' ({} runs planned)",
            self.profile.name,
            self.profile.planned_runs(mode)?
        );

        let attempted_before = self.runs_attempted;
        let succeeded_before = self.runs_succeeded;
        let records_before = self.store.len();
        let mut aborted = false;

        if plan.validate_baseline {
            info!("Validating the simulator with a baseline run");
            let params = self.profile.baseline_params();
            let scenario = self.profile.baseline_scenario.clone();
            if self.run_once(&params, scenario.as_deref()).await == 0 {
                error!(
                    "Baseline run produced no results; remaining steps skipped. \
                     Check that the simulator is built and runs from {}",
                    self.profile.simulator.working_dir.display()
                );
                aborted = true;
            } else {
                info!("Baseline validated");
            }
        }

        if !aborted {
            for step in &plan.steps {
                self.run_step(step).await;
            }
        }

        let summary = ModeSummary {
            mode,
            runs_attempted: self.runs_attempted - attempted_before,
            runs_succeeded: self.runs_succeeded - succeeded_before,
            records_collected: self.store.len() - records_before,
            aborted,
        };
        info!(
            "{mode} mode finished: {}/{} runs succeeded, {} records collected",
            summary.runs_succeeded, summary.runs_attempted, summary.records_collected
        );
        Ok(summary)
    }
}

fn report_failed_exit(outcome: &RunOutcome) {
    match outcome.exit_code {
        Some(code) => error!(
            "Simulator exited with code {code} for {}",
            outcome.params.describe()
        ),
        None => error!(
            "Simulator was terminated by a signal for {}",
            outcome.params.describe()
        ),
    }
    error!("Simulator stdout:\n{}", outcome.stdout);
    error!("Simulator stderr:\n{}", outcome.stderr);
}

/// The parameter set is authoritative; a differing echo only warrants a warning.
fn check_echo(params: &ParameterSet, measurement: &Measurement) {
    let Some(echoed) = measurement.echoed else {
        return;
    };
    let interval_differs = params
        .interval
        .is_some_and(|interval| (interval - echoed.interval).abs() > 1e-9);
    if echoed.packet_size != params.packet_size || interval_differs {
        warn!(
            "Simulator echoed packet_size={} interval={} but was run with {}; keeping the requested values",
            echoed.packet_size,
            echoed.interval,
            params.describe()
        );
    }
}

fn log_measurement(measurement: &Measurement) {
    let prefix = measurement
        .protocol
        .as_deref()
        .map(|p| format!("{p}: "))
        .unwrap_or_default();
    info!(
        "  {prefix}throughput {:.4} Mbps, delay {:.2} ms, loss {:.2}%",
        measurement.throughput, measurement.avg_delay, measurement.loss_rate
    );
}

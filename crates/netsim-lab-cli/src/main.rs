use anyhow::{Context, Result};
use chrono::Local;
use clap::{Parser, ValueEnum};
use std::fs;
use std::path::PathBuf;
use tracing::{info, warn};

use netsim_lab_abstract::Mode;
use netsim_lab_runner::{
    ExperimentProfile, ProcessInvoker, ReportConfig, ReportGenerator, SweepDriver,
    load_profile, plotting_available, profile_by_name,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum ModeArg {
    Basic,
    Quick,
    Comprehensive,
}

impl From<ModeArg> for Mode {
    fn from(mode: ModeArg) -> Self {
        match mode {
            ModeArg::Basic => Mode::Basic,
            ModeArg::Quick => Mode::Quick,
            ModeArg::Comprehensive => Mode::Comprehensive,
        }
    }
}

#[derive(Parser, Debug)]
#[command(author, version, about = "Automated ns-3 experiment sweeps")]
struct Args {
    /// Which plan of the profile to run.
    #[arg(long, value_enum, default_value_t = ModeArg::Basic)]
    mode: ModeArg,

    /// Directory for CSV/JSON results, charts and the analysis report.
    #[arg(long, default_value = "results")]
    output: PathBuf,

    /// Built-in profile: udp-sweep, link-sweep or protocol-comparison.
    #[arg(long, default_value = "link-sweep")]
    profile: String,

    /// Load a complete profile from a TOML file instead of a built-in one.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Directory the simulator is launched from (the ns-3 checkout).
    #[arg(long)]
    simulator_root: Option<PathBuf>,
}

impl Args {
    fn experiment_profile(&self) -> Result<ExperimentProfile> {
        let mut profile = match &self.config {
            Some(path) => load_profile(path)?,
            None => profile_by_name(&self.profile)?,
        };
        if let Some(root) = &self.simulator_root {
            profile.simulator.working_dir = root.clone();
        }
        Ok(profile)
    }
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    let args = Args::parse();
    tracing_subscriber::fmt::init();
    info!("netsim-lab starting…");

    let plotting = plotting_available();
    if !plotting {
        info!("Built without chart support; only CSV, JSON and the text report will be written");
    }

    let profile = args.experiment_profile()?;
    let mode = Mode::from(args.mode);
    profile.plan(mode)?;
    if !profile.simulator.working_dir.is_dir() {
        warn!(
            "Simulator root {} is not a directory; every run will fail to launch",
            profile.simulator.working_dir.display()
        );
    }

    fs::create_dir_all(&args.output).with_context(|| {
        format!("Failed to create output directory {}", args.output.display())
    })?;
    let stamp = Local::now().format("%Y%m%d_%H%M%S").to_string();
    let prefix = profile.file_prefix.clone();

    info!(
        "Profile '{}', {mode} mode, results in {}",
        profile.name,
        args.output.display()
    );
    let invoker = ProcessInvoker::new(profile.simulator.clone());
    let mut driver = SweepDriver::new(profile, invoker)?;
    let summary = driver.run_mode(mode).await?;
    let store = driver.into_store();

    store.export_all(&args.output, &prefix, &stamp)?;
    let config = ReportConfig {
        plotting,
        output_dir: args.output.clone(),
        prefix,
        stamp,
    };
    ReportGenerator::new(config).generate(&store)?;

    if summary.aborted {
        warn!("Sweep aborted after the baseline run; see the errors above");
    }
    info!(
        "Finished: {} of {} runs succeeded, {} results collected",
        summary.runs_succeeded, summary.runs_attempted, summary.records_collected
    );
    Ok(())
}

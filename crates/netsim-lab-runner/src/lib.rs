pub mod driver;
pub mod invoker;
#[cfg(feature = "plot")]
pub mod plot;
pub mod profile;
pub mod report;
pub mod store;

pub use driver::{ModeSummary, SweepDriver};
pub use invoker::{InvokeError, Invoker, ProcessInvoker, RunOutcome, SimulatorCommand};
pub use profile::{ExperimentProfile, ModePlans, ProfileError, load_profile, profile_by_name};
pub use report::{ReportArtifacts, ReportConfig, ReportGenerator, plotting_available};
pub use store::{ExportFormat, GroupKey, GroupSummary, MetricStats, ResultStore};

pub mod config;
pub mod record;
pub mod scenario;

pub use config::{CongestionControl, ParameterSet, UnknownVariant, quantity_value};
pub use record::{EchoedInputs, Measurement, Metric, ResultRecord};
pub use scenario::{Mode, ModePlan, ParameterOverride, Step};

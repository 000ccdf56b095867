pub mod cadence;
pub mod controller;
pub mod error;
pub mod executor;
pub mod ramp;
pub mod stats;
pub mod user;

pub use cadence::Cadence;
pub use controller::{RunController, RunSnapshot, RunState, RunToken, StopReason};
pub use error::EngineError;
pub use executor::RequestExecutor;
pub use ramp::{RampOutcome, RampUpScheduler};
pub use stats::{
    FailureBreakdown, FailureKind, Measurement, Outcome, RunStats, StatsAggregator, StatsSummary,
};
pub use user::{RunContext, VirtualUser};

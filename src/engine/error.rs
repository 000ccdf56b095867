use thiserror::Error;

/// Failures surfaced by the engine's control API.
///
/// Per-request failures are not errors: they are recorded as
/// [`FailureKind`](super::FailureKind) measurements and the run carries on.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("no active run")]
    NoActiveRun,

    #[error("failed to build HTTP client: {0}")]
    Client(#[from] reqwest::Error),
}

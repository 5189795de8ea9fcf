use thiserror::Error;

/// Engine-wide error taxonomy. Configuration and loader errors short-circuit
/// before any simulation work; the remaining kinds terminate the current run.
#[derive(Debug, Error)]
pub enum EngineError {
    /// Invalid, missing, or out-of-range configuration (including parameter
    /// grids). Fatal at load.
    #[error("config error: {0}")]
    Config(String),

    /// A strategy emitted an action that fails schema validation. Fatal for
    /// the current run.
    #[error("invalid action: {0}")]
    ActionSchema(String),

    /// The requested strategy does not exist or exposes no supported API.
    /// Fatal at startup.
    #[error("strategy validation error: {0}")]
    EaValidation(String),

    /// Any other failure during simulation (bad bar data, I/O on artifacts).
    #[error("simulation error: {0}")]
    Simulation(String),
}

pub type Result<T> = std::result::Result<T, EngineError>;

impl From<polars::error::PolarsError> for EngineError {
    fn from(err: polars::error::PolarsError) -> Self {
        EngineError::Simulation(err.to_string())
    }
}

impl From<std::io::Error> for EngineError {
    fn from(err: std::io::Error) -> Self {
        EngineError::Simulation(err.to_string())
    }
}

impl From<serde_json::Error> for EngineError {
    fn from(err: serde_json::Error) -> Self {
        EngineError::Simulation(err.to_string())
    }
}

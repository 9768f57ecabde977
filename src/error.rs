use thiserror::Error;

/// Errors surfaced by the simulation core.
///
/// Invariant violations (negative reserves or supplies) are not represented
/// here: they are programming errors and abort with the offending state.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum SimError {
    /// Rejected before any step runs; no partial run is ever built.
    #[error("invalid config: {0}")]
    InvalidConfig(String),

    /// The pool cannot fill the requested input without breaching its reserve floor.
    #[error("insufficient liquidity: requested {requested}, max fillable {max_fillable}")]
    InsufficientLiquidity { requested: f64, max_fillable: f64 },

    /// Swap or adjustment amounts must be finite and positive.
    #[error("invalid amount: {0}")]
    InvalidAmount(f64),

    /// A price or supply became non-finite; the run is truncated at `step`.
    #[error("numerical divergence at step {step}: {field} is not finite")]
    NumericalDivergence { step: u64, field: String },

    #[error("serialization failed: {0}")]
    Serialization(String),
}

impl From<serde_json::Error> for SimError {
    fn from(e: serde_json::Error) -> Self {
        SimError::Serialization(e.to_string())
    }
}

pub type SimResult<T> = Result<T, SimError>;

/// Shorthand used by config validation.
pub(crate) fn invalid(msg: impl Into<String>) -> SimError {
    SimError::InvalidConfig(msg.into())
}

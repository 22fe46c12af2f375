use rust_decimal::Decimal;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum PreSiteError {
    #[error("Invalid equity: {0} (must be > 0)")]
    InvalidEquity(Decimal),

    #[error("Invalid horizon: {horizon} periods (must be between 1 and {max})")]
    InvalidHorizon { horizon: u32, max: u32 },

    #[error("Invalid target return: {0} (must be within [0, 2])")]
    InvalidTargetReturn(Decimal),

    #[error("Unknown use case: {0}")]
    UnknownUseCase(String),

    #[error("No IRR solution: {reason}")]
    NoIrrSolution { reason: String },

    #[error("No root found: {function} ({reason})")]
    NoRootFound { function: String, reason: String },

    #[error("Invalid sample count: {count} ({reason})")]
    InvalidSampleCount { count: u64, reason: String },

    #[error("Optimization did not converge after {iterations} iterations (best objective: {best_objective})")]
    OptimizationDidNotConverge { iterations: u32, best_objective: f64 },

    #[error("Invalid input: {field} — {reason}")]
    InvalidInput { field: String, reason: String },

    #[error("Insufficient data: {0}")]
    InsufficientData(String),

    #[error("Division by zero in {context}")]
    DivisionByZero { context: String },

    #[error("Arithmetic overflow in {context}")]
    Overflow { context: String },

    #[error("Serialization error: {0}")]
    SerializationError(String),
}

impl PreSiteError {
    /// Numeric-solve failures leave the rest of a result usable; everything
    /// else aborts the request.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            PreSiteError::NoIrrSolution { .. }
                | PreSiteError::NoRootFound { .. }
                | PreSiteError::OptimizationDidNotConverge { .. }
                | PreSiteError::DivisionByZero { .. }
                | PreSiteError::Overflow { .. }
        )
    }
}

/// Error for a checked Decimal operation that left the representable range.
pub(crate) fn overflow(context: impl Into<String>) -> PreSiteError {
    PreSiteError::Overflow {
        context: context.into(),
    }
}

impl From<serde_json::Error> for PreSiteError {
    fn from(e: serde_json::Error) -> Self {
        PreSiteError::SerializationError(e.to_string())
    }
}

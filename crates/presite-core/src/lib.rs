pub mod benchmarks;
pub mod cashflow;
pub mod config;
pub mod control;
pub mod decision;
pub mod engine;
pub mod error;
pub mod metrics;
pub mod parameters;
pub mod time_value;
pub mod types;

#[cfg(feature = "monte_carlo")]
pub mod monte_carlo;

#[cfg(feature = "sensitivity")]
pub mod sensitivity;

#[cfg(feature = "optimization")]
pub mod optimization;

pub use benchmarks::{BenchmarkTable, CostAssumptions, UseCase, UseCaseBenchmark};
pub use cashflow::{CashFlowSeries, DevelopmentModel, InvestmentInputs};
pub use config::EngineConfig;
pub use control::{RunControl, RunStatus};
pub use decision::Recommendation;
pub use engine::{evaluate, model_for, EvaluationReport, EvaluationRequest};
pub use error::PreSiteError;
pub use metrics::MetricsResult;
pub use parameters::ModelParameter;
pub use types::*;

/// Standard result type for all presite operations
pub type PreSiteResult<T> = Result<T, PreSiteError>;

//! IRR sensitivity: one-at-a-time shifts and Sobol variance decomposition.
//!
//! Both modes work on copies of the base model.

pub mod global;
pub mod local;

pub use global::{global_sensitivity, GlobalSensitivityReport, ParameterRange, SobolIndex};
pub use local::{
    local_sensitivity, Direction, LocalSensitivityReport, LocalSensitivityRow, TornadoEntry,
};

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::cashflow::DevelopmentModel;
use crate::config::EngineConfig;
use crate::control::RunControl;
use crate::parameters::ModelParameter;
use crate::types::ComputationOutput;
use crate::PreSiteResult;

/// Which analysis to run, with its inputs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum SensitivityRequest {
    Local {
        /// Empty means every parameter the model defines.
        #[serde(default)]
        parameters: Vec<ModelParameter>,
        #[serde(default)]
        shift: Option<Decimal>,
    },
    Global {
        ranges: Vec<ParameterRange>,
        samples: u32,
        #[serde(default)]
        seed: Option<u64>,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum SensitivityReport {
    Local(LocalSensitivityReport),
    Global(GlobalSensitivityReport),
}

/// Run the analysis `request` selects.
pub fn analyze(
    model: &DevelopmentModel,
    request: &SensitivityRequest,
    config: &EngineConfig,
    control: &RunControl,
) -> PreSiteResult<ComputationOutput<SensitivityReport>> {
    match request {
        SensitivityRequest::Local { parameters, shift } => {
            let out = local_sensitivity(model, parameters, *shift, config)?;
            Ok(rewrap(out, SensitivityReport::Local))
        }
        SensitivityRequest::Global {
            ranges,
            samples,
            seed,
        } => {
            let out = global_sensitivity(model, ranges, *samples, *seed, config, control)?;
            Ok(rewrap(out, SensitivityReport::Global))
        }
    }
}

fn rewrap<T: Serialize>(
    out: ComputationOutput<T>,
    wrap: impl FnOnce(T) -> SensitivityReport,
) -> ComputationOutput<SensitivityReport> {
    ComputationOutput {
        result: wrap(out.result),
        methodology: out.methodology,
        assumptions: out.assumptions,
        warnings: out.warnings,
        metadata: out.metadata,
    }
}

//! Engine configuration.
//!
//! Every knob that moves a decision boundary or a numeric tolerance lives
//! here so that callers can load it from a file and tests can pin it.

use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};

use crate::error::PreSiteError;
use crate::types::Rate;
use crate::PreSiteResult;

/// Upper limit on solver iterations regardless of configuration.
pub const SOLVER_ITERATION_HARD_CAP: u32 = 10_000;

/// Upper limit on optimizer iterations regardless of configuration.
pub const OPTIMIZER_ITERATION_HARD_CAP: u32 = 5_000;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub solver: SolverSettings,
    pub metrics: MetricsConfig,
    pub decision: DecisionConfig,
    pub sensitivity: SensitivityConfig,
    pub simulation: SimulationConfig,
    pub optimizer: OptimizerSettings,
}

impl EngineConfig {
    pub fn validate(&self) -> PreSiteResult<()> {
        self.solver.validate()?;
        self.decision.validate()?;
        self.sensitivity.validate()?;
        self.simulation.validate()?;
        self.optimizer.validate()
    }
}

/// Settings shared by every 1-D root find (IRR, land cap).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SolverSettings {
    pub max_iterations: u32,
    /// Convergence threshold on NPV divided by the period-0 outlay.
    pub tolerance: Decimal,
    pub irr_lower_bound: Rate,
    pub irr_upper_bound: Rate,
}

impl Default for SolverSettings {
    fn default() -> Self {
        Self {
            max_iterations: 200,
            tolerance: dec!(0.0000000001),
            irr_lower_bound: dec!(-0.99),
            irr_upper_bound: dec!(10.0),
        }
    }
}

impl SolverSettings {
    /// Iteration budget after applying the hard cap.
    pub fn iterations(&self) -> u32 {
        self.max_iterations.min(SOLVER_ITERATION_HARD_CAP)
    }

    fn validate(&self) -> PreSiteResult<()> {
        if self.max_iterations == 0 {
            return Err(PreSiteError::InvalidInput {
                field: "solver.max_iterations".into(),
                reason: "Must be at least 1".into(),
            });
        }
        if self.tolerance <= Decimal::ZERO {
            return Err(PreSiteError::InvalidInput {
                field: "solver.tolerance".into(),
                reason: "Must be positive".into(),
            });
        }
        if self.irr_lower_bound <= dec!(-1) || self.irr_lower_bound >= self.irr_upper_bound {
            return Err(PreSiteError::InvalidInput {
                field: "solver.irr_lower_bound".into(),
                reason: "Search range must satisfy -1 < lower < upper".into(),
            });
        }
        Ok(())
    }
}

/// MIRR rates. Both fall back to the evaluation's discount rate.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MetricsConfig {
    pub finance_rate: Option<Rate>,
    pub reinvestment_rate: Option<Rate>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DecisionConfig {
    /// Shortfall below target that is still "needs further analysis"
    /// rather than an outright No-Go.
    pub margin: Rate,
}

impl Default for DecisionConfig {
    fn default() -> Self {
        Self { margin: dec!(0.02) }
    }
}

impl DecisionConfig {
    fn validate(&self) -> PreSiteResult<()> {
        if self.margin < Decimal::ZERO {
            return Err(PreSiteError::InvalidInput {
                field: "decision.margin".into(),
                reason: "Margin cannot be negative".into(),
            });
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SensitivityConfig {
    /// Relative shift for one-at-a-time analysis (0.10 = ±10%).
    pub shift: Decimal,
    /// Global analysis refuses to run below this many base samples.
    pub min_global_samples: u32,
    /// Global analysis warns below this many base samples.
    pub recommended_global_samples: u32,
}

impl Default for SensitivityConfig {
    fn default() -> Self {
        Self {
            shift: dec!(0.10),
            min_global_samples: 64,
            recommended_global_samples: 512,
        }
    }
}

impl SensitivityConfig {
    fn validate(&self) -> PreSiteResult<()> {
        if self.shift <= Decimal::ZERO || self.shift >= Decimal::ONE {
            return Err(PreSiteError::InvalidInput {
                field: "sensitivity.shift".into(),
                reason: "Shift must be within (0, 1)".into(),
            });
        }
        if self.min_global_samples < 2 {
            return Err(PreSiteError::InvalidInput {
                field: "sensitivity.min_global_samples".into(),
                reason: "Must be at least 2".into(),
            });
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimulationConfig {
    /// Sampled IRRs are clamped to [irr_floor, irr_ceiling].
    pub irr_floor: f64,
    pub irr_ceiling: f64,
    pub max_trials: u32,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            irr_floor: 0.0,
            irr_ceiling: 1.0,
            max_trials: 1_000_000,
        }
    }
}

impl SimulationConfig {
    fn validate(&self) -> PreSiteResult<()> {
        if !self.irr_floor.is_finite()
            || !self.irr_ceiling.is_finite()
            || self.irr_floor >= self.irr_ceiling
        {
            return Err(PreSiteError::InvalidInput {
                field: "simulation.irr_ceiling".into(),
                reason: "IRR clamp range must be finite with floor < ceiling".into(),
            });
        }
        if self.max_trials == 0 {
            return Err(PreSiteError::InvalidInput {
                field: "simulation.max_trials".into(),
                reason: "Must be at least 1".into(),
            });
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OptimizerSettings {
    pub max_iterations: u32,
    /// Converged when the projected gradient (unit-box scale) is below this.
    pub gradient_tolerance: f64,
    /// Converged when successive objective values differ by less than this.
    pub objective_tolerance: f64,
    /// Finite-difference step on the unit-scaled box.
    pub finite_difference_step: f64,
}

impl Default for OptimizerSettings {
    fn default() -> Self {
        Self {
            max_iterations: 200,
            gradient_tolerance: 1e-6,
            objective_tolerance: 1e-10,
            finite_difference_step: 1e-4,
        }
    }
}

impl OptimizerSettings {
    pub fn iterations(&self) -> u32 {
        self.max_iterations.min(OPTIMIZER_ITERATION_HARD_CAP)
    }

    fn validate(&self) -> PreSiteResult<()> {
        if self.max_iterations == 0 {
            return Err(PreSiteError::InvalidInput {
                field: "optimizer.max_iterations".into(),
                reason: "Must be at least 1".into(),
            });
        }
        let positive = |v: f64| v.is_finite() && v > 0.0;
        if !positive(self.gradient_tolerance)
            || !positive(self.objective_tolerance)
            || !positive(self.finite_difference_step)
            || self.finite_difference_step >= 0.5
        {
            return Err(PreSiteError::InvalidInput {
                field: "optimizer".into(),
                reason: "Tolerances must be positive and the finite-difference step below 0.5"
                    .into(),
            });
        }
        Ok(())
    }
}

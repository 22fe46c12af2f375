use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config::OptimizerSettings;
use crate::control::{RunControl, RunStatus};
use crate::error::PreSiteError;
use crate::PreSiteResult;

/// Armijo sufficient-decrease constant.
const ARMIJO_C: f64 = 1e-4;
const MAX_BACKTRACKS: u32 = 50;
const MAX_STEP: f64 = 1e4;

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// Closed interval for one decision variable. `min == max` pins it.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Bound {
    pub min: f64,
    pub max: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OptimizationResult {
    /// Best point found; always inside the bounds.
    pub x: Vec<f64>,
    pub objective: f64,
    /// True when a convergence test passed.
    pub success: bool,
    pub iterations: u32,
    pub status: RunStatus,
    pub message: String,
}

impl OptimizationResult {
    /// `Err(OptimizationDidNotConverge)` unless the search converged.
    pub fn ensure_converged(&self) -> PreSiteResult<()> {
        if self.success {
            return Ok(());
        }
        Err(PreSiteError::OptimizationDidNotConverge {
            iterations: self.iterations,
            best_objective: self.objective,
        })
    }
}

// ---------------------------------------------------------------------------
// Box helpers
// ---------------------------------------------------------------------------

fn validate(bounds: &[Bound], initial: &[f64]) -> PreSiteResult<()> {
    if bounds.len() != initial.len() {
        return Err(PreSiteError::InvalidInput {
            field: "initial_guess".into(),
            reason: format!(
                "Expected {} values, got {}",
                bounds.len(),
                initial.len()
            ),
        });
    }
    for (i, b) in bounds.iter().enumerate() {
        if !b.min.is_finite() || !b.max.is_finite() || b.min > b.max {
            return Err(PreSiteError::InvalidInput {
                field: format!("bounds[{i}]"),
                reason: "Bounds must be finite with min <= max".into(),
            });
        }
    }
    if initial.iter().any(|v| !v.is_finite()) {
        return Err(PreSiteError::InvalidInput {
            field: "initial_guess".into(),
            reason: "Initial guess must be finite".into(),
        });
    }
    Ok(())
}

/// Clamp each coordinate of the unit-scaled point into [0, 1].
fn project_onto_box(u: &mut [f64]) {
    for ui in u.iter_mut() {
        *ui = ui.clamp(0.0, 1.0);
    }
}

fn to_unit(bounds: &[Bound], x: &[f64]) -> Vec<f64> {
    bounds
        .iter()
        .zip(x)
        .map(|(b, xi)| {
            let width = b.max - b.min;
            if width > 0.0 {
                ((xi - b.min) / width).clamp(0.0, 1.0)
            } else {
                0.0
            }
        })
        .collect()
}

/// Map back to the original box. The final clamp absorbs rounding in the
/// affine map so the result never leaves its bounds.
fn from_unit(bounds: &[Bound], u: &[f64]) -> Vec<f64> {
    bounds
        .iter()
        .zip(u)
        .map(|(b, ui)| (b.min + ui * (b.max - b.min)).clamp(b.min, b.max))
        .collect()
}

// ---------------------------------------------------------------------------
// Public API
// ---------------------------------------------------------------------------

/// Minimise `objective` over a box.
///
/// Projected gradient descent on the box rescaled to the unit cube, with
/// central finite differences and Armijo backtracking. Points where the
/// objective is not finite are never accepted. To maximise a quantity pass
/// its negative: minimising -IRR maximises IRR.
///
/// Converges when the projected gradient or the change in objective falls
/// below its tolerance. Hitting the iteration budget, failing the line
/// search or being stopped by `control` returns the best point so far with
/// `success == false`.
pub fn minimize<F>(
    objective: F,
    bounds: &[Bound],
    initial: &[f64],
    settings: &OptimizerSettings,
    control: &RunControl,
) -> PreSiteResult<OptimizationResult>
where
    F: Fn(&[f64]) -> f64,
{
    validate(bounds, initial)?;

    let f = |u: &[f64]| objective(&from_unit(bounds, u));
    let mut u = to_unit(bounds, initial);
    project_onto_box(&mut u);
    let mut fu = f(&u);
    if !fu.is_finite() {
        return Err(PreSiteError::InvalidInput {
            field: "initial_guess".into(),
            reason: "Objective is not finite at the initial guess".into(),
        });
    }

    let n = u.len();
    let free: Vec<bool> = bounds.iter().map(|b| b.max > b.min).collect();
    let h = settings.finite_difference_step;
    let mut step = 1.0;
    let mut iterations = 0u32;
    let mut status = RunStatus::Completed;
    let mut success = n == 0 || !free.iter().any(|f| *f);
    let mut message = if success {
        "No free variables".to_string()
    } else {
        String::new()
    };

    while !success && iterations < settings.iterations() {
        if let Some(stopped) = control.check() {
            status = stopped;
            message = format!("Stopped: {stopped:?}");
            break;
        }
        iterations += 1;

        // Central differences, one-sided at the faces of the cube.
        let mut grad = vec![0.0; n];
        for i in (0..n).filter(|i| free[*i]) {
            let mut up = u.clone();
            let mut dn = u.clone();
            up[i] = (u[i] + h).min(1.0);
            dn[i] = (u[i] - h).max(0.0);
            let g = (f(&up) - f(&dn)) / (up[i] - dn[i]);
            grad[i] = if g.is_finite() { g } else { 0.0 };
        }

        let pg_norm = (0..n)
            .map(|i| (u[i] - (u[i] - grad[i]).clamp(0.0, 1.0)).abs())
            .fold(0.0, f64::max);
        if pg_norm < settings.gradient_tolerance {
            success = true;
            message = "Projected gradient below tolerance".into();
            break;
        }

        // Armijo backtracking along the projected path.
        let mut t = step;
        let mut accepted = None;
        for _ in 0..MAX_BACKTRACKS {
            let mut candidate: Vec<f64> = u.iter().zip(&grad).map(|(ui, gi)| ui - t * gi).collect();
            project_onto_box(&mut candidate);
            let decrease: f64 = grad
                .iter()
                .zip(u.iter().zip(&candidate))
                .map(|(gi, (ui, ci))| gi * (ui - ci))
                .sum();
            let fc = f(&candidate);
            if fc.is_finite() && fc <= fu - ARMIJO_C * decrease {
                accepted = Some((candidate, fc));
                break;
            }
            t *= 0.5;
        }

        let Some((candidate, fc)) = accepted else {
            message = "Line search found no decrease".into();
            break;
        };

        let change = (fu - fc).abs();
        u = candidate;
        fu = fc;
        step = (t * 2.0).min(MAX_STEP);
        if change < settings.objective_tolerance * (1.0 + fu.abs()) {
            success = true;
            message = "Objective change below tolerance".into();
            break;
        }
    }

    if !success && message.is_empty() {
        message = PreSiteError::OptimizationDidNotConverge {
            iterations,
            best_objective: fu,
        }
        .to_string();
    }

    debug!(iterations, objective = fu, success, "minimize finished");

    Ok(OptimizationResult {
        x: from_unit(bounds, &u),
        objective: fu,
        success,
        iterations,
        status,
        message,
    })
}

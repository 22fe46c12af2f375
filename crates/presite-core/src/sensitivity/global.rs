use rand::rngs::StdRng;
use rand::Rng;
use rand::SeedableRng;
use rayon::prelude::*;
use rust_decimal::prelude::ToPrimitive;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::time::Instant;
use tracing::debug;

use crate::cashflow::DevelopmentModel;
use crate::config::EngineConfig;
use crate::control::{RunControl, RunStatus};
use crate::error::PreSiteError;
use crate::metrics::model_irr;
use crate::parameters::{apply_all, ModelParameter};
use crate::types::{with_metadata_f64, ComputationOutput};
use crate::PreSiteResult;

/// Base-sample rows evaluated between two cancellation checks.
const ROWS_PER_CHECK: usize = 32;

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// Uniform bounds of one parameter in the sampled space.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParameterRange {
    pub parameter: ModelParameter,
    pub min: f64,
    pub max: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SobolIndex {
    pub parameter: ModelParameter,
    pub first_order: f64,
    pub total_order: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GlobalSensitivityReport {
    /// Base samples N requested.
    pub samples: u32,
    /// Base samples actually used (less than `samples` when stopped early).
    pub samples_used: u32,
    /// Model evaluations performed, N·(k+2) for a complete run.
    pub evaluations: u64,
    pub seed: u64,
    pub mean_irr: f64,
    pub output_variance: f64,
    /// In request order; empty when fewer than two rows completed.
    pub indices: Vec<SobolIndex>,
    /// Evaluations without an IRR, recorded at the simulation IRR floor.
    pub unsolved_evaluations: u64,
    pub status: RunStatus,
}

// ---------------------------------------------------------------------------
// Estimators
// ---------------------------------------------------------------------------

/// First-order (Saltelli 2010) and total-order (Jansen) indices.
///
/// `f_ab[i][j]` is the output for base row `j` with column `i` taken from B.
/// Returns `(first_order, total_order, variance)`; with zero variance every
/// index is zero.
pub(crate) fn estimate_indices(
    f_a: &[f64],
    f_b: &[f64],
    f_ab: &[Vec<f64>],
) -> (Vec<f64>, Vec<f64>, f64) {
    let n = f_a.len() as f64;
    let all = f_a.iter().chain(f_b.iter());
    let mean = all.clone().sum::<f64>() / (2.0 * n);
    let variance = all.map(|y| (y - mean).powi(2)).sum::<f64>() / (2.0 * n);

    if variance <= f64::EPSILON {
        return (vec![0.0; f_ab.len()], vec![0.0; f_ab.len()], variance);
    }

    let mut first = Vec::with_capacity(f_ab.len());
    let mut total = Vec::with_capacity(f_ab.len());
    for column in f_ab {
        let s1 = f_b
            .iter()
            .zip(column)
            .zip(f_a)
            .map(|((b, ab), a)| b * (ab - a))
            .sum::<f64>()
            / n;
        let st = f_a
            .iter()
            .zip(column)
            .map(|(a, ab)| (a - ab).powi(2))
            .sum::<f64>()
            / (2.0 * n);
        first.push(s1 / variance);
        total.push(st / variance);
    }
    (first, total, variance)
}

fn sample_matrix(rng: &mut StdRng, ranges: &[ParameterRange], rows: usize) -> Vec<Vec<f64>> {
    (0..rows)
        .map(|_| {
            ranges
                .iter()
                .map(|r| r.min + rng.gen::<f64>() * (r.max - r.min))
                .collect()
        })
        .collect()
}

fn validate_ranges(ranges: &[ParameterRange], model: &DevelopmentModel) -> PreSiteResult<()> {
    if ranges.is_empty() {
        return Err(PreSiteError::InsufficientData(
            "At least one parameter range is required".into(),
        ));
    }
    let mut seen = BTreeSet::new();
    for r in ranges {
        if !seen.insert(r.parameter) {
            return Err(PreSiteError::InvalidInput {
                field: "ranges".into(),
                reason: format!("Parameter '{}' is declared more than once", r.parameter),
            });
        }
        if !r.min.is_finite() || !r.max.is_finite() || r.min >= r.max {
            return Err(PreSiteError::InvalidInput {
                field: format!("ranges.{}", r.parameter),
                reason: "Bounds must be finite with min < max".into(),
            });
        }
        r.parameter.value(model)?;
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Public API
// ---------------------------------------------------------------------------

/// Variance-based (Sobol) sensitivity of IRR.
///
/// Draws two independent N×k matrices A and B uniformly inside the ranges
/// and evaluates the model on A, B and every AB_i (A with column i from
/// B): N·(k+2) evaluations. Fewer than `sensitivity.min_global_samples`
/// base samples is an error; fewer than `recommended_global_samples` is a
/// warning. Sampled values are clamped to the parameter's valid range and
/// applied in range order to a copy of `model`.
pub fn global_sensitivity(
    model: &DevelopmentModel,
    ranges: &[ParameterRange],
    samples: u32,
    seed: Option<u64>,
    config: &EngineConfig,
    control: &RunControl,
) -> PreSiteResult<ComputationOutput<GlobalSensitivityReport>> {
    let start = Instant::now();
    let mut warnings: Vec<String> = Vec::new();
    let settings = &config.sensitivity;

    // -- Validation -----------------------------------------------------------
    if samples < settings.min_global_samples {
        return Err(PreSiteError::InvalidSampleCount {
            count: samples as u64,
            reason: format!(
                "Sobol estimates need at least {} base samples",
                settings.min_global_samples
            ),
        });
    }
    validate_ranges(ranges, model)?;
    model.inputs.validate()?;

    let k = ranges.len();
    let planned = samples as u64 * (k as u64 + 2);
    if planned > config.simulation.max_trials as u64 {
        return Err(PreSiteError::InvalidSampleCount {
            count: samples as u64,
            reason: format!(
                "{planned} model evaluations exceed the limit of {}",
                config.simulation.max_trials
            ),
        });
    }
    if samples < settings.recommended_global_samples {
        warnings.push(format!(
            "{samples} base samples is below the recommended {}; indices may be unstable",
            settings.recommended_global_samples
        ));
    }

    // -- Sample matrices ------------------------------------------------------
    let seed = seed.unwrap_or_else(|| StdRng::from_entropy().gen());
    let mut rng = StdRng::seed_from_u64(seed);
    let a = sample_matrix(&mut rng, ranges, samples as usize);
    let b = sample_matrix(&mut rng, ranges, samples as usize);

    let floor = config.simulation.irr_floor;
    let evaluate = |point: &[f64]| -> PreSiteResult<(f64, bool)> {
        let values: Vec<(ModelParameter, f64)> =
            ranges.iter().map(|r| r.parameter).zip(point.iter().copied()).collect();
        let scenario = apply_all(model, &values)?;
        match model_irr(&scenario, &config.solver) {
            Ok(r) => Ok((r.to_f64().unwrap_or(floor), true)),
            Err(e) if e.is_recoverable() => Ok((floor, false)),
            Err(e) => Err(e),
        }
    };

    // Per row: [f(A), f(B), f(AB_0), .., f(AB_k-1)].
    let evaluate_row = |j: usize| -> PreSiteResult<(Vec<f64>, u64)> {
        let mut out = Vec::with_capacity(k + 2);
        let mut unsolved = 0u64;
        let mut push = |(y, solved): (f64, bool)| {
            if !solved {
                unsolved += 1;
            }
            out.push(y);
        };
        push(evaluate(&a[j])?);
        push(evaluate(&b[j])?);
        for i in 0..k {
            let mut ab = a[j].clone();
            ab[i] = b[j][i];
            push(evaluate(&ab)?);
        }
        Ok((out, unsolved))
    };

    let mut rows: Vec<Vec<f64>> = Vec::with_capacity(samples as usize);
    let mut unsolved_evaluations = 0u64;
    let mut status = RunStatus::Completed;
    let mut next = 0usize;
    while next < samples as usize {
        if let Some(stopped) = control.check() {
            status = stopped;
            break;
        }
        let end = (next + ROWS_PER_CHECK).min(samples as usize);
        let block = (next..end)
            .into_par_iter()
            .map(&evaluate_row)
            .collect::<PreSiteResult<Vec<_>>>()?;
        for (row, unsolved) in block {
            rows.push(row);
            unsolved_evaluations += unsolved;
        }
        next = end;
    }

    // -- Estimation -----------------------------------------------------------
    let f_a: Vec<f64> = rows.iter().map(|r| r[0]).collect();
    let f_b: Vec<f64> = rows.iter().map(|r| r[1]).collect();
    let f_ab: Vec<Vec<f64>> = (0..k)
        .map(|i| rows.iter().map(|r| r[i + 2]).collect())
        .collect();

    let (indices, mean_irr, output_variance) = if rows.len() >= 2 {
        let (first, total, variance) = estimate_indices(&f_a, &f_b, &f_ab);
        if variance <= f64::EPSILON {
            warnings.push("IRR does not vary over the sampled ranges".into());
        }
        let mean = f_a.iter().chain(f_b.iter()).sum::<f64>() / (2 * rows.len()) as f64;
        let indices = ranges
            .iter()
            .zip(first.into_iter().zip(total))
            .map(|(r, (first_order, total_order))| SobolIndex {
                parameter: r.parameter,
                first_order,
                total_order,
            })
            .collect();
        (indices, mean, variance)
    } else {
        (Vec::new(), 0.0, 0.0)
    };

    if unsolved_evaluations > 0 {
        warnings.push(format!(
            "{unsolved_evaluations} evaluations had no IRR and were recorded at {floor}"
        ));
    }
    if !status.is_complete() {
        warnings.push(format!(
            "Global sensitivity stopped ({status:?}) after {} of {samples} base samples",
            rows.len()
        ));
    }

    let samples_used = rows.len() as u32;
    let evaluations = samples_used as u64 * (k as u64 + 2);
    debug!(evaluations, status = ?status, "global sensitivity finished");

    let report = GlobalSensitivityReport {
        samples,
        samples_used,
        evaluations,
        seed,
        mean_irr,
        output_variance,
        indices,
        unsolved_evaluations,
        status,
    };

    let elapsed = start.elapsed().as_micros() as u64;
    Ok(with_metadata_f64(
        "Sobol variance decomposition of IRR (Saltelli sampling, Jansen total-order estimator)",
        &serde_json::json!({
            "samples": samples,
            "seed": seed,
            "ranges": ranges,
            "min_samples": settings.min_global_samples,
        }),
        warnings,
        elapsed,
        report,
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::benchmarks::{BenchmarkTable, UseCase};
    use crate::cashflow::InvestmentInputs;
    use rust_decimal_macros::dec;

    fn model() -> DevelopmentModel {
        let inputs =
            InvestmentInputs::new(dec!(500000), 5, dec!(0.15), UseCase::Residential).unwrap();
        DevelopmentModel::new(inputs, &BenchmarkTable::default()).unwrap()
    }

    fn ranges() -> Vec<ParameterRange> {
        vec![
            ParameterRange {
                parameter: ModelParameter::RentPerM2,
                min: 140.0,
                max: 210.0,
            },
            ParameterRange {
                parameter: ModelParameter::IncomeGrowth,
                min: 0.0,
                max: 0.001,
            },
        ]
    }

    #[test]
    fn test_estimator_on_additive_model() {
        // y = 2·x0 + x1 with x ~ U(0,1): S1 = ST = (0.8, 0.2).
        let n = 80_000;
        let mut rng = StdRng::seed_from_u64(17);
        let a: Vec<[f64; 2]> = (0..n).map(|_| [rng.gen(), rng.gen()]).collect();
        let b: Vec<[f64; 2]> = (0..n).map(|_| [rng.gen(), rng.gen()]).collect();
        let f = |x: [f64; 2]| 2.0 * x[0] + x[1];
        let f_a: Vec<f64> = a.iter().map(|x| f(*x)).collect();
        let f_b: Vec<f64> = b.iter().map(|x| f(*x)).collect();
        let f_ab: Vec<Vec<f64>> = (0..2)
            .map(|i| {
                (0..n)
                    .map(|j| {
                        let mut x = a[j];
                        x[i] = b[j][i];
                        f(x)
                    })
                    .collect()
            })
            .collect();
        let (first, total, variance) = estimate_indices(&f_a, &f_b, &f_ab);
        assert!((variance - 5.0 / 12.0).abs() < 0.02, "variance={variance}");
        assert!((first[0] - 0.8).abs() < 0.05, "s1={first:?}");
        assert!((first[1] - 0.2).abs() < 0.05, "s1={first:?}");
        assert!((total[0] - 0.8).abs() < 0.05, "st={total:?}");
        assert!((total[1] - 0.2).abs() < 0.05, "st={total:?}");
    }

    #[test]
    fn test_constant_output_gives_zero_indices() {
        let f = vec![1.0; 10];
        let (first, total, variance) = estimate_indices(&f, &f, &[f.clone()]);
        assert_eq!(variance, 0.0);
        assert_eq!(first, vec![0.0]);
        assert_eq!(total, vec![0.0]);
    }

    #[test]
    fn test_wide_range_dominates() {
        let out = global_sensitivity(
            &model(),
            &ranges(),
            128,
            Some(3),
            &EngineConfig::default(),
            &RunControl::new(),
        )
        .unwrap();
        let r = &out.result;
        assert_eq!(r.evaluations, 128 * 4);
        assert_eq!(r.indices.len(), 2);
        assert!(r.indices[0].total_order > r.indices[1].total_order);
        assert!(r.output_variance > 0.0);
        // Below the recommended sample count.
        assert!(!out.warnings.is_empty());
    }

    #[test]
    fn test_too_few_samples_rejected() {
        let err = global_sensitivity(
            &model(),
            &ranges(),
            32,
            Some(1),
            &EngineConfig::default(),
            &RunControl::new(),
        )
        .unwrap_err();
        assert!(matches!(err, PreSiteError::InvalidSampleCount { count: 32, .. }));
    }

    #[test]
    fn test_seeded_runs_repeat() {
        let run = || {
            global_sensitivity(
                &model(),
                &ranges(),
                64,
                Some(99),
                &EngineConfig::default(),
                &RunControl::new(),
            )
            .unwrap()
            .result
        };
        assert_eq!(run().indices, run().indices);
    }

    #[test]
    fn test_cancelled_before_start() {
        let control = RunControl::new();
        control.cancel();
        let r = global_sensitivity(
            &model(),
            &ranges(),
            64,
            Some(1),
            &EngineConfig::default(),
            &control,
        )
        .unwrap()
        .result;
        assert_eq!(r.status, RunStatus::Cancelled);
        assert!(r.indices.is_empty());
        assert_eq!(r.evaluations, 0);
    }

    #[test]
    fn test_inverted_range_rejected() {
        let bad = vec![ParameterRange {
            parameter: ModelParameter::RentPerM2,
            min: 200.0,
            max: 100.0,
        }];
        let err = global_sensitivity(
            &model(),
            &bad,
            64,
            Some(1),
            &EngineConfig::default(),
            &RunControl::new(),
        )
        .unwrap_err();
        assert!(matches!(err, PreSiteError::InvalidInput { .. }));
    }

    #[test]
    fn test_base_model_unchanged() {
        let m = model();
        let before = m.clone();
        global_sensitivity(
            &m,
            &ranges(),
            64,
            Some(1),
            &EngineConfig::default(),
            &RunControl::new(),
        )
        .unwrap();
        assert_eq!(m, before);
    }
}

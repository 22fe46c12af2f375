use rand::rngs::StdRng;
use rand::Rng;
use rand::SeedableRng;
use rayon::prelude::*;
use rust_decimal::prelude::ToPrimitive;
use serde::{Deserialize, Serialize};
use statrs::distribution::{LogNormal, Normal, Triangular, Uniform};
use std::collections::BTreeSet;
use std::fmt;
use std::time::Instant;
use tracing::debug;

use crate::cashflow::DevelopmentModel;
use crate::config::EngineConfig;
use crate::control::{RunControl, RunStatus};
use crate::error::PreSiteError;
use crate::parameters::ModelParameter;
use crate::time_value::{irr, npv};
use crate::types::{with_metadata_f64, ComputationOutput, Rate};
use crate::PreSiteResult;

/// Trials evaluated between two cancellation checks.
const CHUNK_SIZE: u32 = 256;

const HISTOGRAM_BINS: usize = 20;

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// Probability distribution of one uncertain input.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Distribution {
    Normal { mean: f64, std_dev: f64 },
    LogNormal { mu: f64, sigma: f64 },
    Triangular { min: f64, mode: f64, max: f64 },
    Uniform { min: f64, max: f64 },
}

/// A model parameter resampled on every trial.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UncertainParameter {
    pub parameter: ModelParameter,
    pub distribution: Distribution,
}

/// Outcome of one trial.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimulationTrial {
    pub index: u32,
    /// Sampled values after clamping, in the order of `SimulationBatch::parameters`.
    pub sampled: Vec<f64>,
    /// IRR clamped to the configured floor and ceiling.
    pub irr: f64,
    /// NPV at the target return.
    pub npv: f64,
    /// False when no IRR exists; `irr` then holds the floor.
    pub irr_solved: bool,
    /// Why the sampled project could not be evaluated. Failed trials hold
    /// the IRR floor and a zero NPV and are left out of the statistics.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failure: Option<String>,
}

impl SimulationTrial {
    pub fn failed(&self) -> bool {
        self.failure.is_some()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IrrPercentiles {
    pub p5: f64,
    pub p10: f64,
    pub p25: f64,
    pub p50: f64,
    pub p75: f64,
    pub p90: f64,
    pub p95: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IrrHistogramBin {
    pub lower: f64,
    pub upper: f64,
    pub count: u32,
    pub frequency: f64,
}

/// Distribution of the simulated IRR.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IrrStatistics {
    pub mean: f64,
    pub median: f64,
    pub std_dev: f64,
    pub min: f64,
    pub max: f64,
    pub percentiles: IrrPercentiles,
    /// Share of trials whose IRR meets or exceeds the target return.
    pub probability_of_gain: f64,
    pub mean_npv: f64,
    pub histogram: Vec<IrrHistogramBin>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimulationBatch {
    pub parameters: Vec<ModelParameter>,
    /// Master seed; rerunning with it reproduces every trial.
    pub seed: u64,
    pub requested_trials: u32,
    pub target_return: f64,
    pub trials: Vec<SimulationTrial>,
    /// `None` when no trial was evaluated, because the run stopped before
    /// the first one finished or every trial failed.
    pub statistics: Option<IrrStatistics>,
    /// Evaluated trials without an IRR.
    pub unsolved_trials: u32,
    #[serde(default)]
    pub failed_trials: u32,
    pub status: RunStatus,
}

// ---------------------------------------------------------------------------
// Sampling
// ---------------------------------------------------------------------------

enum Sampler {
    Normal(Normal),
    LogNormal(LogNormal),
    Triangular(Triangular),
    Uniform(Uniform),
}

impl Sampler {
    fn draw(&self, rng: &mut StdRng) -> f64 {
        match self {
            Sampler::Normal(d) => rng.sample::<f64, _>(d),
            Sampler::LogNormal(d) => rng.sample::<f64, _>(d),
            Sampler::Triangular(d) => rng.sample::<f64, _>(d),
            Sampler::Uniform(d) => rng.sample::<f64, _>(d),
        }
    }
}

fn invalid_distribution(
    parameter: ModelParameter,
    kind: &str,
    e: impl fmt::Display,
) -> PreSiteError {
    PreSiteError::InvalidInput {
        field: format!("distributions.{parameter}"),
        reason: format!("Invalid {kind} parameters: {e}"),
    }
}

impl Distribution {
    fn sampler(&self, parameter: ModelParameter) -> PreSiteResult<Sampler> {
        let sampler = match *self {
            Distribution::Normal { mean, std_dev } => Sampler::Normal(
                Normal::new(mean, std_dev)
                    .map_err(|e| invalid_distribution(parameter, "Normal", e))?,
            ),
            Distribution::LogNormal { mu, sigma } => Sampler::LogNormal(
                LogNormal::new(mu, sigma)
                    .map_err(|e| invalid_distribution(parameter, "LogNormal", e))?,
            ),
            Distribution::Triangular { min, mode, max } => Sampler::Triangular(
                Triangular::new(min, max, mode)
                    .map_err(|e| invalid_distribution(parameter, "Triangular", e))?,
            ),
            Distribution::Uniform { min, max } => Sampler::Uniform(
                Uniform::new(min, max)
                    .map_err(|e| invalid_distribution(parameter, "Uniform", e))?,
            ),
        };
        Ok(sampler)
    }
}

// ---------------------------------------------------------------------------
// Statistics helpers
// ---------------------------------------------------------------------------

/// Percentile of a sorted, non-empty slice with linear interpolation.
fn percentile_sorted(sorted: &[f64], p: f64) -> f64 {
    if sorted.len() == 1 {
        return sorted[0];
    }
    let rank = p / 100.0 * (sorted.len() - 1) as f64;
    let lower = rank.floor() as usize;
    let upper = rank.ceil() as usize;
    if lower == upper {
        sorted[lower]
    } else {
        let frac = rank - lower as f64;
        sorted[lower] * (1.0 - frac) + sorted[upper] * frac
    }
}

fn build_histogram(sorted: &[f64]) -> Vec<IrrHistogramBin> {
    let min_val = sorted[0];
    let max_val = sorted[sorted.len() - 1];
    let n = sorted.len() as f64;

    if (max_val - min_val).abs() < f64::EPSILON {
        return vec![IrrHistogramBin {
            lower: min_val,
            upper: max_val,
            count: sorted.len() as u32,
            frequency: 1.0,
        }];
    }

    let width = (max_val - min_val) / HISTOGRAM_BINS as f64;
    let mut counts = [0u32; HISTOGRAM_BINS];
    for &v in sorted {
        let idx = (((v - min_val) / width).floor() as usize).min(HISTOGRAM_BINS - 1);
        counts[idx] += 1;
    }

    counts
        .iter()
        .enumerate()
        .map(|(i, &count)| IrrHistogramBin {
            lower: min_val + i as f64 * width,
            upper: if i == HISTOGRAM_BINS - 1 {
                max_val
            } else {
                min_val + (i + 1) as f64 * width
            },
            count,
            frequency: count as f64 / n,
        })
        .collect()
}

fn compute_statistics(trials: &[SimulationTrial], target: f64) -> Option<IrrStatistics> {
    let trials: Vec<&SimulationTrial> = trials.iter().filter(|t| !t.failed()).collect();
    if trials.is_empty() {
        return None;
    }
    let n = trials.len() as f64;
    let mut values: Vec<f64> = trials.iter().map(|t| t.irr).collect();
    values.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));

    let mean = values.iter().sum::<f64>() / n;
    let variance = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n;
    let gains = values.iter().filter(|v| **v >= target).count();

    Some(IrrStatistics {
        mean,
        median: percentile_sorted(&values, 50.0),
        std_dev: variance.sqrt(),
        min: values[0],
        max: values[values.len() - 1],
        percentiles: IrrPercentiles {
            p5: percentile_sorted(&values, 5.0),
            p10: percentile_sorted(&values, 10.0),
            p25: percentile_sorted(&values, 25.0),
            p50: percentile_sorted(&values, 50.0),
            p75: percentile_sorted(&values, 75.0),
            p90: percentile_sorted(&values, 90.0),
            p95: percentile_sorted(&values, 95.0),
        },
        probability_of_gain: gains as f64 / n,
        mean_npv: trials.iter().map(|t| t.npv).sum::<f64>() / n,
        histogram: build_histogram(&values),
    })
}

// ---------------------------------------------------------------------------
// Trials
// ---------------------------------------------------------------------------

fn run_trial(
    base: &DevelopmentModel,
    uncertain: &[UncertainParameter],
    samplers: &[Sampler],
    index: u32,
    seed: u64,
    config: &EngineConfig,
) -> SimulationTrial {
    let mut rng = StdRng::seed_from_u64(seed);
    let mut model = base.clone();
    let mut sampled = Vec::with_capacity(uncertain.len());
    let mut failure = None;
    for (u, sampler) in uncertain.iter().zip(samplers) {
        let value = u.parameter.clamp_f64(&model, sampler.draw(&mut rng));
        sampled.push(value);
        if failure.is_none() {
            match u.parameter.with_f64(&model, value) {
                Ok(next) => model = next,
                Err(e) => failure = Some(e.to_string()),
            }
        }
    }

    let bounds = &config.simulation;
    let outcome = match failure {
        Some(reason) => Err(reason),
        None => evaluate_trial(&model, base.inputs.target_return, config)
            .map_err(|e| e.to_string()),
    };
    match outcome {
        Ok((irr_value, npv_value, irr_solved)) => SimulationTrial {
            index,
            sampled,
            irr: irr_value.clamp(bounds.irr_floor, bounds.irr_ceiling),
            npv: npv_value,
            irr_solved,
            failure: None,
        },
        Err(reason) => {
            debug!(index, %reason, "simulation trial failed");
            SimulationTrial {
                index,
                sampled,
                irr: bounds.irr_floor,
                npv: 0.0,
                irr_solved: false,
                failure: Some(reason),
            }
        }
    }
}

/// IRR (floored when unsolved), NPV at the target and whether the IRR was
/// solved, for one sampled model.
fn evaluate_trial(
    model: &DevelopmentModel,
    target_return: Rate,
    config: &EngineConfig,
) -> PreSiteResult<(f64, f64, bool)> {
    // The builder, not the base-case guard, decides what an oversized land
    // price means for a sampled equity.
    let series = model.build_with_land_price(model.land_price())?;
    let npv_value = npv(target_return, &series.flows)?
        .to_f64()
        .unwrap_or(f64::NAN);

    let floor = config.simulation.irr_floor;
    match irr(&series.flows, &config.solver) {
        Ok(r) => Ok((r.to_f64().unwrap_or(floor), npv_value, true)),
        Err(PreSiteError::NoIrrSolution { .. }) | Err(PreSiteError::NoRootFound { .. }) => {
            Ok((floor, npv_value, false))
        }
        Err(e) => Err(e),
    }
}

// ---------------------------------------------------------------------------
// Public API
// ---------------------------------------------------------------------------

/// Resample the uncertain parameters `count` times and rebuild the project
/// on every trial.
///
/// Each trial draws from its own `StdRng`, seeded in trial order from a
/// master generator, so the trial sequence for a given seed does not depend
/// on how rayon schedules the work. Sampled values are clamped to the
/// parameter's valid range; IRRs are clamped to
/// `[simulation.irr_floor, simulation.irr_ceiling]` and a trial without an
/// IRR is recorded at the floor. The control is checked between chunks of
/// trials; a stopped run returns the completed prefix.
pub fn simulate(
    base: &DevelopmentModel,
    uncertain: &[UncertainParameter],
    count: u32,
    seed: Option<u64>,
    config: &EngineConfig,
    control: &RunControl,
) -> PreSiteResult<ComputationOutput<SimulationBatch>> {
    let start = Instant::now();
    let mut warnings: Vec<String> = Vec::new();

    // -- Validation -----------------------------------------------------------
    if count == 0 {
        return Err(PreSiteError::InvalidSampleCount {
            count: 0,
            reason: "At least one trial is required".into(),
        });
    }
    if count > config.simulation.max_trials {
        return Err(PreSiteError::InvalidSampleCount {
            count: count as u64,
            reason: format!("Exceeds the limit of {} trials", config.simulation.max_trials),
        });
    }
    if uncertain.is_empty() {
        return Err(PreSiteError::InsufficientData(
            "At least one uncertain parameter is required".into(),
        ));
    }
    let mut seen = BTreeSet::new();
    for u in uncertain {
        if !seen.insert(u.parameter) {
            return Err(PreSiteError::InvalidInput {
                field: "distributions".into(),
                reason: format!("Parameter '{}' is declared more than once", u.parameter),
            });
        }
    }
    config.validate()?;
    base.inputs.validate()?;

    let samplers = uncertain
        .iter()
        .map(|u| u.distribution.sampler(u.parameter))
        .collect::<PreSiteResult<Vec<_>>>()?;

    // -- Trials ---------------------------------------------------------------
    let seed = seed.unwrap_or_else(|| StdRng::from_entropy().gen());
    let mut master = StdRng::seed_from_u64(seed);
    let mut trials: Vec<SimulationTrial> = Vec::with_capacity(count as usize);
    let mut status = RunStatus::Completed;

    let mut next = 0u32;
    while next < count {
        if let Some(stopped) = control.check() {
            status = stopped;
            break;
        }
        let end = next.saturating_add(CHUNK_SIZE).min(count);
        let seeds: Vec<(u32, u64)> = (next..end).map(|i| (i, master.gen::<u64>())).collect();
        let chunk = seeds
            .into_par_iter()
            .map(|(index, trial_seed)| {
                run_trial(base, uncertain, &samplers, index, trial_seed, config)
            })
            .collect::<Vec<_>>();
        trials.extend(chunk);
        next = end;
    }

    let target = base.inputs.target_return.to_f64().unwrap_or(0.0);
    let statistics = compute_statistics(&trials, target);
    let failed_trials = trials.iter().filter(|t| t.failed()).count() as u32;
    let unsolved_trials = trials
        .iter()
        .filter(|t| !t.failed() && !t.irr_solved)
        .count() as u32;
    let at_ceiling = trials
        .iter()
        .filter(|t| !t.failed() && t.irr >= config.simulation.irr_ceiling)
        .count();

    if failed_trials > 0 {
        warnings.push(format!(
            "{failed_trials} of {} trials could not be evaluated and were left out of the statistics",
            trials.len()
        ));
    }

    if unsolved_trials > 0 {
        warnings.push(format!(
            "{unsolved_trials} of {} trials had no IRR and were recorded at the floor of {}",
            trials.len(),
            config.simulation.irr_floor
        ));
    }
    if at_ceiling > 0 {
        warnings.push(format!(
            "{at_ceiling} trials were clamped at the IRR ceiling of {}",
            config.simulation.irr_ceiling
        ));
    }
    if !status.is_complete() {
        warnings.push(format!(
            "Simulation stopped ({status:?}) after {} of {count} trials",
            trials.len()
        ));
    }

    debug!(
        trials = trials.len(),
        unsolved = unsolved_trials,
        failed = failed_trials,
        status = ?status,
        "simulation finished"
    );

    let batch = SimulationBatch {
        parameters: uncertain.iter().map(|u| u.parameter).collect(),
        seed,
        requested_trials: count,
        target_return: target,
        trials,
        statistics,
        unsolved_trials,
        failed_trials,
        status,
    };

    let elapsed = start.elapsed().as_micros() as u64;
    Ok(with_metadata_f64(
        "Monte Carlo simulation of project IRR",
        &serde_json::json!({
            "trials": count,
            "seed": seed,
            "distributions": uncertain,
            "irr_floor": config.simulation.irr_floor,
            "irr_ceiling": config.simulation.irr_ceiling,
            "target_return": target,
        }),
        warnings,
        elapsed,
        batch,
    ))
}

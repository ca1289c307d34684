use crate::model::{DengueModel, DengueParams, VectorDenominator, DEFAULT_INITIAL_CONDITIONS, STATE_NAMES};
use crate::solvers::{integrate_fixed, integrate_to_samples, AdaptiveSettings};
use anyhow::{bail, ensure, Context, Result};
use log::info;
use serde::{Deserialize, Serialize};

/// Samples below this value count as negative when `reject_negative` is set.
pub const NEGATIVE_TOLERANCE: f64 = -1e-6;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind")]
pub enum Integrator {
    Adaptive { rtol: f64, atol: f64 },
    FixedRk4 { max_step: f64 },
}

impl Default for Integrator {
    fn default() -> Self {
        let defaults = AdaptiveSettings::default();
        Integrator::Adaptive {
            rtol: defaults.rtol,
            atol: defaults.atol,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimulationConfig {
    pub initial_conditions: [f64; 7],
    pub times: Vec<f64>,
    pub vector_denominator: VectorDenominator,
    pub integrator: Integrator,
    pub max_steps: usize,
    /// Fail when any sample drops below `NEGATIVE_TOLERANCE`.
    pub reject_negative: bool,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            initial_conditions: DEFAULT_INITIAL_CONDITIONS,
            times: linspace(0.0, 200.0, 1000),
            vector_denominator: VectorDenominator::HumanPopulation,
            integrator: Integrator::default(),
            max_steps: 100_000,
            reject_negative: false,
        }
    }
}

/// State at each requested time, one row per sample.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Trajectory {
    pub times: Vec<f64>,
    pub states: Vec<[f64; 7]>,
}

impl Trajectory {
    pub fn len(&self) -> usize {
        self.times.len()
    }

    pub fn is_empty(&self) -> bool {
        self.times.is_empty()
    }

    /// Time series of one state variable.
    pub fn column(&self, index: usize) -> Vec<f64> {
        self.states.iter().map(|row| row[index]).collect()
    }

    pub fn column_by_name(&self, name: &str) -> Option<Vec<f64>> {
        STATE_NAMES
            .iter()
            .position(|n| *n == name)
            .map(|idx| self.column(idx))
    }

    /// Smallest value over all samples and compartments.
    pub fn min_value(&self) -> f64 {
        self.states
            .iter()
            .flat_map(|row| row.iter().copied())
            .fold(f64::INFINITY, f64::min)
    }
}

/// `count` evenly spaced points on `[start, end]`, both ends included.
pub fn linspace(start: f64, end: f64, count: usize) -> Vec<f64> {
    match count {
        0 => Vec::new(),
        1 => vec![start],
        _ => {
            let step = (end - start) / (count - 1) as f64;
            (0..count)
                .map(|i| if i == count - 1 { end } else { start + step * i as f64 })
                .collect()
        }
    }
}

/// Integrates the dengue model over `config.times`.
pub fn simulate(params: &DengueParams, config: &SimulationConfig) -> Result<Trajectory> {
    params.validate()?;
    let y0 = config.initial_conditions;
    ensure!(
        y0.iter().all(|v| v.is_finite() && *v >= 0.0),
        "Initial conditions must be finite and non-negative: {:?}",
        y0
    );
    let (n_h, n_v) = DengueModel::populations(&y0);
    ensure!(n_h > 0.0, "Total human population N_H must be positive.");
    if config.vector_denominator == VectorDenominator::VectorPopulation {
        ensure!(n_v > 0.0, "Total vector population N_V must be positive.");
    }

    let model = DengueModel::new(*params, config.vector_denominator);
    let rows = match config.integrator {
        Integrator::Adaptive { rtol, atol } => {
            let settings = AdaptiveSettings {
                rtol,
                atol,
                max_steps: config.max_steps,
                initial_step: None,
            };
            let (rows, stats) = integrate_to_samples(&model, &y0, &config.times, settings)
                .context("Adaptive integration of the dengue model failed.")?;
            info!(
                "Simulated {} samples ({} accepted / {} rejected steps).",
                rows.len(),
                stats.accepted,
                stats.rejected
            );
            rows
        }
        Integrator::FixedRk4 { max_step } => integrate_fixed(&model, &y0, &config.times, max_step)
            .context("Fixed-step integration of the dengue model failed.")?
            .into_iter()
            .map(|row| {
                <[f64; 7]>::try_from(row)
                    .map_err(|row| anyhow::anyhow!("Expected 7 state values, got {}.", row.len()))
            })
            .collect::<Result<Vec<_>>>()?,
    };

    let mut states = Vec::with_capacity(rows.len());
    for (t, state) in config.times.iter().zip(rows) {
        if config.reject_negative {
            if let Some(idx) = state.iter().position(|v| *v < NEGATIVE_TOLERANCE) {
                bail!(
                    "Compartment {} became negative ({}) at t = {}.",
                    STATE_NAMES[idx],
                    state[idx],
                    t
                );
            }
        }
        states.push(state);
    }

    Ok(Trajectory {
        times: config.times.clone(),
        states,
    })
}

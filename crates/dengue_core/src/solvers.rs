use crate::traits::{DynamicalSystem, Scalar, Steppable};
use anyhow::{bail, ensure, Result};
use log::debug;
use ode_solvers::dop853::Dop853;
use ode_solvers::dop_shared::OutputType;
use ode_solvers::{SVector, System};
use serde::{Deserialize, Serialize};

/// Classic Runge-Kutta 4th Order Solver
pub struct RK4<T: Scalar> {
    k1: Vec<T>,
    k2: Vec<T>,
    k3: Vec<T>,
    k4: Vec<T>,
    tmp: Vec<T>,
}

impl<T: Scalar> RK4<T> {
    pub fn new(dim: usize) -> Self {
        Self {
            k1: vec![T::zero(); dim],
            k2: vec![T::zero(); dim],
            k3: vec![T::zero(); dim],
            k4: vec![T::zero(); dim],
            tmp: vec![T::zero(); dim],
        }
    }
}

impl<T: Scalar> Steppable<T> for RK4<T> {
    fn step(&mut self, system: &impl DynamicalSystem<T>, t: &mut T, state: &mut [T], dt: T) {
        let half = T::from_f64(0.5);
        let sixth = T::from_f64(1.0 / 6.0);
        let two = T::from_f64(2.0);

        let t0 = *t;

        // k1 = f(t, y)
        system.apply(t0, state, &mut self.k1);

        // k2 = f(t + dt/2, y + dt*k1/2)
        for i in 0..state.len() {
            self.tmp[i] = state[i] + dt * self.k1[i] * half;
        }
        system.apply(t0 + dt * half, &self.tmp, &mut self.k2);

        // k3 = f(t + dt/2, y + dt*k2/2)
        for i in 0..state.len() {
            self.tmp[i] = state[i] + dt * self.k2[i] * half;
        }
        system.apply(t0 + dt * half, &self.tmp, &mut self.k3);

        // k4 = f(t + dt, y + dt*k3)
        for i in 0..state.len() {
            self.tmp[i] = state[i] + dt * self.k3[i];
        }
        system.apply(t0 + dt, &self.tmp, &mut self.k4);

        // y_next = y + dt/6 * (k1 + 2k2 + 2k3 + k4)
        for i in 0..state.len() {
            state[i] = state[i]
                + dt * sixth * (self.k1[i] + two * self.k2[i] + two * self.k3[i] + self.k4[i]);
        }

        *t = t0 + dt;
    }
}

// --- Sampled integration ---

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct AdaptiveSettings {
    pub rtol: f64,
    pub atol: f64,
    /// Step budget shared by every sample segment.
    pub max_steps: usize,
    /// First trial step of each segment; DOP853 picks one when absent.
    pub initial_step: Option<f64>,
}

impl Default for AdaptiveSettings {
    fn default() -> Self {
        Self {
            rtol: 1.49012e-8,
            atol: 1.49012e-8,
            max_steps: 100_000,
            initial_step: None,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IntegrationStats {
    pub accepted: usize,
    pub rejected: usize,
    pub evaluations: usize,
}

fn check_times(times: &[f64]) -> Result<()> {
    ensure!(!times.is_empty(), "At least one sample time is required.");
    ensure!(times.iter().all(|t| t.is_finite()), "Sample times must be finite.");
    ensure!(
        times.windows(2).all(|w| w[1] >= w[0]),
        "Sample times must be non-decreasing."
    );
    Ok(())
}

fn check_finite(t: f64, state: &[f64]) -> Result<()> {
    if state.iter().any(|v| !v.is_finite()) {
        bail!("State became non-finite at t = {}: {:?}", t, state);
    }
    Ok(())
}

/// Bridges a `DynamicalSystem` to the DOP853 driver. `offset` shifts the
/// solver's local time, which restarts at zero on every sample segment.
struct Dop853System<'a, S> {
    system: &'a S,
    offset: f64,
}

impl<S: DynamicalSystem<f64>, const N: usize> System<SVector<f64, N>> for Dop853System<'_, S> {
    fn system(&self, x: f64, y: &SVector<f64, N>, dy: &mut SVector<f64, N>) {
        self.system.apply(self.offset + x, y.as_slice(), dy.as_mut_slice());
    }
}

/// Integrates with DOP853 and returns the state at every requested time.
/// Each pair of consecutive samples is its own solver run, so every sample is
/// an accepted step rather than an interpolated value.
pub fn integrate_to_samples<const N: usize>(
    system: &impl DynamicalSystem<f64>,
    y0: &[f64; N],
    times: &[f64],
    settings: AdaptiveSettings,
) -> Result<(Vec<[f64; N]>, IntegrationStats)> {
    check_times(times)?;
    ensure!(
        N == system.dimension(),
        "Initial condition dimension mismatch. Expected {}, got {}.",
        system.dimension(),
        N
    );
    ensure!(
        settings.rtol > 0.0 && settings.atol > 0.0,
        "Tolerances must be positive."
    );
    let first_step = match settings.initial_step {
        Some(h) => {
            ensure!(h > 0.0, "initial_step must be positive.");
            h
        }
        // DOP853 estimates the first step itself when given zero.
        None => 0.0,
    };
    check_finite(times[0], y0)?;

    let mut stats = IntegrationStats::default();
    let mut y = SVector::<f64, N>::from_column_slice(y0);
    let mut samples = Vec::with_capacity(times.len());
    samples.push(*y0);

    for window in times.windows(2) {
        let (t0, t1) = (window[0], window[1]);
        let span = t1 - t0;
        if span > 0.0 {
            let used = stats.accepted + stats.rejected;
            ensure!(
                used < settings.max_steps,
                "Integration exceeded {} steps before reaching t = {}.",
                settings.max_steps,
                t1
            );
            let budget = u32::try_from(settings.max_steps - used).unwrap_or(u32::MAX);
            let mut stepper = Dop853::from_param(
                Dop853System { system, offset: t0 },
                0.0,
                span,
                span,
                y,
                settings.rtol,
                settings.atol,
                0.9,
                0.0,
                0.333,
                6.0,
                span,
                first_step.min(span),
                budget,
                1000,
                OutputType::Sparse,
            );
            let run = match stepper.integrate() {
                Ok(run) => run,
                Err(e) => bail!("Integration stopped before reaching t = {}: {}", t1, e),
            };
            stats.accepted += run.accepted_steps as usize;
            stats.rejected += run.rejected_steps as usize;
            stats.evaluations += run.num_eval as usize;

            let reached = stepper.x_out().last().copied().unwrap_or(0.0);
            ensure!(
                (reached - span).abs() <= 1e-9 * span.max(1.0),
                "Integration stopped at t = {} before reaching t = {}.",
                t0 + reached,
                t1
            );
            y = match stepper.y_out().last() {
                Some(last) => *last,
                None => bail!("Integration produced no output between t = {} and t = {}.", t0, t1),
            };
        }
        let row: [f64; N] = y.into();
        check_finite(t1, &row)?;
        samples.push(row);
    }

    debug!(
        "Adaptive integration: {} accepted, {} rejected, {} evaluations.",
        stats.accepted, stats.rejected, stats.evaluations
    );
    Ok((samples, stats))
}

/// Fixed-step RK4 between samples, with at most `max_step` per step.
pub fn integrate_fixed(
    system: &impl DynamicalSystem<f64>,
    y0: &[f64],
    times: &[f64],
    max_step: f64,
) -> Result<Vec<Vec<f64>>> {
    check_times(times)?;
    ensure!(max_step > 0.0, "max_step must be positive.");
    ensure!(
        y0.len() == system.dimension(),
        "Initial condition dimension mismatch. Expected {}, got {}.",
        system.dimension(),
        y0.len()
    );

    let mut solver = RK4::<f64>::new(y0.len());
    let mut t = times[0];
    let mut y = y0.to_vec();
    let mut samples = Vec::with_capacity(times.len());
    samples.push(y.clone());

    for &target in &times[1..] {
        let span = target - t;
        if span > 0.0 {
            let steps = (span / max_step).ceil().max(1.0) as usize;
            let dt = span / steps as f64;
            for _ in 0..steps {
                solver.step(system, &mut t, &mut y, dt);
            }
            check_finite(t, &y)?;
        }
        t = target;
        samples.push(y.clone());
    }
    Ok(samples)
}

#[cfg(test)]
mod tests {
    use super::*;

    /// dx/dt = -k x, dy/dt = x.
    struct Decay {
        k: f64,
    }

    impl DynamicalSystem<f64> for Decay {
        fn dimension(&self) -> usize {
            2
        }

        fn apply(&self, _t: f64, x: &[f64], out: &mut [f64]) {
            out[0] = -self.k * x[0];
            out[1] = x[0];
        }
    }

    fn exact(k: f64, t: f64) -> [f64; 2] {
        let x = (-k * t).exp();
        [x, (1.0 - x) / k]
    }

    /// dx/dt = t.
    struct Ramp;

    impl DynamicalSystem<f64> for Ramp {
        fn dimension(&self) -> usize {
            1
        }

        fn apply(&self, t: f64, _x: &[f64], out: &mut [f64]) {
            out[0] = t;
        }
    }

    #[test]
    fn adaptive_hits_every_sample_within_tolerance() {
        let system = Decay { k: 0.7 };
        let times: Vec<f64> = (0..=40).map(|i| i as f64 * 0.25).collect();
        let (samples, stats) =
            integrate_to_samples(&system, &[1.0, 0.0], &times, AdaptiveSettings::default())
                .expect("integration should succeed");
        assert_eq!(samples.len(), times.len());
        assert!(stats.accepted >= times.len() - 1);
        for (t, y) in times.iter().zip(&samples) {
            let want = exact(0.7, *t);
            assert!((y[0] - want[0]).abs() < 1e-9, "x({t}) = {} vs {}", y[0], want[0]);
            assert!((y[1] - want[1]).abs() < 1e-9, "y({t}) = {} vs {}", y[1], want[1]);
        }
    }

    #[test]
    fn segments_keep_absolute_time() {
        let (samples, _) = integrate_to_samples(&Ramp, &[0.0], &[2.0, 3.0, 5.0], AdaptiveSettings::default())
            .expect("integration should succeed");
        assert!((samples[1][0] - 2.5).abs() < 1e-12, "got {}", samples[1][0]);
        assert!((samples[2][0] - 10.5).abs() < 1e-12, "got {}", samples[2][0]);
    }

    #[test]
    fn repeated_sample_times_are_allowed() {
        let system = Decay { k: 1.0 };
        let (samples, _) =
            integrate_to_samples(&system, &[1.0, 0.0], &[0.0, 1.0, 1.0], AdaptiveSettings::default())
                .expect("integration should succeed");
        assert_eq!(samples[1], samples[2]);
    }

    #[test]
    fn rk4_matches_exact_solution() {
        let system = Decay { k: 0.5 };
        let times = [0.0, 1.0, 2.0];
        let samples = integrate_fixed(&system, &[1.0, 0.0], &times, 0.01).expect("integration should succeed");
        let want = exact(0.5, 2.0);
        assert!((samples[2][0] - want[0]).abs() < 1e-9);
        assert!((samples[2][1] - want[1]).abs() < 1e-9);
    }

    #[test]
    fn rejects_bad_inputs() {
        let system = Decay { k: 1.0 };
        let err = integrate_to_samples(&system, &[1.0, 0.0], &[1.0, 0.0], AdaptiveSettings::default())
            .expect_err("decreasing times should fail");
        assert!(err.to_string().contains("non-decreasing"), "unexpected error: {err}");

        let err = integrate_to_samples(&system, &[1.0], &[0.0, 1.0], AdaptiveSettings::default())
            .expect_err("dimension mismatch should fail");
        assert!(err.to_string().contains("dimension mismatch"), "unexpected error: {err}");

        let settings = AdaptiveSettings {
            initial_step: Some(-1.0),
            ..AdaptiveSettings::default()
        };
        let err = integrate_to_samples(&system, &[1.0, 0.0], &[0.0, 1.0], settings)
            .expect_err("negative first step should fail");
        assert!(err.to_string().contains("initial_step"), "unexpected error: {err}");
    }

    #[test]
    fn step_budget_is_shared_across_segments() {
        let system = Decay { k: 1.0 };
        let times: Vec<f64> = (0..=200).map(|i| i as f64 * 0.5).collect();
        let (_, stats) = integrate_to_samples(&system, &[1.0, 0.0], &times, AdaptiveSettings::default())
            .expect("integration should succeed");
        let used = stats.accepted + stats.rejected;

        let settings = AdaptiveSettings {
            max_steps: used / 2,
            ..AdaptiveSettings::default()
        };
        let err = integrate_to_samples(&system, &[1.0, 0.0], &times, settings)
            .expect_err("step budget should be exhausted");
        assert!(err.to_string().contains("before reaching"), "unexpected error: {err}");
    }
}

//! Explicit time integration settings and solver state.
//!
//! The update of one step is, with `Δt` the step and `a_n` the previous
//! acceleration:
//!
//! ```text
//! predictor:  Δu = Δt·v + (½ − β)·Δt²·a_n
//!             v  = v + (1 − γ)·Δt·a_n
//! corrector:  a  = (F/m − α_M·a_n) / (1 − α_M)
//!             v  = v + γ·Δt·a
//!             Δu = Δu + β·Δt²·a
//! ```
//!
//! The central difference scheme is `α_M = 0, β = 0, γ = ½` with a
//! stability bound `Ω_s = 2`. The Chung–Hulbert scheme adds numerical
//! damping of the highest frequencies controlled by the spectral radius
//! at the bifurcation limit.

use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use serde::{Deserialize, Serialize};

use crate::elements::Integration;
use crate::error::{Result, SolverError};
use crate::kernel::KernelSettings;
use crate::time_step::TimeStepMethod;

/// Time integration scheme
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub enum IntegrationScheme {
    #[default]
    CentralDifference,
    /// Chung–Hulbert explicit scheme with spectral radius `ρ_b ∈ [0, 1]`
    ChungHulbert { spectral_radius: f64 },
}

/// Coefficients of the predictor/corrector update
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SchemeParameters {
    pub alpha_m: f64,
    pub beta: f64,
    pub gamma: f64,
    /// Stability limit `Ω_s = ω_max·Δt_crit`
    pub omega_s: f64,
}

impl IntegrationScheme {
    pub fn parameters(&self) -> SchemeParameters {
        match *self {
            IntegrationScheme::CentralDifference => SchemeParameters {
                alpha_m: 0.0,
                beta: 0.0,
                gamma: 0.5,
                omega_s: 2.0,
            },
            IntegrationScheme::ChungHulbert { spectral_radius: rb } => {
                let alpha_m = (2.0 * rb - 1.0) / (1.0 + rb);
                let beta = (5.0 - 3.0 * rb) / ((1.0 + rb).powi(2) * (2.0 - rb));
                let gamma = 1.5 - alpha_m;
                let omega_s = (12.0 * (1.0 + rb).powi(3) * (2.0 - rb)
                    / (10.0 + 15.0 * rb - rb.powi(2) + rb.powi(3) - rb.powi(4)))
                .sqrt();
                SchemeParameters {
                    alpha_m,
                    beta,
                    gamma,
                    omega_s,
                }
            }
        }
    }
}

/// Times at which snapshots are taken: `start, start + increment, ...`
/// up to `stop`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SaveSchedule {
    pub start: f64,
    pub stop: f64,
    pub increment: f64,
}

impl SaveSchedule {
    pub fn new(start: f64, stop: f64, increment: f64) -> Self {
        Self {
            start,
            stop,
            increment,
        }
    }

    /// First save time strictly after `time`, if any
    pub fn next_after(&self, time: f64) -> Option<f64> {
        if time < self.start {
            return Some(self.start);
        }
        let count = ((time - self.start) / self.increment).floor() + 1.0;
        let mut next = self.start + count * self.increment;
        if next <= time {
            next += self.increment;
        }
        (next <= self.stop * (1.0 + 1.0e-12)).then_some(next.min(self.stop))
    }
}

/// Explicit analysis configuration
#[derive(Debug, Clone, PartialEq)]
pub struct ExplicitConfig {
    pub start_time: f64,
    pub stop_time: f64,
    pub scheme: IntegrationScheme,
    pub time_step_method: TimeStepMethod,
    /// Fraction of the critical step actually taken
    pub safety_factor: f64,
    /// Steps between two critical step evaluations
    pub recompute_every: usize,
    pub integration: Integration,
    pub hourglass_coefficient: f64,
    pub return_tolerance: f64,
    pub return_max_iterations: usize,
    pub workers: usize,
    /// Halvings of Δt allowed when an element degenerates during a step
    pub max_step_retries: usize,
    pub save: Option<SaveSchedule>,
    /// Directory for snapshot files; snapshots are kept in memory if unset
    pub output_dir: Option<PathBuf>,
}

impl Default for ExplicitConfig {
    fn default() -> Self {
        let mapping = crate::constitutive::ReturnMapping::default();
        Self {
            start_time: 0.0,
            stop_time: 0.0,
            scheme: IntegrationScheme::default(),
            time_step_method: TimeStepMethod::default(),
            safety_factor: 0.9,
            recompute_every: 1,
            integration: Integration::default(),
            hourglass_coefficient: 0.1,
            return_tolerance: mapping.tolerance,
            return_max_iterations: mapping.max_iterations,
            workers: std::thread::available_parallelism().map_or(1, |n| n.get()),
            max_step_retries: 0,
            save: None,
            output_dir: None,
        }
    }
}

impl ExplicitConfig {
    /// Run from 0 to `stop_time`
    pub fn new(stop_time: f64) -> Self {
        Self {
            stop_time,
            ..Self::default()
        }
    }

    pub fn with_start_time(mut self, start_time: f64) -> Self {
        self.start_time = start_time;
        self
    }

    pub fn with_scheme(mut self, scheme: IntegrationScheme) -> Self {
        self.scheme = scheme;
        self
    }

    pub fn with_time_step_method(mut self, method: TimeStepMethod) -> Self {
        self.time_step_method = method;
        self
    }

    pub fn with_safety_factor(mut self, safety_factor: f64) -> Self {
        self.safety_factor = safety_factor;
        self
    }

    pub fn with_recompute_every(mut self, steps: usize) -> Self {
        self.recompute_every = steps;
        self
    }

    pub fn with_integration(mut self, integration: Integration) -> Self {
        self.integration = integration;
        self
    }

    pub fn with_hourglass_coefficient(mut self, coefficient: f64) -> Self {
        self.hourglass_coefficient = coefficient;
        self
    }

    pub fn with_return_mapping(mut self, tolerance: f64, max_iterations: usize) -> Self {
        self.return_tolerance = tolerance;
        self.return_max_iterations = max_iterations;
        self
    }

    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = workers;
        self
    }

    pub fn with_max_step_retries(mut self, retries: usize) -> Self {
        self.max_step_retries = retries;
        self
    }

    pub fn with_save(mut self, schedule: SaveSchedule) -> Self {
        self.save = Some(schedule);
        self
    }

    pub fn with_output_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.output_dir = Some(dir.into());
        self
    }

    pub fn kernel_settings(&self) -> KernelSettings {
        KernelSettings {
            integration: self.integration,
            hourglass_coefficient: self.hourglass_coefficient,
            return_mapping: crate::constitutive::ReturnMapping {
                tolerance: self.return_tolerance,
                max_iterations: self.return_max_iterations,
            },
        }
    }

    pub fn validate(&self) -> Result<()> {
        let fail = |what: String| Err(SolverError::Configuration(what));
        if !self.start_time.is_finite()
            || !self.stop_time.is_finite()
            || self.stop_time <= self.start_time
        {
            return fail(format!(
                "stop time {} must exceed start time {}",
                self.stop_time, self.start_time
            ));
        }
        if !(self.safety_factor > 0.0 && self.safety_factor <= 1.0) {
            return fail(format!("safety factor {} must lie in (0, 1]", self.safety_factor));
        }
        if self.recompute_every == 0 {
            return fail("critical step must be recomputed at least every step".into());
        }
        if !(self.hourglass_coefficient >= 0.0) {
            return fail("hourglass coefficient must be non-negative".into());
        }
        if self.workers == 0 {
            return fail("worker count must be at least 1".into());
        }
        if let IntegrationScheme::ChungHulbert { spectral_radius } = self.scheme {
            if !(0.0..=1.0).contains(&spectral_radius) {
                return fail(format!("spectral radius {spectral_radius} must lie in [0, 1]"));
            }
        }
        if let TimeStepMethod::PowerIteration(settings) = &self.time_step_method {
            if !(settings.tolerance >= 0.0) || settings.max_iterations == 0 {
                return fail("invalid power iteration settings".into());
            }
        }
        if let Some(save) = &self.save {
            if !(save.increment > 0.0) || save.stop < save.start {
                return fail("save schedule needs a positive increment and stop >= start".into());
            }
        }
        Ok(())
    }
}

/// Solver life cycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Phase {
    Initializing,
    Stepping,
    Saving,
    Terminated,
}

/// Progress of a run
#[derive(Debug, Clone, PartialEq)]
pub struct SolverState {
    pub phase: Phase,
    pub time: f64,
    pub step: usize,
    /// Last step taken
    pub time_step: f64,
    /// Last critical step
    pub critical_time_step: f64,
    pub next_save: Option<f64>,
    pub stop_time: f64,
}

impl SolverState {
    pub fn new(config: &ExplicitConfig) -> Self {
        Self {
            phase: Phase::Initializing,
            time: config.start_time,
            step: 0,
            time_step: 0.0,
            critical_time_step: 0.0,
            next_save: None,
            stop_time: config.stop_time,
        }
    }
}

/// Cooperative cancellation flag, checked between steps
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    flag: Arc<AtomicBool>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.flag.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::Relaxed)
    }

    pub fn reset(&self) {
        self.flag.store(false, Ordering::Relaxed);
    }
}

/// Critical step bookkeeping between two evaluations.
///
/// Between evaluations the step is extrapolated linearly from the last two
/// computed values, never above the last one.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub(crate) struct StepControl {
    last: Option<(usize, f64)>,
    previous: Option<(usize, f64)>,
}

impl StepControl {
    pub(crate) fn due(&self, step: usize, every: usize) -> bool {
        match self.last {
            Some((at, _)) => step >= at + every,
            None => true,
        }
    }

    pub(crate) fn store(&mut self, step: usize, critical: f64) {
        self.previous = self.last;
        self.last = Some((step, critical));
    }

    pub(crate) fn estimate(&self, step: usize) -> Option<f64> {
        let (s1, d1) = self.last?;
        let estimate = match self.previous {
            Some((s0, d0)) if s1 > s0 => {
                let slope = (d1 - d0) / (s1 - s0) as f64;
                (d1 + slope * (step - s1) as f64).min(d1)
            }
            _ => d1,
        };
        (estimate > 0.0).then_some(estimate)
    }
}

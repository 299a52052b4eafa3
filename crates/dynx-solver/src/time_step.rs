//! Critical time step estimation.
//!
//! Both strategies return the highest frequency `f_max` of the discrete
//! system; the integrator turns it into a step `Δt = safety·Ω_s/f_max`.

use nalgebra::SMatrix;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::elements::{Integration, Quad4};
use crate::error::{Result, SolverError};
use crate::kernel::{self, degenerate};
use crate::materials::Material;
use crate::mesh::{Element, Node};
use crate::parallel::ElementLoop;
use crate::state::PointArena;

/// Power iteration controls
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PowerIterationSettings {
    /// Relative change of the eigenvalue estimate below which it is accepted
    pub tolerance: f64,
    pub max_iterations: usize,
}

impl Default for PowerIterationSettings {
    fn default() -> Self {
        Self {
            tolerance: 1.0e-4,
            max_iterations: 1000,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub enum TimeStepMethod {
    /// Smallest element transit time `l/c`
    #[default]
    Courant,
    /// Largest eigenvalue of `M⁻¹K`
    PowerIteration(PowerIterationSettings),
}

/// Everything the estimators read from the current state
#[derive(Debug, Clone, Copy)]
pub struct StepInputs<'a> {
    pub elements: &'a [Element],
    pub materials: &'a [Material],
    pub element_materials: &'a [usize],
    pub nodes: &'a [Node],
    pub arena: &'a PointArena,
    pub integration: Integration,
}

impl StepInputs<'_> {
    fn quad(&self, index: usize) -> Quad4 {
        kernel::current_quad(&self.elements[index], self.nodes)
    }

    fn material(&self, index: usize) -> &Material {
        &self.materials[self.element_materials[index]]
    }
}

/// Highest frequency of the mesh with the selected method
pub fn max_frequency(
    method: &TimeStepMethod,
    inputs: &StepInputs<'_>,
    pool: &ElementLoop,
) -> Result<f64> {
    match method {
        TimeStepMethod::Courant => courant_frequency(inputs, pool),
        TimeStepMethod::PowerIteration(settings) => {
            power_iteration_frequency(inputs, settings, pool)
        }
    }
}

/// `f_max = 2 / min(l/c)` over all elements
pub fn courant_frequency(inputs: &StepInputs<'_>, pool: &ElementLoop) -> Result<f64> {
    let min_transit = pool.min_over(inputs.elements.len(), |index| {
        let element = &inputs.elements[index];
        let length = inputs.quad(index).characteristic_length();
        if !(length > 0.0) {
            return Err(degenerate(element));
        }
        let speed = kernel::wave_speed(inputs.material(index), inputs.arena.element(index));
        Ok(length / speed)
    })?;
    Ok(2.0 / min_transit)
}

/// `f_max = √λ_max(M⁻¹K)` by matrix-free power iteration over the element
/// elastic stiffness matrices.
pub fn power_iteration_frequency(
    inputs: &StepInputs<'_>,
    settings: &PowerIterationSettings,
    pool: &ElementLoop,
) -> Result<f64> {
    let stiffness: Vec<SMatrix<f64, 8, 8>> = pool.map_elements(inputs.elements.len(), |index| {
        inputs
            .quad(index)
            .stiffness_matrix(inputs.material(index), inputs.integration)
            .ok_or_else(|| degenerate(&inputs.elements[index]))
    })?;

    let num_dofs = 2 * inputs.nodes.len();
    if num_dofs < 2 {
        return Err(SolverError::config("power iteration needs at least one node"));
    }
    let mut x: Vec<f64> = (0..num_dofs)
        .map(|i| 1.0 - 2.0 * i as f64 / (num_dofs - 1).max(1) as f64)
        .collect();
    let mut y = vec![0.0; num_dofs];
    let mut lambda = 0.0;
    let mut change = f64::INFINITY;

    for iteration in 1..=settings.max_iterations {
        y.iter_mut().for_each(|v| *v = 0.0);
        for (element, k) in inputs.elements.iter().zip(stiffness.iter()) {
            let slot = |i: usize| 2 * element.node_indices[i / 2] + i % 2;
            let local = SMatrix::<f64, 8, 1>::from_fn(|i, _| x[slot(i)]);
            let product = k * local;
            for i in 0..8 {
                y[slot(i)] += product[i];
            }
        }
        for (dof, value) in y.iter_mut().enumerate() {
            let mass = inputs.nodes[dof / 2].mass;
            *value = if mass > 0.0 { *value / mass } else { 0.0 };
        }

        let estimate = y.iter().fold(0.0f64, |m, v| m.max(v.abs()));
        if !(estimate > 0.0) || !estimate.is_finite() {
            return Err(SolverError::MeshDegeneracy(format!(
                "power iteration produced a non-positive eigenvalue estimate {estimate:e}"
            )));
        }
        change = (estimate - lambda).abs() / estimate;
        lambda = estimate;
        for (xi, yi) in x.iter_mut().zip(y.iter()) {
            *xi = yi / estimate;
        }
        if change < settings.tolerance {
            debug!(iterations = iteration, lambda, "power iteration converged");
            return Ok(lambda.sqrt());
        }
    }

    Err(SolverError::PowerIteration {
        iterations: settings.max_iterations,
        change,
    })
}

//! Integration point state, stored in a flat arena.
//!
//! Point `p` of element `e` lives at `e * points_per_element + p`, so a
//! contiguous range of elements maps to a contiguous slice of states. The
//! parallel layer relies on this to hand disjoint slices to its workers.

use nalgebra::Matrix3;

use crate::tensor;

/// Mutable state of one integration point
#[derive(Debug, Clone, PartialEq)]
pub struct PointState {
    /// Cauchy stress
    pub stress: Matrix3<f64>,
    /// Accumulated logarithmic strain
    pub strain: Matrix3<f64>,
    /// Strain increment of the current step
    pub strain_increment: Matrix3<f64>,
    /// Plastic strain tensor
    pub plastic_strain_tensor: Matrix3<f64>,
    /// Equivalent plastic strain
    pub plastic_strain: f64,
    pub plastic_strain_rate: f64,
    pub temperature: f64,
    pub density: f64,
    pub pressure: f64,
    /// Current flow stress, zero until the first plastic check
    pub yield_stress: f64,
    /// Last plastic multiplier
    pub gamma: f64,
    pub gamma_cumulated: f64,
    /// Specific internal energy
    pub internal_energy: f64,
    /// Specific dissipated plastic energy
    pub inelastic_energy: f64,
    /// `w·det J0`, times `r0` for axisymmetric elements
    pub reference_volume: f64,
    /// Mass carried by the point, `ρ0·w·det J0·(2πr0)`
    pub mass: f64,
}

impl PointState {
    pub fn new(density: f64, temperature: f64) -> Self {
        Self {
            stress: Matrix3::zeros(),
            strain: Matrix3::zeros(),
            strain_increment: Matrix3::zeros(),
            plastic_strain_tensor: Matrix3::zeros(),
            plastic_strain: 0.0,
            plastic_strain_rate: 0.0,
            temperature,
            density,
            pressure: 0.0,
            yield_stress: 0.0,
            gamma: 0.0,
            gamma_cumulated: 0.0,
            internal_energy: 0.0,
            inelastic_energy: 0.0,
            reference_volume: 0.0,
            mass: 0.0,
        }
    }

    pub fn von_mises(&self) -> f64 {
        tensor::von_mises(&self.stress)
    }
}

/// Flat storage of every integration point in the mesh
#[derive(Debug, Clone, Default)]
pub struct PointArena {
    points_per_element: usize,
    states: Vec<PointState>,
}

impl PointArena {
    pub fn new(points_per_element: usize, states: Vec<PointState>) -> Self {
        debug_assert!(points_per_element > 0 && states.len() % points_per_element == 0);
        Self {
            points_per_element,
            states,
        }
    }

    pub fn points_per_element(&self) -> usize {
        self.points_per_element
    }

    pub fn num_elements(&self) -> usize {
        if self.points_per_element == 0 {
            0
        } else {
            self.states.len() / self.points_per_element
        }
    }

    /// Points of the element at `index`
    pub fn element(&self, index: usize) -> &[PointState] {
        let start = index * self.points_per_element;
        &self.states[start..start + self.points_per_element]
    }

    pub fn element_mut(&mut self, index: usize) -> &mut [PointState] {
        let start = index * self.points_per_element;
        &mut self.states[start..start + self.points_per_element]
    }

    pub fn states(&self) -> &[PointState] {
        &self.states
    }

    pub fn states_mut(&mut self) -> &mut [PointState] {
        &mut self.states
    }

    pub fn iter(&self) -> impl Iterator<Item = &PointState> {
        self.states.iter()
    }
}

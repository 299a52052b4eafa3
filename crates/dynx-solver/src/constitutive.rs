//! Radial return stress update with adiabatic heating.
//!
//! The deviatoric trial stress `s* = s_n + 2G·dev(Δε)` is checked against
//! the flow stress stored at the point. When it lies outside, the plastic
//! multiplier Γ solves
//!
//! ```text
//! f(Γ) = √(3/2)·‖s*‖ − √(3/2)·2G·Γ − σ_y(ε_p0 + √(2/3)Γ, √(2/3)Γ/Δt, T(Γ)) = 0
//! ```
//!
//! by Newton iterations, falling back to bisection whenever an iterate
//! leaves the bracket `[0, (q* − σ_y)/(√(3/2)·2G)]`.

use nalgebra::Matrix3;

use crate::materials::Material;
use crate::state::PointState;
use crate::tensor;

pub(crate) const SQRT_3_2: f64 = 1.224_744_871_391_589;
pub(crate) const SQRT_2_3: f64 = 0.816_496_580_927_726;

/// Reference plastic strain used to evaluate the first yield stress
const INITIAL_GAMMA: f64 = 1.0e-8;

/// Return mapping settings
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ReturnMapping {
    /// Convergence threshold on the Newton correction of Γ
    pub tolerance: f64,
    pub max_iterations: usize,
}

impl Default for ReturnMapping {
    fn default() -> Self {
        Self {
            tolerance: 1.0e-8,
            max_iterations: 250,
        }
    }
}

/// The Newton/bisection loop ran out of iterations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NotConverged {
    pub iterations: usize,
}

impl ReturnMapping {
    /// Update the stress of a point from its strain increment and pressure.
    ///
    /// `point.strain_increment` and `point.pressure` must already hold the
    /// values of the current step. Returns the plastic multiplier.
    pub fn update(
        &self,
        material: &Material,
        point: &mut PointState,
        time_step: f64,
    ) -> Result<f64, NotConverged> {
        let law = &material.hardening;
        let two_g = 2.0 * material.shear_modulus();
        let two_g_32 = SQRT_3_2 * two_g;
        let heat_fraction = material.heat_fraction();

        let stress_old = point.stress;
        let s_old = tensor::deviator(&stress_old);
        let s_norm_old = s_old.norm();

        let mut s = s_old + tensor::deviator(&point.strain_increment) * two_g;
        let s_norm = s.norm();
        let q_trial = SQRT_3_2 * s_norm;

        let mut gamma = 0.0;
        if !law.is_elastic() {
            let mut yield_stress = point.yield_stress;
            if yield_stress == 0.0 {
                yield_stress =
                    law.yield_stress(INITIAL_GAMMA, INITIAL_GAMMA / time_step, point.temperature);
                point.yield_stress = yield_stress;
            }

            if q_trial > yield_stress && s_norm > 0.0 {
                let temperature_0 = point.temperature;
                let strain_0 = point.plastic_strain;
                let path = |gamma: f64, yield_stress: f64| {
                    let heat = heat_fraction * (SQRT_2_3 * yield_stress + s_norm_old);
                    (
                        strain_0 + SQRT_2_3 * gamma,
                        SQRT_2_3 * gamma / time_step,
                        temperature_0 + 0.5 * gamma * heat,
                    )
                };

                let mut lower = 0.0;
                let mut upper = (q_trial - yield_stress) / two_g_32;
                gamma = if strain_0 == 0.0 {
                    SQRT_3_2 * INITIAL_GAMMA
                } else {
                    point.gamma
                };
                let (mut strain, mut rate, mut temperature) = path(gamma, yield_stress);

                let mut iterations = 0;
                loop {
                    yield_stress = law.yield_stress(strain, rate, temperature);
                    let residual = q_trial - gamma * two_g_32 - yield_stress;
                    if residual < 0.0 {
                        upper = gamma;
                    } else {
                        lower = gamma;
                    }

                    let slope =
                        law.hardening_slope(strain, rate, temperature, time_step, heat_fraction);
                    let mut correction = residual / (two_g_32 + SQRT_2_3 * slope);
                    gamma += correction;

                    // Round-off slack keeps a root sitting on a bracket end
                    // (no hardening) on the Newton path.
                    let slack = 16.0 * f64::EPSILON * upper.abs().max(lower.abs());
                    if !correction.is_finite() || gamma > upper + slack || gamma < lower - slack {
                        correction = 0.5 * (upper - lower);
                        gamma = lower + correction;
                    }

                    if correction.abs() < self.tolerance {
                        break;
                    }

                    (strain, rate, temperature) = path(gamma, yield_stress);
                    iterations += 1;
                    if iterations > self.max_iterations {
                        return Err(NotConverged { iterations });
                    }
                }

                point.plastic_strain_tensor += s * (gamma / s_norm);
                s *= 1.0 - two_g * gamma / s_norm;

                point.plastic_strain += SQRT_2_3 * gamma;
                point.plastic_strain_rate = SQRT_2_3 * gamma / time_step;
                point.gamma = gamma;
                point.gamma_cumulated += gamma;
                point.yield_stress = yield_stress;
            } else {
                point.plastic_strain_rate = 0.0;
            }
        }

        point.stress = s + Matrix3::identity() * point.pressure;

        let stress_sum = stress_old + point.stress;
        let stress_power = 0.5 * tensor::double_contraction(&point.strain_increment, &stress_sum);
        point.internal_energy += stress_power / point.density;

        if gamma != 0.0 {
            let plastic_work = 0.5 * gamma * (s.norm() + s_norm_old);
            point.inelastic_energy += plastic_work / point.density;
            point.temperature += heat_fraction * plastic_work;
        }

        Ok(gamma)
    }
}

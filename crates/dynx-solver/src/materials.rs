//! Material properties and hardening laws.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::error::{Result, SolverError};
use crate::ramp;

/// Johnson–Cook flow stress parameters
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct JohnsonCookParameters {
    /// Initial yield stress
    pub a: f64,
    /// Hardening modulus
    pub b: f64,
    /// Strain rate sensitivity
    pub c: f64,
    /// Hardening exponent
    pub n: f64,
    /// Thermal softening exponent
    pub m: f64,
    /// Reference plastic strain rate
    pub reference_strain_rate: f64,
    /// Melting temperature
    pub melting_temperature: f64,
    /// Reference (room) temperature
    pub reference_temperature: f64,
}

/// Isotropic hardening law giving the flow stress σ_y(ε_p, ε̇_p, T).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum HardeningLaw {
    /// No yield surface
    Elastic,
    /// σ_y = A + B·ε_p^n
    PowerLaw { a: f64, b: f64, n: f64 },
    /// σ_y = (A + B·ε_p^n)(1 + C·ln(ε̇_p/ε̇_0))(1 − θ^m)
    JohnsonCook(JohnsonCookParameters),
    /// σ_y piecewise linear in ε_p over `(ε_p, σ_y)` pairs, held constant
    /// past either end of the table
    Tabular(Vec<(f64, f64)>),
}

/// Split of the Johnson–Cook law into its three factors.
struct JohnsonCookTerms {
    hardening: f64,
    rate: f64,
    thermal: f64,
    /// θ^m, zero outside (T0, Tm)
    homologous_power: f64,
}

impl JohnsonCookParameters {
    fn terms(
        &self,
        plastic_strain: f64,
        plastic_strain_rate: f64,
        temperature: f64,
    ) -> JohnsonCookTerms {
        let hardening = self.a + self.b * plastic_strain.max(0.0).powf(self.n);

        let rate = if plastic_strain_rate > self.reference_strain_rate {
            1.0 + self.c * (plastic_strain_rate / self.reference_strain_rate).ln()
        } else {
            1.0
        };

        let (thermal, homologous_power) = if temperature <= self.reference_temperature {
            (1.0, 0.0)
        } else if temperature >= self.melting_temperature {
            (0.0, 0.0)
        } else {
            let theta = (temperature - self.reference_temperature)
                / (self.melting_temperature - self.reference_temperature);
            let power = theta.powf(self.m);
            (1.0 - power, power)
        };

        JohnsonCookTerms {
            hardening,
            rate,
            thermal,
            homologous_power,
        }
    }
}

impl HardeningLaw {
    pub fn is_elastic(&self) -> bool {
        matches!(self, HardeningLaw::Elastic)
    }

    /// Flow stress. `Elastic` has an infinite yield stress.
    pub fn yield_stress(
        &self,
        plastic_strain: f64,
        plastic_strain_rate: f64,
        temperature: f64,
    ) -> f64 {
        match self {
            HardeningLaw::Elastic => f64::INFINITY,
            HardeningLaw::PowerLaw { a, b, n } => a + b * plastic_strain.max(0.0).powf(*n),
            HardeningLaw::JohnsonCook(params) => {
                let terms = params.terms(plastic_strain, plastic_strain_rate, temperature);
                terms.hardening * terms.rate * terms.thermal
            }
            HardeningLaw::Tabular(points) => ramp::interpolate(points, plastic_strain),
        }
    }

    /// Total derivative of the flow stress along the return path.
    ///
    /// Along the radial return ε_p = ε_p0 + Δε_p, ε̇_p = Δε_p/Δt and
    /// T = T0 + χ·σ_y·Δε_p with χ = η/(ρ·C_p), so
    /// dσ_y/dΔε_p = ∂σ/∂ε_p + (∂σ/∂ε̇_p)/Δt + χ·σ_y·∂σ/∂T.
    pub fn hardening_slope(
        &self,
        plastic_strain: f64,
        plastic_strain_rate: f64,
        temperature: f64,
        time_step: f64,
        heat_fraction: f64,
    ) -> f64 {
        match self {
            HardeningLaw::Elastic => 0.0,
            HardeningLaw::PowerLaw { b, n, .. } => {
                if *b == 0.0 {
                    return 0.0;
                }
                let strain = plastic_strain.max(f64::MIN_POSITIVE);
                n * b * strain.powf(n - 1.0)
            }
            HardeningLaw::JohnsonCook(params) => {
                let terms = params.terms(plastic_strain, plastic_strain_rate, temperature);
                let strain = plastic_strain.max(f64::MIN_POSITIVE);

                let mut slope = if params.b == 0.0 {
                    0.0
                } else {
                    params.n * params.b * strain.powf(params.n - 1.0) * terms.rate * terms.thermal
                };

                if plastic_strain_rate > params.reference_strain_rate && time_step > 0.0 {
                    slope += terms.hardening * params.c * terms.thermal
                        / (plastic_strain_rate * time_step);
                }

                if terms.homologous_power > 0.0 {
                    let d_thermal_dt = -params.m * terms.homologous_power
                        / (temperature - params.reference_temperature);
                    let yield_stress = terms.hardening * terms.rate * terms.thermal;
                    slope += heat_fraction * yield_stress * terms.hardening * terms.rate
                        * d_thermal_dt;
                }

                slope
            }
            HardeningLaw::Tabular(points) => ramp::slope(points, plastic_strain),
        }
    }
}

/// A material definition
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Material {
    /// Material name
    pub name: String,
    /// Young's modulus (E)
    pub young_modulus: f64,
    /// Poisson's ratio (ν)
    pub poisson_ratio: f64,
    /// Density (ρ)
    pub density: f64,
    /// Specific heat (C_p)
    pub heat_capacity: f64,
    /// Fraction of plastic work converted into heat (η)
    pub taylor_quinney: f64,
    /// Temperature at the start of the run
    pub initial_temperature: f64,
    pub hardening: HardeningLaw,
}

impl Material {
    /// Create an elastic material
    pub fn new(
        name: impl Into<String>,
        young_modulus: f64,
        poisson_ratio: f64,
        density: f64,
    ) -> Self {
        Self {
            name: name.into(),
            young_modulus,
            poisson_ratio,
            density,
            heat_capacity: 0.0,
            taylor_quinney: 0.0,
            initial_temperature: 0.0,
            hardening: HardeningLaw::Elastic,
        }
    }

    pub fn with_thermal(
        mut self,
        heat_capacity: f64,
        taylor_quinney: f64,
        initial_temperature: f64,
    ) -> Self {
        self.heat_capacity = heat_capacity;
        self.taylor_quinney = taylor_quinney;
        self.initial_temperature = initial_temperature;
        self
    }

    pub fn with_hardening(mut self, hardening: HardeningLaw) -> Self {
        self.hardening = hardening;
        self
    }

    /// Get the shear modulus (G) from E and ν
    pub fn shear_modulus(&self) -> f64 {
        self.young_modulus / (2.0 * (1.0 + self.poisson_ratio))
    }

    /// Get the bulk modulus (K) from E and ν
    pub fn bulk_modulus(&self) -> f64 {
        self.young_modulus / (3.0 * (1.0 - 2.0 * self.poisson_ratio))
    }

    /// First Lamé parameter (λ)
    pub fn lame_lambda(&self) -> f64 {
        let nu = self.poisson_ratio;
        self.young_modulus * nu / ((1.0 + nu) * (1.0 - 2.0 * nu))
    }

    /// Dilatational wave speed for a given current density
    pub fn wave_speed(&self, density: f64) -> f64 {
        let nu = self.poisson_ratio;
        ((self.young_modulus * (1.0 - nu)) / (density * (1.0 + nu) * (1.0 - 2.0 * nu))).sqrt()
    }

    /// Temperature rise per unit plastic work per unit volume: η/(ρ·C_p).
    /// Zero when no heat capacity is given.
    pub fn heat_fraction(&self) -> f64 {
        if self.heat_capacity > 0.0 {
            self.taylor_quinney / (self.density * self.heat_capacity)
        } else {
            0.0
        }
    }

    /// Check the material parameters before a run
    pub fn validate(&self) -> Result<()> {
        let fail = |what: &str| {
            Err(SolverError::config(format!("material '{}': {what}", self.name)))
        };
        if !(self.young_modulus > 0.0) {
            return fail("Young's modulus must be positive");
        }
        if !(self.poisson_ratio > -1.0 && self.poisson_ratio < 0.5) {
            return fail("Poisson's ratio must lie in (-1, 0.5)");
        }
        if !(self.density > 0.0) {
            return fail("density must be positive");
        }
        if self.heat_capacity < 0.0 || !(0.0..=1.0).contains(&self.taylor_quinney) {
            return fail("invalid thermal parameters");
        }
        match &self.hardening {
            HardeningLaw::JohnsonCook(params) => {
                if !(params.reference_strain_rate > 0.0) {
                    return fail("Johnson-Cook reference strain rate must be positive");
                }
                if params.melting_temperature <= params.reference_temperature {
                    return fail("melting temperature must exceed the reference temperature");
                }
            }
            HardeningLaw::Tabular(points) => {
                let table = format!("material '{}': hardening table", self.name);
                ramp::validate_table(points, &table)?;
                if points.iter().any(|&(strain, stress)| strain < 0.0 || stress < 0.0) {
                    return fail("hardening table entries must not be negative");
                }
            }
            HardeningLaw::Elastic | HardeningLaw::PowerLaw { .. } => {}
        }
        Ok(())
    }
}

/// Material library containing all materials and their assignments
#[derive(Debug, Clone, Default)]
pub struct MaterialLibrary {
    /// All materials by name
    materials: HashMap<String, Material>,
    /// (element set, material) assignments, in the order they were made
    assignments: Vec<(String, String)>,
}

impl MaterialLibrary {
    /// Create an empty material library
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a material to the library
    pub fn add_material(&mut self, material: Material) {
        self.materials.insert(material.name.clone(), material);
    }

    /// Get a material by name
    pub fn get_material(&self, name: &str) -> Option<&Material> {
        self.materials.get(name)
    }

    /// Get all material names, sorted
    pub fn material_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.materials.keys().cloned().collect();
        names.sort();
        names
    }

    /// Assign a material to every element of an element set. Later
    /// assignments override earlier ones for shared elements.
    pub fn assign(&mut self, element_set: impl Into<String>, material: impl Into<String>) {
        self.assignments.push((element_set.into(), material.into()));
    }

    pub fn assignments(&self) -> &[(String, String)] {
        &self.assignments
    }

    pub fn len(&self) -> usize {
        self.materials.len()
    }

    pub fn is_empty(&self) -> bool {
        self.materials.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn steel_jc() -> JohnsonCookParameters {
        JohnsonCookParameters {
            a: 806.0,
            b: 614.0,
            c: 0.0089,
            n: 0.168,
            m: 1.1,
            reference_strain_rate: 1.0,
            melting_temperature: 1540.0,
            reference_temperature: 20.0,
        }
    }

    #[test]
    fn test_elastic_constants() {
        let material = Material::new("steel", 206000.0, 0.3, 7.83e-9);
        assert_relative_eq!(material.shear_modulus(), 206000.0 / 2.6, epsilon = 1e-9);
        assert_relative_eq!(material.bulk_modulus(), 206000.0 / 1.2, epsilon = 1e-9);
        assert_relative_eq!(
            material.lame_lambda() + 2.0 * material.shear_modulus(),
            material.bulk_modulus() + 4.0 / 3.0 * material.shear_modulus(),
            epsilon = 1e-6
        );
    }

    #[test]
    fn test_wave_speed() {
        let material = Material::new("steel", 206000.0, 0.3, 7.83e-9);
        let modulus = material.lame_lambda() + 2.0 * material.shear_modulus();
        assert_relative_eq!(
            material.wave_speed(7.83e-9),
            (modulus / 7.83e-9).sqrt(),
            max_relative = 1e-12
        );
    }

    #[test]
    fn test_johnson_cook_reference_state() {
        let law = HardeningLaw::JohnsonCook(steel_jc());
        assert_relative_eq!(law.yield_stress(0.0, 0.0, 20.0), 806.0);
        assert_relative_eq!(law.yield_stress(0.0, 0.5, 0.0), 806.0);
    }

    #[test]
    fn test_johnson_cook_rate_term_is_clamped() {
        let law = HardeningLaw::JohnsonCook(steel_jc());
        let slow = law.yield_stress(0.1, 1.0e-3, 20.0);
        let reference = law.yield_stress(0.1, 1.0, 20.0);
        let fast = law.yield_stress(0.1, 1.0e3, 20.0);
        assert_relative_eq!(slow, reference);
        assert!(fast > reference);
        assert_relative_eq!(fast / reference, 1.0 + 0.0089 * 1.0e3f64.ln(), epsilon = 1e-12);
    }

    #[test]
    fn test_johnson_cook_melting_floor() {
        let law = HardeningLaw::JohnsonCook(steel_jc());
        assert_eq!(law.yield_stress(0.2, 10.0, 1540.0), 0.0);
        assert_eq!(law.yield_stress(0.2, 10.0, 2000.0), 0.0);
        let warm = law.yield_stress(0.2, 10.0, 500.0);
        assert!(warm > 0.0 && warm < law.yield_stress(0.2, 10.0, 20.0));
    }

    #[test]
    fn test_johnson_cook_slope_matches_finite_difference() {
        let law = HardeningLaw::JohnsonCook(steel_jc());
        let material = Material::new("steel", 206000.0, 0.3, 7.83e-9)
            .with_thermal(4.6e8, 0.9, 20.0)
            .with_hardening(law.clone());
        let chi = material.heat_fraction();
        let dt = 1.0e-6;
        let (eps0, t0) = (0.05, 120.0);

        // Perturb along the return path: ε_p, ε̇_p and T move together.
        let path = |d: f64| {
            let eps = eps0 + d;
            let rate = (0.01 + d) / dt;
            let temp = t0 + chi * 1000.0 * d;
            law.yield_stress(eps, rate, temp)
        };
        let h = 1.0e-7;
        let numeric = (path(h) - path(-h)) / (2.0 * h);

        let yield_stress = path(0.0);
        let analytic_no_heat = law.hardening_slope(eps0, 0.01 / dt, t0, dt, 0.0);
        let analytic = law.hardening_slope(eps0, 0.01 / dt, t0, dt, chi);
        // The thermal branch is scaled by σ_y instead of the 1000 used above.
        let thermal_part = (analytic - analytic_no_heat) * 1000.0 / yield_stress;
        assert_relative_eq!(analytic_no_heat + thermal_part, numeric, max_relative = 1e-4);
    }

    #[test]
    fn test_power_law() {
        let law = HardeningLaw::PowerLaw {
            a: 300.0,
            b: 100.0,
            n: 0.5,
        };
        assert_relative_eq!(law.yield_stress(0.04, 0.0, 0.0), 320.0);
        assert_relative_eq!(law.hardening_slope(0.04, 0.0, 0.0, 1.0, 0.0), 250.0);
        let perfect = HardeningLaw::PowerLaw {
            a: 300.0,
            b: 0.0,
            n: 1.0,
        };
        assert_eq!(perfect.hardening_slope(0.0, 0.0, 0.0, 1.0, 0.0), 0.0);
    }

    #[test]
    fn test_material_validation() {
        assert!(Material::new("ok", 1.0, 0.3, 1.0).validate().is_ok());
        assert!(Material::new("nu", 1.0, 0.5, 1.0).validate().is_err());
        assert!(Material::new("rho", 1.0, 0.3, 0.0).validate().is_err());
        let mut jc = steel_jc();
        jc.melting_temperature = 10.0;
        let bad = Material::new("jc", 1.0, 0.3, 1.0).with_hardening(HardeningLaw::JohnsonCook(jc));
        assert!(bad.validate().is_err());
    }

    #[test]
    fn test_tabular_law() {
        let law = HardeningLaw::Tabular(vec![(0.0, 300.0), (0.1, 400.0), (0.3, 450.0)]);
        assert_eq!(law.yield_stress(0.0, 0.0, 0.0), 300.0);
        assert_relative_eq!(law.yield_stress(0.05, 1.0e3, 500.0), 350.0);
        assert_relative_eq!(law.yield_stress(0.2, 0.0, 0.0), 425.0);
        assert_eq!(law.yield_stress(1.0, 0.0, 0.0), 450.0);

        assert_relative_eq!(law.hardening_slope(0.05, 0.0, 0.0, 1.0e-6, 0.5), 1000.0);
        assert_relative_eq!(law.hardening_slope(0.1, 0.0, 0.0, 1.0e-6, 0.0), 1000.0);
        assert_relative_eq!(law.hardening_slope(0.2, 0.0, 0.0, 1.0e-6, 0.0), 250.0);
        assert_eq!(law.hardening_slope(0.5, 0.0, 0.0, 1.0e-6, 0.0), 0.0);
        assert!(!law.is_elastic());
    }

    #[test]
    fn test_tabular_law_validation() {
        let with = |points: Vec<(f64, f64)>| {
            Material::new("table", 1.0, 0.3, 1.0).with_hardening(HardeningLaw::Tabular(points))
        };
        assert!(with(vec![(0.0, 300.0), (0.2, 400.0)]).validate().is_ok());
        assert!(with(vec![]).validate().is_err());
        assert!(with(vec![(0.0, 300.0), (0.2, 400.0), (0.2, 410.0)]).validate().is_err());
        assert!(with(vec![(0.1, 300.0), (0.0, 400.0)]).validate().is_err());
        assert!(with(vec![(0.0, f64::NAN)]).validate().is_err());
        assert!(with(vec![(0.0, -1.0)]).validate().is_err());
    }

    #[test]
    fn test_library_assignments() {
        let mut library = MaterialLibrary::new();
        library.add_material(Material::new("b", 1.0, 0.3, 1.0));
        library.add_material(Material::new("a", 1.0, 0.3, 1.0));
        library.assign("all", "a");
        assert_eq!(library.material_names(), vec!["a", "b"]);
        assert_eq!(library.assignments(), &[("all".to_string(), "a".to_string())]);
        assert!(library.get_material("a").is_some());
    }
}

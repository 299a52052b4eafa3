//! 4-node bilinear quadrilateral for plane strain and axisymmetric analysis.
//!
//! Node ordering (counter-clockwise):
//! ```text
//!     4----------3
//!     |          |
//!     |          |
//!     1----------2
//! ```
//!
//! - Local coordinates: ξ, η ∈ [-1, 1]², node 1 at (-1, -1)
//! - DOFs: 2 per node (u_x, u_y) or (u_r, u_z)
//! - Axisymmetric elements integrate over the ring: dV = 2πr·dA, and carry
//!   a hoop strain component u_r / r in the out-of-plane slot.

use std::f64::consts::PI;

use nalgebra::{Matrix2, SMatrix, Vector2};

use super::{GaussPoint, Integration};
use crate::materials::Material;
use crate::mesh::ElementKind;

const NODE_XI: [f64; 4] = [-1.0, 1.0, 1.0, -1.0];
const NODE_ETA: [f64; 4] = [-1.0, -1.0, 1.0, 1.0];

/// Hourglass mode pattern
const HOURGLASS_MODE: [f64; 4] = [1.0, -1.0, 1.0, -1.0];

/// Geometric quantities at one integration point
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PointGeometry {
    pub shape: [f64; 4],
    /// dN_I/dx for each node
    pub gradients: [Vector2<f64>; 4],
    pub det_j: f64,
    /// Radius of the point (x coordinate)
    pub radius: f64,
    pub weight: f64,
}

impl PointGeometry {
    /// `w·det J`, times `2πr` for axisymmetric elements
    pub fn volume(&self, kind: ElementKind) -> f64 {
        self.weight * self.det_j * ring_factor(kind, self.radius)
    }
}

/// Out-of-plane measure: unit thickness or ring circumference
pub fn ring_factor(kind: ElementKind, radius: f64) -> f64 {
    match kind {
        ElementKind::PlaneStrain => 1.0,
        ElementKind::Axisymmetric => 2.0 * PI * radius,
    }
}

/// A quadrilateral in a given configuration
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Quad4 {
    pub kind: ElementKind,
    pub coordinates: [Vector2<f64>; 4],
}

impl Quad4 {
    pub fn new(kind: ElementKind, coordinates: [Vector2<f64>; 4]) -> Self {
        Self { kind, coordinates }
    }

    /// N_I = (1 + ξξ_I)(1 + ηη_I) / 4
    pub fn shape_functions(xi: f64, eta: f64) -> [f64; 4] {
        let mut n = [0.0; 4];
        for i in 0..4 {
            n[i] = 0.25 * (1.0 + xi * NODE_XI[i]) * (1.0 + eta * NODE_ETA[i]);
        }
        n
    }

    /// `[dN_I/dξ, dN_I/dη]` for each node
    pub fn shape_derivatives(xi: f64, eta: f64) -> [[f64; 2]; 4] {
        let mut d = [[0.0; 2]; 4];
        for i in 0..4 {
            d[i][0] = 0.25 * NODE_XI[i] * (1.0 + eta * NODE_ETA[i]);
            d[i][1] = 0.25 * NODE_ETA[i] * (1.0 + xi * NODE_XI[i]);
        }
        d
    }

    /// J = [dx/dξ  dy/dξ]
    ///     [dx/dη  dy/dη]
    pub fn jacobian(&self, xi: f64, eta: f64) -> Matrix2<f64> {
        let d = Self::shape_derivatives(xi, eta);
        let mut j = Matrix2::zeros();
        for (node, x) in self.coordinates.iter().enumerate() {
            for a in 0..2 {
                j[(a, 0)] += d[node][a] * x.x;
                j[(a, 1)] += d[node][a] * x.y;
            }
        }
        j
    }

    /// Shape functions, Cartesian gradients and Jacobian at a Gauss point.
    ///
    /// Returns `None` if `det J <= 0`, or if an axisymmetric point lies on
    /// the axis.
    pub fn point_geometry(&self, point: &GaussPoint) -> Option<PointGeometry> {
        let j = self.jacobian(point.xi, point.eta);
        let det_j = j.determinant();
        if !(det_j > 0.0) {
            return None;
        }
        let j_inv = j.try_inverse()?;

        let shape = Self::shape_functions(point.xi, point.eta);
        let local = Self::shape_derivatives(point.xi, point.eta);
        let mut gradients = [Vector2::zeros(); 4];
        for i in 0..4 {
            gradients[i] = j_inv * Vector2::new(local[i][0], local[i][1]);
        }

        let radius: f64 = shape
            .iter()
            .zip(self.coordinates.iter())
            .map(|(n, x)| n * x.x)
            .sum();
        if self.kind.is_axisymmetric() && !(radius > 0.0) {
            return None;
        }

        Some(PointGeometry {
            shape,
            gradients,
            det_j,
            radius,
            weight: point.weight,
        })
    }

    /// Geometry at every point of a quadrature rule
    pub fn integration_geometry(&self, integration: Integration) -> Option<Vec<PointGeometry>> {
        integration
            .points()
            .iter()
            .map(|point| self.point_geometry(point))
            .collect()
    }

    pub fn area(&self) -> f64 {
        crate::mesh::signed_area(&self.coordinates)
    }

    /// Characteristic length used by the Courant estimate:
    /// twice the area over √(2(d₁² + d₂²)), d₁ and d₂ the diagonals.
    pub fn characteristic_length(&self) -> f64 {
        let [p1, p2, p3, p4] = self.coordinates;
        let x31 = p3.x - p1.x;
        let y31 = p3.y - p1.y;
        let x24 = p2.x - p4.x;
        let y42 = p4.y - p2.y;
        (x31 * y42 + x24 * y31) / (2.0 * (x24 * x24 + y42 * y42 + x31 * x31 + y31 * y31)).sqrt()
    }

    /// Row-sum lumped masses: m_I = Σ ρ·N_I·w·det J (·2πr)
    pub fn lumped_masses(&self, density: f64, integration: Integration) -> Option<[f64; 4]> {
        let mut masses = [0.0; 4];
        for geometry in self.integration_geometry(integration)? {
            let dv = geometry.volume(self.kind);
            for i in 0..4 {
                masses[i] += density * geometry.shape[i] * dv;
            }
        }
        Some(masses)
    }

    /// Small-strain elastic stiffness matrix, DOFs ordered
    /// `[u1x, u1y, u2x, u2y, ...]`.
    pub fn stiffness_matrix(
        &self,
        material: &Material,
        integration: Integration,
    ) -> Option<SMatrix<f64, 8, 8>> {
        let lambda = material.lame_lambda();
        let mu = material.shear_modulus();
        #[rustfmt::skip]
        let d = SMatrix::<f64, 4, 4>::new(
            lambda + 2.0 * mu, lambda,            lambda,            0.0,
            lambda,            lambda + 2.0 * mu, lambda,            0.0,
            lambda,            lambda,            lambda + 2.0 * mu, 0.0,
            0.0,               0.0,               0.0,               mu,
        );

        let mut k = SMatrix::<f64, 8, 8>::zeros();
        for geometry in self.integration_geometry(integration)? {
            let mut b = SMatrix::<f64, 4, 8>::zeros();
            for i in 0..4 {
                let g = geometry.gradients[i];
                b[(0, 2 * i)] = g.x;
                b[(1, 2 * i + 1)] = g.y;
                b[(3, 2 * i)] = g.y;
                b[(3, 2 * i + 1)] = g.x;
                if self.kind.is_axisymmetric() {
                    b[(2, 2 * i)] = geometry.shape[i] / geometry.radius;
                }
            }
            k += b.transpose() * d * b * geometry.volume(self.kind);
        }
        Some(k)
    }

    /// Flanagan–Belytschko hourglass base vector, orthogonal to the
    /// linear velocity fields of the current configuration.
    pub fn hourglass_base(&self) -> Option<[f64; 4]> {
        let centre = self.point_geometry(&GaussPoint {
            xi: 0.0,
            eta: 0.0,
            weight: 4.0,
        })?;
        let mut hx = Vector2::zeros();
        for (h, x) in HOURGLASS_MODE.iter().zip(self.coordinates.iter()) {
            hx += x * *h;
        }
        let mut gamma = [0.0; 4];
        for i in 0..4 {
            gamma[i] = 0.25 * (HOURGLASS_MODE[i] - hx.dot(&centre.gradients[i]));
        }
        Some(gamma)
    }
}

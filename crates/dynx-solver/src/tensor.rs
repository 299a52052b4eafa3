//! Second-order tensor helpers on `Matrix3`.
//!
//! In-plane components occupy the upper-left 2×2 block; index 2 is the
//! out-of-plane (plane strain) or hoop (axisymmetric) direction.

use nalgebra::{Matrix2, Matrix3, SymmetricEigen};

use crate::constitutive::SQRT_3_2;

pub fn deviator(tensor: &Matrix3<f64>) -> Matrix3<f64> {
    tensor - Matrix3::identity() * (tensor.trace() / 3.0)
}

/// `a : b`
pub fn double_contraction(a: &Matrix3<f64>, b: &Matrix3<f64>) -> f64 {
    a.component_mul(b).sum()
}

pub fn von_mises(stress: &Matrix3<f64>) -> f64 {
    SQRT_3_2 * deviator(stress).norm()
}

/// `R·T·Rᵀ`
pub fn rotate(tensor: &Matrix3<f64>, rotation: &Matrix3<f64>) -> Matrix3<f64> {
    rotation * tensor * rotation.transpose()
}

/// `[xx, yy, zz, xy]`
pub fn components(tensor: &Matrix3<f64>) -> [f64; 4] {
    [tensor[(0, 0)], tensor[(1, 1)], tensor[(2, 2)], tensor[(0, 1)]]
}

/// Rotation and logarithmic strain of an incremental deformation.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PolarLog {
    pub rotation: Matrix3<f64>,
    /// `ln U` where `F = R·U`
    pub strain_increment: Matrix3<f64>,
}

/// Polar decomposition of `F = diag(F_inplane, stretch_33)` followed by
/// the logarithm of the right stretch.
///
/// Returns `None` when the deformation is not orientation preserving.
pub fn polar_log(f: &Matrix2<f64>, stretch_33: f64) -> Option<PolarLog> {
    if f.determinant() <= 0.0 || stretch_33 <= 0.0 {
        return None;
    }

    // For a 2×2 F with det > 0 the rotation angle is atan2(F21 - F12, F11 + F22).
    let c = f[(0, 0)] + f[(1, 1)];
    let s = f[(1, 0)] - f[(0, 1)];
    let norm = c.hypot(s);
    if norm == 0.0 {
        return None;
    }
    let (cos, sin) = (c / norm, s / norm);
    let r = Matrix2::new(cos, -sin, sin, cos);

    let u = r.transpose() * f;
    let u = (u + u.transpose()) * 0.5;

    let eigen = SymmetricEigen::new(u);
    if eigen.eigenvalues.iter().any(|&lambda| lambda <= 0.0) {
        return None;
    }
    let q = eigen.eigenvectors;
    let ln = Matrix2::from_diagonal(&eigen.eigenvalues.map(f64::ln));
    let log_u = q * ln * q.transpose();

    let mut rotation = Matrix3::identity();
    rotation.fixed_view_mut::<2, 2>(0, 0).copy_from(&r);
    let mut strain_increment = Matrix3::zeros();
    strain_increment
        .fixed_view_mut::<2, 2>(0, 0)
        .copy_from(&log_u);
    strain_increment[(2, 2)] = stretch_33.ln();

    Some(PolarLog {
        rotation,
        strain_increment,
    })
}

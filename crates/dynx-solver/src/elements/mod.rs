//! Element library for the explicit solver.

pub mod quad4;

use serde::{Deserialize, Serialize};

pub use quad4::{PointGeometry, Quad4};

/// A Gauss point in natural coordinates
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GaussPoint {
    pub xi: f64,
    pub eta: f64,
    pub weight: f64,
}

const INV_SQRT_3: f64 = 0.577_350_269_189_625_8;

const FULL_POINTS: [GaussPoint; 4] = [
    GaussPoint {
        xi: -INV_SQRT_3,
        eta: -INV_SQRT_3,
        weight: 1.0,
    },
    GaussPoint {
        xi: INV_SQRT_3,
        eta: -INV_SQRT_3,
        weight: 1.0,
    },
    GaussPoint {
        xi: INV_SQRT_3,
        eta: INV_SQRT_3,
        weight: 1.0,
    },
    GaussPoint {
        xi: -INV_SQRT_3,
        eta: INV_SQRT_3,
        weight: 1.0,
    },
];

const REDUCED_POINTS: [GaussPoint; 1] = [GaussPoint {
    xi: 0.0,
    eta: 0.0,
    weight: 4.0,
}];

/// Quadrature rule of the element loop
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Integration {
    /// 2×2 Gauss rule
    #[default]
    Full,
    /// Single centre point; needs hourglass control
    Reduced,
}

impl Integration {
    pub fn points(self) -> &'static [GaussPoint] {
        match self {
            Integration::Full => &FULL_POINTS,
            Integration::Reduced => &REDUCED_POINTS,
        }
    }

    pub fn num_points(self) -> usize {
        self.points().len()
    }
}

//! Global energy balance.

use serde::{Deserialize, Serialize};

use crate::mesh::Node;
use crate::state::PointArena;

/// Energies of the whole model at one instant
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct EnergyReport {
    /// Σ ½·m·v² over the nodes
    pub kinetic: f64,
    /// Σ m·e over the integration points, plastic work included
    pub internal: f64,
    /// Σ m·e_p over the integration points
    pub plastic: f64,
    /// Work dissipated by hourglass control
    pub hourglass: f64,
}

impl EnergyReport {
    pub fn compute(nodes: &[Node], arena: &PointArena, hourglass: f64) -> Self {
        Self {
            kinetic: nodes.iter().map(Node::kinetic_energy).sum(),
            internal: arena.iter().map(|p| p.mass * p.internal_energy).sum(),
            plastic: arena.iter().map(|p| p.mass * p.inelastic_energy).sum(),
            hourglass,
        }
    }

    /// Energy lost to plastic flow and hourglass control
    pub fn dissipated(&self) -> f64 {
        self.plastic + self.hourglass
    }

    pub fn total(&self) -> f64 {
        self.kinetic + self.internal + self.hourglass
    }
}

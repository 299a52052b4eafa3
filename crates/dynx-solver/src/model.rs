//! In-memory description of an analysis.

use crate::boundary_conditions::BoundaryCondition;
use crate::error::Result;
use crate::history::HistoryRequest;
use crate::materials::{Material, MaterialLibrary};
use crate::mesh::Mesh;
use crate::sets::{Selection, Sets};

/// Mesh, sets, materials, boundary conditions and history requests.
///
/// References between the parts (set names, material names) are checked
/// when a [`Simulation`](crate::Simulation) is built from the model.
#[derive(Debug, Clone, Default)]
pub struct Model {
    pub mesh: Mesh,
    pub sets: Sets,
    pub materials: MaterialLibrary,
    pub boundary_conditions: Vec<BoundaryCondition>,
    pub history: Vec<HistoryRequest>,
}

impl Model {
    pub fn new(mesh: Mesh) -> Self {
        Self {
            mesh,
            ..Self::default()
        }
    }

    /// Add ids to a node set
    pub fn add_nodes(&mut self, set_name: &str, selection: impl Into<Selection>) -> Result<usize> {
        self.sets.add_nodes(&self.mesh, set_name, selection)
    }

    /// Add ids to an element set
    pub fn add_elements(
        &mut self,
        set_name: &str,
        selection: impl Into<Selection>,
    ) -> Result<usize> {
        self.sets.add_elements(&self.mesh, set_name, selection)
    }

    /// Register a material and assign it to an element set
    pub fn assign_material(&mut self, element_set: impl Into<String>, material: Material) {
        self.materials.assign(element_set, material.name.clone());
        self.materials.add_material(material);
    }

    pub fn add_boundary_condition(&mut self, condition: BoundaryCondition) {
        self.boundary_conditions.push(condition);
    }

    pub fn add_history(&mut self, request: HistoryRequest) {
        self.history.push(request);
    }
}

//! Mesh data structures for the explicit solver.
//!
//! Nodes and elements are stored in insertion order in flat vectors, with
//! id → index maps for lookup. The element loop works on indices only, so
//! the vectors double as arenas for the parallel layer.

use std::collections::HashMap;

use nalgebra::Vector2;
use tracing::warn;

use crate::error::{Result, SolverError};

/// Radii in `[-AXIS_TOLERANCE, 0)` are snapped onto the axis.
pub const AXIS_TOLERANCE: f64 = 1.0e-8;

/// A node in the finite element mesh, with its kinematic state.
#[derive(Debug, Clone, PartialEq)]
pub struct Node {
    /// Node ID
    pub id: i32,
    /// Initial (x, y) or (r, z) position
    pub initial: Vector2<f64>,
    /// Out-of-plane coordinate, kept for reference only
    pub z: f64,
    /// Current position
    pub coordinates: Vector2<f64>,
    /// Total displacement
    pub displacement: Vector2<f64>,
    /// Displacement increment of the step in progress
    pub displacement_increment: Vector2<f64>,
    pub velocity: Vector2<f64>,
    pub acceleration: Vector2<f64>,
    /// Lumped mass
    pub mass: f64,
}

impl Node {
    /// Create a new node at rest
    pub fn new(id: i32, x: f64, y: f64, z: f64) -> Self {
        let position = Vector2::new(x, y);
        Self {
            id,
            initial: position,
            z,
            coordinates: position,
            displacement: Vector2::zeros(),
            displacement_increment: Vector2::zeros(),
            velocity: Vector2::zeros(),
            acceleration: Vector2::zeros(),
            mass: 0.0,
        }
    }

    /// Get initial coordinates as an array
    pub fn coords(&self) -> [f64; 3] {
        [self.initial.x, self.initial.y, self.z]
    }

    pub fn kinetic_energy(&self) -> f64 {
        0.5 * self.mass * self.velocity.norm_squared()
    }
}

/// Element formulation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub enum ElementKind {
    /// 4-node plane strain quadrilateral, unit thickness
    PlaneStrain,
    /// 4-node axisymmetric quadrilateral in the (r, z) half plane
    Axisymmetric,
}

impl ElementKind {
    pub fn is_axisymmetric(self) -> bool {
        matches!(self, ElementKind::Axisymmetric)
    }
}

/// A 4-node quadrilateral element
#[derive(Debug, Clone, PartialEq)]
pub struct Element {
    /// Element ID
    pub id: i32,
    pub kind: ElementKind,
    /// Node IDs, counter-clockwise
    pub nodes: [i32; 4],
    /// Positions of the nodes in `Mesh::nodes`
    pub node_indices: [usize; 4],
}

/// Complete finite element mesh
#[derive(Debug, Clone, Default)]
pub struct Mesh {
    nodes: Vec<Node>,
    node_index: HashMap<i32, usize>,
    elements: Vec<Element>,
    element_index: HashMap<i32, usize>,
}

impl Mesh {
    /// Create a new empty mesh
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a node. Fails if the id is already used.
    pub fn create_node(&mut self, id: i32, x: f64, y: f64, z: f64) -> Result<usize> {
        if self.node_index.contains_key(&id) {
            return Err(SolverError::DuplicateId { entity: "node", id });
        }
        let index = self.nodes.len();
        self.nodes.push(Node::new(id, x, y, z));
        self.node_index.insert(id, index);
        Ok(index)
    }

    /// Create a quadrilateral element from four existing nodes.
    ///
    /// The nodes must be distinct and ordered counter-clockwise, giving a
    /// strictly positive signed area. Axisymmetric elements also require
    /// every node to lie at `r >= 0`.
    pub fn create_element(&mut self, id: i32, kind: ElementKind, nodes: [i32; 4]) -> Result<usize> {
        if self.element_index.contains_key(&id) {
            return Err(SolverError::DuplicateId {
                entity: "element",
                id,
            });
        }

        let mut node_indices = [0usize; 4];
        for (slot, node_id) in nodes.iter().enumerate() {
            node_indices[slot] = *self.node_index.get(node_id).ok_or_else(|| {
                SolverError::InvalidTopology {
                    element: id,
                    reason: format!("references non-existent node {node_id}"),
                }
            })?;
        }
        for i in 0..4 {
            for j in (i + 1)..4 {
                if nodes[i] == nodes[j] {
                    return Err(SolverError::InvalidTopology {
                        element: id,
                        reason: format!("node {} appears twice", nodes[i]),
                    });
                }
            }
        }

        if kind.is_axisymmetric() {
            for &index in &node_indices {
                self.snap_to_axis(id, index)?;
            }
        }

        let corners = node_indices.map(|index| self.nodes[index].initial);
        let area = signed_area(&corners);
        if area <= 0.0 {
            return Err(SolverError::InvalidTopology {
                element: id,
                reason: format!("degenerate quadrilateral (signed area {area:e})"),
            });
        }

        let index = self.elements.len();
        self.elements.push(Element {
            id,
            kind,
            nodes,
            node_indices,
        });
        self.element_index.insert(id, index);
        Ok(index)
    }

    fn snap_to_axis(&mut self, element: i32, index: usize) -> Result<()> {
        let node = &mut self.nodes[index];
        let r = node.initial.x;
        if r >= 0.0 {
            return Ok(());
        }
        if r < -AXIS_TOLERANCE {
            return Err(SolverError::InvalidTopology {
                element,
                reason: format!("node {} has negative radius {r:e}", node.id),
            });
        }
        warn!(node = node.id, radius = r, "snapping node onto the symmetry axis");
        node.initial.x = 0.0;
        node.coordinates.x = 0.0;
        Ok(())
    }

    pub fn nodes(&self) -> &[Node] {
        &self.nodes
    }

    pub fn nodes_mut(&mut self) -> &mut [Node] {
        &mut self.nodes
    }

    pub fn elements(&self) -> &[Element] {
        &self.elements
    }

    /// Get a node by ID
    pub fn get_node(&self, id: i32) -> Option<&Node> {
        self.node_index.get(&id).map(|&index| &self.nodes[index])
    }

    /// Get an element by ID
    pub fn get_element(&self, id: i32) -> Option<&Element> {
        self.element_index.get(&id).map(|&index| &self.elements[index])
    }

    pub fn node_position(&self, id: i32) -> Option<usize> {
        self.node_index.get(&id).copied()
    }

    pub fn element_position(&self, id: i32) -> Option<usize> {
        self.element_index.get(&id).copied()
    }

    pub fn contains_node(&self, id: i32) -> bool {
        self.node_index.contains_key(&id)
    }

    pub fn contains_element(&self, id: i32) -> bool {
        self.element_index.contains_key(&id)
    }

    pub fn num_nodes(&self) -> usize {
        self.nodes.len()
    }

    pub fn num_elements(&self) -> usize {
        self.elements.len()
    }

    /// The formulation shared by every element, if any.
    ///
    /// A mesh mixing plane strain and axisymmetric elements is rejected.
    pub fn element_kind(&self) -> Result<Option<ElementKind>> {
        let mut kinds = self.elements.iter().map(|e| e.kind);
        let Some(first) = kinds.next() else {
            return Ok(None);
        };
        if let Some(other) = kinds.find(|kind| *kind != first) {
            return Err(SolverError::config(format!(
                "mesh mixes {first:?} and {other:?} elements"
            )));
        }
        Ok(Some(first))
    }

    /// Validate the mesh before a run
    pub fn validate(&self) -> Result<()> {
        if self.elements.is_empty() {
            return Err(SolverError::config("mesh has no elements"));
        }
        self.element_kind()?;
        for element in &self.elements {
            let corners = element.node_indices.map(|index| self.nodes[index].coordinates);
            if signed_area(&corners) <= 0.0 {
                return Err(SolverError::InvalidTopology {
                    element: element.id,
                    reason: "degenerate quadrilateral".to_string(),
                });
            }
        }
        Ok(())
    }

    /// Get mesh statistics
    pub fn statistics(&self) -> MeshStatistics {
        let mut kind_counts = HashMap::new();
        for element in &self.elements {
            *kind_counts.entry(element.kind).or_insert(0) += 1;
        }
        MeshStatistics {
            num_nodes: self.nodes.len(),
            num_elements: self.elements.len(),
            kind_counts,
        }
    }
}

/// Signed area of a quadrilateral (shoelace formula); positive when the
/// corners run counter-clockwise.
pub fn signed_area(corners: &[Vector2<f64>; 4]) -> f64 {
    let mut twice_area = 0.0;
    for i in 0..4 {
        let a = corners[i];
        let b = corners[(i + 1) % 4];
        twice_area += a.x * b.y - b.x * a.y;
    }
    0.5 * twice_area
}

/// Mesh statistics for reporting
#[derive(Debug, Clone)]
pub struct MeshStatistics {
    /// Total number of nodes
    pub num_nodes: usize,
    /// Total number of elements
    pub num_elements: usize,
    /// Count of each element formulation
    pub kind_counts: HashMap<ElementKind, usize>,
}

impl MeshStatistics {
    /// Format as a human-readable string
    pub fn format(&self) -> String {
        let mut lines = vec![
            format!("Nodes: {}", self.num_nodes),
            format!("Elements: {}", self.num_elements),
        ];

        if !self.kind_counts.is_empty() {
            lines.push("Element kinds:".to_string());
            let mut kinds: Vec<_> = self.kind_counts.iter().collect();
            kinds.sort_by_key(|(k, _)| format!("{:?}", k));
            for (kind, count) in kinds {
                lines.push(format!("  {:?}: {}", kind, count));
            }
        }

        lines.join("\n")
    }
}

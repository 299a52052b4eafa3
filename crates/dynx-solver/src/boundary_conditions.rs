//! Kinematic boundary conditions.
//!
//! This module handles:
//! - Restraints: flagged components held at zero motion
//! - Imposed speeds, optionally modulated by a [`Ramp`]
//!
//! Conditions are declared on node sets and resolved once into node
//! indices by [`BoundarySystem::resolve`], which also rejects conflicting
//! declarations. Constant conditions are enforced every step, initial ones
//! once when the run starts.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::error::{Result, SolverError};
use crate::mesh::{Mesh, Node};
use crate::ramp::Ramp;
use crate::sets::Sets;

/// When a condition applies
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum Activation {
    /// Enforced at every step
    #[default]
    Constant,
    /// Applied once at initialisation
    Initial,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum BoundaryKind {
    /// Zero displacement increment, velocity and acceleration on the
    /// flagged components
    Restrain { components: [bool; 2] },
    /// Imposed velocity on the components that carry a value
    Speed {
        velocity: [Option<f64>; 2],
        ramp: Option<Ramp>,
    },
}

/// A boundary condition applied to every node of a node set
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BoundaryCondition {
    pub node_set: String,
    pub kind: BoundaryKind,
    pub activation: Activation,
}

impl BoundaryCondition {
    /// Restrain the flagged components of a node set
    pub fn restrain(node_set: impl Into<String>, components: [bool; 2]) -> Self {
        Self {
            node_set: node_set.into(),
            kind: BoundaryKind::Restrain { components },
            activation: Activation::Constant,
        }
    }

    /// Impose the non-zero components of a velocity
    pub fn speed(node_set: impl Into<String>, velocity: [f64; 2]) -> Self {
        Self::speed_components(node_set, velocity.map(|v| (v != 0.0).then_some(v)))
    }

    /// Impose explicit velocity components, including zero values
    pub fn speed_components(node_set: impl Into<String>, velocity: [Option<f64>; 2]) -> Self {
        Self {
            node_set: node_set.into(),
            kind: BoundaryKind::Speed {
                velocity,
                ramp: None,
            },
            activation: Activation::Constant,
        }
    }

    /// Apply the condition once at initialisation instead of every step
    pub fn initial(mut self) -> Self {
        self.activation = Activation::Initial;
        self
    }

    /// Modulate an imposed speed in time. No effect on restraints.
    pub fn with_ramp(mut self, new_ramp: Ramp) -> Self {
        if let BoundaryKind::Speed { ramp, .. } = &mut self.kind {
            *ramp = Some(new_ramp);
        }
        self
    }
}

/// What a component of a node is subject to, for conflict detection
#[derive(Debug, Clone, PartialEq)]
enum Claim<'a> {
    Restrain,
    Speed(f64, Option<&'a Ramp>),
}

#[derive(Debug, Clone, PartialEq)]
struct ResolvedCondition {
    nodes: Vec<usize>,
    kind: BoundaryKind,
}

/// Boundary conditions resolved to node indices
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BoundarySystem {
    constant: Vec<ResolvedCondition>,
    initial: Vec<ResolvedCondition>,
}

impl BoundarySystem {
    /// Resolve node sets and check for conflicts.
    ///
    /// A component may not be both restrained and driven, nor driven by
    /// two different speeds, within the same activation class.
    pub fn resolve(conditions: &[BoundaryCondition], mesh: &Mesh, sets: &Sets) -> Result<Self> {
        let mut system = Self::default();
        let mut claims: HashMap<(Activation, usize, usize), Claim<'_>> = HashMap::new();

        for condition in conditions {
            let set = sets.require_node_set(&condition.node_set).map_err(|_| {
                SolverError::config(format!(
                    "boundary condition targets unknown node set '{}'",
                    condition.node_set
                ))
            })?;
            if let BoundaryKind::Speed { ramp: Some(ramp), .. } = &condition.kind {
                ramp.validate()?;
            }

            let mut nodes = Vec::with_capacity(set.len());
            for id in set.iter() {
                let index = mesh.node_position(id).ok_or_else(|| {
                    SolverError::config(format!(
                        "node set '{}': node {id} does not exist",
                        condition.node_set
                    ))
                })?;
                for component in 0..2 {
                    let Some(claim) = claim_of(&condition.kind, component) else {
                        continue;
                    };
                    let key = (condition.activation, index, component);
                    match claims.get(&key) {
                        Some(existing) if *existing != claim => {
                            let set = &condition.node_set;
                            return Err(SolverError::config(format!(
                                "conflicting boundary conditions on node {id}, \
                                 component {component} (set '{set}')"
                            )));
                        }
                        Some(_) => {}
                        None => {
                            claims.insert(key, claim);
                        }
                    }
                }
                nodes.push(index);
            }

            let resolved = ResolvedCondition {
                nodes,
                kind: condition.kind.clone(),
            };
            match condition.activation {
                Activation::Constant => system.constant.push(resolved),
                Activation::Initial => system.initial.push(resolved),
            }
        }
        Ok(system)
    }

    pub fn num_constant(&self) -> usize {
        self.constant.len()
    }

    pub fn num_initial(&self) -> usize {
        self.initial.len()
    }

    /// Apply the initial conditions at time `time`
    pub fn apply_initial(&self, nodes: &mut [Node], time: f64) {
        for condition in &self.initial {
            for &index in &condition.nodes {
                let node = &mut nodes[index];
                match &condition.kind {
                    BoundaryKind::Restrain { components } => {
                        for (c, _) in components.iter().enumerate().filter(|(_, on)| **on) {
                            node.displacement_increment[c] = 0.0;
                            node.velocity[c] = 0.0;
                            node.acceleration[c] = 0.0;
                        }
                    }
                    BoundaryKind::Speed { velocity, ramp } => {
                        let factor = ramp.as_ref().map_or(1.0, |r| r.evaluate(time));
                        for (c, value) in velocity.iter().enumerate() {
                            if let Some(value) = value {
                                node.velocity[c] = value * factor;
                            }
                        }
                    }
                }
            }
        }
    }

    /// Enforce the constant conditions over the step `[time, time + dt]`.
    ///
    /// Imposed speeds set the end-of-step velocity, the matching
    /// acceleration and a trapezoidal displacement increment.
    pub fn enforce(&self, nodes: &mut [Node], time: f64, time_step: f64) {
        for condition in &self.constant {
            match &condition.kind {
                BoundaryKind::Restrain { components } => {
                    for &index in &condition.nodes {
                        let node = &mut nodes[index];
                        for (c, _) in components.iter().enumerate().filter(|(_, on)| **on) {
                            node.displacement_increment[c] = 0.0;
                            node.velocity[c] = 0.0;
                            node.acceleration[c] = 0.0;
                        }
                    }
                }
                BoundaryKind::Speed { velocity, ramp } => {
                    let (start, end) = match ramp {
                        Some(ramp) => (ramp.evaluate(time), ramp.evaluate(time + time_step)),
                        None => (1.0, 1.0),
                    };
                    for &index in &condition.nodes {
                        let node = &mut nodes[index];
                        for (c, value) in velocity.iter().enumerate() {
                            let Some(value) = value else { continue };
                            let v0 = value * start;
                            let v1 = value * end;
                            node.velocity[c] = v1;
                            node.acceleration[c] = (v1 - v0) / time_step;
                            node.displacement_increment[c] = 0.5 * time_step * (v0 + v1);
                        }
                    }
                }
            }
        }
    }
}

fn claim_of(kind: &BoundaryKind, component: usize) -> Option<Claim<'_>> {
    match kind {
        BoundaryKind::Restrain { components } => components[component].then_some(Claim::Restrain),
        BoundaryKind::Speed { velocity, ramp } => {
            velocity[component].map(|value| Claim::Speed(value, ramp.as_ref()))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mesh::ElementKind;
    use approx::assert_relative_eq;
    use nalgebra::Vector2;

    fn model() -> (Mesh, Sets) {
        let mut mesh = Mesh::new();
        mesh.create_node(1, 0.0, 0.0, 0.0).unwrap();
        mesh.create_node(2, 1.0, 0.0, 0.0).unwrap();
        mesh.create_node(3, 1.0, 1.0, 0.0).unwrap();
        mesh.create_node(4, 0.0, 1.0, 0.0).unwrap();
        mesh.create_element(1, ElementKind::PlaneStrain, [1, 2, 3, 4]).unwrap();
        let mut sets = Sets::new();
        sets.add_nodes(&mesh, "bottom", 1..=2).unwrap();
        sets.add_nodes(&mesh, "top", 3..=4).unwrap();
        sets.add_nodes(&mesh, "corner", 2).unwrap();
        (mesh, sets)
    }

    #[test]
    fn test_speed_skips_zero_components() {
        let bc = BoundaryCondition::speed("top", [0.0, 5.0]);
        assert_eq!(
            bc.kind,
            BoundaryKind::Speed {
                velocity: [None, Some(5.0)],
                ramp: None
            }
        );
        assert_eq!(bc.activation, Activation::Constant);
        assert_eq!(bc.initial().activation, Activation::Initial);
    }

    #[test]
    fn test_restrain_zeroes_motion() {
        let (mut mesh, sets) = model();
        let conditions = [BoundaryCondition::restrain("bottom", [false, true])];
        let system = BoundarySystem::resolve(&conditions, &mesh, &sets).unwrap();
        for node in mesh.nodes_mut() {
            node.velocity = Vector2::new(1.0, 1.0);
            node.displacement_increment = Vector2::new(0.1, 0.1);
        }
        system.enforce(mesh.nodes_mut(), 0.0, 1.0e-3);
        let bottom = &mesh.nodes()[0];
        assert_eq!(bottom.velocity, Vector2::new(1.0, 0.0));
        assert_eq!(bottom.displacement_increment, Vector2::new(0.1, 0.0));
        assert_eq!(mesh.nodes()[2].velocity, Vector2::new(1.0, 1.0));
    }

    #[test]
    fn test_ramped_speed_sets_acceleration_and_increment() {
        let (mut mesh, sets) = model();
        let bc = BoundaryCondition::speed("top", [0.0, 10.0]).with_ramp(Ramp::linear(0.0, 1.0));
        let system = BoundarySystem::resolve(&[bc], &mesh, &sets).unwrap();
        system.enforce(mesh.nodes_mut(), 0.5, 0.1);
        let top = &mesh.nodes()[2];
        assert_relative_eq!(top.velocity.y, 6.0, epsilon = 1e-12);
        assert_relative_eq!(top.acceleration.y, 10.0, epsilon = 1e-9);
        assert_relative_eq!(top.displacement_increment.y, 0.55, epsilon = 1e-12);
        assert_eq!(top.velocity.x, 0.0);
    }

    #[test]
    fn test_initial_conditions_apply_once() {
        let (mut mesh, sets) = model();
        let bcs = [BoundaryCondition::speed("top", [3.0, 0.0]).initial()];
        let system = BoundarySystem::resolve(&bcs, &mesh, &sets).unwrap();
        assert_eq!(system.num_initial(), 1);
        assert_eq!(system.num_constant(), 0);
        system.apply_initial(mesh.nodes_mut(), 0.0);
        assert_eq!(mesh.nodes()[3].velocity, Vector2::new(3.0, 0.0));

        mesh.nodes_mut()[3].velocity = Vector2::zeros();
        system.enforce(mesh.nodes_mut(), 0.0, 1.0e-3);
        assert_eq!(mesh.nodes()[3].velocity, Vector2::zeros());
    }

    #[test]
    fn test_restrain_and_speed_conflict() {
        let (mesh, sets) = model();
        let bcs = [
            BoundaryCondition::restrain("bottom", [true, false]),
            BoundaryCondition::speed("corner", [1.0, 0.0]),
        ];
        let err = BoundarySystem::resolve(&bcs, &mesh, &sets).unwrap_err();
        assert!(matches!(err, SolverError::Configuration(msg) if msg.contains("node 2")));
    }

    #[test]
    fn test_different_speeds_conflict() {
        let (mesh, sets) = model();
        let bcs = [
            BoundaryCondition::speed("bottom", [1.0, 0.0]),
            BoundaryCondition::speed("corner", [2.0, 0.0]),
        ];
        assert!(BoundarySystem::resolve(&bcs, &mesh, &sets).is_err());

        let same = [
            BoundaryCondition::speed("bottom", [1.0, 0.0]),
            BoundaryCondition::speed("corner", [1.0, 0.0]),
        ];
        assert!(BoundarySystem::resolve(&same, &mesh, &sets).is_ok());
    }

    #[test]
    fn test_initial_speed_does_not_conflict_with_restraint() {
        let (mesh, sets) = model();
        let bcs = [
            BoundaryCondition::restrain("bottom", [false, true]),
            BoundaryCondition::speed_components("bottom", [None, Some(-5.0)]).initial(),
        ];
        assert!(BoundarySystem::resolve(&bcs, &mesh, &sets).is_ok());
    }

    #[test]
    fn test_unknown_node_set() {
        let (mesh, sets) = model();
        let conditions = [BoundaryCondition::restrain("nowhere", [true, true])];
        let err = BoundarySystem::resolve(&conditions, &mesh, &sets).unwrap_err();
        assert!(matches!(err, SolverError::Configuration(msg) if msg.contains("nowhere")));
    }
}

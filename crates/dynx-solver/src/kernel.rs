//! Per-element work of one explicit step.
//!
//! For each element, on the configuration at the start of the step:
//! strain increments from the nodal displacement increments (incremental
//! polar decomposition), pressure from the mean volumetric increment, the
//! constitutive update, the final rotation, internal forces and, for
//! reduced integration, viscous hourglass forces. The density is then
//! updated on the end-of-step configuration.

use nalgebra::{Matrix2, Vector2};

use crate::constitutive::ReturnMapping;
use crate::elements::quad4::ring_factor;
use crate::elements::{Integration, Quad4};
use crate::error::{Result, SolverError};
use crate::materials::Material;
use crate::mesh::{Element, Node};
use crate::state::PointState;
use crate::tensor;

/// Settings shared by every element of the loop
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct KernelSettings {
    pub integration: Integration,
    /// Viscous hourglass coefficient κ, used with reduced integration
    pub hourglass_coefficient: f64,
    pub return_mapping: ReturnMapping,
}

impl Default for KernelSettings {
    fn default() -> Self {
        Self {
            integration: Integration::Full,
            hourglass_coefficient: 0.1,
            return_mapping: ReturnMapping::default(),
        }
    }
}

/// Contribution of one element to the nodal balance
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ElementResponse {
    /// Internal plus hourglass forces, per element node
    pub forces: [Vector2<f64>; 4],
    /// Rate of work dissipated by hourglass control
    pub hourglass_power: f64,
}

pub(crate) fn degenerate(element: &Element) -> SolverError {
    SolverError::MeshDegeneracy(format!(
        "element {} has a non-positive Jacobian",
        element.id
    ))
}

/// Element geometry in the current configuration
pub fn current_quad(element: &Element, nodes: &[Node]) -> Quad4 {
    Quad4::new(
        element.kind,
        element.node_indices.map(|index| nodes[index].coordinates),
    )
}

/// Create the integration points of an element at the start of a run.
pub fn initialize_points(
    element: &Element,
    material: &Material,
    nodes: &[Node],
    integration: Integration,
) -> Result<Vec<PointState>> {
    let quad = current_quad(element, nodes);
    let geometry = quad
        .integration_geometry(integration)
        .ok_or_else(|| degenerate(element))?;
    Ok(geometry
        .iter()
        .map(|g| {
            let mut point = PointState::new(material.density, material.initial_temperature);
            point.reference_volume = g.weight * g.det_j * radius_factor(element, g.radius);
            point.mass = material.density * g.volume(element.kind);
            point
        })
        .collect())
}

/// `r` for axisymmetric elements, 1 otherwise
fn radius_factor(element: &Element, radius: f64) -> f64 {
    if element.kind.is_axisymmetric() {
        radius
    } else {
        1.0
    }
}

/// Dilatational wave speed at the mean density of the element
pub fn wave_speed(material: &Material, points: &[PointState]) -> f64 {
    let density = points.iter().map(|p| p.density).sum::<f64>() / points.len() as f64;
    material.wave_speed(density)
}

/// Advance the state of one element over a step and return its forces.
///
/// Nodes must hold the configuration at the start of the step in
/// `coordinates` and the predicted `displacement_increment`.
pub fn update_element(
    element: &Element,
    material: &Material,
    points: &mut [PointState],
    nodes: &[Node],
    time_step: f64,
    settings: &KernelSettings,
) -> Result<ElementResponse> {
    let quad = current_quad(element, nodes);
    let geometry = quad
        .integration_geometry(settings.integration)
        .ok_or_else(|| degenerate(element))?;
    let increments = element
        .node_indices
        .map(|index| nodes[index].displacement_increment);

    // Strain increments and rotations
    let mut rotations = Vec::with_capacity(points.len());
    for (point, g) in points.iter_mut().zip(geometry.iter()) {
        let mut f = Matrix2::identity();
        for (du, grad) in increments.iter().zip(g.gradients.iter()) {
            f += du * grad.transpose();
        }
        let hoop = if element.kind.is_axisymmetric() {
            let radial: f64 = g.shape.iter().zip(increments.iter()).map(|(n, du)| n * du.x).sum();
            1.0 + radial / g.radius
        } else {
            1.0
        };
        let polar = tensor::polar_log(&f, hoop).ok_or_else(|| degenerate(element))?;
        point.strain_increment = polar.strain_increment;
        rotations.push(polar.rotation);
    }

    // Pressure from the element mean volumetric increment
    let mean_volumetric = points
        .iter()
        .map(|p| p.strain_increment.trace())
        .sum::<f64>()
        / points.len() as f64;
    let bulk = material.bulk_modulus();
    for point in points.iter_mut() {
        point.pressure = point.stress.trace() / 3.0 + bulk * mean_volumetric;
    }

    // Constitutive update and final rotation
    for (index, (point, rotation)) in points.iter_mut().zip(rotations.iter()).enumerate() {
        settings
            .return_mapping
            .update(material, point, time_step)
            .map_err(|failure| SolverError::Convergence {
                element: element.id,
                point: index,
                iterations: failure.iterations,
            })?;
        point.strain += point.strain_increment;
        point.stress = tensor::rotate(&point.stress, rotation);
        point.strain = tensor::rotate(&point.strain, rotation);
        point.plastic_strain_tensor = tensor::rotate(&point.plastic_strain_tensor, rotation);
    }

    // Internal forces: f_I = -∫ Bᵀσ dV
    let mut forces = [Vector2::zeros(); 4];
    for (point, g) in points.iter().zip(geometry.iter()) {
        let dv = g.volume(element.kind);
        let sigma = point.stress.fixed_view::<2, 2>(0, 0).into_owned();
        for (force, (grad, n)) in forces.iter_mut().zip(g.gradients.iter().zip(g.shape.iter())) {
            *force -= sigma * grad * dv;
            if element.kind.is_axisymmetric() {
                force.x -= n * point.stress[(2, 2)] / g.radius * dv;
            }
        }
    }

    let mut hourglass_power = 0.0;
    if settings.integration == Integration::Reduced && settings.hourglass_coefficient > 0.0 {
        hourglass_power =
            add_hourglass_forces(element, material, points, nodes, &quad, settings, &mut forces)?;
    }

    // Density on the end-of-step configuration
    let mut moved = quad;
    for (x, du) in moved.coordinates.iter_mut().zip(increments.iter()) {
        *x += du;
    }
    let moved_geometry = moved
        .integration_geometry(settings.integration)
        .ok_or_else(|| degenerate(element))?;
    for (point, g) in points.iter_mut().zip(moved_geometry.iter()) {
        let volume = g.weight * g.det_j * radius_factor(element, g.radius);
        point.density = material.density * point.reference_volume / volume;
    }

    Ok(ElementResponse {
        forces,
        hourglass_power,
    })
}

/// Flanagan–Belytschko viscous hourglass control
fn add_hourglass_forces(
    element: &Element,
    material: &Material,
    points: &[PointState],
    nodes: &[Node],
    quad: &Quad4,
    settings: &KernelSettings,
    forces: &mut [Vector2<f64>; 4],
) -> Result<f64> {
    let base = quad.hourglass_base().ok_or_else(|| degenerate(element))?;
    let velocities = element.node_indices.map(|index| nodes[index].velocity);

    let mut rate = Vector2::zeros();
    for (gamma, v) in base.iter().zip(velocities.iter()) {
        rate += v * *gamma;
    }

    let density = points.iter().map(|p| p.density).sum::<f64>() / points.len() as f64;
    let centre_radius = quad.coordinates.iter().map(|x| x.x).sum::<f64>() / 4.0;
    let viscosity = settings.hourglass_coefficient
        * density
        * wave_speed(material, points)
        * quad.area().sqrt()
        * ring_factor(element.kind, centre_radius);

    for (force, gamma) in forces.iter_mut().zip(base.iter()) {
        *force -= rate * (viscosity * gamma);
    }
    Ok(viscosity * rate.norm_squared())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mesh::{ElementKind, Mesh};
    use approx::assert_relative_eq;

    fn single_element(kind: ElementKind, x0: f64) -> Mesh {
        let mut mesh = Mesh::new();
        mesh.create_node(1, x0, 0.0, 0.0).unwrap();
        mesh.create_node(2, x0 + 1.0, 0.0, 0.0).unwrap();
        mesh.create_node(3, x0 + 1.0, 1.0, 0.0).unwrap();
        mesh.create_node(4, x0, 1.0, 0.0).unwrap();
        mesh.create_element(1, kind, [1, 2, 3, 4]).unwrap();
        mesh
    }

    fn elastic() -> Material {
        Material::new("elastic", 200000.0, 0.3, 7.8e-9)
    }

    #[test]
    fn test_initial_points_carry_the_element_mass() {
        let mesh = single_element(ElementKind::PlaneStrain, 0.0);
        let element = &mesh.elements()[0];
        let points =
            initialize_points(element, &elastic(), mesh.nodes(), Integration::Full).unwrap();
        assert_eq!(points.len(), 4);
        let mass: f64 = points.iter().map(|p| p.mass).sum();
        assert_relative_eq!(mass, 7.8e-9, max_relative = 1e-12);
    }

    #[test]
    fn test_rigid_translation_is_stress_free() {
        let mut mesh = single_element(ElementKind::PlaneStrain, 0.0);
        for node in mesh.nodes_mut() {
            node.displacement_increment = Vector2::new(0.01, -0.02);
        }
        let element = mesh.elements()[0].clone();
        let material = elastic();
        let mut points =
            initialize_points(&element, &material, mesh.nodes(), Integration::Full).unwrap();
        let response = update_element(
            &element,
            &material,
            &mut points,
            mesh.nodes(),
            1.0e-7,
            &KernelSettings::default(),
        )
        .unwrap();
        for point in &points {
            assert_relative_eq!(point.stress.norm(), 0.0, epsilon = 1e-9);
            assert_relative_eq!(point.density, material.density, max_relative = 1e-12);
        }
        for force in response.forces {
            assert_relative_eq!(force.norm(), 0.0, epsilon = 1e-9);
        }
    }

    #[test]
    fn test_stretch_produces_balanced_restoring_forces() {
        let mut mesh = single_element(ElementKind::PlaneStrain, 0.0);
        let nodes = mesh.nodes_mut();
        nodes[1].displacement_increment = Vector2::new(1.0e-4, 0.0);
        nodes[2].displacement_increment = Vector2::new(1.0e-4, 0.0);
        let element = mesh.elements()[0].clone();
        let material = elastic();
        let mut points =
            initialize_points(&element, &material, mesh.nodes(), Integration::Full).unwrap();
        let response = update_element(
            &element,
            &material,
            &mut points,
            mesh.nodes(),
            1.0e-7,
            &KernelSettings::default(),
        )
        .unwrap();

        let expected = (material.lame_lambda() + 2.0 * material.shear_modulus()) * 1.0001f64.ln();
        for point in &points {
            assert_relative_eq!(point.stress[(0, 0)], expected, max_relative = 1e-10);
        }
        let total: Vector2<f64> = response.forces.iter().sum();
        assert_relative_eq!(total.norm(), 0.0, epsilon = 1e-9);
        // Right face is pulled back, left face forward.
        assert!(response.forces[1].x < 0.0 && response.forces[2].x < 0.0);
        assert!(response.forces[0].x > 0.0 && response.forces[3].x > 0.0);
        assert!(points[0].density < material.density);
    }

    #[test]
    fn test_axisymmetric_radial_expansion_builds_hoop_stress() {
        let mut mesh = single_element(ElementKind::Axisymmetric, 1.0);
        for node in mesh.nodes_mut() {
            node.displacement_increment = Vector2::new(1.0e-4 * node.coordinates.x, 0.0);
        }
        let element = mesh.elements()[0].clone();
        let material = elastic();
        let mut points =
            initialize_points(&element, &material, mesh.nodes(), Integration::Full).unwrap();
        let response = update_element(
            &element,
            &material,
            &mut points,
            mesh.nodes(),
            1.0e-7,
            &KernelSettings::default(),
        )
        .unwrap();
        for point in &points {
            let hoop = point.strain_increment[(2, 2)];
            assert_relative_eq!(hoop, 1.0001f64.ln(), max_relative = 1e-9);
            assert!(point.stress[(2, 2)] > 0.0);
        }
        // Net radial force pulls the ring inwards.
        let radial: f64 = response.forces.iter().map(|f| f.x).sum();
        assert!(radial < 0.0);
    }

    #[test]
    fn test_inverting_increment_is_degenerate() {
        let mut mesh = single_element(ElementKind::PlaneStrain, 0.0);
        mesh.nodes_mut()[2].displacement_increment = Vector2::new(-3.0, -3.0);
        let element = mesh.elements()[0].clone();
        let material = elastic();
        let mut points =
            initialize_points(&element, &material, mesh.nodes(), Integration::Full).unwrap();
        let err = update_element(
            &element,
            &material,
            &mut points,
            mesh.nodes(),
            1.0e-7,
            &KernelSettings::default(),
        )
        .unwrap_err();
        assert!(matches!(err, SolverError::MeshDegeneracy(_)));
    }

    #[test]
    fn test_hourglass_mode_is_resisted_under_reduced_integration() {
        let mut mesh = single_element(ElementKind::PlaneStrain, 0.0);
        let pattern = [1.0, -1.0, 1.0, -1.0];
        for (node, h) in mesh.nodes_mut().iter_mut().zip(pattern) {
            node.velocity = Vector2::new(h, 0.0);
        }
        let element = mesh.elements()[0].clone();
        let material = elastic();
        let settings = KernelSettings {
            integration: Integration::Reduced,
            ..KernelSettings::default()
        };
        let mut points =
            initialize_points(&element, &material, mesh.nodes(), Integration::Reduced).unwrap();
        let response = update_element(
            &element,
            &material,
            &mut points,
            mesh.nodes(),
            1.0e-7,
            &settings,
        )
        .unwrap();

        assert!(response.hourglass_power > 0.0);
        for (force, h) in response.forces.iter().zip(pattern) {
            assert!(force.x * h < 0.0);
        }
    }
}

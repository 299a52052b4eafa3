/// Axisymmetric Taylor bar impact on a rigid wall.
mod common;

use common::{grid, johnson_cook_steel};
use dynx_solver::{
    BoundaryCondition, ElementField, ElementKind, ExplicitConfig, GlobalField, HistoryRequest,
    Integration, Model, NodeField, Phase, Simulation,
};

const IMPACT_SPEED: f64 = 1.0e5;
const STOP: f64 = 2.0e-6;

/// Radius 1, height 6, resting on the wall `z = 0`
fn taylor_bar() -> Model {
    let mut model = grid(2, 6, 0.5, 1.0, ElementKind::Axisymmetric, 0.0);
    model.assign_material("all", johnson_cook_steel());
    model.add_boundary_condition(BoundaryCondition::speed("nodes", [0.0, -IMPACT_SPEED]).initial());
    model.add_boundary_condition(BoundaryCondition::restrain("bottom", [false, true]));
    model.add_boundary_condition(BoundaryCondition::restrain("left", [true, false]));

    // Component 3 of the bottom set is its outer node, component 1 of
    // the element set is the element at the foot on the axis.
    let foot_radius = HistoryRequest::node("foot_radius", "bottom", NodeField::DisplacementX);
    model.add_history(foot_radius.with_component(3));
    let plastic = HistoryRequest::element("eplas_foot", "all", ElementField::PlasticStrain);
    model.add_history(plastic.with_component(1));
    let temperature = HistoryRequest::element("temp_foot", "all", ElementField::Temperature);
    model.add_history(temperature.with_component(1));
    model.add_history(HistoryRequest::global("kinetic", GlobalField::KineticEnergy));
    model.add_history(HistoryRequest::global("dissipated", GlobalField::DissipatedEnergy));
    model
}

fn values(simulation: &Simulation, name: &str) -> Vec<f64> {
    simulation.history().series(name).unwrap().values().collect()
}

#[test]
fn test_taylor_bar_mushrooms_and_heats() {
    let config = ExplicitConfig::new(STOP).with_workers(2);
    let mut simulation = Simulation::new(taylor_bar(), config).unwrap();
    let summary = simulation.run().unwrap();
    assert_eq!(summary.phase, Phase::Terminated);

    let foot = values(&simulation, "foot_radius");
    assert_eq!(foot[0], 0.0);
    assert!(*foot.last().unwrap() > 0.0, "the foot must spread outwards");

    let plastic = values(&simulation, "eplas_foot");
    assert!(*plastic.last().unwrap() > 0.0);
    for pair in plastic.windows(2) {
        assert!(pair[1] >= pair[0]);
    }
    assert!(*values(&simulation, "temp_foot").last().unwrap() > 20.0);

    let kinetic = values(&simulation, "kinetic");
    assert!(kinetic.last().unwrap() < &kinetic[0]);
    assert!(*values(&simulation, "dissipated").last().unwrap() > 0.0);

    // Nodes on the axis never leave it.
    for node in simulation.nodes().iter().filter(|n| n.initial.x == 0.0) {
        assert_eq!(node.coordinates.x, 0.0);
    }
    for state in simulation.arena().iter() {
        assert!(state.density > 0.0);
        assert!(state.temperature >= 20.0);
    }
}

#[test]
fn test_reduced_integration_with_hourglass_control() {
    let config = ExplicitConfig::new(STOP)
        .with_workers(2)
        .with_integration(Integration::Reduced)
        .with_hourglass_coefficient(0.1);
    let mut simulation = Simulation::new(taylor_bar(), config).unwrap();
    let summary = simulation.run().unwrap();

    assert_eq!(summary.phase, Phase::Terminated);
    assert_eq!(simulation.arena().points_per_element(), 1);
    assert!(simulation.energies().hourglass >= 0.0);
    assert!(*values(&simulation, "foot_radius").last().unwrap() > 0.0);
    assert!(*values(&simulation, "eplas_foot").last().unwrap() > 0.0);
}

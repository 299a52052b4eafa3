mod common;

use approx::assert_relative_eq;
use common::{grid, johnson_cook_steel};
use dynx_solver::{
    BoundaryCondition, ElementField, ElementKind, ExplicitConfig, HistoryRequest, Model, NodeField,
    Simulation,
};

fn sheared_block() -> Model {
    let mut model = grid(4, 3, 0.5, 0.5, ElementKind::PlaneStrain, 0.0);
    model.assign_material("all", johnson_cook_steel());
    model.add_boundary_condition(BoundaryCondition::restrain("bottom", [true, true]));
    model.add_boundary_condition(BoundaryCondition::speed("top", [5.0e3, -1.0e3]));
    model.add_history(HistoryRequest::element("mises", "all", ElementField::VonMises));
    let temperature = HistoryRequest::element("temp", "all", ElementField::Temperature);
    model.add_history(temperature.with_component(5));
    model.add_history(HistoryRequest::node("vx", "nodes", NodeField::VelocityX).with_component(7));
    model
}

fn run(workers: usize) -> (Simulation, Vec<String>) {
    let config = ExplicitConfig::new(2.0e-6).with_workers(workers);
    let mut simulation = Simulation::new(sheared_block(), config).unwrap();
    simulation.run().unwrap();
    let plots = simulation.history().iter().map(dynx_io::render_plot).collect();
    (simulation, plots)
}

#[test]
fn test_repeated_runs_are_bitwise_identical() {
    let (first, first_plots) = run(3);
    let (second, second_plots) = run(3);

    assert_eq!(first_plots, second_plots);
    assert_eq!(first.state().step, second.state().step);
    for (a, b) in first.nodes().iter().zip(second.nodes()) {
        assert_eq!(a.displacement, b.displacement);
        assert_eq!(a.velocity, b.velocity);
    }
    for (a, b) in first.arena().iter().zip(second.arena().iter()) {
        assert_eq!(a.stress, b.stress);
        assert_eq!(a.plastic_strain, b.plastic_strain);
    }
}

#[test]
fn test_worker_count_does_not_change_the_answer() {
    let (serial, _) = run(1);
    let (parallel, _) = run(4);

    assert_eq!(serial.state().step, parallel.state().step);
    for (a, b) in serial.nodes().iter().zip(parallel.nodes()) {
        assert_relative_eq!(a.displacement, b.displacement, epsilon = 1e-12, max_relative = 1e-9);
    }
    for (a, b) in serial.arena().iter().zip(parallel.arena().iter()) {
        assert_relative_eq!(
            a.plastic_strain,
            b.plastic_strain,
            epsilon = 1e-12,
            max_relative = 1e-9
        );
    }
}

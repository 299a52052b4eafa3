//! Caller-owned simulation context.
//!
//! A [`Simulation`] owns the model, the integration point arena, the
//! boundary conditions resolved to node indices, the history recorder, the
//! worker pool and the solver state. Several simulations may coexist; none
//! of them share state.
//!
//! # Example
//!
//! ```no_run
//! use dynx_solver::{ExplicitConfig, Model, Simulation};
//!
//! # fn example(model: Model) -> dynx_solver::Result<()> {
//! let config = ExplicitConfig::new(1.0e-5).with_workers(4);
//! let mut simulation = Simulation::new(model, config)?;
//! let summary = simulation.run()?;
//! println!("{} steps, t = {:e}", summary.steps, summary.time);
//! simulation.write_history("results")?;
//! # Ok(())
//! # }
//! ```

use std::collections::{BTreeMap, HashMap};
use std::path::Path;

use dynx_io::{NodeRecord, PointRecord, Snapshot};
use nalgebra::Vector2;
use tracing::{debug, info, warn};

use crate::boundary_conditions::BoundarySystem;
use crate::energy::EnergyReport;
use crate::error::{Result, SolverError};
use crate::explicit_solver::{
    CancelToken, ExplicitConfig, Phase, SchemeParameters, SolverState, StepControl,
};
use crate::history::{HistoryFrame, HistoryRecorder};
use crate::kernel::{self, KernelSettings, degenerate};
use crate::materials::Material;
use crate::mesh::Node;
use crate::model::Model;
use crate::parallel::{ElementLoop, ElementPass};
use crate::state::PointArena;
use crate::tensor;
use crate::time_step::{self, StepInputs};

/// Outcome of one time step
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StepReport {
    pub step: usize,
    /// Time at the end of the step
    pub time: f64,
    pub time_step: f64,
    /// Stability limit `Ω_s/f_max` of the last evaluation
    pub critical_time_step: f64,
    /// Number of times the step was halved
    pub retries: usize,
}

/// Outcome of a run or of a partial run
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RunSummary {
    /// Steps taken by this call
    pub steps: usize,
    pub time: f64,
    pub phase: Phase,
    pub cancelled: bool,
}

#[derive(Debug)]
pub struct Simulation {
    model: Model,
    config: ExplicitConfig,
    scheme: SchemeParameters,
    kernel: KernelSettings,
    materials: Vec<Material>,
    /// Material index of each element
    element_materials: Vec<usize>,
    boundaries: BoundarySystem,
    recorder: HistoryRecorder,
    element_loop: ElementLoop,
    arena: PointArena,
    state: SolverState,
    step_control: StepControl,
    hourglass_work: f64,
    energies: EnergyReport,
    snapshots: Vec<Snapshot>,
    cancel: CancelToken,
}

impl Simulation {
    /// Check the model and configuration and prepare a run.
    ///
    /// Every reference between the parts of the model is resolved here, so
    /// configuration errors surface before the first step.
    pub fn new(model: Model, config: ExplicitConfig) -> Result<Self> {
        config.validate()?;
        model.mesh.validate()?;

        let mut materials = Vec::with_capacity(model.materials.len());
        let mut material_index = HashMap::new();
        for name in model.materials.material_names() {
            if let Some(material) = model.materials.get_material(&name) {
                material.validate()?;
                material_index.insert(name, materials.len());
                materials.push(material.clone());
            }
        }

        let mut assigned = vec![None; model.mesh.num_elements()];
        for (set_name, material_name) in model.materials.assignments() {
            let set = model.sets.require_element_set(set_name)?;
            let index = *material_index.get(material_name).ok_or_else(|| {
                SolverError::config(format!(
                    "material '{material_name}' assigned to element set '{set_name}' is not defined"
                ))
            })?;
            for id in set.iter() {
                if let Some(position) = model.mesh.element_position(id) {
                    assigned[position] = Some(index);
                }
            }
        }
        let element_materials = assigned
            .into_iter()
            .zip(model.mesh.elements())
            .map(|(index, element)| {
                index.ok_or_else(|| {
                    SolverError::config(format!("element {} has no material", element.id))
                })
            })
            .collect::<Result<Vec<_>>>()?;

        let boundaries =
            BoundarySystem::resolve(&model.boundary_conditions, &model.mesh, &model.sets)?;
        let recorder = HistoryRecorder::new(
            &model.history,
            &model.mesh,
            &model.sets,
            config.integration.num_points(),
        )?;
        let element_loop = ElementLoop::new(config.workers)?;

        Ok(Self {
            scheme: config.scheme.parameters(),
            kernel: config.kernel_settings(),
            state: SolverState::new(&config),
            model,
            config,
            materials,
            element_materials,
            boundaries,
            recorder,
            element_loop,
            arena: PointArena::default(),
            step_control: StepControl::default(),
            hourglass_work: 0.0,
            energies: EnergyReport::default(),
            snapshots: Vec::new(),
            cancel: CancelToken::new(),
        })
    }

    /// Reset the nodes and integration points to the initial state, apply
    /// the initial conditions and take the first history samples.
    pub fn initialize(&mut self) -> Result<()> {
        self.state = SolverState::new(&self.config);
        self.step_control = StepControl::default();
        self.hourglass_work = 0.0;
        self.snapshots.clear();
        self.recorder.reset();

        for node in self.model.mesh.nodes_mut() {
            let id = node.id;
            let (x, y, z) = (node.initial.x, node.initial.y, node.z);
            *node = Node::new(id, x, y, z);
        }

        let integration = self.config.integration;
        let elements = self.model.mesh.elements();
        let nodes = self.model.mesh.nodes();
        let (materials, element_materials) = (&self.materials, &self.element_materials);
        let points = self.element_loop.map_elements(elements.len(), |index| {
            let element = &elements[index];
            let material = &materials[element_materials[index]];
            let masses = kernel::current_quad(element, nodes)
                .lumped_masses(material.density, integration)
                .ok_or_else(|| degenerate(element))?;
            let points = kernel::initialize_points(element, material, nodes, integration)?;
            Ok((masses, points))
        })?;

        let mut masses = vec![0.0; nodes.len()];
        let mut states = Vec::with_capacity(elements.len() * integration.num_points());
        for (element, (element_masses, element_points)) in elements.iter().zip(points) {
            for (index, mass) in element.node_indices.iter().zip(element_masses) {
                masses[*index] += mass;
            }
            states.extend(element_points);
        }
        self.arena = PointArena::new(integration.num_points(), states);
        for (node, mass) in self.model.mesh.nodes_mut().iter_mut().zip(masses) {
            node.mass = mass;
        }

        self.boundaries
            .apply_initial(self.model.mesh.nodes_mut(), self.state.time);
        self.step_control_value()?;
        self.state.next_save = self.config.save.and_then(|schedule| {
            if schedule.start >= self.state.time {
                Some(schedule.start)
            } else {
                schedule.next_after(self.state.time)
            }
        });

        self.state.phase = Phase::Stepping;
        self.energies = EnergyReport::compute(self.model.mesh.nodes(), &self.arena, 0.0);
        self.sample_history();
        self.save_if_due()?;

        info!(
            nodes = self.model.mesh.num_nodes(),
            elements = self.model.mesh.num_elements(),
            workers = self.element_loop.workers(),
            critical_time_step = self.state.critical_time_step,
            "explicit analysis initialized"
        );
        Ok(())
    }

    /// Take one step towards the stop time
    pub fn step(&mut self) -> Result<StepReport> {
        self.step_towards(self.state.stop_time)
    }

    fn step_towards(&mut self, limit: f64) -> Result<StepReport> {
        match self.state.phase {
            Phase::Initializing => {
                return Err(SolverError::config("simulation is not initialized"));
            }
            Phase::Terminated => {
                return Err(SolverError::config("simulation has already terminated"));
            }
            Phase::Stepping | Phase::Saving => {}
        }

        let mut time_step = self
            .step_control_value()
            .inspect_err(|_| self.state.phase = Phase::Terminated)?;
        let mut target = limit.min(self.state.stop_time);
        if let Some(save) = self.state.next_save {
            target = target.min(save);
        }
        let mut landing = None;
        if self.state.time + time_step * (1.0 + 1.0e-9) >= target {
            time_step = target - self.state.time;
            landing = Some(target);
        }

        let backup = (self.config.max_step_retries > 0)
            .then(|| (self.model.mesh.nodes().to_vec(), self.arena.clone()));
        let mut retries = 0;
        loop {
            match self.advance(time_step) {
                Ok(()) => break,
                Err(SolverError::MeshDegeneracy(reason))
                    if retries < self.config.max_step_retries =>
                {
                    if let Some((nodes, arena)) = &backup {
                        self.model.mesh.nodes_mut().clone_from_slice(nodes);
                        self.arena = arena.clone();
                    }
                    retries += 1;
                    time_step *= 0.5;
                    landing = None;
                    warn!(
                        step = self.state.step + 1,
                        retry = retries,
                        dt = time_step,
                        %reason,
                        "element degenerated, retrying with a smaller step"
                    );
                }
                Err(err) => {
                    self.state.phase = Phase::Terminated;
                    return Err(err);
                }
            }
        }

        self.state.time = landing.unwrap_or(self.state.time + time_step);
        self.state.step += 1;
        self.state.time_step = time_step;
        self.energies =
            EnergyReport::compute(self.model.mesh.nodes(), &self.arena, self.hourglass_work);
        self.sample_history();
        self.save_if_due()
            .inspect_err(|_| self.state.phase = Phase::Terminated)?;

        if self.state.time >= self.state.stop_time {
            self.state.phase = Phase::Terminated;
            info!(
                steps = self.state.step,
                time = self.state.time,
                "explicit analysis finished"
            );
        }

        Ok(StepReport {
            step: self.state.step,
            time: self.state.time,
            time_step,
            critical_time_step: self.state.critical_time_step,
            retries,
        })
    }

    /// Step until `time` (or the stop time) is reached, the run ends, or
    /// cancellation is requested. Initializes the run if needed.
    pub fn solve_to(&mut self, time: f64) -> Result<RunSummary> {
        if self.state.phase == Phase::Initializing {
            self.initialize()?;
        }
        let first_step = self.state.step;
        let limit = time.min(self.state.stop_time);
        let mut cancelled = false;
        while self.state.phase != Phase::Terminated && self.state.time < limit {
            if self.cancel.is_cancelled() {
                info!(step = self.state.step, time = self.state.time, "analysis cancelled");
                cancelled = true;
                break;
            }
            self.step_towards(limit)?;
        }
        Ok(RunSummary {
            steps: self.state.step - first_step,
            time: self.state.time,
            phase: self.state.phase,
            cancelled,
        })
    }

    /// Run from the start to the stop time. History files are written to
    /// the output directory when one is configured.
    pub fn run(&mut self) -> Result<RunSummary> {
        self.initialize()?;
        let summary = self.solve_to(self.state.stop_time)?;
        if let Some(dir) = &self.config.output_dir {
            self.recorder.write_all(dir)?;
        }
        Ok(summary)
    }

    /// One predictor / element loop / corrector pass over `[t, t + Δt]`
    fn advance(&mut self, time_step: f64) -> Result<()> {
        let p = self.scheme;
        let time = self.state.time;
        let dt2 = time_step * time_step;

        {
            let nodes = self.model.mesh.nodes_mut();
            for node in nodes.iter_mut() {
                node.displacement_increment =
                    node.velocity * time_step + node.acceleration * ((0.5 - p.beta) * dt2);
                node.velocity += node.acceleration * ((1.0 - p.gamma) * time_step);
            }
            self.boundaries.enforce(nodes, time, time_step);
        }

        let pass = ElementPass {
            elements: self.model.mesh.elements(),
            materials: &self.materials,
            element_materials: &self.element_materials,
            nodes: self.model.mesh.nodes(),
            settings: &self.kernel,
            time_step,
        };
        let buffer = self.element_loop.run(&pass, &mut self.arena)?;

        let nodes = self.model.mesh.nodes_mut();
        for (node, force) in nodes.iter_mut().zip(buffer.forces.iter()) {
            let acceleration = if node.mass > 0.0 {
                (force / node.mass - node.acceleration * p.alpha_m) / (1.0 - p.alpha_m)
            } else {
                Vector2::zeros()
            };
            node.velocity += acceleration * (p.gamma * time_step);
            node.displacement_increment += acceleration * (p.beta * dt2);
            node.acceleration = acceleration;
        }
        self.boundaries.enforce(nodes, time, time_step);

        for node in nodes.iter_mut() {
            node.displacement += node.displacement_increment;
            node.coordinates = node.initial + node.displacement;
        }
        self.hourglass_work += buffer.hourglass_power * time_step;
        Ok(())
    }

    /// Step to take now, re-evaluating the critical step when due
    fn step_control_value(&mut self) -> Result<f64> {
        let step = self.state.step;
        if !self.step_control.due(step, self.config.recompute_every) {
            if let Some(estimate) = self.step_control.estimate(step) {
                return Ok(estimate);
            }
        }

        let inputs = StepInputs {
            elements: self.model.mesh.elements(),
            materials: &self.materials,
            element_materials: &self.element_materials,
            nodes: self.model.mesh.nodes(),
            arena: &self.arena,
            integration: self.config.integration,
        };
        let frequency =
            time_step::max_frequency(&self.config.time_step_method, &inputs, &self.element_loop)?;
        let critical = self.scheme.omega_s / frequency;
        if !(critical > 0.0) || !critical.is_finite() {
            return Err(SolverError::MeshDegeneracy(format!(
                "critical time step {critical:e} at step {step}"
            )));
        }
        let time_step = self.config.safety_factor * critical;
        self.state.critical_time_step = critical;
        self.step_control.store(step, time_step);
        debug!(step, dt = time_step, critical, "critical time step");
        Ok(time_step)
    }

    fn sample_history(&mut self) {
        let frame = HistoryFrame {
            time: self.state.time,
            time_step: self.state.time_step,
            nodes: self.model.mesh.nodes(),
            arena: &self.arena,
            energies: &self.energies,
        };
        self.recorder.record(&frame);
    }

    fn save_if_due(&mut self) -> Result<()> {
        let Some(schedule) = self.config.save else {
            return Ok(());
        };
        while let Some(save_time) = self.state.next_save {
            if self.state.time < save_time {
                break;
            }
            self.state.phase = Phase::Saving;
            let snapshot = self.snapshot();
            match &self.config.output_dir {
                Some(dir) => {
                    let path = dir.join(format!("snapshot_{:06}.json", self.state.step));
                    dynx_io::save_snapshot(&path, &snapshot)?;
                    info!(
                        step = self.state.step,
                        time = self.state.time,
                        path = %path.display(),
                        "saved snapshot"
                    );
                }
                None => {
                    info!(step = self.state.step, time = self.state.time, "captured snapshot");
                    self.snapshots.push(snapshot);
                }
            }
            self.state.next_save = schedule.next_after(save_time);
            self.state.phase = Phase::Stepping;
        }
        Ok(())
    }

    /// Capture the current nodal and integration point state
    pub fn snapshot(&self) -> Snapshot {
        let nodes = self
            .model
            .mesh
            .nodes()
            .iter()
            .map(|node| NodeRecord {
                id: node.id,
                coordinates: [node.coordinates.x, node.coordinates.y],
                displacement: [node.displacement.x, node.displacement.y],
                velocity: [node.velocity.x, node.velocity.y],
                acceleration: [node.acceleration.x, node.acceleration.y],
            })
            .collect();

        let mut points = Vec::with_capacity(self.arena.states().len());
        for (index, element) in self.model.mesh.elements().iter().enumerate() {
            if index >= self.arena.num_elements() {
                break;
            }
            for (point, state) in self.arena.element(index).iter().enumerate() {
                points.push(PointRecord {
                    element: element.id,
                    point,
                    stress: tensor::components(&state.stress),
                    strain: tensor::components(&state.strain),
                    plastic_strain: state.plastic_strain,
                    plastic_strain_rate: state.plastic_strain_rate,
                    temperature: state.temperature,
                    density: state.density,
                    yield_stress: state.yield_stress,
                });
            }
        }

        let mut metadata = BTreeMap::new();
        metadata.insert("scheme".to_string(), format!("{:?}", self.config.scheme));
        metadata.insert("integration".to_string(), format!("{:?}", self.config.integration));
        metadata.insert("workers".to_string(), self.element_loop.workers().to_string());

        Snapshot {
            step: self.state.step,
            time: self.state.time,
            time_step: self.state.time_step,
            nodes,
            points,
            metadata,
            ..Snapshot::default()
        }
    }

    /// Write one plot file per history record into `directory`
    pub fn write_history(&self, directory: impl AsRef<Path>) -> Result<()> {
        self.recorder.write_all(directory.as_ref())
    }

    pub fn model(&self) -> &Model {
        &self.model
    }

    pub fn config(&self) -> &ExplicitConfig {
        &self.config
    }

    pub fn state(&self) -> &SolverState {
        &self.state
    }

    pub fn energies(&self) -> &EnergyReport {
        &self.energies
    }

    pub fn history(&self) -> &HistoryRecorder {
        &self.recorder
    }

    pub fn nodes(&self) -> &[Node] {
        self.model.mesh.nodes()
    }

    pub fn arena(&self) -> &PointArena {
        &self.arena
    }

    /// Snapshots taken in memory (no output directory configured)
    pub fn snapshots(&self) -> &[Snapshot] {
        &self.snapshots
    }

    /// A handle that cancels the run at the next step boundary
    pub fn cancel_token(&self) -> CancelToken {
        self.cancel.clone()
    }
}

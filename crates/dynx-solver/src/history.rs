//! Time-sampled history records.
//!
//! A record follows one field over a node set, an element set, or the
//! whole model. Component `0` is the mean over every member of the set
//! (and over the integration points of element members); component `k`
//! follows the k-th member of the set in insertion order.
//!
//! Integration point fields can also be read at nodes: the nodal value is
//! the mean of the element values of every element sharing the node.

use std::path::Path;

use dynx_io::PlotSeries;
use nalgebra::Matrix3;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::energy::EnergyReport;
use crate::error::{Result, SolverError};
use crate::mesh::{Mesh, Node};
use crate::sets::Sets;
use crate::state::{PointArena, PointState};
use crate::tensor;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum NodeField {
    DisplacementX,
    DisplacementY,
    DisplacementNorm,
    VelocityX,
    VelocityY,
    VelocityNorm,
    AccelerationX,
    AccelerationY,
    AccelerationNorm,
    CoordinateX,
    CoordinateY,
    Mass,
}

impl NodeField {
    pub fn value(self, node: &Node) -> f64 {
        match self {
            NodeField::DisplacementX => node.displacement.x,
            NodeField::DisplacementY => node.displacement.y,
            NodeField::DisplacementNorm => node.displacement.norm(),
            NodeField::VelocityX => node.velocity.x,
            NodeField::VelocityY => node.velocity.y,
            NodeField::VelocityNorm => node.velocity.norm(),
            NodeField::AccelerationX => node.acceleration.x,
            NodeField::AccelerationY => node.acceleration.y,
            NodeField::AccelerationNorm => node.acceleration.norm(),
            NodeField::CoordinateX => node.coordinates.x,
            NodeField::CoordinateY => node.coordinates.y,
            NodeField::Mass => node.mass,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ElementField {
    VonMises,
    Pressure,
    PlasticStrain,
    PlasticStrainRate,
    Temperature,
    Density,
    YieldStress,
    Gamma,
    GammaCumulated,
    InternalEnergy,
    InelasticEnergy,
    StressXX,
    StressYY,
    StressZZ,
    StressXY,
    StrainXX,
    StrainYY,
    StrainZZ,
    StrainXY,
    PlasticStrainXX,
    PlasticStrainYY,
    PlasticStrainZZ,
    PlasticStrainXY,
}

impl ElementField {
    pub fn value(self, point: &PointState) -> f64 {
        let component = |tensor: &Matrix3<f64>, slot: usize| tensor::components(tensor)[slot];
        match self {
            ElementField::VonMises => point.von_mises(),
            ElementField::Pressure => point.stress.trace() / 3.0,
            ElementField::PlasticStrain => point.plastic_strain,
            ElementField::PlasticStrainRate => point.plastic_strain_rate,
            ElementField::Temperature => point.temperature,
            ElementField::Density => point.density,
            ElementField::YieldStress => point.yield_stress,
            ElementField::Gamma => point.gamma,
            ElementField::GammaCumulated => point.gamma_cumulated,
            ElementField::InternalEnergy => point.internal_energy,
            ElementField::InelasticEnergy => point.inelastic_energy,
            ElementField::StressXX => component(&point.stress, 0),
            ElementField::StressYY => component(&point.stress, 1),
            ElementField::StressZZ => component(&point.stress, 2),
            ElementField::StressXY => component(&point.stress, 3),
            ElementField::StrainXX => component(&point.strain, 0),
            ElementField::StrainYY => component(&point.strain, 1),
            ElementField::StrainZZ => component(&point.strain, 2),
            ElementField::StrainXY => component(&point.strain, 3),
            ElementField::PlasticStrainXX => component(&point.plastic_strain_tensor, 0),
            ElementField::PlasticStrainYY => component(&point.plastic_strain_tensor, 1),
            ElementField::PlasticStrainZZ => component(&point.plastic_strain_tensor, 2),
            ElementField::PlasticStrainXY => component(&point.plastic_strain_tensor, 3),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum GlobalField {
    TimeStep,
    KineticEnergy,
    InternalEnergy,
    DissipatedEnergy,
    TotalEnergy,
}

/// What a record samples
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum HistoryTarget {
    NodeSet { set: String, field: NodeField },
    ElementSet { set: String, field: ElementField },
    /// Integration point field averaged onto the nodes of a node set
    NodalAverage { set: String, field: ElementField },
    Global(GlobalField),
}

/// A history record request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryRequest {
    /// Output name, also the plot file stem
    pub name: String,
    pub target: HistoryTarget,
    /// `0` for the set aggregate, `k` for the k-th member
    pub component: usize,
    /// Sampling interval in time; zero samples after every step
    pub interval: f64,
    pub start: f64,
    /// Integration point to read for element records, element mean if unset
    pub integration_point: Option<usize>,
}

impl HistoryRequest {
    pub fn new(name: impl Into<String>, target: HistoryTarget) -> Self {
        Self {
            name: name.into(),
            target,
            component: 0,
            interval: 0.0,
            start: 0.0,
            integration_point: None,
        }
    }

    pub fn node(name: impl Into<String>, set: impl Into<String>, field: NodeField) -> Self {
        Self::new(name, HistoryTarget::NodeSet { set: set.into(), field })
    }

    pub fn element(name: impl Into<String>, set: impl Into<String>, field: ElementField) -> Self {
        Self::new(name, HistoryTarget::ElementSet { set: set.into(), field })
    }

    pub fn nodal(name: impl Into<String>, set: impl Into<String>, field: ElementField) -> Self {
        Self::new(name, HistoryTarget::NodalAverage { set: set.into(), field })
    }

    pub fn global(name: impl Into<String>, field: GlobalField) -> Self {
        Self::new(name, HistoryTarget::Global(field))
    }

    pub fn with_component(mut self, component: usize) -> Self {
        self.component = component;
        self
    }

    pub fn with_interval(mut self, interval: f64) -> Self {
        self.interval = interval;
        self
    }

    pub fn with_start(mut self, start: f64) -> Self {
        self.start = start;
        self
    }

    pub fn with_integration_point(mut self, point: usize) -> Self {
        self.integration_point = Some(point);
        self
    }
}

/// State the recorder reads a sample from
#[derive(Debug, Clone, Copy)]
pub struct HistoryFrame<'a> {
    pub time: f64,
    pub time_step: f64,
    pub nodes: &'a [Node],
    pub arena: &'a PointArena,
    pub energies: &'a EnergyReport,
}

#[derive(Debug, Clone)]
struct Record {
    request: HistoryRequest,
    /// Node or element indices of the sampled members
    members: Vec<usize>,
    /// Element indices around each member of a nodal average
    neighbours: Vec<Vec<usize>>,
    next_time: f64,
    series: PlotSeries,
}

impl Record {
    fn due(&self, time: f64) -> bool {
        time >= self.next_time
    }

    /// Move the next sample time past `time` on the `start + k·interval` grid
    fn advance_schedule(&mut self, time: f64) {
        let interval = self.request.interval;
        if interval > 0.0 {
            while self.next_time <= time {
                self.next_time += interval;
            }
        }
    }

    fn value(&self, frame: &HistoryFrame<'_>) -> f64 {
        match &self.request.target {
            HistoryTarget::NodeSet { field, .. } => {
                mean(self.members.iter().map(|&index| field.value(&frame.nodes[index])))
            }
            HistoryTarget::ElementSet { field, .. } => mean(
                self.members
                    .iter()
                    .map(|&index| self.element_value(frame.arena, index, *field)),
            ),
            HistoryTarget::NodalAverage { field, .. } => {
                let element = |index: &usize| self.element_value(frame.arena, *index, *field);
                mean(self.neighbours.iter().map(|elements| mean(elements.iter().map(element))))
            }
            HistoryTarget::Global(field) => match field {
                GlobalField::TimeStep => frame.time_step,
                GlobalField::KineticEnergy => frame.energies.kinetic,
                GlobalField::InternalEnergy => frame.energies.internal,
                GlobalField::DissipatedEnergy => frame.energies.dissipated(),
                GlobalField::TotalEnergy => frame.energies.total(),
            },
        }
    }

    /// Mean over the integration points of an element, or the selected one
    fn element_value(&self, arena: &PointArena, index: usize, field: ElementField) -> f64 {
        let points = arena.element(index);
        match self.request.integration_point {
            Some(p) => field.value(&points[p]),
            None => mean(points.iter().map(|state| field.value(state))),
        }
    }
}

fn mean(values: impl Iterator<Item = f64>) -> f64 {
    let (sum, count) = values.fold((0.0, 0usize), |(s, n), v| (s + v, n + 1));
    if count == 0 { 0.0 } else { sum / count as f64 }
}

/// Collects every history record of a run
#[derive(Debug, Clone, Default)]
pub struct HistoryRecorder {
    records: Vec<Record>,
}

impl HistoryRecorder {
    /// Resolve the requests against the mesh and its sets.
    pub fn new(
        requests: &[HistoryRequest],
        mesh: &Mesh,
        sets: &Sets,
        points_per_element: usize,
    ) -> Result<Self> {
        let mut records = Vec::with_capacity(requests.len());
        let mut node_elements: Vec<Vec<usize>> = Vec::new();
        for request in requests {
            if request.name.is_empty() {
                return Err(SolverError::config("history record needs a name"));
            }
            if records.iter().any(|r: &Record| r.request.name == request.name) {
                return Err(SolverError::config(format!(
                    "history record '{}' is defined twice",
                    request.name
                )));
            }
            if !(request.interval >= 0.0) || !request.start.is_finite() {
                return Err(SolverError::config(format!(
                    "history record '{}': invalid interval or start time",
                    request.name
                )));
            }

            if let Some(point) = request.integration_point {
                if point >= points_per_element {
                    return Err(SolverError::config(format!(
                        "history record '{}': integration point {point} does not exist",
                        request.name
                    )));
                }
            }

            let members: Vec<usize> = match &request.target {
                HistoryTarget::NodeSet { set, .. } | HistoryTarget::NodalAverage { set, .. } => sets
                    .require_node_set(set)?
                    .iter()
                    .filter_map(|id| mesh.node_position(id))
                    .collect(),
                HistoryTarget::ElementSet { set, .. } => sets
                    .require_element_set(set)?
                    .iter()
                    .filter_map(|id| mesh.element_position(id))
                    .collect(),
                HistoryTarget::Global(_) => Vec::new(),
            };

            let members = match (&request.target, request.component) {
                (HistoryTarget::Global(_), _) | (_, 0) => members,
                (_, k) => match members.get(k - 1) {
                    Some(&member) => vec![member],
                    None => {
                        return Err(SolverError::config(format!(
                            "history record '{}': component {k} exceeds the {} members of the set",
                            request.name,
                            members.len()
                        )));
                    }
                },
            };

            let neighbours = match &request.target {
                HistoryTarget::NodalAverage { .. } => {
                    if node_elements.is_empty() {
                        node_elements = vec![Vec::new(); mesh.num_nodes()];
                        for (index, element) in mesh.elements().iter().enumerate() {
                            for &node in &element.node_indices {
                                node_elements[node].push(index);
                            }
                        }
                    }
                    members.iter().map(|&node| node_elements[node].clone()).collect()
                }
                _ => Vec::new(),
            };

            records.push(Record {
                request: request.clone(),
                members,
                neighbours,
                next_time: request.start,
                series: PlotSeries::new(request.name.clone()),
            });
        }
        Ok(Self { records })
    }

    /// Sample every record that is due at `frame.time`
    pub fn record(&mut self, frame: &HistoryFrame<'_>) {
        for record in &mut self.records {
            if record.due(frame.time) {
                let value = record.value(frame);
                record.series.push(frame.time, value);
                record.advance_schedule(frame.time);
            }
        }
    }

    /// Drop every sample and restart the schedules
    pub fn reset(&mut self) {
        for record in &mut self.records {
            record.next_time = record.request.start;
            record.series = PlotSeries::new(record.request.name.clone());
        }
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn series(&self, name: &str) -> Option<&PlotSeries> {
        self.records
            .iter()
            .find(|r| r.request.name == name)
            .map(|r| &r.series)
    }

    pub fn iter(&self) -> impl Iterator<Item = &PlotSeries> {
        self.records.iter().map(|r| &r.series)
    }

    /// Write one `<name>.plot` file per record into `directory`
    pub fn write_all(&self, directory: &Path) -> Result<()> {
        for record in &self.records {
            let path = directory.join(format!("{}.plot", record.request.name));
            dynx_io::write_plot(&path, &record.series)?;
        }
        debug!(
            records = self.records.len(),
            directory = %directory.display(),
            "wrote history files"
        );
        Ok(())
    }
}

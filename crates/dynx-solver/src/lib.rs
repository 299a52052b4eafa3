//! Explicit transient finite element dynamics.
//!
//! This crate provides a time-marching solver for large-deformation,
//! thermo-viscoplastic analysis of plane strain and axisymmetric meshes of
//! 4-node quadrilaterals: Johnson–Cook radial return with adiabatic
//! heating, critical time step control, kinematic boundary conditions,
//! time-sampled history records and a domain-parallel element loop.

pub mod boundary_conditions;
pub mod constitutive;
pub mod elements;
pub mod energy;
pub mod error;
pub mod explicit_solver;
pub mod history;
pub mod kernel;
pub mod materials;
pub mod mesh;
pub mod model;
pub mod parallel;
pub mod ramp;
pub mod sets;
pub mod simulation;
pub mod state;
pub mod tensor;
pub mod time_step;

pub use boundary_conditions::{Activation, BoundaryCondition, BoundaryKind, BoundarySystem};
pub use constitutive::ReturnMapping;
pub use elements::{Integration, Quad4};
pub use energy::EnergyReport;
pub use error::{Result, SolverError};
pub use explicit_solver::{
    CancelToken, ExplicitConfig, IntegrationScheme, Phase, SaveSchedule, SchemeParameters,
    SolverState,
};
pub use history::{
    ElementField, GlobalField, HistoryRecorder, HistoryRequest, HistoryTarget, NodeField,
};
pub use kernel::KernelSettings;
pub use materials::{HardeningLaw, JohnsonCookParameters, Material, MaterialLibrary};
pub use mesh::{Element, ElementKind, Mesh, MeshStatistics, Node};
pub use model::Model;
pub use parallel::ElementLoop;
pub use ramp::{Ramp, RampShape};
pub use sets::{ElementSet, IdSet, NodeSet, Selection, Sets};
pub use simulation::{RunSummary, Simulation, StepReport};
pub use state::{PointArena, PointState};
pub use time_step::{PowerIterationSettings, TimeStepMethod};

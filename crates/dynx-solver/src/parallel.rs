//! Domain-parallel element loop.
//!
//! Elements are split into contiguous index ranges, one per worker, and the
//! point arena into the matching disjoint slices. Each worker scatters its
//! element forces into a private nodal buffer; the buffers are summed in
//! worker order once every worker is done, so the result only depends on
//! the worker count.

use nalgebra::Vector2;
use rayon::prelude::*;
use rayon::{ThreadPool, ThreadPoolBuilder};

use crate::error::{Result, SolverError};
use crate::kernel::{self, ElementResponse, KernelSettings};
use crate::materials::Material;
use crate::mesh::{Element, Node};
use crate::state::PointArena;

/// Nodal accumulator owned by one worker
#[derive(Debug, Clone, PartialEq)]
pub struct WorkerBuffer {
    pub forces: Vec<Vector2<f64>>,
    pub hourglass_power: f64,
}

impl WorkerBuffer {
    pub fn new(num_nodes: usize) -> Self {
        Self {
            forces: vec![Vector2::zeros(); num_nodes],
            hourglass_power: 0.0,
        }
    }

    fn scatter(&mut self, element: &Element, response: &ElementResponse) {
        for (index, force) in element.node_indices.iter().zip(response.forces.iter()) {
            self.forces[*index] += force;
        }
        self.hourglass_power += response.hourglass_power;
    }

    fn merge(&mut self, other: &WorkerBuffer) {
        for (total, force) in self.forces.iter_mut().zip(other.forces.iter()) {
            *total += force;
        }
        self.hourglass_power += other.hourglass_power;
    }
}

/// Read-only inputs of one pass over the elements
#[derive(Debug, Clone, Copy)]
pub struct ElementPass<'a> {
    pub elements: &'a [Element],
    pub materials: &'a [Material],
    /// Material index of each element
    pub element_materials: &'a [usize],
    pub nodes: &'a [Node],
    pub settings: &'a KernelSettings,
    pub time_step: f64,
}

/// Fixed-size pool running the element loop
pub struct ElementLoop {
    pool: ThreadPool,
    workers: usize,
}

impl std::fmt::Debug for ElementLoop {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ElementLoop").field("workers", &self.workers).finish()
    }
}

impl ElementLoop {
    pub fn new(workers: usize) -> Result<Self> {
        if workers == 0 {
            return Err(SolverError::config("worker count must be at least 1"));
        }
        let pool = ThreadPoolBuilder::new()
            .num_threads(workers)
            .thread_name(|index| format!("dynx-worker-{index}"))
            .build()
            .map_err(|err| SolverError::config(format!("cannot start worker pool: {err}")))?;
        Ok(Self { pool, workers })
    }

    pub fn workers(&self) -> usize {
        self.workers
    }

    /// Number of elements handled by each worker
    pub fn chunk_size(&self, num_elements: usize) -> usize {
        num_elements.div_ceil(self.workers).max(1)
    }

    /// Update every element and return the assembled nodal forces.
    ///
    /// The first failing element aborts the pass.
    pub fn run(&self, pass: &ElementPass<'_>, arena: &mut PointArena) -> Result<WorkerBuffer> {
        let per_element = arena.points_per_element();
        let chunk = self.chunk_size(pass.elements.len());
        let num_nodes = pass.nodes.len();

        let buffers = self.pool.install(|| {
            arena
                .states_mut()
                .par_chunks_mut(chunk * per_element)
                .enumerate()
                .map(|(worker, states)| {
                    let mut buffer = WorkerBuffer::new(num_nodes);
                    for (offset, points) in states.chunks_mut(per_element).enumerate() {
                        let index = worker * chunk + offset;
                        let element = &pass.elements[index];
                        let material = &pass.materials[pass.element_materials[index]];
                        let response = kernel::update_element(
                            element,
                            material,
                            points,
                            pass.nodes,
                            pass.time_step,
                            pass.settings,
                        )?;
                        buffer.scatter(element, &response);
                    }
                    Ok(buffer)
                })
                .collect::<Result<Vec<_>>>()
        })?;

        let mut total = WorkerBuffer::new(num_nodes);
        for buffer in &buffers {
            total.merge(buffer);
        }
        Ok(total)
    }

    /// Minimum of a per-element quantity, computed on the pool
    pub fn min_over<F>(&self, count: usize, value: F) -> Result<f64>
    where
        F: Fn(usize) -> Result<f64> + Sync + Send,
    {
        self.pool.install(|| {
            (0..count)
                .into_par_iter()
                .map(value)
                .try_reduce(|| f64::INFINITY, |a, b| Ok(a.min(b)))
        })
    }

    /// Run a per-element computation on the pool, keeping element order
    pub fn map_elements<T, F>(&self, count: usize, value: F) -> Result<Vec<T>>
    where
        T: Send,
        F: Fn(usize) -> Result<T> + Sync + Send,
    {
        self.pool
            .install(|| (0..count).into_par_iter().map(value).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::elements::Integration;
    use crate::mesh::{ElementKind, Mesh};

    fn strip(num_elements: i32) -> Mesh {
        let mut mesh = Mesh::new();
        for i in 0..=num_elements {
            mesh.create_node(2 * i + 1, i as f64, 0.0, 0.0).unwrap();
            mesh.create_node(2 * i + 2, i as f64, 1.0, 0.0).unwrap();
        }
        for i in 0..num_elements {
            mesh.create_element(
                i + 1,
                ElementKind::PlaneStrain,
                [2 * i + 1, 2 * i + 3, 2 * i + 4, 2 * i + 2],
            )
            .unwrap();
        }
        // Stretch the strip along x
        for node in mesh.nodes_mut() {
            node.displacement_increment = Vector2::new(1.0e-4 * node.coordinates.x, 0.0);
        }
        mesh
    }

    fn run_with(workers: usize, mesh: &Mesh) -> (WorkerBuffer, PointArena) {
        let material = Material::new("steel", 206000.0, 0.3, 7.83e-9);
        let mut states = Vec::new();
        for element in mesh.elements() {
            let points =
                kernel::initialize_points(element, &material, mesh.nodes(), Integration::Full);
            states.extend(points.unwrap());
        }
        let mut arena = PointArena::new(4, states);
        let settings = KernelSettings::default();
        let materials = [material];
        let element_materials = vec![0; mesh.num_elements()];
        let pass = ElementPass {
            elements: mesh.elements(),
            materials: &materials,
            element_materials: &element_materials,
            nodes: mesh.nodes(),
            settings: &settings,
            time_step: 1.0e-7,
        };
        let buffer = ElementLoop::new(workers).unwrap().run(&pass, &mut arena).unwrap();
        (buffer, arena)
    }

    #[test]
    fn test_zero_workers_is_rejected() {
        assert!(matches!(ElementLoop::new(0), Err(SolverError::Configuration(_))));
    }

    #[test]
    fn test_chunk_size_covers_all_elements() {
        let pool = ElementLoop::new(3).unwrap();
        assert_eq!(pool.chunk_size(10), 4);
        assert_eq!(pool.chunk_size(2), 1);
        assert_eq!(pool.chunk_size(0), 1);
    }

    #[test]
    fn test_worker_counts_agree() {
        let mesh = strip(7);
        let (serial, serial_arena) = run_with(1, &mesh);
        let (parallel, parallel_arena) = run_with(3, &mesh);
        for (a, b) in serial.forces.iter().zip(parallel.forces.iter()) {
            approx::assert_relative_eq!(*a, *b, epsilon = 1e-9);
        }
        assert_eq!(serial_arena.states(), parallel_arena.states());
    }

    #[test]
    fn test_same_worker_count_is_bitwise_deterministic() {
        let mesh = strip(9);
        let (first, _) = run_with(4, &mesh);
        let (second, _) = run_with(4, &mesh);
        assert_eq!(first, second);
    }

    #[test]
    fn test_first_error_aborts_the_pass() {
        let mut mesh = strip(4);
        mesh.nodes_mut()[5].displacement_increment = Vector2::new(-5.0, -5.0);
        let material = Material::new("steel", 206000.0, 0.3, 7.83e-9);
        let mut states = Vec::new();
        for element in mesh.elements() {
            let points =
                kernel::initialize_points(element, &material, mesh.nodes(), Integration::Full);
            states.extend(points.unwrap());
        }
        let mut arena = PointArena::new(4, states);
        let settings = KernelSettings::default();
        let materials = [material];
        let element_materials = vec![0; mesh.num_elements()];
        let pass = ElementPass {
            elements: mesh.elements(),
            materials: &materials,
            element_materials: &element_materials,
            nodes: mesh.nodes(),
            settings: &settings,
            time_step: 1.0e-7,
        };
        let err = ElementLoop::new(2).unwrap().run(&pass, &mut arena).unwrap_err();
        assert!(matches!(err, SolverError::MeshDegeneracy(_)));
    }

    #[test]
    fn test_min_over_elements() {
        let pool = ElementLoop::new(2).unwrap();
        let min = pool.min_over(5, |i| Ok(10.0 - i as f64)).unwrap();
        assert_eq!(min, 6.0);
        let values = pool.map_elements(4, |i| Ok(i * 2)).unwrap();
        assert_eq!(values, vec![0, 2, 4, 6]);
    }
}

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{IoError, Result};
use crate::plot::ensure_parent_dir;

pub const SNAPSHOT_SCHEMA_VERSION: u32 = 1;

/// Kinematic state of one node at the snapshot time.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct NodeRecord {
    pub id: i32,
    pub coordinates: [f64; 2],
    pub displacement: [f64; 2],
    pub velocity: [f64; 2],
    pub acceleration: [f64; 2],
}

/// Integration point state, flattened. Tensors are stored as
/// `[xx, yy, zz, xy]`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PointRecord {
    pub element: i32,
    pub point: usize,
    pub stress: [f64; 4],
    pub strain: [f64; 4],
    pub plastic_strain: f64,
    pub plastic_strain_rate: f64,
    pub temperature: f64,
    pub density: f64,
    pub yield_stress: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Snapshot {
    pub schema_version: u32,
    pub step: usize,
    pub time: f64,
    pub time_step: f64,
    pub nodes: Vec<NodeRecord>,
    pub points: Vec<PointRecord>,
    pub metadata: BTreeMap<String, String>,
}

impl Default for Snapshot {
    fn default() -> Self {
        Self {
            schema_version: SNAPSHOT_SCHEMA_VERSION,
            step: 0,
            time: 0.0,
            time_step: 0.0,
            nodes: Vec::new(),
            points: Vec::new(),
            metadata: BTreeMap::new(),
        }
    }
}

pub fn save_snapshot(path: impl AsRef<Path>, snapshot: &Snapshot) -> Result<()> {
    let path = path.as_ref();
    ensure_parent_dir(path)?;
    let bytes = serde_json::to_vec_pretty(snapshot)?;
    fs::write(path, bytes)?;
    tracing::debug!(path = %path.display(), step = snapshot.step, "saved snapshot");
    Ok(())
}

pub fn load_snapshot(path: impl AsRef<Path>) -> Result<Snapshot> {
    let path = path.as_ref();
    if !path.exists() {
        return Err(IoError::FileNotFound(path.display().to_string()));
    }
    let bytes = fs::read(path)?;
    let snapshot: Snapshot = serde_json::from_slice(&bytes)?;
    if snapshot.schema_version != SNAPSHOT_SCHEMA_VERSION {
        return Err(IoError::SchemaVersion {
            found: snapshot.schema_version,
            expected: SNAPSHOT_SCHEMA_VERSION,
        });
    }
    Ok(snapshot)
}

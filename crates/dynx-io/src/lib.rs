//! Output support for the dynx explicit solver.
//!
//! This crate provides:
//! - **Plot files**: two-column `time value` history series
//! - **Snapshots**: JSON checkpoints of nodal and integration point state

pub mod error;
pub mod plot;
mod snapshot;

pub use error::{IoError, Result};
pub use plot::{PlotSeries, format_scientific, parse_plot, read_plot, render_plot, write_plot};
pub use snapshot::{
    NodeRecord, PointRecord, SNAPSHOT_SCHEMA_VERSION, Snapshot, load_snapshot, save_snapshot,
};

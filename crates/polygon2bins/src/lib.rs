//! Build a binned shoreline database from a GSHHS polygon file.
//!
//! The pipeline runs one polygon at a time: [`reader`] parses and
//! normalises it, [`clip`] inserts a vertex at every bin boundary crossing,
//! [`pack`] cuts the ring into per-bin segments encoded by [`encode`], and
//! [`build`] collects everything, classifies bins from a node raster
//! ([`classify`]) and lays the result out as a [`shorebin::ShoreDatabase`].

pub mod build;
pub mod classify;
pub mod clip;
pub mod config;
pub mod encode;
pub mod error;
pub mod grid;
pub mod pack;
pub mod reader;
pub mod table;

pub use build::{build_database, BuildStats, Builder};
pub use classify::NodeGrid;
pub use error::{BuildError, Result};
pub use grid::BinGrid;

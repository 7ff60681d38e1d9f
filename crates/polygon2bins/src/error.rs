use std::fmt;
use std::io;

use thiserror::Error;

/// Coordinate axis named in encoding diagnostics.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Axis {
    Lon,
    Lat,
}

impl fmt::Display for Axis {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Axis::Lon => "lon",
            Axis::Lat => "lat",
        })
    }
}

/// Every failure is fatal: the index is either complete and correct or not written.
#[derive(Debug, Error)]
pub enum BuildError {
    #[error("bin size must be 1, 2, 5, 10, or 20 degrees (got {0})")]
    InvalidBinSize(u32),

    #[error("node grid is {found_nx}x{found_ny} nodes, expected {expected_nx}x{expected_ny}")]
    NodeGridMismatch {
        expected_nx: usize,
        expected_ny: usize,
        found_nx: usize,
        found_ny: usize,
    },

    #[error("node grid value {value} at node {index} is not a level in 0..=7")]
    BadNodeLevel { index: usize, value: f32 },

    #[error("{what} truncated")]
    Truncated { what: &'static str },

    #[error("polygon {polygon}: {reason}")]
    MalformedPolygon { polygon: i32, reason: String },

    #[error("polygon {0} appears more than once")]
    DuplicatePolygon(i32),

    #[error("polygon {polygon} went exactly through a bin corner near point {index}")]
    CornerCrossing { polygon: i32, index: usize },

    #[error("no parent recorded for polygon {0} (not present in the source?)")]
    MissingParent(usize),

    #[error(
        "incremental {axis} ({value}) exceeds the u16 range for polygon {polygon} near point {index}; \
         most likely a point separation exceeds the bin spacing"
    )]
    DeltaOverflow {
        polygon: i32,
        axis: Axis,
        index: usize,
        value: i64,
    },

    #[error("segment of polygon {polygon} has {points} points, more than the format allows")]
    SegmentTooLong { polygon: i32, points: usize },

    #[error("bin {bin} holds {count} segments, more than the format allows")]
    TooManySegments { bin: usize, count: usize },

    #[error("{what} total ({count}) exceeds the format limit")]
    TotalOverflow { what: &'static str, count: usize },

    #[error(transparent)]
    Io(#[from] io::Error),
}

pub type Result<T, E = BuildError> = std::result::Result<T, E>;

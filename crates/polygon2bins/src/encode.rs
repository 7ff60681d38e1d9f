//! Fixed-point encoding of a run of vertices relative to its bin.

use shorebin::{Edge, ShortPair, MAX_DELTA};

use crate::error::{Axis, BuildError, Result};
use crate::grid::{BinGrid, Vertex};

/// Scale a micro-degree offset to offset units, round half to even.
#[inline]
pub fn scale_offset(delta: i32, scale: f64) -> i64 {
    (delta as f64 * scale).round_ties_even() as i64
}

#[inline]
fn checked_delta(value: i64, polygon: i32, axis: Axis, index: usize) -> Result<u16> {
    u16::try_from(value).map_err(|_| BuildError::DeltaOverflow {
        polygon,
        axis,
        index,
        value,
    })
}

/// Encode `run` (all inside cell `col, row`) as offsets from the cell's
/// southwest corner, then pin the first and last points onto their edges.
///
/// `first_index` is the position of `run[0]` in the polygon, for diagnostics.
pub fn encode_run(
    grid: &BinGrid,
    polygon: i32,
    (col, row): (i32, i32),
    run: &[Vertex],
    first_index: usize,
    entry: Edge,
    exit: Edge,
) -> Result<Vec<ShortPair>> {
    let origin = grid.origin(col, row);
    let east_of_seam = col == grid.last_column();

    let mut points = Vec::with_capacity(run.len());
    for (k, v) in run.iter().enumerate() {
        let index = first_index + k;

        // x == 0 in the last column is the 360° meridian, its east edge.
        let dx = if east_of_seam && v.x == 0 {
            MAX_DELTA
        } else {
            checked_delta(scale_offset(v.x - origin.x, grid.scale), polygon, Axis::Lon, index)?
        };
        let dy = checked_delta(scale_offset(v.y - origin.y, grid.scale), polygon, Axis::Lat, index)?;

        points.push(ShortPair::new(dx, dy));
    }

    if let Some(first) = points.first_mut() {
        entry.pin(first);
    }
    if let Some(last) = points.last_mut() {
        exit.pin(last);
    }

    Ok(points)
}

//! Cut a clipped ring into per-bin segments.

use shorebin::{Edge, ShortPair};

use crate::clip::ClippedRing;
use crate::encode::encode_run;
use crate::error::{BuildError, Result};
use crate::grid::{BinGrid, Vertex, M180, M360};
use crate::reader::PolygonHeader;

/// The part of one polygon's boundary inside one bin, already encoded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Segment {
    pub polygon_id: i32,
    pub level: u8,
    pub area: i32,
    pub area_fraction: i32,
    pub entry: Edge,
    pub exit: Edge,
    pub points: Vec<ShortPair>,
}

impl Segment {
    /// Two points entering and leaving through the same side: the ring only
    /// grazed the bin.
    #[inline]
    pub fn is_degenerate(&self) -> bool {
        self.points.len() == 2 && self.entry == self.exit
    }
}

/// A segment together with the bin that owns it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PackedSegment {
    pub bin: usize,
    pub segment: Segment,
}

/// Split `clipped` at its crossings and encode each run in its bin.
pub fn pack_polygon(
    grid: &BinGrid,
    header: &PolygonHeader,
    clipped: &ClippedRing,
) -> Result<Vec<PackedSegment>> {
    let id = header.id;
    let make = |entry: Edge, exit: Edge, points: Vec<ShortPair>| Segment {
        polygon_id: id,
        level: header.level,
        area: header.stored_area(),
        area_fraction: header.area_fraction(),
        entry,
        exit,
        points,
    };

    if clipped.first_crossing.is_none() {
        // Never leaves its bin: one segment holding the whole ring.
        let Some(&first) = clipped.points.first() else {
            return Ok(Vec::new());
        };
        let cell = checked_cell(grid, id, grid.cell_of(first))?;
        let points = encode_run(grid, id, cell, &clipped.points, 0, Edge::Interior, Edge::Interior)?;

        return Ok(vec![PackedSegment {
            bin: grid.bin_index(cell.0, cell.1),
            segment: make(Edge::Interior, Edge::Interior, points),
        }]);
    }

    let ring = clipped.rotated();
    let mut out = Vec::new();
    let mut last = 0;

    for (i, &p) in ring.iter().enumerate().skip(1) {
        let on_x = grid.on_x_line(p);
        let on_y = grid.on_y_line(p);
        if !on_x && !on_y {
            continue;
        }
        if on_x && on_y {
            return Err(BuildError::CornerCrossing { polygon: id, index: i });
        }

        let run = &ring[last..=i];
        let cell = checked_cell(grid, id, owning_cell(grid, run))?;
        let entry = edge_of(grid, ring[last], cell);
        let exit = edge_of(grid, p, cell);
        let points = encode_run(grid, id, cell, run, last, entry, exit)?;

        out.push(PackedSegment {
            bin: grid.bin_index(cell.0, cell.1),
            segment: make(entry, exit, points),
        });
        last = i;
    }

    Ok(out)
}

/// The cell a run between two crossings belongs to.
fn owning_cell(grid: &BinGrid, run: &[Vertex]) -> (i32, i32) {
    let w = grid.width;

    if run.len() > 2 {
        // An interior vertex is never on a grid line.
        return grid.cell_of(run[(run.len() - 1) / 2]);
    }

    // Only the two crossings: average them. A point on the seam is 0° or 360°
    // depending on which half of the globe its partner is in.
    let (a, b) = (run[0], run[run.len() - 1]);
    let unwrap = |p: Vertex, other: Vertex| {
        if p.x == 0 && other.x >= M180 {
            M360 as i64
        } else {
            p.x as i64
        }
    };
    let x = (unwrap(a, b) + unwrap(b, a)) / 2;
    let y = (a.y as i64 + b.y as i64) / 2;

    ((x / w as i64) as i32, (y / w as i64) as i32)
}

fn checked_cell(grid: &BinGrid, polygon: i32, (col, row): (i32, i32)) -> Result<(i32, i32)> {
    if (0..grid.nx).contains(&col) && (0..grid.ny).contains(&row) {
        Ok((col, row))
    } else {
        Err(BuildError::MalformedPolygon {
            polygon,
            reason: format!("segment resolved to bin column {} row {}, outside the grid", col, row),
        })
    }
}

/// Which side of `cell` the crossing point `p` lies on.
fn edge_of(grid: &BinGrid, p: Vertex, (col, row): (i32, i32)) -> Edge {
    if grid.on_x_line(p) {
        if p.x / grid.width == col {
            Edge::Left
        } else {
            Edge::Right
        }
    } else if p.y / grid.width == row {
        Edge::Bottom
    } else {
        Edge::Top
    }
}

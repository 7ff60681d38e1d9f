//! Insert an explicit vertex at every place a ring crosses a bin boundary.

use smallvec::SmallVec;

use crate::grid::{BinGrid, Vertex, M180, M360};

/// A ring with boundary crossings inserted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClippedRing {
    /// Closed vertex list (`first == last`), in input order.
    pub points: Vec<Vertex>,
    /// Index of the first inserted crossing; `None` if the ring never leaves its bin.
    pub first_crossing: Option<usize>,
    /// Edges spanning more than one bin in a single step.
    pub jumps: usize,
}

impl ClippedRing {
    /// The ring rotated to start and end on its first crossing. Rings that
    /// never cross are returned unchanged.
    pub fn rotated(&self) -> Vec<Vertex> {
        match self.first_crossing {
            Some(start) => {
                let n = self.points.len();
                let mut out = Vec::with_capacity(n);
                out.extend_from_slice(&self.points[start..]);
                out.extend_from_slice(&self.points[1..=start]);
                out
            }
            None => self.points.clone(),
        }
    }
}

/// Walk a closed, normalised ring and add a vertex on every x- or y-gridline
/// it crosses.
pub fn clip_ring(grid: &BinGrid, ring: &[Vertex]) -> ClippedRing {
    let mut points = Vec::with_capacity(ring.len() + ring.len() / 8 + 4);
    let mut first_crossing = None;
    let mut jumps = 0;

    let Some((&first, rest)) = ring.split_first() else {
        return ClippedRing {
            points,
            first_crossing,
            jumps,
        };
    };

    points.push(first);
    let mut prev = first;
    let (mut col1, mut row1) = grid.cell_of(prev);

    for &curr in rest {
        let (col2, row2) = grid.cell_of(curr);
        let crossings = crossings(grid, prev, curr, (col1, row1), (col2, row2), &mut jumps);

        if !crossings.is_empty() && first_crossing.is_none() {
            first_crossing = Some(points.len());
        }
        points.extend(crossings);
        points.push(curr);

        prev = curr;
        col1 = col2;
        row1 = row2;
    }

    ClippedRing {
        points,
        first_crossing,
        jumps,
    }
}

/// Longitude difference folded across the 0/360 seam.
#[inline]
fn seam_dx(dx: i32) -> i32 {
    if dx.abs() > M180 {
        M360 - dx.abs()
    } else {
        dx
    }
}

/// Boundary vertices between `prev` and `curr`, in path order.
fn crossings(
    grid: &BinGrid,
    prev: Vertex,
    curr: Vertex,
    (col1, row1): (i32, i32),
    (col2, row2): (i32, i32),
    jumps: &mut usize,
) -> SmallVec<[Vertex; 2]> {
    let w = grid.width;
    let dy = curr.y - prev.y;
    let mut span_x = curr.x - prev.x;

    let x_cross = (col1 != col2).then(|| {
        let (lo, hi) = (col1.min(col2), col1.max(col2));
        if lo == 0 && hi == grid.last_column() {
            // Through the 0/360 seam: measure both legs towards it.
            let to_seam = |v: Vertex, col: i32| if col == 0 { v.x } else { M360 - v.x };
            let d1 = to_seam(prev, col1);
            let d2 = to_seam(curr, col2);
            span_x = if col1 == 0 { -(d1 + d2) } else { d1 + d2 };
            let y = (prev.y as f64 + d1 as f64 * (dy as f64 / (d1 + d2) as f64)) as i32;
            Vertex::new(0, y)
        } else {
            if hi - lo > 1 {
                *jumps += 1;
            }
            let x = hi * w;
            let d1 = x - prev.x;
            let y = (prev.y as f64 + d1 as f64 * (dy as f64 / span_x as f64)) as i32;
            Vertex::new(x, y)
        }
    });

    let y_cross = (row1 != row2).then(|| {
        if (row2 - row1).abs() > 1 {
            *jumps += 1;
        }
        let y = row1.max(row2) * w;
        let mut x = (prev.x as f64 + (y - prev.y) as f64 * (span_x as f64 / dy as f64)) as i32;
        if x < 0 {
            x += M360;
        } else if x >= M360 {
            x -= M360;
        }
        Vertex::new(x, y)
    });

    let mut out = SmallVec::new();
    match (x_cross, y_cross) {
        (Some(xc), Some(yc)) => {
            let rx = (seam_dx(xc.x - prev.x) as f64).hypot((xc.y - prev.y) as f64);
            let dx = seam_dx(yc.x - prev.x);
            let ry = (dx as f64).hypot((yc.y - prev.y) as f64);

            if rx == ry {
                // Exactly through a corner. Split it into two nearby crossings;
                // the order follows the sign of dx, a historical choice.
                let n = grid.noise;
                if dx < 0 {
                    out.push(Vertex::new(xc.x + n, xc.y));
                    out.push(Vertex::new(xc.x, xc.y + n));
                } else {
                    out.push(Vertex::new(xc.x, xc.y + n));
                    out.push(Vertex::new(xc.x + n, xc.y));
                }
            } else if rx < ry {
                out.push(xc);
                out.push(yc);
            } else {
                out.push(yc);
                out.push(xc);
            }
        }
        (Some(c), None) | (None, Some(c)) => out.push(c),
        (None, None) => {}
    }
    out
}

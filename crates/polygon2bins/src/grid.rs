//! Bin lattice derived from a single bin size.
//!
//! Coordinates are non-negative micro-degrees: longitude in `[0, 360e6)`,
//! latitude shifted by +90° into `[0, 180e6]`.

use crate::error::{BuildError, Result};
use shorebin::MAX_DELTA;

/// Micro-degrees per degree.
pub const MILL: i32 = 1_000_000;
pub const M90: i32 = 90 * MILL;
pub const M180: i32 = 180 * MILL;
pub const M360: i32 = 360 * MILL;

/// Bin sizes (degrees) the format supports.
pub const BIN_SIZES: [u32; 5] = [1, 2, 5, 10, 20];

/// A vertex in normalised micro-degrees.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Vertex {
    pub x: i32,
    pub y: i32,
}

impl Vertex {
    #[inline]
    pub const fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BinGrid {
    pub bin_size_minutes: u32,
    /// Bins per 360° of longitude.
    pub nx: i32,
    /// Bins per 180° of latitude.
    pub ny: i32,
    /// Bin width in micro-degrees.
    pub width: i32,
    /// Micro-degrees to u16 offset units.
    pub scale: f64,
    /// Smallest nudge that moves a point off a grid line without changing its encoding.
    pub noise: i32,
}

impl BinGrid {
    pub fn from_degrees(degrees: u32) -> Result<Self> {
        if !BIN_SIZES.contains(&degrees) {
            return Err(BuildError::InvalidBinSize(degrees));
        }

        let minutes = degrees * 60;
        let width = (MILL as i64 * minutes as i64 / 60) as i32;
        let scale = MAX_DELTA as f64 / width as f64;

        Ok(Self {
            bin_size_minutes: minutes,
            nx: (360 * 60 / minutes) as i32,
            ny: (180 * 60 / minutes) as i32,
            width,
            scale,
            noise: (1.0 / scale).ceil() as i32,
        })
    }

    #[inline]
    pub fn n_bins(&self) -> usize {
        self.nx as usize * self.ny as usize
    }

    #[inline]
    pub fn last_column(&self) -> i32 {
        self.nx - 1
    }

    /// Column and row (counted from the south pole) containing `v`.
    #[inline]
    pub fn cell_of(&self, v: Vertex) -> (i32, i32) {
        (v.x / self.width, v.y / self.width)
    }

    #[inline]
    pub fn on_x_line(&self, v: Vertex) -> bool {
        v.x % self.width == 0
    }

    #[inline]
    pub fn on_y_line(&self, v: Vertex) -> bool {
        v.y % self.width == 0
    }

    /// Row-major bin index with row 0 the northernmost row.
    #[inline]
    pub fn bin_index(&self, col: i32, row: i32) -> usize {
        debug_assert!((0..self.nx).contains(&col) && (0..self.ny).contains(&row));
        ((self.ny - row - 1) * self.nx + col) as usize
    }

    /// Inverse of [`bin_index`](Self::bin_index).
    #[inline]
    pub fn cell_of_index(&self, bin: usize) -> (i32, i32) {
        let col = bin as i32 % self.nx;
        let row = self.ny - 1 - bin as i32 / self.nx;
        (col, row)
    }

    /// Southwest corner of a cell in micro-degrees.
    #[inline]
    pub fn origin(&self, col: i32, row: i32) -> Vertex {
        Vertex::new(col * self.width, row * self.width)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_unsupported_sizes() {
        for bad in [0, 3, 4, 15, 30, 90] {
            assert!(matches!(
                BinGrid::from_degrees(bad),
                Err(BuildError::InvalidBinSize(b)) if b == bad
            ));
        }
    }

    #[test]
    fn one_degree_geometry() {
        let g = BinGrid::from_degrees(1).unwrap();
        assert_eq!(g.bin_size_minutes, 60);
        assert_eq!((g.nx, g.ny), (360, 180));
        assert_eq!(g.width, MILL);
        assert_eq!(g.noise, 16);
        assert_eq!(g.n_bins(), 64_800);
    }

    #[test]
    fn twenty_degree_geometry() {
        let g = BinGrid::from_degrees(20).unwrap();
        assert_eq!((g.nx, g.ny), (18, 9));
        assert_eq!(g.width, 20 * MILL);
        assert_eq!(g.noise, 306);
        // a nudge of `noise` is at least one offset unit
        assert!(g.noise as f64 * g.scale >= 1.0);
    }

    #[test]
    fn bin_index_counts_rows_from_the_north() {
        let g = BinGrid::from_degrees(20).unwrap();
        assert_eq!(g.bin_index(0, g.ny - 1), 0);
        assert_eq!(g.bin_index(17, 0), g.n_bins() - 1);
        assert_eq!(g.bin_index(1, 4), 73);
        assert_eq!(g.cell_of_index(73), (1, 4));
    }
}

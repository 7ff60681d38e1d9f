//! Per-bin corner classification from a node-level raster.
//!
//! The raster is `(nx + 1) x (ny + 1)` nodes spaced one bin apart, row 0 at
//! 90°N and column 0 at 0°E. File layout (little-endian):
//!
//!   magic b"NLVL", u32 nx, u32 ny, nx * ny f32

use std::fs::File;
use std::io::{self, BufReader, ErrorKind, Read};
use std::path::Path;

use shorebin::{pack_node_levels, MAX_LEVEL};

use crate::error::{BuildError, Result};
use crate::grid::BinGrid;

pub const NODE_MAGIC: [u8; 4] = *b"NLVL";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeGrid {
    pub nx: usize,
    pub ny: usize,
    /// Row-major, north first.
    pub levels: Vec<u8>,
}

impl NodeGrid {
    /// Every node at the same level.
    pub fn uniform(grid: &BinGrid, level: u8) -> Self {
        let (nx, ny) = node_dims(grid);
        Self {
            nx,
            ny,
            levels: vec![level.min(MAX_LEVEL); nx * ny],
        }
    }

    pub fn read_file<P: AsRef<Path>>(path: P, grid: &BinGrid) -> Result<Self> {
        let file = File::open(path)?;
        Self::read_from(BufReader::new(file), grid)
    }

    /// Parse a raster and check it matches `grid`.
    pub fn read_from<R: Read>(mut r: R, grid: &BinGrid) -> Result<Self> {
        let mut head = [0u8; 12];
        read_exact_or_truncated(&mut r, &mut head)?;

        if head[0..4] != NODE_MAGIC {
            return Err(io::Error::new(ErrorKind::InvalidData, "node grid has bad magic").into());
        }
        let found_nx = u32::from_le_bytes([head[4], head[5], head[6], head[7]]) as usize;
        let found_ny = u32::from_le_bytes([head[8], head[9], head[10], head[11]]) as usize;

        let (nx, ny) = node_dims(grid);
        if (found_nx, found_ny) != (nx, ny) {
            return Err(BuildError::NodeGridMismatch {
                expected_nx: nx,
                expected_ny: ny,
                found_nx,
                found_ny,
            });
        }

        let mut raw = vec![0u8; nx * ny * 4];
        read_exact_or_truncated(&mut r, &mut raw)?;

        let levels = raw
            .chunks_exact(4)
            .enumerate()
            .map(|(index, b)| {
                let value = f32::from_le_bytes([b[0], b[1], b[2], b[3]]);
                if value.fract() == 0.0 && (0.0..=MAX_LEVEL as f32).contains(&value) {
                    Ok(value as u8)
                } else {
                    Err(BuildError::BadNodeLevel { index, value })
                }
            })
            .collect::<Result<Vec<u8>>>()?;

        Ok(Self { nx, ny, levels })
    }

    /// Level at node column `i`, row `j` (row 0 = 90°N).
    #[inline]
    pub fn level(&self, i: usize, j: usize) -> u8 {
        self.levels[j * self.nx + i]
    }

    /// Packed `sw, se, ne, nw` corner levels of `bin`.
    pub fn classify(&self, grid: &BinGrid, bin: usize) -> u16 {
        let nx = grid.nx as usize;
        let (col, row) = (bin % nx, bin / nx);

        pack_node_levels([
            self.level(col, row + 1),
            self.level(col + 1, row + 1),
            self.level(col + 1, row),
            self.level(col, row),
        ])
    }

    /// Serialise in the layout [`read_from`](Self::read_from) accepts.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(12 + self.levels.len() * 4);
        out.extend_from_slice(&NODE_MAGIC);
        out.extend_from_slice(&(self.nx as u32).to_le_bytes());
        out.extend_from_slice(&(self.ny as u32).to_le_bytes());
        for &level in &self.levels {
            out.extend_from_slice(&(level as f32).to_le_bytes());
        }
        out
    }
}

#[inline]
fn node_dims(grid: &BinGrid) -> (usize, usize) {
    (grid.nx as usize + 1, grid.ny as usize + 1)
}

fn read_exact_or_truncated<R: Read>(r: &mut R, buf: &mut [u8]) -> Result<()> {
    r.read_exact(buf).map_err(|e| match e.kind() {
        ErrorKind::UnexpectedEof => BuildError::Truncated { what: "node grid" },
        _ => BuildError::Io(e),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use shorebin::unpack_node_levels;

    fn grid20() -> BinGrid {
        BinGrid::from_degrees(20).unwrap()
    }

    #[test]
    fn corners_follow_the_north_first_layout() {
        let grid = grid20();
        let mut nodes = NodeGrid::uniform(&grid, 0);
        // bin 73 is column 1 of the fifth row from the north: nodes 1..=2 x 4..=5
        nodes.levels[4 * nodes.nx + 1] = 4; // nw
        nodes.levels[4 * nodes.nx + 2] = 3; // ne
        nodes.levels[5 * nodes.nx + 2] = 2; // se
        nodes.levels[5 * nodes.nx + 1] = 1; // sw

        let packed = nodes.classify(&grid, 73);
        assert_eq!(packed, (1 << 9) | (2 << 6) | (3 << 3) | 4);
        assert_eq!(unpack_node_levels(packed), [1, 2, 3, 4]);

        // neighbours share nodes
        assert_eq!(unpack_node_levels(nodes.classify(&grid, 72))[1], 1);
        assert_eq!(unpack_node_levels(nodes.classify(&grid, 55))[0], 4);
    }

    #[test]
    fn uniform_land_everywhere() {
        let grid = grid20();
        let nodes = NodeGrid::uniform(&grid, 1);
        assert_eq!((nodes.nx, nodes.ny), (19, 10));
        for bin in 0..grid.n_bins() {
            assert_eq!(nodes.classify(&grid, bin), 0o1111);
        }
    }

    #[test]
    fn reads_back_its_own_bytes() {
        let grid = grid20();
        let mut nodes = NodeGrid::uniform(&grid, 0);
        nodes.levels[7] = 2;

        let parsed = NodeGrid::read_from(nodes.to_bytes().as_slice(), &grid).unwrap();
        assert_eq!(parsed, nodes);
    }

    #[test]
    fn wrong_dimensions_are_rejected() {
        let nodes = NodeGrid::uniform(&grid20(), 1);
        let ten = BinGrid::from_degrees(10).unwrap();

        assert!(matches!(
            NodeGrid::read_from(nodes.to_bytes().as_slice(), &ten),
            Err(BuildError::NodeGridMismatch { expected_nx: 37, expected_ny: 19, found_nx: 19, found_ny: 10 })
        ));
    }

    #[test]
    fn non_level_values_are_rejected() {
        let grid = grid20();
        let mut bytes = NodeGrid::uniform(&grid, 1).to_bytes();
        let at = 12 + 4 * 3;
        bytes[at..at + 4].copy_from_slice(&1.5f32.to_le_bytes());

        assert!(matches!(
            NodeGrid::read_from(bytes.as_slice(), &grid),
            Err(BuildError::BadNodeLevel { index: 3, .. })
        ));

        bytes[at..at + 4].copy_from_slice(&9.0f32.to_le_bytes());
        assert!(matches!(
            NodeGrid::read_from(bytes.as_slice(), &grid),
            Err(BuildError::BadNodeLevel { index: 3, .. })
        ));
    }

    #[test]
    fn short_raster_is_truncated() {
        let grid = grid20();
        let bytes = NodeGrid::uniform(&grid, 1).to_bytes();

        assert!(matches!(
            NodeGrid::read_from(&bytes[..bytes.len() - 2], &grid),
            Err(BuildError::Truncated { what: "node grid" })
        ));
        assert!(matches!(
            NodeGrid::read_from(&b"NLV"[..], &grid),
            Err(BuildError::Truncated { .. })
        ));
        assert!(matches!(
            NodeGrid::read_from(&b"XXXXxxxxxxxx"[..], &grid),
            Err(BuildError::Io(_))
        ));
    }
}

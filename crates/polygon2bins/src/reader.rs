//! Polygon stream reader for GSHHS binary databases.
//!
//! Each polygon is a 44-byte header of eleven big-endian i32 followed by `n`
//! big-endian (x, y) micro-degree pairs:
//!
//!   id, n, flag, west, east, south, north, area, area_full, container, ancestor
//!
//!   flag: level = bits 0-7, version = 8-15, greenwich = 16-17, source = 24,
//!         river = 25, area magnitude = 26-31
//!
//! Areas are km² x 10^magnitude; files predating the magnitude field store
//! 1/10 km².

use std::io::{self, ErrorKind, Read};

use log::{debug, warn};

use crate::error::{BuildError, Result};
use crate::grid::{BinGrid, Vertex, M180, M360, M90};

pub const HEADER_LEN: usize = 44;

/// Header fields the builder uses.
#[derive(Debug, Clone, PartialEq)]
pub struct PolygonHeader {
    pub id: i32,
    pub level: u8,
    /// Containing polygon id, -1 for top level.
    pub parent: i32,
    /// Enclosed area in km².
    pub area: f64,
    /// Area of the full-resolution version of this polygon in km².
    pub area_full: f64,
    /// Double-lined river lake.
    pub river: bool,
    pub n: usize,
}

impl PolygonHeader {
    /// Full-resolution area in 1/10 km², negated for river-lakes.
    pub fn stored_area(&self) -> i32 {
        let tenths = (self.area_full * 10.0).round_ties_even() as i32;
        if self.river {
            -tenths
        } else {
            tenths
        }
    }

    /// 1e6 x this polygon's area relative to its full-resolution area.
    pub fn area_fraction(&self) -> i32 {
        if self.area_full <= 0.0 {
            return 1_000_000;
        }
        (1e6 * self.area / self.area_full).round_ties_even() as i32
    }
}

/// A polygon exactly as stored: raw signed micro-degrees.
#[derive(Debug, Clone, PartialEq)]
pub struct RawPolygon {
    pub header: PolygonHeader,
    pub points: Vec<(i32, i32)>,
}

/// A polygon ready for clipping: normalised, lattice-free and closed.
#[derive(Debug, Clone, PartialEq)]
pub struct Polygon {
    pub header: PolygonHeader,
    pub ring: Vec<Vertex>,
}

/// How often normalisation had to move or close something.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct NudgeCounts {
    pub corner: usize,
    pub lat: usize,
    pub lon: usize,
    pub closed: usize,
}

pub struct PolygonReader<R: Read> {
    inner: R,
    done: bool,
}

impl<R: Read> PolygonReader<R> {
    pub fn new(inner: R) -> Self {
        Self { inner, done: false }
    }

    /// Next polygon, or `None` at a clean end of stream.
    pub fn read_polygon(&mut self) -> Result<Option<RawPolygon>> {
        if self.done {
            return Ok(None);
        }

        let mut head = [0u8; HEADER_LEN];
        if !fill_or_eof(&mut self.inner, &mut head)? {
            self.done = true;
            return Ok(None);
        }

        let field = |i: usize| i32::from_be_bytes([head[4 * i], head[4 * i + 1], head[4 * i + 2], head[4 * i + 3]]);
        let id = field(0);
        let n = field(1);
        let flag = field(2) as u32;
        let area = field(7);
        let area_full = field(8);
        let container = field(9);

        if id < 0 {
            return Err(malformed(id, format!("negative polygon id {}", id)));
        }
        if n <= 0 {
            return Err(malformed(id, format!("vertex count {} is not positive", n)));
        }

        let level = (flag & 0xff) as u8;
        if level > shorebin::MAX_LEVEL {
            return Err(malformed(id, format!("level {} does not fit the format", level)));
        }

        let magnitude = (flag >> 26) & 0x3f;
        let area_scale = if magnitude == 0 {
            10.0
        } else {
            10f64.powi(magnitude as i32)
        };

        let header = PolygonHeader {
            id,
            level,
            parent: container,
            area: area as f64 / area_scale,
            area_full: area_full as f64 / area_scale,
            river: (flag >> 25) & 1 == 1,
            n: n as usize,
        };

        // Grow with the data actually present; `n` comes from an untrusted header.
        let want = header.n.saturating_mul(8);
        let mut block = Vec::new();
        (&mut self.inner)
            .take(want as u64)
            .read_to_end(&mut block)
            .map_err(|e| truncated(e, "polygon vertex stream"))?;
        if block.len() < want {
            return Err(BuildError::Truncated { what: "polygon vertex stream" });
        }

        let points = block
            .chunks_exact(8)
            .map(|c| {
                (
                    i32::from_be_bytes([c[0], c[1], c[2], c[3]]),
                    i32::from_be_bytes([c[4], c[5], c[6], c[7]]),
                )
            })
            .collect();

        Ok(Some(RawPolygon { header, points }))
    }
}

impl<R: Read> Iterator for PolygonReader<R> {
    type Item = Result<RawPolygon>;

    fn next(&mut self) -> Option<Self::Item> {
        match self.read_polygon() {
            Ok(Some(polygon)) => Some(Ok(polygon)),
            Ok(None) => None,
            Err(err) => {
                self.done = true;
                Some(Err(err))
            }
        }
    }
}

/// Fill `buf` completely; `Ok(false)` if the stream ended before the first byte.
fn fill_or_eof<R: Read>(reader: &mut R, buf: &mut [u8]) -> Result<bool> {
    let mut filled = 0;
    while filled < buf.len() {
        match reader.read(&mut buf[filled..]) {
            Ok(0) if filled == 0 => return Ok(false),
            Ok(0) => return Err(BuildError::Truncated { what: "polygon header" }),
            Ok(read) => filled += read,
            Err(e) if e.kind() == ErrorKind::Interrupted => {}
            Err(e) => return Err(e.into()),
        }
    }
    Ok(true)
}

fn truncated(err: io::Error, what: &'static str) -> BuildError {
    if err.kind() == ErrorKind::UnexpectedEof {
        BuildError::Truncated { what }
    } else {
        err.into()
    }
}

#[cold]
fn malformed(polygon: i32, reason: String) -> BuildError {
    BuildError::MalformedPolygon { polygon, reason }
}

impl Polygon {
    /// Shift into non-negative micro-degrees, push vertices off the bin
    /// lattice and close the ring.
    pub fn normalize(raw: RawPolygon, grid: &BinGrid, counts: &mut NudgeCounts) -> Result<Self> {
        let RawPolygon { header, points } = raw;
        let id = header.id;
        let w = grid.width;
        let noise = grid.noise;

        let mut ring = Vec::with_capacity(points.len() + 1);
        for (index, &(x, y)) in points.iter().enumerate() {
            let mut x = x.rem_euclid(M360);
            let mut y = y
                .checked_add(M90)
                .filter(|y| (0..=M180).contains(y))
                .ok_or_else(|| malformed(id, format!("latitude {} out of range at point {}", y, index)))?;

            // Moving off a latitude line must not leave the globe at the north pole.
            let nudge_lat = |y: i32| if y + noise > M180 { y - noise } else { y + noise };

            if x % w == 0 && y % w == 0 {
                y = nudge_lat(y);
                counts.corner += 1;
                warn!("polygon {} went exactly through a bin corner at point {}; moved it", id, index);
            } else if y % w == 0 {
                y = nudge_lat(y);
                counts.lat += 1;
            } else if x % w == 0 && x + noise <= M360 {
                x += noise;
                counts.lon += 1;
            }

            ring.push(Vertex::new(x, y));
        }

        if ring.first() != ring.last() {
            ring.push(ring[0]);
            counts.closed += 1;
            debug!("polygon {} was not closed; appended its first point", id);
        }

        Ok(Self { header, ring })
    }
}

//! Binned shoreline database: a global lat/lon grid of fixed-size bins, each
//! holding the polygon fragments ("segments") that pass through it, with every
//! vertex stored as a u16 offset from the bin's southwest corner.
//!
//! Four files share one prefix (all little-endian):
//!
//! `<prefix>.bin`
//!   00  : u32     n_bins
//!   04  : u32     n_points
//!   08  : u32     bin_size_minutes
//!   0C  : u32     nx_bins            (bins per 360° of longitude)
//!   10  : u32     ny_bins            (bins per 180° of latitude)
//!   14  : u32     n_segments
//!   18  : for each bin, row-major with row 0 northernmost:
//!         u32 first_segment, u16 n_segments, u16 node_levels
//!
//! `<prefix>.seg`
//!   for each segment: i32 polygon_id, u32 info, i32 area, i32 area_fraction,
//!                     u32 first_point
//!   info = n_points << 9 | level << 6 | entry << 3 | exit
//!
//! `<prefix>.pt`
//!   for each point: u16 dx, u16 dy   (0..=65535 spans the bin width)
//!
//! `<prefix>.par`
//!   u32 count, then count x i32 parent polygon id (-1 = top level)
//!
//! node_levels = sw << 9 | se << 6 | ne << 3 | nw, three bits per corner.

use std::ffi::OsString;
use std::fs::File;
use std::io::{self, BufWriter, ErrorKind, Write};
use std::path::{Path, PathBuf};

/// Largest offset inside a bin; the full bin width maps to `0..=MAX_DELTA`.
pub const MAX_DELTA: u16 = u16::MAX;

pub const FILE_HEADER_LEN: usize = 24;
pub const BIN_HEADER_LEN: usize = 8;
pub const SEGMENT_HEADER_LEN: usize = 20;
pub const POINT_LEN: usize = 4;

/// Width of one packed field in `info` and `node_levels`.
pub const FIELD_BITS: u32 = 3;
const FIELD_MASK: u32 = (1 << FIELD_BITS) - 1;

/// Largest level (polygon or node) a 3-bit field can hold.
pub const MAX_LEVEL: u8 = FIELD_MASK as u8;

/// Largest per-segment point count that fits above the packed level/edge bits.
pub const MAX_SEGMENT_POINTS: u32 = (1 << 23) - 1;

/// Parent id used for polygons that are not contained in another polygon.
pub const NO_PARENT: i32 = -1;

/// Which side of a bin a segment crosses when entering or leaving it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(u8)]
pub enum Edge {
    Bottom = 0,
    Right = 1,
    Top = 2,
    Left = 3,
    /// The whole polygon lies inside the bin; no crossing at all.
    Interior = 4,
}

impl Edge {
    #[inline]
    pub fn from_code(code: u8) -> Option<Self> {
        match code {
            0 => Some(Edge::Bottom),
            1 => Some(Edge::Right),
            2 => Some(Edge::Top),
            3 => Some(Edge::Left),
            4 => Some(Edge::Interior),
            _ => None,
        }
    }

    #[inline]
    pub fn code(self) -> u8 {
        self as u8
    }

    /// Force the coordinate lying on this edge to its exact boundary value.
    #[inline]
    pub fn pin(self, point: &mut ShortPair) {
        match self {
            Edge::Bottom => point.dy = 0,
            Edge::Right => point.dx = MAX_DELTA,
            Edge::Top => point.dy = MAX_DELTA,
            Edge::Left => point.dx = 0,
            Edge::Interior => {}
        }
    }

    /// True when `point` sits exactly on this edge (always true for `Interior`).
    #[inline]
    pub fn is_pinned(self, point: ShortPair) -> bool {
        match self {
            Edge::Bottom => point.dy == 0,
            Edge::Right => point.dx == MAX_DELTA,
            Edge::Top => point.dy == MAX_DELTA,
            Edge::Left => point.dx == 0,
            Edge::Interior => true,
        }
    }
}

/// One vertex as stored on disk: offsets from the bin's southwest corner.
#[repr(C)]
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, bytemuck::Pod, bytemuck::Zeroable)]
pub struct ShortPair {
    pub dx: u16,
    pub dy: u16,
}

impl ShortPair {
    #[inline]
    pub const fn new(dx: u16, dy: u16) -> Self {
        Self { dx, dy }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FileHeader {
    pub n_bins: u32,
    pub n_points: u32,
    pub bin_size_minutes: u32,
    pub nx_bins: u32,
    pub ny_bins: u32,
    pub n_segments: u32,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BinHeader {
    pub first_segment: u32,
    pub n_segments: u16,
    pub node_levels: u16,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SegmentHeader {
    pub polygon_id: i32,
    pub info: u32,
    /// Polygon area in 1/10 km²; negative for river-lakes.
    pub area: i32,
    /// 1e6 x (area at this resolution / full-resolution area).
    pub area_fraction: i32,
    pub first_point: u32,
}

impl SegmentHeader {
    #[inline]
    pub fn unpack_info(&self) -> io::Result<SegmentInfo> {
        SegmentInfo::unpack(self.info)
    }
}

/// The fields packed into [`SegmentHeader::info`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SegmentInfo {
    pub n_points: u32,
    pub level: u8,
    pub entry: Edge,
    pub exit: Edge,
}

impl SegmentInfo {
    /// Callers must keep `n_points <= MAX_SEGMENT_POINTS` and `level <= MAX_LEVEL`.
    #[inline]
    pub fn pack(self) -> u32 {
        debug_assert!(self.n_points <= MAX_SEGMENT_POINTS);
        debug_assert!(self.level <= MAX_LEVEL);

        (self.n_points << (3 * FIELD_BITS))
            | ((self.level as u32 & FIELD_MASK) << (2 * FIELD_BITS))
            | ((self.entry.code() as u32) << FIELD_BITS)
            | self.exit.code() as u32
    }

    pub fn unpack(info: u32) -> io::Result<Self> {
        let edge = |code: u32| {
            Edge::from_code(code as u8).ok_or_else(|| bad(&format!("bad edge code {}", code)))
        };

        Ok(Self {
            n_points: info >> (3 * FIELD_BITS),
            level: ((info >> (2 * FIELD_BITS)) & FIELD_MASK) as u8,
            entry: edge((info >> FIELD_BITS) & FIELD_MASK)?,
            exit: edge(info & FIELD_MASK)?,
        })
    }
}

/// Pack the four corner levels of a bin, in order SW, SE, NE, NW.
#[inline]
pub fn pack_node_levels(corners: [u8; 4]) -> u16 {
    corners.iter().fold(0u16, |acc, &level| {
        debug_assert!(level <= MAX_LEVEL);
        (acc << FIELD_BITS) | (level as u16 & FIELD_MASK as u16)
    })
}

#[inline]
pub fn unpack_node_levels(packed: u16) -> [u8; 4] {
    let field = |shift: u32| ((packed >> shift) & FIELD_MASK as u16) as u8;
    [
        field(3 * FIELD_BITS),
        field(2 * FIELD_BITS),
        field(FIELD_BITS),
        field(0),
    ]
}

/// A whole database held in memory, in the exact order it is written.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ShoreDatabase {
    pub header: FileHeader,
    pub bins: Vec<BinHeader>,
    pub segments: Vec<SegmentHeader>,
    pub points: Vec<ShortPair>,
    pub parents: Vec<i32>,
}

impl ShoreDatabase {
    /// Segment headers belonging to bin `bin`.
    pub fn bin_segments(&self, bin: usize) -> &[SegmentHeader] {
        let Some(head) = self.bins.get(bin) else {
            return &[];
        };
        let start = head.first_segment as usize;
        let end = start + head.n_segments as usize;
        self.segments.get(start..end).unwrap_or(&[])
    }

    /// Points of one segment, delimited by its first-point index and count.
    pub fn segment_points(&self, segment: &SegmentHeader) -> io::Result<&[ShortPair]> {
        let info = segment.unpack_info()?;
        let start = segment.first_point as usize;
        let end = start + info.n_points as usize;
        self.points
            .get(start..end)
            .ok_or_else(|| bad("segment points out of range"))
    }

    /// Check header totals, bin/segment/point contiguity and that every
    /// segment starts and ends exactly on its declared edges.
    pub fn validate(&self) -> io::Result<()> {
        let h = &self.header;

        if h.n_bins as u64 != h.nx_bins as u64 * h.ny_bins as u64 {
            return Err(bad("n_bins != nx_bins * ny_bins"));
        }
        if self.bins.len() != h.n_bins as usize {
            return Err(bad("bin header count != n_bins"));
        }
        if self.segments.len() != h.n_segments as usize {
            return Err(bad("segment header count != n_segments"));
        }
        if self.points.len() != h.n_points as usize {
            return Err(bad("point count != n_points"));
        }

        let mut next_segment = 0u64;
        for (index, head) in self.bins.iter().enumerate() {
            if head.first_segment as u64 != next_segment {
                return Err(bad(&format!(
                    "bin {} starts at segment {}, expected {}",
                    index, head.first_segment, next_segment
                )));
            }
            next_segment += head.n_segments as u64;
        }
        if next_segment != h.n_segments as u64 {
            return Err(bad("bin segment counts do not sum to n_segments"));
        }

        let mut next_point = 0u64;
        for (index, segment) in self.segments.iter().enumerate() {
            let info = segment.unpack_info()?;
            if segment.first_point as u64 != next_point {
                return Err(bad(&format!(
                    "segment {} starts at point {}, expected {}",
                    index, segment.first_point, next_point
                )));
            }
            next_point += info.n_points as u64;

            let points = self.segment_points(segment)?;
            let (Some(&first), Some(&last)) = (points.first(), points.last()) else {
                return Err(bad(&format!("segment {} has no points", index)));
            };
            if !info.entry.is_pinned(first) || !info.exit.is_pinned(last) {
                return Err(bad(&format!(
                    "segment {} (polygon {}) does not start/end on its declared edges",
                    index, segment.polygon_id
                )));
            }
        }
        if next_point != h.n_points as u64 {
            return Err(bad("segment point counts do not sum to n_points"));
        }

        Ok(())
    }
}

/// `<prefix>.<ext>`; the prefix may itself contain dots.
pub fn file_path<P: AsRef<Path>>(prefix: P, ext: &str) -> PathBuf {
    let mut name = OsString::from(prefix.as_ref().as_os_str());
    name.push(".");
    name.push(ext);
    PathBuf::from(name)
}

#[inline(always)]
fn need(buf: &[u8], want: usize) -> io::Result<()> {
    if buf.len() < want {
        Err(io::Error::new(ErrorKind::UnexpectedEof, "truncated shoreline database"))
    } else {
        Ok(())
    }
}

#[inline(always)]
fn take<'a>(buf: &mut &'a [u8], n: usize) -> io::Result<&'a [u8]> {
    need(buf, n)?;
    let (head, tail) = buf.split_at(n);
    *buf = tail;
    Ok(head)
}

#[inline(always)]
fn le_u16(buf: &mut &[u8]) -> io::Result<u16> {
    let b = take(buf, 2)?;
    Ok(u16::from_le_bytes([b[0], b[1]]))
}

#[inline(always)]
fn le_u32(buf: &mut &[u8]) -> io::Result<u32> {
    let b = take(buf, 4)?;
    Ok(u32::from_le_bytes([b[0], b[1], b[2], b[3]]))
}

#[inline(always)]
fn le_i32(buf: &mut &[u8]) -> io::Result<i32> {
    let b = take(buf, 4)?;
    Ok(i32::from_le_bytes([b[0], b[1], b[2], b[3]]))
}

#[cold]
fn bad(msg: &str) -> io::Error {
    io::Error::new(ErrorKind::InvalidData, msg)
}

#[inline]
fn no_trailing(rest: &[u8], what: &str) -> io::Result<()> {
    if rest.is_empty() {
        Ok(())
    } else {
        Err(bad(&format!("{} trailing bytes after {}", rest.len(), what)))
    }
}

/// Parse a `.bin` file: global header followed by one header per bin.
pub fn parse_bin_bytes(mut p: &[u8]) -> io::Result<(FileHeader, Vec<BinHeader>)> {
    let header = FileHeader {
        n_bins: le_u32(&mut p)?,
        n_points: le_u32(&mut p)?,
        bin_size_minutes: le_u32(&mut p)?,
        nx_bins: le_u32(&mut p)?,
        ny_bins: le_u32(&mut p)?,
        n_segments: le_u32(&mut p)?,
    };

    let count = header.n_bins as usize;
    let bytes = count
        .checked_mul(BIN_HEADER_LEN)
        .ok_or_else(|| bad("bin table size overflow"))?;
    need(p, bytes)?;

    let mut bins = Vec::with_capacity(count);
    for _ in 0..count {
        bins.push(BinHeader {
            first_segment: le_u32(&mut p)?,
            n_segments: le_u16(&mut p)?,
            node_levels: le_u16(&mut p)?,
        });
    }
    no_trailing(p, "bin headers")?;

    Ok((header, bins))
}

/// Parse a `.seg` file holding exactly `count` segment headers.
pub fn parse_seg_bytes(mut p: &[u8], count: usize) -> io::Result<Vec<SegmentHeader>> {
    let bytes = count
        .checked_mul(SEGMENT_HEADER_LEN)
        .ok_or_else(|| bad("segment table size overflow"))?;
    need(p, bytes)?;

    let mut segments = Vec::with_capacity(count);
    for _ in 0..count {
        segments.push(SegmentHeader {
            polygon_id: le_i32(&mut p)?,
            info: le_u32(&mut p)?,
            area: le_i32(&mut p)?,
            area_fraction: le_i32(&mut p)?,
            first_point: le_u32(&mut p)?,
        });
    }
    no_trailing(p, "segment headers")?;

    Ok(segments)
}

/// Parse a `.pt` file holding exactly `count` points.
pub fn parse_pt_bytes(p: &[u8], count: usize) -> io::Result<Vec<ShortPair>> {
    let bytes = count
        .checked_mul(POINT_LEN)
        .ok_or_else(|| bad("point block size overflow"))?;
    need(p, bytes)?;
    no_trailing(&p[bytes..], "points")?;
    let raw = &p[..bytes];

    #[cfg(target_endian = "little")]
    {
        // Zero-copy view when the buffer happens to be 2-aligned (mmap, most allocators).
        if let Ok(pairs) = bytemuck::try_cast_slice::<u8, ShortPair>(raw) {
            return Ok(pairs.to_vec());
        }
    }

    Ok(raw
        .chunks_exact(POINT_LEN)
        .map(|c| ShortPair::new(u16::from_le_bytes([c[0], c[1]]), u16::from_le_bytes([c[2], c[3]])))
        .collect())
}

/// Parse a `.par` file: count followed by that many parent ids.
pub fn parse_par_bytes(mut p: &[u8]) -> io::Result<Vec<i32>> {
    let count = le_u32(&mut p)? as usize;
    let bytes = count.checked_mul(4).ok_or_else(|| bad("parent table size overflow"))?;
    need(p, bytes)?;

    let mut parents = Vec::with_capacity(count);
    for _ in 0..count {
        parents.push(le_i32(&mut p)?);
    }
    no_trailing(p, "parent ids")?;

    Ok(parents)
}

/// Run `parse` over the bytes of `path`, straight from the mapping.
#[cfg(feature = "mmap")]
fn with_file_bytes<T>(path: &Path, parse: impl FnOnce(&[u8]) -> io::Result<T>) -> io::Result<T> {
    let file = File::open(path)?;
    if file.metadata()?.len() == 0 {
        return parse(&[][..]);
    }
    let map = unsafe { memmap2::MmapOptions::new().map(&file)? };
    parse(&map[..])
}

#[cfg(not(feature = "mmap"))]
fn with_file_bytes<T>(path: &Path, parse: impl FnOnce(&[u8]) -> io::Result<T>) -> io::Result<T> {
    parse(&std::fs::read(path)?[..])
}

/// Read all four files sharing `prefix` back into memory.
pub fn read_files<P: AsRef<Path>>(prefix: P) -> io::Result<ShoreDatabase> {
    let prefix = prefix.as_ref();

    let (header, bins) = with_file_bytes(&file_path(prefix, "bin"), parse_bin_bytes)?;
    let segments = with_file_bytes(&file_path(prefix, "seg"), |p| {
        parse_seg_bytes(p, header.n_segments as usize)
    })?;
    let points = with_file_bytes(&file_path(prefix, "pt"), |p| {
        parse_pt_bytes(p, header.n_points as usize)
    })?;
    let parents = with_file_bytes(&file_path(prefix, "par"), parse_par_bytes)?;

    Ok(ShoreDatabase {
        header,
        bins,
        segments,
        points,
        parents,
    })
}

/// Write all four files sharing `prefix`. Files are created in place; a
/// failure part way leaves them incomplete and the caller must not use them.
pub fn write_files<P: AsRef<Path>>(prefix: P, db: &ShoreDatabase) -> io::Result<()> {
    let prefix = prefix.as_ref();

    let mut par = BufWriter::new(File::create(file_path(prefix, "par"))?);
    write_par(&mut par, &db.parents)?;
    par.flush()?;

    let mut bin = BufWriter::new(File::create(file_path(prefix, "bin"))?);
    write_bin(&mut bin, &db.header, &db.bins)?;
    bin.flush()?;

    let mut seg = BufWriter::new(File::create(file_path(prefix, "seg"))?);
    write_seg(&mut seg, &db.segments)?;
    seg.flush()?;

    let mut pt = BufWriter::new(File::create(file_path(prefix, "pt"))?);
    write_pt(&mut pt, &db.points)?;
    pt.flush()?;

    Ok(())
}

pub fn write_bin<W: Write>(w: &mut W, header: &FileHeader, bins: &[BinHeader]) -> io::Result<()> {
    if bins.len() != header.n_bins as usize {
        return Err(bad("bin header count != n_bins"));
    }

    write_u32(w, header.n_bins)?;
    write_u32(w, header.n_points)?;
    write_u32(w, header.bin_size_minutes)?;
    write_u32(w, header.nx_bins)?;
    write_u32(w, header.ny_bins)?;
    write_u32(w, header.n_segments)?;

    for head in bins {
        write_u32(w, head.first_segment)?;
        write_u16(w, head.n_segments)?;
        write_u16(w, head.node_levels)?;
    }

    Ok(())
}

pub fn write_seg<W: Write>(w: &mut W, segments: &[SegmentHeader]) -> io::Result<()> {
    for segment in segments {
        write_i32(w, segment.polygon_id)?;
        write_u32(w, segment.info)?;
        write_i32(w, segment.area)?;
        write_i32(w, segment.area_fraction)?;
        write_u32(w, segment.first_point)?;
    }

    Ok(())
}

pub fn write_pt<W: Write>(w: &mut W, points: &[ShortPair]) -> io::Result<()> {
    #[cfg(target_endian = "little")]
    {
        w.write_all(bytemuck::cast_slice(points))
    }

    #[cfg(not(target_endian = "little"))]
    {
        for point in points {
            write_u16(w, point.dx)?;
            write_u16(w, point.dy)?;
        }
        Ok(())
    }
}

pub fn write_par<W: Write>(w: &mut W, parents: &[i32]) -> io::Result<()> {
    let count = u32::try_from(parents.len()).map_err(|_| bad("too many parent ids"))?;
    write_u32(w, count)?;

    for &parent in parents {
        write_i32(w, parent)?;
    }

    Ok(())
}

#[inline]
fn write_u16<W: Write>(w: &mut W, v: u16) -> io::Result<()> {
    w.write_all(&v.to_le_bytes())
}

#[inline]
fn write_u32<W: Write>(w: &mut W, v: u32) -> io::Result<()> {
    w.write_all(&v.to_le_bytes())
}

#[inline]
fn write_i32<W: Write>(w: &mut W, v: i32) -> io::Result<()> {
    w.write_all(&v.to_le_bytes())
}

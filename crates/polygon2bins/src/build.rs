//! Assemble a [`ShoreDatabase`] from a polygon stream.
//!
//! Every segment of every polygon is held in memory until the stream ends,
//! so the bin table, segment table and point table can be written with
//! exact totals in one pass. Peak memory therefore grows with the total
//! number of clipped points (about 4 bytes per point plus ~40 bytes per
//! segment), which is a few hundred MB for a full-resolution GSHHS file.

use std::io::Read;
use std::time::{Duration, Instant};

use log::{debug, info};
use shorebin::{BinHeader, FileHeader, SegmentHeader, SegmentInfo, ShoreDatabase, MAX_SEGMENT_POINTS};

use crate::classify::NodeGrid;
use crate::clip::clip_ring;
use crate::error::{BuildError, Result};
use crate::grid::BinGrid;
use crate::pack::pack_polygon;
use crate::reader::{NudgeCounts, Polygon, PolygonReader, RawPolygon};
use crate::table::{BinTable, ParentTable};

/// Counters reported at the end of a build.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BuildStats {
    pub polygons: usize,
    /// Vertices as read, before closing or clipping.
    pub input_points: usize,
    /// Vertices after closing rings and inserting boundary crossings.
    pub clipped_points: usize,
    pub nudges: NudgeCounts,
    /// Polygon edges that skipped over at least one whole bin.
    pub jumps: usize,
    /// Two-point segments entering and leaving through the same side.
    pub dropped_segments: usize,
    pub segments: usize,
    /// Points written to the point table.
    pub points: usize,
}

impl BuildStats {
    /// Output points relative to input points, in percent.
    pub fn growth_percent(&self) -> f64 {
        if self.input_points == 0 {
            return 0.0;
        }
        100.0 * (self.points as f64 - self.input_points as f64) / self.input_points as f64
    }

    pub fn log_summary(&self) {
        info!(
            "{} polygons, {} input points, {} segments, {} output points ({:+.2}% growth)",
            self.polygons,
            self.input_points,
            self.segments,
            self.points,
            self.growth_percent()
        );
        info!(
            "nudged {} corner / {} latitude / {} longitude points, closed {} rings",
            self.nudges.corner, self.nudges.lat, self.nudges.lon, self.nudges.closed
        );
        info!(
            "{} multi-bin jumps, {} degenerate segments dropped",
            self.jumps, self.dropped_segments
        );
    }
}

/// Collects segments polygon by polygon; [`finish`](Self::finish) lays
/// them out as a database.
pub struct Builder<'g> {
    grid: &'g BinGrid,
    bins: BinTable,
    parents: ParentTable,
    stats: BuildStats,
}

impl<'g> Builder<'g> {
    pub fn new(grid: &'g BinGrid) -> Self {
        Self {
            grid,
            bins: BinTable::new(grid.n_bins()),
            parents: ParentTable::new(),
            stats: BuildStats::default(),
        }
    }

    #[inline]
    pub fn stats(&self) -> &BuildStats {
        &self.stats
    }

    /// Normalise, clip and pack one polygon into the bin table.
    pub fn add_polygon(&mut self, raw: RawPolygon) -> Result<()> {
        let id = raw.header.id;
        self.parents.insert(id, raw.header.parent)?;
        self.stats.polygons += 1;
        self.stats.input_points += raw.points.len();

        let polygon = Polygon::normalize(raw, self.grid, &mut self.stats.nudges)?;
        let clipped = clip_ring(self.grid, &polygon.ring);
        self.stats.jumps += clipped.jumps;
        self.stats.clipped_points += clipped.points.len();

        let packed = pack_polygon(self.grid, &polygon.header, &clipped)?;
        debug!(
            "polygon {} level {}: {} points, {} segments",
            id,
            polygon.header.level,
            clipped.points.len(),
            packed.len()
        );
        for p in packed {
            self.bins.push(p.bin, p.segment);
        }

        Ok(())
    }

    /// Sort and filter every bin, classify it from `nodes` and flatten
    /// everything into the on-disk layout.
    pub fn finish(self, nodes: &NodeGrid) -> Result<(ShoreDatabase, BuildStats)> {
        let Self {
            grid,
            mut bins,
            parents,
            mut stats,
        } = self;

        let (nx, ny) = (grid.nx as usize + 1, grid.ny as usize + 1);
        if (nodes.nx, nodes.ny) != (nx, ny) {
            return Err(BuildError::NodeGridMismatch {
                expected_nx: nx,
                expected_ny: ny,
                found_nx: nodes.nx,
                found_ny: nodes.ny,
            });
        }

        stats.dropped_segments = bins.finalize();
        let parents = parents.finish()?;

        let n_bins = bins.n_bins();
        let mut bin_headers = Vec::with_capacity(n_bins);
        let mut segments = Vec::with_capacity(bins.n_segments());
        let mut points = Vec::new();

        for (bin, list) in bins.into_bins().into_iter().enumerate() {
            let n_segments = u16::try_from(list.len()).map_err(|_| BuildError::TooManySegments {
                bin,
                count: list.len(),
            })?;
            bin_headers.push(BinHeader {
                first_segment: total_u32("segment", segments.len())?,
                n_segments,
                node_levels: nodes.classify(grid, bin),
            });

            for segment in list {
                let n_points = u32::try_from(segment.points.len())
                    .ok()
                    .filter(|&n| n <= MAX_SEGMENT_POINTS)
                    .ok_or(BuildError::SegmentTooLong {
                        polygon: segment.polygon_id,
                        points: segment.points.len(),
                    })?;
                let info = SegmentInfo {
                    n_points,
                    level: segment.level,
                    entry: segment.entry,
                    exit: segment.exit,
                };

                segments.push(SegmentHeader {
                    polygon_id: segment.polygon_id,
                    info: info.pack(),
                    area: segment.area,
                    area_fraction: segment.area_fraction,
                    first_point: total_u32("point", points.len())?,
                });
                points.extend_from_slice(&segment.points);
            }
        }

        let header = FileHeader {
            n_bins: total_u32("bin", n_bins)?,
            n_points: total_u32("point", points.len())?,
            bin_size_minutes: grid.bin_size_minutes,
            nx_bins: grid.nx as u32,
            ny_bins: grid.ny as u32,
            n_segments: total_u32("segment", segments.len())?,
        };

        stats.segments = segments.len();
        stats.points = points.len();

        let db = ShoreDatabase {
            header,
            bins: bin_headers,
            segments,
            points,
            parents,
        };
        db.validate()?;

        Ok((db, stats))
    }
}

#[inline]
fn total_u32(what: &'static str, count: usize) -> Result<u32> {
    u32::try_from(count).map_err(|_| BuildError::TotalOverflow { what, count })
}

/// Rate-limited progress logging: every `every` items, at most every 200 ms.
pub(crate) struct Tick {
    start: Instant,
    last: Instant,
    every: usize,
}

impl Tick {
    #[inline]
    pub(crate) fn new(every: usize) -> Self {
        let now = Instant::now();
        Self {
            start: now,
            last: now,
            every: every.max(1),
        }
    }

    #[inline]
    pub(crate) fn should(&mut self, count: usize) -> bool {
        const MIN_INTERVAL: Duration = Duration::from_millis(200);
        count % self.every == 0 && self.last.elapsed() >= MIN_INTERVAL
    }

    #[inline]
    pub(crate) fn bump(&mut self) {
        self.last = Instant::now();
    }

    /// Thousand items per second since start.
    #[inline]
    pub(crate) fn rate_kps(&self, count: usize) -> f64 {
        let elapsed = self.start.elapsed().as_secs_f64().max(1e-9);
        count as f64 / 1_000.0 / elapsed
    }
}

/// Read every polygon from `source` and build the database in one go.
pub fn build_database<R: Read>(
    source: R,
    grid: &BinGrid,
    nodes: &NodeGrid,
    log_every: usize,
) -> Result<(ShoreDatabase, BuildStats)> {
    let mut builder = Builder::new(grid);
    let mut tick = Tick::new(log_every);

    for polygon in PolygonReader::new(source) {
        builder.add_polygon(polygon?)?;

        let count = builder.stats().polygons;
        if tick.should(count) {
            info!(
                "{} polygons, {} points so far ({:.1} k polygons/s)",
                count,
                builder.stats().clipped_points,
                tick.rate_kps(count)
            );
            tick.bump();
        }
    }

    builder.finish(nodes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reader::tests::gshhs_bytes;
    use shorebin::{unpack_node_levels, Edge};

    fn grid20() -> BinGrid {
        BinGrid::from_degrees(20).unwrap()
    }

    fn build(bytes: &[u8]) -> Result<(ShoreDatabase, BuildStats)> {
        let grid = grid20();
        build_database(bytes, &grid, &NodeGrid::uniform(&grid, 0), 1000)
    }

    fn edges(db: &ShoreDatabase, bin: usize) -> Vec<(Edge, Edge)> {
        db.bin_segments(bin)
            .iter()
            .map(|s| {
                let info = s.unpack_info().unwrap();
                (info.entry, info.exit)
            })
            .collect()
    }

    #[test]
    fn island_inside_one_bin() {
        let square: &[(f64, f64)] = &[(1.0, 1.0), (3.0, 1.0), (3.0, 3.0), (1.0, 3.0), (1.0, 1.0)];
        let (db, stats) = build(&gshhs_bytes(&[(0, 1, -1, false, square)])).unwrap();

        assert_eq!(db.header.n_bins, 162);
        assert_eq!(db.header.bin_size_minutes, 1200);
        assert_eq!((db.header.n_segments, db.header.n_points), (1, 5));
        assert_eq!(db.bins[72].n_segments, 1);
        assert_eq!(edges(&db, 72), vec![(Edge::Interior, Edge::Interior)]);
        assert_eq!(db.parents, vec![-1]);

        let seg = &db.segments[0];
        assert_eq!(seg.area, 2_468);
        assert_eq!(seg.area_fraction, 500_000);
        assert_eq!(stats.growth_percent(), 0.0);
    }

    #[test]
    fn rectangle_over_a_meridian_lands_in_two_bins() {
        let rect: &[(f64, f64)] = &[(11.0, 1.0), (29.0, 1.0), (29.0, 3.0), (11.0, 3.0), (11.0, 1.0)];
        let (db, stats) = build(&gshhs_bytes(&[(0, 1, -1, false, rect)])).unwrap();

        assert_eq!(db.header.n_segments, 2);
        assert_eq!(db.header.n_points, 8);
        assert_eq!(edges(&db, 72), vec![(Edge::Right, Edge::Right)]);
        assert_eq!(edges(&db, 73), vec![(Edge::Left, Edge::Left)]);
        // bin 72 precedes bin 73 in the segment table
        assert_eq!(db.bins[72].first_segment, 0);
        assert_eq!(db.bins[73].first_segment, 1);
        assert_eq!(db.segments[1].first_point, 4);
        assert_eq!(stats.segments, 2);
        assert_eq!(stats.points, 8);
    }

    #[test]
    fn segments_in_a_bin_sort_by_level() {
        let lake: &[(f64, f64)] = &[(2.0, 2.0), (2.5, 2.0), (2.5, 2.5), (2.0, 2.0)];
        let land: &[(f64, f64)] = &[(1.0, 1.0), (3.0, 1.0), (3.0, 3.0), (1.0, 3.0), (1.0, 1.0)];
        let (db, _) = build(&gshhs_bytes(&[(0, 2, 1, true, lake), (1, 1, -1, false, land)])).unwrap();

        let segs = db.bin_segments(72);
        assert_eq!(segs.len(), 2);
        assert_eq!(segs[0].polygon_id, 1);
        assert_eq!(segs[1].polygon_id, 0);
        assert!(segs[1].area < 0);
        assert_eq!(db.parents, vec![1, -1]);
    }

    #[test]
    fn classification_fills_every_bin() {
        let grid = grid20();
        let mut nodes = NodeGrid::uniform(&grid, 1);
        nodes.levels[0] = 3;

        let square: &[(f64, f64)] = &[(1.0, 1.0), (3.0, 1.0), (3.0, 3.0), (1.0, 1.0)];
        let bytes = gshhs_bytes(&[(0, 1, -1, false, square)]);
        let (db, _) = build_database(bytes.as_slice(), &grid, &nodes, 10).unwrap();

        // node 0 is the northwest corner of bin 0
        assert_eq!(unpack_node_levels(db.bins[0].node_levels), [1, 1, 1, 3]);
        assert!(db.bins[1..].iter().all(|b| b.node_levels == 0o1111));
    }

    #[test]
    fn missing_polygon_id_is_fatal() {
        let square: &[(f64, f64)] = &[(1.0, 1.0), (3.0, 1.0), (3.0, 3.0), (1.0, 1.0)];
        let bytes = gshhs_bytes(&[(0, 1, -1, false, square), (2, 1, -1, false, square)]);

        assert!(matches!(build(&bytes), Err(BuildError::MissingParent(1))));
    }

    #[test]
    fn duplicate_polygon_id_is_fatal() {
        let square: &[(f64, f64)] = &[(1.0, 1.0), (3.0, 1.0), (3.0, 3.0), (1.0, 1.0)];
        let bytes = gshhs_bytes(&[(0, 1, -1, false, square), (0, 1, -1, false, square)]);

        assert!(matches!(build(&bytes), Err(BuildError::DuplicatePolygon(0))));
    }

    #[test]
    fn nudges_and_closing_are_counted() {
        // on the 0° meridian and the -10° parallel, left open
        let open: &[(f64, f64)] = &[(0.0, 1.0), (3.0, -10.0), (3.0, 3.0)];
        let (db, stats) = build(&gshhs_bytes(&[(0, 1, -1, false, open)])).unwrap();

        assert_eq!(stats.nudges.lon, 1);
        assert_eq!(stats.nudges.lat, 1);
        assert_eq!(stats.nudges.closed, 1);
        assert_eq!(stats.input_points, 3);
        assert_eq!(db.header.n_points, 4);
        db.validate().unwrap();
    }

    #[test]
    fn mismatched_node_grid_is_rejected_at_finish() {
        let grid = grid20();
        let ten = BinGrid::from_degrees(10).unwrap();
        let builder = Builder::new(&grid);

        assert!(matches!(
            builder.finish(&NodeGrid::uniform(&ten, 0)),
            Err(BuildError::NodeGridMismatch { .. })
        ));
    }

    #[test]
    fn empty_source_yields_an_empty_database() {
        let (db, stats) = build(&[]).unwrap();

        assert_eq!(db.header.n_bins, 162);
        assert_eq!(db.header.n_segments, 0);
        assert!(db.parents.is_empty());
        assert_eq!(stats, BuildStats::default());
    }

    #[test]
    fn tick_respects_cadence() {
        let mut tick = Tick::new(0);
        assert!(!tick.should(1));
        tick.last -= Duration::from_secs(1);
        assert!(tick.should(1));
        tick.bump();
        assert!(!tick.should(2));
    }
}

//! In-memory accumulators for the build: segments per bin, parent per polygon.

use shorebin::NO_PARENT;

use crate::error::{BuildError, Result};
use crate::pack::Segment;

/// Segments collected per bin, in arrival order.
#[derive(Debug, Clone)]
pub struct BinTable {
    bins: Vec<Vec<Segment>>,
}

impl BinTable {
    pub fn new(n_bins: usize) -> Self {
        Self {
            bins: vec![Vec::new(); n_bins],
        }
    }

    #[inline]
    pub fn push(&mut self, bin: usize, segment: Segment) {
        self.bins[bin].push(segment);
    }

    #[inline]
    pub fn n_bins(&self) -> usize {
        self.bins.len()
    }

    pub fn segments(&self, bin: usize) -> &[Segment] {
        &self.bins[bin]
    }

    pub fn n_segments(&self) -> usize {
        self.bins.iter().map(Vec::len).sum()
    }

    /// Put every bin in output order (level ascending, longer first) and
    /// drop grazing segments. Returns how many were dropped.
    pub fn finalize(&mut self) -> usize {
        let mut dropped = 0;
        for segments in &mut self.bins {
            let before = segments.len();
            segments.retain(|s| !s.is_degenerate());
            dropped += before - segments.len();
            segments.sort_by(|a, b| {
                a.level
                    .cmp(&b.level)
                    .then_with(|| b.points.len().cmp(&a.points.len()))
            });
        }
        dropped
    }

    pub fn into_bins(self) -> Vec<Vec<Segment>> {
        self.bins
    }
}

const MISSING: i32 = -2;

/// Parent id indexed by polygon id.
#[derive(Debug, Clone, Default)]
pub struct ParentTable {
    parents: Vec<i32>,
}

impl ParentTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record `parent` for polygon `id`. Ids must be non-negative and unique.
    pub fn insert(&mut self, id: i32, parent: i32) -> Result<()> {
        let index = usize::try_from(id).map_err(|_| BuildError::MalformedPolygon {
            polygon: id,
            reason: "negative polygon id".into(),
        })?;
        if index >= self.parents.len() {
            self.parents.resize(index + 1, MISSING);
        }
        if self.parents[index] != MISSING {
            return Err(BuildError::DuplicatePolygon(id));
        }
        self.parents[index] = if parent < 0 { NO_PARENT } else { parent };
        Ok(())
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.parents.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.parents.is_empty()
    }

    /// Dense parent list for ids `0..len`; every id must have been seen.
    pub fn finish(self) -> Result<Vec<i32>> {
        if let Some(missing) = self.parents.iter().position(|&p| p == MISSING) {
            return Err(BuildError::MissingParent(missing));
        }
        Ok(self.parents)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shorebin::{Edge, ShortPair};

    fn segment(id: i32, level: u8, n: usize, entry: Edge, exit: Edge) -> Segment {
        Segment {
            polygon_id: id,
            level,
            area: 0,
            area_fraction: 0,
            entry,
            exit,
            points: vec![ShortPair::new(0, 0); n],
        }
    }

    #[test]
    fn finalize_orders_by_level_then_length() {
        let mut table = BinTable::new(2);
        table.push(1, segment(1, 2, 5, Edge::Left, Edge::Top));
        table.push(1, segment(2, 1, 3, Edge::Left, Edge::Top));
        table.push(1, segment(3, 1, 9, Edge::Left, Edge::Top));
        table.push(1, segment(4, 1, 3, Edge::Bottom, Edge::Top));

        assert_eq!(table.finalize(), 0);

        let ids: Vec<i32> = table.segments(1).iter().map(|s| s.polygon_id).collect();
        // equal keys keep arrival order
        assert_eq!(ids, vec![3, 2, 4, 1]);
        assert!(table.segments(0).is_empty());
    }

    #[test]
    fn finalize_drops_grazing_segments() {
        let mut table = BinTable::new(1);
        table.push(0, segment(1, 1, 2, Edge::Top, Edge::Top));
        table.push(0, segment(2, 1, 2, Edge::Top, Edge::Left));
        table.push(0, segment(3, 1, 3, Edge::Top, Edge::Top));

        assert_eq!(table.finalize(), 1);
        assert_eq!(table.n_segments(), 2);
    }

    #[test]
    fn parents_are_dense_and_unique() {
        let mut parents = ParentTable::new();
        parents.insert(1, 0).unwrap();
        parents.insert(0, -1).unwrap();
        parents.insert(2, 0).unwrap();

        assert!(matches!(parents.insert(1, 0), Err(BuildError::DuplicatePolygon(1))));
        assert_eq!(parents.finish().unwrap(), vec![-1, 0, 0]);
    }

    #[test]
    fn gap_in_ids_is_a_missing_parent() {
        let mut parents = ParentTable::new();
        parents.insert(0, -1).unwrap();
        parents.insert(3, 0).unwrap();

        assert!(matches!(parents.finish(), Err(BuildError::MissingParent(1))));
    }

    #[test]
    fn negative_id_is_malformed() {
        let mut parents = ParentTable::new();
        assert!(matches!(
            parents.insert(-4, -1),
            Err(BuildError::MalformedPolygon { polygon: -4, .. })
        ));
    }
}

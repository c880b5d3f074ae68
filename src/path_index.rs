//! Nearest-waypoint queries over a fixed course path.
//!
//! The query answered here is deliberately simple: which waypoint of the
//! path is closest to a position. Ties resolve to the lowest index so that
//! the progress tracker never jumps ahead on an ambiguous fix.
//!
//! Short paths (the common case, tens to a few hundred waypoints) are
//! scanned linearly with exact haversine distances. Long paths get an R-tree
//! over locally projected coordinates.

use rstar::{PointDistance, RTree, RTreeObject, AABB};

use crate::geo_utils::{haversine_distance, LocalProjection};
use crate::{CoursePath, GpsPoint};

/// Paths with at least this many waypoints are indexed with an R-tree.
///
/// The R-tree ranks waypoints by planar distance in an equirectangular
/// projection centred on the path, not by great-circle distance. Results can
/// differ from the linear scan when candidates are nearly equidistant, and
/// the projection is wrong for paths that cross the antimeridian.
pub const SPATIAL_INDEX_MIN_POINTS: usize = 1024;

/// A waypoint with its path index for R-tree queries
#[derive(Debug, Clone, Copy)]
pub struct IndexedPoint {
    pub idx: usize,
    pub xy: [f64; 2],
}

impl RTreeObject for IndexedPoint {
    type Envelope = AABB<[f64; 2]>;

    fn envelope(&self) -> Self::Envelope {
        AABB::from_point(self.xy)
    }
}

impl PointDistance for IndexedPoint {
    fn distance_2(&self, point: &[f64; 2]) -> f64 {
        let dx = self.xy[0] - point[0];
        let dy = self.xy[1] - point[1];
        dx * dx + dy * dy
    }
}

/// Index of the waypoint nearest to `position` by great-circle distance.
///
/// Ties resolve to the lowest index. Returns 0 for an empty slice; callers
/// are expected to reject degenerate paths before querying.
pub fn nearest_index(position: &GpsPoint, path: &[GpsPoint]) -> usize {
    let mut best_idx = 0;
    let mut best_dist = f64::INFINITY;
    for (i, waypoint) in path.iter().enumerate() {
        let d = haversine_distance(position, waypoint);
        // Strict comparison keeps the first (lowest) index on ties
        if d < best_dist {
            best_dist = d;
            best_idx = i;
        }
    }
    best_idx
}

/// Nearest-waypoint index built once per course.
pub struct PathIndex {
    path: CoursePath,
    spatial: Option<(LocalProjection, RTree<IndexedPoint>)>,
}

impl PathIndex {
    /// Build an index for a course path.
    pub fn new(path: CoursePath) -> Self {
        let spatial = if path.len() >= SPATIAL_INDEX_MIN_POINTS {
            let center = path.bounds().center();
            let projection = LocalProjection::new(center.latitude);
            let indexed: Vec<IndexedPoint> = path
                .points()
                .iter()
                .enumerate()
                .map(|(idx, p)| IndexedPoint {
                    idx,
                    xy: projection.project(p),
                })
                .collect();
            log::debug!(
                "[PathIndex] Built R-tree over {} waypoints",
                indexed.len()
            );
            Some((projection, RTree::bulk_load(indexed)))
        } else {
            None
        };

        Self { path, spatial }
    }

    /// The indexed path.
    pub fn path(&self) -> &CoursePath {
        &self.path
    }

    /// Number of waypoints.
    pub fn len(&self) -> usize {
        self.path.len()
    }

    /// Always false: a `CoursePath` holds at least two waypoints.
    pub fn is_empty(&self) -> bool {
        self.path.is_empty()
    }

    /// Whether queries go through the R-tree.
    pub fn is_spatial(&self) -> bool {
        self.spatial.is_some()
    }

    /// Index of the waypoint nearest to `position`, lowest index on ties.
    pub fn nearest_index(&self, position: &GpsPoint) -> usize {
        match &self.spatial {
            Some((projection, tree)) => {
                let query = projection.project(position);
                let mut candidates = tree.nearest_neighbor_iter_with_distance_2(&query);
                let Some((first, best_d2)) = candidates.next() else {
                    return 0;
                };
                let mut best_idx = first.idx;
                for (candidate, d2) in candidates {
                    if d2 > best_d2 {
                        break;
                    }
                    best_idx = best_idx.min(candidate.idx);
                }
                best_idx
            }
            None => nearest_index(position, self.path.points()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scenario_path() -> CoursePath {
        CoursePath::new(vec![
            GpsPoint::new(0.0, 0.0),
            GpsPoint::new(0.0, 0.001),
            GpsPoint::new(0.0, 0.002),
        ])
        .unwrap()
    }

    fn long_path(n: usize) -> CoursePath {
        let points = (0..n)
            .map(|i| GpsPoint::new(33.3339 + i as f64 * 0.0001, 126.2561))
            .collect();
        CoursePath::new(points).unwrap()
    }

    #[test]
    fn test_nearest_index_on_waypoint() {
        let index = PathIndex::new(scenario_path());
        assert_eq!(index.nearest_index(&GpsPoint::new(0.0, 0.001)), 1);
        assert_eq!(index.nearest_index(&GpsPoint::new(0.0, 0.0)), 0);
        assert_eq!(index.nearest_index(&GpsPoint::new(0.0, 0.002)), 2);
    }

    #[test]
    fn test_nearest_index_off_path() {
        let index = PathIndex::new(scenario_path());
        // Slightly north of the middle waypoint, nearer to it than to either end
        assert_eq!(index.nearest_index(&GpsPoint::new(0.0003, 0.0011)), 1);
        // Far beyond the end
        assert_eq!(index.nearest_index(&GpsPoint::new(0.0, 0.5)), 2);
    }

    #[test]
    fn test_ties_resolve_to_lowest_index() {
        // Out-and-back path: waypoint 0 and waypoint 2 coincide
        let path = vec![
            GpsPoint::new(0.0, 0.0),
            GpsPoint::new(0.0, 0.001),
            GpsPoint::new(0.0, 0.0),
        ];
        assert_eq!(nearest_index(&GpsPoint::new(0.0, 0.0), &path), 0);

        // Exactly halfway between two waypoints
        let path = vec![GpsPoint::new(0.0, 0.0), GpsPoint::new(0.0, 0.002)];
        assert_eq!(nearest_index(&GpsPoint::new(0.0, 0.001), &path), 0);
    }

    #[test]
    fn test_short_path_uses_linear_scan() {
        let index = PathIndex::new(long_path(SPATIAL_INDEX_MIN_POINTS - 1));
        assert!(!index.is_spatial());
    }

    #[test]
    fn test_spatial_index_matches_linear_scan() {
        let path = long_path(SPATIAL_INDEX_MIN_POINTS + 500);
        let index = PathIndex::new(path.clone());
        assert!(index.is_spatial());

        for k in [0, 1, 17, 600, 1023, SPATIAL_INDEX_MIN_POINTS + 499] {
            let waypoint = path.points()[k];
            assert_eq!(index.nearest_index(&waypoint), k);
        }

        for i in 0..50 {
            let query = GpsPoint::new(33.3339 + i as f64 * 0.0031 + 0.00002, 126.25612);
            assert_eq!(
                index.nearest_index(&query),
                nearest_index(&query, path.points())
            );
        }
    }

    #[test]
    fn test_spatial_ties_resolve_to_lowest_index() {
        // Out-and-back long path: second half retraces the first
        let n = SPATIAL_INDEX_MIN_POINTS;
        let mut points: Vec<GpsPoint> = (0..n)
            .map(|i| GpsPoint::new(33.0 + i as f64 * 0.0001, 126.0))
            .collect();
        let back: Vec<GpsPoint> = points.iter().rev().cloned().collect();
        points.extend(back);
        let path = CoursePath::new(points).unwrap();
        let index = PathIndex::new(path.clone());
        assert!(index.is_spatial());

        let query = path.points()[10];
        assert_eq!(index.nearest_index(&query), 10);
    }
}

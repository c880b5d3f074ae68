//! Monotonic progress along a course path.
//!
//! The tracker keeps the highest waypoint index reached so far. A fix that
//! makes an earlier waypoint look nearest (GPS noise, a doubled-back step)
//! leaves the pointer where it is, so the rendered traveled/remaining split
//! never flickers backward.

use serde::{Deserialize, Serialize};

use crate::path_index::PathIndex;
use crate::{CoursePath, GpsPoint};

/// Emitted whenever the progress pointer advances.
///
/// Both segments contain the waypoint at `index` so the two polylines join.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProgressUpdate {
    /// New progress index
    pub index: usize,
    /// Waypoints `0..=index`
    pub done_segment: Vec<GpsPoint>,
    /// Waypoints `index..N`
    pub remaining_segment: Vec<GpsPoint>,
}

/// Progress pointer over one course path.
pub struct ProgressTracker {
    index: PathIndex,
    last_index: usize,
}

impl ProgressTracker {
    /// Create a tracker starting at waypoint 0.
    pub fn new(path: CoursePath) -> Self {
        Self::from_index(PathIndex::new(path))
    }

    /// Create a tracker over an already built index.
    pub fn from_index(index: PathIndex) -> Self {
        Self {
            index,
            last_index: 0,
        }
    }

    /// Current progress index.
    pub fn last_index(&self) -> usize {
        self.last_index
    }

    pub fn path(&self) -> &CoursePath {
        self.index.path()
    }

    /// True once the last waypoint has been reached. The tracker keeps
    /// accepting fixes; ending the run is the caller's decision.
    pub fn is_complete(&self) -> bool {
        self.last_index + 1 >= self.index.len()
    }

    /// Fraction of waypoints passed, in `[0, 1]`.
    pub fn fraction(&self) -> f64 {
        let last = self.index.len().saturating_sub(1);
        if last == 0 {
            return 0.0;
        }
        self.last_index as f64 / last as f64
    }

    /// Feed a position. Returns an update only when progress advanced.
    pub fn on_position(&mut self, position: &GpsPoint) -> Option<ProgressUpdate> {
        let candidate = self.index.nearest_index(position);
        if candidate <= self.last_index {
            return None;
        }

        log::debug!(
            "[ProgressTracker] Advanced {} -> {} of {}",
            self.last_index,
            candidate,
            self.index.len()
        );
        self.last_index = candidate;
        Some(self.current_split())
    }

    /// The traveled/remaining split at the current index.
    pub fn current_split(&self) -> ProgressUpdate {
        let points = self.index.path().points();
        ProgressUpdate {
            index: self.last_index,
            done_segment: points[..=self.last_index].to_vec(),
            remaining_segment: points[self.last_index..].to_vec(),
        }
    }

    /// Return to waypoint 0 (new session on the same course).
    pub fn reset(&mut self) {
        self.last_index = 0;
    }
}

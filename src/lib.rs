//! # Course Tracker
//!
//! Live progress and workout metrics for guided running courses.
//!
//! This library provides:
//! - Nearest-waypoint progress along a fixed course path (monotonic)
//! - Distance, elapsed time, pace and calorie accumulation from GPS fixes
//! - One-shot arrival detection for points of interest
//! - A session object owning all per-run state, plus an async runner that
//!   drives it from a location stream and a 1 Hz timer
//!
//! ## Features
//!
//! - **`runtime`** - Tokio-driven session runner (default)
//! - **`http`** - Pedestrian route client for the routing proxy
//! - **`full`** - Enable all features
//!
//! ## Quick Start
//!
//! ```rust
//! use course_tracker::{Fix, GpsPoint, Poi, RunSession, SessionEvent, TrackerConfig};
//!
//! let path = vec![
//!     GpsPoint::new(33.3339, 126.2561),
//!     GpsPoint::new(33.3349, 126.2561),
//!     GpsPoint::new(33.3359, 126.2561),
//! ];
//! let pois = vec![Poi::new("전망대", 33.3359, 126.2561)];
//!
//! let mut session = RunSession::new(TrackerConfig::default());
//! session.load_course(path, pois).unwrap();
//! session.start().unwrap();
//!
//! for event in session.on_fix(&Fix::new(33.3359, 126.2561, 0)) {
//!     if let SessionEvent::Arrived(arrival) = event {
//!         println!("Arrived at {}", arrival.poi_name);
//!     }
//! }
//! let summary = session.stop().unwrap();
//! assert_eq!(summary.visited, vec!["전망대".to_string()]);
//! ```

use serde::{Deserialize, Serialize};

// Unified error handling
pub mod error;
pub use error::{OptionExt, Result, TrackerError};

// Geographic utilities (distance, bounds, projection)
pub mod geo_utils;

// Nearest-waypoint lookup over a course path
pub mod path_index;
pub use path_index::{nearest_index, PathIndex};

// Monotonic progress along the path
pub mod progress;
pub use progress::{ProgressTracker, ProgressUpdate};

// Distance/time/pace/calorie accumulation
pub mod metrics;
pub use metrics::{
    FixOutcome, Metrics, MetricsAccumulator, MetricsConfig, MetricsDisplay, OutlierPolicy,
};

// POI arrival detection
pub mod proximity;
pub use proximity::{Arrival, Poi, ProximityWatcher};

// Course ids, bundles and route providers
pub mod course;
pub use course::{
    check_start, Course, CourseBundle, CourseCatalog, CourseId, RouteProvider, StartCheck,
};

// Tracker configuration
pub mod config;
pub use config::{ProximityConfig, TrackerConfig};

// Per-run session state
pub mod session;
pub use session::{
    LocationError, LocationStatus, LocationUpdate, RunSession, RunSummary, SessionEvent,
    SessionState,
};

// Async session driver (location stream + timer)
#[cfg(feature = "runtime")]
pub mod runner;
#[cfg(feature = "runtime")]
pub use runner::{spawn_session, SessionHandle};

// HTTP client for pedestrian routes
#[cfg(feature = "http")]
pub mod http;
#[cfg(feature = "http")]
pub use http::{PedestrianRoute, PedestrianRouteClient, RouteSummary};

// ============================================================================
// Core Types
// ============================================================================

/// A GPS coordinate with latitude and longitude.
///
/// # Example
/// ```
/// use course_tracker::GpsPoint;
/// let point = GpsPoint::new(33.4996, 126.5312); // Jeju City
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GpsPoint {
    pub latitude: f64,
    pub longitude: f64,
}

impl GpsPoint {
    /// Create a new GPS point.
    pub fn new(latitude: f64, longitude: f64) -> Self {
        Self {
            latitude,
            longitude,
        }
    }

    /// Check if the point has valid coordinates.
    pub fn is_valid(&self) -> bool {
        self.latitude.is_finite()
            && self.longitude.is_finite()
            && self.latitude >= -90.0
            && self.latitude <= 90.0
            && self.longitude >= -180.0
            && self.longitude <= 180.0
    }
}

/// Bounding box for a course.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Bounds {
    pub min_lat: f64,
    pub max_lat: f64,
    pub min_lng: f64,
    pub max_lng: f64,
}

impl Bounds {
    /// Create bounds from GPS points.
    pub fn from_points(points: &[GpsPoint]) -> Option<Self> {
        if points.is_empty() {
            return None;
        }
        let mut min_lat = f64::MAX;
        let mut max_lat = f64::MIN;
        let mut min_lng = f64::MAX;
        let mut max_lng = f64::MIN;

        for p in points {
            min_lat = min_lat.min(p.latitude);
            max_lat = max_lat.max(p.latitude);
            min_lng = min_lng.min(p.longitude);
            max_lng = max_lng.max(p.longitude);
        }

        Some(Self {
            min_lat,
            max_lat,
            min_lng,
            max_lng,
        })
    }

    /// Get the center point of the bounds.
    pub fn center(&self) -> GpsPoint {
        GpsPoint::new(
            (self.min_lat + self.max_lat) / 2.0,
            (self.min_lng + self.max_lng) / 2.0,
        )
    }

    pub fn contains(&self, p: &GpsPoint) -> bool {
        p.latitude >= self.min_lat
            && p.latitude <= self.max_lat
            && p.longitude >= self.min_lng
            && p.longitude <= self.max_lng
    }
}

/// A position report from the location source.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Fix {
    pub latitude: f64,
    pub longitude: f64,
    /// Milliseconds since the Unix epoch
    pub timestamp: i64,
    /// Horizontal accuracy in meters, when the source reports one
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub accuracy: Option<f64>,
}

impl Fix {
    pub fn new(latitude: f64, longitude: f64, timestamp: i64) -> Self {
        Self {
            latitude,
            longitude,
            timestamp,
            accuracy: None,
        }
    }

    pub fn with_accuracy(mut self, accuracy_m: f64) -> Self {
        self.accuracy = Some(accuracy_m);
        self
    }

    pub fn point(&self) -> GpsPoint {
        GpsPoint::new(self.latitude, self.longitude)
    }
}

/// Minimum number of waypoints in a trackable path.
pub const MIN_PATH_POINTS: usize = 2;

/// An ordered course path with at least two valid waypoints.
///
/// Immutable once built. Index 0 is the start and the last index is the
/// finish.
#[derive(Debug, Clone, PartialEq)]
pub struct CoursePath {
    points: Vec<GpsPoint>,
    bounds: Bounds,
}

impl CoursePath {
    /// Build a path, rejecting short paths and invalid coordinates.
    pub fn new(points: Vec<GpsPoint>) -> Result<Self> {
        if points.len() < MIN_PATH_POINTS {
            return Err(TrackerError::InsufficientPoints {
                course: "path".to_string(),
                point_count: points.len(),
                minimum_required: MIN_PATH_POINTS,
            });
        }
        if let Some((i, p)) = points.iter().enumerate().find(|(_, p)| !p.is_valid()) {
            return Err(TrackerError::InvalidCoordinates {
                name: format!("waypoint {}", i),
                message: format!("({}, {})", p.latitude, p.longitude),
            });
        }

        let bounds = Bounds::from_points(&points)
            .ok_or_insufficient_points("path", points.len(), MIN_PATH_POINTS)?;
        Ok(Self { points, bounds })
    }

    /// Two-point path from origin to destination, used when no routed path
    /// is available.
    pub fn straight_line(origin: GpsPoint, destination: GpsPoint) -> Result<Self> {
        Self::new(vec![origin, destination])
    }

    pub fn points(&self) -> &[GpsPoint] {
        &self.points
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    /// Always false for a constructed path.
    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn first(&self) -> GpsPoint {
        self.points[0]
    }

    pub fn last(&self) -> GpsPoint {
        self.points[self.points.len() - 1]
    }

    pub fn bounds(&self) -> Bounds {
        self.bounds
    }

    /// Length along the waypoints in meters.
    pub fn total_distance_m(&self) -> f64 {
        geo_utils::polyline_length(&self.points)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_gps_point_validation() {
        assert!(GpsPoint::new(33.5, 126.5).is_valid());
        assert!(!GpsPoint::new(91.0, 0.0).is_valid());
        assert!(!GpsPoint::new(0.0, 181.0).is_valid());
        assert!(!GpsPoint::new(f64::NAN, 0.0).is_valid());
    }

    #[test]
    fn test_bounds() {
        let points = vec![GpsPoint::new(33.0, 126.0), GpsPoint::new(34.0, 127.0)];
        let bounds = Bounds::from_points(&points).unwrap();
        assert_eq!(bounds.center(), GpsPoint::new(33.5, 126.5));
        assert!(bounds.contains(&GpsPoint::new(33.2, 126.9)));
        assert!(!bounds.contains(&GpsPoint::new(35.0, 126.5)));
        assert!(Bounds::from_points(&[]).is_none());
    }

    #[test]
    fn test_course_path_requires_two_points() {
        let single = CoursePath::new(vec![GpsPoint::new(33.0, 126.0)]);
        assert!(matches!(
            single,
            Err(TrackerError::InsufficientPoints { point_count: 1, .. })
        ));
        assert!(CoursePath::new(Vec::new()).is_err());
    }

    #[test]
    fn test_course_path_rejects_invalid_coordinates() {
        let result = CoursePath::new(vec![
            GpsPoint::new(33.0, 126.0),
            GpsPoint::new(f64::NAN, 126.0),
        ]);
        assert!(matches!(
            result,
            Err(TrackerError::InvalidCoordinates { ref name, .. }) if name == "waypoint 1"
        ));
    }

    #[test]
    fn test_straight_line() {
        let a = GpsPoint::new(0.0, 0.0);
        let b = GpsPoint::new(0.0, 0.01);
        let path = CoursePath::straight_line(a, b).unwrap();
        assert_eq!(path.len(), 2);
        assert_eq!(path.first(), a);
        assert_eq!(path.last(), b);
        // 0.01 degrees of longitude on the equator
        assert!((path.total_distance_m() - 1112.0).abs() < 2.0);
    }

    #[test]
    fn test_fix_serialization() {
        let fix = Fix::new(33.5, 126.5, 1_700_000_000_000).with_accuracy(8.0);
        let json = serde_json::to_string(&fix).unwrap();
        let parsed: Fix = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, fix);

        let bare: Fix =
            serde_json::from_str(r#"{"latitude":1.0,"longitude":2.0,"timestamp":3}"#).unwrap();
        assert_eq!(bare.accuracy, None);
        assert_eq!(bare.point(), GpsPoint::new(1.0, 2.0));
    }
}

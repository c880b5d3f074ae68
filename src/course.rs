//! Course bundles: the static route + POI data a run is tracked against.
//!
//! A bundle file (`course_<file>.json`) carries one or more route lines and
//! two POI lists:
//!
//! ```json
//! {
//!   "lines": [[[126.2561, 33.3339], [126.2545, 33.3396]]],
//!   "spots": [{"name": "금오름", "lat": 33.3396, "lng": 126.2545}],
//!   "guide_points": [{"name": "급수대", "lat": 33.3371, "lng": 126.2550}]
//! }
//! ```
//!
//! Line coordinates are `[lng, lat]`. A course is addressed by a
//! [`CourseId`]: bundle file number plus line index.

use std::collections::HashMap;
use std::fmt;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{OptionExt, Result, TrackerError};
use crate::geo_utils::haversine_distance;
use crate::proximity::{Poi, DEFAULT_POI_RADIUS_M};
use crate::{CoursePath, GpsPoint};

/// Bundle used when a course id can't be interpreted.
pub const DEFAULT_COURSE_FILE: &str = "5";

/// Radius around the first waypoint within which a run may start.
pub const DEFAULT_START_RADIUS_M: f64 = 50.0;

// ============================================================================
// Course Id
// ============================================================================

/// Bundle file number plus line index within the bundle.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CourseId {
    pub file_no: String,
    pub line_index: usize,
}

impl CourseId {
    pub fn new(file_no: impl Into<String>, line_index: usize) -> Self {
        Self {
            file_no: file_no.into(),
            line_index,
        }
    }

    /// Parse `course_<file>_<line>`, `<file>-<line>`, `<file>_<line>` or
    /// `<file>`.
    pub fn parse_strict(raw: &str) -> Result<Self> {
        let invalid = || TrackerError::InvalidCourseId {
            raw: raw.to_string(),
        };
        let is_number = |s: &str| !s.is_empty() && s.bytes().all(|b| b.is_ascii_digit());

        if let Some(rest) = raw.strip_prefix("course_") {
            let (file, line) = rest.split_once('_').ok_or_else(invalid)?;
            if !is_number(file) || !is_number(line) {
                return Err(invalid());
            }
            return Ok(Self::new(file, line.parse().map_err(|_| invalid())?));
        }

        if let Some((file, line)) = raw.split_once(|c: char| c == '-' || c == '_') {
            if !is_number(file) || !is_number(line) {
                return Err(invalid());
            }
            return Ok(Self::new(file, line.parse().map_err(|_| invalid())?));
        }

        if is_number(raw) {
            return Ok(Self::new(raw, 0));
        }

        Err(invalid())
    }

    /// Lenient parse: unrecognised input selects the default course.
    pub fn parse(raw: &str) -> Self {
        Self::parse_strict(raw).unwrap_or_else(|e| {
            log::warn!("[CourseId] {}; using default course", e);
            Self::default()
        })
    }
}

impl Default for CourseId {
    fn default() -> Self {
        Self::new(DEFAULT_COURSE_FILE, 0)
    }
}

impl fmt::Display for CourseId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "course_{}_{}", self.file_no, self.line_index)
    }
}

// ============================================================================
// Bundle
// ============================================================================

/// A named location as it appears in a bundle (`spots` / `guide_points`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BundlePoint {
    pub name: String,
    #[serde(default)]
    pub lat: Option<f64>,
    #[serde(default)]
    pub lng: Option<f64>,
}

impl BundlePoint {
    /// A POI, unless a coordinate is missing or zero.
    fn to_poi(&self, radius_m: f64) -> Option<Poi> {
        let lat = self.lat.filter(|v| *v != 0.0)?;
        let lng = self.lng.filter(|v| *v != 0.0)?;
        Some(Poi::new(self.name.clone(), lat, lng).with_radius(radius_m))
    }
}

/// Raw course bundle file contents.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CourseBundle {
    /// Route lines, each a list of `[lng, lat, ...]` positions
    #[serde(default)]
    pub lines: Vec<Vec<Vec<f64>>>,
    #[serde(default)]
    pub spots: Vec<BundlePoint>,
    #[serde(default)]
    pub guide_points: Vec<BundlePoint>,
}

/// One selected line of a bundle, ready for tracking.
#[derive(Debug, Clone)]
pub struct Course {
    pub id: CourseId,
    /// `None` when the selected line has fewer than two usable waypoints
    pub path: Option<CoursePath>,
    /// Spots followed by guide points
    pub pois: Vec<Poi>,
}

impl CourseBundle {
    pub fn from_json_str(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_json_str(&text)
    }

    /// Waypoints of `lines[line_index]`, falling back to `lines[0]`.
    ///
    /// Positions with fewer than two components are skipped.
    pub fn line_points(&self, line_index: usize) -> Vec<GpsPoint> {
        self.lines
            .get(line_index)
            .or_else(|| self.lines.first())
            .map(|line| {
                line.iter()
                    .filter(|pos| pos.len() >= 2)
                    .map(|pos| GpsPoint::new(pos[1], pos[0]))
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Spots then guide points, skipping entries without coordinates.
    pub fn pois(&self, radius_m: f64) -> Vec<Poi> {
        self.spots
            .iter()
            .chain(self.guide_points.iter())
            .filter_map(|p| p.to_poi(radius_m))
            .collect()
    }

    /// Select a course line and its POIs with the default POI radius.
    pub fn course(&self, id: &CourseId) -> Course {
        self.course_with_radius(id, DEFAULT_POI_RADIUS_M)
    }

    pub fn course_with_radius(&self, id: &CourseId, poi_radius_m: f64) -> Course {
        let points = self.line_points(id.line_index);
        let path = match CoursePath::new(points) {
            Ok(path) => Some(path),
            Err(e) => {
                log::warn!("[CourseBundle] {} has no usable path: {}", id, e);
                None
            }
        };
        Course {
            id: id.clone(),
            path,
            pois: self.pois(poi_radius_m),
        }
    }
}

// ============================================================================
// Route Provider
// ============================================================================

/// Source of precomputed course paths.
///
/// `Ok(None)` means the provider has no route for this course; callers may
/// substitute [`CoursePath::straight_line`].
pub trait RouteProvider {
    fn path_for(&self, id: &CourseId) -> Result<Option<Vec<GpsPoint>>>;
}

/// In-memory set of course bundles keyed by file number.
#[derive(Debug, Clone, Default)]
pub struct CourseCatalog {
    bundles: HashMap<String, CourseBundle>,
}

impl CourseCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load every `course_<file>.json` in a directory.
    pub fn load_dir(dir: impl AsRef<Path>) -> Result<Self> {
        let mut catalog = Self::new();
        for entry in std::fs::read_dir(dir.as_ref())? {
            let path = entry?.path();
            let Some(file_no) = path
                .file_name()
                .and_then(|n| n.to_str())
                .and_then(|n| n.strip_prefix("course_"))
                .and_then(|n| n.strip_suffix(".json"))
                .map(str::to_string)
            else {
                continue;
            };
            catalog.insert(file_no, CourseBundle::from_path(&path)?);
        }
        log::info!(
            "[CourseCatalog] Loaded {} bundles from {}",
            catalog.len(),
            dir.as_ref().display()
        );
        Ok(catalog)
    }

    pub fn insert(&mut self, file_no: impl Into<String>, bundle: CourseBundle) {
        self.bundles.insert(file_no.into(), bundle);
    }

    pub fn len(&self) -> usize {
        self.bundles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bundles.is_empty()
    }

    pub fn bundle(&self, file_no: &str) -> Result<&CourseBundle> {
        self.bundles.get(file_no).ok_or_course_not_found(file_no)
    }

    pub fn course(&self, id: &CourseId) -> Result<Course> {
        Ok(self.bundle(&id.file_no)?.course(id))
    }
}

impl RouteProvider for CourseCatalog {
    fn path_for(&self, id: &CourseId) -> Result<Option<Vec<GpsPoint>>> {
        let points = self.bundle(&id.file_no)?.line_points(id.line_index);
        Ok(if points.is_empty() { None } else { Some(points) })
    }
}

// ============================================================================
// Start Check
// ============================================================================

/// Whether the runner is close enough to the course start.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum StartCheck {
    Ready { distance_m: f64 },
    TooFar { distance_m: f64 },
}

impl StartCheck {
    pub fn is_ready(&self) -> bool {
        matches!(self, StartCheck::Ready { .. })
    }
}

/// Compare a position with the first waypoint of a path.
pub fn check_start(position: &GpsPoint, path: &CoursePath, radius_m: f64) -> StartCheck {
    let distance_m = haversine_distance(position, &path.first());
    if distance_m <= radius_m {
        StartCheck::Ready { distance_m }
    } else {
        StartCheck::TooFar { distance_m }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const BUNDLE: &str = r#"{
        "title": "아름다운 해변코스",
        "lines": [
            [[126.256099, 33.333918], [126.2545, 33.3396], [126.249495, 33.346847]],
            [[126.2692, 33.3655], [126.2621, 33.3729]],
            [[126.0, 33.0]]
        ],
        "spots": [
            {"name": "금오름", "lat": 33.3396, "lng": 126.2545},
            {"name": "좌표없음", "lat": 0, "lng": 126.25}
        ],
        "guide_points": [
            {"name": "외돌개", "lat": 33.3433, "lng": 126.2522},
            {"name": "미정"}
        ]
    }"#;

    #[test]
    fn test_parse_course_ids() {
        assert_eq!(CourseId::parse("course_5_3"), CourseId::new("5", 3));
        assert_eq!(CourseId::parse("12-1"), CourseId::new("12", 1));
        assert_eq!(CourseId::parse("7_2"), CourseId::new("7", 2));
        assert_eq!(CourseId::parse("9"), CourseId::new("9", 0));
        assert_eq!(CourseId::parse(""), CourseId::default());
        assert_eq!(CourseId::parse("beach"), CourseId::new("5", 0));
        assert_eq!(CourseId::parse("course_a_1"), CourseId::default());
    }

    #[test]
    fn test_strict_parse_rejects_garbage() {
        assert!(matches!(
            CourseId::parse_strict("course_5"),
            Err(TrackerError::InvalidCourseId { .. })
        ));
        assert!(CourseId::parse_strict("5-x").is_err());
        assert_eq!(CourseId::new("5", 3).to_string(), "course_5_3");
    }

    #[test]
    fn test_bundle_selects_line() {
        let bundle = CourseBundle::from_json_str(BUNDLE).unwrap();
        let course = bundle.course(&CourseId::new("1", 1));
        let path = course.path.unwrap();
        assert_eq!(path.len(), 2);
        // [lng, lat] swapped into latitude/longitude
        assert_eq!(path.first(), GpsPoint::new(33.3655, 126.2692));
    }

    #[test]
    fn test_missing_line_falls_back_to_first() {
        let bundle = CourseBundle::from_json_str(BUNDLE).unwrap();
        let course = bundle.course(&CourseId::new("1", 42));
        assert_eq!(course.path.unwrap().len(), 3);
    }

    #[test]
    fn test_short_line_is_degraded() {
        let bundle = CourseBundle::from_json_str(BUNDLE).unwrap();
        let course = bundle.course(&CourseId::new("1", 2));
        assert!(course.path.is_none());
        // POIs are still available
        assert_eq!(course.pois.len(), 2);
    }

    #[test]
    fn test_pois_merge_and_filter() {
        let bundle = CourseBundle::from_json_str(BUNDLE).unwrap();
        let pois = bundle.pois(DEFAULT_POI_RADIUS_M);
        let names: Vec<&str> = pois.iter().map(|p| p.name.as_str()).collect();
        assert_eq!(names, vec!["금오름", "외돌개"]);
        assert!(pois.iter().all(|p| p.radius_m == 50.0));
    }

    #[test]
    fn test_empty_bundle() {
        let bundle = CourseBundle::from_json_str("{}").unwrap();
        assert!(bundle.line_points(0).is_empty());
        assert!(bundle.course(&CourseId::default()).path.is_none());
    }

    #[test]
    fn test_malformed_bundle() {
        assert!(matches!(
            CourseBundle::from_json_str("{\"lines\": 3}"),
            Err(TrackerError::CourseBundle(_))
        ));
    }

    #[test]
    fn test_catalog_from_dir() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("course_1.json"), BUNDLE).unwrap();
        std::fs::write(dir.path().join("notes.txt"), "ignored").unwrap();

        let catalog = CourseCatalog::load_dir(dir.path()).unwrap();
        assert_eq!(catalog.len(), 1);

        let points = catalog.path_for(&CourseId::new("1", 0)).unwrap().unwrap();
        assert_eq!(points.len(), 3);
        assert!(matches!(
            catalog.path_for(&CourseId::new("2", 0)),
            Err(TrackerError::CourseNotFound { .. })
        ));
    }

    #[test]
    fn test_catalog_empty_line_is_none() {
        let mut catalog = CourseCatalog::new();
        catalog.insert("3", CourseBundle::default());
        assert!(catalog.path_for(&CourseId::new("3", 0)).unwrap().is_none());
    }

    #[test]
    fn test_check_start() {
        let path = CoursePath::new(vec![
            GpsPoint::new(33.333918, 126.256099),
            GpsPoint::new(33.346847, 126.249495),
        ])
        .unwrap();

        let near = GpsPoint::new(33.3341, 126.2561);
        let check = check_start(&near, &path, DEFAULT_START_RADIUS_M);
        assert!(check.is_ready());

        let far = GpsPoint::new(35.8368214, 127.1223943);
        let check = check_start(&far, &path, DEFAULT_START_RADIUS_M);
        assert!(matches!(check, StartCheck::TooFar { distance_m } if distance_m > 100_000.0));
    }
}

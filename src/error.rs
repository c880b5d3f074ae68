//! Unified error handling for the course-tracker library.
//!
//! Live tracking itself never fails: degraded inputs (short paths, location
//! errors, late callbacks) are reported as state or status events. Errors are
//! reserved for loading courses, parsing configuration and talking to the
//! routing proxy.

use thiserror::Error;

/// Unified error type for course-tracker operations.
#[derive(Debug, Error)]
pub enum TrackerError {
    /// Path has too few waypoints to be tracked
    #[error("Path '{course}' has {point_count} points, minimum {minimum_required} required")]
    InsufficientPoints {
        course: String,
        point_count: usize,
        minimum_required: usize,
    },

    /// Path or POI has out-of-range or non-finite coordinates
    #[error("'{name}' has invalid coordinates: {message}")]
    InvalidCoordinates { name: String, message: String },

    /// Course identifier could not be parsed
    #[error("Invalid course id '{raw}'")]
    InvalidCourseId { raw: String },

    /// No bundle is known for the requested course file
    #[error("Course bundle '{file_no}' not found")]
    CourseNotFound { file_no: String },

    /// Course bundle JSON was malformed
    #[error("Course bundle could not be parsed: {0}")]
    CourseBundle(#[from] serde_json::Error),

    /// Filesystem error while reading bundles or config
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration error
    #[error("Configuration error: {message}")]
    Config { message: String },

    /// Routing proxy error
    #[error("HTTP error{}: {message}", status_suffix(.status_code))]
    Http {
        message: String,
        status_code: Option<u16>,
    },

    /// Operation not allowed in the current session state
    #[error("Cannot {action} while session is {state}")]
    SessionState { action: String, state: String },
}

fn status_suffix(status_code: &Option<u16>) -> String {
    status_code.map(|c| format!(" ({})", c)).unwrap_or_default()
}

/// Result type alias for course-tracker operations.
pub type Result<T> = std::result::Result<T, TrackerError>;

/// Extension trait for converting Option to TrackerError.
pub trait OptionExt<T> {
    /// Convert Option to Result with insufficient points error.
    fn ok_or_insufficient_points(self, course: &str, point_count: usize, minimum: usize)
        -> Result<T>;

    /// Convert Option to Result with course not found error.
    fn ok_or_course_not_found(self, file_no: &str) -> Result<T>;
}

impl<T> OptionExt<T> for Option<T> {
    fn ok_or_insufficient_points(
        self,
        course: &str,
        point_count: usize,
        minimum: usize,
    ) -> Result<T> {
        self.ok_or_else(|| TrackerError::InsufficientPoints {
            course: course.to_string(),
            point_count,
            minimum_required: minimum,
        })
    }

    fn ok_or_course_not_found(self, file_no: &str) -> Result<T> {
        self.ok_or_else(|| TrackerError::CourseNotFound {
            file_no: file_no.to_string(),
        })
    }
}

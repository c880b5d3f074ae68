//! # Run Session
//!
//! One guided run on one course. The session owns every piece of mutable
//! tracking state (progress pointer, visited POIs, metrics) and fans each
//! fix out to the three components. Nothing lives in globals, so switching
//! courses or starting a second run can't leak state from the first.
//!
//! ## Lifecycle
//!
//! ```text
//!  new ──load_course──▶ Ready ──start──▶ Running ◀──resume── Paused
//!                         ▲                 │  └────pause────▶  │
//!                         │                stop                 stop
//!                       reset               ▼                   │
//!                         └──────────── Stopped ◀───────────────┘
//!  dispose (any state) ──▶ Disposed
//! ```
//!
//! Fixes and ticks are only applied while `Running`. Anything arriving in
//! another state (including callbacks that outlive the run) is dropped
//! before it touches state.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::config::TrackerConfig;
use crate::course::{check_start, Course, StartCheck};
use crate::error::{Result, TrackerError};
use crate::metrics::{FixOutcome, Metrics, MetricsAccumulator};
use crate::progress::{ProgressTracker, ProgressUpdate};
use crate::proximity::{Arrival, Poi, ProximityWatcher};
use crate::{CoursePath, Fix, GpsPoint};

// ============================================================================
// Events
// ============================================================================

/// Why the location source produced no fix.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum LocationError {
    PermissionDenied,
    Timeout,
    Unavailable { message: String },
}

impl fmt::Display for LocationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LocationError::PermissionDenied => write!(f, "location permission denied"),
            LocationError::Timeout => write!(f, "location request timed out"),
            LocationError::Unavailable { message } => {
                write!(f, "location unavailable: {}", message)
            }
        }
    }
}

/// One item from a location source.
pub type LocationUpdate = std::result::Result<Fix, LocationError>;

/// Health of the location feed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum LocationStatus {
    /// No fix yet
    Waiting,
    /// Fixes are arriving
    Ok,
    /// Last update was an error; state is retained until fixes resume
    Lost { error: LocationError },
}

/// Output consumed by the UI layer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SessionEvent {
    Progress(ProgressUpdate),
    Metrics(Metrics),
    Arrived(Arrival),
    Status(LocationStatus),
}

/// Lifecycle state of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    /// Created, no course loaded
    Idle,
    /// Course loaded, not started
    Ready,
    Running,
    Paused,
    Stopped,
    Disposed,
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SessionState::Idle => "idle",
            SessionState::Ready => "ready",
            SessionState::Running => "running",
            SessionState::Paused => "paused",
            SessionState::Stopped => "stopped",
            SessionState::Disposed => "disposed",
        };
        f.write_str(name)
    }
}

/// Final state of a run, returned by [`RunSession::stop`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunSummary {
    pub metrics: Metrics,
    /// POI names in arrival order
    pub visited: Vec<String>,
    /// Fraction of the path passed (0 in degraded mode)
    pub progress_fraction: f64,
    pub completed: bool,
}

// ============================================================================
// Session
// ============================================================================

/// Tracking state for one run.
pub struct RunSession {
    config: TrackerConfig,
    state: SessionState,
    tracker: Option<ProgressTracker>,
    metrics: MetricsAccumulator,
    proximity: ProximityWatcher,
    location: LocationStatus,
    run_count: u64,
}

impl RunSession {
    pub fn new(config: TrackerConfig) -> Self {
        let metrics = MetricsAccumulator::new(config.metrics.clone())
            .with_tick_interval_ms(config.tick_interval_ms);
        Self {
            config,
            state: SessionState::Idle,
            tracker: None,
            metrics,
            proximity: ProximityWatcher::new(Vec::new()),
            location: LocationStatus::Waiting,
            run_count: 0,
        }
    }

    pub fn config(&self) -> &TrackerConfig {
        &self.config
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn is_active(&self) -> bool {
        self.state == SessionState::Running
    }

    /// True when the loaded course has no usable path. Metrics and POIs
    /// still work; progress is not tracked.
    pub fn is_degraded(&self) -> bool {
        self.tracker.is_none()
    }

    pub fn location_status(&self) -> &LocationStatus {
        &self.location
    }

    /// Number of times `start` has been called.
    pub fn run_count(&self) -> u64 {
        self.run_count
    }

    fn require_not(&self, action: &str, forbidden: &[SessionState]) -> Result<()> {
        if forbidden.contains(&self.state) {
            return Err(TrackerError::SessionState {
                action: action.to_string(),
                state: self.state.to_string(),
            });
        }
        Ok(())
    }

    /// Load (or replace) the course. Any previous path index is discarded.
    ///
    /// `points` may be empty or too short: the session then runs in
    /// degraded mode with progress disabled.
    pub fn load_course(&mut self, points: Vec<GpsPoint>, pois: Vec<Poi>) -> Result<()> {
        self.require_not(
            "load a course",
            &[SessionState::Running, SessionState::Paused, SessionState::Disposed],
        )?;

        let point_count = points.len();
        self.tracker = match CoursePath::new(points) {
            Ok(path) => Some(ProgressTracker::new(path)),
            Err(e) => {
                log::warn!("[RunSession] Degraded mode, progress disabled: {}", e);
                None
            }
        };
        log::info!(
            "[RunSession] Course loaded: {} waypoints, {} POIs",
            point_count,
            pois.len()
        );
        self.proximity = ProximityWatcher::new(pois);
        self.metrics.reset();
        self.location = LocationStatus::Waiting;
        self.state = SessionState::Ready;
        Ok(())
    }

    /// Load a course selected from a bundle.
    pub fn load_bundle_course(&mut self, course: Course) -> Result<()> {
        let points = course
            .path
            .map(|p| p.points().to_vec())
            .unwrap_or_default();
        self.load_course(points, course.pois)
    }

    /// Whether `position` is close enough to the course start.
    ///
    /// Returns `None` in degraded mode.
    pub fn check_start(&self, position: &GpsPoint) -> Option<StartCheck> {
        self.tracker.as_ref().map(|tracker| {
            check_start(position, tracker.path(), self.config.proximity.start_radius_m)
        })
    }

    /// Begin a run: progress, visited POIs and metrics start from zero.
    pub fn start(&mut self) -> Result<()> {
        if self.state != SessionState::Ready && self.state != SessionState::Stopped {
            return Err(TrackerError::SessionState {
                action: "start".to_string(),
                state: self.state.to_string(),
            });
        }

        self.clear_run_state();
        self.metrics.start();
        self.run_count += 1;
        self.state = SessionState::Running;
        log::info!("[RunSession] Run {} started", self.run_count);
        Ok(())
    }

    pub fn pause(&mut self) -> Result<()> {
        if self.state != SessionState::Running {
            return Err(TrackerError::SessionState {
                action: "pause".to_string(),
                state: self.state.to_string(),
            });
        }
        self.metrics.pause();
        self.state = SessionState::Paused;
        log::info!("[RunSession] Paused at {:?}", self.metrics.snapshot());
        Ok(())
    }

    pub fn resume(&mut self) -> Result<()> {
        if self.state != SessionState::Paused {
            return Err(TrackerError::SessionState {
                action: "resume".to_string(),
                state: self.state.to_string(),
            });
        }
        self.metrics.resume();
        self.state = SessionState::Running;
        log::info!("[RunSession] Resumed");
        Ok(())
    }

    /// End the run and freeze metrics.
    pub fn stop(&mut self) -> Result<RunSummary> {
        if self.state != SessionState::Running && self.state != SessionState::Paused {
            return Err(TrackerError::SessionState {
                action: "stop".to_string(),
                state: self.state.to_string(),
            });
        }
        let metrics = self.metrics.stop();
        self.state = SessionState::Stopped;
        let summary = self.summary_with(metrics);
        log::info!(
            "[RunSession] Stopped: {:.2} km in {}s, {} POIs visited",
            summary.metrics.total_distance_km,
            summary.metrics.elapsed_seconds,
            summary.visited.len()
        );
        Ok(summary)
    }

    /// Back to `Ready` on the same course with all run state cleared.
    pub fn reset(&mut self) -> Result<()> {
        self.require_not("reset", &[SessionState::Idle, SessionState::Disposed])?;
        self.clear_run_state();
        self.metrics.reset();
        self.state = SessionState::Ready;
        Ok(())
    }

    /// Drop the course and refuse all further input.
    pub fn dispose(&mut self) {
        if self.state == SessionState::Disposed {
            return;
        }
        self.tracker = None;
        self.proximity = ProximityWatcher::new(Vec::new());
        self.metrics.reset();
        self.state = SessionState::Disposed;
        log::info!("[RunSession] Disposed");
    }

    fn clear_run_state(&mut self) {
        if let Some(tracker) = self.tracker.as_mut() {
            tracker.reset();
        }
        self.proximity.reset();
        self.location = LocationStatus::Waiting;
    }

    /// Apply a fix. Returns the resulting UI events, in order: status
    /// recovery, progress, arrival.
    pub fn on_fix(&mut self, fix: &Fix) -> Vec<SessionEvent> {
        if !self.is_active() {
            log::debug!("[RunSession] Dropped fix while {}", self.state);
            return Vec::new();
        }
        if !fix.point().is_valid() {
            log::warn!(
                "[RunSession] Dropped fix with invalid coordinates ({}, {})",
                fix.latitude,
                fix.longitude
            );
            return Vec::new();
        }

        let mut events = Vec::new();
        if self.location != LocationStatus::Ok {
            self.location = LocationStatus::Ok;
            events.push(SessionEvent::Status(LocationStatus::Ok));
        }

        let position = fix.point();
        if let Some(update) = self
            .tracker
            .as_mut()
            .and_then(|tracker| tracker.on_position(&position))
        {
            events.push(SessionEvent::Progress(update));
        }

        if let FixOutcome::Counted(km) = self.metrics.on_fix(fix) {
            log::debug!("[RunSession] +{:.4} km", km);
        }

        if let Some(arrival) = self.proximity.on_position(&position) {
            events.push(SessionEvent::Arrived(arrival));
        }

        events
    }

    /// Apply a timer tick. Returns a metrics event while running.
    pub fn on_tick(&mut self) -> Option<SessionEvent> {
        if !self.is_active() {
            return None;
        }
        self.metrics.tick().map(SessionEvent::Metrics)
    }

    /// Record a non-fatal location failure. Tracking state is kept.
    pub fn on_location_error(&mut self, error: LocationError) -> Option<SessionEvent> {
        if !self.is_active() {
            return None;
        }
        log::warn!("[RunSession] {}", error);
        let status = LocationStatus::Lost { error };
        if self.location == status {
            return None;
        }
        self.location = status.clone();
        Some(SessionEvent::Status(status))
    }

    /// Apply one item from a location source.
    pub fn on_location_update(&mut self, update: LocationUpdate) -> Vec<SessionEvent> {
        match update {
            Ok(fix) => self.on_fix(&fix),
            Err(error) => self.on_location_error(error).into_iter().collect(),
        }
    }

    /// Mark the outstanding arrival alert as delivered so the next POI can
    /// fire.
    pub fn acknowledge_arrival(&mut self) -> Option<String> {
        self.proximity.acknowledge()
    }

    pub fn metrics(&self) -> Metrics {
        self.metrics.snapshot()
    }

    /// Current traveled/remaining split, `None` in degraded mode.
    pub fn progress(&self) -> Option<ProgressUpdate> {
        self.tracker.as_ref().map(|t| t.current_split())
    }

    pub fn progress_index(&self) -> Option<usize> {
        self.tracker.as_ref().map(|t| t.last_index())
    }

    pub fn visited(&self) -> &[String] {
        self.proximity.visited()
    }

    pub fn summary(&self) -> RunSummary {
        self.summary_with(self.metrics.snapshot())
    }

    fn summary_with(&self, metrics: Metrics) -> RunSummary {
        RunSummary {
            metrics,
            visited: self.proximity.visited().to_vec(),
            progress_fraction: self.tracker.as_ref().map_or(0.0, |t| t.fraction()),
            completed: self.tracker.as_ref().is_some_and(|t| t.is_complete()),
        }
    }
}

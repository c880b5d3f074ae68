//! Run metrics accumulated from a live fix stream.
//!
//! Distance comes from consecutive fixes, time from an independent timer
//! tick (1 Hz by default), so the clock keeps running through GPS gaps.
//!
//! ## Noise handling
//! - Steps shorter than `jitter_threshold_km` are dropped as GPS jitter. The
//!   reference fix still moves forward so small errors don't compound.
//! - Implausibly large jumps are handled by [`OutlierPolicy`].
//! - After a pause, the first fix only re-baselines the reference point; the
//!   distance covered while paused is never counted.
//!
//! ## Example
//! ```rust
//! use course_tracker::metrics::{MetricsAccumulator, MetricsConfig};
//! use course_tracker::Fix;
//!
//! let mut acc = MetricsAccumulator::new(MetricsConfig::default());
//! acc.start();
//! acc.on_fix(&Fix::new(0.0, 0.0, 0));
//! acc.on_fix(&Fix::new(0.0, 0.001, 1_000));
//! acc.tick();
//! assert!(acc.snapshot().total_distance_km > 0.1);
//! ```

use serde::{Deserialize, Serialize};

use crate::geo_utils::haversine_distance_km;
use crate::Fix;

/// Energy cost of running, kcal per kg of body mass per km.
pub const KCAL_PER_KG_KM: f64 = 1.036;

/// Body mass assumed when none is configured.
pub const REFERENCE_BODY_MASS_KG: f64 = 60.0;

/// Timer period the elapsed clock assumes unless told otherwise.
pub const DEFAULT_TICK_INTERVAL_MS: u64 = 1000;

/// What to do with a step longer than a plausible movement between fixes.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum OutlierPolicy {
    /// Count every step regardless of size
    Accept,
    /// Drop steps longer than `max_jump_km`
    Reject { max_jump_km: f64 },
    /// Count at most `max_jump_km` for any single step
    Cap { max_jump_km: f64 },
}

impl Default for OutlierPolicy {
    fn default() -> Self {
        OutlierPolicy::Accept
    }
}

/// Configuration for metric accumulation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MetricsConfig {
    /// Steps shorter than this are GPS jitter.
    /// Default: 0.002 km (2 m)
    pub jitter_threshold_km: f64,

    /// Calories burned per km.
    /// Default: 62.16 (reference 60 kg body mass)
    pub calories_per_km: f64,

    /// Policy for implausibly large steps.
    /// Default: Accept
    pub outlier_policy: OutlierPolicy,
}

impl MetricsConfig {
    /// Config with a calorie rate derived from body mass.
    pub fn for_body_mass(kg: f64) -> Self {
        Self {
            calories_per_km: kg * KCAL_PER_KG_KM,
            ..Self::default()
        }
    }
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            jitter_threshold_km: 0.002,
            calories_per_km: REFERENCE_BODY_MASS_KG * KCAL_PER_KG_KM,
            outlier_policy: OutlierPolicy::Accept,
        }
    }
}

/// Point-in-time metrics, as sent to the UI.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Metrics {
    pub elapsed_seconds: u64,
    pub total_distance_km: f64,
    /// 0.0 until any distance has been covered
    pub pace_min_per_km: f64,
    pub calories: f64,
}

/// Metrics formatted for display.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetricsDisplay {
    /// `HH:MM:SS`
    pub time: String,
    /// Kilometers, two decimals
    pub distance: String,
    /// `M'SS''` per km
    pub pace: String,
    /// Whole kcal
    pub calories: String,
}

impl Metrics {
    pub fn display(&self) -> MetricsDisplay {
        MetricsDisplay {
            time: format_elapsed(self.elapsed_seconds),
            distance: format!("{:.2}", self.total_distance_km),
            pace: format_pace(self.pace_min_per_km),
            calories: format!("{:.0}", self.calories),
        }
    }
}

/// Format seconds as `HH:MM:SS`.
pub fn format_elapsed(seconds: u64) -> String {
    format!(
        "{:02}:{:02}:{:02}",
        seconds / 3600,
        (seconds % 3600) / 60,
        seconds % 60
    )
}

/// Format minutes-per-km as `M'SS''`.
pub fn format_pace(min_per_km: f64) -> String {
    if !min_per_km.is_finite() || min_per_km <= 0.0 {
        return "0'00''".to_string();
    }
    let total_secs = (min_per_km * 60.0).round() as u64;
    format!("{}'{:02}''", total_secs / 60, total_secs % 60)
}

/// Pace in minutes per km, or 0.0 when no distance has been covered.
pub fn pace_min_per_km(elapsed_seconds: u64, distance_km: f64) -> f64 {
    if distance_km > 0.0 {
        (elapsed_seconds as f64 / 60.0) / distance_km
    } else {
        0.0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum AccumulatorState {
    Idle,
    Running,
    Paused,
    Stopped,
}

/// How a fix was handled.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum FixOutcome {
    /// First fix (or first after resume): reference point set, nothing counted
    Baseline,
    /// Step counted toward distance (km)
    Counted(f64),
    /// Step below the jitter threshold
    Jitter,
    /// Step rejected by the outlier policy
    Outlier,
    /// Accumulator is not running
    Ignored,
}

/// Distance/time/pace/calorie accumulator for one session.
pub struct MetricsAccumulator {
    config: MetricsConfig,
    state: AccumulatorState,
    prev_fix: Option<Fix>,
    tick_interval_ms: u64,
    elapsed_ms: u64,
    total_distance_km: f64,
}

impl MetricsAccumulator {
    pub fn new(config: MetricsConfig) -> Self {
        Self {
            config,
            state: AccumulatorState::Idle,
            prev_fix: None,
            tick_interval_ms: DEFAULT_TICK_INTERVAL_MS,
            elapsed_ms: 0,
            total_distance_km: 0.0,
        }
    }

    /// Time credited per [`tick`](Self::tick). Must match the timer period.
    pub fn with_tick_interval_ms(mut self, tick_interval_ms: u64) -> Self {
        self.tick_interval_ms = tick_interval_ms;
        self
    }

    pub fn config(&self) -> &MetricsConfig {
        &self.config
    }

    /// Zero all totals and begin accumulating.
    pub fn start(&mut self) {
        self.reset();
        self.state = AccumulatorState::Running;
    }

    pub fn pause(&mut self) {
        if self.state == AccumulatorState::Running {
            self.state = AccumulatorState::Paused;
        }
    }

    /// Resume after a pause. The next fix re-baselines.
    pub fn resume(&mut self) {
        if self.state == AccumulatorState::Paused {
            self.prev_fix = None;
            self.state = AccumulatorState::Running;
        }
    }

    /// Freeze the totals. Nothing mutates them until the next `start`.
    pub fn stop(&mut self) -> Metrics {
        self.state = AccumulatorState::Stopped;
        self.snapshot()
    }

    /// Back to idle with zeroed totals.
    pub fn reset(&mut self) {
        self.state = AccumulatorState::Idle;
        self.prev_fix = None;
        self.elapsed_ms = 0;
        self.total_distance_km = 0.0;
    }

    pub fn is_running(&self) -> bool {
        self.state == AccumulatorState::Running
    }

    pub fn is_paused(&self) -> bool {
        self.state == AccumulatorState::Paused
    }

    pub fn is_stopped(&self) -> bool {
        self.state == AccumulatorState::Stopped
    }

    /// Advance the clock by one timer period. Returns the new snapshot while
    /// running.
    pub fn tick(&mut self) -> Option<Metrics> {
        if self.state != AccumulatorState::Running {
            return None;
        }
        self.elapsed_ms += self.tick_interval_ms;
        Some(self.snapshot())
    }

    /// Feed a fix.
    pub fn on_fix(&mut self, fix: &Fix) -> FixOutcome {
        if self.state != AccumulatorState::Running {
            return FixOutcome::Ignored;
        }

        if !fix.point().is_valid() {
            log::warn!(
                "[MetricsAccumulator] Ignored fix with invalid coordinates ({}, {})",
                fix.latitude,
                fix.longitude
            );
            return FixOutcome::Outlier;
        }

        let Some(prev) = self.prev_fix else {
            self.prev_fix = Some(*fix);
            return FixOutcome::Baseline;
        };

        let delta = haversine_distance_km(&prev.point(), &fix.point());
        if !delta.is_finite() {
            return FixOutcome::Outlier;
        }
        self.prev_fix = Some(*fix);

        if delta < self.config.jitter_threshold_km {
            return FixOutcome::Jitter;
        }

        let counted = match self.config.outlier_policy {
            OutlierPolicy::Accept => delta,
            OutlierPolicy::Reject { max_jump_km } if delta > max_jump_km => {
                log::warn!(
                    "[MetricsAccumulator] Rejected {:.3} km jump (limit {:.3} km)",
                    delta,
                    max_jump_km
                );
                return FixOutcome::Outlier;
            }
            OutlierPolicy::Reject { .. } => delta,
            OutlierPolicy::Cap { max_jump_km } => {
                if delta > max_jump_km {
                    log::warn!(
                        "[MetricsAccumulator] Capped {:.3} km jump to {:.3} km",
                        delta,
                        max_jump_km
                    );
                }
                delta.min(max_jump_km)
            }
        };

        self.total_distance_km += counted;
        FixOutcome::Counted(counted)
    }

    pub fn snapshot(&self) -> Metrics {
        let elapsed_seconds = self.elapsed_ms / 1000;
        Metrics {
            elapsed_seconds,
            total_distance_km: self.total_distance_km,
            pace_min_per_km: pace_min_per_km(elapsed_seconds, self.total_distance_km),
            calories: self.total_distance_km * self.config.calories_per_km,
        }
    }
}

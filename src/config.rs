//! Tracker configuration.
//!
//! Bundles the per-component configs into one value that can be loaded from
//! JSON. Every field has a default, so a partial document such as
//! `{"metrics": {"calories_per_km": 70.0}}` is valid.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::course::DEFAULT_START_RADIUS_M;
use crate::error::{Result, TrackerError};
use crate::metrics::{MetricsConfig, OutlierPolicy};
use crate::proximity::DEFAULT_POI_RADIUS_M;

/// Configuration for POI and start-point proximity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProximityConfig {
    /// Trigger radius for POIs loaded from course bundles.
    /// Default: 50.0 meters
    pub default_radius_m: f64,

    /// Maximum distance from the first waypoint to start a run.
    /// Default: 50.0 meters
    pub start_radius_m: f64,
}

impl Default for ProximityConfig {
    fn default() -> Self {
        Self {
            default_radius_m: DEFAULT_POI_RADIUS_M,
            start_radius_m: DEFAULT_START_RADIUS_M,
        }
    }
}

/// Configuration for a tracking session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrackerConfig {
    pub metrics: MetricsConfig,
    pub proximity: ProximityConfig,
    /// Metrics timer period. Each tick counts as one elapsed second.
    /// Default: 1000 ms
    pub tick_interval_ms: u64,
}

impl TrackerConfig {
    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json).map_err(|e| TrackerError::Config {
            message: e.to_string(),
        })?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_json_str(&text)
    }

    /// Reject values that would make tracking meaningless.
    pub fn validate(&self) -> Result<()> {
        let fail = |message: &str| {
            Err(TrackerError::Config {
                message: message.to_string(),
            })
        };

        let m = &self.metrics;
        if !(m.jitter_threshold_km.is_finite() && m.jitter_threshold_km >= 0.0) {
            return fail("metrics.jitter_threshold_km must be a non-negative number");
        }
        if !(m.calories_per_km.is_finite() && m.calories_per_km >= 0.0) {
            return fail("metrics.calories_per_km must be a non-negative number");
        }
        match m.outlier_policy {
            OutlierPolicy::Reject { max_jump_km } | OutlierPolicy::Cap { max_jump_km }
                if !(max_jump_km > m.jitter_threshold_km) =>
            {
                return fail("metrics.outlier_policy.max_jump_km must exceed the jitter threshold");
            }
            _ => {}
        }

        let p = &self.proximity;
        if !(p.default_radius_m > 0.0) || !(p.start_radius_m > 0.0) {
            return fail("proximity radii must be positive");
        }

        if self.tick_interval_ms == 0 {
            return fail("tick_interval_ms must be positive");
        }
        Ok(())
    }
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            metrics: MetricsConfig::default(),
            proximity: ProximityConfig::default(),
            tick_interval_ms: 1000,
        }
    }
}

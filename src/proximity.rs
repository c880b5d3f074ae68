//! Point-of-interest arrival detection.
//!
//! Each POI fires at most once per session. POIs are checked in list order
//! and the first unvisited one within its radius wins, even if a later POI
//! is closer. Only one arrival can be outstanding: until the caller
//! acknowledges it, no further POI is evaluated.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use crate::geo_utils::haversine_distance;
use crate::GpsPoint;

/// Radius used when a POI doesn't specify one.
pub const DEFAULT_POI_RADIUS_M: f64 = 50.0;

fn default_radius() -> f64 {
    DEFAULT_POI_RADIUS_M
}

/// A point of interest with a trigger radius. `name` is the identity key.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Poi {
    pub name: String,
    pub latitude: f64,
    pub longitude: f64,
    #[serde(default = "default_radius")]
    pub radius_m: f64,
}

impl Poi {
    pub fn new(name: impl Into<String>, latitude: f64, longitude: f64) -> Self {
        Self {
            name: name.into(),
            latitude,
            longitude,
            radius_m: DEFAULT_POI_RADIUS_M,
        }
    }

    pub fn with_radius(mut self, radius_m: f64) -> Self {
        self.radius_m = radius_m;
        self
    }

    pub fn point(&self) -> GpsPoint {
        GpsPoint::new(self.latitude, self.longitude)
    }
}

/// First arrival at a POI.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Arrival {
    pub poi_name: String,
    /// Distance from the fix to the POI when it triggered
    pub distance_m: f64,
}

/// Arrival detector for one course's POI list.
pub struct ProximityWatcher {
    pois: Vec<Poi>,
    visited: HashSet<String>,
    visit_order: Vec<String>,
    pending: Option<String>,
}

impl ProximityWatcher {
    pub fn new(pois: Vec<Poi>) -> Self {
        let mut seen = HashSet::new();
        for poi in &pois {
            if !seen.insert(poi.name.as_str()) {
                log::warn!(
                    "[ProximityWatcher] Duplicate POI name '{}': treated as one POI",
                    poi.name
                );
            }
        }

        Self {
            pois,
            visited: HashSet::new(),
            visit_order: Vec::new(),
            pending: None,
        }
    }

    pub fn pois(&self) -> &[Poi] {
        &self.pois
    }

    pub fn is_visited(&self, name: &str) -> bool {
        self.visited.contains(name)
    }

    /// Visited POI names in arrival order.
    pub fn visited(&self) -> &[String] {
        &self.visit_order
    }

    /// Name of the arrival awaiting acknowledgement, if any.
    pub fn pending(&self) -> Option<&str> {
        self.pending.as_deref()
    }

    /// Mark the outstanding arrival as delivered.
    pub fn acknowledge(&mut self) -> Option<String> {
        self.pending.take()
    }

    /// Check a position against the POI list.
    pub fn on_position(&mut self, position: &GpsPoint) -> Option<Arrival> {
        if self.pending.is_some() {
            return None;
        }

        let (poi, distance_m) = self
            .pois
            .iter()
            .filter(|poi| !self.visited.contains(&poi.name))
            .map(|poi| (poi, haversine_distance(position, &poi.point())))
            .find(|(poi, d)| *d <= poi.radius_m)?;

        let name = poi.name.clone();
        log::info!(
            "[ProximityWatcher] Arrived at '{}' ({:.1}m)",
            name,
            distance_m
        );
        self.visited.insert(name.clone());
        self.visit_order.push(name.clone());
        self.pending = Some(name.clone());

        Some(Arrival {
            poi_name: name,
            distance_m,
        })
    }

    /// Forget all visits (new session).
    pub fn reset(&mut self) {
        self.visited.clear();
        self.visit_order.clear();
        self.pending = None;
    }
}

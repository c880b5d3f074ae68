//! HTTP client for the pedestrian routing proxy.
//!
//! The proxy exposes `GET /api/tmap/pedestrian` and answers with
//! `{ok, path: [[lng, lat], ...], summary: {totalDistance, totalTime}}`.
//! This module provides:
//! - An async client with retry and exponential backoff on transport errors
//! - A blocking wrapper for callers outside a tokio runtime
//! - [`RoutedCourses`], a [`RouteProvider`] that maps course ids to proxy
//!   requests

use std::collections::HashMap;
use std::time::Duration;

use log::{debug, info, warn};
use reqwest::Client;
use serde::{Deserialize, Serialize};

use crate::course::{CourseId, RouteProvider};
use crate::error::{Result, TrackerError};
use crate::GpsPoint;

const REQUEST_TIMEOUT_SECS: u64 = 15;
const MAX_RETRIES: u32 = 3;

/// Search option sent when the caller doesn't pick one ("recommended").
pub const DEFAULT_SEARCH_OPTION: &str = "0";

/// Distance/time totals reported by the routing service.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RouteSummary {
    /// Meters
    pub total_distance: Option<f64>,
    /// Seconds
    pub total_time: Option<f64>,
}

/// A routed pedestrian path.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PedestrianRoute {
    pub points: Vec<GpsPoint>,
    pub summary: Option<RouteSummary>,
}

/// Proxy response body
#[derive(Debug, Deserialize)]
struct ProxyResponse {
    ok: bool,
    #[serde(default)]
    path: Vec<[f64; 2]>,
    summary: Option<RouteSummary>,
    message: Option<String>,
}

/// Interpret a proxy response.
///
/// `502` with `ok: false` is the proxy's "no route found" answer and maps to
/// `Ok(None)`, as does an empty path.
fn parse_response(status: u16, body: &str) -> Result<Option<PedestrianRoute>> {
    let response: ProxyResponse =
        serde_json::from_str(body).map_err(|e| TrackerError::Http {
            message: format!("Parse error: {}", e),
            status_code: Some(status),
        })?;

    if !response.ok {
        if status == 502 {
            return Ok(None);
        }
        return Err(TrackerError::Http {
            message: response
                .message
                .unwrap_or_else(|| "routing request failed".to_string()),
            status_code: Some(status),
        });
    }

    // [lng, lat] pairs; drop anything out of range
    let points: Vec<GpsPoint> = response
        .path
        .iter()
        .map(|&[lng, lat]| GpsPoint::new(lat, lng))
        .filter(GpsPoint::is_valid)
        .collect();

    if points.is_empty() {
        return Ok(None);
    }
    Ok(Some(PedestrianRoute {
        points,
        summary: response.summary,
    }))
}

/// Client for the pedestrian routing proxy.
pub struct PedestrianRouteClient {
    client: Client,
    endpoint: String,
    search_option: String,
}

impl PedestrianRouteClient {
    /// `base_url` is the proxy root, e.g. `http://localhost:4000`.
    pub fn new(base_url: &str) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .build()
            .map_err(|e| TrackerError::Http {
                message: format!("Failed to create HTTP client: {}", e),
                status_code: None,
            })?;

        Ok(Self {
            client,
            endpoint: format!("{}/api/tmap/pedestrian", base_url.trim_end_matches('/')),
            search_option: DEFAULT_SEARCH_OPTION.to_string(),
        })
    }

    pub fn with_search_option(mut self, option: impl Into<String>) -> Self {
        self.search_option = option.into();
        self
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    pub fn search_option(&self) -> &str {
        &self.search_option
    }

    /// Request a walking route between two points.
    pub async fn fetch_route(
        &self,
        start: GpsPoint,
        goal: GpsPoint,
    ) -> Result<Option<PedestrianRoute>> {
        let query = [
            ("startLng", start.longitude.to_string()),
            ("startLat", start.latitude.to_string()),
            ("goalLng", goal.longitude.to_string()),
            ("goalLat", goal.latitude.to_string()),
            ("searchOption", self.search_option.clone()),
        ];

        let mut retries = 0;
        loop {
            match self.client.get(&self.endpoint).query(&query).send().await {
                Ok(resp) => {
                    let status = resp.status().as_u16();
                    let body = resp.text().await.map_err(|e| TrackerError::Http {
                        message: format!("Failed to read body: {}", e),
                        status_code: Some(status),
                    })?;
                    let route = parse_response(status, &body)?;
                    match &route {
                        Some(r) => info!(
                            "[PedestrianRouteClient] Route with {} points",
                            r.points.len()
                        ),
                        None => info!("[PedestrianRouteClient] No route found"),
                    }
                    return Ok(route);
                }
                Err(e) => {
                    retries += 1;
                    if retries > MAX_RETRIES {
                        return Err(TrackerError::Http {
                            message: format!("Request error: {}", e),
                            status_code: e.status().map(|s| s.as_u16()),
                        });
                    }

                    let backoff = Duration::from_millis(500 * (1 << retries));
                    warn!(
                        "[PedestrianRouteClient] Error: {}, retry {} after {:?}",
                        e, retries, backoff
                    );
                    tokio::time::sleep(backoff).await;
                }
            }
        }
    }

    /// Blocking wrapper around [`fetch_route`](Self::fetch_route).
    ///
    /// Returns an error when called from inside a tokio runtime.
    pub fn fetch_route_blocking(
        &self,
        start: GpsPoint,
        goal: GpsPoint,
    ) -> Result<Option<PedestrianRoute>> {
        ensure_outside_runtime()?;
        let rt = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .map_err(|e| TrackerError::Http {
                message: format!("Runtime error: {}", e),
                status_code: None,
            })?;
        rt.block_on(self.fetch_route(start, goal))
    }
}

/// Blocking on a runtime worker thread would panic.
fn ensure_outside_runtime() -> Result<()> {
    if tokio::runtime::Handle::try_current().is_ok() {
        return Err(TrackerError::Http {
            message: "blocking route request inside an async runtime; use fetch_route"
                .to_string(),
            status_code: None,
        });
    }
    Ok(())
}

/// Courses whose paths come from the routing proxy.
pub struct RoutedCourses {
    client: PedestrianRouteClient,
    endpoints: HashMap<CourseId, (GpsPoint, GpsPoint)>,
}

impl RoutedCourses {
    pub fn new(client: PedestrianRouteClient) -> Self {
        Self {
            client,
            endpoints: HashMap::new(),
        }
    }

    /// Register the start and goal for a course.
    pub fn insert(&mut self, id: CourseId, start: GpsPoint, goal: GpsPoint) {
        self.endpoints.insert(id, (start, goal));
    }
}

impl RouteProvider for RoutedCourses {
    /// Failed requests are logged and reported as "no route". Calling this
    /// from async code is an error.
    fn path_for(&self, id: &CourseId) -> Result<Option<Vec<GpsPoint>>> {
        ensure_outside_runtime()?;
        let Some(&(start, goal)) = self.endpoints.get(id) else {
            debug!("[PedestrianRouteClient] No endpoints for {}", id);
            return Ok(None);
        };

        match self.client.fetch_route_blocking(start, goal) {
            Ok(route) => Ok(route.map(|r| r.points)),
            Err(e) => {
                warn!("[PedestrianRouteClient] {} routing failed: {}", id, e);
                Ok(None)
            }
        }
    }
}

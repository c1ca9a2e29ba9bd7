//! Parameters structure for the waypoint updater

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

use serde::Deserialize;

use crate::{planner::DecelProfile, route::Topology, updater::UpdaterError};

// ---------------------------------------------------------------------------
// CONSTANTS
// ---------------------------------------------------------------------------

/// Largest accepted lookahead. The segment is rebuilt every cycle so this bounds the per-cycle
/// allocation.
pub const MAX_LOOKAHEAD_WPS: usize = 100_000;

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// Parameters for the waypoint updater.
///
/// Any key missing from the parameter file takes its default value.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct WpUpdaterParams {

    // ---- CYCLE ----

    /// Number of waypoints ahead of the vehicle to publish each cycle.
    pub lookahead_wps: usize,

    /// Rate at which segments are published.
    ///
    /// Units: Hertz
    pub refresh_rate_hz: f64,

    /// If true the status report of every cycle is archived.
    pub archive: bool,

    // ---- ALGORITHMS ----

    pub locator: LocatorParams,

    /// Velocity profile used to bring the vehicle to a stop.
    pub decel: DecelProfile,

    // ---- ROUTE ----

    pub route: RouteParams,
}

/// Parameters of the closest waypoint locator.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct LocatorParams {
    /// Number of waypoints ahead of the previous index which are scanned on the first cycle or
    /// after a relocalisation.
    pub search_window_wps: usize,

    /// If the closest waypoint found by the local search is further than this from the vehicle
    /// the window is scanned.
    ///
    /// Units: meters
    pub relocalise_dist_m: f64,
}

/// Parameters describing the route loaded from file at start-up.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct RouteParams {
    /// Whether the route connects its last waypoint back to its first.
    pub closed_loop: bool,

    /// Path to a CSV route file, relative to the software root. If not set the route is expected
    /// over the network.
    pub file: Option<String>,

    /// Name of the frame the route file is expressed in.
    pub frame_id: String,

    /// Velocity given to route file rows which don't have one.
    ///
    /// Units: meters/second
    pub default_velocity_ms: f64,
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl WpUpdaterParams {
    /// Check that the parameters are usable.
    pub fn validate(&self) -> Result<(), UpdaterError> {
        if self.lookahead_wps == 0 || self.lookahead_wps > MAX_LOOKAHEAD_WPS {
            return Err(UpdaterError::InvalidParams(format!(
                "lookahead_wps must be between 1 and {}, got {}",
                MAX_LOOKAHEAD_WPS, self.lookahead_wps
            )));
        }

        if !self.refresh_rate_hz.is_finite() || self.refresh_rate_hz <= 0.0 {
            return Err(UpdaterError::InvalidParams(format!(
                "refresh_rate_hz must be positive, got {}",
                self.refresh_rate_hz
            )));
        }

        if self.locator.search_window_wps == 0 {
            return Err(UpdaterError::InvalidParams(
                "locator.search_window_wps must be at least 1".into(),
            ));
        }

        if !self.locator.relocalise_dist_m.is_finite() || self.locator.relocalise_dist_m < 0.0 {
            return Err(UpdaterError::InvalidParams(format!(
                "locator.relocalise_dist_m must be non-negative, got {}",
                self.locator.relocalise_dist_m
            )));
        }

        if let DecelProfile::ConstDecel { max_decel_ms2 } = self.decel {
            if !max_decel_ms2.is_finite() || max_decel_ms2 <= 0.0 {
                return Err(UpdaterError::InvalidParams(format!(
                    "decel.max_decel_ms2 must be positive, got {}",
                    max_decel_ms2
                )));
            }
        }

        if !self.route.default_velocity_ms.is_finite() {
            return Err(UpdaterError::InvalidParams(
                "route.default_velocity_ms must be finite".into(),
            ));
        }

        Ok(())
    }
}

impl RouteParams {
    pub fn topology(&self) -> Topology {
        match self.closed_loop {
            true => Topology::Closed,
            false => Topology::Open,
        }
    }
}

impl Default for WpUpdaterParams {
    fn default() -> Self {
        Self {
            lookahead_wps: 200,
            refresh_rate_hz: 30.0,
            archive: true,
            locator: LocatorParams::default(),
            decel: DecelProfile::default(),
            route: RouteParams::default(),
        }
    }
}

impl Default for LocatorParams {
    fn default() -> Self {
        Self {
            search_window_wps: 2000,
            relocalise_dist_m: 10.0,
        }
    }
}

impl Default for RouteParams {
    fn default() -> Self {
        Self {
            closed_loop: false,
            file: None,
            frame_id: String::from("world"),
            // 40 km/h
            default_velocity_ms: 11.11,
        }
    }
}

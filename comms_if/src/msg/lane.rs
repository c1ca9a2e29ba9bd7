//! Lane and waypoint messages

use serde::{Deserialize, Serialize};

use super::Header;

/// A single waypoint on a lane.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct WaypointMsg {
    /// Position of the waypoint in the header's frame
    pub position_m: [f64; 3],

    /// Orientation of the waypoint as a quaternion, ordered `[i, j, k, w]`
    pub orientation_q: [f64; 4],

    /// Target longitudinal velocity at this waypoint
    pub velocity_ms: f64,
}

/// An ordered sequence of waypoints.
///
/// Used both for the route pushed by the route loader and for the final
/// waypoints published to the trajectory follower.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Lane {
    pub header: Header,
    pub waypoints: Vec<WaypointMsg>,
}

/// The route to follow, pushed once by the route loader.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RouteMsg {
    pub lane: Lane,

    /// If true the last waypoint connects back to the first
    #[serde(default)]
    pub closed_loop: bool,
}

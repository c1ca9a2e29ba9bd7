//! # Route
//!
//! This module defines the pre-surveyed route followed by the vehicle, and the store which holds
//! it once loaded.

// ---------------------------------------------------------------------------
// MODULES
// ---------------------------------------------------------------------------

mod file;
mod store;

pub use self::store::{LoadOutcome, RouteStore};

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

use comms_if::msg::{Header, Lane, RouteMsg, WaypointMsg};
use nalgebra::{UnitQuaternion, Vector3};
use serde::{Deserialize, Serialize};

use crate::convert::{
    unit_quaternion_from_array, unit_quaternion_to_array, vector3_from_array, vector3_to_array,
};

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// A single point on the route.
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct Waypoint {
    /// Position of the waypoint in the route frame
    pub position_m: Vector3<f64>,

    /// Orientation of the route at this waypoint
    pub attitude_q: UnitQuaternion<f64>,

    /// Target longitudinal velocity at this waypoint
    pub velocity_ms: f64,
}

/// The ordered sequence of waypoints the vehicle is meant to follow.
///
/// The order of the waypoints is the order of travel. A route always contains at least one
/// waypoint and cannot be modified once built.
#[derive(Debug, Clone)]
pub struct Route {
    header: Header,
    waypoints: Vec<Waypoint>,
    topology: Topology,
}

// -----------------------------------------------------------------------------------------------
// ENUMS
// -----------------------------------------------------------------------------------------------

/// Whether the route ends at its last waypoint or connects back to the first.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Topology {
    Open,
    Closed,
}

#[derive(Debug, thiserror::Error)]
pub enum RouteError {
    #[error("Attempted to create a route with no waypoints")]
    EmptyRoute,

    #[error("Waypoint {0} has a non-finite position or velocity")]
    NonFiniteWaypoint(usize),

    #[error("Waypoint {0} has an invalid orientation")]
    InvalidOrientation(usize),

    #[error("Could not read the route file: {0}")]
    CsvError(::csv::Error),

    #[error("Row {0} of the route file is malformed")]
    MalformedCsvRow(usize),
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl Waypoint {
    pub fn new(position_m: Vector3<f64>, attitude_q: UnitQuaternion<f64>, velocity_ms: f64) -> Self {
        Self {
            position_m,
            attitude_q,
            velocity_ms,
        }
    }

    /// Create a waypoint whose orientation is a rotation of `yaw_rad` about the frame's z axis.
    pub fn from_yaw(position_m: Vector3<f64>, yaw_rad: f64, velocity_ms: f64) -> Self {
        Self::new(
            position_m,
            UnitQuaternion::from_euler_angles(0.0, 0.0, yaw_rad),
            velocity_ms,
        )
    }

    /// Return a copy of this waypoint with a different target velocity.
    pub fn with_velocity(mut self, velocity_ms: f64) -> Self {
        self.velocity_ms = velocity_ms;
        self
    }

    /// Returns true if the position, orientation and velocity are all finite.
    pub fn is_finite(&self) -> bool {
        self.position_m.iter().all(|v| v.is_finite())
            && self.attitude_q.coords.iter().all(|v| v.is_finite())
            && self.velocity_ms.is_finite()
    }

    /// Convert from the wire representation. `index` is the position of the waypoint in its
    /// lane, used to report which waypoint is malformed.
    pub fn from_msg(msg: &WaypointMsg, index: usize) -> Result<Self, RouteError> {
        let position_m =
            vector3_from_array(msg.position_m).ok_or(RouteError::NonFiniteWaypoint(index))?;
        let attitude_q = unit_quaternion_from_array(msg.orientation_q)
            .ok_or(RouteError::InvalidOrientation(index))?;

        if !msg.velocity_ms.is_finite() {
            return Err(RouteError::NonFiniteWaypoint(index));
        }

        Ok(Self::new(position_m, attitude_q, msg.velocity_ms))
    }

    /// Convert into the wire representation.
    pub fn to_msg(&self) -> WaypointMsg {
        WaypointMsg {
            position_m: vector3_to_array(&self.position_m),
            orientation_q: unit_quaternion_to_array(&self.attitude_q),
            velocity_ms: self.velocity_ms,
        }
    }
}

impl Route {
    /// Build a new route, validating that it is non-empty and that every waypoint is finite.
    pub fn new(
        header: Header,
        waypoints: Vec<Waypoint>,
        topology: Topology,
    ) -> Result<Self, RouteError> {
        if waypoints.is_empty() {
            return Err(RouteError::EmptyRoute);
        }

        if let Some(i) = waypoints.iter().position(|wp| !wp.is_finite()) {
            return Err(RouteError::NonFiniteWaypoint(i));
        }

        Ok(Self {
            header,
            waypoints,
            topology,
        })
    }

    /// Convert from a route message.
    pub fn from_msg(msg: &RouteMsg) -> Result<Self, RouteError> {
        let waypoints = msg
            .lane
            .waypoints
            .iter()
            .enumerate()
            .map(|(i, wp)| Waypoint::from_msg(wp, i))
            .collect::<Result<Vec<_>, _>>()?;

        let topology = match msg.closed_loop {
            true => Topology::Closed,
            false => Topology::Open,
        };

        Self::new(msg.lane.header.clone(), waypoints, topology)
    }

    /// Convert into a lane message.
    pub fn to_lane(&self) -> Lane {
        Lane {
            header: self.header.clone(),
            waypoints: self.waypoints.iter().map(Waypoint::to_msg).collect(),
        }
    }

    pub fn header(&self) -> &Header {
        &self.header
    }

    pub fn waypoints(&self) -> &[Waypoint] {
        &self.waypoints
    }

    pub fn topology(&self) -> Topology {
        self.topology
    }

    pub fn is_closed(&self) -> bool {
        self.topology == Topology::Closed
    }

    /// Get the number of waypoints in the route
    pub fn len(&self) -> usize {
        self.waypoints.len()
    }

    /// Always false, a route cannot be empty.
    pub fn is_empty(&self) -> bool {
        self.waypoints.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&Waypoint> {
        self.waypoints.get(index)
    }

    /// Target velocity of the waypoint at the given index.
    pub fn velocity(&self, index: usize) -> Option<f64> {
        self.get(index).map(|wp| wp.velocity_ms)
    }

    /// Index of the waypoint after `index` in the direction of travel.
    ///
    /// On a closed route this wraps from the last waypoint back to the first. On an open route
    /// `None` is returned for the last waypoint or an index outside the route.
    pub fn next_index(&self, index: usize) -> Option<usize> {
        if index >= self.len() {
            return None;
        }

        match self.topology {
            Topology::Open if index + 1 < self.len() => Some(index + 1),
            Topology::Open => None,
            Topology::Closed => Some((index + 1) % self.len()),
        }
    }

    /// Number of steps forward along the route needed to go from `from` to `to`.
    ///
    /// On an open route `None` is returned if `to` is behind `from`. `None` is also returned if
    /// either index is outside the route.
    pub fn forward_offset(&self, from: usize, to: usize) -> Option<usize> {
        let len = self.len();
        if from >= len || to >= len {
            return None;
        }

        match self.topology {
            Topology::Open if to >= from => Some(to - from),
            Topology::Open => None,
            Topology::Closed => Some((to + len - from) % len),
        }
    }

    /// Distance along the route, in meters, travelling forward from waypoint `from` to waypoint
    /// `to`.
    ///
    /// The distance is the sum of the straight line distances between each consecutive pair of
    /// waypoints. `None` is returned when `forward_offset` would return `None`.
    pub fn distance(&self, from: usize, to: usize) -> Option<f64> {
        let steps = self.forward_offset(from, to)?;
        let len = self.len();

        let mut dist_m = 0f64;
        let mut prev = from;
        for k in 1..=steps {
            let next = (from + k) % len;
            dist_m += (self.waypoints[next].position_m - self.waypoints[prev].position_m).norm();
            prev = next;
        }

        Some(dist_m)
    }
}

#[cfg(test)]
pub(crate) mod test {
    use super::*;
    use assert_approx_eq::assert_approx_eq;

    /// Build a route of `n` waypoints along +x, 1 m apart, all with the same velocity.
    pub(crate) fn straight_route(n: usize, velocity_ms: f64, topology: Topology) -> Route {
        Route::new(
            Header::now("world"),
            (0..n)
                .map(|i| Waypoint::from_yaw(Vector3::new(i as f64, 0.0, 0.0), 0.0, velocity_ms))
                .collect(),
            topology,
        )
        .unwrap()
    }

    #[test]
    fn test_empty_route_rejected() {
        assert!(matches!(
            Route::new(Header::now("world"), vec![], Topology::Open),
            Err(RouteError::EmptyRoute)
        ));
    }

    #[test]
    fn test_non_finite_waypoint_rejected() {
        let mut wps: Vec<Waypoint> = straight_route(5, 5.0, Topology::Open).waypoints().to_vec();
        wps[3].velocity_ms = std::f64::NAN;

        assert!(matches!(
            Route::new(Header::now("world"), wps, Topology::Open),
            Err(RouteError::NonFiniteWaypoint(3))
        ));
    }

    #[test]
    fn test_route_from_msg() {
        let route = straight_route(4, 5.0, Topology::Open);
        let msg = RouteMsg {
            lane: route.to_lane(),
            closed_loop: true,
        };

        let parsed = Route::from_msg(&msg).unwrap();
        assert_eq!(parsed.len(), 4);
        assert!(parsed.is_closed());
        assert_eq!(parsed.velocity(2), Some(5.0));

        let mut bad = msg.clone();
        bad.lane.waypoints[2].orientation_q = [0.0; 4];
        assert!(matches!(
            Route::from_msg(&bad),
            Err(RouteError::InvalidOrientation(2))
        ));

        let mut bad = msg;
        bad.lane.waypoints[1].position_m[0] = std::f64::INFINITY;
        assert!(matches!(
            Route::from_msg(&bad),
            Err(RouteError::NonFiniteWaypoint(1))
        ));
    }

    #[test]
    fn test_next_index() {
        let open = straight_route(3, 1.0, Topology::Open);
        assert_eq!(open.next_index(0), Some(1));
        assert_eq!(open.next_index(2), None);
        assert_eq!(open.next_index(5), None);

        let closed = straight_route(3, 1.0, Topology::Closed);
        assert_eq!(closed.next_index(2), Some(0));
    }

    #[test]
    fn test_forward_offset() {
        let open = straight_route(10, 1.0, Topology::Open);
        assert_eq!(open.forward_offset(3, 5), Some(2));
        assert_eq!(open.forward_offset(5, 3), None);
        assert_eq!(open.forward_offset(3, 10), None);

        let closed = straight_route(10, 1.0, Topology::Closed);
        assert_eq!(closed.forward_offset(8, 1), Some(3));
        assert_eq!(closed.forward_offset(4, 4), Some(0));
    }

    #[test]
    fn test_distance() {
        let open = straight_route(10, 1.0, Topology::Open);
        assert_approx_eq!(open.distance(2, 7).unwrap(), 5.0);
        assert_approx_eq!(open.distance(4, 4).unwrap(), 0.0);
        assert!(open.distance(7, 2).is_none());

        // Closing the loop adds the 9 m leg from the last waypoint back to the first
        let closed = straight_route(10, 1.0, Topology::Closed);
        assert_approx_eq!(closed.distance(8, 1).unwrap(), 1.0 + 9.0 + 1.0);
    }

    #[test]
    fn test_with_velocity_copies() {
        let route = straight_route(3, 5.0, Topology::Open);
        let wp = route.waypoints()[1].with_velocity(0.0);

        assert_eq!(wp.velocity_ms, 0.0);
        assert_eq!(route.velocity(1), Some(5.0));
    }
}

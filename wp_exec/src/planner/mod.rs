//! # Lookahead planner
//!
//! Builds the segment of the route published to the trajectory follower: the `horizon`
//! waypoints starting at the closest waypoint ahead of the vehicle, with the velocity brought
//! down to zero at a stop hint if one falls inside the segment.
//!
//! The segment holds copies of the route's waypoints, the velocity overlay never touches the
//! route itself.

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use comms_if::msg::{Header, Lane};
use log::warn;
use serde::Deserialize;

use crate::route::{Route, Waypoint};
use util::maths::{clamp, lin_map};

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

/// The slice of the route published on one cycle.
#[derive(Debug, Clone, PartialEq)]
pub struct Segment {
    /// Header of the route the segment was taken from
    pub header: Header,

    /// Index in the route of the first waypoint of the segment
    pub start_index: usize,

    pub waypoints: Vec<Waypoint>,
}

/// Output of the planner.
#[derive(Debug, Clone)]
pub struct Plan {
    pub segment: Segment,

    /// Offset into the segment of the stop waypoint, if the stop hint fell inside the segment
    pub stop_offset: Option<usize>,

    /// Distance along the route from the start of the segment to the stop waypoint
    ///
    /// Units: meters
    pub dist_to_stop_m: Option<f64>,

    /// True if the start index or the stop hint was outside the route and had to be clamped
    pub index_clamped: bool,
}

#[derive(Debug, Clone, Default)]
pub struct LookaheadPlanner {
    horizon: usize,
    decel: DecelProfile,
}

// ------------------------------------------------------------------------------------------------
// ENUMS
// ------------------------------------------------------------------------------------------------

/// Shape of the velocity ramp leading up to a stop.
#[derive(Debug, Copy, Clone, PartialEq, Deserialize)]
#[serde(tag = "profile")]
pub enum DecelProfile {
    /// Velocity falls linearly with the number of waypoints left before the stop.
    Linear,

    /// Velocity is that of a constant deceleration ending at the stop waypoint.
    ConstDecel {
        /// Units: meters/second^2
        #[serde(default = "default_max_decel_ms2")]
        max_decel_ms2: f64,
    },
}

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

impl Segment {
    pub fn len(&self) -> usize {
        self.waypoints.len()
    }

    pub fn is_empty(&self) -> bool {
        self.waypoints.is_empty()
    }

    /// Convert into the lane message published as the final waypoints.
    pub fn to_lane(&self) -> Lane {
        Lane {
            header: self.header.clone(),
            waypoints: self.waypoints.iter().map(Waypoint::to_msg).collect(),
        }
    }
}

impl LookaheadPlanner {
    pub fn new(horizon: usize, decel: DecelProfile) -> Self {
        Self { horizon, decel }
    }

    pub fn horizon(&self) -> usize {
        self.horizon
    }

    /// Build the segment starting at `start_index`, bringing the vehicle to a stop at
    /// `stop_hint` if given.
    pub fn plan(&self, route: &Route, start_index: usize, stop_hint: Option<usize>) -> Plan {
        let len = route.len();
        let mut index_clamped = false;

        let start_index = match start_index {
            i if i >= len => {
                warn!(
                    "Segment start index {} is outside the route ({} waypoints), clamping",
                    i, len
                );
                index_clamped = true;
                len - 1
            }
            i => i,
        };

        // Copy the waypoints out of the route. Open routes are truncated at the last waypoint,
        // closed routes wrap and are always the full horizon.
        let waypoints: Vec<Waypoint> = match route.is_closed() {
            true => (0..self.horizon)
                .map(|k| route.waypoints()[(start_index + k) % len])
                .collect(),
            false => {
                let end = (start_index + self.horizon).min(len);
                route.waypoints()[start_index..end].to_vec()
            }
        };

        let mut segment = Segment {
            header: route.header().clone(),
            start_index,
            waypoints,
        };

        let stop_index = stop_hint.map(|s| match s {
            s if s >= len => {
                warn!(
                    "Stop hint {} is outside the route ({} waypoints), clamping",
                    s, len
                );
                index_clamped = true;
                len - 1
            }
            s => s,
        });

        // Offset of the stop in the segment. On a closed route shorter than the horizon the
        // stop waypoint appears more than once, only the first occurence is used.
        let stop_offset = stop_index
            .and_then(|s| route.forward_offset(start_index, s))
            .filter(|&k| k < segment.len());

        let mut dist_to_stop_m = None;
        if let (Some(stop_offset), Some(stop_index)) = (stop_offset, stop_index) {
            self.decel.apply(&mut segment.waypoints, stop_offset);
            dist_to_stop_m = route.distance(start_index, stop_index);
        }

        Plan {
            segment,
            stop_offset,
            dist_to_stop_m,
            index_clamped,
        }
    }
}

impl DecelProfile {
    /// Overlay the stop ramp onto the waypoints, stopping at `stop_offset`.
    fn apply(&self, waypoints: &mut [Waypoint], stop_offset: usize) {
        for wp in waypoints.iter_mut().skip(stop_offset) {
            wp.velocity_ms = 0.0;
        }

        if stop_offset == 0 {
            return;
        }

        // Distance from each waypoint to the stop, accumulated backwards along the segment
        let mut dists_m = vec![0f64; stop_offset + 1];
        for k in (0..stop_offset).rev() {
            dists_m[k] = dists_m[k + 1]
                + (waypoints[k + 1].position_m - waypoints[k].position_m).norm();
        }

        let mut cap_ms = std::f64::INFINITY;
        for (k, wp) in waypoints.iter_mut().enumerate().take(stop_offset) {
            let raw_ms = match *self {
                DecelProfile::Linear => lin_map(
                    (0.0, stop_offset as f64),
                    (wp.velocity_ms, 0.0),
                    k as f64,
                ),
                DecelProfile::ConstDecel { max_decel_ms2 } => {
                    (2.0 * max_decel_ms2 * dists_m[k]).sqrt()
                }
            };

            // Never faster than the route allows, and never speeding up towards the stop
            let v_ms = clamp(raw_ms, 0.0, wp.velocity_ms.max(0.0)).min(cap_ms);
            wp.velocity_ms = v_ms;
            cap_ms = v_ms;
        }
    }
}

impl Default for DecelProfile {
    fn default() -> Self {
        DecelProfile::Linear
    }
}

fn default_max_decel_ms2() -> f64 {
    1.0
}

//! # Closest waypoint locator
//!
//! Finds the index of the route waypoint nearest to the vehicle which is still ahead of it.
//!
//! The search is hinted with the index found on the previous cycle. From the hint the locator
//! walks forward along the route while the distance to the vehicle keeps decreasing, which for a
//! vehicle advancing a few waypoints per cycle costs only a few distance evaluations. On the
//! first cycle, or if the local minimum is suspiciously far from the vehicle (a relocalisation or
//! a jump in the pose), a bounded window ahead of the hint is scanned instead.
//!
//! The locator only ever searches forward from the hint, so the index never moves backwards
//! along the route (modulo the route length on a closed route).

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use log::{debug, warn};
use ordered_float::OrderedFloat;
use std::cmp::Reverse;

use crate::{loc::Pose, params::LocatorParams, route::Route};

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

/// Stateful closest waypoint locator, remembering the index found on the previous cycle.
#[derive(Debug, Clone, Default)]
pub struct ClosestWaypointLocator {
    params: LocatorParams,

    /// Index found on the last call to `locate`, `None` before the first call.
    last_index: Option<usize>,
}

/// Result of locating the vehicle on the route.
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct Located {
    /// Index of the closest waypoint ahead of the vehicle
    pub index: usize,

    /// Distance from the vehicle to that waypoint
    ///
    /// Units: meters
    pub dist_m: f64,

    /// True if the bounded window scan was performed
    pub relocalised: bool,

    /// True if the hint was outside the route and had to be clamped
    pub hint_clamped: bool,
}

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

impl ClosestWaypointLocator {
    pub fn new(params: LocatorParams) -> Self {
        Self {
            params,
            last_index: None,
        }
    }

    /// The index found on the previous call, if any.
    pub fn last_index(&self) -> Option<usize> {
        self.last_index
    }

    /// Forget the previous index, the next call will scan from the start of the route.
    pub fn reset(&mut self) {
        self.last_index = None;
    }

    /// Locate the vehicle on the route, using and then updating the stored hint.
    pub fn locate(&mut self, pose: &Pose, route: &Route) -> Located {
        let located = self.locate_from(pose, route, self.last_index);
        self.last_index = Some(located.index);
        located
    }

    /// Locate the vehicle on the route starting from the given hint. A hint of `None` means no
    /// previous index is known, in which case the search starts from index 0 and always scans
    /// the window.
    pub fn locate_from(&self, pose: &Pose, route: &Route, hint: Option<usize>) -> Located {
        let len = route.len();
        let dist_to = |i: usize| -> f64 {
            route
                .get(i)
                .map(|wp| (wp.position_m - pose.position_m).norm())
                .unwrap_or(std::f64::INFINITY)
        };

        // Check the hint is inside the route
        let mut hint_clamped = false;
        let start = match hint {
            Some(h) if h >= len => {
                warn!(
                    "Locator hint {} is outside the route ({} waypoints), clamping",
                    h, len
                );
                hint_clamped = true;
                len - 1
            }
            Some(h) => h,
            None => 0,
        };

        let max_steps = self.params.search_window_wps.min(len - 1);

        // Local search: walk forward while the distance doesn't increase. Equal distances keep
        // walking so that ties go to the waypoint further along the route.
        let mut index = start;
        let mut dist_m = dist_to(index);
        let mut steps = 0;
        while steps < max_steps {
            let next = match route.next_index(index) {
                Some(n) => n,
                None => break,
            };
            let next_dist_m = dist_to(next);
            if next_dist_m > dist_m {
                break;
            }
            index = next;
            dist_m = next_dist_m;
            steps += 1;
        }

        // Window scan on the first cycle or if the local minimum is too far away
        let relocalised = hint.is_none() || dist_m > self.params.relocalise_dist_m;
        if relocalised {
            let window = match route.is_closed() {
                true => max_steps,
                false => max_steps.min(len - 1 - start),
            };

            let best = (0..=window)
                .map(|offset| ((start + offset) % len, offset))
                .min_by_key(|&(i, offset)| (OrderedFloat(dist_to(i)), Reverse(offset)));

            if let Some((i, _)) = best {
                let d = dist_to(i);
                if d < dist_m || (d == dist_m && route.forward_offset(index, i).unwrap_or(0) > 0) {
                    index = i;
                    dist_m = d;
                }
            }

            debug!(
                "Locator scanned {} waypoints from {}, closest is {} at {:.3} m",
                window + 1,
                start,
                index,
                dist_m
            );
        }

        // Directionality check, if the closest waypoint is behind the vehicle it has been passed
        // so use the next one.
        let behind = match route.get(index) {
            Some(wp) => (wp.position_m - pose.position_m).dot(&pose.forward()) < 0.0,
            None => false,
        };
        if behind {
            if let Some(next) = route.next_index(index) {
                index = next;
                dist_m = dist_to(index);
            }
        }

        Located {
            index,
            dist_m,
            relocalised,
            hint_clamped,
        }
    }
}

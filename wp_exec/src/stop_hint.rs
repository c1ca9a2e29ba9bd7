//! # Stop hints
//!
//! Perception reports where the vehicle must stop (the stop line of a red traffic light, or an
//! obstacle on the route) as an index into the route. Each source keeps only its latest hint.

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use comms_if::msg::StopSource;

use crate::{route::Route, snapshot::LatestCell};

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

/// The latest stop hint from each perception source.
#[derive(Debug, Default)]
pub struct StopHints {
    traffic: LatestCell<usize>,
    obstacle: LatestCell<usize>,
}

/// A copy of the stop hints taken at the start of a cycle.
#[derive(Debug, Default, Copy, Clone, PartialEq, Eq)]
pub struct StopHintSnapshot {
    pub traffic: Option<usize>,
    pub obstacle: Option<usize>,
}

// ------------------------------------------------------------------------------------------------
// ENUMS
// ------------------------------------------------------------------------------------------------

#[derive(Debug, thiserror::Error)]
pub enum StopHintError {
    #[error("Stop hint index {index} is outside the route ({route_len} waypoints)")]
    OutOfRange { index: usize, route_len: usize },
}

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

impl StopHints {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set or clear the hint from one source.
    ///
    /// If the route is known the index is checked against it, an out of range hint is rejected
    /// and the previous hint from that source is kept.
    pub fn set(
        &self,
        source: StopSource,
        index: Option<usize>,
        route: Option<&Route>,
    ) -> Result<(), StopHintError> {
        let cell = match source {
            StopSource::Traffic => &self.traffic,
            StopSource::Obstacle => &self.obstacle,
        };

        match (index, route) {
            (Some(index), Some(route)) if index >= route.len() => Err(StopHintError::OutOfRange {
                index,
                route_len: route.len(),
            }),
            (Some(index), _) => {
                cell.store(index);
                Ok(())
            }
            (None, _) => {
                cell.clear();
                Ok(())
            }
        }
    }

    pub fn snapshot(&self) -> StopHintSnapshot {
        StopHintSnapshot {
            traffic: self.traffic.snapshot(),
            obstacle: self.obstacle.snapshot(),
        }
    }
}

impl StopHintSnapshot {
    /// The stop hint which is reached first travelling forward along the route from
    /// `start_index`.
    ///
    /// Hints behind the start of an open route are ignored. Hints outside the route are passed
    /// through unchanged for the planner to clamp.
    pub fn effective(&self, route: &Route, start_index: usize) -> Option<usize> {
        let offset = |index: usize| -> Option<usize> {
            if index >= route.len() {
                // Past the end, so it comes after every valid hint
                return Some(usize::MAX);
            }
            route.forward_offset(start_index.min(route.len() - 1), index)
        };

        [self.traffic, self.obstacle]
            .iter()
            .filter_map(|h| *h)
            .filter_map(|h| offset(h).map(|o| (o, h)))
            .min()
            .map(|(_, h)| h)
    }
}

//! Stop hint messages

use serde::{Deserialize, Serialize};

/// The perception source a stop hint comes from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum StopSource {
    /// Stop line of a red or amber traffic light
    Traffic,

    /// An obstacle on the route
    Obstacle,
}

/// Index of the route waypoint the vehicle must stop at, or `None` to clear
/// the hint from this source.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct StopHintMsg {
    pub source: StopSource,
    pub index: Option<usize>,
}

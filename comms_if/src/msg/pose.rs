//! Vehicle pose message

use serde::{Deserialize, Serialize};

use super::Header;

/// The pose of the vehicle as estimated by localisation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PoseStamped {
    pub header: Header,

    /// Position of the vehicle in the header's frame
    pub position_m: [f64; 3],

    /// Attitude of the vehicle as a quaternion, ordered `[i, j, k, w]`
    pub orientation_q: [f64; 4],
}

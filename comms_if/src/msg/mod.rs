//! # Messages
//!
//! Wire-level shapes of the data exchanged over the network. These are plain serde structs using
//! arrays rather than maths types so that non-rust collaborators can produce and consume them.

// ------------------------------------------------------------------------------------------------
// MODULES
// ------------------------------------------------------------------------------------------------

mod lane;
mod pose;
mod stop;

pub use lane::*;
pub use pose::*;
pub use stop::*;

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use chrono::{serde::ts_milliseconds, DateTime, Utc};
use serde::{Deserialize, Serialize};

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

/// Standard message header.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Header {
    /// Sequence number of the message
    #[serde(default)]
    pub seq: u64,

    /// UTC timestamp at which the data was produced
    #[serde(with = "ts_milliseconds")]
    pub stamp: DateTime<Utc>,

    /// Name of the coordinate frame the data is expressed in
    pub frame_id: String,
}

// ------------------------------------------------------------------------------------------------
// ENUMS
// ------------------------------------------------------------------------------------------------

/// Any input the waypoint updater accepts on its input socket.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum WpInput {
    /// A new vehicle pose from localisation
    Pose(PoseStamped),

    /// The pre-surveyed route to follow
    Route(RouteMsg),

    /// A stop hint from perception
    StopHint(StopHintMsg),
}

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

impl Header {
    /// Create a new header in the given frame stamped with the current time.
    pub fn now<S: Into<String>>(frame_id: S) -> Self {
        Self {
            seq: 0,
            stamp: Utc::now(),
            frame_id: frame_id.into(),
        }
    }
}

impl Default for Header {
    fn default() -> Self {
        Self::now("world")
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_parse_pose_input() {
        let json = r#"{
            "Pose": {
                "header": { "seq": 4, "stamp": 1000, "frame_id": "world" },
                "position_m": [1.0, 2.0, 0.0],
                "orientation_q": [0.0, 0.0, 0.0, 1.0]
            }
        }"#;

        match serde_json::from_str::<WpInput>(json).unwrap() {
            WpInput::Pose(p) => {
                assert_eq!(p.header.seq, 4);
                assert_eq!(p.header.stamp.timestamp_millis(), 1000);
                assert_eq!(p.position_m, [1.0, 2.0, 0.0]);
            }
            i => panic!("Expected a pose input, got {:?}", i),
        }
    }

    #[test]
    fn test_parse_stop_hint_input() {
        let json = r#"{ "StopHint": { "source": "Traffic", "index": 12 } }"#;

        match serde_json::from_str::<WpInput>(json).unwrap() {
            WpInput::StopHint(h) => {
                assert_eq!(h.source, StopSource::Traffic);
                assert_eq!(h.index, Some(12));
            }
            i => panic!("Expected a stop hint input, got {:?}", i),
        }

        let json = r#"{ "StopHint": { "source": "Obstacle", "index": null } }"#;
        match serde_json::from_str::<WpInput>(json).unwrap() {
            WpInput::StopHint(h) => assert_eq!(h.index, None),
            i => panic!("Expected a stop hint input, got {:?}", i),
        }
    }

    #[test]
    fn test_route_closed_loop_defaults_to_open() {
        let json = r#"{
            "Route": {
                "lane": {
                    "header": { "stamp": 0, "frame_id": "world" },
                    "waypoints": [
                        { "position_m": [0.0, 0.0, 0.0], "orientation_q": [0.0, 0.0, 0.0, 1.0], "velocity_ms": 5.0 }
                    ]
                }
            }
        }"#;

        match serde_json::from_str::<WpInput>(json).unwrap() {
            WpInput::Route(r) => {
                assert!(!r.closed_loop);
                assert_eq!(r.lane.waypoints.len(), 1);
                assert_eq!(r.lane.header.seq, 0);
            }
            i => panic!("Expected a route input, got {:?}", i),
        }
    }
}

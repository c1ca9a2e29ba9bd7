//! # Localisation module
//!
//! This module holds the vehicle pose as estimated by the external localisation system. Poses
//! arrive far faster than the publish cycle, only the latest one is kept.

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

use std::convert::TryFrom;

use chrono::{DateTime, Utc};
use comms_if::msg::PoseStamped;
use nalgebra::{UnitQuaternion, Vector3};

use crate::{
    convert::{unit_quaternion_from_array, vector3_from_array},
    snapshot::LatestCell,
};

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// The pose (position and attitude in the route frame) of the vehicle.
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct Pose {
    /// The position in the route frame
    pub position_m: Vector3<f64>,

    /// The attitude of the vehicle in the route frame. Rotates the vehicle's body axes (x
    /// forward) into the route frame.
    pub attitude_q: UnitQuaternion<f64>,

    /// Time at which the pose was estimated
    pub stamp: DateTime<Utc>,
}

/// Holds the latest known vehicle pose.
///
/// Updates replace the stored pose atomically, readers get a copy of the most recent one.
#[derive(Debug, Default)]
pub struct PoseTracker {
    pose: LatestCell<Pose>,
}

// ------------------------------------------------------------------------------------------------
// ENUMS
// ------------------------------------------------------------------------------------------------

#[derive(Debug, thiserror::Error)]
pub enum PoseError {
    #[error("The pose position is not finite")]
    NonFinitePosition,

    #[error("The pose attitude is not a valid rotation")]
    InvalidAttitude,
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl Pose {
    /// Create a new pose stamped with the current time.
    pub fn new(position_m: Vector3<f64>, attitude_q: UnitQuaternion<f64>) -> Self {
        Self {
            position_m,
            attitude_q,
            stamp: Utc::now(),
        }
    }

    /// Create a new pose at the given position with the given heading (rotation about the frame's
    /// z axis).
    pub fn from_heading(position_m: Vector3<f64>, heading_rad: f64) -> Self {
        Self::new(
            position_m,
            UnitQuaternion::from_euler_angles(0.0, 0.0, heading_rad),
        )
    }

    /// Return the heading (angle to the positive X axis) of the vehicle in radians.
    pub fn heading(&self) -> f64 {
        self.attitude_q.euler_angles().2
    }

    /// Unit vector pointing in the direction the vehicle is facing, in the route frame.
    pub fn forward(&self) -> Vector3<f64> {
        self.attitude_q * Vector3::x()
    }

    /// Returns true if the position and attitude are finite.
    pub fn is_finite(&self) -> bool {
        self.position_m.iter().all(|v| v.is_finite())
            && self.attitude_q.coords.iter().all(|v| v.is_finite())
    }
}

impl TryFrom<&PoseStamped> for Pose {
    type Error = PoseError;

    fn try_from(msg: &PoseStamped) -> Result<Self, Self::Error> {
        Ok(Self {
            position_m: vector3_from_array(msg.position_m).ok_or(PoseError::NonFinitePosition)?,
            attitude_q: unit_quaternion_from_array(msg.orientation_q)
                .ok_or(PoseError::InvalidAttitude)?,
            stamp: msg.header.stamp,
        })
    }
}

impl PoseTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the tracked pose.
    ///
    /// A non-finite pose is rejected and the previous pose is kept.
    pub fn update(&self, pose: Pose) -> Result<(), PoseError> {
        if !pose.position_m.iter().all(|v| v.is_finite()) {
            return Err(PoseError::NonFinitePosition);
        }
        if !pose.is_finite() {
            return Err(PoseError::InvalidAttitude);
        }

        self.pose.store(pose);

        Ok(())
    }

    /// Get the latest pose, or `None` if no pose has been recieved yet.
    pub fn snapshot(&self) -> Option<Pose> {
        self.pose.snapshot()
    }
}

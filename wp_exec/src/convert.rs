//! Conversions between the array types used on the wire and nalgebra types.

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use nalgebra::{Quaternion, UnitQuaternion, Vector3};
use util::maths::all_finite;

// ------------------------------------------------------------------------------------------------
// CONSTANTS
// ------------------------------------------------------------------------------------------------

/// Quaternions with a norm below this cannot be normalised into a rotation.
const MIN_QUAT_NORM: f64 = 1e-9;

// ------------------------------------------------------------------------------------------------
// FUNCTIONS
// ------------------------------------------------------------------------------------------------

/// Build a position vector, or `None` if any element is not finite.
pub fn vector3_from_array(a: [f64; 3]) -> Option<Vector3<f64>> {
    if all_finite(&a) {
        Some(Vector3::new(a[0], a[1], a[2]))
    } else {
        None
    }
}

/// Convert a position vector into its wire representation.
pub fn vector3_to_array(v: &Vector3<f64>) -> [f64; 3] {
    [v[0], v[1], v[2]]
}

/// Build a unit quaternion from an `[i, j, k, w]` array.
///
/// The quaternion is normalised. `None` is returned if any element is not finite or the
/// quaternion is (close to) zero.
pub fn unit_quaternion_from_array(q: [f64; 4]) -> Option<UnitQuaternion<f64>> {
    if !all_finite(&q) {
        return None;
    }

    let quat = Quaternion::new(q[3], q[0], q[1], q[2]);

    if quat.norm() < MIN_QUAT_NORM {
        return None;
    }

    Some(UnitQuaternion::from_quaternion(quat))
}

/// Convert a unit quaternion into an `[i, j, k, w]` array.
pub fn unit_quaternion_to_array(q: &UnitQuaternion<f64>) -> [f64; 4] {
    let c = q.quaternion().coords;
    [c[0], c[1], c[2], c[3]]
}

//! Geometry helpers over body landmarks.
//!
//! All functions are pure. Invalid input (a non-finite planar coordinate)
//! yields NaN instead of an error so that a bad landmark only removes the
//! measurements that depend on it.

use crate::types::Keypoint;

/// Interior angle at `b` formed by `a-b-c`, in degrees, using x/y only.
///
/// Returns 0 when either arm has zero length.
pub fn angle_2d(a: &Keypoint, b: &Keypoint, c: &Keypoint) -> f32 {
    if !(a.is_valid() && b.is_valid() && c.is_valid()) {
        return f32::NAN;
    }
    let ba = [a.x - b.x, a.y - b.y];
    let bc = [c.x - b.x, c.y - b.y];
    angle_between(&ba, &bc)
}

/// Interior angle at `b` in three dimensions.
///
/// Falls back to [`angle_2d`] when any of the three points lacks depth.
pub fn angle_3d(a: &Keypoint, b: &Keypoint, c: &Keypoint) -> f32 {
    if !(a.is_valid() && b.is_valid() && c.is_valid()) {
        return f32::NAN;
    }
    match (a.z, b.z, c.z) {
        (Some(az), Some(bz), Some(cz)) => {
            let ba = [a.x - b.x, a.y - b.y, az - bz];
            let bc = [c.x - b.x, c.y - b.y, cz - bz];
            angle_between(&ba, &bc)
        }
        _ => angle_2d(a, b, c),
    }
}

/// Unsigned angle of the line `a → b` from the vertical axis, in [0, 90].
pub fn angle_from_vertical(a: &Keypoint, b: &Keypoint) -> f32 {
    if !(a.is_valid() && b.is_valid()) {
        return f32::NAN;
    }
    let dx = (b.x - a.x).abs();
    let dy = (b.y - a.y).abs();
    if dx == 0.0 && dy == 0.0 {
        return 0.0;
    }
    dx.atan2(dy).to_degrees()
}

/// Unsigned angle of the line `a → b` from the horizontal axis, in [0, 90].
pub fn angle_from_horizontal(a: &Keypoint, b: &Keypoint) -> f32 {
    if !(a.is_valid() && b.is_valid()) {
        return f32::NAN;
    }
    let dx = (b.x - a.x).abs();
    let dy = (b.y - a.y).abs();
    if dx == 0.0 && dy == 0.0 {
        return 0.0;
    }
    dy.atan2(dx).to_degrees()
}

/// Euclidean distance in the image plane.
pub fn distance_2d(a: &Keypoint, b: &Keypoint) -> f32 {
    if !(a.is_valid() && b.is_valid()) {
        return f32::NAN;
    }
    (b.x - a.x).hypot(b.y - a.y)
}

/// Euclidean distance including depth when both points carry it.
pub fn distance_3d(a: &Keypoint, b: &Keypoint) -> f32 {
    if !(a.is_valid() && b.is_valid()) {
        return f32::NAN;
    }
    match (a.z, b.z) {
        (Some(az), Some(bz)) => {
            let (dx, dy, dz) = (b.x - a.x, b.y - a.y, bz - az);
            (dx * dx + dy * dy + dz * dz).sqrt()
        }
        _ => distance_2d(a, b),
    }
}

/// Midpoint of two landmarks. Depth and visibility are averaged only when
/// both sides have them.
pub fn midpoint(a: &Keypoint, b: &Keypoint) -> Keypoint {
    Keypoint {
        x: (a.x + b.x) / 2.0,
        y: (a.y + b.y) / 2.0,
        z: a.z.zip(b.z).map(|(az, bz)| (az + bz) / 2.0),
        visibility: a
            .visibility
            .zip(b.visibility)
            .map(|(av, bv)| (av + bv) / 2.0),
    }
}

/// True when the landmark is valid and confident enough.
/// A landmark without a visibility score counts as visible.
pub fn is_visible(keypoint: &Keypoint, min_visibility: f32) -> bool {
    keypoint.is_valid() && keypoint.visibility.map_or(true, |v| v >= min_visibility)
}

pub fn all_visible<'a>(
    keypoints: impl IntoIterator<Item = &'a Keypoint>,
    min_visibility: f32,
) -> bool {
    keypoints
        .into_iter()
        .all(|kp| is_visible(kp, min_visibility))
}

fn angle_between(u: &[f32], v: &[f32]) -> f32 {
    let dot: f32 = u.iter().zip(v).map(|(a, b)| a * b).sum();
    let norm_u = u.iter().map(|a| a * a).sum::<f32>().sqrt();
    let norm_v = v.iter().map(|a| a * a).sum::<f32>().sqrt();

    if norm_u == 0.0 || norm_v == 0.0 {
        return 0.0;
    }

    let cos = (dot / (norm_u * norm_v)).clamp(-1.0, 1.0);
    cos.acos().to_degrees()
}

// ============================================================================
// TESTS
// ============================================================================

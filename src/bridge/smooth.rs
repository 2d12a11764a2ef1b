//! Visibility-weighted landmark smoothing
//!
//! Exponential blend between the previous smoothed frame and the new
//! detection. Low-visibility joints are frozen in place rather than blended,
//! so occluded limbs do not drag the skeleton around.

use super::landmarks::{Landmark, LandmarkFrame, LANDMARK_COUNT};

/// Blend factor applied to the visibility value itself
const VISIBILITY_ALPHA: f32 = 0.3;

fn lerp(a: f32, b: f32, t: f32) -> f32 {
    a + (b - a) * t
}

/// Position blend factor for one joint, keyed off detector confidence.
///
/// - below 0.4: hold the previous position (pure jitter territory)
/// - 0.4-0.6: blend slowly
/// - above 0.6: track the detection closely
fn position_factor(visibility: f32) -> f32 {
    if visibility < 0.4 {
        0.0
    } else if visibility < 0.6 {
        0.2
    } else {
        0.7
    }
}

/// Smooth a new detection against the previous smoothed frame.
///
/// Stateless given both inputs; the caller owns the previous frame.
pub fn smooth(current: &LandmarkFrame, previous: &LandmarkFrame) -> LandmarkFrame {
    let mut out = [Landmark::default(); LANDMARK_COUNT];
    for i in 0..LANDMARK_COUNT {
        let p = &current[i];
        let q = &previous[i];
        let f = position_factor(p.visibility);
        out[i] = Landmark {
            x: lerp(q.x, p.x, f),
            y: lerp(q.y, p.y, f),
            z: lerp(q.z, p.z, f),
            visibility: lerp(q.visibility, p.visibility, VISIBILITY_ALPHA),
        };
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frame_with(x: f32, visibility: f32) -> LandmarkFrame {
        [Landmark::new(x, x, 0.0, visibility); LANDMARK_COUNT]
    }

    #[test]
    fn test_high_visibility_tracks_quickly() {
        let prev = frame_with(0.0, 1.0);
        let cur = frame_with(1.0, 1.0);
        let out = smooth(&cur, &prev);
        assert!((out[0].x - 0.7).abs() < 1e-6);
    }

    #[test]
    fn test_low_visibility_freezes_position() {
        let prev = frame_with(0.2, 1.0);
        let cur = frame_with(0.9, 0.3);
        let out = smooth(&cur, &prev);
        // Position held, but visibility still blends downward
        assert!((out[0].x - 0.2).abs() < 1e-6);
        assert!(out[0].visibility < 1.0);
    }

    #[test]
    fn test_mid_visibility_blends_slowly() {
        let prev = frame_with(0.0, 0.5);
        let cur = frame_with(1.0, 0.5);
        let out = smooth(&cur, &prev);
        assert!((out[0].x - 0.2).abs() < 1e-6);
    }
}

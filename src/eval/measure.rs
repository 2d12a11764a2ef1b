//! Joint angle calculation with typed failure modes
//!
//! The evaluators distinguish two kinds of "can't measure": a joint
//! with low detector confidence is treated as neutral (angle 0, position
//! gating fails open), while a degenerate zero-length limb segment is treated
//! as unmeasurable (sentinel 999, comparisons fail closed). Callers rely on
//! that asymmetry, so it is kept explicit in `Measurement` instead of being
//! unified.

use crate::bridge::landmarks::Landmark;

/// Sentinel for a low-confidence measurement: "assume neutral"
pub const LOW_CONFIDENCE_DEGREES: f32 = 0.0;

/// Sentinel for a degenerate measurement: "fail every range check"
pub const UNMEASURABLE_DEGREES: f32 = 999.0;

/// Outcome of a single geometric measurement
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum Measurement {
    /// A usable value in degrees
    Value(f32),
    /// A contributing joint was below the caller's visibility threshold
    LowConfidence,
    /// Zero-length segment; the angle does not exist
    Unmeasurable,
}

impl Measurement {
    /// The measured value, if there is one
    pub fn value(self) -> Option<f32> {
        match self {
            Measurement::Value(v) => Some(v),
            _ => None,
        }
    }

    /// Collapse to the legacy sentinel encoding: low confidence reads as 0
    /// (neutral), degenerate reads as 999 (out of every accepted band).
    pub fn sentinel(self) -> f32 {
        match self {
            Measurement::Value(v) => v,
            Measurement::LowConfidence => LOW_CONFIDENCE_DEGREES,
            Measurement::Unmeasurable => UNMEASURABLE_DEGREES,
        }
    }

    /// Collapse with both failure modes reading as 0. Used where a
    /// degenerate segment means "no bend" rather than "invalid".
    pub fn fail_open(self) -> f32 {
        match self {
            Measurement::Value(v) => v,
            _ => 0.0,
        }
    }

    pub fn is_value(self) -> bool {
        matches!(self, Measurement::Value(_))
    }
}

/// Angle in degrees at vertex `b` between rays b→a and b→c, from bare
/// positions (no visibility gate).
pub fn point_angle(a: (f32, f32), b: (f32, f32), c: (f32, f32)) -> Measurement {
    let v1 = (a.0 - b.0, a.1 - b.1);
    let v2 = (c.0 - b.0, c.1 - b.1);

    let dot = v1.0 * v2.0 + v1.1 * v2.1;
    let m1 = (v1.0 * v1.0 + v1.1 * v1.1).sqrt();
    let m2 = (v2.0 * v2.0 + v2.1 * v2.1).sqrt();
    if m1 == 0.0 || m2 == 0.0 {
        return Measurement::Unmeasurable;
    }

    // Clamp before acos so floating-point drift cannot produce NaN
    let cos = (dot / (m1 * m2)).clamp(-1.0, 1.0);
    Measurement::Value(cos.acos().to_degrees())
}

/// Angle at vertex `b` between landmark rays, gated on visibility.
///
/// Pass `vis_thr = 0.0` to disable the gate; several evaluators measure
/// joints without gating and lean on their own debouncing instead.
pub fn joint_angle(a: &Landmark, b: &Landmark, c: &Landmark, vis_thr: f32) -> Measurement {
    if a.visibility < vis_thr || b.visibility < vis_thr || c.visibility < vis_thr {
        return Measurement::LowConfidence;
    }
    point_angle(a.pos(), b.pos(), c.pos())
}

/// Midpoint of two landmarks in the image plane
pub fn midpoint(a: &Landmark, b: &Landmark) -> (f32, f32) {
    ((a.x + b.x) / 2.0, (a.y + b.y) / 2.0)
}

/// Vertical shoulder-to-hip distance, the normalization base for most
/// body-relative thresholds
pub fn torso_height(
    left_shoulder: &Landmark,
    right_shoulder: &Landmark,
    left_hip: &Landmark,
    right_hip: &Landmark,
) -> f32 {
    let shoulder_y = (left_shoulder.y + right_shoulder.y) / 2.0;
    let hip_y = (left_hip.y + right_hip.y) / 2.0;
    (hip_y - shoulder_y).abs()
}

pub fn clamp01(v: f32) -> f32 {
    v.clamp(0.0, 1.0)
}

/// Linear ramp: 0 at `min`, 1 at `max`, clamped
pub fn scale01(value: f32, min: f32, max: f32) -> f32 {
    if max == min {
        return 0.0;
    }
    clamp01((value - min) / (max - min))
}

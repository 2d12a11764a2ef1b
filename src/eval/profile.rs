//! Camera-distance calibration profiles
//!
//! Two tunings exist: close range (~1 m) and far range (~2 m). They differ
//! only in numeric constants, never in algorithm shape, so each evaluator
//! that needs them takes a profile value instead of duplicating code paths.
//! The constants are tuned against real captures; do not round them.

/// How far the camera sits from the subject
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CameraRange {
    /// ~1 m: strong perspective distortion, feet partially cropped
    Near,
    /// ~2 m: full body in frame, weaker landmark confidence
    Far,
}

impl CameraRange {
    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "1m" | "near" => Some(CameraRange::Near),
            "2m" | "far" => Some(CameraRange::Far),
            _ => None,
        }
    }
}

/// Squat tuning per camera range
#[derive(Clone, Copy, Debug)]
pub struct SquatProfile {
    pub range: CameraRange,
    /// Blend both legs' angles by confidence when the sides agree (close
    /// range only; reduces perspective distortion). Far range takes the
    /// minimum of the valid sides.
    pub blend_side_angles: bool,
    /// Use a 15th-percentile robust knee minimum instead of the raw minimum
    /// (close range only; rejects single-frame angle spikes)
    pub percentile_knee: bool,
    /// Consecutive confirming frames before a heel lift counts
    pub heel_confirm_frames: u32,
    /// Toe-heel delta from baseline that flags a lift, as a fraction of shin
    pub heel_delta_ratio: f32,
    /// Absolute toe-heel difference that flags a lift, as a fraction of shin
    pub heel_diff_ratio: f32,
    /// Hip depth (ankle-to-hip vertical, normalized) at or below which depth
    /// is considered good
    pub hip_depth_good: f32,
}

impl SquatProfile {
    pub fn for_range(range: CameraRange) -> Self {
        match range {
            CameraRange::Near => Self {
                range,
                blend_side_angles: true,
                percentile_knee: true,
                heel_confirm_frames: 3,
                heel_delta_ratio: 0.18,
                heel_diff_ratio: 0.20,
                hip_depth_good: 0.09,
            },
            CameraRange::Far => Self {
                range,
                blend_side_angles: false,
                percentile_knee: false,
                heel_confirm_frames: 5,
                heel_delta_ratio: 0.25,
                heel_diff_ratio: 0.28,
                hip_depth_good: 0.06,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_range_parsing() {
        assert_eq!(CameraRange::from_str("1m"), Some(CameraRange::Near));
        assert_eq!(CameraRange::from_str("far"), Some(CameraRange::Far));
        assert_eq!(CameraRange::from_str("3m"), None);
    }

    #[test]
    fn test_profiles_differ_only_in_constants() {
        let near = SquatProfile::for_range(CameraRange::Near);
        let far = SquatProfile::for_range(CameraRange::Far);
        assert_eq!(near.heel_confirm_frames, 3);
        assert_eq!(far.heel_confirm_frames, 5);
        assert!(near.hip_depth_good > far.hip_depth_good);
    }
}

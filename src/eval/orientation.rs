//! Orientation / anti-cheat tracker
//!
//! Detects a subject who turned too far and is effectively back-facing while
//! still passing the sideways checks. Purely additive: it gates, it never
//! feeds the exercise scoring. A bounded hysteresis score keeps one noisy
//! frame from flipping the gate.

use serde::Serialize;

use crate::bridge::landmarks::{
    Landmark, LandmarkFrame, LEFT_EAR, LEFT_EYE, LEFT_HIP, LEFT_SHOULDER, NOSE, RIGHT_EYE,
    RIGHT_HIP, RIGHT_SHOULDER,
};

/// Consecutive-suspicion score needed before back-facing is confirmed
const DEFAULT_CONFIRM_FRAMES: i32 = 3;

/// Ceiling for the suspicion score
const DEFAULT_MAX_SCORE: i32 = 6;

/// Shoulder-width over torso-height below this reads as a sideways pose
const SIDEWAYS_RATIO_MAX: f32 = 0.55;

/// Torso heights under this are too small to judge orientation from
const MIN_TORSO_HEIGHT: f32 = 0.08;

fn vis(lm: &Landmark) -> f32 {
    if lm.visibility.is_finite() {
        lm.visibility
    } else {
        0.0
    }
}

/// One frame's back-facing measurement
#[derive(Clone, Copy, Debug, Serialize)]
pub struct OrientationMeasurement {
    pub valid: bool,
    pub back_suspect: bool,
    pub hard_back_suspect: bool,
    pub reason: &'static str,
    pub torso_height: f32,
    pub sideways_ratio: f32,
    pub face_vis: f32,
    pub body_vis: f32,
    pub shoulder_z_delta: f32,
    pub hip_z_delta: f32,
}

impl OrientationMeasurement {
    fn invalid(reason: &'static str) -> Self {
        Self {
            valid: false,
            back_suspect: false,
            hard_back_suspect: false,
            reason,
            torso_height: 0.0,
            sideways_ratio: 0.0,
            face_vis: 0.0,
            body_vis: 0.0,
            shoulder_z_delta: 0.0,
            hip_z_delta: 0.0,
        }
    }
}

/// Judge whether this frame looks back-facing.
///
/// The load-bearing cue is shoulder X ordering: seen from the front, the
/// anatomical right shoulder sits left of the left shoulder in the mirrored
/// image; a flipped ordering while sideways means the subject turned away.
/// Face visibility and depth/visibility symmetry only serve as a softer
/// secondary path.
pub fn measure_back_facing(lm: &LandmarkFrame) -> OrientationMeasurement {
    let ls = &lm[LEFT_SHOULDER];
    let rs = &lm[RIGHT_SHOULDER];
    let lh = &lm[LEFT_HIP];
    let rh = &lm[RIGHT_HIP];

    let shoulder_mid_y = (ls.y + rs.y) / 2.0;
    let hip_mid_y = (lh.y + rh.y) / 2.0;
    let torso_height = (shoulder_mid_y - hip_mid_y).abs();
    if !torso_height.is_finite() || torso_height < MIN_TORSO_HEIGHT {
        return OrientationMeasurement::invalid("tiny-torso");
    }

    let shoulder_width = (ls.x - rs.x).abs();
    let sideways_ratio = shoulder_width / torso_height;
    let sideways_like = sideways_ratio < SIDEWAYS_RATIO_MAX;

    let shoulders_flipped = rs.x > ls.x + 0.02;

    let nose_vis = vis(&lm[NOSE]);
    let face_vis = nose_vis.max(vis(&lm[LEFT_EYE])).max(vis(&lm[RIGHT_EYE]));
    let body_vis = vis(ls).min(vis(rs)).min(vis(lh)).min(vis(rh));

    // z is noisy on some cameras, weak cue only
    let shoulder_z_delta = ls.z - rs.z;
    let hip_z_delta = lh.z - rh.z;
    let z_abs = shoulder_z_delta.abs().max(hip_z_delta.abs());

    // Back-facing often makes both sides look equally visible
    let shoulder_vis_delta = (vis(rs) - vis(ls)).abs();
    let hip_vis_delta = (vis(rh) - vis(lh)).abs();
    let vis_abs = shoulder_vis_delta.max(hip_vis_delta);

    let hard_back_suspect = sideways_like && body_vis > 0.35 && shoulders_flipped;

    let face_low = face_vis < 0.35;
    let dominance_weak = z_abs < 0.08 && vis_abs < 0.25;
    let back_suspect = hard_back_suspect
        || (sideways_like && body_vis > 0.35 && face_low && dominance_weak && shoulders_flipped);

    OrientationMeasurement {
        valid: true,
        back_suspect,
        hard_back_suspect,
        reason: if back_suspect {
            if hard_back_suspect {
                "hard-back-suspect"
            } else {
                "sideways-but-face-missing"
            }
        } else {
            "ok"
        },
        torso_height,
        sideways_ratio,
        face_vis,
        body_vis,
        shoulder_z_delta,
        hip_z_delta,
    }
}

/// Validation that the subject turned left and is showing their right
/// shoulder from the front (profile-setup anti-cheat).
#[derive(Clone, Copy, Debug, Serialize)]
pub struct ShoulderCheck {
    pub ok: bool,
    pub valid: bool,
    pub reason: &'static str,
    pub sideways_ratio: f32,
}

pub fn right_shoulder_shown(lm: &LandmarkFrame) -> ShoulderCheck {
    let ls = &lm[LEFT_SHOULDER];
    let rs = &lm[RIGHT_SHOULDER];
    let lh = &lm[LEFT_HIP];
    let rh = &lm[RIGHT_HIP];

    let shoulder_mid_y = (ls.y + rs.y) / 2.0;
    let hip_mid_y = (lh.y + rh.y) / 2.0;
    let torso_height = (shoulder_mid_y - hip_mid_y).abs();
    if !torso_height.is_finite() || torso_height < MIN_TORSO_HEIGHT {
        return ShoulderCheck {
            ok: false,
            valid: false,
            reason: "tiny-torso",
            sideways_ratio: 0.0,
        };
    }

    let shoulder_width = (ls.x - rs.x).abs();
    let sideways_ratio = shoulder_width / torso_height;
    if sideways_ratio >= SIDEWAYS_RATIO_MAX {
        return ShoulderCheck {
            ok: false,
            valid: true,
            reason: "not-sideways",
            sideways_ratio,
        };
    }

    // Flipped ordering means back-facing, reject outright
    let shoulders_correct = rs.x < ls.x - 0.02;
    if !shoulders_correct {
        return ShoulderCheck {
            ok: false,
            valid: true,
            reason: "shoulders-flipped-backfacing",
            sideways_ratio,
        };
    }

    let nose = &lm[NOSE];
    let lear = &lm[LEFT_EAR];

    // Face-direction cue, only trusted with strong face visibility
    let face_cue_valid = vis(nose) > 0.35 && vis(lear) > 0.30;
    let looking_left = face_cue_valid && lear.x < nose.x;

    let shoulder_z_delta = ls.z - rs.z;
    let hip_z_delta = lh.z - rh.z;
    let z_strong = shoulder_z_delta > 0.10 || hip_z_delta > 0.10;
    let z_moderate = shoulder_z_delta > 0.06 || hip_z_delta > 0.06;

    let shoulder_vis_delta = vis(rs) - vis(ls);
    let hip_vis_delta = vis(rh) - vis(lh);
    let vis_strong = shoulder_vis_delta > 0.32 || hip_vis_delta > 0.32;
    let vis_moderate = shoulder_vis_delta > 0.20 || hip_vis_delta > 0.20;

    // Without a visible face profile there is no distinguishing a proper
    // left turn from a back-facing right shoulder
    let face_vis = vis(nose).max(vis(&lm[LEFT_EYE])).max(vis(&lm[RIGHT_EYE]));
    let face_missing = vis(nose) < 0.30 || face_vis < 0.35;

    let ok = !face_missing
        && (looking_left
            || (face_cue_valid && (z_strong || vis_strong || (z_moderate && vis_moderate))));
    ShoulderCheck {
        ok,
        valid: true,
        reason: if ok { "ok" } else { "uncertain" },
        sideways_ratio,
    }
}

/// Verdict returned from each tracker update
#[derive(Clone, Copy, Debug, Serialize)]
pub struct OrientationVerdict {
    pub ok: bool,
    pub back_confirmed: bool,
    pub measurement: OrientationMeasurement,
}

/// Hysteresis accumulator over per-frame measurements.
///
/// A hard suspect frame jumps the score to the ceiling, a soft suspect adds
/// one, anything else (including an unreliable measurement) subtracts one.
/// Back-facing is only confirmed at the frame threshold.
pub struct OrientationTracker {
    back_score: i32,
    confirm_frames: i32,
    max_score: i32,
}

impl OrientationTracker {
    pub fn new() -> Self {
        Self::with_options(DEFAULT_CONFIRM_FRAMES, DEFAULT_MAX_SCORE)
    }

    pub fn with_options(confirm_frames: i32, max_score: i32) -> Self {
        Self {
            back_score: 0,
            confirm_frames,
            max_score,
        }
    }

    pub fn update(&mut self, lm: &LandmarkFrame) -> OrientationVerdict {
        let m = measure_back_facing(lm);

        if !m.valid {
            self.back_score = (self.back_score - 1).max(0);
        } else if m.back_suspect {
            if m.hard_back_suspect {
                self.back_score = self.max_score;
            } else {
                self.back_score = (self.back_score + 1).min(self.max_score);
            }
        } else {
            self.back_score = (self.back_score - 1).max(0);
        }

        let back_confirmed = self.back_score >= self.confirm_frames;
        OrientationVerdict {
            ok: !back_confirmed,
            back_confirmed,
            measurement: m,
        }
    }

    pub fn is_back_confirmed(&self) -> bool {
        self.back_score >= self.confirm_frames
    }

    pub fn reset(&mut self) {
        self.back_score = 0;
    }
}

impl Default for OrientationTracker {
    fn default() -> Self {
        Self::new()
    }
}

//! Standing forward bend evaluator
//!
//! A hold exercise rather than a rep exercise: the subject bends forward and
//! holds the deepest position they can. Depth is ranked by wrist height, a
//! short grace period forgives flickering hip angles, and the final score
//! combines hold completion with a graded form deduction.

use serde::Serialize;

use crate::bridge::landmarks::{
    LandmarkFrame, LEFT_ANKLE, LEFT_HIP, LEFT_KNEE, LEFT_SHOULDER, LEFT_WRIST, NOSE, RIGHT_ANKLE,
    RIGHT_HIP, RIGHT_KNEE, RIGHT_SHOULDER, RIGHT_WRIST,
};
use crate::eval::events::{CaptureRequest, CaptureSink, EvalEvent, FrameRef};
use crate::eval::measure::{clamp01, midpoint, point_angle, scale01};

/// Test window in milliseconds
const TEST_WINDOW_MS: f64 = 9_000.0;

/// Continuous bent time required for a valid attempt
const HOLD_REQUIRED_MS: f64 = 1_000.0;

/// Time the hold survives after the hip angle flickers back above the
/// bending threshold
const HOLD_GRACE_MS: f64 = 500.0;

/// Hip angle below this counts as bending. The boundary is exclusive: a
/// subject standing at exactly 160° is not bending.
const BENDING_DEGREES: f32 = 160.0;

/// New depth must beat the best wrist height by this margin to replace it
const DEPTH_MARGIN: f32 = 0.01;

/// One frame's posture measurements
#[derive(Clone, Copy, Debug, Serialize)]
pub struct BendMetrics {
    /// Torso-to-thigh angle at the hip, sides averaged. ~180° standing.
    pub hip_angle: f32,
    /// Hip flexion over thoracic flexion, from body midpoints
    pub ht_ratio: f32,
    /// 180° minus the straighter knee's angle
    pub knee_bend: f32,
    /// Wrist-to-ankle distance normalized by standing height
    pub reach_distance: f32,
    /// Horizontal hip drift over the ankles, normalized by leg length
    pub sway: f32,
    pub hip_flexion: f32,
    pub thoracic_flexion: f32,
}

/// Final forward bend result: the deepest attempt's metrics plus hold and
/// form outcomes
#[derive(Clone, Debug, Serialize)]
pub struct BendResult {
    pub score: f32,
    pub is_valid: bool,
    pub hold_ms: f64,
    pub metrics: Option<BendMetrics>,
    pub form: f32,
    pub frame: Option<FrameRef>,
}

/// All angles here are measured without a visibility gate, and a degenerate
/// segment reads as 0° so a collapsed detection looks like a deep bend
/// rather than standing. The hold debounce absorbs single bad frames.
fn bend_metrics(lm: &LandmarkFrame) -> BendMetrics {
    let shoulder_mid = midpoint(&lm[LEFT_SHOULDER], &lm[RIGHT_SHOULDER]);
    let hip_mid = midpoint(&lm[LEFT_HIP], &lm[RIGHT_HIP]);
    let knee_mid = midpoint(&lm[LEFT_KNEE], &lm[RIGHT_KNEE]);
    let ankle_mid = midpoint(&lm[LEFT_ANKLE], &lm[RIGHT_ANKLE]);

    let hip_angle_l = point_angle(lm[LEFT_SHOULDER].pos(), lm[LEFT_HIP].pos(), lm[LEFT_KNEE].pos())
        .fail_open();
    let hip_angle_r = point_angle(
        lm[RIGHT_SHOULDER].pos(),
        lm[RIGHT_HIP].pos(),
        lm[RIGHT_KNEE].pos(),
    )
    .fail_open();
    let hip_angle = (hip_angle_l + hip_angle_r) / 2.0;

    let hip_flexion = point_angle(shoulder_mid, hip_mid, knee_mid).fail_open();
    let thoracic_flexion = point_angle(shoulder_mid, hip_mid, ankle_mid).fail_open();
    let ht_ratio = if thoracic_flexion > 0.0 {
        hip_flexion / thoracic_flexion
    } else {
        0.0
    };

    let knee_angle_l =
        point_angle(lm[LEFT_HIP].pos(), lm[LEFT_KNEE].pos(), lm[LEFT_ANKLE].pos()).fail_open();
    let knee_angle_r = point_angle(
        lm[RIGHT_HIP].pos(),
        lm[RIGHT_KNEE].pos(),
        lm[RIGHT_ANKLE].pos(),
    )
    .fail_open();
    let knee_bend = 180.0 - knee_angle_l.min(knee_angle_r);

    let wrist_y = (lm[LEFT_WRIST].y + lm[RIGHT_WRIST].y) / 2.0;
    let ankle_y = (lm[LEFT_ANKLE].y + lm[RIGHT_ANKLE].y) / 2.0;
    let standing_height = (ankle_y - lm[NOSE].y).abs();
    let reach_distance = if standing_height > 0.0 {
        (wrist_y - ankle_y).abs() / standing_height
    } else {
        1.0
    };

    let hip_x = (lm[LEFT_HIP].x + lm[RIGHT_HIP].x) / 2.0;
    let ankle_x = (lm[LEFT_ANKLE].x + lm[RIGHT_ANKLE].x) / 2.0;
    let leg_length = (hip_mid.1 - ankle_mid.1).abs();
    let sway = if leg_length > 0.0 {
        (hip_x - ankle_x).abs() / leg_length
    } else {
        0.0
    };

    BendMetrics {
        hip_angle,
        ht_ratio,
        knee_bend,
        reach_distance,
        sway,
        hip_flexion,
        thoracic_flexion,
    }
}

/// Form on a 10-point scale, driven primarily by hip angle with graded
/// penalty bands, plus knee-bend and sway deductions and two small bonuses.
pub fn form_score(metrics: &BendMetrics) -> f32 {
    let hip_angle = metrics.hip_angle;
    let knee_bend = metrics.knee_bend;
    let sway = metrics.sway;

    // Barely bending at all
    if hip_angle > BENDING_DEGREES {
        return 0.0;
    }

    let mut score: f32 = 10.0;

    score -= if hip_angle <= 70.0 {
        0.0
    } else if hip_angle <= 90.0 {
        scale01(hip_angle - 70.0, 0.0, 20.0) * 1.0
    } else if hip_angle <= 110.0 {
        1.0 + scale01(hip_angle - 90.0, 0.0, 20.0) * 1.5
    } else if hip_angle <= 130.0 {
        2.5 + scale01(hip_angle - 110.0, 0.0, 20.0) * 2.5
    } else if hip_angle <= 150.0 {
        5.0 + scale01(hip_angle - 130.0, 0.0, 20.0) * 3.0
    } else {
        8.0 + scale01(hip_angle - 150.0, 0.0, 10.0) * 1.5
    };

    score -= if knee_bend <= 15.0 {
        0.0
    } else if knee_bend <= 30.0 {
        scale01(knee_bend, 15.0, 30.0) * 1.0
    } else {
        1.0 + scale01(knee_bend - 30.0, 0.0, 30.0) * 1.0
    };

    score -= scale01(sway, 0.08, 0.35) * 0.5;

    if hip_angle < 60.0 {
        score += 0.5;
    }
    if knee_bend < 10.0 {
        score += 0.5;
    }

    score.clamp(0.0, 10.0)
}

/// Hold completion (15) plus form (85), rounded to an integer. An attempt
/// that never held for [`HOLD_REQUIRED_MS`] scores 0 outright.
pub fn final_score(result: &BendResult) -> f32 {
    if !result.is_valid {
        return 0.0;
    }
    let Some(metrics) = result.metrics else {
        return 0.0;
    };
    if metrics.hip_angle > BENDING_DEGREES {
        return 0.0;
    }

    let hold_quality = (result.hold_ms / HOLD_REQUIRED_MS).min(1.0) as f32;
    let completion = hold_quality * 15.0;
    let form = clamp01(result.form) * 85.0;
    (completion + form).round()
}

pub struct ForwardBendEvaluator {
    test_start: Option<f64>,
    running: bool,
    last_sample_ms: Option<f64>,
    current_hold_ms: f64,
    grace_ms_remaining: f64,
    is_valid: bool,
    best_wrist_y: Option<f32>,
    best_metrics: Option<BendMetrics>,
    best_hold_ms: f64,
    best_frame: Option<FrameRef>,
    best_frame_index: u32,
}

impl ForwardBendEvaluator {
    pub fn new() -> Self {
        Self {
            test_start: None,
            running: false,
            last_sample_ms: None,
            current_hold_ms: 0.0,
            grace_ms_remaining: 0.0,
            is_valid: false,
            best_wrist_y: None,
            best_metrics: None,
            best_hold_ms: 0.0,
            best_frame: None,
            best_frame_index: 0,
        }
    }

    pub fn is_running(&self) -> bool {
        self.running
    }

    pub fn start(&mut self, now_ms: f64) {
        if self.test_start.is_some() {
            return;
        }
        self.test_start = Some(now_ms);
        self.running = true;
        self.last_sample_ms = Some(now_ms);
        self.current_hold_ms = 0.0;
        self.grace_ms_remaining = 0.0;
        self.is_valid = false;
        self.best_wrist_y = None;
        self.best_metrics = None;
        self.best_hold_ms = 0.0;
        self.best_frame = None;
        self.best_frame_index = 0;
    }

    pub fn update(
        &mut self,
        lm: &LandmarkFrame,
        now_ms: f64,
        in_position: bool,
        mut capture: Option<&mut dyn CaptureSink>,
    ) -> Vec<EvalEvent> {
        let mut events = Vec::new();
        let Some(test_start) = self.test_start else {
            return events;
        };
        if !self.running || !in_position {
            return events;
        }

        let delta = match self.last_sample_ms {
            Some(last) => now_ms - last,
            None => 0.0,
        };
        self.last_sample_ms = Some(now_ms);

        if now_ms - test_start > TEST_WINDOW_MS {
            self.running = false;
            events.push(EvalEvent::WindowExpired);
            return events;
        }

        let metrics = bend_metrics(lm);
        let wrist_y = (lm[LEFT_WRIST].y + lm[RIGHT_WRIST].y) / 2.0;

        let is_bending = metrics.hip_angle < BENDING_DEGREES;
        if is_bending {
            let was_holding = self.current_hold_ms > 0.0;
            self.current_hold_ms += delta;
            self.grace_ms_remaining = HOLD_GRACE_MS;
            if !was_holding && self.current_hold_ms > 0.0 {
                events.push(EvalEvent::HoldStarted);
            }

            // Deeper than any attempt so far (wrist lower in the image)
            let deeper = match self.best_wrist_y {
                Some(best) => wrist_y > best + DEPTH_MARGIN,
                None => true,
            };
            if deeper {
                self.best_wrist_y = Some(wrist_y);
                self.best_metrics = Some(metrics);
                if let Some(sink) = capture.as_deref_mut() {
                    self.best_frame_index += 1;
                    self.best_frame = sink.capture(CaptureRequest {
                        exercise: "forward-bend",
                        kind: "best",
                        index: self.best_frame_index,
                    });
                }
            }

            if self.current_hold_ms > self.best_hold_ms {
                self.best_hold_ms = self.current_hold_ms;
            }

            if self.current_hold_ms >= HOLD_REQUIRED_MS {
                self.is_valid = true;
            }
        } else {
            // Grace window: a brief straighten does not void the hold
            self.grace_ms_remaining = (self.grace_ms_remaining - delta).max(0.0);
            if self.grace_ms_remaining == 0.0 && self.current_hold_ms > 0.0 {
                self.current_hold_ms = 0.0;
                events.push(EvalEvent::HoldLost);
            }
        }

        events
    }

    /// Pure reduction over the best attempt; repeated calls agree.
    pub fn finish(&self) -> BendResult {
        let form = self
            .best_metrics
            .as_ref()
            .map(form_score)
            .unwrap_or(0.0);
        let mut result = BendResult {
            score: 0.0,
            is_valid: self.is_valid,
            hold_ms: self.best_hold_ms,
            metrics: self.best_metrics,
            form: form / 10.0,
            frame: self.best_frame,
        };
        result.score = final_score(&result);
        result
    }

    pub fn reset(&mut self) {
        *self = ForwardBendEvaluator::new();
    }
}

impl Default for ForwardBendEvaluator {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bridge::landmarks::{Landmark, LANDMARK_COUNT};
    use crate::eval::events::RecordingSink;

    /// Frame with the hip angle (shoulder-hip-knee, both sides) at
    /// `hip_deg`, legs vertical and straight, wrists at `wrist_y`.
    fn bend_frame(hip_deg: f32, wrist_y: f32) -> LandmarkFrame {
        let mut lm = [Landmark::new(0.5, 0.5, 0.0, 1.0); LANDMARK_COUNT];
        let rad = hip_deg.to_radians();

        for (shoulder, hip, knee, ankle, wrist, x) in [
            (LEFT_SHOULDER, LEFT_HIP, LEFT_KNEE, LEFT_ANKLE, LEFT_WRIST, 0.49),
            (
                RIGHT_SHOULDER,
                RIGHT_HIP,
                RIGHT_KNEE,
                RIGHT_ANKLE,
                RIGHT_WRIST,
                0.51,
            ),
        ] {
            lm[hip] = Landmark::new(x, 0.55, 0.0, 1.0);
            lm[knee] = Landmark::new(x, 0.75, 0.0, 1.0);
            lm[ankle] = Landmark::new(x, 0.95, 0.0, 1.0);
            // Shoulder rotated off the thigh line by hip_deg
            lm[shoulder] =
                Landmark::new(x + 0.30 * rad.sin(), 0.55 + 0.30 * rad.cos(), 0.0, 1.0);
            lm[wrist] = Landmark::new(x, wrist_y, 0.0, 1.0);
        }
        lm[NOSE] = Landmark::new(0.5, 0.15, 0.0, 1.0);
        lm
    }

    #[test]
    fn test_bending_boundary_is_exclusive() {
        // Exactly 160° is standing, not bending
        let m = bend_metrics(&bend_frame(160.0, 0.5));
        assert!((m.hip_angle - 160.0).abs() < 0.2);

        let mut eval = ForwardBendEvaluator::new();
        eval.start(0.0);
        for i in 1..=60 {
            eval.update(&bend_frame(161.0, 0.5), i as f64 * 33.0, true, None);
        }
        let result = eval.finish();
        assert!(!result.is_valid);
        assert_eq!(result.score, 0.0);
    }

    #[test]
    fn test_hold_accumulates_and_validates_at_one_second() {
        let mut eval = ForwardBendEvaluator::new();
        eval.start(0.0);
        let mut t = 0.0;
        for _ in 0..20 {
            t += 60.0;
            eval.update(&bend_frame(80.0, 0.85), t, true, None);
        }
        let result = eval.finish();
        assert!(result.is_valid);
        assert!(result.hold_ms >= HOLD_REQUIRED_MS);
        assert!(result.score > 0.0);
    }

    #[test]
    fn test_grace_period_bridges_brief_straighten() {
        let mut eval = ForwardBendEvaluator::new();
        eval.start(0.0);
        let mut t = 0.0;
        // 600ms bent
        for _ in 0..10 {
            t += 60.0;
            eval.update(&bend_frame(80.0, 0.85), t, true, None);
        }
        // 300ms straightened: inside grace, hold survives
        for _ in 0..5 {
            t += 60.0;
            eval.update(&bend_frame(175.0, 0.4), t, true, None);
        }
        // Bend again to 1.2s total
        for _ in 0..10 {
            t += 60.0;
            eval.update(&bend_frame(80.0, 0.85), t, true, None);
        }
        assert!(eval.finish().is_valid);
    }

    #[test]
    fn test_grace_expiry_resets_hold() {
        let mut eval = ForwardBendEvaluator::new();
        eval.start(0.0);
        let mut t = 0.0;
        for _ in 0..10 {
            t += 60.0;
            eval.update(&bend_frame(80.0, 0.85), t, true, None);
        }
        // 720ms straightened: grace (500ms) runs out, hold resets
        let mut lost = false;
        for _ in 0..12 {
            t += 60.0;
            let events = eval.update(&bend_frame(175.0, 0.4), t, true, None);
            lost |= events.contains(&EvalEvent::HoldLost);
        }
        assert!(lost);
        // 600ms more of bending is under the 1s requirement
        for _ in 0..10 {
            t += 60.0;
            eval.update(&bend_frame(80.0, 0.85), t, true, None);
        }
        assert!(!eval.finish().is_valid);
    }

    #[test]
    fn test_best_attempt_requires_depth_margin() {
        let mut eval = ForwardBendEvaluator::new();
        eval.start(0.0);
        let mut sink = RecordingSink::new();
        let mut t = 0.0;

        t += 60.0;
        eval.update(&bend_frame(80.0, 0.80), t, true, Some(&mut sink));
        // 5mm deeper: inside the margin, no new capture
        t += 60.0;
        eval.update(&bend_frame(80.0, 0.805), t, true, Some(&mut sink));
        assert_eq!(sink.requests.len(), 1);
        // Past the margin: captured
        t += 60.0;
        eval.update(&bend_frame(78.0, 0.83), t, true, Some(&mut sink));
        assert_eq!(sink.requests.len(), 2);
        assert_eq!(eval.finish().frame, Some(2));
    }

    #[test]
    fn test_deepest_metrics_kept_even_if_later_hold_is_longer() {
        let mut eval = ForwardBendEvaluator::new();
        eval.start(0.0);
        let mut t = 0.0;
        // Deep but short
        for _ in 0..5 {
            t += 60.0;
            eval.update(&bend_frame(65.0, 0.90), t, true, None);
        }
        // Straighten long enough to reset
        for _ in 0..15 {
            t += 60.0;
            eval.update(&bend_frame(175.0, 0.40), t, true, None);
        }
        // Shallower but long
        for _ in 0..20 {
            t += 60.0;
            eval.update(&bend_frame(110.0, 0.70), t, true, None);
        }
        let result = eval.finish();
        assert!(result.is_valid);
        // Metrics describe the deepest bend, hold the longest
        let m = result.metrics.unwrap();
        assert!(m.hip_angle < 70.0, "hip_angle {}", m.hip_angle);
        assert!(result.hold_ms >= 1_000.0);
    }

    #[test]
    fn test_form_score_bands() {
        let base = BendMetrics {
            hip_angle: 65.0,
            ht_ratio: 1.0,
            knee_bend: 5.0,
            reach_distance: 0.1,
            sway: 0.0,
            hip_flexion: 65.0,
            thoracic_flexion: 65.0,
        };
        // Deep bend with straight knees earns the caps plus both bonuses
        assert!((form_score(&base) - 10.0).abs() < 1e-6);

        let mut shallow = base;
        shallow.hip_angle = 155.0;
        shallow.knee_bend = 20.0;
        // 8.0 + 0.75 hip penalty, 1/3 knee penalty
        let expected = 10.0 - (8.0 + 0.75) - (1.0 / 3.0);
        assert!((form_score(&shallow) - expected).abs() < 1e-4);

        let mut standing = base;
        standing.hip_angle = 161.0;
        assert_eq!(form_score(&standing), 0.0);
    }

    #[test]
    fn test_final_score_composition() {
        let metrics = BendMetrics {
            hip_angle: 65.0,
            ht_ratio: 1.0,
            knee_bend: 5.0,
            reach_distance: 0.1,
            sway: 0.0,
            hip_flexion: 65.0,
            thoracic_flexion: 65.0,
        };
        let result = BendResult {
            score: 0.0,
            is_valid: true,
            hold_ms: 1_500.0,
            metrics: Some(metrics),
            form: 1.0,
            frame: None,
        };
        assert_eq!(final_score(&result), 100.0);

        let invalid = BendResult {
            is_valid: false,
            ..result.clone()
        };
        assert_eq!(final_score(&invalid), 0.0);
    }

    #[test]
    fn test_window_expiry_and_finish_idempotence() {
        let mut eval = ForwardBendEvaluator::new();
        eval.start(0.0);
        let mut t = 0.0;
        for _ in 0..20 {
            t += 60.0;
            eval.update(&bend_frame(80.0, 0.85), t, true, None);
        }
        let events = eval.update(&bend_frame(80.0, 0.85), 9_100.0, true, None);
        assert_eq!(events, vec![EvalEvent::WindowExpired]);
        assert!(!eval.is_running());
        let a = eval.finish();
        let b = eval.finish();
        assert_eq!(a.score, b.score);
        assert_eq!(a.hold_ms, b.hold_ms);
    }

    #[test]
    fn test_reset_round_trip() {
        let mut eval = ForwardBendEvaluator::new();
        eval.start(0.0);
        for i in 1..=20 {
            eval.update(&bend_frame(80.0, 0.85), i as f64 * 60.0, true, None);
        }
        eval.reset();
        let result = eval.finish();
        assert!(!result.is_valid);
        assert!(result.metrics.is_none());
        assert_eq!(result.score, 0.0);
    }
}

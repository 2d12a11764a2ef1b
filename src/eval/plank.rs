//! Plank evaluator
//!
//! Binary in-plank detection from the ankle-hip-shoulder body line and the
//! vertical shoulder/hip offset, debounced in both directions. Posture
//! metrics accumulate over every confirmed in-plank frame of the whole test;
//! the hold clock tracks the best contiguous stretch.

use serde::Serialize;

use crate::bridge::landmarks::{
    LandmarkFrame, LEFT_ANKLE, LEFT_ELBOW, LEFT_HIP, LEFT_KNEE, LEFT_SHOULDER, LEFT_WRIST,
    RIGHT_ANKLE, RIGHT_ELBOW, RIGHT_HIP, RIGHT_KNEE, RIGHT_SHOULDER, RIGHT_WRIST,
};
use crate::eval::events::EvalEvent;
use crate::eval::hold::{DebouncedFlag, FlagTransition};
use crate::eval::measure::{clamp01, midpoint, point_angle};

/// Test window in milliseconds
const TEST_WINDOW_MS: f64 = 30_000.0;

/// In-plank must persist this long before the hold starts
const PLANK_CONFIRM_MS: f64 = 500.0;

/// Out-of-plank must persist this long before the hold is lost
const PLANK_LOSS_MS: f64 = 600.0;

/// Best hold below this is an invalid attempt
const MIN_VALID_HOLD_SECONDS: f64 = 10.0;

/// Body-line straightness band and sag tolerance for in-plank detection
const BODY_ANGLE_MIN: f32 = 160.0;
const BODY_ANGLE_MAX: f32 = 200.0;
const ALIGNMENT_MAX: f32 = 0.15;

#[derive(Clone, Debug)]
struct PlankSample {
    body_angle: f32,
    left_knee: f32,
    right_knee: f32,
    left_elbow: f32,
    right_elbow: f32,
    vertical_alignment: f32,
}

#[derive(Clone, Debug, Serialize)]
pub struct PlankResult {
    pub body_angle: f32,
    pub knee_angle: f32,
    pub elbow_angle: f32,
    pub vertical_alignment: f32,
    /// Best contiguous hold in seconds, rounded to tenths
    pub hold_time: f64,
    pub form_score: f32,
    pub final_score: f32,
    pub is_valid: bool,
}

pub struct PlankEvaluator {
    test_start: Option<f64>,
    running: bool,
    last_sample_ms: Option<f64>,
    flag: DebouncedFlag,
    current_hold_ms: f64,
    best_hold_ms: f64,
    samples: Vec<PlankSample>,
}

impl PlankEvaluator {
    pub fn new() -> Self {
        Self {
            test_start: None,
            running: false,
            last_sample_ms: None,
            flag: DebouncedFlag::new(PLANK_CONFIRM_MS, PLANK_LOSS_MS),
            current_hold_ms: 0.0,
            best_hold_ms: 0.0,
            samples: Vec::new(),
        }
    }

    pub fn is_running(&self) -> bool {
        self.running
    }

    pub fn start(&mut self, now_ms: f64) {
        if self.test_start.is_some() {
            return;
        }
        *self = PlankEvaluator::new();
        self.test_start = Some(now_ms);
        self.running = true;
        self.last_sample_ms = Some(now_ms);
    }

    pub fn update(
        &mut self,
        lm: &LandmarkFrame,
        now_ms: f64,
        in_position: bool,
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

        let shoulder_mid = midpoint(&lm[LEFT_SHOULDER], &lm[RIGHT_SHOULDER]);
        let hip_mid = midpoint(&lm[LEFT_HIP], &lm[RIGHT_HIP]);
        let ankle_mid = midpoint(&lm[LEFT_ANKLE], &lm[RIGHT_ANKLE]);

        let body_angle = point_angle(ankle_mid, hip_mid, shoulder_mid).sentinel();
        let vertical_alignment = (hip_mid.1 - shoulder_mid.1).abs();

        let is_plank_position = body_angle > BODY_ANGLE_MIN
            && body_angle < BODY_ANGLE_MAX
            && vertical_alignment < ALIGNMENT_MAX;

        match self.flag.update(is_plank_position, delta) {
            FlagTransition::Entered => {
                self.current_hold_ms = 0.0;
                events.push(EvalEvent::HoldStarted);
                return events;
            }
            FlagTransition::Lost => {
                self.current_hold_ms = 0.0;
                events.push(EvalEvent::HoldLost);
                return events;
            }
            FlagTransition::None => {}
        }
        if !self.flag.is_active() || !is_plank_position {
            return events;
        }

        self.current_hold_ms += delta;
        if self.current_hold_ms > self.best_hold_ms {
            self.best_hold_ms = self.current_hold_ms;
        }

        let left_knee =
            point_angle(lm[LEFT_HIP].pos(), lm[LEFT_KNEE].pos(), lm[LEFT_ANKLE].pos()).sentinel();
        let right_knee = point_angle(
            lm[RIGHT_HIP].pos(),
            lm[RIGHT_KNEE].pos(),
            lm[RIGHT_ANKLE].pos(),
        )
        .sentinel();
        let left_elbow = point_angle(
            lm[LEFT_SHOULDER].pos(),
            lm[LEFT_ELBOW].pos(),
            lm[LEFT_WRIST].pos(),
        )
        .sentinel();
        let right_elbow = point_angle(
            lm[RIGHT_SHOULDER].pos(),
            lm[RIGHT_ELBOW].pos(),
            lm[RIGHT_WRIST].pos(),
        )
        .sentinel();

        self.samples.push(PlankSample {
            body_angle,
            left_knee,
            right_knee,
            left_elbow,
            right_elbow,
            vertical_alignment,
        });

        events
    }

    /// Pure reduction over the accumulated in-plank frames; repeated calls
    /// agree.
    pub fn finish(&self) -> PlankResult {
        if self.samples.is_empty() {
            return PlankResult {
                body_angle: 0.0,
                knee_angle: 0.0,
                elbow_angle: 0.0,
                vertical_alignment: 0.0,
                hold_time: 0.0,
                form_score: 0.0,
                final_score: 0.0,
                is_valid: false,
            };
        }

        let n = self.samples.len() as f32;
        let avg_body = self.samples.iter().map(|s| s.body_angle).sum::<f32>() / n;
        let avg_left_knee = self.samples.iter().map(|s| s.left_knee).sum::<f32>() / n;
        let avg_right_knee = self.samples.iter().map(|s| s.right_knee).sum::<f32>() / n;
        let avg_left_elbow = self.samples.iter().map(|s| s.left_elbow).sum::<f32>() / n;
        let avg_right_elbow = self.samples.iter().map(|s| s.right_elbow).sum::<f32>() / n;
        let avg_alignment = self.samples.iter().map(|s| s.vertical_alignment).sum::<f32>() / n;

        let hold_seconds = self.best_hold_ms / 1000.0;
        let hold_time = (hold_seconds * 10.0).round() / 10.0;
        let is_valid = hold_seconds >= MIN_VALID_HOLD_SECONDS;

        let body_angle_quality = clamp01((200.0 - (180.0 - avg_body).abs()) / 20.0);
        let knee_quality = clamp01((avg_left_knee.min(avg_right_knee) - 160.0) / 20.0);
        let elbow_quality = clamp01((avg_left_elbow.min(avg_right_elbow) - 70.0) / 30.0);
        let alignment_quality = clamp01((0.15 - avg_alignment) / 0.15);

        let form_score = (clamp01(
            body_angle_quality * 0.40
                + knee_quality * 0.30
                + elbow_quality * 0.15
                + alignment_quality * 0.15,
        ) * 100.0)
            .round();

        let final_score =
            ((hold_seconds / 30.0).min(1.0) as f32 * 100.0 * 0.3 + form_score * 0.7).round();

        PlankResult {
            body_angle: avg_body.round(),
            knee_angle: ((avg_left_knee + avg_right_knee) / 2.0).round(),
            elbow_angle: ((avg_left_elbow + avg_right_elbow) / 2.0).round(),
            vertical_alignment: (avg_alignment * 1000.0).round() / 1000.0,
            hold_time,
            form_score,
            final_score,
            is_valid,
        }
    }

    pub fn reset(&mut self) {
        *self = PlankEvaluator::new();
    }
}

impl Default for PlankEvaluator {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bridge::landmarks::{Landmark, LANDMARK_COUNT};

    /// Horizontal plank, straight body line, forearms planted
    fn plank_frame() -> LandmarkFrame {
        let mut lm = [Landmark::new(0.5, 0.5, 0.0, 1.0); LANDMARK_COUNT];
        for (a, b, y) in [
            (LEFT_SHOULDER, RIGHT_SHOULDER, 0.60),
            (LEFT_HIP, RIGHT_HIP, 0.62),
            (LEFT_ANKLE, RIGHT_ANKLE, 0.66),
        ] {
            lm[a] = Landmark::new(0.30, y, 0.0, 1.0);
            lm[b] = Landmark::new(0.30, y, 0.0, 1.0);
        }
        lm[LEFT_SHOULDER].x = 0.30;
        lm[RIGHT_SHOULDER].x = 0.30;
        lm[LEFT_HIP].x = 0.50;
        lm[RIGHT_HIP].x = 0.50;
        lm[LEFT_ANKLE].x = 0.80;
        lm[RIGHT_ANKLE].x = 0.80;
        // Straight knees along the hip-ankle line
        lm[LEFT_KNEE] = Landmark::new(0.65, 0.64, 0.0, 1.0);
        lm[RIGHT_KNEE] = Landmark::new(0.65, 0.64, 0.0, 1.0);
        // Elbows under the shoulders, wrists forward (~90°)
        lm[LEFT_ELBOW] = Landmark::new(0.30, 0.75, 0.0, 1.0);
        lm[RIGHT_ELBOW] = Landmark::new(0.30, 0.75, 0.0, 1.0);
        lm[LEFT_WRIST] = Landmark::new(0.20, 0.75, 0.0, 1.0);
        lm[RIGHT_WRIST] = Landmark::new(0.20, 0.75, 0.0, 1.0);
        lm
    }

    /// Hips piked well above the body line
    fn piked_frame() -> LandmarkFrame {
        let mut lm = plank_frame();
        lm[LEFT_HIP].y = 0.40;
        lm[RIGHT_HIP].y = 0.40;
        lm
    }

    fn drive(eval: &mut PlankEvaluator, frame: &LandmarkFrame, t: &mut f64, ms: f64) -> Vec<EvalEvent> {
        let mut events = Vec::new();
        let frames = (ms / 50.0) as u32;
        for _ in 0..frames {
            *t += 50.0;
            events.extend(eval.update(frame, *t, true));
        }
        events
    }

    #[test]
    fn test_plank_detection_band() {
        let mut eval = PlankEvaluator::new();
        eval.start(0.0);
        let mut t = 0.0;
        let events = drive(&mut eval, &plank_frame(), &mut t, 600.0);
        assert!(events.contains(&EvalEvent::HoldStarted));

        let mut eval = PlankEvaluator::new();
        eval.start(0.0);
        let mut t = 0.0;
        let events = drive(&mut eval, &piked_frame(), &mut t, 2_000.0);
        assert!(!events.contains(&EvalEvent::HoldStarted));
    }

    #[test]
    fn test_loss_debounce_bridges_brief_sag() {
        let mut eval = PlankEvaluator::new();
        eval.start(0.0);
        let mut t = 0.0;
        drive(&mut eval, &plank_frame(), &mut t, 2_000.0);

        // 500ms of bad posture: under the 600ms loss debounce
        let events = drive(&mut eval, &piked_frame(), &mut t, 500.0);
        assert!(!events.contains(&EvalEvent::HoldLost));

        // Back in plank: the hold continues accumulating
        drive(&mut eval, &plank_frame(), &mut t, 2_000.0);
        let r = eval.finish();
        assert!(r.hold_time >= 3.0, "hold_time {}", r.hold_time);
    }

    #[test]
    fn test_loss_resets_current_hold_but_keeps_metrics() {
        let mut eval = PlankEvaluator::new();
        eval.start(0.0);
        let mut t = 0.0;
        drive(&mut eval, &plank_frame(), &mut t, 4_000.0);
        let samples_before = eval.samples.len();

        let events = drive(&mut eval, &piked_frame(), &mut t, 700.0);
        assert!(events.contains(&EvalEvent::HoldLost));

        // Re-confirm and hold a shorter stretch
        drive(&mut eval, &plank_frame(), &mut t, 2_000.0);
        let r = eval.finish();
        // Best hold is still the first stretch
        assert!(r.hold_time >= 3.0 && r.hold_time < 4.0, "hold_time {}", r.hold_time);
        // Metrics kept accumulating across the loss
        assert!(eval.samples.len() > samples_before);
    }

    #[test]
    fn test_eleven_seconds_valid_nine_invalid() {
        // 11s in plank: valid, hold ~10.5s after the confirm lead-in
        let mut eval = PlankEvaluator::new();
        eval.start(0.0);
        let mut t = 0.0;
        drive(&mut eval, &plank_frame(), &mut t, 11_000.0);
        let r = eval.finish();
        assert!(r.is_valid, "hold_time {}", r.hold_time);
        assert!(r.final_score > 0.0);

        // 9s in plank: hold under 10s, invalid but still scored
        let mut eval = PlankEvaluator::new();
        eval.start(0.0);
        let mut t = 0.0;
        drive(&mut eval, &plank_frame(), &mut t, 9_000.0);
        let r = eval.finish();
        assert!(!r.is_valid, "hold_time {}", r.hold_time);
        assert!(r.final_score > 0.0);
    }

    #[test]
    fn test_form_score_degrades_with_bent_knees() {
        let mut eval = PlankEvaluator::new();
        eval.start(0.0);
        let mut t = 0.0;
        drive(&mut eval, &plank_frame(), &mut t, 5_000.0);
        let straight = eval.finish().form_score;

        let mut bent = plank_frame();
        bent[LEFT_KNEE].y = 0.55;
        bent[RIGHT_KNEE].y = 0.55;
        let mut eval = PlankEvaluator::new();
        eval.start(0.0);
        let mut t = 0.0;
        drive(&mut eval, &bent, &mut t, 5_000.0);
        let bent_score = eval.finish().form_score;

        assert!(bent_score < straight, "{} vs {}", bent_score, straight);
    }

    #[test]
    fn test_window_expiry() {
        let mut eval = PlankEvaluator::new();
        eval.start(0.0);
        let events = eval.update(&plank_frame(), 30_100.0, true);
        assert_eq!(events, vec![EvalEvent::WindowExpired]);
        assert!(!eval.is_running());
    }

    #[test]
    fn test_finish_idempotent_and_reset() {
        let mut eval = PlankEvaluator::new();
        eval.start(0.0);
        let mut t = 0.0;
        drive(&mut eval, &plank_frame(), &mut t, 5_000.0);
        let a = eval.finish();
        let b = eval.finish();
        assert_eq!(a.final_score, b.final_score);
        assert_eq!(a.hold_time, b.hold_time);

        eval.reset();
        assert!(!eval.is_running());
        let r = eval.finish();
        assert_eq!(r.final_score, 0.0);
        assert_eq!(r.hold_time, 0.0);
    }
}

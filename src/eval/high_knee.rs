//! High-knee march evaluator
//!
//! Cadence exercise: alternate knee lifts, counted on every leg change. Each
//! leg runs its own hysteresis on normalized lift height OR knee bend so a
//! knee hovering at the threshold cannot re-trigger, and a count cooldown
//! keeps detector jitter from double-counting a single lift.

use serde::Serialize;

use crate::bridge::landmarks::{
    LandmarkFrame, LEFT_ANKLE, LEFT_HIP, LEFT_KNEE, LEFT_SHOULDER, RIGHT_ANKLE, RIGHT_HIP,
    RIGHT_KNEE, RIGHT_SHOULDER,
};
use crate::eval::events::{CaptureRequest, CaptureSink, EvalEvent, FrameRef};
use crate::eval::measure::{clamp01, midpoint, point_angle, scale01};

/// Test window in milliseconds
const TEST_WINDOW_MS: f64 = 10_000.0;

/// Hysteresis thresholds: a leg enters "up" past the enter values and only
/// drops back below the exit values
const LIFT_NORM_ENTER: f32 = 0.06;
const LIFT_NORM_EXIT: f32 = 0.03;
const KNEE_BEND_ENTER: f32 = 15.0;
const KNEE_BEND_EXIT: f32 = 8.0;

/// Minimum time between counted reps
const COUNT_COOLDOWN_MS: f64 = 180.0;

/// Lift-height margin that decides which leg leads when both read as up
const BOTH_UP_TIE_MARGIN: f32 = 0.03;

/// Rep target the rep score tops out at
const TARGET_REPS: f32 = 18.0;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Leg {
    Left,
    Right,
}

/// Snapshot taken at the moment a rep is counted
#[derive(Clone, Debug, Serialize)]
pub struct MarchRep {
    pub leg: Leg,
    pub lift_height: f32,
    pub lift_norm: f32,
    pub lifted_knee: f32,
    pub standing_knee: f32,
    pub torso_deviation: f32,
    /// Elapsed test time at the count, used for rhythm analysis
    pub timestamp_ms: f64,
    pub frame: Option<FrameRef>,
}

#[derive(Clone, Debug, Serialize)]
pub struct MarchResult {
    pub rep_count: u32,
    pub avg_lift_height: f32,
    pub avg_lift_norm: f32,
    pub min_knee_angle: f32,
    pub avg_torso_deviation: f32,
    pub avg_standing_knee: f32,
    pub form_score: f32,
    pub rep_score: f32,
    pub rhythm_score: f32,
    pub final_score: f32,
}

pub struct HighKneeEvaluator {
    test_start: Option<f64>,
    running: bool,
    rep_count: u32,
    last_lifted_leg: Option<Leg>,
    last_count_at_ms: f64,
    left_up: bool,
    right_up: bool,
    reps: Vec<MarchRep>,
    left_knee_min: f32,
    right_knee_min: f32,
}

impl HighKneeEvaluator {
    pub fn new() -> Self {
        Self {
            test_start: None,
            running: false,
            rep_count: 0,
            last_lifted_leg: None,
            last_count_at_ms: 0.0,
            left_up: false,
            right_up: false,
            reps: Vec::new(),
            left_knee_min: 999.0,
            right_knee_min: 999.0,
        }
    }

    pub fn is_running(&self) -> bool {
        self.running
    }

    pub fn start(&mut self, now_ms: f64) {
        if self.test_start.is_some() {
            return;
        }
        *self = HighKneeEvaluator::new();
        self.test_start = Some(now_ms);
        self.running = true;
    }

    /// Leaving position aborts the running attempt entirely; the march only
    /// means something as an unbroken sequence.
    fn abort(&mut self) {
        self.test_start = None;
        self.running = false;
        self.rep_count = 0;
        self.last_lifted_leg = None;
        self.reps.clear();
        self.left_knee_min = 999.0;
        self.right_knee_min = 999.0;
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
        if !in_position {
            self.abort();
            return events;
        }
        if !self.running {
            return events;
        }

        let elapsed = now_ms - test_start;
        if elapsed > TEST_WINDOW_MS {
            self.running = false;
            events.push(EvalEvent::WindowExpired);
            return events;
        }

        let left_lift_height = lm[LEFT_HIP].y - lm[LEFT_KNEE].y;
        let right_lift_height = lm[RIGHT_HIP].y - lm[RIGHT_KNEE].y;

        let left_leg_length = (lm[LEFT_ANKLE].y - lm[LEFT_HIP].y).abs().max(0.001);
        let right_leg_length = (lm[RIGHT_ANKLE].y - lm[RIGHT_HIP].y).abs().max(0.001);
        let left_lift_norm = left_lift_height / left_leg_length;
        let right_lift_norm = right_lift_height / right_leg_length;

        // No visibility gating here; a degenerate segment reads 999 so the
        // bend (180 - angle) clamps to zero rather than counting as a lift
        let left_knee_angle =
            point_angle(lm[LEFT_HIP].pos(), lm[LEFT_KNEE].pos(), lm[LEFT_ANKLE].pos()).sentinel();
        let right_knee_angle = point_angle(
            lm[RIGHT_HIP].pos(),
            lm[RIGHT_KNEE].pos(),
            lm[RIGHT_ANKLE].pos(),
        )
        .sentinel();
        let left_knee_bend = (180.0 - left_knee_angle).max(0.0);
        let right_knee_bend = (180.0 - right_knee_angle).max(0.0);

        let leg_up = |was_up: bool, lift_norm: f32, knee_bend: f32| {
            if was_up {
                lift_norm > LIFT_NORM_EXIT || knee_bend > KNEE_BEND_EXIT
            } else {
                lift_norm > LIFT_NORM_ENTER || knee_bend > KNEE_BEND_ENTER
            }
        };
        let left_up_now = leg_up(self.left_up, left_lift_norm, left_knee_bend);
        let right_up_now = leg_up(self.right_up, right_lift_norm, right_knee_bend);
        self.left_up = left_up_now;
        self.right_up = right_up_now;

        let current_lifted_leg = match (left_up_now, right_up_now) {
            (true, false) => Some(Leg::Left),
            (false, true) => Some(Leg::Right),
            (true, true) => {
                let gap = left_lift_norm - right_lift_norm;
                if gap > BOTH_UP_TIE_MARGIN {
                    Some(Leg::Left)
                } else if gap < -BOTH_UP_TIE_MARGIN {
                    Some(Leg::Right)
                } else {
                    self.last_lifted_leg
                }
            }
            (false, false) => None,
        };

        let Some(leg) = current_lifted_leg else {
            return events;
        };
        if Some(leg) == self.last_lifted_leg || now_ms - self.last_count_at_ms < COUNT_COOLDOWN_MS {
            return events;
        }

        self.rep_count += 1;
        self.last_count_at_ms = now_ms;

        let (lifted_knee, standing_knee) = match leg {
            Leg::Left => (left_knee_angle, right_knee_angle),
            Leg::Right => (right_knee_angle, left_knee_angle),
        };
        match leg {
            Leg::Left if lifted_knee < self.left_knee_min => self.left_knee_min = lifted_knee,
            Leg::Right if lifted_knee < self.right_knee_min => self.right_knee_min = lifted_knee,
            _ => {}
        }

        let shoulder_mid = midpoint(&lm[LEFT_SHOULDER], &lm[RIGHT_SHOULDER]);
        let hip_mid = midpoint(&lm[LEFT_HIP], &lm[RIGHT_HIP]);
        let ankle_mid = midpoint(&lm[LEFT_ANKLE], &lm[RIGHT_ANKLE]);
        let torso_angle = point_angle(ankle_mid, hip_mid, shoulder_mid).sentinel();
        let torso_deviation = (180.0 - torso_angle).abs();

        let frame = capture.as_deref_mut().and_then(|sink| {
            sink.capture(CaptureRequest {
                exercise: "high-knee",
                kind: "rep",
                index: self.rep_count,
            })
        });

        self.reps.push(MarchRep {
            leg,
            lift_height: match leg {
                Leg::Left => left_lift_height,
                Leg::Right => right_lift_height,
            },
            lift_norm: match leg {
                Leg::Left => left_lift_norm,
                Leg::Right => right_lift_norm,
            },
            lifted_knee,
            standing_knee,
            torso_deviation,
            timestamp_ms: elapsed,
            frame,
        });

        events.push(EvalEvent::RepCompleted {
            count: self.rep_count,
        });
        self.last_lifted_leg = Some(leg);
        events
    }

    /// Pure reduction of the rep history; repeated calls agree.
    pub fn finish(&self) -> MarchResult {
        if self.reps.is_empty() {
            return MarchResult {
                rep_count: 0,
                avg_lift_height: 0.0,
                avg_lift_norm: 0.0,
                min_knee_angle: 0.0,
                avg_torso_deviation: 0.0,
                avg_standing_knee: 0.0,
                form_score: 0.0,
                rep_score: 0.0,
                rhythm_score: 0.0,
                final_score: 0.0,
            };
        }

        let n = self.reps.len() as f32;
        let avg_lift_height = self.reps.iter().map(|r| r.lift_height).sum::<f32>() / n;
        let avg_lift_norm = self
            .reps
            .iter()
            .map(|r| if r.lift_norm.is_finite() { r.lift_norm } else { 0.0 })
            .sum::<f32>()
            / n;
        let min_knee_angle = self.left_knee_min.min(self.right_knee_min);
        let avg_torso_deviation = self.reps.iter().map(|r| r.torso_deviation).sum::<f32>() / n;
        let avg_standing_knee = self.reps.iter().map(|r| r.standing_knee).sum::<f32>() / n;

        // Rhythm: coefficient of variation of inter-rep intervals. Fewer
        // than 4 intervals is too little signal to judge, score stays 100.
        let mut rhythm_score = 100.0_f32;
        let intervals: Vec<f64> = self
            .reps
            .windows(2)
            .map(|w| w[1].timestamp_ms - w[0].timestamp_ms)
            .filter(|dt| dt.is_finite() && *dt > 0.0)
            .collect();
        if intervals.len() >= 4 {
            let mean = intervals.iter().sum::<f64>() / intervals.len() as f64;
            if mean > 0.0 {
                let variance = intervals
                    .iter()
                    .map(|x| (x - mean) * (x - mean))
                    .sum::<f64>()
                    / intervals.len() as f64;
                let cv = (variance.max(0.0).sqrt() / mean) as f32;
                rhythm_score = (clamp01((0.40 - cv) / (0.40 - 0.10)) * 100.0).round();
            }
        }

        // Rep score is superlinear: the last reps toward 18 are worth more
        let rep_q = clamp01(self.rep_count as f32 / TARGET_REPS);
        let rep_score = (rep_q.powf(1.4) * 100.0).round();

        let lift_q = scale01(avg_lift_norm, 0.10, 0.25);
        let lifted_knee_q = clamp01((140.0 - min_knee_angle) / (140.0 - 105.0));
        let standing_knee_q = scale01(avg_standing_knee, 160.0, 175.0);
        let torso_q = clamp01((25.0 - avg_torso_deviation) / (25.0 - 8.0));
        let form_score =
            (clamp01((lift_q + lifted_knee_q + standing_knee_q + torso_q) / 4.0) * 100.0).round();

        let final_score = (rep_score * 0.7 + form_score * 0.3).round();

        MarchResult {
            rep_count: self.rep_count,
            avg_lift_height: (avg_lift_height * 1000.0).round() / 1000.0,
            avg_lift_norm: (avg_lift_norm * 1000.0).round() / 1000.0,
            min_knee_angle: min_knee_angle.round(),
            avg_torso_deviation: avg_torso_deviation.round(),
            avg_standing_knee: avg_standing_knee.round(),
            form_score,
            rep_score,
            rhythm_score,
            final_score,
        }
    }

    pub fn reset(&mut self) {
        *self = HighKneeEvaluator::new();
    }
}

impl Default for HighKneeEvaluator {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bridge::landmarks::{Landmark, LANDMARK_COUNT};
    use crate::eval::events::RecordingSink;

    /// Standing frame; `lift` raises that side's knee toward the hip (as a
    /// fraction of leg length) and bends the knee accordingly.
    fn march_frame(lifted: Option<Leg>, lift: f32) -> LandmarkFrame {
        let mut lm = [Landmark::new(0.5, 0.5, 0.0, 1.0); LANDMARK_COUNT];
        for (hip, knee, ankle, x) in [
            (LEFT_HIP, LEFT_KNEE, LEFT_ANKLE, 0.48),
            (RIGHT_HIP, RIGHT_KNEE, RIGHT_ANKLE, 0.52),
        ] {
            lm[hip] = Landmark::new(x, 0.55, 0.0, 1.0);
            lm[knee] = Landmark::new(x, 0.75, 0.0, 1.0);
            lm[ankle] = Landmark::new(x, 0.95, 0.0, 1.0);
        }
        lm[LEFT_SHOULDER] = Landmark::new(0.48, 0.25, 0.0, 1.0);
        lm[RIGHT_SHOULDER] = Landmark::new(0.52, 0.25, 0.0, 1.0);

        if let Some(leg) = lifted {
            let (knee, x) = match leg {
                Leg::Left => (LEFT_KNEE, 0.48),
                Leg::Right => (RIGHT_KNEE, 0.52),
            };
            // Leg length 0.4; pull the knee up and forward so the knee angle
            // bends well past the hysteresis band
            lm[knee] = Landmark::new(x + 0.05, 0.75 - lift * 0.4, 0.0, 1.0);
        }
        lm
    }

    fn step(
        eval: &mut HighKneeEvaluator,
        t: &mut f64,
        frame: &LandmarkFrame,
    ) -> Vec<EvalEvent> {
        *t += 100.0;
        eval.update(frame, *t, true, None)
    }

    #[test]
    fn test_rep_counted_on_leg_change_only() {
        let mut eval = HighKneeEvaluator::new();
        eval.start(0.0);
        let mut t = 0.0;

        let mut events = Vec::new();
        // Left up for several frames: one rep, not one per frame
        for _ in 0..4 {
            events.extend(step(&mut eval, &mut t, &march_frame(Some(Leg::Left), 0.5)));
        }
        assert_eq!(eval.rep_count, 1);
        // Down, then right: second rep
        events.extend(step(&mut eval, &mut t, &march_frame(None, 0.0)));
        for _ in 0..4 {
            events.extend(step(&mut eval, &mut t, &march_frame(Some(Leg::Right), 0.5)));
        }
        assert_eq!(eval.rep_count, 2);
        let reps: Vec<_> = events
            .iter()
            .filter(|e| matches!(e, EvalEvent::RepCompleted { .. }))
            .collect();
        assert_eq!(reps.len(), 2);
    }

    #[test]
    fn test_count_cooldown_suppresses_fast_alternation() {
        let mut eval = HighKneeEvaluator::new();
        eval.start(0.0);
        // Alternate every 50ms: inside the 180ms cooldown, most must drop
        let mut t = 0.0;
        for i in 0..8 {
            t += 50.0;
            let leg = if i % 2 == 0 { Leg::Left } else { Leg::Right };
            eval.update(&march_frame(Some(leg), 0.5), t, true, None);
        }
        // 400ms of alternation at 180ms cooldown allows at most 3 counts
        assert!(eval.rep_count <= 3, "rep_count {}", eval.rep_count);
    }

    #[test]
    fn test_both_up_tie_break_retains_last_leg() {
        let mut eval = HighKneeEvaluator::new();
        eval.start(0.0);
        let mut t = 0.0;
        step(&mut eval, &mut t, &march_frame(Some(Leg::Left), 0.5));
        assert_eq!(eval.rep_count, 1);

        // Both knees up at the same height: no leg change, no count
        let mut both = march_frame(Some(Leg::Left), 0.5);
        both[RIGHT_KNEE] = Landmark::new(0.57, both[LEFT_KNEE].y, 0.0, 1.0);
        for _ in 0..3 {
            step(&mut eval, &mut t, &both);
        }
        assert_eq!(eval.rep_count, 1);
    }

    #[test]
    fn test_out_of_position_aborts_running_test() {
        let mut eval = HighKneeEvaluator::new();
        eval.start(0.0);
        let mut t = 0.0;
        step(&mut eval, &mut t, &march_frame(Some(Leg::Left), 0.5));
        step(&mut eval, &mut t, &march_frame(Some(Leg::Right), 0.5));
        assert_eq!(eval.rep_count, 2);

        t += 100.0;
        eval.update(&march_frame(None, 0.0), t, false, None);
        assert!(!eval.is_running());
        assert_eq!(eval.finish().rep_count, 0);

        // Frames after the abort do nothing until a fresh start
        step(&mut eval, &mut t, &march_frame(Some(Leg::Left), 0.5));
        assert_eq!(eval.rep_count, 0);
    }

    #[test]
    fn test_window_expiry() {
        let mut eval = HighKneeEvaluator::new();
        eval.start(0.0);
        let events = eval.update(&march_frame(None, 0.0), 10_100.0, true, None);
        assert_eq!(events, vec![EvalEvent::WindowExpired]);
        assert!(!eval.is_running());
    }

    #[test]
    fn test_capture_hook_fires_per_rep() {
        let mut eval = HighKneeEvaluator::new();
        eval.start(0.0);
        let mut sink = RecordingSink::new();
        let mut t = 0.0;
        for leg in [Leg::Left, Leg::Right, Leg::Left] {
            t += 300.0;
            eval.update(&march_frame(Some(leg), 0.5), t, true, Some(&mut sink));
        }
        assert_eq!(sink.requests.len(), 3);
        assert_eq!(sink.requests[2], ("rep".to_string(), 3));
        assert_eq!(eval.reps[2].frame, Some(3));
    }

    #[test]
    fn test_finish_empty_history_is_zero() {
        let eval = HighKneeEvaluator::new();
        let r = eval.finish();
        assert_eq!(r.rep_count, 0);
        assert_eq!(r.final_score, 0.0);
        assert_eq!(r.rhythm_score, 0.0);
    }

    #[test]
    fn test_rep_score_is_superlinear() {
        let rep_score = |reps: f32| (clamp01(reps / TARGET_REPS).powf(1.4) * 100.0).round();
        // Half the reps earns well under half the score
        assert!(rep_score(9.0) < 50.0);
        assert_eq!(rep_score(18.0), 100.0);
        assert_eq!(rep_score(24.0), 100.0);
    }

    #[test]
    fn test_rhythm_scoring_from_intervals() {
        let mut eval = HighKneeEvaluator::new();
        eval.start(0.0);
        // Perfectly even 500ms cadence: CV 0, rhythm 100
        let mut t = 0.0;
        for i in 0..6 {
            t += 500.0;
            let leg = if i % 2 == 0 { Leg::Left } else { Leg::Right };
            eval.update(&march_frame(Some(leg), 0.5), t, true, None);
        }
        assert_eq!(eval.finish().rhythm_score, 100.0);

        // Wildly uneven cadence scores low
        let mut eval = HighKneeEvaluator::new();
        eval.start(0.0);
        let mut t = 0.0;
        for (i, gap) in [200.0, 1400.0, 200.0, 1600.0, 200.0, 1500.0]
            .iter()
            .enumerate()
        {
            t += gap;
            let leg = if i % 2 == 0 { Leg::Left } else { Leg::Right };
            eval.update(&march_frame(Some(leg), 0.5), t, true, None);
        }
        assert!(eval.finish().rhythm_score < 50.0);
    }

    #[test]
    fn test_finish_idempotent_and_reset_round_trip() {
        let mut eval = HighKneeEvaluator::new();
        eval.start(0.0);
        let mut t = 0.0;
        for leg in [Leg::Left, Leg::Right, Leg::Left, Leg::Right] {
            t += 400.0;
            eval.update(&march_frame(Some(leg), 0.5), t, true, None);
        }
        let a = eval.finish();
        let b = eval.finish();
        assert_eq!(a.final_score, b.final_score);
        assert_eq!(a.rep_count, b.rep_count);

        eval.reset();
        assert_eq!(eval.finish().final_score, 0.0);
        assert!(!eval.is_running());
    }
}

//! Single-leg stance ("t-pose balance") evaluator
//!
//! Which leg is the stance leg is inferred from the vertical ankle gap, with
//! a candidate having to persist 400 ms before a hold starts and 450 ms of
//! disagreement before it is lost. Metrics are kept per hold attempt; only
//! the single longest hold is scored.

use serde::Serialize;

use crate::bridge::landmarks::{
    LandmarkFrame, LEFT_ANKLE, LEFT_HIP, LEFT_KNEE, LEFT_SHOULDER, RIGHT_ANKLE, RIGHT_HIP,
    RIGHT_KNEE, RIGHT_SHOULDER,
};
use crate::eval::events::EvalEvent;
use crate::eval::hold::HoldBuffer;
use crate::eval::measure::{clamp01, midpoint, point_angle};

/// Test window in milliseconds
const TEST_WINDOW_MS: f64 = 10_000.0;

/// Vertical ankle separation that nominates a stance leg
const STANCE_GAP_THRESHOLD: f32 = 0.02;

/// Candidate must persist this long before the hold starts
const STANCE_CONFIRM_MS: f64 = 400.0;

/// Disagreement must persist this long before the hold is lost
const STANCE_LOSS_MS: f64 = 450.0;

/// Hold length below this is an invalid attempt
const MIN_VALID_HOLD_SECONDS: f64 = 5.0;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum StanceLeg {
    Left,
    Right,
}

/// One in-hold frame's measurements
#[derive(Clone, Debug)]
struct StanceSample {
    stance_knee: f32,
    lifted_knee: f32,
    lifted_hip_angle: f32,
    torso_deviation: f32,
    sway: f32,
    stance_leg: StanceLeg,
}

#[derive(Clone, Debug, Serialize)]
pub struct StanceResult {
    pub stance_knee: f32,
    pub lifted_knee: f32,
    pub lifted_hip_angle: f32,
    pub torso_deviation: f32,
    pub sway: f32,
    /// Best hold in seconds, rounded to tenths
    pub hold_time: f64,
    pub form_score: f32,
    pub final_score: f32,
    pub stance_leg: Option<StanceLeg>,
    pub is_valid: bool,
}

pub struct StanceEvaluator {
    test_start: Option<f64>,
    running: bool,
    last_sample_ms: Option<f64>,
    stance_leg: Option<StanceLeg>,
    pending_stance: Option<StanceLeg>,
    pending_ms: f64,
    hold: HoldBuffer<StanceSample>,
}

impl StanceEvaluator {
    pub fn new() -> Self {
        Self {
            test_start: None,
            running: false,
            last_sample_ms: None,
            stance_leg: None,
            pending_stance: None,
            pending_ms: 0.0,
            hold: HoldBuffer::new(),
        }
    }

    pub fn is_running(&self) -> bool {
        self.running
    }

    pub fn start(&mut self, now_ms: f64) {
        if self.test_start.is_some() {
            return;
        }
        *self = StanceEvaluator::new();
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

        let ankle_diff = lm[LEFT_ANKLE].y - lm[RIGHT_ANKLE].y;
        let candidate = if ankle_diff > STANCE_GAP_THRESHOLD {
            // Left ankle lower in the image: left leg planted
            Some(StanceLeg::Left)
        } else if ankle_diff < -STANCE_GAP_THRESHOLD {
            Some(StanceLeg::Right)
        } else {
            None
        };

        let Some(stance_leg) = self.stance_leg else {
            // No hold yet: a candidate must persist to confirm. The first
            // frame of a new candidate contributes no time.
            match candidate {
                None => {
                    self.pending_stance = None;
                    self.pending_ms = 0.0;
                }
                Some(c) if self.pending_stance == Some(c) => {
                    self.pending_ms += delta;
                    if self.pending_ms >= STANCE_CONFIRM_MS {
                        self.stance_leg = Some(c);
                        self.pending_stance = None;
                        self.pending_ms = 0.0;
                        events.push(EvalEvent::HoldStarted);
                    }
                }
                Some(c) => {
                    self.pending_stance = Some(c);
                    self.pending_ms = 0.0;
                }
            }
            return events;
        };

        if candidate != Some(stance_leg) {
            self.pending_ms += delta;
            if self.pending_ms >= STANCE_LOSS_MS {
                self.hold.end_attempt();
                self.pending_ms = 0.0;
                self.pending_stance = None;
                self.stance_leg = None;
                events.push(EvalEvent::HoldLost);
            }
            return events;
        }

        self.pending_ms = 0.0;
        self.hold.accumulate(self.sample(lm, stance_leg), delta);
        events
    }

    fn sample(&self, lm: &LandmarkFrame, stance_leg: StanceLeg) -> StanceSample {
        let (stance, lifted, lifted_shoulder) = match stance_leg {
            StanceLeg::Left => (
                (LEFT_HIP, LEFT_KNEE, LEFT_ANKLE),
                (RIGHT_HIP, RIGHT_KNEE, RIGHT_ANKLE),
                RIGHT_SHOULDER,
            ),
            StanceLeg::Right => (
                (RIGHT_HIP, RIGHT_KNEE, RIGHT_ANKLE),
                (LEFT_HIP, LEFT_KNEE, LEFT_ANKLE),
                LEFT_SHOULDER,
            ),
        };

        // Ungated angles: a collapsed landmark reads 999 and the averages
        // absorb it over the hold
        let stance_knee =
            point_angle(lm[stance.0].pos(), lm[stance.1].pos(), lm[stance.2].pos()).sentinel();
        let lifted_knee =
            point_angle(lm[lifted.0].pos(), lm[lifted.1].pos(), lm[lifted.2].pos()).sentinel();
        let lifted_hip_angle = point_angle(
            lm[lifted_shoulder].pos(),
            lm[lifted.0].pos(),
            lm[lifted.1].pos(),
        )
        .sentinel();

        let shoulder_mid = midpoint(&lm[LEFT_SHOULDER], &lm[RIGHT_SHOULDER]);
        let hip_mid = midpoint(&lm[LEFT_HIP], &lm[RIGHT_HIP]);
        let torso_angle = point_angle(lm[stance.2].pos(), hip_mid, shoulder_mid).sentinel();
        let torso_deviation = (180.0 - torso_angle).abs();
        let sway = (hip_mid.0 - lm[stance.2].x).abs();

        StanceSample {
            stance_knee,
            lifted_knee,
            lifted_hip_angle,
            torso_deviation,
            sway,
            stance_leg,
        }
    }

    /// Pure reduction over the best hold; repeated calls agree.
    pub fn finish(&self) -> StanceResult {
        // An in-progress hold is promoted frame by frame, so the best buffer
        // is current even when the window expires mid-hold
        let best = self.hold.best();
        let best_leg = best.first().map(|s| s.stance_leg).or(self.stance_leg);

        if best.is_empty() {
            return StanceResult {
                stance_knee: 0.0,
                lifted_knee: 0.0,
                lifted_hip_angle: 0.0,
                torso_deviation: 0.0,
                sway: 0.0,
                hold_time: 0.0,
                form_score: 0.0,
                final_score: 0.0,
                stance_leg: best_leg,
                is_valid: false,
            };
        }

        let n = best.len() as f32;
        let avg_stance_knee = best.iter().map(|s| s.stance_knee).sum::<f32>() / n;
        let avg_lifted_knee = best.iter().map(|s| s.lifted_knee).sum::<f32>() / n;
        let avg_lifted_hip = best.iter().map(|s| s.lifted_hip_angle).sum::<f32>() / n;
        let avg_torso_dev = best.iter().map(|s| s.torso_deviation).sum::<f32>() / n;
        let avg_sway = best.iter().map(|s| s.sway).sum::<f32>() / n;

        let hold_seconds = self.hold.best_ms() / 1000.0;
        let hold_time = (hold_seconds * 10.0).round() / 10.0;
        let is_valid = hold_seconds >= MIN_VALID_HOLD_SECONDS;

        let rounded = |v: f32| v.round();
        let rounded_sway = (avg_sway * 1000.0).round() / 1000.0;

        // The lifted leg has to actually be lifted; a near-straight lifted
        // hip means both feet stayed down
        if avg_lifted_hip >= 160.0 {
            return StanceResult {
                stance_knee: rounded(avg_stance_knee),
                lifted_knee: rounded(avg_lifted_knee),
                lifted_hip_angle: rounded(avg_lifted_hip),
                torso_deviation: rounded(avg_torso_dev),
                sway: rounded_sway,
                hold_time,
                form_score: 0.0,
                final_score: 0.0,
                stance_leg: best_leg,
                is_valid: false,
            };
        }

        let stance_knee_quality = clamp01((avg_stance_knee - 140.0) / 30.0);
        let torso_quality = clamp01((30.0 - avg_torso_dev) / 30.0);
        let sway_quality = clamp01((0.2 - avg_sway) / 0.2);

        // Lower lifted-hip angle means a higher thigh
        let hip_angle_quality = clamp01(if avg_lifted_hip <= 70.0 {
            1.0
        } else if avg_lifted_hip <= 90.0 {
            1.0 - (avg_lifted_hip - 70.0) / 80.0
        } else if avg_lifted_hip <= 110.0 {
            0.75 - (avg_lifted_hip - 90.0) / 80.0
        } else if avg_lifted_hip <= 140.0 {
            0.5 - (avg_lifted_hip - 110.0) / 60.0
        } else {
            0.0
        });

        // ~90° knee bend balances best; outside 70-110 quality caps at 0.75
        let lifted_knee_quality = clamp01(if (70.0..=110.0).contains(&avg_lifted_knee) {
            1.0 - (avg_lifted_knee - 90.0).abs() / 40.0
        } else if avg_lifted_knee < 70.0 {
            (avg_lifted_knee / 70.0).clamp(0.0, 0.75)
        } else {
            ((180.0 - avg_lifted_knee) / 70.0).clamp(0.0, 0.75)
        });

        let form_score = (clamp01(
            stance_knee_quality * 0.15
                + torso_quality * 0.10
                + sway_quality * 0.05
                + hip_angle_quality * 0.45
                + lifted_knee_quality * 0.25,
        ) * 100.0)
            .round();

        let lift_quality_total = hip_angle_quality + lifted_knee_quality;
        let final_score = if lift_quality_total == 0.0 {
            0.0
        } else if !is_valid {
            // Short hold: capped at half the form score, scaled by how close
            // the hold came to the minimum
            let hold_penalty = (hold_seconds / MIN_VALID_HOLD_SECONDS) as f32;
            (form_score * hold_penalty * 0.5).round()
        } else {
            let hold_bonus = (hold_seconds / 10.0).min(1.0) as f32 * 100.0 * 0.2;
            (hold_bonus + form_score * 0.8).round()
        };

        StanceResult {
            stance_knee: rounded(avg_stance_knee),
            lifted_knee: rounded(avg_lifted_knee),
            lifted_hip_angle: rounded(avg_lifted_hip),
            torso_deviation: rounded(avg_torso_dev),
            sway: rounded_sway,
            hold_time,
            form_score,
            final_score,
            stance_leg: best_leg,
            is_valid,
        }
    }

    pub fn reset(&mut self) {
        *self = StanceEvaluator::new();
    }
}

impl Default for StanceEvaluator {
    fn default() -> Self {
        Self::new()
    }
}

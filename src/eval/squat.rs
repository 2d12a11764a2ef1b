//! Squat evaluator
//!
//! Rep counting with a 150/160° hysteresis band on the leg angle, plus the
//! per-rep quality trackers: robust knee minimum, hip depth, heel lift with
//! an EMA ground baseline, staggered-stance detection and shoulder drop.

use serde::Serialize;

use crate::bridge::landmarks::{
    LandmarkFrame, LEFT_ANKLE, LEFT_ELBOW, LEFT_HEEL, LEFT_HIP, LEFT_KNEE, LEFT_SHOULDER,
    LEFT_TOE, RIGHT_ANKLE, RIGHT_ELBOW, RIGHT_HEEL, RIGHT_HIP, RIGHT_KNEE, RIGHT_SHOULDER,
    RIGHT_TOE,
};
use crate::eval::events::{CaptureRequest, CaptureSink, EvalEvent, FrameRef};
use crate::eval::hold::ConsecutiveCounter;
use crate::eval::measure::{clamp01, joint_angle, point_angle, torso_height};
use crate::eval::profile::{CameraRange, SquatProfile};

const VIS_THR: f32 = 0.30;

/// Test ends after this many counted reps
const TARGET_REPS: u32 = 5;

/// Test window in milliseconds
const TEST_WINDOW_MS: f64 = 12_000.0;

/// Leg angle below this enters DOWN; above [`UP_ENTER_DEGREES`] re-enters UP.
/// The band between them is MID and triggers no transition.
const DOWN_ENTER_DEGREES: f32 = 150.0;
const UP_ENTER_DEGREES: f32 = 160.0;

/// EMA factor for the heel toe-heel baseline, armed while standing
const HEEL_BASELINE_ALPHA: f32 = 0.12;

/// Per-frame downward decay of the toe ground reference
const TOE_GROUND_DECAY: f32 = 0.0005;

/// Capture throttling: a new best-depth snapshot at most every 150 ms, and
/// only when the knee or hip minimum actually improved
const CAPTURE_THROTTLE_MS: f64 = 150.0;
const CAPTURE_KNEE_IMPROVEMENT: f32 = 1.0;
const CAPTURE_HIP_IMPROVEMENT: f32 = 0.003;

/// Where the subject is within the squat cycle
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SquatPhase {
    Up,
    Down,
    Mid,
}

/// Per-frame leg reading: phase plus the angle that produced it
struct PhaseReading {
    phase: SquatPhase,
    angle: f32,
}

/// One completed rep's snapshot, immutable once recorded
#[derive(Clone, Debug, Serialize)]
pub struct SquatRep {
    pub knee_min: f32,
    pub hip_depth: f32,
    pub symmetry: f32,
    pub heel_lifted: bool,
    pub heel_severity: f32,
    pub staggered: bool,
    pub staggered_severity: f32,
    pub shoulder_angle: Option<f32>,
    pub frame: Option<FrameRef>,
    pub form: f32,
}

/// Final squat result
#[derive(Clone, Debug, Serialize)]
pub struct SquatResult {
    pub score: f32,
    pub rep_count: u32,
    pub reps: Vec<SquatRep>,
}

// ============================================================================
// FRAME MEASUREMENTS
// ============================================================================

/// Leg phase for this frame, or `None` when neither leg is measurable.
fn squat_phase(lm: &LandmarkFrame, profile: &SquatProfile) -> Option<PhaseReading> {
    let left = joint_angle(&lm[LEFT_HIP], &lm[LEFT_KNEE], &lm[LEFT_ANKLE], VIS_THR).sentinel();
    let right = joint_angle(&lm[RIGHT_HIP], &lm[RIGHT_KNEE], &lm[RIGHT_ANKLE], VIS_THR).sentinel();

    let left_valid = left > 0.0 && left < 999.0;
    let right_valid = right > 0.0 && right < 999.0;
    if !left_valid && !right_valid {
        return None;
    }

    let angle = if profile.blend_side_angles {
        // Close range: weight the sides by landmark confidence to dampen
        // perspective distortion; fall back to the more confident side when
        // they disagree.
        let side_conf = |hip: usize, knee: usize, ankle: usize| -> f32 {
            lm[hip]
                .visibility
                .min(lm[knee].visibility)
                .min(lm[ankle].visibility)
        };
        let left_conf = if left_valid {
            side_conf(LEFT_HIP, LEFT_KNEE, LEFT_ANKLE)
        } else {
            -1.0
        };
        let right_conf = if right_valid {
            side_conf(RIGHT_HIP, RIGHT_KNEE, RIGHT_ANKLE)
        } else {
            -1.0
        };

        if left_conf >= 0.0 && right_conf >= 0.0 {
            let conf_sum = left_conf + right_conf;
            if conf_sum > 0.0 && (left_conf - right_conf).abs() < 0.10 {
                (left * left_conf + right * right_conf) / conf_sum
            } else if left_conf > right_conf {
                left
            } else {
                right
            }
        } else if left_valid {
            left
        } else {
            right
        }
    } else {
        // Far range: the more-bent of the valid sides
        match (left_valid, right_valid) {
            (true, true) => left.min(right),
            (true, false) => left,
            _ => right,
        }
    };

    let phase = if angle < DOWN_ENTER_DEGREES {
        SquatPhase::Down
    } else if angle > UP_ENTER_DEGREES {
        SquatPhase::Up
    } else {
        SquatPhase::Mid
    };
    Some(PhaseReading { phase, angle })
}

/// Normalized hip depth: average ankle Y minus average hip Y. Smaller means
/// the hips sank closer to the ankles.
fn hip_depth(lm: &LandmarkFrame) -> f32 {
    let hip_y = (lm[LEFT_HIP].y + lm[RIGHT_HIP].y) / 2.0;
    let ankle_y = (lm[LEFT_ANKLE].y + lm[RIGHT_ANKLE].y) / 2.0;
    ankle_y - hip_y
}

/// Combined left/right symmetry and torso-lean metric; 0 is perfect.
fn symmetry(lm: &LandmarkFrame) -> f32 {
    let s = (lm[LEFT_SHOULDER].y - lm[RIGHT_SHOULDER].y).abs();
    let h = (lm[LEFT_HIP].y - lm[RIGHT_HIP].y).abs();
    let y_symmetry = (s + h) / 2.0;

    // Side-view lean: shoulder midpoint drifting off the hip midpoint in X,
    // normalized by torso height
    let shoulder_mid_x = (lm[LEFT_SHOULDER].x + lm[RIGHT_SHOULDER].x) / 2.0;
    let hip_mid_x = (lm[LEFT_HIP].x + lm[RIGHT_HIP].x) / 2.0;
    let x_lean = (shoulder_mid_x - hip_mid_x).abs();

    let torso = torso_height(
        &lm[LEFT_SHOULDER],
        &lm[RIGHT_SHOULDER],
        &lm[LEFT_HIP],
        &lm[RIGHT_HIP],
    );
    let lean_ratio = if torso > 0.05 { x_lean / torso } else { 0.0 };

    y_symmetry.max(lean_ratio * 0.5)
}

// ============================================================================
// HEEL LIFT TRACKER
// ============================================================================

#[derive(Clone, Copy, Default)]
struct HeelBaseline {
    diff: Option<f32>,
    toe_ground_y: Option<f32>,
}

struct SideIndices {
    knee: usize,
    ankle: usize,
    heel: usize,
    toe: usize,
}

const LEFT_FOOT: SideIndices = SideIndices {
    knee: LEFT_KNEE,
    ankle: LEFT_ANKLE,
    heel: LEFT_HEEL,
    toe: LEFT_TOE,
};
const RIGHT_FOOT: SideIndices = SideIndices {
    knee: RIGHT_KNEE,
    ankle: RIGHT_ANKLE,
    heel: RIGHT_HEEL,
    toe: RIGHT_TOE,
};

/// Heel-lift detector with an EMA toe-heel baseline per side.
///
/// The baseline is established while standing (UP phase), decayed slowly,
/// and a lift only counts after the profile's consecutive-frame confirmation
/// so a single noisy frame never flags a heel.
struct HeelTracker {
    left: HeelBaseline,
    right: HeelBaseline,
    consecutive: ConsecutiveCounter,
    max_severity: f32,
    delta_ratio: f32,
    diff_ratio: f32,
}

impl HeelTracker {
    fn new(profile: &SquatProfile) -> Self {
        Self {
            left: HeelBaseline::default(),
            right: HeelBaseline::default(),
            consecutive: ConsecutiveCounter::new(profile.heel_confirm_frames),
            max_severity: 0.0,
            delta_ratio: profile.heel_delta_ratio,
            diff_ratio: profile.heel_diff_ratio,
        }
    }

    fn reset(&mut self, keep_baseline: bool) {
        self.consecutive.reset();
        self.max_severity = 0.0;
        if !keep_baseline {
            self.left = HeelBaseline::default();
            self.right = HeelBaseline::default();
        }
    }

    /// Feed a frame before the test starts so the standing baseline is armed
    /// by the time reps begin.
    fn warmup(&mut self, lm: &LandmarkFrame) {
        self.update(lm, SquatPhase::Up);
    }

    fn side(&mut self, which: Side) -> &mut HeelBaseline {
        match which {
            Side::Left => &mut self.left,
            Side::Right => &mut self.right,
        }
    }

    /// Per-side measurement; `None` when the foot is not reliably visible.
    /// Returns (lift flagged this frame, severity).
    fn compute(&mut self, lm: &LandmarkFrame, idx: &SideIndices, which: Side, standing: bool) -> Option<(bool, f32)> {
        let knee = &lm[idx.knee];
        let ankle = &lm[idx.ankle];
        let heel = &lm[idx.heel];
        let toe = &lm[idx.toe];

        if ankle.visibility < 0.45 || heel.visibility < 0.45 || toe.visibility < 0.45 {
            return None;
        }
        if knee.visibility < 0.35 {
            return None;
        }

        let shin = (knee.y - ankle.y).abs();
        if !shin.is_finite() || shin < 0.05 {
            return None;
        }

        let diff = toe.y - heel.y;

        if standing {
            let base = self.side(which);
            base.diff = Some(match base.diff {
                Some(prev) => prev + (diff - prev) * HEEL_BASELINE_ALPHA,
                None => diff,
            });
            base.toe_ground_y = Some(match base.toe_ground_y {
                Some(prev) => (prev - TOE_GROUND_DECAY).max(toe.y),
                None => toe.y,
            });
        }

        let base = match which {
            Side::Left => self.left,
            Side::Right => self.right,
        };
        let ref_toe_ground_y = base.toe_ground_y.unwrap_or_else(|| toe.y.max(heel.y));

        let toe_on_ground = toe.y >= ref_toe_ground_y - 0.15 * shin;
        let delta_from_base = match base.diff {
            Some(b) => diff - b,
            None => diff,
        };
        let lift =
            toe_on_ground && delta_from_base > self.delta_ratio * shin && diff > self.diff_ratio * shin;

        let lift_norm = if toe_on_ground {
            (delta_from_base / shin).max(0.0)
        } else {
            0.0
        };
        let severity = clamp01((lift_norm - 0.15) / (0.35 - 0.15));

        Some((lift, severity))
    }

    /// Returns (lift confirmed, running max severity).
    fn update(&mut self, lm: &LandmarkFrame, phase: SquatPhase) -> (bool, f32) {
        if phase == SquatPhase::Up {
            // Standing: keep the baselines fresh, nothing to confirm
            self.compute(lm, &LEFT_FOOT, Side::Left, true);
            self.compute(lm, &RIGHT_FOOT, Side::Right, true);
            self.consecutive.reset();
            self.max_severity = 0.0;
            return (false, 0.0);
        }

        let l = self.compute(lm, &LEFT_FOOT, Side::Left, false);
        let r = self.compute(lm, &RIGHT_FOOT, Side::Right, false);
        let lift_this_frame = l.map(|(lift, _)| lift).unwrap_or(false)
            || r.map(|(lift, _)| lift).unwrap_or(false);
        let severity_this_frame = l
            .map(|(_, s)| s)
            .unwrap_or(0.0)
            .max(r.map(|(_, s)| s).unwrap_or(0.0));
        self.max_severity = self.max_severity.max(severity_this_frame);

        let confirmed = self.consecutive.observe(lift_this_frame);
        (confirmed, self.max_severity)
    }
}

#[derive(Clone, Copy)]
enum Side {
    Left,
    Right,
}

// ============================================================================
// STAGGERED STANCE TRACKER
// ============================================================================

/// One-frame staggered-stance heuristic: a lunge-like forward/back split
/// shows up as horizontal ankle/knee spread relative to torso height.
fn detect_staggered_stance(lm: &LandmarkFrame) -> (bool, f32) {
    let left_ankle = &lm[LEFT_ANKLE];
    let right_ankle = &lm[RIGHT_ANKLE];
    let left_knee = &lm[LEFT_KNEE];
    let right_knee = &lm[RIGHT_KNEE];

    if left_ankle.visibility < 0.4
        || right_ankle.visibility < 0.4
        || left_knee.visibility < 0.4
        || right_knee.visibility < 0.4
    {
        return (false, 0.0);
    }

    let mut torso = torso_height(
        &lm[LEFT_SHOULDER],
        &lm[RIGHT_SHOULDER],
        &lm[LEFT_HIP],
        &lm[RIGHT_HIP],
    );
    if torso < 0.1 {
        torso = 0.3;
    }

    let ankle_x_diff = (left_ankle.x - right_ankle.x).abs();
    let ankle_x_threshold = torso * 0.25;
    let knee_x_diff = (left_knee.x - right_knee.x).abs();
    let knee_x_threshold = torso * 0.20;
    let knee_y_diff = (left_knee.y - right_knee.y).abs();
    let ankle_y_diff = (left_ankle.y - right_ankle.y).abs();
    let y_threshold = torso * 0.15;

    let has_x_spread = ankle_x_diff > ankle_x_threshold && knee_x_diff > knee_x_threshold;
    let has_y_diff = knee_y_diff > y_threshold || ankle_y_diff > y_threshold;
    let has_large_x_spread = ankle_x_diff > torso * 0.40;

    let staggered = (has_x_spread && has_y_diff) || has_large_x_spread;
    if !staggered {
        return (false, 0.0);
    }

    let x_severity = clamp01((ankle_x_diff - ankle_x_threshold) / (torso * 0.3));
    let y_severity = clamp01(knee_y_diff.max(ankle_y_diff) / (torso * 0.3));
    let severity = (x_severity.max(y_severity) * 0.5 + 0.5).clamp(0.5, 1.0);
    (true, severity)
}

/// Cross-frame staggered-stance confirmation for the current rep
struct StaggerTracker {
    counter: ConsecutiveCounter,
    detected: bool,
    max_severity: f32,
}

impl StaggerTracker {
    fn new() -> Self {
        Self {
            counter: ConsecutiveCounter::new(3),
            detected: false,
            max_severity: 0.0,
        }
    }

    fn reset(&mut self) {
        self.counter.reset();
        self.detected = false;
        self.max_severity = 0.0;
    }

    fn update(&mut self, lm: &LandmarkFrame) {
        let (staggered, severity) = detect_staggered_stance(lm);
        if staggered {
            self.max_severity = self.max_severity.max(severity);
            if self.counter.observe(true) {
                self.detected = true;
            }
        } else {
            self.counter.observe(false);
        }
    }
}

// ============================================================================
// SHOULDER ANGLE TRACKER
// ============================================================================

/// Average torso-to-upper-arm angle across visible sides; `None` when
/// neither side is reliable.
fn shoulder_angle(lm: &LandmarkFrame) -> Option<f32> {
    let mut angles = Vec::with_capacity(2);

    let mut side = |shoulder: usize, elbow: usize, hip: usize| {
        if lm[shoulder].visibility > 0.4 && lm[elbow].visibility > 0.4 && lm[hip].visibility > 0.4 {
            let s = lm[shoulder].pos();
            if let Some(a) = point_angle(lm[hip].pos(), s, lm[elbow].pos()).value() {
                angles.push(a);
            }
        }
    };
    side(LEFT_SHOULDER, LEFT_ELBOW, LEFT_HIP);
    side(RIGHT_SHOULDER, RIGHT_ELBOW, RIGHT_HIP);

    if angles.is_empty() {
        None
    } else {
        Some(angles.iter().sum::<f32>() / angles.len() as f32)
    }
}

// ============================================================================
// EVALUATOR
// ============================================================================

pub struct SquatEvaluator {
    profile: SquatProfile,
    test_start: Option<f64>,
    running: bool,
    rep_state: SquatPhase,
    rep_count: u32,
    knee_min: f32,
    hip_min: f32,
    heel_lifted: bool,
    heel_severity_max: f32,
    knee_samples: Vec<f32>,
    heel: HeelTracker,
    stagger: StaggerTracker,
    min_shoulder_angle: f32,
    reps: Vec<SquatRep>,
    // Best-frame capture throttling
    current_rep_frame: Option<FrameRef>,
    last_capture_at_ms: f64,
    last_captured_knee_min: f32,
    last_captured_hip_min: f32,
}

impl SquatEvaluator {
    pub fn new(range: CameraRange) -> Self {
        let profile = SquatProfile::for_range(range);
        Self {
            profile,
            test_start: None,
            running: false,
            rep_state: SquatPhase::Up,
            rep_count: 0,
            knee_min: 999.0,
            hip_min: 999.0,
            heel_lifted: false,
            heel_severity_max: 0.0,
            knee_samples: Vec::new(),
            heel: HeelTracker::new(&profile),
            stagger: StaggerTracker::new(),
            min_shoulder_angle: 999.0,
            reps: Vec::new(),
            current_rep_frame: None,
            last_capture_at_ms: 0.0,
            last_captured_knee_min: 999.0,
            last_captured_hip_min: 999.0,
        }
    }

    pub fn is_running(&self) -> bool {
        self.running
    }

    /// Arm the heel baselines from standing frames before "go"
    pub fn warmup_heel_baseline(&mut self, lm: &LandmarkFrame) {
        self.heel.warmup(lm);
    }

    /// Begin a test attempt. Idempotent while a test is in progress.
    pub fn start(&mut self, now_ms: f64) {
        if self.test_start.is_some() {
            return;
        }
        self.test_start = Some(now_ms);
        self.running = true;
        self.rep_count = 0;
        self.reps.clear();
        self.rep_state = SquatPhase::Up;
        self.knee_min = 999.0;
        self.hip_min = 999.0;
        self.heel_lifted = false;
        self.heel_severity_max = 0.0;
        self.knee_samples.clear();
        self.heel.reset(false);
        self.stagger.reset();
        self.min_shoulder_angle = 999.0;
        self.clear_capture_state();
    }

    fn clear_capture_state(&mut self) {
        self.current_rep_frame = None;
        self.last_capture_at_ms = 0.0;
        self.last_captured_knee_min = 999.0;
        self.last_captured_hip_min = 999.0;
    }

    /// Robust knee minimum: 15th percentile of the current rep's sample
    /// buffer, falling back to the true minimum while under 7 samples.
    fn robust_knee_min(&self) -> f32 {
        if self.knee_samples.len() < 7 {
            return self.knee_samples.iter().fold(999.0_f32, |m, &v| m.min(v));
        }
        let mut sorted = self.knee_samples.clone();
        sorted.sort_by(|a, b| a.total_cmp(b));
        let idx = (((sorted.len() - 1) as f32) * 0.15).floor() as usize;
        sorted[idx.min(sorted.len() - 1)]
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

        if now_ms - test_start > TEST_WINDOW_MS {
            self.running = false;
            events.push(EvalEvent::WindowExpired);
            return events;
        }

        let Some(reading) = squat_phase(lm, &self.profile) else {
            return events;
        };

        let depth = hip_depth(lm);

        if self.profile.percentile_knee {
            if reading.angle > 0.0
                && reading.angle < 999.0
                && matches!(reading.phase, SquatPhase::Down | SquatPhase::Mid)
            {
                self.knee_samples.push(reading.angle);
            }
            let k_min = self.robust_knee_min();
            if k_min < self.knee_min {
                self.knee_min = k_min;
            }
        } else if reading.angle < self.knee_min {
            self.knee_min = reading.angle;
        }
        if depth < self.hip_min {
            self.hip_min = depth;
        }

        if matches!(reading.phase, SquatPhase::Down | SquatPhase::Mid) {
            let (confirmed, severity_max) = self.heel.update(lm, reading.phase);
            if confirmed {
                self.heel_lifted = true;
            }
            self.heel_severity_max = self.heel_severity_max.max(severity_max);
            self.stagger.update(lm);
            if let Some(angle) = shoulder_angle(lm) {
                if angle < self.min_shoulder_angle {
                    self.min_shoulder_angle = angle;
                }
            }
        } else {
            // Standing frames keep the heel baseline armed
            self.heel.update(lm, reading.phase);
        }

        match self.rep_state {
            SquatPhase::Up => {
                if reading.phase == SquatPhase::Down {
                    self.rep_state = SquatPhase::Down;
                    self.clear_capture_state();
                    if self.profile.range == CameraRange::Near {
                        // Close range re-arms the per-rep trackers at descent
                        self.heel.reset(true);
                        self.knee_samples.clear();
                        self.heel_severity_max = 0.0;
                    }
                }
            }
            SquatPhase::Down => {
                if matches!(reading.phase, SquatPhase::Down | SquatPhase::Mid) {
                    if let Some(sink) = capture.as_deref_mut() {
                        self.maybe_capture_best_frame(sink, now_ms);
                    }
                }

                if reading.phase == SquatPhase::Up {
                    self.complete_rep(lm, &mut events);
                }
            }
            // rep_state only ever holds Up or Down
            SquatPhase::Mid => {}
        }

        events
    }

    fn maybe_capture_best_frame(&mut self, sink: &mut dyn CaptureSink, now_ms: f64) {
        let knee_improved = self.knee_min < self.last_captured_knee_min - CAPTURE_KNEE_IMPROVEMENT;
        let hip_improved = self.hip_min < self.last_captured_hip_min - CAPTURE_HIP_IMPROVEMENT;
        let throttled_ok = now_ms - self.last_capture_at_ms > CAPTURE_THROTTLE_MS;

        if (knee_improved || hip_improved) && throttled_ok {
            self.current_rep_frame = sink.capture(CaptureRequest {
                exercise: "squat",
                kind: "rep-down",
                index: self.rep_count + 1,
            });
            self.last_capture_at_ms = now_ms;
            self.last_captured_knee_min = self.knee_min;
            self.last_captured_hip_min = self.hip_min;
        }
    }

    fn complete_rep(&mut self, lm: &LandmarkFrame, events: &mut Vec<EvalEvent>) {
        self.rep_count += 1;

        let rep_knee_min = if self.profile.percentile_knee {
            self.robust_knee_min()
        } else {
            self.knee_min
        };

        let mut rep = SquatRep {
            knee_min: rep_knee_min,
            hip_depth: self.hip_min,
            symmetry: symmetry(lm),
            heel_lifted: self.heel_lifted,
            heel_severity: self.heel_severity_max,
            staggered: self.stagger.detected,
            staggered_severity: self.stagger.max_severity,
            shoulder_angle: if self.min_shoulder_angle < 999.0 {
                Some((self.min_shoulder_angle * 10.0).round() / 10.0)
            } else {
                None
            },
            frame: self.current_rep_frame,
            form: 0.0,
        };
        rep.form = rep_form_score(&rep, &self.profile);
        self.reps.push(rep);

        events.push(EvalEvent::RepCompleted {
            count: self.rep_count,
        });

        self.knee_min = 999.0;
        self.hip_min = 999.0;
        self.heel_lifted = false;
        self.heel_severity_max = 0.0;
        self.rep_state = SquatPhase::Up;
        self.heel.reset(true);
        self.knee_samples.clear();
        self.stagger.reset();
        self.min_shoulder_angle = 999.0;
        self.clear_capture_state();

        if self.rep_count >= TARGET_REPS {
            self.running = false;
            events.push(EvalEvent::TargetReached {
                count: self.rep_count,
            });
        }
    }

    /// Pure reduction of the accumulated history; repeated calls return the
    /// same result.
    pub fn finish(&self) -> SquatResult {
        SquatResult {
            score: final_score(&self.reps, &self.profile),
            rep_count: self.rep_count,
            reps: self.reps.clone(),
        }
    }

    pub fn reset(&mut self) {
        let profile = self.profile;
        *self = SquatEvaluator::new(profile.range);
    }
}

// ============================================================================
// SCORING
// ============================================================================

fn lerp01(a: f32, b: f32, x: f32) -> f32 {
    if b == a {
        return 0.0;
    }
    clamp01((x - a) / (b - a))
}

/// Four-signal form score for one rep, in [0,1], with the two punitive
/// overrides applied after averaging.
fn rep_form_score(rep: &SquatRep, profile: &SquatProfile) -> f32 {
    let knee = rep.knee_min;
    let hip = rep.hip_depth;
    let sym = rep.symmetry;

    // Knee depth: progressive, 130° (too shallow) scores 0, 45° (deep) full
    let knee_q = if knee >= 130.0 {
        0.0
    } else if knee <= 45.0 {
        1.0
    } else {
        clamp01((130.0 - knee) / (130.0 - 45.0))
    };

    // Hip depth: hard threshold per profile
    let hip_q = if hip <= profile.hip_depth_good { 1.0 } else { 0.0 };

    // Lean/symmetry: zero at 0.25
    let sym_q = 1.0 - lerp01(0.00, 0.25, sym);

    let heel_severity = clamp01(rep.heel_severity);
    let heel_q = 1.0 - heel_severity;

    let mut form = clamp01((knee_q + hip_q + sym_q + heel_q) / 4.0);

    // Both depth signals too shallow: the rep barely happened
    let knee_too_shallow = knee >= 100.0;
    let hip_too_shallow = hip > profile.hip_depth_good;
    if knee_too_shallow && hip_too_shallow {
        form *= 0.25;
    }

    // Staggered stance is a hard ceiling scaled by severity, not a blend
    if rep.staggered && rep.staggered_severity > 0.0 {
        let max_allowed = 0.30 - rep.staggered_severity * 0.10;
        form = form.min(max_allowed);
    }

    form
}

/// Final score: completion (30) with shallow-rep penalty, plus mean rep form
/// (70), rounded to hundredths. The form mean divides by the target rep
/// count, so missing reps cost form share as well.
fn final_score(reps: &[SquatRep], profile: &SquatProfile) -> f32 {
    if reps.is_empty() {
        return 0.0;
    }

    let shallow = reps
        .iter()
        .filter(|r| r.knee_min >= 130.0 && r.hip_depth > profile.hip_depth_good)
        .count() as f32;

    let base_comp = reps.len() as f32 / TARGET_REPS as f32 * 30.0;
    let shallow_penalty = shallow / TARGET_REPS as f32 * 30.0 * 0.5;
    let comp = base_comp - shallow_penalty;

    let form_sum: f32 = reps.iter().map(|r| r.form).sum();
    let form = form_sum / TARGET_REPS as f32 * 70.0;

    ((comp + form) * 100.0).round() / 100.0
}

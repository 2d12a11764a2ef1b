//! Test session orchestration - connects the evaluators with JS
//!
//! One evaluator is active at a time and only `process_frame` drives it, so
//! every mutation happens on the single frame-callback path. The orientation
//! tracker lives beside the session and only ever reads the landmark store.

use std::cell::RefCell;
use wasm_bindgen::prelude::*;

use super::landmarks::get_smoothed_landmarks;
use crate::eval::events::{CaptureRequest, CaptureSink, FrameRef};
use crate::eval::forward_bend::ForwardBendEvaluator;
use crate::eval::high_knee::HighKneeEvaluator;
use crate::eval::orientation::{right_shoulder_shown, OrientationTracker};
use crate::eval::plank::PlankEvaluator;
use crate::eval::profile::CameraRange;
use crate::eval::squat::SquatEvaluator;
use crate::eval::stance::StanceEvaluator;

enum ActiveEvaluator {
    Squat(SquatEvaluator),
    ForwardBend(ForwardBendEvaluator),
    HighKnee(HighKneeEvaluator),
    Stance(StanceEvaluator),
    Plank(PlankEvaluator),
}

#[derive(Default)]
struct SessionState {
    evaluator: Option<ActiveEvaluator>,
    capture_hook: Option<js_sys::Function>,
}

thread_local! {
    static SESSION: RefCell<SessionState> = RefCell::new(SessionState::default());
    static ORIENTATION: RefCell<OrientationTracker> = RefCell::new(OrientationTracker::new());
}

/// Capture sink backed by a JS function. The hook returns a numeric frame
/// reference; any JS exception or non-numeric return is swallowed and the
/// capture simply yields no reference.
struct JsCaptureSink {
    hook: js_sys::Function,
}

impl CaptureSink for JsCaptureSink {
    fn capture(&mut self, req: CaptureRequest) -> Option<FrameRef> {
        let arg = js_sys::Object::new();
        js_sys::Reflect::set(&arg, &"exercise".into(), &req.exercise.into()).ok()?;
        js_sys::Reflect::set(&arg, &"kind".into(), &req.kind.into()).ok()?;
        js_sys::Reflect::set(&arg, &"index".into(), &JsValue::from_f64(req.index as f64)).ok()?;
        let result = self.hook.call1(&JsValue::NULL, &arg).ok()?;
        result.as_f64().map(|v| v as FrameRef)
    }
}

fn to_js<T: serde::Serialize>(value: &T) -> Result<JsValue, JsValue> {
    serde_wasm_bindgen::to_value(value).map_err(|e| JsValue::from_str(&e.to_string()))
}

fn ensure_evaluator(state: &mut SessionState, exercise: &str, range: &str) -> Result<(), JsValue> {
    let already_selected = matches!(
        (&state.evaluator, exercise),
        (Some(ActiveEvaluator::Squat(_)), "squat")
            | (Some(ActiveEvaluator::ForwardBend(_)), "forward-bend")
            | (Some(ActiveEvaluator::HighKnee(_)), "high-knee")
            | (Some(ActiveEvaluator::Stance(_)), "t-pose")
            | (Some(ActiveEvaluator::Plank(_)), "plank")
    );
    if already_selected {
        return Ok(());
    }

    state.evaluator = Some(match exercise {
        "squat" => {
            let range = CameraRange::from_str(range)
                .ok_or_else(|| JsValue::from_str(&format!("Unknown camera range: {}", range)))?;
            ActiveEvaluator::Squat(SquatEvaluator::new(range))
        }
        "forward-bend" => ActiveEvaluator::ForwardBend(ForwardBendEvaluator::new()),
        "high-knee" => ActiveEvaluator::HighKnee(HighKneeEvaluator::new()),
        "t-pose" => ActiveEvaluator::Stance(StanceEvaluator::new()),
        "plank" => ActiveEvaluator::Plank(PlankEvaluator::new()),
        other => return Err(JsValue::from_str(&format!("Unknown exercise: {}", other))),
    });
    Ok(())
}

/// Select an exercise without starting its test window. Lets the countdown
/// phase feed priming frames before "go".
#[wasm_bindgen]
pub fn select_test(exercise: &str, range: &str) -> Result<(), JsValue> {
    SESSION.with(|cell| ensure_evaluator(&mut cell.borrow_mut(), exercise, range))
}

/// Begin a test. `exercise` is one of "squat", "forward-bend", "high-knee",
/// "t-pose", "plank"; `range` is "1m" or "2m" (squat only; others ignore
/// it). Starting the exercise that is already running is a no-op.
#[wasm_bindgen]
pub fn start_test(exercise: &str, range: &str, now_ms: f64) -> Result<(), JsValue> {
    SESSION.with(|cell| {
        let mut state = cell.borrow_mut();
        ensure_evaluator(&mut state, exercise, range)?;

        match state.evaluator.as_mut() {
            Some(ActiveEvaluator::Squat(e)) => e.start(now_ms),
            Some(ActiveEvaluator::ForwardBend(e)) => e.start(now_ms),
            Some(ActiveEvaluator::HighKnee(e)) => e.start(now_ms),
            Some(ActiveEvaluator::Stance(e)) => e.start(now_ms),
            Some(ActiveEvaluator::Plank(e)) => e.start(now_ms),
            None => {}
        }
        Ok(())
    })
}

/// Drive the active evaluator with the current smoothed landmark frame.
/// Returns the array of events this frame raised.
#[wasm_bindgen]
pub fn process_frame(now_ms: f64, in_position: bool) -> Result<JsValue, JsValue> {
    SESSION.with(|cell| {
        let mut state = cell.borrow_mut();

        let Some(frame) = get_smoothed_landmarks() else {
            return to_js::<[u8; 0]>(&[]);
        };

        let mut sink = state
            .capture_hook
            .clone()
            .map(|hook| JsCaptureSink { hook });
        let capture: Option<&mut dyn CaptureSink> =
            sink.as_mut().map(|s| s as &mut dyn CaptureSink);

        let events = match state.evaluator.as_mut() {
            Some(ActiveEvaluator::Squat(e)) => e.update(&frame, now_ms, in_position, capture),
            Some(ActiveEvaluator::ForwardBend(e)) => {
                e.update(&frame, now_ms, in_position, capture)
            }
            Some(ActiveEvaluator::HighKnee(e)) => e.update(&frame, now_ms, in_position, capture),
            Some(ActiveEvaluator::Stance(e)) => e.update(&frame, now_ms, in_position),
            Some(ActiveEvaluator::Plank(e)) => e.update(&frame, now_ms, in_position),
            None => Vec::new(),
        };
        to_js(&events)
    })
}

/// Feed the current frame to the active evaluator outside a running test
/// window (countdown frames). The squat evaluator arms its heel-lift
/// baselines from these standing frames; other evaluators ignore them.
#[wasm_bindgen]
pub fn prime_frame() {
    SESSION.with(|cell| {
        let mut state = cell.borrow_mut();
        let Some(frame) = get_smoothed_landmarks() else {
            return;
        };
        if let Some(ActiveEvaluator::Squat(e)) = state.evaluator.as_mut() {
            if !e.is_running() {
                e.warmup_heel_baseline(&frame);
            }
        }
    });
}

/// Finalize the active test and return its result object. Pure: calling
/// again returns the identical result, nothing is consumed.
#[wasm_bindgen]
pub fn finish_test() -> Result<JsValue, JsValue> {
    SESSION.with(|cell| {
        let state = cell.borrow();
        match state.evaluator.as_ref() {
            Some(ActiveEvaluator::Squat(e)) => to_js(&e.finish()),
            Some(ActiveEvaluator::ForwardBend(e)) => to_js(&e.finish()),
            Some(ActiveEvaluator::HighKnee(e)) => to_js(&e.finish()),
            Some(ActiveEvaluator::Stance(e)) => to_js(&e.finish()),
            Some(ActiveEvaluator::Plank(e)) => to_js(&e.finish()),
            None => Ok(JsValue::NULL),
        }
    })
}

/// Zero the active evaluator's counters, keeping it selected
#[wasm_bindgen]
pub fn reset_test() {
    SESSION.with(|cell| {
        let mut state = cell.borrow_mut();
        match state.evaluator.as_mut() {
            Some(ActiveEvaluator::Squat(e)) => e.reset(),
            Some(ActiveEvaluator::ForwardBend(e)) => e.reset(),
            Some(ActiveEvaluator::HighKnee(e)) => e.reset(),
            Some(ActiveEvaluator::Stance(e)) => e.reset(),
            Some(ActiveEvaluator::Plank(e)) => e.reset(),
            None => {}
        }
    });
}

/// Drop the active evaluator entirely
#[wasm_bindgen]
pub fn stop_test() {
    SESSION.with(|cell| {
        cell.borrow_mut().evaluator = None;
    });
}

/// Whether a test window is currently running
#[wasm_bindgen]
pub fn is_test_running() -> bool {
    SESSION.with(|cell| {
        let state = cell.borrow();
        match state.evaluator.as_ref() {
            Some(ActiveEvaluator::Squat(e)) => e.is_running(),
            Some(ActiveEvaluator::ForwardBend(e)) => e.is_running(),
            Some(ActiveEvaluator::HighKnee(e)) => e.is_running(),
            Some(ActiveEvaluator::Stance(e)) => e.is_running(),
            Some(ActiveEvaluator::Plank(e)) => e.is_running(),
            None => false,
        }
    })
}

/// Store the JS best-frame capture function
#[wasm_bindgen]
pub fn set_capture_hook(hook: js_sys::Function) {
    SESSION.with(|cell| {
        cell.borrow_mut().capture_hook = Some(hook);
    });
}

#[wasm_bindgen]
pub fn clear_capture_hook() {
    SESSION.with(|cell| {
        cell.borrow_mut().capture_hook = None;
    });
}

/// One orientation-tracker step against the current landmark frame. Driven
/// from the coarse pacing clock, independent of the evaluator frame loop.
#[wasm_bindgen]
pub fn orientation_tick() -> Result<JsValue, JsValue> {
    let Some(frame) = get_smoothed_landmarks() else {
        return Ok(JsValue::NULL);
    };
    ORIENTATION.with(|cell| {
        let verdict = cell.borrow_mut().update(&frame);
        to_js(&verdict)
    })
}

#[wasm_bindgen]
pub fn orientation_reset() {
    ORIENTATION.with(|cell| cell.borrow_mut().reset());
}

#[wasm_bindgen]
pub fn orientation_back_confirmed() -> bool {
    ORIENTATION.with(|cell| cell.borrow().is_back_confirmed())
}

/// Profile-setup validation: is the subject sideways, front-facing, showing
/// their right shoulder?
#[wasm_bindgen]
pub fn check_right_shoulder() -> Result<JsValue, JsValue> {
    let Some(frame) = get_smoothed_landmarks() else {
        return Ok(JsValue::NULL);
    };
    to_js(&right_shoulder_shown(&frame))
}

//! Landmark storage and JS bridge
//!
//! Receives MediaPipe Pose landmarks from JavaScript, applies the
//! visibility-weighted smoothing blend, and stores the result for the
//! evaluators to read.

use wasm_bindgen::prelude::*;
use std::cell::RefCell;

use super::smooth::smooth;

// ============================================================================
// LANDMARK INDICES (MediaPipe Pose - 33 total)
// ============================================================================

pub const NOSE: usize = 0;
pub const LEFT_EYE: usize = 2;
pub const RIGHT_EYE: usize = 5;
pub const LEFT_EAR: usize = 7;
pub const LEFT_SHOULDER: usize = 11;
pub const RIGHT_SHOULDER: usize = 12;
pub const LEFT_ELBOW: usize = 13;
pub const RIGHT_ELBOW: usize = 14;
pub const LEFT_WRIST: usize = 15;
pub const RIGHT_WRIST: usize = 16;
pub const LEFT_HIP: usize = 23;
pub const RIGHT_HIP: usize = 24;
pub const LEFT_KNEE: usize = 25;
pub const RIGHT_KNEE: usize = 26;
pub const LEFT_ANKLE: usize = 27;
pub const RIGHT_ANKLE: usize = 28;
pub const LEFT_HEEL: usize = 29;
pub const RIGHT_HEEL: usize = 30;
pub const LEFT_TOE: usize = 31;
pub const RIGHT_TOE: usize = 32;

/// Number of landmarks per frame
pub const LANDMARK_COUNT: usize = 33;

/// Floats per landmark in the JS transfer format (x, y, z, visibility)
pub const FLOATS_PER_LANDMARK: usize = 4;

// ============================================================================
// LANDMARK DATA STRUCTURE
// ============================================================================

/// A single pose landmark (normalized image coordinates)
#[derive(Clone, Copy, Default, Debug, PartialEq)]
pub struct Landmark {
    pub x: f32,  // 0-1 normalized
    pub y: f32,  // 0-1 normalized
    pub z: f32,  // Relative depth (negative = closer to camera)
    pub visibility: f32,  // Detector confidence, 0-1
}

impl Landmark {
    pub fn new(x: f32, y: f32, z: f32, visibility: f32) -> Self {
        Self { x, y, z, visibility }
    }

    /// Image-plane position as a tuple
    pub fn pos(&self) -> (f32, f32) {
        (self.x, self.y)
    }
}

/// One full pose detection: 33 landmarks in MediaPipe index order
pub type LandmarkFrame = [Landmark; LANDMARK_COUNT];

/// Internal storage for current frame's landmarks
struct LandmarkStore {
    raw: LandmarkFrame,
    smoothed: LandmarkFrame,
    has_data: bool,
}

impl Default for LandmarkStore {
    fn default() -> Self {
        Self {
            raw: [Landmark::default(); LANDMARK_COUNT],
            smoothed: [Landmark::default(); LANDMARK_COUNT],
            has_data: false,
        }
    }
}

// Thread-local storage (WASM is single-threaded)
thread_local! {
    static LANDMARKS: RefCell<LandmarkStore> = RefCell::new(LandmarkStore::default());
}

// ============================================================================
// WASM-BINDGEN ENTRY POINTS
// ============================================================================

/// Called from JavaScript with flat Float32Array of 132 values
/// (33 landmarks × 4 values: x, y, z, visibility)
#[wasm_bindgen]
pub fn update_landmarks(data: &[f32]) {
    if data.len() != LANDMARK_COUNT * FLOATS_PER_LANDMARK {
        web_sys::console::warn_1(
            &format!(
                "Invalid landmark data length: {} (expected {})",
                data.len(),
                LANDMARK_COUNT * FLOATS_PER_LANDMARK
            )
            .into(),
        );
        return;
    }

    LANDMARKS.with(|store_cell| {
        let mut store = store_cell.borrow_mut();

        for i in 0..LANDMARK_COUNT {
            store.raw[i] = Landmark {
                x: data[i * 4],
                y: data[i * 4 + 1],
                z: data[i * 4 + 2],
                visibility: data[i * 4 + 3],
            };
        }

        store.smoothed = if store.has_data {
            smooth(&store.raw, &store.smoothed)
        } else {
            store.raw
        };
        store.has_data = true;
    });
}

/// Called from JavaScript when the detector finds no body in the frame.
/// Clears the store so gating logic knows the user is out of view.
#[wasm_bindgen]
pub fn clear_landmarks() {
    LANDMARKS.with(|store_cell| {
        let mut store = store_cell.borrow_mut();
        store.has_data = false;
    });
}

// ============================================================================
// INTERNAL API (no wasm_bindgen)
// ============================================================================

/// Get the smoothed landmark frame (what the evaluators consume)
pub fn get_smoothed_landmarks() -> Option<LandmarkFrame> {
    LANDMARKS.with(|store_cell| {
        let store = store_cell.borrow();
        if store.has_data {
            Some(store.smoothed)
        } else {
            None
        }
    })
}

/// Check if we have valid landmark data
#[wasm_bindgen]
pub fn has_landmarks() -> bool {
    LANDMARKS.with(|store_cell| store_cell.borrow().has_data)
}

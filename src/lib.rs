//! FitForm Web - Exercise Form Evaluation Engine
//!
//! Entry point for WASM module. Only contains:
//! - Module declarations
//! - wasm_bindgen entry points that delegate to submodules

mod bridge;
mod eval;

use wasm_bindgen::prelude::*;

// Re-export wasm_bindgen functions for JS access
pub use bridge::{
    check_right_shoulder, clear_capture_hook, clear_landmarks, finish_test, is_test_running,
    orientation_back_confirmed, orientation_reset, orientation_tick, prime_frame, process_frame,
    reset_test, select_test, set_capture_hook, start_test, stop_test, update_landmarks,
};

// ============================================================================
// CONSOLE LOGGING
// ============================================================================

#[wasm_bindgen]
extern "C" {
    #[wasm_bindgen(js_namespace = console)]
    fn log(s: &str);
}

macro_rules! console_log {
    ($($t:tt)*) => (log(&format_args!($($t)*).to_string()))
}

// ============================================================================
// WASM ENTRY POINTS
// ============================================================================

/// Called automatically when WASM module loads
#[wasm_bindgen(start)]
pub fn init_panic_hook() {
    console_error_panic_hook::set_once();
    console_log!("✅ Form evaluation engine loaded");
}

//! Bridge module - JS ↔ Rust communication
//!
//! All #[wasm_bindgen] entry points live here.
//! Re-exports only in mod.rs, logic in submodules.

pub mod landmarks;
mod session;
mod smooth;

pub use landmarks::{clear_landmarks, update_landmarks};

pub use session::{
    check_right_shoulder, clear_capture_hook, finish_test, is_test_running,
    orientation_back_confirmed, orientation_reset, orientation_tick, prime_frame, process_frame,
    reset_test, select_test, set_capture_hook, start_test, stop_test,
};

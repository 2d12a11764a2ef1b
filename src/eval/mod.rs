//! Exercise evaluation core
//!
//! Pure logic over landmark frames: no wasm types, no global state, fully
//! host-testable. Each evaluator is a small state machine with `start`,
//! `update` (returning events), a pure `finish`, and `reset`.

pub mod events;
pub mod forward_bend;
pub mod high_knee;
pub mod hold;
pub mod measure;
pub mod orientation;
pub mod plank;
pub mod profile;
pub mod squat;
pub mod stance;

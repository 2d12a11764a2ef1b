//! Evaluator events and the best-frame capture hook
//!
//! The evaluators never call back into the UI. `update` returns the events
//! raised by that frame and the orchestration layer (voice guidance, JS)
//! consumes them synchronously.

use serde::Serialize;

/// Something the orchestration layer should react to
#[derive(Clone, Copy, Debug, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum EvalEvent {
    /// A rep was counted this frame
    RepCompleted { count: u32 },
    /// The exercise's rep target was reached; the test is over
    TargetReached { count: u32 },
    /// The test window elapsed; the caller should finalize
    WindowExpired,
    /// A hold was confirmed after its debounce period
    HoldStarted,
    /// A confirmed hold was lost after its debounce period
    HoldLost,
}

/// Opaque reference to a captured frame, minted by the capture sink
pub type FrameRef = u32;

/// What a capture is for, passed through to the sink's storage naming
#[derive(Clone, Copy, Debug)]
pub struct CaptureRequest<'a> {
    pub exercise: &'a str,
    pub kind: &'a str,
    pub index: u32,
}

/// Best-effort visual snapshot hook. Implementations must swallow their own
/// failures; a `None` simply means no frame reference is attached.
pub trait CaptureSink {
    fn capture(&mut self, req: CaptureRequest) -> Option<FrameRef>;
}

/// Sink that records requests without doing anything, for tests
#[cfg(test)]
pub struct RecordingSink {
    pub requests: Vec<(String, u32)>,
}

#[cfg(test)]
impl RecordingSink {
    pub fn new() -> Self {
        Self { requests: Vec::new() }
    }
}

#[cfg(test)]
impl CaptureSink for RecordingSink {
    fn capture(&mut self, req: CaptureRequest) -> Option<FrameRef> {
        self.requests.push((req.kind.to_string(), req.index));
        Some(self.requests.len() as FrameRef)
    }
}

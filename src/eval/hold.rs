//! Temporal debounce primitives shared by the evaluators
//!
//! Every exercise machine needs the same two shapes of noise rejection:
//! frame-count confirmation (N consecutive suspicious frames before a flag
//! trips) and elapsed-time confirmation (a candidate state must persist for
//! some milliseconds before it is entered or left). Both live here so the
//! evaluators stay declarative about their thresholds.

/// Consecutive-frame confirmation counter.
///
/// Confirming frames increment, non-confirming frames decrement toward zero
/// (a single miss does not erase accumulated evidence). The flag trips at
/// the threshold; a single frame can never confirm.
#[derive(Clone, Copy, Debug)]
pub struct ConsecutiveCounter {
    count: u32,
    threshold: u32,
}

impl ConsecutiveCounter {
    pub fn new(threshold: u32) -> Self {
        Self { count: 0, threshold }
    }

    /// Feed one frame's verdict; returns whether the counter is at or past
    /// its threshold afterwards.
    pub fn observe(&mut self, confirming: bool) -> bool {
        if confirming {
            self.count += 1;
        } else {
            self.count = self.count.saturating_sub(1);
        }
        self.is_confirmed()
    }

    pub fn is_confirmed(&self) -> bool {
        self.count >= self.threshold
    }

    pub fn reset(&mut self) {
        self.count = 0;
    }
}

/// Millisecond-debounced binary state (in-position / out-of-position).
///
/// Entering requires `confirm_ms` of continuous in-position time; leaving
/// requires `loss_ms` of continuous out-of-position time. Matches the plank
/// machine's pending-time bookkeeping: pending time accumulates on every
/// frame that disagrees with the current state and resets on agreement.
#[derive(Clone, Copy, Debug)]
pub struct DebouncedFlag {
    confirm_ms: f64,
    loss_ms: f64,
    pending_ms: f64,
    active: bool,
}

/// What a debounce update decided
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FlagTransition {
    None,
    Entered,
    Lost,
}

impl DebouncedFlag {
    pub fn new(confirm_ms: f64, loss_ms: f64) -> Self {
        Self {
            confirm_ms,
            loss_ms,
            pending_ms: 0.0,
            active: false,
        }
    }

    pub fn update(&mut self, in_position: bool, dt_ms: f64) -> FlagTransition {
        if !self.active {
            if !in_position {
                self.pending_ms = 0.0;
                return FlagTransition::None;
            }
            self.pending_ms += dt_ms;
            if self.pending_ms >= self.confirm_ms {
                self.active = true;
                self.pending_ms = 0.0;
                return FlagTransition::Entered;
            }
            FlagTransition::None
        } else if !in_position {
            self.pending_ms += dt_ms;
            if self.pending_ms >= self.loss_ms {
                self.active = false;
                self.pending_ms = 0.0;
                return FlagTransition::Lost;
            }
            FlagTransition::None
        } else {
            self.pending_ms = 0.0;
            FlagTransition::None
        }
    }

    pub fn is_active(&self) -> bool {
        self.active
    }
}

/// Current-vs-best hold accounting with wholesale buffer replacement.
///
/// Samples accumulate into the current-hold buffer every frame. The moment
/// the current hold strictly exceeds the best hold recorded so far, the best
/// buffer is replaced by a copy of the current one, never merged, so the
/// finalized metrics always describe one coherent attempt.
#[derive(Clone, Debug)]
pub struct HoldBuffer<T: Clone> {
    current: Vec<T>,
    best: Vec<T>,
    current_ms: f64,
    best_ms: f64,
}

impl<T: Clone> HoldBuffer<T> {
    pub fn new() -> Self {
        Self {
            current: Vec::new(),
            best: Vec::new(),
            current_ms: 0.0,
            best_ms: 0.0,
        }
    }

    /// Add one in-hold frame's sample and elapsed time, promoting the
    /// current buffer if it now strictly exceeds the best.
    pub fn accumulate(&mut self, sample: T, dt_ms: f64) {
        self.current_ms += dt_ms;
        self.current.push(sample);
        if self.current_ms > self.best_ms {
            self.best_ms = self.current_ms;
            self.best = self.current.clone();
        }
    }

    /// End the current attempt: promote it if it was the best, then clear
    /// the current buffer for the next attempt.
    pub fn end_attempt(&mut self) {
        if self.current_ms > self.best_ms {
            self.best_ms = self.current_ms;
            self.best = self.current.clone();
        }
        self.current.clear();
        self.current_ms = 0.0;
    }

    pub fn best(&self) -> &[T] {
        &self.best
    }

    pub fn best_ms(&self) -> f64 {
        self.best_ms
    }
}

impl<T: Clone> Default for HoldBuffer<T> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counter_requires_consecutive_frames() {
        let mut c = ConsecutiveCounter::new(3);
        assert!(!c.observe(true));
        assert!(!c.observe(true));
        // A miss decrements; two more hits are not enough again
        assert!(!c.observe(false));
        assert!(!c.observe(true));
        assert!(!c.observe(true));
        assert!(c.observe(true));
    }

    #[test]
    fn test_counter_decrement_floors_at_zero() {
        let mut c = ConsecutiveCounter::new(2);
        assert!(!c.observe(false));
        assert!(!c.observe(true));
        assert!(c.observe(true));
    }

    #[test]
    fn test_flag_confirm_and_loss() {
        let mut f = DebouncedFlag::new(500.0, 600.0);
        assert_eq!(f.update(true, 300.0), FlagTransition::None);
        assert_eq!(f.update(true, 300.0), FlagTransition::Entered);
        assert!(f.is_active());
        // Brief loss shorter than loss_ms does not drop the hold
        assert_eq!(f.update(false, 300.0), FlagTransition::None);
        assert_eq!(f.update(true, 33.0), FlagTransition::None);
        assert!(f.is_active());
        assert_eq!(f.update(false, 300.0), FlagTransition::None);
        assert_eq!(f.update(false, 300.0), FlagTransition::Lost);
        assert!(!f.is_active());
    }

    #[test]
    fn test_hold_buffer_keeps_single_best_attempt() {
        let mut h: HoldBuffer<u32> = HoldBuffer::new();
        // First attempt: 3 samples, 600ms
        for i in 0..3 {
            h.accumulate(i, 200.0);
        }
        h.end_attempt();
        assert_eq!(h.best_ms(), 600.0);
        assert_eq!(h.best(), &[0, 1, 2]);

        // Shorter second attempt must not displace the best
        h.accumulate(10, 200.0);
        h.end_attempt();
        assert_eq!(h.best_ms(), 600.0);
        assert_eq!(h.best(), &[0, 1, 2]);

        // Longer third attempt replaces wholesale, never merges
        for i in 20..24 {
            h.accumulate(i, 200.0);
        }
        assert_eq!(h.best_ms(), 800.0);
        assert_eq!(h.best(), &[20, 21, 22, 23]);
    }
}

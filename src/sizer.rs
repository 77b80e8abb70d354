//! Adaptive batch sizing
//!
//! The sizing policy halves the batch size when the process already holds
//! more than half of its memory target, where the target is 75% of the memory
//! the system reports as available. The size never grows back within a run
//! and never drops below the configured floor.

use crate::memory::MemorySnapshot;

/// Fraction of available system memory the process may aim to use
pub const TARGET_MEMORY_FRACTION: f64 = 0.75;

/// Default floor for the adaptive policy
pub const DEFAULT_MIN_CHUNK_SIZE: usize = 1_000;

/// Default requested chunk size
pub const DEFAULT_CHUNK_SIZE: usize = 100_000;

/// When the sizing policy is evaluated during a run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SizingMode {
    /// Once, after the row count is known and before the first write
    #[default]
    Once,
    /// Before every batch read after the first one
    EveryBatch,
}

/// Pure sizing policy.
///
/// Returns `max(current / 2, minimum)` when
/// `process_mb > available_mb * 0.75 / 2`, otherwise `current`. The result is
/// never larger than `current`.
pub fn adjust(current: usize, minimum: usize, snapshot: &MemorySnapshot) -> usize {
    let target_memory = snapshot.available_mb * TARGET_MEMORY_FRACTION;
    if snapshot.process_mb > target_memory / 2.0 {
        (current / 2).max(minimum).min(current)
    } else {
        current
    }
}

/// Current chunk size plus the floor it may not cross
#[derive(Debug, Clone)]
pub struct BatchSizeState {
    current: usize,
    floor: usize,
    reductions: u32,
}

impl BatchSizeState {
    /// A requested size below `floor` is kept as-is and becomes the floor,
    /// so the policy can only ever shrink the size.
    pub fn new(requested: usize, floor: usize) -> Self {
        let requested = requested.max(1);
        Self {
            current: requested,
            floor: floor.max(1).min(requested),
            reductions: 0,
        }
    }

    pub fn current(&self) -> usize {
        self.current
    }

    pub fn floor(&self) -> usize {
        self.floor
    }

    /// Number of times the size was reduced
    pub fn reductions(&self) -> u32 {
        self.reductions
    }

    /// Apply the policy to a fresh snapshot; returns the new size if it shrank.
    pub fn apply(&mut self, snapshot: &MemorySnapshot) -> Option<usize> {
        let next = adjust(self.current, self.floor, snapshot);
        if next < self.current {
            self.current = next;
            self.reductions += 1;
            Some(next)
        } else {
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn calm() -> MemorySnapshot {
        MemorySnapshot::new(100.0, 16_000.0)
    }

    fn pressured() -> MemorySnapshot {
        // target = 750, half = 375
        MemorySnapshot::new(400.0, 1_000.0)
    }

    #[test]
    fn test_adjust_without_pressure_keeps_size() {
        assert_eq!(adjust(100_000, 1_000, &calm()), 100_000);
    }

    #[test]
    fn test_adjust_halves_under_pressure() {
        assert_eq!(adjust(100_000, 1_000, &pressured()), 50_000);
        assert_eq!(adjust(1_500, 1_000, &pressured()), 1_000);
        assert_eq!(adjust(1_000, 1_000, &pressured()), 1_000);
    }

    #[test]
    fn test_adjust_threshold_is_strict() {
        let at_threshold = MemorySnapshot::new(375.0, 1_000.0);
        assert_eq!(adjust(8_000, 1_000, &at_threshold), 8_000);
    }

    #[test]
    fn test_adjust_never_grows() {
        // Floor above the current size must not raise it.
        assert_eq!(adjust(2, 1_000, &pressured()), 2);
    }

    #[test]
    fn test_state_is_monotonic_and_floored() {
        let mut state = BatchSizeState::new(10_000, 1_000);
        let mut seen = vec![state.current()];
        for _ in 0..10 {
            state.apply(&pressured());
            seen.push(state.current());
        }
        assert!(seen.windows(2).all(|w| w[1] <= w[0]));
        assert_eq!(state.current(), 1_000);
        assert_eq!(state.reductions(), 4); // 5000, 2500, 1250, 1000

        assert_eq!(state.apply(&calm()), None);
        assert_eq!(state.current(), 1_000);
    }

    #[test]
    fn test_requested_below_floor_is_kept() {
        let mut state = BatchSizeState::new(2, DEFAULT_MIN_CHUNK_SIZE);
        assert_eq!(state.floor(), 2);
        assert_eq!(state.apply(&pressured()), None);
        assert_eq!(state.current(), 2);
    }

    #[test]
    fn test_zero_available_memory_counts_as_pressure() {
        let mut state = BatchSizeState::new(4_000, 1_000);
        assert_eq!(state.apply(&MemorySnapshot::new(1.0, 0.0)), Some(2_000));
    }
}

use std::time::Duration;

use crate::constants::{DEFAULT_INTENSITY, MIB};

/// How much memory a run reserves and how it is split into chunks.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TargetSize {
    pub total_bytes: u64,
    pub page_size: u64,
    pub chunk_bytes: u64,
    pub chunk_count: usize,
}

impl TargetSize {
    /// Length of the chunk at `index`. Only the last chunk may be shorter.
    pub fn chunk_len(&self, index: usize) -> u64 {
        let remainder = self.total_bytes % self.chunk_bytes;
        if index + 1 == self.chunk_count && remainder > 0 {
            remainder
        } else {
            self.chunk_bytes
        }
    }

    pub fn chunk_lengths(&self) -> impl Iterator<Item = u64> + '_ {
        (0..self.chunk_count).map(|index| self.chunk_len(index))
    }
}

/// The 1..=10 dial that drives every access-pattern parameter.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub struct Intensity(u8);

impl Intensity {
    pub const MIN: u8 = 1;
    pub const MAX: u8 = 10;

    pub fn new(level: u8) -> Option<Self> {
        (Self::MIN..=Self::MAX)
            .contains(&level)
            .then_some(Self(level))
    }

    pub fn level(&self) -> u8 {
        self.0
    }

    fn as_usize(&self) -> usize {
        self.0 as usize
    }

    pub fn steady_workers(&self) -> usize {
        self.as_usize().clamp(1, 8)
    }

    pub fn accesses_per_cycle(&self) -> usize {
        self.as_usize() * 50
    }

    pub fn chunks_per_cycle(&self, pool_len: usize) -> usize {
        (self.as_usize() * 3).min(pool_len)
    }

    /// Contiguous runs instead of scattered offsets.
    pub fn sequential_touch(&self) -> bool {
        self.0 >= 8
    }

    pub fn steady_interval(&self) -> Duration {
        Duration::from_secs_f64((0.5 - f64::from(self.0) * 0.04).max(0.05))
    }

    pub fn bulk_scan_enabled(&self) -> bool {
        self.0 >= 5
    }

    pub fn bulk_window_bytes(&self) -> usize {
        self.as_usize() * 10 * MIB
    }

    pub fn bulk_interval(&self) -> Duration {
        Duration::from_secs_f64((5.0 - f64::from(self.0) * 0.4).max(0.5))
    }

    pub fn walker_enabled(&self) -> bool {
        self.0 >= 8
    }

    pub fn total_workers(&self) -> usize {
        self.steady_workers()
            + usize::from(self.bulk_scan_enabled())
            + usize::from(self.walker_enabled())
    }
}

impl Default for Intensity {
    fn default() -> Self {
        Self(DEFAULT_INTENSITY)
    }
}

impl std::fmt::Display for Intensity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.0, Self::MAX)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub enum RunState {
    Allocating,
    Touching,
    Active,
    Cleanup,
    Terminated,
}

impl RunState {
    /// Forward-only transitions. Cleanup may be entered early from the
    /// allocation phases, Terminated only from Cleanup.
    pub fn can_advance_to(&self, next: RunState) -> bool {
        use RunState::*;
        matches!(
            (self, next),
            (Allocating, Touching)
                | (Touching, Active)
                | (Allocating | Touching | Active, Cleanup)
                | (Cleanup, Terminated)
        )
    }
}

impl Default for RunState {
    fn default() -> Self {
        RunState::Allocating
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_intensity_bounds() {
        assert!(Intensity::new(0).is_none());
        assert!(Intensity::new(11).is_none());
        assert_eq!(Intensity::new(7).map(|i| i.level()), Some(7));
        assert_eq!(Intensity::default().level(), 5);
    }

    #[test]
    fn test_worker_counts() {
        let low = Intensity::new(1).unwrap();
        assert_eq!(low.steady_workers(), 1);
        assert!(!low.bulk_scan_enabled());
        assert!(!low.walker_enabled());
        assert_eq!(low.total_workers(), 1);

        let mid = Intensity::new(5).unwrap();
        assert_eq!(mid.total_workers(), 6);

        let max = Intensity::new(10).unwrap();
        assert_eq!(max.steady_workers(), 8);
        assert_eq!(max.total_workers(), 10);
    }

    #[test]
    fn test_intervals() {
        let low = Intensity::new(1).unwrap();
        let max = Intensity::new(10).unwrap();

        assert!((low.steady_interval().as_secs_f64() - 0.46).abs() < 1e-6);
        assert!((max.steady_interval().as_secs_f64() - 0.1).abs() < 1e-6);
        assert!((Intensity::new(5).unwrap().bulk_interval().as_secs_f64() - 3.0).abs() < 1e-6);
        assert!((max.bulk_interval().as_secs_f64() - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_chunks_per_cycle_capped_by_pool() {
        let intensity = Intensity::new(4).unwrap();
        assert_eq!(intensity.chunks_per_cycle(100), 12);
        assert_eq!(intensity.chunks_per_cycle(5), 5);
        assert_eq!(intensity.chunks_per_cycle(0), 0);
    }

    #[test]
    fn test_run_state_is_forward_only() {
        use RunState::*;
        assert!(Allocating.can_advance_to(Touching));
        assert!(Touching.can_advance_to(Active));
        assert!(Active.can_advance_to(Cleanup));
        assert!(Allocating.can_advance_to(Cleanup));
        assert!(Cleanup.can_advance_to(Terminated));

        assert!(!Active.can_advance_to(Touching));
        assert!(!Allocating.can_advance_to(Terminated));
        assert!(!Terminated.can_advance_to(Cleanup));
        assert!(!Cleanup.can_advance_to(Cleanup));
    }
}

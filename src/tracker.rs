// Rotor sector tracker
// Turns Hall sector edges into a signed, multi-revolution angle estimate.
// Direction comes from the sign of the commanded duty, not from the Hall sequence:
// a 6-state sensor alone cannot tell a forward 5->0 wrap from a backward step.

use crate::config::SenseConfig;
use crate::hall::HallPattern;

/// Kind of sector change seen in one update
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum SectorEdge {
    /// Sector unchanged
    None,
    /// Sector changed inside a revolution
    Step,
    /// 5 -> 0..4 while driving forward, counter incremented
    WrapForward,
    /// 0 -> 1..5 while driving backward, counter decremented
    WrapBackward,
}

impl SectorEdge {
    /// `true` when the revolution counter moved
    #[inline(always)]
    pub fn is_wrap(self) -> bool {
        matches!(self, SectorEdge::WrapForward | SectorEdge::WrapBackward)
    }
}

/// Sign of the commanded duty as used by the angle formula (+1 for zero)
#[inline(always)]
pub fn direction_sign(duty: i32) -> i32 {
    if duty >= 0 {
        1
    } else {
        -1
    }
}

/// Hall sector state machine
pub struct RotorSectorTracker {
    /// Angle units per revolution of the sector counter
    sector_size: i32,
    /// Angle units per sector
    step_size: i32,
    /// Sector index from the current cycle
    sector_now: u8,
    /// Sector index from the previous cycle
    sector_last: u8,
    /// Revolution-relative sector counter
    sector_counter: i32,
    /// Last computed angle
    angle: i32,
}

impl RotorSectorTracker {
    pub fn new(config: &SenseConfig) -> Self {
        Self {
            sector_size: config.sector_size,
            step_size: config.step_size,
            sector_now: 0,
            sector_last: 0,
            sector_counter: 0,
            angle: 0,
        }
    }

    /// Load the current sector without treating it as an edge and compute the angle
    ///
    /// Called once on the first tracking cycle after calibration so that the power-on
    /// sector (index 0) is not mistaken for a wrap.
    pub fn seed(&mut self, pattern: HallPattern, duty: i32) {
        self.sector_now = pattern.sector_index();
        self.sector_last = self.sector_now;
        self.angle = self.compute_angle(duty);
        debug!(
            "Tracker seeded: sector={}, counter={}, angle={}",
            self.sector_now, self.sector_counter, self.angle
        );
    }

    /// Process one Hall reading
    ///
    /// # Arguments
    /// * `pattern` - Raw Hall pattern read this cycle
    /// * `duty` - Commanded duty; only its sign is used (direction)
    ///
    /// # Returns
    /// The kind of edge detected
    pub fn update(&mut self, pattern: HallPattern, duty: i32) -> SectorEdge {
        self.sector_last = self.sector_now;
        self.sector_now = pattern.sector_index();

        if self.sector_now == self.sector_last {
            return SectorEdge::None;
        }

        let mut edge = SectorEdge::Step;

        // Forward wrap 5 -> [0..4]
        if duty >= 0 && self.sector_last == 5 && self.sector_now < 5 {
            self.sector_counter = self.sector_counter.wrapping_add(1);
            edge = SectorEdge::WrapForward;
        }
        // Backward wrap 0 -> [1..5]
        if duty <= 0 && self.sector_last == 0 && self.sector_now > 0 {
            self.sector_counter = self.sector_counter.wrapping_sub(1);
            edge = SectorEdge::WrapBackward;
        }

        self.angle = self.compute_angle(duty);

        trace!(
            "Sector edge: {} -> {}, counter={}, angle={}",
            self.sector_last,
            self.sector_now,
            self.sector_counter,
            self.angle
        );

        edge
    }

    #[inline(always)]
    fn compute_angle(&self, duty: i32) -> i32 {
        self.sector_counter
            .wrapping_mul(self.sector_size)
            .wrapping_add(
                direction_sign(duty)
                    .wrapping_mul(self.sector_now as i32)
                    .wrapping_mul(self.step_size),
            )
    }

    pub fn sector_now(&self) -> u8 {
        self.sector_now
    }

    pub fn sector_last(&self) -> u8 {
        self.sector_last
    }

    pub fn sector_counter(&self) -> i32 {
        self.sector_counter
    }

    pub fn angle(&self) -> i32 {
        self.angle
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{DEFAULT_SECTOR_SIZE, DEFAULT_STEP_SIZE};

    /// Raw Hall pattern for each sector index (inverse of the lookup table)
    const SECTOR_TO_PATTERN: [u8; 6] = [1, 3, 2, 6, 4, 5];

    fn pattern(sector: u8) -> HallPattern {
        HallPattern::from_bits(SECTOR_TO_PATTERN[sector as usize])
    }

    fn tracker_at(sector: u8, duty: i32) -> RotorSectorTracker {
        let mut tracker = RotorSectorTracker::new(&SenseConfig::default());
        tracker.seed(pattern(sector), duty);
        tracker
    }

    fn expected_angle(tracker: &RotorSectorTracker, duty: i32) -> i32 {
        tracker.sector_counter() * DEFAULT_SECTOR_SIZE
            + direction_sign(duty) * tracker.sector_now() as i32 * DEFAULT_STEP_SIZE
    }

    #[test]
    fn test_no_edge_is_idempotent() {
        let mut tracker = tracker_at(3, 200);
        let (counter, angle) = (tracker.sector_counter(), tracker.angle());
        for _ in 0..10 {
            assert_eq!(tracker.update(pattern(3), 200), SectorEdge::None);
        }
        assert_eq!(tracker.sector_counter(), counter);
        assert_eq!(tracker.angle(), angle);
        assert_eq!(tracker.sector_last(), 3);
    }

    #[test]
    fn test_no_edge_ignores_duty_sign_change() {
        let mut tracker = tracker_at(2, 100);
        let angle = tracker.angle();
        tracker.update(pattern(2), -100);
        assert_eq!(tracker.angle(), angle);
    }

    #[test]
    fn test_forward_wrap_increments_counter() {
        for target in 0..5u8 {
            let mut tracker = tracker_at(5, 0);
            assert_eq!(tracker.update(pattern(target), 0), SectorEdge::WrapForward);
            assert_eq!(tracker.sector_counter(), 1);
        }
    }

    #[test]
    fn test_backward_wrap_decrements_counter() {
        for target in 1..6u8 {
            let mut tracker = tracker_at(0, -300);
            assert_eq!(tracker.update(pattern(target), -300), SectorEdge::WrapBackward);
            assert_eq!(tracker.sector_counter(), -1);
        }
    }

    #[test]
    fn test_zero_duty_wraps_both_ways() {
        // 0 counts as forward for 5->x and backward for 0->x
        let mut tracker = tracker_at(5, 0);
        tracker.update(pattern(0), 0);
        assert_eq!(tracker.sector_counter(), 1);
        tracker.update(pattern(1), 0);
        assert_eq!(tracker.sector_counter(), 0);
    }

    #[test]
    fn test_wrap_needs_matching_direction() {
        let mut tracker = tracker_at(5, -100);
        assert_eq!(tracker.update(pattern(0), -100), SectorEdge::Step);
        assert_eq!(tracker.sector_counter(), 0);

        let mut tracker = tracker_at(0, 100);
        assert_eq!(tracker.update(pattern(5), 100), SectorEdge::Step);
        assert_eq!(tracker.sector_counter(), 0);
    }

    #[test]
    fn test_non_wrap_edges_keep_counter() {
        let mut tracker = tracker_at(1, 100);
        assert_eq!(tracker.update(pattern(2), 100), SectorEdge::Step);
        assert_eq!(tracker.sector_counter(), 0);
        assert_eq!(tracker.angle(), 2 * DEFAULT_STEP_SIZE);
    }

    #[test]
    fn test_angle_identity_over_forward_rotation() {
        let mut tracker = tracker_at(0, 500);
        for turn in 0..3 {
            for sector in (1..6u8).chain(core::iter::once(0)) {
                let edge = tracker.update(pattern(sector), 500);
                assert_ne!(edge, SectorEdge::None);
                assert_eq!(tracker.angle(), expected_angle(&tracker, 500));
            }
            assert_eq!(tracker.sector_counter(), turn + 1);
        }
        assert_eq!(tracker.angle(), 3 * DEFAULT_SECTOR_SIZE);
    }

    #[test]
    fn test_angle_identity_over_backward_rotation() {
        let mut tracker = tracker_at(0, -500);
        for sector in [5u8, 4, 3, 2, 1, 0, 5] {
            tracker.update(pattern(sector), -500);
            assert_eq!(tracker.angle(), expected_angle(&tracker, -500));
        }
        assert_eq!(tracker.sector_counter(), -2);
    }

    #[test]
    fn test_forward_wrap_scenario() {
        let mut tracker = tracker_at(5, 500);
        let counter = tracker.sector_counter();
        assert_eq!(tracker.update(pattern(2), 500), SectorEdge::WrapForward);
        assert_eq!(tracker.sector_counter(), counter + 1);
        assert_eq!(
            tracker.angle(),
            (counter + 1) * DEFAULT_SECTOR_SIZE + 2 * DEFAULT_STEP_SIZE
        );
    }

    #[test]
    fn test_degenerate_all_high_pattern_keeps_legacy_index() {
        let mut tracker = tracker_at(4, 100);
        assert_eq!(tracker.update(HallPattern::from_bits(7), 100), SectorEdge::Step);
        assert_eq!(tracker.sector_now(), 6);
    }

    #[test]
    fn test_edge_kinds() {
        assert!(SectorEdge::WrapForward.is_wrap());
        assert!(SectorEdge::WrapBackward.is_wrap());
        assert!(!SectorEdge::Step.is_wrap());
        assert!(!SectorEdge::None.is_wrap());
    }

    #[test]
    fn test_unvalidated_large_scales_wrap_instead_of_overflowing() {
        let config = SenseConfig {
            sector_size: i32::MAX,
            step_size: i32::MAX / 2,
            ..SenseConfig::new()
        };
        let mut tracker = RotorSectorTracker::new(&config);
        tracker.seed(pattern(5), -1);
        assert_eq!(tracker.angle(), (-5i32).wrapping_mul(i32::MAX / 2));

        assert_eq!(tracker.update(pattern(4), -1), SectorEdge::Step);
        assert_eq!(tracker.angle(), (-4i32).wrapping_mul(i32::MAX / 2));

        let mut tracker = RotorSectorTracker::new(&config);
        tracker.seed(pattern(5), 1);
        assert_eq!(tracker.update(pattern(3), 1), SectorEdge::WrapForward);
        assert_eq!(
            tracker.angle(),
            i32::MAX.wrapping_add(3i32.wrapping_mul(i32::MAX / 2))
        );
    }
}

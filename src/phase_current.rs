// Phase current reconstruction for block (six-step) commutation
// Only two legs are measured; the third follows from Iu + Iv + Iw = 0.

/// Current of the phase of interest in the given sector
///
/// # Arguments
/// * `sector` - Sector index (0-5); anything else returns 0
/// * `u` - Measured U leg current
/// * `v` - Measured V leg current
#[inline(always)]
pub fn block_phase_current(sector: u8, u: i32, v: i32) -> i32 {
    match sector {
        0 => u - v,
        1 | 2 => u,
        3 | 4 => v,
        5 => -(u - v),
        _ => 0,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sector_formulas() {
        assert_eq!(block_phase_current(0, 100, 40), 60);
        assert_eq!(block_phase_current(5, 100, 40), -60);
        assert_eq!(block_phase_current(1, 100, 40), 100);
        assert_eq!(block_phase_current(2, 100, 40), 100);
        assert_eq!(block_phase_current(3, 100, 40), 40);
        assert_eq!(block_phase_current(4, 100, 40), 40);
    }

    #[test]
    fn test_invalid_sector_is_zero() {
        assert_eq!(block_phase_current(6, 100, 40), 0);
        assert_eq!(block_phase_current(255, -7, 9), 0);
    }

    #[test]
    fn test_negative_currents() {
        assert_eq!(block_phase_current(0, -30, 20), -50);
        assert_eq!(block_phase_current(5, -30, 20), 50);
    }
}

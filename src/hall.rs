// Hall sensor pattern decoding
// Maps the raw 3-bit pin pattern (H3 << 2 | H2 << 1 | H1) to a sector index

/// Hall pattern to sector index lookup table
/// Valid transition sequence: 1 -> 3 -> 2 -> 6 -> 4 -> 5 -> 1
/// Raw pattern:  [0, 1, 2, 3, 4, 5, 6, 7]
/// Sector index: [0, 0, 2, 1, 4, 5, 3, 6]
/// Patterns 0 (all low) and 7 (all high) cannot occur with a healthy sensor but are
/// kept at their legacy values so the tracker behaves exactly as on the bench.
pub const HALL_TO_SECTOR: [u8; 8] = [0, 0, 2, 1, 4, 5, 3, 6];

/// Raw 3-bit Hall sensor pattern
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct HallPattern(u8);

/// Decoded Hall reading
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum HallReading {
    /// Valid sector (0-5)
    Sector(u8),
    /// 0b000: every sensor low (open wiring or missing supply)
    AllLow,
    /// 0b111: every sensor high (shorted or floating pull-ups)
    AllHigh,
}

impl HallPattern {
    /// Build a pattern from raw bits; anything above bit 2 is discarded
    #[inline(always)]
    pub const fn from_bits(bits: u8) -> Self {
        Self(bits & 0b111)
    }

    /// Build a pattern from the three sensor levels
    #[inline(always)]
    pub const fn from_pins(h1: bool, h2: bool, h3: bool) -> Self {
        Self(((h3 as u8) << 2) | ((h2 as u8) << 1) | (h1 as u8))
    }

    #[inline(always)]
    pub const fn bits(self) -> u8 {
        self.0
    }

    /// Sector index from the legacy table (0-6)
    #[inline(always)]
    pub const fn sector_index(self) -> u8 {
        HALL_TO_SECTOR[self.0 as usize]
    }

    /// Decode with explicit variants for the two degenerate patterns
    pub const fn decode(self) -> HallReading {
        match self.0 {
            0b000 => HallReading::AllLow,
            0b111 => HallReading::AllHigh,
            bits => HallReading::Sector(HALL_TO_SECTOR[bits as usize]),
        }
    }

    /// `true` for patterns 1-6
    #[inline(always)]
    pub const fn is_valid(self) -> bool {
        matches!(self.decode(), HallReading::Sector(_))
    }
}

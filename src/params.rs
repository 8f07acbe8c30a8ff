use std::fmt;

/// Forward error correction rate of the LoRa PHY.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CodingRate {
    Cr4_5,
    Cr4_6,
    Cr4_7,
    Cr4_8,
}

impl CodingRate {
    pub fn wire(self) -> u8 {
        match self {
            CodingRate::Cr4_5 => 0,
            CodingRate::Cr4_6 => 1,
            CodingRate::Cr4_7 => 2,
            CodingRate::Cr4_8 => 3,
        }
    }

    pub fn from_wire(code: u8) -> Option<Self> {
        match code {
            0 => Some(CodingRate::Cr4_5),
            1 => Some(CodingRate::Cr4_6),
            2 => Some(CodingRate::Cr4_7),
            3 => Some(CodingRate::Cr4_8),
            _ => None,
        }
    }

    /// Denominator of the 4/x rate, used by the air-time model.
    pub fn denominator(self) -> u32 {
        match self {
            CodingRate::Cr4_5 => 5,
            CodingRate::Cr4_6 => 6,
            CodingRate::Cr4_7 => 7,
            CodingRate::Cr4_8 => 8,
        }
    }
}

impl fmt::Display for CodingRate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "4/{}", self.denominator())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SpreadingFactor {
    Sf7,
    Sf8,
    Sf9,
    Sf10,
    Sf11,
    Sf12,
}

impl SpreadingFactor {
    /// EU868 data-rate code carried on the wire (SF12 = 0 up to SF7 = 5).
    pub fn wire(self) -> u8 {
        match self {
            SpreadingFactor::Sf7 => 5,
            SpreadingFactor::Sf8 => 4,
            SpreadingFactor::Sf9 => 3,
            SpreadingFactor::Sf10 => 2,
            SpreadingFactor::Sf11 => 1,
            SpreadingFactor::Sf12 => 0,
        }
    }

    pub fn from_wire(code: u8) -> Option<Self> {
        match code {
            5 => Some(SpreadingFactor::Sf7),
            4 => Some(SpreadingFactor::Sf8),
            3 => Some(SpreadingFactor::Sf9),
            2 => Some(SpreadingFactor::Sf10),
            1 => Some(SpreadingFactor::Sf11),
            0 => Some(SpreadingFactor::Sf12),
            _ => None,
        }
    }

    /// Chips per symbol exponent (7 for SF7 through 12 for SF12).
    pub fn factor(self) -> u32 {
        match self {
            SpreadingFactor::Sf7 => 7,
            SpreadingFactor::Sf8 => 8,
            SpreadingFactor::Sf9 => 9,
            SpreadingFactor::Sf10 => 10,
            SpreadingFactor::Sf11 => 11,
            SpreadingFactor::Sf12 => 12,
        }
    }
}

impl fmt::Display for SpreadingFactor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SF{}", self.factor())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Bandwidth {
    Bw125,
    Bw250,
    Bw500,
}

impl Bandwidth {
    pub fn wire(self) -> u8 {
        match self {
            Bandwidth::Bw125 => 0,
            Bandwidth::Bw250 => 1,
            Bandwidth::Bw500 => 2,
        }
    }

    pub fn from_wire(code: u8) -> Option<Self> {
        match code {
            0 => Some(Bandwidth::Bw125),
            1 => Some(Bandwidth::Bw250),
            2 => Some(Bandwidth::Bw500),
            _ => None,
        }
    }

    pub fn khz(self) -> u32 {
        match self {
            Bandwidth::Bw125 => 125,
            Bandwidth::Bw250 => 250,
            Bandwidth::Bw500 => 500,
        }
    }
}

impl fmt::Display for Bandwidth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}kHz", self.khz())
    }
}

/// Complete transmit configuration for one sweep setting.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TxParameters {
    pub coding_rate: CodingRate,
    pub spreading_factor: SpreadingFactor,
    pub bandwidth: Bandwidth,
    pub power_dbm: i8,
    pub packet_size: u8,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_data_rate_codes_are_reversed() {
        assert_eq!(SpreadingFactor::Sf7.wire(), 5);
        assert_eq!(SpreadingFactor::Sf12.wire(), 0);
        assert_eq!(SpreadingFactor::from_wire(5), Some(SpreadingFactor::Sf7));
        assert_eq!(SpreadingFactor::from_wire(0), Some(SpreadingFactor::Sf12));
    }

    #[test]
    fn test_wire_codes_round_trip() {
        for cr in [
            CodingRate::Cr4_5,
            CodingRate::Cr4_6,
            CodingRate::Cr4_7,
            CodingRate::Cr4_8,
        ] {
            assert_eq!(CodingRate::from_wire(cr.wire()), Some(cr));
        }
        for bw in [Bandwidth::Bw125, Bandwidth::Bw250, Bandwidth::Bw500] {
            assert_eq!(Bandwidth::from_wire(bw.wire()), Some(bw));
        }
    }

    #[test]
    fn test_unknown_codes_rejected() {
        assert_eq!(CodingRate::from_wire(4), None);
        assert_eq!(SpreadingFactor::from_wire(6), None);
        assert_eq!(Bandwidth::from_wire(3), None);
    }
}

use std::fmt;
use std::str::FromStr;

use crate::params::{Bandwidth, CodingRate, SpreadingFactor, TxParameters};

pub const POWER_STEPS_DBM: [i8; 6] = [2, 5, 8, 11, 14, 17];
pub const BANDWIDTH_STEPS: [Bandwidth; 3] = [Bandwidth::Bw125, Bandwidth::Bw250, Bandwidth::Bw500];
pub const SPREADING_FACTOR_STEPS: [SpreadingFactor; 6] = [
    SpreadingFactor::Sf7,
    SpreadingFactor::Sf8,
    SpreadingFactor::Sf9,
    SpreadingFactor::Sf10,
    SpreadingFactor::Sf11,
    SpreadingFactor::Sf12,
];
pub const CODING_RATE_STEPS: [CodingRate; 4] = [
    CodingRate::Cr4_5,
    CodingRate::Cr4_6,
    CodingRate::Cr4_7,
    CodingRate::Cr4_8,
];
pub const PACKET_SIZE_STEPS: [u8; 6] = [4, 12, 20, 28, 36, 44];

pub const DEFAULT_MESSAGES_PER_SETTING: u8 = 5;

/// Transmit configuration for every dimension not under test.
pub const BASELINE: TxParameters = TxParameters {
    coding_rate: CodingRate::Cr4_5,
    spreading_factor: SpreadingFactor::Sf7,
    bandwidth: Bandwidth::Bw125,
    power_dbm: 14,
    packet_size: 8,
};

/// The PHY parameter a run sweeps while all others stay at the baseline.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SweepDimension {
    Power,
    Bandwidth,
    SpreadingFactor,
    CodingRate,
    PacketSize,
}

impl SweepDimension {
    /// testType code carried in end-of-setting frames and the CSV.
    pub fn test_type(self) -> u8 {
        match self {
            SweepDimension::Power => 0,
            SweepDimension::Bandwidth => 1,
            SweepDimension::SpreadingFactor => 2,
            SweepDimension::CodingRate => 3,
            SweepDimension::PacketSize => 4,
        }
    }
}

impl fmt::Display for SweepDimension {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let token = match self {
            SweepDimension::Power => "power",
            SweepDimension::Bandwidth => "bandwidth",
            SweepDimension::SpreadingFactor => "sf",
            SweepDimension::CodingRate => "cr",
            SweepDimension::PacketSize => "size",
        };
        write!(f, "{}", token)
    }
}

impl FromStr for SweepDimension {
    type Err = String;

    fn from_str(token: &str) -> Result<Self, Self::Err> {
        match token {
            "power" => Ok(SweepDimension::Power),
            "bandwidth" => Ok(SweepDimension::Bandwidth),
            "sf" | "spreading_factor" => Ok(SweepDimension::SpreadingFactor),
            "cr" | "coding_rate" => Ok(SweepDimension::CodingRate),
            "size" | "packet_size" => Ok(SweepDimension::PacketSize),
            _ => Err(format!("unknown sweep dimension `{}`", token)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SettingValue {
    PowerDbm(i8),
    Bandwidth(Bandwidth),
    SpreadingFactor(SpreadingFactor),
    CodingRate(CodingRate),
    PacketSize(u8),
}

impl fmt::Display for SettingValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SettingValue::PowerDbm(power) => write!(f, "{}dBm", power),
            SettingValue::Bandwidth(bw) => bw.fmt(f),
            SettingValue::SpreadingFactor(sf) => sf.fmt(f),
            SettingValue::CodingRate(cr) => cr.fmt(f),
            SettingValue::PacketSize(size) => write!(f, "{}B", size),
        }
    }
}

/// Ordered, read-only table of settings for one sweep dimension.
#[derive(Debug, Clone)]
pub struct SweepPlan {
    dimension: SweepDimension,
    messages_per_setting: u8,
    baseline: TxParameters,
}

impl SweepPlan {
    pub fn new(dimension: SweepDimension, messages_per_setting: u8) -> Self {
        Self {
            dimension,
            messages_per_setting,
            baseline: BASELINE,
        }
    }

    pub fn dimension(&self) -> SweepDimension {
        self.dimension
    }

    pub fn messages_per_setting(&self) -> u8 {
        self.messages_per_setting
    }

    pub fn setting_count(&self) -> usize {
        match self.dimension {
            SweepDimension::Power => POWER_STEPS_DBM.len(),
            SweepDimension::Bandwidth => BANDWIDTH_STEPS.len(),
            SweepDimension::SpreadingFactor => SPREADING_FACTOR_STEPS.len(),
            SweepDimension::CodingRate => CODING_RATE_STEPS.len(),
            SweepDimension::PacketSize => PACKET_SIZE_STEPS.len(),
        }
    }

    /// `None` once `ordinal` runs past the dimension's value list.
    pub fn value_at(&self, ordinal: usize) -> Option<SettingValue> {
        match self.dimension {
            SweepDimension::Power => POWER_STEPS_DBM
                .get(ordinal)
                .copied()
                .map(SettingValue::PowerDbm),
            SweepDimension::Bandwidth => BANDWIDTH_STEPS
                .get(ordinal)
                .copied()
                .map(SettingValue::Bandwidth),
            SweepDimension::SpreadingFactor => SPREADING_FACTOR_STEPS
                .get(ordinal)
                .copied()
                .map(SettingValue::SpreadingFactor),
            SweepDimension::CodingRate => CODING_RATE_STEPS
                .get(ordinal)
                .copied()
                .map(SettingValue::CodingRate),
            SweepDimension::PacketSize => PACKET_SIZE_STEPS
                .get(ordinal)
                .copied()
                .map(SettingValue::PacketSize),
        }
    }

    /// Baseline with the swept value substituted in.
    pub fn parameters_at(&self, ordinal: usize) -> Option<TxParameters> {
        let mut parameters = self.baseline;
        match self.value_at(ordinal)? {
            SettingValue::PowerDbm(power) => parameters.power_dbm = power,
            SettingValue::Bandwidth(bw) => parameters.bandwidth = bw,
            SettingValue::SpreadingFactor(sf) => parameters.spreading_factor = sf,
            SettingValue::CodingRate(cr) => parameters.coding_rate = cr,
            SettingValue::PacketSize(size) => parameters.packet_size = size,
        }
        Some(parameters)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_value_tables_match_the_device() {
        assert_eq!(POWER_STEPS_DBM, [2, 5, 8, 11, 14, 17]);
        assert_eq!(PACKET_SIZE_STEPS, [4, 12, 20, 28, 36, 44]);
        assert_eq!(SPREADING_FACTOR_STEPS.len(), 6);
        assert_eq!(CODING_RATE_STEPS.len(), 4);
        assert_eq!(BANDWIDTH_STEPS.len(), 3);
    }

    #[test]
    fn test_value_list_exhaustion() {
        let plan = SweepPlan::new(SweepDimension::Bandwidth, DEFAULT_MESSAGES_PER_SETTING);

        assert_eq!(plan.value_at(0), Some(SettingValue::Bandwidth(Bandwidth::Bw125)));
        assert_eq!(plan.value_at(2), Some(SettingValue::Bandwidth(Bandwidth::Bw500)));
        assert_eq!(plan.value_at(3), None);
        assert_eq!(plan.parameters_at(3), None);
    }

    #[test]
    fn test_parameters_substitute_only_the_swept_value() {
        let plan = SweepPlan::new(SweepDimension::PacketSize, 5);
        let parameters = plan.parameters_at(2).unwrap();

        assert_eq!(parameters.packet_size, 20);
        assert_eq!(parameters.power_dbm, BASELINE.power_dbm);
        assert_eq!(parameters.spreading_factor, BASELINE.spreading_factor);

        let plan = SweepPlan::new(SweepDimension::Power, 5);
        let parameters = plan.parameters_at(0).unwrap();

        assert_eq!(parameters.power_dbm, 2);
        assert_eq!(parameters.packet_size, BASELINE.packet_size);
    }

    #[test]
    fn test_test_type_codes() {
        assert_eq!(SweepDimension::Power.test_type(), 0);
        assert_eq!(SweepDimension::Bandwidth.test_type(), 1);
        assert_eq!(SweepDimension::SpreadingFactor.test_type(), 2);
        assert_eq!(SweepDimension::CodingRate.test_type(), 3);
        assert_eq!(SweepDimension::PacketSize.test_type(), 4);
    }

    #[test]
    fn test_dimension_tokens() {
        for dimension in [
            SweepDimension::Power,
            SweepDimension::Bandwidth,
            SweepDimension::SpreadingFactor,
            SweepDimension::CodingRate,
            SweepDimension::PacketSize,
        ] {
            assert_eq!(dimension.to_string().parse::<SweepDimension>(), Ok(dimension));
        }

        assert_eq!(
            "spreading_factor".parse::<SweepDimension>(),
            Ok(SweepDimension::SpreadingFactor)
        );
        assert!("snr".parse::<SweepDimension>().is_err());
    }
}

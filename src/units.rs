//! Energy and gas volume unit conversion.
//!
//! Energy units are a base (watt-hour, joule, calorie) with an optional SI
//! prefix (k, M, G, T). Volume units are cubic metres, cubic feet, litres,
//! CCF and MCF. Energy and volume meet through the gas calorific value.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Volumetric correction factor for gas measured at standard conditions
pub const VOLUME_CORRECTION_FACTOR: f64 = 1.02264;

/// Calorific value (MJ/m³) used when the configuration does not set one
pub const DEFAULT_CALORIFIC_VALUE: f64 = 39.0;

const MJ_PER_KWH: f64 = 3.6;
const JOULES_PER_WH: f64 = 3600.0;
const JOULES_PER_CALORIE: f64 = 4.184;
const CUBIC_METRES_PER_CUBIC_FOOT: f64 = 0.028_316_846_592;

const SI_PREFIXES: [&str; 5] = ["", "k", "M", "G", "T"];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EnergyBase {
    WattHour,
    Joule,
    Calorie,
}

impl EnergyBase {
    fn symbol(&self) -> &'static str {
        match self {
            EnergyBase::WattHour => "Wh",
            EnergyBase::Joule => "J",
            EnergyBase::Calorie => "cal",
        }
    }

    fn watt_hours(&self) -> f64 {
        match self {
            EnergyBase::WattHour => 1.0,
            EnergyBase::Joule => 1.0 / JOULES_PER_WH,
            EnergyBase::Calorie => JOULES_PER_CALORIE / JOULES_PER_WH,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum VolumeUnit {
    CubicMetre,
    CubicFoot,
    Litre,
    /// Hundred cubic feet
    Ccf,
    /// Thousand cubic feet
    Mcf,
}

impl VolumeUnit {
    fn cubic_metres(&self) -> f64 {
        match self {
            VolumeUnit::CubicMetre => 1.0,
            VolumeUnit::CubicFoot => CUBIC_METRES_PER_CUBIC_FOOT,
            VolumeUnit::Litre => 0.001,
            VolumeUnit::Ccf => CUBIC_METRES_PER_CUBIC_FOOT * 100.0,
            VolumeUnit::Mcf => CUBIC_METRES_PER_CUBIC_FOOT * 1000.0,
        }
    }
}

/// A recognised unit of measurement
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Unit {
    /// Energy base scaled by `1000^exponent`
    Energy { base: EnergyBase, exponent: i32 },
    Volume(VolumeUnit),
}

impl Unit {
    pub fn is_energy(&self) -> bool {
        matches!(self, Unit::Energy { .. })
    }

    /// Same energy base with a different SI prefix; volumes are returned unchanged
    pub fn with_exponent(self, exponent: i32) -> Self {
        match self {
            Unit::Energy { base, .. } => Unit::Energy {
                base,
                exponent: exponent.clamp(0, SI_PREFIXES.len() as i32 - 1),
            },
            volume => volume,
        }
    }

    /// Value of one of this unit in watt-hours (energy) or cubic metres (volume)
    fn base_quantity(&self) -> f64 {
        match self {
            Unit::Energy { base, exponent } => base.watt_hours() * 1000f64.powi(*exponent),
            Unit::Volume(v) => v.cubic_metres(),
        }
    }
}

impl FromStr for Unit {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        let volume = match s {
            "m³" | "m3" => Some(VolumeUnit::CubicMetre),
            "ft³" | "ft3" => Some(VolumeUnit::CubicFoot),
            "L" | "l" => Some(VolumeUnit::Litre),
            "CCF" | "ccf" => Some(VolumeUnit::Ccf),
            "MCF" | "mcf" => Some(VolumeUnit::Mcf),
            _ => None,
        };
        if let Some(v) = volume {
            return Ok(Unit::Volume(v));
        }

        let (prefix, base) = if let Some(p) = s.strip_suffix("Wh") {
            (p, EnergyBase::WattHour)
        } else if let Some(p) = s.strip_suffix("cal") {
            (p, EnergyBase::Calorie)
        } else if let Some(p) = s.strip_suffix('J') {
            (p, EnergyBase::Joule)
        } else {
            return Err(format!("Unknown unit: {}", s));
        };

        SI_PREFIXES
            .iter()
            .position(|candidate| *candidate == prefix)
            .map(|exponent| Unit::Energy {
                base,
                exponent: exponent as i32,
            })
            .ok_or_else(|| format!("Unknown unit prefix in: {}", s))
    }
}

impl fmt::Display for Unit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Unit::Energy { base, exponent } => write!(
                f,
                "{}{}",
                SI_PREFIXES[(*exponent).clamp(0, SI_PREFIXES.len() as i32 - 1) as usize],
                base.symbol()
            ),
            Unit::Volume(VolumeUnit::CubicMetre) => write!(f, "m³"),
            Unit::Volume(VolumeUnit::CubicFoot) => write!(f, "ft³"),
            Unit::Volume(VolumeUnit::Litre) => write!(f, "L"),
            Unit::Volume(VolumeUnit::Ccf) => write!(f, "CCF"),
            Unit::Volume(VolumeUnit::Mcf) => write!(f, "MCF"),
        }
    }
}

/// Watt-hours of energy in one cubic metre of gas
fn watt_hours_per_cubic_metre(calorific_value: f64) -> f64 {
    calorific_value * VOLUME_CORRECTION_FACTOR / MJ_PER_KWH * 1000.0
}

/// Convert between two parsed units.
///
/// Energy to volume (and back) goes through the calorific value; a
/// non-positive calorific value leaves the value unconverted.
pub fn convert_units(value: f64, from: Unit, to: Unit, calorific_value: f64) -> f64 {
    if from == to {
        return value;
    }

    let base = value * from.base_quantity();
    let base = match (from.is_energy(), to.is_energy()) {
        (true, true) | (false, false) => base,
        _ if calorific_value <= 0.0 || !calorific_value.is_finite() => return value,
        // watt-hours -> cubic metres
        (true, false) => base / watt_hours_per_cubic_metre(calorific_value),
        // cubic metres -> watt-hours
        (false, true) => base * watt_hours_per_cubic_metre(calorific_value),
    };
    base / to.base_quantity()
}

/// Convert `value` from `from_unit` to `to_unit`.
///
/// Unrecognised or empty units return the input unchanged.
pub fn convert(value: f64, from_unit: &str, to_unit: &str, calorific_value: f64) -> f64 {
    match (from_unit.parse::<Unit>(), to_unit.parse::<Unit>()) {
        (Ok(from), Ok(to)) => convert_units(value, from, to, calorific_value),
        _ => value,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use rstest::rstest;

    const ALL_UNITS: [&str; 17] = [
        "Wh", "kWh", "MWh", "GWh", "TWh", "J", "kJ", "MJ", "GJ", "cal", "kcal", "Mcal", "m³",
        "ft³", "L", "CCF", "MCF",
    ];

    fn approx(a: f64, b: f64) -> bool {
        (a - b).abs() <= 1e-9 * a.abs().max(b.abs()).max(1.0)
    }

    #[rstest]
    #[case("kWh", Unit::Energy { base: EnergyBase::WattHour, exponent: 1 })]
    #[case("MJ", Unit::Energy { base: EnergyBase::Joule, exponent: 2 })]
    #[case("kcal", Unit::Energy { base: EnergyBase::Calorie, exponent: 1 })]
    #[case("m3", Unit::Volume(VolumeUnit::CubicMetre))]
    #[case("MCF", Unit::Volume(VolumeUnit::Mcf))]
    fn test_parse_units(#[case] input: &str, #[case] expected: Unit) {
        assert_eq!(input.parse::<Unit>().unwrap(), expected);
    }

    #[test]
    fn test_parse_rejects_unknown() {
        assert!("W".parse::<Unit>().is_err());
        assert!("xWh".parse::<Unit>().is_err());
        assert!("".parse::<Unit>().is_err());
    }

    #[rstest]
    #[case(1.0, "kWh", "Wh", 1000.0)]
    #[case(2.5, "MWh", "kWh", 2500.0)]
    #[case(1.0, "kWh", "MJ", 3.6)]
    #[case(1.0, "kcal", "J", 4184.0)]
    #[case(1.0, "MCF", "CCF", 10.0)]
    #[case(1.0, "m³", "L", 1000.0)]
    fn test_convert_known_pairs(
        #[case] value: f64,
        #[case] from: &str,
        #[case] to: &str,
        #[case] expected: f64,
    ) {
        assert!(approx(convert(value, from, to, DEFAULT_CALORIFIC_VALUE), expected));
    }

    #[test]
    fn test_gas_volume_to_energy() {
        // 1 m³ at 39 MJ/m³ -> 39 * 1.02264 / 3.6 kWh
        let kwh = convert(1.0, "m³", "kWh", 39.0);
        assert!(approx(kwh, 39.0 * 1.02264 / 3.6));

        let back = convert(kwh, "kWh", "m³", 39.0);
        assert!(approx(back, 1.0));
    }

    #[test]
    fn test_cubic_feet_to_energy_uses_calorific_value() {
        let low = convert(100.0, "ft³", "kWh", 35.0);
        let high = convert(100.0, "ft³", "kWh", 40.0);
        assert!(high > low);
    }

    #[test]
    fn test_unrecognised_unit_is_noop() {
        assert_eq!(convert(12.5, "W", "kWh", 39.0), 12.5);
        assert_eq!(convert(12.5, "kWh", "", 39.0), 12.5);
        assert_eq!(convert(12.5, "bananas", "apples", 39.0), 12.5);
    }

    #[test]
    fn test_zero_calorific_value_leaves_value() {
        assert_eq!(convert(3.0, "m³", "kWh", 0.0), 3.0);
    }

    #[test]
    fn test_display_round_trips_parse() {
        for unit in ALL_UNITS {
            let parsed: Unit = unit.parse().unwrap();
            assert_eq!(parsed.to_string().parse::<Unit>().unwrap(), parsed);
        }
    }

    proptest! {
        #[test]
        fn prop_round_trip_every_pair(
            value in 0.0f64..1.0e6,
            from in 0usize..ALL_UNITS.len(),
            to in 0usize..ALL_UNITS.len(),
            gcv in 30.0f64..45.0,
        ) {
            let there = convert(value, ALL_UNITS[from], ALL_UNITS[to], gcv);
            let back = convert(there, ALL_UNITS[to], ALL_UNITS[from], gcv);
            prop_assert!((back - value).abs() <= 1e-6 * value.max(1.0));
        }
    }
}

//! Values the rendering layer needs beyond raw numbers: SI-prefixed labels
//! and animation periods for flow lines.

use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

use crate::config::DisplayConfig;
use crate::domain::AggregateState;
use crate::units::{convert_units, Unit};

/// How flow magnitudes map to animation speed
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, Display, EnumString)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum ScaleMode {
    #[default]
    Linear,
    Logarithmic,
}

/// SI exponent that keeps `value` (expressed in `unit`) below 1000
pub fn prefix_exponent(value: f64, unit: Unit) -> i32 {
    let Unit::Energy { exponent, .. } = unit else {
        return 0;
    };
    if value == 0.0 || !value.is_finite() {
        return exponent;
    }
    let shift = (value.abs().log10() / 3.0).floor() as i32;
    (exponent + shift).clamp(0, 4)
}

/// Shared exponent for every value on the card, taken from the largest one.
/// `None` for units that carry no SI prefix.
pub fn unified_exponent(largest: f64, unit: &str) -> Option<i32> {
    let unit: Unit = unit.parse().ok()?;
    unit.is_energy().then(|| prefix_exponent(largest, unit))
}

/// Label a value, re-prefixing energy units.
///
/// With `unified` set every value shares that exponent; otherwise each value
/// picks its own. Unrecognised units are printed as given.
pub fn format_value(value: f64, unit: &str, unified: Option<i32>, decimals: usize) -> String {
    let Ok(parsed) = unit.parse::<Unit>() else {
        return format!("{:.*} {}", decimals, value, unit);
    };
    if !parsed.is_energy() {
        return format!("{:.*} {}", decimals, value, parsed);
    }
    let target = parsed.with_exponent(unified.unwrap_or_else(|| prefix_exponent(value, parsed)));
    let converted = convert_units(value, parsed, target, 0.0);
    format!("{:.*} {}", decimals, converted, target)
}

/// Animation period in seconds for a flow line; larger flows animate faster.
/// `None` when there is nothing to animate.
pub fn flow_duration(value: f64, largest: f64, min_seconds: f64, max_seconds: f64, mode: ScaleMode) -> Option<f64> {
    if !(value > 0.0) || !(largest > 0.0) {
        return None;
    }
    let ratio = match mode {
        ScaleMode::Linear => value / largest,
        ScaleMode::Logarithmic => value.ln_1p() / largest.ln_1p(),
    };
    let ratio = if ratio.is_finite() { ratio.clamp(0.0, 1.0) } else { 0.0 };
    Some(max_seconds - ratio * (max_seconds - min_seconds))
}

/// Animation periods for every flow of a snapshot
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct FlowDurations {
    pub solar_to_home: Option<f64>,
    pub solar_to_grid: Option<f64>,
    pub solar_to_battery: Option<f64>,
    pub grid_to_home: Option<f64>,
    pub grid_to_battery: Option<f64>,
    pub battery_to_home: Option<f64>,
    pub battery_to_grid: Option<f64>,
}

impl FlowDurations {
    pub fn for_state(state: &AggregateState, min_seconds: f64, max_seconds: f64, mode: ScaleMode) -> Self {
        let largest = state.largest_electric_value;
        let d = |v: f64| flow_duration(v, largest, min_seconds, max_seconds, mode);
        let f = &state.flows;
        Self {
            solar_to_home: d(f.solar_to_home),
            solar_to_grid: d(f.solar_to_grid),
            solar_to_battery: d(f.solar_to_battery),
            grid_to_home: d(f.grid_to_home),
            grid_to_battery: d(f.grid_to_battery),
            battery_to_home: d(f.battery_to_home),
            battery_to_grid: d(f.battery_to_grid),
        }
    }
}

/// Labelled card values for one snapshot
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CardView {
    pub solar: String,
    pub grid_import: String,
    pub grid_export: String,
    pub battery_discharge: String,
    pub battery_charge: String,
    pub home: String,
    pub gas: String,
    pub low_carbon_percentage: f64,
    pub self_sufficiency: f64,
    pub power_outage: bool,
    pub durations: FlowDurations,
}

impl CardView {
    pub fn new(state: &AggregateState, display: &DisplayConfig) -> Self {
        let electric = display.electric_unit.as_str();
        let unified = display
            .unified_prefix
            .then(|| unified_exponent(state.largest_electric_value, electric))
            .flatten();
        let label = |v: f64| format_value(v, electric, unified, display.decimals);
        let totals = &state.totals;
        Self {
            solar: label(totals.solar_import),
            grid_import: label(totals.grid_import),
            grid_export: label(totals.grid_export),
            battery_discharge: label(totals.battery_import),
            battery_charge: label(totals.battery_export),
            home: label(state.home_electric),
            gas: format_value(state.home_gas, &display.gas_unit, None, display.decimals),
            low_carbon_percentage: state.low_carbon_percentage,
            self_sufficiency: state.self_sufficiency_ratio(),
            power_outage: state.power_outage,
            durations: FlowDurations::for_state(
                state,
                display.min_flow_seconds,
                display.max_flow_seconds,
                display.scale_mode,
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::Period;
    use chrono::{TimeZone, Utc};
    use rstest::rstest;

    #[rstest]
    #[case(1500.0, "kWh", None, 2, "1.50 MWh")]
    #[case(0.25, "kWh", None, 0, "250 Wh")]
    #[case(12.0, "kWh", Some(1), 1, "12.0 kWh")]
    #[case(12.0, "kWh", Some(2), 3, "0.012 MWh")]
    #[case(3.5, "m³", None, 1, "3.5 m³")]
    #[case(7.0, "widgets", None, 0, "7 widgets")]
    fn test_format_value(
        #[case] value: f64,
        #[case] unit: &str,
        #[case] unified: Option<i32>,
        #[case] decimals: usize,
        #[case] expected: &str,
    ) {
        assert_eq!(format_value(value, unit, unified, decimals), expected);
    }

    #[test]
    fn test_unified_exponent() {
        assert_eq!(unified_exponent(2500.0, "kWh"), Some(2));
        assert_eq!(unified_exponent(0.0, "kWh"), Some(1));
        assert_eq!(unified_exponent(10.0, "m³"), None);
        assert_eq!(unified_exponent(10.0, "nope"), None);
    }

    #[test]
    fn test_flow_duration_linear() {
        assert_eq!(flow_duration(10.0, 10.0, 1.0, 6.0, ScaleMode::Linear), Some(1.0));
        assert_eq!(flow_duration(5.0, 10.0, 1.0, 6.0, ScaleMode::Linear), Some(3.5));
        assert_eq!(flow_duration(0.0, 10.0, 1.0, 6.0, ScaleMode::Linear), None);
        assert_eq!(flow_duration(5.0, 0.0, 1.0, 6.0, ScaleMode::Linear), None);
    }

    #[test]
    fn test_logarithmic_speeds_up_small_flows() {
        let linear = flow_duration(1.0, 100.0, 1.0, 6.0, ScaleMode::Linear).unwrap();
        let log = flow_duration(1.0, 100.0, 1.0, 6.0, ScaleMode::Logarithmic).unwrap();
        assert!(log < linear);
    }

    #[test]
    fn test_flow_durations_for_state() {
        let start = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let mut state = AggregateState::empty(Period::new(start, start + chrono::Duration::days(1)));
        state.flows.solar_to_home = 4.0;
        state.largest_electric_value = 4.0;
        let durations = FlowDurations::for_state(&state, 1.0, 6.0, ScaleMode::Linear);
        assert_eq!(durations.solar_to_home, Some(1.0));
        assert_eq!(durations.grid_to_home, None);
    }

    #[test]
    fn test_card_view_shares_prefix() {
        let start = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let mut state = AggregateState::empty(Period::new(start, start + chrono::Duration::days(30)));
        state.totals.solar_import = 1200.0;
        state.totals.grid_import = 300.0;
        state.home_electric = 1500.0;
        state.largest_electric_value = 1500.0;
        state.flows.solar_to_home = 1200.0;
        state.flows.grid_to_home = 300.0;

        let display = DisplayConfig {
            decimals: 2,
            ..Default::default()
        };
        let card = CardView::new(&state, &display);
        assert_eq!(card.solar, "1.20 MWh");
        assert_eq!(card.grid_import, "0.30 MWh");
        assert_eq!(card.home, "1.50 MWh");
        assert_eq!(card.gas, "0.00 m³");
        assert!((card.self_sufficiency - 0.8).abs() < 1e-9);
        assert!(card.durations.solar_to_home.is_some());

        let individual = CardView::new(
            &state,
            &DisplayConfig {
                unified_prefix: false,
                decimals: 0,
                ..Default::default()
            },
        );
        assert_eq!(individual.grid_import, "300 kWh");
    }
}

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use strum::{Display, EnumString};

use super::{EntityMode, FlowSet, Period};

/// Whether a tracked quantity is electricity or gas
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq, Display, EnumString)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum EnergyType {
    #[default]
    Electric,
    Gas,
}

/// Import/export totals of a user-defined device
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct DeviceTotals {
    pub energy_type: EnergyType,
    pub import: f64,
    pub export: f64,
}

/// Raw per-source totals over a period.
///
/// `battery_import` is energy delivered by the battery (discharge) and
/// `battery_export` is energy stored into it (charge).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SourceTotals {
    pub solar_import: f64,
    pub battery_import: f64,
    pub battery_export: f64,
    pub grid_import: f64,
    pub grid_export: f64,
    pub gas_import: f64,
    pub devices: BTreeMap<String, DeviceTotals>,
}

impl SourceTotals {
    /// Conservation identity for home electricity consumption
    pub fn home_electric(&self) -> f64 {
        self.battery_import + self.grid_import + self.solar_import
            - self.battery_export
            - self.grid_export
    }
}

/// Immutable snapshot handed to rendering.
///
/// Rebuilt whole on every statistics refresh; the render path derives a fresh
/// copy with the live delta applied and never touches the canonical one.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AggregateState {
    pub period: Period,
    pub generated_at: DateTime<Utc>,

    /// Electricity quantities are in the configured electric unit,
    /// gas quantities in the configured gas unit.
    pub totals: SourceTotals,

    pub home_electric: f64,
    pub home_gas: f64,
    pub low_carbon: f64,
    pub low_carbon_percentage: f64,
    pub high_carbon: f64,

    pub flows: FlowSet,

    pub largest_electric_value: f64,
    pub largest_gas_value: f64,

    /// Grid treated as disconnected for this snapshot
    pub power_outage: bool,

    /// Number of statistic buckets that fed the flows
    pub bucket_count: usize,

    /// Classification used for every tracked entity
    pub entity_modes: BTreeMap<String, EntityMode>,

    /// Last known statistic state per entity, in the entity's own unit
    pub last_statistic_states: BTreeMap<String, f64>,
}

impl AggregateState {
    /// Snapshot with every quantity at zero
    pub fn empty(period: Period) -> Self {
        Self {
            period,
            generated_at: Utc::now(),
            totals: SourceTotals::default(),
            home_electric: 0.0,
            home_gas: 0.0,
            low_carbon: 0.0,
            low_carbon_percentage: 0.0,
            high_carbon: 0.0,
            flows: FlowSet::default(),
            largest_electric_value: 0.0,
            largest_gas_value: 0.0,
            power_outage: false,
            bucket_count: 0,
            entity_modes: BTreeMap::new(),
            last_statistic_states: BTreeMap::new(),
        }
    }

    /// Fraction of home electricity supplied locally (solar and battery), 0-1
    pub fn self_sufficiency_ratio(&self) -> f64 {
        if self.home_electric <= 0.0 {
            return 0.0;
        }
        ((self.flows.solar_to_home + self.flows.battery_to_home) / self.home_electric)
            .clamp(0.0, 1.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_home_electric_identity() {
        let totals = SourceTotals {
            solar_import: 10.0,
            battery_import: 2.0,
            battery_export: 3.0,
            grid_import: 4.0,
            grid_export: 5.0,
            ..Default::default()
        };
        assert_eq!(totals.home_electric(), 8.0);
    }

    #[test]
    fn test_self_sufficiency_ratio() {
        let start = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let mut state = AggregateState::empty(Period::new(start, start + chrono::Duration::days(1)));
        assert_eq!(state.self_sufficiency_ratio(), 0.0);

        state.home_electric = 10.0;
        state.flows.solar_to_home = 4.0;
        state.flows.battery_to_home = 1.0;
        state.flows.grid_to_home = 5.0;
        assert!((state.self_sufficiency_ratio() - 0.5).abs() < 1e-9);
    }
}

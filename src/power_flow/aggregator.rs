use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use tracing::debug;

use super::{rescale_flows, BucketDeltas};
use crate::domain::{
    AggregateState, DeviceTotals, EnergyType, EntityMode, EntityRoles, FlowSet, Period,
    SourceTotals, StatisticRecord,
};
use crate::statistics::last_state;
use crate::units::{self, DEFAULT_CALORIFIC_VALUE};

/// Fossil share assumed for a bucket with no CO₂ sample
const MISSING_CO2_FOSSIL_PERCENTAGE: f64 = 100.0;

/// Target units for aggregated quantities
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConversionSettings {
    pub electric_unit: String,
    pub gas_unit: String,
    pub calorific_value: f64,
}

impl Default for ConversionSettings {
    fn default() -> Self {
        Self {
            electric_unit: "kWh".to_string(),
            gas_unit: "m³".to_string(),
            calorific_value: DEFAULT_CALORIFIC_VALUE,
        }
    }
}

impl ConversionSettings {
    /// Convert an entity's value into the unit of `energy_type`.
    /// Entities with no known unit are taken as already converted.
    pub fn to_target(&self, value: f64, entity_unit: Option<&str>, energy_type: EnergyType) -> f64 {
        let target = match energy_type {
            EnergyType::Electric => &self.electric_unit,
            EnergyType::Gas => &self.gas_unit,
        };
        match entity_unit {
            Some(unit) => units::convert(value, unit, target, self.calorific_value),
            None => value,
        }
    }
}

/// Everything one aggregation pass reads
#[derive(Debug, Clone, Copy)]
pub struct AggregationInput<'a> {
    pub period: Period,
    /// Normalised series per entity
    pub series: &'a HashMap<String, Vec<StatisticRecord>>,
    /// Unit of measurement per entity
    pub units: &'a HashMap<String, String>,
    /// Fossil fuel percentage per bucket start
    pub co2: Option<&'a BTreeMap<DateTime<Utc>, f64>>,
    pub modes: &'a BTreeMap<String, EntityMode>,
    pub power_outage: bool,
}

/// Turns normalised statistics into an [`AggregateState`]
#[derive(Debug, Clone)]
pub struct Aggregator {
    roles: EntityRoles,
    conversion: ConversionSettings,
}

impl Aggregator {
    pub fn new(roles: EntityRoles, conversion: ConversionSettings) -> Self {
        Self { roles, conversion }
    }

    pub fn roles(&self) -> &EntityRoles {
        &self.roles
    }

    pub fn conversion(&self) -> &ConversionSettings {
        &self.conversion
    }

    /// Converted change of every bucket of an entity
    fn deltas(
        &self,
        input: &AggregationInput<'_>,
        entity_id: &str,
        energy_type: EnergyType,
    ) -> Vec<(DateTime<Utc>, f64)> {
        let unit = input.units.get(entity_id).map(String::as_str);
        input
            .series
            .get(entity_id)
            .into_iter()
            .flatten()
            .map(|r| {
                (
                    r.start,
                    self.conversion.to_target(r.change_or_zero(), unit, energy_type),
                )
            })
            .collect()
    }

    fn entity_total(&self, input: &AggregationInput<'_>, entity_id: &str, energy_type: EnergyType) -> f64 {
        self.deltas(input, entity_id, energy_type)
            .into_iter()
            .map(|(_, v)| v)
            .sum()
    }

    /// Aggregate a period.
    ///
    /// Flows are allocated per bucket and summed afterwards; allocating on
    /// period totals would misattribute energy when sources switch on and off
    /// at different times.
    pub fn aggregate(&self, input: &AggregationInput<'_>) -> AggregateState {
        let mut buckets: BTreeMap<DateTime<Utc>, BucketDeltas> = BTreeMap::new();
        let mut totals = SourceTotals::default();

        let electric_roles: [(&Vec<String>, fn(&mut BucketDeltas) -> &mut f64); 5] = [
            (&self.roles.solar, |b| &mut b.solar_produced),
            (&self.roles.battery_import, |b| &mut b.battery_discharged),
            (&self.roles.battery_export, |b| &mut b.battery_charged),
            (&self.roles.grid_import, |b| &mut b.grid_imported),
            (&self.roles.grid_export, |b| &mut b.grid_exported),
        ];
        for (entities, field) in electric_roles {
            for entity_id in entities {
                for (start, delta) in self.deltas(input, entity_id, EnergyType::Electric) {
                    *field(buckets.entry(start).or_default()) += delta;
                }
            }
        }

        if input.power_outage {
            for bucket in buckets.values_mut() {
                bucket.grid_imported = 0.0;
                bucket.grid_exported = 0.0;
            }
        }

        let mut flows = FlowSet::default();
        let mut high_carbon = 0.0;
        for (start, bucket) in &buckets {
            totals.solar_import += bucket.solar_produced;
            totals.battery_import += bucket.battery_discharged;
            totals.battery_export += bucket.battery_charged;
            totals.grid_import += bucket.grid_imported;
            totals.grid_export += bucket.grid_exported;

            // a bucket's allocation only sees non-negative deltas
            let clamped = BucketDeltas {
                solar_produced: bucket.solar_produced.max(0.0),
                battery_discharged: bucket.battery_discharged.max(0.0),
                battery_charged: bucket.battery_charged.max(0.0),
                grid_imported: bucket.grid_imported.max(0.0),
                grid_exported: bucket.grid_exported.max(0.0),
            };
            flows += clamped.allocate(input.power_outage);

            if let Some(co2) = input.co2 {
                let fossil = co2
                    .get(start)
                    .copied()
                    .unwrap_or(MISSING_CO2_FOSSIL_PERCENTAGE);
                high_carbon += clamped.grid_imported * fossil / 100.0;
            }
        }

        totals.gas_import = self
            .roles
            .gas
            .iter()
            .map(|id| self.entity_total(input, id, EnergyType::Gas))
            .sum();

        for device in &self.roles.devices {
            let import = device
                .import_entity
                .as_deref()
                .map_or(0.0, |id| self.entity_total(input, id, device.energy_type));
            let export = device
                .export_entity
                .as_deref()
                .map_or(0.0, |id| self.entity_total(input, id, device.energy_type));
            totals.devices.insert(
                device.name.clone(),
                DeviceTotals {
                    energy_type: device.energy_type,
                    import,
                    export,
                },
            );
        }

        let last_statistic_states = self
            .roles
            .statistic_entities()
            .into_iter()
            .filter_map(|id| {
                let state = input.series.get(&id).and_then(|s| last_state(s))?;
                Some((id, state))
            })
            .collect();

        let mut state = AggregateState::empty(input.period);
        state.totals = totals;
        state.flows = flows;
        state.high_carbon = high_carbon;
        state.power_outage = input.power_outage;
        state.bucket_count = buckets.len();
        state.entity_modes = input.modes.clone();
        state.last_statistic_states = last_statistic_states;
        derive_quantities(&mut state, self.roles.tracks_low_carbon() && input.co2.is_some());

        debug!(
            buckets = state.bucket_count,
            home_electric = state.home_electric,
            flows = %state.flows,
            "aggregated period"
        );
        state
    }
}

/// Fill in the quantities derived from totals and flows, then rescale flows.
///
/// Without CO₂ data every imported unit counts as high-carbon.
pub(crate) fn derive_quantities(state: &mut AggregateState, low_carbon_tracked: bool) {
    let totals = &state.totals;

    state.home_electric = totals.home_electric().max(0.0);
    state.home_gas = totals.gas_import.max(0.0);

    rescale_flows(
        &mut state.flows,
        state.home_electric,
        totals.grid_export,
        totals.battery_export,
    );

    let grid_import = totals.grid_import.max(0.0);
    if !low_carbon_tracked {
        state.high_carbon = grid_import;
    }
    state.high_carbon = state.high_carbon.clamp(0.0, grid_import);
    state.low_carbon = grid_import - state.high_carbon;
    state.low_carbon_percentage = if grid_import > 0.0 {
        (grid_import - state.high_carbon) / grid_import * 100.0
    } else {
        0.0
    };

    let device_values = |kind: EnergyType| {
        totals
            .devices
            .values()
            .filter(move |d| d.energy_type == kind)
            .flat_map(|d| [d.import, d.export])
    };

    state.largest_electric_value = [
        totals.solar_import,
        totals.battery_import,
        totals.battery_export,
        totals.grid_import,
        totals.grid_export,
        state.home_electric,
        state.flows.max_flow(),
    ]
    .into_iter()
    .chain(device_values(EnergyType::Electric))
    .filter(|v| v.is_finite())
    .fold(0.0, f64::max);

    state.largest_gas_value = std::iter::once(state.home_gas)
        .chain(device_values(EnergyType::Gas))
        .filter(|v| v.is_finite())
        .fold(0.0, f64::max);
}

use chrono::Utc;
use std::collections::HashMap;
use tracing::trace;

use super::aggregator::derive_quantities;
use super::{BucketDeltas, ConversionSettings};
use crate::domain::{AggregateState, EnergyType, EntityMode, EntityRoles, MeterReading, Period};

/// Adds the in-progress delta (latest raw state minus last statistic state)
/// on top of an aggregated snapshot.
#[derive(Debug, Clone)]
pub struct LiveDeltaExtrapolator {
    roles: EntityRoles,
    conversion: ConversionSettings,
}

impl LiveDeltaExtrapolator {
    pub fn new(roles: EntityRoles, conversion: ConversionSettings) -> Self {
        Self { roles, conversion }
    }

    /// Delta for one entity, converted to the unit of `energy_type`.
    ///
    /// Zero unless the sensor changed inside the period and both the raw
    /// state and the last statistic state are known.
    fn delta(
        &self,
        snapshot: &AggregateState,
        period: &Period,
        readings: &HashMap<String, MeterReading>,
        entity_id: &str,
        energy_type: EnergyType,
    ) -> f64 {
        let Some(reading) = readings.get(entity_id) else {
            return 0.0;
        };
        if !period.contains(reading.last_changed_at) {
            return 0.0;
        }
        let (Some(current), Some(last)) = (
            reading.raw_state.filter(|v| v.is_finite()),
            snapshot.last_statistic_states.get(entity_id).copied(),
        ) else {
            return 0.0;
        };

        let raw = current - last;
        let raw = match snapshot.entity_modes.get(entity_id).copied().unwrap_or_default() {
            EntityMode::Totalising => raw,
            EntityMode::Resetting | EntityMode::MisconfiguredResetting => raw.max(0.0),
        };
        let converted = self.conversion.to_target(
            raw,
            reading.unit_of_measurement.as_deref(),
            energy_type,
        );
        trace!(entity_id, current, last, delta = converted, "live delta");
        converted
    }

    fn role_delta(
        &self,
        snapshot: &AggregateState,
        period: &Period,
        readings: &HashMap<String, MeterReading>,
        entities: &[String],
        energy_type: EnergyType,
    ) -> f64 {
        entities
            .iter()
            .map(|id| self.delta(snapshot, period, readings, id, energy_type))
            .sum()
    }

    /// Return a new snapshot with the live delta applied; `snapshot` is untouched.
    ///
    /// The delta is allocated into flows on its own, added to the snapshot's
    /// flows, and the combined flows are rescaled to the combined totals.
    pub fn extrapolate(
        &self,
        snapshot: &AggregateState,
        period: Period,
        readings: &HashMap<String, MeterReading>,
        power_outage: bool,
    ) -> AggregateState {
        let electric = |entities: &[String]| {
            self.role_delta(snapshot, &period, readings, entities, EnergyType::Electric)
        };
        let mut delta = BucketDeltas {
            solar_produced: electric(&self.roles.solar),
            battery_discharged: electric(&self.roles.battery_import),
            battery_charged: electric(&self.roles.battery_export),
            grid_imported: electric(&self.roles.grid_import),
            grid_exported: electric(&self.roles.grid_export),
        };
        if power_outage {
            delta.grid_imported = 0.0;
            delta.grid_exported = 0.0;
        }

        let mut next = snapshot.clone();
        next.generated_at = Utc::now();
        next.power_outage = power_outage;

        let totals = &mut next.totals;
        totals.solar_import += delta.solar_produced;
        totals.battery_import += delta.battery_discharged;
        totals.battery_export += delta.battery_charged;
        totals.grid_import += delta.grid_imported;
        totals.grid_export += delta.grid_exported;
        totals.gas_import +=
            self.role_delta(snapshot, &period, readings, &self.roles.gas, EnergyType::Gas);

        for device in &self.roles.devices {
            let Some(device_totals) = totals.devices.get_mut(&device.name) else {
                continue;
            };
            let entity_delta = |entity: &Option<String>| {
                entity.as_deref().map_or(0.0, |id| {
                    self.delta(snapshot, &period, readings, id, device.energy_type)
                })
            };
            device_totals.import += entity_delta(&device.import_entity);
            device_totals.export += entity_delta(&device.export_entity);
        }

        let clamped = BucketDeltas {
            solar_produced: delta.solar_produced.max(0.0),
            battery_discharged: delta.battery_discharged.max(0.0),
            battery_charged: delta.battery_charged.max(0.0),
            grid_imported: delta.grid_imported.max(0.0),
            grid_exported: delta.grid_exported.max(0.0),
        };
        next.flows += clamped.allocate(power_outage);

        // live import has no CO₂ sample yet; it takes the period's fossil share
        let low_carbon_tracked = self.roles.tracks_low_carbon();
        if low_carbon_tracked {
            let fossil_share = if snapshot.totals.grid_import > 0.0 {
                snapshot.high_carbon / snapshot.totals.grid_import
            } else {
                1.0
            };
            next.high_carbon += clamped.grid_imported * fossil_share;
        }

        derive_quantities(&mut next, low_carbon_tracked);
        next
    }
}

use serde::{Deserialize, Serialize};

use crate::domain::FlowSet;

/// Energy totals for one bucket, before they are split into flows
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct BucketDeltas {
    pub solar_produced: f64,
    pub battery_discharged: f64,
    pub battery_charged: f64,
    pub grid_imported: f64,
    pub grid_exported: f64,
}

impl BucketDeltas {
    pub fn allocate(&self, is_power_outage: bool) -> FlowSet {
        allocate(
            self.solar_produced,
            self.battery_discharged,
            self.battery_charged,
            self.grid_imported,
            self.grid_exported,
            is_power_outage,
        )
    }

    /// Energy entering minus energy leaving through grid and battery
    pub fn net_to_home(&self) -> f64 {
        self.grid_imported + self.solar_produced + self.battery_discharged
            - self.grid_exported
            - self.battery_charged
    }
}

/// Non-negative, finite; anything else counts as nothing
fn sanitize(value: f64) -> f64 {
    if value.is_finite() {
        value.max(0.0)
    } else {
        0.0
    }
}

/// Split one bucket's source and sink totals into directional flows.
///
/// The split is under-determined; the priority order below fixes it:
/// 1. home demand is whatever enters minus whatever leaves
/// 2. grid charges the battery only with import beyond home demand
/// 3. solar charges the battery
/// 4. solar exports
/// 5. battery covers the remaining export
/// 6. leftover import covers leftover charging
/// 7. home is served by solar, then battery, then grid
///
/// During a power outage the grid is treated as disconnected.
pub fn allocate(
    solar_produced: f64,
    battery_discharged: f64,
    battery_charged: f64,
    grid_imported: f64,
    grid_exported: f64,
    is_power_outage: bool,
) -> FlowSet {
    let mut solar = sanitize(solar_produced);
    let mut discharged = sanitize(battery_discharged);
    let mut charged = sanitize(battery_charged);
    let (mut imported, mut exported) = if is_power_outage {
        (0.0, 0.0)
    } else {
        (sanitize(grid_imported), sanitize(grid_exported))
    };

    let energy_in = imported + solar + discharged;
    let energy_out = exported + charged;
    let mut remaining = (energy_in - energy_out).max(0.0);

    let mut grid_to_battery = charged.min(imported - remaining).max(0.0);
    charged -= grid_to_battery;
    imported -= grid_to_battery;

    let solar_to_battery = solar.min(charged);
    charged -= solar_to_battery;
    solar -= solar_to_battery;

    let solar_to_grid = solar.min(exported);
    solar -= solar_to_grid;
    exported -= solar_to_grid;

    let battery_to_grid = discharged.min(exported);
    discharged -= battery_to_grid;
    exported -= battery_to_grid;
    debug_assert!(exported >= 0.0);

    let leftover_grid_to_battery = imported.min(charged);
    grid_to_battery += leftover_grid_to_battery;
    imported -= leftover_grid_to_battery;
    charged -= leftover_grid_to_battery;
    debug_assert!(charged >= 0.0);

    let solar_to_home = remaining.min(solar);
    remaining -= solar_to_home;

    let battery_to_home = discharged.min(remaining);
    remaining -= battery_to_home;

    let grid_to_home = remaining.min(imported);

    FlowSet {
        solar_to_home,
        solar_to_grid,
        solar_to_battery,
        grid_to_home,
        grid_to_battery,
        battery_to_home,
        battery_to_grid,
    }
}

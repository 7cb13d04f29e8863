use crate::domain::FlowSet;

/// Scale a group of flows so they add up to `target`, keeping their proportions.
///
/// Nothing happens when the group is empty; a negative target counts as zero.
fn scale_group(flows: &mut [&mut f64], target: f64) {
    let sum: f64 = flows.iter().map(|f| **f).sum();
    if sum <= 0.0 || !sum.is_finite() {
        return;
    }
    let factor = target.max(0.0) / sum;
    for flow in flows.iter_mut() {
        **flow *= factor;
    }
}

/// Bring flows in line with the authoritative totals.
///
/// Flows are summed from buckets allocated independently, so the groups
/// ending at home, grid and battery drift from the raw totals when sensors
/// sample out of step. Each group is rescaled to its total.
pub fn rescale_flows(flows: &mut FlowSet, home_electric: f64, grid_export: f64, battery_export: f64) {
    scale_group(
        &mut [
            &mut flows.solar_to_home,
            &mut flows.battery_to_home,
            &mut flows.grid_to_home,
        ],
        home_electric,
    );
    scale_group(
        &mut [&mut flows.solar_to_grid, &mut flows.battery_to_grid],
        grid_export,
    );
    scale_group(
        &mut [&mut flows.solar_to_battery, &mut flows.grid_to_battery],
        battery_export,
    );
}

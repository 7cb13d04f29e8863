use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::{Add, AddAssign};

/// Directional energy flows for one bucket or an aggregated period.
///
/// Every field is non-negative. Built by the allocator and summed by the
/// aggregator; nothing else writes to it.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct FlowSet {
    pub solar_to_home: f64,
    pub solar_to_grid: f64,
    pub solar_to_battery: f64,
    pub grid_to_home: f64,
    pub grid_to_battery: f64,
    pub battery_to_home: f64,
    pub battery_to_grid: f64,
}

impl FlowSet {
    /// Flows ending at the home
    pub fn to_home(&self) -> f64 {
        self.solar_to_home + self.battery_to_home + self.grid_to_home
    }

    /// Flows ending at the grid
    pub fn to_grid(&self) -> f64 {
        self.solar_to_grid + self.battery_to_grid
    }

    /// Flows ending at the battery
    pub fn to_battery(&self) -> f64 {
        self.solar_to_battery + self.grid_to_battery
    }

    pub fn from_solar(&self) -> f64 {
        self.solar_to_home + self.solar_to_grid + self.solar_to_battery
    }

    pub fn from_grid(&self) -> f64 {
        self.grid_to_home + self.grid_to_battery
    }

    pub fn from_battery(&self) -> f64 {
        self.battery_to_home + self.battery_to_grid
    }

    /// Largest single flow
    pub fn max_flow(&self) -> f64 {
        [
            self.solar_to_home,
            self.solar_to_grid,
            self.solar_to_battery,
            self.grid_to_home,
            self.grid_to_battery,
            self.battery_to_home,
            self.battery_to_grid,
        ]
        .into_iter()
        .fold(0.0, f64::max)
    }

    pub fn is_non_negative(&self) -> bool {
        self.solar_to_home >= 0.0
            && self.solar_to_grid >= 0.0
            && self.solar_to_battery >= 0.0
            && self.grid_to_home >= 0.0
            && self.grid_to_battery >= 0.0
            && self.battery_to_home >= 0.0
            && self.battery_to_grid >= 0.0
    }
}

impl Add for FlowSet {
    type Output = Self;
    fn add(mut self, rhs: Self) -> Self::Output {
        self += rhs;
        self
    }
}

impl AddAssign for FlowSet {
    fn add_assign(&mut self, rhs: Self) {
        self.solar_to_home += rhs.solar_to_home;
        self.solar_to_grid += rhs.solar_to_grid;
        self.solar_to_battery += rhs.solar_to_battery;
        self.grid_to_home += rhs.grid_to_home;
        self.grid_to_battery += rhs.grid_to_battery;
        self.battery_to_home += rhs.battery_to_home;
        self.battery_to_grid += rhs.battery_to_grid;
    }
}

impl std::iter::Sum for FlowSet {
    fn sum<I: Iterator<Item = Self>>(iter: I) -> Self {
        iter.fold(FlowSet::default(), Add::add)
    }
}

impl fmt::Display for FlowSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "FlowSet {{ solar->home: {:.3}, solar->grid: {:.3}, solar->battery: {:.3}, grid->home: {:.3}, grid->battery: {:.3}, battery->home: {:.3}, battery->grid: {:.3} }}",
            self.solar_to_home,
            self.solar_to_grid,
            self.solar_to_battery,
            self.grid_to_home,
            self.grid_to_battery,
            self.battery_to_home,
            self.battery_to_grid,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> FlowSet {
        FlowSet {
            solar_to_home: 1.0,
            solar_to_grid: 2.0,
            solar_to_battery: 3.0,
            grid_to_home: 4.0,
            grid_to_battery: 5.0,
            battery_to_home: 6.0,
            battery_to_grid: 7.0,
        }
    }

    #[test]
    fn test_group_sums() {
        let f = sample();
        assert_eq!(f.to_home(), 11.0);
        assert_eq!(f.to_grid(), 9.0);
        assert_eq!(f.to_battery(), 8.0);
        assert_eq!(f.from_solar(), 6.0);
        assert_eq!(f.from_grid(), 9.0);
        assert_eq!(f.from_battery(), 13.0);
        assert_eq!(f.max_flow(), 7.0);
    }

    #[test]
    fn test_sum_of_flowsets() {
        let total: FlowSet = vec![sample(), sample()].into_iter().sum();
        assert_eq!(total.battery_to_grid, 14.0);
        assert!(total.is_non_negative());
    }

    #[test]
    fn test_display() {
        let display = format!("{}", sample());
        assert!(display.contains("solar->home: 1.000"));
    }
}

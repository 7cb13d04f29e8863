//! Energy-flow reconciliation: turns cumulative meter statistics into the
//! per-period flows between solar, battery, grid and home.

pub mod config;
pub mod controller;
pub mod display;
pub mod domain;
pub mod error;
pub mod power_flow;
pub mod statistics;
pub mod telemetry;
pub mod units;

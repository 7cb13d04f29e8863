use chrono_tz::Tz;
use figment::{
    providers::{Env, Format, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use validator::{Validate, ValidationError};

use crate::display::ScaleMode;
use crate::domain::EntityRoles;
use crate::error::ConfigError;
use crate::power_flow::ConversionSettings;
use crate::units::{Unit, DEFAULT_CALORIFIC_VALUE};

/// Fully resolved configuration; every field has a default
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[serde(default)]
pub struct Config {
    #[validate(nested)]
    pub display: DisplayConfig,
    #[validate(nested)]
    pub gas: GasConfig,
    #[validate(nested)]
    pub statistics: StatisticsConfig,
    /// Extrapolate the in-progress hour from live sensor states on render
    pub live_mode: bool,
    /// IANA zone used for local day boundaries
    #[validate(custom(function = "validate_time_zone"))]
    pub time_zone: String,
    pub entities: EntityRoles,
    pub source: SourceConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[serde(default)]
#[validate(schema(function = "validate_flow_bounds"))]
pub struct DisplayConfig {
    #[validate(custom(function = "validate_unit"))]
    pub electric_unit: String,
    #[validate(custom(function = "validate_unit"))]
    pub gas_unit: String,
    /// One SI prefix for every value instead of one per value
    pub unified_prefix: bool,
    pub scale_mode: ScaleMode,
    #[validate(range(min = 0.0))]
    pub min_flow_seconds: f64,
    #[validate(range(min = 0.0))]
    pub max_flow_seconds: f64,
    #[validate(range(max = 6))]
    pub decimals: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[serde(default)]
pub struct GasConfig {
    /// MJ/m³
    #[validate(range(exclusive_min = 0.0))]
    pub calorific_value: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[serde(default)]
pub struct StatisticsConfig {
    /// Always fetch hourly statistics, whatever the period length
    pub use_hourly: bool,
    #[validate(range(min = 1))]
    pub refresh_seconds: u64,
    #[validate(range(min = 1))]
    pub fetch_timeout_seconds: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SourceConfig {
    pub recording_path: PathBuf,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            display: DisplayConfig::default(),
            gas: GasConfig::default(),
            statistics: StatisticsConfig::default(),
            live_mode: false,
            time_zone: "UTC".to_string(),
            entities: EntityRoles::default(),
            source: SourceConfig::default(),
        }
    }
}

impl Default for DisplayConfig {
    fn default() -> Self {
        Self {
            electric_unit: "kWh".to_string(),
            gas_unit: "m³".to_string(),
            unified_prefix: true,
            scale_mode: ScaleMode::Linear,
            min_flow_seconds: 1.0,
            max_flow_seconds: 6.0,
            decimals: 1,
        }
    }
}

impl Default for GasConfig {
    fn default() -> Self {
        Self {
            calorific_value: DEFAULT_CALORIFIC_VALUE,
        }
    }
}

impl Default for StatisticsConfig {
    fn default() -> Self {
        Self {
            use_hourly: false,
            refresh_seconds: 60,
            fetch_timeout_seconds: 30,
        }
    }
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            recording_path: PathBuf::from("data/recording.json"),
        }
    }
}

fn validate_time_zone(name: &str) -> Result<(), ValidationError> {
    name.parse::<Tz>()
        .map(|_| ())
        .map_err(|_| ValidationError::new("unknown_time_zone"))
}

fn validate_unit(unit: &str) -> Result<(), ValidationError> {
    unit.parse::<Unit>()
        .map(|_| ())
        .map_err(|_| ValidationError::new("unknown_unit"))
}

fn validate_flow_bounds(display: &DisplayConfig) -> Result<(), ValidationError> {
    if display.min_flow_seconds > display.max_flow_seconds {
        return Err(ValidationError::new("min_flow_seconds_above_max"));
    }
    Ok(())
}

impl Config {
    /// `config/default.toml` overlaid with `EFE__`-prefixed environment variables
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from("config/default.toml")
    }

    pub fn load_from(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let figment = Figment::new()
            .merge(Toml::file(path.as_ref()))
            .merge(Env::prefixed("EFE__").split("__"));
        let cfg: Config = figment.extract()?;
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn tz(&self) -> Result<Tz, ConfigError> {
        self.time_zone
            .parse()
            .map_err(|_| ConfigError::TimeZone(self.time_zone.clone()))
    }

    pub fn conversion(&self) -> ConversionSettings {
        ConversionSettings {
            electric_unit: self.display.electric_unit.clone(),
            gas_unit: self.display.gas_unit.clone(),
            calorific_value: self.gas.calorific_value,
        }
    }

    pub fn refresh_interval(&self) -> Duration {
        Duration::from_secs(self.statistics.refresh_seconds)
    }

    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_secs(self.statistics.fetch_timeout_seconds)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::EnergyType;
    use figment::Jail;

    #[test]
    fn test_defaults_are_valid() {
        let cfg = Config::default();
        assert!(cfg.validate().is_ok());
        assert_eq!(cfg.tz().unwrap(), Tz::UTC);
        assert_eq!(cfg.conversion(), ConversionSettings::default());
        assert_eq!(cfg.refresh_interval(), Duration::from_secs(60));
    }

    #[test]
    fn test_load_toml_and_env() {
        Jail::expect_with(|jail| {
            jail.create_file(
                "engine.toml",
                r#"
                time_zone = "Europe/Amsterdam"
                live_mode = true

                [display]
                electric_unit = "Wh"
                scale_mode = "logarithmic"

                [entities]
                solar = ["sensor.solar"]
                grid_import = ["sensor.grid_in"]

                [entities.power_outage]
                entity = "binary_sensor.outage"

                [[entities.devices]]
                name = "Boiler"
                energy_type = "gas"
                import_entity = "sensor.boiler"
                "#,
            )?;
            jail.set_env("EFE__GAS__CALORIFIC_VALUE", "35.5");
            jail.set_env("EFE__STATISTICS__USE_HOURLY", "true");

            let cfg = Config::load_from("engine.toml").expect("config loads");
            assert!(cfg.live_mode);
            assert_eq!(cfg.tz().unwrap(), chrono_tz::Europe::Amsterdam);
            assert_eq!(cfg.display.electric_unit, "Wh");
            assert_eq!(cfg.display.gas_unit, "m³");
            assert_eq!(cfg.display.scale_mode, ScaleMode::Logarithmic);
            assert_eq!(cfg.gas.calorific_value, 35.5);
            assert!(cfg.statistics.use_hourly);
            assert_eq!(cfg.entities.solar, vec!["sensor.solar"]);
            let outage = cfg.entities.power_outage.as_ref().unwrap();
            assert_eq!(outage.state_alert, "on");
            assert_eq!(cfg.entities.devices[0].energy_type, EnergyType::Gas);
            Ok(())
        });
    }

    #[test]
    fn test_missing_file_falls_back_to_defaults() {
        Jail::expect_with(|_jail| {
            let cfg = Config::load_from("nope.toml").expect("defaults");
            assert_eq!(cfg.statistics.refresh_seconds, 60);
            Ok(())
        });
    }

    #[test]
    fn test_rejects_invalid_values() {
        Jail::expect_with(|jail| {
            jail.create_file(
                "bad.toml",
                r#"
                time_zone = "Mars/Olympus"
                [gas]
                calorific_value = 0.0
                "#,
            )?;
            let err = Config::load_from("bad.toml").unwrap_err();
            assert!(matches!(err, ConfigError::Invalid(_)));
            Ok(())
        });
    }

    #[test]
    fn test_rejects_inverted_flow_bounds() {
        let mut cfg = Config::default();
        cfg.display.min_flow_seconds = 10.0;
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn test_rejects_unknown_unit() {
        let mut cfg = Config::default();
        cfg.display.electric_unit = "furlongs".to_string();
        assert!(cfg.validate().is_err());
    }
}

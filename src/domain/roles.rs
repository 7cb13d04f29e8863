use serde::{Deserialize, Serialize};

use super::EnergyType;

/// Import/export sensors of a user-defined device
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeviceEntities {
    pub name: String,
    #[serde(default)]
    pub energy_type: EnergyType,
    #[serde(default)]
    pub import_entity: Option<String>,
    #[serde(default)]
    pub export_entity: Option<String>,
}

/// Sensor that flags a grid outage when its state equals `state_alert`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PowerOutageEntity {
    pub entity: String,
    #[serde(default = "default_alert_state")]
    pub state_alert: String,
}

fn default_alert_state() -> String {
    "on".to_string()
}

/// Which sensors feed which node of the flow diagram.
///
/// Every role takes a list; deltas of entities sharing a role are summed.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EntityRoles {
    pub solar: Vec<String>,
    /// Energy delivered by the battery
    pub battery_import: Vec<String>,
    /// Energy stored into the battery
    pub battery_export: Vec<String>,
    pub grid_import: Vec<String>,
    pub grid_export: Vec<String>,
    pub gas: Vec<String>,
    /// Presence enables CO₂-based low-carbon accounting
    pub low_carbon: Option<String>,
    pub power_outage: Option<PowerOutageEntity>,
    pub devices: Vec<DeviceEntities>,
}

impl EntityRoles {
    /// Every entity that has statistics, without duplicates, in a stable order
    pub fn statistic_entities(&self) -> Vec<String> {
        let mut ids: Vec<String> = Vec::new();
        let devices = self
            .devices
            .iter()
            .flat_map(|d| d.import_entity.iter().chain(d.export_entity.iter()));
        for id in self
            .solar
            .iter()
            .chain(&self.battery_import)
            .chain(&self.battery_export)
            .chain(&self.grid_import)
            .chain(&self.grid_export)
            .chain(&self.gas)
            .chain(devices)
        {
            if !ids.contains(id) {
                ids.push(id.clone());
            }
        }
        ids
    }

    pub fn tracks_low_carbon(&self) -> bool {
        self.low_carbon.is_some()
    }

    /// Outage flag from the host's current states; absent sensor means no outage
    pub fn is_power_outage<S: AsRef<str>>(&self, state_of: impl Fn(&str) -> Option<S>) -> bool {
        self.power_outage
            .as_ref()
            .and_then(|o| state_of(&o.entity).map(|s| s.as_ref() == o.state_alert))
            .unwrap_or(false)
    }
}

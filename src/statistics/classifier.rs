use parking_lot::RwLock;
use std::collections::HashMap;
use tracing::debug;

use crate::domain::{EntityMode, StatisticRecord};

fn round6(value: f64) -> f64 {
    (value * 1_000_000.0).round() / 1_000_000.0
}

/// Classify an entity from the first daily statistic of the prior day.
///
/// Predicates are checked in order:
/// 1. `change > state || change < 0` -> misconfigured resetting
/// 2. `0 <= change < state` -> resetting
/// 3. otherwise -> totalising
///
/// No history, or a record without both values, is totalising.
pub fn classify(first_daily_stat: Option<&StatisticRecord>) -> EntityMode {
    let Some(record) = first_daily_stat else {
        return EntityMode::Totalising;
    };
    let (Some(change), Some(state)) = (record.change, record.state) else {
        return EntityMode::Totalising;
    };
    if !change.is_finite() || !state.is_finite() {
        return EntityMode::Totalising;
    }

    let change = round6(change);
    let state = round6(state);

    if change > state || change < 0.0 {
        EntityMode::MisconfiguredResetting
    } else if change >= 0.0 && change < state {
        EntityMode::Resetting
    } else {
        EntityMode::Totalising
    }
}

/// Session cache of entity classifications
#[derive(Debug, Default)]
pub struct ModeCache {
    modes: RwLock<HashMap<String, EntityMode>>,
}

impl ModeCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, entity_id: &str) -> Option<EntityMode> {
        self.modes.read().get(entity_id).copied()
    }

    /// Entities in `entity_ids` that have not been classified yet
    pub fn missing<'a>(&self, entity_ids: &'a [String]) -> Vec<&'a String> {
        let modes = self.modes.read();
        entity_ids.iter().filter(|id| !modes.contains_key(*id)).collect()
    }

    /// Classify and remember an entity; an existing entry is kept
    pub fn classify_and_store(&self, entity_id: &str, first_daily_stat: Option<&StatisticRecord>) -> EntityMode {
        let mut modes = self.modes.write();
        *modes.entry(entity_id.to_string()).or_insert_with(|| {
            let mode = classify(first_daily_stat);
            debug!(entity_id, mode = %mode, "classified entity");
            mode
        })
    }

    /// Mode for an entity, totalising when it was never classified
    pub fn mode_or_default(&self, entity_id: &str) -> EntityMode {
        self.get(entity_id).unwrap_or_default()
    }

    pub fn clear(&self) {
        self.modes.write().clear();
    }

    pub fn len(&self) -> usize {
        self.modes.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.modes.read().is_empty()
    }
}

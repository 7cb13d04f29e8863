use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Datelike, NaiveDate, Timelike, Utc};
use itertools::Itertools;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::path::Path;

use crate::domain::{Granularity, MeterReading, Period, StatisticRecord};

/// Historical statistics source
#[async_trait]
pub trait StatisticsProvider: Send + Sync {
    async fn fetch_statistics(
        &self,
        period: Period,
        entity_ids: &[String],
        granularity: Granularity,
    ) -> Result<HashMap<String, Vec<StatisticRecord>>>;
}

/// Grid CO₂ intensity source, as fossil fuel percentage per bucket start
#[async_trait]
pub trait Co2Provider: Send + Sync {
    async fn fetch_co2_data(
        &self,
        period: Period,
        granularity: Granularity,
    ) -> Result<BTreeMap<DateTime<Utc>, f64>>;
}

/// Latest raw sensor states held by the host
pub trait LiveStateProvider: Send + Sync {
    fn live_states(&self) -> HashMap<String, MeterReading>;
}

/// Start of the bucket containing `t`
pub fn bucket_start(t: DateTime<Utc>, granularity: Granularity) -> DateTime<Utc> {
    let date = match granularity {
        Granularity::Hour => {
            return t
                .with_minute(0)
                .and_then(|t| t.with_second(0))
                .and_then(|t| t.with_nanosecond(0))
                .unwrap_or(t)
        }
        Granularity::Day => Some(t.date_naive()),
        Granularity::Month => NaiveDate::from_ymd_opt(t.year(), t.month(), 1),
    };
    date.and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|d| d.and_utc())
        .unwrap_or(t)
}

/// Merge finer records into buckets of `granularity`: last state wins, changes add up
pub fn rebucket(records: &[StatisticRecord], granularity: Granularity) -> Vec<StatisticRecord> {
    let sorted = records.iter().sorted_by_key(|r| r.start);
    let chunks = sorted.chunk_by(|r| bucket_start(r.start, granularity));
    chunks
        .into_iter()
        .map(|(start, group)| {
            let group: Vec<&StatisticRecord> = group.collect();
            let last = group[group.len() - 1];
            let change = group
                .iter()
                .filter_map(|r| r.change)
                .fold(None, |acc: Option<f64>, c| Some(acc.unwrap_or(0.0) + c));
            StatisticRecord {
                start,
                end: last.end,
                state: last.state,
                change,
                sum: last.sum,
                min: group.iter().filter_map(|r| r.min).reduce(f64::min),
                mean: None,
                max: group.iter().filter_map(|r| r.max).reduce(f64::max),
                last_reset: last.last_reset,
                placeholder: false,
            }
        })
        .collect()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Co2Sample {
    pub start: DateTime<Utc>,
    pub fossil_fuel_percentage: f64,
}

/// Recorded statistics, CO₂ samples and live states loaded from a JSON file.
///
/// Records are stored at their finest granularity and merged on fetch.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RecordedDataSource {
    #[serde(default)]
    pub statistics: HashMap<String, Vec<StatisticRecord>>,
    #[serde(default)]
    pub co2: Vec<Co2Sample>,
    #[serde(default)]
    pub states: HashMap<String, MeterReading>,
}

impl RecordedDataSource {
    pub async fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let body = tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("reading recording {}", path.display()))?;
        serde_json::from_str(&body).context("recording JSON parse failed")
    }
}

#[async_trait]
impl StatisticsProvider for RecordedDataSource {
    async fn fetch_statistics(
        &self,
        period: Period,
        entity_ids: &[String],
        granularity: Granularity,
    ) -> Result<HashMap<String, Vec<StatisticRecord>>> {
        let mut out = HashMap::with_capacity(entity_ids.len());
        for id in entity_ids {
            let Some(records) = self.statistics.get(id) else {
                continue;
            };
            let in_period: Vec<StatisticRecord> = records
                .iter()
                .filter(|r| r.start >= period.start && r.start < period.end)
                .cloned()
                .collect();
            out.insert(id.clone(), rebucket(&in_period, granularity));
        }
        Ok(out)
    }
}

#[async_trait]
impl Co2Provider for RecordedDataSource {
    async fn fetch_co2_data(
        &self,
        period: Period,
        granularity: Granularity,
    ) -> Result<BTreeMap<DateTime<Utc>, f64>> {
        let buckets = self
            .co2
            .iter()
            .filter(|s| s.start >= period.start && s.start < period.end)
            .map(|s| (bucket_start(s.start, granularity), s.fossil_fuel_percentage))
            .into_group_map();
        Ok(buckets
            .into_iter()
            .map(|(start, values)| (start, values.iter().sum::<f64>() / values.len() as f64))
            .collect())
    }
}

impl LiveStateProvider for RecordedDataSource {
    fn live_states(&self) -> HashMap<String, MeterReading> {
        self.states.clone()
    }
}

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

/// Device class reported by the host for a sensor
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default, Display, EnumString)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum DeviceClass {
    Energy,
    Gas,
    Water,
    Monetary,
    #[default]
    #[serde(other)]
    Other,
}

/// Latest raw state of a sensor as reported by the host
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MeterReading {
    pub entity_id: String,

    /// Raw state, as a number when the sensor reports one
    pub raw_state: Option<f64>,

    /// Raw state string (used for binary sensors such as outage detectors)
    #[serde(default)]
    pub state_text: Option<String>,

    pub last_changed_at: DateTime<Utc>,

    #[serde(default)]
    pub unit_of_measurement: Option<String>,

    #[serde(default)]
    pub device_class: DeviceClass,
}

impl MeterReading {
    pub fn numeric(entity_id: impl Into<String>, state: f64, unit: &str, at: DateTime<Utc>) -> Self {
        Self {
            entity_id: entity_id.into(),
            raw_state: Some(state),
            state_text: Some(state.to_string()),
            last_changed_at: at,
            unit_of_measurement: Some(unit.to_string()),
            device_class: DeviceClass::Energy,
        }
    }

    /// State as text, falling back to the numeric state
    pub fn state_str(&self) -> Option<String> {
        self.state_text
            .clone()
            .or_else(|| self.raw_state.map(|v| v.to_string()))
    }
}

/// One statistics bucket for one entity
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatisticRecord {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,

    /// Cumulative state at the end of the bucket
    #[serde(default)]
    pub state: Option<f64>,

    /// Change over the bucket. Untrusted as received; rewritten by the normalizer.
    #[serde(default)]
    pub change: Option<f64>,

    #[serde(default)]
    pub sum: Option<f64>,
    #[serde(default)]
    pub min: Option<f64>,
    #[serde(default)]
    pub mean: Option<f64>,
    #[serde(default)]
    pub max: Option<f64>,
    #[serde(default)]
    pub last_reset: Option<DateTime<Utc>>,

    /// Synthesised to prime delta computation; its state is not a reading
    #[serde(skip)]
    pub placeholder: bool,
}

impl StatisticRecord {
    pub fn new(start: DateTime<Utc>, end: DateTime<Utc>, state: Option<f64>, change: Option<f64>) -> Self {
        Self {
            start,
            end,
            state,
            change,
            sum: None,
            min: None,
            mean: None,
            max: None,
            last_reset: None,
            placeholder: false,
        }
    }

    /// All-zero placeholder used to prime delta computation at the edge of a window
    pub fn zeroed(start: DateTime<Utc>, end: DateTime<Utc>) -> Self {
        Self {
            start,
            end,
            state: Some(0.0),
            change: Some(0.0),
            sum: Some(0.0),
            min: Some(0.0),
            mean: Some(0.0),
            max: Some(0.0),
            last_reset: None,
            placeholder: true,
        }
    }

    /// Change with absent values treated as zero
    pub fn change_or_zero(&self) -> f64 {
        self.change.filter(|c| c.is_finite()).unwrap_or(0.0)
    }
}

/// How an entity's reported changes are reinterpreted
#[derive(
    Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq, Hash, Display, EnumString,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum EntityMode {
    /// Lifetime total; negative changes are kept (meter replaced)
    #[default]
    Totalising,
    /// Resets periodically; changes are clamped to zero or more
    Resetting,
    /// Reports raw totals as the first change of the day
    MisconfiguredResetting,
}

/// Statistics bucket width
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Display, EnumString)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum Granularity {
    Hour,
    Day,
    Month,
}

impl Granularity {
    /// Pick a bucket width for a period
    pub fn for_period(period: &Period, use_hourly: bool) -> Self {
        let span = period.span();
        if use_hourly || span <= Duration::days(2) {
            Granularity::Hour
        } else if span <= Duration::days(90) {
            Granularity::Day
        } else {
            Granularity::Month
        }
    }
}

/// Requested date range, half-open `[start, end)`
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct Period {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl Period {
    pub fn new(start: DateTime<Utc>, end: DateTime<Utc>) -> Self {
        Self { start, end }
    }

    pub fn span(&self) -> Duration {
        self.end - self.start
    }

    pub fn is_valid(&self) -> bool {
        self.end > self.start
    }

    /// Inclusive on both ends; used for live updates landing exactly on a boundary
    pub fn contains(&self, t: DateTime<Utc>) -> bool {
        t >= self.start && t <= self.end
    }

    /// The day before this period starts
    pub fn previous_day(&self) -> Period {
        Period::new(self.start - Duration::days(1), self.start)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(h: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 1, h, 0, 0).unwrap()
    }

    #[test]
    fn test_granularity_selection() {
        let day = Period::new(at(0), at(0) + Duration::days(1));
        assert_eq!(Granularity::for_period(&day, false), Granularity::Hour);

        let month = Period::new(at(0), at(0) + Duration::days(30));
        assert_eq!(Granularity::for_period(&month, false), Granularity::Day);
        assert_eq!(Granularity::for_period(&month, true), Granularity::Hour);

        let year = Period::new(at(0), at(0) + Duration::days(365));
        assert_eq!(Granularity::for_period(&year, false), Granularity::Month);
    }

    #[test]
    fn test_period_contains_is_inclusive() {
        let p = Period::new(at(0), at(6));
        assert!(p.contains(at(0)));
        assert!(p.contains(at(6)));
        assert!(!p.contains(at(7)));
        assert_eq!(p.previous_day().end, at(0));
    }

    #[test]
    fn test_entity_mode_strings() {
        assert_eq!(EntityMode::MisconfiguredResetting.to_string(), "misconfigured_resetting");
        assert_eq!("resetting".parse::<EntityMode>().unwrap(), EntityMode::Resetting);
    }

    #[test]
    fn test_zeroed_record() {
        let r = StatisticRecord::zeroed(at(0), at(1));
        assert_eq!(r.state, Some(0.0));
        assert_eq!(r.change_or_zero(), 0.0);
        assert!(r.last_reset.is_none());
    }
}

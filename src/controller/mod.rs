//! Refresh cycle: fetch statistics for the selected period, rebuild the
//! snapshot, and serve renders from it.

use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use parking_lot::RwLock;
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::config::Config;
use crate::domain::{AggregateState, EntityMode, Granularity, MeterReading, Period, StatisticRecord};
use crate::error::{ConfigError, EngineError};
use crate::power_flow::{AggregationInput, Aggregator, LiveDeltaExtrapolator};
use crate::statistics::{normalize, Co2Provider, LiveStateProvider, ModeCache, StatisticsProvider};

/// Host-side data sources
#[derive(Clone)]
pub struct Providers {
    pub statistics: Arc<dyn StatisticsProvider>,
    pub co2: Arc<dyn Co2Provider>,
    pub live: Arc<dyn LiveStateProvider>,
}

impl Providers {
    /// One source serving statistics, CO₂ and live states
    pub fn from_source<S>(source: Arc<S>) -> Self
    where
        S: StatisticsProvider + Co2Provider + LiveStateProvider + 'static,
    {
        Self {
            statistics: source.clone(),
            co2: source.clone(),
            live: source,
        }
    }
}

#[derive(Debug, Clone)]
pub struct RefreshSettings {
    pub time_zone: Tz,
    pub use_hourly: bool,
    pub fetch_timeout: Duration,
    pub live_mode: bool,
}

impl RefreshSettings {
    pub fn from_config(cfg: &Config) -> Result<Self, ConfigError> {
        Ok(Self {
            time_zone: cfg.tz()?,
            use_hourly: cfg.statistics.use_hourly,
            fetch_timeout: cfg.fetch_timeout(),
            live_mode: cfg.live_mode,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefreshOutcome {
    /// A new snapshot replaced the previous one
    Applied { buckets: usize },
    /// The period changed while fetching; results were dropped
    Stale,
}

/// Everything fetched for one refresh
struct Fetched {
    primary: HashMap<String, Vec<StatisticRecord>>,
    previous_day: HashMap<String, Vec<StatisticRecord>>,
    classification: HashMap<String, Vec<StatisticRecord>>,
    co2: Option<BTreeMap<DateTime<Utc>, f64>>,
}

pub struct EnergyFlowController {
    providers: Providers,
    aggregator: Aggregator,
    extrapolator: LiveDeltaExtrapolator,
    modes: ModeCache,
    settings: RefreshSettings,
    period: RwLock<Period>,
    generation: AtomicU64,
    snapshot: RwLock<Option<Arc<AggregateState>>>,
}

impl EnergyFlowController {
    pub fn new(
        providers: Providers,
        aggregator: Aggregator,
        settings: RefreshSettings,
        period: Period,
    ) -> Result<Self, EngineError> {
        ensure_valid(&period)?;
        let extrapolator =
            LiveDeltaExtrapolator::new(aggregator.roles().clone(), aggregator.conversion().clone());
        Ok(Self {
            providers,
            aggregator,
            extrapolator,
            modes: ModeCache::new(),
            settings,
            period: RwLock::new(period),
            generation: AtomicU64::new(0),
            snapshot: RwLock::new(None),
        })
    }

    pub fn from_config(cfg: &Config, providers: Providers, period: Period) -> anyhow::Result<Self> {
        let aggregator = Aggregator::new(cfg.entities.clone(), cfg.conversion());
        let settings = RefreshSettings::from_config(cfg)?;
        Ok(Self::new(providers, aggregator, settings, period)?)
    }

    pub fn period(&self) -> Period {
        *self.period.read()
    }

    pub fn generation(&self) -> u64 {
        self.generation.load(Ordering::SeqCst)
    }

    /// Select a new date range; refreshes still in flight for the old one
    /// will be discarded.
    pub fn set_period(&self, period: Period) -> Result<(), EngineError> {
        ensure_valid(&period)?;
        let mut current = self.period.write();
        if *current != period {
            *current = period;
            let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
            debug!(start=%period.start, end=%period.end, generation, "period changed");
        }
        Ok(())
    }

    /// Canonical snapshot from the last applied refresh
    pub fn snapshot(&self) -> Option<Arc<AggregateState>> {
        self.snapshot.read().clone()
    }

    pub fn modes(&self) -> &ModeCache {
        &self.modes
    }

    /// Snapshot for display.
    ///
    /// In live mode the in-progress delta is applied to a copy. The outage
    /// flag is read from the current states on every call.
    pub fn render(&self) -> Option<Arc<AggregateState>> {
        let snapshot = self.snapshot()?;
        let readings = self.providers.live.live_states();
        let outage = self.outage(&readings);

        if self.settings.live_mode {
            let next = self
                .extrapolator
                .extrapolate(&snapshot, snapshot.period, &readings, outage);
            return Some(Arc::new(next));
        }
        if snapshot.power_outage != outage {
            let mut flagged = (*snapshot).clone();
            flagged.power_outage = outage;
            return Some(Arc::new(flagged));
        }
        Some(snapshot)
    }

    fn outage(&self, readings: &HashMap<String, MeterReading>) -> bool {
        self.aggregator
            .roles()
            .is_power_outage(|id| readings.get(id).and_then(MeterReading::state_str))
    }

    async fn fetch(
        &self,
        period: Period,
        granularity: Granularity,
        entities: &[String],
        unclassified: &[String],
    ) -> Result<Fetched, EngineError> {
        let stats = &self.providers.statistics;
        let previous_day = period.previous_day();

        let primary = stats.fetch_statistics(period, entities, granularity);
        let tail = stats.fetch_statistics(previous_day, entities, Granularity::Hour);
        let classification = async {
            if unclassified.is_empty() {
                return Ok(HashMap::new());
            }
            stats
                .fetch_statistics(previous_day, unclassified, Granularity::Day)
                .await
        };
        let co2 = async {
            if !self.aggregator.roles().tracks_low_carbon() {
                return Ok(None);
            }
            self.providers
                .co2
                .fetch_co2_data(period, granularity)
                .await
                .map(Some)
        };

        let after = self.settings.fetch_timeout;
        let (primary, previous_day, classification, co2) = tokio::time::timeout(after, async {
            tokio::try_join!(primary, tail, classification, co2)
        })
        .await
        .map_err(|_| EngineError::Timeout {
            what: "statistics fetch",
            after,
        })??;

        Ok(Fetched {
            primary,
            previous_day,
            classification,
            co2,
        })
    }

    /// Fetch statistics for the current period and swap in a new snapshot.
    ///
    /// On error the previous snapshot stays in effect.
    pub async fn refresh(&self) -> Result<RefreshOutcome, EngineError> {
        let (period, generation) = {
            let period = self.period.read();
            (*period, self.generation.load(Ordering::SeqCst))
        };
        let granularity = Granularity::for_period(&period, self.settings.use_hourly);
        let entities = self.aggregator.roles().statistic_entities();
        let unclassified: Vec<String> = self.modes.missing(&entities).into_iter().cloned().collect();

        let mut fetched = self
            .fetch(period, granularity, &entities, &unclassified)
            .await?;

        if self.generation.load(Ordering::SeqCst) != generation {
            debug!(start=%period.start, end=%period.end, "discarding stale refresh");
            return Ok(RefreshOutcome::Stale);
        }

        for entity_id in &unclassified {
            let first = fetched
                .classification
                .get(entity_id)
                .and_then(|records| records.first());
            self.modes.classify_and_store(entity_id, first);
        }

        let modes: BTreeMap<String, EntityMode> = entities
            .iter()
            .map(|id| (id.clone(), self.modes.mode_or_default(id)))
            .collect();

        let series: HashMap<String, Vec<StatisticRecord>> = entities
            .iter()
            .map(|id| {
                let records = fetched.primary.remove(id).unwrap_or_default();
                let tail = fetched
                    .previous_day
                    .get(id)
                    .and_then(|r| r.iter().rev().find(|r| r.state.is_some()));
                let normalized = normalize(
                    id,
                    records,
                    tail,
                    &period,
                    modes[id],
                    self.settings.time_zone,
                );
                (id.clone(), normalized)
            })
            .collect();

        let readings = self.providers.live.live_states();
        let units: HashMap<String, String> = readings
            .iter()
            .filter_map(|(id, r)| Some((id.clone(), r.unit_of_measurement.clone()?)))
            .collect();

        let input = AggregationInput {
            period,
            series: &series,
            units: &units,
            co2: fetched.co2.as_ref(),
            modes: &modes,
            power_outage: self.outage(&readings),
        };
        let state = self.aggregator.aggregate(&input);
        let buckets = state.bucket_count;
        let home_electric = state.home_electric;

        let mut slot = self.snapshot.write();
        if self.generation.load(Ordering::SeqCst) != generation {
            debug!(start=%period.start, end=%period.end, "discarding stale refresh");
            return Ok(RefreshOutcome::Stale);
        }
        *slot = Some(Arc::new(state));
        drop(slot);

        info!(buckets, home_electric, granularity=?granularity, "refresh applied");
        Ok(RefreshOutcome::Applied { buckets })
    }

    /// Refresh on a fixed interval; failures are logged and retried next tick
    pub async fn run(&self, every: Duration) {
        let mut interval = tokio::time::interval(every.max(Duration::from_secs(1)));
        loop {
            interval.tick().await;
            if let Err(e) = self.refresh().await {
                warn!(error=%e, "refresh failed, keeping previous snapshot");
            }
        }
    }
}

fn ensure_valid(period: &Period) -> Result<(), EngineError> {
    if period.is_valid() {
        Ok(())
    } else {
        Err(EngineError::InvalidPeriod {
            start: period.start,
            end: period.end,
        })
    }
}

use chrono::{Duration, Timelike};
use chrono_tz::Tz;
use tracing::trace;

use crate::domain::{EntityMode, Period, StatisticRecord};

/// Repair an entity's statistic series and recompute every bucket's change.
///
/// A leading record is synthesised at `period.start` when the series is empty
/// or starts late. A totalising entity carries the previous day's tail state
/// into it; otherwise it is an all-zero placeholder, which [`last_state`]
/// never reports.
///
/// Changes are then rebuilt from consecutive states:
/// - first bucket of a local day: misconfigured entities take `change = state`,
///   others keep the reported change; the state becomes the new baseline
/// - any other bucket: `change = state - last_state`, clamped at zero unless
///   the entity is totalising
/// - a bucket without a state reports no change and leaves the baseline alone
pub fn normalize(
    entity_id: &str,
    mut records: Vec<StatisticRecord>,
    previous_day_tail: Option<&StatisticRecord>,
    period: &Period,
    mode: EntityMode,
    tz: Tz,
) -> Vec<StatisticRecord> {
    records.sort_by_key(|r| r.start);

    if records.first().map_or(true, |first| first.start > period.start) {
        let end = (period.start + Duration::hours(1)).min(period.end);
        let dummy = match previous_day_tail.and_then(|t| t.state) {
            Some(tail_state) if mode == EntityMode::Totalising => {
                let mut carried = StatisticRecord::zeroed(period.start, end);
                carried.state = Some(tail_state);
                carried.placeholder = false;
                carried
            }
            _ => StatisticRecord::zeroed(period.start, end),
        };
        trace!(entity_id, state = ?dummy.state, "synthesised leading statistic");
        records.insert(0, dummy);
    }

    let mut last_state: Option<f64> = None;
    for record in records.iter_mut() {
        let Some(state) = record.state.filter(|s| s.is_finite()) else {
            record.change = Some(0.0);
            continue;
        };

        let day_start = record.start.with_timezone(&tz).hour() == 0;
        let change = if day_start && mode == EntityMode::MisconfiguredResetting {
            state
        } else if day_start {
            record.change_or_zero()
        } else {
            match last_state {
                Some(last) => state - last,
                None => record.change_or_zero(),
            }
        };

        record.change = Some(match mode {
            EntityMode::Totalising => change,
            EntityMode::Resetting | EntityMode::MisconfiguredResetting => change.max(0.0),
        });
        last_state = Some(state);
    }

    records
}

/// Last finite state in a series, ignoring placeholders
pub fn last_state(records: &[StatisticRecord]) -> Option<f64> {
    records
        .iter()
        .rev()
        .filter(|r| !r.placeholder)
        .find_map(|r| r.state.filter(|s| s.is_finite()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{DateTime, TimeZone, Utc};

    fn at(h: i64) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 6, 1, 0, 0, 0).unwrap() + Duration::hours(h)
    }

    fn hourly(h: i64, state: Option<f64>, change: Option<f64>) -> StatisticRecord {
        StatisticRecord::new(at(h), at(h + 1), state, change)
    }

    fn day() -> Period {
        Period::new(at(0), at(24))
    }

    fn changes(records: &[StatisticRecord]) -> Vec<f64> {
        records.iter().map(|r| r.change_or_zero()).collect()
    }

    #[test]
    fn test_recomputes_changes_from_states() {
        let raw = vec![
            hourly(0, Some(100.0), Some(999.0)),
            hourly(1, Some(101.5), Some(999.0)),
            hourly(2, Some(104.0), Some(999.0)),
        ];
        let out = normalize("sensor.grid", raw, None, &day(), EntityMode::Resetting, Tz::UTC);
        assert_eq!(out.len(), 3);
        // day boundary keeps the reported change
        assert_eq!(changes(&out), vec![999.0, 1.5, 2.5]);
    }

    #[test]
    fn test_totalising_keeps_negative_change() {
        let raw = vec![hourly(0, Some(100.0), Some(0.0)), hourly(1, Some(20.0), None)];
        let out = normalize("sensor.grid", raw, None, &day(), EntityMode::Totalising, Tz::UTC);
        assert_eq!(changes(&out), vec![0.0, -80.0]);
    }

    #[test]
    fn test_resetting_clamps_negative_change() {
        let raw = vec![hourly(0, Some(100.0), Some(0.0)), hourly(1, Some(20.0), None)];
        let out = normalize("sensor.grid", raw, None, &day(), EntityMode::Resetting, Tz::UTC);
        assert_eq!(changes(&out), vec![0.0, 0.0]);
    }

    #[test]
    fn test_misconfigured_takes_state_at_day_start() {
        let raw = vec![hourly(0, Some(3.0), Some(5000.0)), hourly(1, Some(4.0), Some(1.0))];
        let out = normalize(
            "sensor.gas",
            raw,
            None,
            &day(),
            EntityMode::MisconfiguredResetting,
            Tz::UTC,
        );
        assert_eq!(changes(&out), vec![3.0, 1.0]);
    }

    #[test]
    fn test_empty_series_gets_zero_dummy() {
        let out = normalize("sensor.solar", Vec::new(), None, &day(), EntityMode::Totalising, Tz::UTC);
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].start, at(0));
        assert_eq!(out[0].state, Some(0.0));
        assert_eq!(out[0].change, Some(0.0));
        assert_eq!(last_state(&out), None);
    }

    #[test]
    fn test_late_series_carries_previous_tail() {
        let tail = StatisticRecord::new(at(-1), at(0), Some(500.0), Some(2.0));
        let raw = vec![hourly(3, Some(507.0), None)];
        let out = normalize("sensor.grid", raw, Some(&tail), &day(), EntityMode::Totalising, Tz::UTC);
        assert_eq!(out.len(), 2);
        assert_eq!(out[0].state, Some(500.0));
        assert_eq!(changes(&out), vec![0.0, 7.0]);
    }

    #[test]
    fn test_carried_tail_counts_as_last_state() {
        let tail = StatisticRecord::new(at(-1), at(0), Some(500.0), Some(2.0));
        let out = normalize("sensor.grid", Vec::new(), Some(&tail), &day(), EntityMode::Totalising, Tz::UTC);
        assert_eq!(last_state(&out), Some(500.0));
    }

    #[test]
    fn test_resetting_starts_from_zero_not_previous_tail() {
        // yesterday closed at 30; today's meter restarted and reads 2 then 5
        let tail = StatisticRecord::new(at(-1), at(0), Some(30.0), Some(1.0));
        let raw = vec![hourly(1, Some(2.0), None), hourly(2, Some(5.0), None)];
        let out = normalize("sensor.grid", raw, Some(&tail), &day(), EntityMode::Resetting, Tz::UTC);
        assert_eq!(out[0].state, Some(0.0));
        assert_eq!(changes(&out), vec![0.0, 2.0, 3.0]);
        assert_eq!(changes(&out).iter().sum::<f64>(), 5.0);
    }

    #[test]
    fn test_misconfigured_ignores_previous_tail() {
        let tail = StatisticRecord::new(at(-1), at(0), Some(500.0), Some(2.0));
        let raw = vec![hourly(3, Some(7.0), None)];
        let out = normalize(
            "sensor.grid",
            raw,
            Some(&tail),
            &day(),
            EntityMode::MisconfiguredResetting,
            Tz::UTC,
        );
        assert_eq!(out[0].state, Some(0.0));
        assert_eq!(changes(&out), vec![0.0, 7.0]);
    }

    #[test]
    fn test_null_state_is_zero_change_and_keeps_baseline() {
        let raw = vec![
            hourly(0, Some(10.0), Some(0.0)),
            hourly(1, None, Some(4.0)),
            hourly(2, Some(13.0), None),
        ];
        let out = normalize("sensor.grid", raw, None, &day(), EntityMode::Resetting, Tz::UTC);
        assert_eq!(changes(&out), vec![0.0, 0.0, 3.0]);
    }

    #[test]
    fn test_day_boundary_follows_time_zone() {
        // 22:00 UTC is local midnight in Europe/Berlin during summer time
        let raw = vec![
            hourly(0, Some(10.0), Some(0.0)),
            hourly(22, Some(50.0), Some(1.0)),
        ];
        let berlin: Tz = "Europe/Berlin".parse().unwrap();
        let out = normalize("sensor.grid", raw.clone(), None, &day(), EntityMode::Resetting, berlin);
        assert_eq!(changes(&out), vec![0.0, 1.0]);

        let out = normalize("sensor.grid", raw, None, &day(), EntityMode::Resetting, Tz::UTC);
        assert_eq!(changes(&out), vec![0.0, 40.0]);
    }

    #[test]
    fn test_unsorted_input_is_ordered() {
        let raw = vec![hourly(2, Some(12.0), None), hourly(0, Some(10.0), Some(0.0)), hourly(1, Some(11.0), None)];
        let out = normalize("sensor.grid", raw, None, &day(), EntityMode::Resetting, Tz::UTC);
        assert_eq!(changes(&out), vec![0.0, 1.0, 1.0]);
        assert_eq!(last_state(&out), Some(12.0));
    }
}

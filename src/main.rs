use anyhow::{Context, Result};
use chrono::{Duration, TimeZone, Utc};
use chrono_tz::Tz;
use energy_flow_engine::{config, controller, display, domain, statistics, telemetry};
use config::Config;
use controller::{EnergyFlowController, Providers};
use display::CardView;
use domain::Period;
use statistics::RecordedDataSource;
use std::sync::Arc;
use telemetry::init_tracing;
use tracing::{info, warn};

/// Today in `tz`, midnight to midnight
fn local_today(tz: Tz) -> Option<Period> {
    let today = Utc::now().with_timezone(&tz).date_naive();
    let midnight = |d: chrono::NaiveDate| {
        tz.from_local_datetime(&d.and_hms_opt(0, 0, 0)?)
            .earliest()
            .map(|t| t.with_timezone(&Utc))
    };
    Some(Period::new(midnight(today)?, midnight(today + Duration::days(1))?))
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    init_tracing();

    let cfg = Config::load()?;
    let tz = cfg.tz()?;

    let source = RecordedDataSource::load(&cfg.source.recording_path).await?;
    let period = local_today(tz).context("local midnight does not exist in configured time zone")?;
    let engine = Arc::new(EnergyFlowController::from_config(
        &cfg,
        Providers::from_source(Arc::new(source)),
        period,
    )?);

    info!(start=%period.start, end=%period.end, time_zone=%tz, "starting energy flow engine");

    let every = cfg.refresh_interval();
    let refresher = engine.clone();
    let refresh_task = tokio::spawn(async move { refresher.run(every).await });

    let shutdown = telemetry::shutdown_signal();
    tokio::pin!(shutdown);
    let mut ticker = tokio::time::interval(every);
    loop {
        tokio::select! {
            _ = ticker.tick() => {
                match engine.render() {
                    Some(state) => {
                        let card = CardView::new(&state, &cfg.display);
                        match serde_json::to_string(&card) {
                            Ok(json) => info!(card=%json, "render"),
                            Err(e) => warn!(error=%e, "card serialisation failed"),
                        }
                    }
                    None => info!("no snapshot yet"),
                }
            }
            _ = &mut shutdown => break,
        }
    }

    refresh_task.abort();
    warn!("shutdown complete");
    Ok(())
}

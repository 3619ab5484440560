// GT7 race-engineer service: live telemetry link, lap segmentation and lap reports.

use std::sync::atomic::AtomicU64;
use std::sync::Arc;

use tokio::sync::broadcast::error::RecvError;
use tokio::sync::{broadcast, mpsc};
use tokio::time::Instant;
use tracing::{debug, info, warn};

use gt7_race_engineer::config::AppConfig;
use gt7_race_engineer::constants::{REPORT_CHANNEL_CAP, SAMPLE_CHANNEL_CAP};
use gt7_race_engineer::tasks::{self, LapReporter, TickDriver};
use gt7_race_engineer::udp;
use telemetry_core::session::{Session, SessionConfig};

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let config = AppConfig::from_env();
    info!(?config, "starting race engineer");

    let start = Instant::now();
    let (samples_tx, samples_rx) = mpsc::channel(SAMPLE_CHANNEL_CAP);
    let transport = udp::spawn_transport(config.link.clone(), samples_tx, start);

    let (reports_tx, mut reports_rx) = broadcast::channel::<String>(REPORT_CHANNEL_CAP);
    let mut reporter = LapReporter::new(reports_tx, Arc::new(AtomicU64::new(0)), config.analysis_bins);
    let mut session = Session::new(SessionConfig::with_max_samples(config.session_max_samples));
    session.set_lap_hook(move |lap, session| reporter.on_lap(lap, session));

    tokio::spawn(async move {
        loop {
            match reports_rx.recv().await {
                Ok(payload) => debug!(%payload, "lap report published"),
                Err(RecvError::Lagged(skipped)) => warn!(skipped, "lap report consumer lagged"),
                Err(RecvError::Closed) => break,
            }
        }
    });

    let tick = tokio::spawn(tasks::tick_task(
        TickDriver::new(session),
        samples_rx,
        transport.subscribe(),
        start,
        config.tick_interval,
    ));

    if let Err(err) = tokio::signal::ctrl_c().await {
        warn!(?err, "failed to listen for ctrl-c");
    }
    info!("shutting down");

    transport.shutdown().await;
    match tick.await {
        Ok(driver) => info!(
            laps = driver.session().laps().len(),
            generation = driver.session().generation(),
            "session closed"
        ),
        Err(err) => warn!(?err, "tick driver failed"),
    }
}

// Tick driver: drains link samples into the session and runs the race engineer.
// Invariants: the session has exactly one writer, this task.

pub mod report;

use std::time::Duration;

use tokio::sync::mpsc::error::TryRecvError;
use tokio::sync::{mpsc, watch};
use tokio::time::{self, Instant, MissedTickBehavior};
use tracing::{debug, info};

use crate::app::TransportSnapshot;
use crate::utils::monotonic_ms;
use telemetry_core::events::{EngineerEvent, EventEngine};
use telemetry_core::model::{format_lap_time, RaceState, VehicleSample};
use telemetry_core::session::{Session, SessionEvents};

pub use report::{LapReport, LapReporter};

pub struct TickDriver {
    session: Session,
    engineer: EventEngine,
    race_state: RaceState,
    was_connected: Option<bool>,
    last_status: Option<String>,
}

impl TickDriver {
    pub fn new(session: Session) -> Self {
        Self {
            session,
            engineer: EventEngine::new(),
            race_state: RaceState::default(),
            was_connected: None,
            last_status: None,
        }
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    pub fn session_mut(&mut self) -> &mut Session {
        &mut self.session
    }

    pub fn race_state(&self) -> &RaceState {
        &self.race_state
    }

    pub fn ingest(&mut self, sample: VehicleSample) -> SessionEvents {
        let events = self.session.ingest(sample);
        if !events.is_empty() {
            log_session_events(&events, &self.session);
        }
        events
    }

    /// Refreshes the race state from the link and returns any new engineer callouts.
    pub fn tick(&mut self, snapshot: &TransportSnapshot, now_ms: u64) -> Vec<EngineerEvent> {
        let connected = snapshot.connected(now_ms);
        if self.was_connected != Some(connected) {
            info!(connected, peer = ?snapshot.peer, "link state changed");
            self.was_connected = Some(connected);
        }
        let status = snapshot.status_line(now_ms);
        if self.last_status.as_deref() != Some(status.as_str()) {
            debug!(%status, "link status");
            self.last_status = Some(status);
        }

        self.race_state
            .update_from(snapshot.last_sample.as_ref(), connected);
        let events = self.engineer.consume(&self.race_state);
        for event in &events {
            info!(id = %event.id, title = %event.title, speech = %event.speech, "race engineer");
        }
        events
    }
}

fn log_session_events(events: &SessionEvents, session: &Session) {
    if events.reset {
        info!(generation = session.generation(), "session reset");
    }
    if let Some(lap) = events.dropped_lap {
        debug!(lap, "lap dropped: too few valid points");
    }
    if let Some(lap) = events.finalized_lap {
        let lap_time = session
            .lap(lap)
            .and_then(|data| data.lap_time_ms)
            .unwrap_or(0);
        info!(lap, lap_time = %format_lap_time(lap_time), laps = session.laps().len(), "lap finalized");
    }
    if events.reference_changed {
        info!(
            reference_lap = ?session.reference_lap().map(|lap| lap.lap_num),
            locked = session.is_reference_locked(),
            "reference lap changed"
        );
    }
}

/// Runs until the sample feed closes, then hands the driver back.
pub async fn tick_task(
    mut driver: TickDriver,
    mut samples: mpsc::Receiver<VehicleSample>,
    snapshots: watch::Receiver<TransportSnapshot>,
    start: Instant,
    tick_interval: Duration,
) -> TickDriver {
    let mut interval = time::interval(tick_interval);
    interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        interval.tick().await;

        let mut closed = false;
        loop {
            match samples.try_recv() {
                Ok(sample) => {
                    driver.ingest(sample);
                }
                Err(TryRecvError::Empty) => break,
                Err(TryRecvError::Disconnected) => {
                    closed = true;
                    break;
                }
            }
        }

        let snapshot = snapshots.borrow().clone();
        driver.tick(&snapshot, monotonic_ms(start));

        if closed {
            info!(laps = driver.session().laps().len(), "sample feed closed, tick driver stopped");
            break;
        }
    }
    driver
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::AtomicU64;
    use std::sync::Arc;

    use tokio::sync::broadcast;

    use super::*;

    fn lap_samples(lap: i16, first_tick: u64, count: u64, last_lap_ms: i32) -> Vec<VehicleSample> {
        (first_tick..first_tick + count)
            .map(|tick| VehicleSample {
                timestamp_ms: tick * 100,
                package_id: tick as u32,
                lap,
                last_lap_ms,
                time_on_track_ms: (tick * 100) as i32,
                speed_kmh: 160.0,
                throttle: 100.0,
                fuel: 40.0,
                fuel_capacity: 100.0,
                x: 1.0 + (tick % 1_000) as f32 * 5.0,
                z: 3.0,
                in_race: true,
                ..VehicleSample::default()
            })
            .collect()
    }

    fn driver_with_reports() -> (TickDriver, broadcast::Receiver<String>) {
        let (tx, rx) = broadcast::channel(16);
        let mut reporter = LapReporter::new(tx, Arc::new(AtomicU64::new(0)), 100);
        let mut session = Session::default();
        session.set_lap_hook(move |lap, session| reporter.on_lap(lap, session));
        (TickDriver::new(session), rx)
    }

    #[test]
    fn finalized_laps_publish_reports() {
        let (mut driver, mut reports) = driver_with_reports();
        for sample in lap_samples(1, 0, 20, -1) {
            driver.ingest(sample);
        }
        for sample in lap_samples(2, 1_000, 20, 61_000) {
            driver.ingest(sample);
        }
        let events = driver.ingest(lap_samples(3, 2_000, 1, 62_500).remove(0));
        assert_eq!(events.finalized_lap, Some(2));

        let first: serde_json::Value =
            serde_json::from_str(&reports.try_recv().expect("first report")).expect("json");
        assert_eq!(first["type"], "lap_report");
        assert_eq!(first["sequence"], 1);
        assert_eq!(first["report"]["lap"], 1);
        assert_eq!(first["report"]["lap_time"], "1:01.000");
        assert_eq!(first["report"]["reference_lap"], 1);
        assert!(first["report"]["compared_lap"].is_null());
        assert!(first["report"]["total_delta_ms"].is_null());

        let second: serde_json::Value =
            serde_json::from_str(&reports.try_recv().expect("second report")).expect("json");
        assert_eq!(second["sequence"], 2);
        assert_eq!(second["report"]["lap"], 2);
        assert_eq!(second["report"]["reference_lap"], 1);
        assert_eq!(second["report"]["compared_lap"], 2);
        assert!(second["report"]["total_delta_ms"].is_number());
        assert_eq!(second["report"]["sectors_ms"].as_array().map(Vec::len), Some(3));
    }

    #[test]
    fn new_best_lap_reports_previous_lap_against_it() {
        let (mut driver, mut reports) = driver_with_reports();
        for sample in lap_samples(1, 0, 20, -1) {
            driver.ingest(sample);
        }
        for sample in lap_samples(2, 1_000, 20, 61_000) {
            driver.ingest(sample);
        }
        let events = driver.ingest(lap_samples(3, 2_000, 1, 60_000).remove(0));
        assert!(events.reference_changed);
        assert_eq!(driver.session().reference_lap().map(|lap| lap.lap_num), Some(2));

        let _first = reports.try_recv().expect("first report");
        let second: serde_json::Value =
            serde_json::from_str(&reports.try_recv().expect("second report")).expect("json");
        let report = &second["report"];
        assert_eq!(report["lap"], 2);
        assert_eq!(report["reference_lap"], 2);
        assert_eq!(report["reference_time_ms"], 60_000);
        assert_eq!(report["compared_lap"], 1);
        assert!(report["total_delta_ms"].is_number());
        assert!(report["coaching"].is_array());
    }

    #[test]
    fn tick_announces_lap_time_once() {
        let (mut driver, _reports) = driver_with_reports();
        let mut snapshot = TransportSnapshot {
            last_rx_ms: Some(1_000),
            last_sample: lap_samples(2, 10, 1, 83_456).pop(),
            ..TransportSnapshot::default()
        };

        let events = driver.tick(&snapshot, 1_200);
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].id, "lap:1:83456");
        assert!(driver.race_state().connected);
        assert!(driver.tick(&snapshot, 1_300).is_empty());

        snapshot.last_rx_ms = Some(0);
        assert!(driver.tick(&snapshot, 5_000).is_empty());
        assert!(!driver.race_state().connected);
    }

    #[tokio::test]
    async fn tick_task_drains_until_feed_closes() {
        let (driver, _reports) = driver_with_reports();
        let (samples_tx, samples_rx) = mpsc::channel(64);
        let (_snapshot_tx, snapshot_rx) = watch::channel(TransportSnapshot::default());

        let samples = lap_samples(1, 0, 15, -1)
            .into_iter()
            .chain(lap_samples(2, 100, 1, 45_000));
        for sample in samples {
            samples_tx.send(sample).await.expect("send");
        }
        drop(samples_tx);

        let driver = tick_task(
            driver,
            samples_rx,
            snapshot_rx,
            Instant::now(),
            Duration::from_millis(5),
        )
        .await;
        assert_eq!(driver.session().laps().len(), 1);
        assert_eq!(driver.session().laps()[0].lap_time_ms, Some(45_000));
    }
}

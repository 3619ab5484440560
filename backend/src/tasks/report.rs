// Per-lap coaching report, built from the session hook and published as JSON.

use std::sync::atomic::AtomicU64;
use std::sync::Arc;

use serde::Serialize;
use tokio::sync::broadcast;
use tracing::{debug, info};

use crate::constants::{REPORT_TOP_ROWS, SCHEMA_VERSION};
use crate::utils::{next_sequence, now_epoch_ms};
use telemetry_core::corners::{CornerCache, CornerConfig};
use telemetry_core::delta::{
    corner_coaching_rows, delta_profile_time_ms, sector_times_ms, CoachingConfig,
};
use telemetry_core::model::{format_lap_time, CoachingRow, LapData};
use telemetry_core::session::Session;

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct LapReport {
    pub lap: i16,
    pub lap_time_ms: Option<i32>,
    pub lap_time: String,
    pub points: usize,
    pub distance_m: f64,
    pub sectors_ms: Option<[f64; 3]>,
    pub reference_lap: Option<i16>,
    pub reference_time_ms: Option<i32>,
    /// Lap measured against the reference: this lap, or the previous completed lap when this
    /// lap just became the reference.
    pub compared_lap: Option<i16>,
    /// Time delta at the end of the compared lap against the reference; positive is slower.
    pub total_delta_ms: Option<f64>,
    pub corners: usize,
    /// Largest time loss first.
    pub coaching: Vec<CoachingRow>,
}

#[derive(Serialize)]
pub struct LapReportMessage<'a> {
    pub schema_version: &'static str,
    pub timestamp_ms: u64,
    pub sequence: u64,
    #[serde(rename = "type")]
    pub message_type: &'static str,
    pub generation: u64,
    pub report: &'a LapReport,
}

pub struct LapReporter {
    tx: broadcast::Sender<String>,
    sequence: Arc<AtomicU64>,
    corner_config: CornerConfig,
    coaching: CoachingConfig,
    cache: CornerCache,
}

impl LapReporter {
    pub fn new(tx: broadcast::Sender<String>, sequence: Arc<AtomicU64>, bins: usize) -> Self {
        Self {
            tx,
            sequence,
            corner_config: CornerConfig::with_bins(bins),
            coaching: CoachingConfig::default(),
            cache: CornerCache::new(),
        }
    }

    /// Session hook body: build, publish, log.
    pub fn on_lap(&mut self, lap: &LapData, session: &Session) {
        let report = self.build(lap, session);
        info!(
            lap = report.lap,
            lap_time = %report.lap_time,
            reference_lap = ?report.reference_lap,
            compared_lap = ?report.compared_lap,
            total_delta_ms = ?report.total_delta_ms,
            corners = report.corners,
            "lap report"
        );
        self.publish(session.generation(), &report);
    }

    pub fn build(&mut self, lap: &LapData, session: &Session) -> LapReport {
        let bins = self.corner_config.n.max(2);

        let mut report = LapReport {
            lap: lap.lap_num,
            lap_time_ms: lap.lap_time_ms,
            lap_time: format_lap_time(lap.lap_time_ms.unwrap_or(0)),
            points: lap.points.len(),
            distance_m: lap.total_distance(),
            sectors_ms: sector_times_ms(lap),
            reference_lap: None,
            reference_time_ms: None,
            compared_lap: None,
            total_delta_ms: None,
            corners: 0,
            coaching: Vec::new(),
        };

        let Some(reference) = session.reference_lap() else {
            return report;
        };
        report.reference_lap = Some(reference.lap_num);
        report.reference_time_ms = reference.lap_time_ms;

        let compared = if reference.lap_num == lap.lap_num {
            previous_lap(session, lap)
        } else {
            Some(lap)
        };
        let Some(compared) = compared else {
            return report;
        };
        let corners = self
            .cache
            .get_or_detect(session.generation(), reference, &self.corner_config);

        report.compared_lap = Some(compared.lap_num);
        report.total_delta_ms = delta_profile_time_ms(compared, reference, bins)
            .and_then(|delta| delta.last().copied());
        report.corners = corners.len();
        report.coaching = corner_coaching_rows(corners, compared, reference, bins, &self.coaching)
            .unwrap_or_default();
        report.coaching.truncate(REPORT_TOP_ROWS);
        report
    }

    /// Returns the message sequence number, or `None` if serialization failed.
    pub fn publish(&self, generation: u64, report: &LapReport) -> Option<u64> {
        let sequence = next_sequence(self.sequence.as_ref());
        let message = LapReportMessage {
            schema_version: SCHEMA_VERSION,
            timestamp_ms: now_epoch_ms(),
            sequence,
            message_type: "lap_report",
            generation,
            report,
        };
        let payload = match serde_json::to_string(&message) {
            Ok(payload) => payload,
            Err(err) => {
                debug!(?err, "lap report serialization failed");
                return None;
            }
        };
        // No subscribers is fine.
        let _ = self.tx.send(payload);
        Some(sequence)
    }
}

/// Completed lap just before `lap` in the session.
fn previous_lap<'a>(session: &'a Session, lap: &LapData) -> Option<&'a LapData> {
    let laps = session.laps();
    let idx = laps.iter().rposition(|done| done.lap_num == lap.lap_num)?;
    laps.get(idx.checked_sub(1)?)
}

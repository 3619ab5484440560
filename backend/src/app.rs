// Link snapshot, commands and the handle the rest of the service holds on the transport.

use std::net::IpAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use serde::Serialize;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::Instant;

use crate::constants::CONNECTED_WINDOW_MS;
use crate::utils::monotonic_ms;
use telemetry_core::model::VehicleSample;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub struct LinkCounters {
    pub rx_datagrams: u64,
    pub rx_valid_packets: u64,
    pub tx_heartbeats: u64,
    /// Fresh samples the tick driver could not take in time.
    pub dropped_samples: u64,
}

/// Read-only view of the link, replaced atomically by the transport worker.
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct TransportSnapshot {
    /// Last accepted packet (fresh or duplicate), on the link's monotonic clock.
    pub last_rx_ms: Option<u64>,
    /// Configured or discovered peer.
    pub peer: Option<IpAddr>,
    pub last_sender_ip: Option<IpAddr>,
    pub bound_recv_port: Option<u16>,
    pub counters: LinkCounters,
    /// Incremented once per fresh sample.
    pub telemetry_seq: u64,
    pub last_error: Option<String>,
    pub last_sample: Option<VehicleSample>,
    pub car_id: Option<i32>,
}

impl TransportSnapshot {
    pub fn connected(&self, now_ms: u64) -> bool {
        self.rx_age_ms(now_ms)
            .is_some_and(|age| age <= CONNECTED_WINDOW_MS)
    }

    pub fn rx_age_ms(&self, now_ms: u64) -> Option<u64> {
        self.last_rx_ms.map(|last| now_ms.saturating_sub(last))
    }

    /// One-line human-readable status.
    pub fn status_line(&self, now_ms: u64) -> String {
        if let Some(err) = &self.last_error {
            return err.clone();
        }
        match (self.connected(now_ms), self.peer) {
            (true, Some(peer)) => format!("Connected to {peer}"),
            (true, None) => "Connected".to_string(),
            (false, Some(peer)) => format!("Waiting for telemetry from {peer}"),
            (false, None) => "Searching for PlayStation".to_string(),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum TransportCommand {
    /// Tear down and rebuild the socket.
    Restart,
    /// Change the peer (`None` re-runs discovery); implies a restart.
    SetPeer(Option<IpAddr>),
}

pub struct TransportHandle {
    pub(crate) snapshot_rx: watch::Receiver<TransportSnapshot>,
    pub(crate) commands: mpsc::Sender<TransportCommand>,
    pub(crate) shutdown: Arc<AtomicBool>,
    pub(crate) start: Instant,
    pub(crate) worker: JoinHandle<()>,
}

impl TransportHandle {
    pub fn snapshot(&self) -> TransportSnapshot {
        self.snapshot_rx.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<TransportSnapshot> {
        self.snapshot_rx.clone()
    }

    /// Clock the worker stamps samples and `last_rx_ms` with.
    pub fn start_instant(&self) -> Instant {
        self.start
    }

    pub fn now_ms(&self) -> u64 {
        monotonic_ms(self.start)
    }

    pub fn is_connected(&self) -> bool {
        self.snapshot_rx.borrow().connected(self.now_ms())
    }

    /// Returns `false` once the worker has exited.
    pub async fn restart(&self) -> bool {
        self.commands.send(TransportCommand::Restart).await.is_ok()
    }

    pub async fn set_peer(&self, peer: Option<IpAddr>) -> bool {
        self.commands.send(TransportCommand::SetPeer(peer)).await.is_ok()
    }

    /// Flips the cooperative stop flag and waits for the worker to exit.
    pub async fn shutdown(self) {
        self.shutdown.store(true, Ordering::Relaxed);
        let _ = self.worker.await;
    }
}

// UDP transport worker: discovery, heartbeats, dedup and snapshot publication.
// Invariants: all link mutation happens inside the worker; payload bytes are never logged.

use std::net::{IpAddr, SocketAddr};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::net::UdpSocket;
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{mpsc, watch};
use tokio::time::{self, Instant};
use tracing::{debug, info, warn};

use crate::app::{TransportCommand, TransportHandle, TransportSnapshot};
use crate::config::LinkConfig;
use crate::constants::{
    BACKOFF_INITIAL_MS, BACKOFF_MAX_MS, DISCOVERY_RETRY_MS, DISCOVERY_TIMEOUT_MS, HEARTBEAT_BYTE,
    INSPECT_LOG_INTERVAL_MS, NO_DATA_WARN_MS, RECV_BUF_LEN, SOCKET_TIMEOUT_MS,
};
use crate::error::TransportError;
use crate::net::{
    bind_udp_socket, bound_port, broadcast_target, preferred_private_ipv4,
    resolve_local_ip_for_target,
};
use crate::utils::{monotonic_ms, Backoff};
use telemetry_core::crypto;
use telemetry_core::model::VehicleSample;
use telemetry_core::packet::parse_packet_meta;
use telemetry_core::parser;

/// Outcome of one inbound datagram.
#[derive(Clone, Debug, PartialEq)]
pub enum Accept {
    Rejected,
    /// Same package id as the previous packet: liveness only.
    Duplicate,
    Fresh(VehicleSample),
}

/// Pure link bookkeeping, kept apart from the socket so it can be driven directly.
#[derive(Clone, Debug, Default)]
pub struct LinkState {
    snapshot: TransportSnapshot,
    last_package_id: Option<u32>,
}

impl LinkState {
    pub fn new(peer: Option<IpAddr>) -> Self {
        Self {
            snapshot: TransportSnapshot {
                peer,
                ..TransportSnapshot::default()
            },
            last_package_id: None,
        }
    }

    pub fn snapshot(&self) -> &TransportSnapshot {
        &self.snapshot
    }

    pub fn on_datagram(&mut self, raw: &[u8], source: IpAddr, now_ms: u64) -> Accept {
        self.snapshot.counters.rx_datagrams += 1;
        self.snapshot.last_sender_ip = Some(source);

        let Some(payload) = crypto::decrypt_packet(raw) else {
            return Accept::Rejected;
        };
        let Some(meta) = parse_packet_meta(&payload) else {
            return Accept::Rejected;
        };
        if self.last_package_id == Some(meta.package_id) {
            self.snapshot.last_rx_ms = Some(now_ms);
            self.snapshot.last_error = None;
            return Accept::Duplicate;
        }
        self.last_package_id = Some(meta.package_id);

        let Some(mut sample) = parser::parse_sample(&payload) else {
            return Accept::Rejected;
        };
        sample.timestamp_ms = now_ms;

        self.snapshot.counters.rx_valid_packets += 1;
        self.snapshot.telemetry_seq += 1;
        self.snapshot.last_rx_ms = Some(now_ms);
        self.snapshot.last_error = None;
        if meta.car_id.is_some() {
            self.snapshot.car_id = meta.car_id;
        }
        self.snapshot.last_sample = Some(sample.clone());
        Accept::Fresh(sample)
    }

    /// Returns whether the message differs from the current one.
    pub fn set_error(&mut self, message: String) -> bool {
        if self.snapshot.last_error.as_deref() == Some(message.as_str()) {
            return false;
        }
        self.snapshot.last_error = Some(message);
        true
    }

    pub fn set_peer(&mut self, peer: Option<IpAddr>) {
        self.snapshot.peer = peer;
    }

    pub fn set_bound_port(&mut self, port: Option<u16>) {
        self.snapshot.bound_recv_port = port;
    }

    pub fn record_heartbeat(&mut self) {
        self.snapshot.counters.tx_heartbeats += 1;
    }

    pub fn record_dropped_sample(&mut self) {
        self.snapshot.counters.dropped_samples += 1;
    }
}

pub fn no_data_message(peer: Option<IpAddr>, recv_port: u16) -> String {
    match peer {
        Some(peer) => format!(
            "No telemetry packets from {peer}. Verify PlayStation IP, GT7 on-track state, and firewall UDP {recv_port}."
        ),
        None => format!(
            "No telemetry packets received. Set PlayStation IP manually or verify network/firewall UDP {recv_port}."
        ),
    }
}

/// Starts the worker. Fresh samples go to `samples`; the link view goes to the returned handle.
pub fn spawn_transport(
    config: LinkConfig,
    samples: mpsc::Sender<VehicleSample>,
    start: Instant,
) -> TransportHandle {
    let link = LinkState::new(config.peer);
    let (snapshot_tx, snapshot_rx) = watch::channel(link.snapshot().clone());
    let (commands_tx, commands_rx) = mpsc::channel(8);
    let shutdown = Arc::new(AtomicBool::new(false));

    let worker = Worker {
        config,
        start,
        shutdown: shutdown.clone(),
        commands: commands_rx,
        snapshot_tx,
        samples,
        link,
        backoff: Backoff::new(BACKOFF_INITIAL_MS, BACKOFF_MAX_MS),
        restart: false,
        last_inspect_log_ms: None,
    };
    let worker = tokio::spawn(worker.run());

    TransportHandle {
        snapshot_rx,
        commands: commands_tx,
        shutdown,
        start,
        worker,
    }
}

struct Worker {
    config: LinkConfig,
    start: Instant,
    shutdown: Arc<AtomicBool>,
    commands: mpsc::Receiver<TransportCommand>,
    snapshot_tx: watch::Sender<TransportSnapshot>,
    samples: mpsc::Sender<VehicleSample>,
    link: LinkState,
    backoff: Backoff,
    restart: bool,
    last_inspect_log_ms: Option<u64>,
}

impl Worker {
    async fn run(mut self) {
        info!(
            peer = ?self.config.peer,
            bind = %self.config.bind_addr,
            recv_port = self.config.recv_port,
            send_port = self.config.send_port,
            heartbeat_ms = self.config.heartbeat_interval.as_millis() as u64,
            "transport started"
        );

        while !self.stopping() {
            self.restart = false;

            let peer = match self.config.peer {
                Some(peer) => peer,
                None => match self.discover().await {
                    Ok(Some(peer)) => {
                        info!(%peer, "playstation discovered");
                        peer
                    }
                    Ok(None) => {
                        self.idle(DISCOVERY_RETRY_MS).await;
                        continue;
                    }
                    Err(err) => {
                        self.fail(err);
                        self.idle_backoff().await;
                        continue;
                    }
                },
            };
            self.link.set_peer(Some(peer));
            self.publish();

            if let Err(err) = self.stream(peer).await {
                self.fail(err);
                self.idle_backoff().await;
            }
        }

        self.link.set_bound_port(None);
        self.publish();
        info!("transport stopped");
    }

    fn stopping(&self) -> bool {
        self.shutdown.load(Ordering::Relaxed)
    }

    fn interrupted(&self) -> bool {
        self.restart || self.stopping()
    }

    fn publish(&self) {
        self.snapshot_tx.send_replace(self.link.snapshot().clone());
    }

    fn now_ms(&self) -> u64 {
        monotonic_ms(self.start)
    }

    fn apply(&mut self, command: Option<TransportCommand>) {
        match command {
            Some(TransportCommand::Restart) => {
                info!("transport restart requested");
                self.restart = true;
            }
            Some(TransportCommand::SetPeer(peer)) => {
                info!(?peer, "transport peer changed");
                self.config.peer = peer;
                self.link.set_peer(peer);
                self.restart = true;
                self.publish();
            }
            None => {
                debug!("transport handle dropped");
                self.shutdown.store(true, Ordering::Relaxed);
            }
        }
    }

    fn fail(&mut self, err: TransportError) {
        if self.link.set_error(err.to_string()) {
            warn!(?err, "transport error");
        }
        self.link.set_bound_port(None);
        self.publish();
    }

    fn report_no_data(&mut self, peer: Option<IpAddr>) {
        let message = no_data_message(peer, self.config.recv_port);
        if self.link.set_error(message) {
            warn!(peer = ?peer, recv_port = self.config.recv_port, "no telemetry packets");
            self.publish();
        }
    }

    async fn idle_backoff(&mut self) {
        let delay_ms = self.backoff.next_delay_ms();
        debug!(delay_ms, "transport retry scheduled");
        self.idle(delay_ms).await;
    }

    /// Sleeps without missing commands or the stop flag.
    async fn idle(&mut self, ms: u64) {
        let deadline = Instant::now() + Duration::from_millis(ms);
        while !self.interrupted() && Instant::now() < deadline {
            let step = deadline.min(Instant::now() + Duration::from_millis(SOCKET_TIMEOUT_MS));
            tokio::select! {
                _ = time::sleep_until(step) => {}
                command = self.commands.recv() => self.apply(command),
            }
        }
    }

    async fn send_heartbeat(&mut self, socket: &UdpSocket, target: SocketAddr) {
        match socket.send_to(&[HEARTBEAT_BYTE], target).await {
            Ok(_) => self.link.record_heartbeat(),
            Err(err) => debug!(?err, %target, "heartbeat send failed"),
        }
    }

    /// Broadcasts heartbeats until a decodable packet names the sender.
    async fn discover(&mut self) -> Result<Option<IpAddr>, TransportError> {
        let addr = SocketAddr::new(self.config.bind_addr, self.config.recv_port);
        let socket = bind_udp_socket(addr, true).await?;
        let port = bound_port(&socket, self.config.recv_port);
        self.link.set_bound_port(Some(port));
        self.publish();

        let target = broadcast_target(self.config.send_port);
        info!(%target, local_ip = ?preferred_private_ipv4(), port, "discovery started");

        let deadline = Instant::now() + Duration::from_millis(DISCOVERY_TIMEOUT_MS);
        let mut buf = [0u8; RECV_BUF_LEN];
        while !self.interrupted() && Instant::now() < deadline {
            self.send_heartbeat(&socket, target).await;
            tokio::select! {
                recv = time::timeout(Duration::from_millis(SOCKET_TIMEOUT_MS), socket.recv_from(&mut buf)) => {
                    let (len, source) = match recv {
                        Err(_) => continue,
                        Ok(result) => result.map_err(TransportError::discovery(port))?,
                    };
                    match self.accept(&buf[..len], source) {
                        Accept::Rejected => {}
                        Accept::Duplicate | Accept::Fresh(_) => {
                            self.link.set_bound_port(None);
                            return Ok(Some(source.ip()));
                        }
                    }
                }
                command = self.commands.recv() => self.apply(command),
            }
        }

        self.link.set_bound_port(None);
        if !self.interrupted() {
            self.report_no_data(None);
        }
        self.publish();
        Ok(None)
    }

    /// Heartbeats `peer` and reads telemetry until restart, shutdown or a socket error.
    async fn stream(&mut self, peer: IpAddr) -> Result<(), TransportError> {
        let addr = SocketAddr::new(self.config.bind_addr, self.config.recv_port);
        let socket = bind_udp_socket(addr, false).await?;
        let port = bound_port(&socket, self.config.recv_port);
        let target = SocketAddr::new(peer, self.config.send_port);
        self.link.set_bound_port(Some(port));
        info!(
            %target,
            port,
            local_ip = ?resolve_local_ip_for_target(target).ok(),
            "telemetry link started"
        );

        self.send_heartbeat(&socket, target).await;
        self.publish();
        let mut last_heartbeat = Instant::now();
        let mut last_rx_any = Instant::now();
        let mut buf = [0u8; RECV_BUF_LEN];

        while !self.interrupted() {
            let interval = self.config.heartbeat_interval;
            if last_heartbeat.elapsed() >= interval {
                self.send_heartbeat(&socket, target).await;
                last_heartbeat = Instant::now();
            }
            let wait = interval
                .saturating_sub(last_heartbeat.elapsed())
                .min(Duration::from_millis(SOCKET_TIMEOUT_MS))
                .max(Duration::from_millis(1));

            tokio::select! {
                recv = time::timeout(wait, socket.recv_from(&mut buf)) => match recv {
                    Err(_) => {
                        if last_rx_any.elapsed() >= Duration::from_millis(NO_DATA_WARN_MS) {
                            self.report_no_data(Some(peer));
                        }
                    }
                    Ok(result) => {
                        let (len, source) = result.map_err(TransportError::socket(port))?;
                        last_rx_any = Instant::now();
                        self.accept(&buf[..len], source);
                    }
                },
                command = self.commands.recv() => self.apply(command),
            }
        }

        self.link.set_bound_port(None);
        self.publish();
        Ok(())
    }

    fn accept(&mut self, raw: &[u8], source: SocketAddr) -> Accept {
        let now_ms = self.now_ms();
        let outcome = self.link.on_datagram(raw, source.ip(), now_ms);
        // Readers that see a sample must also see the snapshot that counted it.
        self.publish();
        if let Accept::Fresh(sample) = &outcome {
            self.backoff.reset();
            self.inspect(sample, source, now_ms);
            match self.samples.try_send(sample.clone()) {
                Ok(()) => {}
                Err(TrySendError::Full(_)) => {
                    self.link.record_dropped_sample();
                    self.publish();
                }
                Err(TrySendError::Closed(_)) => {}
            }
        }
        outcome
    }

    fn inspect(&mut self, sample: &VehicleSample, source: SocketAddr, now_ms: u64) {
        let due = self
            .last_inspect_log_ms
            .map_or(true, |last| now_ms.saturating_sub(last) >= INSPECT_LOG_INTERVAL_MS);
        if !due {
            return;
        }
        self.last_inspect_log_ms = Some(now_ms);
        debug!(
            %source,
            package_id = sample.package_id,
            lap = sample.lap,
            time_on_track_ms = sample.time_on_track_ms,
            speed_kmh = sample.speed_kmh,
            rpm = sample.rpm,
            in_race = sample.in_race,
            paused = sample.paused,
            "telemetry inspect"
        );
    }
}

// Shared constants for link timing, protocol and publication.

pub const SCHEMA_VERSION: &str = "1.0";

// Wire protocol.
pub const RECV_PORT: u16 = 33740;
pub const SEND_PORT: u16 = 33739;
pub const HEARTBEAT_BYTE: u8 = 0x41;
pub const RECV_BUF_LEN: usize = 4096;

// Heartbeat interval bounds, seconds.
pub const HEARTBEAT_INTERVAL_SECS: f64 = 1.0;
pub const HEARTBEAT_MIN_SECS: f64 = 0.05;
pub const HEARTBEAT_MAX_SECS: f64 = 1.0;

// Link timing.
pub const SOCKET_TIMEOUT_MS: u64 = 250;
pub const CONNECTED_WINDOW_MS: u64 = 1_000;
pub const NO_DATA_WARN_MS: u64 = 3_000;
pub const DISCOVERY_TIMEOUT_MS: u64 = 3_000;
pub const DISCOVERY_RETRY_MS: u64 = 500;
pub const BACKOFF_INITIAL_MS: u64 = 100;
pub const BACKOFF_MAX_MS: u64 = 2_000;
pub const INSPECT_LOG_INTERVAL_MS: u64 = 1_000;

/// `GT7_PLAYSTATION_IP` value that requests broadcast discovery.
pub const DISCOVERY_SENTINEL: &str = "AUTO";

// Tick driver and lap reports.
pub const TICK_INTERVAL_MS: u64 = 100;
pub const SAMPLE_CHANNEL_CAP: usize = 2_048;
pub const REPORT_CHANNEL_CAP: usize = 64;
pub const REPORT_TOP_ROWS: usize = 5;

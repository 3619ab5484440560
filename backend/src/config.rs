// Environment configuration for the link and the tick driver.
// Invariants: unparsable values fall back to defaults with a warning; startup never fails here.

use std::env;
use std::net::{IpAddr, Ipv4Addr};
use std::str::FromStr;
use std::time::Duration;

use tracing::warn;

use crate::constants::{
    DISCOVERY_SENTINEL, HEARTBEAT_INTERVAL_SECS, HEARTBEAT_MAX_SECS, HEARTBEAT_MIN_SECS, RECV_PORT,
    SEND_PORT, TICK_INTERVAL_MS,
};
use telemetry_core::constants::{DEFAULT_BINS, SAMPLE_RING_CAP};

#[derive(Clone, Debug, PartialEq)]
pub struct LinkConfig {
    /// `None` runs broadcast discovery before every connection attempt.
    pub peer: Option<IpAddr>,
    pub bind_addr: IpAddr,
    pub recv_port: u16,
    pub send_port: u16,
    pub heartbeat_interval: Duration,
}

impl Default for LinkConfig {
    fn default() -> Self {
        Self {
            peer: None,
            bind_addr: IpAddr::V4(Ipv4Addr::UNSPECIFIED),
            recv_port: RECV_PORT,
            send_port: SEND_PORT,
            heartbeat_interval: clamp_heartbeat(HEARTBEAT_INTERVAL_SECS),
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct AppConfig {
    pub link: LinkConfig,
    pub session_max_samples: usize,
    pub analysis_bins: usize,
    pub tick_interval: Duration,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            link: LinkConfig::default(),
            session_max_samples: SAMPLE_RING_CAP,
            analysis_bins: DEFAULT_BINS,
            tick_interval: Duration::from_millis(TICK_INTERVAL_MS),
        }
    }
}

impl AppConfig {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();
        let heartbeat_secs = parse_or(&lookup, "GT7_HEARTBEAT_INTERVAL_S", HEARTBEAT_INTERVAL_SECS);

        Self {
            link: LinkConfig {
                peer: parse_peer(lookup("GT7_PLAYSTATION_IP").as_deref()),
                bind_addr: parse_or(&lookup, "GT7_UDP_BIND", defaults.link.bind_addr),
                recv_port: parse_or(&lookup, "GT7_RECV_PORT", defaults.link.recv_port),
                send_port: parse_or(&lookup, "GT7_SEND_PORT", defaults.link.send_port),
                heartbeat_interval: clamp_heartbeat(heartbeat_secs),
            },
            session_max_samples: parse_or(&lookup, "SESSION_MAX_SAMPLES", defaults.session_max_samples)
                .max(1),
            analysis_bins: parse_or(&lookup, "ANALYSIS_N_BINS", defaults.analysis_bins).max(2),
            tick_interval: Duration::from_millis(
                parse_or(&lookup, "TICK_INTERVAL_MS", TICK_INTERVAL_MS).max(1),
            ),
        }
    }
}

/// Empty or `AUTO` (any case) selects discovery.
pub fn parse_peer(value: Option<&str>) -> Option<IpAddr> {
    let value = value.map(str::trim).unwrap_or_default();
    if value.is_empty() || value.eq_ignore_ascii_case(DISCOVERY_SENTINEL) {
        return None;
    }
    match value.parse::<IpAddr>() {
        Ok(ip) => Some(ip),
        Err(err) => {
            warn!(%value, ?err, "invalid GT7_PLAYSTATION_IP, using discovery");
            None
        }
    }
}

pub fn clamp_heartbeat(secs: f64) -> Duration {
    let secs = if secs.is_finite() {
        secs.clamp(HEARTBEAT_MIN_SECS, HEARTBEAT_MAX_SECS)
    } else {
        HEARTBEAT_INTERVAL_SECS
    };
    Duration::from_secs_f64(secs)
}

fn parse_or<F, T>(lookup: &F, key: &str, default: T) -> T
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
{
    let Some(raw) = lookup(key) else {
        return default;
    };
    let raw = raw.trim();
    if raw.is_empty() {
        return default;
    }
    match raw.parse::<T>() {
        Ok(value) => value,
        Err(_) => {
            warn!(key, value = raw, "invalid config value, using default");
            default
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn defaults_without_environment() {
        let config = AppConfig::from_lookup(lookup(&[]));
        assert_eq!(config, AppConfig::default());
        assert_eq!(config.link.peer, None);
        assert_eq!(config.link.recv_port, 33740);
        assert_eq!(config.link.send_port, 33739);
        assert_eq!(config.link.heartbeat_interval, Duration::from_secs(1));
        assert_eq!(config.session_max_samples, 6_000);
        assert_eq!(config.analysis_bins, 300);
    }

    #[test]
    fn reads_overrides() {
        let config = AppConfig::from_lookup(lookup(&[
            ("GT7_PLAYSTATION_IP", "192.168.1.40"),
            ("GT7_UDP_BIND", "127.0.0.1"),
            ("GT7_RECV_PORT", "40000"),
            ("GT7_HEARTBEAT_INTERVAL_S", "0.5"),
            ("ANALYSIS_N_BINS", "120"),
        ]));
        assert_eq!(config.link.peer, Some("192.168.1.40".parse().expect("ip")));
        assert_eq!(config.link.bind_addr, IpAddr::V4(Ipv4Addr::LOCALHOST));
        assert_eq!(config.link.recv_port, 40_000);
        assert_eq!(config.link.heartbeat_interval, Duration::from_millis(500));
        assert_eq!(config.analysis_bins, 120);
    }

    #[test]
    fn heartbeat_is_clamped() {
        assert_eq!(clamp_heartbeat(0.001), Duration::from_millis(50));
        assert_eq!(clamp_heartbeat(30.0), Duration::from_secs(1));
        assert_eq!(clamp_heartbeat(f64::NAN), Duration::from_secs(1));
    }

    #[test]
    fn auto_and_garbage_select_discovery() {
        assert_eq!(parse_peer(Some("AUTO")), None);
        assert_eq!(parse_peer(Some(" auto ")), None);
        assert_eq!(parse_peer(Some("")), None);
        assert_eq!(parse_peer(Some("not-an-ip")), None);
        assert_eq!(parse_peer(None), None);
    }

    #[test]
    fn bad_numbers_fall_back() {
        let config = AppConfig::from_lookup(lookup(&[
            ("GT7_RECV_PORT", "99999"),
            ("TICK_INTERVAL_MS", "soon"),
            ("ANALYSIS_N_BINS", "0"),
        ]));
        assert_eq!(config.link.recv_port, 33740);
        assert_eq!(config.tick_interval, Duration::from_millis(100));
        assert_eq!(config.analysis_bins, 2);
    }
}

// Network helper functions for the telemetry and heartbeat socket.

use std::net::{IpAddr, Ipv4Addr, SocketAddr};

use if_addrs::get_if_addrs;
use tokio::net::UdpSocket;

use crate::error::TransportError;

pub async fn bind_udp_socket(addr: SocketAddr, broadcast: bool) -> Result<UdpSocket, TransportError> {
    let socket = UdpSocket::bind(addr)
        .await
        .map_err(|source| TransportError::Bind { addr, source })?;
    if broadcast {
        socket
            .set_broadcast(true)
            .map_err(TransportError::discovery(addr.port()))?;
    }
    Ok(socket)
}

pub fn bound_port(socket: &UdpSocket, fallback: u16) -> u16 {
    socket
        .local_addr()
        .map(|addr| addr.port())
        .unwrap_or(fallback)
}

pub fn broadcast_target(send_port: u16) -> SocketAddr {
    SocketAddr::new(IpAddr::V4(Ipv4Addr::BROADCAST), send_port)
}

/// Local address the OS would route towards `target`; no packet is sent.
pub fn resolve_local_ip_for_target(target: SocketAddr) -> std::io::Result<IpAddr> {
    let socket = std::net::UdpSocket::bind(("0.0.0.0", 0))?;
    socket.connect(target)?;
    Ok(socket.local_addr()?.ip())
}

pub fn preferred_private_ipv4() -> Option<IpAddr> {
    let ifaces = get_if_addrs().ok()?;
    for iface in ifaces {
        if let if_addrs::IfAddr::V4(v4) = iface.addr {
            let ip = v4.ip;
            if is_private_ipv4(ip) && !ip.is_loopback() && !ip.is_link_local() {
                return Some(IpAddr::V4(ip));
            }
        }
    }
    None
}

pub fn is_private_ipv4(ip: Ipv4Addr) -> bool {
    let octets = ip.octets();
    match octets {
        [10, ..] => true,
        [172, second, ..] if (16..=31).contains(&second) => true,
        [192, 168, ..] => true,
        _ => false,
    }
}

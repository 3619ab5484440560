use std::io;
use std::net::SocketAddr;

use thiserror::Error;

/// Failures inside the transport worker. They never leave the worker: each one becomes the
/// link's `last_error` text and a socket rebuild.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("failed to bind UDP {addr}: {source}")]
    Bind {
        addr: SocketAddr,
        #[source]
        source: io::Error,
    },

    #[error("socket error on UDP {port}: {source}")]
    Socket {
        port: u16,
        #[source]
        source: io::Error,
    },

    #[error("discovery socket error on UDP {port}: {source}")]
    Discovery {
        port: u16,
        #[source]
        source: io::Error,
    },
}

impl TransportError {
    pub(crate) fn socket(port: u16) -> impl FnOnce(io::Error) -> Self {
        move |source| Self::Socket { port, source }
    }

    pub(crate) fn discovery(port: u16) -> impl FnOnce(io::Error) -> Self {
        move |source| Self::Discovery { port, source }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn messages_name_the_port() {
        let err = TransportError::socket(33740)(io::Error::other("boom"));
        assert_eq!(err.to_string(), "socket error on UDP 33740: boom");

        let addr: SocketAddr = "0.0.0.0:33740".parse().expect("addr");
        let err = TransportError::Bind {
            addr,
            source: io::Error::from(io::ErrorKind::AddrInUse),
        };
        assert!(err.to_string().starts_with("failed to bind UDP 0.0.0.0:33740"));
    }
}

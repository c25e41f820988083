//! Peer identity — the (host, port) a peer is connected from.

use std::fmt;
use std::net::{IpAddr, SocketAddr};
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Identifies a connected peer for the lifetime of its connection.
///
/// Used as the file registry key. Two connections from the same host on
/// different ports are different peers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PeerIdentity {
    pub host: IpAddr,
    pub port: u16,
}

impl PeerIdentity {
    pub fn new(host: IpAddr, port: u16) -> Self {
        Self { host, port }
    }

    pub fn socket_addr(&self) -> SocketAddr {
        SocketAddr::new(self.host, self.port)
    }
}

impl From<SocketAddr> for PeerIdentity {
    fn from(addr: SocketAddr) -> Self {
        Self {
            host: addr.ip(),
            port: addr.port(),
        }
    }
}

impl fmt::Display for PeerIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // SocketAddr brackets IPv6 hosts so the text parses back.
        write!(f, "{}", self.socket_addr())
    }
}

impl FromStr for PeerIdentity {
    type Err = std::net::AddrParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.parse::<SocketAddr>().map(Self::from)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_parses_back() {
        for text in ["127.0.0.1:5000", "[::1]:6000"] {
            let peer: PeerIdentity = text.parse().unwrap();
            assert_eq!(peer.to_string(), text);
        }
    }

    #[test]
    fn same_host_different_port_are_distinct() {
        let a: PeerIdentity = "10.0.0.1:4000".parse().unwrap();
        let b: PeerIdentity = "10.0.0.1:4001".parse().unwrap();
        assert_ne!(a, b);
    }
}

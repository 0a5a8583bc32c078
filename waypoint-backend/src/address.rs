use axum::http::HeaderMap;
use std::fmt;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::str::FromStr;
use thiserror::Error;

#[derive(Debug, Error, PartialEq)]
pub enum AddressError {
    #[error("address must be an IPv4 ip:port pair")]
    Malformed,
}

/// A game server's self-reported address: IPv4 dotted quad plus port.
///
/// This is the Directory key. Parsing is strict so that two spellings of the
/// same address cannot coexist as separate entries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ServerAddress {
    pub ip: Ipv4Addr,
    pub port: u16,
}

impl FromStr for ServerAddress {
    type Err = AddressError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (ip, port) = s.split_once(':').ok_or(AddressError::Malformed)?;
        let ip = Ipv4Addr::from_str(ip).map_err(|_| AddressError::Malformed)?;
        let port = port.parse::<u16>().map_err(|_| AddressError::Malformed)?;
        Ok(Self { ip, port })
    }
}

impl fmt::Display for ServerAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.ip, self.port)
    }
}

impl ServerAddress {
    /// Whether the claimed IP is plausible for the observed peer.
    ///
    /// Loopback and unspecified peers are exempt: those are local bridges,
    /// reverse proxies on the same host, or test harnesses, and their
    /// observed address says nothing about the server's public one.
    pub fn matches_peer(&self, peer: IpAddr) -> bool {
        let peer = match peer {
            IpAddr::V4(v4) => v4,
            IpAddr::V6(v6) => match v6.to_ipv4_mapped() {
                Some(v4) => v4,
                None => return v6.is_loopback() || v6.is_unspecified(),
            },
        };
        peer.is_loopback() || peer.is_unspecified() || peer == self.ip
    }
}

/// Resolve the caller's IP the same way the rate limiter does:
/// `x-forwarded-for` first (left-most hop), then the socket peer address.
/// Returns `None` when neither is available, in which case the peer check
/// is skipped rather than failed.
pub fn client_ip(headers: &HeaderMap, peer: Option<SocketAddr>) -> Option<IpAddr> {
    headers
        .get("x-forwarded-for")
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.split(',').next())
        .and_then(|first| first.trim().parse::<IpAddr>().ok())
        .or_else(|| peer.map(|addr| addr.ip()))
}

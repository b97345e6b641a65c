//! Client address resolution.
//!
//! The client is whoever the PROXY header names, or the socket peer when
//! there is none. `X-Forwarded-For`, `-Proto` and `-Host` are honoured
//! only when that client is a trusted proxy; from anyone else they are
//! ignored, since any client can send them.

use std::fmt;
use std::net::{IpAddr, SocketAddr};
use std::str::FromStr;

use hermes_core::ConnectionInfo;
use http::header::{HeaderMap, HOST};
use thiserror::Error;

use crate::proxy::ProxyHeader;

/// `X-Forwarded-For`.
pub const X_FORWARDED_FOR: &str = "x-forwarded-for";
/// `X-Forwarded-Proto`.
pub const X_FORWARDED_PROTO: &str = "x-forwarded-proto";
/// `X-Forwarded-Host`.
pub const X_FORWARDED_HOST: &str = "x-forwarded-host";

/// A trusted proxy address or network, such as `10.0.0.7` or `10.0.0.0/8`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TrustedProxy {
    network: IpAddr,
    prefix: u8,
}

/// A trusted proxy entry that does not parse.
#[derive(Debug, Clone, Error)]
#[error("invalid trusted proxy `{input}`: {reason}")]
pub struct InvalidTrustedProxy {
    input: String,
    reason: &'static str,
}

impl TrustedProxy {
    /// A single address.
    #[must_use]
    pub fn addr(ip: IpAddr) -> Self {
        let ip = ip.to_canonical();
        let prefix = if ip.is_ipv4() { 32 } else { 128 };
        Self { network: ip, prefix }
    }

    /// Returns true if `ip` falls inside this entry.
    #[must_use]
    pub fn contains(&self, ip: IpAddr) -> bool {
        match (self.network, ip.to_canonical()) {
            (IpAddr::V4(network), IpAddr::V4(ip)) => {
                let mask = u32::MAX.checked_shl(32 - u32::from(self.prefix)).unwrap_or(0);
                u32::from(network) & mask == u32::from(ip) & mask
            }
            (IpAddr::V6(network), IpAddr::V6(ip)) => {
                let mask = u128::MAX.checked_shl(128 - u32::from(self.prefix)).unwrap_or(0);
                u128::from(network) & mask == u128::from(ip) & mask
            }
            _ => false,
        }
    }
}

impl FromStr for TrustedProxy {
    type Err = InvalidTrustedProxy;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = |reason| InvalidTrustedProxy {
            input: s.to_string(),
            reason,
        };
        let (addr, prefix) = match s.trim().split_once('/') {
            Some((addr, prefix)) => (addr, Some(prefix)),
            None => (s.trim(), None),
        };
        let network: IpAddr = addr.parse().map_err(|_| invalid("not an IP address"))?;
        let proxy = Self::addr(network);
        let Some(prefix) = prefix else {
            return Ok(proxy);
        };
        let prefix: u8 = prefix.parse().map_err(|_| invalid("prefix is not a number"))?;
        if prefix > proxy.prefix {
            return Err(invalid("prefix longer than the address"));
        }
        Ok(Self {
            network: proxy.network,
            prefix,
        })
    }
}

impl fmt::Display for TrustedProxy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.network, self.prefix)
    }
}

fn is_trusted(ip: IpAddr, trusted: &[TrustedProxy]) -> bool {
    trusted.iter().any(|proxy| proxy.contains(ip))
}

/// Works out who the request came from.
pub fn resolve(
    peer: SocketAddr,
    proxied: Option<&ProxyHeader>,
    headers: &HeaderMap,
    trusted: &[TrustedProxy],
) -> ConnectionInfo {
    let mut info = ConnectionInfo::direct(peer);
    let client = proxied.and_then(|header| header.source).unwrap_or(peer);
    info.client_addr = Some(client);
    info.host = first_value(headers, HOST.as_str()).map(str::to_string);

    if !is_trusted(client.ip(), trusted) {
        return info;
    }

    if let Some(forwarded) = forwarded_client(headers, trusted) {
        info.client_addr = Some(forwarded);
    }
    if let Some(proto) = first_value(headers, X_FORWARDED_PROTO) {
        let proto = proto.to_ascii_lowercase();
        if proto == "http" || proto == "https" {
            info.scheme = proto;
        }
    }
    if let Some(host) = first_value(headers, X_FORWARDED_HOST) {
        info.host = Some(host.to_string());
    }
    info
}

// The rightmost hop that is not itself a trusted proxy; the leftmost entry
// when every hop is trusted.
fn forwarded_client(headers: &HeaderMap, trusted: &[TrustedProxy]) -> Option<SocketAddr> {
    let hops: Vec<SocketAddr> = headers
        .get_all(X_FORWARDED_FOR)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|value| value.split(','))
        .filter_map(parse_hop)
        .collect();

    hops.iter()
        .rev()
        .find(|hop| !is_trusted(hop.ip(), trusted))
        .or_else(|| hops.first())
        .copied()
}

fn parse_hop(hop: &str) -> Option<SocketAddr> {
    let hop = hop.trim();
    hop.parse::<SocketAddr>()
        .ok()
        .or_else(|| {
            hop.trim_start_matches('[')
                .trim_end_matches(']')
                .parse::<IpAddr>()
                .ok()
                .map(|ip| SocketAddr::new(ip, 0))
        })
}

fn first_value<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers
        .get(name)?
        .to_str()
        .ok()?
        .split(',')
        .next()
        .map(str::trim)
        .filter(|value| !value.is_empty())
}

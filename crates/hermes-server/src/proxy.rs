//! HAProxy PROXY protocol, versions 1 and 2.
//!
//! A load balancer speaking the PROXY protocol prefixes each connection
//! with a header naming the original client. [`read_header`] consumes that
//! header and hands back any bytes read past it; wrap the stream in
//! [`Rewind`] so the HTTP layer sees them first.
//!
//! ```text
//! v1: PROXY TCP4 192.0.2.1 198.51.100.1 56324 443\r\n      (at most 107 bytes)
//! v2: \r\n\r\n\0\r\nQUIT\n | ver/cmd | fam | len (u16 BE) | addresses | TLVs
//! ```

use std::io;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr};
use std::pin::Pin;
use std::task::{Context, Poll};
use std::time::Duration;

use bytes::{Buf, Bytes, BytesMut};
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, ReadBuf};

use crate::config::ProxyProtocolMode;

/// First bytes of a v1 header.
pub const V1_PREFIX: &[u8] = b"PROXY ";

/// Longest v1 header, CRLF included.
pub const V1_MAX_LEN: usize = 107;

/// The 12-byte v2 signature.
pub const V2_SIGNATURE: [u8; 12] = *b"\r\n\r\n\0\r\nQUIT\n";

/// Fixed part of a v2 header: signature, version/command, family, length.
pub const V2_FIXED_LEN: usize = 16;

/// Largest v2 address block accepted.
pub const V2_MAX_ADDRESS_LEN: usize = 4096;

const V2_CMD_LOCAL: u8 = 0x0;
const V2_CMD_PROXY: u8 = 0x1;
const V2_AF_UNSPEC: u8 = 0x0;
const V2_AF_INET: u8 = 0x1;
const V2_AF_INET6: u8 = 0x2;
const V2_AF_UNIX: u8 = 0x3;

/// Protocol version of a parsed header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProxyVersion {
    /// Text header.
    V1,
    /// Binary header.
    V2,
}

/// A parsed PROXY header.
///
/// Addresses are absent for `UNKNOWN` (v1), `LOCAL` (v2) and address
/// families that carry no IP endpoint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProxyHeader {
    /// Which version was on the wire.
    pub version: ProxyVersion,
    /// The original client.
    pub source: Option<SocketAddr>,
    /// The address the client connected to.
    pub destination: Option<SocketAddr>,
}

/// PROXY header failures. The connection is dropped on any of them.
#[derive(Debug, Error)]
pub enum ProxyError {
    /// A header is required but the stream starts with something else.
    #[error("connection does not start with a PROXY header")]
    Missing,

    /// The peer closed the connection mid-header.
    #[error("connection closed before the PROXY header was complete")]
    Truncated,

    /// The v1 header is malformed.
    #[error("malformed PROXY v1 header: {0}")]
    InvalidV1(String),

    /// The v2 header is malformed.
    #[error("malformed PROXY v2 header: {0}")]
    InvalidV2(String),

    /// The header did not arrive in time.
    #[error("no PROXY header within {0:?}")]
    Timeout(Duration),

    /// Reading from the socket failed.
    #[error(transparent)]
    Io(#[from] io::Error),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Detected {
    NeedMore,
    Absent,
    V1,
    V2,
}

#[derive(PartialEq, Eq)]
enum Prefix {
    Mismatch,
    Partial,
    Full,
}

fn prefix_of(buf: &[u8], signature: &[u8]) -> Prefix {
    let n = buf.len().min(signature.len());
    if buf[..n] != signature[..n] {
        Prefix::Mismatch
    } else if n == signature.len() {
        Prefix::Full
    } else {
        Prefix::Partial
    }
}

fn detect(buf: &[u8]) -> Detected {
    match (prefix_of(buf, V1_PREFIX), prefix_of(buf, &V2_SIGNATURE)) {
        (Prefix::Full, _) => Detected::V1,
        (_, Prefix::Full) => Detected::V2,
        (Prefix::Mismatch, Prefix::Mismatch) => Detected::Absent,
        _ => Detected::NeedMore,
    }
}

/// Reads the PROXY header, if any, from the start of `io`.
///
/// Returns the header and the bytes read past it. With
/// [`ProxyProtocolMode::Auto`] a stream that does not start with either
/// signature yields `None` and every byte read so far.
pub async fn read_header<IO>(
    io: &mut IO,
    mode: ProxyProtocolMode,
) -> Result<(Option<ProxyHeader>, Bytes), ProxyError>
where
    IO: AsyncRead + Unpin,
{
    if mode == ProxyProtocolMode::Disabled {
        return Ok((None, Bytes::new()));
    }

    let mut buf = BytesMut::with_capacity(V1_MAX_LEN);
    loop {
        let detected = detect(&buf);
        let parsed = match detected {
            Detected::Absent if mode == ProxyProtocolMode::Enabled => {
                return Err(ProxyError::Missing)
            }
            Detected::Absent => return Ok((None, buf.freeze())),
            Detected::NeedMore => None,
            Detected::V1 => parse_v1(&buf)?,
            Detected::V2 => parse_v2(&buf)?,
        };

        if let Some((header, consumed)) = parsed {
            buf.advance(consumed);
            return Ok((Some(header), buf.freeze()));
        }

        if io.read_buf(&mut buf).await? == 0 {
            return match (mode, detected) {
                (ProxyProtocolMode::Auto, Detected::NeedMore) => Ok((None, buf.freeze())),
                _ => Err(ProxyError::Truncated),
            };
        }
    }
}

/// Parses a v1 header at the start of `buf`.
///
/// Returns `None` until the terminating CRLF has arrived, and the header
/// with its length once it has.
pub fn parse_v1(buf: &[u8]) -> Result<Option<(ProxyHeader, usize)>, ProxyError> {
    let window = &buf[..buf.len().min(V1_MAX_LEN)];
    let Some(end) = window.windows(2).position(|pair| pair == b"\r\n") else {
        return if buf.len() >= V1_MAX_LEN {
            Err(ProxyError::InvalidV1(format!("no CRLF within {V1_MAX_LEN} bytes")))
        } else {
            Ok(None)
        };
    };

    let line = std::str::from_utf8(&buf[..end])
        .map_err(|_| ProxyError::InvalidV1("header is not ASCII".to_string()))?;
    let mut fields = line.split(' ');
    if fields.next() != Some("PROXY") {
        return Err(ProxyError::InvalidV1("missing PROXY keyword".to_string()));
    }

    let (source, destination) = match fields.next() {
        Some("UNKNOWN") => (None, None),
        Some(protocol @ ("TCP4" | "TCP6")) => {
            let rest: Vec<&str> = fields.collect();
            let [src, dst, src_port, dst_port] = rest[..] else {
                return Err(ProxyError::InvalidV1(format!(
                    "expected 4 address fields, found {}",
                    rest.len()
                )));
            };
            let v4 = protocol == "TCP4";
            (
                Some(v1_endpoint(src, src_port, v4)?),
                Some(v1_endpoint(dst, dst_port, v4)?),
            )
        }
        Some(other) => {
            return Err(ProxyError::InvalidV1(format!("unknown protocol `{other}`")))
        }
        None => return Err(ProxyError::InvalidV1("missing protocol".to_string())),
    };

    Ok(Some((
        ProxyHeader {
            version: ProxyVersion::V1,
            source,
            destination,
        },
        end + 2,
    )))
}

fn v1_endpoint(ip: &str, port: &str, v4: bool) -> Result<SocketAddr, ProxyError> {
    let ip: IpAddr = ip
        .parse()
        .map_err(|_| ProxyError::InvalidV1(format!("invalid address `{ip}`")))?;
    if ip.is_ipv4() != v4 {
        return Err(ProxyError::InvalidV1(format!(
            "address `{ip}` does not match the declared family"
        )));
    }
    let port: u16 = port
        .parse()
        .map_err(|_| ProxyError::InvalidV1(format!("invalid port `{port}`")))?;
    Ok(SocketAddr::new(ip, port))
}

/// Parses a v2 header at the start of `buf`.
///
/// Returns `None` until the whole address block has arrived. TLVs after
/// the addresses are skipped.
pub fn parse_v2(buf: &[u8]) -> Result<Option<(ProxyHeader, usize)>, ProxyError> {
    if buf.len() < V2_FIXED_LEN {
        return Ok(None);
    }

    let version = buf[12] >> 4;
    let command = buf[12] & 0x0F;
    if version != 2 {
        return Err(ProxyError::InvalidV2(format!("unsupported version {version}")));
    }
    if command != V2_CMD_LOCAL && command != V2_CMD_PROXY {
        return Err(ProxyError::InvalidV2(format!("unknown command {command:#x}")));
    }

    let family = buf[13] >> 4;
    let len = usize::from(u16::from_be_bytes([buf[14], buf[15]]));
    if len > V2_MAX_ADDRESS_LEN {
        return Err(ProxyError::InvalidV2(format!(
            "address block of {len} bytes exceeds {V2_MAX_ADDRESS_LEN}"
        )));
    }
    let total = V2_FIXED_LEN + len;
    if buf.len() < total {
        return Ok(None);
    }
    let block = &buf[V2_FIXED_LEN..total];

    let (source, destination) = if command == V2_CMD_LOCAL {
        (None, None)
    } else {
        match family {
            V2_AF_INET => {
                let block = address_block(block, 12)?;
                let src = Ipv4Addr::new(block[0], block[1], block[2], block[3]);
                let dst = Ipv4Addr::new(block[4], block[5], block[6], block[7]);
                (
                    Some(SocketAddr::new(src.into(), port_at(block, 8))),
                    Some(SocketAddr::new(dst.into(), port_at(block, 10))),
                )
            }
            V2_AF_INET6 => {
                let block = address_block(block, 36)?;
                let src = ipv6_at(block, 0);
                let dst = ipv6_at(block, 16);
                (
                    Some(SocketAddr::new(src.into(), port_at(block, 32))),
                    Some(SocketAddr::new(dst.into(), port_at(block, 34))),
                )
            }
            V2_AF_UNSPEC | V2_AF_UNIX => (None, None),
            other => {
                return Err(ProxyError::InvalidV2(format!(
                    "unknown address family {other:#x}"
                )))
            }
        }
    };

    Ok(Some((
        ProxyHeader {
            version: ProxyVersion::V2,
            source,
            destination,
        },
        total,
    )))
}

fn address_block(block: &[u8], needed: usize) -> Result<&[u8], ProxyError> {
    block.get(..needed).ok_or_else(|| {
        ProxyError::InvalidV2(format!(
            "address block of {} bytes, expected at least {needed}",
            block.len()
        ))
    })
}

fn port_at(block: &[u8], offset: usize) -> u16 {
    u16::from_be_bytes([block[offset], block[offset + 1]])
}

fn ipv6_at(block: &[u8], offset: usize) -> Ipv6Addr {
    let mut octets = [0u8; 16];
    octets.copy_from_slice(&block[offset..offset + 16]);
    Ipv6Addr::from(octets)
}

/// A stream that yields `prefix` before reading from the inner stream.
#[derive(Debug)]
pub struct Rewind<IO> {
    prefix: Bytes,
    inner: IO,
}

impl<IO> Rewind<IO> {
    /// Replays `prefix`, then reads `inner`.
    pub fn new(inner: IO, prefix: Bytes) -> Self {
        Self { prefix, inner }
    }

    /// Bytes not yet replayed.
    #[must_use]
    pub fn pending(&self) -> &[u8] {
        &self.prefix
    }

    /// The wrapped stream. Unreplayed bytes are lost.
    pub fn into_inner(self) -> IO {
        self.inner
    }
}

impl<IO: AsyncRead + Unpin> AsyncRead for Rewind<IO> {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        let this = self.get_mut();
        if !this.prefix.is_empty() && buf.remaining() > 0 {
            let n = this.prefix.len().min(buf.remaining());
            buf.put_slice(&this.prefix.split_to(n));
            return Poll::Ready(Ok(()));
        }
        Pin::new(&mut this.inner).poll_read(cx, buf)
    }
}

impl<IO: AsyncWrite + Unpin> AsyncWrite for Rewind<IO> {
    fn poll_write(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        Pin::new(&mut self.get_mut().inner).poll_write(cx, buf)
    }

    fn poll_write_vectored(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        bufs: &[io::IoSlice<'_>],
    ) -> Poll<io::Result<usize>> {
        Pin::new(&mut self.get_mut().inner).poll_write_vectored(cx, bufs)
    }

    fn is_write_vectored(&self) -> bool {
        self.inner.is_write_vectored()
    }

    fn poll_flush(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.get_mut().inner).poll_flush(cx)
    }

    fn poll_shutdown(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.get_mut().inner).poll_shutdown(cx)
    }
}

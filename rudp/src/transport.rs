//! Datagram transport abstraction.
//!
//! The engines only ever talk to a [`Transport`]: send one frame, or wait a
//! bounded time for one frame.  [`UdpTransport`] is the real implementation,
//! a thin wrapper around `tokio::net::UdpSocket`; tests plug in the in-memory
//! link from [`crate::simulator`] instead.  All protocol logic lives
//! elsewhere; this module owns only byte I/O.

use std::io;
use std::net::SocketAddr;
use std::time::Duration;

use thiserror::Error;
use tokio::net::UdpSocket;
use tokio::time::timeout;

/// Maximum UDP payload size (theoretical limit; in practice kept much smaller).
const MAX_DATAGRAM: usize = 65_535;

// ---------------------------------------------------------------------------
// Error type
// ---------------------------------------------------------------------------

/// Transport-level faults.  These are fatal to a transfer.
#[derive(Debug, Error)]
pub enum TransportError {
    /// Underlying I/O error from the OS.
    #[error("socket I/O error: {0}")]
    Io(#[from] io::Error),
    /// `send` was called before a peer address was known.
    #[error("transport has no peer to send to")]
    NotConnected,
    /// The other end of an in-memory link is gone.
    #[error("link closed")]
    Closed,
}

// ---------------------------------------------------------------------------
// Trait
// ---------------------------------------------------------------------------

/// Frame-oriented, unreliable datagram channel to a single peer.
///
/// Implementations deliver whatever bytes arrive, verbatim, with no
/// reassembly or validation.
#[allow(async_fn_in_trait)]
pub trait Transport {
    /// Send one frame to the peer.
    async fn send(&mut self, frame: &[u8]) -> Result<(), TransportError>;

    /// Wait up to `wait` for one frame.  `Ok(None)` means nothing arrived in
    /// time, which is not an error.
    async fn recv(&mut self, wait: Duration) -> Result<Option<Vec<u8>>, TransportError>;
}

// ---------------------------------------------------------------------------
// UdpTransport
// ---------------------------------------------------------------------------

/// A UDP socket bound to one peer.
///
/// A sender connects explicitly with [`UdpTransport::connect`].  A receiver
/// binds with [`UdpTransport::bind`] and adopts the source of the first
/// datagram it receives as its peer.
#[derive(Debug)]
pub struct UdpTransport {
    /// Address this socket is bound to (filled in after OS assigns ephemeral port).
    pub local_addr: SocketAddr,
    peer: Option<SocketAddr>,
    inner: UdpSocket,
}

impl UdpTransport {
    /// Bind a new socket to `local_addr` with no peer yet.
    ///
    /// Passing `0.0.0.0:0` lets the OS choose an ephemeral port.
    pub async fn bind(local_addr: SocketAddr) -> Result<Self, TransportError> {
        let inner = UdpSocket::bind(local_addr).await?;
        let local_addr = inner.local_addr()?;
        Ok(Self {
            local_addr,
            peer: None,
            inner,
        })
    }

    /// Bind to `local_addr` and fix `peer` as the only correspondent.
    pub async fn connect(local_addr: SocketAddr, peer: SocketAddr) -> Result<Self, TransportError> {
        let mut transport = Self::bind(local_addr).await?;
        transport.set_peer(peer).await?;
        Ok(transport)
    }

    pub fn peer(&self) -> Option<SocketAddr> {
        self.peer
    }

    async fn set_peer(&mut self, peer: SocketAddr) -> Result<(), TransportError> {
        self.inner.connect(peer).await?;
        self.peer = Some(peer);
        log::debug!("[udp] {} paired with {peer}", self.local_addr);
        Ok(())
    }
}

impl Transport for UdpTransport {
    async fn send(&mut self, frame: &[u8]) -> Result<(), TransportError> {
        if self.peer.is_none() {
            return Err(TransportError::NotConnected);
        }
        self.inner.send(frame).await?;
        Ok(())
    }

    async fn recv(&mut self, wait: Duration) -> Result<Option<Vec<u8>>, TransportError> {
        let mut buf = vec![0u8; MAX_DATAGRAM];
        let (n, addr) = match timeout(wait, self.inner.recv_from(&mut buf)).await {
            Err(_elapsed) => return Ok(None),
            // An ICMP port-unreachable from an earlier send surfaces here; the
            // peer simply is not listening (yet), which looks like loss.
            Ok(Err(e)) if e.kind() == io::ErrorKind::ConnectionRefused => {
                log::debug!("[udp] peer unreachable: {e}");
                tokio::time::sleep(wait).await;
                return Ok(None);
            }
            Ok(result) => result?,
        };
        if self.peer.is_none() {
            self.set_peer(addr).await?;
        }
        buf.truncate(n);
        Ok(Some(buf))
    }
}

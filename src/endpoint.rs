//! Socket + deadline abstraction. Per spec.md §9: timeouts are modeled as an
//! explicit sentinel the engine matches on, not an OS-level exception that
//! crosses component boundaries, and a timed-out socket is never closed or
//! rebound — it is simply read from again.

use std::net::{SocketAddr, UdpSocket};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tracing::{trace, warn};

use crate::error::Error;
use crate::packet::{Packet, HEADER_LEN};

const RECV_BUF_LEN: usize = 65536;

/// What a bounded receive produced.
pub enum RecvOutcome {
    Packet(Packet, SocketAddr),
    TimedOut,
    /// Decode failed (too few bytes): spec.md §7 says drop and continue,
    /// so the caller loops rather than treating this as fatal.
    Malformed,
}

pub struct Endpoint {
    socket: UdpSocket,
    current_timeout: Duration,
    cancelled: Arc<AtomicBool>,
}

impl Endpoint {
    pub fn bind(addr: SocketAddr) -> Result<Self, Error> {
        let socket = UdpSocket::bind(addr)?;
        Ok(Endpoint {
            socket,
            current_timeout: Duration::from_millis(500),
            cancelled: Arc::new(AtomicBool::new(false)),
        })
    }

    pub fn connect_to(addr: SocketAddr) -> Result<Self, Error> {
        // Client side binds an ephemeral local port; the remote address is
        // supplied per-send/recv rather than via `UdpSocket::connect`, since
        // the handshake needs to observe the server's source address.
        let local = match addr {
            SocketAddr::V4(_) => SocketAddr::from(([0, 0, 0, 0], 0)),
            SocketAddr::V6(_) => SocketAddr::from(([0, 0, 0, 0, 0, 0, 0, 0], 0)),
        };
        Self::bind(local)
    }

    pub fn local_addr(&self) -> Result<SocketAddr, Error> {
        Ok(self.socket.local_addr()?)
    }

    /// Installs a process-wide Ctrl-C handler that flags this endpoint for
    /// cancellation. Per spec.md §5, a user-initiated interrupt "aborts the
    /// engine at the next receive boundary" rather than tearing the socket
    /// down from signal context; the next call to `recv` observes the flag
    /// and returns `Error::UserCancel` instead of blocking again.
    pub fn install_interrupt_handler(&self) {
        let cancelled = self.cancelled.clone();
        if let Err(e) = ctrlc::set_handler(move || {
            cancelled.store(true, Ordering::SeqCst);
        }) {
            warn!("failed to install interrupt handler: {e}");
        }
    }

    pub fn send(&self, pkt: &Packet, to: SocketAddr) -> Result<(), Error> {
        trace!(seq = pkt.seq, ack = pkt.ack, flags = pkt.flags.0, ?to, "send");
        self.socket.send_to(&pkt.encode(), to)?;
        Ok(())
    }

    /// Blocks until a packet arrives, `deadline` elapses, a fatal socket
    /// error occurs, or the user interrupts (spec.md §5, §7: `UserCancel`).
    /// Updates the socket's read timeout only when `deadline` differs from
    /// the last one used, mirroring the Stop-and-Wait RTT-reseeding and
    /// GBN/SR fixed-500ms behavior of spec.md §4.3.
    pub fn recv(&mut self, deadline: Duration) -> Result<RecvOutcome, Error> {
        if self.cancelled.load(Ordering::SeqCst) {
            return Err(Error::UserCancel);
        }

        if deadline != self.current_timeout {
            self.socket.set_read_timeout(Some(deadline))?;
            self.current_timeout = deadline;
        }

        let mut buf = [0u8; RECV_BUF_LEN];
        match self.socket.recv_from(&mut buf) {
            Ok((n, from)) => {
                if n < HEADER_LEN {
                    return Ok(RecvOutcome::Malformed);
                }
                let pkt = Packet::decode(&buf[..n])?;
                trace!(seq = pkt.seq, ack = pkt.ack, flags = pkt.flags.0, ?from, "recv");
                Ok(RecvOutcome::Packet(pkt, from))
            }
            Err(e) if matches!(e.kind(), std::io::ErrorKind::WouldBlock | std::io::ErrorKind::TimedOut) => {
                Ok(RecvOutcome::TimedOut)
            }
            Err(e) => Err(Error::SocketFailure(e)),
        }
    }
}

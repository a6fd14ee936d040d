//! The three reliability strategies share one contract (spec.md §9: "Dynamic
//! reliability dispatch") — a tagged enum dispatched once at connection
//! start, not runtime string comparisons.

mod gbn;
mod sr;
mod stop_and_wait;

use std::time::Duration;

use crate::connection::ConnectionState;
use crate::endpoint::Endpoint;
use crate::error::Error;
use crate::testmode::TestMode;

/// Fixed retransmission timeout used by GBN and SR (spec.md §4.3).
pub const FIXED_RETRANSMIT_TIMEOUT: Duration = Duration::from_millis(500);

/// How long a receiver blocks waiting for the next segment before looping
/// back to check for cancellation. Not a protocol timeout — the receiver
/// never retransmits on its own account.
pub const RECEIVER_POLL_TIMEOUT: Duration = Duration::from_secs(300);

/// Default sliding window size, `W` in spec.md's GLOSSARY.
pub const DEFAULT_WINDOW: usize = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reliability {
    StopAndWait,
    Gbn,
    Sr,
}

/// What the receiver engine hands back once it has observed the peer's FIN:
/// the ordered chunks it reassembled, and the FIN packet's `seq` so the
/// caller can ack it correctly when tearing down the connection.
pub struct ReceiveOutcome {
    pub chunks: Vec<Vec<u8>>,
    pub peer_fin_seq: u32,
}

impl Reliability {
    pub fn send(
        self,
        endpoint: &mut Endpoint,
        conn: &mut ConnectionState,
        chunks: &[Vec<u8>],
        window: usize,
        test_mode: TestMode,
    ) -> Result<(), Error> {
        match self {
            Reliability::StopAndWait => stop_and_wait::send(endpoint, conn, chunks, test_mode),
            Reliability::Gbn => gbn::send(endpoint, conn, chunks, window, test_mode),
            Reliability::Sr => sr::send(endpoint, conn, chunks, window, test_mode),
        }
    }

    pub fn recv(
        self,
        endpoint: &mut Endpoint,
        conn: &mut ConnectionState,
        window: usize,
        test_mode: TestMode,
    ) -> Result<ReceiveOutcome, Error> {
        match self {
            Reliability::StopAndWait => stop_and_wait::recv(endpoint, conn, test_mode),
            Reliability::Gbn => gbn::recv(endpoint, conn, test_mode),
            Reliability::Sr => sr::recv(endpoint, conn, window, test_mode),
        }
    }
}

/// Sum of the lengths of `chunks[from..to]`, used to assign each chunk in a
/// window its sequence number relative to the window's base (spec.md §4.3:
/// `base_seq + Σ_{j<i} len(chunk_j)`).
pub(crate) fn prefix_len(chunks: &[Vec<u8>], from: usize, to: usize) -> u32 {
    chunks[from..to].iter().map(|c| c.len() as u32).sum()
}

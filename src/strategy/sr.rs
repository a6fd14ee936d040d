//! Selective Repeat: a sliding window of up to `W` unacked chunks, per-chunk
//! acks, and selective (not full-window) retransmission on timeout. The
//! receiver buffers out-of-order chunks and flushes once it holds a full
//! window or sees the peer's FIN (spec.md §4.3/§4.4).
//!
//! Ack endpoint semantics are pinned by spec.md §9: a data-ack's `ack` field
//! always equals `data.seq + len(data.payload)`, on both sides.

use std::collections::HashSet;
use std::time::Instant;

use tracing::{debug, trace, warn};

use crate::connection::ConnectionState;
use crate::endpoint::{Endpoint, RecvOutcome};
use crate::error::Error;
use crate::packet::{Flags, Packet};
use crate::testmode::{SkipOnce, TestMode};

use super::{prefix_len, ReceiveOutcome, FIXED_RETRANSMIT_TIMEOUT, RECEIVER_POLL_TIMEOUT};

pub fn send(
    endpoint: &mut Endpoint,
    conn: &mut ConnectionState,
    chunks: &[Vec<u8>],
    window: usize,
    test_mode: TestMode,
) -> Result<(), Error> {
    let mut skip = SkipOnce::new(test_mode.skip_send_index());

    let mut base = 0usize;
    let mut base_seq = conn.seq;
    let mut acked = vec![false; chunks.len()];

    while base < chunks.len() {
        let end = chunks.len().min(base + window);
        let expected_ack: Vec<u32> = (base..end)
            .map(|i| base_seq.wrapping_add(prefix_len(chunks, base, i + 1)))
            .collect();

        for i in base..end {
            if acked[i] {
                continue;
            }
            let seq = base_seq.wrapping_add(prefix_len(chunks, base, i));
            let pkt = Packet::new(seq, conn.ack, Flags::default(), conn.window, chunks[i].clone());
            if !skip.should_skip(i) {
                endpoint.send(&pkt, conn.peer)?;
            } else {
                debug!(i, "skipped transmission for fault injection");
            }
        }

        let round_start = Instant::now();
        let mut last_seen_seq: Option<u32> = None;

        loop {
            if (base..end).all(|i| acked[i]) {
                break;
            }

            match endpoint.recv(FIXED_RETRANSMIT_TIMEOUT)? {
                RecvOutcome::Packet(pkt, _) if pkt.flags.ack() => {
                    if let Some(i) = (base..end).find(|&i| !acked[i] && expected_ack[i - base] == pkt.ack) {
                        acked[i] = true;
                        last_seen_seq = Some(pkt.seq);
                        trace!(i, ack = pkt.ack, "chunk acked");
                    }
                }
                RecvOutcome::Packet(_, _) | RecvOutcome::Malformed => {}
                RecvOutcome::TimedOut => {
                    warn!(base, end, elapsed = ?round_start.elapsed(), "timeout, retransmitting unacked chunks in window");
                    break;
                }
            }
        }

        if (base..end).all(|i| acked[i]) {
            conn.seq = expected_ack[end - base - 1];
            if let Some(seq) = last_seen_seq {
                conn.ack = seq;
            }
            base_seq = conn.seq;
            base = end;
        }
    }

    Ok(())
}

pub fn recv(
    endpoint: &mut Endpoint,
    conn: &mut ConnectionState,
    window: usize,
    test_mode: TestMode,
) -> Result<ReceiveOutcome, Error> {
    let mut skip = SkipOnce::new(test_mode.skip_ack_index());

    let mut buffer: Vec<(u32, Vec<u8>)> = Vec::new();
    let mut acked_seqs: HashSet<u32> = HashSet::new();
    let mut flushed: Vec<Vec<u8>> = Vec::new();
    let reply_seq = conn.ack.wrapping_add(1);
    let mut ack_count = 0usize;

    loop {
        let (pkt, from) = match endpoint.recv(RECEIVER_POLL_TIMEOUT)? {
            RecvOutcome::Packet(pkt, from) => (pkt, from),
            RecvOutcome::TimedOut | RecvOutcome::Malformed => continue,
        };

        if pkt.flags.fin() {
            buffer.sort_by_key(|(seq, _)| *seq);
            flushed.extend(buffer.into_iter().map(|(_, payload)| payload));
            return Ok(ReceiveOutcome {
                chunks: flushed,
                peer_fin_seq: pkt.seq,
            });
        }

        // A data packet sets no control flag bits (spec.md §3). Reject a
        // stray or duplicated control packet (e.g. the client's final
        // handshake ACK) instead of mistaking it for an empty data chunk.
        if pkt.flags.0 != 0 {
            trace!(flags = pkt.flags.0, "ignoring stray control packet");
            continue;
        }

        let ack_value = pkt.seq.wrapping_add(pkt.payload.len() as u32);

        if !acked_seqs.contains(&pkt.seq) {
            acked_seqs.insert(pkt.seq);
            buffer.push((pkt.seq, pkt.payload));
        } else {
            trace!(seq = pkt.seq, "duplicate chunk, re-acking only");
        }

        let reply = Packet::control(reply_seq, ack_value, Flags::new(false, true, false, false), conn.window);
        if !skip.should_skip(ack_count) {
            endpoint.send(&reply, from)?;
        } else {
            debug!(ack_count, "skipped ack for fault injection");
        }
        ack_count += 1;

        if buffer.len() >= window {
            buffer.sort_by_key(|(seq, _)| *seq);
            flushed.extend(buffer.drain(..).map(|(_, payload)| payload));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connection;
    use std::net::SocketAddr;
    use std::thread;
    use std::time::Duration;

    fn handshake_pair() -> (Endpoint, ConnectionState, Endpoint, ConnectionState) {
        let client_ep = Endpoint::bind("127.0.0.1:0".parse().unwrap()).unwrap();
        let server_ep = Endpoint::bind("127.0.0.1:0".parse().unwrap()).unwrap();
        let server_addr: SocketAddr = server_ep.local_addr().unwrap();

        let server_thread = thread::spawn(move || {
            let mut server_ep = server_ep;
            let conn = connection::accept_as_server(&mut server_ep).unwrap();
            (server_ep, conn)
        });

        let mut client_ep = client_ep;
        let (client_conn, _rtt) = connection::open_as_client(&mut client_ep, server_addr).unwrap();
        let (server_ep, server_conn) = server_thread.join().unwrap();

        (client_ep, client_conn, server_ep, server_conn)
    }

    #[test]
    fn transfers_window_of_chunks_without_loss() {
        let (mut client_ep, mut client_conn, mut server_ep, mut server_conn) = handshake_pair();

        let chunks: Vec<Vec<u8>> = (0u8..9).map(|i| vec![i; 48]).collect();
        let expected = chunks.clone();

        let server_thread = thread::spawn(move || super::recv(&mut server_ep, &mut server_conn, 3, TestMode::None).unwrap());

        super::send(&mut client_ep, &mut client_conn, &chunks, 3, TestMode::None).unwrap();

        let fin = Packet::control(client_conn.seq, client_conn.ack, Flags::new(false, false, true, false), client_conn.window);
        client_ep.send(&fin, client_conn.peer).unwrap();

        let outcome = server_thread.join().unwrap();
        assert_eq!(outcome.chunks, expected);
    }

    #[test]
    fn selectively_retransmits_only_the_dropped_chunk() {
        let (mut client_ep, mut client_conn, mut server_ep, mut server_conn) = handshake_pair();
        client_conn.timeout = Duration::from_millis(100);

        let chunks: Vec<Vec<u8>> = (0u8..6).map(|i| vec![i; 32]).collect();
        let expected = chunks.clone();

        let server_thread = thread::spawn(move || super::recv(&mut server_ep, &mut server_conn, 3, TestMode::None).unwrap());

        // Drop chunk index 1: chunks 0 and 2 still get acked individually, so
        // only chunk 1 should need a timeout-triggered resend.
        super::send(&mut client_ep, &mut client_conn, &chunks, 3, TestMode::SkipSend(1)).unwrap();

        let fin = Packet::control(client_conn.seq, client_conn.ack, Flags::new(false, false, true, false), client_conn.window);
        client_ep.send(&fin, client_conn.peer).unwrap();

        let outcome = server_thread.join().unwrap();
        assert_eq!(outcome.chunks, expected);
    }

    #[test]
    fn recovers_from_one_dropped_ack() {
        let (mut client_ep, mut client_conn, mut server_ep, mut server_conn) = handshake_pair();
        client_conn.timeout = Duration::from_millis(100);

        let chunks: Vec<Vec<u8>> = (0u8..6).map(|i| vec![i; 32]).collect();
        let expected = chunks.clone();

        // The receiver drops the ack for chunk index 1 exactly once; the
        // sender must still time out and retransmit that chunk.
        let server_thread =
            thread::spawn(move || super::recv(&mut server_ep, &mut server_conn, 3, TestMode::SkipAck(1)).unwrap());

        super::send(&mut client_ep, &mut client_conn, &chunks, 3, TestMode::None).unwrap();

        let fin = Packet::control(client_conn.seq, client_conn.ack, Flags::new(false, false, true, false), client_conn.window);
        client_ep.send(&fin, client_conn.peer).unwrap();

        let outcome = server_thread.join().unwrap();
        assert_eq!(outcome.chunks, expected);
    }
}

//! Go-Back-N: a sliding window of up to `W` unacked chunks, cumulative acks,
//! and a full-window retransmit on timeout (spec.md §4.3). The receiver only
//! ever accepts the next expected chunk in order and silently drops anything
//! else — it never generates a "duplicate" ack of its own accord, which is
//! exactly what forces the sender's full-window resend.

use std::time::Instant;

use tracing::{debug, trace, warn};

use crate::connection::ConnectionState;
use crate::endpoint::{Endpoint, RecvOutcome};
use crate::error::Error;
use crate::packet::{Flags, Packet};
use crate::testmode::{SkipOnce, TestMode};

use super::{prefix_len, ReceiveOutcome, FIXED_RETRANSMIT_TIMEOUT, RECEIVER_POLL_TIMEOUT};

/// Sends `chunks[base..end)`, each chunk's sequence number computed fresh
/// from `base_seq`, and returns the next unused sequence number.
fn send_window(
    endpoint: &mut Endpoint,
    conn: &ConnectionState,
    chunks: &[Vec<u8>],
    base: usize,
    end: usize,
    base_seq: u32,
    skip: &mut SkipOnce,
) -> Result<(), Error> {
    for i in base..end {
        let seq = base_seq.wrapping_add(prefix_len(chunks, base, i));
        let pkt = Packet::new(seq, conn.ack, Flags::default(), conn.window, chunks[i].clone());
        if !skip.should_skip(i) {
            endpoint.send(&pkt, conn.peer)?;
        } else {
            debug!(i, "skipped transmission for fault injection");
        }
    }
    Ok(())
}

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
    let mut sent_up_to = chunks.len().min(window);

    send_window(endpoint, conn, chunks, base, sent_up_to, base_seq, &mut skip)?;
    let mut sent_at = Instant::now();

    while base < chunks.len() {
        let expected_ack = base_seq.wrapping_add(prefix_len(chunks, base, base + 1));

        match endpoint.recv(FIXED_RETRANSMIT_TIMEOUT)? {
            RecvOutcome::Packet(pkt, _) if pkt.flags.ack() && pkt.ack >= expected_ack => {
                conn.seq = pkt.ack;
                conn.ack = pkt.seq;
                base += 1;
                base_seq = expected_ack;

                if base == chunks.len() {
                    return Ok(());
                }

                if sent_up_to < chunks.len() && sent_up_to < base + window {
                    let seq = base_seq.wrapping_add(prefix_len(chunks, base, sent_up_to));
                    let pkt = Packet::new(seq, conn.ack, Flags::default(), conn.window, chunks[sent_up_to].clone());
                    if !skip.should_skip(sent_up_to) {
                        endpoint.send(&pkt, conn.peer)?;
                    } else {
                        debug!(i = sent_up_to, "skipped transmission for fault injection");
                    }
                    sent_up_to += 1;
                }
                sent_at = Instant::now();
            }
            RecvOutcome::Packet(pkt, _) => {
                trace!(got = pkt.ack, expected_ack, "ack outside window, ignoring");
            }
            RecvOutcome::Malformed => {}
            RecvOutcome::TimedOut => {
                let end = chunks.len().min(base + window);
                warn!(base, end, elapsed = ?sent_at.elapsed(), "timeout, retransmitting window");
                send_window(endpoint, conn, chunks, base, end, base_seq, &mut skip)?;
                sent_up_to = end;
                sent_at = Instant::now();
            }
        }
    }

    Ok(())
}

pub fn recv(endpoint: &mut Endpoint, conn: &mut ConnectionState, test_mode: TestMode) -> Result<ReceiveOutcome, Error> {
    let mut skip = SkipOnce::new(test_mode.skip_ack_index());

    let mut chunks = Vec::new();
    let mut next_expected_seq = conn.seq;
    let reply_seq = conn.ack.wrapping_add(1);
    let mut ack_count = 0usize;

    loop {
        let (pkt, from) = match endpoint.recv(RECEIVER_POLL_TIMEOUT)? {
            RecvOutcome::Packet(pkt, from) => (pkt, from),
            RecvOutcome::TimedOut | RecvOutcome::Malformed => continue,
        };

        if pkt.flags.fin() {
            return Ok(ReceiveOutcome {
                chunks,
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

        if pkt.seq == next_expected_seq {
            next_expected_seq = pkt.seq.wrapping_add(pkt.payload.len() as u32);
            chunks.push(pkt.payload);

            let reply = Packet::control(reply_seq, next_expected_seq, Flags::new(false, true, false, false), conn.window);
            if !skip.should_skip(ack_count) {
                endpoint.send(&reply, from)?;
            } else {
                debug!(ack_count, "skipped ack for fault injection");
            }
            ack_count += 1;
        } else {
            trace!(got = pkt.seq, expected = next_expected_seq, "out of order, dropping silently");
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

        let chunks: Vec<Vec<u8>> = (0u8..8).map(|i| vec![i; 64]).collect();
        let expected = chunks.clone();

        let server_thread = thread::spawn(move || super::recv(&mut server_ep, &mut server_conn, TestMode::None).unwrap());

        super::send(&mut client_ep, &mut client_conn, &chunks, 4, TestMode::None).unwrap();

        let fin = Packet::control(client_conn.seq, client_conn.ack, Flags::new(false, false, true, false), client_conn.window);
        client_ep.send(&fin, client_conn.peer).unwrap();

        let outcome = server_thread.join().unwrap();
        assert_eq!(outcome.chunks, expected);
    }

    #[test]
    fn retransmits_whole_window_after_one_drop() {
        let (mut client_ep, mut client_conn, mut server_ep, mut server_conn) = handshake_pair();
        client_conn.timeout = Duration::from_millis(100);

        let chunks: Vec<Vec<u8>> = (0u8..6).map(|i| vec![i; 32]).collect();
        let expected = chunks.clone();

        let server_thread = thread::spawn(move || super::recv(&mut server_ep, &mut server_conn, TestMode::None).unwrap());

        // Drop chunk index 1: the receiver silently ignores everything after
        // it until the sender's timeout-triggered full-window resend.
        super::send(&mut client_ep, &mut client_conn, &chunks, 3, TestMode::SkipSend(1)).unwrap();

        let fin = Packet::control(client_conn.seq, client_conn.ack, Flags::new(false, false, true, false), client_conn.window);
        client_ep.send(&fin, client_conn.peer).unwrap();

        let outcome = server_thread.join().unwrap();
        assert_eq!(outcome.chunks, expected);
    }
}

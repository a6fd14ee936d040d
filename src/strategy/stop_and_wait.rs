//! Stop-and-Wait: effective window of 1. The sender blocks on every chunk
//! until its ack arrives before sending the next; the receiver tolerates
//! duplicates with cumulative-ack semantics (spec.md §4.3/§4.4).

use std::time::Instant;

use tracing::{debug, trace, warn};

use crate::connection::ConnectionState;
use crate::endpoint::{Endpoint, RecvOutcome};
use crate::error::Error;
use crate::packet::{Flags, Packet};
use crate::testmode::{SkipOnce, TestMode};

use super::{ReceiveOutcome, RECEIVER_POLL_TIMEOUT};

pub fn send(
    endpoint: &mut Endpoint,
    conn: &mut ConnectionState,
    chunks: &[Vec<u8>],
    test_mode: TestMode,
) -> Result<(), Error> {
    let mut skip = SkipOnce::new(test_mode.skip_send_index());

    let mut idx = 0usize;
    let mut packet = Packet::new(conn.seq, conn.ack, Flags::default(), conn.window, chunks[idx].clone());
    if !skip.should_skip(idx) {
        endpoint.send(&packet, conn.peer)?;
    }
    let mut sent_at = Instant::now();
    let mut expected_ack = conn.seq.wrapping_add(chunks[idx].len() as u32);

    // Every chunk's ack is awaited before advancing, including the last —
    // DRTP guarantees exactly-once delivery for the whole chunk list, not
    // just everything before it.
    loop {
        match endpoint.recv(conn.timeout)? {
            RecvOutcome::Packet(pkt, _) if pkt.flags.ack() && pkt.ack == expected_ack => {
                conn.timeout = sent_at.elapsed() * 4;

                conn.seq = pkt.ack;
                conn.ack = pkt.seq + 1;
                idx += 1;

                if idx == chunks.len() {
                    return Ok(());
                }

                expected_ack = conn.seq.wrapping_add(chunks[idx].len() as u32);
                packet = Packet::new(conn.seq, conn.ack, Flags::default(), conn.window, chunks[idx].clone());

                if !skip.should_skip(idx) {
                    endpoint.send(&packet, conn.peer)?;
                } else {
                    debug!(idx, "skipped transmission for fault injection");
                }
                sent_at = Instant::now();
            }
            RecvOutcome::Packet(pkt, _) => {
                trace!(got = pkt.ack, expected_ack, "wrong ack, resending");
                endpoint.send(&packet, conn.peer)?;
            }
            RecvOutcome::Malformed => {
                endpoint.send(&packet, conn.peer)?;
            }
            RecvOutcome::TimedOut => {
                warn!(idx, "timeout, resending");
                sent_at = Instant::now();
                endpoint.send(&packet, conn.peer)?;
            }
        }
    }
}

pub fn recv(endpoint: &mut Endpoint, conn: &mut ConnectionState, test_mode: TestMode) -> Result<ReceiveOutcome, Error> {
    let mut skip = SkipOnce::new(test_mode.skip_ack_index());

    let mut chunks = Vec::new();
    let mut prev_ack = conn.ack.wrapping_sub(1);
    let mut last_ack_pkt: Option<Packet> = None;
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

        // A data packet sets no control flag bits (spec.md §3). Anything
        // carrying SYN/ACK/RST here is a stray or duplicated control packet
        // (e.g. the client's final handshake ACK arriving twice) and must
        // not be mistaken for an empty data chunk.
        if pkt.flags.0 != 0 {
            trace!(flags = pkt.flags.0, "ignoring stray control packet");
            continue;
        }

        if pkt.ack == prev_ack.wrapping_add(1) {
            prev_ack = pkt.ack;

            let new_seq = pkt.ack;
            let new_ack = pkt.seq + pkt.payload.len() as u32;
            conn.seq = new_seq;
            conn.ack = new_ack;

            chunks.push(pkt.payload);

            let reply = Packet::control(new_seq, new_ack, Flags::new(false, true, false, false), conn.window);
            if !skip.should_skip(ack_count) {
                endpoint.send(&reply, from)?;
            }
            last_ack_pkt = Some(reply);
            ack_count += 1;
        } else {
            trace!(got = pkt.ack, expected = prev_ack.wrapping_add(1), "duplicate or wrong, resending ack");
            if let Some(ref reply) = last_ack_pkt {
                endpoint.send(reply, from)?;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connection::{self, SERVER_ADVERTISED_WINDOW};
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
    fn transfers_three_chunks_without_loss() {
        let (mut client_ep, mut client_conn, mut server_ep, mut server_conn) = handshake_pair();
        client_conn.timeout = Duration::from_millis(500);

        let chunks = vec![vec![1u8; 100], vec![2u8; 100], vec![3u8; 100], vec![]];
        let expected = chunks.clone();

        let server_thread = thread::spawn(move || {
            super::recv(&mut server_ep, &mut server_conn, TestMode::None).unwrap()
        });

        super::send(&mut client_ep, &mut client_conn, &chunks, TestMode::None).unwrap();

        // Unblock the receiver with a FIN so the test doesn't hang.
        let fin = Packet::control(client_conn.seq, client_conn.ack, Flags::new(false, false, true, false), client_conn.window);
        client_ep.send(&fin, client_conn.peer).unwrap();

        let outcome = server_thread.join().unwrap();
        assert_eq!(outcome.chunks, expected);
        assert_eq!(client_conn.window, SERVER_ADVERTISED_WINDOW);
    }

    #[test]
    fn tolerates_one_skipped_data_packet() {
        let (mut client_ep, mut client_conn, mut server_ep, mut server_conn) = handshake_pair();
        client_conn.timeout = Duration::from_millis(100);

        let chunks = vec![vec![1u8; 50], vec![2u8; 50], vec![3u8; 50], vec![]];
        let expected = chunks.clone();

        let server_thread = thread::spawn(move || {
            super::recv(&mut server_ep, &mut server_conn, TestMode::None).unwrap()
        });

        super::send(&mut client_ep, &mut client_conn, &chunks, TestMode::SkipSend(1)).unwrap();

        let fin = Packet::control(client_conn.seq, client_conn.ack, Flags::new(false, false, true, false), client_conn.window);
        client_ep.send(&fin, client_conn.peer).unwrap();

        let outcome = server_thread.join().unwrap();
        assert_eq!(outcome.chunks, expected);
    }
}

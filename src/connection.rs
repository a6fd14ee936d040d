//! Three-way handshake open and two-way FIN/FIN+ACK close (spec.md §4.2).
//! A deliberately simplified close, not RFC-793's four-way teardown — see
//! spec.md §9.

use std::net::SocketAddr;
use std::time::{Duration, Instant};

use tracing::{debug, info, warn};

use crate::endpoint::{Endpoint, RecvOutcome};
use crate::error::Error;
use crate::packet::{Flags, Packet};

/// The advertised window a client proposes before it has heard from the
/// server (matches the original tool's initial `receiver_window = 1024`).
pub const CLIENT_INITIAL_WINDOW: u16 = 1024;

/// The window the server always advertises once a connection is underway
/// (spec.md §4.2: "the project's chosen MTU-fit value").
pub const SERVER_ADVERTISED_WINDOW: u16 = 1472;

const HANDSHAKE_RETRY_TIMEOUT: Duration = Duration::from_millis(500);
const MAX_HANDSHAKE_ATTEMPTS: u32 = 10;

/// Per-side connection state, threaded explicitly through every strategy
/// round instead of living in globals (spec.md §9).
#[derive(Debug, Clone, Copy)]
pub struct ConnectionState {
    pub peer: SocketAddr,
    pub seq: u32,
    pub ack: u32,
    pub window: u16,
    pub timeout: Duration,
}

/// Opens a connection as the initiator ("client"). Returns the established
/// state and the RTT measured between the first SYN and the SYN+ACK, which
/// seeds Stop-and-Wait's timeout (spec.md §4.2, §5).
pub fn open_as_client(endpoint: &mut Endpoint, peer: SocketAddr) -> Result<(ConnectionState, Duration), Error> {
    let isn: u32 = rand::random();
    let syn = Packet::control(isn, 0, Flags::new(true, false, false, false), CLIENT_INITIAL_WINDOW);

    let start = Instant::now();
    let mut attempts = 0u32;

    loop {
        endpoint.send(&syn, peer)?;
        debug!(isn, "sent SYN");

        match endpoint.recv(HANDSHAKE_RETRY_TIMEOUT)? {
            RecvOutcome::Packet(pkt, from) if pkt.flags.syn() && pkt.flags.ack() => {
                let rtt = start.elapsed();
                let state = ConnectionState {
                    peer: from,
                    seq: pkt.ack,
                    ack: pkt.seq + 1,
                    window: pkt.window,
                    timeout: rtt * 4,
                };

                let ack_pkt = Packet::control(state.seq, state.ack, Flags::new(false, true, false, false), state.window);
                endpoint.send(&ack_pkt, from)?;
                info!(?rtt, window = state.window, "handshake established (client)");

                return Ok((state, rtt));
            }
            RecvOutcome::Packet(_, _) | RecvOutcome::Malformed | RecvOutcome::TimedOut => {
                attempts += 1;
                if attempts >= MAX_HANDSHAKE_ATTEMPTS {
                    warn!(%peer, attempts, "handshake exhausted retries");
                    return Err(Error::HandshakeTimeout(peer));
                }
            }
        }
    }
}

/// Accepts a connection as the responder ("server"). Blocks until a client
/// completes the three-way handshake.
pub fn accept_as_server(endpoint: &mut Endpoint) -> Result<ConnectionState, Error> {
    loop {
        let (syn, client) = match endpoint.recv(HANDSHAKE_RETRY_TIMEOUT)? {
            RecvOutcome::Packet(pkt, from) if pkt.flags.syn() => (pkt, from),
            _ => continue,
        };

        let isn: u32 = rand::random();
        let local_ack = syn.seq + 1;
        let synack = Packet::control(
            isn,
            local_ack,
            Flags::new(true, true, false, false),
            SERVER_ADVERTISED_WINDOW,
        );

        let mut attempts = 0u32;
        loop {
            endpoint.send(&synack, client)?;
            debug!(isn, "sent SYN+ACK");

            match endpoint.recv(HANDSHAKE_RETRY_TIMEOUT)? {
                RecvOutcome::Packet(pkt, from) if from == client && pkt.flags.ack() && pkt.ack == isn + 1 => {
                    let state = ConnectionState {
                        peer: client,
                        seq: pkt.seq,
                        ack: pkt.ack,
                        window: SERVER_ADVERTISED_WINDOW,
                        timeout: Duration::from_millis(500),
                    };
                    info!(%client, "handshake established (server)");
                    return Ok(state);
                }
                // A retransmitted SYN (our SYN+ACK was lost) — resend and
                // keep waiting instead of restarting the whole handshake.
                RecvOutcome::Packet(pkt, from) if from == client && pkt.flags.syn() => continue,
                RecvOutcome::Packet(_, _) | RecvOutcome::Malformed => continue,
                RecvOutcome::TimedOut => {
                    attempts += 1;
                    if attempts >= MAX_HANDSHAKE_ATTEMPTS {
                        warn!(%client, "handshake ACK never arrived, giving up on this peer");
                        break;
                    }
                }
            }
        }
    }
}

/// Initiator-side two-way close: send FIN, retransmit on anything but a
/// FIN+ACK, close on receipt.
pub fn close_as_client(endpoint: &mut Endpoint, conn: &ConnectionState) -> Result<(), Error> {
    let fin = Packet::control(conn.seq, conn.ack, Flags::new(false, false, true, false), conn.window);

    loop {
        endpoint.send(&fin, conn.peer)?;
        debug!("sent FIN");

        match endpoint.recv(Duration::from_millis(500))? {
            RecvOutcome::Packet(pkt, from) if from == conn.peer && pkt.flags.fin() && pkt.flags.ack() => {
                info!("received FIN+ACK, connection closed");
                return Ok(());
            }
            _ => continue,
        }
    }
}

/// Responder-side two-way close: reply FIN+ACK exactly once, then stop.
pub fn close_as_server(endpoint: &mut Endpoint, conn: &ConnectionState, peer_fin_seq: u32) -> Result<(), Error> {
    let ack = peer_fin_seq + 1;
    let finack = Packet::control(conn.seq, ack, Flags::new(false, true, true, false), conn.window);
    endpoint.send(&finack, conn.peer)?;
    info!("sent FIN+ACK, connection closed");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn handshake_establishes_matching_state_on_both_sides() {
        let client_ep = Endpoint::bind("127.0.0.1:0".parse().unwrap()).unwrap();
        let server_ep = Endpoint::bind("127.0.0.1:0".parse().unwrap()).unwrap();
        let server_addr = server_ep.local_addr().unwrap();

        let server_thread = thread::spawn(move || {
            let mut server_ep = server_ep;
            accept_as_server(&mut server_ep).unwrap()
        });

        let mut client_ep = client_ep;
        let (client_state, _rtt) = open_as_client(&mut client_ep, server_addr).unwrap();
        let server_state = server_thread.join().unwrap();

        // Scenario 1 of spec.md §8: after the handshake both sides hold the
        // same (seq, ack) register pair, ready to be flipped by whichever
        // side speaks first in the data phase.
        assert_eq!(client_state.seq, server_state.seq);
        assert_eq!(client_state.ack, server_state.ack);
        assert_eq!(client_state.window, SERVER_ADVERTISED_WINDOW);
        assert_eq!(server_state.window, SERVER_ADVERTISED_WINDOW);
    }
}

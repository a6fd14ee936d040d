//! Fixed 12-byte DRTP header: `seq:u32 ack:u32 flags:u16 window:u16`, network
//! byte order, followed by 0..N payload bytes. Purely functional: no state,
//! no I/O.

use crate::error::Error;

pub const HEADER_LEN: usize = 12;

pub const SYN: u16 = 1 << 3;
pub const ACK: u16 = 1 << 2;
pub const FIN: u16 = 1 << 1;
pub const RST: u16 = 1 << 0;

/// Bitfield helper around the 16-bit flags word. Equivalent to the source's
/// `set_flags`/`parse_flags` pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Flags(pub u16);

impl Flags {
    pub fn new(syn: bool, ack: bool, fin: bool, rst: bool) -> Self {
        let mut bits = 0;
        if syn {
            bits |= SYN;
        }
        if ack {
            bits |= ACK;
        }
        if fin {
            bits |= FIN;
        }
        if rst {
            bits |= RST;
        }
        Flags(bits)
    }

    pub fn syn(self) -> bool {
        self.0 & SYN != 0
    }

    pub fn ack(self) -> bool {
        self.0 & ACK != 0
    }

    pub fn fin(self) -> bool {
        self.0 & FIN != 0
    }

    pub fn rst(self) -> bool {
        self.0 & RST != 0
    }

    pub fn parts(self) -> (bool, bool, bool, bool) {
        (self.syn(), self.ack(), self.fin(), self.rst())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Packet {
    pub seq: u32,
    pub ack: u32,
    pub flags: Flags,
    pub window: u16,
    pub payload: Vec<u8>,
}

impl Packet {
    pub fn new(seq: u32, ack: u32, flags: Flags, window: u16, payload: Vec<u8>) -> Self {
        Packet {
            seq,
            ack,
            flags,
            window,
            payload,
        }
    }

    pub fn control(seq: u32, ack: u32, flags: Flags, window: u16) -> Self {
        Packet::new(seq, ack, flags, window, Vec::new())
    }

    pub fn encode(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(HEADER_LEN + self.payload.len());
        buf.extend_from_slice(&self.seq.to_be_bytes());
        buf.extend_from_slice(&self.ack.to_be_bytes());
        buf.extend_from_slice(&self.flags.0.to_be_bytes());
        buf.extend_from_slice(&self.window.to_be_bytes());
        buf.extend_from_slice(&self.payload);
        buf
    }

    pub fn decode(bytes: &[u8]) -> Result<Self, Error> {
        if bytes.len() < HEADER_LEN {
            return Err(Error::MalformedPacket(bytes.len()));
        }

        let seq = u32::from_be_bytes(bytes[0..4].try_into().unwrap());
        let ack = u32::from_be_bytes(bytes[4..8].try_into().unwrap());
        let flags = Flags(u16::from_be_bytes(bytes[8..10].try_into().unwrap()));
        let window = u16::from_be_bytes(bytes[10..12].try_into().unwrap());
        let payload = bytes[HEADER_LEN..].to_vec();

        Ok(Packet {
            seq,
            ack,
            flags,
            window,
            payload,
        })
    }
}

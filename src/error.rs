use std::net::SocketAddr;

/// Every error kind spec'd for DRTP. `MalformedPacket`, `WrongAck`,
/// `OutOfOrder`, `Duplicate` and `Timeout` are recovered locally by the
/// codec/connection/strategy modules and never leave this crate; only
/// `HandshakeTimeout`, `SocketFailure` and `UserCancel` are meant to
/// propagate to the CLI layer.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("malformed packet: {0} bytes, need at least 12")]
    MalformedPacket(usize),

    #[error("received ack {got}, expected {expected}")]
    WrongAck { expected: u32, got: u32 },

    #[error("out-of-order segment seq {got}, expected {expected}")]
    OutOfOrder { expected: u32, got: u32 },

    #[error("duplicate segment seq {0}")]
    Duplicate(u32),

    #[error("receive deadline elapsed")]
    Timeout,

    #[error("handshake with {0} timed out after exhausting retries")]
    HandshakeTimeout(SocketAddr),

    #[error("socket error: {0}")]
    SocketFailure(#[from] std::io::Error),

    #[error("interrupted by user")]
    UserCancel,

    #[error("filename {0:?} is longer than the {1}-byte filename frame")]
    FilenameTooLong(String, usize),
}

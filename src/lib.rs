//! DRTP: a connection-oriented reliable byte-stream protocol layered over
//! UDP, offering three selectable reliability strategies (Stop-and-Wait,
//! Go-Back-N, Selective-Repeat). This crate is the reliable transport
//! engine; argument parsing, file I/O, and traffic-shaping invocation live
//! in the two binaries that drive it.

pub mod config;
pub mod connection;
pub mod endpoint;
pub mod error;
pub mod framing;
pub mod packet;
pub mod strategy;
pub mod testmode;

pub use config::{ClientCli, Config, ConfigError, Mode, ServerCli};
pub use connection::ConnectionState;
pub use endpoint::{Endpoint, RecvOutcome};
pub use error::Error;
pub use strategy::{ReceiveOutcome, Reliability};
pub use testmode::TestMode;

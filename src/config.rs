//! Command-line surface and validated runtime configuration. Kept out of the
//! core engine (spec.md §1: argument parsing is an external collaborator) and
//! wired in from the two binaries.

use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;

use clap::{Parser, ValueEnum};

use crate::strategy::Reliability;
use crate::testmode::TestMode;

pub const DEFAULT_PORT: u16 = 8080;
pub const DEFAULT_WINDOW: usize = crate::strategy::DEFAULT_WINDOW;
pub const MIN_PORT: u16 = 1024;
pub const FILENAME_FRAME_LEN: usize = crate::framing::FILENAME_FRAME_LEN;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
#[value(rename_all = "snake_case")]
pub enum ReliabilityArg {
    StopAndWait,
    Gbn,
    Sr,
}

impl From<ReliabilityArg> for Reliability {
    fn from(arg: ReliabilityArg) -> Self {
        match arg {
            ReliabilityArg::StopAndWait => Reliability::StopAndWait,
            ReliabilityArg::Gbn => Reliability::Gbn,
            ReliabilityArg::Sr => Reliability::Sr,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
#[value(rename_all = "snake_case")]
pub enum TestModeArg {
    /// Sender drops one data packet once.
    Loss,
    /// Receiver drops one ack once.
    SkipAck,
}

/// DRTP file transfer client.
#[derive(Debug, Parser)]
#[command(name = "drtp-client", about = "DRTP file transfer client", version)]
pub struct ClientCli {
    /// Server IP address, in dotted-decimal notation.
    #[arg(short, long, default_value = "127.0.0.1")]
    pub ip: String,

    /// Server port.
    #[arg(short, long, default_value_t = DEFAULT_PORT)]
    pub port: u16,

    /// Reliability strategy.
    #[arg(short, long, value_enum)]
    pub reliability: ReliabilityArg,

    /// Sliding window size (chunks in flight for GBN/SR).
    #[arg(short, long, default_value_t = DEFAULT_WINDOW)]
    pub window: usize,

    /// Deterministic single-packet fault injection for testing.
    #[arg(short = 't', long = "mode", value_enum)]
    pub test_mode: Option<TestModeArg>,

    /// Path of the file to send.
    #[arg(short, long)]
    pub file: PathBuf,
}

/// DRTP file transfer server.
#[derive(Debug, Parser)]
#[command(name = "drtp-server", about = "DRTP file transfer server", version)]
pub struct ServerCli {
    /// IP address to bind to.
    #[arg(short, long, default_value = "127.0.0.1")]
    pub ip: String,

    /// Port to listen on.
    #[arg(short, long, default_value_t = DEFAULT_PORT)]
    pub port: u16,

    /// Reliability strategy.
    #[arg(short, long, value_enum)]
    pub reliability: ReliabilityArg,

    /// Sliding window size (chunks in flight for GBN/SR).
    #[arg(short, long, default_value_t = DEFAULT_WINDOW)]
    pub window: usize,

    /// Deterministic single-packet fault injection for testing.
    #[arg(short = 't', long = "mode", value_enum)]
    pub test_mode: Option<TestModeArg>,

    /// Directory the received file is written into.
    #[arg(short = 'd', long = "save-dir", default_value = ".")]
    pub save_dir: PathBuf,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Mode {
    Client { file: PathBuf },
    Server { save_dir: PathBuf },
}

/// Validated configuration derived from a CLI, ready to hand to the engine.
#[derive(Debug, Clone)]
pub struct Config {
    pub mode: Mode,
    pub reliability: Reliability,
    pub addr: SocketAddr,
    pub window: usize,
    pub test_mode: TestMode,
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("{0} is not a valid port, must be between {MIN_PORT} and 65535")]
    InvalidPort(u16),
    #[error("{0} is not a valid IPv4/IPv6 address")]
    InvalidAddress(String),
    #[error("window must be a positive integer, got {0}")]
    InvalidWindow(usize),
    #[error("filename {0:?} is longer than the {FILENAME_FRAME_LEN}-byte filename frame")]
    FilenameTooLong(String),
}

/// Fixed index used by the test-mode fault injector (spec.md §8 scenarios 3
/// and 4 both exercise "packet #3"; the CLI doesn't expose a custom index).
const DEFAULT_SKIP_INDEX: usize = 2;

fn parse_addr(ip: &str, port: u16) -> Result<SocketAddr, ConfigError> {
    if port < MIN_PORT {
        return Err(ConfigError::InvalidPort(port));
    }
    let addr: IpAddr = ip.parse().map_err(|_| ConfigError::InvalidAddress(ip.to_string()))?;
    Ok(SocketAddr::new(addr, port))
}

impl Config {
    pub fn from_client_cli(cli: ClientCli) -> Result<Self, ConfigError> {
        let addr = parse_addr(&cli.ip, cli.port)?;
        if cli.window == 0 {
            return Err(ConfigError::InvalidWindow(cli.window));
        }

        let filename = cli
            .file
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("file");
        if filename.len() > FILENAME_FRAME_LEN {
            return Err(ConfigError::FilenameTooLong(filename.to_string()));
        }

        let test_mode = match cli.test_mode {
            Some(TestModeArg::Loss) => TestMode::SkipSend(DEFAULT_SKIP_INDEX),
            _ => TestMode::None,
        };

        Ok(Config {
            mode: Mode::Client { file: cli.file },
            reliability: cli.reliability.into(),
            addr,
            window: cli.window,
            test_mode,
        })
    }

    pub fn from_server_cli(cli: ServerCli) -> Result<Self, ConfigError> {
        let addr = parse_addr(&cli.ip, cli.port)?;
        if cli.window == 0 {
            return Err(ConfigError::InvalidWindow(cli.window));
        }

        let test_mode = match cli.test_mode {
            Some(TestModeArg::SkipAck) => TestMode::SkipAck(DEFAULT_SKIP_INDEX),
            _ => TestMode::None,
        };

        Ok(Config {
            mode: Mode::Server { save_dir: cli.save_dir },
            reliability: cli.reliability.into(),
            addr,
            window: cli.window,
            test_mode,
        })
    }
}

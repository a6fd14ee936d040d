//! Client entry point: reads a file, frames it into chunks, and drives the
//! chosen reliability strategy against a server over UDP.

use std::fs;
use std::process::ExitCode;
use std::time::Instant;

use clap::Parser;
use tracing::{error, info};

use drtp::config::{ClientCli, Config, Mode};
use drtp::framing::frame_first_chunk;
use drtp::{connection, Error};

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = ClientCli::parse();
    let config = match Config::from_client_cli(cli) {
        Ok(c) => c,
        Err(e) => {
            error!("{e}");
            return ExitCode::FAILURE;
        }
    };

    match run(config) {
        Ok(()) => ExitCode::SUCCESS,
        Err(Error::UserCancel) => {
            info!("client shutting down");
            ExitCode::SUCCESS
        }
        Err(e) => {
            error!("{e}");
            ExitCode::FAILURE
        }
    }
}

fn run(config: Config) -> Result<(), Error> {
    let Mode::Client { file } = config.mode else {
        unreachable!("from_client_cli always produces Mode::Client");
    };

    let filename = file
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("file")
        .to_string();

    let file_data = fs::read(&file)?;
    info!(%filename, size = file_data.len(), "read file");

    let mut endpoint = drtp::Endpoint::connect_to(config.addr)?;
    endpoint.install_interrupt_handler();
    let (mut conn, rtt) = connection::open_as_client(&mut endpoint, config.addr)?;
    info!(?rtt, "handshake established");

    // Chunk size is bounded by the window the peer advertised during the
    // handshake, not the CLI's sliding-window chunk count (spec.md §4.5).
    let chunks = chunk_file(&filename, &file_data, conn.window as usize)?;
    info!(chunks = chunks.len(), "chunked file");

    let start = Instant::now();
    config
        .reliability
        .send(&mut endpoint, &mut conn, &chunks, config.window, config.test_mode)?;
    let elapsed = start.elapsed();

    report_throughput(file_data.len(), elapsed);

    connection::close_as_client(&mut endpoint, &conn)?;
    info!("connection closed");
    Ok(())
}

/// Splits `file_data` into chunks of at most `window - 12` bytes (less the
/// 32-byte filename frame for the first chunk), per spec.md §4.5.
fn chunk_file(filename: &str, file_data: &[u8], window: usize) -> Result<Vec<Vec<u8>>, Error> {
    const HEADER_LEN: usize = drtp::packet::HEADER_LEN;
    const FRAME_LEN: usize = drtp::framing::FILENAME_FRAME_LEN;

    let first_budget = window.saturating_sub(HEADER_LEN + FRAME_LEN);
    let rest_budget = window.saturating_sub(HEADER_LEN).max(1);

    let mut chunks = Vec::new();
    let (first, mut remainder) = file_data.split_at(first_budget.min(file_data.len()));
    chunks.push(frame_first_chunk(filename, first)?);

    while !remainder.is_empty() {
        let take = rest_budget.min(remainder.len());
        let (chunk, rest) = remainder.split_at(take);
        chunks.push(chunk.to_vec());
        remainder = rest;
    }

    // End-of-file sentinel: an empty chunk always terminates the list.
    chunks.push(Vec::new());

    Ok(chunks)
}

fn report_throughput(bytes: usize, elapsed: std::time::Duration) {
    let secs = elapsed.as_secs_f64().max(f64::EPSILON);
    let bps = (bytes as f64 * 8.0) / secs;

    if bps > 1_000_000.0 {
        info!("throughput: {:.2} Mbps", bps / 1_000_000.0);
    } else if bps > 1_000.0 {
        info!("throughput: {:.2} Kbps", bps / 1_000.0);
    } else {
        info!("throughput: {:.2} bps", bps);
    }
}

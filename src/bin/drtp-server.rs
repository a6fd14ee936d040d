//! Server entry point: accepts one connection, receives a file via the
//! chosen reliability strategy, and writes it to the configured directory.

use std::fs;
use std::process::ExitCode;
use std::time::Instant;

use clap::Parser;
use tracing::{error, info};

use drtp::config::{Config, Mode, ServerCli};
use drtp::framing::unframe;
use drtp::{connection, Error};

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = ServerCli::parse();
    let config = match Config::from_server_cli(cli) {
        Ok(c) => c,
        Err(e) => {
            error!("{e}");
            return ExitCode::FAILURE;
        }
    };

    match run(config) {
        Ok(()) => ExitCode::SUCCESS,
        Err(Error::UserCancel) => {
            info!("server shutting down");
            ExitCode::SUCCESS
        }
        Err(e) => {
            error!("{e}");
            ExitCode::FAILURE
        }
    }
}

fn run(config: Config) -> Result<(), Error> {
    let Mode::Server { save_dir } = config.mode else {
        unreachable!("from_server_cli always produces Mode::Server");
    };

    let mut endpoint = drtp::Endpoint::bind(config.addr)?;
    endpoint.install_interrupt_handler();
    info!(addr = %config.addr, "server listening");

    let mut conn = connection::accept_as_server(&mut endpoint)?;
    info!(peer = %conn.peer, "handshake established");

    let start = Instant::now();
    let outcome = config
        .reliability
        .recv(&mut endpoint, &mut conn, config.window, config.test_mode)?;
    let elapsed = start.elapsed();

    connection::close_as_server(&mut endpoint, &conn, outcome.peer_fin_seq)?;
    info!("connection closed");

    let reassembled: Vec<u8> = outcome.chunks.into_iter().flatten().collect();
    let total_len = reassembled.len();
    let (filename, file_data) = unframe(reassembled);

    report_throughput(total_len, elapsed);

    let save_path = save_dir.join(&filename);
    fs::write(&save_path, &file_data)?;
    info!(path = %save_path.display(), bytes = file_data.len(), "wrote received file");

    Ok(())
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

use std::{error::Error, net::SocketAddr};

use clap::Parser;
use eventdbx_client::{
    protocol::DEFAULT_NOISE_PATTERN,
    server::{ControlServer, ServerOptions},
};
use log::info;

/// In-memory EventDBX control server for local testing.
#[derive(Debug, Parser)]
#[command(version, about, long_about = None)]
struct Cli {
    /// Listen for new connections at address
    address: SocketAddr,
    /// Token clients must present; empty accepts any token
    #[arg(long, default_value = "")]
    token: String,
    /// Refuse the Noise channel
    #[arg(long)]
    no_noise: bool,
    /// Noise handshake pattern
    #[arg(long, default_value = DEFAULT_NOISE_PATTERN)]
    noise_pattern: String,
    /// Clients served at once; each holds a worker until it disconnects
    #[arg(long, default_value_t = 4)]
    workers: usize,
}

fn main() -> Result<(), Box<dyn Error>> {
    env_logger::init();

    let cli = Cli::parse();
    ctrlc::set_handler(|| {
        info!("received interrupt, shutting down");
        std::process::exit(0);
    })?;

    let server = ControlServer::bind(
        cli.address,
        ServerOptions {
            token: cli.token,
            no_noise: cli.no_noise,
            noise_pattern: cli.noise_pattern,
            workers: cli.workers,
        },
    )?;

    server.serve()?;
    Ok(())
}

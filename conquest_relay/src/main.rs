// CLI entry point for the Conquest relay.
//
// Starts a standalone relay server that peers connect to. The relay assigns
// player IDs and forwards state lines between peers; it never looks inside
// them. See `server.rs` for the networking architecture and `session.rs` for
// the session state.
//
// Logging goes through `env_logger`; set `RUST_LOG=debug` for per-connection
// detail. The process runs until it is killed.

use std::process::ExitCode;

use clap::Parser;
use conquest_relay::server::{
    DEFAULT_BIND_ADDR, DEFAULT_MAX_PLAYERS, DEFAULT_PORT, DEFAULT_WRITE_TIMEOUT_MS, RelayConfig,
    start_relay,
};
use log::{error, info};

#[derive(Debug, Parser)]
#[command(name = "relay", about = "Relay server for Conquest peer sync")]
struct Args {
    /// Address to listen on.
    #[arg(long, default_value = DEFAULT_BIND_ADDR)]
    bind: String,

    /// Listen port (0 picks a free one).
    #[arg(long, default_value_t = DEFAULT_PORT)]
    port: u16,

    /// Connections beyond this many are closed on arrival.
    #[arg(long, default_value_t = DEFAULT_MAX_PLAYERS)]
    max_players: u32,

    /// Clients that block a write for this long are dropped.
    #[arg(long, default_value_t = DEFAULT_WRITE_TIMEOUT_MS)]
    write_timeout_ms: u64,
}

impl From<Args> for RelayConfig {
    fn from(args: Args) -> Self {
        Self {
            bind_addr: args.bind,
            port: args.port,
            max_players: args.max_players,
            write_timeout_ms: args.write_timeout_ms,
        }
    }
}

fn main() -> ExitCode {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let config = RelayConfig::from(Args::parse());
    match start_relay(config) {
        Ok((handle, addr)) => {
            info!("relay listening on {addr}");
            handle.wait();
            ExitCode::SUCCESS
        }
        Err(e) => {
            error!("failed to start relay: {e}");
            ExitCode::FAILURE
        }
    }
}

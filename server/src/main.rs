use clap::Parser;
use log::info;
use server::account::{AccountStore, JsonFileStore, MemoryStore};
use server::config::{GameSettings, WorldConfig};
use server::network::Server;
use std::path::PathBuf;
use std::time::Duration;

/// Command line arguments
#[derive(Parser, Debug)]
#[clap(author, version, about)]
struct Args {
    /// Server IP address to bind to
    #[clap(short = 'H', long, default_value = "127.0.0.1")]
    host: String,
    /// Server port to listen on
    #[clap(short, long, default_value = "8080")]
    port: u16,
    /// Tick rate (updates per second)
    #[clap(short, long, default_value = "60")]
    tick_rate: u32,
    /// Maximum number of concurrent clients
    #[clap(short, long, default_value = "32")]
    max_clients: usize,
    /// Account file
    #[clap(long, default_value = "accounts.json")]
    accounts: PathBuf,
    /// Keep accounts in memory only
    #[clap(long)]
    no_persist: bool,
    /// JSON file with lighting and grid settings pushed to clients
    #[clap(long)]
    world_config: Option<PathBuf>,
    /// Seed for every random roll
    #[clap(long)]
    seed: Option<u64>,
    /// Clamp reported player positions into the arena
    #[clap(long)]
    validate_moves: bool,
    /// Do not read operator commands from stdin
    #[clap(long)]
    no_console: bool,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    if std::env::var("RUST_LOG").is_err() {
        eprintln!("Tip: set RUST_LOG=info (or debug) to see server logs");
    }
    env_logger::init();

    let args = Args::parse();
    let tick_duration = Duration::from_secs_f64(1.0 / args.tick_rate.max(1) as f64);

    let accounts: Box<dyn AccountStore + Send> = if args.no_persist {
        info!("Account persistence disabled");
        Box::new(MemoryStore::new())
    } else {
        Box::new(JsonFileStore::open(&args.accounts)?)
    };
    let world_config = WorldConfig::load(args.world_config.as_deref())?;
    let settings = GameSettings {
        validate_moves: args.validate_moves,
        seed: args.seed,
    };

    let address = format!("{}:{}", args.host, args.port);
    let mut server = Server::new(
        &address,
        tick_duration,
        args.max_clients,
        accounts,
        world_config,
        settings,
    )
    .await?;
    if !args.no_console {
        server.enable_console();
    }

    tokio::select! {
        result = server.run() => {
            result?;
        }
        _ = tokio::signal::ctrl_c() => {
            info!("Received Ctrl+C, shutting down");
        }
    }

    Ok(())
}

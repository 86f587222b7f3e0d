use clap::Parser;
use log::info;
use server::config::SimConfig;
use server::network::Server;
use server::persistence::MemoryStore;
use server::world::ProceduralWorld;
use std::sync::Arc;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Server IP address to bind to
    #[arg(short = 'H', long, env = "VOIDLINE_HOST", default_value = "127.0.0.1")]
    host: String,

    /// Server port to listen on
    #[arg(short, long, env = "VOIDLINE_PORT", default_value = "8080")]
    port: u16,

    /// Simulation steps per second (overrides the config default)
    #[arg(short, long, env = "VOIDLINE_TICK_RATE")]
    tick_rate: Option<u32>,

    /// Maximum concurrent players
    #[arg(short, long, env = "VOIDLINE_MAX_CLIENTS", default_value = "64")]
    max_clients: usize,

    /// World and simulation RNG seed
    #[arg(short, long, env = "VOIDLINE_SEED")]
    seed: Option<u64>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    env_logger::init();

    if std::env::var("RUST_LOG").is_err() {
        eprintln!("Set RUST_LOG=info for detailed logging");
    }

    let args = Args::parse();

    let mut config = SimConfig::from_env()?;
    if let Some(tick_rate) = args.tick_rate {
        config.tick_rate = tick_rate;
    }
    if let Some(seed) = args.seed {
        config.seed = seed;
    }
    config.validate()?;

    info!(
        "Starting server at {} Hz, seed {}, up to {} players",
        config.tick_rate, config.seed, args.max_clients
    );

    let world = Arc::new(ProceduralWorld::new(config.seed, config.cell_size));
    let store = Arc::new(MemoryStore::new());
    let address = format!("{}:{}", args.host, args.port);

    let mut server = Server::new(&address, config, store, world, args.max_clients).await?;

    let handle = server.handle();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Interrupt received");
            let _ = handle.send(server::network::ServerMessage::Shutdown);
        }
    });

    server.run().await?;

    Ok(())
}

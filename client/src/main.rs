use clap::Parser;
use client::network::{Client, ClientOptions};
use log::{error, info};
use shared::config::GameMode;
use shared::protocol::WireFormat;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Server address to connect to
    #[arg(short = 's', long, default_value = "127.0.0.1:8080")]
    server: String,

    /// Room to join; the server's default room when omitted
    #[arg(short = 'm', long)]
    mode: Option<GameMode>,

    /// Display name sent with the join request
    #[arg(short = 'n', long)]
    name: Option<String>,

    /// Simulate network latency in milliseconds
    #[arg(short = 'l', long, default_value = "0")]
    fake_ping: u64,

    /// Speak bincode over binary frames instead of JSON text
    #[arg(short = 'b', long)]
    binary: bool,

    /// Number of bots to run concurrently
    #[arg(long, default_value = "1")]
    bots: u32,

    /// Seed for the wander pattern; bot N uses seed + N
    #[arg(long)]
    seed: Option<u64>,

    /// Request a round start after joining
    #[arg(long)]
    start: bool,
}

impl Args {
    fn url(&self) -> String {
        let path = self.mode.map_or("", GameMode::name);
        format!("ws://{}/{}", self.server, path)
    }

    fn options(&self, index: u32) -> ClientOptions {
        let name = match (&self.name, self.bots) {
            (Some(name), 1) => Some(name.clone()),
            (Some(name), _) => Some(format!("{}_{}", name, index + 1)),
            (None, _) => None,
        };
        ClientOptions {
            url: self.url(),
            name,
            fake_ping_ms: self.fake_ping,
            format: if self.binary {
                WireFormat::Binary
            } else {
                WireFormat::Json
            },
            seed: self.seed.map(|seed| seed + u64::from(index)),
            request_start: self.start && index == 0,
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();

    if std::env::var("RUST_LOG").is_err() {
        eprintln!("Set RUST_LOG=info for detailed logging");
    }

    let args = Args::parse();

    info!("Starting {} bot(s)...", args.bots);
    info!("Connecting to: {}", args.url());
    if args.fake_ping > 0 {
        info!("Simulating {}ms latency", args.fake_ping);
    }

    let handles: Vec<_> = (0..args.bots.max(1))
        .map(|index| {
            let mut client = Client::new(args.options(index));
            tokio::spawn(async move { client.run().await })
        })
        .collect();

    let mut failed = false;
    tokio::select! {
        _ = async {
            for handle in handles {
                match handle.await {
                    Ok(Ok(())) => {}
                    Ok(Err(e)) => {
                        error!("Client failed: {}", e);
                        failed = true;
                    }
                    Err(e) => {
                        error!("Client task panicked: {}", e);
                        failed = true;
                    }
                }
            }
        } => {}
        _ = tokio::signal::ctrl_c() => {
            info!("Received Ctrl+C, shutting down...");
        }
    }

    if failed {
        return Err("one or more clients failed".into());
    }
    Ok(())
}

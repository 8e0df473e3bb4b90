use clap::Parser;
use log::{error, info};
use server::network::Server;
use server::settings::ServerSettings;
use shared::config::GameMode;
use std::path::PathBuf;

/// Authoritative arena game server
#[derive(Parser, Debug)]
#[clap(author, version, about)]
struct Args {
    /// TOML settings file; command line flags override its values
    #[clap(short, long)]
    config: Option<PathBuf>,
    /// Server IP address to bind to
    #[clap(short = 'H', long)]
    host: Option<String>,
    /// Server port to listen on
    #[clap(short, long)]
    port: Option<u16>,
    /// Room used for connections to `/`
    #[clap(short, long)]
    mode: Option<GameMode>,
    /// Maximum number of concurrent connections
    #[clap(long)]
    max_clients: Option<usize>,
    /// Seconds of silence before a connection is dropped
    #[clap(long)]
    client_timeout_secs: Option<u64>,
}

impl Args {
    fn settings(self) -> Result<ServerSettings, server::error::ServerError> {
        let mut settings = match &self.config {
            Some(path) => ServerSettings::load(path)?,
            None => ServerSettings::default(),
        };
        if let Some(host) = self.host {
            settings.host = host;
        }
        if let Some(port) = self.port {
            settings.port = port;
        }
        if let Some(mode) = self.mode {
            settings.default_mode = mode;
        }
        if let Some(max_clients) = self.max_clients {
            settings.max_clients = max_clients;
        }
        if let Some(secs) = self.client_timeout_secs {
            settings.client_timeout_secs = secs;
        }
        Ok(settings)
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();

    let settings = Args::parse().settings()?;
    info!(
        "Starting server on {} (default room /{})",
        settings.bind_addr(),
        settings.default_mode
    );

    let mut server = match Server::bind(settings).await {
        Ok(server) => server,
        Err(e) => {
            error!("{}", e);
            return Err(e.into());
        }
    };

    tokio::select! {
        result = server.run() => {
            if let Err(e) = result {
                error!("Server stopped: {}", e);
                return Err(e.into());
            }
        }
        _ = tokio::signal::ctrl_c() => {
            info!("Received Ctrl+C, shutting down gracefully...");
        }
    }

    Ok(())
}

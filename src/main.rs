use clap::Parser;
use dock::app::App;
use dock::config::{Config, DEFAULT_CONFIG_PATH};
use std::net::SocketAddr;
use std::path::PathBuf;

#[derive(Debug, Parser)]
#[command(name = "dock", about = "Schema-less object storage API server")]
struct Cli {
    /// Path of the JSON configuration file.
    #[arg(long, default_value = DEFAULT_CONFIG_PATH)]
    config: PathBuf,

    /// Address to listen on; overrides `server.bind`.
    #[arg(long)]
    bind: Option<SocketAddr>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config = Config::load(&cli.config)?;

    tracing_subscriber::fmt()
        .with_max_level(config.log_level())
        .init();

    if !cli.config.exists() {
        tracing::warn!(
            "No configuration file at {}, running on defaults",
            cli.config.display()
        );
    }

    let bind_addr: SocketAddr = match cli.bind {
        Some(addr) => addr,
        None => config.server.bind.parse()?,
    };

    // 1. Collaborators, dispatcher and the root of the resource tree:
    let app = App::build(&config);
    tracing::info!(
        "Tree settings: mailbox capacity {}, idle timeout {:?}",
        config.tree_settings().mailbox_capacity,
        config.tree_settings().idle_timeout
    );

    // 2. Start HTTP server:
    tracing::info!("HTTP server listening on {}", bind_addr);
    tracing::info!("Press Ctrl+C to shutdown");

    let listener = tokio::net::TcpListener::bind(bind_addr).await?;
    axum::serve(listener, app.router).await?;

    Ok(())
}

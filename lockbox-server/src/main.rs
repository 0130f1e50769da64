use clap::Parser;
use lockbox_server::ServerConfig;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "lockbox-server", about = "Lockbox vault sync server")]
struct Cli {
    /// Path to configuration file
    #[arg(short, long, default_value = "server.toml")]
    config: PathBuf,

    /// Listen address override
    #[arg(short, long)]
    listen: Option<String>,

    /// Database path override
    #[arg(short, long)]
    database: Option<PathBuf>,

    /// Object storage directory override
    #[arg(long)]
    storage_dir: Option<PathBuf>,

    /// Public base URL used in presigned URLs
    #[arg(long)]
    public_url: Option<String>,

    /// Secret for signing tokens and URLs
    #[arg(long, env = "LOCKBOX_TOKEN_SECRET", hide_env_values = true)]
    token_secret: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("info".parse()?))
        .init();

    let cli = Cli::parse();

    let mut cfg = if cli.config.exists() {
        ServerConfig::load(&cli.config)?
    } else {
        tracing::info!("No config file found, using defaults");
        ServerConfig::default()
    };

    if let Some(listen) = cli.listen {
        cfg.listen_addr = listen;
    }
    if let Some(database) = cli.database {
        cfg.database_path = database;
    }
    if let Some(storage_dir) = cli.storage_dir {
        cfg.storage_dir = storage_dir;
    }
    if let Some(public_url) = cli.public_url {
        cfg.public_url = public_url;
    }
    if let Some(secret) = cli.token_secret {
        cfg.token_secret = Some(secret);
    }

    tracing::info!("Starting lockbox server on {}", cfg.listen_addr);

    let listener = tokio::net::TcpListener::bind(&cfg.listen_addr).await?;
    lockbox_server::serve(listener, cfg).await
}

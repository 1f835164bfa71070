use aidvise_core::AidviseConfig;
use clap::Parser;
use tokio::sync::broadcast;
use tracing_subscriber::{fmt, EnvFilter};

use aidvise_server::http::{self, HttpState};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    #[arg(short, long, default_value = "aidvise.toml")]
    config: String,

    /// Build all clients, print the health report and exit
    #[arg(long)]
    health: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env file if present
    dotenvy::dotenv().ok();

    let args = Args::parse();

    // Load config
    let config = match AidviseConfig::load(&args.config) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Failed to load config from {}: {}", args.config, e);
            std::process::exit(1);
        }
    };

    // Init logging: RUST_LOG wins over service.log_level
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.service.log_level));
    fmt().with_env_filter(filter).init();

    let state = match HttpState::from_config(&config).await {
        Ok(s) => s,
        Err(e) => {
            eprintln!("Failed to initialise services: {}", e);
            std::process::exit(1);
        }
    };

    if args.health {
        let (status, body) = http::health_inner(&state).await;
        println!("{}", serde_json::to_string_pretty(&body)?);
        if !status.is_success() {
            std::process::exit(1);
        }
        return Ok(());
    }

    tracing::info!(
        store = config.store.backend.as_str(),
        model = %config.inference.model,
        min_length = config.symptoms.min_length,
        "Aidvise server starting"
    );

    let (tx, _rx) = broadcast::channel(1);
    let shutdown_tx = tx.clone();

    tokio::spawn(async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("Failed to listen for Ctrl+C: {}", e);
            return;
        }
        tracing::info!("Shutdown signal received");
        let _ = shutdown_tx.send(());
    });

    let addr = format!("{}:{}", config.http.host, config.http.port);
    http::start_http_server(state, addr, tx.subscribe()).await?;

    Ok(())
}

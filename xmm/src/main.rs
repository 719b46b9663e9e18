mod cli;
mod config;
mod engine;
mod error;
mod events;
mod feed;
mod gateway;
mod strategy;

use clap::Parser;
use cli::Command;
use tokio_util::sync::CancellationToken;
use tracing::info;

use venues::ApiCredentials;

#[tokio::main]
async fn main() {
    rustls::crypto::ring::default_provider()
        .install_default()
        .expect("failed to install rustls crypto provider");

    let cli = cli::Cli::parse();

    // Initialize tracing
    let filter = cli
        .log_level
        .parse::<tracing_subscriber::filter::LevelFilter>()
        .unwrap_or(tracing_subscriber::filter::LevelFilter::INFO);

    tracing_subscriber::fmt()
        .with_max_level(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    // Shared cancellation token + signal handlers.
    let cancel = setup_signal_handlers();

    match cli.command {
        Command::Run(args) => {
            let _ = dotenvy::dotenv(); // load .env if present

            let bybit_creds = match ApiCredentials::from_file(&args.bybit_keys) {
                Ok(c) => c,
                Err(e) => {
                    tracing::error!(error = %e, "failed to load derivatives-venue credentials");
                    std::process::exit(1);
                }
            };
            let binance_creds = match ApiCredentials::from_file(&args.binance_keys) {
                Ok(c) => c,
                Err(e) => {
                    tracing::error!(error = %e, "failed to load futures-venue credentials");
                    std::process::exit(1);
                }
            };

            let cfg = config::EngineConfig {
                symbol: args.symbol.to_uppercase(),
                hedge_symbol: args.hedge_symbol.to_uppercase(),
                hedge_pair: args.hedge_pair.to_uppercase(),
                quote_size: args.quote_size,
                inventory_limit: args.inventory_limit,
                hedge_ratio: args.hedge_ratio,
                risk: args.risk,
                update_interval: args.update_interval,
                ..Default::default()
            };

            if let Err(e) = engine::run(cfg, bybit_creds, binance_creds, cancel).await {
                tracing::error!(error = %e, "engine fatal error");
                std::process::exit(1);
            }
        }
    }
}

/// Register SIGINT and SIGTERM handlers that trigger the returned token.
fn setup_signal_handlers() -> CancellationToken {
    let cancel = CancellationToken::new();

    let cancel_clone = cancel.clone();
    tokio::spawn(async move {
        let _ = tokio::signal::ctrl_c().await;
        info!("received SIGINT, shutting down");
        cancel_clone.cancel();
    });

    #[cfg(unix)]
    {
        let cancel_clone = cancel.clone();
        tokio::spawn(async move {
            let mut sig = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
                .expect("failed to register SIGTERM handler");
            sig.recv().await;
            info!("received SIGTERM, shutting down");
            cancel_clone.cancel();
        });
    }

    cancel
}

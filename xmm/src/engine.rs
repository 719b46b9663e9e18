//! Orchestrator: wires the venue clients, feeds, gateway, and strategy
//! together and runs the strategy event loop.
//!
//! Task layout: one WebSocket supervisor and one feed task per venue, plus
//! per-request gateway tasks. The strategy itself runs in this function's
//! select loop and is the only consumer of the event channel, so handlers
//! see events in channel order.

use std::time::Duration;

use tokio::sync::mpsc;
use tokio::time;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use venues::{ApiCredentials, BinanceClient, BinanceRest, BybitClient, BybitRest};

use crate::config::EngineConfig;
use crate::error::EngineError;
use crate::feed::{BinanceFeed, BybitFeed};
use crate::gateway::Gateway;
use crate::strategy::Strategy;

const BYBIT_REST_URL: &str = "https://api.bybit.com";
const BYBIT_WS_URL: &str = "wss://stream.bybit.com";
const BINANCE_REST_URL: &str = "https://dapi.binance.com";
const BINANCE_WS_URL: &str = "wss://dstream.binance.com";

const EVENT_CHANNEL_CAPACITY: usize = 1024;
const CLIENT_CHANNEL_CAPACITY: usize = 256;

/// Run the engine until `cancel` fires. Resting quotes are pulled on the way
/// out.
pub async fn run(
    cfg: EngineConfig,
    bybit_creds: ApiCredentials,
    binance_creds: ApiCredentials,
    cancel: CancellationToken,
) -> Result<(), EngineError> {
    let bybit_rest = BybitRest::new(BYBIT_REST_URL, bybit_creds.clone());
    let binance_rest = BinanceRest::new(BINANCE_REST_URL, binance_creds);

    // Fail fast on bad credentials before wiring any tasks; both probes are
    // the same signed endpoints the clients hit on every reconnect.
    let position = bybit_rest.position(&cfg.symbol).await?;
    info!(
        pos = position.map(|p| p.signed_size()).unwrap_or(0),
        "derivatives venue reachable"
    );
    let positions = binance_rest.position_risk(&cfg.hedge_pair).await?;
    info!(rows = positions.len(), "futures venue reachable");

    let (event_tx, mut event_rx) = mpsc::channel(EVENT_CHANNEL_CAPACITY);

    let gateway = Gateway::new(
        bybit_rest.clone(),
        binance_rest.clone(),
        &cfg.symbol,
        &cfg.hedge_symbol,
        event_tx.clone(),
    );

    // Quoted venue: WebSocket supervisor feeding the topic demux.
    let (bybit_tx, bybit_rx) = mpsc::channel(CLIENT_CHANNEL_CAPACITY);
    let (resync_tx, resync_rx) = mpsc::channel(4);
    let bybit_client = BybitClient::new(BYBIT_WS_URL, bybit_creds, bybit_rest.clone(), &cfg.symbol);
    tokio::spawn(bybit_client.run(bybit_tx, resync_rx, cancel.clone()));
    let bybit_feed = BybitFeed::new(&cfg.symbol, event_tx.clone(), resync_tx);
    tokio::spawn(bybit_feed.run(bybit_rx, cancel.clone()));

    // Hedge venue.
    let (binance_tx, binance_rx) = mpsc::channel(CLIENT_CHANNEL_CAPACITY);
    let binance_client = BinanceClient::new(
        BINANCE_WS_URL,
        binance_rest.clone(),
        &cfg.hedge_symbol,
        &cfg.hedge_pair,
    );
    tokio::spawn(binance_client.run(binance_tx, cancel.clone()));
    let binance_feed = BinanceFeed::new(&cfg.hedge_symbol, event_tx.clone());
    tokio::spawn(binance_feed.run(binance_rx, cancel.clone()));

    // Strategy event loop.
    let mut strategy = Strategy::new(cfg.clone(), gateway);
    let mut status_interval = time::interval(Duration::from_millis(cfg.status_interval_ms));
    status_interval.tick().await;

    info!(symbol = %cfg.symbol, hedge = %cfg.hedge_symbol, "engine running");

    loop {
        tokio::select! {
            event = event_rx.recv() => {
                match event {
                    Some(event) => strategy.handle_event(event),
                    None => {
                        error!("all event producers stopped");
                        break;
                    }
                }
            }
            _ = status_interval.tick() => strategy.log_status(),
            _ = cancel.cancelled() => {
                info!("shutdown requested");
                break;
            }
        }
    }

    // Pull both quotes before exiting so nothing rests unattended.
    match bybit_rest.cancel_all(&cfg.symbol).await {
        Ok(resp) if resp.is_success() => info!("resting orders cancelled — goodbye"),
        Ok(resp) => error!(code = resp.ret_code, msg = %resp.ret_msg, "cancel-all rejected"),
        Err(e) => error!(error = %e, "cancel-all failed"),
    }
    Ok(())
}

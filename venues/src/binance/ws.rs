//! WebSocket client for the futures venue.
//!
//! Connects to the private stream at `wss://<host>/ws/<listenKey>`, subscribes
//! to the 100 ms depth stream, and answers the venue's protocol-level pings.
//! The listen key is refreshed every 30 minutes for as long as the connection
//! lives. The REST depth snapshot is requested only after the first
//! `depthUpdate` of a connection has been seen, so the feed always has
//! buffered deltas to reconcile against the snapshot's `lastUpdateId`.

use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio::time;
use tokio_tungstenite::tungstenite::Message;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::error::{Result, VenueError};

use super::rest::BinanceRest;
use super::types::{DepthSnapshot, OpenOrder, PositionRisk};

const LISTEN_KEY_REFRESH: Duration = Duration::from_secs(30 * 60);
const RECONNECT_DELAY: Duration = Duration::from_secs(3);
const DEPTH_SNAPSHOT_LIMIT: u32 = 1000;

/// Events emitted to the feed layer.
#[derive(Debug)]
pub enum BinanceEvent {
    /// A raw stream message, routed by the feed on its `e` event code.
    Stream(serde_json::Value),
    /// REST depth snapshot; arrives some time after the first depth delta.
    DepthSnapshot(DepthSnapshot),
    /// REST open-orders snapshot, fetched on (re)connect.
    OrderSnapshot(Vec<OpenOrder>),
    /// REST position snapshot, fetched on (re)connect.
    PositionSnapshot(Vec<PositionRisk>),
    /// The connection dropped; the local book is invalid until the next
    /// snapshot reconciliation completes.
    BookReset,
}

/// Long-lived connection supervisor for the futures venue.
pub struct BinanceClient {
    ws_url: String,
    rest: BinanceRest,
    symbol: String,
    pair: String,
}

impl BinanceClient {
    /// `ws_url` is the stream host base, e.g. `wss://dstream.binance.com`.
    pub fn new(ws_url: &str, rest: BinanceRest, symbol: &str, pair: &str) -> Self {
        Self {
            ws_url: ws_url.trim_end_matches('/').to_string(),
            rest,
            symbol: symbol.to_string(),
            pair: pair.to_string(),
        }
    }

    /// Run the connect loop until cancelled or a fatal auth error.
    pub async fn run(self, tx: mpsc::Sender<BinanceEvent>, cancel: CancellationToken) {
        loop {
            match self.run_connection(&tx, &cancel).await {
                Ok(()) => {
                    info!("binance client stopped");
                    return;
                }
                Err(e) if e.is_fatal() => {
                    error!(error = %e, "binance client terminating");
                    return;
                }
                Err(e) => {
                    warn!(error = %e, "binance connection error");
                    if tx.send(BinanceEvent::BookReset).await.is_err() {
                        return;
                    }
                    tokio::select! {
                        _ = time::sleep(RECONNECT_DELAY) => {}
                        _ = cancel.cancelled() => return,
                    }
                }
            }
        }
    }

    async fn run_connection(
        &self,
        tx: &mpsc::Sender<BinanceEvent>,
        cancel: &CancellationToken,
    ) -> Result<()> {
        let listen_key = self.rest.create_listen_key().await?;
        let uri = format!("{}/ws/{listen_key}", self.ws_url);
        let (ws_stream, _) = tokio_tungstenite::connect_async(&uri).await?;
        let (mut sink, mut stream) = ws_stream.split();
        info!("binance connected");

        let sub = serde_json::json!({
            "method": "SUBSCRIBE",
            "params": [format!("{}@depth@100ms", self.symbol.to_lowercase())],
        });
        sink.send(Message::Text(sub.to_string())).await?;

        // Private-state snapshots before entering the stream loop.
        let orders = self.rest.open_orders(&self.symbol).await?;
        send(tx, BinanceEvent::OrderSnapshot(orders)).await?;
        let positions = self.rest.position_risk(&self.pair).await?;
        send(tx, BinanceEvent::PositionSnapshot(positions)).await?;

        let mut refresh_interval = time::interval(LISTEN_KEY_REFRESH);
        refresh_interval.tick().await;

        // One snapshot request per connection, armed by the first delta.
        let mut depth_snapshot_requested = false;

        loop {
            tokio::select! {
                msg = stream.next() => {
                    match msg {
                        Some(Ok(Message::Text(text))) => {
                            let value: serde_json::Value = match serde_json::from_str(&text) {
                                Ok(v) => v,
                                Err(e) => {
                                    debug!(error = %e, "unparseable stream message");
                                    continue;
                                }
                            };
                            if !depth_snapshot_requested
                                && value.get("e").and_then(|e| e.as_str()) == Some("depthUpdate")
                            {
                                depth_snapshot_requested = true;
                                self.spawn_depth_snapshot(tx.clone());
                            }
                            send(tx, BinanceEvent::Stream(value)).await?;
                        }
                        Some(Ok(Message::Ping(data))) => {
                            sink.send(Message::Pong(data)).await?;
                        }
                        Some(Ok(Message::Close(_))) | None => {
                            return Err(VenueError::ConnectionClosed);
                        }
                        Some(Ok(_)) => {}
                        Some(Err(e)) => return Err(e.into()),
                    }
                }
                _ = refresh_interval.tick() => {
                    match self.rest.create_listen_key().await {
                        Ok(_) => debug!("listen key refreshed"),
                        Err(e) => warn!(error = %e, "listen key refresh failed"),
                    }
                }
                _ = cancel.cancelled() => {
                    let _ = sink.send(Message::Close(None)).await;
                    return Ok(());
                }
            }
        }
    }

    /// Fetch the depth snapshot off the stream loop so deltas keep flowing
    /// (and buffering in the feed) while the request is in flight.
    fn spawn_depth_snapshot(&self, tx: mpsc::Sender<BinanceEvent>) {
        let rest = self.rest.clone();
        let symbol = self.symbol.clone();
        tokio::spawn(async move {
            match rest.depth_snapshot(&symbol, DEPTH_SNAPSHOT_LIMIT).await {
                Ok(snapshot) => {
                    let _ = tx.send(BinanceEvent::DepthSnapshot(snapshot)).await;
                }
                Err(e) => error!(error = %e, "depth snapshot fetch failed"),
            }
        });
    }
}

async fn send(tx: &mpsc::Sender<BinanceEvent>, event: BinanceEvent) -> Result<()> {
    tx.send(event).await.map_err(|_| VenueError::ChannelClosed)
}

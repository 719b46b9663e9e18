//! WebSocket client for the derivatives venue.
//!
//! Authenticates via query parameters on the connect URI (`api_key`,
//! `expires`, `signature` over `"GET/realtime" + expires`), subscribes to the
//! book, order, execution and position topics, and keeps the connection alive
//! with a JSON ping every 30 s. A missing pong before the next ping, any
//! transport fault, or a book-resync request tears the connection down and
//! the outer loop reconnects after emitting [`BybitEvent::BookReset`].

use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio::time;
use tokio_tungstenite::tungstenite::Message;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::creds::{epoch_ms, ApiCredentials};
use crate::error::{Result, VenueError};

use super::rest::BybitRest;
use super::types::{PositionInfo, StreamEnvelope};

const PING_INTERVAL: Duration = Duration::from_secs(30);
const RECONNECT_DELAY: Duration = Duration::from_secs(3);

/// Events emitted to the feed layer.
#[derive(Debug)]
pub enum BybitEvent {
    /// A topic-bearing message from the realtime stream, still undecoded.
    Stream(StreamEnvelope),
    /// REST open-orders snapshot, fetched on (re)connect.
    OrderSnapshot(Vec<super::types::OrderUpdate>),
    /// REST position snapshot, fetched on (re)connect.
    PositionSnapshot(PositionInfo),
    /// The connection dropped; the local book is stale and must be rebuilt
    /// from the snapshot the venue sends after resubscribing.
    BookReset,
}

/// Long-lived connection supervisor for the derivatives venue.
pub struct BybitClient {
    ws_url: String,
    creds: ApiCredentials,
    rest: BybitRest,
    symbol: String,
}

impl BybitClient {
    /// `ws_url` is the stream host base, e.g. `wss://stream.bybit.com`.
    pub fn new(ws_url: &str, creds: ApiCredentials, rest: BybitRest, symbol: &str) -> Self {
        Self {
            ws_url: ws_url.trim_end_matches('/').to_string(),
            creds,
            rest,
            symbol: symbol.to_string(),
        }
    }

    /// Run the connect loop until cancelled or a fatal auth error.
    ///
    /// `resync_rx` lets the feed force a reconnect when it needs a fresh
    /// book snapshot (the venue only sends snapshots on subscribe).
    pub async fn run(
        self,
        tx: mpsc::Sender<BybitEvent>,
        mut resync_rx: mpsc::Receiver<()>,
        cancel: CancellationToken,
    ) {
        loop {
            match self.run_connection(&tx, &mut resync_rx, &cancel).await {
                Ok(()) => {
                    info!("bybit client stopped");
                    return;
                }
                Err(e) if e.is_fatal() => {
                    error!(error = %e, "bybit client terminating");
                    return;
                }
                Err(e) => {
                    warn!(error = %e, "bybit connection error");
                    if tx.send(BybitEvent::BookReset).await.is_err() {
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

    /// Signed connect URI: `wss://<host>/realtime?api_key=…&expires=…&signature=…`.
    fn signed_uri(&self) -> String {
        let expires = epoch_ms() + 5000;
        let signature = self.creds.sign(&format!("GET/realtime{expires}"));
        let query = url::form_urlencoded::Serializer::new(String::new())
            .append_pair("api_key", &self.creds.key)
            .append_pair("expires", &expires.to_string())
            .append_pair("signature", &signature)
            .finish();
        format!("{}/realtime?{query}", self.ws_url)
    }

    async fn run_connection(
        &self,
        tx: &mpsc::Sender<BybitEvent>,
        resync_rx: &mut mpsc::Receiver<()>,
        cancel: &CancellationToken,
    ) -> Result<()> {
        let uri = self.signed_uri();
        let (ws_stream, _) = tokio_tungstenite::connect_async(&uri).await?;
        let (mut sink, mut stream) = ws_stream.split();
        info!("bybit connected");

        let sub = serde_json::json!({
            "op": "subscribe",
            "args": [
                format!("orderBookL2_25.{}", self.symbol),
                "order",
                "execution",
                "position",
            ],
        });
        sink.send(Message::Text(sub.to_string())).await?;

        // Private-state snapshots before entering the stream loop: the feed
        // forwards these so the strategy can rebuild orders and position.
        let orders = self.rest.open_orders(&self.symbol).await?;
        send(tx, BybitEvent::OrderSnapshot(orders)).await?;
        let position = self
            .rest
            .position(&self.symbol)
            .await?
            .unwrap_or_else(|| PositionInfo {
                symbol: self.symbol.clone(),
                side: "None".to_string(),
                size: 0,
            });
        send(tx, BybitEvent::PositionSnapshot(position)).await?;

        let ping = serde_json::json!({"op": "ping"}).to_string();
        let mut ping_interval = time::interval(PING_INTERVAL);
        ping_interval.tick().await;
        let mut awaiting_pong = false;

        loop {
            tokio::select! {
                msg = stream.next() => {
                    match msg {
                        Some(Ok(Message::Text(text))) => {
                            self.handle_text(&text, tx, &mut awaiting_pong).await?;
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
                _ = ping_interval.tick() => {
                    if awaiting_pong {
                        return Err(VenueError::HeartbeatMiss(PING_INTERVAL.as_secs()));
                    }
                    sink.send(Message::Text(ping.clone())).await?;
                    awaiting_pong = true;
                }
                _ = resync_rx.recv() => {
                    warn!("book resync requested, reconnecting for a fresh snapshot");
                    return Err(VenueError::ConnectionClosed);
                }
                _ = cancel.cancelled() => {
                    let _ = sink.send(Message::Close(None)).await;
                    return Ok(());
                }
            }
        }
    }

    async fn handle_text(
        &self,
        text: &str,
        tx: &mpsc::Sender<BybitEvent>,
        awaiting_pong: &mut bool,
    ) -> Result<()> {
        let env: StreamEnvelope = match serde_json::from_str(text) {
            Ok(env) => env,
            Err(e) => {
                debug!(error = %e, "unparseable stream message");
                return Ok(());
            }
        };

        if env.ret_msg.as_deref() == Some("pong") && env.success == Some(true) {
            *awaiting_pong = false;
            return Ok(());
        }
        if env.success == Some(false) {
            let msg = env.ret_msg.unwrap_or_else(|| "request rejected".to_string());
            return Err(VenueError::Auth(msg));
        }
        if env.topic.is_some() {
            return send(tx, BybitEvent::Stream(env)).await;
        }
        debug!("control message ignored");
        Ok(())
    }
}

async fn send(tx: &mpsc::Sender<BybitEvent>, event: BybitEvent) -> Result<()> {
    tx.send(event).await.map_err(|_| VenueError::ChannelClosed)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn client() -> BybitClient {
        let creds = ApiCredentials::from_json(r#"{"id":"key","secret":"secret"}"#).unwrap();
        let rest = BybitRest::new("https://example.com", creds.clone());
        BybitClient::new("wss://stream.example.com", creds, rest, "BTCUSD")
    }

    #[test]
    fn test_signed_uri_shape() {
        let uri = client().signed_uri();
        assert!(uri.starts_with("wss://stream.example.com/realtime?api_key=key&expires="));
        assert!(uri.contains("&signature="));
    }

    #[test]
    fn test_signed_uri_signature_covers_expires() {
        let creds = ApiCredentials::from_json(r#"{"id":"key","secret":"secret"}"#).unwrap();
        let uri = client().signed_uri();
        let expires: u64 = uri
            .split("expires=")
            .nth(1)
            .and_then(|s| s.split('&').next())
            .unwrap()
            .parse()
            .unwrap();
        let signature = uri.split("signature=").nth(1).unwrap();
        assert_eq!(signature, creds.sign(&format!("GET/realtime{expires}")));
    }
}

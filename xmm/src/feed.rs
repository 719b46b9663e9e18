//! Feeds: translate venue-specific messages into [`StrategyEvent`]s.
//!
//! One feed task per venue owns that venue's local book. After every book
//! mutation the feed reads the top of book and emits a BBO event only when
//! the `(bid, ask)` tuple differs from the last one emitted; a snapshot
//! always emits and resets the latch. Events reach the strategy in socket
//! order because each feed is a single task writing to one channel.

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use venues::binance::types::{AccountUpdate, DepthSnapshot, DepthUpdate, OrderTradeUpdate};
use venues::bybit::types::{L2Delta, L2Row, StreamEnvelope};
use venues::{Bbo, BinanceBook, BinanceEvent, BybitBook, BybitEvent, VenueError};

use crate::events::StrategyEvent;

// ---------------------------------------------------------------------------
// Derivatives venue (delta-25 protocol)
// ---------------------------------------------------------------------------

/// Feed for the quoted venue: routes topics, owns the delta-25 book.
pub struct BybitFeed {
    symbol: String,
    book_topic: String,
    book: Option<BybitBook>,
    last_bbo: Option<Bbo>,
    events: mpsc::Sender<StrategyEvent>,
    /// Asks the WS client to reconnect when the book must be rebuilt.
    resync: mpsc::Sender<()>,
}

impl BybitFeed {
    pub fn new(symbol: &str, events: mpsc::Sender<StrategyEvent>, resync: mpsc::Sender<()>) -> Self {
        Self {
            symbol: symbol.to_string(),
            book_topic: format!("orderBookL2_25.{symbol}"),
            book: None,
            last_bbo: None,
            events,
            resync,
        }
    }

    /// Consume client events until the channel closes or `cancel` fires.
    pub async fn run(mut self, mut rx: mpsc::Receiver<BybitEvent>, cancel: CancellationToken) {
        loop {
            tokio::select! {
                event = rx.recv() => {
                    match event {
                        Some(event) => self.handle(event).await,
                        None => {
                            info!("bybit feed channel closed");
                            return;
                        }
                    }
                }
                _ = cancel.cancelled() => {
                    debug!("bybit feed stopped");
                    return;
                }
            }
        }
    }

    async fn handle(&mut self, event: BybitEvent) {
        match event {
            BybitEvent::Stream(env) => self.on_stream(env).await,
            BybitEvent::OrderSnapshot(rows) => {
                self.send(StrategyEvent::OrderSnapshotA(rows)).await;
            }
            BybitEvent::PositionSnapshot(pos) => {
                self.send(StrategyEvent::PositionSnapshotA(pos)).await;
            }
            BybitEvent::BookReset => {
                self.book = None;
                self.last_bbo = None;
            }
        }
    }

    async fn on_stream(&mut self, env: StreamEnvelope) {
        let Some(topic) = env.topic.as_deref() else {
            return;
        };
        let Some(data) = env.data else {
            return;
        };

        if topic == self.book_topic {
            self.on_book_message(env.kind.as_deref(), data).await;
        } else if topic == "order" {
            match serde_json::from_value(data) {
                Ok(rows) => self.send(StrategyEvent::OrderUpdates(rows)).await,
                Err(e) => warn!(error = %e, "bad order payload"),
            }
        } else if topic == "execution" {
            match serde_json::from_value(data) {
                Ok(rows) => self.send(StrategyEvent::Executions(rows)).await,
                Err(e) => warn!(error = %e, "bad execution payload"),
            }
        } else if topic == "position" {
            match serde_json::from_value(data) {
                Ok(rows) => self.send(StrategyEvent::PositionUpdates(rows)).await,
                Err(e) => warn!(error = %e, "bad position payload"),
            }
        } else {
            debug!(topic, "unhandled topic");
        }
    }

    async fn on_book_message(&mut self, kind: Option<&str>, data: serde_json::Value) {
        match kind {
            Some("snapshot") => {
                let rows: Vec<L2Row> = match serde_json::from_value(data) {
                    Ok(rows) => rows,
                    Err(e) => {
                        warn!(error = %e, "bad book snapshot");
                        return;
                    }
                };
                self.book = Some(BybitBook::from_snapshot(&rows));
                info!(symbol = %self.symbol, "book snapshot applied");
                self.emit_bbo(true).await;
            }
            Some("delta") => {
                let delta: L2Delta = match serde_json::from_value(data) {
                    Ok(delta) => delta,
                    Err(e) => {
                        warn!(error = %e, "bad book delta");
                        return;
                    }
                };
                // Deltas between a reset and the next snapshot are dropped;
                // the snapshot supersedes them.
                let Some(book) = self.book.as_mut() else {
                    return;
                };
                match book.apply_delta(&delta) {
                    Ok(()) => self.emit_bbo(false).await,
                    Err(e @ VenueError::BookInconsistent { .. }) => {
                        warn!(error = %e, "dropping book, requesting resync");
                        self.book = None;
                        self.last_bbo = None;
                        let _ = self.resync.try_send(());
                    }
                    Err(e) => warn!(error = %e, "delta apply failed"),
                }
            }
            other => debug!(kind = ?other, "unknown book message type"),
        }
    }

    async fn emit_bbo(&mut self, force: bool) {
        let Some(bbo) = self.book.as_ref().and_then(BybitBook::bbo) else {
            return;
        };
        if force || self.last_bbo != Some(bbo) {
            self.last_bbo = Some(bbo);
            self.send(StrategyEvent::BboA(bbo)).await;
        }
    }

    async fn send(&self, event: StrategyEvent) {
        if self.events.send(event).await.is_err() {
            warn!("strategy channel closed");
        }
    }
}

// ---------------------------------------------------------------------------
// Futures venue (incremental depth protocol)
// ---------------------------------------------------------------------------

/// Feed for the hedge venue: routes event codes, owns the depth book, and
/// reconciles buffered deltas against the REST snapshot.
pub struct BinanceFeed {
    symbol: String,
    book: Option<BinanceBook>,
    /// Deltas received between subscribe (or reset) and snapshot arrival.
    buffer: Vec<DepthUpdate>,
    last_bbo: Option<Bbo>,
    events: mpsc::Sender<StrategyEvent>,
}

impl BinanceFeed {
    pub fn new(symbol: &str, events: mpsc::Sender<StrategyEvent>) -> Self {
        Self {
            symbol: symbol.to_string(),
            book: None,
            buffer: Vec::new(),
            last_bbo: None,
            events,
        }
    }

    /// Consume client events until the channel closes or `cancel` fires.
    pub async fn run(mut self, mut rx: mpsc::Receiver<BinanceEvent>, cancel: CancellationToken) {
        loop {
            tokio::select! {
                event = rx.recv() => {
                    match event {
                        Some(event) => self.handle(event).await,
                        None => {
                            info!("binance feed channel closed");
                            return;
                        }
                    }
                }
                _ = cancel.cancelled() => {
                    debug!("binance feed stopped");
                    return;
                }
            }
        }
    }

    async fn handle(&mut self, event: BinanceEvent) {
        match event {
            BinanceEvent::Stream(value) => self.on_stream(value).await,
            BinanceEvent::DepthSnapshot(snapshot) => self.on_snapshot(snapshot).await,
            BinanceEvent::OrderSnapshot(orders) => {
                // Hedge orders are fire-and-forget markets; resting orders
                // here are stale leftovers worth surfacing.
                if !orders.is_empty() {
                    warn!(count = orders.len(), "resting orders found on hedge venue");
                }
            }
            BinanceEvent::PositionSnapshot(rows) => {
                self.send(StrategyEvent::PositionSnapshotB(rows)).await;
            }
            BinanceEvent::BookReset => {
                self.book = None;
                self.buffer.clear();
                self.last_bbo = None;
            }
        }
    }

    async fn on_stream(&mut self, value: serde_json::Value) {
        match value.get("e").and_then(|e| e.as_str()) {
            Some("depthUpdate") => match serde_json::from_value::<DepthUpdate>(value) {
                Ok(update) => self.on_depth(update).await,
                Err(e) => warn!(error = %e, "bad depth update"),
            },
            Some("ACCOUNT_UPDATE") => {
                match value
                    .get("a")
                    .cloned()
                    .map(serde_json::from_value::<AccountUpdate>)
                {
                    Some(Ok(update)) => self.send(StrategyEvent::AccountUpdateB(update)).await,
                    _ => warn!("bad account update payload"),
                }
            }
            Some("ORDER_TRADE_UPDATE") => {
                match value
                    .get("o")
                    .cloned()
                    .map(serde_json::from_value::<OrderTradeUpdate>)
                {
                    Some(Ok(update)) => self.send(StrategyEvent::OrderTradeUpdateB(update)).await,
                    _ => warn!("bad order trade update payload"),
                }
            }
            // Subscription acks and listen-key expiry notices.
            other => debug!(event = ?other, "unhandled stream event"),
        }
    }

    async fn on_depth(&mut self, update: DepthUpdate) {
        if !update.symbol.is_empty() && update.symbol != self.symbol {
            return;
        }
        let Some(book) = self.book.as_mut() else {
            self.buffer.push(update);
            return;
        };
        // Already-applied ids can reappear when the snapshot task finishes
        // after later deltas were forwarded.
        if update.final_update_id <= book.last_update_id {
            return;
        }
        book.apply_update(&update);
        self.emit_bbo(false).await;
    }

    /// Exchange-mandated synchronization: seed the book, discard every
    /// buffered delta whose final update id is strictly below the snapshot's
    /// `lastUpdateId`, apply the rest in arrival order, then go live.
    async fn on_snapshot(&mut self, snapshot: DepthSnapshot) {
        let mut book = BinanceBook::from_snapshot(&snapshot);
        let mut applied = 0usize;
        let mut skipped = 0usize;
        for update in self.buffer.drain(..) {
            if update.final_update_id < snapshot.last_update_id {
                skipped += 1;
                continue;
            }
            book.apply_update(&update);
            applied += 1;
        }
        info!(
            update_id = snapshot.last_update_id,
            applied, skipped, "depth snapshot reconciled"
        );
        self.book = Some(book);
        self.emit_bbo(true).await;
    }

    async fn emit_bbo(&mut self, force: bool) {
        let Some(bbo) = self.book.as_ref().and_then(BinanceBook::bbo) else {
            return;
        };
        if force || self.last_bbo != Some(bbo) {
            self.last_bbo = Some(bbo);
            self.send(StrategyEvent::BboB(bbo)).await;
        }
    }

    async fn send(&self, event: StrategyEvent) {
        if self.events.send(event).await.is_err() {
            warn!("strategy channel closed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal::Decimal;
    use rust_decimal_macros::dec;
    use venues::bybit::types::PositionInfo;

    fn channels() -> (
        mpsc::Sender<StrategyEvent>,
        mpsc::Receiver<StrategyEvent>,
        mpsc::Sender<()>,
        mpsc::Receiver<()>,
    ) {
        let (tx, rx) = mpsc::channel(64);
        let (resync_tx, resync_rx) = mpsc::channel(4);
        (tx, rx, resync_tx, resync_rx)
    }

    fn drain(rx: &mut mpsc::Receiver<StrategyEvent>) -> Vec<StrategyEvent> {
        let mut out = Vec::new();
        while let Ok(ev) = rx.try_recv() {
            out.push(ev);
        }
        out
    }

    fn bbos_a(events: &[StrategyEvent]) -> Vec<Bbo> {
        events
            .iter()
            .filter_map(|e| match e {
                StrategyEvent::BboA(b) => Some(*b),
                _ => None,
            })
            .collect()
    }

    fn bbos_b(events: &[StrategyEvent]) -> Vec<Bbo> {
        events
            .iter()
            .filter_map(|e| match e {
                StrategyEvent::BboB(b) => Some(*b),
                _ => None,
            })
            .collect()
    }

    // -- derivatives-venue feed ------------------------------------------

    fn l2_snapshot(env_bid: Decimal, env_ask: Decimal) -> BybitEvent {
        BybitEvent::Stream(StreamEnvelope {
            topic: Some("orderBookL2_25.BTCUSD".into()),
            kind: Some("snapshot".into()),
            ret_msg: None,
            success: None,
            data: Some(serde_json::json!([
                {"price": env_bid.to_string(), "side": "Buy", "size": 100},
                {"price": env_ask.to_string(), "side": "Sell", "size": 100},
            ])),
        })
    }

    fn l2_delta(data: serde_json::Value) -> BybitEvent {
        BybitEvent::Stream(StreamEnvelope {
            topic: Some("orderBookL2_25.BTCUSD".into()),
            kind: Some("delta".into()),
            ret_msg: None,
            success: None,
            data: Some(data),
        })
    }

    #[tokio::test]
    async fn test_snapshot_emits_bbo_unconditionally() {
        let (tx, mut rx, resync_tx, _resync_rx) = channels();
        let mut feed = BybitFeed::new("BTCUSD", tx, resync_tx);

        feed.handle(l2_snapshot(dec!(8000.0), dec!(8000.5))).await;
        // Identical snapshot again: the latch is bypassed for snapshots.
        feed.handle(l2_snapshot(dec!(8000.0), dec!(8000.5))).await;

        let events = drain(&mut rx);
        assert_eq!(bbos_a(&events).len(), 2);
    }

    #[tokio::test]
    async fn test_bbo_emitted_iff_top_changed() {
        let (tx, mut rx, resync_tx, _resync_rx) = channels();
        let mut feed = BybitFeed::new("BTCUSD", tx, resync_tx);
        feed.handle(l2_snapshot(dec!(8000.0), dec!(8000.5))).await;
        drain(&mut rx);

        // Deep insert: top unchanged, nothing emitted.
        feed.handle(l2_delta(serde_json::json!({
            "insert": [{"price": "7999.0", "side": "Buy", "size": 50}]
        })))
        .await;
        assert!(bbos_a(&drain(&mut rx)).is_empty());

        // Better bid: top changed, one event.
        feed.handle(l2_delta(serde_json::json!({
            "insert": [{"price": "8000.25", "side": "Buy", "size": 10}]
        })))
        .await;
        let emitted = bbos_a(&drain(&mut rx));
        assert_eq!(emitted.len(), 1);
        assert_eq!(emitted[0].bid, dec!(8000.25));

        // Size-only update at the top: tuple unchanged, nothing emitted.
        feed.handle(l2_delta(serde_json::json!({
            "update": [{"price": "8000.25", "side": "Buy", "size": 99}]
        })))
        .await;
        assert!(bbos_a(&drain(&mut rx)).is_empty());
    }

    #[tokio::test]
    async fn test_crossed_delta_drops_book_and_requests_resync() {
        let (tx, mut rx, resync_tx, mut resync_rx) = channels();
        let mut feed = BybitFeed::new("BTCUSD", tx, resync_tx);
        feed.handle(l2_snapshot(dec!(8000.0), dec!(8000.5))).await;
        drain(&mut rx);

        feed.handle(l2_delta(serde_json::json!({
            "insert": [{"price": "8001.0", "side": "Buy", "size": 1}]
        })))
        .await;
        assert!(feed.book.is_none());
        assert!(resync_rx.try_recv().is_ok());

        // Deltas while the book is down are dropped, not applied.
        feed.handle(l2_delta(serde_json::json!({
            "delete": [{"price": "8000.0", "side": "Buy"}]
        })))
        .await;
        assert!(bbos_a(&drain(&mut rx)).is_empty());
    }

    #[tokio::test]
    async fn test_private_topics_forwarded() {
        let (tx, mut rx, resync_tx, _resync_rx) = channels();
        let mut feed = BybitFeed::new("BTCUSD", tx, resync_tx);

        feed.handle(BybitEvent::Stream(StreamEnvelope {
            topic: Some("execution".into()),
            kind: None,
            ret_msg: None,
            success: None,
            data: Some(serde_json::json!([{
                "symbol": "BTCUSD", "side": "Buy", "order_id": "o", "exec_id": "e",
                "exec_type": "Trade", "price": "8000.0", "exec_qty": 10, "leaves_qty": 0
            }])),
        }))
        .await;
        feed.handle(BybitEvent::PositionSnapshot(PositionInfo {
            symbol: "BTCUSD".into(),
            side: "None".into(),
            size: 0,
        }))
        .await;

        let events = drain(&mut rx);
        assert!(matches!(events[0], StrategyEvent::Executions(ref rows) if rows.len() == 1));
        assert!(matches!(events[1], StrategyEvent::PositionSnapshotA(_)));
    }

    // -- futures-venue feed ----------------------------------------------

    fn depth_update(u: u64, bid: &str, ask: &str) -> BinanceEvent {
        BinanceEvent::Stream(serde_json::json!({
            "e": "depthUpdate", "s": "BTCUSD_PERP",
            "U": u, "u": u,
            "b": [[bid, "10"]],
            "a": [[ask, "10"]],
        }))
    }

    fn depth_snapshot(last_update_id: u64) -> DepthSnapshot {
        DepthSnapshot {
            last_update_id,
            bids: vec![(dec!(9000.0), dec!(5))],
            asks: vec![(dec!(9000.5), dec!(5))],
        }
    }

    #[tokio::test]
    async fn test_snapshot_reconciliation_drops_stale_buffered_deltas() {
        // Buffered deltas u ∈ {10, 11, 12, 13}; snapshot lastUpdateId = 12.
        // 10 and 11 are discarded (u < 12); 12 and 13 are applied.
        let (tx, mut rx, _resync_tx, _resync_rx) = channels();
        let mut feed = BinanceFeed::new("BTCUSD_PERP", tx);

        feed.handle(depth_update(10, "8990.0", "9000.5")).await;
        feed.handle(depth_update(11, "8991.0", "9000.5")).await;
        feed.handle(depth_update(12, "9000.1", "9000.5")).await;
        feed.handle(depth_update(13, "9000.2", "9000.5")).await;
        assert!(bbos_b(&drain(&mut rx)).is_empty(), "no emissions before snapshot");

        feed.handle(BinanceEvent::DepthSnapshot(depth_snapshot(12))).await;

        let book = feed.book.as_ref().unwrap();
        assert_eq!(book.last_update_id, 13);
        // Snapshot level + the two applied deltas; the stale bids from
        // u=10/11 must not be present.
        assert_eq!(book.depth(venues::Side::Buy), 3);
        let bbo = book.bbo().unwrap();
        assert_eq!(bbo.bid, dec!(9000.2));
        assert_eq!(feed.buffer.len(), 0);

        let emitted = bbos_b(&drain(&mut rx));
        assert_eq!(emitted.len(), 1);
        assert_eq!(emitted[0].bid, dec!(9000.2));
    }

    #[tokio::test]
    async fn test_live_deltas_skip_already_applied_ids() {
        let (tx, mut rx, _resync_tx, _resync_rx) = channels();
        let mut feed = BinanceFeed::new("BTCUSD_PERP", tx);
        feed.handle(depth_update(12, "9000.1", "9000.5")).await;
        feed.handle(BinanceEvent::DepthSnapshot(depth_snapshot(12))).await;
        drain(&mut rx);

        // A replayed id must be ignored.
        feed.handle(depth_update(12, "8888.0", "9000.5")).await;
        assert_eq!(feed.book.as_ref().unwrap().bbo().unwrap().bid, dec!(9000.1));
        assert!(bbos_b(&drain(&mut rx)).is_empty());

        // A fresh id applies.
        feed.handle(depth_update(14, "9000.3", "9000.5")).await;
        assert_eq!(feed.book.as_ref().unwrap().bbo().unwrap().bid, dec!(9000.3));
    }

    #[tokio::test]
    async fn test_disconnect_resets_book_and_rebuffers() {
        let (tx, mut rx, _resync_tx, _resync_rx) = channels();
        let mut feed = BinanceFeed::new("BTCUSD_PERP", tx);
        feed.handle(depth_update(12, "9000.1", "9000.5")).await;
        feed.handle(BinanceEvent::DepthSnapshot(depth_snapshot(12))).await;
        drain(&mut rx);
        assert!(feed.book.is_some());

        // Disconnect: book cleared, deltas buffer again until the refetched
        // snapshot arrives, then reconciliation applies the fresh ones.
        feed.handle(BinanceEvent::BookReset).await;
        assert!(feed.book.is_none());

        feed.handle(depth_update(20, "9001.0", "9001.5")).await;
        assert_eq!(feed.buffer.len(), 1);
        assert!(bbos_b(&drain(&mut rx)).is_empty());

        feed.handle(BinanceEvent::DepthSnapshot(depth_snapshot(20))).await;
        let emitted = bbos_b(&drain(&mut rx));
        assert_eq!(emitted.len(), 1);
        assert_eq!(emitted[0].bid, dec!(9001.0));
    }

    #[tokio::test]
    async fn test_account_and_order_events_forwarded() {
        let (tx, mut rx, _resync_tx, _resync_rx) = channels();
        let mut feed = BinanceFeed::new("BTCUSD_PERP", tx);

        feed.handle(BinanceEvent::Stream(serde_json::json!({
            "e": "ACCOUNT_UPDATE",
            "a": {"P": [{"s": "BTCUSD_PERP", "pa": "2", "ps": "BOTH"}]}
        })))
        .await;
        feed.handle(BinanceEvent::Stream(serde_json::json!({
            "e": "ORDER_TRADE_UPDATE",
            "o": {"s": "BTCUSD_PERP", "S": "SELL", "x": "TRADE", "X": "FILLED", "l": "1", "z": "1"}
        })))
        .await;

        let events = drain(&mut rx);
        assert!(matches!(
            events[0],
            StrategyEvent::AccountUpdateB(ref a) if a.positions[0].signed_size() == 2
        ));
        assert!(matches!(
            events[1],
            StrategyEvent::OrderTradeUpdateB(ref o) if o.signed_fill() == -1
        ));
    }

    #[tokio::test]
    async fn test_foreign_symbol_deltas_ignored() {
        let (tx, mut rx, _resync_tx, _resync_rx) = channels();
        let mut feed = BinanceFeed::new("BTCUSD_PERP", tx);
        feed.handle(BinanceEvent::Stream(serde_json::json!({
            "e": "depthUpdate", "s": "ETHUSD_PERP",
            "U": 5, "u": 5, "b": [["100.0", "1"]], "a": [["101.0", "1"]],
        })))
        .await;
        assert!(feed.buffer.is_empty());
        assert!(drain(&mut rx).is_empty());
    }
}

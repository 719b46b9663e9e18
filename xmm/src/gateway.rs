//! Order gateway: dispatches signed REST operations, tracks in-flight
//! guards, and reconciles responses back into the strategy's event stream.
//!
//! `submit_*` methods are synchronous: the corresponding guard flips before
//! the request task is spawned, so the strategy can never double-issue inside
//! the issue-to-dispatch window. Guards are single-writer (gateway) /
//! single-reader (strategy) atomics; everything else flows back as
//! [`GatewayEvent`]s on the shared event channel.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use rust_decimal::Decimal;
use tokio::sync::mpsc;
use tokio::time;
use tracing::{debug, warn};

use venues::bybit::types::{OrderResult, RestResponse};
use venues::{epoch_ms, BinanceRest, BybitRest, Side};

use crate::events::{GatewayEvent, OpOutcome, OrderOp, Slot, StrategyEvent};

/// Shared operation guards.
///
/// `order_op` covers any outstanding new/amend/cancel on the quoted venue;
/// the per-slot amend flags additionally suppress concurrent amends against
/// the same resting order. `rate_limited` is set while the venue's quota is
/// exhausted and read-only for the strategy.
#[derive(Debug, Default)]
pub struct OpGuards {
    order_op: AtomicBool,
    bid_amend: AtomicBool,
    ask_amend: AtomicBool,
    rate_limited: AtomicBool,
    rate_limit_reset_ms: AtomicU64,
}

impl OpGuards {
    pub fn order_op_in_flight(&self) -> bool {
        self.order_op.load(Ordering::Acquire)
    }

    pub fn amend_in_flight(&self, slot: Slot) -> bool {
        self.amend_flag(slot).load(Ordering::Acquire)
    }

    pub fn is_rate_limited(&self) -> bool {
        self.rate_limited.load(Ordering::Acquire)
    }

    /// When the current rate-limit window ends (epoch ms), if limited.
    pub fn rate_limit_reset_ms(&self) -> u64 {
        self.rate_limit_reset_ms.load(Ordering::Acquire)
    }

    pub(crate) fn set_order_op(&self, in_flight: bool) {
        self.order_op.store(in_flight, Ordering::Release);
    }

    pub(crate) fn set_amend(&self, slot: Slot, in_flight: bool) {
        self.amend_flag(slot).store(in_flight, Ordering::Release);
    }

    pub(crate) fn set_rate_limited(&self, limited: bool) {
        self.rate_limited.store(limited, Ordering::Release);
    }

    fn amend_flag(&self, slot: Slot) -> &AtomicBool {
        match slot {
            Slot::Bid => &self.bid_amend,
            Slot::Ask => &self.ask_amend,
        }
    }
}

/// Handle for issuing venue operations. Cheap to clone.
#[derive(Clone)]
pub struct Gateway {
    inner: Arc<GatewayInner>,
}

struct GatewayInner {
    bybit: BybitRest,
    binance: BinanceRest,
    symbol: String,
    hedge_symbol: String,
    guards: Arc<OpGuards>,
    events: mpsc::Sender<StrategyEvent>,
}

impl Gateway {
    pub fn new(
        bybit: BybitRest,
        binance: BinanceRest,
        symbol: &str,
        hedge_symbol: &str,
        events: mpsc::Sender<StrategyEvent>,
    ) -> Self {
        Self {
            inner: Arc::new(GatewayInner {
                bybit,
                binance,
                symbol: symbol.to_string(),
                hedge_symbol: hedge_symbol.to_string(),
                guards: Arc::new(OpGuards::default()),
                events,
            }),
        }
    }

    pub fn guards(&self) -> Arc<OpGuards> {
        Arc::clone(&self.inner.guards)
    }

    /// Issue a new post-only limit order for `slot`.
    pub fn submit_new(&self, slot: Slot, client_id: String, price: Decimal, qty: i64) {
        let inner = Arc::clone(&self.inner);
        inner.guards.set_order_op(true);
        tokio::spawn(async move {
            let result = inner
                .bybit
                .create_order(&inner.symbol, slot.side(), &client_id, price, qty)
                .await;
            inner.finish_order_op(slot, OrderOp::New, result).await;
        });
    }

    /// Issue a price amend for `slot`'s resting order.
    pub fn submit_amend(&self, slot: Slot, client_id: String, new_price: Decimal) {
        let inner = Arc::clone(&self.inner);
        inner.guards.set_order_op(true);
        inner.guards.set_amend(slot, true);
        tokio::spawn(async move {
            let result = inner
                .bybit
                .replace_order(&inner.symbol, &client_id, new_price)
                .await;
            inner.finish_order_op(slot, OrderOp::Amend, result).await;
        });
    }

    /// Cancel every resting order on the quoted venue.
    pub fn submit_cancel_all(&self) {
        let inner = Arc::clone(&self.inner);
        inner.guards.set_order_op(true);
        tokio::spawn(async move {
            let result = inner.bybit.cancel_all(&inner.symbol).await;
            let outcome = match result {
                Ok(resp) => {
                    inner.note_rate_limit(resp.rate_limit_status, resp.rate_limit_reset_ms).await;
                    interpret(&resp)
                }
                Err(e) => OpOutcome::TransportError(e.to_string()),
            };
            inner.guards.set_order_op(false);
            inner
                .publish(GatewayEvent::CancelAll { outcome })
                .await;
        });
    }

    /// Fire a market order on the hedge venue.
    pub fn submit_hedge(&self, side: Side, qty: i64) {
        let inner = Arc::clone(&self.inner);
        tokio::spawn(async move {
            let outcome = match inner.binance.market_order(&inner.hedge_symbol, side, qty).await {
                Ok(ack) => {
                    debug!(order_id = ack.order_id, "hedge order accepted");
                    OpOutcome::Accepted
                }
                Err(venues::VenueError::Reject { code, message }) => {
                    OpOutcome::Rejected { code, message }
                }
                Err(e) => OpOutcome::TransportError(e.to_string()),
            };
            inner.publish(GatewayEvent::Hedge { qty, outcome }).await;
        });
    }
}

impl GatewayInner {
    /// Response finalization shared by new and amend: note rate limiting,
    /// clear guards, report the outcome.
    async fn finish_order_op(
        &self,
        slot: Slot,
        op: OrderOp,
        result: venues::Result<RestResponse<OrderResult>>,
    ) {
        let outcome = match result {
            Ok(resp) => {
                self.note_rate_limit(resp.rate_limit_status, resp.rate_limit_reset_ms).await;
                interpret(&resp)
            }
            Err(e) => OpOutcome::TransportError(e.to_string()),
        };

        if op == OrderOp::Amend {
            self.guards.set_amend(slot, false);
        }
        self.guards.set_order_op(false);
        self.publish(GatewayEvent::OrderOp { slot, op, outcome }).await;
    }

    /// Enter the rate-limited state when the venue reports a drained quota
    /// and schedule the clear at `reset_at`.
    async fn note_rate_limit(&self, remaining: Option<i64>, reset_at_ms: Option<u64>) {
        if remaining != Some(0) {
            return;
        }
        let reset_at = reset_at_ms.unwrap_or_else(epoch_ms);
        self.guards.rate_limit_reset_ms.store(reset_at, Ordering::Release);
        self.guards.set_rate_limited(true);
        warn!(reset_at_ms = reset_at, "rate limit exhausted, backing off");
        spawn_rate_limit_clear(Arc::clone(&self.guards), reset_at);
        self.publish(GatewayEvent::RateLimited { reset_at_ms: reset_at }).await;
    }

    async fn publish(&self, event: GatewayEvent) {
        let _ = self.events.send(StrategyEvent::Gateway(event)).await;
    }
}

fn interpret<T>(resp: &RestResponse<T>) -> OpOutcome {
    if resp.is_success() {
        OpOutcome::Accepted
    } else {
        OpOutcome::Rejected {
            code: resp.ret_code,
            message: resp.ret_msg.clone(),
        }
    }
}

/// Sleep until `reset_at_ms` (floored at zero), then lift the limit.
fn spawn_rate_limit_clear(guards: Arc<OpGuards>, reset_at_ms: u64) {
    tokio::spawn(async move {
        let wait = reset_at_ms.saturating_sub(epoch_ms());
        time::sleep(Duration::from_millis(wait)).await;
        guards.set_rate_limited(false);
        debug!("rate limit cleared");
    });
}

//! Wire types for the derivatives venue (delta-25 book protocol).
//!
//! WebSocket messages arrive on a single private stream and are routed by
//! `topic`; REST responses share one envelope carrying `ret_code` and the
//! caller's remaining rate-limit quota.

use rust_decimal::Decimal;
use serde::Deserialize;

use crate::types::Side;

/// Envelope for every message on the realtime stream.
///
/// Data messages carry `topic` (+ `type` for book messages); control replies
/// (pong, subscription acks) carry `ret_msg`/`success` instead. `data` is kept
/// raw so the feed can deserialize it per topic.
#[derive(Debug, Clone, Deserialize)]
pub struct StreamEnvelope {
    #[serde(default)]
    pub topic: Option<String>,
    #[serde(rename = "type", default)]
    pub kind: Option<String>,
    #[serde(default)]
    pub ret_msg: Option<String>,
    #[serde(default)]
    pub success: Option<bool>,
    #[serde(default)]
    pub data: Option<serde_json::Value>,
}

/// One level of the L2-25 book, as carried in snapshots and deltas.
///
/// Delete rows omit `size`.
#[derive(Debug, Clone, Deserialize)]
pub struct L2Row {
    pub price: Decimal,
    pub side: Side,
    #[serde(default)]
    pub size: i64,
}

/// Body of a `delta`-type book message: three passes applied in order.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct L2Delta {
    #[serde(default)]
    pub delete: Vec<L2Row>,
    #[serde(default)]
    pub update: Vec<L2Row>,
    #[serde(default)]
    pub insert: Vec<L2Row>,
}

/// Order state as reported on the `order` topic and the open-orders endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub enum OrderStatus {
    Created,
    New,
    PartiallyFilled,
    Filled,
    Cancelled,
    PendingCancel,
    Rejected,
}

impl OrderStatus {
    /// Terminal statuses remove the order from the active set.
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            OrderStatus::Filled | OrderStatus::Cancelled | OrderStatus::Rejected
        )
    }
}

/// A row on the `order` topic (also the open-orders snapshot shape).
#[derive(Debug, Clone, Deserialize)]
pub struct OrderUpdate {
    pub order_id: String,
    #[serde(default)]
    pub order_link_id: String,
    pub symbol: String,
    pub side: Side,
    pub price: Decimal,
    pub qty: i64,
    pub order_status: OrderStatus,
    #[serde(default)]
    pub leaves_qty: i64,
}

/// A row on the `execution` topic.
#[derive(Debug, Clone, Deserialize)]
pub struct ExecutionUpdate {
    pub symbol: String,
    pub side: Side,
    pub order_id: String,
    #[serde(default)]
    pub order_link_id: String,
    pub exec_id: String,
    pub exec_type: String,
    pub price: Decimal,
    pub exec_qty: i64,
    pub leaves_qty: i64,
}

impl ExecutionUpdate {
    /// Whether this execution is an actual trade (vs funding, settlement…).
    pub fn is_trade(&self) -> bool {
        self.exec_type == "Trade"
    }

    /// Executed quantity signed by side (buys positive).
    pub fn signed_qty(&self) -> i64 {
        match self.side {
            Side::Buy => self.exec_qty,
            Side::Sell => -self.exec_qty,
        }
    }
}

/// Position state, as reported on the `position` topic and the position-list
/// endpoint. `side` is the venue's string (`Buy`/`Sell`/`None`) because a
/// flat position is reported as `None` with size 0.
#[derive(Debug, Clone, Deserialize)]
pub struct PositionInfo {
    pub symbol: String,
    pub side: String,
    #[serde(default)]
    pub size: i64,
}

impl PositionInfo {
    /// Contracts signed by position side (`Sell`/`Short` negative).
    pub fn signed_size(&self) -> i64 {
        match self.side.as_str() {
            "Sell" | "Short" => -self.size,
            _ => self.size,
        }
    }
}

/// Envelope shared by all REST endpoints.
///
/// `rate_limit_status` is the *remaining* quota after this call; zero means
/// the venue will reject further requests until `rate_limit_reset_ms`.
#[derive(Debug, Clone, Deserialize)]
pub struct RestResponse<T> {
    pub ret_code: i64,
    #[serde(default)]
    pub ret_msg: String,
    pub result: Option<T>,
    #[serde(default)]
    pub rate_limit_status: Option<i64>,
    #[serde(default)]
    pub rate_limit_reset_ms: Option<u64>,
}

impl<T> RestResponse<T> {
    /// Whether the venue accepted the request.
    pub fn is_success(&self) -> bool {
        self.ret_code == 0
    }

    /// Whether this response exhausted the rate-limit quota.
    pub fn is_rate_limited(&self) -> bool {
        self.rate_limit_status == Some(0)
    }
}

/// Result body of the order create/replace endpoints.
#[derive(Debug, Clone, Deserialize)]
pub struct OrderResult {
    #[serde(default)]
    pub order_id: String,
    #[serde(default)]
    pub order_link_id: String,
}

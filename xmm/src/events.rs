//! Typed events flowing between the feeds, the gateway, and the strategy.
//!
//! The strategy consumes a single ordered stream of [`StrategyEvent`]s; both
//! venue feeds and the gateway publish into it. Per-venue ordering matches
//! socket order because each feed is a single task writing to one channel.

use venues::binance::types::{AccountUpdate, OrderTradeUpdate, PositionRisk};
use venues::bybit::types::{ExecutionUpdate, OrderUpdate, PositionInfo};
use venues::Bbo;

/// Which quote slot an order operation belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Slot {
    Bid,
    Ask,
}

impl Slot {
    pub fn side(self) -> venues::Side {
        match self {
            Slot::Bid => venues::Side::Buy,
            Slot::Ask => venues::Side::Sell,
        }
    }
}

impl std::fmt::Display for Slot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Slot::Bid => write!(f, "bid"),
            Slot::Ask => write!(f, "ask"),
        }
    }
}

/// Everything the strategy reacts to.
#[derive(Debug)]
pub enum StrategyEvent {
    /// Top of book changed on the derivatives venue.
    BboA(Bbo),
    /// Top of book changed on the futures venue.
    BboB(Bbo),
    /// Rows from the derivatives venue's `order` topic.
    OrderUpdates(Vec<OrderUpdate>),
    /// Rows from the derivatives venue's `execution` topic.
    Executions(Vec<ExecutionUpdate>),
    /// Rows from the derivatives venue's `position` topic.
    PositionUpdates(Vec<PositionInfo>),
    /// REST open-orders snapshot from the derivatives venue.
    OrderSnapshotA(Vec<OrderUpdate>),
    /// REST position snapshot from the derivatives venue.
    PositionSnapshotA(PositionInfo),
    /// Account event from the futures venue's private stream.
    AccountUpdateB(AccountUpdate),
    /// Order/trade event from the futures venue's private stream.
    OrderTradeUpdateB(OrderTradeUpdate),
    /// REST position snapshot from the futures venue (already symbol-wide;
    /// the strategy filters by its hedge symbol).
    PositionSnapshotB(Vec<PositionRisk>),
    /// Response reconciliation from the gateway.
    Gateway(GatewayEvent),
}

/// Which kind of slot operation a gateway response finalizes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OrderOp {
    New,
    Amend,
}

/// Terminal interpretation of one REST response.
#[derive(Debug)]
pub enum OpOutcome {
    Accepted,
    Rejected { code: i64, message: String },
    TransportError(String),
}

/// What the gateway writes back into the strategy stream.
#[derive(Debug)]
pub enum GatewayEvent {
    /// A derivatives-venue order operation finalized.
    OrderOp {
        slot: Slot,
        op: OrderOp,
        outcome: OpOutcome,
    },
    /// A derivatives-venue cancel-all finalized.
    CancelAll { outcome: OpOutcome },
    /// A futures-venue hedge market order finalized.
    Hedge { qty: i64, outcome: OpOutcome },
    /// The derivatives venue reported an exhausted rate-limit quota.
    RateLimited { reset_at_ms: u64 },
}

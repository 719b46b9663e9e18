//! Strategy core: quote pricing, order lifecycle, hedging, and inventory
//! control.
//!
//! The strategy is a plain state machine driven by [`StrategyEvent`]s; every
//! handler runs to completion without suspending. Outbound venue operations
//! go through the [`Gateway`]'s synchronous `submit_*` calls, which flip the
//! shared in-flight guards before returning.

pub mod hedge;
pub mod inventory;
pub mod quote;
pub mod slots;

use std::collections::HashMap;
use std::sync::Arc;

use rust_decimal::Decimal;
use tracing::{debug, info, warn};
use uuid::Uuid;

use venues::binance::types::{AccountUpdate, OrderTradeUpdate, PositionRisk};
use venues::bybit::types::{ExecutionUpdate, OrderStatus, OrderUpdate, PositionInfo};
use venues::{Bbo, Side};

use crate::config::EngineConfig;
use crate::events::{GatewayEvent, OpOutcome, OrderOp, Slot, StrategyEvent};
use crate::gateway::{Gateway, OpGuards};

use hedge::HedgeAccumulator;
use quote::{QuoteParams, QuoteTargets};
use slots::QuoteSlot;

/// A locally tracked order on the quoted venue.
#[derive(Debug, Clone)]
pub struct LocalOrder {
    pub client_id: String,
    pub side: Side,
    pub price: Decimal,
    pub size: i64,
    pub status: OrderStatus,
}

/// The market-making strategy for one symbol pair.
pub struct Strategy {
    cfg: EngineConfig,
    gateway: Gateway,
    guards: Arc<OpGuards>,

    bbo_quoted: Option<Bbo>,
    bbo_hedge: Option<Bbo>,

    /// Orders observed in a non-terminal status, by client id.
    active_orders: HashMap<String, LocalOrder>,
    bid: QuoteSlot,
    ask: QuoteSlot,

    /// Signed contracts on the quoted venue.
    pos_quoted: i64,
    /// Signed contracts on the hedge venue.
    pos_hedge: i64,
    have_pos_quoted: bool,
    have_pos_hedge: bool,

    hedger: HedgeAccumulator,
}

impl Strategy {
    pub fn new(cfg: EngineConfig, gateway: Gateway) -> Self {
        let guards = gateway.guards();
        let hedger = HedgeAccumulator::new(cfg.hedge_ratio);
        Self {
            cfg,
            gateway,
            guards,
            bbo_quoted: None,
            bbo_hedge: None,
            active_orders: HashMap::new(),
            bid: QuoteSlot::new(Side::Buy),
            ask: QuoteSlot::new(Side::Sell),
            pos_quoted: 0,
            pos_hedge: 0,
            have_pos_quoted: false,
            have_pos_hedge: false,
            hedger,
        }
    }

    /// Dispatch one event. Never suspends.
    pub fn handle_event(&mut self, event: StrategyEvent) {
        match event {
            StrategyEvent::BboA(bbo) => {
                self.bbo_quoted = Some(bbo);
                self.tick();
            }
            StrategyEvent::BboB(bbo) => {
                self.bbo_hedge = Some(bbo);
                self.tick();
            }
            StrategyEvent::OrderUpdates(rows) => self.on_order_updates(rows),
            StrategyEvent::Executions(rows) => self.on_executions(rows),
            StrategyEvent::PositionUpdates(rows) => self.on_position_updates(rows),
            StrategyEvent::OrderSnapshotA(rows) => self.on_order_snapshot(rows),
            StrategyEvent::PositionSnapshotA(pos) => self.on_position_snapshot_quoted(pos),
            StrategyEvent::AccountUpdateB(update) => self.on_account_update(update),
            StrategyEvent::OrderTradeUpdateB(update) => self.on_order_trade_update(update),
            StrategyEvent::PositionSnapshotB(rows) => self.on_position_snapshot_hedge(rows),
            StrategyEvent::Gateway(ev) => self.on_gateway(ev),
        }
    }

    /// Current quote targets, if both books are live.
    fn targets(&self) -> Option<QuoteTargets> {
        let quoted = self.bbo_quoted?;
        let hedge = self.bbo_hedge?;
        Some(quote::compute_targets(
            &quoted,
            &hedge,
            &QuoteParams {
                tick: self.cfg.tick,
                offset: self.cfg.quote_offset(),
            },
        ))
    }

    /// Re-evaluate both slots against fresh quote targets.
    ///
    /// No quoting happens until both venues' position snapshots have been
    /// received; until then fills could not be sized or hedged correctly.
    fn tick(&mut self) {
        if !self.have_pos_quoted || !self.have_pos_hedge {
            return;
        }
        let Some(targets) = self.targets() else {
            return;
        };
        self.drive_slot(Slot::Bid, targets.bid);
        self.drive_slot(Slot::Ask, targets.ask);
    }

    /// Advance one slot's lifecycle toward `target`.
    fn drive_slot(&mut self, id: Slot, target: Decimal) {
        let can_issue = !self.guards.is_rate_limited()
            && !self.guards.order_op_in_flight()
            && !self.guards.amend_in_flight(id);

        if self.slot(id).is_empty() {
            if !can_issue {
                return;
            }
            let side = self.slot(id).side();
            let qty = inventory::order_size(
                side,
                self.pos_quoted,
                self.cfg.quote_size,
                self.cfg.inventory_limit,
            );
            if qty <= 0 {
                return;
            }
            let client_id = Uuid::new_v4().to_string();
            self.slot_mut(id).arm(client_id.clone(), target);
            self.active_orders.insert(
                client_id.clone(),
                LocalOrder {
                    client_id: client_id.clone(),
                    side,
                    price: target,
                    size: qty,
                    status: OrderStatus::Created,
                },
            );
            info!(slot = %id, price = %target, qty, "NEW");
            self.gateway.submit_new(id, client_id, target, qty);
        } else {
            let interval = self.cfg.update_interval;
            if self.slot_mut(id).note_target(target, interval, can_issue) {
                let Some(client_id) = self.slot(id).client_id().map(str::to_string) else {
                    return;
                };
                self.slot_mut(id).begin_amend(target);
                info!(slot = %id, price = %target, "AMEND");
                self.gateway.submit_amend(id, client_id, target);
            }
        }
    }

    // -- order channel ---------------------------------------------------

    fn on_order_updates(&mut self, rows: Vec<OrderUpdate>) {
        for row in rows {
            if row.symbol != self.cfg.symbol {
                continue;
            }
            let client_id = if row.order_link_id.is_empty() {
                row.order_id.clone()
            } else {
                row.order_link_id.clone()
            };

            if row.order_status.is_terminal() {
                self.active_orders.remove(&client_id);
            } else {
                self.active_orders.insert(
                    client_id.clone(),
                    LocalOrder {
                        client_id: client_id.clone(),
                        side: row.side,
                        price: row.price,
                        size: row.qty,
                        status: row.order_status,
                    },
                );
            }

            let Some(id) = self.slot_for(&client_id) else {
                debug!(client_id, status = ?row.order_status, "order update for unknown slot");
                continue;
            };
            match row.order_status {
                OrderStatus::Created | OrderStatus::New | OrderStatus::PartiallyFilled => {
                    self.slot_mut(id).confirm_price(row.price);
                }
                OrderStatus::Cancelled | OrderStatus::Rejected => {
                    info!(slot = %id, status = ?row.order_status, "slot emptied by venue");
                    self.slot_mut(id).clear();
                }
                OrderStatus::Filled => {
                    self.slot_mut(id).clear();
                }
                OrderStatus::PendingCancel => {}
            }
        }
    }

    // -- executions + hedging --------------------------------------------

    fn on_executions(&mut self, rows: Vec<ExecutionUpdate>) {
        for row in rows {
            if row.symbol != self.cfg.symbol || !row.is_trade() {
                continue;
            }
            let signed = row.signed_qty();
            self.pos_quoted += signed;
            info!(
                side = ?row.side,
                qty = row.exec_qty,
                price = %row.price,
                pos = self.pos_quoted,
                "FILL"
            );

            if let Some(order) = self.hedger.absorb(signed) {
                info!(
                    side = ?order.side,
                    qty = order.qty,
                    unhedged = self.hedger.unhedged(),
                    "HEDGE"
                );
                self.gateway.submit_hedge(order.side, order.qty);
            }

            if row.leaves_qty == 0 {
                if let Some(id) = self.slot_for(&row.order_link_id) {
                    self.slot_mut(id).clear();
                }
                if let Some(order) = self.active_orders.remove(&row.order_link_id) {
                    debug!(client_id = %order.client_id, "order fully filled");
                }
            }
        }
    }

    // -- position flow ----------------------------------------------------

    fn on_position_updates(&mut self, rows: Vec<PositionInfo>) {
        for row in rows {
            if row.symbol != self.cfg.symbol {
                continue;
            }
            self.pos_quoted = row.signed_size();
            self.have_pos_quoted = true;
        }
    }

    fn on_position_snapshot_quoted(&mut self, pos: PositionInfo) {
        if pos.symbol != self.cfg.symbol {
            return;
        }
        self.pos_quoted = pos.signed_size();
        self.have_pos_quoted = true;
        self.reseed_hedger();
        info!(pos = self.pos_quoted, "quoted-venue position snapshot");
    }

    fn on_position_snapshot_hedge(&mut self, rows: Vec<PositionRisk>) {
        // Absent row means no open position on the hedge symbol.
        self.pos_hedge = rows
            .iter()
            .find(|r| r.symbol == self.cfg.hedge_symbol)
            .map(|r| r.signed_size())
            .unwrap_or(0);
        self.have_pos_hedge = true;
        self.reseed_hedger();
        info!(pos = self.pos_hedge, "hedge-venue position snapshot");
    }

    fn on_account_update(&mut self, update: AccountUpdate) {
        for pos in update.positions {
            if pos.symbol == self.cfg.hedge_symbol {
                self.pos_hedge = pos.signed_size();
            }
        }
    }

    fn on_order_trade_update(&mut self, update: OrderTradeUpdate) {
        if update.symbol != self.cfg.hedge_symbol || !update.is_trade() {
            return;
        }
        self.pos_hedge += update.signed_fill();
        debug!(
            side = ?update.side,
            qty = %update.last_filled_qty,
            pos = self.pos_hedge,
            "hedge fill"
        );
    }

    /// Re-seed the hedge bucket from authoritative positions once both
    /// snapshots are in.
    fn reseed_hedger(&mut self) {
        if self.have_pos_quoted && self.have_pos_hedge {
            self.hedger.reset(self.pos_quoted, self.pos_hedge);
        }
    }

    // -- snapshots ---------------------------------------------------------

    /// Rebuild the active-order set (and slot occupancy) from scratch.
    fn on_order_snapshot(&mut self, rows: Vec<OrderUpdate>) {
        self.active_orders.clear();
        self.bid.clear();
        self.ask.clear();

        for row in rows {
            if row.symbol != self.cfg.symbol || row.order_status.is_terminal() {
                continue;
            }
            let client_id = if row.order_link_id.is_empty() {
                row.order_id.clone()
            } else {
                row.order_link_id.clone()
            };
            self.active_orders.insert(
                client_id.clone(),
                LocalOrder {
                    client_id: client_id.clone(),
                    side: row.side,
                    price: row.price,
                    size: row.qty,
                    status: row.order_status,
                },
            );

            let id = match row.side {
                Side::Buy => Slot::Bid,
                Side::Sell => Slot::Ask,
            };
            if self.slot(id).is_empty() {
                self.slot_mut(id).arm(client_id, row.price);
            } else {
                warn!(slot = %id, client_id, "second live order on one side");
            }
        }
        info!(count = self.active_orders.len(), "order snapshot applied");
    }

    // -- gateway reconciliation --------------------------------------------

    fn on_gateway(&mut self, event: GatewayEvent) {
        match event {
            GatewayEvent::OrderOp { slot, op, outcome } => match outcome {
                OpOutcome::Accepted => {
                    if op == OrderOp::Amend {
                        self.slot_mut(slot).settle_amend();
                    }
                }
                OpOutcome::Rejected { code, message } => {
                    warn!(slot = %slot, ?op, code, message, "order op rejected");
                    self.clear_failed_op(slot, op);
                }
                OpOutcome::TransportError(e) => {
                    warn!(slot = %slot, ?op, error = e, "order op transport error");
                    self.clear_failed_op(slot, op);
                }
            },
            GatewayEvent::CancelAll { outcome } => match outcome {
                OpOutcome::Accepted => info!("cancel-all accepted"),
                other => warn!(outcome = ?other, "cancel-all failed"),
            },
            GatewayEvent::Hedge { qty, outcome } => match outcome {
                OpOutcome::Accepted => debug!(qty, "hedge confirmed"),
                other => warn!(qty, outcome = ?other, "hedge failed, exposure uncovered"),
            },
            GatewayEvent::RateLimited { reset_at_ms } => {
                warn!(reset_at_ms, "strategy paused by rate limit");
            }
        }
    }

    /// A failed new empties the slot so the next tick can re-arm it; a
    /// failed amend leaves the resting order alone (the order channel stays
    /// authoritative for its fate).
    fn clear_failed_op(&mut self, id: Slot, op: OrderOp) {
        match op {
            OrderOp::New => {
                if let Some(client_id) = self.slot(id).client_id().map(str::to_string) {
                    self.active_orders.remove(&client_id);
                }
                self.slot_mut(id).clear();
            }
            OrderOp::Amend => self.slot_mut(id).abort_amend(),
        }
    }

    // -- status ------------------------------------------------------------

    /// Periodic one-line status summary.
    pub fn log_status(&self) {
        let fmt_slot = |slot: &QuoteSlot| -> String {
            match slot.client_id() {
                Some(_) => format!("{}", slot.price()),
                None => "-".to_string(),
            }
        };
        let resting: Vec<String> = self
            .active_orders
            .values()
            .map(|o| format!("{:?}@{}x{}", o.side, o.price, o.size))
            .collect();
        let rate_limit = if self.guards.is_rate_limited() {
            format!("until {}", self.guards.rate_limit_reset_ms())
        } else {
            "-".to_string()
        };
        info!(
            pos_a = self.pos_quoted,
            pos_b = self.pos_hedge,
            unhedged = self.hedger.unhedged(),
            bid = fmt_slot(&self.bid),
            ask = fmt_slot(&self.ask),
            orders = resting.join(","),
            rate_limit,
            "STATUS"
        );
    }

    // -- helpers -----------------------------------------------------------

    fn slot(&self, id: Slot) -> &QuoteSlot {
        match id {
            Slot::Bid => &self.bid,
            Slot::Ask => &self.ask,
        }
    }

    fn slot_mut(&mut self, id: Slot) -> &mut QuoteSlot {
        match id {
            Slot::Bid => &mut self.bid,
            Slot::Ask => &mut self.ask,
        }
    }

    fn slot_for(&self, client_id: &str) -> Option<Slot> {
        if self.bid.matches(client_id) {
            Some(Slot::Bid)
        } else if self.ask.matches(client_id) {
            Some(Slot::Ask)
        } else {
            None
        }
    }
}

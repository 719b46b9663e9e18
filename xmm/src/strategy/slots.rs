//! Quote slots: the per-side order lifecycle state machine.
//!
//! Each side of the quoted market holds at most one resting order. A slot is
//! `(client_id?, price)` plus an amend debounce counter; the in-flight guards
//! that gate issuing live in the gateway and are read at tick time by the
//! strategy, so the slot itself only tracks identity and price.

use rust_decimal::Decimal;
use venues::Side;

/// One side's resting-order slot.
#[derive(Debug, Clone)]
pub struct QuoteSlot {
    side: Side,
    client_id: Option<String>,
    /// Price of the resting order as last confirmed (or submitted, until a
    /// confirmation arrives).
    price: Decimal,
    /// Target price of an amend that has been issued but not yet confirmed.
    pending_price: Option<Decimal>,
    /// Ticks the target has spent differing from the live price.
    update_counter: u32,
}

impl QuoteSlot {
    pub fn new(side: Side) -> Self {
        Self {
            side,
            client_id: None,
            price: Decimal::ZERO,
            pending_price: None,
            update_counter: 0,
        }
    }

    pub fn side(&self) -> Side {
        self.side
    }

    pub fn client_id(&self) -> Option<&str> {
        self.client_id.as_deref()
    }

    /// Whether this slot has no live (or in-flight) order.
    pub fn is_empty(&self) -> bool {
        self.client_id.is_none()
    }

    pub fn price(&self) -> Decimal {
        self.price
    }

    /// Whether `client_id` identifies this slot's order.
    pub fn matches(&self, client_id: &str) -> bool {
        self.client_id.as_deref() == Some(client_id)
    }

    /// Occupy the slot with a newly issued order.
    pub fn arm(&mut self, client_id: String, price: Decimal) {
        self.client_id = Some(client_id);
        self.price = price;
        self.pending_price = None;
        self.update_counter = 0;
    }

    /// Record the resting price confirmed by the venue's order channel.
    pub fn confirm_price(&mut self, price: Decimal) {
        self.price = price;
        self.pending_price = None;
    }

    /// Record that an amend to `price` was issued (unconfirmed).
    pub fn begin_amend(&mut self, price: Decimal) {
        self.pending_price = Some(price);
    }

    /// The REST reply confirmed the amend before the order channel did.
    pub fn settle_amend(&mut self) {
        if let Some(price) = self.pending_price.take() {
            self.price = price;
        }
    }

    /// The venue refused the amend; the resting price is unchanged.
    pub fn abort_amend(&mut self) {
        self.pending_price = None;
    }

    /// Empty the slot.
    pub fn clear(&mut self) {
        self.client_id = None;
        self.price = Decimal::ZERO;
        self.pending_price = None;
        self.update_counter = 0;
    }

    /// Debounce an amend toward `target`.
    ///
    /// The counter advances only on ticks where the target differs from the
    /// live price. Once it reaches `interval` — and issuing is permitted —
    /// it resets and the caller should amend. While `can_issue` is false
    /// (op in flight, rate limited) the counter keeps accumulating so the
    /// amend fires as soon as the guard lifts.
    pub fn note_target(&mut self, target: Decimal, interval: u32, can_issue: bool) -> bool {
        if self.client_id.is_none() || target == self.price {
            return false;
        }
        self.update_counter += 1;
        if can_issue && self.update_counter >= interval {
            self.update_counter = 0;
            return true;
        }
        false
    }
}

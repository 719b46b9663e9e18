//! Local depth book for the futures venue.
//!
//! Seeded from a REST snapshot carrying `lastUpdateId`, then advanced by
//! `depthUpdate` events. Per level, a zero quantity deletes the price and any
//! other quantity inserts-or-updates it. The update-id bookkeeping needed to
//! splice buffered deltas onto a snapshot lives in the feed layer; the book
//! only records the id of the last event it applied.

use std::collections::BTreeMap;

use rust_decimal::Decimal;

use crate::types::{contracts, Bbo, PriceLevel, Side};

use super::types::{DepthSnapshot, DepthUpdate};

/// Order book for one symbol, keyed by exact price.
#[derive(Debug, Clone)]
pub struct BinanceBook {
    bids: BTreeMap<Decimal, i64>,
    asks: BTreeMap<Decimal, i64>,
    /// Final update id of the snapshot or last applied delta.
    pub last_update_id: u64,
}

impl BinanceBook {
    /// Build a book from a REST depth snapshot.
    pub fn from_snapshot(snapshot: &DepthSnapshot) -> Self {
        let mut book = Self {
            bids: BTreeMap::new(),
            asks: BTreeMap::new(),
            last_update_id: snapshot.last_update_id,
        };
        apply_levels(&mut book.bids, &snapshot.bids);
        apply_levels(&mut book.asks, &snapshot.asks);
        book
    }

    /// Apply one incremental update and record its final update id.
    pub fn apply_update(&mut self, update: &DepthUpdate) {
        apply_levels(&mut self.bids, &update.bids);
        apply_levels(&mut self.asks, &update.asks);
        self.last_update_id = update.final_update_id;
    }

    /// Highest resting bid.
    pub fn best_bid(&self) -> Option<PriceLevel> {
        self.bids
            .iter()
            .next_back()
            .map(|(&price, &size)| PriceLevel { price, size })
    }

    /// Lowest resting ask.
    pub fn best_ask(&self) -> Option<PriceLevel> {
        self.asks
            .iter()
            .next()
            .map(|(&price, &size)| PriceLevel { price, size })
    }

    /// Top of book, if both sides are populated.
    pub fn bbo(&self) -> Option<Bbo> {
        match (self.best_bid(), self.best_ask()) {
            (Some(bid), Some(ask)) => Some(Bbo {
                bid: bid.price,
                ask: ask.price,
            }),
            _ => None,
        }
    }

    /// Number of levels on a side.
    pub fn depth(&self, side: Side) -> usize {
        match side {
            Side::Buy => self.bids.len(),
            Side::Sell => self.asks.len(),
        }
    }
}

/// Insert-or-update each `[price, qty]` pair; zero quantity deletes.
fn apply_levels(side: &mut BTreeMap<Decimal, i64>, levels: &[(Decimal, Decimal)]) {
    for &(price, qty) in levels {
        let size = contracts(qty);
        if size == 0 {
            side.remove(&price);
        } else {
            side.insert(price, size);
        }
    }
}

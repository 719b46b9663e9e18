//! Local L2-25 order book for the derivatives venue.
//!
//! The venue streams a full snapshot on subscribe, then deltas carrying three
//! level lists (`delete`, `update`, `insert`) applied in that order. Prices
//! are tick-quantized decimals, so sides are keyed by exact price in a
//! `BTreeMap`; ascending key order makes the best ask the first key and the
//! best bid the last.

use std::collections::BTreeMap;

use rust_decimal::Decimal;

use crate::error::{Result, VenueError};
use crate::types::{Bbo, PriceLevel, Side};

use super::types::{L2Delta, L2Row};

/// Order book rebuilt from a stream snapshot and mutated by deltas.
#[derive(Debug, Clone, Default)]
pub struct BybitBook {
    bids: BTreeMap<Decimal, i64>,
    asks: BTreeMap<Decimal, i64>,
}

impl BybitBook {
    /// Build a book from the flat snapshot row list, partitioned by side.
    ///
    /// Zero-size rows are skipped: every resting level has positive size.
    pub fn from_snapshot(rows: &[L2Row]) -> Self {
        let mut book = Self::default();
        for row in rows {
            if row.size > 0 {
                book.side_mut(row.side).insert(row.price, row.size);
            }
        }
        book
    }

    /// Apply one delta message: deletes, then updates, then inserts.
    ///
    /// Late deletes and updates at absent prices are tolerated as no-ops.
    /// A zero size anywhere deletes the level. After the three passes the
    /// book must be uncrossed, or [`VenueError::BookInconsistent`] is
    /// returned and the caller should rebuild from a fresh snapshot.
    pub fn apply_delta(&mut self, delta: &L2Delta) -> Result<()> {
        for row in &delta.delete {
            self.side_mut(row.side).remove(&row.price);
        }
        for row in &delta.update {
            let side = self.side_mut(row.side);
            if row.size <= 0 {
                side.remove(&row.price);
            } else if let Some(size) = side.get_mut(&row.price) {
                *size = row.size;
            }
        }
        for row in &delta.insert {
            let side = self.side_mut(row.side);
            if row.size <= 0 {
                side.remove(&row.price);
            } else {
                side.insert(row.price, row.size);
            }
        }

        match (self.best_bid(), self.best_ask()) {
            (Some(bid), Some(ask)) if bid.price >= ask.price => {
                Err(VenueError::BookInconsistent {
                    bid: bid.price,
                    ask: ask.price,
                })
            }
            _ => Ok(()),
        }
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

    fn side_mut(&mut self, side: Side) -> &mut BTreeMap<Decimal, i64> {
        match side {
            Side::Buy => &mut self.bids,
            Side::Sell => &mut self.asks,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn row(side: Side, price: Decimal, size: i64) -> L2Row {
        L2Row { price, side, size }
    }

    /// Snapshot with two levels per side around 8000.0/8000.5.
    fn book() -> BybitBook {
        BybitBook::from_snapshot(&[
            row(Side::Buy, dec!(8000.0), 100),
            row(Side::Buy, dec!(7999.5), 250),
            row(Side::Sell, dec!(8000.5), 120),
            row(Side::Sell, dec!(8001.0), 300),
        ])
    }

    #[test]
    fn test_snapshot_partitions_and_orders_sides() {
        let b = book();
        assert_eq!(b.depth(Side::Buy), 2);
        assert_eq!(b.depth(Side::Sell), 2);
        assert_eq!(
            b.best_bid(),
            Some(PriceLevel {
                price: dec!(8000.0),
                size: 100
            })
        );
        assert_eq!(
            b.best_ask(),
            Some(PriceLevel {
                price: dec!(8000.5),
                size: 120
            })
        );
    }

    #[test]
    fn test_snapshot_skips_zero_size_rows() {
        let b = BybitBook::from_snapshot(&[
            row(Side::Buy, dec!(8000.0), 100),
            row(Side::Sell, dec!(8000.5), 0),
        ]);
        assert_eq!(b.depth(Side::Sell), 0);
    }

    #[test]
    fn test_delete_removes_level() {
        let mut b = book();
        let delta = L2Delta {
            delete: vec![row(Side::Buy, dec!(8000.0), 0)],
            ..Default::default()
        };
        b.apply_delta(&delta).unwrap();
        assert_eq!(b.best_bid().unwrap().price, dec!(7999.5));
    }

    #[test]
    fn test_delete_at_absent_price_is_noop() {
        let mut b = book();
        let delta = L2Delta {
            delete: vec![row(Side::Buy, dec!(7000.0), 0)],
            ..Default::default()
        };
        b.apply_delta(&delta).unwrap();
        b.apply_delta(&delta).unwrap(); // idempotent
        assert_eq!(b.depth(Side::Buy), 2);
        assert_eq!(b.best_bid().unwrap().price, dec!(8000.0));
    }

    #[test]
    fn test_update_replaces_size() {
        let mut b = book();
        let delta = L2Delta {
            update: vec![row(Side::Sell, dec!(8000.5), 999)],
            ..Default::default()
        };
        b.apply_delta(&delta).unwrap();
        assert_eq!(b.best_ask().unwrap().size, 999);
    }

    #[test]
    fn test_update_at_absent_price_is_noop() {
        let mut b = book();
        let delta = L2Delta {
            update: vec![row(Side::Sell, dec!(9999.0), 5)],
            ..Default::default()
        };
        b.apply_delta(&delta).unwrap();
        assert_eq!(b.depth(Side::Sell), 2);
    }

    #[test]
    fn test_insert_reorders_side() {
        let mut b = book();
        let delta = L2Delta {
            insert: vec![row(Side::Buy, dec!(8000.25), 50)],
            ..Default::default()
        };
        b.apply_delta(&delta).unwrap();
        assert_eq!(b.best_bid().unwrap().price, dec!(8000.25));
        assert_eq!(b.depth(Side::Buy), 3);
    }

    #[test]
    fn test_zero_size_update_deletes() {
        let mut b = book();
        let delta = L2Delta {
            update: vec![row(Side::Buy, dec!(8000.0), 0)],
            ..Default::default()
        };
        b.apply_delta(&delta).unwrap();
        assert_eq!(b.best_bid().unwrap().price, dec!(7999.5));
    }

    #[test]
    fn test_crossed_book_is_inconsistent() {
        let mut b = book();
        let delta = L2Delta {
            insert: vec![row(Side::Buy, dec!(8001.5), 10)],
            ..Default::default()
        };
        let err = b.apply_delta(&delta).unwrap_err();
        assert!(matches!(err, VenueError::BookInconsistent { .. }));
    }

    #[test]
    fn test_one_sided_book_is_not_inconsistent() {
        let mut b = BybitBook::from_snapshot(&[row(Side::Buy, dec!(8000.0), 100)]);
        let delta = L2Delta {
            insert: vec![row(Side::Buy, dec!(8002.0), 10)],
            ..Default::default()
        };
        // No resting asks: nothing to cross against.
        b.apply_delta(&delta).unwrap();
        assert!(b.bbo().is_none());
    }

    #[test]
    fn test_delta_passes_apply_in_order() {
        // Delete the best ask and insert a replacement at the same price in
        // one message: must not be treated as a crossed or duplicated level.
        let mut b = book();
        let delta = L2Delta {
            delete: vec![row(Side::Sell, dec!(8000.5), 0)],
            update: vec![],
            insert: vec![row(Side::Sell, dec!(8000.5), 77)],
        };
        b.apply_delta(&delta).unwrap();
        assert_eq!(
            b.best_ask(),
            Some(PriceLevel {
                price: dec!(8000.5),
                size: 77
            })
        );
        assert_eq!(b.depth(Side::Sell), 2);
    }

    #[test]
    fn test_bbo_matches_tops_after_mutations() {
        let mut b = book();
        let delta = L2Delta {
            delete: vec![row(Side::Buy, dec!(8000.0), 0)],
            insert: vec![row(Side::Sell, dec!(8000.25), 5)],
            ..Default::default()
        };
        b.apply_delta(&delta).unwrap();
        assert_eq!(
            b.bbo(),
            Some(Bbo {
                bid: dec!(7999.5),
                ask: dec!(8000.25)
            })
        );
    }
}

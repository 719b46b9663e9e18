//! Engine configuration.

use rust_decimal::Decimal;
use rust_decimal_macros::dec;

/// All tuneable parameters for the cross-venue engine.
///
/// Use [`Default::default()`] for the reference setup (inverse BTC contract
/// quoted on the derivatives venue, hedged on the coin-margined futures
/// venue), then override per deployment via the CLI.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Quoted symbol on the derivatives venue.
    pub symbol: String,
    /// Hedge symbol on the futures venue.
    pub hedge_symbol: String,
    /// Underlying pair used by the futures venue's position endpoint.
    pub hedge_pair: String,
    /// Smallest price increment on the quoted venue.
    pub tick: Decimal,
    /// Taker fee paid on the hedge leg.
    pub fee: Decimal,
    /// Profit margin captured per round trip.
    pub profit: Decimal,
    /// Risk margin added on top of fee + profit.
    pub risk: Decimal,
    /// Base quote size in contracts.
    pub quote_size: i64,
    /// Maximum absolute position in contracts on the quoted venue.
    pub inventory_limit: i64,
    /// Hedge-venue contracts per quoted-venue contract bucket.
    pub hedge_ratio: i64,
    /// Number of ticks a target must persist away from the live price
    /// before an amend is issued.
    pub update_interval: u32,
    /// Interval for status log lines in milliseconds.
    pub status_interval_ms: u64,
}

impl EngineConfig {
    /// Combined quote offset: fee + profit + risk.
    pub fn quote_offset(&self) -> Decimal {
        self.fee + self.profit + self.risk
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            symbol: "BTCUSD".to_string(),
            hedge_symbol: "BTCUSD_PERP".to_string(),
            hedge_pair: "BTCUSD".to_string(),
            tick: dec!(0.5),
            fee: dec!(0.00015),
            profit: dec!(0.00005),
            risk: dec!(0.00015),
            quote_size: 100,
            inventory_limit: 1000,
            hedge_ratio: 100,
            update_interval: 3,
            status_interval_ms: 5000,
        }
    }
}

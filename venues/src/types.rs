use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Order side.
///
/// The derivatives venue spells sides `Buy`/`Sell`, the futures venue
/// `BUY`/`SELL`; the aliases accept both on deserialization.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Side {
    #[serde(alias = "BUY")]
    Buy,
    #[serde(alias = "SELL")]
    Sell,
}

impl Side {
    /// The opposing side.
    pub fn opposite(self) -> Side {
        match self {
            Side::Buy => Side::Sell,
            Side::Sell => Side::Buy,
        }
    }

    /// Wire spelling used by the derivatives venue.
    pub fn as_bybit(self) -> &'static str {
        match self {
            Side::Buy => "Buy",
            Side::Sell => "Sell",
        }
    }

    /// Wire spelling used by the futures venue.
    pub fn as_binance(self) -> &'static str {
        match self {
            Side::Buy => "BUY",
            Side::Sell => "SELL",
        }
    }
}

/// Best bid and best offer prices.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Bbo {
    /// Highest resting bid price.
    pub bid: Decimal,
    /// Lowest resting ask price.
    pub ask: Decimal,
}

impl Bbo {
    /// Arithmetic midpoint of bid and ask.
    pub fn mid(&self) -> Decimal {
        (self.bid + self.ask) / Decimal::TWO
    }
}

/// One resting price level: an exchange-tick price and a contract count.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PriceLevel {
    pub price: Decimal,
    pub size: i64,
}

/// Truncate a decimal quantity to whole contracts.
///
/// Both venues report contract counts; fractional values only appear in
/// malformed input and collapse to zero rather than panicking.
pub fn contracts(qty: Decimal) -> i64 {
    qty.trunc().to_i64().unwrap_or(0)
}

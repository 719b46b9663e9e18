//! Wire types for the futures venue (incremental depth protocol).
//!
//! Stream events are routed by the `e` event code. Field names follow the
//! venue's single-letter convention and are renamed to readable identifiers:
//!
//! ```text
//!   depthUpdate:        U/u = first/final update id, b/a = bid/ask levels
//!   ORDER_TRADE_UPDATE: o.S = side, o.x = execution type, o.l = last fill qty
//!   ACCOUNT_UPDATE:     a.P = positions (pa = amount, ps = position side)
//! ```

use rust_decimal::Decimal;
use serde::Deserialize;

use crate::types::{contracts, Side};

/// Incremental depth event (`e == "depthUpdate"`).
///
/// Levels are `[price, qty]` pairs; a zero quantity deletes the level.
#[derive(Debug, Clone, Deserialize)]
pub struct DepthUpdate {
    #[serde(rename = "s", default)]
    pub symbol: String,
    #[serde(rename = "U")]
    pub first_update_id: u64,
    #[serde(rename = "u")]
    pub final_update_id: u64,
    #[serde(rename = "b", default)]
    pub bids: Vec<(Decimal, Decimal)>,
    #[serde(rename = "a", default)]
    pub asks: Vec<(Decimal, Decimal)>,
}

/// REST depth snapshot used to seed the local book.
#[derive(Debug, Clone, Deserialize)]
pub struct DepthSnapshot {
    #[serde(rename = "lastUpdateId")]
    pub last_update_id: u64,
    pub bids: Vec<(Decimal, Decimal)>,
    pub asks: Vec<(Decimal, Decimal)>,
}

/// Order/trade event payload (`ORDER_TRADE_UPDATE.o`).
#[derive(Debug, Clone, Deserialize)]
pub struct OrderTradeUpdate {
    #[serde(rename = "s")]
    pub symbol: String,
    #[serde(rename = "S")]
    pub side: Side,
    #[serde(rename = "x")]
    pub exec_type: String,
    #[serde(rename = "X", default)]
    pub order_status: String,
    #[serde(rename = "l", default)]
    pub last_filled_qty: Decimal,
    #[serde(rename = "z", default)]
    pub cum_filled_qty: Decimal,
    #[serde(rename = "L", default)]
    pub last_filled_price: Decimal,
    #[serde(rename = "i", default)]
    pub order_id: u64,
}

impl OrderTradeUpdate {
    /// Whether this event reports an actual fill.
    pub fn is_trade(&self) -> bool {
        self.exec_type == "TRADE"
    }

    /// Last-fill contracts signed by side (buys positive).
    pub fn signed_fill(&self) -> i64 {
        let qty = contracts(self.last_filled_qty);
        match self.side {
            Side::Buy => qty,
            Side::Sell => -qty,
        }
    }
}

/// Position row inside an account event (`ACCOUNT_UPDATE.a.P`).
#[derive(Debug, Clone, Deserialize)]
pub struct AccountPosition {
    #[serde(rename = "s")]
    pub symbol: String,
    #[serde(rename = "pa")]
    pub position_amt: Decimal,
    #[serde(rename = "ps", default)]
    pub position_side: String,
}

/// Account event payload (`ACCOUNT_UPDATE.a`). Balance rows are not used.
#[derive(Debug, Clone, Deserialize)]
pub struct AccountUpdate {
    #[serde(rename = "P", default)]
    pub positions: Vec<AccountPosition>,
}

/// Position-risk snapshot row (`/dapi/v1/positionRisk`).
#[derive(Debug, Clone, Deserialize)]
pub struct PositionRisk {
    pub symbol: String,
    #[serde(rename = "positionAmt")]
    pub position_amt: Decimal,
    #[serde(rename = "positionSide", default)]
    pub position_side: String,
}

/// Contracts signed by position side. In one-way mode (`BOTH`) the amount is
/// already signed; hedge-mode `SHORT` rows report a magnitude.
pub fn signed_position(position_amt: Decimal, position_side: &str) -> i64 {
    let amt = contracts(position_amt);
    if position_side == "SHORT" {
        -amt.abs()
    } else {
        amt
    }
}

impl PositionRisk {
    pub fn signed_size(&self) -> i64 {
        signed_position(self.position_amt, &self.position_side)
    }
}

impl AccountPosition {
    pub fn signed_size(&self) -> i64 {
        signed_position(self.position_amt, &self.position_side)
    }
}

/// Open-order snapshot row (`/dapi/v1/openOrders`).
#[derive(Debug, Clone, Deserialize)]
pub struct OpenOrder {
    pub symbol: String,
    #[serde(rename = "orderId")]
    pub order_id: u64,
    pub side: Side,
    #[serde(default)]
    pub price: Decimal,
    #[serde(rename = "origQty", default)]
    pub orig_qty: Decimal,
}

/// Acknowledgement of an order POST.
#[derive(Debug, Clone, Deserialize)]
pub struct OrderAck {
    #[serde(rename = "orderId")]
    pub order_id: u64,
    #[serde(default)]
    pub status: String,
    #[serde(rename = "clientOrderId", default)]
    pub client_order_id: String,
}

/// Error body the venue returns on non-2xx responses.
#[derive(Debug, Clone, Deserialize)]
pub struct ApiError {
    pub code: i64,
    pub msg: String,
}

/// Listen-key creation/refresh response.
#[derive(Debug, Clone, Deserialize)]
pub struct ListenKey {
    #[serde(rename = "listenKey")]
    pub listen_key: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_parse_depth_update() {
        let raw = r#"{
            "e": "depthUpdate", "E": 1591270260907, "T": 1591270260891,
            "s": "BTCUSD_PERP", "ps": "BTCUSD", "U": 17, "u": 19, "pu": 16,
            "b": [["9517.6", "10"]],
            "a": [["9518.5", "45"], ["9524.6", "0"]]
        }"#;
        let u: DepthUpdate = serde_json::from_str(raw).unwrap();
        assert_eq!(u.first_update_id, 17);
        assert_eq!(u.final_update_id, 19);
        assert_eq!(u.bids[0], (dec!(9517.6), dec!(10)));
        assert_eq!(u.asks[1].1, dec!(0));
    }

    #[test]
    fn test_parse_depth_snapshot() {
        let raw = r#"{
            "lastUpdateId": 16769853, "symbol": "BTCUSD_PERP", "pair": "BTCUSD",
            "E": 1591250106370, "T": 1591250106368,
            "bids": [["9235.4", "1"]], "asks": [["9239.3", "8"]]
        }"#;
        let s: DepthSnapshot = serde_json::from_str(raw).unwrap();
        assert_eq!(s.last_update_id, 16769853);
        assert_eq!(s.bids.len(), 1);
    }

    #[test]
    fn test_parse_order_trade_update() {
        let raw = r#"{
            "s": "BTCUSD_PERP", "c": "x-1", "S": "SELL", "o": "MARKET",
            "x": "TRADE", "X": "FILLED", "i": 8886774,
            "l": "1", "z": "1", "L": "9278.2"
        }"#;
        let o: OrderTradeUpdate = serde_json::from_str(raw).unwrap();
        assert!(o.is_trade());
        assert_eq!(o.signed_fill(), -1);
        assert_eq!(o.order_id, 8886774);
    }

    #[test]
    fn test_order_trade_update_new_is_not_trade() {
        let raw = r#"{"s": "BTCUSD_PERP", "S": "BUY", "x": "NEW", "X": "NEW"}"#;
        let o: OrderTradeUpdate = serde_json::from_str(raw).unwrap();
        assert!(!o.is_trade());
        assert_eq!(o.signed_fill(), 0);
    }

    #[test]
    fn test_signed_position_modes() {
        assert_eq!(signed_position(dec!(3), "BOTH"), 3);
        assert_eq!(signed_position(dec!(-2), "BOTH"), -2);
        assert_eq!(signed_position(dec!(5), "SHORT"), -5);
        assert_eq!(signed_position(dec!(4), "LONG"), 4);
    }

    #[test]
    fn test_parse_position_risk() {
        let raw = r#"[{
            "symbol": "BTCUSD_PERP", "positionAmt": "-7", "entryPrice": "9253.0",
            "positionSide": "BOTH"
        }]"#;
        let rows: Vec<PositionRisk> = serde_json::from_str(raw).unwrap();
        assert_eq!(rows[0].signed_size(), -7);
    }

    #[test]
    fn test_parse_account_update_positions() {
        let raw = r#"{
            "B": [{"a": "BTC", "wb": "1.0"}],
            "P": [{"s": "BTCUSD_PERP", "pa": "2", "ep": "9200.0", "ps": "BOTH"}]
        }"#;
        let a: AccountUpdate = serde_json::from_str(raw).unwrap();
        assert_eq!(a.positions.len(), 1);
        assert_eq!(a.positions[0].signed_size(), 2);
    }

    #[test]
    fn test_parse_api_error() {
        let raw = r#"{"code": -2010, "msg": "Order would immediately trigger."}"#;
        let e: ApiError = serde_json::from_str(raw).unwrap();
        assert_eq!(e.code, -2010);
    }
}

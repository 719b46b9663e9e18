//! Signed REST client for the futures venue.
//!
//! Private endpoints sign the URL-encoded parameter string (insertion order,
//! `timestamp` last) and append `signature=<hex>`; the API key travels in the
//! `X-MBX-APIKEY` header. POST bodies are `application/x-www-form-urlencoded`;
//! GET endpoints carry the same signed string as their query.

use reqwest::Client;
use serde::de::DeserializeOwned;

use crate::creds::{epoch_ms, ApiCredentials};
use crate::error::{Result, VenueError};
use crate::types::Side;

use super::types::{ApiError, DepthSnapshot, ListenKey, OpenOrder, OrderAck, PositionRisk};

const LISTEN_KEY_PATH: &str = "/dapi/v1/listenKey";
const DEPTH_PATH: &str = "/dapi/v1/depth";
const ORDER_PATH: &str = "/dapi/v1/order";
const OPEN_ORDERS_PATH: &str = "/dapi/v1/openOrders";
const POSITION_RISK_PATH: &str = "/dapi/v1/positionRisk";

const API_KEY_HEADER: &str = "X-MBX-APIKEY";

/// Error codes that indicate a rejected signature or API key.
const AUTH_CODES: [i64; 3] = [-1022, -2014, -2015];

/// HTTP client for the venue's signed REST API.
#[derive(Debug, Clone)]
pub struct BinanceRest {
    client: Client,
    base_url: String,
    creds: ApiCredentials,
}

impl BinanceRest {
    pub fn new(base_url: &str, creds: ApiCredentials) -> Self {
        Self {
            client: Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
            creds,
        }
    }

    /// Create or refresh the private-stream listen key.
    pub async fn create_listen_key(&self) -> Result<String> {
        let body = self.signed_query(&[]);
        let resp = self
            .client
            .post(format!("{}{LISTEN_KEY_PATH}", self.base_url))
            .header(API_KEY_HEADER, &self.creds.key)
            .header("Content-Type", "application/x-www-form-urlencoded")
            .body(body)
            .send()
            .await?;
        let key: ListenKey = parse_response(resp).await?;
        Ok(key.listen_key)
    }

    /// Public depth snapshot for seeding the local book.
    pub async fn depth_snapshot(&self, symbol: &str, limit: u32) -> Result<DepthSnapshot> {
        let url = format!(
            "{}{DEPTH_PATH}?symbol={symbol}&limit={limit}",
            self.base_url
        );
        let resp = self.client.get(url).send().await?;
        parse_response(resp).await
    }

    /// Place a market order (the hedge instrument).
    pub async fn market_order(&self, symbol: &str, side: Side, qty: i64) -> Result<OrderAck> {
        let body = self.signed_query(&[
            ("symbol", symbol.to_string()),
            ("side", side.as_binance().to_string()),
            ("type", "MARKET".to_string()),
            ("quantity", qty.to_string()),
        ]);
        let resp = self
            .client
            .post(format!("{}{ORDER_PATH}", self.base_url))
            .header(API_KEY_HEADER, &self.creds.key)
            .header("Content-Type", "application/x-www-form-urlencoded")
            .body(body)
            .send()
            .await?;
        parse_response(resp).await
    }

    /// Open-orders snapshot for the symbol.
    pub async fn open_orders(&self, symbol: &str) -> Result<Vec<OpenOrder>> {
        let query = self.signed_query(&[("symbol", symbol.to_string())]);
        self.signed_get(OPEN_ORDERS_PATH, &query).await
    }

    /// Position-risk snapshot for the pair.
    pub async fn position_risk(&self, pair: &str) -> Result<Vec<PositionRisk>> {
        let query = self.signed_query(&[("pair", pair.to_string())]);
        self.signed_get(POSITION_RISK_PATH, &query).await
    }

    // -- signing + transport --------------------------------------------

    /// URL-encode `params` plus a trailing `timestamp`, sign the encoded
    /// string, and append `signature`.
    fn signed_query(&self, params: &[(&str, String)]) -> String {
        let mut ser = url::form_urlencoded::Serializer::new(String::new());
        for (k, v) in params {
            ser.append_pair(k, v);
        }
        ser.append_pair("timestamp", &epoch_ms().to_string());
        let unsigned = ser.finish();
        let signature = self.creds.sign(&unsigned);
        format!("{unsigned}&signature={signature}")
    }

    async fn signed_get<T: DeserializeOwned>(&self, path: &str, query: &str) -> Result<T> {
        let resp = self
            .client
            .get(format!("{}{path}?{query}", self.base_url))
            .header(API_KEY_HEADER, &self.creds.key)
            .send()
            .await?;
        parse_response(resp).await
    }
}

/// Decode a success body, or map the venue's `{code, msg}` error shape.
async fn parse_response<T: DeserializeOwned>(resp: reqwest::Response) -> Result<T> {
    let status = resp.status();
    if status.is_success() {
        return resp.json::<T>().await.map_err(VenueError::Request);
    }
    let body = resp.text().await.unwrap_or_default();
    match serde_json::from_str::<ApiError>(&body) {
        Ok(err) if AUTH_CODES.contains(&err.code) => Err(VenueError::Auth(err.msg)),
        Ok(err) => Err(VenueError::Reject {
            code: err.code,
            message: err.msg,
        }),
        Err(_) => Err(VenueError::Http {
            status: status.as_u16(),
            message: body,
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rest() -> BinanceRest {
        let creds = ApiCredentials::from_json(r#"{"id":"k","secret":"s"}"#).unwrap();
        BinanceRest::new("https://example.com", creds)
    }

    #[test]
    fn test_signed_query_appends_timestamp_then_signature() {
        let q = rest().signed_query(&[("symbol", "BTCUSD_PERP".to_string())]);
        assert!(q.starts_with("symbol=BTCUSD_PERP&timestamp="));
        let (unsigned, signature) = q.rsplit_once("&signature=").unwrap();
        let creds = ApiCredentials::from_json(r#"{"id":"k","secret":"s"}"#).unwrap();
        assert_eq!(signature, creds.sign(unsigned));
    }

    #[test]
    fn test_signed_query_preserves_param_order() {
        let q = rest().signed_query(&[
            ("symbol", "BTCUSD_PERP".to_string()),
            ("side", "SELL".to_string()),
            ("type", "MARKET".to_string()),
            ("quantity", "1".to_string()),
        ]);
        let symbol_at = q.find("symbol=").unwrap();
        let side_at = q.find("side=").unwrap();
        let qty_at = q.find("quantity=").unwrap();
        let ts_at = q.find("timestamp=").unwrap();
        assert!(symbol_at < side_at && side_at < qty_at && qty_at < ts_at);
    }
}

//! Signed REST client for the derivatives venue.
//!
//! Every private endpoint signs the URL-encoded `key=value&…` concatenation
//! of its parameters in canonical (lexicographic) order, including `api_key`
//! and `timestamp`, and appends the hex signature as `sign`. GET endpoints
//! send the signed string as the query; POST endpoints send the same
//! parameter map (plus `sign`) JSON-encoded.

use std::collections::BTreeMap;

use reqwest::Client;
use serde::de::DeserializeOwned;

use crate::creds::{epoch_ms, ApiCredentials};
use crate::error::{Result, VenueError};
use crate::types::Side;

use super::types::{OrderResult, OrderUpdate, PositionInfo, RestResponse};

const CREATE_PATH: &str = "/v2/private/order/create";
const REPLACE_PATH: &str = "/v2/private/order/replace";
const CANCEL_ALL_PATH: &str = "/v2/private/order/cancelAll";
const OPEN_ORDERS_PATH: &str = "/v2/private/order";
const POSITION_LIST_PATH: &str = "/v2/private/position/list";

/// Venue ret_codes that indicate a rejected signature or expired key.
const AUTH_RET_CODES: [i64; 3] = [10003, 10004, 33004];

/// HTTP client for the venue's signed REST API.
#[derive(Debug, Clone)]
pub struct BybitRest {
    client: Client,
    base_url: String,
    creds: ApiCredentials,
}

impl BybitRest {
    pub fn new(base_url: &str, creds: ApiCredentials) -> Self {
        Self {
            client: Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
            creds,
        }
    }

    /// Parameters for a new post-only limit order.
    pub async fn create_order(
        &self,
        symbol: &str,
        side: Side,
        order_link_id: &str,
        price: rust_decimal::Decimal,
        qty: i64,
    ) -> Result<RestResponse<OrderResult>> {
        let mut params = BTreeMap::new();
        params.insert("symbol".to_string(), symbol.to_string());
        params.insert("side".to_string(), side.as_bybit().to_string());
        params.insert("order_type".to_string(), "Limit".to_string());
        params.insert("qty".to_string(), qty.to_string());
        params.insert("price".to_string(), price.to_string());
        params.insert("time_in_force".to_string(), "PostOnly".to_string());
        params.insert("order_link_id".to_string(), order_link_id.to_string());
        self.post(CREATE_PATH, params).await
    }

    /// Replace the price of a resting order identified by its link id.
    pub async fn replace_order(
        &self,
        symbol: &str,
        order_link_id: &str,
        new_price: rust_decimal::Decimal,
    ) -> Result<RestResponse<OrderResult>> {
        let mut params = BTreeMap::new();
        params.insert("symbol".to_string(), symbol.to_string());
        params.insert("order_link_id".to_string(), order_link_id.to_string());
        params.insert("p_r_price".to_string(), new_price.to_string());
        self.post(REPLACE_PATH, params).await
    }

    /// Cancel every resting order on the symbol.
    pub async fn cancel_all(&self, symbol: &str) -> Result<RestResponse<serde_json::Value>> {
        let mut params = BTreeMap::new();
        params.insert("symbol".to_string(), symbol.to_string());
        self.post(CANCEL_ALL_PATH, params).await
    }

    /// Open-orders snapshot for the symbol.
    pub async fn open_orders(&self, symbol: &str) -> Result<Vec<OrderUpdate>> {
        let mut params = BTreeMap::new();
        params.insert("symbol".to_string(), symbol.to_string());
        let resp: RestResponse<Vec<OrderUpdate>> = self.get(OPEN_ORDERS_PATH, params).await?;
        Ok(check(resp)?.unwrap_or_default())
    }

    /// Current position on the symbol.
    pub async fn position(&self, symbol: &str) -> Result<Option<PositionInfo>> {
        let mut params = BTreeMap::new();
        params.insert("symbol".to_string(), symbol.to_string());
        let resp: RestResponse<PositionInfo> = self.get(POSITION_LIST_PATH, params).await?;
        check(resp)
    }

    // -- signing + transport --------------------------------------------

    /// Add `api_key`/`timestamp`, sign the canonical concatenation, and
    /// return the map with `sign` appended.
    fn signed_params(&self, mut params: BTreeMap<String, String>) -> BTreeMap<String, String> {
        params.insert("api_key".to_string(), self.creds.key.clone());
        params.insert("timestamp".to_string(), epoch_ms().to_string());
        let sign = self.creds.sign(&form_encode(&params));
        params.insert("sign".to_string(), sign);
        params
    }

    async fn post<T: DeserializeOwned>(
        &self,
        path: &str,
        params: BTreeMap<String, String>,
    ) -> Result<RestResponse<T>> {
        let body = self.signed_params(params);
        let resp = self
            .client
            .post(format!("{}{path}", self.base_url))
            .json(&body)
            .send()
            .await?;
        parse_response(resp).await
    }

    async fn get<T: DeserializeOwned>(
        &self,
        path: &str,
        params: BTreeMap<String, String>,
    ) -> Result<T> {
        let signed = self.signed_params(params);
        let url = format!("{}{path}?{}", self.base_url, form_encode(&signed));
        let resp = self.client.get(url).send().await?;
        let status = resp.status();
        if !status.is_success() {
            return Err(VenueError::Http {
                status: status.as_u16(),
                message: resp.text().await.unwrap_or_default(),
            });
        }
        resp.json::<T>().await.map_err(VenueError::Request)
    }
}

/// URL-encode a parameter map in iteration (lexicographic) order.
fn form_encode(params: &BTreeMap<String, String>) -> String {
    let mut ser = url::form_urlencoded::Serializer::new(String::new());
    for (k, v) in params {
        ser.append_pair(k, v);
    }
    ser.finish()
}

async fn parse_response<T: DeserializeOwned>(resp: reqwest::Response) -> Result<RestResponse<T>> {
    let status = resp.status();
    if !status.is_success() {
        return Err(VenueError::Http {
            status: status.as_u16(),
            message: resp.text().await.unwrap_or_default(),
        });
    }
    resp.json::<RestResponse<T>>()
        .await
        .map_err(VenueError::Request)
}

/// Turn an envelope into its result, mapping venue errors.
fn check<T>(resp: RestResponse<T>) -> Result<Option<T>> {
    if resp.is_success() {
        Ok(resp.result)
    } else if AUTH_RET_CODES.contains(&resp.ret_code) {
        Err(VenueError::Auth(resp.ret_msg))
    } else {
        Err(VenueError::Reject {
            code: resp.ret_code,
            message: resp.ret_msg,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_form_encode_is_lexicographic() {
        let mut params = BTreeMap::new();
        params.insert("timestamp".to_string(), "1000".to_string());
        params.insert("api_key".to_string(), "k".to_string());
        params.insert("symbol".to_string(), "BTCUSD".to_string());
        assert_eq!(form_encode(&params), "api_key=k&symbol=BTCUSD&timestamp=1000");
    }

    #[test]
    fn test_signed_params_cover_all_fields() {
        let creds =
            ApiCredentials::from_json(r#"{"id":"k","secret":"s"}"#).unwrap();
        let rest = BybitRest::new("https://example.com", creds.clone());
        let mut params = BTreeMap::new();
        params.insert("symbol".to_string(), "BTCUSD".to_string());

        let signed = rest.signed_params(params);
        assert_eq!(signed["api_key"], "k");
        assert!(signed.contains_key("timestamp"));

        // The signature must cover everything except `sign` itself.
        let mut unsigned = signed.clone();
        let sign = unsigned.remove("sign").unwrap();
        assert_eq!(sign, creds.sign(&form_encode(&unsigned)));
    }

    #[test]
    fn test_check_maps_auth_codes() {
        let resp: RestResponse<()> = RestResponse {
            ret_code: 10003,
            ret_msg: "invalid api_key".into(),
            result: None,
            rate_limit_status: None,
            rate_limit_reset_ms: None,
        };
        assert!(matches!(check(resp), Err(VenueError::Auth(_))));
    }

    #[test]
    fn test_check_maps_rejects() {
        let resp: RestResponse<()> = RestResponse {
            ret_code: 20001,
            ret_msg: "order not exists".into(),
            result: None,
            rate_limit_status: None,
            rate_limit_reset_ms: None,
        };
        assert!(matches!(
            check(resp),
            Err(VenueError::Reject { code: 20001, .. })
        ));
    }
}

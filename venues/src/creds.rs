//! API credential files and HMAC-SHA256 request signing.
//!
//! Both venues authenticate REST and WebSocket requests with hex-encoded
//! HMAC-SHA256 signatures over a canonical message string; only the message
//! construction differs per venue (see the `bybit` and `binance` modules).

use std::path::Path;
use std::time::{SystemTime, UNIX_EPOCH};

use hmac::{Hmac, Mac};
use serde::Deserialize;
use sha2::Sha256;

use crate::error::{Result, VenueError};

type HmacSha256 = Hmac<Sha256>;

/// API key pair loaded from a JSON credentials file: `{"id": …, "secret": …}`.
#[derive(Clone, Deserialize)]
pub struct ApiCredentials {
    /// Public API key (`id` in the credentials file).
    #[serde(rename = "id")]
    pub key: String,
    secret: String,
}

impl std::fmt::Debug for ApiCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ApiCredentials")
            .field("key", &self.key)
            .field("secret", &"***")
            .finish()
    }
}

impl ApiCredentials {
    /// Load credentials from a JSON file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let raw = std::fs::read_to_string(path.as_ref()).map_err(|e| {
            VenueError::Credentials(format!("{}: {e}", path.as_ref().display()))
        })?;
        Self::from_json(&raw)
    }

    /// Parse credentials from a JSON string.
    pub fn from_json(raw: &str) -> Result<Self> {
        serde_json::from_str(raw)
            .map_err(|e| VenueError::Credentials(format!("invalid credentials file: {e}")))
    }

    /// Hex-encoded HMAC-SHA256 signature of `message` under the secret key.
    pub fn sign(&self, message: &str) -> String {
        let mut mac = HmacSha256::new_from_slice(self.secret.as_bytes())
            .expect("HMAC accepts keys of any length");
        mac.update(message.as_bytes());
        hex::encode(mac.finalize().into_bytes())
    }
}

/// Current wall-clock time in epoch milliseconds.
pub fn epoch_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}

#[cfg(test)]
mod tests {
    use super::*;

    fn creds() -> ApiCredentials {
        ApiCredentials::from_json(r#"{"id":"test-key","secret":"test-secret"}"#).unwrap()
    }

    #[test]
    fn test_parse_credentials_file() {
        let c = creds();
        assert_eq!(c.key, "test-key");
        assert_eq!(c.secret, "test-secret");
    }

    #[test]
    fn test_invalid_credentials_rejected() {
        assert!(ApiCredentials::from_json("not json").is_err());
        assert!(ApiCredentials::from_json(r#"{"id":"only-key"}"#).is_err());
    }

    #[test]
    fn test_signature_known_vector() {
        // echo -n "message" | openssl dgst -sha256 -hmac "test-secret"
        let c = creds();
        assert_eq!(
            c.sign("message"),
            "8f4cf458c869872898cb5c29386e2fd43a4f3b9ae02f7a22966517b2318ba3e5"
        );
    }

    #[test]
    fn test_signature_deterministic() {
        let c = creds();
        assert_eq!(c.sign("GET/realtime1577836800000"), c.sign("GET/realtime1577836800000"));
    }

    #[test]
    fn test_debug_redacts_secret() {
        let formatted = format!("{:?}", creds());
        assert!(!formatted.contains("test-secret"));
        assert!(formatted.contains("***"));
    }
}

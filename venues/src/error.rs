use rust_decimal::Decimal;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum VenueError {
    #[error("HTTP error {status}: {message}")]
    Http { status: u16, message: String },

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("WebSocket error: {0}")]
    WebSocket(Box<tokio_tungstenite::tungstenite::Error>),

    #[error("request error: {0}")]
    Request(#[from] reqwest::Error),

    #[error("connection closed")]
    ConnectionClosed,

    #[error("heartbeat missed: no pong within {0}s")]
    HeartbeatMiss(u64),

    #[error("credentials error: {0}")]
    Credentials(String),

    #[error("authentication rejected: {0}")]
    Auth(String),

    #[error("venue rejected request (code {code}): {message}")]
    Reject { code: i64, message: String },

    #[error("order book inconsistent: best bid {bid} >= best ask {ask}")]
    BookInconsistent { bid: Decimal, ask: Decimal },

    #[error("event channel closed")]
    ChannelClosed,
}

impl From<tokio_tungstenite::tungstenite::Error> for VenueError {
    fn from(e: tokio_tungstenite::tungstenite::Error) -> Self {
        VenueError::WebSocket(Box::new(e))
    }
}

impl VenueError {
    /// Whether this error should terminate the venue pipeline instead of
    /// triggering a reconnect.
    pub fn is_fatal(&self) -> bool {
        matches!(self, VenueError::Auth(_) | VenueError::Credentials(_))
    }
}

pub type Result<T> = std::result::Result<T, VenueError>;

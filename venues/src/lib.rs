//! Venue connectivity for the cross-venue market maker: order books, signed
//! REST clients, and WebSocket stream supervisors for both exchanges.

pub mod binance;
pub mod bybit;
pub mod creds;
pub mod error;
pub mod types;

// ---- Top-level re-exports for ergonomic usage ----

pub use creds::{epoch_ms, ApiCredentials};
pub use error::{Result, VenueError};
pub use types::{Bbo, PriceLevel, Side};

pub use bybit::{BybitBook, BybitClient, BybitEvent, BybitRest};

pub use binance::{BinanceBook, BinanceClient, BinanceEvent, BinanceRest};

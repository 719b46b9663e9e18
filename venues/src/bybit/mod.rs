//! Derivatives venue (venue A): delta-25 book stream, signed REST orders.

pub mod book;
pub mod rest;
pub mod types;
pub mod ws;

pub use book::BybitBook;
pub use rest::BybitRest;
pub use ws::{BybitClient, BybitEvent};

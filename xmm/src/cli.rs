use std::path::PathBuf;

use clap::{Parser, Subcommand};
use rust_decimal::Decimal;

/// xmm — cross-venue market maker.
#[derive(Parser, Debug)]
#[command(name = "xmm", version)]
pub struct Cli {
    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info", global = true)]
    pub log_level: String,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Run the market-making engine
    Run(RunArgs),
}

/// Arguments for the `run` subcommand.
#[derive(Parser, Debug)]
pub struct RunArgs {
    /// Path to the derivatives-venue credentials file ({"id", "secret"})
    pub bybit_keys: PathBuf,

    /// Path to the futures-venue credentials file ({"id", "secret"})
    pub binance_keys: PathBuf,

    /// Quoted symbol on the derivatives venue
    #[arg(long, default_value = "BTCUSD")]
    pub symbol: String,

    /// Hedge symbol on the futures venue
    #[arg(long, default_value = "BTCUSD_PERP")]
    pub hedge_symbol: String,

    /// Underlying pair for the futures venue's position endpoint
    #[arg(long, default_value = "BTCUSD")]
    pub hedge_pair: String,

    /// Base quote size in contracts
    #[arg(long, default_value = "100")]
    pub quote_size: i64,

    /// Maximum absolute position in contracts on the quoted venue
    #[arg(long, default_value = "1000")]
    pub inventory_limit: i64,

    /// Hedge-venue contracts per quoted-venue contract bucket
    #[arg(long, default_value = "100")]
    pub hedge_ratio: i64,

    /// Risk margin added to fee + profit when pricing quotes
    #[arg(long, default_value = "0.00015")]
    pub risk: Decimal,

    /// Ticks a target must persist away from the live price before amending
    #[arg(long, default_value = "3")]
    pub update_interval: u32,
}

// Core modules
pub mod api;
pub mod bot;
pub mod config;
pub mod execution;
pub mod indicators;
pub mod models;
pub mod risk;
pub mod strategy;

// Re-export commonly used types
pub use api::{BinanceFuturesClient, Exchange, ExchangeError};
pub use bot::{CycleReport, SymbolOutcome, TradingBot};
pub use config::{BotConfig, Credentials};
pub use models::*;
pub use strategy::Strategy;

// Error handling
pub type Result<T> = anyhow::Result<T>;

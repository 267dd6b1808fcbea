// Exchange access: the `Exchange` seam plus the Binance USD-M futures client
pub mod binance;
pub mod error;

pub use binance::{BinanceFuturesClient, RetryPolicy, LIVE_BASE_URL, TESTNET_BASE_URL};
pub use error::ExchangeError;

use crate::models::{Candle, Symbol, Timeframe, TradeSide};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Precision and filters for one futures contract
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MarketInfo {
    pub price_precision: u32,
    pub quantity_precision: u32,
    pub tick_size: f64,
    pub step_size: f64,
    pub min_quantity: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OrderKind {
    Market,
    StopMarket,
    TakeProfitMarket,
}

impl OrderKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderKind::Market => "MARKET",
            OrderKind::StopMarket => "STOP_MARKET",
            OrderKind::TakeProfitMarket => "TAKE_PROFIT_MARKET",
        }
    }

    /// Parse the wire form; unknown types (LIMIT, TRAILING_STOP_MARKET, ...) give None
    pub fn from_wire(s: &str) -> Option<Self> {
        match s {
            "MARKET" => Some(OrderKind::Market),
            "STOP_MARKET" => Some(OrderKind::StopMarket),
            "TAKE_PROFIT_MARKET" => Some(OrderKind::TakeProfitMarket),
            _ => None,
        }
    }

    pub fn is_bracket(&self) -> bool {
        matches!(self, OrderKind::StopMarket | OrderKind::TakeProfitMarket)
    }
}

impl fmt::Display for OrderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct OrderRequest {
    pub symbol: Symbol,
    pub side: TradeSide,
    pub kind: OrderKind,
    pub quantity: f64,
    /// Trigger price for STOP_MARKET / TAKE_PROFIT_MARKET
    pub stop_price: Option<f64>,
    pub reduce_only: bool,
    /// Sent as `newClientOrderId`; identifies the order if the response is lost
    pub client_order_id: String,
}

fn new_client_order_id() -> String {
    // 32 chars, inside Binance's 36-char limit
    Uuid::new_v4().simple().to_string()
}

impl OrderRequest {
    pub fn market(symbol: Symbol, side: TradeSide, quantity: f64) -> Self {
        Self {
            symbol,
            side,
            kind: OrderKind::Market,
            quantity,
            stop_price: None,
            reduce_only: false,
            client_order_id: new_client_order_id(),
        }
    }

    /// Reduce-only stop closing a position opened on `position_side`
    pub fn stop_loss(symbol: Symbol, position_side: TradeSide, quantity: f64, price: f64) -> Self {
        Self::bracket(symbol, position_side, OrderKind::StopMarket, quantity, price)
    }

    /// Reduce-only take-profit closing a position opened on `position_side`
    pub fn take_profit(
        symbol: Symbol,
        position_side: TradeSide,
        quantity: f64,
        price: f64,
    ) -> Self {
        Self::bracket(symbol, position_side, OrderKind::TakeProfitMarket, quantity, price)
    }

    fn bracket(
        symbol: Symbol,
        position_side: TradeSide,
        kind: OrderKind,
        quantity: f64,
        price: f64,
    ) -> Self {
        Self {
            symbol,
            side: position_side.opposite(),
            kind,
            quantity,
            stop_price: Some(price),
            reduce_only: true,
            client_order_id: new_client_order_id(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct OrderResponse {
    pub order_id: i64,
    /// Binance order status (NEW, FILLED, ...)
    pub status: String,
    pub avg_price: Option<f64>,
    pub executed_qty: f64,
}

impl OrderResponse {
    pub fn is_filled(&self) -> bool {
        self.status == "FILLED"
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct OpenOrder {
    pub order_id: i64,
    pub symbol: String,
    /// Raw order type as reported by the exchange
    pub order_type: String,
    pub side: String,
    pub stop_price: Option<f64>,
}

impl OpenOrder {
    pub fn kind(&self) -> Option<OrderKind> {
        OrderKind::from_wire(&self.order_type)
    }
}

/// Futures exchange operations used by the bot
#[async_trait]
pub trait Exchange: Send + Sync {
    /// Most recent `limit` klines, oldest first
    async fn fetch_klines(
        &self,
        symbol: &Symbol,
        timeframe: &Timeframe,
        limit: u32,
    ) -> Result<Vec<Candle>, ExchangeError>;

    async fn market_info(&self, symbol: &Symbol) -> Result<MarketInfo, ExchangeError>;

    /// Total wallet balance of `asset`, 0 when the account holds none
    async fn fetch_balance(&self, asset: &str) -> Result<f64, ExchangeError>;

    /// Absolute position size in contracts, 0 when flat
    async fn position_amount(&self, symbol: &Symbol) -> Result<f64, ExchangeError>;

    async fn set_leverage(&self, symbol: &Symbol, leverage: u32) -> Result<(), ExchangeError>;

    async fn place_order(&self, order: &OrderRequest) -> Result<OrderResponse, ExchangeError>;

    async fn open_orders(&self, symbol: &Symbol) -> Result<Vec<OpenOrder>, ExchangeError>;

    async fn cancel_order(&self, symbol: &Symbol, order_id: i64) -> Result<(), ExchangeError>;
}

/// Snap a price to the nearest multiple of `tick_size`
pub fn round_to_tick(price: f64, tick_size: f64) -> f64 {
    if tick_size <= 0.0 {
        return price;
    }
    (price / tick_size).round() * tick_size
}

/// Round to `precision` decimal places
pub fn round_quantity(quantity: f64, precision: u32) -> f64 {
    let factor = 10f64.powi(precision as i32);
    (quantity * factor).round() / factor
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_round_to_tick() {
        assert!((round_to_tick(50123.37, 0.1) - 50123.4).abs() < 1e-9);
        assert!((round_to_tick(50123.37, 10.0) - 50120.0).abs() < 1e-9);
        assert_eq!(round_to_tick(1.2345, 0.0), 1.2345);
    }

    #[test]
    fn test_round_quantity() {
        assert_eq!(round_quantity(0.0123456, 3), 0.012);
        assert_eq!(round_quantity(0.0127, 2), 0.01);
        assert_eq!(round_quantity(12.6, 0), 13.0);
    }

    #[test]
    fn test_bracket_orders_close_position() {
        let symbol: Symbol = "BTC/USDT".parse().unwrap();
        let sl = OrderRequest::stop_loss(symbol.clone(), TradeSide::Buy, 0.01, 49000.0);
        let tp = OrderRequest::take_profit(symbol, TradeSide::Sell, 0.01, 47000.0);

        assert_eq!(sl.side, TradeSide::Sell);
        assert_eq!(sl.kind, OrderKind::StopMarket);
        assert!(sl.reduce_only);
        assert_eq!(sl.stop_price, Some(49000.0));
        assert_eq!(tp.side, TradeSide::Buy);
        assert_eq!(tp.kind, OrderKind::TakeProfitMarket);
    }

    #[test]
    fn test_client_order_ids_are_unique() {
        let symbol: Symbol = "BTC/USDT".parse().unwrap();
        let a = OrderRequest::market(symbol.clone(), TradeSide::Buy, 0.01);
        let b = OrderRequest::market(symbol, TradeSide::Buy, 0.01);

        assert_ne!(a.client_order_id, b.client_order_id);
        assert!(a.client_order_id.len() <= 36);
        assert!(a.client_order_id.chars().all(|c| c.is_ascii_alphanumeric()));
    }

    #[test]
    fn test_order_kind_wire() {
        assert_eq!(OrderKind::from_wire("STOP_MARKET"), Some(OrderKind::StopMarket));
        assert_eq!(OrderKind::from_wire("LIMIT"), None);
        assert!(OrderKind::TakeProfitMarket.is_bracket());
        assert!(!OrderKind::Market.is_bracket());
    }
}

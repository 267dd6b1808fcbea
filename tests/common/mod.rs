#![allow(dead_code)]

use async_trait::async_trait;
use chrono::{DateTime, Duration, TimeZone, Utc};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use wavebot::api::{
    Exchange, ExchangeError, MarketInfo, OpenOrder, OrderKind, OrderRequest, OrderResponse,
};
use wavebot::config::BotConfig;
use wavebot::models::{Candle, Signal, Symbol, Timeframe};
use wavebot::strategy::{SignalSnapshot, Strategy};

/// Mutable state behind `MockExchange`
#[derive(Debug)]
pub struct MockState {
    pub klines: HashMap<String, Vec<Candle>>,
    pub balance: f64,
    pub position: f64,
    /// Market fills set `position` to the order quantity
    pub fill_sets_position: bool,
    pub market_status: String,
    pub fill_price: Option<f64>,
    /// Executed quantity for market orders, defaults to the requested one
    pub fill_qty: Option<f64>,
    pub market: MarketInfo,
    pub open_orders: Vec<OpenOrder>,
    /// Bracket orders to reject before accepting
    pub bracket_failures: u32,
    pub placed: Vec<OrderRequest>,
    pub cancelled: Vec<i64>,
    pub leverage: Vec<(String, u32)>,
    /// Every call in order, e.g. "klines:15m", "order:STOP_MARKET", "cancel:77"
    pub calls: Vec<String>,
    next_order_id: i64,
}

impl Default for MockState {
    fn default() -> Self {
        Self {
            klines: HashMap::new(),
            balance: 1000.0,
            position: 0.0,
            fill_sets_position: true,
            market_status: "FILLED".to_string(),
            fill_price: None,
            fill_qty: None,
            market: MarketInfo {
                price_precision: 2,
                quantity_precision: 3,
                tick_size: 0.1,
                step_size: 0.001,
                min_quantity: 0.001,
            },
            open_orders: Vec::new(),
            bracket_failures: 0,
            placed: Vec::new(),
            cancelled: Vec::new(),
            leverage: Vec::new(),
            calls: Vec::new(),
            next_order_id: 1000,
        }
    }
}

#[derive(Clone, Default)]
pub struct MockExchange {
    pub state: Arc<Mutex<MockState>>,
}

impl MockExchange {
    pub fn with<F: FnOnce(&mut MockState)>(&self, f: F) {
        f(&mut self.state.lock().unwrap());
    }

    pub fn placed(&self) -> Vec<OrderRequest> {
        self.state.lock().unwrap().placed.clone()
    }

    pub fn calls(&self) -> Vec<String> {
        self.state.lock().unwrap().calls.clone()
    }
}

#[async_trait]
impl Exchange for MockExchange {
    async fn fetch_klines(
        &self,
        _symbol: &Symbol,
        timeframe: &Timeframe,
        limit: u32,
    ) -> Result<Vec<Candle>, ExchangeError> {
        let mut state = self.state.lock().unwrap();
        state.calls.push(format!("klines:{}", timeframe));
        match state.klines.get(timeframe.as_str()) {
            Some(candles) => {
                let skip = candles.len().saturating_sub(limit as usize);
                Ok(candles[skip..].to_vec())
            }
            None => Err(ExchangeError::Http {
                status: Some(503),
                message: format!("no klines for {}", timeframe),
            }),
        }
    }

    async fn market_info(&self, symbol: &Symbol) -> Result<MarketInfo, ExchangeError> {
        if symbol.exchange_symbol() == "UNKNOWNUSDT" {
            return Err(ExchangeError::MarketNotFound(symbol.to_string()));
        }
        Ok(self.state.lock().unwrap().market.clone())
    }

    async fn fetch_balance(&self, _asset: &str) -> Result<f64, ExchangeError> {
        let mut state = self.state.lock().unwrap();
        state.calls.push("balance".to_string());
        Ok(state.balance)
    }

    async fn position_amount(&self, _symbol: &Symbol) -> Result<f64, ExchangeError> {
        let mut state = self.state.lock().unwrap();
        state.calls.push("position".to_string());
        Ok(state.position)
    }

    async fn set_leverage(&self, symbol: &Symbol, leverage: u32) -> Result<(), ExchangeError> {
        let mut state = self.state.lock().unwrap();
        state.leverage.push((symbol.exchange_symbol(), leverage));
        Ok(())
    }

    async fn place_order(&self, order: &OrderRequest) -> Result<OrderResponse, ExchangeError> {
        let mut state = self.state.lock().unwrap();
        state.calls.push(format!("order:{}", order.kind));

        if order.kind.is_bracket() && state.bracket_failures > 0 {
            state.bracket_failures -= 1;
            return Err(ExchangeError::from_api(-2021, "Order would immediately trigger."));
        }

        state.next_order_id += 1;
        let order_id = state.next_order_id;
        state.placed.push(order.clone());

        let is_market = order.kind == OrderKind::Market;
        let executed_qty = match state.fill_qty {
            Some(qty) if is_market => qty,
            _ => order.quantity,
        };
        let status = if is_market {
            if state.fill_sets_position && state.market_status == "FILLED" {
                state.position = executed_qty;
            }
            state.market_status.clone()
        } else {
            "NEW".to_string()
        };

        Ok(OrderResponse {
            order_id,
            status,
            avg_price: state.fill_price.filter(|_| is_market),
            executed_qty,
        })
    }

    async fn open_orders(&self, _symbol: &Symbol) -> Result<Vec<OpenOrder>, ExchangeError> {
        let mut state = self.state.lock().unwrap();
        state.calls.push("open_orders".to_string());
        Ok(state.open_orders.clone())
    }

    async fn cancel_order(&self, _symbol: &Symbol, order_id: i64) -> Result<(), ExchangeError> {
        let mut state = self.state.lock().unwrap();
        state.calls.push(format!("cancel:{}", order_id));
        state.cancelled.push(order_id);
        state.open_orders.retain(|o| o.order_id != order_id);
        Ok(())
    }
}

/// Strategy that always reports the same signal at a fixed price
pub struct FixedSignal {
    pub signal: Signal,
    pub price: f64,
}

impl Strategy for FixedSignal {
    fn evaluate(&self, _candles: &[Candle]) -> wavebot::Result<SignalSnapshot> {
        Ok(SignalSnapshot {
            price: self.price,
            wt1: Some(-40.0),
            wt2: Some(-45.0),
            wt_vwap: Some(5.0),
            rsi: Some(35.0),
            mfi: Some(-1.0),
            cross_up: self.signal == Signal::Buy,
            cross_down: self.signal == Signal::Sell,
            bullish_divergence: false,
            bearish_divergence: false,
            gold: false,
            signal: self.signal,
        })
    }

    fn name(&self) -> &str {
        "Fixed"
    }

    fn min_candles_required(&self) -> usize {
        1
    }
}

pub fn btc() -> Symbol {
    "BTC/USDT".parse().unwrap()
}

pub fn t0() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 6, 1, 12, 0, 0).unwrap()
}

pub fn candles(closes: &[f64], step: Duration) -> Vec<Candle> {
    let start = t0() - step * closes.len() as i32;
    closes
        .iter()
        .enumerate()
        .map(|(i, &c)| Candle {
            open_time: start + step * i as i32,
            open: c,
            high: c * 1.002,
            low: c * 0.998,
            close: c,
            volume: 25.0,
        })
        .collect()
}

/// Single symbol, given timeframes, no waits between steps
pub fn test_config(timeframes: &[&str]) -> BotConfig {
    let mut config = BotConfig::default();
    config.symbols = vec![btc()];
    config.timeframes = timeframes.iter().map(|t| t.parse().unwrap()).collect();
    config.runtime.position_confirm_delay_ms = 0;
    config.runtime.bracket_retry_delay_ms = 0;
    config
}

pub fn stale_order(order_id: i64, order_type: &str) -> OpenOrder {
    OpenOrder {
        order_id,
        symbol: "BTCUSDT".to_string(),
        order_type: order_type.to_string(),
        side: "SELL".to_string(),
        stop_price: Some(48000.0),
    }
}

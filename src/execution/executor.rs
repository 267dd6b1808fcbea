use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};

use crate::api::{round_quantity, round_to_tick, Exchange, MarketInfo, OrderRequest};
use crate::config::BotConfig;
use crate::execution::TrackedTrade;
use crate::models::{Symbol, TradeSide};
use crate::risk::{calculate_brackets, clamp_distance, passes_floor, BracketKind, Brackets};

/// Sizing, bracket and timing parameters for order execution
#[derive(Debug, Clone)]
pub struct ExecutorConfig {
    pub leverage: u32,
    pub fixed_size_usd: f64,
    pub sl_pct: f64,
    pub tp_pct: f64,
    pub max_bracket_distance_pct: f64,
    pub min_price: Option<f64>,
    pub position_confirm_delay: Duration,
    pub bracket_attempts: u32,
    pub bracket_retry_delay: Duration,
}

impl ExecutorConfig {
    pub fn from_config(cfg: &BotConfig) -> Self {
        Self {
            leverage: cfg.strategy.leverage,
            fixed_size_usd: cfg.strategy.fixed_size_usd,
            sl_pct: cfg.strategy.sl_pct,
            tp_pct: cfg.strategy.tp_pct,
            max_bracket_distance_pct: cfg.strategy.max_bracket_distance_pct,
            min_price: cfg.strategy.min_price,
            position_confirm_delay: Duration::from_millis(cfg.runtime.position_confirm_delay_ms),
            bracket_attempts: cfg.runtime.bracket_attempts,
            bracket_retry_delay: Duration::from_millis(cfg.runtime.bracket_retry_delay_ms),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum BracketOutcome {
    Placed { order_id: i64, price: f64 },
    /// Trigger price failed the price floor
    Skipped { price: f64 },
    Failed { price: f64, error: String },
}

impl BracketOutcome {
    pub fn is_placed(&self) -> bool {
        matches!(self, BracketOutcome::Placed { .. })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct BracketReport {
    /// Stale STOP_MARKET / TAKE_PROFIT_MARKET orders cancelled beforehand
    pub cancelled: usize,
    pub stop_loss: BracketOutcome,
    pub take_profit: BracketOutcome,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ExecutionAction {
    Opened {
        trade: TrackedTrade,
        brackets: BracketReport,
    },
    Skip,
}

#[derive(Debug, Clone)]
pub struct ExecutionDecision {
    pub action: ExecutionAction,
    pub reason: String,
}

impl ExecutionDecision {
    fn skip(reason: String) -> Self {
        Self {
            action: ExecutionAction::Skip,
            reason,
        }
    }
}

pub struct Executor<E: Exchange> {
    exchange: Arc<E>,
    config: ExecutorConfig,
}

impl<E: Exchange> Executor<E> {
    pub fn new(exchange: Arc<E>, config: ExecutorConfig) -> Self {
        Self { exchange, config }
    }

    /// Contracts for `fixed_size_usd` of margin at `leverage`, in whole LOT_SIZE steps
    pub fn position_size(&self, entry_price: f64, market: &MarketInfo) -> f64 {
        if entry_price <= 0.0 {
            return 0.0;
        }
        let raw = self.config.fixed_size_usd * f64::from(self.config.leverage) / entry_price;
        round_quantity(
            round_to_tick(raw, market.step_size),
            market.quantity_precision,
        )
    }

    /// Market entry, fill check, position confirmation, then SL/TP
    ///
    /// Order rejections come back as `Err`; soft failures (below min size,
    /// not filled, unconfirmed position) as a `Skip` decision with a reason.
    pub async fn open_position(
        &self,
        symbol: &Symbol,
        side: TradeSide,
        entry_price: f64,
        now: DateTime<Utc>,
    ) -> anyhow::Result<ExecutionDecision> {
        let market = self.exchange.market_info(symbol).await?;
        let quantity = self.position_size(entry_price, &market);

        if quantity <= 0.0 || quantity < market.min_quantity {
            return Ok(ExecutionDecision::skip(format!(
                "Quantity {} below minimum {} for {}",
                quantity, market.min_quantity, symbol
            )));
        }

        tracing::info!(
            "Placing {} MARKET for {}, qty={} (~{:.2} USDT at {}x)",
            side,
            symbol,
            quantity,
            self.config.fixed_size_usd,
            self.config.leverage
        );
        let order = self
            .exchange
            .place_order(&OrderRequest::market(symbol.clone(), side, quantity))
            .await?;

        if !order.is_filled() {
            return Ok(ExecutionDecision::skip(format!(
                "Market order {} for {} not filled (status {})",
                order.order_id, symbol, order.status
            )));
        }

        // Position endpoint lags the fill slightly
        tokio::time::sleep(self.config.position_confirm_delay).await;
        let amount = self.exchange.position_amount(symbol).await?;
        if amount <= 0.0 {
            return Ok(ExecutionDecision::skip(format!(
                "Failed to confirm position for {} after {} order",
                symbol, side
            )));
        }

        let fill_price = order.avg_price.unwrap_or(entry_price);
        let filled = if order.executed_qty > 0.0 {
            order.executed_qty
        } else {
            quantity
        };
        if filled != quantity {
            tracing::warn!(
                "{} order for {} filled {} of {}",
                side,
                symbol,
                filled,
                quantity
            );
        }
        let trade = TrackedTrade::new(symbol.clone(), side, fill_price, filled, now);
        let brackets = self.place_brackets(&trade, &market).await;

        Ok(ExecutionDecision {
            reason: format!("{} {} {} @ {:.2}", side, quantity, symbol, fill_price),
            action: ExecutionAction::Opened { trade, brackets },
        })
    }

    /// Cancel stale brackets once, then place stop-loss followed by take-profit
    pub async fn place_brackets(&self, trade: &TrackedTrade, market: &MarketInfo) -> BracketReport {
        let cancelled = self.cancel_stale_brackets(&trade.symbol).await;

        let prices = calculate_brackets(
            trade.entry_price,
            trade.side,
            self.config.leverage,
            self.config.tp_pct,
            self.config.sl_pct,
        );

        let stop_loss = self
            .place_bracket(trade, market, &prices, BracketKind::StopLoss)
            .await;
        let take_profit = self
            .place_bracket(trade, market, &prices, BracketKind::TakeProfit)
            .await;

        BracketReport {
            cancelled,
            stop_loss,
            take_profit,
        }
    }

    async fn cancel_stale_brackets(&self, symbol: &Symbol) -> usize {
        let orders = match self.exchange.open_orders(symbol).await {
            Ok(orders) => orders,
            Err(e) => {
                tracing::warn!("Could not list open orders for {}: {}", symbol, e);
                return 0;
            }
        };

        let mut cancelled = 0;
        for order in orders.iter().filter(|o| o.kind().is_some_and(|k| k.is_bracket())) {
            match self.exchange.cancel_order(symbol, order.order_id).await {
                Ok(()) => {
                    tracing::info!(
                        "Cancelled stale {} order {} for {}",
                        order.order_type,
                        order.order_id,
                        symbol
                    );
                    cancelled += 1;
                }
                Err(e) => tracing::warn!(
                    "Failed to cancel {} order {} for {}: {}",
                    order.order_type,
                    order.order_id,
                    symbol,
                    e
                ),
            }
        }
        cancelled
    }

    async fn place_bracket(
        &self,
        trade: &TrackedTrade,
        market: &MarketInfo,
        prices: &Brackets,
        kind: BracketKind,
    ) -> BracketOutcome {
        let clamped = clamp_distance(
            kind,
            trade.side,
            prices.price(kind),
            trade.entry_price,
            self.config.max_bracket_distance_pct,
        );
        let price = round_to_tick(clamped, market.tick_size);

        if !passes_floor(price, self.config.min_price) {
            tracing::error!(
                "Invalid {} price {:.2} for {}, skipping",
                kind,
                price,
                trade.symbol
            );
            return BracketOutcome::Skipped { price };
        }

        let request = match kind {
            BracketKind::StopLoss => {
                OrderRequest::stop_loss(trade.symbol.clone(), trade.side, trade.quantity, price)
            }
            BracketKind::TakeProfit => {
                OrderRequest::take_profit(trade.symbol.clone(), trade.side, trade.quantity, price)
            }
        };

        let attempts = self.config.bracket_attempts.max(1);
        let mut last_error = String::new();
        for attempt in 1..=attempts {
            tracing::info!(
                "Creating {} @ {:.2} for {}, qty={}",
                kind.order_kind(),
                price,
                trade.symbol,
                trade.quantity
            );
            match self.exchange.place_order(&request).await {
                Ok(order) => {
                    return BracketOutcome::Placed {
                        order_id: order.order_id,
                        price,
                    };
                }
                Err(e) => {
                    tracing::error!(
                        "Failed to set {} for {} (attempt {}/{}): {}",
                        kind,
                        trade.symbol,
                        attempt,
                        attempts,
                        e
                    );
                    last_error = e.to_string();
                    if attempt < attempts {
                        tokio::time::sleep(self.config.bracket_retry_delay).await;
                    }
                }
            }
        }

        BracketOutcome::Failed {
            price,
            error: last_error,
        }
    }
}

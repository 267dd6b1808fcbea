use crate::api::OrderKind;
use crate::models::TradeSide;
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BracketKind {
    StopLoss,
    TakeProfit,
}

impl BracketKind {
    pub fn order_kind(self) -> OrderKind {
        match self {
            BracketKind::StopLoss => OrderKind::StopMarket,
            BracketKind::TakeProfit => OrderKind::TakeProfitMarket,
        }
    }

    /// Which way the trigger sits from entry for a position on `side`, as a sign
    fn direction(self, side: TradeSide) -> f64 {
        match (self, side) {
            (BracketKind::TakeProfit, TradeSide::Buy) | (BracketKind::StopLoss, TradeSide::Sell) => 1.0,
            (BracketKind::TakeProfit, TradeSide::Sell) | (BracketKind::StopLoss, TradeSide::Buy) => -1.0,
        }
    }
}

impl fmt::Display for BracketKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BracketKind::StopLoss => f.write_str("SL"),
            BracketKind::TakeProfit => f.write_str("TP"),
        }
    }
}

/// Stop-loss and take-profit trigger prices
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Brackets {
    pub stop_loss: f64,
    pub take_profit: f64,
}

impl Brackets {
    pub fn price(&self, kind: BracketKind) -> f64 {
        match kind {
            BracketKind::StopLoss => self.stop_loss,
            BracketKind::TakeProfit => self.take_profit,
        }
    }
}

/// Bracket prices for a position
///
/// `tp_pct` / `sl_pct` are margin returns, so the price move is divided by
/// leverage: with 10x and tp_pct 0.07 the take-profit sits 0.7% from entry.
pub fn calculate_brackets(
    entry: f64,
    side: TradeSide,
    leverage: u32,
    tp_pct: f64,
    sl_pct: f64,
) -> Brackets {
    let lev = f64::from(leverage.max(1));
    Brackets {
        take_profit: entry * (1.0 + BracketKind::TakeProfit.direction(side) * tp_pct / lev),
        stop_loss: entry * (1.0 + BracketKind::StopLoss.direction(side) * sl_pct / lev),
    }
}

/// Pull a trigger that sits more than `max_pct` from entry back to exactly `max_pct`
pub fn clamp_distance(
    kind: BracketKind,
    side: TradeSide,
    price: f64,
    entry: f64,
    max_pct: f64,
) -> f64 {
    if entry <= 0.0 || (price - entry).abs() / entry <= max_pct {
        return price;
    }

    let adjusted = entry * (1.0 + kind.direction(side) * max_pct);
    tracing::warn!(
        "Adjusted {} from {:.2} to {:.2} due to excessive distance from entry {:.2}",
        kind,
        price,
        adjusted,
        entry
    );
    adjusted
}

/// Price sanity floor; always passes when no floor is configured
pub fn passes_floor(price: f64, min_price: Option<f64>) -> bool {
    min_price.map_or(true, |floor| price >= floor)
}

/// Result of a closed trade, net of commission on both legs
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PnlReport {
    pub gross: f64,
    pub commission: f64,
    pub net: f64,
    /// Net PnL as a percentage of entry notional
    pub net_pct: f64,
}

pub fn realized_pnl(
    entry: f64,
    exit: f64,
    quantity: f64,
    side: TradeSide,
    commission_pct: f64,
) -> PnlReport {
    let gross = match side {
        TradeSide::Buy => (exit - entry) * quantity,
        TradeSide::Sell => (entry - exit) * quantity,
    };
    let commission = (entry * quantity + exit * quantity) * commission_pct;
    let net = gross - commission;
    let notional = entry * quantity;
    let net_pct = if notional > 0.0 { net / notional * 100.0 } else { 0.0 };

    PnlReport {
        gross,
        commission,
        net,
        net_pct,
    }
}

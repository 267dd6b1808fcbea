use chrono::{DateTime, Duration, Utc};
use std::collections::HashMap;
use uuid::Uuid;

use crate::models::{Symbol, TradeSide};
use crate::risk::{realized_pnl, PnlReport};

/// A position this bot opened and is still watching
#[derive(Debug, Clone, PartialEq)]
pub struct TrackedTrade {
    pub id: Uuid,
    pub symbol: Symbol,
    pub side: TradeSide,
    pub entry_price: f64,
    pub quantity: f64,
    pub opened_at: DateTime<Utc>,
}

impl TrackedTrade {
    pub fn new(
        symbol: Symbol,
        side: TradeSide,
        entry_price: f64,
        quantity: f64,
        opened_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            symbol,
            side,
            entry_price,
            quantity,
            opened_at,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ClosedTrade {
    pub trade: TrackedTrade,
    pub exit_price: f64,
    pub closed_at: DateTime<Utc>,
    pub pnl: PnlReport,
}

/// What a position amount means given what we were tracking
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PositionObservation {
    Open,
    /// Flat now but we were tracking it as open: SL/TP hit or closed by hand
    ClosedExternally,
    Flat,
}

#[derive(Debug, Clone, Default)]
struct SymbolState {
    position_open: bool,
    cooling_until: Option<DateTime<Utc>>,
    last_trade: Option<TrackedTrade>,
}

/// Per-symbol open flag, last trade and post-close cooldown
#[derive(Debug, Clone)]
pub struct TradeTracker {
    states: HashMap<Symbol, SymbolState>,
    cooldown: Duration,
    commission_pct: f64,
}

impl TradeTracker {
    pub fn new(cooldown: Duration, commission_pct: f64) -> Self {
        Self {
            states: HashMap::new(),
            cooldown,
            commission_pct,
        }
    }

    pub fn is_cooling(&self, symbol: &Symbol, now: DateTime<Utc>) -> bool {
        self.cooling_until(symbol).is_some_and(|until| now < until)
    }

    pub fn cooling_until(&self, symbol: &Symbol) -> Option<DateTime<Utc>> {
        self.states.get(symbol).and_then(|s| s.cooling_until)
    }

    pub fn is_open(&self, symbol: &Symbol) -> bool {
        self.states.get(symbol).is_some_and(|s| s.position_open)
    }

    pub fn last_trade(&self, symbol: &Symbol) -> Option<&TrackedTrade> {
        self.states.get(symbol).and_then(|s| s.last_trade.as_ref())
    }

    /// Update the open flag from the exchange position amount
    pub fn observe_position(&mut self, symbol: &Symbol, amount: f64) -> PositionObservation {
        let state = self.states.entry(symbol.clone()).or_default();

        if amount.abs() > 0.0 {
            state.position_open = true;
            PositionObservation::Open
        } else if state.position_open {
            PositionObservation::ClosedExternally
        } else {
            PositionObservation::Flat
        }
    }

    pub fn mark_opened(&mut self, trade: TrackedTrade) -> anyhow::Result<()> {
        let state = self.states.entry(trade.symbol.clone()).or_default();
        if state.last_trade.is_some() {
            anyhow::bail!("Already tracking an open trade for {}", trade.symbol);
        }

        state.position_open = true;
        state.last_trade = Some(trade);
        Ok(())
    }

    /// Close the tracked trade at `exit_price` and start the cooldown
    ///
    /// Returns None (and starts no cooldown) when there was no tracked trade,
    /// e.g. a position that predates this process.
    pub fn mark_closed(
        &mut self,
        symbol: &Symbol,
        exit_price: f64,
        now: DateTime<Utc>,
    ) -> Option<ClosedTrade> {
        let state = self.states.entry(symbol.clone()).or_default();
        state.position_open = false;

        let trade = state.last_trade.take()?;
        state.cooling_until = Some(now + self.cooldown);

        let pnl = realized_pnl(
            trade.entry_price,
            exit_price,
            trade.quantity,
            trade.side,
            self.commission_pct,
        );

        Some(ClosedTrade {
            trade,
            exit_price,
            closed_at: now,
            pnl,
        })
    }

    /// Drop the open flag and the trade without settling it (exit price unavailable)
    pub fn mark_flat(&mut self, symbol: &Symbol) -> Option<TrackedTrade> {
        let state = self.states.get_mut(symbol)?;
        state.position_open = false;
        state.last_trade.take()
    }
}

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};

use crate::api::Exchange;
use crate::config::BotConfig;
use crate::execution::{
    BracketOutcome, BracketReport, ClosedTrade, ExecutionAction, Executor, ExecutorConfig,
    PositionObservation, TrackedTrade, TradeTracker,
};
use crate::models::{Signal, Symbol, Timeframe, TradeSide};
use crate::risk::passes_floor;
use crate::strategy::signals::{validate_candle_uniformity, SignalConfig, SignalSnapshot};
use crate::strategy::{Strategy, WaveTrendStrategy};
use crate::Result;

/// What happened to one symbol during a cycle
#[derive(Debug, Clone, PartialEq)]
pub enum SymbolOutcome {
    Cooling {
        until: DateTime<Utc>,
    },
    PositionOpen,
    /// Position went flat outside the bot and the trade was settled
    Closed(ClosedTrade),
    /// Position went flat but no exit price or trade record was available
    ClosedUnsettled,
    InsufficientBalance {
        balance: f64,
    },
    Opened {
        timeframe: Timeframe,
        trade: TrackedTrade,
        brackets: BracketReport,
    },
    NoSignal,
    Error(String),
}

#[derive(Debug, Clone, Default)]
pub struct CycleReport {
    pub outcomes: Vec<(Symbol, SymbolOutcome)>,
}

impl CycleReport {
    pub fn outcome(&self, symbol: &Symbol) -> Option<&SymbolOutcome> {
        self.outcomes
            .iter()
            .find(|(s, _)| s == symbol)
            .map(|(_, o)| o)
    }
}

/// Poll loop tying market data, signals, execution and trade tracking together
pub struct TradingBot<E: Exchange> {
    exchange: Arc<E>,
    config: BotConfig,
    strategy: Box<dyn Strategy>,
    executor: Executor<E>,
    tracker: TradeTracker,
}

fn fmt_opt(value: Option<f64>) -> String {
    value.map_or_else(|| "n/a".to_string(), |v| format!("{:.2}", v))
}

fn log_snapshot(symbol: &Symbol, timeframe: &Timeframe, s: &SignalSnapshot) {
    tracing::info!(
        "[{}@{}] price={:.2} wt1={} wt2={} vwap={} (cross_up: {}, cross_down: {}) div bull={} bear={} gold={} rsi={} mfi={} -> {:?}",
        symbol,
        timeframe,
        s.price,
        fmt_opt(s.wt1),
        fmt_opt(s.wt2),
        fmt_opt(s.wt_vwap),
        s.cross_up,
        s.cross_down,
        s.bullish_divergence,
        s.bearish_divergence,
        s.gold,
        fmt_opt(s.rsi),
        fmt_opt(s.mfi),
        s.signal
    );
}

fn log_brackets(symbol: &Symbol, report: &BracketReport) {
    for (label, outcome) in [("SL", &report.stop_loss), ("TP", &report.take_profit)] {
        match outcome {
            BracketOutcome::Placed { order_id, price } => {
                tracing::info!("{} {} set @ {:.2} (order {})", symbol, label, price, order_id)
            }
            BracketOutcome::Skipped { price } => {
                tracing::warn!("{} {} not set: {:.2} fails price floor", symbol, label, price)
            }
            BracketOutcome::Failed { price, error } => {
                tracing::error!("{} {} @ {:.2} failed: {}", symbol, label, price, error)
            }
        }
    }
}

impl<E: Exchange> TradingBot<E> {
    pub fn new(exchange: Arc<E>, config: BotConfig) -> Self {
        let strategy = Box::new(WaveTrendStrategy::new(SignalConfig::from_config(&config)));
        let executor = Executor::new(exchange.clone(), ExecutorConfig::from_config(&config));
        let tracker = TradeTracker::new(
            chrono::Duration::minutes(config.runtime.cooldown_minutes),
            config.strategy.commission_pct,
        );

        Self {
            exchange,
            config,
            strategy,
            executor,
            tracker,
        }
    }

    pub fn with_strategy(mut self, strategy: Box<dyn Strategy>) -> Self {
        self.strategy = strategy;
        self
    }

    pub fn config(&self) -> &BotConfig {
        &self.config
    }

    pub fn tracker(&self) -> &TradeTracker {
        &self.tracker
    }

    /// Verify connectivity and balance, set leverage, load market filters
    ///
    /// Fails when `kline_limit` cannot cover the strategy's warm-up.
    pub async fn startup(&mut self) -> Result<f64> {
        let needed = self.strategy.min_candles_required();
        if (self.config.runtime.kline_limit as usize) < needed {
            anyhow::bail!(
                "kline_limit {} is below the {} candles {} needs",
                self.config.runtime.kline_limit,
                needed,
                self.strategy.name()
            );
        }

        let quote = self
            .config
            .symbols
            .first()
            .map(|s| s.quote_asset().to_string())
            .unwrap_or_else(|| "USDT".to_string());
        let balance = self.exchange.fetch_balance(&quote).await?;
        tracing::info!("✅ Connection verified! Balance: {:.2} {}", balance, quote);

        for symbol in &self.config.symbols {
            self.exchange.market_info(symbol).await?;
            if let Err(e) = self
                .exchange
                .set_leverage(symbol, self.config.strategy.leverage)
                .await
            {
                tracing::warn!("Failed to set leverage for {}: {}", symbol, e);
            }
        }

        tracing::info!(
            "Strategy {} on {} symbol(s) x {} timeframe(s), needs {} candles",
            self.strategy.name(),
            self.config.symbols.len(),
            self.config.timeframes.len(),
            self.strategy.min_candles_required()
        );
        Ok(balance)
    }

    /// One pass over every configured symbol
    pub async fn run_cycle(&mut self, now: DateTime<Utc>) -> CycleReport {
        let mut report = CycleReport::default();

        for symbol in self.config.symbols.clone() {
            let outcome = match self.process_symbol(&symbol, now).await {
                Ok(outcome) => outcome,
                Err(e) => {
                    tracing::error!("Error processing {}: {:#}", symbol, e);
                    SymbolOutcome::Error(e.to_string())
                }
            };
            report.outcomes.push((symbol, outcome));
        }

        report
    }

    /// Run cycles every poll interval until `shutdown` resolves
    pub async fn run<F>(&mut self, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()>,
    {
        let mut ticker =
            tokio::time::interval(Duration::from_secs(self.config.runtime.poll_interval_secs));
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        tokio::pin!(shutdown);

        loop {
            tokio::select! {
                _ = &mut shutdown => {
                    tracing::info!("⚠️  Shutdown requested, stopping trading loop");
                    break;
                }
                _ = ticker.tick() => {
                    tracing::debug!("Cycle at {}", Utc::now().format("%H:%M:%S"));
                    self.run_cycle(Utc::now()).await;
                }
            }
        }

        Ok(())
    }

    async fn process_symbol(&mut self, symbol: &Symbol, now: DateTime<Utc>) -> Result<SymbolOutcome> {
        if self.tracker.is_cooling(symbol, now) {
            let until = self.tracker.cooling_until(symbol).unwrap_or(now);
            tracing::info!("{}: Cooling down until {}. Skipping.", symbol, until);
            return Ok(SymbolOutcome::Cooling { until });
        }

        let amount = self.exchange.position_amount(symbol).await?;
        match self.tracker.observe_position(symbol, amount) {
            PositionObservation::Open => {
                tracing::debug!("{}: position open ({})", symbol, amount);
                return Ok(SymbolOutcome::PositionOpen);
            }
            PositionObservation::ClosedExternally => return Ok(self.settle_closed(symbol, now).await),
            PositionObservation::Flat => {}
        }

        let balance = self.exchange.fetch_balance(symbol.quote_asset()).await?;
        if balance < self.config.strategy.fixed_size_usd {
            tracing::error!(
                "Insufficient balance: {:.2} {} for {}",
                balance,
                symbol.quote_asset(),
                symbol
            );
            return Ok(SymbolOutcome::InsufficientBalance { balance });
        }

        for timeframe in self.config.timeframes.clone() {
            match self.scan_timeframe(symbol, &timeframe, now).await {
                Ok(Some(outcome)) => return Ok(outcome),
                Ok(None) => {}
                Err(e) => tracing::error!("Error on {} {}: {:#}", symbol, timeframe, e),
            }
        }

        Ok(SymbolOutcome::NoSignal)
    }

    async fn settle_closed(&mut self, symbol: &Symbol, now: DateTime<Utc>) -> SymbolOutcome {
        let exit_price = match self
            .exchange
            .fetch_klines(symbol, &Timeframe::one_minute(), 1)
            .await
        {
            Ok(candles) => candles.last().map(|c| c.close),
            Err(e) => {
                tracing::error!("Failed to fetch exit price for {}: {}", symbol, e);
                None
            }
        };

        let Some(exit_price) = exit_price else {
            tracing::error!("No exit price for closed position {}", symbol);
            self.tracker.mark_flat(symbol);
            return SymbolOutcome::ClosedUnsettled;
        };

        match self.tracker.mark_closed(symbol, exit_price, now) {
            Some(closed) => {
                tracing::info!(
                    "{} Trade closed: side={}, entry={}, exit={}, qty={}, PnL_net={:.2} USDT ({:.2}%), Commission={:.2}",
                    symbol,
                    closed.trade.side,
                    closed.trade.entry_price,
                    closed.exit_price,
                    closed.trade.quantity,
                    closed.pnl.net,
                    closed.pnl.net_pct,
                    closed.pnl.commission
                );
                if let Some(until) = self.tracker.cooling_until(symbol) {
                    tracing::info!("{}: Position closed. Cooling down until {}.", symbol, until);
                }
                SymbolOutcome::Closed(closed)
            }
            None => {
                tracing::error!("No trade info for closed position {}", symbol);
                SymbolOutcome::ClosedUnsettled
            }
        }
    }

    /// Ok(Some) ends the scan for this symbol
    async fn scan_timeframe(
        &mut self,
        symbol: &Symbol,
        timeframe: &Timeframe,
        now: DateTime<Utc>,
    ) -> Result<Option<SymbolOutcome>> {
        let candles = self
            .exchange
            .fetch_klines(symbol, timeframe, self.config.runtime.kline_limit)
            .await?;
        if candles.is_empty() {
            tracing::warn!("No data returned for {} on {}", symbol, timeframe);
            return Ok(None);
        }
        if let Err(e) = validate_candle_uniformity(&candles, timeframe.duration()) {
            tracing::warn!("{}@{}: {}", symbol, timeframe, e);
        }

        let snapshot = self.strategy.evaluate(&candles)?;
        log_snapshot(symbol, timeframe, &snapshot);

        // another timeframe or a manual trade may have opened it meanwhile
        let amount = self.exchange.position_amount(symbol).await?;
        if self.tracker.observe_position(symbol, amount) == PositionObservation::Open {
            return Ok(Some(SymbolOutcome::PositionOpen));
        }

        if !passes_floor(snapshot.price, self.config.strategy.min_price) {
            tracing::warn!(
                "Skipping trade for {} on {}: price {} below floor",
                symbol,
                timeframe,
                snapshot.price
            );
            return Ok(None);
        }

        let side = match snapshot.signal {
            Signal::Buy => TradeSide::Buy,
            Signal::Sell => TradeSide::Sell,
            Signal::Hold => {
                tracing::info!("{}@{}: no signal", symbol, timeframe);
                return Ok(None);
            }
        };
        let direction = if side == TradeSide::Buy { "Long" } else { "Short" };
        tracing::info!("🔔 {} {} signal detected on {}", symbol, direction, timeframe);

        let decision = self
            .executor
            .open_position(symbol, side, snapshot.price, now)
            .await?;

        match decision.action {
            ExecutionAction::Opened { trade, brackets } => {
                tracing::info!("✅ {}", decision.reason);
                log_brackets(symbol, &brackets);
                self.tracker.mark_opened(trade.clone())?;
                Ok(Some(SymbolOutcome::Opened {
                    timeframe: timeframe.clone(),
                    trade,
                    brackets,
                }))
            }
            ExecutionAction::Skip => {
                tracing::error!("{}", decision.reason);
                Ok(None)
            }
        }
    }
}

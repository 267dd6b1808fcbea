mod common;

use chrono::Duration;
use common::*;
use std::sync::Arc;
use wavebot::api::OrderKind;
use wavebot::execution::BracketOutcome;
use wavebot::models::{Signal, TradeSide};
use wavebot::strategy::{SignalConfig, Strategy, WaveTrendStrategy};
use wavebot::{SymbolOutcome, TradingBot};

fn approx(a: f64, b: f64) -> bool {
    (a - b).abs() < 1e-6
}

fn bot_with(
    exchange: &MockExchange,
    timeframes: &[&str],
    signal: Signal,
    price: f64,
) -> TradingBot<MockExchange> {
    TradingBot::new(Arc::new(exchange.clone()), test_config(timeframes))
        .with_strategy(Box::new(FixedSignal { signal, price }))
}

fn seed_klines(exchange: &MockExchange, timeframe: &str) {
    exchange.with(|s| {
        s.klines
            .insert(timeframe.to_string(), candles(&[50000.0; 100], Duration::minutes(15)));
    });
}

#[tokio::test]
async fn test_buy_signal_opens_long_with_brackets() {
    let exchange = MockExchange::default();
    seed_klines(&exchange, "15m");
    exchange.with(|s| {
        s.open_orders = vec![stale_order(77, "STOP_MARKET"), stale_order(78, "LIMIT")];
    });
    let mut bot = bot_with(&exchange, &["15m"], Signal::Buy, 50000.0);

    let report = bot.run_cycle(t0()).await;

    let Some(SymbolOutcome::Opened {
        timeframe,
        trade,
        brackets,
    }) = report.outcome(&btc())
    else {
        panic!("expected Opened, got {:?}", report.outcome(&btc()));
    };
    assert_eq!(timeframe.as_str(), "15m");
    assert_eq!(trade.side, TradeSide::Buy);
    assert_eq!(trade.quantity, 0.01);
    assert_eq!(trade.entry_price, 50000.0);
    assert_eq!(brackets.cancelled, 1);
    assert!(brackets.stop_loss.is_placed());
    assert!(brackets.take_profit.is_placed());

    let placed = exchange.placed();
    assert_eq!(placed.len(), 3);
    assert_eq!(placed[0].kind, OrderKind::Market);
    assert_eq!(placed[0].side, TradeSide::Buy);
    assert!(!placed[0].reduce_only);

    assert_eq!(placed[1].kind, OrderKind::StopMarket);
    assert_eq!(placed[1].side, TradeSide::Sell);
    assert!(placed[1].reduce_only);
    assert!(approx(placed[1].stop_price.unwrap(), 49875.0));

    assert_eq!(placed[2].kind, OrderKind::TakeProfitMarket);
    assert!(approx(placed[2].stop_price.unwrap(), 50350.0));

    // only brackets are cancelled, and only before the new stop goes in
    assert_eq!(exchange.state.lock().unwrap().cancelled, vec![77]);
    let calls = exchange.calls();
    let cancel_at = calls.iter().position(|c| c == "cancel:77").unwrap();
    let sl_at = calls.iter().position(|c| c == "order:STOP_MARKET").unwrap();
    let tp_at = calls.iter().position(|c| c == "order:TAKE_PROFIT_MARKET").unwrap();
    assert!(cancel_at < sl_at && sl_at < tp_at);
    assert_eq!(calls.iter().filter(|c| c.starts_with("cancel:")).count(), 1);

    assert!(bot.tracker().is_open(&btc()));
    assert!(bot.tracker().last_trade(&btc()).is_some());
}

#[tokio::test]
async fn test_sell_signal_opens_short() {
    let exchange = MockExchange::default();
    seed_klines(&exchange, "15m");
    let mut bot = bot_with(&exchange, &["15m"], Signal::Sell, 50000.0);

    bot.run_cycle(t0()).await;

    let placed = exchange.placed();
    assert_eq!(placed[0].side, TradeSide::Sell);
    assert_eq!(placed[1].kind, OrderKind::StopMarket);
    assert_eq!(placed[1].side, TradeSide::Buy);
    assert!(approx(placed[1].stop_price.unwrap(), 50125.0));
    assert!(approx(placed[2].stop_price.unwrap(), 49650.0));
}

#[tokio::test]
async fn test_fill_price_used_for_brackets() {
    let exchange = MockExchange::default();
    seed_klines(&exchange, "15m");
    exchange.with(|s| s.fill_price = Some(50120.0));
    let mut bot = bot_with(&exchange, &["15m"], Signal::Buy, 50000.0);

    bot.run_cycle(t0()).await;

    let trade = bot.tracker().last_trade(&btc()).unwrap();
    assert_eq!(trade.entry_price, 50120.0);
    // 50120 * (1 - 0.025 / 10)
    assert!(approx(exchange.placed()[1].stop_price.unwrap(), 49994.7));
}

#[tokio::test]
async fn test_external_close_settles_pnl_and_cools_down() {
    let exchange = MockExchange::default();
    seed_klines(&exchange, "15m");
    let mut bot = bot_with(&exchange, &["15m"], Signal::Buy, 50000.0);

    bot.run_cycle(t0()).await;
    assert!(bot.tracker().is_open(&btc()));

    // still open on the next cycle
    let report = bot.run_cycle(t0() + Duration::minutes(1)).await;
    assert_eq!(report.outcome(&btc()), Some(&SymbolOutcome::PositionOpen));

    // TP hit on the exchange
    exchange.with(|s| {
        s.position = 0.0;
        s.klines
            .insert("1m".to_string(), candles(&[50900.0, 51000.0], Duration::minutes(1)));
    });
    let closed_at = t0() + Duration::minutes(2);
    let report = bot.run_cycle(closed_at).await;

    let Some(SymbolOutcome::Closed(closed)) = report.outcome(&btc()) else {
        panic!("expected Closed, got {:?}", report.outcome(&btc()));
    };
    assert_eq!(closed.exit_price, 51000.0);
    assert!(approx(closed.pnl.gross, 10.0));
    assert!(approx(closed.pnl.commission, 0.404));
    assert!(approx(closed.pnl.net, 9.596));
    assert!(!bot.tracker().is_open(&btc()));

    let calls_before = exchange.calls().len();
    let report = bot.run_cycle(closed_at + Duration::minutes(29)).await;
    assert!(matches!(
        report.outcome(&btc()),
        Some(SymbolOutcome::Cooling { .. })
    ));
    // cooling symbols are not even polled
    assert_eq!(exchange.calls().len(), calls_before);

    let report = bot.run_cycle(closed_at + Duration::minutes(30)).await;
    assert!(matches!(
        report.outcome(&btc()),
        Some(SymbolOutcome::Opened { .. })
    ));
}

#[tokio::test]
async fn test_close_without_exit_price_is_unsettled() {
    let exchange = MockExchange::default();
    seed_klines(&exchange, "15m");
    let mut bot = bot_with(&exchange, &["15m"], Signal::Buy, 50000.0);

    bot.run_cycle(t0()).await;
    exchange.with(|s| s.position = 0.0); // no 1m klines seeded

    let report = bot.run_cycle(t0() + Duration::minutes(1)).await;
    assert_eq!(report.outcome(&btc()), Some(&SymbolOutcome::ClosedUnsettled));
    assert!(!bot.tracker().is_cooling(&btc(), t0() + Duration::minutes(2)));
    assert!(bot.tracker().last_trade(&btc()).is_none());
}

#[tokio::test]
async fn test_insufficient_balance_skips() {
    let exchange = MockExchange::default();
    seed_klines(&exchange, "15m");
    exchange.with(|s| s.balance = 10.0);
    let mut bot = bot_with(&exchange, &["15m"], Signal::Buy, 50000.0);

    let report = bot.run_cycle(t0()).await;

    assert_eq!(
        report.outcome(&btc()),
        Some(&SymbolOutcome::InsufficientBalance { balance: 10.0 })
    );
    assert!(exchange.placed().is_empty());
    assert!(!exchange.calls().iter().any(|c| c.starts_with("klines")));
}

#[tokio::test]
async fn test_price_floor_blocks_entry() {
    let exchange = MockExchange::default();
    seed_klines(&exchange, "15m");
    let mut config = test_config(&["15m"]);
    config.strategy.min_price = Some(60000.0);
    let mut bot = TradingBot::new(Arc::new(exchange.clone()), config).with_strategy(Box::new(
        FixedSignal {
            signal: Signal::Buy,
            price: 50000.0,
        },
    ));

    let report = bot.run_cycle(t0()).await;

    assert_eq!(report.outcome(&btc()), Some(&SymbolOutcome::NoSignal));
    assert!(exchange.placed().is_empty());
}

#[tokio::test]
async fn test_bracket_below_floor_is_skipped() {
    let exchange = MockExchange::default();
    seed_klines(&exchange, "15m");
    let mut config = test_config(&["15m"]);
    // entry passes, the long stop at 49875 does not
    config.strategy.min_price = Some(49900.0);
    let mut bot = TradingBot::new(Arc::new(exchange.clone()), config).with_strategy(Box::new(
        FixedSignal {
            signal: Signal::Buy,
            price: 50000.0,
        },
    ));

    let report = bot.run_cycle(t0()).await;

    let Some(SymbolOutcome::Opened { brackets, .. }) = report.outcome(&btc()) else {
        panic!("expected Opened");
    };
    assert!(matches!(brackets.stop_loss, BracketOutcome::Skipped { .. }));
    assert!(brackets.take_profit.is_placed());
}

#[tokio::test]
async fn test_existing_position_left_alone() {
    let exchange = MockExchange::default();
    seed_klines(&exchange, "15m");
    exchange.with(|s| s.position = 0.5);
    let mut bot = bot_with(&exchange, &["15m"], Signal::Buy, 50000.0);

    let report = bot.run_cycle(t0()).await;

    assert_eq!(report.outcome(&btc()), Some(&SymbolOutcome::PositionOpen));
    assert!(exchange.placed().is_empty());
    assert!(!exchange.calls().iter().any(|c| c.starts_with("klines")));
}

#[tokio::test]
async fn test_unconfirmed_position_not_tracked() {
    let exchange = MockExchange::default();
    seed_klines(&exchange, "15m");
    exchange.with(|s| s.fill_sets_position = false);
    let mut bot = bot_with(&exchange, &["15m"], Signal::Buy, 50000.0);

    let report = bot.run_cycle(t0()).await;

    assert_eq!(report.outcome(&btc()), Some(&SymbolOutcome::NoSignal));
    assert_eq!(exchange.placed().len(), 1);
    assert!(bot.tracker().last_trade(&btc()).is_none());
}

#[tokio::test]
async fn test_unfilled_market_order_places_no_brackets() {
    let exchange = MockExchange::default();
    seed_klines(&exchange, "15m");
    exchange.with(|s| s.market_status = "NEW".to_string());
    let mut bot = bot_with(&exchange, &["15m"], Signal::Buy, 50000.0);

    bot.run_cycle(t0()).await;

    let placed = exchange.placed();
    assert_eq!(placed.len(), 1);
    assert_eq!(placed[0].kind, OrderKind::Market);
}

#[tokio::test]
async fn test_bracket_retried_after_rejection() {
    let exchange = MockExchange::default();
    seed_klines(&exchange, "15m");
    exchange.with(|s| s.bracket_failures = 1);
    let mut bot = bot_with(&exchange, &["15m"], Signal::Buy, 50000.0);

    let report = bot.run_cycle(t0()).await;

    let Some(SymbolOutcome::Opened { brackets, .. }) = report.outcome(&btc()) else {
        panic!("expected Opened");
    };
    assert!(brackets.stop_loss.is_placed());
    assert!(brackets.take_profit.is_placed());
    let sl_attempts = exchange
        .calls()
        .iter()
        .filter(|c| *c == "order:STOP_MARKET")
        .count();
    assert_eq!(sl_attempts, 2);
}

#[tokio::test]
async fn test_bracket_gives_up_after_attempts() {
    let exchange = MockExchange::default();
    seed_klines(&exchange, "15m");
    exchange.with(|s| s.bracket_failures = 2);
    let mut bot = bot_with(&exchange, &["15m"], Signal::Buy, 50000.0);

    let report = bot.run_cycle(t0()).await;

    let Some(SymbolOutcome::Opened { brackets, .. }) = report.outcome(&btc()) else {
        panic!("expected Opened");
    };
    match &brackets.stop_loss {
        BracketOutcome::Failed { error, .. } => assert!(error.contains("immediately trigger")),
        other => panic!("expected Failed, got {:?}", other),
    }
    // TP still goes in
    assert!(brackets.take_profit.is_placed());
}

#[tokio::test]
async fn test_hold_scans_every_timeframe() {
    let exchange = MockExchange::default();
    seed_klines(&exchange, "15m");
    seed_klines(&exchange, "1h");
    let mut bot = bot_with(&exchange, &["15m", "1h"], Signal::Hold, 50000.0);

    let report = bot.run_cycle(t0()).await;

    assert_eq!(report.outcome(&btc()), Some(&SymbolOutcome::NoSignal));
    let calls = exchange.calls();
    assert!(calls.contains(&"klines:15m".to_string()));
    assert!(calls.contains(&"klines:1h".to_string()));
}

#[tokio::test]
async fn test_timeframe_error_moves_to_next() {
    let exchange = MockExchange::default();
    seed_klines(&exchange, "1h"); // 15m fails
    let mut bot = bot_with(&exchange, &["15m", "1h"], Signal::Buy, 50000.0);

    let report = bot.run_cycle(t0()).await;

    let Some(SymbolOutcome::Opened { timeframe, .. }) = report.outcome(&btc()) else {
        panic!("expected Opened");
    };
    assert_eq!(timeframe.as_str(), "1h");
}

#[tokio::test]
async fn test_signal_stops_timeframe_scan() {
    let exchange = MockExchange::default();
    seed_klines(&exchange, "15m");
    seed_klines(&exchange, "1h");
    let mut bot = bot_with(&exchange, &["15m", "1h"], Signal::Buy, 50000.0);

    bot.run_cycle(t0()).await;

    assert!(!exchange.calls().contains(&"klines:1h".to_string()));
    assert_eq!(
        exchange
            .placed()
            .iter()
            .filter(|o| o.kind == OrderKind::Market)
            .count(),
        1
    );
}

#[tokio::test]
async fn test_startup_sets_leverage_and_checks_markets() {
    let exchange = MockExchange::default();
    let mut bot = bot_with(&exchange, &["15m"], Signal::Hold, 50000.0);

    let balance = bot.startup().await.unwrap();

    assert_eq!(balance, 1000.0);
    assert_eq!(
        exchange.state.lock().unwrap().leverage,
        vec![("BTCUSDT".to_string(), 10)]
    );
}

#[tokio::test]
async fn test_startup_fails_on_unknown_market() {
    let exchange = MockExchange::default();
    let mut config = test_config(&["15m"]);
    config.symbols = vec!["UNKNOWN/USDT".parse().unwrap()];
    let mut bot = TradingBot::new(Arc::new(exchange), config);

    let err = bot.startup().await.unwrap_err();
    assert!(err.to_string().contains("not found"));
}

#[tokio::test]
async fn test_wavetrend_strategy_end_to_end() {
    let closes: Vec<f64> = (0..240)
        .map(|i| 50000.0 + 2500.0 * (i as f64 * std::f64::consts::TAU / 24.0).sin())
        .collect();
    let limit = test_config(&["15m"]).runtime.kline_limit as usize;
    let strategy = WaveTrendStrategy::new(SignalConfig::default());

    // the bar of an oscillating market where a full kline window ends on a buy
    let window = |end: usize| candles(&closes[end.saturating_sub(limit)..end], Duration::minutes(15));
    let end = (40..=closes.len())
        .find(|&end| strategy.generate_signal(&window(end)).unwrap() == Signal::Buy)
        .expect("oscillating market should produce a buy");

    let exchange = MockExchange::default();
    exchange.with(|s| {
        s.klines.insert("15m".to_string(), window(end));
    });
    let mut bot = TradingBot::new(Arc::new(exchange.clone()), test_config(&["15m"]));

    let report = bot.run_cycle(t0()).await;

    let Some(SymbolOutcome::Opened { trade, .. }) = report.outcome(&btc()) else {
        panic!("expected Opened, got {:?}", report.outcome(&btc()));
    };
    assert_eq!(trade.side, TradeSide::Buy);
    assert_eq!(trade.entry_price, closes[end - 1]);
}

#[tokio::test]
async fn test_partial_fill_tracks_executed_quantity() {
    let exchange = MockExchange::default();
    seed_klines(&exchange, "15m");
    exchange.with(|s| s.fill_qty = Some(0.006));
    let mut bot = bot_with(&exchange, &["15m"], Signal::Buy, 50000.0);

    bot.run_cycle(t0()).await;

    let trade = bot.tracker().last_trade(&btc()).unwrap();
    assert_eq!(trade.quantity, 0.006);
    let placed = exchange.placed();
    assert_eq!(placed[0].quantity, 0.01);
    assert_eq!(placed[1].quantity, 0.006);
    assert_eq!(placed[2].quantity, 0.006);
}

#[tokio::test]
async fn test_startup_rejects_short_kline_window() {
    let exchange = MockExchange::default();
    let mut config = test_config(&["15m"]);
    config.runtime.kline_limit = 20;
    let mut bot = TradingBot::new(Arc::new(exchange.clone()), config);

    let err = bot.startup().await.unwrap_err();

    assert!(err.to_string().contains("kline_limit 20"));
    assert!(exchange.calls().is_empty());
}

#[tokio::test]
async fn test_run_cycles_until_shutdown() {
    let exchange = MockExchange::default();
    seed_klines(&exchange, "15m");
    let mut bot = bot_with(&exchange, &["15m"], Signal::Buy, 50000.0);

    let watcher = exchange.clone();
    let shutdown = async move {
        while !watcher.calls().iter().any(|c| c == "order:TAKE_PROFIT_MARKET") {
            tokio::time::sleep(std::time::Duration::from_millis(5)).await;
        }
    };
    let result = tokio::time::timeout(std::time::Duration::from_secs(5), bot.run(shutdown)).await;

    assert!(matches!(result, Ok(Ok(()))));
    assert!(exchange.calls().contains(&"position".to_string()));
    assert!(bot.tracker().is_open(&btc()));
    // the next tick is a poll interval away
    assert_eq!(
        exchange
            .placed()
            .iter()
            .filter(|o| o.kind == OrderKind::Market)
            .count(),
        1
    );
}

use super::{Exchange, ExchangeError, MarketInfo, OpenOrder, OrderKind, OrderRequest, OrderResponse};
use crate::config::Credentials;
use crate::models::{Candle, Symbol, Timeframe};
use anyhow::Context;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use governor::{Quota, RateLimiter};
use hmac::{Hmac, Mac};
use reqwest::{Client, Method};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use sha2::Sha256;
use std::collections::HashMap;
use std::num::NonZeroU32;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use url::{form_urlencoded, Url};

type HmacSha256 = Hmac<Sha256>;

pub const LIVE_BASE_URL: &str = "https://fapi.binance.com";
pub const TESTNET_BASE_URL: &str = "https://testnet.binancefuture.com";

const RATE_LIMIT_RPM: u32 = 1200;
const RECV_WINDOW_MS: u64 = 5000;
const REQUEST_TIMEOUT_SECS: u64 = 30;
const ORDER_PATH: &str = "/fapi/v1/order";
/// "Order does not exist."
const ORDER_NOT_FOUND: i64 = -2013;

// Type alias for the rate limiter to simplify signatures
type BinanceRateLimiter = RateLimiter<
    governor::state::direct::NotKeyed,
    governor::state::InMemoryState,
    governor::clock::DefaultClock,
>;

/// Attempts and fixed delay for transient failures
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            delay: Duration::from_secs(2),
        }
    }
}

/// Binance USD-M futures REST client
///
/// Orders, balances and positions go to the trading base (testnet or
/// live). Klines always come from the live base so signals are computed on
/// real prices even when trading on testnet.
///
/// Cloneable; clones share the rate limiter and the exchangeInfo cache.
#[derive(Clone)]
pub struct BinanceFuturesClient {
    http: Client,
    credentials: Option<Credentials>,
    trade_base: Url,
    market_base: Url,
    retry: RetryPolicy,
    rate_limiter: Arc<BinanceRateLimiter>,
    markets: Arc<RwLock<HashMap<String, MarketInfo>>>,
}

// ============================================================================
// Wire types
// ============================================================================

#[derive(Debug, Deserialize)]
struct ApiErrorBody {
    code: i64,
    msg: String,
}

#[derive(Debug, Deserialize)]
struct ExchangeInfoResponse {
    symbols: Vec<SymbolInfo>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SymbolInfo {
    symbol: String,
    price_precision: u32,
    quantity_precision: u32,
    #[serde(default)]
    filters: Vec<SymbolFilter>,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "filterType")]
enum SymbolFilter {
    #[serde(rename = "PRICE_FILTER", rename_all = "camelCase")]
    Price { tick_size: String },
    #[serde(rename = "LOT_SIZE", rename_all = "camelCase")]
    LotSize { step_size: String, min_qty: String },
    #[serde(other)]
    Other,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct BalanceEntry {
    asset: String,
    balance: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PositionRisk {
    symbol: String,
    position_amt: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct OrderAck {
    order_id: i64,
    status: String,
    #[serde(default)]
    avg_price: Option<String>,
    #[serde(default)]
    executed_qty: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct OpenOrderEntry {
    order_id: i64,
    symbol: String,
    #[serde(rename = "type")]
    order_type: String,
    side: String,
    #[serde(default)]
    stop_price: Option<String>,
}

impl From<OrderAck> for OrderResponse {
    fn from(ack: OrderAck) -> Self {
        Self {
            order_id: ack.order_id,
            status: ack.status,
            avg_price: parse_nonzero(ack.avg_price.as_deref()),
            executed_qty: parse_nonzero(ack.executed_qty.as_deref()).unwrap_or(0.0),
        }
    }
}

fn parse_f64(field: &str, value: &str) -> Result<f64, ExchangeError> {
    value
        .parse()
        .map_err(|_| ExchangeError::Decode(format!("invalid {}: {:?}", field, value)))
}

/// Non-zero numeric string, None for "0" / empty
fn parse_nonzero(value: Option<&str>) -> Option<f64> {
    value
        .and_then(|v| v.parse::<f64>().ok())
        .filter(|v| *v != 0.0)
}

/// `[openTime, open, high, low, close, volume, closeTime, ...]`
fn parse_kline(row: &[serde_json::Value]) -> Option<Candle> {
    if row.len() < 6 {
        return None;
    }
    let field = |i: usize| -> Option<f64> { row[i].as_str()?.parse().ok() };

    Some(Candle {
        open_time: DateTime::<Utc>::from_timestamp_millis(row[0].as_i64()?)?,
        open: field(1)?,
        high: field(2)?,
        low: field(3)?,
        close: field(4)?,
        volume: field(5)?,
    })
}

impl SymbolInfo {
    fn into_market_info(self) -> Result<(String, MarketInfo), ExchangeError> {
        let mut info = MarketInfo {
            price_precision: self.price_precision,
            quantity_precision: self.quantity_precision,
            tick_size: 0.0,
            step_size: 0.0,
            min_quantity: 0.0,
        };

        for filter in &self.filters {
            match filter {
                SymbolFilter::Price { tick_size } => {
                    info.tick_size = parse_f64("tickSize", tick_size)?;
                }
                SymbolFilter::LotSize { step_size, min_qty } => {
                    info.step_size = parse_f64("stepSize", step_size)?;
                    info.min_quantity = parse_f64("minQty", min_qty)?;
                }
                SymbolFilter::Other => {}
            }
        }

        Ok((self.symbol, info))
    }
}

/// HMAC-SHA256 of `payload`, hex encoded
pub fn sign(secret: &str, payload: &str) -> Result<String, ExchangeError> {
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
        .map_err(|e| ExchangeError::MissingCredentials(format!("failed to init signer: {e}")))?;
    mac.update(payload.as_bytes());
    Ok(hex::encode(mac.finalize().into_bytes()))
}

impl BinanceFuturesClient {
    /// Authenticated client; trades on testnet when `credentials.testnet`
    pub fn new(credentials: Credentials) -> anyhow::Result<Self> {
        let trade_base = if credentials.testnet {
            TESTNET_BASE_URL
        } else {
            LIVE_BASE_URL
        };
        Self::build(Some(credentials), trade_base, LIVE_BASE_URL)
    }

    /// Market-data only client; signed endpoints fail with `MissingCredentials`
    pub fn public() -> anyhow::Result<Self> {
        Self::build(None, LIVE_BASE_URL, LIVE_BASE_URL)
    }

    /// Point both bases somewhere else (mock servers, proxies)
    pub fn with_base_urls(mut self, trade_base: &str, market_base: &str) -> anyhow::Result<Self> {
        self.trade_base = Url::parse(trade_base).context("Invalid trading base URL")?;
        self.market_base = Url::parse(market_base).context("Invalid market data base URL")?;
        Ok(self)
    }

    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    fn build(
        credentials: Option<Credentials>,
        trade_base: &str,
        market_base: &str,
    ) -> anyhow::Result<Self> {
        let http = Client::builder()
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .build()
            .context("Failed to build HTTP client")?;

        let quota = Quota::per_minute(NonZeroU32::new(RATE_LIMIT_RPM).unwrap_or(NonZeroU32::MIN));

        Ok(Self {
            http,
            credentials,
            trade_base: Url::parse(trade_base).context("Invalid trading base URL")?,
            market_base: Url::parse(market_base).context("Invalid market data base URL")?,
            retry: RetryPolicy::default(),
            rate_limiter: Arc::new(RateLimiter::direct(quota)),
            markets: Arc::new(RwLock::new(HashMap::new())),
        })
    }

    /// Load exchangeInfo into the cache (first call only)
    pub async fn load_markets(&self) -> Result<(), ExchangeError> {
        if !self.markets.read().await.is_empty() {
            return Ok(());
        }

        let response: ExchangeInfoResponse = self
            .send(Method::GET, &self.trade_base, "/fapi/v1/exchangeInfo", Vec::new(), false)
            .await?;

        let mut markets = HashMap::with_capacity(response.symbols.len());
        for symbol in response.symbols {
            let (name, info) = symbol.into_market_info()?;
            markets.insert(name, info);
        }

        tracing::info!("Loaded {} futures markets", markets.len());
        *self.markets.write().await = markets;
        Ok(())
    }

    fn signed_query(&self, path: &str, params: &[(&str, String)]) -> Result<String, ExchangeError> {
        let credentials = self
            .credentials
            .as_ref()
            .ok_or_else(|| ExchangeError::MissingCredentials(path.to_string()))?;

        let query = form_urlencoded::Serializer::new(String::new())
            .extend_pairs(params.iter().map(|(k, v)| (*k, v.as_str())))
            .append_pair("timestamp", &Utc::now().timestamp_millis().to_string())
            .append_pair("recvWindow", &RECV_WINDOW_MS.to_string())
            .finish();

        let signature = sign(&credentials.api_secret, &query)?;
        Ok(format!("{query}&signature={signature}"))
    }

    fn build_request(
        &self,
        method: &Method,
        base: &Url,
        path: &str,
        params: &[(&str, String)],
        signed: bool,
    ) -> Result<reqwest::RequestBuilder, ExchangeError> {
        let mut url = base.join(path).map_err(|e| ExchangeError::Http {
            status: None,
            message: format!("invalid endpoint {path}: {e}"),
        })?;

        // Signature covers timestamp, so it is rebuilt for every attempt
        let query = if signed {
            self.signed_query(path, params)?
        } else {
            form_urlencoded::Serializer::new(String::new())
                .extend_pairs(params.iter().map(|(k, v)| (*k, v.as_str())))
                .finish()
        };

        let mut builder = if *method == Method::POST {
            self.http
                .post(url)
                .header("Content-Type", "application/x-www-form-urlencoded")
                .body(query)
        } else {
            if !query.is_empty() {
                url.set_query(Some(&query));
            }
            self.http.request(method.clone(), url)
        };

        if let (true, Some(credentials)) = (signed, &self.credentials) {
            builder = builder.header("X-MBX-APIKEY", &credentials.api_key);
        }

        Ok(builder)
    }

    /// Rate-limited request with retry on network errors, 5xx and 429
    ///
    /// Only for reads and idempotent writes; order placement goes through
    /// `submit_order`.
    async fn send<T: DeserializeOwned>(
        &self,
        method: Method,
        base: &Url,
        path: &str,
        params: Vec<(&str, String)>,
        signed: bool,
    ) -> Result<T, ExchangeError> {
        let max_attempts = self.retry.max_attempts.max(1);
        let mut attempt = 1;

        loop {
            match self.execute(&method, base, path, &params, signed).await {
                Err(error) if error.is_retryable() && attempt < max_attempts => {
                    tracing::warn!(
                        "{} {} failed: {}, retrying in {:?} (attempt {}/{})",
                        method,
                        path,
                        error,
                        self.retry.delay,
                        attempt,
                        max_attempts
                    );
                    tokio::time::sleep(self.retry.delay).await;
                    attempt += 1;
                }
                result => return result,
            }
        }
    }

    /// One rate-limited attempt, classified into an `ExchangeError`
    async fn execute<T: DeserializeOwned>(
        &self,
        method: &Method,
        base: &Url,
        path: &str,
        params: &[(&str, String)],
        signed: bool,
    ) -> Result<T, ExchangeError> {
        self.rate_limiter.until_ready().await;

        let request = self.build_request(method, base, path, params, signed)?;
        let response = request.send().await.map_err(|e| ExchangeError::Http {
            status: None,
            message: e.to_string(),
        })?;

        let status = response.status();
        let body = response.text().await.map_err(|e| ExchangeError::Http {
            status: Some(status.as_u16()),
            message: e.to_string(),
        })?;

        if status.is_success() {
            return serde_json::from_str(&body)
                .map_err(|e| ExchangeError::Decode(format!("{path}: {e}")));
        }

        if status.as_u16() == 429 || status.is_server_error() {
            return Err(ExchangeError::Http {
                status: Some(status.as_u16()),
                message: body,
            });
        }

        Err(match serde_json::from_str::<ApiErrorBody>(&body) {
            Ok(api) => ExchangeError::from_api(api.code, api.msg),
            Err(_) => ExchangeError::Http {
                status: Some(status.as_u16()),
                message: body,
            },
        })
    }

    /// POST an order without ever submitting it twice
    ///
    /// A 5xx or timeout leaves the order status unknown, so the order is
    /// looked up by its client id before resubmitting. Resubmits only when
    /// the exchange confirms it does not exist.
    async fn submit_order(
        &self,
        order: &OrderRequest,
        params: Vec<(&str, String)>,
    ) -> Result<OrderAck, ExchangeError> {
        let max_attempts = self.retry.max_attempts.max(1);
        let mut attempt = 1;

        loop {
            let error = match self
                .execute::<OrderAck>(&Method::POST, &self.trade_base, ORDER_PATH, &params, true)
                .await
            {
                Err(error) if error.is_retryable() => error,
                result => return result,
            };

            match self.query_order(&order.symbol, &order.client_order_id).await {
                Ok(ack) => {
                    tracing::warn!(
                        "{} {} for {} reported {} but was accepted as order {}",
                        order.kind,
                        order.client_order_id,
                        order.symbol,
                        error,
                        ack.order_id
                    );
                    return Ok(ack);
                }
                Err(ExchangeError::Api { code, .. })
                    if code == ORDER_NOT_FOUND && attempt < max_attempts =>
                {
                    tracing::warn!(
                        "{} for {} not placed: {}, resubmitting in {:?} (attempt {}/{})",
                        order.kind,
                        order.symbol,
                        error,
                        self.retry.delay,
                        attempt,
                        max_attempts
                    );
                    tokio::time::sleep(self.retry.delay).await;
                    attempt += 1;
                }
                Err(ExchangeError::Api { code, .. }) if code == ORDER_NOT_FOUND => {
                    return Err(error);
                }
                Err(lookup) => {
                    tracing::error!(
                        "Status of {} {} for {} unknown after {}: lookup failed: {}",
                        order.kind,
                        order.client_order_id,
                        order.symbol,
                        error,
                        lookup
                    );
                    return Err(error);
                }
            }
        }
    }

    async fn query_order(
        &self,
        symbol: &Symbol,
        client_order_id: &str,
    ) -> Result<OrderAck, ExchangeError> {
        let params = vec![
            ("symbol", symbol.exchange_symbol()),
            ("origClientOrderId", client_order_id.to_string()),
        ];
        self.send(Method::GET, &self.trade_base, ORDER_PATH, params, true)
            .await
    }
}

#[async_trait]
impl Exchange for BinanceFuturesClient {
    async fn fetch_klines(
        &self,
        symbol: &Symbol,
        timeframe: &Timeframe,
        limit: u32,
    ) -> Result<Vec<Candle>, ExchangeError> {
        let params = vec![
            ("symbol", symbol.exchange_symbol()),
            ("interval", timeframe.as_str().to_string()),
            ("limit", limit.to_string()),
        ];
        let rows: Vec<Vec<serde_json::Value>> = self
            .send(Method::GET, &self.market_base, "/fapi/v1/klines", params, false)
            .await?;

        rows.iter()
            .enumerate()
            .map(|(i, row)| {
                parse_kline(row).ok_or_else(|| {
                    ExchangeError::Decode(format!("malformed kline at index {i} for {symbol}"))
                })
            })
            .collect()
    }

    async fn market_info(&self, symbol: &Symbol) -> Result<MarketInfo, ExchangeError> {
        self.load_markets().await?;
        self.markets
            .read()
            .await
            .get(&symbol.exchange_symbol())
            .cloned()
            .ok_or_else(|| ExchangeError::MarketNotFound(symbol.to_string()))
    }

    async fn fetch_balance(&self, asset: &str) -> Result<f64, ExchangeError> {
        let balances: Vec<BalanceEntry> = self
            .send(Method::GET, &self.trade_base, "/fapi/v2/balance", Vec::new(), true)
            .await?;

        match balances.iter().find(|b| b.asset == asset) {
            Some(entry) => parse_f64("balance", &entry.balance),
            None => Ok(0.0),
        }
    }

    async fn position_amount(&self, symbol: &Symbol) -> Result<f64, ExchangeError> {
        let exchange_symbol = symbol.exchange_symbol();
        let positions: Vec<PositionRisk> = self
            .send(
                Method::GET,
                &self.trade_base,
                "/fapi/v2/positionRisk",
                vec![("symbol", exchange_symbol.clone())],
                true,
            )
            .await?;

        // hedge mode reports LONG and SHORT legs separately
        positions
            .iter()
            .filter(|p| p.symbol == exchange_symbol)
            .try_fold(0.0, |total, p| -> Result<f64, ExchangeError> {
                Ok(total + parse_f64("positionAmt", &p.position_amt)?.abs())
            })
    }

    async fn set_leverage(&self, symbol: &Symbol, leverage: u32) -> Result<(), ExchangeError> {
        let params = vec![
            ("symbol", symbol.exchange_symbol()),
            ("leverage", leverage.to_string()),
        ];
        let _: serde_json::Value = self
            .send(Method::POST, &self.trade_base, "/fapi/v1/leverage", params, true)
            .await?;

        tracing::info!("Leverage set to {}x for {}", leverage, symbol);
        Ok(())
    }

    async fn place_order(&self, order: &OrderRequest) -> Result<OrderResponse, ExchangeError> {
        if order.quantity <= 0.0 {
            return Err(ExchangeError::InvalidOrder {
                code: 0,
                msg: format!("order quantity must be positive, got {}", order.quantity),
            });
        }

        let market = self.market_info(&order.symbol).await?;
        let mut params = vec![
            ("symbol", order.symbol.exchange_symbol()),
            ("side", order.side.as_str().to_string()),
            ("type", order.kind.as_str().to_string()),
            ("newClientOrderId", order.client_order_id.clone()),
            (
                "quantity",
                format!("{:.*}", market.quantity_precision as usize, order.quantity),
            ),
        ];

        match order.kind {
            OrderKind::Market => {
                params.push(("newOrderRespType", "RESULT".to_string()));
            }
            OrderKind::StopMarket | OrderKind::TakeProfitMarket => {
                let stop_price = order.stop_price.ok_or_else(|| ExchangeError::InvalidOrder {
                    code: 0,
                    msg: format!("{} requires a stop price", order.kind),
                })?;
                params.push((
                    "stopPrice",
                    format!("{:.*}", market.price_precision as usize, stop_price),
                ));
                params.push(("timeInForce", "GTC".to_string()));
            }
        }
        if order.reduce_only {
            params.push(("reduceOnly", "true".to_string()));
        }

        let ack = self.submit_order(order, params).await?;
        Ok(ack.into())
    }

    async fn open_orders(&self, symbol: &Symbol) -> Result<Vec<OpenOrder>, ExchangeError> {
        let entries: Vec<OpenOrderEntry> = self
            .send(
                Method::GET,
                &self.trade_base,
                "/fapi/v1/openOrders",
                vec![("symbol", symbol.exchange_symbol())],
                true,
            )
            .await?;

        Ok(entries
            .into_iter()
            .map(|e| OpenOrder {
                order_id: e.order_id,
                symbol: e.symbol,
                order_type: e.order_type,
                side: e.side,
                stop_price: parse_nonzero(e.stop_price.as_deref()),
            })
            .collect())
    }

    async fn cancel_order(&self, symbol: &Symbol, order_id: i64) -> Result<(), ExchangeError> {
        let params = vec![
            ("symbol", symbol.exchange_symbol()),
            ("orderId", order_id.to_string()),
        ];
        let _: serde_json::Value = self
            .send(Method::DELETE, &self.trade_base, ORDER_PATH, params, true)
            .await?;
        Ok(())
    }
}

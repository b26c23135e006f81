use std::num::NonZeroU32;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use governor::{Quota, RateLimiter};
use reqwest::{Client, StatusCode};
use rust_decimal::prelude::*;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Value};
use uuid::Uuid;

use super::gateway::{GatewayError, OrderGateway};
use super::signer::Credentials;
use crate::models::{Candle, OrderSide, TpSlOrder};

// Mix (futures) API v1
pub const BITGET_REST_API: &str = "https://api.bitget.com";
const SUCCESS_CODE: &str = "00000";
const SET_LEVERAGE_PATH: &str = "/api/mix/v1/account/setLeverage";
const PLACE_ORDER_PATH: &str = "/api/mix/v1/order/placeOrder";
const PLACE_TPSL_PATH: &str = "/api/mix/v1/plan/placeTPSL";
const CANDLES_PATH: &str = "/api/mix/v1/market/candles";
const MAX_ERROR_BODY: usize = 512;

type BitgetRateLimiter = RateLimiter<
    governor::state::direct::NotKeyed,
    governor::state::InMemoryState,
    governor::clock::DefaultClock,
>;

#[derive(Debug, Clone)]
pub struct BitgetConfig {
    pub base_url: String,
    pub credentials: Credentials,
    /// Appended to stream symbols to form REST symbols (`BTCUSDT` -> `BTCUSDT_UMCBL`)
    pub product_suffix: String,
    pub margin_coin: String,
    pub size_precision: u32,
    pub price_precision: u32,
    pub requests_per_second: u32,
    pub timeout: Duration,
}

impl Default for BitgetConfig {
    fn default() -> Self {
        Self {
            base_url: BITGET_REST_API.to_string(),
            credentials: Credentials::default(),
            product_suffix: "_UMCBL".to_string(),
            margin_coin: "USDT".to_string(),
            size_precision: 3,
            price_precision: 1,
            requests_per_second: 10,
            timeout: Duration::from_secs(10),
        }
    }
}

#[derive(Debug, Deserialize)]
struct ApiEnvelope {
    code: Value,
    #[serde(default)]
    msg: Option<String>,
    #[serde(default)]
    data: Option<Value>,
}

impl ApiEnvelope {
    fn code(&self) -> String {
        match &self.code {
            Value::String(s) => s.clone(),
            other => other.to_string(),
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PlacedOrder {
    order_id: String,
    #[serde(default)]
    client_oid: Option<String>,
}

/// Signed REST client for the Bitget mix API
///
/// Cloneable; clones share the HTTP pool and the rate limiter.
#[derive(Clone)]
pub struct BitgetClient {
    client: Client,
    config: BitgetConfig,
    rate_limiter: Arc<BitgetRateLimiter>,
}

impl BitgetClient {
    pub fn new(config: BitgetConfig) -> Result<Self, GatewayError> {
        let client = Client::builder().timeout(config.timeout).build()?;

        let per_second = NonZeroU32::new(config.requests_per_second).ok_or_else(|| {
            GatewayError::InvalidRequest("requests_per_second must be positive".to_string())
        })?;
        let rate_limiter = Arc::new(RateLimiter::direct(Quota::per_second(per_second)));

        Ok(Self {
            client,
            config,
            rate_limiter,
        })
    }

    /// REST symbol for a stream instrument id
    pub fn rest_symbol(&self, symbol: &str) -> String {
        if symbol.ends_with(&self.config.product_suffix) {
            symbol.to_string()
        } else {
            format!("{}{}", symbol, self.config.product_suffix)
        }
    }

    /// Fetch up to `limit` closed candles, oldest first
    pub async fn fetch_candles(
        &self,
        symbol: &str,
        granularity: &str,
        limit: usize,
    ) -> Result<Vec<Candle>, GatewayError> {
        let step = timeframe_millis(granularity).ok_or_else(|| {
            GatewayError::InvalidRequest(format!("unsupported granularity {}", granularity))
        })?;
        let end = Utc::now().timestamp_millis();
        let start = end - step * limit as i64;
        let query = format!(
            "symbol={}&granularity={}&startTime={}&endTime={}&limit={}",
            self.rest_symbol(symbol),
            granularity,
            start,
            end,
            limit
        );

        self.rate_limiter.until_ready().await;
        let response = self
            .client
            .get(format!("{}{}?{}", self.base_url(), CANDLES_PATH, query))
            .header("locale", "en-US")
            .send()
            .await?;
        let status = response.status();
        let body = response.text().await?;

        // The v1 market endpoints answer with a bare array; newer ones wrap it
        let rows: Vec<Vec<Value>> = match serde_json::from_str::<Value>(&body) {
            Ok(value @ Value::Array(_)) if status.is_success() => serde_json::from_value(value)?,
            _ => parse_envelope(status, &body)?,
        };

        let mut candles: Vec<Candle> = rows
            .iter()
            .filter_map(|row| {
                let candle = candle_from_row(row);
                if candle.is_none() {
                    tracing::warn!(?row, "Skipping malformed candle row");
                }
                candle
            })
            .collect();
        candles.sort_by_key(|c| c.timestamp);

        tracing::debug!(symbol, granularity, count = candles.len(), "Fetched candles");
        Ok(candles)
    }

    fn base_url(&self) -> &str {
        self.config.base_url.trim_end_matches('/')
    }

    async fn post_signed<T: DeserializeOwned>(
        &self,
        path: &str,
        body: &Value,
    ) -> Result<T, GatewayError> {
        let body = serde_json::to_string(body)?;
        let credentials = &self.config.credentials;
        let timestamp = Utc::now().timestamp_millis().to_string();
        let signature = credentials.sign_request(&timestamp, "POST", path, None, &body);

        self.rate_limiter.until_ready().await;
        tracing::debug!(path, body = %body, "POST");

        let response = self
            .client
            .post(format!("{}{}", self.base_url(), path))
            .header("ACCESS-KEY", &credentials.api_key)
            .header("ACCESS-SIGN", signature)
            .header("ACCESS-TIMESTAMP", &timestamp)
            .header("ACCESS-PASSPHRASE", &credentials.passphrase)
            .header("Content-Type", "application/json")
            .header("locale", "en-US")
            .body(body)
            .send()
            .await?;

        let status = response.status();
        let text = response.text().await?;
        parse_envelope(status, &text)
    }

    async fn place_plan(
        &self,
        symbol: &str,
        plan_type: &str,
        trigger_price: f64,
        hold_side: &str,
    ) -> Result<(), GatewayError> {
        let body = json!({
            "symbol": self.rest_symbol(symbol),
            "marginCoin": self.config.margin_coin,
            "planType": plan_type,
            "triggerPrice": format_price(trigger_price, self.config.price_precision)?,
            "holdSide": hold_side,
        });
        let _: Value = self.post_signed(PLACE_TPSL_PATH, &body).await?;
        Ok(())
    }
}

impl OrderGateway for BitgetClient {
    async fn set_leverage(&self, symbol: &str, leverage: u32) -> Result<(), GatewayError> {
        let body = json!({
            "symbol": self.rest_symbol(symbol),
            "marginCoin": self.config.margin_coin,
            "leverage": leverage.to_string(),
        });
        let _: Value = self.post_signed(SET_LEVERAGE_PATH, &body).await?;

        tracing::info!(symbol, leverage, "Leverage set");
        Ok(())
    }

    async fn place_order(
        &self,
        symbol: &str,
        side: OrderSide,
        quantity: f64,
    ) -> Result<String, GatewayError> {
        let size = format_quantity(quantity, self.config.size_precision)?;
        let client_oid = Uuid::new_v4().simple().to_string();
        let body = json!({
            "symbol": self.rest_symbol(symbol),
            "marginCoin": self.config.margin_coin,
            "size": size,
            "side": side.as_str(),
            "orderType": "market",
            "clientOid": client_oid,
        });

        let placed: PlacedOrder = self.post_signed(PLACE_ORDER_PATH, &body).await?;
        tracing::info!(
            symbol,
            %side,
            size = %size,
            order_id = %placed.order_id,
            client_oid = placed.client_oid.as_deref().unwrap_or(&client_oid),
            "Order placed"
        );
        Ok(placed.order_id)
    }

    async fn place_tpsl(&self, symbol: &str, order: &TpSlOrder) -> Result<(), GatewayError> {
        let hold_side = order.hold_side.as_hold_side().ok_or_else(|| {
            GatewayError::InvalidRequest("TP/SL needs a long or short hold side".to_string())
        })?;

        self.place_plan(symbol, "profit_plan", order.take_profit, hold_side)
            .await?;
        self.place_plan(symbol, "loss_plan", order.stop_loss, hold_side)
            .await?;

        tracing::info!(
            symbol,
            hold_side,
            take_profit = order.take_profit,
            stop_loss = order.stop_loss,
            "TP/SL placed"
        );
        Ok(())
    }
}

fn parse_envelope<T: DeserializeOwned>(status: StatusCode, body: &str) -> Result<T, GatewayError> {
    match serde_json::from_str::<ApiEnvelope>(body) {
        Ok(envelope) if envelope.code() != SUCCESS_CODE => Err(GatewayError::Rejected {
            code: envelope.code(),
            msg: envelope.msg.unwrap_or_default(),
        }),
        Ok(envelope) if status.is_success() => {
            Ok(serde_json::from_value(envelope.data.unwrap_or(Value::Null))?)
        }
        Err(e) if status.is_success() => Err(GatewayError::Decode(e)),
        _ => Err(GatewayError::Status {
            status: status.as_u16(),
            body: body.chars().take(MAX_ERROR_BODY).collect(),
        }),
    }
}

fn candle_from_row(row: &[Value]) -> Option<Candle> {
    let field = |i: usize| row.get(i).and_then(value_as_f64);
    let millis = field(0)? as i64;
    Some(Candle {
        timestamp: DateTime::<Utc>::from_timestamp_millis(millis)?,
        open: field(1)?,
        high: field(2)?,
        low: field(3)?,
        close: field(4)?,
        volume: field(5).unwrap_or(0.0),
    })
}

/// Numbers arrive either as JSON numbers or as decimal strings
pub fn value_as_f64(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    }
    .filter(|v| v.is_finite())
}

/// Candle granularity (`1m`, `15m`, `1H`, `4H`, `1D`, `1W`) in milliseconds
pub fn timeframe_millis(timeframe: &str) -> Option<i64> {
    let unit = timeframe.chars().last()?;
    let count: i64 = timeframe[..timeframe.len() - unit.len_utf8()].parse().ok()?;
    if count <= 0 {
        return None;
    }
    let unit_millis = match unit {
        'm' => 60_000,
        'H' | 'h' => 3_600_000,
        'D' | 'd' => 86_400_000,
        'W' | 'w' => 604_800_000,
        _ => return None,
    };
    Some(count * unit_millis)
}

fn format_quantity(quantity: f64, places: u32) -> Result<String, GatewayError> {
    let size = to_decimal(quantity)?.round_dp_with_strategy(places, RoundingStrategy::ToZero);
    if size <= Decimal::ZERO {
        return Err(GatewayError::InvalidRequest(format!(
            "quantity {} rounds to zero at {} decimals",
            quantity, places
        )));
    }
    Ok(size.normalize().to_string())
}

fn format_price(price: f64, places: u32) -> Result<String, GatewayError> {
    let price = to_decimal(price)?
        .round_dp_with_strategy(places, RoundingStrategy::MidpointAwayFromZero);
    if price <= Decimal::ZERO {
        return Err(GatewayError::InvalidRequest(format!(
            "trigger price must be positive, got {}",
            price
        )));
    }
    Ok(price.normalize().to_string())
}

fn to_decimal(value: f64) -> Result<Decimal, GatewayError> {
    Decimal::from_f64(value)
        .ok_or_else(|| GatewayError::InvalidRequest(format!("{} is not representable", value)))
}

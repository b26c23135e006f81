//! Runtime settings
//!
//! Built-in defaults overlaid with `BOT_*` environment variables (a `.env`
//! file is loaded into the environment first by the binary).

use std::collections::HashMap;
use std::time::Duration;

use ::config::{Config, Environment};
use serde::Deserialize;
use thiserror::Error;

use crate::api::bitget::{timeframe_millis, BITGET_REST_API};
use crate::api::{BitgetConfig, Credentials};
use crate::stream::{ConnectionPolicy, BITGET_WS_URL};
use crate::strategy::{CrossoverParams, StrategyConfig};

pub const ENV_PREFIX: &str = "BOT";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to load configuration: {0}")]
    Load(#[from] ::config::ConfigError),

    #[error("invalid configuration: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    pub symbol: String,
    pub leverage: u32,
    pub timeframe: String,
    pub short_period: usize,
    pub long_period: usize,
    pub order_quantity: f64,
    pub tp_pct: f64,
    pub sl_pct: f64,
    pub min_change_pct: f64,
    pub taker_fee: f64,

    #[serde(default)]
    pub api_key: String,
    #[serde(default)]
    pub api_secret: String,
    #[serde(default)]
    pub passphrase: String,

    pub rest_url: String,
    pub ws_public_url: String,
    pub ws_private_url: String,
    pub product_suffix: String,
    pub margin_coin: String,
    pub size_precision: u32,
    pub price_precision: u32,
    pub requests_per_second: u32,

    pub tick_interval_secs: u64,
    pub keepalive_interval_secs: u64,
    pub reconnect_delay_secs: u64,
    pub connect_timeout_secs: u64,
    pub request_timeout_secs: u64,

    pub dry_run: bool,
}

impl Settings {
    /// Defaults overlaid with the process environment; not validated
    pub fn load() -> Result<Self, ConfigError> {
        Self::from_env(Environment::with_prefix(ENV_PREFIX))
    }

    /// Defaults overlaid with an explicit variable map (`BOT_*` keys)
    pub fn from_map(vars: HashMap<String, String>) -> Result<Self, ConfigError> {
        Self::from_env(Environment::with_prefix(ENV_PREFIX).source(Some(vars)))
    }

    fn from_env(env: Environment) -> Result<Self, ConfigError> {
        let settings = Config::builder()
            .set_default("symbol", "BTCUSDT")?
            .set_default("leverage", 10_i64)?
            .set_default("timeframe", "1m")?
            .set_default("short_period", 50_i64)?
            .set_default("long_period", 200_i64)?
            .set_default("order_quantity", 0.001_f64)?
            .set_default("tp_pct", 0.02_f64)?
            .set_default("sl_pct", -0.01_f64)?
            .set_default("min_change_pct", 0.002_f64)?
            .set_default("taker_fee", 0.0006_f64)?
            .set_default("rest_url", BITGET_REST_API)?
            .set_default("ws_public_url", BITGET_WS_URL)?
            .set_default("ws_private_url", BITGET_WS_URL)?
            .set_default("product_suffix", "_UMCBL")?
            .set_default("margin_coin", "USDT")?
            .set_default("size_precision", 3_i64)?
            .set_default("price_precision", 1_i64)?
            .set_default("requests_per_second", 10_i64)?
            .set_default("tick_interval_secs", 10_i64)?
            .set_default("keepalive_interval_secs", 30_i64)?
            .set_default("reconnect_delay_secs", 1_i64)?
            .set_default("connect_timeout_secs", 10_i64)?
            .set_default("request_timeout_secs", 10_i64)?
            .set_default("dry_run", false)?
            // Values stay strings so credentials keep their exact text;
            // serde converts the numeric and bool fields.
            .add_source(env.try_parsing(false))
            .build()?;

        Ok(settings.try_deserialize()?)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let invalid = |msg: String| Err(ConfigError::Invalid(msg));

        if self.symbol.trim().is_empty() {
            return invalid("symbol must not be empty".to_string());
        }
        if self.short_period == 0 || self.long_period == 0 {
            return invalid("moving average periods must be positive".to_string());
        }
        if self.short_period >= self.long_period {
            return invalid(format!(
                "short_period ({}) must be less than long_period ({})",
                self.short_period, self.long_period
            ));
        }
        if self.leverage == 0 {
            return invalid("leverage must be positive".to_string());
        }
        if !(self.order_quantity.is_finite() && self.order_quantity > 0.0) {
            return invalid(format!("order_quantity must be positive, got {}", self.order_quantity));
        }
        if !(self.tp_pct.is_finite() && self.tp_pct > 0.0) {
            return invalid(format!("tp_pct must be positive, got {}", self.tp_pct));
        }
        if !(self.sl_pct.is_finite() && self.sl_pct < 0.0) {
            return invalid(format!("sl_pct must be negative, got {}", self.sl_pct));
        }
        if !(self.min_change_pct.is_finite() && self.min_change_pct >= 0.0) {
            return invalid(format!("min_change_pct must be non-negative, got {}", self.min_change_pct));
        }
        if !(self.taker_fee.is_finite() && self.taker_fee >= 0.0) {
            return invalid(format!("taker_fee must be non-negative, got {}", self.taker_fee));
        }
        if timeframe_millis(&self.timeframe).is_none() {
            return invalid(format!("unsupported timeframe {}", self.timeframe));
        }
        if self.tick_interval_secs == 0 || self.keepalive_interval_secs == 0 {
            return invalid("tick and keep-alive intervals must be positive".to_string());
        }
        if self.requests_per_second == 0 {
            return invalid("requests_per_second must be positive".to_string());
        }
        if !self.dry_run && !self.credentials().is_complete() {
            return invalid(
                "BOT_API_KEY, BOT_API_SECRET and BOT_PASSPHRASE are required unless dry-run is enabled"
                    .to_string(),
            );
        }

        Ok(())
    }

    pub fn credentials(&self) -> Credentials {
        Credentials::new(&self.api_key, &self.api_secret, &self.passphrase)
    }

    /// Dry-run tracks its paper position locally, so the private stream
    /// only runs live
    pub fn position_stream_enabled(&self) -> bool {
        !self.dry_run && self.credentials().is_complete()
    }

    /// REST product id, e.g. `BTCUSDT_UMCBL`
    pub fn rest_symbol(&self) -> String {
        format!("{}{}", self.symbol, self.product_suffix)
    }

    pub fn bitget_config(&self) -> BitgetConfig {
        BitgetConfig {
            base_url: self.rest_url.clone(),
            credentials: self.credentials(),
            product_suffix: self.product_suffix.clone(),
            margin_coin: self.margin_coin.clone(),
            size_precision: self.size_precision,
            price_precision: self.price_precision,
            requests_per_second: self.requests_per_second,
            timeout: Duration::from_secs(self.request_timeout_secs),
        }
    }

    pub fn connection_policy(&self) -> ConnectionPolicy {
        ConnectionPolicy {
            keepalive_interval: Duration::from_secs(self.keepalive_interval_secs),
            reconnect_delay: Duration::from_secs(self.reconnect_delay_secs),
            connect_timeout: Duration::from_secs(self.connect_timeout_secs),
        }
    }

    pub fn strategy_config(&self) -> StrategyConfig {
        StrategyConfig {
            symbol: self.symbol.clone(),
            leverage: self.leverage,
            order_quantity: self.order_quantity,
            take_profit_pct: self.tp_pct,
            stop_loss_pct: self.sl_pct,
            taker_fee: self.taker_fee,
            tick_interval: Duration::from_secs(self.tick_interval_secs),
            crossover: CrossoverParams {
                short_period: self.short_period,
                long_period: self.long_period,
                min_change_pct: self.min_change_pct,
            },
        }
    }
}

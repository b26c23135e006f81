use serde_json::Value;

use super::connection::{Outbox, StreamHandler};
use crate::api::bitget::value_as_f64;
use crate::execution::SharedMarketState;
use crate::models::{ChannelArg, StreamFrame, SubscribeRequest};

/// Public instrument type for USDT-margined perpetuals on the stream API
pub const PUBLIC_INST_TYPE: &str = "mc";

const CLOSE_INDEX: usize = 4;

/// Public stream handler: ticker and candle pushes into the market state
pub struct MarketFeed {
    inst_type: String,
    inst_id: String,
    timeframe: String,
    state: SharedMarketState,
}

impl MarketFeed {
    /// # Arguments
    /// * `inst_id` - Stream symbol, e.g. `BTCUSDT`
    /// * `timeframe` - Candle interval, e.g. `1m`
    pub fn new(inst_id: &str, timeframe: &str, state: SharedMarketState) -> Self {
        Self {
            inst_type: PUBLIC_INST_TYPE.to_string(),
            inst_id: inst_id.to_string(),
            timeframe: timeframe.to_string(),
            state,
        }
    }

    pub fn candle_channel(&self) -> String {
        format!("candle{}", self.timeframe)
    }

    pub fn subscribe_request(&self) -> SubscribeRequest {
        SubscribeRequest::new(vec![
            ChannelArg::new(&self.inst_type, "ticker", &self.inst_id),
            ChannelArg::new(&self.inst_type, &self.candle_channel(), &self.inst_id),
        ])
    }

    fn handle_ticker(&self, data: Option<&Value>) {
        let last = data
            .and_then(first_entry)
            .and_then(|entry| entry.get("last"))
            .and_then(value_as_f64);

        match last {
            Some(price) => {
                tracing::trace!(price, "Ticker");
                self.state.set_latest_price(price);
            }
            None => {
                tracing::debug!(inst_id = %self.inst_id, "Ticker without usable last price");
                self.state.set_latest_price(0.0);
            }
        }
    }

    fn handle_candles(&self, data: Option<&Value>) {
        let Some(rows) = data.and_then(Value::as_array) else {
            tracing::warn!(inst_id = %self.inst_id, "Candle push without data array");
            return;
        };

        for row in rows {
            let close = row
                .as_array()
                .and_then(|fields| fields.get(CLOSE_INDEX))
                .and_then(value_as_f64);

            match close {
                Some(close) => {
                    if let Err(e) = self.state.record_close(close) {
                        tracing::warn!(error = %e, "Skipping candle");
                    }
                }
                None => tracing::warn!(row = %row, "Skipping malformed candle row"),
            }
        }
    }
}

fn first_entry(data: &Value) -> Option<&Value> {
    match data {
        Value::Array(entries) => entries.first(),
        Value::Object(_) => Some(data),
        _ => None,
    }
}

impl StreamHandler for MarketFeed {
    fn on_open(&mut self, outbox: &mut Outbox) {
        tracing::info!(
            inst_id = %self.inst_id,
            candle = %self.candle_channel(),
            "Subscribing to market data"
        );
        outbox.send_json(&self.subscribe_request());
    }

    fn on_message(&mut self, frame: StreamFrame, _outbox: &mut Outbox) {
        match frame.event() {
            Some("subscribe") => {
                tracing::debug!(channel = ?frame.channel(), "Subscribed");
                return;
            }
            Some("error") => {
                tracing::warn!(code = ?frame.code, msg = ?frame.msg, "Market stream error");
                return;
            }
            Some(other) => {
                tracing::debug!(event = other, "Ignoring event");
                return;
            }
            None => {}
        }

        let candle_channel = self.candle_channel();
        match frame.channel() {
            Some("ticker") => self.handle_ticker(frame.data.as_ref()),
            Some(channel) if channel == candle_channel => self.handle_candles(frame.data.as_ref()),
            channel => tracing::debug!(?channel, "Ignoring push"),
        }
    }

    fn on_close(&mut self) {
        tracing::info!(inst_id = %self.inst_id, "Market session closed");
    }
}

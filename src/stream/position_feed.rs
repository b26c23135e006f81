use chrono::Utc;
use serde_json::Value;

use super::connection::{Outbox, StreamHandler};
use crate::api::Credentials;
use crate::execution::SharedMarketState;
use crate::models::{ChannelArg, LoginArg, LoginRequest, PositionSide, StreamFrame, SubscribeRequest};

/// Private instrument type for USDT-margined perpetuals
pub const PRIVATE_INST_TYPE: &str = "UMCBL";
pub const POSITIONS_CHANNEL: &str = "positions";

/// Private stream handler: authenticates, then tracks the exchange-reported
/// position for one product
pub struct PositionFeed {
    credentials: Credentials,
    product: String,
    inst_type: String,
    state: SharedMarketState,
    authenticated: bool,
}

impl PositionFeed {
    /// # Arguments
    /// * `product` - REST symbol, e.g. `BTCUSDT_UMCBL`, used to pick the entry
    ///   out of a multi-position push
    pub fn new(credentials: Credentials, product: &str, state: SharedMarketState) -> Self {
        Self {
            credentials,
            product: product.to_string(),
            inst_type: PRIVATE_INST_TYPE.to_string(),
            state,
            authenticated: false,
        }
    }

    pub fn is_authenticated(&self) -> bool {
        self.authenticated
    }

    /// Login frame signed at `timestamp_secs`
    pub fn login_request(&self, timestamp_secs: i64) -> LoginRequest {
        let timestamp = timestamp_secs.to_string();
        LoginRequest::new(LoginArg {
            api_key: self.credentials.api_key.clone(),
            passphrase: self.credentials.passphrase.clone(),
            sign: self.credentials.login_signature(&timestamp),
            timestamp,
        })
    }

    pub fn subscribe_request(&self) -> SubscribeRequest {
        SubscribeRequest::new(vec![ChannelArg::new(
            &self.inst_type,
            POSITIONS_CHANNEL,
            "default",
        )])
    }

    fn handle_login(&mut self, frame: &StreamFrame, outbox: &mut Outbox) {
        if !frame.is_success() {
            tracing::error!(code = ?frame.code, msg = ?frame.msg, "Private stream login rejected");
            return;
        }

        tracing::info!("Private stream authenticated, subscribing to positions");
        self.authenticated = true;
        outbox.send_json(&self.subscribe_request());
    }

    fn handle_positions(&self, data: Option<&Value>) {
        let side = self.side_from_push(data);
        let previous = self.state.confirm_position(side);

        if previous.side != side {
            tracing::info!(
                product = %self.product,
                from = ?previous.side,
                to = ?side,
                previous_source = ?previous.source,
                "Position changed"
            );
        } else {
            tracing::debug!(product = %self.product, side = ?side, "Position confirmed");
        }
    }

    /// Entry for our product, else an entry without `instId`.
    /// A push holding only other products' entries means we are flat.
    fn side_from_push(&self, data: Option<&Value>) -> PositionSide {
        let entries: Vec<&Value> = match data {
            Some(Value::Array(entries)) => entries.iter().collect(),
            Some(entry @ Value::Object(_)) => vec![entry],
            _ => Vec::new(),
        };

        let entry = entries
            .iter()
            .find(|entry| entry.get("instId").and_then(Value::as_str) == Some(self.product.as_str()))
            .or_else(|| {
                entries
                    .iter()
                    .find(|entry| entry.get("instId").and_then(Value::as_str).is_none())
            });

        if entry.is_none() && !entries.is_empty() {
            tracing::debug!(
                product = %self.product,
                entries = entries.len(),
                "Position push has no entry for product"
            );
        }

        PositionSide::from_hold_side(entry.and_then(|e| e.get("holdSide")).and_then(Value::as_str))
    }
}

impl StreamHandler for PositionFeed {
    fn on_open(&mut self, outbox: &mut Outbox) {
        self.authenticated = false;
        tracing::info!(product = %self.product, "Logging in to private stream");
        outbox.send_json(&self.login_request(Utc::now().timestamp()));
    }

    fn on_message(&mut self, frame: StreamFrame, outbox: &mut Outbox) {
        match frame.event() {
            Some("login") => self.handle_login(&frame, outbox),
            Some("subscribe") => tracing::debug!(channel = ?frame.channel(), "Subscribed"),
            Some("error") => {
                tracing::error!(code = ?frame.code, msg = ?frame.msg, "Private stream error")
            }
            Some(other) => tracing::debug!(event = other, "Ignoring event"),
            None if frame.channel() == Some(POSITIONS_CHANNEL) => {
                self.handle_positions(frame.data.as_ref())
            }
            None => tracing::debug!(channel = ?frame.channel(), "Ignoring push"),
        }
    }

    fn on_close(&mut self) {
        self.authenticated = false;
        tracing::info!(product = %self.product, "Private session closed");
    }
}

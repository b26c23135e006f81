pub mod wire;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub use wire::{ChannelArg, LoginArg, LoginRequest, StreamFrame, SubscribeRequest};

/// Side of the position held at the exchange
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum PositionSide {
    #[default]
    None,
    Long,
    Short,
}

impl PositionSide {
    /// Map the exchange `holdSide` field; anything other than long/short is flat
    pub fn from_hold_side(hold_side: Option<&str>) -> Self {
        match hold_side.map(|s| s.trim().to_ascii_lowercase()) {
            Some(s) if s == "long" => PositionSide::Long,
            Some(s) if s == "short" => PositionSide::Short,
            _ => PositionSide::None,
        }
    }

    /// Wire value for `holdSide`
    pub fn as_hold_side(&self) -> Option<&'static str> {
        match self {
            PositionSide::Long => Some("long"),
            PositionSide::Short => Some("short"),
            PositionSide::None => None,
        }
    }

    /// +1 for long, -1 for short, 0 when flat
    pub fn sign(&self) -> f64 {
        match self {
            PositionSide::Long => 1.0,
            PositionSide::Short => -1.0,
            PositionSide::None => 0.0,
        }
    }

    pub fn is_held(&self) -> bool {
        *self != PositionSide::None
    }
}

/// Where the current position belief came from
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum PositionSource {
    /// Pushed by the exchange over the private stream
    Confirmed,
    /// Written locally right after an order was acknowledged
    Provisional,
}

/// What the engine believes it holds right now
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct PositionBelief {
    pub side: PositionSide,
    pub source: PositionSource,
    pub updated_at: DateTime<Utc>,
}

impl PositionBelief {
    pub fn flat() -> Self {
        Self {
            side: PositionSide::None,
            source: PositionSource::Confirmed,
            updated_at: Utc::now(),
        }
    }

    pub fn confirmed(side: PositionSide) -> Self {
        Self {
            side,
            source: PositionSource::Confirmed,
            updated_at: Utc::now(),
        }
    }

    pub fn provisional(side: PositionSide) -> Self {
        Self {
            side,
            source: PositionSource::Provisional,
            updated_at: Utc::now(),
        }
    }
}

impl Default for PositionBelief {
    fn default() -> Self {
        Self::flat()
    }
}

/// Order side as the mix API spells it
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum OrderSide {
    OpenLong,
    OpenShort,
    CloseLong,
    CloseShort,
}

impl OrderSide {
    /// Order that opens `side`
    pub fn open(side: PositionSide) -> Option<Self> {
        match side {
            PositionSide::Long => Some(OrderSide::OpenLong),
            PositionSide::Short => Some(OrderSide::OpenShort),
            PositionSide::None => None,
        }
    }

    /// Order that closes an existing `side`
    pub fn close(side: PositionSide) -> Option<Self> {
        match side {
            PositionSide::Long => Some(OrderSide::CloseLong),
            PositionSide::Short => Some(OrderSide::CloseShort),
            PositionSide::None => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            OrderSide::OpenLong => "open_long",
            OrderSide::OpenShort => "open_short",
            OrderSide::CloseLong => "close_long",
            OrderSide::CloseShort => "close_short",
        }
    }
}

impl std::fmt::Display for OrderSide {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Take-profit / stop-loss pair anchored at an entry price
///
/// Both legs are exchange-side trigger orders; nothing here tracks them
/// after placement.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct TpSlOrder {
    pub hold_side: PositionSide,
    pub entry_price: f64,
    pub take_profit: f64,
    pub stop_loss: f64,
}

impl TpSlOrder {
    /// `entry * (1 + sign * pct)` for both legs
    ///
    /// `sl_pct` is signed: a negative value puts a long's stop below entry.
    pub fn anchored(hold_side: PositionSide, entry_price: f64, tp_pct: f64, sl_pct: f64) -> Self {
        let sign = hold_side.sign();
        Self {
            hold_side,
            entry_price,
            take_profit: entry_price * (1.0 + sign * tp_pct),
            stop_loss: entry_price * (1.0 + sign * sl_pct),
        }
    }
}

/// OHLCV candlestick data
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Candle {
    pub timestamp: DateTime<Utc>,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
}

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use chrono::{DateTime, Utc};

use super::signal_buffer::{BufferError, SignalBuffer};
use crate::models::{PositionBelief, PositionSide};

/// Price history, latest price and position belief shared by the feeds and
/// the strategy loop
#[derive(Debug)]
struct MarketState {
    prices: SignalBuffer,
    latest_price: f64,
    latest_price_at: Option<DateTime<Utc>>,
    position: PositionBelief,
}

/// Everything a strategy tick reads, taken under one lock
#[derive(Debug, Clone, PartialEq)]
pub struct MarketSnapshot {
    pub samples: usize,
    pub capacity: usize,
    pub short_ma: f64,
    pub long_ma: f64,
    pub price_change_pct: Option<f64>,
    pub latest_price: f64,
    pub latest_price_at: Option<DateTime<Utc>>,
    pub position: PositionBelief,
}

/// Thread-safe handle to the market state
///
/// Every method takes the lock once and releases it before returning, so no
/// guard is ever held across an `.await`.
#[derive(Clone)]
pub struct SharedMarketState {
    inner: Arc<Mutex<MarketState>>,
}

impl SharedMarketState {
    /// # Arguments
    /// * `long_period` - Window length of the price buffer
    pub fn new(long_period: usize) -> Self {
        Self {
            inner: Arc::new(Mutex::new(MarketState {
                prices: SignalBuffer::new(long_period),
                latest_price: 0.0,
                latest_price_at: None,
                position: PositionBelief::flat(),
            })),
        }
    }

    // A panic inside a handler cannot leave the state half-written: every
    // mutation is a single assignment or buffer push.
    fn lock(&self) -> MutexGuard<'_, MarketState> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn record_close(&self, price: f64) -> Result<(), BufferError> {
        self.lock().prices.record_close(price)
    }

    /// Seed the buffer with historical closes, oldest first
    pub fn seed_closes<I: IntoIterator<Item = f64>>(&self, closes: I) -> usize {
        self.lock().prices.seed(closes)
    }

    pub fn buffered_closes(&self) -> usize {
        self.lock().prices.len()
    }

    pub fn set_latest_price(&self, price: f64) {
        let mut state = self.lock();
        state.latest_price = price;
        state.latest_price_at = Some(Utc::now());
    }

    pub fn latest_price(&self) -> f64 {
        self.lock().latest_price
    }

    /// Authoritative write from the private stream; returns the belief it replaced
    pub fn confirm_position(&self, side: PositionSide) -> PositionBelief {
        std::mem::replace(&mut self.lock().position, PositionBelief::confirmed(side))
    }

    /// Local write right after an order was acknowledged
    pub fn set_provisional_position(&self, side: PositionSide) {
        self.lock().position = PositionBelief::provisional(side);
    }

    pub fn position(&self) -> PositionBelief {
        self.lock().position
    }

    /// Consistent view for one strategy evaluation
    pub fn snapshot(&self, short_period: usize, long_period: usize) -> MarketSnapshot {
        let state = self.lock();
        MarketSnapshot {
            samples: state.prices.len(),
            capacity: state.prices.capacity(),
            short_ma: state.prices.moving_average(short_period),
            long_ma: state.prices.moving_average(long_period),
            price_change_pct: state.prices.price_delta(),
            latest_price: state.latest_price,
            latest_price_at: state.latest_price_at,
            position: state.position,
        }
    }
}

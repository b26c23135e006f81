use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::watch;
use tokio::time::{interval, MissedTickBehavior};

use super::crossover::{decide, expected_return, CrossoverParams, Decision, SkipReason};
use crate::api::{GatewayError, OrderGateway};
use crate::execution::SharedMarketState;
use crate::models::{OrderSide, PositionSide, TpSlOrder};
use crate::stream::connection::wait_for_shutdown;

#[derive(Debug, Clone)]
pub struct StrategyConfig {
    /// Stream symbol; the gateway derives its own REST symbol
    pub symbol: String,
    pub leverage: u32,
    pub order_quantity: f64,
    pub take_profit_pct: f64,
    /// Signed: negative puts a long's stop below entry
    pub stop_loss_pct: f64,
    pub taker_fee: f64,
    pub tick_interval: Duration,
    pub crossover: CrossoverParams,
}

impl Default for StrategyConfig {
    fn default() -> Self {
        Self {
            symbol: "BTCUSDT".to_string(),
            leverage: 10,
            order_quantity: 0.001,
            take_profit_pct: 0.02,
            stop_loss_pct: -0.01,
            taker_fee: 0.0006,
            tick_interval: Duration::from_secs(10),
            crossover: CrossoverParams::default(),
        }
    }
}

/// Gateway call that failed during an entry
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActionStage {
    Close,
    Open,
    TpSl,
}

#[derive(Debug)]
pub enum TickOutcome {
    /// Another tick was still running
    Busy,
    Skipped(SkipReason),
    Hold,
    Entered {
        side: PositionSide,
        order_id: String,
        tpsl_placed: bool,
    },
    Failed {
        stage: ActionStage,
        error: GatewayError,
    },
}

/// Releases the in-flight flag when the tick ends, however it ends
struct TickGuard<'a>(&'a AtomicBool);

impl<'a> TickGuard<'a> {
    fn acquire(flag: &'a AtomicBool) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| TickGuard(flag))
    }
}

impl Drop for TickGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

/// Periodic crossover evaluation and order placement
pub struct StrategyLoop<G: OrderGateway> {
    config: StrategyConfig,
    state: SharedMarketState,
    gateway: Arc<G>,
    in_flight: AtomicBool,
}

impl<G: OrderGateway> StrategyLoop<G> {
    pub fn new(config: StrategyConfig, state: SharedMarketState, gateway: Arc<G>) -> Self {
        Self {
            config,
            state,
            gateway,
            in_flight: AtomicBool::new(false),
        }
    }

    pub fn config(&self) -> &StrategyConfig {
        &self.config
    }

    /// Set leverage once before the first tick; failure is logged only
    pub async fn prepare(&self) {
        match self
            .gateway
            .set_leverage(&self.config.symbol, self.config.leverage)
            .await
        {
            Ok(()) => tracing::info!(
                symbol = %self.config.symbol,
                leverage = self.config.leverage,
                "⚙️  Leverage configured"
            ),
            Err(e) => tracing::error!(
                symbol = %self.config.symbol,
                error = %e,
                "Failed to set leverage, continuing with exchange default"
            ),
        }
    }

    /// Run ticks on a fixed period until shutdown
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) {
        self.prepare().await;

        let mut ticker = interval(self.config.tick_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        tracing::info!(
            symbol = %self.config.symbol,
            period_secs = self.config.tick_interval.as_secs_f64(),
            short = self.config.crossover.short_period,
            long = self.config.crossover.long_period,
            "📈 Strategy loop started"
        );

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    let outcome = self.tick().await;
                    tracing::debug!(?outcome, "Tick finished");
                }
                _ = wait_for_shutdown(&mut shutdown) => break,
            }
        }

        tracing::info!("Strategy loop stopped");
    }

    /// Evaluate once and act on the decision
    pub async fn tick(&self) -> TickOutcome {
        let Some(_guard) = TickGuard::acquire(&self.in_flight) else {
            tracing::warn!("Previous tick still running, skipping");
            return TickOutcome::Busy;
        };

        let params = &self.config.crossover;
        let snapshot = self.state.snapshot(params.short_period, params.long_period);
        let price_age_ms = snapshot
            .latest_price_at
            .map(|at| (Utc::now() - at).num_milliseconds());

        let decision = decide(&snapshot, &self.config.crossover);

        let outcome = match decision {
            Decision::Skip(reason) => {
                tracing::debug!(reason = %reason, "Tick skipped");
                return TickOutcome::Skipped(reason);
            }
            Decision::Hold { signal } => {
                tracing::debug!(
                    ?signal,
                    position = ?snapshot.position.side,
                    short_ma = snapshot.short_ma,
                    long_ma = snapshot.long_ma,
                    "No action"
                );
                TickOutcome::Hold
            }
            Decision::Enter {
                target,
                close_first,
                signal,
            } => {
                tracing::info!(
                    ?signal,
                    short_ma = snapshot.short_ma,
                    long_ma = snapshot.long_ma,
                    price = snapshot.latest_price,
                    price_age_ms = ?price_age_ms,
                    from = ?snapshot.position.side,
                    to = ?target,
                    "🔀 Crossover"
                );
                self.enter(target, close_first, snapshot.latest_price).await
            }
        };

        let held = self.state.position().side;
        if held.is_held() {
            if let Some(change_pct) = snapshot.price_change_pct {
                tracing::info!(
                    position = ?held,
                    change_pct = change_pct * 100.0,
                    expected_return_pct =
                        expected_return(change_pct, self.config.leverage, self.config.taker_fee) * 100.0,
                    "Expected return"
                );
            }
        }

        outcome
    }

    /// Close the opposite side, open `target`, record it, attach TP/SL
    async fn enter(
        &self,
        target: PositionSide,
        close_first: Option<PositionSide>,
        entry_price: f64,
    ) -> TickOutcome {
        let symbol = self.config.symbol.as_str();
        let quantity = self.config.order_quantity;

        if let Some(side) = close_first.and_then(OrderSide::close) {
            if let Err(error) = self.gateway.place_order(symbol, side, quantity).await {
                tracing::error!(%side, error = %error, "Close order failed");
                return TickOutcome::Failed {
                    stage: ActionStage::Close,
                    error,
                };
            }
        }

        let Some(open_side) = OrderSide::open(target) else {
            return TickOutcome::Hold;
        };

        let order_id = match self.gateway.place_order(symbol, open_side, quantity).await {
            Ok(order_id) => order_id,
            Err(error) => {
                tracing::error!(side = %open_side, error = %error, "Open order failed");
                return TickOutcome::Failed {
                    stage: ActionStage::Open,
                    error,
                };
            }
        };

        self.state.set_provisional_position(target);
        tracing::info!(side = ?target, order_id = %order_id, quantity, "✅ Position opened");

        let tpsl = TpSlOrder::anchored(
            target,
            entry_price,
            self.config.take_profit_pct,
            self.config.stop_loss_pct,
        );
        let tpsl_placed = match self.gateway.place_tpsl(symbol, &tpsl).await {
            Ok(()) => true,
            Err(e) => {
                tracing::error!(
                    side = ?target,
                    take_profit = tpsl.take_profit,
                    stop_loss = tpsl.stop_loss,
                    error = %e,
                    "TP/SL placement failed, position is unprotected"
                );
                false
            }
        };

        TickOutcome::Entered {
            side: target,
            order_id,
            tpsl_placed,
        }
    }
}

use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};

use thiserror::Error;
use uuid::Uuid;

use crate::models::{OrderSide, TpSlOrder};

/// Failures surfaced by order gateway calls
#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("http transport error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("unexpected HTTP status {status}: {body}")]
    Status { status: u16, body: String },

    #[error("exchange rejected request ({code}): {msg}")]
    Rejected { code: String, msg: String },

    #[error("failed to decode response: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("invalid request: {0}")]
    InvalidRequest(String),
}

/// Control plane used by the strategy loop
///
/// Calls are awaited one at a time by the caller; implementations do not
/// need to order concurrent requests.
pub trait OrderGateway: Send + Sync {
    fn set_leverage(
        &self,
        symbol: &str,
        leverage: u32,
    ) -> impl Future<Output = Result<(), GatewayError>> + Send;

    /// Market order; returns the exchange order id
    fn place_order(
        &self,
        symbol: &str,
        side: OrderSide,
        quantity: f64,
    ) -> impl Future<Output = Result<String, GatewayError>> + Send;

    fn place_tpsl(
        &self,
        symbol: &str,
        order: &TpSlOrder,
    ) -> impl Future<Output = Result<(), GatewayError>> + Send;
}

/// Paper-trading gateway: logs every request and acknowledges it
#[derive(Debug, Default)]
pub struct DryRunGateway {
    orders: AtomicU64,
}

impl DryRunGateway {
    pub fn new() -> Self {
        Self::default()
    }

    /// Orders acknowledged so far
    pub fn orders_placed(&self) -> u64 {
        self.orders.load(Ordering::Relaxed)
    }
}

impl OrderGateway for DryRunGateway {
    async fn set_leverage(&self, symbol: &str, leverage: u32) -> Result<(), GatewayError> {
        tracing::info!(symbol, leverage, "[dry-run] set leverage");
        Ok(())
    }

    async fn place_order(
        &self,
        symbol: &str,
        side: OrderSide,
        quantity: f64,
    ) -> Result<String, GatewayError> {
        if !(quantity.is_finite() && quantity > 0.0) {
            return Err(GatewayError::InvalidRequest(format!(
                "quantity must be positive, got {}",
                quantity
            )));
        }

        let order_id = format!("dry-{}", Uuid::new_v4());
        self.orders.fetch_add(1, Ordering::Relaxed);
        tracing::info!(symbol, %side, quantity, order_id = %order_id, "[dry-run] place order");
        Ok(order_id)
    }

    async fn place_tpsl(&self, symbol: &str, order: &TpSlOrder) -> Result<(), GatewayError> {
        tracing::info!(
            symbol,
            hold_side = ?order.hold_side,
            entry = order.entry_price,
            take_profit = order.take_profit,
            stop_loss = order.stop_loss,
            "[dry-run] place TP/SL"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::PositionSide;

    #[tokio::test]
    async fn test_dry_run_acknowledges_orders() {
        let gateway = DryRunGateway::new();

        let id = gateway
            .place_order("BTCUSDT", OrderSide::OpenLong, 0.001)
            .await
            .unwrap();
        assert!(id.starts_with("dry-"));

        let tpsl = TpSlOrder::anchored(PositionSide::Long, 100.0, 0.02, -0.01);
        assert!(gateway.place_tpsl("BTCUSDT", &tpsl).await.is_ok());
        assert_eq!(gateway.orders_placed(), 1);
    }

    #[tokio::test]
    async fn test_dry_run_rejects_bad_quantity() {
        let gateway = DryRunGateway::new();
        let result = gateway.place_order("BTCUSDT", OrderSide::OpenShort, 0.0).await;
        assert!(matches!(result, Err(GatewayError::InvalidRequest(_))));
        assert_eq!(gateway.orders_placed(), 0);
    }
}

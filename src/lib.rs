// Core modules
pub mod api;
pub mod config;
pub mod execution;
pub mod models;
pub mod strategy;
pub mod stream;

// Re-export commonly used types
pub use api::{BitgetClient, DryRunGateway, GatewayError, OrderGateway};
pub use crate::config::Settings;
pub use execution::SharedMarketState;
pub use models::*;

// Error handling
pub type Result<T> = std::result::Result<T, Box<dyn std::error::Error + Send + Sync>>;

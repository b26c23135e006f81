pub mod bitget;
pub mod gateway;
pub mod signer;

pub use bitget::{BitgetClient, BitgetConfig};
pub use gateway::{DryRunGateway, GatewayError, OrderGateway};
pub use signer::Credentials;

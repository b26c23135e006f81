// Exchange WebSocket channels
pub mod connection;
pub mod market_feed;
pub mod position_feed;

pub use connection::{
    ConnectionEvent, ConnectionManager, ConnectionPolicy, ConnectionState, ConnectionStatus,
    InvalidTransition, Outbox, StreamHandler,
};
pub use market_feed::MarketFeed;
pub use position_feed::PositionFeed;

/// Public and private mix streams share one endpoint
pub const BITGET_WS_URL: &str = "wss://ws.bitget.com/mix/v1/stream";

// Price buffer and shared market state
pub mod market_state;
pub mod signal_buffer;
pub mod warmup;

pub use market_state::{MarketSnapshot, SharedMarketState};
pub use signal_buffer::{BufferError, SignalBuffer};
pub use warmup::warm_up;

use super::SharedMarketState;
use crate::api::BitgetClient;
use crate::Result;

/// Seed the price buffer with recent historical closes
///
/// Runs before the streams start. Returns how many closes were buffered.
pub async fn warm_up(
    client: &BitgetClient,
    state: &SharedMarketState,
    symbol: &str,
    timeframe: &str,
    limit: usize,
) -> Result<usize> {
    let candles = client.fetch_candles(symbol, timeframe, limit).await?;
    let skip = candles.len().saturating_sub(limit);
    let accepted = state.seed_closes(candles.iter().skip(skip).map(|c| c.close));

    tracing::info!(
        symbol,
        timeframe,
        fetched = candles.len(),
        accepted,
        buffered = state.buffered_closes(),
        "Warm-up complete"
    );

    Ok(accepted)
}

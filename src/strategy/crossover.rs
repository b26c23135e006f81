use std::fmt;

use crate::execution::MarketSnapshot;
use crate::models::PositionSide;

/// Moving-average crossover parameters
#[derive(Debug, Clone, PartialEq)]
pub struct CrossoverParams {
    pub short_period: usize,
    pub long_period: usize,
    /// Minimum |close-to-close change| (fraction) before acting
    pub min_change_pct: f64,
}

impl Default for CrossoverParams {
    fn default() -> Self {
        Self {
            short_period: 50,
            long_period: 200,
            min_change_pct: 0.002,
        }
    }
}

/// Relation between the short and long moving averages
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CrossoverSignal {
    /// Short MA above long MA
    Bullish,
    /// Short MA below long MA
    Bearish,
    /// Exactly equal
    Neutral,
}

impl CrossoverSignal {
    pub fn from_averages(short_ma: f64, long_ma: f64) -> Self {
        if short_ma > long_ma {
            CrossoverSignal::Bullish
        } else if short_ma < long_ma {
            CrossoverSignal::Bearish
        } else {
            CrossoverSignal::Neutral
        }
    }

    /// Position this signal wants to hold
    pub fn target(&self) -> PositionSide {
        match self {
            CrossoverSignal::Bullish => PositionSide::Long,
            CrossoverSignal::Bearish => PositionSide::Short,
            CrossoverSignal::Neutral => PositionSide::None,
        }
    }
}

/// Why a tick did not evaluate the crossover
#[derive(Debug, Clone, PartialEq)]
pub enum SkipReason {
    Warmup { samples: usize, needed: usize },
    NoLatestPrice,
    NoPriceDelta,
    BelowMinChange { change_pct: f64, threshold: f64 },
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SkipReason::Warmup { samples, needed } => {
                write!(f, "warming up ({}/{} closes)", samples, needed)
            }
            SkipReason::NoLatestPrice => f.write_str("no latest price yet"),
            SkipReason::NoPriceDelta => f.write_str("price change undefined"),
            SkipReason::BelowMinChange {
                change_pct,
                threshold,
            } => write!(
                f,
                "price change {:.4}% below {:.4}%",
                change_pct * 100.0,
                threshold * 100.0
            ),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Decision {
    Skip(SkipReason),
    /// Signal agrees with the position (or MAs are tied)
    Hold { signal: CrossoverSignal },
    /// Switch to `target`, closing `close_first` beforehand when set
    Enter {
        target: PositionSide,
        close_first: Option<PositionSide>,
        signal: CrossoverSignal,
    },
}

/// Evaluate one tick against a consistent market snapshot
///
/// Pure: no I/O, no state change. Guards run in order: buffer fullness,
/// latest price, defined price change, minimum change.
pub fn decide(snapshot: &MarketSnapshot, params: &CrossoverParams) -> Decision {
    if snapshot.samples < params.long_period {
        return Decision::Skip(SkipReason::Warmup {
            samples: snapshot.samples,
            needed: params.long_period,
        });
    }

    if snapshot.latest_price == 0.0 {
        return Decision::Skip(SkipReason::NoLatestPrice);
    }

    let Some(change_pct) = snapshot.price_change_pct else {
        return Decision::Skip(SkipReason::NoPriceDelta);
    };

    if change_pct.abs() < params.min_change_pct {
        return Decision::Skip(SkipReason::BelowMinChange {
            change_pct,
            threshold: params.min_change_pct,
        });
    }

    let signal = CrossoverSignal::from_averages(snapshot.short_ma, snapshot.long_ma);
    let target = signal.target();
    let current = snapshot.position.side;

    if !target.is_held() || target == current {
        return Decision::Hold { signal };
    }

    Decision::Enter {
        target,
        close_first: current.is_held().then_some(current),
        signal,
    }
}

/// Fee-adjusted return of a round trip at the given leverage
///
/// `change_pct * leverage - 2 * taker_fee`
pub fn expected_return(change_pct: f64, leverage: u32, taker_fee: f64) -> f64 {
    change_pct * leverage as f64 - 2.0 * taker_fee
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::PositionBelief;

    fn params() -> CrossoverParams {
        CrossoverParams {
            short_period: 2,
            long_period: 4,
            min_change_pct: 0.002,
        }
    }

    fn snapshot(short_ma: f64, long_ma: f64, change: f64, position: PositionSide) -> MarketSnapshot {
        MarketSnapshot {
            samples: 4,
            capacity: 4,
            short_ma,
            long_ma,
            price_change_pct: Some(change),
            latest_price: 100.0,
            latest_price_at: None,
            position: PositionBelief::confirmed(position),
        }
    }

    #[test]
    fn test_warmup_guard() {
        let mut snap = snapshot(101.0, 100.0, 0.01, PositionSide::None);
        snap.samples = 3;

        assert_eq!(
            decide(&snap, &params()),
            Decision::Skip(SkipReason::Warmup {
                samples: 3,
                needed: 4
            })
        );
    }

    #[test]
    fn test_zero_latest_price_guard() {
        let mut snap = snapshot(101.0, 100.0, 0.01, PositionSide::None);
        snap.latest_price = 0.0;
        assert_eq!(decide(&snap, &params()), Decision::Skip(SkipReason::NoLatestPrice));
    }

    #[test]
    fn test_missing_delta_guard() {
        let mut snap = snapshot(101.0, 100.0, 0.01, PositionSide::None);
        snap.price_change_pct = None;
        assert_eq!(decide(&snap, &params()), Decision::Skip(SkipReason::NoPriceDelta));
    }

    #[test]
    fn test_min_change_filter_both_directions() {
        let snap = snapshot(101.0, 100.0, 0.001, PositionSide::None);
        assert!(matches!(
            decide(&snap, &params()),
            Decision::Skip(SkipReason::BelowMinChange { .. })
        ));

        let snap = snapshot(101.0, 100.0, -0.001, PositionSide::None);
        assert!(matches!(
            decide(&snap, &params()),
            Decision::Skip(SkipReason::BelowMinChange { .. })
        ));

        // Negative moves above the threshold still count
        let snap = snapshot(99.0, 100.0, -0.01, PositionSide::None);
        assert!(matches!(decide(&snap, &params()), Decision::Enter { .. }));
    }

    #[test]
    fn test_bullish_from_flat_opens_long() {
        let snap = snapshot(101.0, 100.0, 0.01, PositionSide::None);
        assert_eq!(
            decide(&snap, &params()),
            Decision::Enter {
                target: PositionSide::Long,
                close_first: None,
                signal: CrossoverSignal::Bullish,
            }
        );
    }

    #[test]
    fn test_bullish_from_short_closes_first() {
        let snap = snapshot(101.0, 100.0, 0.01, PositionSide::Short);
        assert_eq!(
            decide(&snap, &params()),
            Decision::Enter {
                target: PositionSide::Long,
                close_first: Some(PositionSide::Short),
                signal: CrossoverSignal::Bullish,
            }
        );
    }

    #[test]
    fn test_bearish_from_long_closes_first() {
        let snap = snapshot(99.0, 100.0, -0.01, PositionSide::Long);
        assert_eq!(
            decide(&snap, &params()),
            Decision::Enter {
                target: PositionSide::Short,
                close_first: Some(PositionSide::Long),
                signal: CrossoverSignal::Bearish,
            }
        );
    }

    #[test]
    fn test_aligned_position_holds() {
        let snap = snapshot(101.0, 100.0, 0.01, PositionSide::Long);
        assert_eq!(
            decide(&snap, &params()),
            Decision::Hold {
                signal: CrossoverSignal::Bullish
            }
        );
    }

    #[test]
    fn test_tie_holds() {
        for position in [PositionSide::None, PositionSide::Long, PositionSide::Short] {
            let snap = snapshot(100.0, 100.0, 0.01, position);
            assert_eq!(
                decide(&snap, &params()),
                Decision::Hold {
                    signal: CrossoverSignal::Neutral
                }
            );
        }
    }

    #[test]
    fn test_expected_return() {
        let value = expected_return(0.01, 10, 0.0006);
        assert!((value - 0.0988).abs() < 1e-12);
        assert!(expected_return(0.0, 10, 0.0006) < 0.0);
    }

    #[test]
    fn test_skip_reason_display() {
        let reason = SkipReason::Warmup {
            samples: 10,
            needed: 200,
        };
        assert_eq!(reason.to_string(), "warming up (10/200 closes)");
    }
}

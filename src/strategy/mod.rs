// Trading strategy module
pub mod crossover;
pub mod runner;

pub use crossover::{decide, expected_return, CrossoverParams, CrossoverSignal, Decision, SkipReason};
pub use runner::{ActionStage, StrategyConfig, StrategyLoop, TickOutcome};

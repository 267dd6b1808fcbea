// Order execution and trade tracking module
pub mod executor;
pub mod tracker;

pub use executor::{
    BracketOutcome, BracketReport, ExecutionAction, ExecutionDecision, Executor, ExecutorConfig,
};
pub use tracker::{ClosedTrade, PositionObservation, TrackedTrade, TradeTracker};

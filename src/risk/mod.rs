// Risk management module
pub mod brackets;

pub use brackets::{
    calculate_brackets, clamp_distance, passes_floor, realized_pnl, BracketKind, Brackets,
    PnlReport,
};

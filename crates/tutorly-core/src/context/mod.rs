mod assembler;
mod window;

pub use assembler::{truncate_content, ContextAssembler};
pub use window::{HistoryTurn, HistoryWindower, TurnRole};

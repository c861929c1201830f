//! Editing model: edit operations and event debouncing

mod debounce;
mod operation;

pub use debounce::{current_timestamp, Debouncer};
pub use operation::{EditOp, EditResult, SectionOffset};

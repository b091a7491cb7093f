//! Daily sequence numbering, day rollover and reset.

mod authority;
mod marker;

pub use authority::{DayStatus, ResetReport, SequenceAuthority, SequenceError};
pub use marker::{DayMarker, FileDayMarker, MarkerError};

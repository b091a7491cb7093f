//! Display board: latest call per station and change notifications.

mod aggregator;
mod types;

pub use aggregator::{DisplayAggregator, NotificationCallback};
pub use types::{
    Board, BoardEntry, DisplayError, DuplicateCall, Highlight, NameSource, Notification,
    PollReport,
};

//! Interview room controllers.

mod controller;
mod hub;
mod types;

pub use controller::StationController;
pub use hub::StationHub;
pub use types::{
    CallReport, CallResult, CalledToken, RecallOutcome, StationError, StationState,
};

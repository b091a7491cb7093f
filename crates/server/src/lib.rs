//! HTTP and WebSocket surface for tokenline.

pub mod api;
pub mod metrics;
pub mod state;

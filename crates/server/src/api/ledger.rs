use axum::{
    extract::{Query, State},
    Json,
};
use serde::Serialize;
use std::sync::Arc;
use tokenline_core::LedgerSnapshot;

use super::error::ApiError;
use super::tickets::DateParams;
use crate::state::AppState;

#[derive(Debug, Serialize)]
pub struct LedgerResponse {
    pub backend: &'static str,
    #[serde(flatten)]
    pub snapshot: LedgerSnapshot,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub warning: Option<String>,
}

/// Call records for a day, in append order
pub async fn get_ledger(
    State(state): State<Arc<AppState>>,
    Query(params): Query<DateParams>,
) -> Result<Json<LedgerResponse>, ApiError> {
    let date = params.date.unwrap_or_else(|| state.calendar().today());
    let mut read = state.ledger().read(date)?;
    read.snapshot.date = Some(date);
    Ok(Json(LedgerResponse {
        backend: state.ledger().backend_name(),
        snapshot: read.snapshot,
        warning: read.warning,
    }))
}

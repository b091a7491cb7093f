//! Manual day reset.

use axum::{body::Bytes, extract::State, Json};
use chrono::NaiveDate;
use serde::Deserialize;
use std::sync::Arc;
use tokenline_core::ResetReport;
use tracing::warn;

use super::error::ApiError;
use super::middleware::AuthUser;
use crate::state::AppState;

/// Optional body. An empty body resets today.
#[derive(Debug, Default, Deserialize)]
pub struct ResetDayBody {
    pub date: Option<NaiveDate>,
}

pub async fn reset_day(
    State(state): State<Arc<AppState>>,
    AuthUser(operator): AuthUser,
    body: Bytes,
) -> Result<Json<ResetReport>, ApiError> {
    let params: ResetDayBody = if body.iter().all(u8::is_ascii_whitespace) {
        ResetDayBody::default()
    } else {
        serde_json::from_slice(&body)
            .map_err(|e| ApiError::validation(format!("Invalid reset body: {}", e)))?
    };
    let date = params.date.unwrap_or_else(|| state.calendar().today());

    warn!(date = %date, operator = %operator, "Day reset requested");
    let report = state.issuer().reset_day(date, &operator).await?;

    state.hub().on_day_reset(date).await;
    state.ws_broadcaster().day_reset(date);
    state.aggregator().nudge();

    Ok(Json(report))
}

use axum::{extract::State, Json};
use std::sync::Arc;
use tokenline_core::Board;

use super::error::ApiError;
use crate::state::AppState;

/// Latest board. Polls once if the background loop has not produced one yet.
pub async fn get_board(State(state): State<Arc<AppState>>) -> Result<Json<Board>, ApiError> {
    if let Some(board) = state.aggregator().current_board() {
        return Ok(Json(board));
    }
    let report = state.aggregator().poll()?;
    Ok(Json(report.board))
}

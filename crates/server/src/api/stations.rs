//! Interview room operations.

use axum::{
    extract::{Path, State},
    Json,
};
use serde::Serialize;
use std::sync::Arc;
use tokenline_core::{CallReport, CallResult, RecallOutcome, StationState};

use super::error::ApiError;
use super::middleware::AuthUser;
use crate::state::AppState;

#[derive(Debug, Serialize)]
pub struct ListStationsResponse {
    pub stations: Vec<StationState>,
}

#[derive(Debug, Serialize)]
pub struct OpenStationResponse {
    #[serde(flatten)]
    pub station: StationState,
    pub already_open: bool,
}

pub async fn list_stations(State(state): State<Arc<AppState>>) -> Json<ListStationsResponse> {
    Json(ListStationsResponse {
        stations: state.hub().states().await,
    })
}

pub async fn get_station(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<StationState>, ApiError> {
    let station = state.hub().get(&id)?;
    let snapshot = station.lock().await.state().clone();
    Ok(Json(snapshot))
}

pub async fn open_station(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    AuthUser(operator): AuthUser,
) -> Result<Json<OpenStationResponse>, ApiError> {
    let station = state.hub().get(&id)?;
    let mut controller = station.lock().await;
    let already_open = controller.open(&operator);
    if !already_open {
        state.ws_broadcaster().station_status(&id, true);
    }
    Ok(Json(OpenStationResponse {
        station: controller.state().clone(),
        already_open,
    }))
}

pub async fn close_station(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    AuthUser(operator): AuthUser,
) -> Result<Json<StationState>, ApiError> {
    let station = state.hub().get(&id)?;
    let mut controller = station.lock().await;
    controller.close(&operator);
    state.ws_broadcaster().station_status(&id, false);
    Ok(Json(controller.state().clone()))
}

/// Claim and call the next uncalled token
pub async fn call_next(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    AuthUser(operator): AuthUser,
) -> Result<Json<CallReport>, ApiError> {
    let station = state.hub().get(&id)?;
    let mut controller = station.lock().await;
    let report = controller.call_next(&operator).await?;

    if let CallResult::Called { ref record, .. } = report.outcome {
        state
            .ws_broadcaster()
            .token_called(&controller.state().label, record);
        state.aggregator().nudge();
    }
    Ok(Json(report))
}

/// Re-announce the current token without claiming anything
pub async fn recall(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<RecallOutcome>, ApiError> {
    let station = state.hub().get(&id)?;
    let controller = station.lock().await;
    let outcome = controller.recall()?;

    if let RecallOutcome::Recalled(ref token) = outcome {
        state.ws_broadcaster().token_recalled(
            &id,
            &controller.state().label,
            token.token,
            &token.name,
        );
    }
    Ok(Json(outcome))
}

/// Show "waiting" on the room console
pub async fn set_waiting(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<StationState>, ApiError> {
    let station = state.hub().get(&id)?;
    let mut controller = station.lock().await;
    controller.set_waiting()?;
    Ok(Json(controller.state().clone()))
}

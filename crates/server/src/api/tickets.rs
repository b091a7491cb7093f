//! Ticket issuance and listing.

use axum::{
    extract::{Query, State},
    http::StatusCode,
    Json,
};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokenline_core::{IssueOutcome, Ticket};

use super::error::ApiError;
use super::middleware::AuthUser;
use crate::state::AppState;

/// Request body for issuing a ticket. Blank fields are rejected with 422.
#[derive(Debug, Deserialize)]
pub struct IssueTicketBody {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub contact: String,
}

#[derive(Debug, Deserialize)]
pub struct DateParams {
    /// Defaults to today in the service calendar.
    pub date: Option<NaiveDate>,
}

#[derive(Debug, Serialize)]
pub struct ListTicketsResponse {
    pub date: NaiveDate,
    pub count: usize,
    pub tickets: Vec<Ticket>,
}

#[derive(Debug, Serialize)]
pub struct NextSequenceResponse {
    pub date: NaiveDate,
    pub next_sequence: u32,
}

/// Issue a ticket
pub async fn issue_ticket(
    State(state): State<Arc<AppState>>,
    AuthUser(operator): AuthUser,
    Json(body): Json<IssueTicketBody>,
) -> Result<(StatusCode, Json<IssueOutcome>), ApiError> {
    let outcome = state
        .issuer()
        .issue_ticket(&body.name, &body.contact, &operator)
        .await?;

    state.ws_broadcaster().ticket_issued(&outcome.ticket);
    Ok((StatusCode::CREATED, Json(outcome)))
}

/// List a day's tickets in issuance order
pub async fn list_tickets(
    State(state): State<Arc<AppState>>,
    Query(params): Query<DateParams>,
) -> Result<Json<ListTicketsResponse>, ApiError> {
    let date = params.date.unwrap_or_else(|| state.calendar().today());
    let tickets = state.registry().read_rows(date)?;
    Ok(Json(ListTicketsResponse {
        date,
        count: tickets.len(),
        tickets,
    }))
}

/// The number the next ticket will receive today
pub async fn next_sequence(
    State(state): State<Arc<AppState>>,
) -> Result<Json<NextSequenceResponse>, ApiError> {
    let date = state.calendar().today();
    let next_sequence = state.authority().next_sequence(date)?;
    Ok(Json(NextSequenceResponse {
        date,
        next_sequence,
    }))
}

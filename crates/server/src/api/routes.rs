use axum::{
    middleware,
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use super::middleware::{auth_middleware, metrics_middleware};
use super::{audit, day, display, handlers, ledger, stations, tickets, ws};
use crate::state::AppState;

pub fn create_router(state: Arc<AppState>) -> Router {
    // Operator routes resolve an Identity; it becomes the audit actor.
    let operator_routes = Router::new()
        .route("/config", get(handlers::get_config))
        // Tickets
        .route("/tickets", post(tickets::issue_ticket).get(tickets::list_tickets))
        .route("/tickets/next", get(tickets::next_sequence))
        .route("/day/reset", post(day::reset_day))
        // Stations
        .route("/stations", get(stations::list_stations))
        .route("/stations/{id}", get(stations::get_station))
        .route("/stations/{id}/open", post(stations::open_station))
        .route("/stations/{id}/close", post(stations::close_station))
        .route("/stations/{id}/call", post(stations::call_next))
        .route("/stations/{id}/recall", post(stations::recall))
        .route("/stations/{id}/wait", post(stations::set_waiting))
        // Inspection
        .route("/ledger", get(ledger::get_ledger))
        .route("/audit", get(audit::query_audit))
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            auth_middleware,
        ));

    // Display surfaces and probes stay open to the LAN.
    let public_routes = Router::new()
        .route("/health", get(handlers::health))
        .route("/metrics", get(handlers::get_metrics))
        .route("/display/board", get(display::get_board))
        .route("/ws", get(ws::ws_handler));

    let api_routes = operator_routes
        .merge(public_routes)
        .layer(middleware::from_fn(metrics_middleware))
        .with_state(state);

    Router::new()
        .nest("/api/v1", api_routes)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
}

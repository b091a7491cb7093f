//! WebSocket push channel for kiosks, room consoles and display boards.

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        State,
    },
    response::IntoResponse,
};
use chrono::{DateTime, NaiveDate, Utc};
use futures::{SinkExt, StreamExt};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tokenline_core::{CallRecord, Notification, Ticket};
use tokio::sync::broadcast;
use tracing::{debug, error, info, warn};

use crate::metrics::{WS_CONNECTIONS_ACTIVE, WS_CONNECTIONS_TOTAL, WS_LAG_EVENTS, WS_MESSAGES_SENT};
use crate::state::AppState;

/// Event pushed to every connected client.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum WsMessage {
    TicketIssued {
        date: NaiveDate,
        sequence_number: u32,
        name: String,
    },
    TokenCalled {
        station_id: String,
        label: String,
        token: u32,
        name: String,
        called_at: DateTime<Utc>,
    },
    /// Re-announcement of a station's current token. Nothing was claimed.
    TokenRecalled {
        station_id: String,
        label: String,
        token: u32,
        name: String,
    },
    StationStatus {
        station_id: String,
        is_open: bool,
    },
    /// The latest token of a station changed on the board.
    DisplayNotification(Notification),
    DayReset {
        date: NaiveDate,
    },
    Heartbeat {
        timestamp: i64,
    },
}

impl WsMessage {
    /// Wire name, also the metric label.
    pub fn kind(&self) -> &'static str {
        match self {
            WsMessage::TicketIssued { .. } => "ticket_issued",
            WsMessage::TokenCalled { .. } => "token_called",
            WsMessage::TokenRecalled { .. } => "token_recalled",
            WsMessage::StationStatus { .. } => "station_status",
            WsMessage::DisplayNotification(_) => "display_notification",
            WsMessage::DayReset { .. } => "day_reset",
            WsMessage::Heartbeat { .. } => "heartbeat",
        }
    }
}

/// Fan-out of [`WsMessage`] over a tokio broadcast channel.
#[derive(Debug, Clone)]
pub struct WsBroadcaster {
    sender: broadcast::Sender<WsMessage>,
}

impl WsBroadcaster {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    pub fn broadcast(&self, msg: WsMessage) {
        // No receivers just means no one is listening
        let _ = self.sender.send(msg);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<WsMessage> {
        self.sender.subscribe()
    }

    pub fn ticket_issued(&self, ticket: &Ticket) {
        self.broadcast(WsMessage::TicketIssued {
            date: ticket.date,
            sequence_number: ticket.sequence_number,
            name: ticket.name.clone(),
        });
    }

    pub fn token_called(&self, label: &str, record: &CallRecord) {
        self.broadcast(WsMessage::TokenCalled {
            station_id: record.station_id.clone(),
            label: label.to_string(),
            token: record.token,
            name: record.name.clone(),
            called_at: record.called_at,
        });
    }

    pub fn token_recalled(&self, station_id: &str, label: &str, token: u32, name: &str) {
        self.broadcast(WsMessage::TokenRecalled {
            station_id: station_id.to_string(),
            label: label.to_string(),
            token,
            name: name.to_string(),
        });
    }

    pub fn station_status(&self, station_id: &str, is_open: bool) {
        self.broadcast(WsMessage::StationStatus {
            station_id: station_id.to_string(),
            is_open,
        });
    }

    pub fn display_notification(&self, notification: &Notification) {
        self.broadcast(WsMessage::DisplayNotification(notification.clone()));
    }

    pub fn day_reset(&self, date: NaiveDate) {
        self.broadcast(WsMessage::DayReset { date });
    }

    pub fn heartbeat(&self) {
        self.broadcast(WsMessage::Heartbeat {
            timestamp: Utc::now().timestamp(),
        });
    }

    /// Send a heartbeat every `interval` for as long as the runtime lives.
    pub fn spawn_heartbeat(&self, interval: Duration) -> tokio::task::JoinHandle<()> {
        let broadcaster = self.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.tick().await;
            loop {
                ticker.tick().await;
                broadcaster.heartbeat();
            }
        })
    }
}

impl Default for WsBroadcaster {
    fn default() -> Self {
        Self::new(256)
    }
}

/// WebSocket upgrade handler.
pub async fn ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<Arc<AppState>>,
) -> impl IntoResponse {
    ws.on_upgrade(|socket| handle_socket(socket, state))
}

async fn handle_socket(socket: WebSocket, state: Arc<AppState>) {
    let (mut sender, mut receiver) = socket.split();
    let mut rx = state.ws_broadcaster().subscribe();

    WS_CONNECTIONS_TOTAL.inc();
    WS_CONNECTIONS_ACTIVE.inc();
    info!("WebSocket client connected");

    let send_task = tokio::spawn(async move {
        loop {
            match rx.recv().await {
                Ok(msg) => {
                    WS_MESSAGES_SENT.with_label_values(&[msg.kind()]).inc();
                    match serde_json::to_string(&msg) {
                        Ok(json) => {
                            if sender.send(Message::Text(json.into())).await.is_err() {
                                debug!("WebSocket send failed, client disconnected");
                                break;
                            }
                        }
                        Err(e) => error!("Failed to serialize WsMessage: {}", e),
                    }
                }
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    warn!("WebSocket client lagged, skipped {} messages", n);
                    WS_LAG_EVENTS.inc();
                }
                Err(broadcast::error::RecvError::Closed) => {
                    debug!("Broadcast channel closed");
                    break;
                }
            }
        }
    });

    // Clients only listen; anything they send is ignored until close.
    while let Some(result) = receiver.next().await {
        match result {
            Ok(Message::Close(_)) => {
                debug!("WebSocket client requested close");
                break;
            }
            Ok(_) => {}
            Err(e) => {
                warn!("WebSocket receive error: {}", e);
                break;
            }
        }
    }

    send_task.abort();
    WS_CONNECTIONS_ACTIVE.dec();
    info!("WebSocket client disconnected");
}

//! Read-only reconciliation of the ledger into a display board.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use chrono::{DateTime, NaiveDate, Utc};
use tokio::sync::{broadcast, Notify};
use tracing::{debug, info, warn};

use super::types::{
    Board, BoardEntry, DisplayError, DuplicateCall, Highlight, NameSource, Notification,
    PollReport,
};
use crate::clock::Calendar;
use crate::config::DisplayConfig;
use crate::ledger::{CallLedger, CallRecord};
use crate::metrics;
use crate::registry::Registry;

/// Invoked once per raised notification.
pub type NotificationCallback = Arc<dyn Fn(&Notification) + Send + Sync>;

#[derive(Default)]
struct DisplayState {
    date: Option<NaiveDate>,
    /// Station id to the token shown at the previous poll.
    previous: HashMap<String, u32>,
    highlights: HashMap<String, Highlight>,
    board: Option<Board>,
}

/// Polls the ledger and registry and keeps the latest board.
///
/// Never writes to either store.
pub struct DisplayAggregator {
    registry: Arc<dyn Registry>,
    ledger: Arc<dyn CallLedger>,
    calendar: Calendar,
    config: DisplayConfig,
    labels: HashMap<String, String>,
    state: Mutex<DisplayState>,
    callback: Option<NotificationCallback>,
    running: Arc<AtomicBool>,
    shutdown_tx: broadcast::Sender<()>,
    nudge: Arc<Notify>,
}

impl DisplayAggregator {
    pub fn new(
        registry: Arc<dyn Registry>,
        ledger: Arc<dyn CallLedger>,
        calendar: Calendar,
        config: DisplayConfig,
        labels: HashMap<String, String>,
    ) -> Self {
        let (shutdown_tx, _) = broadcast::channel(1);
        Self {
            registry,
            ledger,
            calendar,
            config,
            labels,
            state: Mutex::new(DisplayState::default()),
            callback: None,
            running: Arc::new(AtomicBool::new(false)),
            shutdown_tx,
            nudge: Arc::new(Notify::new()),
        }
    }

    pub fn with_notification_callback(mut self, callback: NotificationCallback) -> Self {
        self.callback = Some(callback);
        self
    }

    fn lock_state(&self) -> MutexGuard<'_, DisplayState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Run one reconciliation pass.
    pub fn poll(&self) -> Result<PollReport, DisplayError> {
        let date = self.calendar.today();
        let now = self.calendar.now();

        let read = match self.ledger.read(date) {
            Ok(read) => read,
            Err(e) => {
                metrics::AGGREGATOR_POLLS.with_label_values(&["error"]).inc();
                warn!(error = %e, "Display poll could not read the ledger");
                return Err(e.into());
            }
        };

        let mut warnings: Vec<String> = read.warning.into_iter().collect();
        let records = &read.snapshot.called_tokens;

        let anomalies = find_duplicates(records);
        metrics::DUPLICATE_CALLS.set(anomalies.len() as i64);
        for anomaly in &anomalies {
            warn!(
                token = anomaly.token,
                stations = ?anomaly.station_ids,
                "Token appears in more than one call record"
            );
        }

        let mut registry_failed = false;
        let mut latest = latest_per_station(records);
        latest.sort_by(|(ia, a), (ib, b)| b.called_at.cmp(&a.called_at).then(ib.cmp(ia)));

        let mut entries = Vec::with_capacity(latest.len());
        for (_, record) in latest {
            let (name, name_source) = match self.registry.find_row(date, record.token) {
                Ok(Some(ticket)) => (ticket.name, NameSource::Registry),
                Ok(None) => (record.name.clone(), NameSource::Snapshot),
                Err(e) => {
                    if !registry_failed {
                        registry_failed = true;
                        warn!(error = %e, "Registry lookup failed, using call snapshots");
                        warnings.push(format!("Registry lookup failed: {}", e));
                    }
                    (record.name.clone(), NameSource::Snapshot)
                }
            };

            entries.push(BoardEntry {
                station_id: record.station_id.clone(),
                label: self.label_for(&record.station_id),
                token: record.token,
                name,
                name_source,
                time: record.time.clone(),
                called_at: record.called_at,
                highlighted: None,
            });
        }

        let mut guard = self.lock_state();
        let state = &mut *guard;
        if state.date != Some(date) {
            if state.date.is_some() {
                info!(date = %date, "Display switched to a new day");
            }
            state.previous.clear();
            state.highlights.clear();
            state.date = Some(date);
        }

        let mut notifications = Vec::new();
        let mut current = HashMap::with_capacity(entries.len());
        for entry in &entries {
            current.insert(entry.station_id.clone(), entry.token);
            if state.previous.get(&entry.station_id) == Some(&entry.token) {
                continue;
            }

            state.highlights.insert(
                entry.station_id.clone(),
                Highlight {
                    started_at: now,
                    cycles: self.config.highlight_cycles,
                    interval_ms: self.config.highlight_interval_ms,
                },
            );
            notifications.push(Notification {
                station_id: entry.station_id.clone(),
                label: entry.label.clone(),
                token: entry.token,
                name: entry.name.clone(),
                highlight_cycles: self.config.highlight_cycles,
                highlight_interval_ms: self.config.highlight_interval_ms,
                chime: self.config.chime,
                raised_at: now,
            });
        }
        state.previous = current;
        let previous = &state.previous;
        state
            .highlights
            .retain(|station, h| previous.contains_key(station) && h.phase_at(now).is_some());

        for entry in &mut entries {
            entry.highlighted = state
                .highlights
                .get(&entry.station_id)
                .and_then(|h| h.phase_at(now));
        }

        let board = Board {
            date,
            ledger_version: read.snapshot.version,
            entries,
            anomalies,
            polled_at: now,
            warnings,
        };
        state.board = Some(board.clone());
        drop(guard);

        metrics::AGGREGATOR_POLLS.with_label_values(&["ok"]).inc();
        metrics::NOTIFICATIONS_RAISED.inc_by(notifications.len() as u64);

        for notification in &notifications {
            debug!(
                station_id = %notification.station_id,
                token = notification.token,
                "Display notification raised"
            );
            if let Some(ref callback) = self.callback {
                callback(notification);
            }
        }

        Ok(PollReport {
            board,
            notifications,
        })
    }

    /// Last polled board with highlight phases evaluated now.
    pub fn current_board(&self) -> Option<Board> {
        let now = self.calendar.now();
        let state = self.lock_state();
        let mut board = state.board.clone()?;
        refresh_highlights(&mut board, &state.highlights, now);
        Some(board)
    }

    fn label_for(&self, station_id: &str) -> String {
        self.labels
            .get(station_id)
            .cloned()
            .unwrap_or_else(|| station_id.to_string())
    }

    /// Ask the background loop to poll immediately.
    pub fn nudge(&self) {
        self.nudge.notify_one();
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Spawn the polling loop. Returns false if it was already running.
    pub fn start(self: &Arc<Self>) -> bool {
        if self.running.swap(true, Ordering::SeqCst) {
            warn!("Display aggregator already running");
            return false;
        }

        let this = Arc::clone(self);
        let mut shutdown_rx = self.shutdown_tx.subscribe();
        let interval = Duration::from_millis(self.config.poll_interval_ms);

        info!(
            poll_interval_ms = self.config.poll_interval_ms,
            "Starting display aggregator"
        );

        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = shutdown_rx.recv() => {
                        info!("Display aggregator shutting down");
                        break;
                    }
                    _ = tokio::time::sleep(interval) => {}
                    _ = this.nudge.notified() => {
                        debug!("Display poll nudged");
                    }
                }

                if !this.running.load(Ordering::SeqCst) {
                    break;
                }
                // Errors are logged and counted inside poll; the next tick retries.
                let _ = this.poll();
            }
        });

        true
    }

    pub fn stop(&self) {
        if self.running.swap(false, Ordering::SeqCst) {
            let _ = self.shutdown_tx.send(());
        }
    }
}

/// Latest record per station with its append index. Later appends win ties.
fn latest_per_station(records: &[CallRecord]) -> Vec<(usize, &CallRecord)> {
    let mut latest: HashMap<&str, (usize, &CallRecord)> = HashMap::new();
    for (index, record) in records.iter().enumerate() {
        match latest.get(record.station_id.as_str()) {
            Some((_, current)) if current.called_at > record.called_at => {}
            _ => {
                latest.insert(record.station_id.as_str(), (index, record));
            }
        }
    }
    latest.into_values().collect()
}

fn find_duplicates(records: &[CallRecord]) -> Vec<DuplicateCall> {
    let mut by_token: HashMap<u32, Vec<String>> = HashMap::new();
    for record in records {
        by_token
            .entry(record.token)
            .or_default()
            .push(record.station_id.clone());
    }
    let mut duplicates: Vec<DuplicateCall> = by_token
        .into_iter()
        .filter(|(_, stations)| stations.len() > 1)
        .map(|(token, station_ids)| DuplicateCall { token, station_ids })
        .collect();
    duplicates.sort_by_key(|d| d.token);
    duplicates
}

fn refresh_highlights(
    board: &mut Board,
    highlights: &HashMap<String, Highlight>,
    now: DateTime<Utc>,
) {
    for entry in &mut board.entries {
        entry.highlighted = highlights
            .get(&entry.station_id)
            .and_then(|h| h.phase_at(now));
    }
}

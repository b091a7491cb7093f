use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::NaiveDate;
use tracing::{debug, info, warn};

use super::{CallReport, CallResult, CalledToken, RecallOutcome, StationError, StationState};
use crate::audit::{AuditEvent, AuditHandle, AuditSink};
use crate::clock::Calendar;
use crate::config::StationConfig;
use crate::ledger::{CallLedger, ClaimRequest};
use crate::metrics;
use crate::registry::Registry;

/// Base delay between claim retries; grows linearly per attempt.
const RETRY_BACKOFF: Duration = Duration::from_millis(20);

/// One interview room.
///
/// Owns its open/closed flag and current token. Coordination with other
/// rooms happens only through the ledger's atomic claim.
pub struct StationController {
    state: StationState,
    registry: Arc<dyn Registry>,
    ledger: Arc<dyn CallLedger>,
    calendar: Calendar,
    max_claim_retries: u32,
    audit: Option<AuditHandle>,
}

impl StationController {
    pub fn new(
        config: &StationConfig,
        registry: Arc<dyn Registry>,
        ledger: Arc<dyn CallLedger>,
        calendar: Calendar,
        max_claim_retries: u32,
    ) -> Self {
        Self {
            state: StationState {
                station_id: config.id.clone(),
                label: config.display_label().to_string(),
                is_open: config.start_open,
                current_token: None,
            },
            registry,
            ledger,
            calendar,
            max_claim_retries,
            audit: None,
        }
    }

    pub fn with_audit(mut self, audit: AuditHandle) -> Self {
        self.audit = Some(audit);
        self
    }

    pub fn id(&self) -> &str {
        &self.state.station_id
    }

    pub fn state(&self) -> &StationState {
        &self.state
    }

    /// Open the station. Returns `true` if it was already open.
    pub fn open(&mut self, actor: &str) -> bool {
        if self.state.is_open {
            return true;
        }
        self.state.is_open = true;
        self.state.current_token = None;
        info!(station = %self.state.station_id, actor, "Station opened");
        self.audit.record(AuditEvent::StationOpened {
            station_id: self.state.station_id.clone(),
            opened_by: actor.to_string(),
        });
        false
    }

    /// Close the station. The current token is kept for inspection.
    pub fn close(&mut self, actor: &str) {
        if !self.state.is_open {
            return;
        }
        self.state.is_open = false;
        info!(station = %self.state.station_id, actor, "Station closed");
        self.audit.record(AuditEvent::StationClosed {
            station_id: self.state.station_id.clone(),
            closed_by: actor.to_string(),
        });
    }

    fn ensure_open(&self) -> Result<(), StationError> {
        if self.state.is_open {
            Ok(())
        } else {
            Err(StationError::Closed(self.state.station_id.clone()))
        }
    }

    /// Claim and call the first uncalled ticket of the day.
    pub async fn call_next(&mut self, actor: &str) -> Result<CallReport, StationError> {
        self.ensure_open()?;
        let date = self.calendar.today();
        let station_id = self.state.station_id.clone();
        let mut warnings = Vec::new();
        let mut attempt = 0;

        loop {
            attempt += 1;
            let tickets = self.registry.read_rows(date)?;

            let started = Instant::now();
            let result = self.ledger.claim_next(&ClaimRequest {
                date,
                station_id: &station_id,
                candidates: &tickets,
                now: self.calendar.now(),
            });
            metrics::CLAIM_DURATION
                .with_label_values(&[self.ledger.backend_name()])
                .observe(started.elapsed().as_secs_f64());

            match result {
                Ok(outcome) => {
                    if let Some(warning) = outcome.warning {
                        self.audit.record(AuditEvent::LedgerRecovered {
                            backend: self.ledger.backend_name().to_string(),
                            detail: warning.clone(),
                        });
                        warnings.push(warning);
                    }

                    let Some(record) = outcome.record else {
                        debug!(station = %station_id, date = %date, "Queue empty");
                        metrics::QUEUE_EMPTY.with_label_values(&[&station_id]).inc();
                        self.audit.record(AuditEvent::QueueEmpty {
                            station_id: station_id.clone(),
                            date,
                        });
                        return Ok(CallReport {
                            outcome: CallResult::QueueEmpty,
                            warnings,
                        });
                    };

                    self.state.current_token = Some(CalledToken::from_record(date, &record));
                    metrics::TOKENS_CALLED.with_label_values(&[&station_id]).inc();
                    info!(
                        station = %station_id,
                        token = record.token,
                        date = %date,
                        attempts = attempt,
                        "Token called"
                    );
                    self.audit.record(AuditEvent::TokenCalled {
                        station_id: station_id.clone(),
                        date,
                        token: record.token,
                        name: record.name.clone(),
                        called_by: actor.to_string(),
                        attempts: attempt,
                    });
                    return Ok(CallReport {
                        outcome: CallResult::Called {
                            record,
                            attempts: attempt,
                        },
                        warnings,
                    });
                }
                Err(e) if e.is_retryable() => {
                    metrics::CLAIM_CONFLICTS.with_label_values(&[&station_id]).inc();
                    warn!(station = %station_id, attempt, "Claim conflict: {}", e);
                    self.audit.record(AuditEvent::ClaimConflict {
                        station_id: station_id.clone(),
                        date,
                        attempt,
                        error: e.to_string(),
                    });
                    if attempt > self.max_claim_retries {
                        return Err(StationError::ClaimContention { attempts: attempt });
                    }
                    tokio::time::sleep(RETRY_BACKOFF * attempt).await;
                }
                Err(e) => return Err(StationError::Ledger(e)),
            }
        }
    }

    /// Re-announce the current token. Nothing is written to the ledger.
    pub fn recall(&self) -> Result<RecallOutcome, StationError> {
        self.ensure_open()?;
        Ok(match &self.state.current_token {
            Some(token) => RecallOutcome::Recalled(token.clone()),
            None => RecallOutcome::NothingToRecall,
        })
    }

    /// Show "waiting" locally. Nothing is written to the ledger.
    pub fn set_waiting(&mut self) -> Result<(), StationError> {
        self.ensure_open()?;
        self.state.current_token = None;
        Ok(())
    }

    /// Forget a current token that belonged to a reset day.
    pub fn on_day_reset(&mut self, date: NaiveDate) {
        if self
            .state
            .current_token
            .as_ref()
            .is_some_and(|t| t.date == date)
        {
            self.state.current_token = None;
        }
    }
}

//! Common test utilities for in-process API tests.
//!
//! The fixture wires the real router, sequence authority, station hub and
//! display aggregator to a settable clock, a failure-injecting registry and
//! a temp-dir ledger, so outage and race scenarios run without a network.

#![allow(dead_code)]

use std::sync::Arc;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::Router;
use http_body_util::BodyExt;
use serde_json::Value;
use tempfile::TempDir;
use tower::ServiceExt;

use tokenline_core::testing::{FixedClock, MockRegistry, MockVoucherWriter};
use tokenline_core::{
    create_audit_system, create_ledger, AuditStore, AuthMethod, Calendar, CallLedger,
    DisplayAggregator, FileDayMarker, LedgerBackend, Notification, NoneAuthenticator,
    ApiKeyAuthenticator, Authenticator, SequenceAuthority, SqliteAuditStore, StationHub,
    TicketIssuer,
};
use tokenline_server::api::{create_router, WsBroadcaster, WsMessage};
use tokenline_server::state::AppState;

pub use tokenline_core::testing::fixtures;

/// In-process server with controllable dependencies.
///
/// # Example
///
/// ```rust,ignore
/// let fixture = TestFixture::new().await;
/// let response = fixture.post("/api/v1/tickets", json!({"name": "Ann", "contact": "555"})).await;
/// assert_eq!(response.status, StatusCode::CREATED);
/// ```
pub struct TestFixture {
    pub router: Router,
    pub state: Arc<AppState>,
    pub clock: Arc<FixedClock>,
    /// Registry with outage and conflict injection
    pub registry: Arc<MockRegistry>,
    pub vouchers: Arc<MockVoucherWriter>,
    pub ledger: Arc<dyn CallLedger>,
    pub audit_store: Arc<dyn AuditStore>,
    pub broadcaster: WsBroadcaster,
    pub temp_dir: TempDir,
}

#[derive(Debug)]
pub struct TestResponse {
    pub status: StatusCode,
    pub body: Value,
}

/// Configuration for test fixture.
#[derive(Debug, Clone)]
pub struct TestConfig {
    pub stations: Vec<&'static str>,
    pub ledger_backend: LedgerBackend,
    /// Require this key on operator routes
    pub api_key: Option<String>,
    /// Initial wall clock
    pub now: &'static str,
}

impl Default for TestConfig {
    fn default() -> Self {
        Self {
            stations: vec!["room-1", "room-2"],
            ledger_backend: LedgerBackend::Sqlite,
            api_key: None,
            now: "2024-01-01T09:00:00Z",
        }
    }
}

impl TestConfig {
    pub fn with_json_ledger() -> Self {
        Self {
            ledger_backend: LedgerBackend::JsonFile,
            ..Default::default()
        }
    }

    pub fn with_api_key(key: &str) -> Self {
        Self {
            api_key: Some(key.to_string()),
            ..Default::default()
        }
    }
}

impl TestFixture {
    pub async fn new() -> Self {
        Self::with_config(TestConfig::default()).await
    }

    pub async fn with_config(test_config: TestConfig) -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let db_path = temp_dir.path().join("test.db");

        let mut config = fixtures::config_with_stations(&test_config.stations);
        config.database.path = db_path.clone();
        config.ledger.backend = test_config.ledger_backend;
        config.ledger.json_path = temp_dir.path().join("ledger.json");
        config.sequence.day_marker_path = temp_dir.path().join("day.marker");
        config.sequence.utc_offset_minutes = Some(0);
        config.display.highlight_interval_ms = 500;

        let authenticator: Arc<dyn Authenticator> = match &test_config.api_key {
            Some(key) => {
                config.auth.method = AuthMethod::ApiKey;
                config.auth.api_key = Some(key.clone());
                Arc::new(ApiKeyAuthenticator::new(key))
            }
            None => Arc::new(NoneAuthenticator::new()),
        };

        let clock = Arc::new(FixedClock::at(test_config.now));
        let calendar = Calendar::with_offset_minutes(clock.clone(), 0);
        let registry = Arc::new(MockRegistry::new());
        let vouchers = Arc::new(MockVoucherWriter::new());
        let ledger =
            create_ledger(&config.ledger, &db_path).expect("Failed to create ledger");

        let audit_store: Arc<dyn AuditStore> = Arc::new(
            SqliteAuditStore::new(&db_path).expect("Failed to create audit store"),
        );
        let (audit_handle, audit_writer) = create_audit_system(Arc::clone(&audit_store), 100);
        tokio::spawn(audit_writer.run());

        let authority = SequenceAuthority::new(
            registry.clone(),
            Arc::clone(&ledger),
            Arc::new(FileDayMarker::new(&config.sequence.day_marker_path)),
            calendar.clone(),
        )
        .with_audit(audit_handle.clone());
        authority.startup().expect("Failed to start sequence authority");

        let issuer = TicketIssuer::new(
            Arc::new(authority),
            registry.clone(),
            calendar.clone(),
            config.sequence.max_issue_retries,
        )
        .with_vouchers(vouchers.clone())
        .with_audit(audit_handle.clone());

        let hub = Arc::new(StationHub::new(
            &config.stations,
            registry.clone(),
            Arc::clone(&ledger),
            calendar.clone(),
            config.ledger.max_claim_retries,
            Some(audit_handle),
        ));

        let broadcaster = WsBroadcaster::default();
        let for_callback = broadcaster.clone();
        let aggregator = Arc::new(
            DisplayAggregator::new(
                registry.clone(),
                Arc::clone(&ledger),
                calendar,
                config.display.clone(),
                hub.labels().clone(),
            )
            .with_notification_callback(Arc::new(move |n: &Notification| {
                for_callback.display_notification(n);
            })),
        );

        let state = Arc::new(AppState::new(
            config,
            authenticator,
            Arc::clone(&audit_store),
            registry.clone(),
            Arc::clone(&ledger),
            Arc::new(issuer),
            hub,
            aggregator,
            broadcaster.clone(),
        ));
        let router = create_router(Arc::clone(&state));

        Self {
            router,
            state,
            clock,
            registry,
            vouchers,
            ledger,
            audit_store,
            broadcaster,
            temp_dir,
        }
    }

    /// Subscribe before acting to observe pushed events.
    pub fn subscribe(&self) -> tokio::sync::broadcast::Receiver<WsMessage> {
        self.broadcaster.subscribe()
    }

    /// Run one display poll in the foreground.
    pub fn poll_display(&self) -> tokenline_core::display::PollReport {
        self.state
            .aggregator()
            .poll()
            .expect("Display poll failed")
    }

    /// Wait until the audit writer has persisted `event_type`.
    pub async fn wait_for_audit(&self, event_type: &str) -> Vec<tokenline_core::AuditRecord> {
        let filter = tokenline_core::AuditFilter::new().with_event_type(event_type);
        for _ in 0..50 {
            let records = self.audit_store.query(&filter).expect("Audit query failed");
            if !records.is_empty() {
                return records;
            }
            tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        }
        Vec::new()
    }

    pub async fn get(&self, path: &str) -> TestResponse {
        self.request("GET", path, None, &[]).await
    }

    pub async fn post(&self, path: &str, body: Value) -> TestResponse {
        self.request("POST", path, Some(body), &[]).await
    }

    /// POST with no body at all.
    pub async fn post_empty(&self, path: &str) -> TestResponse {
        self.request("POST", path, None, &[]).await
    }

    pub async fn post_with_headers(
        &self,
        path: &str,
        body: Value,
        headers: &[(&str, &str)],
    ) -> TestResponse {
        self.request("POST", path, Some(body), headers).await
    }

    pub async fn get_with_headers(&self, path: &str, headers: &[(&str, &str)]) -> TestResponse {
        self.request("GET", path, None, headers).await
    }

    /// GET a non-JSON body, such as the Prometheus text format.
    pub async fn get_text(&self, path: &str) -> (StatusCode, String) {
        let request = Request::builder().uri(path).body(Body::empty()).unwrap();
        let response = self
            .router
            .clone()
            .oneshot(request)
            .await
            .expect("Failed to send request");
        let status = response.status();
        let bytes = response
            .into_body()
            .collect()
            .await
            .expect("Failed to collect body")
            .to_bytes();
        (status, String::from_utf8_lossy(&bytes).into_owned())
    }

    async fn request(
        &self,
        method: &str,
        path: &str,
        body: Option<Value>,
        headers: &[(&str, &str)],
    ) -> TestResponse {
        let mut builder = Request::builder().method(method).uri(path);
        for (name, value) in headers {
            builder = builder.header(*name, *value);
        }

        let body = match body {
            Some(json_body) => {
                builder = builder.header("Content-Type", "application/json");
                Body::from(serde_json::to_vec(&json_body).unwrap())
            }
            None => Body::empty(),
        };

        let response = self
            .router
            .clone()
            .oneshot(builder.body(body).unwrap())
            .await
            .expect("Failed to send request");

        let status = response.status();
        let body_bytes = response
            .into_body()
            .collect()
            .await
            .expect("Failed to collect body")
            .to_bytes();

        let body = if body_bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&body_bytes).unwrap_or(Value::Null)
        };

        TestResponse { status, body }
    }
}

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use sha2::{Digest, Sha256};
use tokio::signal;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use tokenline_core::{
    config_path_from_env, create_audit_system, create_authenticator, create_ledger,
    load_validated_config, AuditEvent, AuditStore, Authenticator, Calendar, CallLedger,
    DisplayAggregator, FileDayMarker, FsVoucherWriter, Notification, NotificationCallback,
    Registry, SequenceAuthority, SqliteAuditStore, SqliteRegistry, StationHub, SystemClock,
    TicketIssuer,
};
use tokenline_server::api::{create_router, WsBroadcaster};
use tokenline_server::state::AppState;

const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Buffer size for audit event channel
const AUDIT_BUFFER_SIZE: usize = 1000;

const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(30);

/// How long the audit writer gets to drain on shutdown.
const AUDIT_DRAIN_TIMEOUT: Duration = Duration::from_secs(5);

#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        error!("Fatal error: {:#}", e);
        std::process::exit(1);
    }
}

async fn run() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config_path = config_path_from_env();

    info!("Loading configuration from {:?}", config_path);
    let config = load_validated_config(&config_path)
        .with_context(|| format!("Failed to load config from {:?}", config_path))?;

    info!("Auth method: {:?}", config.auth.method);
    info!("Database path: {:?}", config.database.path);
    info!("Ledger backend: {:?}", config.ledger.backend);
    info!("Stations: {}", config.stations.len());

    let config_json = serde_json::to_string(&config).unwrap_or_default();
    let config_hash = format!("{:x}", Sha256::digest(config_json.as_bytes()));
    let config_hash_short = &config_hash[..16];

    let authenticator: Arc<dyn Authenticator> = Arc::from(
        create_authenticator(&config.auth).context("Failed to create authenticator")?,
    );
    info!("Using authenticator: {}", authenticator.method_name());

    if let Some(parent) = config.database.path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {:?}", parent))?;
        }
    }

    let audit_store: Arc<dyn AuditStore> = Arc::new(
        SqliteAuditStore::new(&config.database.path).context("Failed to create audit store")?,
    );
    let registry: Arc<dyn Registry> = Arc::new(
        SqliteRegistry::new(&config.database.path).context("Failed to open registry")?,
    );
    let ledger: Arc<dyn CallLedger> = create_ledger(&config.ledger, &config.database.path)
        .context("Failed to open call ledger")?;
    info!("Stores initialized (ledger: {})", ledger.backend_name());

    let (audit_handle, audit_writer) =
        create_audit_system(Arc::clone(&audit_store), AUDIT_BUFFER_SIZE);
    let writer_handle = tokio::spawn(audit_writer.run());

    audit_handle
        .emit(AuditEvent::ServiceStarted {
            version: VERSION.to_string(),
            config_hash: config_hash_short.to_string(),
        })
        .await;

    let clock = Arc::new(SystemClock);
    let calendar = match config.sequence.utc_offset_minutes {
        Some(minutes) => Calendar::with_offset_minutes(clock, minutes),
        None => Calendar::local(clock),
    };

    let authority = SequenceAuthority::new(
        Arc::clone(&registry),
        Arc::clone(&ledger),
        Arc::new(FileDayMarker::new(&config.sequence.day_marker_path)),
        calendar.clone(),
    )
    .with_audit(audit_handle.clone());
    let day = authority
        .startup()
        .context("Failed to load today's sequence from the registry")?;
    for warning in &day.warnings {
        warn!("Startup: {}", warning);
    }
    let authority = Arc::new(authority);

    let mut issuer = TicketIssuer::new(
        Arc::clone(&authority),
        Arc::clone(&registry),
        calendar.clone(),
        config.sequence.max_issue_retries,
    )
    .with_audit(audit_handle.clone());
    if config.voucher.enabled {
        info!("Vouchers written under {:?}", config.voucher.output_dir);
        issuer = issuer.with_vouchers(Arc::new(FsVoucherWriter::new(&config.voucher.output_dir)));
    } else {
        info!("Vouchers disabled");
    }
    let issuer = Arc::new(issuer);

    let hub = Arc::new(StationHub::new(
        &config.stations,
        Arc::clone(&registry),
        Arc::clone(&ledger),
        calendar.clone(),
        config.ledger.max_claim_retries,
        Some(audit_handle.clone()),
    ));

    let ws_broadcaster = WsBroadcaster::default();
    let heartbeat = ws_broadcaster.spawn_heartbeat(HEARTBEAT_INTERVAL);

    // Board changes are pushed to every display over the WebSocket.
    let broadcaster_for_callback = ws_broadcaster.clone();
    let notification_callback: NotificationCallback =
        Arc::new(move |notification: &Notification| {
            broadcaster_for_callback.display_notification(notification);
        });
    let aggregator = Arc::new(
        DisplayAggregator::new(
            Arc::clone(&registry),
            Arc::clone(&ledger),
            calendar,
            config.display.clone(),
            hub.labels().clone(),
        )
        .with_notification_callback(notification_callback),
    );
    aggregator.start();

    let state = Arc::new(AppState::new(
        config.clone(),
        authenticator,
        audit_store,
        registry,
        ledger,
        issuer,
        hub,
        Arc::clone(&aggregator),
        ws_broadcaster,
    ));
    let app = create_router(state);

    let addr = SocketAddr::new(config.server.host, config.server.port);
    info!("Starting server on {}", addr);
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind to {}", addr))?;

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await
    .context("Server error")?;

    info!("Server shutting down...");
    aggregator.stop();
    heartbeat.abort();

    audit_handle
        .emit(AuditEvent::ServiceStopped {
            reason: "graceful_shutdown".to_string(),
        })
        .await;

    // The writer exits once every AuditHandle clone is gone.
    drop(authority);
    drop(audit_handle);
    match tokio::time::timeout(AUDIT_DRAIN_TIMEOUT, writer_handle).await {
        Ok(_) => info!("Audit writer stopped"),
        Err(_) => warn!("Audit writer did not drain in time"),
    }

    Ok(())
}

/// Wait for shutdown signal (Ctrl+C or SIGTERM)
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}

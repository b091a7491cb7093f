//! Tokenline core: daily token issuance, multi-room calling and the
//! display board, independent of any transport.

pub mod audit;
pub mod auth;
pub mod clock;
pub mod config;
pub mod display;
pub mod issuance;
pub mod ledger;
pub mod metrics;
pub mod registry;
pub mod sequence;
pub mod station;
pub mod testing;

pub use audit::{
    create_audit_system, AuditError, AuditEvent, AuditEventEnvelope, AuditFilter, AuditHandle,
    AuditRecord, AuditSink, AuditStore, AuditWriter, SqliteAuditStore,
};
pub use auth::{
    create_authenticator, ApiKeyAuthenticator, AuthError, AuthRequest, Authenticator, Identity,
    NoneAuthenticator,
};
pub use clock::{Calendar, Clock, SystemClock};
pub use config::{
    config_path_from_env, load_config, load_config_from_str, load_validated_config,
    validate_config, AuthMethod, Config, ConfigError, LedgerBackend, SanitizedConfig,
    StationConfig,
};
pub use display::{Board, BoardEntry, DisplayAggregator, Notification, NotificationCallback};
pub use issuance::{FsVoucherWriter, IssueError, IssueOutcome, TicketIssuer, Voucher};
pub use ledger::{create_ledger, CallLedger, CallRecord, LedgerError, LedgerSnapshot};
pub use registry::{Registry, RegistryError, SqliteRegistry, Ticket};
pub use sequence::{FileDayMarker, ResetReport, SequenceAuthority, SequenceError};
pub use station::{CallReport, CallResult, RecallOutcome, StationError, StationHub, StationState};

use std::sync::Arc;

use tokenline_core::{
    AuditStore, Authenticator, Calendar, CallLedger, Config, DisplayAggregator,
    Registry, SanitizedConfig, SequenceAuthority, StationHub, TicketIssuer,
};

use crate::api::WsBroadcaster;

/// Shared application state
pub struct AppState {
    config: Config,
    authenticator: Arc<dyn Authenticator>,
    audit_store: Arc<dyn AuditStore>,
    registry: Arc<dyn Registry>,
    ledger: Arc<dyn CallLedger>,
    issuer: Arc<TicketIssuer>,
    hub: Arc<StationHub>,
    aggregator: Arc<DisplayAggregator>,
    ws_broadcaster: WsBroadcaster,
}

impl AppState {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        config: Config,
        authenticator: Arc<dyn Authenticator>,
        audit_store: Arc<dyn AuditStore>,
        registry: Arc<dyn Registry>,
        ledger: Arc<dyn CallLedger>,
        issuer: Arc<TicketIssuer>,
        hub: Arc<StationHub>,
        aggregator: Arc<DisplayAggregator>,
        ws_broadcaster: WsBroadcaster,
    ) -> Self {
        Self {
            config,
            authenticator,
            audit_store,
            registry,
            ledger,
            issuer,
            hub,
            aggregator,
            ws_broadcaster,
        }
    }

    pub fn sanitized_config(&self) -> SanitizedConfig {
        SanitizedConfig::from(&self.config)
    }

    pub fn authenticator(&self) -> &dyn Authenticator {
        self.authenticator.as_ref()
    }

    pub fn audit_store(&self) -> &dyn AuditStore {
        self.audit_store.as_ref()
    }

    pub fn registry(&self) -> &dyn Registry {
        self.registry.as_ref()
    }

    pub fn ledger(&self) -> &dyn CallLedger {
        self.ledger.as_ref()
    }

    pub fn issuer(&self) -> &TicketIssuer {
        &self.issuer
    }

    pub fn authority(&self) -> &SequenceAuthority {
        self.issuer.authority()
    }

    pub fn calendar(&self) -> &Calendar {
        self.issuer.authority().calendar()
    }

    pub fn hub(&self) -> &StationHub {
        &self.hub
    }

    pub fn aggregator(&self) -> &Arc<DisplayAggregator> {
        &self.aggregator
    }

    pub fn ws_broadcaster(&self) -> &WsBroadcaster {
        &self.ws_broadcaster
    }
}

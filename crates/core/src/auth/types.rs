use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::net::IpAddr;

/// Header an operator may send to name themselves in the audit trail.
pub const OPERATOR_HEADER: &str = "x-operator";

const MAX_OPERATOR_LEN: usize = 64;

/// Request information for authentication. Header names are lowercase.
#[derive(Debug, Clone)]
pub struct AuthRequest {
    pub headers: HashMap<String, String>,
    pub source_ip: IpAddr,
}

impl AuthRequest {
    /// Operator name from the `X-Operator` header, if it is usable.
    ///
    /// Control characters are dropped and the result is trimmed and capped.
    pub fn operator_hint(&self) -> Option<String> {
        let raw = self.headers.get(OPERATOR_HEADER)?;
        let cleaned: String = raw
            .chars()
            .filter(|c| !c.is_control())
            .take(MAX_OPERATOR_LEN)
            .collect();
        let cleaned = cleaned.trim();
        if cleaned.is_empty() {
            None
        } else {
            Some(cleaned.to_string())
        }
    }
}

/// The operator behind a request.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Identity {
    /// Name recorded as `actor` in audit events.
    pub operator: String,
    pub method: String,
    pub source_ip: Option<IpAddr>,
}

impl Identity {
    pub fn anonymous() -> Self {
        Self {
            operator: "anonymous".to_string(),
            method: "none".to_string(),
            source_ip: None,
        }
    }

    pub fn actor(&self) -> &str {
        &self.operator
    }
}

use async_trait::async_trait;

use super::{AuthError, AuthRequest, Authenticator, Identity};

/// Accepts every request. Intended for a single trusted LAN.
///
/// The operator named in `X-Operator` is still honoured for auditing.
#[derive(Debug, Default)]
pub struct NoneAuthenticator;

impl NoneAuthenticator {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Authenticator for NoneAuthenticator {
    async fn authenticate(&self, request: &AuthRequest) -> Result<Identity, AuthError> {
        let mut identity = Identity::anonymous();
        if let Some(operator) = request.operator_hint() {
            identity.operator = operator;
        }
        identity.source_ip = Some(request.source_ip);
        Ok(identity)
    }

    fn method_name(&self) -> &'static str {
        "none"
    }
}

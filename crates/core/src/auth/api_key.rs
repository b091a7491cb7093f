//! Shared operator key.

use async_trait::async_trait;
use sha2::{Digest, Sha256};

use super::{AuthError, AuthRequest, Authenticator, Identity};

const DEFAULT_OPERATOR: &str = "operator";

/// Validates requests against the configured operator key.
///
/// The key is read from `Authorization: Bearer <key>` or `X-API-Key: <key>`.
pub struct ApiKeyAuthenticator {
    key_digest: [u8; 32],
}

impl ApiKeyAuthenticator {
    pub fn new(api_key: &str) -> Self {
        Self {
            key_digest: digest(api_key),
        }
    }

    fn extract_key<'a>(&self, request: &'a AuthRequest) -> Option<&'a str> {
        if let Some(header) = request.headers.get("authorization") {
            let header = header.trim();
            if let Some(scheme) = header.get(..7) {
                if scheme.eq_ignore_ascii_case("bearer ") {
                    return Some(header[7..].trim());
                }
            }
        }
        request.headers.get("x-api-key").map(|k| k.trim())
    }
}

#[async_trait]
impl Authenticator for ApiKeyAuthenticator {
    async fn authenticate(&self, request: &AuthRequest) -> Result<Identity, AuthError> {
        let provided = self
            .extract_key(request)
            .ok_or(AuthError::NotAuthenticated)?;

        // Digests have a fixed length, so the fold below never short-circuits on size.
        let matches = digest(provided)
            .iter()
            .zip(self.key_digest.iter())
            .fold(0u8, |acc, (a, b)| acc | (a ^ b))
            == 0;
        if !matches {
            return Err(AuthError::InvalidCredentials("Invalid API key".to_string()));
        }

        Ok(Identity {
            operator: request
                .operator_hint()
                .unwrap_or_else(|| DEFAULT_OPERATOR.to_string()),
            method: self.method_name().to_string(),
            source_ip: Some(request.source_ip),
        })
    }

    fn method_name(&self) -> &'static str {
        "api_key"
    }
}

fn digest(key: &str) -> [u8; 32] {
    Sha256::digest(key.as_bytes()).into()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_request(headers: Vec<(&str, &str)>) -> AuthRequest {
        AuthRequest {
            headers: headers
                .into_iter()
                .map(|(k, v)| (k.to_lowercase(), v.to_string()))
                .collect(),
            source_ip: "127.0.0.1".parse().unwrap(),
        }
    }

    #[tokio::test]
    async fn test_bearer_and_header_forms() {
        let auth = ApiKeyAuthenticator::new("desk-key");

        for headers in [
            vec![("Authorization", "Bearer desk-key")],
            vec![("Authorization", "bearer desk-key")],
            vec![("X-API-Key", "desk-key")],
        ] {
            let identity = auth.authenticate(&make_request(headers)).await.unwrap();
            assert_eq!(identity.actor(), "operator");
            assert_eq!(identity.method, "api_key");
        }
    }

    #[tokio::test]
    async fn test_operator_header_names_the_actor() {
        let auth = ApiKeyAuthenticator::new("desk-key");
        let request = make_request(vec![("X-API-Key", "desk-key"), ("X-Operator", "room-2 clerk")]);

        let identity = auth.authenticate(&request).await.unwrap();
        assert_eq!(identity.actor(), "room-2 clerk");
    }

    #[tokio::test]
    async fn test_wrong_or_missing_key() {
        let auth = ApiKeyAuthenticator::new("desk-key");

        let wrong = auth
            .authenticate(&make_request(vec![("Authorization", "Bearer nope")]))
            .await;
        assert!(matches!(wrong, Err(AuthError::InvalidCredentials(_))));

        let missing = auth.authenticate(&make_request(vec![])).await;
        assert!(matches!(missing, Err(AuthError::NotAuthenticated)));

        // A bare scheme is not a key.
        let bare = auth
            .authenticate(&make_request(vec![("Authorization", "Bearer")]))
            .await;
        assert!(matches!(bare, Err(AuthError::NotAuthenticated)));
    }
}

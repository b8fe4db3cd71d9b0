//! HS256 token verifier backed by the principals table.

use std::sync::Arc;

use async_trait::async_trait;
use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{Algorithm, DecodingKey, Validation, decode};
use resource_controller_sdk::{AuthError, Principal, ResourceStore, TokenVerifier};
use serde::Deserialize;

use crate::config::JwtConfig;

#[derive(Debug, Deserialize)]
struct Claims {
    sub: String,
}

/// Validates signature and expiry, then requires the subject to exist as a
/// record of the requested table.
pub struct JwtTokenVerifier {
    key: DecodingKey,
    validation: Validation,
    store: Arc<dyn ResourceStore>,
}

impl JwtTokenVerifier {
    #[must_use]
    pub fn new(config: &JwtConfig, store: Arc<dyn ResourceStore>) -> Self {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.leeway = config.leeway_seconds;
        validation.set_required_spec_claims(&["exp", "sub"]);
        Self {
            key: DecodingKey::from_secret(config.secret.expose().as_bytes()),
            validation,
            store,
        }
    }
}

#[async_trait]
impl TokenVerifier for JwtTokenVerifier {
    #[tracing::instrument(skip_all, fields(table = %table))]
    async fn verify(&self, token: &str, table: &str) -> Result<Principal, AuthError> {
        let token = token.trim_start_matches("Bearer ").trim();
        let data = decode::<Claims>(token, &self.key, &self.validation).map_err(|e| match e.kind() {
            ErrorKind::ExpiredSignature => AuthError::TokenExpired,
            _ => AuthError::InvalidToken(e.to_string()),
        })?;
        let subject = data.claims.sub;

        match self.store.find(table, &subject).await {
            Ok(Some(_)) => {
                tracing::debug!(subject = %subject, "Token verified");
                Ok(Principal {
                    subject,
                    table: table.to_owned(),
                })
            }
            Ok(None) => {
                tracing::warn!(subject = %subject, "Token subject is not a known principal");
                Err(AuthError::Forbidden)
            }
            Err(e) => Err(AuthError::Internal(format!("principal lookup failed: {e}"))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::JwtSecret;
    use crate::infra::storage::InMemoryStore;
    use jsonwebtoken::{EncodingKey, Header, encode};
    use resource_controller_sdk::StoredResource;
    use serde_json::json;

    const SECRET: &str = "test-secret";

    fn config() -> JwtConfig {
        JwtConfig {
            enabled: true,
            secret: JwtSecret::new(SECRET),
            ..JwtConfig::default()
        }
    }

    fn token(sub: &str, exp_offset_secs: i64, secret: &str) -> String {
        let claims = json!({
            "sub": sub,
            "exp": chrono::Utc::now().timestamp() + exp_offset_secs,
        });
        encode(
            &Header::default(),
            &claims,
            &EncodingKey::from_secret(secret.as_bytes()),
        )
        .unwrap()
    }

    async fn verifier() -> JwtTokenVerifier {
        let store = Arc::new(InMemoryStore::new());
        store
            .insert(
                "users",
                StoredResource {
                    id: "42".to_owned(),
                    ..StoredResource::default()
                },
            )
            .await
            .unwrap();
        JwtTokenVerifier::new(&config(), store)
    }

    #[tokio::test]
    async fn accepts_valid_token_for_known_principal() {
        let verifier = verifier().await;
        let principal = verifier
            .verify(&format!("Bearer {}", token("42", 600, SECRET)), "users")
            .await
            .unwrap();
        assert_eq!(principal.subject, "42");
        assert_eq!(principal.table, "users");
    }

    #[tokio::test]
    async fn rejects_bad_signature_expiry_and_unknown_subject() {
        let verifier = verifier().await;
        assert!(matches!(
            verifier.verify(&token("42", 600, "other"), "users").await,
            Err(AuthError::InvalidToken(_))
        ));
        assert!(matches!(
            verifier.verify(&token("42", -3600, SECRET), "users").await,
            Err(AuthError::TokenExpired)
        ));
        assert!(matches!(
            verifier.verify(&token("7", 600, SECRET), "users").await,
            Err(AuthError::Forbidden)
        ));
        assert!(matches!(
            verifier.verify("not-a-jwt", "users").await,
            Err(AuthError::InvalidToken(_))
        ));
    }
}

//! Connection authentication at the WebSocket handshake boundary.
//!
//! Identity issuance lives in an external service; this module only verifies
//! that a presented token belongs to the claimed participant identity.

use futures::future::BoxFuture;
use hmac::{Hmac, Mac};
use sha2::Sha256;
use std::sync::Arc;
use thiserror::Error;
use tracing::warn;
use uuid::Uuid;

use crate::config::AppConfig;

type HmacSha256 = Hmac<Sha256>;

/// Errors raised while verifying a handshake token.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AuthError {
    /// The token is malformed or does not match the claimed identity.
    #[error("invalid token")]
    InvalidToken,
}

/// Verifier consulted before a connection may issue any match command.
pub trait TokenVerifier: Send + Sync {
    /// Check that `token` authenticates `user_id`.
    fn verify(&self, user_id: Uuid, token: String) -> BoxFuture<'static, Result<(), AuthError>>;
}

/// Verifier for tokens minted as `hex(HMAC-SHA256(secret, user_id))` by the
/// identity service sharing our secret.
pub struct SharedSecretVerifier {
    secret: Arc<str>,
}

impl SharedSecretVerifier {
    /// Build a verifier around the shared secret.
    pub fn new(secret: impl Into<Arc<str>>) -> Self {
        Self {
            secret: secret.into(),
        }
    }
}

impl TokenVerifier for SharedSecretVerifier {
    fn verify(&self, user_id: Uuid, token: String) -> BoxFuture<'static, Result<(), AuthError>> {
        let secret = self.secret.clone();
        Box::pin(async move {
            let presented = hex::decode(token.trim()).map_err(|_| AuthError::InvalidToken)?;

            let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
                .map_err(|_| AuthError::InvalidToken)?;
            mac.update(user_id.as_bytes());
            mac.verify_slice(&presented)
                .map_err(|_| AuthError::InvalidToken)
        })
    }
}

/// Verifier that accepts every token. Development fallback when no secret is
/// configured; logs loudly at construction.
pub struct PermissiveVerifier;

impl TokenVerifier for PermissiveVerifier {
    fn verify(&self, _user_id: Uuid, _token: String) -> BoxFuture<'static, Result<(), AuthError>> {
        Box::pin(async { Ok(()) })
    }
}

/// Pick the verifier implied by the configuration.
pub fn verifier_from_config(config: &AppConfig) -> Arc<dyn TokenVerifier> {
    match config.auth_secret() {
        Some(secret) => Arc::new(SharedSecretVerifier::new(secret.to_owned())),
        None => {
            warn!("no auth secret configured; accepting every handshake token");
            Arc::new(PermissiveVerifier)
        }
    }
}

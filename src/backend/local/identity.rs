use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use uuid::Uuid;

use crate::backend::{IdentityProvider, TokenStore};
use crate::error::{BackendError, BackendResult};
use crate::models::{Claims, Session};

/// Identity provider that issues and verifies its own JWT session tokens
pub struct LocalIdentity {
    tokens: TokenStore,
    secret: String,
    token_ttl: Duration,
}

impl LocalIdentity {
    pub fn new(tokens: TokenStore, secret: impl Into<String>, token_ttl_hours: u64) -> Self {
        Self {
            tokens,
            secret: secret.into(),
            token_ttl: Duration::hours(token_ttl_hours as i64),
        }
    }

    /// Sign `user_id` in and persist the session token
    pub async fn issue_token(&self, user_id: &str, email: &str) -> BackendResult<Session> {
        if user_id.trim().is_empty() {
            return Err(BackendError::new("User id must not be empty").with_status(400));
        }

        let now = Utc::now();
        let exp = now + self.token_ttl;
        let claims = Claims {
            sub: user_id.to_string(),
            email: email.to_string(),
            jti: Uuid::new_v4().to_string(),
            exp: exp.timestamp() as usize,
            iat: now.timestamp() as usize,
        };

        let token = encode(
            &Header::default(),
            &claims,
            &EncodingKey::from_secret(self.secret.as_bytes()),
        )
        .map_err(|e| BackendError::new(format!("Failed to sign session token: {}", e)))?;

        self.tokens.save(&token).await?;
        tracing::info!("Issued session token for user {}", user_id);

        Ok(Session {
            user_id: claims.sub,
            email: claims.email,
            access_token: token,
            expires_at: Some(exp),
        })
    }

    /// Decode and verify a token; `None` when it is expired, forged or malformed
    pub fn validate_token(&self, token: &str) -> Option<Session> {
        let result = decode::<Claims>(
            token,
            &DecodingKey::from_secret(self.secret.as_bytes()),
            &Validation::default(),
        );

        match result {
            Ok(data) => {
                let claims = data.claims;
                Some(Session {
                    user_id: claims.sub,
                    email: claims.email,
                    access_token: token.to_string(),
                    expires_at: DateTime::<Utc>::from_timestamp(claims.exp as i64, 0),
                })
            }
            Err(e) => {
                tracing::warn!("Rejected session token: {}", e);
                None
            }
        }
    }
}

#[async_trait]
impl IdentityProvider for LocalIdentity {
    async fn get_session(&self) -> BackendResult<Option<Session>> {
        let Some(token) = self.tokens.load().await? else {
            return Ok(None);
        };
        Ok(self.validate_token(&token))
    }

    async fn sign_out(&self) -> BackendResult<()> {
        self.tokens.clear().await?;
        tracing::info!("Signed out");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn identity(dir: &tempfile::TempDir, secret: &str) -> LocalIdentity {
        LocalIdentity::new(TokenStore::new(dir.path().join(".session")), secret, 1)
    }

    #[tokio::test]
    async fn no_token_means_no_session() {
        let dir = tempfile::tempdir().unwrap();
        assert_eq!(identity(&dir, "s").get_session().await.unwrap(), None);
    }

    #[tokio::test]
    async fn issued_token_round_trips_until_sign_out() {
        let dir = tempfile::tempdir().unwrap();
        let auth = identity(&dir, "s");

        let issued = auth.issue_token("user-1", "a@example.com").await.unwrap();
        let session = auth.get_session().await.unwrap().unwrap();
        assert_eq!(session.user_id, "user-1");
        assert_eq!(session.email, "a@example.com");
        assert_eq!(session.access_token, issued.access_token);

        auth.sign_out().await.unwrap();
        assert_eq!(auth.get_session().await.unwrap(), None);
    }

    #[tokio::test]
    async fn token_signed_with_other_secret_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        identity(&dir, "one").issue_token("user-1", "a@example.com").await.unwrap();
        assert_eq!(identity(&dir, "two").get_session().await.unwrap(), None);
    }
}
